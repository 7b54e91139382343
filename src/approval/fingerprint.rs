use serde_json::{Map, Value};

/// Canonical key for a (tool, params) pair: `tool:` followed by the params
/// serialized as compact JSON with object keys sorted at every depth.
pub fn fingerprint(tool_name: &str, params: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(tool_name.len() + 2);
    out.push_str(tool_name);
    out.push(':');
    write_object(&mut out, params);
    out
}

fn write_object(out: &mut String, map: &Map<String, Value>) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(out, value);
    }
    out.push('}');
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => write_object(out, map),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
