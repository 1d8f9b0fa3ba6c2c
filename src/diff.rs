use serde_json::{Map, Value};

/// Collect leaf-level changes between two JSON values as (path, old, new).
/// Keys present only in `previous` are not reported; absent fields in a newer
/// snapshot never count as deletions.
pub fn diff_fields(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = if path_prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{path_prefix}.{key}")
                };
                match prev_map.get(key) {
                    Some(prev_val) => diff_fields(prev_val, curr_val, &path, changes),
                    None => {
                        if curr_val.is_object() {
                            diff_fields(&Value::Object(Map::new()), curr_val, &path, changes);
                        } else {
                            changes.push((path, Value::Null, curr_val.clone()));
                        }
                    }
                }
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}
