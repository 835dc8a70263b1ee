use serde_json::{Map, Value};

/// Deep-merge edit documents left to right.
///
/// Objects merge recursively, arrays are unioned keeping first-seen order without
/// duplicates, and any other value from a later document replaces the earlier one.
pub fn merge_edits<I>(documents: I) -> Map<String, Value>
where
    I: IntoIterator<Item = Map<String, Value>>,
{
    documents.into_iter().fold(Map::new(), |mut result, current| {
        merge_into(&mut result, current);
        result
    })
}

fn merge_into(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, incoming) in source {
        match (target.get_mut(&key), incoming) {
            (Some(Value::Array(existing)), Value::Array(items)) => {
                for item in items {
                    if !existing.contains(&item) {
                        existing.push(item);
                    }
                }
            }
            (Some(Value::Object(existing)), Value::Object(fields)) => {
                merge_into(existing, fields);
            }
            (_, other) => {
                target.insert(key, other);
            }
        }
    }
}
