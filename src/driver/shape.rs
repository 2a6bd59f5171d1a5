use serde_json::{Map, Value};

/// Projects `record` onto `shape`.
///
/// A shape is a nested object where `true` keeps the field, a nested object
/// recurses into it, and anything else drops the field. Fields missing in the
/// record are skipped.
///
/// e.g. given the shape `{ "name": { "first": true } }`, the record
/// `{ "name": { "first": "Ann", "last": "Lee" }, "age": 30 }` is projected to
/// `{ "name": { "first": "Ann" } }`.
pub fn project(record: &Value, shape: &Value) -> Value {
    let (Some(fields), Some(shape)) = (record.as_object(), shape.as_object()) else {
        return record.clone();
    };

    let mut out = Map::new();
    for (key, sub_shape) in shape {
        let Some(field) = fields.get(key) else {
            continue;
        };

        match sub_shape {
            Value::Bool(true) => {
                out.insert(key.clone(), field.clone());
            }
            Value::Object(_) => {
                out.insert(key.clone(), project(field, sub_shape));
            }
            _ => {}
        }
    }

    Value::Object(out)
}

/// Deep merges `overlay` into `record`. Objects are merged key by key, any
/// other value replaces the existing one.
pub fn overlay(record: &mut Value, overlay: &Value) {
    match (record, overlay) {
        (Value::Object(target), Value::Object(src)) => {
            for (key, value) in src {
                match target.get_mut(key) {
                    Some(existing) => self::overlay(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (record, overlay) => *record = overlay.clone(),
    }
}
