//! CloudFormation intrinsic functions and pseudo parameters.

use serde_json::{json, Value};

/// `{"Ref": logical_id}`.
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{"Fn::GetAtt": [logical_id, attribute]}`.
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{"Fn::Base64": value}`.
pub fn base64(value: Value) -> Value {
    json!({ "Fn::Base64": value })
}

/// `{"Fn::Select": [index, list]}`.
pub fn select(index: usize, list: Value) -> Value {
    json!({ "Fn::Select": [index, list] })
}

/// Join fragments, folding literal strings together.
///
/// Returns a plain string when every fragment is a literal, otherwise a
/// `Fn::Join` whose adjacent literals have been merged.
pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    if parts.iter().all(Value::is_string) {
        let literals: Vec<&str> = parts.iter().filter_map(Value::as_str).collect();
        return Value::String(literals.join(delimiter));
    }

    if !delimiter.is_empty() {
        return json!({ "Fn::Join": [delimiter, parts] });
    }

    let mut merged: Vec<Value> = Vec::with_capacity(parts.len());
    for part in parts {
        match (merged.last_mut(), part) {
            (Some(Value::String(prev)), Value::String(next)) => prev.push_str(&next),
            (_, Value::String(next)) if next.is_empty() => {}
            (_, other) => merged.push(other),
        }
    }

    if merged.len() == 1 {
        return merged.remove(0);
    }
    json!({ "Fn::Join": ["", merged] })
}

/// Whether a value is a plain literal (no intrinsic function inside).
pub fn is_literal(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map
            .keys()
            .any(|k| k == "Ref" || k.starts_with("Fn::")),
        Value::Array(items) => items.iter().all(is_literal),
        _ => true,
    }
}

/// AWS pseudo parameters.
pub struct Aws;

impl Aws {
    pub fn region() -> Value {
        reference("AWS::Region")
    }

    pub fn account_id() -> Value {
        reference("AWS::AccountId")
    }

    pub fn partition() -> Value {
        reference("AWS::Partition")
    }

    pub fn url_suffix() -> Value {
        reference("AWS::URLSuffix")
    }

    pub fn stack_name() -> Value {
        reference("AWS::StackName")
    }
}
