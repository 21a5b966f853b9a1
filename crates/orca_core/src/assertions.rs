//! Assertions over synthesized templates, for tests.
//!
//! Matching is "object-like": expected objects match any actual object that
//! contains at least the expected members, arrays must have the same length
//! and match element-wise, and numbers compare by value. An expected `null`
//! member means the member must be absent.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::app::{App, NodeId};
use crate::error::CoreResult;
use crate::synth::StackArtifact;

/// A synthesized template under test.
#[derive(Debug, Clone)]
pub struct Template {
    template: Value,
}

impl Template {
    pub fn from_json(template: Value) -> Self {
        Self { template }
    }

    pub fn from_artifact(artifact: &StackArtifact) -> Self {
        Self::from_json(artifact.template.clone())
    }

    pub fn from_stack(app: &App, stack: NodeId) -> CoreResult<Self> {
        Ok(Self::from_json(app.stack_template(stack)?))
    }

    pub fn to_json(&self) -> &Value {
        &self.template
    }

    fn resources_of_type(&self, resource_type: &str) -> Vec<(&String, &Value)> {
        self.template["Resources"]
            .as_object()
            .map(|resources| {
                resources
                    .iter()
                    .filter(|(_, r)| r["Type"] == resource_type)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resources of a type whose whole entry matches `expected`.
    pub fn find_resources(&self, resource_type: &str, expected: &Value) -> BTreeMap<String, Value> {
        self.resources_of_type(resource_type)
            .into_iter()
            .filter(|(_, r)| object_like(expected, r, "").is_ok())
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect()
    }

    pub fn resource_count_is(&self, resource_type: &str, count: usize) {
        let actual = self.resources_of_type(resource_type).len();
        assert_eq!(
            actual, count,
            "Expected {} resource(s) of type {} but found {}",
            count, resource_type, actual
        );
    }

    pub fn has_resource_properties(&self, resource_type: &str, expected: &Value) {
        let candidates = self.resources_of_type(resource_type);
        let empty = Value::Object(Default::default());
        let failures = self.match_candidates(&candidates, |r| {
            let properties = r.get("Properties").unwrap_or(&empty);
            object_like(expected, properties, "Properties")
        });
        if let Some(failures) = failures {
            panic!(
                "No {} matches the expected properties {}\n{}",
                resource_type, expected, failures
            );
        }
    }

    pub fn has_resource(&self, resource_type: &str, expected: &Value) {
        let candidates = self.resources_of_type(resource_type);
        let failures = self.match_candidates(&candidates, |r| object_like(expected, r, ""));
        if let Some(failures) = failures {
            panic!(
                "No {} matches the expected entry {}\n{}",
                resource_type, expected, failures
            );
        }
    }

    pub fn has_parameter(&self, name: &str, expected: &Value) {
        let actual = &self.template["Parameters"][name];
        if actual.is_null() {
            panic!("Template has no parameter named {}", name);
        }
        if let Err(failure) = object_like(expected, actual, name) {
            panic!("Parameter {} does not match: {}", name, failure);
        }
    }

    /// `None` when one candidate matched, otherwise a report per candidate.
    fn match_candidates<F>(&self, candidates: &[(&String, &Value)], check: F) -> Option<String>
    where
        F: Fn(&Value) -> Result<(), String>,
    {
        if candidates.is_empty() {
            return Some("  (no resources of this type)".to_string());
        }
        let mut report = String::new();
        for (id, resource) in candidates {
            match check(resource) {
                Ok(()) => return None,
                Err(failure) => report.push_str(&format!("  {}: {}\n", id, failure)),
            }
        }
        Some(report)
    }
}

fn object_like(expected: &Value, actual: &Value, path: &str) -> Result<(), String> {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => {
            for (key, exp_value) in exp {
                let child = format!("{}/{}", path, key);
                match (exp_value, act.get(key)) {
                    (Value::Null, None) => {}
                    (Value::Null, Some(found)) => {
                        return Err(format!("{}: expected absent, found {}", child, found))
                    }
                    (_, None) => return Err(format!("{}: missing", child)),
                    (_, Some(act_value)) => object_like(exp_value, act_value, &child)?,
                }
            }
            Ok(())
        }
        (Value::Array(exp), Value::Array(act)) => {
            if exp.len() != act.len() {
                return Err(format!(
                    "{}: expected {} element(s), found {}",
                    path,
                    exp.len(),
                    act.len()
                ));
            }
            for (index, (e, a)) in exp.iter().zip(act).enumerate() {
                object_like(e, a, &format!("{}[{}]", path, index))?;
            }
            Ok(())
        }
        (Value::Number(e), Value::Number(a)) => {
            if e.as_f64() == a.as_f64() {
                Ok(())
            } else {
                Err(format!("{}: expected {}, found {}", path, e, a))
            }
        }
        (e, a) if e == a => Ok(()),
        (e, a) => Err(format!("{}: expected {}, found {}", path, e, a)),
    }
}
