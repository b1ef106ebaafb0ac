//! KDL values to configuration inputs

use crate::error::{FlowError, Result};
use infraflow_cloud::{Input, OutputRef};
use kdl::{KdlEntry, KdlValue};
use serde_json::Value;

/// Convert one argument, honoring `(ref)` and `(env)` annotations
pub(super) fn entry_to_input(resource: &str, entry: &KdlEntry) -> Result<Input> {
    let value = entry.value();
    match entry.ty().map(|t| t.value()) {
        None => Ok(Input::Value(to_json(value))),
        Some("ref") => {
            let raw = value.as_string().ok_or_else(|| {
                FlowError::InvalidConfig(format!(
                    "resource '{}': (ref) expects a string like \"producer.output\"",
                    resource
                ))
            })?;
            OutputRef::parse(raw).map(Input::Output).ok_or_else(|| {
                FlowError::InvalidConfig(format!(
                    "resource '{}': invalid reference '{}', expected \"producer.output\"",
                    resource, raw
                ))
            })
        }
        Some("env") => {
            let name = value.as_string().ok_or_else(|| {
                FlowError::InvalidConfig(format!(
                    "resource '{}': (env) expects a variable name",
                    resource
                ))
            })?;
            std::env::var(name)
                .map(|v| Input::Value(Value::String(v)))
                .map_err(|_| FlowError::MissingEnv {
                    resource: resource.to_string(),
                    name: name.to_string(),
                })
        }
        Some(other) => Err(FlowError::InvalidConfig(format!(
            "resource '{}': unknown type annotation '({})'",
            resource, other
        ))),
    }
}

fn to_json(value: &KdlValue) -> Value {
    if let Some(s) = value.as_string() {
        Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(i.to_string()))
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if let Some(b) = value.as_bool() {
        Value::Bool(b)
    } else {
        Value::Null
    }
}
