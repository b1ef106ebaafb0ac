//! `resource` node parsing

use super::value::entry_to_input;
use crate::error::{FlowError, Result};
use infraflow_cloud::{Config, Input, ResourceDescriptor};
use kdl::KdlNode;
use std::collections::BTreeMap;
use std::time::Duration;

/// Parse `resource "<id>" kind="..." [parent="..."] [timeout=<secs>] { ... }`
pub fn parse_resource(node: &KdlNode) -> Result<ResourceDescriptor> {
    let id = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| FlowError::InvalidConfig("resource requires an id".to_string()))?
        .to_string();

    if id.contains('.') {
        return Err(FlowError::InvalidConfig(format!(
            "resource id '{}' must not contain '.'",
            id
        )));
    }

    let kind = node
        .get("kind")
        .and_then(|v| v.as_string())
        .ok_or_else(|| FlowError::InvalidConfig(format!("resource '{}' requires kind=", id)))?;

    let mut descriptor = ResourceDescriptor::new(&id, kind);

    if let Some(parent) = node.get("parent").and_then(|v| v.as_string()) {
        descriptor = descriptor.with_parent(parent);
    }

    if let Some(timeout) = node.get("timeout") {
        let secs = timeout
            .as_integer()
            .and_then(|s| u64::try_from(s).ok())
            .filter(|s| *s > 0)
            .ok_or_else(|| {
                FlowError::InvalidConfig(format!(
                    "resource '{}': timeout must be a positive number of seconds",
                    id
                ))
            })?;
        descriptor = descriptor.with_timeout(Duration::from_secs(secs));
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "export" => {
                    let name = child
                        .entries()
                        .first()
                        .filter(|e| e.name().is_none())
                        .and_then(|e| e.value().as_string())
                        .ok_or_else(|| {
                            FlowError::InvalidConfig(format!(
                                "resource '{}': export requires a name",
                                id
                            ))
                        })?;
                    let output = child
                        .get("output")
                        .and_then(|v| v.as_string())
                        .unwrap_or(name);
                    descriptor = descriptor.with_export(name, output);
                }
                "depends-on" | "depends_on" => {
                    for entry in child.entries() {
                        let dep = entry.value().as_string().ok_or_else(|| {
                            FlowError::InvalidConfig(format!(
                                "resource '{}': depends-on takes resource ids",
                                id
                            ))
                        })?;
                        descriptor = descriptor.with_dependency(dep);
                    }
                }
                key => {
                    if descriptor.config.contains_key(key) {
                        return Err(FlowError::InvalidConfig(format!(
                            "resource '{}': setting '{}' is declared twice",
                            id, key
                        )));
                    }
                    let input = parse_setting(&id, child)?;
                    descriptor = descriptor.with_input(key, input);
                }
            }
        }
    }

    Ok(descriptor)
}

/// One setting: arguments become a scalar or list, a children block or
/// properties become a map. A block made only of `-` children is a list,
/// so single-element lists can be written.
fn parse_setting(resource: &str, node: &KdlNode) -> Result<Input> {
    let name = node.name().value();
    let args: Vec<_> = node.entries().iter().filter(|e| e.name().is_none()).collect();
    let props: Vec<_> = node.entries().iter().filter(|e| e.name().is_some()).collect();

    if let Some(children) = node.children() {
        if !node.entries().is_empty() {
            return Err(FlowError::InvalidConfig(format!(
                "resource '{}': '{}' mixes values with a block",
                resource, name
            )));
        }
        if !children.nodes().is_empty()
            && children.nodes().iter().all(|c| c.name().value() == "-")
        {
            return children
                .nodes()
                .iter()
                .map(|c| parse_setting(resource, c))
                .collect::<Result<Vec<_>>>()
                .map(Input::List);
        }

        let mut map = Config::new();
        for child in children.nodes() {
            let key = child.name().value().to_string();
            if map.contains_key(&key) {
                return Err(FlowError::InvalidConfig(format!(
                    "resource '{}': '{}.{}' is declared twice",
                    resource, name, key
                )));
            }
            map.insert(key, parse_setting(resource, child)?);
        }
        return Ok(Input::Map(map));
    }

    match (args.as_slice(), props.is_empty()) {
        ([], true) => Err(FlowError::InvalidConfig(format!(
            "resource '{}': '{}' has no value",
            resource, name
        ))),
        ([], false) => {
            let map: BTreeMap<String, Input> = props
                .iter()
                .filter_map(|e| {
                    e.name()
                        .map(|k| (k.value().to_string(), entry_to_input(resource, e)))
                })
                .map(|(k, v)| v.map(|v| (k, v)))
                .collect::<Result<_>>()?;
            Ok(Input::Map(map))
        }
        ([single], true) => entry_to_input(resource, single),
        (many, true) => many
            .iter()
            .map(|e| entry_to_input(resource, e))
            .collect::<Result<Vec<_>>>()
            .map(Input::List),
        (_, false) => Err(FlowError::InvalidConfig(format!(
            "resource '{}': '{}' mixes values with properties",
            resource, name
        ))),
    }
}
