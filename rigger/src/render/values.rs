//! Configuration value merging

use serde_yaml::{Mapping, Value};

use crate::errors::RiggerError;
use crate::models::manifest::REPLICA_COUNT_PROPERTY;
use crate::models::package::{ConfigValues, Package};

/// Parse raw YAML values. Blank or comment-only text is an empty map.
pub fn parse(raw: &str) -> Result<Mapping, RiggerError> {
    if raw.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(raw)? {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(RiggerError::Validation(format!(
            "Was expecting config values to be a map, got [{}]",
            raw.trim()
        ))),
    }
}

/// Deep merge `overrides` onto `base`. Maps merge recursively, lists are
/// concatenated without duplicates and anything else is replaced.
pub fn merge(base: &mut Mapping, overrides: &Mapping) {
    for (key, value) in overrides {
        let merged = match (base.get_mut(key), value) {
            (Some(Value::Mapping(existing)), Value::Mapping(nested)) => {
                merge(existing, nested);
                true
            }
            (Some(Value::Sequence(existing)), Value::Sequence(items)) => {
                for item in items {
                    if !existing.contains(item) {
                        existing.push(item.clone());
                    }
                }
                true
            }
            _ => false,
        };
        if !merged {
            base.insert(key.clone(), value.clone());
        }
    }
}

/// Merge a package's default values with caller supplied values, descending
/// into dependent packages by name.
pub fn merge_config_values(pkg: &Package, values: &ConfigValues) -> Result<Value, RiggerError> {
    let overrides = parse(&values.raw)?;
    let merged = merge_override_map(pkg, overrides)?;
    Ok(Value::Mapping(merge_dependencies(pkg, merged)?))
}

fn merge_override_map(pkg: &Package, overrides: Mapping) -> Result<Mapping, RiggerError> {
    let mut package_values = parse(&pkg.config_values.raw)?;
    if package_values.is_empty() {
        return Ok(overrides);
    }
    // Dependency sections are merged separately.
    for dependency in &pkg.dependencies {
        package_values.remove(dependency.name());
    }
    merge(&mut package_values, &overrides);
    Ok(package_values)
}

fn merge_dependencies(pkg: &Package, overrides: Mapping) -> Result<Mapping, RiggerError> {
    if pkg.dependencies.is_empty() {
        return Ok(overrides);
    }
    let package_values = parse(&pkg.config_values.raw)?;
    let mut merged = Mapping::new();

    // Top-level scalars only apply to keys the composite package declares.
    for (key, value) in &overrides {
        if !value.is_mapping() && package_values.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }

    for dependency in &pkg.dependencies {
        let mut dependency_values = match package_values.get(dependency.name()) {
            Some(Value::Mapping(mapping)) => mapping.clone(),
            _ => Mapping::new(),
        };
        if let Some(Value::Mapping(nested)) = overrides.get(dependency.name()) {
            merge(&mut dependency_values, nested);
        }
        merged.insert(
            Value::String(dependency.name().to_string()),
            Value::Mapping(merge_override_map(dependency, dependency_values)?),
        );
    }
    Ok(merged)
}

/// Carry the previous release's values forward under the new ones.
pub fn merge_previous(
    previous: &ConfigValues,
    replacing: &ConfigValues,
) -> Result<ConfigValues, RiggerError> {
    let mut base = parse(&previous.raw)?;
    if base.is_empty() {
        return Ok(replacing.clone());
    }
    merge(&mut base, &parse(&replacing.raw)?);
    Ok(ConfigValues::new(serde_yaml::to_string(&Value::Mapping(base))?))
}

/// Pin the instance count of one application in a value model. Composite
/// packages keep each application's values under its own name.
pub fn set_replica_count(model: &mut Value, app_name: Option<&str>, count: usize) {
    let mut target = model;
    if let Some(app_name) = app_name {
        target = child(target, app_name);
    }
    target = child(target, "spec");
    target = child(target, "deploymentProperties");
    if !target.is_mapping() {
        *target = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(properties) = target {
        properties.insert(
            Value::String(REPLICA_COUNT_PROPERTY.to_string()),
            Value::String(count.to_string()),
        );
    }
}

fn child<'a>(value: &'a mut Value, key: &str) -> &'a mut Value {
    if !value.is_mapping() {
        *value = Value::Mapping(Mapping::new());
    }
    match value {
        Value::Mapping(mapping) => mapping
            .entry(Value::String(key.to_string()))
            .or_insert_with(|| Value::Mapping(Mapping::new())),
        other => other,
    }
}
