//! Property Binder (spec §4.3, component C3).
//!
//! Resolves a class's declared property schema against an instance's
//! entries in the config store, producing the concrete property values a
//! controller session is constructed with.

use std::collections::HashMap;

use crate::config_store::ConfigStore;
use crate::error::{PoolError, PoolResult};
use crate::property::{self, PropertyDescriptor, PropertySchema, PropertyType, PropertyValue};

/// A bound property value plus whether it came from the store or fell back
/// to the schema default (spec §4.3 step 2: "marks as *not-in-db*").
#[derive(Debug, Clone)]
pub struct BoundProperty {
    pub value: PropertyValue,
    pub in_db: bool,
}

/// The result of binding a full schema, in schema declaration order (spec
/// §4.3 step 5).
#[derive(Debug, Clone, Default)]
pub struct BoundProperties {
    /// Parallel to the schema's declaration order.
    pub ordered: Vec<(String, BoundProperty)>,
}

impl BoundProperties {
    pub fn get(&self, name: &str) -> Option<&BoundProperty> {
        self.ordered.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }
}

/// Bind every property in `schema` for `instance` against `store` (spec
/// §4.3 steps 1-5).
pub fn bind_properties(
    instance: &str,
    schema: &PropertySchema,
    store: &dyn ConfigStore,
) -> PoolResult<BoundProperties> {
    let mut ordered = Vec::with_capacity(schema.entries.len());
    for desc in &schema.entries {
        ordered.push((desc.name.clone(), bind_one(instance, desc, store)?));
    }
    Ok(BoundProperties { ordered })
}

fn bind_one(
    instance: &str,
    desc: &PropertyDescriptor,
    store: &dyn ConfigStore,
) -> PoolResult<BoundProperty> {
    let path = format!("{instance}/{}", desc.name);
    if let Some(raw) = store.get(&path) {
        let value = property::deserialize_value(&raw, desc.ty).ok_or_else(|| {
            PoolError::TypePropertyMismatch {
                instance: instance.to_string(),
                property: desc.name.clone(),
                expected: desc.ty.name(),
                actual: raw.clone(),
            }
        })?;
        return Ok(BoundProperty {
            value,
            in_db: true,
        });
    }
    match &desc.default {
        Some(value) => Ok(BoundProperty {
            value: value.clone(),
            in_db: false,
        }),
        None => Err(PoolError::MissingProperty {
            instance: instance.to_string(),
            property: desc.name.clone(),
        }),
    }
}

/// Write `overrides` into `store` before binding, so instance creation and a
/// later property edit share the same `bind_properties` code path (spec
/// §4.3: "`build_property_data` ... writes the overrides into the store
/// before reading").
pub fn build_property_data(
    instance: &str,
    schema: &PropertySchema,
    overrides: &HashMap<String, PropertyValue>,
    store: &mut dyn ConfigStore,
) -> PoolResult<BoundProperties> {
    for (name, value) in overrides {
        let desc = schema
            .get(name)
            .ok_or_else(|| PoolError::UnknownPropertyType(name.clone(), "override".to_string()))?;
        if std::mem::discriminant(&desc_type_sample(desc.ty)) != std::mem::discriminant(value) {
            return Err(PoolError::TypePropertyMismatch {
                instance: instance.to_string(),
                property: name.clone(),
                expected: desc.ty.name(),
                actual: format!("{value:?}"),
            });
        }
        let path = format!("{instance}/{name}");
        store.set(&path, property::serialize_value(value));
    }
    bind_properties(instance, schema, store)
}

/// A zero-valued sample of `ty`, used only to compare enum discriminants
/// against a caller-supplied override value.
fn desc_type_sample(ty: PropertyType) -> PropertyValue {
    match ty {
        PropertyType::Bool => PropertyValue::Bool(false),
        PropertyType::Int32 => PropertyValue::Int32(0),
        PropertyType::Float64 => PropertyValue::Float64(0.0),
        PropertyType::String => PropertyValue::String(String::new()),
        PropertyType::BoolArray => PropertyValue::BoolArray(Vec::new()),
        PropertyType::Int32Array => PropertyValue::Int32Array(Vec::new()),
        PropertyType::Float64Array => PropertyValue::Float64Array(Vec::new()),
        PropertyType::StringArray => PropertyValue::StringArray(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::InMemoryConfigStore;

    fn schema() -> PropertySchema {
        PropertySchema {
            entries: vec![
                PropertyDescriptor {
                    name: "MaxDevice".into(),
                    ty: PropertyType::Int32,
                    description: String::new(),
                    default: Some(PropertyValue::Int32(32)),
                },
                PropertyDescriptor {
                    name: "Host".into(),
                    ty: PropertyType::String,
                    description: String::new(),
                    default: None,
                },
            ],
        }
    }

    #[test]
    fn missing_property_without_default_fails() {
        let store = InMemoryConfigStore::new();
        let err = bind_properties("ctrl01", &schema(), &store).unwrap_err();
        assert!(matches!(err, PoolError::MissingProperty { .. }));
    }

    #[test]
    fn default_is_used_and_marked_not_in_db() {
        let mut store = InMemoryConfigStore::new();
        store.set_property("ctrl01", "Host", "localhost".into());
        let bound = bind_properties("ctrl01", &schema(), &store).unwrap();
        let max_device = bound.get("MaxDevice").unwrap();
        assert_eq!(max_device.value, PropertyValue::Int32(32));
        assert!(!max_device.in_db);
        assert!(bound.get("Host").unwrap().in_db);
    }

    #[test]
    fn build_property_data_writes_overrides_before_binding() {
        let mut store = InMemoryConfigStore::new();
        let mut overrides = HashMap::new();
        overrides.insert("Host".to_string(), PropertyValue::String("10.0.0.1".into()));
        let bound = build_property_data("ctrl01", &schema(), &overrides, &mut store).unwrap();
        assert_eq!(
            bound.get("Host").unwrap().value,
            PropertyValue::String("10.0.0.1".into())
        );
        assert_eq!(
            store.get_property("ctrl01", "Host").as_deref(),
            Some("10.0.0.1")
        );
    }
}
