//! Text aggregation for the searchable `entityText` property.

use crate::instance::{AttrValue, TypedInstance};

/// Builds the aggregate searchable text of one entity.
pub trait FullTextMapper {
    fn map_recursive(&self, instance: &TypedInstance) -> String;
}

/// Space-separated type names, attribute names and values. Inline
/// entities, structs and traits are included; plain references are not.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFullTextMapper;

impl FullTextMapper for DefaultFullTextMapper {
    fn map_recursive(&self, instance: &TypedInstance) -> String {
        let mut tokens = Vec::new();
        collect_instance(instance, &mut tokens);
        tokens.join(" ")
    }
}

fn collect_instance(instance: &TypedInstance, tokens: &mut Vec<String>) {
    tokens.push(instance.type_name.clone());
    for (name, value) in &instance.values {
        tokens.push(name.clone());
        collect_value(value, tokens);
    }
    for trait_instance in instance.traits.values() {
        collect_instance(trait_instance, tokens);
    }
}

fn collect_value(value: &AttrValue, tokens: &mut Vec<String>) {
    match value {
        AttrValue::Primitive(primitive) => tokens.push(primitive.to_string()),
        AttrValue::Enum(value) => tokens.push(value.value.clone()),
        AttrValue::Array(items) => {
            for item in items {
                collect_value(item, tokens);
            }
        }
        AttrValue::Map(entries) => {
            for (key, item) in entries {
                tokens.push(key.clone());
                collect_value(item, tokens);
            }
        }
        AttrValue::Struct(instance) | AttrValue::Entity(instance) => {
            collect_instance(instance, tokens)
        }
        AttrValue::Reference(_) => {}
    }
}
