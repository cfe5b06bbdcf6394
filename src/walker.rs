//! Enumerates the class instances reachable from a set of roots.

use std::collections::VecDeque;

use ahash::AHashSet;

use crate::{
    errors::MetaGraphError,
    instance::{AttrValue, Guid, TypedInstance},
};

/// Breadth-first walk over inline values. Entities are returned once each,
/// in discovery order; when the same identity appears more than once the
/// first occurrence is the one returned and walked. Structs and traits are
/// walked through but not returned. [`AttrValue::Reference`] is not followed.
pub fn discover_class_instances(
    roots: &[TypedInstance],
) -> Result<Vec<&TypedInstance>, MetaGraphError> {
    let mut seen: AHashSet<&Guid> = AHashSet::new();
    let mut queue: VecDeque<&TypedInstance> = VecDeque::new();
    let mut discovered = Vec::new();

    for root in roots {
        if root.id.is_none() {
            return Err(MetaGraphError::invalid_input(format!(
                "root instance of {} has no identity",
                root.type_name
            )));
        }
        queue.push_back(root);
    }

    while let Some(instance) = queue.pop_front() {
        if let Some(id) = &instance.id {
            if !seen.insert(&id.guid) {
                continue;
            }
            discovered.push(instance);
        }
        visit_instance(instance, &mut queue);
    }
    Ok(discovered)
}

fn visit_instance<'a>(instance: &'a TypedInstance, queue: &mut VecDeque<&'a TypedInstance>) {
    for value in instance.values.values() {
        visit_value(value, queue);
    }
    for trait_instance in instance.traits.values() {
        visit_instance(trait_instance, queue);
    }
}

fn visit_value<'a>(value: &'a AttrValue, queue: &mut VecDeque<&'a TypedInstance>) {
    match value {
        AttrValue::Entity(entity) => queue.push_back(entity),
        AttrValue::Struct(structure) => visit_instance(structure, queue),
        AttrValue::Array(elements) => {
            for element in elements {
                visit_value(element, queue);
            }
        }
        AttrValue::Map(entries) => {
            for element in entries.values() {
                visit_value(element, queue);
            }
        }
        AttrValue::Primitive(_) | AttrValue::Enum(_) | AttrValue::Reference(_) => {}
    }
}
