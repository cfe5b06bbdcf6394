//! Read path: rebuilds typed instances from entity vertices.

use std::collections::BTreeMap;

use ahash::AHashSet;
use serde_json::Value;
use tracing::warn;

use crate::{
    backend::GraphBackend,
    constants::{edge_label, map_key_name, trait_label},
    errors::MetaGraphError,
    graph::{EdgeRecord, ElementId, VertexId},
    helper::{GraphHelper, parse_string_list},
    instance::{AttrValue, EntityState, PrimitiveValue, TypedInstance},
    types::{AttributeInfo, DataType, HierarchicalType, TypeCategory, TypeSystem},
};

/// Composite class references are expanded into full instances; every
/// other class reference becomes an [`AttrValue::Reference`].
pub struct GraphToTypedInstanceMapper<'a, B: GraphBackend> {
    graph: &'a B,
    helper: GraphHelper<'a, B>,
    types: &'a TypeSystem,
}

impl<'a, B: GraphBackend> GraphToTypedInstanceMapper<'a, B> {
    pub fn new(graph: &'a B, types: &'a TypeSystem) -> Self {
        Self {
            graph,
            helper: GraphHelper::new(graph),
            types,
        }
    }

    pub fn map_graph_to_typed_instance(
        &self,
        vertex: VertexId,
    ) -> Result<TypedInstance, MetaGraphError> {
        let mut expanding = AHashSet::new();
        self.map_entity(vertex, &mut expanding)
    }

    /// `expanding` holds the entities on the current expansion path; a
    /// composite edge back into it is returned as a reference.
    fn map_entity(
        &self,
        vertex: VertexId,
        expanding: &mut AHashSet<VertexId>,
    ) -> Result<TypedInstance, MetaGraphError> {
        let id = self.helper.id(vertex)?;
        let class = self.types.class(&id.type_name)?;
        let owner_deleted = id.state == EntityState::Deleted;
        expanding.insert(vertex);

        let mut instance = TypedInstance::with_id(id);
        self.map_fields(vertex, class, owner_deleted, &mut instance, expanding)?;
        for trait_name in self.helper.trait_names(vertex)? {
            let label = trait_label(&instance.type_name, &trait_name);
            let Some(edge) = self.helper.edge_for_label(vertex, &label)? else {
                continue;
            };
            let trait_type = self.types.trait_type(&trait_name)?;
            let trait_instance = self.map_inline(edge.in_vertex, trait_type, expanding)?;
            instance.traits.insert(trait_name, trait_instance);
        }

        expanding.remove(&vertex);
        Ok(instance)
    }

    fn map_inline(
        &self,
        vertex: VertexId,
        hierarchical: &HierarchicalType,
        expanding: &mut AHashSet<VertexId>,
    ) -> Result<TypedInstance, MetaGraphError> {
        let owner_deleted = self.helper.state(vertex.into())? == EntityState::Deleted;
        let mut instance = TypedInstance::structure(&hierarchical.name);
        self.map_fields(vertex, hierarchical, owner_deleted, &mut instance, expanding)?;
        Ok(instance)
    }

    fn map_fields(
        &self,
        vertex: VertexId,
        hierarchical: &HierarchicalType,
        owner_deleted: bool,
        instance: &mut TypedInstance,
        expanding: &mut AHashSet<VertexId>,
    ) -> Result<(), MetaGraphError> {
        for attribute in hierarchical.field_mapping().iter() {
            if let Some(value) = self.map_attribute(vertex, attribute, owner_deleted, expanding)? {
                instance.set(&attribute.name, value);
            }
        }
        Ok(())
    }

    fn map_attribute(
        &self,
        vertex: VertexId,
        attribute: &AttributeInfo,
        owner_deleted: bool,
        expanding: &mut AHashSet<VertexId>,
    ) -> Result<Option<AttrValue>, MetaGraphError> {
        let element = ElementId::from(vertex);
        let key = attribute.qualified_name();
        let element_type = attribute.data_type.element_type();
        match attribute.category() {
            TypeCategory::Primitive | TypeCategory::Enum => {
                match self.graph.property(element, &key)? {
                    Some(value) => Ok(Some(self.scalar_value(&attribute.data_type, &value)?)),
                    None => Ok(None),
                }
            }
            TypeCategory::Array => {
                let Some(raw) = self.graph.property(element, &key)? else {
                    return Ok(None);
                };
                if !element_type.is_reference() {
                    let Value::Array(items) = raw else {
                        return Err(MetaGraphError::query(format!(
                            "property {key} of vertex {vertex} is not a list"
                        )));
                    };
                    let values = items
                        .iter()
                        .map(|item| self.scalar_value(element_type, item))
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(Some(AttrValue::Array(values)));
                }
                let label = attribute.edge_label();
                let mut values = Vec::new();
                for entry in parse_string_list(Some(&raw)) {
                    let Some(edge) = self.helper.edge_by_id(vertex, &label, &entry)? else {
                        continue;
                    };
                    if !owner_deleted && !self.helper.is_active(edge.id.into())? {
                        continue;
                    }
                    values.push(self.map_reference(&edge, element_type, attribute, expanding)?);
                }
                Ok(Some(AttrValue::Array(values)))
            }
            TypeCategory::Map => {
                let Some(raw) = self.graph.property(element, &key)? else {
                    return Ok(None);
                };
                let mut entries = BTreeMap::new();
                for map_key in parse_string_list(Some(&raw)) {
                    let key_property = map_key_name(&key, &map_key);
                    let Some(stored) = self.graph.property(element, &key_property)? else {
                        continue;
                    };
                    if !element_type.is_reference() {
                        entries.insert(map_key, self.scalar_value(element_type, &stored)?);
                        continue;
                    }
                    let Some(edge_id) = stored.as_str() else {
                        continue;
                    };
                    let Some(edge) =
                        self.helper
                            .edge_by_id(vertex, &edge_label(&key_property), edge_id)?
                    else {
                        continue;
                    };
                    if !owner_deleted && !self.helper.is_active(edge.id.into())? {
                        continue;
                    }
                    entries.insert(
                        map_key,
                        self.map_reference(&edge, element_type, attribute, expanding)?,
                    );
                }
                Ok(Some(AttrValue::Map(entries)))
            }
            TypeCategory::Struct | TypeCategory::Class => {
                match self.helper.edge_for_label(vertex, &attribute.edge_label())? {
                    Some(edge) => Ok(Some(self.map_reference(
                        &edge,
                        &attribute.data_type,
                        attribute,
                        expanding,
                    )?)),
                    None => Ok(None),
                }
            }
            TypeCategory::Trait => Err(MetaGraphError::unsupported(format!(
                "trait-typed attribute {key}"
            ))),
        }
    }

    fn map_reference(
        &self,
        edge: &EdgeRecord,
        element_type: &DataType,
        attribute: &AttributeInfo,
        expanding: &mut AHashSet<VertexId>,
    ) -> Result<AttrValue, MetaGraphError> {
        match element_type {
            DataType::Struct(name) => {
                let struct_type = self.types.struct_type(name)?;
                Ok(AttrValue::Struct(self.map_inline(
                    edge.in_vertex,
                    struct_type,
                    expanding,
                )?))
            }
            DataType::Class(_) => {
                let target = edge.in_vertex;
                if !attribute.is_composite() {
                    return Ok(AttrValue::Reference(self.helper.id(target)?));
                }
                if expanding.contains(&target) {
                    warn!(
                        vertex = target.0,
                        attribute = %attribute.qualified_name(),
                        "composite reference cycle, returning a reference"
                    );
                    return Ok(AttrValue::Reference(self.helper.id(target)?));
                }
                Ok(AttrValue::Entity(self.map_entity(target, expanding)?))
            }
            other => Err(MetaGraphError::unsupported(format!(
                "loading {} values of {}",
                other.type_name(),
                attribute.qualified_name()
            ))),
        }
    }

    fn scalar_value(&self, data_type: &DataType, value: &Value) -> Result<AttrValue, MetaGraphError> {
        match data_type {
            DataType::Primitive(kind) => {
                Ok(AttrValue::Primitive(PrimitiveValue::from_json(*kind, value)?))
            }
            DataType::Enum(name) => {
                let text = value.as_str().ok_or_else(|| {
                    MetaGraphError::query(format!("enum {name} stored as {value}"))
                })?;
                let enum_value = self.types.enum_type(name)?.value_of(text).ok_or_else(|| {
                    MetaGraphError::query(format!("{text} is not a value of enum {name}"))
                })?;
                Ok(AttrValue::Enum(enum_value.clone()))
            }
            other => Err(MetaGraphError::unsupported(format!(
                "{} is not a scalar type",
                other.type_name()
            ))),
        }
    }
}
