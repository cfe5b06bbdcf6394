//! Write path: persists a batch of typed instances.
//!
//! A discovery pass first resolves every reachable entity to a vertex
//! (existing by GUID or unique attribute, otherwise newly created), then a
//! mapping pass writes attributes. References superseded by the new values
//! are removed through the [`DeleteHandler`].

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info};

use super::{
    from_graph::GraphToTypedInstanceMapper,
    identity::{DiscoveredVertex, Discovery, IdentityMap},
};
use crate::{
    backend::GraphBackend,
    config::DeletePolicy,
    constants::{ENTITY_TEXT_PROPERTY_KEY, edge_label, map_key_name, trait_label},
    delete::{DeleteContext, DeleteHandler},
    diff::{diff_array, diff_map, merge_retained},
    errors::MetaGraphError,
    fulltext::FullTextMapper,
    graph::{EdgeId, EdgeRecord, ElementId, VertexId},
    helper::GraphHelper,
    instance::{AttrValue, EntityState, Guid, Id, PrimitiveValue, TypedInstance},
    request::RequestContext,
    types::{AttributeInfo, DataType, PrimitiveType, TypeCategory, TypeSystem},
    walker::discover_class_instances,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    /// Attributes absent from the instance are left untouched.
    UpdatePartial,
    /// Attributes absent from the instance are cleared.
    UpdateFull,
}

pub struct TypedInstanceToGraphMapper<'a, B: GraphBackend> {
    graph: &'a B,
    helper: GraphHelper<'a, B>,
    types: &'a TypeSystem,
    delete_handler: DeleteHandler<'a, B>,
    full_text: Option<&'a dyn FullTextMapper>,
    identities: IdentityMap,
}

impl<'a, B: GraphBackend> TypedInstanceToGraphMapper<'a, B> {
    pub fn new(graph: &'a B, types: &'a TypeSystem, policy: DeletePolicy) -> Self {
        Self {
            graph,
            helper: GraphHelper::new(graph),
            types,
            delete_handler: DeleteHandler::new(graph, types, policy),
            full_text: None,
            identities: IdentityMap::new(),
        }
    }

    /// Maintain `entityText` on every created or updated entity.
    pub fn with_full_text(mut self, mapper: &'a dyn FullTextMapper) -> Self {
        self.full_text = Some(mapper);
        self
    }

    /// Persists `instances` and everything reachable from them. Returns the
    /// GUID of every root, in input order.
    pub fn map_typed_instances(
        &mut self,
        request: &mut RequestContext,
        instances: &[TypedInstance],
        operation: Operation,
    ) -> Result<Vec<String>, MetaGraphError> {
        self.map_batch(request, instances, operation)
            .map_err(|err| match err {
                MetaGraphError::ConstraintViolation(msg) => MetaGraphError::already_exists(msg),
                other => other,
            })
    }

    /// Attaches a trait instance to an entity vertex.
    pub fn map_trait_instance_to_vertex(
        &mut self,
        request: &mut RequestContext,
        trait_instance: &TypedInstance,
        entity_vertex: VertexId,
        entity_type: &str,
    ) -> Result<(), MetaGraphError> {
        let types = self.types;
        let helper = self.helper;
        let now = request.request_time();
        let trait_type = types.trait_type(&trait_instance.type_name)?;
        let trait_vertex = helper.create_vertex_without_identity(trait_type, now)?;
        self.map_instance(request, trait_instance, trait_vertex, Operation::Create)?;
        helper.add_edge(
            entity_vertex,
            trait_vertex,
            &trait_label(entity_type, &trait_instance.type_name),
            now,
        )?;
        Ok(())
    }

    /// Recomputes `entityText` of an entity. No-op without a full-text
    /// mapper or when the entity is deleted.
    pub fn write_full_text(&self, vertex: VertexId) -> Result<(), MetaGraphError> {
        let Some(full_text) = self.full_text else {
            return Ok(());
        };
        if !self.helper.is_active(vertex.into())? {
            return Ok(());
        }
        let instance =
            GraphToTypedInstanceMapper::new(self.graph, self.types).map_graph_to_typed_instance(vertex)?;
        self.graph.set_property(
            vertex.into(),
            ENTITY_TEXT_PROPERTY_KEY,
            &Value::String(full_text.map_recursive(&instance)),
        )
    }

    fn map_batch(
        &mut self,
        request: &mut RequestContext,
        instances: &[TypedInstance],
        operation: Operation,
    ) -> Result<Vec<String>, MetaGraphError> {
        let discovered = discover_class_instances(instances)?;
        for instance in &discovered {
            self.discover(request, instance)?;
        }
        info!(
            instances = discovered.len(),
            ?operation,
            "discovered instances"
        );

        let helper = self.helper;
        let now = request.request_time();
        let mut mapped = Vec::new();
        for instance in &discovered {
            let entry = self.discovered(instance)?.clone();
            match (entry.discovery, operation) {
                (Discovery::Created, _) => {
                    self.map_instance(request, instance, entry.vertex, Operation::Create)?;
                    for trait_instance in instance.traits.values() {
                        self.map_trait_instance_to_vertex(
                            request,
                            trait_instance,
                            entry.vertex,
                            &instance.type_name,
                        )?;
                    }
                    mapped.push(entry.vertex);
                }
                (Discovery::Existing, Operation::Create) => {}
                (Discovery::Existing, _) => {
                    if helper.state(entry.vertex.into())? == EntityState::Deleted {
                        return Err(MetaGraphError::invalid_input(format!(
                            "entity {} is deleted",
                            entry.guid
                        )));
                    }
                    self.map_instance(request, instance, entry.vertex, operation)?;
                    helper.set_version(entry.vertex, helper.version(entry.vertex)? + 1)?;
                    helper.touch(entry.vertex.into(), now)?;
                    request.record_updated(&entry.guid);
                    mapped.push(entry.vertex);
                }
            }
        }

        for vertex in mapped {
            self.write_full_text(vertex)?;
        }

        instances
            .iter()
            .map(|root| Ok(self.discovered(root)?.guid.clone()))
            .collect()
    }

    fn discovered(&self, instance: &TypedInstance) -> Result<&DiscoveredVertex, MetaGraphError> {
        instance
            .id
            .as_ref()
            .and_then(|id| self.identities.lookup(&id.guid))
            .ok_or_else(|| {
                MetaGraphError::illegal_state(format!(
                    "instance of {} was not discovered",
                    instance.type_name
                ))
            })
    }

    fn discover(
        &mut self,
        request: &mut RequestContext,
        instance: &TypedInstance,
    ) -> Result<(), MetaGraphError> {
        let id = instance.id.as_ref().ok_or_else(|| {
            MetaGraphError::invalid_input(format!("entity of {} has no id", instance.type_name))
        })?;
        if self.identities.slot(&id.guid).is_some() {
            return Ok(());
        }
        let types = self.types;
        let helper = self.helper;
        let class = types.class(&instance.type_name)?;

        let entry = match &id.guid {
            Guid::Assigned(guid) => {
                let vertex = helper.vertex_for_guid(guid)?;
                let stored_type = helper.type_name(vertex)?;
                if stored_type != instance.type_name {
                    return Err(MetaGraphError::invalid_input(format!(
                        "entity {guid} is a {stored_type}, not a {}",
                        instance.type_name
                    )));
                }
                DiscoveredVertex {
                    vertex,
                    guid: guid.clone(),
                    discovery: Discovery::Existing,
                }
            }
            Guid::Transient(_) => match helper.vertex_for_unique_attributes(class, instance)? {
                Some(vertex) => {
                    let guid = helper.guid(vertex)?.ok_or_else(|| {
                        MetaGraphError::not_found(format!("guid of vertex {vertex}"))
                    })?;
                    DiscoveredVertex {
                        vertex,
                        guid,
                        discovery: Discovery::Existing,
                    }
                }
                None => {
                    let trait_names: Vec<String> = instance
                        .traits
                        .values()
                        .map(|t| t.type_name.clone())
                        .collect();
                    let (vertex, guid) = helper.create_vertex_with_identity(
                        class,
                        &trait_names,
                        request.request_time(),
                    )?;
                    request.record_created(&guid);
                    // unique values go in first so later instances of this
                    // batch can resolve to the new vertex
                    for attribute in class.field_mapping().unique_attributes() {
                        if matches!(
                            attribute.category(),
                            TypeCategory::Primitive | TypeCategory::Enum
                        ) {
                            if let Some(value) = instance.get(&attribute.name) {
                                self.map_attribute(
                                    request,
                                    vertex,
                                    attribute,
                                    Some(value),
                                    Operation::Create,
                                )?;
                            }
                        }
                    }
                    DiscoveredVertex {
                        vertex,
                        guid,
                        discovery: Discovery::Created,
                    }
                }
            },
        };
        debug!(guid = %entry.guid, vertex = entry.vertex.0, discovery = ?entry.discovery, "discovered entity");
        self.identities.insert(id.guid.clone(), entry.clone());
        if !id.is_assigned() {
            self.identities
                .insert(Guid::Assigned(entry.guid.clone()), entry);
        }
        Ok(())
    }

    fn map_instance(
        &mut self,
        request: &mut RequestContext,
        instance: &TypedInstance,
        vertex: VertexId,
        operation: Operation,
    ) -> Result<(), MetaGraphError> {
        let types = self.types;
        let hierarchical = types.hierarchical(&instance.type_name)?;
        let fields = hierarchical.field_mapping();
        if let Some(unknown) = instance.values.keys().find(|name| fields.get(name).is_none()) {
            return Err(MetaGraphError::invalid_input(format!(
                "{} has no attribute {unknown}",
                instance.type_name
            )));
        }
        for attribute in fields.iter() {
            let value = instance.get(&attribute.name);
            if value.is_none() && operation == Operation::UpdatePartial {
                continue;
            }
            check_multiplicity(attribute, value)?;
            if value.is_none() && operation != Operation::UpdateFull {
                continue;
            }
            self.map_attribute(request, vertex, attribute, value, operation)?;
        }
        Ok(())
    }

    fn map_attribute(
        &mut self,
        request: &mut RequestContext,
        vertex: VertexId,
        attribute: &AttributeInfo,
        value: Option<&AttrValue>,
        operation: Operation,
    ) -> Result<(), MetaGraphError> {
        let element = ElementId::from(vertex);
        let key = attribute.qualified_name();
        match attribute.category() {
            TypeCategory::Primitive | TypeCategory::Enum => match value {
                Some(value) => {
                    let stored = self.scalar_json(attribute, &attribute.data_type, value)?;
                    self.graph.set_property(element, &key, &stored)
                }
                None => self.graph.remove_property(element, &key),
            },
            TypeCategory::Array => self.map_array(request, vertex, attribute, value, operation),
            TypeCategory::Map => self.map_map(request, vertex, attribute, value, operation),
            TypeCategory::Struct | TypeCategory::Class => {
                let label = attribute.edge_label();
                let current = self.helper.active_edges(vertex, &label)?.into_iter().next();
                let new_edge = match value {
                    Some(value) => Some(self.add_or_update_reference(
                        request,
                        vertex,
                        attribute,
                        &attribute.data_type,
                        value,
                        current.as_ref(),
                        &label,
                        operation,
                    )?),
                    None => None,
                };
                if let Some(current) = current {
                    if new_edge != Some(current.id) {
                        self.remove_unused_entries(request, attribute, &[current])?;
                    }
                }
                Ok(())
            }
            TypeCategory::Trait => Err(MetaGraphError::unsupported(format!(
                "trait-typed attribute {key}"
            ))),
        }
    }

    /// Positional mapping: the element at position `i` reuses the active
    /// edge previously at `i` when it points at the same target.
    fn map_array(
        &mut self,
        request: &mut RequestContext,
        vertex: VertexId,
        attribute: &AttributeInfo,
        value: Option<&AttrValue>,
        operation: Operation,
    ) -> Result<(), MetaGraphError> {
        let element = ElementId::from(vertex);
        let key = attribute.qualified_name();
        let items: &[AttrValue] = match value {
            None => &[],
            Some(AttrValue::Array(items)) => items,
            Some(other) => return Err(mismatch(attribute, other)),
        };
        let element_type = attribute.data_type.element_type();

        if !element_type.is_reference() {
            if items.is_empty() {
                return self.graph.remove_property(element, &key);
            }
            let stored = items
                .iter()
                .map(|item| self.scalar_json(attribute, element_type, item))
                .collect::<Result<Vec<_>, _>>()?;
            return self.graph.set_property(element, &key, &Value::Array(stored));
        }

        let helper = self.helper;
        let label = attribute.edge_label();
        let current_entries = helper.string_list(element, &key)?;
        let mut current_active = Vec::new();
        for entry in &current_entries {
            if let Some(edge) = helper.edge_by_id(vertex, &label, entry)? {
                if helper.is_active(edge.id.into())? {
                    current_active.push(edge);
                }
            }
        }

        let mut new_entries = Vec::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            let edge = self.add_or_update_reference(
                request,
                vertex,
                attribute,
                element_type,
                item,
                current_active.get(position),
                &label,
                operation,
            )?;
            new_entries.push(edge.to_string());
        }

        let diff = diff_array(&current_entries, &new_entries);
        let mut removed_edges = Vec::new();
        for entry in &diff.removed {
            if let Some(edge) = helper.edge_by_id(vertex, &label, entry)? {
                removed_edges.push(edge);
            }
        }
        let retained: Vec<String> = self
            .remove_unused_entries(request, attribute, &removed_edges)?
            .into_iter()
            .map(|edge| edge.id.to_string())
            .collect();
        if !retained.is_empty() {
            debug!(attribute = %key, retained = retained.len(), "retaining deleted entries");
        }
        helper.set_string_list(element, &key, &merge_retained(&new_entries, &retained))
    }

    /// Keyed mapping: every key holds its entry in `<attr>.<key>`; the key
    /// list itself is stored under the attribute's qualified name.
    fn map_map(
        &mut self,
        request: &mut RequestContext,
        vertex: VertexId,
        attribute: &AttributeInfo,
        value: Option<&AttrValue>,
        operation: Operation,
    ) -> Result<(), MetaGraphError> {
        let element = ElementId::from(vertex);
        let key = attribute.qualified_name();
        let empty = BTreeMap::new();
        let new_map = match value {
            None => &empty,
            Some(AttrValue::Map(entries)) => entries,
            Some(other) => return Err(mismatch(attribute, other)),
        };
        let element_type = attribute.data_type.element_type();
        let helper = self.helper;

        let mut current: BTreeMap<String, String> = BTreeMap::new();
        for map_key in helper.string_list(element, &key)? {
            if let Some(stored) = self.graph.property(element, &map_key_name(&key, &map_key))? {
                current.insert(map_key, entry_text(&stored));
            }
        }

        let mut new_entries: BTreeMap<String, String> = BTreeMap::new();
        for (map_key, item) in new_map {
            let key_property = map_key_name(&key, map_key);
            let stored = if element_type.is_reference() {
                let label = edge_label(&key_property);
                let current_edge = match current.get(map_key) {
                    Some(edge_id) => match helper.edge_by_id(vertex, &label, edge_id)? {
                        Some(edge) if helper.is_active(edge.id.into())? => Some(edge),
                        _ => None,
                    },
                    None => None,
                };
                let edge = self.add_or_update_reference(
                    request,
                    vertex,
                    attribute,
                    element_type,
                    item,
                    current_edge.as_ref(),
                    &label,
                    operation,
                )?;
                Value::String(edge.to_string())
            } else {
                self.scalar_json(attribute, element_type, item)?
            };
            self.graph.set_property(element, &key_property, &stored)?;
            new_entries.insert(map_key.clone(), entry_text(&stored));
        }

        let diff = diff_map(&current, &new_entries);
        let mut retained_keys = Vec::new();
        if element_type.is_reference() {
            let mut removed_edges = Vec::new();
            for (map_key, edge_id) in &diff.removed {
                let label = edge_label(&map_key_name(&key, map_key));
                if let Some(edge) = helper.edge_by_id(vertex, &label, edge_id)? {
                    removed_edges.push((map_key.clone(), edge));
                }
            }
            let edges: Vec<EdgeRecord> = removed_edges.iter().map(|(_, e)| e.clone()).collect();
            let retained = self.remove_unused_entries(request, attribute, &edges)?;
            for (map_key, edge) in &removed_edges {
                if !new_entries.contains_key(map_key) && retained.iter().any(|r| r.id == edge.id) {
                    retained_keys.push(map_key.clone());
                }
            }
        }
        for (map_key, _) in &diff.removed {
            if !new_entries.contains_key(map_key) && !retained_keys.contains(map_key) {
                self.graph
                    .remove_property(element, &map_key_name(&key, map_key))?;
            }
        }

        let new_keys: Vec<String> = new_entries.keys().cloned().collect();
        helper.set_string_list(element, &key, &merge_retained(&new_keys, &retained_keys))
    }

    /// Returns the edge that now carries the reference.
    #[allow(clippy::too_many_arguments)]
    fn add_or_update_reference(
        &mut self,
        request: &mut RequestContext,
        vertex: VertexId,
        attribute: &AttributeInfo,
        element_type: &DataType,
        value: &AttrValue,
        current: Option<&EdgeRecord>,
        label: &str,
        operation: Operation,
    ) -> Result<EdgeId, MetaGraphError> {
        let types = self.types;
        let helper = self.helper;
        let now = request.request_time();
        match element_type {
            DataType::Struct(struct_name) => {
                let AttrValue::Struct(structure) = value else {
                    return Err(mismatch(attribute, value));
                };
                if structure.type_name != *struct_name {
                    return Err(MetaGraphError::invalid_input(format!(
                        "{} expects a {struct_name}, got a {}",
                        attribute.qualified_name(),
                        structure.type_name
                    )));
                }
                match current {
                    Some(edge) => {
                        self.map_instance(request, structure, edge.in_vertex, operation)?;
                        helper.touch(edge.in_vertex.into(), now)?;
                        Ok(edge.id)
                    }
                    None => {
                        let struct_type = types.struct_type(struct_name)?;
                        let struct_vertex = helper.create_vertex_without_identity(struct_type, now)?;
                        self.map_instance(request, structure, struct_vertex, Operation::Create)?;
                        helper.add_edge(vertex, struct_vertex, label, now)
                    }
                }
            }
            DataType::Class(_) => {
                let id = value.class_id().ok_or_else(|| mismatch(attribute, value))?;
                let target = self.resolve_vertex(id)?;
                if let Some(edge) = current {
                    if edge.in_vertex == target {
                        return Ok(edge.id);
                    }
                }
                helper.get_or_create_edge(vertex, target, label, now)
            }
            other => Err(MetaGraphError::unsupported(format!(
                "{} values in {}",
                other.type_name(),
                attribute.qualified_name()
            ))),
        }
    }

    fn resolve_vertex(&self, id: &Id) -> Result<VertexId, MetaGraphError> {
        if let Some(vertex) = self.identities.vertex(&id.guid) {
            return Ok(vertex);
        }
        match &id.guid {
            Guid::Assigned(guid) => self.helper.vertex_for_guid(guid),
            Guid::Transient(_) => Err(MetaGraphError::not_found(format!(
                "no vertex for unsaved {} instance {}",
                id.type_name, id.guid
            ))),
        }
    }

    /// Deletes superseded references in one delete walk and returns the
    /// edges that still exist afterwards (soft-deleted class references).
    fn remove_unused_entries(
        &self,
        request: &mut RequestContext,
        attribute: &AttributeInfo,
        edges: &[EdgeRecord],
    ) -> Result<Vec<EdgeRecord>, MetaGraphError> {
        if edges.is_empty() {
            return Ok(Vec::new());
        }
        let ownership = attribute.ownership.ok_or_else(|| {
            MetaGraphError::illegal_state(format!(
                "{} does not hold references",
                attribute.qualified_name()
            ))
        })?;
        let mut context = DeleteContext::new(request.request_time());
        let mut retained = Vec::new();
        for edge in edges {
            if !self
                .delete_handler
                .delete_edge_reference(&mut context, edge, ownership, true)?
            {
                retained.push(edge.clone());
            }
        }
        context.commit_delete(self.graph)?;
        for guid in context.deleted_guids() {
            request.record_deleted(guid);
        }
        for guid in context.updated_guids() {
            request.record_updated(guid);
        }
        Ok(retained)
    }

    fn scalar_json(
        &self,
        attribute: &AttributeInfo,
        data_type: &DataType,
        value: &AttrValue,
    ) -> Result<Value, MetaGraphError> {
        match (data_type, value) {
            (DataType::Primitive(kind), AttrValue::Primitive(primitive))
                if primitive_matches(*kind, primitive) =>
            {
                Ok(primitive.to_json())
            }
            (DataType::Enum(name), AttrValue::Enum(enum_value)) => {
                if self.types.enum_type(name)?.value_of(&enum_value.value).is_none() {
                    return Err(MetaGraphError::invalid_input(format!(
                        "{} is not a value of enum {name}",
                        enum_value.value
                    )));
                }
                Ok(Value::String(enum_value.value.clone()))
            }
            _ => Err(mismatch(attribute, value)),
        }
    }
}

/// Rejects a new value that leaves `attribute` below its lower bound.
fn check_multiplicity(
    attribute: &AttributeInfo,
    value: Option<&AttrValue>,
) -> Result<(), MetaGraphError> {
    let multiplicity = attribute.multiplicity;
    if multiplicity.null_allowed() {
        return Ok(());
    }
    let count = match value {
        None => 0,
        Some(AttrValue::Array(items)) => items.len(),
        Some(AttrValue::Map(entries)) => entries.len(),
        Some(_) => 1,
    };
    let lower = multiplicity.lower as usize;
    if count < lower {
        return Err(MetaGraphError::required_attribute(
            attribute.qualified_name(),
            format!("{count} values given, at least {lower} required"),
        ));
    }
    Ok(())
}

fn primitive_matches(kind: PrimitiveType, value: &PrimitiveValue) -> bool {
    matches!(
        (kind, value),
        (PrimitiveType::Boolean, PrimitiveValue::Boolean(_))
            | (PrimitiveType::Int, PrimitiveValue::Int(_))
            | (PrimitiveType::Long, PrimitiveValue::Long(_))
            | (PrimitiveType::Long, PrimitiveValue::Int(_))
            | (PrimitiveType::Double, PrimitiveValue::Double(_))
            | (PrimitiveType::String, PrimitiveValue::String(_))
            | (PrimitiveType::Date, PrimitiveValue::Date(_))
    )
}

fn mismatch(attribute: &AttributeInfo, value: &AttrValue) -> MetaGraphError {
    MetaGraphError::invalid_input(format!(
        "value {value:?} does not fit {} of type {}",
        attribute.qualified_name(),
        attribute.data_type.type_name()
    ))
}

/// Comparable form of a stored map entry.
fn entry_text(stored: &Value) -> String {
    match stored {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
