//! Cascading delete.
//!
//! [`DeleteHandler`] walks an entity's field mapping and stages every removal
//! in a [`DeleteContext`]: owned sub-objects are deleted with their holder,
//! shared references only lose the connecting edge, and references from
//! other vertices into a deleted vertex are cleaned up on their owning side.
//! Under [`DeletePolicy::Soft`] elements are marked `DELETED`; under
//! [`DeletePolicy::Hard`] they are removed.

mod context;
mod hard;
mod soft;

use std::collections::VecDeque;

use ahash::AHashSet;
use serde_json::Value;
use tracing::{debug, info};

pub use context::{DeleteAction, DeleteContext};

use crate::{
    backend::GraphBackend,
    config::DeletePolicy,
    constants::{MODIFICATION_TIMESTAMP_PROPERTY_KEY, edge_label, map_key_name, parse_edge_label, trait_label},
    errors::MetaGraphError,
    graph::{Direction, EdgeId, EdgeRecord, ElementId, VertexId},
    helper::{GraphHelper, parse_string_list, string_list_value},
    types::{AttributeInfo, Ownership, TypeCategory, TypeSystem},
};

pub struct DeleteHandler<'a, B: GraphBackend> {
    graph: &'a B,
    helper: GraphHelper<'a, B>,
    types: &'a TypeSystem,
    policy: DeletePolicy,
}

impl<'a, B: GraphBackend> DeleteHandler<'a, B> {
    pub fn new(graph: &'a B, types: &'a TypeSystem, policy: DeletePolicy) -> Self {
        Self {
            graph,
            helper: GraphHelper::new(graph),
            types,
            policy,
        }
    }

    pub fn policy(&self) -> DeletePolicy {
        self.policy
    }

    /// Deletes several entities together with everything they own.
    ///
    /// The composite closure of all roots is collected and recorded as
    /// deleted before any element is touched, so references among the
    /// doomed entities never trigger reverse-side cleanup.
    pub fn delete_entities(
        &self,
        context: &mut DeleteContext,
        roots: &[VertexId],
    ) -> Result<(), MetaGraphError> {
        let candidates = self.composite_closure(context, roots)?;
        for (_, guid) in &candidates {
            context.record_entity_delete(guid);
        }
        info!(
            roots = roots.len(),
            candidates = candidates.len(),
            policy = ?self.policy,
            "deleting entities"
        );
        for (vertex, _) in candidates {
            if context.is_processed_or_deleted(self.graph, vertex)? {
                continue;
            }
            self.delete_all_traits(context, vertex)?;
            self.delete_type_vertex(context, vertex, false)?;
        }
        Ok(())
    }

    /// Deletes one entity. Already processed or inactive vertices are
    /// left alone, so repeated calls are harmless.
    pub fn delete_entity(
        &self,
        context: &mut DeleteContext,
        vertex: VertexId,
    ) -> Result<(), MetaGraphError> {
        if context.is_processed_or_deleted(self.graph, vertex)? {
            debug!(vertex = vertex.0, "entity already processed or deleted");
            return Ok(());
        }
        if let Some(guid) = self.helper.guid(vertex)? {
            context.record_entity_delete(&guid);
        }
        self.delete_all_traits(context, vertex)?;
        self.delete_type_vertex(context, vertex, false)
    }

    /// Deletes every reference held by the vertex's attributes, then the
    /// vertex itself.
    pub fn delete_type_vertex(
        &self,
        context: &mut DeleteContext,
        vertex: VertexId,
        force: bool,
    ) -> Result<(), MetaGraphError> {
        if context.is_processed(vertex) {
            return Ok(());
        }
        context.add_processed_vertex(vertex);
        let type_name = self.helper.type_name(vertex)?;
        let hierarchical = self.types.hierarchical(&type_name)?;
        debug!(vertex = vertex.0, type_name = %type_name, force, "deleting type vertex");

        for attribute in hierarchical.field_mapping().iter() {
            let Some(ownership) = attribute.ownership else {
                continue;
            };
            for edge in self.reference_edges(context, vertex, attribute)? {
                self.delete_edge_reference(context, &edge, ownership, force)?;
            }
        }
        self.delete_vertex(context, vertex, force)
    }

    /// Removes one reference according to its ownership.
    ///
    /// Returns `true` when the reference is gone for good: it was already
    /// inactive, the policy is hard, or an inline value was force-removed.
    /// A `false` return means the edge still exists in `DELETED` state.
    pub fn delete_edge_reference(
        &self,
        context: &mut DeleteContext,
        edge: &EdgeRecord,
        ownership: Ownership,
        force: bool,
    ) -> Result<bool, MetaGraphError> {
        if !context.is_active(self.graph, edge.id.into())? {
            return Ok(true);
        }
        let force = force && ownership == Ownership::Inline;
        debug!(edge = edge.id.0, label = %edge.label, ?ownership, force, "deleting edge reference");
        match ownership {
            Ownership::Inline => {
                self.delete_edge(context, edge, false, force)?;
                self.delete_type_vertex(context, edge.in_vertex, force)?;
            }
            Ownership::Owned => {
                self.delete_edge(context, edge, false, false)?;
                self.delete_entity(context, edge.in_vertex)?;
            }
            Ownership::Shared => {
                self.delete_edge(context, edge, true, false)?;
            }
        }
        Ok(self.policy.is_hard() || force)
    }

    /// Removes the reference `attribute_name` of `out_vertex` that points
    /// at `in_vertex`, enforcing the attribute's lower bound.
    pub fn delete_edge_between_vertices(
        &self,
        context: &mut DeleteContext,
        out_vertex: VertexId,
        in_vertex: VertexId,
        attribute_name: &str,
    ) -> Result<(), MetaGraphError> {
        let out_guid = self.helper.guid(out_vertex)?;
        if out_guid
            .as_deref()
            .is_some_and(|guid| context.is_deleted_entity(guid))
            || !context.is_active(self.graph, out_vertex.into())?
        {
            return Ok(());
        }
        let type_name = self.helper.type_name(out_vertex)?;
        let attribute = self
            .types
            .field_mapping(&type_name)?
            .get(attribute_name)
            .ok_or_else(|| {
                MetaGraphError::not_found(format!("attribute {attribute_name} of {type_name}"))
            })?;
        let qualified = attribute.qualified_name();
        let label = attribute.edge_label();
        let element = ElementId::from(out_vertex);
        let maintain_lists = self.should_update_reverse_attribute();

        let target = match attribute.category() {
            TypeCategory::Class => {
                let edge = self
                    .active_edges(context, out_vertex, &label)?
                    .into_iter()
                    .find(|edge| edge.in_vertex == in_vertex);
                if edge.is_some() && !attribute.multiplicity.null_allowed() {
                    return Err(MetaGraphError::required_attribute(
                        qualified,
                        format!("cannot unset required reference on vertex {out_vertex}"),
                    ));
                }
                edge
            }
            TypeCategory::Array => {
                let mut entries =
                    parse_string_list(context.property(self.graph, element, &qualified)?.as_ref());
                let mut active = Vec::new();
                for entry in &entries {
                    if let Some(edge) = self.helper.edge_by_id(out_vertex, &label, entry)? {
                        if context.is_active(self.graph, edge.id.into())? {
                            active.push((entry.clone(), edge));
                        }
                    }
                }
                let active_count = active.len();
                match active.into_iter().find(|(_, edge)| edge.in_vertex == in_vertex) {
                    Some((entry, edge)) => {
                        check_lower_bound(attribute, active_count)?;
                        if maintain_lists {
                            entries.retain(|e| *e != entry);
                            context.set_property(element, &qualified, string_list_value(&entries))?;
                        }
                        Some(edge)
                    }
                    None => None,
                }
            }
            TypeCategory::Map => {
                let mut keys =
                    parse_string_list(context.property(self.graph, element, &qualified)?.as_ref());
                let mut active = Vec::new();
                for key in &keys {
                    let key_property = map_key_name(&qualified, key);
                    let Some(edge_id) = context
                        .property(self.graph, element, &key_property)?
                        .and_then(|v| v.as_str().map(str::to_string))
                    else {
                        continue;
                    };
                    if let Some(edge) =
                        self.helper
                            .edge_by_id(out_vertex, &edge_label(&key_property), &edge_id)?
                    {
                        if context.is_active(self.graph, edge.id.into())? {
                            active.push((key.clone(), key_property, edge));
                        }
                    }
                }
                let active_count = active.len();
                match active
                    .into_iter()
                    .find(|(_, _, edge)| edge.in_vertex == in_vertex)
                {
                    Some((key, key_property, edge)) => {
                        check_lower_bound(attribute, active_count)?;
                        if maintain_lists {
                            keys.retain(|k| *k != key);
                            context.set_property(element, &qualified, string_list_value(&keys))?;
                            context.set_property(element, &key_property, None)?;
                        }
                        Some(edge)
                    }
                    None => None,
                }
            }
            // inline values have exactly one holder and are never pointed at from elsewhere
            TypeCategory::Struct | TypeCategory::Trait => None,
            TypeCategory::Primitive | TypeCategory::Enum => {
                return Err(MetaGraphError::illegal_state(format!(
                    "attribute {qualified} does not hold references"
                )));
            }
        };

        if let Some(edge) = target {
            debug!(edge = edge.id.0, out = out_vertex.0, attribute = %qualified, "detaching reference");
            self.delete_policy_edge(context, edge.id, false)?;
            let now = context.request_time();
            context.set_property(
                element,
                MODIFICATION_TIMESTAMP_PROPERTY_KEY,
                Some(Value::from(now)),
            )?;
            if let Some(guid) = out_guid {
                context.record_entity_update(&guid);
            }
        }
        Ok(())
    }

    /// Hard deletes keep collection properties in sync with removed
    /// entries; soft deletes leave the entries pointing at `DELETED` edges.
    pub fn should_update_reverse_attribute(&self) -> bool {
        self.policy.is_hard()
    }

    fn delete_all_traits(
        &self,
        context: &mut DeleteContext,
        vertex: VertexId,
    ) -> Result<(), MetaGraphError> {
        let type_name = self.helper.type_name(vertex)?;
        for trait_name in self.helper.trait_names(vertex)? {
            let label = trait_label(&type_name, &trait_name);
            for edge in self.active_edges(context, vertex, &label)? {
                self.delete_edge_reference(context, &edge, Ownership::Inline, false)?;
            }
        }
        Ok(())
    }

    fn delete_edge(
        &self,
        context: &mut DeleteContext,
        edge: &EdgeRecord,
        update_reverse: bool,
        force: bool,
    ) -> Result<(), MetaGraphError> {
        if update_reverse {
            if let Some((type_name, attribute_name)) = parse_edge_label(&edge.label) {
                let attribute = self
                    .types
                    .field_mapping(type_name)?
                    .get(attribute_name)
                    .ok_or_else(|| {
                        MetaGraphError::not_found(format!("attribute for edge label {}", edge.label))
                    })?;
                if let Some(reverse) = &attribute.reverse_attribute_name {
                    self.delete_edge_between_vertices(
                        context,
                        edge.in_vertex,
                        edge.out_vertex,
                        reverse,
                    )?;
                }
            }
        }
        self.delete_policy_edge(context, edge.id, force)
    }

    /// Cleans up active references into the vertex, then deletes it.
    fn delete_vertex(
        &self,
        context: &mut DeleteContext,
        vertex: VertexId,
        force: bool,
    ) -> Result<(), MetaGraphError> {
        for edge in self.graph.edges(vertex, Direction::Incoming, None)? {
            if !context.is_active(self.graph, edge.id.into())? {
                continue;
            }
            let Some((_, attribute_name)) = parse_edge_label(&edge.label) else {
                continue;
            };
            self.delete_edge_between_vertices(context, edge.out_vertex, edge.in_vertex, attribute_name)?;
        }
        match self.policy {
            DeletePolicy::Soft => soft::delete_vertex(self.graph, context, vertex, force),
            DeletePolicy::Hard => hard::delete_vertex(context, vertex),
        }
    }

    fn delete_policy_edge(
        &self,
        context: &mut DeleteContext,
        edge: EdgeId,
        force: bool,
    ) -> Result<(), MetaGraphError> {
        match self.policy {
            DeletePolicy::Soft => soft::delete_edge(self.graph, context, edge, force),
            DeletePolicy::Hard => hard::delete_edge(context, edge),
        }
    }

    /// Active edges that carry the attribute's references.
    fn reference_edges(
        &self,
        context: &DeleteContext,
        vertex: VertexId,
        attribute: &AttributeInfo,
    ) -> Result<Vec<EdgeRecord>, MetaGraphError> {
        match attribute.category() {
            TypeCategory::Class | TypeCategory::Struct => {
                self.active_edges(context, vertex, &attribute.edge_label())
            }
            TypeCategory::Array => {
                if !attribute.data_type.element_type().is_reference() {
                    return Ok(Vec::new());
                }
                self.active_edges(context, vertex, &attribute.edge_label())
            }
            TypeCategory::Map => {
                if !attribute.data_type.element_type().is_reference() {
                    return Ok(Vec::new());
                }
                let qualified = attribute.qualified_name();
                let keys = parse_string_list(
                    context
                        .property(self.graph, vertex.into(), &qualified)?
                        .as_ref(),
                );
                let mut edges = Vec::new();
                for key in keys {
                    let label = edge_label(&map_key_name(&qualified, &key));
                    edges.extend(self.active_edges(context, vertex, &label)?);
                }
                Ok(edges)
            }
            TypeCategory::Primitive | TypeCategory::Enum | TypeCategory::Trait => Ok(Vec::new()),
        }
    }

    fn active_edges(
        &self,
        context: &DeleteContext,
        vertex: VertexId,
        label: &str,
    ) -> Result<Vec<EdgeRecord>, MetaGraphError> {
        let mut active = Vec::new();
        for edge in self.graph.edges(vertex, Direction::Outgoing, Some(label))? {
            if context.is_active(self.graph, edge.id.into())? {
                active.push(edge);
            }
        }
        Ok(active)
    }

    /// Entity vertices reachable from the roots through active owned
    /// references, roots first.
    fn composite_closure(
        &self,
        context: &DeleteContext,
        roots: &[VertexId],
    ) -> Result<Vec<(VertexId, String)>, MetaGraphError> {
        let mut seen: AHashSet<VertexId> = AHashSet::new();
        let mut queue: VecDeque<VertexId> = roots.iter().copied().collect();
        let mut candidates = Vec::new();
        while let Some(vertex) = queue.pop_front() {
            if !seen.insert(vertex) || context.is_processed_or_deleted(self.graph, vertex)? {
                continue;
            }
            let Some(guid) = self.helper.guid(vertex)? else {
                continue;
            };
            candidates.push((vertex, guid));
            let type_name = self.helper.type_name(vertex)?;
            for attribute in self.types.hierarchical(&type_name)?.field_mapping().iter() {
                if attribute.ownership != Some(Ownership::Owned) {
                    continue;
                }
                for edge in self.reference_edges(context, vertex, attribute)? {
                    queue.push_back(edge.in_vertex);
                }
            }
        }
        Ok(candidates)
    }
}

fn check_lower_bound(attribute: &AttributeInfo, active_entries: usize) -> Result<(), MetaGraphError> {
    let lower = attribute.multiplicity.lower as usize;
    if !attribute.multiplicity.null_allowed() && active_entries <= lower {
        return Err(MetaGraphError::required_attribute(
            attribute.qualified_name(),
            format!(
                "removing an entry would leave fewer than {lower} values ({active_entries} present)"
            ),
        ));
    }
    Ok(())
}
