//! Unit of work for one delete walk.
//!
//! Removals and property writes are staged as commands and replayed in
//! order by [`DeleteContext::commit_delete`] once the walk has finished
//! without error. Nothing reaches the store before that.

use ahash::{AHashMap, AHashSet};
use serde_json::Value;
use tracing::debug;

use crate::{
    backend::GraphBackend,
    constants::STATE_PROPERTY_KEY,
    errors::MetaGraphError,
    graph::{EdgeId, ElementId, VertexId},
    helper::parse_state,
    instance::EntityState,
};

#[derive(Clone, Debug, PartialEq)]
pub enum DeleteAction {
    /// `None` removes the property.
    SetProperty {
        element: ElementId,
        key: String,
        value: Option<Value>,
    },
    RemoveVertex(VertexId),
    RemoveEdge(EdgeId),
}

#[derive(Debug)]
pub struct DeleteContext {
    actions: Vec<DeleteAction>,
    marked: AHashSet<ElementId>,
    processed: AHashSet<VertexId>,
    staged: AHashMap<(ElementId, String), Option<Value>>,
    request_time: i64,
    deleted_guids: Vec<String>,
    deleted_set: AHashSet<String>,
    updated_guids: Vec<String>,
}

impl DeleteContext {
    pub fn new(request_time: i64) -> Self {
        Self {
            actions: Vec::new(),
            marked: AHashSet::new(),
            processed: AHashSet::new(),
            staged: AHashMap::new(),
            request_time,
            deleted_guids: Vec::new(),
            deleted_set: AHashSet::new(),
            updated_guids: Vec::new(),
        }
    }

    pub fn request_time(&self) -> i64 {
        self.request_time
    }

    /// Marks an element as logically deleted without staging a removal.
    pub fn register_soft_deleted_element(&mut self, element: ElementId) {
        self.marked.insert(element);
    }

    pub fn remove_vertex(&mut self, vertex: VertexId) -> Result<(), MetaGraphError> {
        self.mark(vertex.into())?;
        self.actions.push(DeleteAction::RemoveVertex(vertex));
        Ok(())
    }

    pub fn remove_edge(&mut self, edge: EdgeId) -> Result<(), MetaGraphError> {
        self.mark(edge.into())?;
        self.actions.push(DeleteAction::RemoveEdge(edge));
        Ok(())
    }

    pub fn set_property(
        &mut self,
        element: ElementId,
        key: &str,
        value: Option<Value>,
    ) -> Result<(), MetaGraphError> {
        self.ensure_unmarked(element)?;
        self.staged
            .insert((element, key.to_string()), value.clone());
        self.actions.push(DeleteAction::SetProperty {
            element,
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    /// Reads a property as the walk sees it: staged writes first, then
    /// the store.
    pub fn property<B: GraphBackend + ?Sized>(
        &self,
        graph: &B,
        element: ElementId,
        key: &str,
    ) -> Result<Option<Value>, MetaGraphError> {
        match self.staged.get(&(element, key.to_string())) {
            Some(value) => Ok(value.clone()),
            None => graph.property(element, key),
        }
    }

    /// Persisted (or staged) state is `ACTIVE` and the element is not
    /// marked for deletion.
    pub fn is_active<B: GraphBackend + ?Sized>(
        &self,
        graph: &B,
        element: ElementId,
    ) -> Result<bool, MetaGraphError> {
        if self.marked.contains(&element) {
            return Ok(false);
        }
        let state = self.property(graph, element, STATE_PROPERTY_KEY)?;
        Ok(parse_state(state.as_ref()) == EntityState::Active)
    }

    pub fn is_processed(&self, vertex: VertexId) -> bool {
        self.processed.contains(&vertex)
    }

    pub fn add_processed_vertex(&mut self, vertex: VertexId) {
        self.processed.insert(vertex);
    }

    pub fn is_processed_or_deleted<B: GraphBackend + ?Sized>(
        &self,
        graph: &B,
        vertex: VertexId,
    ) -> Result<bool, MetaGraphError> {
        Ok(self.is_processed(vertex) || !self.is_active(graph, vertex.into())?)
    }

    pub fn record_entity_delete(&mut self, guid: &str) {
        if self.deleted_set.insert(guid.to_string()) {
            self.deleted_guids.push(guid.to_string());
        }
    }

    pub fn is_deleted_entity(&self, guid: &str) -> bool {
        self.deleted_set.contains(guid)
    }

    pub fn record_entity_update(&mut self, guid: &str) {
        if !self.updated_guids.iter().any(|g| g == guid) {
            self.updated_guids.push(guid.to_string());
        }
    }

    pub fn deleted_guids(&self) -> &[String] {
        &self.deleted_guids
    }

    pub fn updated_guids(&self) -> &[String] {
        &self.updated_guids
    }

    pub fn pending_actions(&self) -> &[DeleteAction] {
        &self.actions
    }

    /// Replays every staged action in order, then clears the action log
    /// and the marked and processed sets. Targets that no longer exist
    /// (an edge removed along with its vertex) are skipped.
    pub fn commit_delete<B: GraphBackend + ?Sized>(
        &mut self,
        graph: &B,
    ) -> Result<(), MetaGraphError> {
        debug!(actions = self.actions.len(), "committing delete context");
        for action in self.actions.drain(..) {
            match action {
                DeleteAction::SetProperty {
                    element,
                    key,
                    value,
                } => {
                    if !graph.contains(element)? {
                        continue;
                    }
                    match value {
                        Some(value) => graph.set_property(element, &key, &value)?,
                        None => graph.remove_property(element, &key)?,
                    }
                }
                DeleteAction::RemoveVertex(vertex) => {
                    if graph.contains(vertex.into())? {
                        graph.remove_vertex(vertex)?;
                    }
                }
                DeleteAction::RemoveEdge(edge) => {
                    if graph.contains(edge.into())? {
                        graph.remove_edge(edge)?;
                    }
                }
            }
        }
        self.marked.clear();
        self.processed.clear();
        self.staged.clear();
        Ok(())
    }

    fn mark(&mut self, element: ElementId) -> Result<(), MetaGraphError> {
        self.ensure_unmarked(element)?;
        self.marked.insert(element);
        Ok(())
    }

    fn ensure_unmarked(&self, element: ElementId) -> Result<(), MetaGraphError> {
        if self.marked.contains(&element) {
            return Err(MetaGraphError::illegal_state(format!(
                "{element} is already marked for deletion"
            )));
        }
        Ok(())
    }
}
