//! Identity vertices, label-based edge lookup and list properties on top of
//! a [`GraphBackend`].

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::{
    backend::GraphBackend,
    constants::{
        GUID_PROPERTY_KEY, MODIFICATION_TIMESTAMP_PROPERTY_KEY, STATE_PROPERTY_KEY,
        SUPER_TYPES_PROPERTY_KEY, TIMESTAMP_PROPERTY_KEY, TRAIT_NAMES_PROPERTY_KEY,
        TYPE_NAME_PROPERTY_KEY, VERSION_PROPERTY_KEY,
    },
    errors::MetaGraphError,
    graph::{Direction, EdgeId, EdgeRecord, ElementId, VertexId},
    instance::{AttrValue, EntityState, Id, TypedInstance},
    types::HierarchicalType,
};

pub struct GraphHelper<'g, B: GraphBackend> {
    graph: &'g B,
}

impl<'g, B: GraphBackend> Clone for GraphHelper<'g, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'g, B: GraphBackend> Copy for GraphHelper<'g, B> {}

impl<'g, B: GraphBackend> GraphHelper<'g, B> {
    pub fn new(graph: &'g B) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &'g B {
        self.graph
    }

    /// New entity vertex with a fresh GUID, version 0 and state `ACTIVE`.
    pub fn create_vertex_with_identity(
        &self,
        class: &HierarchicalType,
        trait_names: &[String],
        now: i64,
    ) -> Result<(VertexId, String), MetaGraphError> {
        let vertex = self.create_vertex_without_identity(class, now)?;
        let guid = Uuid::new_v4().to_string();
        let element = ElementId::from(vertex);
        self.graph
            .set_property(element, GUID_PROPERTY_KEY, &Value::String(guid.clone()))?;
        self.graph
            .set_property(element, VERSION_PROPERTY_KEY, &Value::from(0u64))?;
        self.set_string_list(element, TRAIT_NAMES_PROPERTY_KEY, trait_names)?;
        debug!(vertex = vertex.0, guid = %guid, type_name = %class.name, "created entity vertex");
        Ok((vertex, guid))
    }

    /// Vertex for a struct or trait value.
    pub fn create_vertex_without_identity(
        &self,
        hierarchical: &HierarchicalType,
        now: i64,
    ) -> Result<VertexId, MetaGraphError> {
        let vertex = self.graph.add_vertex()?;
        let element = ElementId::from(vertex);
        self.graph.set_property(
            element,
            TYPE_NAME_PROPERTY_KEY,
            &Value::String(hierarchical.name.clone()),
        )?;
        self.set_string_list(
            element,
            SUPER_TYPES_PROPERTY_KEY,
            hierarchical.all_super_type_names(),
        )?;
        self.set_state(element, EntityState::Active)?;
        self.graph
            .set_property(element, TIMESTAMP_PROPERTY_KEY, &Value::from(now))?;
        self.touch(element, now)?;
        Ok(vertex)
    }

    pub fn add_edge(
        &self,
        out_vertex: VertexId,
        in_vertex: VertexId,
        label: &str,
        now: i64,
    ) -> Result<EdgeId, MetaGraphError> {
        let edge = self.graph.add_edge(label, out_vertex, in_vertex)?;
        let element = ElementId::from(edge);
        self.set_state(element, EntityState::Active)?;
        self.graph
            .set_property(element, TIMESTAMP_PROPERTY_KEY, &Value::from(now))?;
        self.touch(element, now)?;
        debug!(edge = edge.0, label, out = out_vertex.0, r#in = in_vertex.0, "added edge");
        Ok(edge)
    }

    /// Reuses an active edge with the same label between the same vertices.
    pub fn get_or_create_edge(
        &self,
        out_vertex: VertexId,
        in_vertex: VertexId,
        label: &str,
        now: i64,
    ) -> Result<EdgeId, MetaGraphError> {
        for edge in self.graph.edges(out_vertex, Direction::Outgoing, Some(label))? {
            if edge.in_vertex == in_vertex && self.is_active(edge.id.into())? {
                return Ok(edge.id);
            }
        }
        self.add_edge(out_vertex, in_vertex, label, now)
    }

    /// The active outgoing edge with `label`. When the vertex itself is
    /// deleted, falls back to the most recently deleted such edge so a
    /// deleted entity still shows what it referenced.
    pub fn edge_for_label(
        &self,
        vertex: VertexId,
        label: &str,
    ) -> Result<Option<EdgeRecord>, MetaGraphError> {
        let mut latest_deleted: Option<(i64, EdgeRecord)> = None;
        for edge in self.graph.edges(vertex, Direction::Outgoing, Some(label))? {
            let element = ElementId::from(edge.id);
            if self.state(element)? == EntityState::Active {
                return Ok(Some(edge));
            }
            let modified = self.modification_timestamp(element)?;
            if latest_deleted
                .as_ref()
                .is_none_or(|(ts, _)| modified >= *ts)
            {
                latest_deleted = Some((modified, edge));
            }
        }
        if self.state(vertex.into())? == EntityState::Deleted {
            return Ok(latest_deleted.map(|(_, edge)| edge));
        }
        Ok(None)
    }

    /// Active outgoing edges with `label`, in creation order.
    pub fn active_edges(
        &self,
        vertex: VertexId,
        label: &str,
    ) -> Result<Vec<EdgeRecord>, MetaGraphError> {
        let mut active = Vec::new();
        for edge in self.graph.edges(vertex, Direction::Outgoing, Some(label))? {
            if self.is_active(edge.id.into())? {
                active.push(edge);
            }
        }
        Ok(active)
    }

    /// Resolves an edge id held in a list property. Ids that are malformed,
    /// gone, or belong to a different vertex or label resolve to `None`.
    pub fn edge_by_id(
        &self,
        vertex: VertexId,
        label: &str,
        edge_id: &str,
    ) -> Result<Option<EdgeRecord>, MetaGraphError> {
        let Ok(id) = edge_id.parse::<EdgeId>() else {
            return Ok(None);
        };
        Ok(self
            .graph
            .edge(id)?
            .filter(|edge| edge.out_vertex == vertex && edge.label == label))
    }

    pub fn find_vertex_for_guid(&self, guid: &str) -> Result<Option<VertexId>, MetaGraphError> {
        Ok(self
            .graph
            .vertices_by_property(GUID_PROPERTY_KEY, &Value::String(guid.to_string()))?
            .into_iter()
            .next())
    }

    pub fn vertex_for_guid(&self, guid: &str) -> Result<VertexId, MetaGraphError> {
        self.find_vertex_for_guid(guid)?
            .ok_or_else(|| MetaGraphError::not_found(format!("entity with guid {guid}")))
    }

    /// Active entity vertex of exactly `type_name` whose property `key`
    /// equals `value`.
    pub fn find_active_vertex(
        &self,
        type_name: &str,
        key: &str,
        value: &Value,
    ) -> Result<Option<VertexId>, MetaGraphError> {
        for vertex in self.graph.vertices_by_property(key, value)? {
            if self.type_name(vertex)? == type_name
                && self.state(vertex.into())? == EntityState::Active
            {
                return Ok(Some(vertex));
            }
        }
        Ok(None)
    }

    /// First active vertex of the instance's class matching any unique
    /// attribute value carried by the instance.
    pub fn vertex_for_unique_attributes(
        &self,
        class: &HierarchicalType,
        instance: &TypedInstance,
    ) -> Result<Option<VertexId>, MetaGraphError> {
        for attribute in class.field_mapping().unique_attributes() {
            let value = match instance.get(&attribute.name) {
                Some(AttrValue::Primitive(value)) => value.to_json(),
                Some(AttrValue::Enum(value)) => Value::String(value.value.clone()),
                _ => continue,
            };
            let found =
                self.find_active_vertex(&class.name, &attribute.qualified_name(), &value)?;
            if found.is_some() {
                debug!(type_name = %class.name, attribute = %attribute.name, "matched existing vertex by unique attribute");
                return Ok(found);
            }
        }
        Ok(None)
    }

    pub fn guid(&self, vertex: VertexId) -> Result<Option<String>, MetaGraphError> {
        Ok(self
            .graph
            .property(vertex.into(), GUID_PROPERTY_KEY)?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    pub fn type_name(&self, vertex: VertexId) -> Result<String, MetaGraphError> {
        self.graph
            .property(vertex.into(), TYPE_NAME_PROPERTY_KEY)?
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| MetaGraphError::not_found(format!("type name of vertex {vertex}")))
    }

    /// Lifecycle state; elements without one count as active.
    pub fn state(&self, element: ElementId) -> Result<EntityState, MetaGraphError> {
        Ok(parse_state(self.graph.property(element, STATE_PROPERTY_KEY)?.as_ref()))
    }

    pub fn is_active(&self, element: ElementId) -> Result<bool, MetaGraphError> {
        Ok(self.state(element)? == EntityState::Active)
    }

    pub fn set_state(&self, element: ElementId, state: EntityState) -> Result<(), MetaGraphError> {
        self.graph.set_property(
            element,
            STATE_PROPERTY_KEY,
            &Value::String(state.as_str().to_string()),
        )
    }

    pub fn version(&self, vertex: VertexId) -> Result<u64, MetaGraphError> {
        Ok(self
            .graph
            .property(vertex.into(), VERSION_PROPERTY_KEY)?
            .and_then(|v| v.as_u64())
            .unwrap_or(0))
    }

    pub fn set_version(&self, vertex: VertexId, version: u64) -> Result<(), MetaGraphError> {
        self.graph
            .set_property(vertex.into(), VERSION_PROPERTY_KEY, &Value::from(version))
    }

    pub fn modification_timestamp(&self, element: ElementId) -> Result<i64, MetaGraphError> {
        Ok(self
            .graph
            .property(element, MODIFICATION_TIMESTAMP_PROPERTY_KEY)?
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }

    pub fn touch(&self, element: ElementId, now: i64) -> Result<(), MetaGraphError> {
        self.graph
            .set_property(element, MODIFICATION_TIMESTAMP_PROPERTY_KEY, &Value::from(now))
    }

    /// Identity of an entity vertex as stored.
    pub fn id(&self, vertex: VertexId) -> Result<Id, MetaGraphError> {
        let guid = self
            .guid(vertex)?
            .ok_or_else(|| MetaGraphError::not_found(format!("guid of vertex {vertex}")))?;
        let mut id = Id::assigned(&guid, &self.type_name(vertex)?);
        id.version = self.version(vertex)?;
        id.state = self.state(vertex.into())?;
        Ok(id)
    }

    pub fn trait_names(&self, vertex: VertexId) -> Result<Vec<String>, MetaGraphError> {
        self.string_list(vertex.into(), TRAIT_NAMES_PROPERTY_KEY)
    }

    pub fn string_list(&self, element: ElementId, key: &str) -> Result<Vec<String>, MetaGraphError> {
        Ok(parse_string_list(self.graph.property(element, key)?.as_ref()))
    }

    /// Stores a list property; an empty list removes the property.
    pub fn set_string_list(
        &self,
        element: ElementId,
        key: &str,
        values: &[String],
    ) -> Result<(), MetaGraphError> {
        match string_list_value(values) {
            Some(value) => self.graph.set_property(element, key, &value),
            None => self.graph.remove_property(element, key),
        }
    }
}

pub(crate) fn parse_state(value: Option<&Value>) -> EntityState {
    value
        .and_then(Value::as_str)
        .and_then(EntityState::parse)
        .unwrap_or(EntityState::Active)
}

pub(crate) fn parse_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn string_list_value(values: &[String]) -> Option<Value> {
    if values.is_empty() {
        return None;
    }
    Some(Value::Array(
        values.iter().cloned().map(Value::String).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SqliteGraph;
    use crate::types::{AttributeDef, DataType, PrimitiveType, TypeSystem};

    fn types() -> TypeSystem {
        let mut types = TypeSystem::new();
        types
            .define_class(
                "Dataset",
                &[],
                vec![AttributeDef::new("name", DataType::Primitive(PrimitiveType::String)).unique()],
            )
            .expect("dataset");
        types
    }

    #[test]
    fn identity_vertex_carries_contract_properties() {
        let graph = SqliteGraph::open_in_memory().expect("graph");
        let types = types();
        let helper = GraphHelper::new(&graph);
        let (vertex, guid) = helper
            .create_vertex_with_identity(types.class("Dataset").unwrap(), &[], 7)
            .expect("vertex");

        assert_eq!(helper.vertex_for_guid(&guid).unwrap(), vertex);
        let id = helper.id(vertex).expect("id");
        assert_eq!(id.type_name, "Dataset");
        assert_eq!(id.version, 0);
        assert_eq!(id.state, EntityState::Active);
        assert_eq!(helper.modification_timestamp(vertex.into()).unwrap(), 7);
        assert!(helper.trait_names(vertex).unwrap().is_empty());
    }

    #[test]
    fn edge_for_label_prefers_active_and_falls_back_for_deleted_owner() {
        let graph = SqliteGraph::open_in_memory().expect("graph");
        let types = types();
        let helper = GraphHelper::new(&graph);
        let class = types.class("Dataset").unwrap();
        let (a, _) = helper.create_vertex_with_identity(class, &[], 1).unwrap();
        let (b, _) = helper.create_vertex_with_identity(class, &[], 1).unwrap();

        let edge = helper.add_edge(a, b, "__Dataset.parent", 1).unwrap();
        assert_eq!(helper.get_or_create_edge(a, b, "__Dataset.parent", 2).unwrap(), edge);

        helper.set_state(edge.into(), EntityState::Deleted).unwrap();
        assert!(helper.edge_for_label(a, "__Dataset.parent").unwrap().is_none());

        helper.set_state(a.into(), EntityState::Deleted).unwrap();
        let shown = helper.edge_for_label(a, "__Dataset.parent").unwrap();
        assert_eq!(shown.map(|e| e.id), Some(edge));
    }

    #[test]
    fn empty_string_list_removes_property() {
        let graph = SqliteGraph::open_in_memory().expect("graph");
        let helper = GraphHelper::new(&graph);
        let vertex = graph.insert_vertex().unwrap();
        let element = ElementId::from(vertex);
        helper
            .set_string_list(element, "Dataset.tags", &["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(helper.string_list(element, "Dataset.tags").unwrap(), vec!["a", "b"]);
        helper.set_string_list(element, "Dataset.tags", &[]).unwrap();
        assert!(graph.get_property(element, "Dataset.tags").unwrap().is_none());
    }
}
