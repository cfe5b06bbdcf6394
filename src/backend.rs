//! Element-access trait the mapping and delete engines are written against.
//! [`SqliteGraph`] is the bundled implementation; any store exposing vertex,
//! edge and property CRUD plus exact-match lookups can stand in for it.

use serde_json::Value;

use crate::{
    errors::MetaGraphError,
    graph::{Direction, EdgeId, EdgeRecord, ElementId, SqliteGraph, VertexId},
};

pub trait GraphBackend {
    fn add_vertex(&self) -> Result<VertexId, MetaGraphError>;
    /// Removes the vertex and every edge incident to it.
    fn remove_vertex(&self, vertex: VertexId) -> Result<(), MetaGraphError>;
    fn add_edge(
        &self,
        label: &str,
        out_vertex: VertexId,
        in_vertex: VertexId,
    ) -> Result<EdgeId, MetaGraphError>;
    fn remove_edge(&self, edge: EdgeId) -> Result<(), MetaGraphError>;
    fn edge(&self, edge: EdgeId) -> Result<Option<EdgeRecord>, MetaGraphError>;
    fn contains(&self, element: ElementId) -> Result<bool, MetaGraphError>;
    fn edges(
        &self,
        vertex: VertexId,
        direction: Direction,
        label: Option<&str>,
    ) -> Result<Vec<EdgeRecord>, MetaGraphError>;
    fn property(&self, element: ElementId, key: &str) -> Result<Option<Value>, MetaGraphError>;
    fn set_property(&self, element: ElementId, key: &str, value: &Value)
    -> Result<(), MetaGraphError>;
    fn remove_property(&self, element: ElementId, key: &str) -> Result<(), MetaGraphError>;
    fn vertices_by_property(&self, key: &str, value: &Value)
    -> Result<Vec<VertexId>, MetaGraphError>;
    fn vertices_by_full_text(&self, key: &str, term: &str)
    -> Result<Vec<VertexId>, MetaGraphError>;
    fn begin(&self) -> Result<(), MetaGraphError>;
    fn commit(&self) -> Result<(), MetaGraphError>;
    fn rollback(&self) -> Result<(), MetaGraphError>;
}

impl GraphBackend for SqliteGraph {
    fn add_vertex(&self) -> Result<VertexId, MetaGraphError> {
        self.insert_vertex()
    }

    fn remove_vertex(&self, vertex: VertexId) -> Result<(), MetaGraphError> {
        self.delete_vertex(vertex)
    }

    fn add_edge(
        &self,
        label: &str,
        out_vertex: VertexId,
        in_vertex: VertexId,
    ) -> Result<EdgeId, MetaGraphError> {
        self.insert_edge(label, out_vertex, in_vertex)
    }

    fn remove_edge(&self, edge: EdgeId) -> Result<(), MetaGraphError> {
        self.delete_edge(edge)
    }

    fn edge(&self, edge: EdgeId) -> Result<Option<EdgeRecord>, MetaGraphError> {
        self.get_edge(edge)
    }

    fn contains(&self, element: ElementId) -> Result<bool, MetaGraphError> {
        self.element_exists(element)
    }

    fn edges(
        &self,
        vertex: VertexId,
        direction: Direction,
        label: Option<&str>,
    ) -> Result<Vec<EdgeRecord>, MetaGraphError> {
        self.incident_edges(vertex, direction, label)
    }

    fn property(&self, element: ElementId, key: &str) -> Result<Option<Value>, MetaGraphError> {
        self.get_property(element, key)
    }

    fn set_property(
        &self,
        element: ElementId,
        key: &str,
        value: &Value,
    ) -> Result<(), MetaGraphError> {
        self.put_property(element, key, value)
    }

    fn remove_property(&self, element: ElementId, key: &str) -> Result<(), MetaGraphError> {
        self.delete_property(element, key)
    }

    fn vertices_by_property(
        &self,
        key: &str,
        value: &Value,
    ) -> Result<Vec<VertexId>, MetaGraphError> {
        self.find_vertices(key, value)
    }

    fn vertices_by_full_text(
        &self,
        key: &str,
        term: &str,
    ) -> Result<Vec<VertexId>, MetaGraphError> {
        self.find_vertices_by_text(key, term)
    }

    fn begin(&self) -> Result<(), MetaGraphError> {
        SqliteGraph::begin(self)
    }

    fn commit(&self) -> Result<(), MetaGraphError> {
        SqliteGraph::commit(self)
    }

    fn rollback(&self) -> Result<(), MetaGraphError> {
        SqliteGraph::rollback(self)
    }
}

impl<B> GraphBackend for &B
where
    B: GraphBackend + ?Sized,
{
    fn add_vertex(&self) -> Result<VertexId, MetaGraphError> {
        (*self).add_vertex()
    }

    fn remove_vertex(&self, vertex: VertexId) -> Result<(), MetaGraphError> {
        (*self).remove_vertex(vertex)
    }

    fn add_edge(
        &self,
        label: &str,
        out_vertex: VertexId,
        in_vertex: VertexId,
    ) -> Result<EdgeId, MetaGraphError> {
        (*self).add_edge(label, out_vertex, in_vertex)
    }

    fn remove_edge(&self, edge: EdgeId) -> Result<(), MetaGraphError> {
        (*self).remove_edge(edge)
    }

    fn edge(&self, edge: EdgeId) -> Result<Option<EdgeRecord>, MetaGraphError> {
        (*self).edge(edge)
    }

    fn contains(&self, element: ElementId) -> Result<bool, MetaGraphError> {
        (*self).contains(element)
    }

    fn edges(
        &self,
        vertex: VertexId,
        direction: Direction,
        label: Option<&str>,
    ) -> Result<Vec<EdgeRecord>, MetaGraphError> {
        (*self).edges(vertex, direction, label)
    }

    fn property(&self, element: ElementId, key: &str) -> Result<Option<Value>, MetaGraphError> {
        (*self).property(element, key)
    }

    fn set_property(
        &self,
        element: ElementId,
        key: &str,
        value: &Value,
    ) -> Result<(), MetaGraphError> {
        (*self).set_property(element, key, value)
    }

    fn remove_property(&self, element: ElementId, key: &str) -> Result<(), MetaGraphError> {
        (*self).remove_property(element, key)
    }

    fn vertices_by_property(
        &self,
        key: &str,
        value: &Value,
    ) -> Result<Vec<VertexId>, MetaGraphError> {
        (*self).vertices_by_property(key, value)
    }

    fn vertices_by_full_text(
        &self,
        key: &str,
        term: &str,
    ) -> Result<Vec<VertexId>, MetaGraphError> {
        (*self).vertices_by_full_text(key, term)
    }

    fn begin(&self) -> Result<(), MetaGraphError> {
        (*self).begin()
    }

    fn commit(&self) -> Result<(), MetaGraphError> {
        (*self).commit()
    }

    fn rollback(&self) -> Result<(), MetaGraphError> {
        (*self).rollback()
    }
}
