use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::debug;

use crate::{
    cache::AdjacencyCache,
    config::SqliteConfig,
    errors::MetaGraphError,
    schema::{ensure_schema, ensure_unique_property_index},
};

use super::types::{
    Direction, EdgeId, EdgeRecord, ElementId, VertexId, row_to_edge, validate_label,
};

/// Property graph stored in three SQLite tables: vertices, labeled edges and
/// JSON-valued properties shared by both element kinds.
pub struct SqliteGraph {
    conn: Connection,
    outgoing_cache: AdjacencyCache,
    incoming_cache: AdjacencyCache,
}

impl SqliteGraph {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MetaGraphError> {
        let conn =
            Connection::open(path).map_err(|e| MetaGraphError::connection(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, MetaGraphError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MetaGraphError::connection(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Applies statement-cache and PRAGMA options.
    pub fn configure(&self, config: &SqliteConfig) -> Result<(), MetaGraphError> {
        if let Some(size) = config.cache_size {
            self.conn.set_prepared_statement_cache_capacity(size);
        }
        for (key, value) in &config.pragma_settings {
            self.conn
                .pragma_update(None, key.as_str(), value.as_str())
                .map_err(|e| MetaGraphError::connection(e.to_string()))?;
        }
        Ok(())
    }

    pub fn ensure_unique_index(&self, key: &str) -> Result<(), MetaGraphError> {
        ensure_unique_property_index(&self.conn, key)
    }

    pub fn insert_vertex(&self) -> Result<VertexId, MetaGraphError> {
        self.conn
            .execute("INSERT INTO graph_vertices DEFAULT VALUES", [])
            .map_err(MetaGraphError::from_sqlite)?;
        Ok(VertexId(self.conn.last_insert_rowid()))
    }

    /// Removes a vertex together with its properties, incident edges and
    /// their properties.
    pub fn delete_vertex(&self, vertex: VertexId) -> Result<(), MetaGraphError> {
        if !self.vertex_exists(vertex)? {
            return Err(MetaGraphError::not_found(format!("vertex {vertex}")));
        }
        self.conn
            .execute(
                "DELETE FROM graph_properties WHERE owner='e' AND element_id IN \
                 (SELECT id FROM graph_edges WHERE out_id=?1 OR in_id=?1)",
                params![vertex.0],
            )
            .map_err(MetaGraphError::from_sqlite)?;
        self.conn
            .execute(
                "DELETE FROM graph_edges WHERE out_id=?1 OR in_id=?1",
                params![vertex.0],
            )
            .map_err(MetaGraphError::from_sqlite)?;
        self.conn
            .execute(
                "DELETE FROM graph_properties WHERE owner='v' AND element_id=?1",
                params![vertex.0],
            )
            .map_err(MetaGraphError::from_sqlite)?;
        self.conn
            .execute("DELETE FROM graph_vertices WHERE id=?1", params![vertex.0])
            .map_err(MetaGraphError::from_sqlite)?;
        self.invalidate_caches();
        debug!(vertex = vertex.0, "graph.delete_vertex");
        Ok(())
    }

    pub fn insert_edge(
        &self,
        label: &str,
        out_vertex: VertexId,
        in_vertex: VertexId,
    ) -> Result<EdgeId, MetaGraphError> {
        validate_label(label)?;
        if !self.vertex_exists(out_vertex)? || !self.vertex_exists(in_vertex)? {
            return Err(MetaGraphError::invalid_input(
                "edge endpoints must reference existing vertices",
            ));
        }
        self.conn
            .execute(
                "INSERT INTO graph_edges(label, out_id, in_id) VALUES(?1, ?2, ?3)",
                params![label, out_vertex.0, in_vertex.0],
            )
            .map_err(MetaGraphError::from_sqlite)?;
        self.outgoing_cache.remove(out_vertex.0);
        self.incoming_cache.remove(in_vertex.0);
        Ok(EdgeId(self.conn.last_insert_rowid()))
    }

    pub fn get_edge(&self, edge: EdgeId) -> Result<Option<EdgeRecord>, MetaGraphError> {
        self.conn
            .query_row(
                "SELECT id, label, out_id, in_id FROM graph_edges WHERE id=?1",
                params![edge.0],
                row_to_edge,
            )
            .optional()
            .map_err(MetaGraphError::from_sqlite)
    }

    pub fn delete_edge(&self, edge: EdgeId) -> Result<(), MetaGraphError> {
        let record = self
            .get_edge(edge)?
            .ok_or_else(|| MetaGraphError::not_found(format!("edge {edge}")))?;
        self.conn
            .execute(
                "DELETE FROM graph_properties WHERE owner='e' AND element_id=?1",
                params![edge.0],
            )
            .map_err(MetaGraphError::from_sqlite)?;
        self.conn
            .execute("DELETE FROM graph_edges WHERE id=?1", params![edge.0])
            .map_err(MetaGraphError::from_sqlite)?;
        self.outgoing_cache.remove(record.out_vertex.0);
        self.incoming_cache.remove(record.in_vertex.0);
        Ok(())
    }

    pub fn element_exists(&self, element: ElementId) -> Result<bool, MetaGraphError> {
        match element {
            ElementId::Vertex(vertex) => self.vertex_exists(vertex),
            ElementId::Edge(edge) => Ok(self.get_edge(edge)?.is_some()),
        }
    }

    /// Edges incident to `vertex`, ordered by edge id within each direction.
    pub fn incident_edges(
        &self,
        vertex: VertexId,
        direction: Direction,
        label: Option<&str>,
    ) -> Result<Vec<EdgeRecord>, MetaGraphError> {
        let mut edges = match direction {
            Direction::Outgoing => self.fetch_outgoing(vertex)?,
            Direction::Incoming => self.fetch_incoming(vertex)?,
            Direction::Both => {
                let mut all = self.fetch_outgoing(vertex)?;
                all.extend(self.fetch_incoming(vertex)?);
                all
            }
        };
        if let Some(label) = label {
            edges.retain(|edge| edge.label == label);
        }
        Ok(edges)
    }

    pub fn get_property(
        &self,
        element: ElementId,
        key: &str,
    ) -> Result<Option<Value>, MetaGraphError> {
        let raw: Option<String> = self
            .conn
            .prepare_cached(
                "SELECT value FROM graph_properties WHERE owner=?1 AND element_id=?2 AND key=?3",
            )
            .map_err(MetaGraphError::from_sqlite)?
            .query_row(params![element.owner_tag(), element.raw(), key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(MetaGraphError::from_sqlite)?;
        match raw {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| MetaGraphError::query(format!("corrupt property {key}: {e}"))),
            None => Ok(None),
        }
    }

    pub fn put_property(
        &self,
        element: ElementId,
        key: &str,
        value: &Value,
    ) -> Result<(), MetaGraphError> {
        let text = serde_json::to_string(value)
            .map_err(|e| MetaGraphError::invalid_input(e.to_string()))?;
        self.conn
            .prepare_cached(
                "INSERT INTO graph_properties(owner, element_id, key, value) VALUES(?1, ?2, ?3, ?4) \
                 ON CONFLICT(owner, element_id, key) DO UPDATE SET value=excluded.value",
            )
            .map_err(MetaGraphError::from_sqlite)?
            .execute(params![element.owner_tag(), element.raw(), key, text])
            .map_err(MetaGraphError::from_sqlite)?;
        Ok(())
    }

    pub fn delete_property(&self, element: ElementId, key: &str) -> Result<(), MetaGraphError> {
        self.conn
            .prepare_cached(
                "DELETE FROM graph_properties WHERE owner=?1 AND element_id=?2 AND key=?3",
            )
            .map_err(MetaGraphError::from_sqlite)?
            .execute(params![element.owner_tag(), element.raw(), key])
            .map_err(MetaGraphError::from_sqlite)?;
        Ok(())
    }

    pub fn find_vertices(&self, key: &str, value: &Value) -> Result<Vec<VertexId>, MetaGraphError> {
        let text = serde_json::to_string(value)
            .map_err(|e| MetaGraphError::invalid_input(e.to_string()))?;
        self.collect_vertex_ids(
            "SELECT element_id FROM graph_properties \
             WHERE owner='v' AND key=?1 AND value=?2 ORDER BY element_id",
            key,
            &text,
        )
    }

    /// Case-insensitive substring match over one text property.
    pub fn find_vertices_by_text(
        &self,
        key: &str,
        term: &str,
    ) -> Result<Vec<VertexId>, MetaGraphError> {
        let escaped = term
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        self.collect_vertex_ids(
            "SELECT element_id FROM graph_properties \
             WHERE owner='v' AND key=?1 AND value LIKE ?2 ESCAPE '\\' ORDER BY element_id",
            key,
            &format!("%{escaped}%"),
        )
    }

    pub fn begin(&self) -> Result<(), MetaGraphError> {
        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| MetaGraphError::transaction(e.to_string()))
    }

    pub fn commit(&self) -> Result<(), MetaGraphError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| MetaGraphError::transaction(e.to_string()))
    }

    /// Rolls back the open transaction, if any. Caches are dropped either way.
    pub fn rollback(&self) -> Result<(), MetaGraphError> {
        self.invalidate_caches();
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| MetaGraphError::transaction(e.to_string()))
    }

    pub fn vertex_count(&self) -> Result<i64, MetaGraphError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM graph_vertices", [], |row| row.get(0))
            .map_err(MetaGraphError::from_sqlite)
    }

    pub fn edge_count(&self) -> Result<i64, MetaGraphError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM graph_edges", [], |row| row.get(0))
            .map_err(MetaGraphError::from_sqlite)
    }
}

impl SqliteGraph {
    fn fetch_outgoing(&self, vertex: VertexId) -> Result<Vec<EdgeRecord>, MetaGraphError> {
        if let Some(cached) = self.outgoing_cache.get(vertex.0) {
            return Ok(cached);
        }
        let result = self.collect_edges(
            "SELECT id, label, out_id, in_id FROM graph_edges WHERE out_id=?1 ORDER BY id",
            vertex,
        )?;
        self.outgoing_cache.insert(vertex.0, result.clone());
        Ok(result)
    }

    fn fetch_incoming(&self, vertex: VertexId) -> Result<Vec<EdgeRecord>, MetaGraphError> {
        if let Some(cached) = self.incoming_cache.get(vertex.0) {
            return Ok(cached);
        }
        let result = self.collect_edges(
            "SELECT id, label, out_id, in_id FROM graph_edges WHERE in_id=?1 ORDER BY id",
            vertex,
        )?;
        self.incoming_cache.insert(vertex.0, result.clone());
        Ok(result)
    }

    fn collect_edges(&self, sql: &str, vertex: VertexId) -> Result<Vec<EdgeRecord>, MetaGraphError> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(MetaGraphError::from_sqlite)?;
        let rows = stmt
            .query_map(params![vertex.0], row_to_edge)
            .map_err(MetaGraphError::from_sqlite)?;
        let mut result = Vec::new();
        for item in rows {
            result.push(item.map_err(MetaGraphError::from_sqlite)?);
        }
        Ok(result)
    }

    fn collect_vertex_ids(
        &self,
        sql: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<VertexId>, MetaGraphError> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(MetaGraphError::from_sqlite)?;
        let rows = stmt
            .query_map(params![key, value], |row| row.get::<_, i64>(0))
            .map_err(MetaGraphError::from_sqlite)?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(VertexId(id.map_err(MetaGraphError::from_sqlite)?));
        }
        Ok(ids)
    }

    fn vertex_exists(&self, vertex: VertexId) -> Result<bool, MetaGraphError> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM graph_vertices WHERE id=?1",
                params![vertex.0],
                |row| row.get(0),
            )
            .optional()
            .map_err(MetaGraphError::from_sqlite)?;
        Ok(exists.is_some())
    }

    fn invalidate_caches(&self) {
        self.outgoing_cache.clear();
        self.incoming_cache.clear();
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            outgoing_cache: AdjacencyCache::new(),
            incoming_cache: AdjacencyCache::new(),
        }
    }
}
