use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::MetaGraphError;

/// Store-assigned vertex identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId(pub i64);

/// Store-assigned edge identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub i64);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EdgeId {
    type Err = MetaGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(EdgeId)
            .map_err(|_| MetaGraphError::invalid_input(format!("malformed edge id {s:?}")))
    }
}

/// Either kind of graph element; properties live on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementId {
    Vertex(VertexId),
    Edge(EdgeId),
}

impl ElementId {
    pub(crate) fn owner_tag(&self) -> &'static str {
        match self {
            ElementId::Vertex(_) => "v",
            ElementId::Edge(_) => "e",
        }
    }

    pub(crate) fn raw(&self) -> i64 {
        match self {
            ElementId::Vertex(v) => v.0,
            ElementId::Edge(e) => e.0,
        }
    }
}

impl From<VertexId> for ElementId {
    fn from(value: VertexId) -> Self {
        ElementId::Vertex(value)
    }
}

impl From<EdgeId> for ElementId {
    fn from(value: EdgeId) -> Self {
        ElementId::Edge(value)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Vertex(v) => write!(f, "vertex[{v}]"),
            ElementId::Edge(e) => write!(f, "edge[{e}]"),
        }
    }
}

/// A directed, labeled edge as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub label: String,
    pub out_vertex: VertexId,
    pub in_vertex: VertexId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

pub(crate) fn row_to_edge(row: &rusqlite::Row<'_>) -> Result<EdgeRecord, rusqlite::Error> {
    Ok(EdgeRecord {
        id: EdgeId(row.get(0)?),
        label: row.get(1)?,
        out_vertex: VertexId(row.get(2)?),
        in_vertex: VertexId(row.get(3)?),
    })
}

pub(crate) fn validate_label(label: &str) -> Result<(), MetaGraphError> {
    if label.trim().is_empty() {
        return Err(MetaGraphError::invalid_input("edge label must be set"));
    }
    Ok(())
}
