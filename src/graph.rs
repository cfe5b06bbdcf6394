mod sqlite_graph;
mod types;

pub use sqlite_graph::SqliteGraph;
pub use types::{Direction, EdgeId, EdgeRecord, ElementId, VertexId};
