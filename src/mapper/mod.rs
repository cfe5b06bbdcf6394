//! Conversion between typed instances and the property graph.

mod from_graph;
mod identity;
mod to_graph;

pub use from_graph::GraphToTypedInstanceMapper;
pub use identity::{DiscoveredVertex, Discovery, IdentityMap, Slot};
pub use to_graph::{Operation, TypedInstanceToGraphMapper};
