//! Hard policy: elements are physically removed on commit.

use crate::{
    errors::MetaGraphError,
    graph::{EdgeId, VertexId},
};

use super::DeleteContext;

pub(super) fn delete_edge(context: &mut DeleteContext, edge: EdgeId) -> Result<(), MetaGraphError> {
    context.remove_edge(edge)
}

pub(super) fn delete_vertex(
    context: &mut DeleteContext,
    vertex: VertexId,
) -> Result<(), MetaGraphError> {
    context.remove_vertex(vertex)
}
