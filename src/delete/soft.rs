//! Soft policy: elements are marked `DELETED` and stay in the store.

use serde_json::Value;

use crate::{
    backend::GraphBackend,
    constants::{MODIFICATION_TIMESTAMP_PROPERTY_KEY, STATE_PROPERTY_KEY},
    errors::MetaGraphError,
    graph::{EdgeId, ElementId, VertexId},
    instance::EntityState,
};

use super::DeleteContext;

pub(super) fn delete_edge<B: GraphBackend + ?Sized>(
    graph: &B,
    context: &mut DeleteContext,
    edge: EdgeId,
    force: bool,
) -> Result<(), MetaGraphError> {
    if force {
        return context.remove_edge(edge);
    }
    mark_deleted(graph, context, edge.into())
}

pub(super) fn delete_vertex<B: GraphBackend + ?Sized>(
    graph: &B,
    context: &mut DeleteContext,
    vertex: VertexId,
    force: bool,
) -> Result<(), MetaGraphError> {
    if force {
        return context.remove_vertex(vertex);
    }
    mark_deleted(graph, context, vertex.into())
}

fn mark_deleted<B: GraphBackend + ?Sized>(
    graph: &B,
    context: &mut DeleteContext,
    element: ElementId,
) -> Result<(), MetaGraphError> {
    if !context.is_active(graph, element)? {
        return Ok(());
    }
    context.set_property(
        element,
        STATE_PROPERTY_KEY,
        Some(Value::String(EntityState::Deleted.as_str().to_string())),
    )?;
    let now = context.request_time();
    context.set_property(
        element,
        MODIFICATION_TIMESTAMP_PROPERTY_KEY,
        Some(Value::from(now)),
    )?;
    context.register_soft_deleted_element(element);
    Ok(())
}
