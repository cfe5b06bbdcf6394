//! Entity-level operations over a graph backend.
//!
//! Every mutating call runs inside [`MetadataRepository::in_transaction`]:
//! stale transaction state is rolled back, the work runs against a fresh
//! [`RequestContext`], and the transaction commits only if the work
//! succeeded. A failed request leaves the store exactly as it was.

use serde_json::Value;
use tracing::{info, warn};

use crate::{
    backend::GraphBackend,
    config::{RepositoryConfig, prepare_graph},
    constants::{ENTITY_TEXT_PROPERTY_KEY, TRAIT_NAMES_PROPERTY_KEY, TYPE_NAME_PROPERTY_KEY, trait_label},
    delete::{DeleteContext, DeleteHandler},
    errors::MetaGraphError,
    fulltext::DefaultFullTextMapper,
    graph::{SqliteGraph, VertexId},
    helper::GraphHelper,
    instance::{AttrValue, TypedInstance},
    mapper::{GraphToTypedInstanceMapper, Operation, TypedInstanceToGraphMapper},
    request::{EntityMutations, RequestContext},
    types::{Ownership, TypeSystem},
};

pub struct MetadataRepository<B: GraphBackend> {
    graph: B,
    types: TypeSystem,
    config: RepositoryConfig,
    full_text_mapper: DefaultFullTextMapper,
}

impl MetadataRepository<SqliteGraph> {
    /// Repository over a fresh in-memory SQLite store.
    pub fn in_memory(types: TypeSystem, cfg: &RepositoryConfig) -> Result<Self, MetaGraphError> {
        let graph = SqliteGraph::open_in_memory()?;
        prepare_graph(&graph, &types, cfg)?;
        Ok(Self::new(graph, types, cfg))
    }
}

impl<B: GraphBackend> MetadataRepository<B> {
    pub fn new(graph: B, types: TypeSystem, cfg: &RepositoryConfig) -> Self {
        Self {
            graph,
            types,
            config: cfg.clone(),
            full_text_mapper: DefaultFullTextMapper,
        }
    }

    pub fn graph(&self) -> &B {
        &self.graph
    }

    pub fn types(&self) -> &TypeSystem {
        &self.types
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Runs `work` as one request: one transaction and one request time.
    pub fn in_transaction<T, F>(
        &self,
        operation: &str,
        work: F,
    ) -> Result<(T, EntityMutations), MetaGraphError>
    where
        F: FnOnce(&mut RequestContext) -> Result<T, MetaGraphError>,
    {
        self.graph.rollback()?;
        self.graph.begin()?;
        let mut request = RequestContext::new();
        match work(&mut request) {
            Ok(value) => {
                self.graph.commit()?;
                let mutations = request.into_mutations();
                info!(
                    operation,
                    created = mutations.created.len(),
                    updated = mutations.updated.len(),
                    deleted = mutations.deleted.len(),
                    "request committed"
                );
                Ok((value, mutations))
            }
            Err(err) => {
                warn!(operation, error = %err, "request failed, rolling back");
                if let Err(rollback_err) = self.graph.rollback() {
                    warn!(operation, error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Creates the given entities and everything reachable from them.
    /// Instances matching an existing entity by GUID or unique attribute
    /// resolve to that entity and are left unchanged.
    pub fn create_entities(
        &self,
        instances: &[TypedInstance],
    ) -> Result<EntityMutations, MetaGraphError> {
        self.map_entities("create_entities", instances, Operation::Create)
    }

    /// Replaces the state of existing entities; attributes missing from an
    /// instance are cleared. New instances in the batch are created.
    pub fn update_entities(
        &self,
        instances: &[TypedInstance],
    ) -> Result<EntityMutations, MetaGraphError> {
        self.map_entities("update_entities", instances, Operation::UpdateFull)
    }

    /// Updates only the attributes present on `instance`, which must carry
    /// an assigned GUID.
    pub fn update_partial(
        &self,
        instance: &TypedInstance,
    ) -> Result<EntityMutations, MetaGraphError> {
        if instance.guid().is_none() {
            return Err(MetaGraphError::invalid_input(format!(
                "partial update of {} needs an assigned guid",
                instance.type_name
            )));
        }
        self.map_entities(
            "update_partial",
            std::slice::from_ref(instance),
            Operation::UpdatePartial,
        )
    }

    /// Deletes entities with everything they own. Already deleted
    /// entities are skipped.
    pub fn delete_entities(&self, guids: &[&str]) -> Result<EntityMutations, MetaGraphError> {
        if guids.is_empty() {
            return Err(MetaGraphError::invalid_input("no entities to delete"));
        }
        let (_, mutations) = self.in_transaction("delete_entities", |request| {
            let helper = GraphHelper::new(&self.graph);
            let roots = guids
                .iter()
                .map(|guid| helper.vertex_for_guid(guid))
                .collect::<Result<Vec<_>, _>>()?;
            let mut context = DeleteContext::new(request.request_time());
            self.delete_handler().delete_entities(&mut context, &roots)?;
            self.commit_delete(request, context)
        })?;
        Ok(mutations)
    }

    /// The entity with `guid`, deleted or not.
    pub fn get_entity(&self, guid: &str) -> Result<TypedInstance, MetaGraphError> {
        let vertex = self.helper().vertex_for_guid(guid)?;
        self.reader().map_graph_to_typed_instance(vertex)
    }

    /// The active entity of `type_name` whose unique `attribute` equals
    /// `value`.
    pub fn get_entity_by_unique_attribute(
        &self,
        type_name: &str,
        attribute: &str,
        value: &AttrValue,
    ) -> Result<TypedInstance, MetaGraphError> {
        let info = self
            .types
            .class(type_name)?
            .field_mapping()
            .get(attribute)
            .ok_or_else(|| {
                MetaGraphError::not_found(format!("attribute {attribute} of {type_name}"))
            })?;
        if !info.is_unique {
            return Err(MetaGraphError::invalid_input(format!(
                "{} is not unique",
                info.qualified_name()
            )));
        }
        let stored = match value {
            AttrValue::Primitive(primitive) => primitive.to_json(),
            AttrValue::Enum(enum_value) => Value::String(enum_value.value.clone()),
            other => {
                return Err(MetaGraphError::invalid_input(format!(
                    "{other:?} cannot identify a {type_name}"
                )));
            }
        };
        let vertex = self
            .helper()
            .find_active_vertex(type_name, &info.qualified_name(), &stored)?
            .ok_or_else(|| {
                MetaGraphError::not_found(format!("{type_name} with {attribute}={stored}"))
            })?;
        self.reader().map_graph_to_typed_instance(vertex)
    }

    /// GUIDs of the active entities of exactly `type_name`.
    pub fn entity_list(&self, type_name: &str) -> Result<Vec<String>, MetaGraphError> {
        self.types.class(type_name)?;
        let vertices = self
            .graph
            .vertices_by_property(TYPE_NAME_PROPERTY_KEY, &Value::String(type_name.to_string()))?;
        self.active_guids(vertices)
    }

    pub fn trait_names(&self, guid: &str) -> Result<Vec<String>, MetaGraphError> {
        let helper = self.helper();
        helper.trait_names(helper.vertex_for_guid(guid)?)
    }

    /// Attaches a trait to an active entity.
    pub fn add_trait(
        &self,
        guid: &str,
        trait_instance: &TypedInstance,
    ) -> Result<EntityMutations, MetaGraphError> {
        self.types.trait_type(&trait_instance.type_name)?;
        let (_, mutations) = self.in_transaction("add_trait", |request| {
            let helper = self.helper();
            let vertex = self.active_vertex(guid)?;
            let mut names = helper.trait_names(vertex)?;
            if names.contains(&trait_instance.type_name) {
                return Err(MetaGraphError::already_exists(format!(
                    "trait {} on entity {guid}",
                    trait_instance.type_name
                )));
            }
            let type_name = helper.type_name(vertex)?;
            let mut mapper = self.mapper();
            mapper.map_trait_instance_to_vertex(request, trait_instance, vertex, &type_name)?;
            names.push(trait_instance.type_name.clone());
            helper.set_string_list(vertex.into(), TRAIT_NAMES_PROPERTY_KEY, &names)?;
            helper.touch(vertex.into(), request.request_time())?;
            mapper.write_full_text(vertex)?;
            request.record_updated(guid);
            Ok(())
        })?;
        Ok(mutations)
    }

    /// Detaches a trait from an active entity. The trait vertex is removed
    /// regardless of the delete policy.
    pub fn delete_trait(
        &self,
        guid: &str,
        trait_name: &str,
    ) -> Result<EntityMutations, MetaGraphError> {
        let (_, mutations) = self.in_transaction("delete_trait", |request| {
            let helper = self.helper();
            let vertex = self.active_vertex(guid)?;
            let mut names = helper.trait_names(vertex)?;
            if !names.iter().any(|name| name == trait_name) {
                return Err(MetaGraphError::not_found(format!(
                    "trait {trait_name} on entity {guid}"
                )));
            }
            let label = trait_label(&helper.type_name(vertex)?, trait_name);
            let mut context = DeleteContext::new(request.request_time());
            let handler = self.delete_handler();
            for edge in helper.active_edges(vertex, &label)? {
                handler.delete_edge_reference(&mut context, &edge, Ownership::Inline, true)?;
            }
            self.commit_delete(request, context)?;

            names.retain(|name| name != trait_name);
            helper.set_string_list(vertex.into(), TRAIT_NAMES_PROPERTY_KEY, &names)?;
            helper.touch(vertex.into(), request.request_time())?;
            self.mapper().write_full_text(vertex)?;
            request.record_updated(guid);
            Ok(())
        })?;
        Ok(mutations)
    }

    /// GUIDs of active entities whose aggregate text contains `term`,
    /// ignoring case.
    pub fn search_full_text(&self, term: &str) -> Result<Vec<String>, MetaGraphError> {
        let vertices = self
            .graph
            .vertices_by_full_text(ENTITY_TEXT_PROPERTY_KEY, term)?;
        self.active_guids(vertices)
    }

    fn map_entities(
        &self,
        operation: &str,
        instances: &[TypedInstance],
        mode: Operation,
    ) -> Result<EntityMutations, MetaGraphError> {
        let (guids, mut mutations) = self.in_transaction(operation, |request| {
            self.mapper().map_typed_instances(request, instances, mode)
        })?;
        mutations.guids = guids;
        Ok(mutations)
    }

    fn commit_delete(
        &self,
        request: &mut RequestContext,
        mut context: DeleteContext,
    ) -> Result<(), MetaGraphError> {
        context.commit_delete(&self.graph)?;
        for guid in context.deleted_guids() {
            request.record_deleted(guid);
        }
        for guid in context.updated_guids() {
            request.record_updated(guid);
        }
        Ok(())
    }

    fn active_vertex(&self, guid: &str) -> Result<VertexId, MetaGraphError> {
        let helper = self.helper();
        let vertex = helper.vertex_for_guid(guid)?;
        if !helper.is_active(vertex.into())? {
            return Err(MetaGraphError::invalid_input(format!("entity {guid} is deleted")));
        }
        Ok(vertex)
    }

    fn active_guids(&self, vertices: Vec<VertexId>) -> Result<Vec<String>, MetaGraphError> {
        let helper = self.helper();
        let mut guids = Vec::new();
        for vertex in vertices {
            if !helper.is_active(vertex.into())? {
                continue;
            }
            if let Some(guid) = helper.guid(vertex)? {
                guids.push(guid);
            }
        }
        Ok(guids)
    }

    fn helper(&self) -> GraphHelper<'_, B> {
        GraphHelper::new(&self.graph)
    }

    fn reader(&self) -> GraphToTypedInstanceMapper<'_, B> {
        GraphToTypedInstanceMapper::new(&self.graph, &self.types)
    }

    fn delete_handler(&self) -> DeleteHandler<'_, B> {
        DeleteHandler::new(&self.graph, &self.types, self.config.delete_policy)
    }

    fn mapper(&self) -> TypedInstanceToGraphMapper<'_, B> {
        let mapper =
            TypedInstanceToGraphMapper::new(&self.graph, &self.types, self.config.delete_policy);
        if self.config.full_text {
            mapper.with_full_text(&self.full_text_mapper)
        } else {
            mapper
        }
    }
}
