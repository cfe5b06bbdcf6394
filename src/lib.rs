//! Typed metadata entities persisted as a property graph on SQLite.
//!
//! metagraph stores entities (classes with structs, traits, enums,
//! primitives and collections of these) as vertices, edges and JSON
//! properties, and keeps the typed view and the stored graph consistent
//! across create, update and cascading delete.
//!
//! # Quick Start
//!
//! ```rust
//! use metagraph::{
//!     AttrValue, AttributeDef, DataType, MetadataRepository, PrimitiveType, RepositoryConfig,
//!     TypeSystem, TypedInstance,
//! };
//!
//! let mut types = TypeSystem::new();
//! types.define_class(
//!     "Database",
//!     &[],
//!     vec![AttributeDef::new("name", DataType::Primitive(PrimitiveType::String)).unique()],
//! )?;
//!
//! let repo = MetadataRepository::in_memory(types, &RepositoryConfig::default())?;
//! let db = TypedInstance::entity("Database").with("name", AttrValue::string("sales"));
//! let mutations = repo.create_entities(&[db])?;
//!
//! let stored = repo.get_entity(&mutations.guids[0])?;
//! assert_eq!(stored.get("name"), Some(&AttrValue::string("sales")));
//! # Ok::<(), metagraph::MetaGraphError>(())
//! ```
//!
//! # Public API Organization
//!
//! ## Repository
//! - [`MetadataRepository`] - transactional entity operations
//! - [`open_repository()`] - file-backed factory
//! - [`RepositoryConfig`], [`DeletePolicy`], [`SqliteConfig`] - configuration
//!
//! ## Core
//! - [`TypedInstanceToGraphMapper`] - write path (discovery + mapping)
//! - [`GraphToTypedInstanceMapper`] - read path
//! - [`DeleteHandler`], [`DeleteContext`] - cascading delete
//! - [`diff`] - collection keep / add / remove computation
//!
//! ## Storage
//! - [`GraphBackend`] - element access the core is written against
//! - [`SqliteGraph`] - SQLite implementation

pub mod backend;
pub mod cache;
pub mod config;
pub mod constants;
pub mod delete;
pub mod diff;
pub mod errors;
pub mod fulltext;
pub mod graph;
pub mod helper;
pub mod instance;
pub mod mapper;
pub mod repository;
pub mod request;
pub mod schema;
pub mod types;
pub mod walker;

pub use crate::backend::GraphBackend;
pub use crate::config::{DeletePolicy, RepositoryConfig, SqliteConfig, open_repository};
pub use crate::delete::{DeleteAction, DeleteContext, DeleteHandler};
pub use crate::errors::MetaGraphError;
pub use crate::fulltext::{DefaultFullTextMapper, FullTextMapper};
pub use crate::graph::{Direction, EdgeId, EdgeRecord, ElementId, SqliteGraph, VertexId};
pub use crate::helper::GraphHelper;
pub use crate::instance::{
    AttrValue, EntityState, EnumValue, Guid, Id, PrimitiveValue, TypedInstance,
};
pub use crate::mapper::{GraphToTypedInstanceMapper, Operation, TypedInstanceToGraphMapper};
pub use crate::repository::MetadataRepository;
pub use crate::request::{EntityMutations, RequestContext};
pub use crate::types::{
    AttributeDef, AttributeInfo, DataType, Multiplicity, Ownership, PrimitiveType, TypeCategory,
    TypeSystem,
};
