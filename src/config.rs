//! Repository configuration and the file-backed factory.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::{
    errors::MetaGraphError, graph::SqliteGraph, repository::MetadataRepository, types::TypeSystem,
};

/// What happens to vertices and edges removed by a delete walk.
///
/// # Default Behavior
///
/// The default is [`DeletePolicy::Soft`]: elements stay in the store with
/// their state set to `DELETED`, so references held elsewhere still resolve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Mark elements `DELETED` and keep them.
    #[default]
    Soft,
    /// Physically remove elements.
    Hard,
}

impl DeletePolicy {
    pub fn is_hard(&self) -> bool {
        matches!(self, DeletePolicy::Hard)
    }
}

/// SQLite-specific options.
///
/// ```rust
/// use metagraph::SqliteConfig;
/// let config = SqliteConfig::default();
/// assert!(config.cache_size.is_none());
/// assert!(config.pragma_settings.is_empty());
/// assert!(config.unique_attribute_indexes);
/// ```
#[derive(Clone, Debug)]
pub struct SqliteConfig {
    /// Prepared statement cache capacity. `None` keeps the rusqlite default.
    pub cache_size: Option<usize>,

    /// PRAGMAs applied right after the database is opened, e.g.
    /// `journal_mode = WAL` or `synchronous = NORMAL`.
    pub pragma_settings: HashMap<String, String>,

    /// Create a partial unique index for every attribute declared unique
    /// in the type system, so the store rejects duplicates even when the
    /// discovery lookup is bypassed.
    ///
    /// **Default:** `true`
    pub unique_attribute_indexes: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            cache_size: None,
            pragma_settings: HashMap::new(),
            unique_attribute_indexes: true,
        }
    }
}

/// Complete repository configuration.
///
/// ```rust
/// use metagraph::{DeletePolicy, RepositoryConfig};
///
/// let cfg = RepositoryConfig::default();
/// assert_eq!(cfg.delete_policy, DeletePolicy::Soft);
/// assert!(cfg.full_text);
///
/// let mut hard = RepositoryConfig::hard();
/// hard.sqlite.pragma_settings.insert("journal_mode".to_string(), "WAL".to_string());
/// assert_eq!(hard.delete_policy, DeletePolicy::Hard);
/// ```
#[derive(Clone, Debug)]
pub struct RepositoryConfig {
    pub delete_policy: DeletePolicy,
    /// Maintain the aggregate full-text property on every created or
    /// updated entity.
    pub full_text: bool,
    pub sqlite: SqliteConfig,
}

impl RepositoryConfig {
    pub fn new(delete_policy: DeletePolicy) -> Self {
        Self {
            delete_policy,
            full_text: true,
            sqlite: SqliteConfig::default(),
        }
    }

    pub fn soft() -> Self {
        Self::new(DeletePolicy::Soft)
    }

    pub fn hard() -> Self {
        Self::new(DeletePolicy::Hard)
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self::soft()
    }
}

/// Opens (creating if needed) a file-backed repository.
pub fn open_repository<P: AsRef<Path>>(
    path: P,
    types: TypeSystem,
    cfg: &RepositoryConfig,
) -> Result<MetadataRepository<SqliteGraph>, MetaGraphError> {
    let graph = SqliteGraph::open(&path)?;
    info!(path = %path.as_ref().display(), policy = ?cfg.delete_policy, "opening metadata repository");
    prepare_graph(&graph, &types, cfg)?;
    Ok(MetadataRepository::new(graph, types, cfg))
}

pub(crate) fn prepare_graph(
    graph: &SqliteGraph,
    types: &TypeSystem,
    cfg: &RepositoryConfig,
) -> Result<(), MetaGraphError> {
    graph.configure(&cfg.sqlite)?;
    if cfg.sqlite.unique_attribute_indexes {
        for key in types.unique_property_keys() {
            graph.ensure_unique_index(&key)?;
        }
    }
    Ok(())
}
