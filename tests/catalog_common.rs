#![allow(dead_code)]

use metagraph::{
    AttrValue, AttributeDef, DataType, GraphHelper, Id, MetadataRepository, Multiplicity,
    PrimitiveType, RepositoryConfig, SqliteGraph, TypeSystem, TypedInstance, VertexId,
};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn string() -> DataType {
    DataType::Primitive(PrimitiveType::String)
}

/// Small Hive-like catalog plus a few types for reference edge cases.
pub fn catalog() -> TypeSystem {
    let mut types = TypeSystem::new();
    types
        .define_enum("TableType", &["MANAGED", "EXTERNAL"])
        .expect("enum");
    types
        .define_struct(
            "StorageDesc",
            vec![
                AttributeDef::new("location", string()),
                AttributeDef::new("compressed", DataType::Primitive(PrimitiveType::Boolean)),
            ],
        )
        .expect("struct");
    types
        .define_trait(
            "PII",
            &[],
            vec![AttributeDef::new("level", DataType::Primitive(PrimitiveType::Int))],
        )
        .expect("trait");
    types.define_trait("Audited", &[], vec![]).expect("trait");
    types
        .define_class(
            "Database",
            &[],
            vec![
                AttributeDef::new("name", string()).unique(),
                AttributeDef::new("owner", string()),
            ],
        )
        .expect("database");
    types
        .define_class(
            "Column",
            &[],
            vec![
                AttributeDef::new("name", string()).required(),
                AttributeDef::new("data_type", string()),
            ],
        )
        .expect("column");
    types
        .define_class(
            "Table",
            &[],
            vec![
                AttributeDef::new("name", string()).unique(),
                AttributeDef::new("table_type", DataType::enumeration("TableType")),
                AttributeDef::new("created", DataType::Primitive(PrimitiveType::Date)),
                AttributeDef::new("retention", DataType::Primitive(PrimitiveType::Long)),
                AttributeDef::new("ratio", DataType::Primitive(PrimitiveType::Double)),
                AttributeDef::new("db", DataType::class("Database")).required(),
                AttributeDef::new("sd", DataType::structure("StorageDesc")),
                AttributeDef::new("columns", DataType::array(DataType::class("Column")))
                    .multiplicity(Multiplicity::OPTIONAL_COLLECTION)
                    .composite(),
                AttributeDef::new("tags", DataType::array(string()))
                    .multiplicity(Multiplicity::OPTIONAL_COLLECTION),
                AttributeDef::new("parameters", DataType::map(string()))
                    .multiplicity(Multiplicity::OPTIONAL_COLLECTION),
                AttributeDef::new("mirrors", DataType::map(DataType::class("Database")))
                    .multiplicity(Multiplicity::OPTIONAL_COLLECTION),
            ],
        )
        .expect("table");
    types
        .define_class(
            "Team",
            &[],
            vec![
                AttributeDef::new("name", string()).unique(),
                AttributeDef::new("members", DataType::array(DataType::class("Person")))
                    .multiplicity(Multiplicity::COLLECTION)
                    .reverse("team"),
            ],
        )
        .expect("team");
    types
        .define_class(
            "Person",
            &[],
            vec![
                AttributeDef::new("name", string()).unique(),
                AttributeDef::new("team", DataType::class("Team")).reverse("members"),
            ],
        )
        .expect("person");
    types
        .define_class("Dataset", &[], vec![AttributeDef::new("name", string())])
        .expect("dataset");
    types
        .define_class(
            "Process",
            &[],
            vec![
                AttributeDef::new("name", string()).unique(),
                AttributeDef::new("output", DataType::class("Dataset")).composite(),
            ],
        )
        .expect("process");
    types
        .define_class(
            "Node",
            &[],
            vec![
                AttributeDef::new("name", string()),
                AttributeDef::new("child", DataType::class("Node")).composite(),
            ],
        )
        .expect("node");
    types
}

pub fn repository(cfg: RepositoryConfig) -> MetadataRepository<SqliteGraph> {
    init_tracing();
    MetadataRepository::in_memory(catalog(), &cfg).expect("repository")
}

pub fn database(name: &str) -> TypedInstance {
    TypedInstance::entity("Database").with("name", AttrValue::string(name))
}

/// Table `name` in database `sales`, which is reused when it already exists.
pub fn table(name: &str) -> TypedInstance {
    TypedInstance::entity("Table")
        .with("name", AttrValue::string(name))
        .with("db", AttrValue::Entity(database("sales")))
}

pub fn column(name: &str) -> TypedInstance {
    TypedInstance::entity("Column")
        .with("name", AttrValue::string(name))
        .with("data_type", AttrValue::string("string"))
}

/// Existing entity addressed by GUID, with no attributes set.
pub fn existing(type_name: &str, guid: &str) -> TypedInstance {
    TypedInstance::with_id(Id::assigned(guid, type_name))
}

pub fn reference(type_name: &str, guid: &str) -> AttrValue {
    AttrValue::Reference(Id::assigned(guid, type_name))
}

pub struct CreatedTable {
    pub table: String,
    pub db: String,
    pub columns: Vec<String>,
}

/// Creates database `sales` and table `orders` owning one column per name.
pub fn create_table(repo: &MetadataRepository<SqliteGraph>, column_names: &[&str]) -> CreatedTable {
    let db = database("sales");
    let db_ref = db.reference().expect("db id");
    let table = TypedInstance::entity("Table")
        .with("name", AttrValue::string("orders"))
        .with("db", db_ref)
        .with(
            "columns",
            AttrValue::Array(
                column_names
                    .iter()
                    .map(|name| AttrValue::Entity(column(name)))
                    .collect(),
            ),
        );
    let mutations = repo.create_entities(&[db, table]).expect("create table");
    let stored = repo.get_entity(&mutations.guids[1]).expect("stored table");
    CreatedTable {
        db: mutations.guids[0].clone(),
        table: mutations.guids[1].clone(),
        columns: guids(stored.get("columns")),
    }
}

/// GUIDs of the entities in an array value, in order.
pub fn guids(value: Option<&AttrValue>) -> Vec<String> {
    match value {
        Some(AttrValue::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                AttrValue::Entity(instance) => instance.guid().map(str::to_string),
                AttrValue::Reference(id) => match &id.guid {
                    metagraph::Guid::Assigned(guid) => Some(guid.clone()),
                    metagraph::Guid::Transient(_) => None,
                },
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// `name` of every inline entity in an array value, in order.
pub fn names(value: Option<&AttrValue>) -> Vec<String> {
    match value {
        Some(AttrValue::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                AttrValue::Entity(instance) => instance
                    .get("name")
                    .and_then(AttrValue::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub fn vertex(repo: &MetadataRepository<SqliteGraph>, guid: &str) -> VertexId {
    GraphHelper::new(repo.graph())
        .vertex_for_guid(guid)
        .expect("vertex for guid")
}

/// Raw list property of an entity vertex.
pub fn stored_list(repo: &MetadataRepository<SqliteGraph>, guid: &str, key: &str) -> Vec<String> {
    GraphHelper::new(repo.graph())
        .string_list(vertex(repo, guid).into(), key)
        .expect("list property")
}
