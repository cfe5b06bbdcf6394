use metagraph::{AttrValue, MetaGraphError, RepositoryConfig, TypedInstance, open_repository};
use tempfile::tempdir;

#[path = "catalog_common.rs"]
mod catalog_common;

use catalog_common::{catalog, create_table, database, repository, table};

#[test]
fn test_traits_attach_on_create_and_add() {
    let repo = repository(RepositoryConfig::default());
    let table = table("customers")
        .with_trait(TypedInstance::structure("PII").with("level", AttrValue::int(2)));
    let guid = repo.create_entities(&[table]).expect("create").guids.remove(0);

    assert_eq!(repo.trait_names(&guid).expect("traits"), vec!["PII"]);
    let stored = repo.get_entity(&guid).expect("read");
    assert_eq!(
        stored.traits.get("PII").and_then(|t| t.get("level")),
        Some(&AttrValue::int(2))
    );

    let mutations = repo
        .add_trait(&guid, &TypedInstance::structure("Audited"))
        .expect("add trait");
    assert_eq!(mutations.updated, vec![guid.clone()]);
    assert_eq!(repo.trait_names(&guid).expect("traits"), vec!["PII", "Audited"]);

    let err = repo
        .add_trait(&guid, &TypedInstance::structure("PII"))
        .unwrap_err();
    assert!(matches!(err, MetaGraphError::AlreadyExists(_)));
}

#[test]
fn test_delete_trait_removes_trait_vertex_under_soft_policy() {
    let repo = repository(RepositoryConfig::soft());
    let table = table("customers")
        .with_trait(TypedInstance::structure("PII").with("level", AttrValue::int(3)))
        .with_trait(TypedInstance::structure("Audited"));
    let guid = repo.create_entities(&[table]).expect("create").guids.remove(0);
    assert_eq!(repo.graph().vertex_count().expect("count"), 4);

    repo.delete_trait(&guid, "PII").expect("delete trait");

    assert_eq!(repo.graph().vertex_count().expect("count"), 3);
    assert_eq!(repo.trait_names(&guid).expect("traits"), vec!["Audited"]);
    let stored = repo.get_entity(&guid).expect("read");
    assert!(!stored.traits.contains_key("PII"));
    assert!(stored.traits.contains_key("Audited"));

    let err = repo.delete_trait(&guid, "PII").unwrap_err();
    assert!(matches!(err, MetaGraphError::NotFound(_)));
}

#[test]
fn test_unknown_trait_type_is_rejected() {
    let repo = repository(RepositoryConfig::default());
    let guid = repo.create_entities(&[database("sales")]).expect("create").guids.remove(0);
    let err = repo
        .add_trait(&guid, &TypedInstance::structure("Confidential"))
        .unwrap_err();
    assert!(matches!(err, MetaGraphError::NotFound(_)));
}

#[test]
fn test_lookup_by_unique_attribute() {
    let repo = repository(RepositoryConfig::default());
    let guid = repo
        .create_entities(&[database("sales").with("owner", AttrValue::string("alice"))])
        .expect("create")
        .guids
        .remove(0);

    let found = repo
        .get_entity_by_unique_attribute("Database", "name", &AttrValue::string("sales"))
        .expect("lookup");
    assert_eq!(found.guid(), Some(guid.as_str()));

    let err = repo
        .get_entity_by_unique_attribute("Database", "name", &AttrValue::string("hr"))
        .unwrap_err();
    assert!(matches!(err, MetaGraphError::NotFound(_)));

    let err = repo
        .get_entity_by_unique_attribute("Database", "owner", &AttrValue::string("alice"))
        .unwrap_err();
    assert!(matches!(err, MetaGraphError::InvalidInput(_)));
}

#[test]
fn test_entity_list_is_per_type() {
    let repo = repository(RepositoryConfig::default());
    let created = create_table(&repo, &["id", "amount"]);

    assert_eq!(repo.entity_list("Table").expect("tables"), vec![created.table]);
    assert_eq!(repo.entity_list("Column").expect("columns").len(), 2);
    assert!(matches!(
        repo.entity_list("Nope").unwrap_err(),
        MetaGraphError::NotFound(_)
    ));
}

#[test]
fn test_failed_request_leaves_store_unchanged() {
    let repo = repository(RepositoryConfig::default());
    let db = database("sales");
    let bad_table = TypedInstance::entity("Table")
        .with("name", AttrValue::string("orders"))
        .with("db", db.reference().expect("db id"))
        .with("tags", AttrValue::int(4));

    let err = repo
        .create_entities(&[db, bad_table])
        .unwrap_err();
    assert!(matches!(err, MetaGraphError::InvalidInput(_)));
    assert_eq!(repo.graph().vertex_count().expect("count"), 0);
    assert!(repo.entity_list("Database").expect("list").is_empty());

    // the repository stays usable after a rollback
    repo.create_entities(&[database("sales")]).expect("create after failure");
    assert_eq!(repo.entity_list("Database").expect("list").len(), 1);
}

#[test]
fn test_mutations_serialize_as_json() {
    let repo = repository(RepositoryConfig::default());
    let mutations = repo.create_entities(&[database("sales")]).expect("create");
    let json = serde_json::to_value(&mutations).expect("serialize");
    assert_eq!(json["created"][0], serde_json::json!(mutations.guids[0]));
    assert_eq!(json["deleted"], serde_json::json!([]));
}

#[test]
fn test_file_backed_repository_survives_reopen() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("catalog.db");
    let cfg = RepositoryConfig::hard();

    let guid = {
        let repo = open_repository(&path, catalog(), &cfg).expect("open");
        repo.create_entities(&[database("sales")])
            .expect("create")
            .guids
            .remove(0)
    };

    let repo = open_repository(&path, catalog(), &cfg).expect("reopen");
    let stored = repo.get_entity(&guid).expect("read after reopen");
    assert_eq!(stored.get("name"), Some(&AttrValue::string("sales")));

    let again = repo.create_entities(&[database("sales")]).expect("idempotent create");
    assert_eq!(again.guids, vec![guid]);
}
