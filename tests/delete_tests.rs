use metagraph::{
    AttrValue, DeleteContext, DeleteHandler, DeletePolicy, EntityState, MetaGraphError,
    RepositoryConfig, TypedInstance,
};

#[path = "catalog_common.rs"]
mod catalog_common;

use catalog_common::{
    column, create_table, database, existing, names, reference, repository, stored_list, vertex,
};

fn policies() -> [RepositoryConfig; 2] {
    [RepositoryConfig::soft(), RepositoryConfig::hard()]
}

#[test]
fn test_composite_children_cascade_and_shared_targets_survive() {
    for cfg in policies() {
        let repo = repository(cfg.clone());
        let created = create_table(&repo, &["id", "amount", "placed_at"]);

        let mutations = repo
            .delete_entities(&[created.table.as_str()])
            .expect("delete table");

        assert_eq!(mutations.deleted.len(), 4);
        assert!(mutations.deleted.contains(&created.table));
        for column_guid in &created.columns {
            assert!(mutations.deleted.contains(column_guid));
            match cfg.delete_policy {
                DeletePolicy::Soft => {
                    let stored = repo.get_entity(column_guid).expect("soft-deleted column");
                    assert_eq!(stored.id.expect("id").state, EntityState::Deleted);
                }
                DeletePolicy::Hard => {
                    let err = repo.get_entity(column_guid).unwrap_err();
                    assert!(matches!(err, MetaGraphError::NotFound(_)));
                }
            }
        }
        let db = repo.get_entity(&created.db).expect("database");
        assert_eq!(db.id.expect("id").state, EntityState::Active);
        assert_eq!(repo.entity_list("Database").expect("list"), vec![created.db.clone()]);
        assert!(repo.entity_list("Column").expect("list").is_empty());
        assert!(repo.entity_list("Table").expect("list").is_empty());
    }
}

#[test]
fn test_array_update_keeps_unaffected_edges() {
    let repo = repository(RepositoryConfig::hard());
    let created = create_table(&repo, &["a", "b", "c"]);
    let before = stored_list(&repo, &created.table, "Table.columns");
    assert_eq!(before.len(), 3);

    let update = existing("Table", &created.table).with(
        "columns",
        AttrValue::Array(vec![
            reference("Column", &created.columns[0]),
            reference("Column", &created.columns[2]),
            AttrValue::Entity(column("d")),
        ]),
    );
    let mutations = repo.update_partial(&update).expect("update");

    let after = stored_list(&repo, &created.table, "Table.columns");
    assert_eq!(after.len(), 3);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[1], before[2]);
    assert!(!before.contains(&after[2]));

    assert_eq!(mutations.created.len(), 1);
    assert_eq!(mutations.updated, vec![created.table.clone()]);
    assert_eq!(mutations.deleted, vec![created.columns[1].clone()]);

    let stored = repo.get_entity(&created.table).expect("table");
    assert_eq!(names(stored.get("columns")), vec!["a", "c", "d"]);
    let err = repo.get_entity(&created.columns[1]).unwrap_err();
    assert!(matches!(err, MetaGraphError::NotFound(_)));
}

#[test]
fn test_soft_array_update_retains_deleted_entry_until_next_update() {
    let repo = repository(RepositoryConfig::soft());
    let created = create_table(&repo, &["a", "b", "c"]);
    let before = stored_list(&repo, &created.table, "Table.columns");

    let update = existing("Table", &created.table).with(
        "columns",
        AttrValue::Array(vec![
            reference("Column", &created.columns[0]),
            reference("Column", &created.columns[2]),
            AttrValue::Entity(column("d")),
        ]),
    );
    repo.update_partial(&update).expect("update");

    let after = stored_list(&repo, &created.table, "Table.columns");
    assert_eq!(after.len(), 4);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[1], before[2]);
    assert_eq!(after[3], before[1]);
    let stored = repo.get_entity(&created.table).expect("table");
    assert_eq!(names(stored.get("columns")), vec!["a", "c", "d"]);
    let removed = repo.get_entity(&created.columns[1]).expect("deleted column");
    assert_eq!(removed.id.expect("id").state, EntityState::Deleted);

    // the next write of the attribute drops the inactive entry
    let d_guid = catalog_common::guids(stored.get("columns"))[2].clone();
    let update = existing("Table", &created.table).with(
        "columns",
        AttrValue::Array(vec![
            reference("Column", &created.columns[0]),
            reference("Column", &created.columns[2]),
            reference("Column", &d_guid),
        ]),
    );
    repo.update_partial(&update).expect("second update");
    assert_eq!(
        stored_list(&repo, &created.table, "Table.columns"),
        after[..3].to_vec()
    );
}

fn create_team(repo: &metagraph::MetadataRepository<metagraph::SqliteGraph>) -> (String, String) {
    let team = TypedInstance::entity("Team").with("name", AttrValue::string("core"));
    let person = TypedInstance::entity("Person")
        .with("name", AttrValue::string("ada"))
        .with("team", team.reference().expect("team id"));
    let team = team.with(
        "members",
        AttrValue::Array(vec![person.reference().expect("person id")]),
    );
    let mutations = repo.create_entities(&[team, person]).expect("create team");
    (mutations.guids[0].clone(), mutations.guids[1].clone())
}

#[test]
fn test_removing_last_required_member_fails_and_changes_nothing() {
    for cfg in policies() {
        let repo = repository(cfg);
        let (team, ada) = create_team(&repo);
        let members_before = stored_list(&repo, &team, "Team.members");
        let vertices = repo.graph().vertex_count().expect("count");

        let err = repo.delete_entities(&[ada.as_str()]).unwrap_err();
        match err {
            MetaGraphError::RequiredAttributeViolation { attribute, .. } => {
                assert_eq!(attribute, "Team.members")
            }
            other => panic!("unexpected error {other:?}"),
        }

        assert_eq!(repo.graph().vertex_count().expect("count"), vertices);
        assert_eq!(stored_list(&repo, &team, "Team.members"), members_before);
        let person = repo.get_entity(&ada).expect("person");
        assert_eq!(person.id.expect("id").state, EntityState::Active);
    }
}

#[test]
fn test_emptying_required_collection_on_update_fails() {
    for cfg in policies() {
        let repo = repository(cfg);
        let (team, _) = create_team(&repo);
        let members_before = stored_list(&repo, &team, "Team.members");

        let err = repo
            .update_partial(&existing("Team", &team).with("members", AttrValue::Array(Vec::new())))
            .unwrap_err();
        assert!(matches!(
            err,
            MetaGraphError::RequiredAttributeViolation { ref attribute, .. } if attribute == "Team.members"
        ));

        assert_eq!(stored_list(&repo, &team, "Team.members"), members_before);
        let stored = repo.get_entity(&team).expect("team");
        assert_eq!(stored.id.expect("id").version, 0);
    }
}

#[test]
fn test_full_update_without_required_reference_fails() {
    let repo = repository(RepositoryConfig::hard());
    let created = create_table(&repo, &["id"]);

    let err = repo
        .update_entities(&[existing("Table", &created.table).with("name", AttrValue::string("orders"))])
        .unwrap_err();
    assert!(matches!(
        err,
        MetaGraphError::RequiredAttributeViolation { ref attribute, .. } if attribute == "Table.db"
    ));

    let stored = repo.get_entity(&created.table).expect("table");
    let Some(AttrValue::Reference(db)) = stored.get("db") else {
        panic!("expected the database reference, got {:?}", stored.get("db"));
    };
    assert_eq!(db.guid.to_string(), created.db);
    assert_eq!(names(stored.get("columns")), vec!["id"]);
}

#[test]
fn test_create_without_required_reference_fails() {
    let repo = repository(RepositoryConfig::default());
    let err = repo
        .create_entities(&[TypedInstance::entity("Table").with("name", AttrValue::string("orders"))])
        .unwrap_err();
    assert!(matches!(
        err,
        MetaGraphError::RequiredAttributeViolation { ref attribute, .. } if attribute == "Table.db"
    ));
    assert_eq!(repo.graph().vertex_count().expect("count"), 0);
}

#[test]
fn test_removing_one_of_two_members_updates_the_team() {
    for cfg in policies() {
        let repo = repository(cfg.clone());
        let (team, ada) = create_team(&repo);
        let grace = repo
            .create_entities(&[TypedInstance::entity("Person")
                .with("name", AttrValue::string("grace"))
                .with("team", reference("Team", &team))])
            .expect("second member")
            .guids
            .remove(0);
        repo.update_partial(&existing("Team", &team).with(
            "members",
            AttrValue::Array(vec![reference("Person", &ada), reference("Person", &grace)]),
        ))
        .expect("write reverse side");

        let mutations = repo.delete_entities(&[ada.as_str()]).expect("delete member");
        assert_eq!(mutations.deleted, vec![ada.clone()]);
        assert_eq!(mutations.updated, vec![team.clone()]);

        let stored = repo.get_entity(&team).expect("team");
        assert_eq!(
            catalog_common::guids(stored.get("members")),
            vec![grace.clone()]
        );
        let expected_entries = if cfg.delete_policy.is_hard() { 1 } else { 2 };
        assert_eq!(
            stored_list(&repo, &team, "Team.members").len(),
            expected_entries
        );
    }
}

#[test]
fn test_second_delete_is_a_noop() {
    let repo = repository(RepositoryConfig::soft());
    let guid = repo.create_entities(&[database("sales")]).expect("create").guids.remove(0);

    let first = repo.delete_entities(&[guid.as_str()]).expect("first delete");
    assert_eq!(first.deleted, vec![guid.clone()]);
    let second = repo.delete_entities(&[guid.as_str()]).expect("second delete");
    assert!(second.is_empty());

    let graph = repo.graph();
    let handler = DeleteHandler::new(graph, repo.types(), DeletePolicy::Soft);
    let mut context = DeleteContext::new(1);
    handler
        .delete_entity(&mut context, vertex(&repo, &guid))
        .expect("delete via handler");
    assert!(context.pending_actions().is_empty());
    assert!(context.deleted_guids().is_empty());
}

#[test]
fn test_child_owned_by_two_parents_is_deleted_once() {
    for cfg in policies() {
        let repo = repository(cfg.clone());
        let dataset = TypedInstance::entity("Dataset").with("name", AttrValue::string("daily"));
        let second = TypedInstance::entity("Process")
            .with("name", AttrValue::string("load"))
            .with("output", dataset.reference().expect("dataset id"));
        let first = TypedInstance::entity("Process")
            .with("name", AttrValue::string("extract"))
            .with("output", AttrValue::Entity(dataset));
        let mutations = repo.create_entities(&[first, second]).expect("create");
        assert_eq!(mutations.created.len(), 3);
        let (extract, load) = (mutations.guids[0].clone(), mutations.guids[1].clone());

        let deleted = repo
            .delete_entities(&[extract.as_str(), load.as_str()])
            .expect("delete both");
        assert_eq!(deleted.deleted.len(), 3);
        assert!(deleted.updated.is_empty());

        if cfg.delete_policy.is_hard() {
            assert_eq!(repo.graph().vertex_count().expect("count"), 0);
            assert_eq!(repo.graph().edge_count().expect("count"), 0);
        } else {
            for guid in &deleted.deleted {
                let stored = repo.get_entity(guid).expect("deleted entity");
                assert_eq!(stored.id.expect("id").state, EntityState::Deleted);
            }
        }
    }
}

#[test]
fn test_deleting_one_owner_detaches_the_other() {
    let repo = repository(RepositoryConfig::soft());
    let dataset = TypedInstance::entity("Dataset").with("name", AttrValue::string("daily"));
    let second = TypedInstance::entity("Process")
        .with("name", AttrValue::string("load"))
        .with("output", dataset.reference().expect("dataset id"));
    let first = TypedInstance::entity("Process")
        .with("name", AttrValue::string("extract"))
        .with("output", AttrValue::Entity(dataset));
    let mutations = repo.create_entities(&[first, second]).expect("create");
    let (extract, load) = (mutations.guids[0].clone(), mutations.guids[1].clone());

    let deleted = repo.delete_entities(&[extract.as_str()]).expect("delete");
    assert_eq!(deleted.deleted.len(), 2);
    assert_eq!(deleted.updated, vec![load.clone()]);

    let remaining = repo.get_entity(&load).expect("load");
    assert_eq!(remaining.id.as_ref().expect("id").state, EntityState::Active);
    assert_eq!(remaining.get("output"), None);
}

#[test]
fn test_required_shared_reference_blocks_target_delete() {
    let repo = repository(RepositoryConfig::hard());
    let created = create_table(&repo, &["id"]);

    let err = repo.delete_entities(&[created.db.as_str()]).unwrap_err();
    assert!(matches!(
        err,
        MetaGraphError::RequiredAttributeViolation { ref attribute, .. } if attribute == "Table.db"
    ));
    assert_eq!(repo.entity_list("Database").expect("list"), vec![created.db.clone()]);

    // deleting the holder in the same request lifts the constraint
    let mutations = repo
        .delete_entities(&[created.db.as_str(), created.table.as_str()])
        .expect("delete together");
    assert_eq!(mutations.deleted.len(), 3);
    assert_eq!(repo.graph().vertex_count().expect("count"), 0);
}

#[test]
fn test_soft_delete_marks_and_hard_delete_removes() {
    for cfg in policies() {
        let repo = repository(cfg.clone());
        let guid = repo.create_entities(&[database("sales")]).expect("create").guids.remove(0);
        repo.delete_entities(&[guid.as_str()]).expect("delete");

        assert!(repo.entity_list("Database").expect("list").is_empty());
        match cfg.delete_policy {
            DeletePolicy::Soft => {
                assert_eq!(repo.graph().vertex_count().expect("count"), 1);
                let stored = repo.get_entity(&guid).expect("soft-deleted");
                assert_eq!(stored.id.as_ref().expect("id").state, EntityState::Deleted);
                assert_eq!(stored.get("name"), Some(&AttrValue::string("sales")));
            }
            DeletePolicy::Hard => {
                assert_eq!(repo.graph().vertex_count().expect("count"), 0);
                assert!(matches!(
                    repo.get_entity(&guid).unwrap_err(),
                    MetaGraphError::NotFound(_)
                ));
            }
        }
    }
}

#[test]
fn test_delete_of_unknown_guid_is_not_found() {
    let repo = repository(RepositoryConfig::default());
    let err = repo.delete_entities(&["missing"]).unwrap_err();
    assert!(matches!(err, MetaGraphError::NotFound(_)));
    let err = repo.delete_entities(&[]).unwrap_err();
    assert!(matches!(err, MetaGraphError::InvalidInput(_)));
}

#[test]
fn test_deleted_entity_cannot_be_updated() {
    let repo = repository(RepositoryConfig::soft());
    let guid = repo.create_entities(&[database("sales")]).expect("create").guids.remove(0);
    repo.delete_entities(&[guid.as_str()]).expect("delete");

    let err = repo
        .update_partial(&existing("Database", &guid).with("owner", AttrValue::string("bob")))
        .unwrap_err();
    assert!(matches!(err, MetaGraphError::InvalidInput(_)));
}
