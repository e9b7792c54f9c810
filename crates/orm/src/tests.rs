//! Pipeline tests for the query dispatch layer
//!
//! Cover the ordering of terminal policies, session resets and the SQL the
//! resolver builds, using the in-memory backend as storage.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::backends::MemoryBackend;
use crate::collection::Fetched;
use crate::database::Database;
use crate::error::ModelError;
use crate::model::{ModelDefinition, ModelRegistry};
use crate::relationships::{RelationDeclaration, RelationKind};

fn registry() -> ModelRegistry {
    ModelRegistry::new()
        .with(
            ModelDefinition::new("User")
                .with_hidden(&["password"])
                .with_relation("profile", RelationDeclaration::has_one("Profile"))
                .with_relation("posts", RelationDeclaration::has_many("Post"))
                .with_relation("roles", RelationDeclaration::belongs_to_many("Role").with_pivot(&["level"])),
        )
        .with(ModelDefinition::new("Profile").without_soft_deletes())
        .with(
            ModelDefinition::new("Post")
                .with_relation("author", RelationDeclaration::belongs_to("User"))
                .with_relation("comments", RelationDeclaration::has_many("Comment")),
        )
        .with(ModelDefinition::new("Comment"))
        .with(ModelDefinition::new("Role").without_soft_deletes())
}

fn backend() -> Arc<MemoryBackend> {
    Arc::new(
        MemoryBackend::new()
            .with_table(
                "users",
                vec![
                    json!({"id": 1, "name": "Ann", "password": "a", "deleted_at": null}),
                    json!({"id": 2, "name": "Bob", "password": "b", "deleted_at": null}),
                    json!({"id": 3, "name": "Cid", "password": "c", "deleted_at": "2020-01-01"}),
                ],
            )
            .with_table("profiles", vec![json!({"id": 10, "user_id": 1, "bio": "hello"})])
            .with_table(
                "posts",
                vec![
                    json!({"id": 1, "user_id": 1, "title": "first", "deleted_at": null}),
                    json!({"id": 2, "user_id": 1, "title": "gone", "deleted_at": "2020-01-01"}),
                    json!({"id": 3, "user_id": 2, "title": "third", "deleted_at": null}),
                ],
            )
            .with_table("roles", vec![json!({"id": 1, "name": "admin"})])
            .with_table("role_user", vec![json!({"user_id": 1, "role_id": 1, "level": 3})]),
    )
}

fn database(backend: &Arc<MemoryBackend>) -> Database {
    Database::new(backend.clone(), registry()).unwrap()
}

#[test]
fn test_soft_delete_predicate_is_table_qualified() {
    let backend = backend();
    let db = database(&backend);
    let query = db.query("Post").unwrap().where_eq("user_id", 1);
    assert_eq!(
        query.to_sql(),
        "SELECT * FROM posts WHERE user_id = 1 AND posts.deleted_at IS NULL"
    );
    assert_eq!(
        query.with_trashed().to_sql(),
        "SELECT * FROM posts WHERE user_id = 1"
    );
}

#[test]
fn test_instance_has_one_is_constrained_to_the_host_key() {
    let backend = backend();
    let db = database(&backend);
    let user = db.model("User", json!({"id": 5})).unwrap();
    let profile = user.has_one("Profile", None, None).unwrap();
    assert_eq!(
        profile.to_sql(),
        "SELECT * FROM profiles WHERE profiles.user_id = 5 LIMIT 1"
    );
}

#[test]
fn test_instance_belongs_to_many_projects_pivot_columns() {
    let backend = backend();
    let db = database(&backend);
    let user = db.model("User", json!({"id": 1})).unwrap();
    let roles = user
        .belongs_to_many("Role", None, None, None)
        .unwrap()
        .with_pivot(&["level"]);
    assert_eq!(
        roles.to_sql(),
        "SELECT roles.*, role_user.level as _pivot_level FROM roles \
         INNER JOIN role_user ON role_user.role_id = roles.id WHERE role_user.user_id = 1"
    );
}

#[test]
fn test_instance_relation_without_host_key_fails() {
    let backend = backend();
    let db = database(&backend);
    let user = db.model("User", json!({"name": "nobody"})).unwrap();
    assert!(matches!(
        user.has_many("Post", None, None),
        Err(ModelError::Relationship(_))
    ));
}

#[test]
fn test_definition_bound_declaration_executes_nothing() {
    let backend = backend();
    let db = database(&backend);
    let mut users = db.query("User").unwrap();

    let profiles = users.has_one("Profile", None, None).unwrap();
    assert_eq!(profiles.definition().name(), "Profile");

    let active = users.active_relation().unwrap();
    assert_eq!(active.kind, RelationKind::HasOne);
    assert_eq!(active.target_key, "id");
    assert_eq!(active.relation_key, "user_id");
    assert!(backend.executed().is_empty());
}

#[test]
fn test_declare_carries_nested_scope() {
    let backend = backend();
    let db = database(&backend);
    let mut users = db.query("User").unwrap().with(&["posts.comments", "profile"]);
    assert_eq!(users.eager_relations(), ["posts".to_string(), "profile".to_string()]);
    assert_eq!(users.nested_scope("posts"), ["comments".to_string()]);

    let posts = users.declare("posts").unwrap();
    assert_eq!(posts.eager_relations(), ["comments".to_string()]);
    assert_eq!(users.active_relation().unwrap().nested_scope, vec!["comments".to_string()]);
}

#[test]
fn test_direct_declaration_keeps_nested_scope() {
    let backend = backend();
    let db = database(&backend);
    let mut users = db.query("User").unwrap().with(&["posts.comments"]);

    let posts = users.has_many("Post", None, None).unwrap();
    assert_eq!(posts.eager_relations(), ["comments".to_string()]);
    assert_eq!(users.active_relation().unwrap().nested_scope, vec!["comments".to_string()]);

    let profile = users.has_one("Profile", None, None).unwrap();
    assert!(profile.eager_relations().is_empty());
    assert!(users.active_relation().unwrap().nested_scope.is_empty());
}

#[tokio::test]
async fn test_session_resets_after_success() {
    let backend = backend();
    let db = database(&backend);
    let mut posts = db.query("Post").unwrap().where_eq("user_id", 2).with_trashed();

    let rows = posts.all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(posts.session().is_unconditioned());
    assert!(!posts.is_with_trashed());

    let rows = posts.all().await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_session_resets_after_failure() {
    let backend = backend();
    let db = database(&backend);
    backend.fail_on("posts");

    let mut users = db.query("User").unwrap().where_eq("id", 1).with(&["posts"]);
    let err = users.all().await.unwrap_err();
    assert!(err.is_upstream());
    assert!(users.session().is_unconditioned());
    assert!(users.eager_relations().is_empty());

    backend.recover("posts");
    let rows = users.all().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| !row.contains_key("posts")));
}

#[tokio::test]
async fn test_visibility_runs_before_getters() {
    let backend = backend();
    let registry = ModelRegistry::new().with(
        ModelDefinition::new("User")
            .with_hidden(&["password"])
            .with_getter("password", |_| json!("revealed"))
            .with_getter("name", |v| json!(v.as_str().unwrap_or_default().to_lowercase())),
    );
    let db = Database::new(backend.clone(), registry).unwrap();

    let rows = db.query("User").unwrap().all().await.unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert!(!row.contains_key("password"));
    }
    assert_eq!(rows.pluck("name"), vec![json!("ann"), json!("bob")]);
}

#[tokio::test]
async fn test_limit_one_session_unwraps_single_row() {
    let backend = backend();
    let db = database(&backend);
    let user = db.model("User", json!({"id": 1})).unwrap();

    match user.has_one("Profile", None, None).unwrap().fetch().await.unwrap() {
        Fetched::One(Some(profile)) => assert_eq!(profile["bio"], json!("hello")),
        other => panic!("expected a single profile, got {:?}", other),
    }

    let user = db.model("User", json!({"id": 2})).unwrap();
    let fetched = user.has_one("Profile", None, None).unwrap().fetch().await.unwrap();
    assert_eq!(fetched, Fetched::One(None));
}

#[tokio::test]
async fn test_paginate_never_unwraps_single_page_rows() {
    let backend = backend();
    let db = database(&backend);
    let page = db.query("User").unwrap().paginate(2, 1).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.last_page, 2);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data.pluck("id"), vec![json!(2)]);
}

#[tokio::test]
async fn test_find_binds_instance_session_to_key() {
    let backend = backend();
    let db = database(&backend);
    let mut user = db.query("User").unwrap().find(2).await.unwrap().unwrap();
    assert!(user.is_hydrated());
    assert_eq!(user.get("password"), None);

    backend.clear_log();
    user.update(Some(json!({"name": "Bea"}))).await.unwrap();
    let executed = backend.executed();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].starts_with("UPDATE users SET name = 'Bea', updated_at = '"));
    assert!(executed[0].ends_with("WHERE id = 2"));
}

#[tokio::test]
async fn test_eager_attachment_uses_soft_delete_pipeline() {
    let backend = backend();
    let db = database(&backend);
    let rows = db.query("User").unwrap().with(&["posts"]).all().await.unwrap();

    let ann_posts = rows.get(0).and_then(|row| row["posts"].as_array()).unwrap();
    let titles: Vec<&Value> = ann_posts.iter().map(|post| &post["title"]).collect();
    assert_eq!(titles, vec![&json!("first")]);
    assert!(backend
        .executed()
        .contains(&"SELECT * FROM posts WHERE posts.user_id IN (1, 2) AND posts.deleted_at IS NULL".to_string()));
}
