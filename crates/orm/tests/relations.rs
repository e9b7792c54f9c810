//! Relation resolution, eager loading and model persistence against the in-memory backend

use std::sync::Arc;

use elif_active_record::{
    Database, Fetched, MemoryBackend, ModelDefinition, ModelError, ModelRegistry, RelationDeclaration,
};
use serde_json::{json, Value};

fn registry() -> ModelRegistry {
    ModelRegistry::new()
        .with(
            ModelDefinition::new("User")
                .with_hidden(&["password"])
                .with_setter("email", |v| json!(v.as_str().unwrap_or_default().to_lowercase()))
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
        .with(ModelDefinition::new("Role").without_soft_deletes().with_timestamps(false))
}

fn seeded() -> Arc<MemoryBackend> {
    Arc::new(
        MemoryBackend::new()
            .with_table(
                "users",
                vec![
                    json!({"id": 1, "name": "Ann", "email": "ann@example.com", "password": "a", "deleted_at": null}),
                    json!({"id": 2, "name": "Bob", "email": "bob@example.com", "password": "b", "deleted_at": null}),
                ],
            )
            .with_table(
                "profiles",
                vec![
                    json!({"id": 10, "user_id": 1, "bio": "ann's"}),
                    json!({"id": 11, "user_id": 2, "bio": "bob's"}),
                ],
            )
            .with_table(
                "posts",
                vec![
                    json!({"id": 1, "user_id": 1, "title": "a1", "deleted_at": null}),
                    json!({"id": 2, "user_id": 1, "title": "a2", "deleted_at": null}),
                    json!({"id": 3, "user_id": 2, "title": "b1", "deleted_at": null}),
                    json!({"id": 4, "user_id": 2, "title": "b2", "deleted_at": "2021-06-01T00:00:00Z"}),
                ],
            )
            .with_table(
                "comments",
                vec![
                    json!({"id": 1, "post_id": 1, "body": "nice", "deleted_at": null}),
                    json!({"id": 2, "post_id": 3, "body": "meh", "deleted_at": null}),
                ],
            )
            .with_table(
                "roles",
                vec![json!({"id": 1, "name": "admin"}), json!({"id": 2, "name": "editor"})],
            )
            .with_table(
                "role_user",
                vec![
                    json!({"user_id": 1, "role_id": 1, "level": 3}),
                    json!({"user_id": 1, "role_id": 2, "level": 1}),
                    json!({"user_id": 2, "role_id": 2, "level": 2}),
                ],
            ),
    )
}

fn connect(backend: &Arc<MemoryBackend>) -> Database {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Database::new(backend.clone(), registry()).unwrap()
}

fn titles(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|posts| {
            posts
                .iter()
                .filter_map(|post| post["title"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn soft_deleted_posts_are_excluded() {
    let backend = Arc::new(MemoryBackend::new().with_table(
        "posts",
        vec![
            json!({"id": 1, "deleted_at": null}),
            json!({"id": 2, "deleted_at": "2020-01-01"}),
        ],
    ));
    let db = Database::new(backend.clone(), ModelRegistry::new().with(ModelDefinition::new("Post"))).unwrap();
    let mut posts = db.query("Post").unwrap();

    let all = posts.all().await.unwrap();
    assert_eq!(all.pluck("id"), vec![json!(1)]);

    assert!(posts.find(2).await.unwrap().is_none());

    let trashed = posts.clone().with_trashed().find(2).await.unwrap().unwrap();
    assert!(trashed.is_trashed());

    // including trashed rows applies to a single call only
    let mut posts = db.query("Post").unwrap().with_trashed();
    assert_eq!(posts.all().await.unwrap().len(), 2);
    assert_eq!(posts.all().await.unwrap().len(), 1);
    assert!(posts.find(2).await.unwrap().is_none());
}

#[tokio::test]
async fn instance_relations_return_only_related_rows() {
    let backend = seeded();
    let db = connect(&backend);
    let ann = db.query("User").unwrap().find(1).await.unwrap().unwrap();

    let posts = ann.related("posts").unwrap().all().await.unwrap();
    assert_eq!(posts.pluck("title"), vec![json!("a1"), json!("a2")]);

    let profile = ann.related("profile").unwrap().first().await.unwrap().unwrap();
    assert_eq!(profile["bio"], json!("ann's"));

    let post = db.query("Post").unwrap().find(3).await.unwrap().unwrap();
    match post.belongs_to("User", None, None).unwrap().fetch().await.unwrap() {
        Fetched::One(Some(author)) => {
            assert_eq!(author["name"], json!("Bob"));
            assert!(author.get("password").is_none());
        }
        other => panic!("expected the author, got {:?}", other),
    }
}

#[tokio::test]
async fn key_overrides_take_precedence() {
    let backend = Arc::new(
        MemoryBackend::new()
            .with_table("users", vec![json!({"id": 1, "uuid": "u-1", "deleted_at": null})])
            .with_table("profiles", vec![json!({"id": 5, "owner_uuid": "u-1"})]),
    );
    let db = connect(&backend);
    let user = db.query("User").unwrap().find(1).await.unwrap().unwrap();

    let mut profile = user.has_one("Profile", Some("uuid"), Some("owner_uuid")).unwrap();
    assert_eq!(
        profile.to_sql(),
        "SELECT * FROM profiles WHERE profiles.owner_uuid = 'u-1' LIMIT 1"
    );
    let row = profile.fetch().await.unwrap().into_one().unwrap();
    assert_eq!(row["id"], json!(5));
}

#[tokio::test]
async fn belongs_to_many_goes_through_the_pivot_table() {
    let backend = seeded();
    let db = connect(&backend);
    let ann = db.query("User").unwrap().find(1).await.unwrap().unwrap();

    let roles = ann
        .belongs_to_many("Role", None, None, None)
        .unwrap()
        .with_pivot(&["level"])
        .all()
        .await
        .unwrap();
    assert_eq!(roles.pluck("name"), vec![json!("admin"), json!("editor")]);
    assert_eq!(roles.pluck("_pivot_level"), vec![json!(3), json!(1)]);
    assert!(roles.iter().all(|role| !role.contains_key("_pivot_user_id")));

    let custom = ann
        .belongs_to_many("Role", Some("memberships"), Some("member_id"), Some("group_id"))
        .unwrap();
    assert_eq!(
        custom.to_sql(),
        "SELECT roles.* FROM roles INNER JOIN memberships ON memberships.group_id = roles.id WHERE memberships.member_id = 1"
    );
}

#[tokio::test]
async fn eager_loading_attaches_without_cross_row_leakage() {
    let backend = seeded();
    let db = connect(&backend);
    let users = db
        .query("User")
        .unwrap()
        .with(&["posts", "profile", "roles"])
        .all()
        .await
        .unwrap();

    let ann = users.get(0).unwrap();
    let bob = users.get(1).unwrap();
    assert_eq!(titles(&ann["posts"]), vec!["a1", "a2"]);
    assert_eq!(titles(&bob["posts"]), vec!["b1"]);
    assert_eq!(ann["profile"]["bio"], json!("ann's"));
    assert_eq!(bob["profile"]["bio"], json!("bob's"));

    let bob_roles = bob["roles"].as_array().unwrap();
    assert_eq!(bob_roles.len(), 1);
    assert_eq!(bob_roles[0]["name"], json!("editor"));
    assert_eq!(bob_roles[0]["_pivot_level"], json!(2));
    assert!(bob_roles[0].get("_pivot_user_id").is_none());
    assert_eq!(ann["roles"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn eager_loading_pairs_rows_through_hidden_keys() {
    let backend = seeded();
    let registry = ModelRegistry::new()
        .with(
            ModelDefinition::new("User")
                .with_hidden(&["id", "password"])
                .with_relation("posts", RelationDeclaration::has_many("Post"))
                .with_relation("roles", RelationDeclaration::belongs_to_many("Role")),
        )
        .with(
            ModelDefinition::new("Post")
                .with_hidden(&["user_id"])
                .with_relation("author", RelationDeclaration::belongs_to("User")),
        )
        .with(ModelDefinition::new("Role").without_soft_deletes());
    let db = Database::new(backend.clone(), registry).unwrap();

    let users = db.query("User").unwrap().with(&["posts", "roles"]).all().await.unwrap();
    let ann = users.get(0).unwrap();
    assert!(!ann.contains_key("id"));
    assert_eq!(titles(&ann["posts"]), vec!["a1", "a2"]);
    assert!(ann["posts"][0].get("user_id").is_none());
    assert_eq!(titles(&users.get(1).unwrap()["posts"]), vec!["b1"]);

    let ann_roles = ann["roles"].as_array().unwrap();
    assert_eq!(ann_roles.len(), 2);
    assert!(ann_roles.iter().all(|role| role.get("_pivot_user_id").is_none()));

    let posts = db.query("Post").unwrap().with(&["author"]).all().await.unwrap();
    let authors: Vec<Value> = posts.iter().map(|post| post["author"]["name"].clone()).collect();
    assert_eq!(authors, vec![json!("Ann"), json!("Ann"), json!("Bob")]);
}

#[tokio::test]
async fn eager_loading_follows_nested_paths() {
    let backend = seeded();
    let db = connect(&backend);
    let users = db.query("User").unwrap().with(&["posts.comments"]).all().await.unwrap();

    let ann_posts = users.get(0).unwrap()["posts"].as_array().unwrap().clone();
    assert_eq!(ann_posts[0]["comments"][0]["body"], json!("nice"));
    assert_eq!(ann_posts[1]["comments"], json!([]));

    let posts = db.query("Post").unwrap().with(&["author"]).all().await.unwrap();
    let authors: Vec<Value> = posts.iter().map(|post| post["author"]["name"].clone()).collect();
    assert_eq!(authors, vec![json!("Ann"), json!("Ann"), json!("Bob")]);
}

#[tokio::test]
async fn single_relations_attach_null_when_missing() {
    let backend = seeded();
    let db = connect(&backend);
    db.model("User", json!({"id": 3, "name": "Cid"}))
        .unwrap()
        .create()
        .await
        .unwrap();

    let users = db.query("User").unwrap().with(&["profile", "posts"]).all().await.unwrap();
    let cid = users.get(2).unwrap();
    assert_eq!(cid["profile"], Value::Null);
    assert_eq!(cid["posts"], json!([]));
}

#[tokio::test]
async fn eager_failure_aborts_the_whole_call() {
    let backend = seeded();
    let db = connect(&backend);
    backend.fail_on("role_user");

    let err = db
        .query("User")
        .unwrap()
        .with(&["posts", "roles"])
        .all()
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Database(_)));
}

#[tokio::test]
async fn undefined_relations_are_reported() {
    let backend = seeded();
    let db = connect(&backend);

    let err = db.query("User").unwrap().with(&["followers"]).all().await.unwrap_err();
    assert!(matches!(err, ModelError::Relationship(_)));

    let ann = db.query("User").unwrap().find(1).await.unwrap().unwrap();
    assert!(matches!(ann.related("followers"), Err(ModelError::Relationship(_))));
}

#[tokio::test]
async fn model_constructor_rejects_bulk_and_scalar_input() {
    let backend = seeded();
    let db = connect(&backend);

    for input in [json!([]), json!([{"name": "a"}, {"name": "b"}]), json!("Ann"), json!(5)] {
        assert!(matches!(db.model("User", input), Err(ModelError::InvalidArgument(_))));
    }

    let empty = db.model("User", Value::Null).unwrap();
    assert!(empty.attributes().is_empty());
}

#[test]
fn declared_fields_restrict_construction_and_assignment() {
    let backend = seeded();
    let registry = ModelRegistry::new().with(ModelDefinition::new("User").with_fields(&["name", "email"]));
    let db = Database::new(backend.clone(), registry).unwrap();

    let err = db.model("User", json!({"name": "Dee", "nickname": "D"})).unwrap_err();
    assert!(matches!(err, ModelError::InvalidArgument(_)));

    let mut user = db.model("User", json!({"id": 7, "name": "Dee"})).unwrap();
    assert!(matches!(user.set("nickname", "D"), Err(ModelError::InvalidArgument(_))));
    user.set("email", "dee@example.com").unwrap();
    assert_eq!(user.get("email"), Some(&json!("dee@example.com")));
}

#[tokio::test]
async fn unsaved_instances_cannot_be_updated_or_deleted() {
    let backend = seeded();
    let db = connect(&backend);
    let mut user = db.model("User", json!({"id": 1, "name": "Ann"})).unwrap();

    assert!(matches!(user.update(None).await, Err(ModelError::InvalidState(_))));
    assert!(matches!(user.delete().await, Err(ModelError::InvalidState(_))));
    assert!(matches!(user.force_delete().await, Err(ModelError::InvalidState(_))));
    assert!(backend.executed().is_empty());
}

#[tokio::test]
async fn setters_run_on_construction_and_assignment() {
    let backend = seeded();
    let db = connect(&backend);
    let mut user = db.model("User", json!({"email": "Dee@Example.COM"})).unwrap();
    assert_eq!(user.get("email"), Some(&json!("dee@example.com")));

    user.set("email", "NEW@Example.com").unwrap();
    assert_eq!(user.get_as::<String>("email").unwrap().as_deref(), Some("new@example.com"));
}

#[tokio::test]
async fn create_then_update_round_trips_through_storage() {
    let backend = seeded();
    let db = connect(&backend);

    let mut user = db.model("User", json!({"name": "Dee", "email": "dee@example.com"})).unwrap();
    user.create().await.unwrap();
    assert!(user.is_hydrated());
    assert_eq!(user.primary_key_value(), Some(&json!(3)));
    assert!(user.get("created_at").is_some());

    user.update(Some(json!({"id": 99, "name": "Dee Dee"}))).await.unwrap();
    assert_eq!(user.get("name"), Some(&json!("Dee Dee")));
    assert_eq!(user.primary_key_value(), Some(&json!(3)));

    let stored = db.query("User").unwrap().find(3).await.unwrap().unwrap();
    assert_eq!(stored.get("name"), Some(&json!("Dee Dee")));
}

#[tokio::test]
async fn failed_update_leaves_attributes_untouched() {
    let backend = seeded();
    let db = connect(&backend);
    let mut user = db.query("User").unwrap().find(1).await.unwrap().unwrap();

    backend.fail_on("users");
    let err = user.update(Some(json!({"name": "Zed"}))).await.unwrap_err();
    assert!(err.is_upstream());
    assert_eq!(user.get("name"), Some(&json!("Ann")));
}

#[tokio::test]
async fn delete_soft_deletes_and_force_delete_removes() {
    let backend = seeded();
    let db = connect(&backend);

    let mut post = db.query("Post").unwrap().find(1).await.unwrap().unwrap();
    assert!(!post.is_trashed());
    post.delete().await.unwrap();
    assert!(post.is_trashed());
    assert!(db.query("Post").unwrap().find(1).await.unwrap().is_none());
    assert_eq!(backend.rows("posts").len(), 4);

    let mut post = db.query("Post").unwrap().with_trashed().find(1).await.unwrap().unwrap();
    post.force_delete().await.unwrap();
    assert!(post.attributes().is_empty());
    assert!(!post.is_hydrated());
    assert_eq!(backend.rows("posts").len(), 3);

    let mut role = db.query("Role").unwrap().find(2).await.unwrap().unwrap();
    role.delete().await.unwrap();
    assert_eq!(backend.rows("roles").len(), 1);
}

#[tokio::test]
async fn paginate_reports_metadata() {
    let backend = seeded();
    let db = connect(&backend);
    let mut posts = db.query("Post").unwrap().order_by("id");

    let page = posts.paginate(1, 2).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.per_page, 2);
    assert_eq!(page.current_page, 1);
    assert_eq!(page.last_page, 2);
    assert_eq!(page.data.pluck("id"), vec![json!(1), json!(2)]);

    let page = db.query("Post").unwrap().order_by("id").paginate(2, 2).await.unwrap();
    assert_eq!(page.data.pluck("id"), vec![json!(3)]);

    assert!(matches!(posts.paginate(0, 2).await, Err(ModelError::InvalidArgument(_))));
    assert!(matches!(posts.paginate(1, 0).await, Err(ModelError::InvalidArgument(_))));
}

#[tokio::test]
async fn first_returns_the_first_matching_row() {
    let backend = seeded();
    let db = connect(&backend);
    let post = db.query("Post").unwrap().where_eq("user_id", 2).first().await.unwrap().unwrap();
    assert_eq!(post["title"], json!("b1"));
    assert!(db.query("Post").unwrap().where_eq("user_id", 9).first().await.unwrap().is_none());
}
