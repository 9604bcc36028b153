//! Shared blog fixture for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;

use keyplan_core::proto::Value;
use keyplan_core::{
    Backend, EntityDef, FieldDef, FieldId, Index, Model, Relationship, Row, ScalarType,
};

/// `User{id, name}` and `Post{id, user -> User, title, date}`.
pub fn blog_model() -> Model {
    Model::builder()
        .with_entity(
            EntityDef::new("User")
                .with_count(100)
                .with_field(FieldDef::id("id"))
                .with_field(FieldDef::new("name", ScalarType::String { length: 20 })),
        )
        .with_entity(
            EntityDef::new("Post")
                .with_count(1000)
                .with_field(FieldDef::id("id"))
                .with_field(FieldDef::foreign_key("user", "User", Relationship::One))
                .with_field(FieldDef::new("title", ScalarType::String { length: 40 }))
                .with_field(FieldDef::new("date", ScalarType::Date)),
        )
        .build()
        .unwrap()
}

pub fn field(model: &Model, name: &str) -> FieldId {
    model.field_id(name).unwrap()
}

pub fn index(
    model: &Model,
    hash: &[&str],
    order: &[&str],
    extra: &[&str],
    entity: &str,
    keys: &[&str],
) -> Arc<Index> {
    let key_path = model.key_path(entity, keys).unwrap();
    Arc::new(Index::from_names(model, hash, order, extra, key_path).unwrap())
}

/// The indexes used across suites.
pub struct BlogIndexes {
    /// Users by name, carrying their ids.
    pub by_name: Arc<Index>,
    /// Posts keyed by their author's id.
    pub posts_by_user: Arc<Index>,
    /// Posts keyed by their author's id, clustered by date.
    pub posts_by_date: Arc<Index>,
    pub user_identity: Arc<Index>,
    /// Post ids keyed by the author foreign key.
    pub post_ids_by_fk: Arc<Index>,
    /// Owner and date of a post, keyed by post id.
    pub post_owner: Arc<Index>,
}

impl BlogIndexes {
    pub fn new(model: &Model) -> Self {
        let user = model.entity_id("User").unwrap();
        Self {
            by_name: index(model, &["User.name"], &[], &["User.id"], "User", &[]),
            posts_by_user: index(
                model,
                &["User.id"],
                &[],
                &["Post.id", "Post.title", "Post.date"],
                "Post",
                &["user"],
            ),
            posts_by_date: index(
                model,
                &["User.id"],
                &["Post.date"],
                &["Post.id", "Post.title"],
                "Post",
                &["user"],
            ),
            user_identity: Arc::new(Index::identity_of(model, user).unwrap()),
            post_ids_by_fk: index(model, &["Post.user"], &[], &["Post.id"], "Post", &[]),
            post_owner: index(
                model,
                &["Post.id"],
                &[],
                &["User.id", "Post.date"],
                "Post",
                &["user"],
            ),
        }
    }

    pub fn all(&self) -> Vec<Arc<Index>> {
        vec![
            self.by_name.clone(),
            self.posts_by_user.clone(),
            self.posts_by_date.clone(),
            self.user_identity.clone(),
            self.post_ids_by_fk.clone(),
            self.post_owner.clone(),
        ]
    }
}

pub fn row(model: &Model, pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(name, value)| (field(model, name), value.clone()))
        .collect()
}

/// Users 5 ("A") and 6 ("B"); posts 1 "X" and 2 "Y" by user 5, post 3 "Z" by user 6.
pub fn blog_rows(model: &Model) -> (Vec<Row>, Vec<Row>) {
    let users = vec![
        row(model, &[("User.id", Value::Int(5)), ("User.name", Value::from("A"))]),
        row(model, &[("User.id", Value::Int(6)), ("User.name", Value::from("B"))]),
    ];
    let posts = vec![
        post(model, 1, 5, "X", 30),
        post(model, 2, 5, "Y", 10),
        post(model, 3, 6, "Z", 20),
    ];
    (users, posts)
}

fn post(model: &Model, id: i64, user: i64, title: &str, date: i64) -> Row {
    row(
        model,
        &[
            ("Post.id", Value::Int(id)),
            ("Post.user", Value::Int(user)),
            ("User.id", Value::Int(user)),
            ("Post.title", Value::from(title)),
            ("Post.date", Value::Timestamp(date)),
        ],
    )
}

/// Create every fixture index on `backend` and fill it from the blog rows.
pub fn load(backend: &dyn Backend, model: &Model, indexes: &BlogIndexes) {
    let (users, posts) = blog_rows(model);
    for index in [&indexes.by_name, &indexes.user_identity] {
        backend.create_index(index).unwrap();
        backend.insert(index, &users).unwrap();
    }
    for index in [
        &indexes.posts_by_user,
        &indexes.posts_by_date,
        &indexes.post_ids_by_fk,
        &indexes.post_owner,
    ] {
        backend.create_index(index).unwrap();
        backend.insert(index, &posts).unwrap();
    }
}

pub fn titles(model: &Model, rows: &[Row]) -> Vec<String> {
    let title = field(model, "Post.title");
    rows.iter()
        .filter_map(|row| row.get(&title).and_then(|v| v.as_str()).map(str::to_string))
        .collect()
}
