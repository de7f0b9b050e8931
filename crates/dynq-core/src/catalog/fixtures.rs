//! Blog-shaped schema shared by unit tests.

use super::{ColumnType, JunctionMeta, RelationMeta, SchemaCatalog, TableMeta};

pub(crate) fn blog_catalog() -> SchemaCatalog {
    let users = TableMeta::new("users", "id")
        .column("id", ColumnType::Integer)
        .column("name", ColumnType::String)
        .column("email", ColumnType::String)
        .column("created_at", ColumnType::DateTime)
        .relation(RelationMeta::has_many("posts", "posts", "author"))
        .relation(RelationMeta {
            cardinality: super::Cardinality::HasOne,
            ..RelationMeta::has_many("profile", "profiles", "user")
        })
        .relation(RelationMeta {
            inverse_property: None,
            ..RelationMeta::has_many("drafts", "drafts", "")
        });

    let profiles = TableMeta::new("profiles", "id")
        .column("id", ColumnType::Integer)
        .column("bio", ColumnType::Text)
        .column("user_id", ColumnType::Integer)
        .relation(RelationMeta::belongs_to("user", "users", "user_id"));

    let posts = TableMeta::new("posts", "id")
        .column("id", ColumnType::Integer)
        .column("title", ColumnType::String)
        .column("body", ColumnType::Text)
        .column("views", ColumnType::Integer)
        .column("rating", ColumnType::Decimal)
        .column("published_at", ColumnType::DateTime)
        .column("author_id", ColumnType::Integer)
        .column("metadata", ColumnType::Json)
        .relation(RelationMeta::belongs_to("author", "users", "author_id"))
        .relation(RelationMeta::has_many("comments", "comments", "post"))
        .relation(RelationMeta::many_to_many(
            "tags",
            "tags",
            JunctionMeta {
                table: "post_tags".into(),
                source_key: "post_id".into(),
                target_key: "tag_id".into(),
            },
        ));

    let comments = TableMeta::new("comments", "id")
        .column("id", ColumnType::Integer)
        .column("body", ColumnType::Text)
        .column("approved", ColumnType::Boolean)
        .column("post_id", ColumnType::Integer)
        .column("author_id", ColumnType::Integer)
        .relation(RelationMeta::belongs_to("post", "posts", "post_id"))
        .relation(RelationMeta::belongs_to("author", "users", "author_id"));

    let tags = TableMeta::new("tags", "id")
        .column("id", ColumnType::Integer)
        .column("label", ColumnType::String)
        .relation(RelationMeta::many_to_many(
            "posts",
            "posts",
            JunctionMeta {
                table: "post_tags".into(),
                source_key: "tag_id".into(),
                target_key: "post_id".into(),
            },
        ));

    let drafts = TableMeta::new("drafts", "id")
        .column("id", ColumnType::Integer)
        .column("title", ColumnType::String);

    SchemaCatalog::new([users, profiles, posts, comments, tags, drafts])
        .expect("blog fixture is a valid schema")
}
