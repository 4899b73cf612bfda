//! Stored files that a delete is about to take with it.
//!
//! Rows go away through `ON DELETE CASCADE`, but the objects behind
//! `files.files` live outside the database. Before deleting an owner the
//! affected file urls are collected in the same transaction so they can be
//! removed from storage once the delete has committed.

use sqlx::PgConnection;
use studenthub_common::model::{
    Id,
    comment::CommentMarker,
    post::PostMarker,
    university::{FacultyMarker, RoleMarker, UniversityMarker},
    user::UserMarker,
};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub(crate) enum CascadeScope {
    User(Id<UserMarker>),
    Role(Id<RoleMarker>),
    University(Id<UniversityMarker>),
    Faculty(Id<FacultyMarker>),
    Post(Id<PostMarker>),
    Comment(Id<CommentMarker>),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
struct ScopeParams {
    user: Option<i64>,
    role: Option<i64>,
    university: Option<i64>,
    faculty: Option<i64>,
    post: Option<i64>,
    comment: Option<i64>,
}

impl From<CascadeScope> for ScopeParams {
    fn from(value: CascadeScope) -> Self {
        let mut params = Self::default();
        match value {
            CascadeScope::User(id) => params.user = Some(id.get()),
            CascadeScope::Role(id) => params.role = Some(id.get()),
            CascadeScope::University(id) => params.university = Some(id.get()),
            CascadeScope::Faculty(id) => params.faculty = Some(id.get()),
            CascadeScope::Post(id) => params.post = Some(id.get()),
            CascadeScope::Comment(id) => params.comment = Some(id.get()),
        }
        params
    }
}

pub(crate) async fn collect_files(
    conn: &mut PgConnection,
    scope: CascadeScope,
) -> sqlx::Result<Vec<String>> {
    let params = ScopeParams::from(scope);

    sqlx::query_scalar(
        "
        WITH RECURSIVE
        doomed_users AS (
            SELECT users.user_id
            FROM users.users
            WHERE users.user_id = $1::BIGINT
                OR users.role_id = $2::BIGINT
                OR users.university_id = $3::BIGINT
                OR users.faculty_id = $4::BIGINT
                OR users.faculty_id IN (
                    SELECT faculties.faculty_id
                    FROM users.faculties
                    WHERE faculties.university_id = $3::BIGINT
                )
        ),
        doomed_posts AS (
            SELECT posts.post_id
            FROM posts.posts
            WHERE posts.post_id = $5::BIGINT
                OR posts.post_author IN (SELECT user_id FROM doomed_users)
        ),
        doomed_comments AS (
            SELECT comments.comment_id
            FROM posts.comments
            WHERE comments.comment_id = $6::BIGINT
                OR comments.comment_author IN (SELECT user_id FROM doomed_users)
                OR comments.comment_post IN (SELECT post_id FROM doomed_posts)
            UNION
            SELECT replies.comment_id
            FROM posts.comments AS replies
                JOIN doomed_comments ON replies.comment_parent = doomed_comments.comment_id
        )
        SELECT files.file_url
        FROM files.files
        WHERE files.owner_university = $3::BIGINT
            OR files.owner_user IN (SELECT user_id FROM doomed_users)
            OR files.owner_post IN (SELECT post_id FROM doomed_posts)
            OR files.owner_comment IN (SELECT comment_id FROM doomed_comments)
        ",
    )
    .bind(params.user)
    .bind(params.role)
    .bind(params.university)
    .bind(params.faculty)
    .bind(params.post)
    .bind(params.comment)
    .fetch_all(conn)
    .await
}
