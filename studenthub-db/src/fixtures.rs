//! Rows the store tests build on.

use sqlx::PgPool;
use studenthub_common::model::{Id, post::PostMarker, user::UserMarker};

/// Inserts a user named `name Stone`, together with a role and university of their own.
pub(crate) async fn user(pool: &PgPool, name: &str) -> Id<UserMarker> {
    let role_id: i64 = sqlx::query_scalar(
        "INSERT INTO users.user_roles (role_name) VALUES ('student') RETURNING role_id",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    let university_id: i64 = sqlx::query_scalar(
        "
        INSERT INTO users.universities (university_name, university_email, university_phone)
        VALUES ('Test University', $1, '+100')
        RETURNING university_id
        ",
    )
    .bind(format!("office-{name}@uni.example"))
    .fetch_one(pool)
    .await
    .unwrap();

    let user_id: i64 = sqlx::query_scalar(
        "
        INSERT INTO users.users (
            user_name, user_surname, user_email, user_card_id,
            user_enrolment_year, user_password, role_id, university_id
        )
        VALUES ($1, 'Stone', $2, '0001', DATE '2022-09-01', 'digest', $3, $4)
        RETURNING user_id
        ",
    )
    .bind(name)
    .bind(format!("{name}@student.example"))
    .bind(role_id)
    .bind(university_id)
    .fetch_one(pool)
    .await
    .unwrap();

    Id::new(user_id)
}

pub(crate) async fn post(pool: &PgPool, author: Id<UserMarker>) -> Id<PostMarker> {
    let post_id: i64 = sqlx::query_scalar(
        "
        INSERT INTO posts.posts (post_heading, post_text, post_author)
        VALUES ('Exam notes', 'Chapters one to four', $1)
        RETURNING post_id
        ",
    )
    .bind(author.get())
    .fetch_one(pool)
    .await
    .unwrap();

    Id::new(post_id)
}
