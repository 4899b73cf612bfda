use crate::{
    cascade::{CascadeScope, collect_files},
    client::{DbClient, Result},
    record::{CredentialsRecord, UserRecord},
};
use sqlx::PgConnection;
use studenthub_common::{
    model::{
        Id,
        auth::{Credentials, PasswordDigest},
        user::{CreateUser, UpdateUser, User, UserMarker},
    },
    util::{Page, Pagination},
};
use tracing::info;

macro_rules! select_users {
    ($($tail:literal)?) => {
        concat!(
            "
            SELECT
                users.user_id,
                users.user_name,
                users.user_surname,
                users.user_email,
                users.user_phone,
                users.user_card_id,
                users.user_birthday,
                users.user_enrolment_year,
                users.user_tg_link,
                users.role_id,
                users.university_id,
                users.faculty_id,
                (
                    SELECT files.file_url
                    FROM files.files
                    WHERE files.owner_user = users.user_id AND files.file_kind = 'image'
                ) AS image_url
            FROM users.users
            ",
            $($tail)?
        )
    };
}

pub(crate) async fn display_name(conn: &mut PgConnection, user_id: Id<UserMarker>) -> Result<String> {
    let name = sqlx::query_scalar(
        "SELECT user_name || ' ' || user_surname FROM users.users WHERE user_id = $1",
    )
    .bind(user_id.get())
    .fetch_one(conn)
    .await?;

    Ok(name)
}

impl DbClient {
    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record: Option<UserRecord> =
            sqlx::query_as(select_users!("WHERE users.user_id = $1"))
                .bind(user_id.get())
                .fetch_optional(&self.pool)
                .await?;

        Ok(record.map(User::from))
    }

    pub async fn fetch_users(&self, pagination: Pagination) -> Result<Page<User>> {
        let mut tx = self.pool.begin().await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users.users")
            .fetch_one(&mut *tx)
            .await?;

        let records: Vec<UserRecord> =
            sqlx::query_as(select_users!("ORDER BY users.user_id LIMIT $1 OFFSET $2"))
                .bind(pagination.limit())
                .bind(pagination.offset())
                .fetch_all(&mut *tx)
                .await?;

        tx.commit().await?;

        let items = records.into_iter().map(User::from).collect();
        Ok(Page::new(items, count, pagination))
    }

    pub async fn fetch_credentials(&self, email: &str) -> Result<Option<Credentials>> {
        let record: Option<CredentialsRecord> = sqlx::query_as(
            "SELECT user_id, user_password FROM users.users WHERE lower(user_email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Credentials::from))
    }

    pub async fn user_exists(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let exists = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users.users WHERE user_id = $1)")
            .bind(user_id.get())
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    pub async fn create_user(&self, user: &CreateUser, password: &PasswordDigest) -> Result<User> {
        let record: UserRecord = sqlx::query_as(
            "
            INSERT INTO users.users (
                user_name, user_surname, user_email, user_phone, user_card_id, user_birthday,
                user_enrolment_year, user_tg_link, user_password, role_id, university_id, faculty_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *, NULL::VARCHAR AS image_url
            ",
        )
        .bind(&user.name)
        .bind(&user.surname)
        .bind(&user.email)
        .bind(user.phone.as_deref())
        .bind(&user.card_id)
        .bind(user.birthday)
        .bind(user.enrolment_year)
        .bind(user.tg_link.as_deref())
        .bind(password.as_str())
        .bind(user.role.get())
        .bind(user.university.get())
        .bind(user.faculty.map(Id::get))
        .fetch_one(&self.pool)
        .await?;

        info!(user_id = record.user_id, "Registered user");
        Ok(record.into())
    }

    /// Applies the fields present in `update`. `None` if the user does not exist.
    pub async fn update_user(
        &self,
        user_id: Id<UserMarker>,
        update: &UpdateUser,
        password: Option<&PasswordDigest>,
    ) -> Result<Option<User>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "
            UPDATE users.users SET
                user_name = COALESCE($2, user_name),
                user_surname = COALESCE($3, user_surname),
                user_email = COALESCE($4, user_email),
                user_phone = COALESCE($5, user_phone),
                user_card_id = COALESCE($6, user_card_id),
                user_birthday = COALESCE($7, user_birthday),
                user_enrolment_year = COALESCE($8, user_enrolment_year),
                user_tg_link = COALESCE($9, user_tg_link),
                user_password = COALESCE($10, user_password),
                role_id = COALESCE($11, role_id),
                university_id = COALESCE($12, university_id),
                faculty_id = COALESCE($13, faculty_id)
            WHERE user_id = $1
            ",
        )
        .bind(user_id.get())
        .bind(update.name.as_deref())
        .bind(update.surname.as_deref())
        .bind(update.email.as_deref())
        .bind(update.phone.as_deref())
        .bind(update.card_id.as_deref())
        .bind(update.birthday)
        .bind(update.enrolment_year)
        .bind(update.tg_link.as_deref())
        .bind(password.map(PasswordDigest::as_str))
        .bind(update.role.map(Id::get))
        .bind(update.university.map(Id::get))
        .bind(update.faculty.map(Id::get))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        let record: UserRecord = sqlx::query_as(select_users!("WHERE users.user_id = $1"))
            .bind(user_id.get())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(record.into()))
    }

    /// Deletes the user with everything they own. Returns the urls of the
    /// stored files that went with them, `None` if the user did not exist.
    pub async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<Option<Vec<String>>> {
        let mut tx = self.pool.begin().await?;

        let file_urls = collect_files(&mut tx, CascadeScope::User(user_id)).await?;
        let deleted = sqlx::query("DELETE FROM users.users WHERE user_id = $1")
            .bind(user_id.get())
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await?;
        info!(%user_id, files = file_urls.len(), "Deleted user");
        Ok(Some(file_urls))
    }
}
