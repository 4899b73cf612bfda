use crate::{
    cascade::{CascadeScope, collect_files},
    client::{DbClient, Result},
    record::{FacultyRecord, RoleRecord, UniversityRecord},
};
use studenthub_common::{
    model::{
        Id,
        university::{
            CreateFaculty, CreateUniversity, Faculty, FacultyMarker, Role, RoleBody, RoleMarker,
            University, UniversityMarker, UpdateFaculty, UpdateUniversity,
        },
    },
    util::{Page, Pagination},
};
use tracing::info;

macro_rules! select_universities {
    ($($tail:literal)?) => {
        concat!(
            "
            SELECT
                universities.university_id,
                universities.university_name,
                universities.university_email,
                universities.university_phone,
                (
                    SELECT files.file_url
                    FROM files.files
                    WHERE files.owner_university = universities.university_id
                        AND files.file_kind = 'image'
                ) AS image_url
            FROM users.universities
            ",
            $($tail)?
        )
    };
}

impl DbClient {
    pub async fn fetch_roles(&self, pagination: Pagination) -> Result<Page<Role>> {
        let mut tx = self.pool.begin().await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users.user_roles")
            .fetch_one(&mut *tx)
            .await?;
        let records: Vec<RoleRecord> =
            sqlx::query_as("SELECT * FROM users.user_roles ORDER BY role_id LIMIT $1 OFFSET $2")
                .bind(pagination.limit())
                .bind(pagination.offset())
                .fetch_all(&mut *tx)
                .await?;

        tx.commit().await?;

        let items = records.into_iter().map(Role::from).collect();
        Ok(Page::new(items, count, pagination))
    }

    pub async fn fetch_role(&self, role_id: Id<RoleMarker>) -> Result<Option<Role>> {
        let record: Option<RoleRecord> =
            sqlx::query_as("SELECT * FROM users.user_roles WHERE role_id = $1")
                .bind(role_id.get())
                .fetch_optional(&self.pool)
                .await?;

        Ok(record.map(Role::from))
    }

    pub async fn create_role(&self, role: &RoleBody) -> Result<Role> {
        let record: RoleRecord =
            sqlx::query_as("INSERT INTO users.user_roles (role_name) VALUES ($1) RETURNING *")
                .bind(&role.name)
                .fetch_one(&self.pool)
                .await?;

        Ok(record.into())
    }

    pub async fn update_role(&self, role_id: Id<RoleMarker>, role: &RoleBody) -> Result<Option<Role>> {
        let record: Option<RoleRecord> = sqlx::query_as(
            "UPDATE users.user_roles SET role_name = $2 WHERE role_id = $1 RETURNING *",
        )
        .bind(role_id.get())
        .bind(&role.name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Role::from))
    }

    /// Deleting a role deletes every user holding it.
    pub async fn delete_role(&self, role_id: Id<RoleMarker>) -> Result<Option<Vec<String>>> {
        let mut tx = self.pool.begin().await?;

        let file_urls = collect_files(&mut tx, CascadeScope::Role(role_id)).await?;
        let deleted = sqlx::query("DELETE FROM users.user_roles WHERE role_id = $1")
            .bind(role_id.get())
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await?;
        info!(%role_id, "Deleted role");
        Ok(Some(file_urls))
    }

    pub async fn fetch_universities(&self, pagination: Pagination) -> Result<Page<University>> {
        let mut tx = self.pool.begin().await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users.universities")
            .fetch_one(&mut *tx)
            .await?;
        let records: Vec<UniversityRecord> = sqlx::query_as(select_universities!(
            "ORDER BY universities.university_id LIMIT $1 OFFSET $2"
        ))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let items = records.into_iter().map(University::from).collect();
        Ok(Page::new(items, count, pagination))
    }

    pub async fn fetch_university(
        &self,
        university_id: Id<UniversityMarker>,
    ) -> Result<Option<University>> {
        let record: Option<UniversityRecord> = sqlx::query_as(select_universities!(
            "WHERE universities.university_id = $1"
        ))
        .bind(university_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(University::from))
    }

    pub async fn create_university(&self, university: &CreateUniversity) -> Result<University> {
        let record: UniversityRecord = sqlx::query_as(
            "
            INSERT INTO users.universities (university_name, university_email, university_phone)
            VALUES ($1, $2, $3)
            RETURNING *, NULL::VARCHAR AS image_url
            ",
        )
        .bind(&university.name)
        .bind(&university.email)
        .bind(&university.phone)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    pub async fn update_university(
        &self,
        university_id: Id<UniversityMarker>,
        update: &UpdateUniversity,
    ) -> Result<Option<University>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "
            UPDATE users.universities SET
                university_name = COALESCE($2, university_name),
                university_email = COALESCE($3, university_email),
                university_phone = COALESCE($4, university_phone)
            WHERE university_id = $1
            ",
        )
        .bind(university_id.get())
        .bind(update.name.as_deref())
        .bind(update.email.as_deref())
        .bind(update.phone.as_deref())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        let record: UniversityRecord = sqlx::query_as(select_universities!(
            "WHERE universities.university_id = $1"
        ))
        .bind(university_id.get())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(record.into()))
    }

    /// Deleting a university deletes its faculties and members.
    pub async fn delete_university(
        &self,
        university_id: Id<UniversityMarker>,
    ) -> Result<Option<Vec<String>>> {
        let mut tx = self.pool.begin().await?;

        let file_urls = collect_files(&mut tx, CascadeScope::University(university_id)).await?;
        let deleted = sqlx::query("DELETE FROM users.universities WHERE university_id = $1")
            .bind(university_id.get())
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await?;
        info!(%university_id, "Deleted university");
        Ok(Some(file_urls))
    }

    pub async fn fetch_faculties(&self, pagination: Pagination) -> Result<Page<Faculty>> {
        let mut tx = self.pool.begin().await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users.faculties")
            .fetch_one(&mut *tx)
            .await?;
        let records: Vec<FacultyRecord> =
            sqlx::query_as("SELECT * FROM users.faculties ORDER BY faculty_id LIMIT $1 OFFSET $2")
                .bind(pagination.limit())
                .bind(pagination.offset())
                .fetch_all(&mut *tx)
                .await?;

        tx.commit().await?;

        let items = records.into_iter().map(Faculty::from).collect();
        Ok(Page::new(items, count, pagination))
    }

    pub async fn fetch_faculty(&self, faculty_id: Id<FacultyMarker>) -> Result<Option<Faculty>> {
        let record: Option<FacultyRecord> =
            sqlx::query_as("SELECT * FROM users.faculties WHERE faculty_id = $1")
                .bind(faculty_id.get())
                .fetch_optional(&self.pool)
                .await?;

        Ok(record.map(Faculty::from))
    }

    pub async fn create_faculty(&self, faculty: &CreateFaculty) -> Result<Faculty> {
        let record: FacultyRecord = sqlx::query_as(
            "INSERT INTO users.faculties (faculty_name, university_id) VALUES ($1, $2) RETURNING *",
        )
        .bind(&faculty.name)
        .bind(faculty.university.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    pub async fn update_faculty(
        &self,
        faculty_id: Id<FacultyMarker>,
        update: &UpdateFaculty,
    ) -> Result<Option<Faculty>> {
        let record: Option<FacultyRecord> = sqlx::query_as(
            "
            UPDATE users.faculties SET
                faculty_name = COALESCE($2, faculty_name),
                university_id = COALESCE($3, university_id)
            WHERE faculty_id = $1
            RETURNING *
            ",
        )
        .bind(faculty_id.get())
        .bind(update.name.as_deref())
        .bind(update.university.map(Id::get))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Faculty::from))
    }

    pub async fn delete_faculty(&self, faculty_id: Id<FacultyMarker>) -> Result<Option<Vec<String>>> {
        let mut tx = self.pool.begin().await?;

        let file_urls = collect_files(&mut tx, CascadeScope::Faculty(faculty_id)).await?;
        let deleted = sqlx::query("DELETE FROM users.faculties WHERE faculty_id = $1")
            .bind(faculty_id.get())
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await?;
        info!(%faculty_id, "Deleted faculty");
        Ok(Some(file_urls))
    }
}
