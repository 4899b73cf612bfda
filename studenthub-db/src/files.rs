use crate::{
    client::{DbClient, Result},
    record::FileRecord,
};
use sqlx::PgConnection;
use std::collections::HashMap;
use studenthub_common::model::{
    Id,
    comment::CommentMarker,
    file::{File, FileKind, NewFile},
    post::PostMarker,
    university::UniversityMarker,
    user::UserMarker,
};
use tracing::debug;

/// Anything that can carry a single image.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ImageOwner {
    User(Id<UserMarker>),
    University(Id<UniversityMarker>),
    Post(Id<PostMarker>),
    Comment(Id<CommentMarker>),
}

/// Outcome of replacing an owner's image.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct ImageReplacement {
    pub file: File,
    /// Url of the image that was replaced and now has to leave storage.
    pub replaced_url: Option<String>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
struct OwnerColumns {
    user: Option<i64>,
    university: Option<i64>,
    post: Option<i64>,
    comment: Option<i64>,
}

impl From<ImageOwner> for OwnerColumns {
    fn from(value: ImageOwner) -> Self {
        let mut columns = Self::default();
        match value {
            ImageOwner::User(id) => columns.user = Some(id.get()),
            ImageOwner::University(id) => columns.university = Some(id.get()),
            ImageOwner::Post(id) => columns.post = Some(id.get()),
            ImageOwner::Comment(id) => columns.comment = Some(id.get()),
        }
        columns
    }
}

pub(crate) async fn insert_file(
    conn: &mut PgConnection,
    file: &NewFile,
    kind: FileKind,
    owner: ImageOwner,
) -> Result<File> {
    let owner = OwnerColumns::from(owner);

    let record: FileRecord = sqlx::query_as(
        "
        INSERT INTO files.files
            (file_name, file_url, file_format, file_kind, owner_user, owner_university, owner_post, owner_comment)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING file_id, file_name, file_url, file_format, owner_post
        ",
    )
    .bind(&file.name)
    .bind(&file.url)
    .bind(&file.format)
    .bind(kind.as_str())
    .bind(owner.user)
    .bind(owner.university)
    .bind(owner.post)
    .bind(owner.comment)
    .fetch_one(conn)
    .await?;

    Ok(record.into())
}

/// Attachments of every post in `posts`, keyed by post.
pub(crate) async fn fetch_attachments(
    conn: &mut PgConnection,
    posts: &[i64],
) -> Result<HashMap<i64, Vec<File>>> {
    let records: Vec<FileRecord> = sqlx::query_as(
        "
        SELECT file_id, file_name, file_url, file_format, owner_post
        FROM files.files
        WHERE file_kind = 'attachment' AND owner_post = ANY($1)
        ORDER BY file_id
        ",
    )
    .bind(posts)
    .fetch_all(conn)
    .await?;

    let mut attachments: HashMap<i64, Vec<File>> = HashMap::new();
    for record in records {
        if let Some(post) = record.owner_post {
            attachments.entry(post).or_default().push(record.into());
        }
    }
    Ok(attachments)
}

async fn owner_exists(conn: &mut PgConnection, owner: ImageOwner) -> Result<bool> {
    let query = match owner {
        ImageOwner::User(_) => {
            "SELECT EXISTS (SELECT 1 FROM users.users WHERE user_id = $1 FOR NO KEY UPDATE)"
        }
        ImageOwner::University(_) => {
            "SELECT EXISTS (SELECT 1 FROM users.universities WHERE university_id = $1 FOR NO KEY UPDATE)"
        }
        ImageOwner::Post(_) => {
            "SELECT EXISTS (SELECT 1 FROM posts.posts WHERE post_id = $1 FOR NO KEY UPDATE)"
        }
        ImageOwner::Comment(_) => {
            "SELECT EXISTS (SELECT 1 FROM posts.comments WHERE comment_id = $1 FOR NO KEY UPDATE)"
        }
    };
    let id = match owner {
        ImageOwner::User(id) => id.get(),
        ImageOwner::University(id) => id.get(),
        ImageOwner::Post(id) => id.get(),
        ImageOwner::Comment(id) => id.get(),
    };

    let exists = sqlx::query_scalar(query).bind(id).fetch_one(conn).await?;
    Ok(exists)
}

impl DbClient {
    /// Swaps the image of `owner` for `file`. `None` if the owner does not exist.
    pub async fn replace_image(
        &self,
        owner: ImageOwner,
        file: &NewFile,
    ) -> Result<Option<ImageReplacement>> {
        let mut tx = self.pool.begin().await?;

        if !owner_exists(&mut tx, owner).await? {
            return Ok(None);
        }

        let columns = OwnerColumns::from(owner);
        let replaced_url: Option<String> = sqlx::query_scalar(
            "
            DELETE FROM files.files
            WHERE file_kind = 'image'
                AND (owner_user = $1 OR owner_university = $2 OR owner_post = $3 OR owner_comment = $4)
            RETURNING file_url
            ",
        )
        .bind(columns.user)
        .bind(columns.university)
        .bind(columns.post)
        .bind(columns.comment)
        .fetch_optional(&mut *tx)
        .await?;

        let file = insert_file(&mut tx, file, FileKind::Image, owner).await?;
        tx.commit().await?;

        debug!(?owner, file_id = %file.id, replaced = replaced_url.is_some(), "Replaced image");
        Ok(Some(ImageReplacement { file, replaced_url }))
    }
}
