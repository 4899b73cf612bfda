use crate::{
    cascade::{CascadeScope, collect_files},
    client::{DbClient, DbError, Result},
    files::{ImageOwner, fetch_attachments, insert_file},
    notifications::{Notice, insert_notification},
    record::{PostRecord, UserSummaryRecord},
    users::display_name,
};
use sqlx::PgConnection;
use studenthub_common::{
    model::{
        Id,
        file::{FileKind, NewFile},
        notification::NewNotification,
        post::{CreatePost, Post, PostMarker, PostRating, UpdatePost, Vote, VoteChange},
        user::{UserMarker, UserSummary},
    },
    util::{Page, Pagination},
};
use tracing::{debug, info};

macro_rules! select_posts {
    ($($tail:literal)?) => {
        concat!(
            "
            SELECT
                posts.post_id,
                posts.post_heading,
                posts.post_text,
                posts.post_author,
                posts.post_likes_count,
                posts.post_dislikes_count,
                posts.post_rating,
                posts.post_created_at,
                posts.post_modified_at,
                (
                    SELECT files.file_url
                    FROM files.files
                    WHERE files.owner_post = posts.post_id AND files.file_kind = 'image'
                ) AS image_url
            FROM posts.posts
            ",
            $($tail)?
        )
    };
}

/// Result of a successful vote.
#[derive(Clone, PartialEq, Debug)]
pub struct RatingOutcome {
    pub rating: PostRating,
    pub change: VoteChange,
    /// Notification for the post author, absent when they voted on their own post.
    pub notice: Option<Notice>,
}

fn insert_vote_query(vote: Vote) -> &'static str {
    match vote {
        Vote::Like => "INSERT INTO posts.post_likes (post_id, user_id) VALUES ($1, $2)",
        Vote::Dislike => "INSERT INTO posts.post_dislikes (post_id, user_id) VALUES ($1, $2)",
    }
}

fn delete_vote_query(vote: Vote) -> &'static str {
    match vote {
        Vote::Like => "DELETE FROM posts.post_likes WHERE post_id = $1 AND user_id = $2",
        Vote::Dislike => "DELETE FROM posts.post_dislikes WHERE post_id = $1 AND user_id = $2",
    }
}

fn voters_query(vote: Vote) -> &'static str {
    match vote {
        Vote::Like => {
            "
            SELECT
                users.user_id,
                users.user_name,
                users.user_surname,
                (
                    SELECT files.file_url
                    FROM files.files
                    WHERE files.owner_user = users.user_id AND files.file_kind = 'image'
                ) AS image_url
            FROM posts.post_likes
                JOIN users.users ON users.user_id = post_likes.user_id
            WHERE post_likes.post_id = $1
            ORDER BY users.user_id
            LIMIT $2 OFFSET $3
            "
        }
        Vote::Dislike => {
            "
            SELECT
                users.user_id,
                users.user_name,
                users.user_surname,
                (
                    SELECT files.file_url
                    FROM files.files
                    WHERE files.owner_user = users.user_id AND files.file_kind = 'image'
                ) AS image_url
            FROM posts.post_dislikes
                JOIN users.users ON users.user_id = post_dislikes.user_id
            WHERE post_dislikes.post_id = $1
            ORDER BY users.user_id
            LIMIT $2 OFFSET $3
            "
        }
    }
}

fn count_voters_query(vote: Vote) -> &'static str {
    match vote {
        Vote::Like => "SELECT COUNT(*) FROM posts.post_likes WHERE post_id = $1",
        Vote::Dislike => "SELECT COUNT(*) FROM posts.post_dislikes WHERE post_id = $1",
    }
}

async fn attach_files(conn: &mut PgConnection, records: Vec<PostRecord>) -> Result<Vec<Post>> {
    let ids = records.iter().map(|record| record.post_id).collect::<Vec<_>>();
    let mut attachments = fetch_attachments(conn, &ids).await?;

    let posts = records
        .into_iter()
        .map(|record| {
            let files = attachments.remove(&record.post_id).unwrap_or_default();
            record.into_post(files)
        })
        .collect();
    Ok(posts)
}

async fn load_post(conn: &mut PgConnection, post_id: Id<PostMarker>) -> Result<Option<Post>> {
    let record: Option<PostRecord> = sqlx::query_as(select_posts!("WHERE posts.post_id = $1"))
        .bind(post_id.get())
        .fetch_optional(&mut *conn)
        .await?;

    match record {
        Some(record) => Ok(attach_files(conn, vec![record]).await?.pop()),
        None => Ok(None),
    }
}

impl DbClient {
    pub async fn fetch_posts(&self, pagination: Pagination) -> Result<Page<Post>> {
        let mut tx = self.pool.begin().await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts.posts")
            .fetch_one(&mut *tx)
            .await?;
        let records: Vec<PostRecord> = sqlx::query_as(select_posts!(
            "ORDER BY posts.post_created_at DESC, posts.post_id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&mut *tx)
        .await?;

        let posts = attach_files(&mut tx, records).await?;
        tx.commit().await?;

        Ok(Page::new(posts, count, pagination))
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let mut tx = self.pool.begin().await?;
        let post = load_post(&mut tx, post_id).await?;
        tx.commit().await?;

        Ok(post)
    }

    pub async fn create_post(
        &self,
        author: Id<UserMarker>,
        post: &CreatePost,
        image: Option<&NewFile>,
        attachments: &[NewFile],
    ) -> Result<Post> {
        let mut tx = self.pool.begin().await?;

        let post_id: i64 = sqlx::query_scalar(
            "
            INSERT INTO posts.posts (post_heading, post_text, post_author)
            VALUES ($1, $2, $3)
            RETURNING post_id
            ",
        )
        .bind(&post.heading)
        .bind(&post.text)
        .bind(author.get())
        .fetch_one(&mut *tx)
        .await?;

        let owner_post_id = Id::<PostMarker>::new(post_id);
        let owner = ImageOwner::Post(owner_post_id);
        if let Some(image) = image {
            insert_file(&mut tx, image, FileKind::Image, owner).await?;
        }
        for attachment in attachments {
            insert_file(&mut tx, attachment, FileKind::Attachment, owner).await?;
        }

        let post = load_post(&mut tx, owner_post_id)
            .await?
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))?;

        tx.commit().await?;

        info!(post_id, %author, files = post.files.len(), "Created post");
        Ok(post)
    }

    pub async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        update: &UpdatePost,
    ) -> Result<Option<Post>> {
        let updated = sqlx::query(
            "
            UPDATE posts.posts SET
                post_heading = COALESCE($2, post_heading),
                post_text = COALESCE($3, post_text),
                post_modified_at = now()
            WHERE post_id = $1
            ",
        )
        .bind(post_id.get())
        .bind(update.heading.as_deref())
        .bind(update.text.as_deref())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch_post(post_id).await
    }

    pub async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<Option<Vec<String>>> {
        let mut tx = self.pool.begin().await?;

        let file_urls = collect_files(&mut tx, CascadeScope::Post(post_id)).await?;
        let deleted = sqlx::query("DELETE FROM posts.posts WHERE post_id = $1")
            .bind(post_id.get())
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await?;
        info!(%post_id, files = file_urls.len(), "Deleted post");
        Ok(Some(file_urls))
    }

    /// Casts `vote` on behalf of `actor` and recomputes the post's counters.
    ///
    /// The post row stays locked until commit, so votes on the same post
    /// serialize. `None` if the post does not exist.
    pub async fn rate_post(
        &self,
        post_id: Id<PostMarker>,
        actor: Id<UserMarker>,
        vote: Vote,
    ) -> Result<Option<RatingOutcome>> {
        let mut tx = self.pool.begin().await?;

        let author: Option<i64> = sqlx::query_scalar(
            "SELECT post_author FROM posts.posts WHERE post_id = $1 FOR NO KEY UPDATE",
        )
        .bind(post_id.get())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(author) = author.map(Id::<UserMarker>::new) else {
            return Ok(None);
        };

        let (liked, disliked): (bool, bool) = sqlx::query_as(
            "
            SELECT
                EXISTS (SELECT 1 FROM posts.post_likes WHERE post_id = $1 AND user_id = $2),
                EXISTS (SELECT 1 FROM posts.post_dislikes WHERE post_id = $1 AND user_id = $2)
            ",
        )
        .bind(post_id.get())
        .bind(actor.get())
        .fetch_one(&mut *tx)
        .await?;

        let change = VoteChange::plan(Vote::from_membership(liked, disliked)?, vote)?;

        if let Some(removed) = change.removed() {
            sqlx::query(delete_vote_query(removed))
                .bind(post_id.get())
                .bind(actor.get())
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(insert_vote_query(change.vote()))
            .bind(post_id.get())
            .bind(actor.get())
            .execute(&mut *tx)
            .await?;

        let (likes, dislikes): (i64, i64) = sqlx::query_as(
            "
            SELECT
                (SELECT COUNT(*) FROM posts.post_likes WHERE post_id = $1),
                (SELECT COUNT(*) FROM posts.post_dislikes WHERE post_id = $1)
            ",
        )
        .bind(post_id.get())
        .fetch_one(&mut *tx)
        .await?;

        let rating = PostRating::from_counts(likes, dislikes);
        sqlx::query(
            "
            UPDATE posts.posts SET
                post_likes_count = $2,
                post_dislikes_count = $3,
                post_rating = $4
            WHERE post_id = $1
            ",
        )
        .bind(post_id.get())
        .bind(rating.likes)
        .bind(rating.dislikes)
        .bind(rating.rating)
        .execute(&mut *tx)
        .await?;

        let notice = if author == actor {
            None
        } else {
            let actor_name = display_name(&mut tx, actor).await?;
            let notification = NewNotification::post_rated(author, &actor_name, post_id, vote);
            Some(insert_notification(&mut tx, &notification).await?)
        };

        tx.commit().await?;

        debug!(
            %post_id, %actor, ?change,
            likes = rating.likes, dislikes = rating.dislikes, rating = rating.rating,
            "Rated post"
        );
        Ok(Some(RatingOutcome {
            rating,
            change,
            notice,
        }))
    }

    /// Users behind one kind of vote. `None` if the post does not exist.
    pub async fn fetch_post_voters(
        &self,
        post_id: Id<PostMarker>,
        vote: Vote,
        pagination: Pagination,
    ) -> Result<Option<Page<UserSummary>>> {
        let mut tx = self.pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM posts.posts WHERE post_id = $1)")
                .bind(post_id.get())
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Ok(None);
        }

        let count: i64 = sqlx::query_scalar(count_voters_query(vote))
            .bind(post_id.get())
            .fetch_one(&mut *tx)
            .await?;
        let records: Vec<UserSummaryRecord> = sqlx::query_as(voters_query(vote))
            .bind(post_id.get())
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let items = records.into_iter().map(UserSummary::from).collect();
        Ok(Some(Page::new(items, count, pagination)))
    }
}
