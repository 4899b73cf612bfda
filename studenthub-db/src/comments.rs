use crate::{
    cascade::{CascadeScope, collect_files},
    client::{DbClient, Result},
    notifications::{Notice, insert_notification},
    record::CommentRecord,
    users::display_name,
};
use studenthub_common::{
    model::{
        Id,
        comment::{Comment, CommentMarker, CreateComment, UpdateComment, check_parent},
        notification::NewNotification,
        post::PostMarker,
        user::UserMarker,
    },
    util::{Page, Pagination},
};
use tracing::info;

macro_rules! select_comments {
    ($($tail:literal)?) => {
        concat!(
            "
            SELECT
                comments.comment_id,
                comments.comment_text,
                comments.comment_author,
                comments.comment_post,
                comments.comment_parent,
                comments.comment_created_at,
                comments.comment_modified_at,
                (
                    SELECT files.file_url
                    FROM files.files
                    WHERE files.owner_comment = comments.comment_id AND files.file_kind = 'image'
                ) AS image_url
            FROM posts.comments
            ",
            $($tail)?
        )
    };
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum CommentCreation {
    Created {
        comment: Comment,
        /// Notification for the post author, absent when they commented themselves.
        notice: Option<Notice>,
    },
    MissingPost,
    MissingParent,
}

impl DbClient {
    /// Comments of a post, oldest first. `None` if the post does not exist.
    pub async fn fetch_comments(
        &self,
        post_id: Id<PostMarker>,
        pagination: Pagination,
    ) -> Result<Option<Page<Comment>>> {
        let mut tx = self.pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM posts.posts WHERE post_id = $1)")
                .bind(post_id.get())
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Ok(None);
        }

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM posts.comments WHERE comment_post = $1")
                .bind(post_id.get())
                .fetch_one(&mut *tx)
                .await?;
        let records: Vec<CommentRecord> = sqlx::query_as(select_comments!(
            "
            WHERE comments.comment_post = $1
            ORDER BY comments.comment_created_at, comments.comment_id
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(post_id.get())
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let items = records.into_iter().map(Comment::from).collect();
        Ok(Some(Page::new(items, count, pagination)))
    }

    pub async fn fetch_comment(&self, comment_id: Id<CommentMarker>) -> Result<Option<Comment>> {
        let record: Option<CommentRecord> =
            sqlx::query_as(select_comments!("WHERE comments.comment_id = $1"))
                .bind(comment_id.get())
                .fetch_optional(&self.pool)
                .await?;

        Ok(record.map(Comment::from))
    }

    /// Stores a comment and notifies the post author in one transaction.
    pub async fn create_comment(
        &self,
        author: Id<UserMarker>,
        comment: &CreateComment,
    ) -> Result<CommentCreation> {
        let mut tx = self.pool.begin().await?;

        let post_author: Option<i64> =
            sqlx::query_scalar("SELECT post_author FROM posts.posts WHERE post_id = $1")
                .bind(comment.post.get())
                .fetch_optional(&mut *tx)
                .await?;
        let Some(post_author) = post_author.map(Id::<UserMarker>::new) else {
            return Ok(CommentCreation::MissingPost);
        };

        if let Some(parent) = comment.parent {
            let parent_post: Option<i64> = sqlx::query_scalar(
                "SELECT comment_post FROM posts.comments WHERE comment_id = $1",
            )
            .bind(parent.get())
            .fetch_optional(&mut *tx)
            .await?;
            let Some(parent_post) = parent_post else {
                return Ok(CommentCreation::MissingParent);
            };
            check_parent(comment.post, parent, parent_post.into())?;
        }

        let record: CommentRecord = sqlx::query_as(
            "
            INSERT INTO posts.comments (comment_text, comment_author, comment_post, comment_parent)
            VALUES ($1, $2, $3, $4)
            RETURNING *, NULL::VARCHAR AS image_url
            ",
        )
        .bind(&comment.text)
        .bind(author.get())
        .bind(comment.post.get())
        .bind(comment.parent.map(Id::get))
        .fetch_one(&mut *tx)
        .await?;
        let comment = Comment::from(record);

        let notice = if post_author == author {
            None
        } else {
            let commenter_name = display_name(&mut tx, author).await?;
            let notification =
                NewNotification::new_comment(post_author, &commenter_name, comment.post, comment.id);
            Some(insert_notification(&mut tx, &notification).await?)
        };

        tx.commit().await?;

        info!(comment_id = %comment.id, post_id = %comment.post, %author, "Created comment");
        Ok(CommentCreation::Created { comment, notice })
    }

    pub async fn update_comment(
        &self,
        comment_id: Id<CommentMarker>,
        update: &UpdateComment,
    ) -> Result<Option<Comment>> {
        let updated = sqlx::query(
            "
            UPDATE posts.comments
            SET comment_text = $2, comment_modified_at = now()
            WHERE comment_id = $1
            ",
        )
        .bind(comment_id.get())
        .bind(&update.text)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch_comment(comment_id).await
    }

    /// Deletes a comment and its replies.
    pub async fn delete_comment(
        &self,
        comment_id: Id<CommentMarker>,
    ) -> Result<Option<Vec<String>>> {
        let mut tx = self.pool.begin().await?;

        let file_urls = collect_files(&mut tx, CascadeScope::Comment(comment_id)).await?;
        let deleted = sqlx::query("DELETE FROM posts.comments WHERE comment_id = $1")
            .bind(comment_id.get())
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        tx.commit().await?;
        info!(%comment_id, "Deleted comment");
        Ok(Some(file_urls))
    }
}
