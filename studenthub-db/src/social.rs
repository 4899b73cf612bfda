use crate::{
    client::{DbClient, Result},
    notifications::{Notice, insert_notification},
    record::UserSummaryRecord,
    users::display_name,
};
use sqlx::PgConnection;
use studenthub_common::{
    model::{
        Id,
        follow::{EdgeViews, FollowAction, FollowError, check, ensure_distinct},
        notification::NewNotification,
        user::{UserMarker, UserSummary},
    },
    util::{Page, Pagination},
};
use tracing::info;

/// Result of applying a follow action.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct FollowOutcome {
    pub action: FollowAction,
    /// Set for a new follow only.
    pub notice: Option<Notice>,
}

/// Reads the edge `follower -> target` from both sides.
async fn edge_views(
    conn: &mut PgConnection,
    follower: Id<UserMarker>,
    target: Id<UserMarker>,
) -> Result<EdgeViews> {
    let in_following: bool = sqlx::query_scalar(
        "
        SELECT $2 = ANY (
            SELECT user_id FROM users.user_followers WHERE follower_id = $1
        )
        ",
    )
    .bind(follower.get())
    .bind(target.get())
    .fetch_one(&mut *conn)
    .await?;

    let in_followers: bool = sqlx::query_scalar(
        "
        SELECT $1 = ANY (
            SELECT follower_id FROM users.user_followers WHERE user_id = $2
        )
        ",
    )
    .bind(follower.get())
    .bind(target.get())
    .fetch_one(&mut *conn)
    .await?;

    Ok(EdgeViews {
        in_following,
        in_followers,
    })
}

impl DbClient {
    /// Follows or unfollows `target`. `None` if the target does not exist.
    ///
    /// Self follows are rejected before touching the database.
    pub async fn apply_follow(
        &self,
        follower: Id<UserMarker>,
        target: Id<UserMarker>,
        action: FollowAction,
    ) -> Result<Option<FollowOutcome>> {
        ensure_distinct(follower, target)?;

        let mut tx = self.pool.begin().await?;

        // Locks the target so concurrent requests for the same edge queue up.
        // Must stay weaker than FOR UPDATE, the edge's foreign key checks take
        // KEY SHARE on both users.
        let target_row: Option<i64> = sqlx::query_scalar(
            "SELECT user_id FROM users.users WHERE user_id = $1 FOR NO KEY UPDATE",
        )
        .bind(target.get())
        .fetch_optional(&mut *tx)
        .await?;
        if target_row.is_none() {
            return Ok(None);
        }

        let views = edge_views(&mut tx, follower, target).await?;
        check(action, follower, target, views)?;

        let notice = match action {
            FollowAction::Follow => {
                sqlx::query("INSERT INTO users.user_followers (user_id, follower_id) VALUES ($1, $2)")
                    .bind(target.get())
                    .bind(follower.get())
                    .execute(&mut *tx)
                    .await?;

                let follower_name = display_name(&mut tx, follower).await?;
                let notification = NewNotification::new_follower(target, &follower_name, follower);
                Some(insert_notification(&mut tx, &notification).await?)
            }
            FollowAction::Unfollow => {
                let removed = sqlx::query(
                    "DELETE FROM users.user_followers WHERE user_id = $1 AND follower_id = $2",
                )
                .bind(target.get())
                .bind(follower.get())
                .execute(&mut *tx)
                .await?;

                if removed.rows_affected() == 0 {
                    return Err(FollowError::NotFollowing.into());
                }
                None
            }
        };

        tx.commit().await?;

        info!(%follower, %target, ?action, "Applied follow action");
        Ok(Some(FollowOutcome { action, notice }))
    }

    /// Users following `user_id`. `None` if the user does not exist.
    pub async fn fetch_followers(
        &self,
        user_id: Id<UserMarker>,
        pagination: Pagination,
    ) -> Result<Option<Page<UserSummary>>> {
        self.fetch_edges(user_id, pagination, EdgeSide::Followers).await
    }

    /// Users `user_id` follows. `None` if the user does not exist.
    pub async fn fetch_following(
        &self,
        user_id: Id<UserMarker>,
        pagination: Pagination,
    ) -> Result<Option<Page<UserSummary>>> {
        self.fetch_edges(user_id, pagination, EdgeSide::Following).await
    }

    async fn fetch_edges(
        &self,
        user_id: Id<UserMarker>,
        pagination: Pagination,
        side: EdgeSide,
    ) -> Result<Option<Page<UserSummary>>> {
        let mut tx = self.pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users.users WHERE user_id = $1)")
                .bind(user_id.get())
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Ok(None);
        }

        let count: i64 = sqlx::query_scalar(side.count_query())
            .bind(user_id.get())
            .fetch_one(&mut *tx)
            .await?;
        let records: Vec<UserSummaryRecord> = sqlx::query_as(side.list_query())
            .bind(user_id.get())
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let items = records.into_iter().map(UserSummary::from).collect();
        Ok(Some(Page::new(items, count, pagination)))
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
enum EdgeSide {
    Followers,
    Following,
}

impl EdgeSide {
    fn count_query(self) -> &'static str {
        match self {
            Self::Followers => "SELECT COUNT(*) FROM users.user_followers WHERE user_id = $1",
            Self::Following => "SELECT COUNT(*) FROM users.user_followers WHERE follower_id = $1",
        }
    }

    fn list_query(self) -> &'static str {
        match self {
            Self::Followers => {
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
                FROM users.user_followers
                    JOIN users.users ON users.user_id = user_followers.follower_id
                WHERE user_followers.user_id = $1
                ORDER BY users.user_id
                LIMIT $2 OFFSET $3
                "
            }
            Self::Following => {
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
                FROM users.user_followers
                    JOIN users.users ON users.user_id = user_followers.user_id
                WHERE user_followers.follower_id = $1
                ORDER BY users.user_id
                LIMIT $2 OFFSET $3
                "
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        client::{DbClient, DbError},
        fixtures,
        social::edge_views,
    };
    use sqlx::PgPool;
    use studenthub_common::{
        model::{
            Id,
            follow::{EdgeViews, FollowAction, FollowError},
        },
        util::Pagination,
    };

    #[sqlx::test(migrations = "./migrations")]
    async fn follow_edges_stay_consistent(pool: PgPool) {
        let follower = fixtures::user(&pool, "Ada").await;
        let target = fixtures::user(&pool, "Bea").await;
        let db = DbClient::new(pool.clone());

        let followed = db
            .apply_follow(follower, target, FollowAction::Follow)
            .await
            .unwrap()
            .unwrap();
        let notice = followed.notice.unwrap();
        assert_eq!(notice.notification.receiver, target);
        assert_eq!(notice.notification.text, "Ada Stone started following you.");

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(
            edge_views(&mut *conn, follower, target).await.unwrap(),
            EdgeViews {
                in_following: true,
                in_followers: true,
            }
        );
        drop(conn);

        let followers = db
            .fetch_followers(target, Pagination::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(followers.count, 1);
        assert_eq!(followers.items[0].id, follower);
        let following = db
            .fetch_following(follower, Pagination::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(following.items[0].id, target);

        assert!(matches!(
            db.apply_follow(follower, target, FollowAction::Follow).await,
            Err(DbError::Follow(FollowError::AlreadyFollowing))
        ));

        let unfollowed = db
            .apply_follow(follower, target, FollowAction::Unfollow)
            .await
            .unwrap()
            .unwrap();
        assert!(unfollowed.notice.is_none());

        assert!(matches!(
            db.apply_follow(follower, target, FollowAction::Unfollow).await,
            Err(DbError::Follow(FollowError::NotFollowing))
        ));

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(
            edge_views(&mut *conn, follower, target).await.unwrap(),
            EdgeViews {
                in_following: false,
                in_followers: false,
            }
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn mutual_follows_go_both_ways(pool: PgPool) {
        let ada = fixtures::user(&pool, "Ada").await;
        let bea = fixtures::user(&pool, "Bea").await;
        let db = DbClient::new(pool);

        let (there, back) = tokio::join!(
            db.apply_follow(ada, bea, FollowAction::Follow),
            db.apply_follow(bea, ada, FollowAction::Follow),
        );
        there.unwrap().unwrap();
        back.unwrap().unwrap();

        let ada_followers = db.fetch_followers(ada, Pagination::default()).await.unwrap().unwrap();
        let bea_followers = db.fetch_followers(bea, Pagination::default()).await.unwrap().unwrap();
        assert_eq!((ada_followers.count, bea_followers.count), (1, 1));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn self_follows_and_missing_targets(pool: PgPool) {
        let ada = fixtures::user(&pool, "Ada").await;
        let db = DbClient::new(pool);

        assert!(matches!(
            db.apply_follow(ada, ada, FollowAction::Follow).await,
            Err(DbError::Follow(FollowError::SelfFollow))
        ));
        assert!(
            db.apply_follow(ada, Id::new(9_999), FollowAction::Follow)
                .await
                .unwrap()
                .is_none()
        );
    }
}
