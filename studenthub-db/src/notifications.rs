use crate::{
    client::{DbClient, Result},
    record::{NoticeRecord, NotificationRecord},
};
use sqlx::PgConnection;
use studenthub_common::{
    model::{
        Id,
        notification::{NewNotification, Notification, NotificationMarker},
        user::UserMarker,
    },
    util::{Page, Pagination},
};

/// A stored notification together with the address it should be mailed to.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Notice {
    pub notification: Notification,
    pub receiver_email: String,
}

impl From<NoticeRecord> for Notice {
    fn from(value: NoticeRecord) -> Self {
        Self {
            notification: value.notification.into(),
            receiver_email: value.user_email,
        }
    }
}

/// Stores `notification` as part of the caller's transaction.
pub(crate) async fn insert_notification(
    conn: &mut PgConnection,
    notification: &NewNotification,
) -> Result<Notice> {
    let record: NoticeRecord = sqlx::query_as(
        "
        WITH inserted AS (
            INSERT INTO notifications.notifications
                (notification_text, notification_receiver, notification_link)
            VALUES ($1, $2, $3)
            RETURNING *
        )
        SELECT inserted.*, users.user_email
        FROM inserted
            JOIN users.users ON users.user_id = inserted.notification_receiver
        ",
    )
    .bind(&notification.text)
    .bind(notification.receiver.get())
    .bind(notification.link.as_deref())
    .fetch_one(conn)
    .await?;

    Ok(record.into())
}

impl DbClient {
    pub async fn fetch_notifications(
        &self,
        receiver: Id<UserMarker>,
        pagination: Pagination,
    ) -> Result<Page<Notification>> {
        let mut tx = self.pool.begin().await?;

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications.notifications WHERE notification_receiver = $1",
        )
        .bind(receiver.get())
        .fetch_one(&mut *tx)
        .await?;

        let records: Vec<NotificationRecord> = sqlx::query_as(
            "
            SELECT *
            FROM notifications.notifications
            WHERE notification_receiver = $1
            ORDER BY notification_created_at DESC, notification_id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(receiver.get())
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let items = records.into_iter().map(Notification::from).collect();
        Ok(Page::new(items, count, pagination))
    }

    pub async fn fetch_notification(
        &self,
        notification_id: Id<NotificationMarker>,
    ) -> Result<Option<Notification>> {
        let record: Option<NotificationRecord> = sqlx::query_as(
            "SELECT * FROM notifications.notifications WHERE notification_id = $1",
        )
        .bind(notification_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Notification::from))
    }

    pub async fn set_notification_seen(
        &self,
        notification_id: Id<NotificationMarker>,
        is_seen: bool,
    ) -> Result<Option<Notification>> {
        let record: Option<NotificationRecord> = sqlx::query_as(
            "
            UPDATE notifications.notifications
            SET notification_is_seen = $2
            WHERE notification_id = $1
            RETURNING *
            ",
        )
        .bind(notification_id.get())
        .bind(is_seen)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Notification::from))
    }

    /// Returns whether a notification was deleted.
    pub async fn delete_notification(
        &self,
        notification_id: Id<NotificationMarker>,
    ) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM notifications.notifications WHERE notification_id = $1")
                .bind(notification_id.get())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}
