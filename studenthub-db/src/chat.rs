use crate::{
    client::{DbClient, Result},
    record::{ChatRoomRecord, MessageRecord},
};
use sqlx::PgConnection;
use studenthub_common::{
    model::{
        Id,
        chat::{ChatError, ChatHistory, ChatRoom, MemberKey, Message, MessageMarker, RoomMarker},
        user::UserMarker,
    },
    util::{Page, Pagination},
};
use tracing::{debug, info};

const SELECT_CONVERSATION: &str = "
    SELECT *
    FROM chat.messages
    WHERE message_chatroom = $1
        AND (
            (message_sender = $2 AND message_receiver = $3)
            OR (message_sender = $3 AND message_receiver = $2)
        )
    ORDER BY message_created_at, message_id
";

/// Finds the room of `a` and `b`, creating it if it does not exist yet.
///
/// The member key is unique, so two transactions racing to create the same
/// room end up with the one that committed first.
pub(crate) async fn resolve_room(
    conn: &mut PgConnection,
    a: Id<UserMarker>,
    b: Id<UserMarker>,
) -> Result<ChatRoom> {
    let key = MemberKey::new(a, b);

    let created: Option<i64> = sqlx::query_scalar(
        "
        INSERT INTO chat.chat_rooms (chatroom_member_key)
        VALUES ($1)
        ON CONFLICT (chatroom_member_key) DO NOTHING
        RETURNING chatroom_id
        ",
    )
    .bind(key.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    let room_id = match created {
        Some(room_id) => {
            let members = key.members().into_iter().map(Id::get).collect::<Vec<_>>();
            sqlx::query(
                "
                INSERT INTO chat.chatroom_users (chatroom_id, user_id)
                SELECT $1, unnest($2::BIGINT[])
                ",
            )
            .bind(room_id)
            .bind(&members)
            .execute(&mut *conn)
            .await?;

            info!(room_id, member_key = %key, "Created chat room");
            room_id
        }
        None => {
            sqlx::query_scalar("SELECT chatroom_id FROM chat.chat_rooms WHERE chatroom_member_key = $1")
                .bind(key.as_str())
                .fetch_one(&mut *conn)
                .await?
        }
    };

    Ok(ChatRoom {
        id: room_id.into(),
        members: key.members(),
    })
}

async fn user_exists(conn: &mut PgConnection, user_id: Id<UserMarker>) -> Result<bool> {
    let exists = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users.users WHERE user_id = $1)")
        .bind(user_id.get())
        .fetch_one(conn)
        .await?;

    Ok(exists)
}

/// Loads a message for a change by `editor` in their chat with `receiver`.
async fn own_message(
    conn: &mut PgConnection,
    editor: Id<UserMarker>,
    receiver: Id<UserMarker>,
    message_id: Id<MessageMarker>,
) -> Result<Option<Message>> {
    let record: Option<MessageRecord> =
        sqlx::query_as("SELECT * FROM chat.messages WHERE message_id = $1 FOR UPDATE")
            .bind(message_id.get())
            .fetch_optional(conn)
            .await?;
    let Some(message) = record.map(Message::from) else {
        return Ok(None);
    };

    if !message.is_between(editor, receiver) {
        return Err(ChatError::ForeignMessage.into());
    }
    if message.sender != editor {
        return Err(ChatError::NotSender.into());
    }
    Ok(Some(message))
}

impl DbClient {
    /// Resolves the room of `reader` and `other` and returns its whole history.
    ///
    /// Unread messages addressed to `reader` are marked read in the same
    /// transaction. `None` if `other` does not exist.
    pub async fn open_room(
        &self,
        reader: Id<UserMarker>,
        other: Id<UserMarker>,
    ) -> Result<Option<ChatHistory>> {
        let mut tx = self.pool.begin().await?;

        if !user_exists(&mut tx, other).await? {
            return Ok(None);
        }

        let room = resolve_room(&mut tx, reader, other).await?;

        let marked = sqlx::query(
            "
            UPDATE chat.messages
            SET message_is_read = TRUE
            WHERE message_chatroom = $1 AND message_receiver = $2 AND NOT message_is_read
            ",
        )
        .bind(room.id.get())
        .bind(reader.get())
        .execute(&mut *tx)
        .await?;

        let records: Vec<MessageRecord> = sqlx::query_as(SELECT_CONVERSATION)
            .bind(room.id.get())
            .bind(reader.get())
            .bind(other.get())
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(room_id = %room.id, %reader, marked_read = marked.rows_affected(), "Opened chat room");
        let messages = records.into_iter().map(Message::from).collect();
        Ok(Some(ChatHistory { room, messages }))
    }

    pub async fn fetch_room(&self, room_id: Id<RoomMarker>) -> Result<Option<ChatRoom>> {
        let record: Option<ChatRoomRecord> =
            sqlx::query_as("SELECT * FROM chat.chat_rooms WHERE chatroom_id = $1")
                .bind(room_id.get())
                .fetch_optional(&self.pool)
                .await?;

        let room = record.map(ChatRoom::try_from).transpose()?;
        Ok(room)
    }

    /// Persists a message from `sender` to `receiver` in their room.
    ///
    /// When `expected_room` is given it has to be the room of the two users.
    /// `None` if `receiver` does not exist.
    pub async fn send_message(
        &self,
        sender: Id<UserMarker>,
        receiver: Id<UserMarker>,
        text: &str,
        expected_room: Option<Id<RoomMarker>>,
    ) -> Result<Option<Message>> {
        let mut tx = self.pool.begin().await?;

        if !user_exists(&mut tx, receiver).await? {
            return Ok(None);
        }

        let room = resolve_room(&mut tx, sender, receiver).await?;
        if expected_room.is_some_and(|expected| expected != room.id) {
            return Err(ChatError::NotMember.into());
        }

        let record: MessageRecord = sqlx::query_as(
            "
            INSERT INTO chat.messages (message_text, message_sender, message_receiver, message_chatroom)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            ",
        )
        .bind(text)
        .bind(sender.get())
        .bind(receiver.get())
        .bind(room.id.get())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let message = Message::from(record);
        debug!(message_id = %message.id, room_id = %room.id, %sender, %receiver, "Stored message");
        Ok(Some(message))
    }

    /// Marks a message as read by its receiver. `None` if it does not exist.
    pub async fn mark_message_read(
        &self,
        reader: Id<UserMarker>,
        message_id: Id<MessageMarker>,
    ) -> Result<Option<Message>> {
        let mut tx = self.pool.begin().await?;

        let record: Option<MessageRecord> =
            sqlx::query_as("SELECT * FROM chat.messages WHERE message_id = $1 FOR UPDATE")
                .bind(message_id.get())
                .fetch_optional(&mut *tx)
                .await?;
        let Some(message) = record.map(Message::from) else {
            return Ok(None);
        };
        if message.receiver != reader {
            return Err(ChatError::NotReceiver.into());
        }

        let record: MessageRecord = sqlx::query_as(
            "UPDATE chat.messages SET message_is_read = TRUE WHERE message_id = $1 RETURNING *",
        )
        .bind(message_id.get())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(record.into()))
    }

    /// Paginated history between `a` and `b`, oldest first. `None` if `b` does not exist.
    pub async fn fetch_messages(
        &self,
        a: Id<UserMarker>,
        b: Id<UserMarker>,
        pagination: Pagination,
    ) -> Result<Option<Page<Message>>> {
        let mut tx = self.pool.begin().await?;

        if !user_exists(&mut tx, b).await? {
            return Ok(None);
        }

        let room_id: Option<i64> =
            sqlx::query_scalar("SELECT chatroom_id FROM chat.chat_rooms WHERE chatroom_member_key = $1")
                .bind(MemberKey::new(a, b).as_str())
                .fetch_optional(&mut *tx)
                .await?;
        let Some(room_id) = room_id else {
            return Ok(Some(Page::new(Vec::new(), 0, pagination)));
        };

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chat.messages WHERE message_chatroom = $1")
                .bind(room_id)
                .fetch_one(&mut *tx)
                .await?;
        let records: Vec<MessageRecord> = sqlx::query_as(
            "
            SELECT *
            FROM chat.messages
            WHERE message_chatroom = $1
            ORDER BY message_created_at, message_id
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(room_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let items = records.into_iter().map(Message::from).collect();
        Ok(Some(Page::new(items, count, pagination)))
    }

    pub async fn update_message(
        &self,
        editor: Id<UserMarker>,
        receiver: Id<UserMarker>,
        message_id: Id<MessageMarker>,
        text: &str,
    ) -> Result<Option<Message>> {
        let mut tx = self.pool.begin().await?;

        if own_message(&mut tx, editor, receiver, message_id).await?.is_none() {
            return Ok(None);
        }

        let record: MessageRecord = sqlx::query_as(
            "
            UPDATE chat.messages
            SET message_text = $2, message_edited_at = now()
            WHERE message_id = $1
            RETURNING *
            ",
        )
        .bind(message_id.get())
        .bind(text)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(record.into()))
    }

    /// Deletes one of the editor's messages and returns it.
    pub async fn delete_message(
        &self,
        editor: Id<UserMarker>,
        receiver: Id<UserMarker>,
        message_id: Id<MessageMarker>,
    ) -> Result<Option<Message>> {
        let mut tx = self.pool.begin().await?;

        let Some(message) = own_message(&mut tx, editor, receiver, message_id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM chat.messages WHERE message_id = $1")
            .bind(message_id.get())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(%message_id, %editor, "Deleted message");
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        chat::resolve_room,
        client::{DbClient, DbError},
        fixtures,
    };
    use sqlx::PgPool;
    use studenthub_common::{
        model::{Id, chat::ChatError},
        util::Pagination,
    };

    #[sqlx::test(migrations = "./migrations")]
    async fn rooms_do_not_depend_on_member_order(pool: PgPool) {
        let ada = fixtures::user(&pool, "Ada").await;
        let bea = fixtures::user(&pool, "Bea").await;
        let mut conn = pool.acquire().await.unwrap();

        let there = resolve_room(&mut *conn, ada, bea).await.unwrap();
        let back = resolve_room(&mut *conn, bea, ada).await.unwrap();
        assert_eq!(there, back);
        assert_eq!(there.members, [ada, bea]);

        let own = resolve_room(&mut *conn, ada, ada).await.unwrap();
        assert_ne!(own.id, there.id);
        assert_eq!(own.members, [ada]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn conversation_reuses_its_room(pool: PgPool) {
        let ada = fixtures::user(&pool, "Ada").await;
        let bea = fixtures::user(&pool, "Bea").await;
        let db = DbClient::new(pool);

        let hi = db.send_message(ada, bea, "hi", None).await.unwrap().unwrap();
        let there = db
            .send_message(bea, ada, "there", Some(hi.room))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hi.room, there.room);
        assert!(!hi.is_read);

        let room = db.fetch_room(hi.room).await.unwrap().unwrap();
        assert_eq!(room.members, [ada, bea]);

        let page = db
            .fetch_messages(bea, ada, Pagination::default())
            .await
            .unwrap()
            .unwrap();
        let texts: Vec<_> = page.items.iter().map(|message| message.text.as_str()).collect();
        assert_eq!(texts, ["hi", "there"]);
        assert!(page.items[0].created_at <= page.items[1].created_at);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn opening_a_room_reads_what_was_received(pool: PgPool) {
        let ada = fixtures::user(&pool, "Ada").await;
        let bea = fixtures::user(&pool, "Bea").await;
        let db = DbClient::new(pool);

        db.send_message(ada, bea, "hi", None).await.unwrap().unwrap();
        db.send_message(bea, ada, "there", None).await.unwrap().unwrap();

        let history = db.open_room(bea, ada).await.unwrap().unwrap();
        let read: Vec<_> = history
            .messages
            .iter()
            .map(|message| (message.text.as_str(), message.is_read))
            .collect();
        assert_eq!(read, [("hi", true), ("there", false)]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn chat_rules_hold_in_the_store(pool: PgPool) {
        let ada = fixtures::user(&pool, "Ada").await;
        let bea = fixtures::user(&pool, "Bea").await;
        let cem = fixtures::user(&pool, "Cem").await;
        let db = DbClient::new(pool);

        let hi = db.send_message(ada, bea, "hi", None).await.unwrap().unwrap();

        assert!(matches!(
            db.send_message(cem, bea, "sneaky", Some(hi.room)).await,
            Err(DbError::Chat(ChatError::NotMember))
        ));
        assert!(matches!(
            db.mark_message_read(ada, hi.id).await,
            Err(DbError::Chat(ChatError::NotReceiver))
        ));
        assert!(db.mark_message_read(bea, hi.id).await.unwrap().unwrap().is_read);

        assert!(matches!(
            db.update_message(bea, ada, hi.id, "edited").await,
            Err(DbError::Chat(ChatError::NotSender))
        ));
        let edited = db.update_message(ada, bea, hi.id, "hello").await.unwrap().unwrap();
        assert_eq!(edited.text, "hello");
        assert!(edited.edited_at.is_some());

        assert!(db.send_message(ada, Id::new(9_999), "anyone?", None).await.unwrap().is_none());
        db.delete_message(ada, bea, hi.id).await.unwrap().unwrap();
        assert!(db.delete_message(ada, bea, hi.id).await.unwrap().is_none());
    }
}
