use serde::{Deserialize, Serialize};
use studenthub_common::model::{
    Id,
    chat::{Message, MessageMarker, RoomMarker},
    user::UserMarker,
};

/// Frames a client sends over the chat socket.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom {
        room_id: Id<RoomMarker>,
    },
    LeaveRoom {
        room_id: Id<RoomMarker>,
    },
    Message {
        text: String,
        sender_id: Id<UserMarker>,
        receiver_id: Id<UserMarker>,
        room_id: Id<RoomMarker>,
    },
    MessageRead {
        message_id: Id<MessageMarker>,
    },
}

/// Frames the server pushes to chat clients.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    DisplayMessage(Message),
    MessageRead {
        message_id: Id<MessageMarker>,
        room_id: Id<RoomMarker>,
        reader_id: Id<UserMarker>,
    },
    Joined {
        room_id: Id<RoomMarker>,
    },
    Left {
        room_id: Id<RoomMarker>,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::realtime::protocol::{ClientEvent, ServerEvent};
    use serde_json::json;
    use studenthub_common::model::{Id, chat::Message};
    use time::OffsetDateTime;

    #[test]
    fn client_events_parse() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "message",
            "text": "hi",
            "sender_id": 1,
            "receiver_id": 2,
            "room_id": 7,
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::Message {
                text: "hi".into(),
                sender_id: Id::new(1),
                receiver_id: Id::new(2),
                room_id: Id::new(7),
            }
        );

        let event: ClientEvent =
            serde_json::from_value(json!({"event": "message_read", "message_id": 4})).unwrap();
        assert_eq!(event, ClientEvent::MessageRead { message_id: Id::new(4) });

        assert!(serde_json::from_value::<ClientEvent>(json!({"event": "shout"})).is_err());
    }

    #[test]
    fn display_message_inlines_the_message() {
        let event = ServerEvent::DisplayMessage(Message {
            id: Id::new(9),
            text: "there".into(),
            sender: Id::new(1),
            receiver: Id::new(2),
            room: Id::new(7),
            is_read: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
            edited_at: None,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "display_message");
        assert_eq!(value["id"], 9);
        assert_eq!(value["room"], 7);
        assert_eq!(value["text"], "there");
    }
}
