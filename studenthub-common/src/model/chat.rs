use crate::{
    model::{Id, user::UserMarker},
    validate::{FieldErrors, Validate, check_length},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use thiserror::Error;
use time::OffsetDateTime;

pub const MESSAGE_MAX_LEN: usize = 1000;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct RoomMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct MessageMarker;

/// Canonical form of a room's member set.
///
/// A pair of distinct users is written `"lo:hi"` with the smaller id first,
/// a self chat is just the user id. Both orders of the same pair produce the
/// same key, which is what makes room resolution symmetric.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct MemberKey(String);

impl MemberKey {
    #[must_use]
    pub fn new(first: Id<UserMarker>, second: Id<UserMarker>) -> Self {
        let (low, high) = if first <= second {
            (first, second)
        } else {
            (second, first)
        };

        if low == high {
            Self(low.to_string())
        } else {
            Self(format!("{low}:{high}"))
        }
    }

    #[must_use]
    pub fn members(&self) -> Vec<Id<UserMarker>> {
        self.0
            .split(':')
            .filter_map(|part| part.parse::<i64>().ok())
            .map(Id::new)
            .collect()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MemberKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Invalid chat room member key: {0:?}")]
pub struct InvalidMemberKeyError(String);

impl FromStr for MemberKey {
    type Err = InvalidMemberKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidMemberKeyError(s.to_owned());
        let parse = |part: &str| part.parse::<i64>().map(Id::<UserMarker>::new);

        let key = match s.split_once(':') {
            None => {
                let member = parse(s).map_err(|_| invalid())?;
                Self::new(member, member)
            }
            Some((low, high)) => {
                let low = parse(low).map_err(|_| invalid())?;
                let high = parse(high).map_err(|_| invalid())?;
                if low >= high {
                    return Err(invalid());
                }
                Self::new(low, high)
            }
        };

        if key.0 == s { Ok(key) } else { Err(invalid()) }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct ChatRoom {
    pub id: Id<RoomMarker>,
    pub members: Vec<Id<UserMarker>>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Message {
    pub id: Id<MessageMarker>,
    pub text: String,
    pub sender: Id<UserMarker>,
    pub receiver: Id<UserMarker>,
    pub room: Id<RoomMarker>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub edited_at: Option<OffsetDateTime>,
}

impl Message {
    /// Whether the message was exchanged between `a` and `b`, in either direction.
    #[must_use]
    pub fn is_between(&self, a: Id<UserMarker>, b: Id<UserMarker>) -> bool {
        (self.sender == a && self.receiver == b) || (self.sender == b && self.receiver == a)
    }
}

/// A room together with its history, as returned by `GET /chat/{receiver_id}`.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct ChatHistory {
    pub room: ChatRoom,
    pub messages: Vec<Message>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct SendMessage {
    pub text: String,
}

impl Validate for SendMessage {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        check_length(&mut errors, "text", &self.text, 1, MESSAGE_MAX_LEN);
        errors.into_result()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct UpdateMessage {
    pub text: String,
}

impl Validate for UpdateMessage {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        check_length(&mut errors, "text", &self.text, 1, MESSAGE_MAX_LEN);
        errors.into_result()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ChatError {
    #[error("You are not a member of this chat room")]
    NotMember,
    #[error("Only the receiver can mark a message as read")]
    NotReceiver,
    #[error("The message belongs to another chat")]
    ForeignMessage,
    #[error("Only the sender can change a message")]
    NotSender,
}

#[cfg(test)]
mod tests {
    use crate::{
        model::{
            Id,
            chat::{MemberKey, SendMessage},
        },
        validate::Validate,
    };

    #[test]
    fn member_key_is_symmetric() {
        let (a, b) = (Id::new(12), Id::new(3));
        assert_eq!(MemberKey::new(a, b), MemberKey::new(b, a));
        assert_eq!(MemberKey::new(a, b).as_str(), "3:12");
        assert_eq!(MemberKey::new(a, b).members(), vec![b, a]);
    }

    #[test]
    fn self_chat_key_has_one_member() {
        let a = Id::new(5);
        let key = MemberKey::new(a, a);
        assert_eq!(key.as_str(), "5");
        assert_eq!(key.members(), vec![a]);
    }

    #[test]
    fn member_keys_parse_only_in_canonical_form() {
        assert_eq!("3:12".parse::<MemberKey>().unwrap(), MemberKey::new(Id::new(12), Id::new(3)));
        assert_eq!("5".parse::<MemberKey>().unwrap().members(), vec![Id::new(5)]);

        for invalid in ["12:3", "4:4", "a:b", "", "1:2:3", "007"] {
            assert!(invalid.parse::<MemberKey>().is_err(), "{invalid:?} should not parse");
        }
    }

    #[test]
    fn message_text_bounds() {
        assert!(SendMessage { text: "hi".into() }.validate().is_ok());
        assert!(SendMessage { text: String::new() }.validate().is_err());
        assert!(SendMessage { text: "x".repeat(1001) }.validate().is_err());
    }
}
