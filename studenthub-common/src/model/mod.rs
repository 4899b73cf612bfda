pub mod auth;
pub mod chat;
pub mod comment;
pub mod file;
pub mod follow;
pub mod notification;
pub mod post;
pub mod university;
pub mod user;

use crate::{model::chat::InvalidMemberKeyError, util::NonPositiveDurationError};
use derive_where::derive_where;
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    MemberKey(#[from] InvalidMemberKeyError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
}

/// Database row id, tagged with the entity it belongs to.
#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<Marker>(i64, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self(id, PhantomData)
    }

    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<i64> for Id<Marker> {
    fn from(value: i64) -> Self {
        Id::new(value)
    }
}

impl<Marker> From<Id<Marker>> for i64 {
    fn from(value: Id<Marker>) -> Self {
        value.get()
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Id, user::UserMarker};

    #[test]
    fn id_is_transparent_in_json() {
        let id = Id::<UserMarker>::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");

        let parsed: Id<UserMarker> = serde_json::from_str("7").unwrap();
        assert_eq!(parsed.get(), 7);
        assert_eq!(parsed.to_string(), "7");
    }

    #[test]
    fn ids_order_by_value() {
        let low = Id::<UserMarker>::new(3);
        let high = Id::<UserMarker>::new(11);
        assert!(low < high);
        assert_eq!(std::cmp::max(low, high), high);
    }
}
