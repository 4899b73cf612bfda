use crate::model::{
    Id,
    comment::CommentMarker,
    post::{PostMarker, Vote},
    user::UserMarker,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const NOTIFICATION_TEXT_MAX_LEN: usize = 100;
pub const EMAIL_SUBJECT: &str = "New notification from StudentHub";

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct NotificationMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Notification {
    pub id: Id<NotificationMarker>,
    pub text: String,
    pub receiver: Id<UserMarker>,
    pub is_seen: bool,
    pub link: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A notification that has not been stored yet.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewNotification {
    pub receiver: Id<UserMarker>,
    pub text: String,
    pub link: Option<String>,
}

impl NewNotification {
    #[must_use]
    pub fn new(receiver: Id<UserMarker>, text: &str, link: Option<String>) -> Self {
        Self {
            receiver,
            text: truncate(text),
            link,
        }
    }

    #[must_use]
    pub fn post_rated(author: Id<UserMarker>, actor_name: &str, post: Id<PostMarker>, vote: Vote) -> Self {
        Self::new(
            author,
            &format!("{actor_name} {vote} your post."),
            Some(post_link(post)),
        )
    }

    #[must_use]
    pub fn new_follower(target: Id<UserMarker>, follower_name: &str, follower: Id<UserMarker>) -> Self {
        Self::new(
            target,
            &format!("{follower_name} started following you."),
            Some(user_link(follower)),
        )
    }

    #[must_use]
    pub fn new_comment(
        author: Id<UserMarker>,
        commenter_name: &str,
        post: Id<PostMarker>,
        comment: Id<CommentMarker>,
    ) -> Self {
        Self::new(
            author,
            &format!("{commenter_name} commented on your post."),
            Some(format!("{}#comment-{comment}", post_link(post))),
        )
    }
}

#[must_use]
pub fn post_link(post: Id<PostMarker>) -> String {
    format!("/post/{post}")
}

#[must_use]
pub fn user_link(user: Id<UserMarker>) -> String {
    format!("/user/{user}")
}

fn truncate(text: &str) -> String {
    text.chars().take(NOTIFICATION_TEXT_MAX_LEN).collect()
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct UpdateNotification {
    pub is_seen: bool,
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        notification::{NOTIFICATION_TEXT_MAX_LEN, NewNotification},
        post::Vote,
    };

    #[test]
    fn rating_notification() {
        let notification = NewNotification::post_rated(Id::new(1), "Olena Kovalenko", Id::new(8), Vote::Dislike);
        assert_eq!(notification.receiver, Id::new(1));
        assert_eq!(notification.text, "Olena Kovalenko disliked your post.");
        assert_eq!(notification.link.as_deref(), Some("/post/8"));
    }

    #[test]
    fn comment_notification_links_to_the_comment() {
        let notification = NewNotification::new_comment(Id::new(1), "Ivan", Id::new(8), Id::new(30));
        assert_eq!(notification.link.as_deref(), Some("/post/8#comment-30"));
    }

    #[test]
    fn long_names_are_truncated() {
        let name = "Ж".repeat(200);
        let notification = NewNotification::new_follower(Id::new(2), &name, Id::new(3));
        assert_eq!(notification.text.chars().count(), NOTIFICATION_TEXT_MAX_LEN);
        assert_eq!(notification.link.as_deref(), Some("/user/3"));
    }
}
