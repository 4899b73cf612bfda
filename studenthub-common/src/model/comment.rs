use crate::{
    model::{Id, post::PostMarker, user::UserMarker},
    validate::{FieldErrors, Validate, check_length},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

pub const COMMENT_MAX_LEN: usize = 250;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub text: String,
    pub author: Id<UserMarker>,
    pub post: Id<PostMarker>,
    pub parent: Option<Id<CommentMarker>>,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub modified_at: Option<OffsetDateTime>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct CreateComment {
    pub text: String,
    pub post: Id<PostMarker>,
    #[serde(default)]
    pub parent: Option<Id<CommentMarker>>,
}

impl Validate for CreateComment {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        check_length(&mut errors, "text", &self.text, 1, COMMENT_MAX_LEN);
        errors.into_result()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct UpdateComment {
    pub text: String,
}

impl Validate for UpdateComment {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        check_length(&mut errors, "text", &self.text, 1, COMMENT_MAX_LEN);
        errors.into_result()
    }
}

/// `?post_id=` filter of the comment listing.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct CommentFilter {
    pub post_id: Id<PostMarker>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum CommentError {
    #[error("Parent comment {parent} belongs to post {parent_post}, not to post {post}")]
    ParentOnOtherPost {
        parent: Id<CommentMarker>,
        parent_post: Id<PostMarker>,
        post: Id<PostMarker>,
    },
}

/// A reply has to live on the same post as the comment it answers.
pub fn check_parent(
    post: Id<PostMarker>,
    parent: Id<CommentMarker>,
    parent_post: Id<PostMarker>,
) -> Result<(), CommentError> {
    if post == parent_post {
        Ok(())
    } else {
        Err(CommentError::ParentOnOtherPost {
            parent,
            parent_post,
            post,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        model::{
            Id,
            comment::{CommentError, CreateComment, UpdateComment, check_parent},
        },
        validate::Validate,
    };

    #[test]
    fn replies_stay_on_their_post() {
        assert!(check_parent(Id::new(4), Id::new(9), Id::new(4)).is_ok());

        let err = check_parent(Id::new(4), Id::new(9), Id::new(5)).unwrap_err();
        assert!(matches!(err, CommentError::ParentOnOtherPost { .. }));
        assert_eq!(
            err.to_string(),
            "Parent comment 9 belongs to post 5, not to post 4"
        );
    }

    #[test]
    fn comment_length() {
        let comment: CreateComment = serde_json::from_str(r#"{"text": "Nice!", "post": 1}"#).unwrap();
        assert!(comment.parent.is_none());
        assert!(comment.validate().is_ok());

        let update = UpdateComment {
            text: "a".repeat(251),
        };
        assert!(update.validate().is_err());
    }
}
