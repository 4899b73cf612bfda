use crate::{
    model::{Id, file::File, user::UserMarker},
    validate::{FieldErrors, Validate, check_length},
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use time::OffsetDateTime;

pub const HEADING_MAX_LEN: usize = 100;
pub const TEXT_MAX_LEN: usize = 2500;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub heading: String,
    pub text: String,
    pub author: Id<UserMarker>,
    pub image_url: Option<String>,
    pub files: Vec<File>,
    pub likes: i64,
    pub dislikes: i64,
    pub rating: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub modified_at: Option<OffsetDateTime>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct CreatePost {
    pub heading: String,
    pub text: String,
}

impl Validate for CreatePost {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        check_length(&mut errors, "heading", &self.heading, 1, HEADING_MAX_LEN);
        check_length(&mut errors, "text", &self.text, 1, TEXT_MAX_LEN);
        errors.into_result()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Default, Deserialize)]
#[serde(default)]
pub struct UpdatePost {
    pub heading: Option<String>,
    pub text: Option<String>,
}

impl Validate for UpdatePost {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        match (&self.heading, &self.text) {
            (None, None) => errors.add("body", "At least one field must be provided."),
            (heading, text) => {
                if let Some(heading) = heading {
                    check_length(&mut errors, "heading", heading, 1, HEADING_MAX_LEN);
                }
                if let Some(text) = text {
                    check_length(&mut errors, "text", text, 1, TEXT_MAX_LEN);
                }
            }
        }
        errors.into_result()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Like,
    Dislike,
}

impl Vote {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Like => Self::Dislike,
            Self::Dislike => Self::Like,
        }
    }

    /// Past tense used in error messages and notifications.
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Self::Like => "liked",
            Self::Dislike => "disliked",
        }
    }

    /// Reads the actor's current vote from their membership in both vote sets.
    pub fn from_membership(liked: bool, disliked: bool) -> Result<Option<Self>, VoteError> {
        match (liked, disliked) {
            (false, false) => Ok(None),
            (true, false) => Ok(Some(Self::Like)),
            (false, true) => Ok(Some(Self::Dislike)),
            (true, true) => Err(VoteError::Inconsistent),
        }
    }
}

impl Display for Vote {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.verb())
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum VoteError {
    #[error("A post cannot be liked and disliked at the same time")]
    Conflicting,
    #[error("Either like or dislike must be set")]
    Empty,
    #[error("Post is already {0}")]
    Duplicate(Vote),
    #[error("User was found among both the likes and the dislikes of the post")]
    Inconsistent,
}

/// Body of `PUT /post/{id}/rate`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
#[serde(default)]
pub struct RateRequest {
    pub like: bool,
    pub dislike: bool,
}

impl RateRequest {
    pub fn vote(self) -> Result<Vote, VoteError> {
        match (self.like, self.dislike) {
            (true, true) => Err(VoteError::Conflicting),
            (false, false) => Err(VoteError::Empty),
            (true, false) => Ok(Vote::Like),
            (false, true) => Ok(Vote::Dislike),
        }
    }
}

/// What has to happen to the vote sets for a requested vote.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum VoteChange {
    Cast(Vote),
    Switch { from: Vote, to: Vote },
}

impl VoteChange {
    pub fn plan(current: Option<Vote>, requested: Vote) -> Result<Self, VoteError> {
        match current {
            None => Ok(Self::Cast(requested)),
            Some(current) if current == requested => Err(VoteError::Duplicate(requested)),
            Some(current) => Ok(Self::Switch {
                from: current,
                to: requested,
            }),
        }
    }

    #[must_use]
    pub fn vote(self) -> Vote {
        match self {
            Self::Cast(vote) | Self::Switch { to: vote, .. } => vote,
        }
    }

    #[must_use]
    pub fn removed(self) -> Option<Vote> {
        match self {
            Self::Cast(_) => None,
            Self::Switch { from, .. } => Some(from),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Debug, Serialize)]
pub struct PostRating {
    pub likes: i64,
    pub dislikes: i64,
    pub rating: f64,
}

impl PostRating {
    /// Percentage of likes among all votes, rounded half away from zero to two decimals.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(likes: i64, dislikes: i64) -> Self {
        let likes = likes.max(0);
        let dislikes = dislikes.max(0);
        let total = likes + dislikes;

        let rating = if total == 0 {
            0.0
        } else {
            let percentage = likes as f64 * 100.0 / total as f64;
            (percentage * 100.0).round() / 100.0
        };

        Self {
            likes,
            dislikes,
            rating,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::post::{
        CreatePost, PostRating, RateRequest, UpdatePost, Vote, VoteChange, VoteError,
    };
    use crate::validate::Validate;

    #[test]
    fn rate_request_needs_exactly_one_vote() {
        let both = RateRequest {
            like: true,
            dislike: true,
        };
        assert_eq!(both.vote(), Err(VoteError::Conflicting));
        assert_eq!(RateRequest::default().vote(), Err(VoteError::Empty));

        let dislike: RateRequest = serde_json::from_str(r#"{"dislike": true}"#).unwrap();
        assert_eq!(dislike.vote(), Ok(Vote::Dislike));
    }

    #[test]
    fn duplicate_votes_are_rejected() {
        for vote in [Vote::Like, Vote::Dislike] {
            let err = VoteChange::plan(Some(vote), vote).unwrap_err();
            assert_eq!(err, VoteError::Duplicate(vote));
        }
        assert_eq!(
            VoteError::Duplicate(Vote::Like).to_string(),
            "Post is already liked"
        );
    }

    #[test]
    fn opposite_vote_switches() {
        let change = VoteChange::plan(Some(Vote::Like), Vote::Dislike).unwrap();
        assert_eq!(change.removed(), Some(Vote::Like));
        assert_eq!(change.vote(), Vote::Dislike);
        assert_eq!(Vote::Like.opposite(), Vote::Dislike);

        let first = VoteChange::plan(None, Vote::Like).unwrap();
        assert_eq!(first, VoteChange::Cast(Vote::Like));
        assert_eq!(first.removed(), None);
    }

    #[test]
    fn membership_in_both_sets_is_inconsistent() {
        assert_eq!(Vote::from_membership(false, false), Ok(None));
        assert_eq!(Vote::from_membership(true, false), Ok(Some(Vote::Like)));
        assert_eq!(Vote::from_membership(true, true), Err(VoteError::Inconsistent));
    }

    #[test]
    fn rating_follows_vote_history() {
        // U1 likes, U2 dislikes, then U1 switches to a dislike.
        let mut likes = 0;
        let mut dislikes = 0;
        let mut current = [None, None];
        let mut expected = [(1, 0, 100.0), (1, 1, 50.0), (0, 2, 0.0)].into_iter();

        for (actor, vote) in [(0, Vote::Like), (1, Vote::Dislike), (0, Vote::Dislike)] {
            let change = VoteChange::plan(current[actor], vote).unwrap();
            match change.removed() {
                Some(Vote::Like) => likes -= 1,
                Some(Vote::Dislike) => dislikes -= 1,
                None => {}
            }
            match change.vote() {
                Vote::Like => likes += 1,
                Vote::Dislike => dislikes += 1,
            }
            current[actor] = Some(vote);

            let rating = PostRating::from_counts(likes, dislikes);
            let (l, d, r) = expected.next().unwrap();
            assert_eq!((rating.likes, rating.dislikes), (l, d));
            assert!((rating.rating - r).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn rating_rounds_to_two_decimals() {
        assert!((PostRating::from_counts(0, 0).rating - 0.0).abs() < f64::EPSILON);
        assert!((PostRating::from_counts(1, 2).rating - 33.33).abs() < 1e-9);
        assert!((PostRating::from_counts(2, 1).rating - 66.67).abs() < 1e-9);
        assert!((PostRating::from_counts(1, 7).rating - 12.5).abs() < 1e-9);
    }

    #[test]
    fn post_bodies() {
        let post = CreatePost {
            heading: "Exam schedule".into(),
            text: "Finals start on June 3rd.".into(),
        };
        assert!(post.validate().is_ok());

        let post = CreatePost {
            heading: "h".repeat(101),
            text: String::new(),
        };
        let errors = post.validate().unwrap_err();
        assert!(errors.get("heading").is_some() && errors.get("text").is_some());

        assert!(UpdatePost::default().validate().is_err());
    }
}
