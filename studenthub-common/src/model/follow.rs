use crate::model::{Id, user::UserMarker};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowAction {
    Follow,
    Unfollow,
}

/// Body of `PUT /user/{id}/follow`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct FollowRequest {
    pub action: FollowAction,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum FollowError {
    #[error("You cannot follow yourself")]
    SelfFollow,
    #[error("You are already following this user")]
    AlreadyFollowing,
    #[error("You are not following this user")]
    NotFollowing,
    #[error("Following and follower lists of user {follower} and user {target} disagree")]
    Inconsistent {
        follower: Id<UserMarker>,
        target: Id<UserMarker>,
    },
}

/// The two ways a follow edge can be observed.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct EdgeViews {
    /// The target is among the follower's following.
    pub in_following: bool,
    /// The follower is among the target's followers.
    pub in_followers: bool,
}

pub fn ensure_distinct(
    follower: Id<UserMarker>,
    target: Id<UserMarker>,
) -> Result<(), FollowError> {
    if follower == target {
        Err(FollowError::SelfFollow)
    } else {
        Ok(())
    }
}

/// Decides whether `action` may be applied given both views of the edge.
pub fn check(
    action: FollowAction,
    follower: Id<UserMarker>,
    target: Id<UserMarker>,
    views: EdgeViews,
) -> Result<(), FollowError> {
    ensure_distinct(follower, target)?;

    if views.in_following != views.in_followers {
        return Err(FollowError::Inconsistent { follower, target });
    }

    match (action, views.in_following) {
        (FollowAction::Follow, true) => Err(FollowError::AlreadyFollowing),
        (FollowAction::Unfollow, false) => Err(FollowError::NotFollowing),
        (FollowAction::Follow, false) | (FollowAction::Unfollow, true) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        follow::{EdgeViews, FollowAction, FollowError, FollowRequest, check, ensure_distinct},
    };

    const ABSENT: EdgeViews = EdgeViews {
        in_following: false,
        in_followers: false,
    };
    const PRESENT: EdgeViews = EdgeViews {
        in_following: true,
        in_followers: true,
    };

    #[test]
    fn follow_unfollow_scenario() {
        let (a, b) = (Id::new(1), Id::new(2));

        assert_eq!(check(FollowAction::Follow, a, b, ABSENT), Ok(()));
        assert_eq!(
            check(FollowAction::Follow, a, b, PRESENT),
            Err(FollowError::AlreadyFollowing)
        );
        assert_eq!(check(FollowAction::Unfollow, a, b, PRESENT), Ok(()));
        assert_eq!(
            check(FollowAction::Unfollow, a, b, ABSENT),
            Err(FollowError::NotFollowing)
        );
    }

    #[test]
    fn self_follow_is_rejected_for_both_actions() {
        let a = Id::new(7);
        assert_eq!(ensure_distinct(a, a), Err(FollowError::SelfFollow));
        for action in [FollowAction::Follow, FollowAction::Unfollow] {
            assert_eq!(check(action, a, a, ABSENT), Err(FollowError::SelfFollow));
        }
    }

    #[test]
    fn disagreeing_views_are_inconsistent() {
        let views = EdgeViews {
            in_following: true,
            in_followers: false,
        };
        let err = check(FollowAction::Unfollow, Id::new(1), Id::new(2), views).unwrap_err();
        assert!(matches!(err, FollowError::Inconsistent { .. }));
    }

    #[test]
    fn action_is_lowercase() {
        let request: FollowRequest = serde_json::from_str(r#"{"action": "unfollow"}"#).unwrap();
        assert_eq!(request.action, FollowAction::Unfollow);
        assert!(serde_json::from_str::<FollowRequest>(r#"{"action": "block"}"#).is_err());
    }
}
