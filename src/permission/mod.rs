//! Who may do what to which poll.
//!
//! Checks run in a fixed order: identity (resolved by the client context),
//! then role, then ownership. Ownership mismatches answer the same way on every
//! route, as configured by [`OwnershipPolicy`].

use crate::error::AppError;
use crate::poll::lifecycle::is_effectively_closed;
use crate::poll::Poll;
use crate::store::Store;
use crate::user::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a request against somebody else's poll is answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipPolicy {
    /// 404, so the poll's existence does not leak.
    NotFound,
    /// 403.
    Forbidden,
}

impl OwnershipPolicy {
    fn reject(&self) -> AppError {
        match self {
            OwnershipPolicy::NotFound => AppError::not_found("Poll"),
            OwnershipPolicy::Forbidden => {
                AppError::forbidden("Access denied. You can only modify polls you created.")
            }
        }
    }
}

pub fn require_admin(user: &User) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden("Access denied. Admin privileges required."))
    }
}

/// The poll's creator, still holding the admin role.
pub fn is_owner_admin(user: &User, poll: &Poll) -> bool {
    user.is_admin() && poll.created_by == user.id
}

pub fn require_owner_admin(user: &User, poll: &Poll, policy: OwnershipPolicy) -> Result<(), AppError> {
    require_admin(user)?;
    if poll.created_by != user.id {
        log::debug!(
            "user {} attempted to manage poll {} owned by {}",
            user.id,
            poll.id,
            poll.created_by
        );
        return Err(policy.reject());
    }
    Ok(())
}

/// Loads a poll the acting admin owns.
pub async fn load_owned_poll(
    store: &dyn Store,
    user: &User,
    poll_id: i32,
    policy: OwnershipPolicy,
) -> Result<Poll, AppError> {
    require_admin(user)?;
    let poll = store
        .find_poll(poll_id)
        .await?
        .ok_or_else(|| AppError::not_found("Poll"))?;
    require_owner_admin(user, &poll, policy)?;
    Ok(poll)
}

/// What a permitted results request gets to see.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultsAccess {
    /// The owner-admin: any time, with the per-voter breakdown.
    Owner,
    /// A voter on a closed poll: the tally only.
    Participant,
}

pub async fn can_view_results(
    store: &dyn Store,
    user: &User,
    poll: &Poll,
    now: DateTime<Utc>,
) -> Result<ResultsAccess, AppError> {
    if is_owner_admin(user, poll) {
        return Ok(ResultsAccess::Owner);
    }
    if store.find_user_vote(poll.id, user.id).await?.is_none() {
        return Err(AppError::forbidden("You must vote before viewing results"));
    }
    if !is_effectively_closed(poll, now) {
        return Err(AppError::forbidden("Results are only available after poll closes"));
    }
    Ok(ResultsAccess::Participant)
}

/// Admins see every user record; others only their own. Anything else is
/// reported as missing.
pub fn require_self_or_admin(user: &User, target_id: i32) -> Result<(), AppError> {
    if user.is_admin() || user.id == target_id {
        Ok(())
    } else {
        Err(AppError::not_found("User"))
    }
}
