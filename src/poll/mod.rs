//! Polls, votes and the rules around them.

pub mod lifecycle;
pub mod tally;
pub mod view;
pub mod voting;

use chrono::{DateTime, Utc};

/// Fewest options a poll may offer.
pub const MIN_OPTIONS: usize = 2;
/// Most options a poll may offer.
pub const MAX_OPTIONS: usize = 10;
/// Longest option text, in characters.
pub const MAX_OPTION_LENGTH: usize = 200;

#[derive(Clone, Debug, PartialEq)]
pub struct Poll {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    /// Ordered; unique ignoring case.
    pub options: Vec<String>,
    pub closing_date: DateTime<Utc>,
    pub is_closed: bool,
    pub is_anonymous: bool,
    /// Stored and reported only. Vote enforcement is always one per user.
    pub allow_multiple_votes: bool,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Poll {
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

#[derive(Clone, Debug)]
pub struct NewPoll {
    pub title: String,
    pub description: Option<String>,
    pub options: Vec<String>,
    pub closing_date: DateTime<Utc>,
    pub is_anonymous: bool,
    pub allow_multiple_votes: bool,
    pub created_by: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Vote {
    pub id: i32,
    pub poll_id: i32,
    pub user_id: i32,
    pub selected_option: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewVote {
    pub poll_id: i32,
    pub user_id: i32,
    pub selected_option: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Client metadata recorded alongside a vote.
#[derive(Clone, Debug, Default)]
pub struct VoteMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Number of votes one option received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptionCount {
    pub option: String,
    pub count: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusFilter {
    Open,
    Closed,
}

impl StatusFilter {
    /// Unknown values mean "no filter".
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(StatusFilter::Open),
            "closed" => Some(StatusFilter::Closed),
            _ => None,
        }
    }
}

/// Listing criteria. Status is judged against `now` with the same rule as
/// [`lifecycle::is_effectively_closed`].
#[derive(Clone, Debug)]
pub struct PollFilter {
    pub status: Option<StatusFilter>,
    pub created_by: Option<i32>,
    pub now: DateTime<Utc>,
}

impl PollFilter {
    pub fn matches(&self, poll: &Poll) -> bool {
        if let Some(owner) = self.created_by {
            if poll.created_by != owner {
                return false;
            }
        }
        match self.status {
            Some(StatusFilter::Open) => !lifecycle::is_effectively_closed(poll, self.now),
            Some(StatusFilter::Closed) => lifecycle::is_effectively_closed(poll, self.now),
            None => true,
        }
    }
}
