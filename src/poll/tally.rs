//! Vote counts, percentages and winners.
//!
//! Counts always come from the vote rows. Votes for an option that was later
//! edited away are left out of the total so that percentages still add up.

use super::lifecycle::is_effectively_closed;
use super::{OptionCount, Poll};
use crate::error::AppError;
use crate::permission::{can_view_results, load_owned_poll, OwnershipPolicy, ResultsAccess};
use crate::store::Store;
use crate::user::{PublicProfile, User};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptionResult {
    pub option: String,
    pub votes: u64,
    pub percentage: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub total_votes: u64,
    /// In poll option order, zero-vote options included.
    pub option_results: Vec<OptionResult>,
    /// Every option holding the highest count. Empty while nobody has voted.
    pub winners: Vec<String>,
}

/// `round(100 * count / total)`, half away from zero. Zero when nobody voted.
pub fn percentage(count: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (count * 200 + total) / (total * 2)
}

pub fn tally(options: &[String], counts: &[OptionCount]) -> Tally {
    let votes_for = |option: &str| {
        counts
            .iter()
            .filter(|c| c.option == option)
            .map(|c| c.count)
            .sum::<u64>()
    };

    let per_option: Vec<(String, u64)> = options
        .iter()
        .map(|o| (o.clone(), votes_for(o)))
        .collect();
    let total_votes: u64 = per_option.iter().map(|(_, n)| n).sum();
    let max = per_option.iter().map(|(_, n)| *n).max().unwrap_or(0);

    let winners = if max > 0 {
        per_option
            .iter()
            .filter(|(_, n)| *n == max)
            .map(|(o, _)| o.clone())
            .collect()
    } else {
        Vec::new()
    };

    let option_results = per_option
        .into_iter()
        .map(|(option, votes)| OptionResult {
            percentage: percentage(votes, total_votes),
            option,
            votes,
        })
        .collect();

    Tally {
        total_votes,
        option_results,
        winners,
    }
}

/// Poll fields echoed alongside results.
#[derive(Clone, Debug, Serialize)]
pub struct ResultsPoll {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub options: Vec<String>,
    pub closing_date: DateTime<Utc>,
    pub is_closed: bool,
    pub is_anonymous: bool,
}

impl ResultsPoll {
    fn new(poll: &Poll, now: DateTime<Utc>) -> Self {
        Self {
            id: poll.id,
            title: poll.title.clone(),
            description: poll.description.clone(),
            options: poll.options.clone(),
            closing_date: poll.closing_date,
            is_closed: is_effectively_closed(poll, now),
            is_anonymous: poll.is_anonymous,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct IndividualVote {
    pub voter: Option<PublicProfile>,
    pub selected_option: String,
    pub voted_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PollResults {
    pub poll: ResultsPoll,
    #[serde(flatten)]
    pub tally: Tally,
    /// Owner view of a non-anonymous poll only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub individual_votes: Option<Vec<IndividualVote>>,
}

async fn find_poll(store: &dyn Store, poll_id: i32) -> Result<Poll, AppError> {
    store
        .find_poll(poll_id)
        .await?
        .ok_or_else(|| AppError::not_found("Poll"))
}

async fn owner_results(
    store: &dyn Store,
    poll: &Poll,
    now: DateTime<Utc>,
) -> Result<PollResults, AppError> {
    let counts = store.count_votes_by_option(poll.id).await?;

    let individual_votes = if poll.is_anonymous {
        None
    } else {
        let votes = store.list_poll_votes(poll.id).await?;
        Some(
            votes
                .into_iter()
                .map(|(vote, voter)| IndividualVote {
                    voter: voter.map(|u| u.public_profile()),
                    selected_option: vote.selected_option,
                    voted_at: vote.created_at,
                })
                .collect(),
        )
    };

    Ok(PollResults {
        poll: ResultsPoll::new(poll, now),
        tally: tally(&poll.options, &counts),
        individual_votes,
    })
}

/// Results as seen by `user`: the owner-admin always, voters once the poll closed.
pub async fn poll_results(
    store: &dyn Store,
    user: &User,
    poll_id: i32,
    now: DateTime<Utc>,
) -> Result<PollResults, AppError> {
    let poll = find_poll(store, poll_id).await?;

    match can_view_results(store, user, &poll, now).await? {
        ResultsAccess::Owner => owner_results(store, &poll, now).await,
        ResultsAccess::Participant => {
            let counts = store.count_votes_by_option(poll.id).await?;
            Ok(PollResults {
                poll: ResultsPoll::new(&poll, now),
                tally: tally(&poll.options, &counts),
                individual_votes: None,
            })
        }
    }
}

/// Full results for the owner-admin, at any time.
pub async fn admin_results(
    store: &dyn Store,
    user: &User,
    poll_id: i32,
    policy: OwnershipPolicy,
    now: DateTime<Utc>,
) -> Result<PollResults, AppError> {
    let poll = load_owned_poll(store, user, poll_id, policy).await?;
    owner_results(store, &poll, now).await
}
