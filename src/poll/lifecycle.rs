//! Poll state: open, closed, expired.
//!
//! A poll is open until it is closed by its owner or its closing date is
//! reached. Expiry is recorded lazily: reads sweep expired polls into the closed
//! state instead of a scheduler doing it. Once expired, a poll cannot reopen.

use super::view::PollView;
use super::{NewPoll, Poll, PollFilter, StatusFilter, MAX_OPTION_LENGTH};
use crate::app_config::PollsConfig;
use crate::error::AppError;
use crate::permission::{load_owned_poll, require_admin, OwnershipPolicy};
use crate::response::Pagination;
use crate::store::{Page, Store};
use crate::user::User;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashSet;
use validator::{Validate, ValidationError};

/// The closing date has been reached.
pub fn is_expired(poll: &Poll, now: DateTime<Utc>) -> bool {
    now >= poll.closing_date
}

pub fn is_effectively_closed(poll: &Poll, now: DateTime<Utc>) -> bool {
    poll.is_closed || is_expired(poll, now)
}

pub fn close(poll: &mut Poll) -> Result<(), AppError> {
    if poll.is_closed {
        return Err(AppError::InvalidState("Poll is already closed".to_owned()));
    }
    poll.is_closed = true;
    Ok(())
}

pub fn reopen(poll: &mut Poll, now: DateTime<Utc>) -> Result<(), AppError> {
    if !poll.is_closed {
        return Err(AppError::InvalidState("Poll is not closed".to_owned()));
    }
    if is_expired(poll, now) {
        return Err(AppError::InvalidState(
            "Cannot reopen an expired poll".to_owned(),
        ));
    }
    poll.is_closed = false;
    Ok(())
}

/// Edits and deletion are only allowed while the poll is open.
pub fn can_modify(poll: &Poll, now: DateTime<Utc>, action: &str) -> Result<(), AppError> {
    if is_effectively_closed(poll, now) {
        return Err(AppError::PollClosed(format!("Cannot {} a closed poll", action)));
    }
    Ok(())
}

/// Closes every poll whose closing date has passed. Failures are logged and
/// swallowed so that they never fail the read that triggered the sweep.
pub async fn close_expired_polls(store: &dyn Store, now: DateTime<Utc>) -> u64 {
    match store.close_expired_polls(now).await {
        Ok(0) => 0,
        Ok(closed) => {
            log::info!("Automatically closed {} expired polls", closed);
            closed
        }
        Err(e) => {
            log::error!("Error closing expired polls: {}", e);
            0
        }
    }
}

/// Records the expiry of a single poll that has passed its closing date.
pub async fn close_if_expired(store: &dyn Store, mut poll: Poll, now: DateTime<Utc>) -> Poll {
    if poll.is_closed || !is_expired(&poll, now) {
        return poll;
    }

    poll.is_closed = true;
    match store.update_poll(&poll).await {
        Ok(updated) => {
            log::info!("Automatically closed expired poll: {}", updated.id);
            updated
        }
        Err(e) => {
            log::error!("Error closing expired poll {}: {}", poll.id, e);
            poll
        }
    }
}

fn validate_option_texts(options: &[String]) -> Result<(), ValidationError> {
    if options
        .iter()
        .all(|o| !o.is_empty() && o.chars().count() <= MAX_OPTION_LENGTH)
    {
        Ok(())
    } else {
        let mut err = ValidationError::new("option_length");
        err.message = Some(Cow::from(
            "Option text must be between 1 and 200 characters",
        ));
        Err(err)
    }
}

/// Options may not repeat, ignoring case.
fn ensure_unique_options(options: &[String]) -> Result<(), AppError> {
    let mut seen = HashSet::new();
    if options.iter().all(|o| seen.insert(o.to_lowercase())) {
        Ok(())
    } else {
        Err(AppError::invalid("options", "Poll options must be unique"))
    }
}

/// Every vote must keep pointing at one of the poll's options, so an edit may
/// not drop an option somebody already chose.
async fn ensure_voted_options_kept(
    store: &dyn Store,
    poll_id: i32,
    options: &[String],
) -> Result<(), AppError> {
    let counts = store.count_votes_by_option(poll_id).await?;
    if let Some(dropped) = counts
        .iter()
        .find(|c| c.count > 0 && !options.contains(&c.option))
    {
        return Err(AppError::invalid(
            "options",
            &format!("Cannot remove option \"{}\" because it has votes", dropped.option),
        ));
    }
    Ok(())
}

fn ensure_future(
    closing_date: DateTime<Utc>,
    rules: &PollsConfig,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if closing_date <= now + rules.closing_date_buffer() {
        return Err(AppError::invalid(
            "closing_date",
            "Closing date must be in the future",
        ));
    }
    Ok(())
}

fn trim_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_owned())
        .filter(|d| !d.is_empty())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePollRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[validate(length(max = 1000, message = "Description must be less than 1000 characters"))]
    pub description: Option<String>,
    #[validate(
        length(min = 2, max = 10, message = "Poll must have between 2 and 10 options"),
        custom = "validate_option_texts"
    )]
    pub options: Vec<String>,
    pub closing_date: DateTime<Utc>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub allow_multiple_votes: bool,
}

impl CreatePollRequest {
    pub fn normalize(mut self) -> Self {
        self.title = self.title.trim().to_owned();
        self.description = trim_description(self.description);
        self.options = self.options.iter().map(|o| o.trim().to_owned()).collect();
        self
    }
}

/// Absent fields are left untouched.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePollRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 1000, message = "Description must be less than 1000 characters"))]
    pub description: Option<String>,
    #[validate(
        length(min = 2, max = 10, message = "Poll must have between 2 and 10 options"),
        custom = "validate_option_texts"
    )]
    pub options: Option<Vec<String>>,
    pub closing_date: Option<DateTime<Utc>>,
    pub is_anonymous: Option<bool>,
    pub allow_multiple_votes: Option<bool>,
}

impl UpdatePollRequest {
    pub fn normalize(mut self) -> Self {
        self.title = self.title.map(|t| t.trim().to_owned());
        self.description = self.description.map(|d| d.trim().to_owned());
        self.options = self
            .options
            .map(|opts| opts.iter().map(|o| o.trim().to_owned()).collect());
        self
    }
}

pub async fn create_poll(
    store: &dyn Store,
    actor: &User,
    req: CreatePollRequest,
    rules: &PollsConfig,
    now: DateTime<Utc>,
) -> Result<Poll, AppError> {
    require_admin(actor)?;

    let req = req.normalize();
    req.validate()?;
    ensure_unique_options(&req.options)?;
    ensure_future(req.closing_date, rules, now)?;

    let poll = store
        .insert_poll(NewPoll {
            title: req.title,
            description: req.description,
            options: req.options,
            closing_date: req.closing_date,
            is_anonymous: req.is_anonymous,
            allow_multiple_votes: req.allow_multiple_votes,
            created_by: actor.id,
        })
        .await?;

    log::info!("Poll {} created by user {}", poll.id, actor.id);
    Ok(poll)
}

pub async fn update_poll(
    store: &dyn Store,
    actor: &User,
    poll_id: i32,
    req: UpdatePollRequest,
    rules: &PollsConfig,
    policy: OwnershipPolicy,
    now: DateTime<Utc>,
) -> Result<Poll, AppError> {
    let mut poll = load_owned_poll(store, actor, poll_id, policy).await?;
    can_modify(&poll, now, "update")?;

    let req = req.normalize();
    req.validate()?;

    if let Some(title) = req.title {
        poll.title = title;
    }
    if let Some(description) = req.description {
        poll.description = Some(description).filter(|d| !d.is_empty());
    }
    if let Some(options) = req.options {
        ensure_unique_options(&options)?;
        ensure_voted_options_kept(store, poll.id, &options).await?;
        poll.options = options;
    }
    if let Some(closing_date) = req.closing_date {
        ensure_future(closing_date, rules, now)?;
        poll.closing_date = closing_date;
    }
    if let Some(is_anonymous) = req.is_anonymous {
        poll.is_anonymous = is_anonymous;
    }
    if let Some(allow_multiple_votes) = req.allow_multiple_votes {
        poll.allow_multiple_votes = allow_multiple_votes;
    }

    Ok(store.update_poll(&poll).await?)
}

pub async fn delete_poll(
    store: &dyn Store,
    actor: &User,
    poll_id: i32,
    policy: OwnershipPolicy,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let poll = load_owned_poll(store, actor, poll_id, policy).await?;
    can_modify(&poll, now, "delete")?;

    store.delete_poll(poll.id).await?;
    log::info!("Poll {} deleted by user {}", poll.id, actor.id);
    Ok(())
}

pub async fn close_poll(
    store: &dyn Store,
    actor: &User,
    poll_id: i32,
    policy: OwnershipPolicy,
) -> Result<Poll, AppError> {
    let mut poll = load_owned_poll(store, actor, poll_id, policy).await?;
    close(&mut poll)?;
    Ok(store.update_poll(&poll).await?)
}

pub async fn reopen_poll(
    store: &dyn Store,
    actor: &User,
    poll_id: i32,
    policy: OwnershipPolicy,
    now: DateTime<Utc>,
) -> Result<Poll, AppError> {
    let mut poll = load_owned_poll(store, actor, poll_id, policy).await?;
    reopen(&mut poll, now)?;
    Ok(store.update_poll(&poll).await?)
}

#[derive(Debug, Default, Deserialize)]
pub struct ListPollsQuery {
    /// `open` or `closed`; anything else lists every poll.
    pub status: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn list_polls(
    store: &dyn Store,
    viewer: Option<&User>,
    query: &ListPollsQuery,
    rules: &PollsConfig,
    now: DateTime<Utc>,
) -> Result<(Vec<PollView>, Pagination), AppError> {
    close_expired_polls(store, now).await;

    let filter = PollFilter {
        status: query.status.as_deref().and_then(StatusFilter::parse),
        // Admins manage their own polls and only see those.
        created_by: viewer.filter(|u| u.is_admin()).map(|u| u.id),
        now,
    };
    let page = Page::new(
        query.page,
        query.limit,
        rules.default_page_size,
        rules.max_page_size,
    );

    let found = store.list_polls(&filter, page).await?;
    let mut views = Vec::with_capacity(found.items.len());
    for poll in found.items {
        views.push(PollView::build(store, poll, viewer, now).await?);
    }

    Ok((views, Pagination::new(page.page, page.limit, found.total)))
}

pub async fn get_poll(
    store: &dyn Store,
    viewer: Option<&User>,
    poll_id: i32,
    now: DateTime<Utc>,
) -> Result<PollView, AppError> {
    let poll = store
        .find_poll(poll_id)
        .await?
        .ok_or_else(|| AppError::not_found("Poll"))?;
    let poll = close_if_expired(store, poll, now).await;
    PollView::build(store, poll, viewer, now).await
}
