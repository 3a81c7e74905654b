/// Rate limiting for the auth and vote endpoints.
///
/// Implements sliding window rate limiting using in-memory storage (DashMap).
/// This is suitable for single-instance deployments. The limiter is handed to
/// handlers as app data, so every server (and every test) owns its own.
///
/// # Example Usage
///
/// ```rust,ignore
/// // In a login handler
/// limiter.check_auth_rate_limit(&ip)?;
/// ```
use crate::app_config::RateLimitConfig;
use crate::error::AppError;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Rate limiter using in-memory storage
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Map of (action_type:identifier) -> Request timestamps
    requests: DashMap<String, Vec<Instant>>,
}

/// Error returned when rate limit is exceeded
#[derive(Debug, Clone)]
pub struct RateLimitError {
    /// Number of seconds until the rate limit resets
    pub retry_after_seconds: u64,
}

impl From<RateLimitError> for AppError {
    fn from(e: RateLimitError) -> Self {
        AppError::TooManyRequests {
            retry_after_seconds: e.retry_after_seconds,
        }
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            requests: DashMap::new(),
        }
    }

    /// Check if a request should be rate limited
    ///
    /// # Arguments
    /// * `action` - The action being rate limited (e.g., "auth", "vote")
    /// * `identifier` - Unique identifier for the requester (e.g., IP address, user ID)
    /// * `max_requests` - Maximum number of requests allowed in the window
    /// * `window` - Time window for the rate limit
    pub fn check_rate_limit(
        &self,
        action: &str,
        identifier: &str,
        max_requests: usize,
        window: Duration,
    ) -> Result<(), RateLimitError> {
        let key = format!("{}:{}", action, identifier);
        let now = Instant::now();

        let mut entry = self.requests.entry(key).or_default();

        // Sliding window
        entry.retain(|&timestamp| now.duration_since(timestamp) < window);

        if entry.len() >= max_requests {
            // A limit of zero refuses everything for a full window.
            let retry_after = match entry.first() {
                Some(&oldest) => window.saturating_sub(now.duration_since(oldest)),
                None => window,
            };

            return Err(RateLimitError {
                retry_after_seconds: retry_after.as_secs() + 1, // Round up
            });
        }

        entry.push(now);

        Ok(())
    }

    /// Login and registration attempts, per client IP.
    pub fn check_auth_rate_limit(&self, ip: &str) -> Result<(), RateLimitError> {
        self.check_rate_limit(
            "auth",
            ip,
            self.config.auth_max_attempts as usize,
            self.config.auth_window(),
        )
        .map_err(|e| {
            log::warn!("Rate limit exceeded for auth: ip={}", ip);
            e
        })
    }

    /// Vote submissions, per user.
    pub fn check_vote_rate_limit(&self, user_id: i32) -> Result<(), RateLimitError> {
        self.check_rate_limit(
            "vote",
            &user_id.to_string(),
            self.config.vote_max as usize,
            self.config.vote_window(),
        )
        .map_err(|e| {
            log::warn!("Rate limit exceeded for votes: user_id={}", user_id);
            e
        })
    }

    /// Drops timestamps older than every window and forgets idle keys.
    ///
    /// Called periodically from the server's cleanup task.
    pub fn cleanup_old_entries(&self) {
        let horizon = self.config.longest_window();
        let now = Instant::now();
        self.requests.retain(|_, timestamps| {
            timestamps.retain(|&t| now.duration_since(t) < horizon);
            !timestamps.is_empty()
        });
    }

    /// Get the number of tracked keys (for monitoring/debugging)
    pub fn tracked_keys_count(&self) -> usize {
        self.requests.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
