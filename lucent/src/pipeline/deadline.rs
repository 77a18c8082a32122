//! Cooperative wall-clock deadline for one batch.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::session::SessionId;

/// Checked between stages, images and stitching steps. Work already in flight is
/// never interrupted; expiry is observed at the next check.
#[derive(Debug, Clone)]
pub struct Deadline {
    session: SessionId,
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn new(session: SessionId, limit: Option<Duration>) -> Self {
        Self {
            session,
            start: Instant::now(),
            limit,
        }
    }

    /// A deadline that never expires.
    pub fn unbounded(session: SessionId) -> Self {
        Self::new(session, None)
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.limit.is_some_and(|limit| self.elapsed() >= limit)
    }

    /// Fails with [`Error::Timeout`] once the limit has passed. The persisted count is
    /// left at zero for the batch processor to fill in.
    pub fn check(&self) -> Result<()> {
        match self.limit {
            Some(limit) if self.elapsed() >= limit => Err(Error::Timeout {
                session: self.session.clone(),
                elapsed: self.elapsed(),
                limit,
                persisted: 0,
            }),
            _ => Ok(()),
        }
    }
}
