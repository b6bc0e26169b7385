//! Top-level dismissible notifications

use std::time::{Duration, Instant};

use crate::config::NOTICE_TTL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    raised_at: Instant,
}

impl Notice {
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.raised_at) >= ttl
    }
}

/// At most one error and one success banner at a time; raising a new one
/// replaces the old one of the same level.
#[derive(Debug, Clone)]
pub struct Notices {
    error: Option<Notice>,
    success: Option<Notice>,
    ttl: Duration,
}

impl Default for Notices {
    fn default() -> Self {
        Self::new(NOTICE_TTL)
    }
}

impl Notices {
    pub fn new(ttl: Duration) -> Self {
        Self {
            error: None,
            success: None,
            ttl,
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.raise(NoticeLevel::Error, message.into(), Instant::now());
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.raise(NoticeLevel::Success, message.into(), Instant::now());
    }

    pub fn raise(&mut self, level: NoticeLevel, message: String, now: Instant) {
        let notice = Some(Notice {
            level,
            message,
            raised_at: now,
        });
        match level {
            NoticeLevel::Error => self.error = notice,
            NoticeLevel::Success => self.success = notice,
        }
    }

    pub fn dismiss(&mut self, level: NoticeLevel) {
        match level {
            NoticeLevel::Error => self.error = None,
            NoticeLevel::Success => self.success = None,
        }
    }

    pub fn clear(&mut self) {
        self.error = None;
        self.success = None;
    }

    /// Drop whatever has outlived its time. The getters already hide expired
    /// notices; this only frees them.
    pub fn expire(&mut self, now: Instant) {
        let ttl = self.ttl;
        if self.error.as_ref().is_some_and(|n| n.is_expired(now, ttl)) {
            self.error = None;
        }
        if self.success.as_ref().is_some_and(|n| n.is_expired(now, ttl)) {
            self.success = None;
        }
    }

    pub fn current_error(&self) -> Option<&Notice> {
        self.live(self.error.as_ref())
    }

    pub fn current_success(&self) -> Option<&Notice> {
        self.live(self.success.as_ref())
    }

    fn live<'a>(&self, notice: Option<&'a Notice>) -> Option<&'a Notice> {
        let now = Instant::now();
        notice.filter(|n| !n.is_expired(now, self.ttl))
    }

    pub fn is_empty(&self) -> bool {
        self.current_error().is_none() && self.current_success().is_none()
    }

    /// Current notices, error first.
    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.current_error()
            .into_iter()
            .chain(self.current_success())
    }
}
