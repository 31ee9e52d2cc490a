//! Shared utility functions used across multiple modules.

use std::sync::atomic::{AtomicI64, Ordering};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Millisecond clock whose readings strictly increase, even when the wall
/// clock stalls or two mutations land within the same millisecond.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Next timestamp, greater than every previous reading and than `floor`.
    pub fn tick_after(&self, floor: i64) -> i64 {
        let mut previous = self.last.load(Ordering::Acquire);
        loop {
            let next = now_millis()
                .max(previous.saturating_add(1))
                .max(floor.saturating_add(1));
            match self
                .last
                .compare_exchange_weak(previous, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => previous = actual,
            }
        }
    }

    pub fn tick(&self) -> i64 {
        self.tick_after(i64::MIN + 1)
    }
}
