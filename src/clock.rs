use chrono::{DateTime, Utc};

/// Source of "now" for feed timestamps and generated media names.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by [`Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a single instant, for tests that assert exact timestamps.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Formats an instant the way feed readers expect `pubDate` values:
/// `Sat, 17 Oct 2026 12:00:00 GMT`.
pub fn http_date(instant: &DateTime<Utc>) -> String {
    instant.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parses an upstream publication date. RFC 2822 first, then RFC 3339.
///
/// Returns `None` for anything else so the caller can substitute its own
/// timestamp.
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(trimmed)
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
