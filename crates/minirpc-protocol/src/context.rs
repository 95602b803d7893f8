//! Per-call options travelling next to the call arguments.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::message::Meta;

/// Meta key carrying the call deadline as Unix milliseconds.
pub const META_DEADLINE: &str = "deadline";

/// Meta key marking a oneway call; its value is `"true"`.
pub const META_ONEWAY: &str = "one-way";

/// Options scoped to one call: an optional deadline and the oneway flag.
///
/// On the client the context decides how long to wait and whether to wait at
/// all. On the server it is rebuilt from the request meta and handed to the
/// handler, which can check [`remaining`](Self::remaining) and pass the same
/// context on to its own outbound calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    deadline: Option<DateTime<Utc>>,
    oneway: bool,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Builder: deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let deadline = Utc::now()
            .checked_add_signed(timeout)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.with_deadline(deadline)
    }

    /// Builder: do not wait for a response.
    #[must_use]
    pub fn oneway(mut self) -> Self {
        self.oneway = true;
        self
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn is_oneway(&self) -> bool {
        self.oneway
    }

    /// Time left before the deadline; `Some(ZERO)` once it has passed and
    /// `None` without a deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining() == Some(Duration::ZERO)
    }

    /// Meta entries describing this context.
    pub fn to_meta(&self) -> Meta {
        let mut meta = Meta::new();
        if let Some(deadline) = self.deadline {
            meta.insert(
                META_DEADLINE.to_string(),
                deadline.timestamp_millis().to_string(),
            );
        }
        if self.oneway {
            meta.insert(META_ONEWAY.to_string(), "true".to_string());
        }
        meta
    }

    /// Rebuilds a context from request meta.
    ///
    /// A deadline that does not parse as an integer millisecond timestamp is
    /// ignored rather than rejected.
    pub fn from_meta(meta: &Meta) -> Self {
        let deadline = meta.get(META_DEADLINE).and_then(|raw| {
            let parsed = raw
                .parse::<i64>()
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis);
            if parsed.is_none() {
                debug!(deadline = %raw, "Ignoring unparsable deadline");
            }
            parsed
        });
        let oneway = meta.get(META_ONEWAY).is_some_and(|v| v == "true");
        Self { deadline, oneway }
    }
}
