//! Operation timing envelope (§6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock bounds of one engine operation, in UTC.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Timestamp {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Timestamp {
    pub fn start() -> PendingTimestamp {
        PendingTimestamp { start: Utc::now() }
    }
}

/// An in-flight operation's start marker; call [`PendingTimestamp::finish`]
/// once the operation completes to get a full [`Timestamp`].
pub struct PendingTimestamp {
    start: DateTime<Utc>,
}

impl PendingTimestamp {
    pub fn finish(self) -> Timestamp {
        Timestamp {
            start: self.start,
            end: Utc::now(),
        }
    }
}
