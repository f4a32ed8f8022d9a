//! Durable message queue and its delivery loop
//!
//! Accepted messages are written to a [`SpoolStore`] and later drained by a
//! [`DeliveryAgent`], which forwards each one to the downstream relay and
//! removes it only once the downstream relay has accepted it.

pub mod delivery;
pub mod error;
pub mod format;
pub mod fs;
pub mod memory;

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::smtp::Message;

pub use delivery::{Connector, DeliveryAgent, PassReport, RetryPolicy, TcpConnector};
pub use error::SpoolError;
pub use fs::FsSpool;
pub use memory::MemorySpool;

/// Identity of a spooled item: local time to the second, plus a
/// disambiguator when several items are queued within the same second.
///
/// Identities order by timestamp, then by disambiguator numerically, so
/// `…-2` comes before `…-10`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemId(String);

impl ItemId {
    /// The identity for the `n`th item queued during the second `at`
    pub fn at(at: &DateTime<Local>, n: u32) -> Self {
        let stamp = at.format("%Y%m%dT%H%M%S");
        if n == 0 {
            ItemId(stamp.to_string())
        } else {
            ItemId(format!("{stamp}-{n}"))
        }
    }

    fn sort_key(&self) -> (&str, u32) {
        self.0
            .rsplit_once('-')
            .and_then(|(stamp, n)| Some((stamp, n.parse().ok()?)))
            .unwrap_or((self.0.as_str(), 0))
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId(s.to_owned())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery history of a spooled item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// Failed delivery attempts so far
    pub attempts: u32,
    /// When the last failed attempt ended
    pub last_attempt: Option<DateTime<Utc>>,
}

/// A pending item as reported by [`SpoolStore::list_pending`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpooledItem {
    pub id: ItemId,
    pub retry: RetryState,
}

/// Storage for messages awaiting delivery.
///
/// Implementations must never let `list_pending` observe an item whose
/// `enqueue` has not finished.
pub trait SpoolStore: Send + Sync {
    /// Durably store a message and return its identity
    fn enqueue(&self, message: &Message) -> Result<ItemId, SpoolError>;

    /// All items awaiting delivery, oldest identity first
    fn list_pending(&self) -> Result<Vec<SpooledItem>, SpoolError>;

    /// Read a stored item back into a message
    fn load(&self, id: &ItemId) -> Result<Message, SpoolError>;

    /// Forget a delivered item
    fn remove_by_id(&self, id: &ItemId) -> Result<(), SpoolError>;

    /// Note a failed delivery attempt and return the updated history
    fn record_failure(&self, id: &ItemId, at: DateTime<Utc>) -> Result<RetryState, SpoolError>;

    /// Take an item out of delivery for good
    fn quarantine(&self, id: &ItemId) -> Result<(), SpoolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_item_id_format() {
        let at = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(ItemId::at(&at, 0).to_string(), "20240102T030405");
        assert_eq!(ItemId::at(&at, 3).to_string(), "20240102T030405-3");
    }

    #[test]
    fn test_item_ids_sort_by_time() {
        let early = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let late = Local.with_ymd_and_hms(2024, 11, 2, 3, 4, 5).unwrap();
        assert!(ItemId::at(&early, 0) < ItemId::at(&early, 1));
        assert!(ItemId::at(&early, 9) < ItemId::at(&late, 0));
    }

    #[test]
    fn test_disambiguator_orders_numerically() {
        let at = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut ids: Vec<_> = [10, 2, 0, 1].iter().map(|n| ItemId::at(&at, *n)).collect();
        ids.sort();
        let names: Vec<_> = ids.iter().map(ItemId::to_string).collect();
        assert_eq!(
            names,
            [
                "20240102T030405",
                "20240102T030405-1",
                "20240102T030405-2",
                "20240102T030405-10"
            ]
        );

        // Names that are not ours still order deterministically
        assert!(ItemId::from("a-b") < ItemId::from("a-c"));
        assert_ne!(ItemId::from("x-0").cmp(&ItemId::from("x")), Ordering::Equal);
    }

    #[test]
    fn test_retry_state_toml() {
        let state = RetryState {
            attempts: 2,
            last_attempt: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
        };
        let text = toml::to_string(&state).unwrap();
        assert_eq!(toml::from_str::<RetryState>(&text).unwrap(), state);
        assert_eq!(
            toml::from_str::<RetryState>("attempts = 0").unwrap(),
            RetryState::default()
        );
    }
}
