//! Subscription record and its status machine.

use chrono::{DateTime, Utc};
use common::SubscriptionId;
use serde::{Deserialize, Serialize};

/// Lifecycle of a subscription row.
///
/// ```text
/// (absent) ──create──► Pending ──success response──► Confirmed
///                         │
///                         └──failure response──► (absent)
/// ```
///
/// There is no failed state: compensation deletes the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Customer record requested, outcome not yet known.
    #[default]
    Pending,

    /// Customer record exists (terminal).
    Confirmed,
}

impl SubscriptionStatus {
    /// Returns true if a success response may confirm this row.
    pub fn can_confirm(&self) -> bool {
        matches!(self, SubscriptionStatus::Pending)
    }

    /// Returns true if a failure response may delete this row.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SubscriptionStatus::Pending)
    }

    /// Returns the value stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Confirmed => "confirmed",
        }
    }

    /// Parses a stored `status` column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubscriptionStatus::Pending),
            "confirmed" => Some(SubscriptionStatus::Confirmed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subscriber row in the web service's store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub email: String,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_confirmed(&self) -> bool {
        self.status == SubscriptionStatus::Confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(SubscriptionStatus::default(), SubscriptionStatus::Pending);
    }

    #[test]
    fn test_only_pending_rows_move() {
        assert!(SubscriptionStatus::Pending.can_confirm());
        assert!(SubscriptionStatus::Pending.can_compensate());
        assert!(!SubscriptionStatus::Confirmed.can_confirm());
        assert!(!SubscriptionStatus::Confirmed.can_compensate());
    }

    #[test]
    fn test_column_values_roundtrip() {
        for status in [SubscriptionStatus::Pending, SubscriptionStatus::Confirmed] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SubscriptionStatus::parse("failed"), None);
    }

    #[test]
    fn test_serialization_matches_column_values() {
        let json = serde_json::to_string(&SubscriptionStatus::Confirmed).unwrap();
        assert_eq!(json, "\"confirmed\"");
    }
}
