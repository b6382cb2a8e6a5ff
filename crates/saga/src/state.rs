//! Outcome of resolving a customer-creation response.

/// What a response did to the subscription it correlates with.
///
/// ```text
/// Pending ──success──► Confirmed
/// Pending ──failure──► Compensated (row deleted)
/// anything else ─────► Ignored
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// A Pending row was moved to Confirmed.
    Confirmed,

    /// A Pending row was deleted after a failure response.
    Compensated,

    /// No Pending row matched: duplicate, late or stale response.
    Ignored,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Confirmed => "confirmed",
            Resolution::Compensated => "compensated",
            Resolution::Ignored => "ignored",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Resolution::Confirmed.to_string(), "confirmed");
        assert_eq!(Resolution::Compensated.to_string(), "compensated");
        assert_eq!(Resolution::Ignored.to_string(), "ignored");
    }
}
