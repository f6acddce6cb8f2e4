use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BidStatus {
    Valid,
    Rejected,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded bid. `max_amount` is the proxy ceiling the bidder is
/// willing to be driven up to; it is never shown to other bidders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: u64,
    pub product_id: u64,
    pub bidder_id: u64,
    pub amount: u64,
    pub max_amount: u64,
    pub status: BidStatus,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannedBidder {
    pub product_id: u64,
    pub bidder_id: u64,
    pub reason: String,
    pub banned_at: DateTime<Utc>,
}

/// Bid history row as exposed to clients. Bidder names are masked.
#[derive(Debug, Clone, Serialize)]
pub struct BidHistoryEntry {
    pub bidder_name: String,
    pub amount: u64,
    pub status: BidStatus,
    pub placed_at: DateTime<Utc>,
}
