use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductStatus {
    Active,
    Sold,
    Cancelled,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Sold => "SOLD",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "SOLD" => Ok(Self::Sold),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown product status: {}", s)),
        }
    }
}

/// An auction listing. Amounts are whole currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub seller_id: u64,
    pub name: String,
    pub description: String,
    pub start_price: u64,
    pub step_price: u64,
    pub buy_now_price: Option<u64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub auto_extend: bool,
    pub status: ProductStatus,
    pub current_price: u64,
    pub winner_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Minimum amount the next bid must reach.
    pub fn min_valid_price(&self) -> u64 {
        match self.winner_id {
            None => self.start_price,
            Some(_) => self.current_price + self.step_price,
        }
    }
}

/// A question a prospective bidder asked the seller on a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductQuestion {
    pub id: u64,
    pub product_id: u64,
    pub asker_id: u64,
    pub question: String,
    pub answer: Option<String>,
    pub created_at: DateTime<Utc>,
}
