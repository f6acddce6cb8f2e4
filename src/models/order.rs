use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order_fsm::OrderState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "UNPAID",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settlement record for a won auction. One order per product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub product_id: u64,
    pub buyer_id: u64,
    pub seller_id: u64,
    /// Whole currency units, frozen at order creation.
    pub amount: u64,
    pub status: OrderState,
    pub payment_status: PaymentStatus,
    pub payment_receipt: Option<String>,
    pub shipping_tracking: Option<String>,
    pub gateway_txn_no: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        id: u64,
        product_id: u64,
        buyer_id: u64,
        seller_id: u64,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            product_id,
            buyer_id,
            seller_id,
            amount,
            status: OrderState::Pending,
            payment_status: PaymentStatus::Unpaid,
            payment_receipt: None,
            shipping_tracking: None,
            gateway_txn_no: None,
            created_at: now,
            updated_at: now,
        }
    }
}
