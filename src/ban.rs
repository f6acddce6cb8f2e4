use std::sync::Arc;

use chrono::Utc;
use log::info;

use crate::errors::AuctionError;
use crate::fanout::{Notifier, UpdatePublisher};
use crate::ledger::{AuctionLedger, AuctionRecord};
use crate::models::{
    AuctionUpdate, BannedBidder, BidRejectedNote, BidStatus, NotificationEvent, Product,
    ProductStatus,
};

/// Seller-side moderation: ban a bidder from one auction and rebuild the
/// standing from the surviving bids.
#[derive(Clone)]
pub struct BanEngine {
    ledger: Arc<AuctionLedger>,
    updates: UpdatePublisher,
    notifier: Notifier,
}

impl BanEngine {
    pub fn new(ledger: Arc<AuctionLedger>, updates: UpdatePublisher, notifier: Notifier) -> Self {
        Self {
            ledger,
            updates,
            notifier,
        }
    }

    /// Ban `bidder_id`, reject all their bids and recompute the winner.
    /// The reason is stored with the ban and forwarded to the bidder.
    /// Banning an already-banned bidder changes nothing. Returns the
    /// product after recompute.
    pub fn ban_bidder(
        &self,
        product_id: u64,
        seller_id: u64,
        bidder_id: u64,
        reason: String,
    ) -> Result<Product, AuctionError> {
        let record = self.ledger.record(product_id)?;
        let mut guard = record.lock().unwrap();

        if guard.product.seller_id != seller_id {
            return Err(AuctionError::PermissionDenied {
                user_id: seller_id,
                reason: "only the seller may ban bidders".to_string(),
            });
        }
        if guard.product.status != ProductStatus::Active {
            return Err(AuctionError::AuctionNotActive {
                product_id,
                status: guard.product.status.to_string(),
            });
        }
        if guard.is_banned(bidder_id) {
            return Ok(guard.product.clone());
        }

        guard.banned.push(BannedBidder {
            product_id,
            bidder_id,
            reason: reason.clone(),
            banned_at: Utc::now(),
        });

        let mut rejected = 0;
        for bid in guard.bids.iter_mut().filter(|b| b.bidder_id == bidder_id) {
            if bid.status == BidStatus::Valid {
                bid.status = BidStatus::Rejected;
                rejected += 1;
            }
        }

        recompute_standing(&mut guard);

        info!(
            "Bidder {} banned from product {}: {} bids rejected, price {} winner {:?}",
            bidder_id, product_id, rejected, guard.product.current_price, guard.product.winner_id
        );

        self.updates.publish(&AuctionUpdate {
            product_id,
            current_price: guard.product.current_price,
            winner_id: guard.product.winner_id,
            end_time: guard.product.end_time,
        });
        self.notifier
            .notify(NotificationEvent::BidRejected(BidRejectedNote {
                product_name: guard.product.name.clone(),
                bidder_email: self.ledger.user_email(bidder_id),
                reason,
            }));

        Ok(guard.product.clone())
    }
}

/// Rebuild current_price/winner from the VALID bids: highest amount wins,
/// ties go to the earliest bid. With no bids left the auction resets to
/// its start price with no winner.
fn recompute_standing(record: &mut AuctionRecord) {
    let best = record
        .bids
        .iter()
        .filter(|b| b.status == BidStatus::Valid)
        .max_by(|a, b| {
            a.amount
                .cmp(&b.amount)
                .then_with(|| b.placed_at.cmp(&a.placed_at))
                .then_with(|| b.id.cmp(&a.id))
        });

    match best {
        Some(bid) => {
            record.product.current_price = bid.amount;
            record.product.winner_id = Some(bid.bidder_id);
        }
        None => {
            record.product.current_price = record.product.start_price;
            record.product.winner_id = None;
        }
    }
}
