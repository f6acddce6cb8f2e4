use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use tokio::time::{interval, MissedTickBehavior};

use crate::bidding::BidResolver;
use crate::ledger::AuctionLedger;

/// Periodic sweep closing ACTIVE auctions whose end time has passed.
/// Closing is idempotent and takes the per-product lock, so overlapping
/// ticks and races with late bids resolve safely either way.
pub async fn run_close_scan(resolver: BidResolver, ledger: Arc<AuctionLedger>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Close scan running every {:?}", period);

    loop {
        ticker.tick().await;
        let now = Utc::now();
        for product_id in ledger.expired_active_ids(now) {
            match resolver.close_auction(product_id, now) {
                Ok(true) => info!("Close scan settled auction {}", product_id),
                Ok(false) => {} // lost the race to a concurrent close
                Err(e) => warn!("Close scan failed for auction {}: {}", product_id, e),
            }
        }
    }
}
