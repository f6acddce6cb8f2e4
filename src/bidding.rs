use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::info;
use serde::Serialize;

use crate::eligibility;
use crate::errors::AuctionError;
use crate::fanout::{Notifier, UpdatePublisher};
use crate::ledger::{AuctionLedger, AuctionRecord};
use crate::models::{
    AuctionFailNote, AuctionSuccessNote, AuctionUpdate, Bid, BidPlacedNote, BidStatus,
    NotificationEvent, ProductStatus,
};

/// Late bids extend the deadline so the last word is never a timing race.
#[derive(Debug, Clone, Copy)]
pub struct AntiSnipePolicy {
    pub window: Duration,
    pub extension: Duration,
}

impl Default for AntiSnipePolicy {
    fn default() -> Self {
        Self {
            window: Duration::minutes(5),
            extension: Duration::minutes(5),
        }
    }
}

impl AntiSnipePolicy {
    pub fn from_secs(window_secs: i64, extension_secs: i64) -> Self {
        Self {
            window: Duration::seconds(window_secs),
            extension: Duration::seconds(extension_secs),
        }
    }
}

/// Committed result of a bid, returned to the caller and mirrored by the
/// realtime update.
#[derive(Debug, Clone, Serialize)]
pub struct BidOutcome {
    pub bid_id: u64,
    pub product_id: u64,
    pub current_price: u64,
    pub winner_id: Option<u64>,
    pub end_time: DateTime<Utc>,
    pub extended: bool,
    /// Whether the caller's bid now leads the auction.
    pub leading: bool,
}

/// Resolves bids against the ledger: price ratchet, proxy ceilings,
/// anti-sniping, buy-now and closing. All mutations for one product
/// happen under that product's record lock; updates are published while
/// the lock is held so the stream order matches commit order.
#[derive(Clone)]
pub struct BidResolver {
    ledger: Arc<AuctionLedger>,
    updates: UpdatePublisher,
    notifier: Notifier,
    policy: AntiSnipePolicy,
}

impl BidResolver {
    pub fn new(
        ledger: Arc<AuctionLedger>,
        updates: UpdatePublisher,
        notifier: Notifier,
        policy: AntiSnipePolicy,
    ) -> Self {
        Self {
            ledger,
            updates,
            notifier,
            policy,
        }
    }

    pub fn place_bid(
        &self,
        product_id: u64,
        bidder_id: u64,
        amount: u64,
        max_amount: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, AuctionError> {
        let ceiling = max_amount.unwrap_or(amount);
        if ceiling < amount {
            return Err(AuctionError::InvalidAmount(format!(
                "max_amount {} below bid amount {}",
                ceiling, amount
            )));
        }

        eligibility::check_bidder(&self.ledger, bidder_id)?;

        let record = self.ledger.record(product_id)?;
        let mut guard = record.lock().unwrap();

        let product = &guard.product;
        if product.status != ProductStatus::Active {
            return Err(AuctionError::AuctionNotActive {
                product_id,
                status: product.status.to_string(),
            });
        }
        if now < product.start_time {
            return Err(AuctionError::AuctionNotStarted { product_id });
        }
        if now >= product.end_time {
            return Err(AuctionError::AuctionEnded { product_id });
        }
        if product.seller_id == bidder_id {
            return Err(AuctionError::SellerSelfBid);
        }
        if guard.is_banned(bidder_id) {
            return Err(AuctionError::BidderBanned { product_id, bidder_id });
        }

        let step = guard.product.step_price;
        let current = guard.product.current_price;
        let prev_winner = guard.product.winner_id;
        let is_leader = prev_winner == Some(bidder_id);

        let minimum = guard.product.min_valid_price();
        if !is_leader && amount < minimum {
            return Err(AuctionError::BidTooLow { amount, minimum });
        }

        // A bid reaching the buy-now price wins on the spot
        if let Some(buy_now) = guard.product.buy_now_price {
            if amount >= buy_now {
                return Ok(self.finish_sale(&mut guard, bidder_id, amount.max(current), ceiling, now));
            }
        }

        // Proxy resolution: the higher ceiling leads; equal ceilings keep
        // the incumbent. Price never exceeds the leader's ceiling and
        // never moves backwards.
        let (winner, price, leading) = match prev_winner {
            None => (bidder_id, amount, true),
            // The leader raising their own ceiling never bids against
            // themselves; the price stays put.
            Some(leader) if leader == bidder_id => (leader, current, true),
            Some(leader) => {
                let leader_max = guard.leader_ceiling().unwrap_or(current);
                if ceiling > leader_max {
                    let price = (leader_max + step).min(ceiling).max(amount);
                    (bidder_id, price, true)
                } else {
                    let price = (ceiling + step).min(leader_max).max(current);
                    (leader, price, false)
                }
            }
        };

        let extended = guard.product.auto_extend
            && guard.product.end_time - now < self.policy.window;
        if extended {
            guard.product.end_time = guard.product.end_time + self.policy.extension;
        }

        let bid = Bid {
            id: self.ledger.next_id(),
            product_id,
            bidder_id,
            // A leader restating their ceiling does not outbid themselves
            amount: if is_leader { amount.min(current) } else { amount },
            max_amount: ceiling,
            status: BidStatus::Valid,
            placed_at: now,
        };
        let bid_id = bid.id;
        guard.bids.push(bid);
        guard.product.current_price = price;
        guard.product.winner_id = Some(winner);

        // When the resolution drove the price past the winner's best
        // recorded amount, record the winner's automatic bid at the new
        // price; the top VALID bid always matches current_price.
        let winner_best = guard
            .bids
            .iter()
            .filter(|b| b.status == BidStatus::Valid && b.bidder_id == winner)
            .map(|b| b.amount)
            .max()
            .unwrap_or(0);
        if price > winner_best {
            let auto_ceiling = guard.leader_ceiling().unwrap_or(price).max(price);
            guard.bids.push(Bid {
                id: self.ledger.next_id(),
                product_id,
                bidder_id: winner,
                amount: price,
                max_amount: auto_ceiling,
                status: BidStatus::Valid,
                placed_at: now,
            });
        }

        info!(
            "Bid {} on product {}: bidder {} amount {} -> price {} winner {}",
            bid_id, product_id, bidder_id, amount, price, winner
        );

        self.updates.publish(&AuctionUpdate {
            product_id,
            current_price: price,
            winner_id: Some(winner),
            end_time: guard.product.end_time,
        });

        let displaced = prev_winner.filter(|&w| leading && w != bidder_id);
        self.notifier.notify(NotificationEvent::BidPlaced(BidPlacedNote {
            product_id,
            product_name: guard.product.name.clone(),
            new_price: price,
            seller_email: self.ledger.user_email(guard.product.seller_id),
            bidder_email: self.ledger.user_email(bidder_id),
            prev_bidder_email: displaced.map(|w| self.ledger.user_email(w)),
        }));

        Ok(BidOutcome {
            bid_id,
            product_id,
            current_price: price,
            winner_id: Some(winner),
            end_time: guard.product.end_time,
            extended,
            leading,
        })
    }

    /// Immediate purchase at the listed buy-now price. Ends the auction
    /// on the spot.
    pub fn buy_now(
        &self,
        product_id: u64,
        bidder_id: u64,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, AuctionError> {
        eligibility::check_bidder(&self.ledger, bidder_id)?;

        let record = self.ledger.record(product_id)?;
        let mut guard = record.lock().unwrap();

        let product = &guard.product;
        if product.status != ProductStatus::Active {
            return Err(AuctionError::AuctionNotActive {
                product_id,
                status: product.status.to_string(),
            });
        }
        if now < product.start_time {
            return Err(AuctionError::AuctionNotStarted { product_id });
        }
        if now >= product.end_time {
            return Err(AuctionError::AuctionEnded { product_id });
        }
        if product.seller_id == bidder_id {
            return Err(AuctionError::SellerSelfBid);
        }
        if guard.is_banned(bidder_id) {
            return Err(AuctionError::BidderBanned { product_id, bidder_id });
        }
        let price = product
            .buy_now_price
            .ok_or(AuctionError::NoBuyNowPrice { product_id })?;
        let price = price.max(guard.product.current_price);

        Ok(self.finish_sale(&mut guard, bidder_id, price, price, now))
    }

    /// Records the buyer's winning bid at `price`, marks the product SOLD
    /// and emits the final update plus AUCTION_SUCCESS. The caller holds
    /// the record lock and has already run the guards.
    fn finish_sale(
        &self,
        guard: &mut AuctionRecord,
        buyer_id: u64,
        price: u64,
        ceiling: u64,
        now: DateTime<Utc>,
    ) -> BidOutcome {
        let product_id = guard.product.id;
        let bid = Bid {
            id: self.ledger.next_id(),
            product_id,
            bidder_id: buyer_id,
            amount: price,
            max_amount: ceiling.max(price),
            status: BidStatus::Valid,
            placed_at: now,
        };
        let bid_id = bid.id;
        guard.bids.push(bid);
        guard.product.status = ProductStatus::Sold;
        guard.product.current_price = price;
        guard.product.winner_id = Some(buyer_id);

        info!("Product {} sold to {} at {}", product_id, buyer_id, price);

        self.updates.publish(&AuctionUpdate {
            product_id,
            current_price: price,
            winner_id: Some(buyer_id),
            end_time: guard.product.end_time,
        });
        self.notifier
            .notify(NotificationEvent::AuctionSuccess(AuctionSuccessNote {
                product_name: guard.product.name.clone(),
                price,
                seller_email: self.ledger.user_email(guard.product.seller_id),
                winner_email: self.ledger.user_email(buyer_id),
            }));

        BidOutcome {
            bid_id,
            product_id,
            current_price: price,
            winner_id: Some(buyer_id),
            end_time: guard.product.end_time,
            extended: false,
            leading: true,
        }
    }

    /// Close an expired auction. Idempotent: returns Ok(false) when there
    /// is nothing to do, so overlapping scans and races with late bids
    /// are harmless.
    pub fn close_auction(&self, product_id: u64, now: DateTime<Utc>) -> Result<bool, AuctionError> {
        let record = self.ledger.record(product_id)?;
        let mut guard = record.lock().unwrap();

        if guard.product.status != ProductStatus::Active || now < guard.product.end_time {
            return Ok(false);
        }

        match guard.product.winner_id {
            Some(winner) => {
                guard.product.status = ProductStatus::Sold;
                info!(
                    "Auction {} closed: sold to {} at {}",
                    product_id, winner, guard.product.current_price
                );
                self.notifier
                    .notify(NotificationEvent::AuctionSuccess(AuctionSuccessNote {
                        product_name: guard.product.name.clone(),
                        price: guard.product.current_price,
                        seller_email: self.ledger.user_email(guard.product.seller_id),
                        winner_email: self.ledger.user_email(winner),
                    }));
            }
            None => {
                guard.product.status = ProductStatus::Cancelled;
                info!("Auction {} closed without bids", product_id);
                self.notifier
                    .notify(NotificationEvent::AuctionFail(AuctionFailNote {
                        product_name: guard.product.name.clone(),
                        seller_email: self.ledger.user_email(guard.product.seller_id),
                    }));
            }
        }

        self.updates.publish(&AuctionUpdate {
            product_id,
            current_price: guard.product.current_price,
            winner_id: guard.product.winner_id,
            end_time: guard.product.end_time,
        });

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::Notifier;
    use crate::models::NotificationEvent;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn harness() -> (BidResolver, Arc<AuctionLedger>, UnboundedReceiver<NotificationEvent>) {
        let ledger = Arc::new(AuctionLedger::new(1));
        let (notifier, rx) = Notifier::channel();
        let resolver = BidResolver::new(
            ledger.clone(),
            UpdatePublisher::new(64),
            notifier,
            AntiSnipePolicy::default(),
        );
        (resolver, ledger, rx)
    }

    fn list_product(ledger: &AuctionLedger, buy_now: Option<u64>, auto_extend: bool) -> u64 {
        let now = Utc::now();
        ledger
            .create_product(
                10,
                "old clock".to_string(),
                String::new(),
                100,
                10,
                buy_now,
                now - Duration::minutes(10),
                now + Duration::hours(2),
                auto_extend,
            )
            .unwrap()
            .id
    }

    #[test]
    fn test_first_bid_sets_price_and_winner() {
        let (resolver, ledger, mut rx) = harness();
        let product_id = list_product(&ledger, None, false);

        let outcome = resolver.place_bid(product_id, 7, 100, None, Utc::now()).unwrap();
        assert_eq!(outcome.current_price, 100);
        assert_eq!(outcome.winner_id, Some(7));
        assert!(outcome.leading);
        assert_eq!(rx.try_recv().unwrap().kind(), "BID_PLACED");
    }

    #[test]
    fn test_bid_below_minimum_rejected() {
        let (resolver, ledger, _rx) = harness();
        let product_id = list_product(&ledger, None, false);
        resolver.place_bid(product_id, 7, 100, None, Utc::now()).unwrap();

        // Next bid must reach current + step = 110
        match resolver.place_bid(product_id, 8, 105, None, Utc::now()) {
            Err(AuctionError::BidTooLow { amount, minimum }) => {
                assert_eq!(amount, 105);
                assert_eq!(minimum, 110);
            }
            other => panic!("expected BidTooLow, got {:?}", other),
        }
    }

    #[test]
    fn test_price_ratchet_never_moves_back() {
        let (resolver, ledger, _rx) = harness();
        let product_id = list_product(&ledger, None, false);
        resolver.place_bid(product_id, 7, 100, Some(500), Utc::now()).unwrap();
        let outcome = resolver.place_bid(product_id, 8, 110, Some(200), Utc::now()).unwrap();

        // Incumbent ceiling 500 beats challenger 200; price climbs to 210
        assert_eq!(outcome.winner_id, Some(7));
        assert!(!outcome.leading);
        assert_eq!(outcome.current_price, 210);

        let snapshot = ledger.product_snapshot(product_id).unwrap();
        assert_eq!(snapshot.current_price, 210);
    }

    #[test]
    fn test_challenger_with_higher_ceiling_takes_lead() {
        let (resolver, ledger, mut rx) = harness();
        let product_id = list_product(&ledger, None, false);
        ledger.register_user(crate::models::UserProfile {
            id: 7,
            full_name: "Le Van Binh".to_string(),
            email: "binh@example.com".to_string(),
        });
        resolver.place_bid(product_id, 7, 100, Some(150), Utc::now()).unwrap();
        let outcome = resolver.place_bid(product_id, 8, 110, Some(400), Utc::now()).unwrap();

        assert_eq!(outcome.winner_id, Some(8));
        assert!(outcome.leading);
        // Old leader's ceiling 150 + step 10, capped by new ceiling
        assert_eq!(outcome.current_price, 160);

        let _ = rx.try_recv().unwrap();
        match rx.try_recv().unwrap() {
            NotificationEvent::BidPlaced(note) => {
                assert_eq!(note.prev_bidder_email.as_deref(), Some("binh@example.com"));
            }
            other => panic!("expected BidPlaced, got {:?}", other),
        }
    }

    #[test]
    fn test_losing_challenge_records_counter_bid() {
        let (resolver, ledger, _rx) = harness();
        let product_id = list_product(&ledger, None, false);
        resolver.place_bid(product_id, 7, 100, Some(500), Utc::now()).unwrap();
        let outcome = resolver.place_bid(product_id, 8, 110, Some(200), Utc::now()).unwrap();
        assert_eq!(outcome.winner_id, Some(7));
        assert_eq!(outcome.current_price, 210);

        // The incumbent's automatic bid carries the committed price, so
        // the top VALID bid matches current_price and winner_id.
        let record = ledger.record(product_id).unwrap();
        let guard = record.lock().unwrap();
        let top = guard
            .bids
            .iter()
            .filter(|b| b.status == BidStatus::Valid)
            .max_by_key(|b| b.amount)
            .unwrap();
        assert_eq!(top.bidder_id, 7);
        assert_eq!(top.amount, 210);
        assert_eq!(top.max_amount, 500);
    }

    #[test]
    fn test_leader_raising_own_ceiling_keeps_price() {
        let (resolver, ledger, _rx) = harness();
        let product_id = list_product(&ledger, None, false);
        resolver.place_bid(product_id, 7, 100, Some(500), Utc::now()).unwrap();

        let outcome = resolver.place_bid(product_id, 7, 110, Some(600), Utc::now()).unwrap();
        assert_eq!(outcome.winner_id, Some(7));
        assert!(outcome.leading);
        assert_eq!(outcome.current_price, 100);

        // The raised ceiling is live for the next challenge
        let outcome = resolver.place_bid(product_id, 8, 110, Some(550), Utc::now()).unwrap();
        assert_eq!(outcome.winner_id, Some(7));
        assert_eq!(outcome.current_price, 560);
    }

    #[test]
    fn test_bid_at_buy_now_price_ends_auction() {
        let (resolver, ledger, mut rx) = harness();
        let product_id = list_product(&ledger, Some(150), false);
        resolver.place_bid(product_id, 7, 100, None, Utc::now()).unwrap();
        assert!(matches!(
            resolver.place_bid(product_id, 8, 105, None, Utc::now()),
            Err(AuctionError::BidTooLow { .. })
        ));
        resolver.place_bid(product_id, 8, 110, None, Utc::now()).unwrap();

        let outcome = resolver.place_bid(product_id, 9, 150, None, Utc::now()).unwrap();
        assert_eq!(outcome.current_price, 150);
        assert_eq!(outcome.winner_id, Some(9));
        assert!(outcome.leading);

        let snapshot = ledger.product_snapshot(product_id).unwrap();
        assert_eq!(snapshot.status, ProductStatus::Sold);
        assert_eq!(snapshot.current_price, 150);
        assert_eq!(snapshot.winner_id, Some(9));

        assert_eq!(rx.try_recv().unwrap().kind(), "BID_PLACED");
        assert_eq!(rx.try_recv().unwrap().kind(), "BID_PLACED");
        assert_eq!(rx.try_recv().unwrap().kind(), "AUCTION_SUCCESS");

        // The sale closed the auction for good
        assert!(matches!(
            resolver.place_bid(product_id, 7, 160, None, Utc::now()),
            Err(AuctionError::AuctionNotActive { .. })
        ));
    }

    #[test]
    fn test_equal_ceilings_keep_incumbent() {
        let (resolver, ledger, _rx) = harness();
        let product_id = list_product(&ledger, None, false);
        resolver.place_bid(product_id, 7, 100, Some(300), Utc::now()).unwrap();
        let outcome = resolver.place_bid(product_id, 8, 110, Some(300), Utc::now()).unwrap();

        assert_eq!(outcome.winner_id, Some(7));
        assert_eq!(outcome.current_price, 300);
    }

    #[test]
    fn test_anti_snipe_extends_deadline() {
        let (resolver, ledger, _rx) = harness();
        let now = Utc::now();
        let product_id = ledger
            .create_product(
                10,
                "snipe bait".to_string(),
                String::new(),
                100,
                10,
                None,
                now - Duration::minutes(10),
                now + Duration::minutes(3),
                true,
            )
            .unwrap()
            .id;
        let old_end = ledger.product_snapshot(product_id).unwrap().end_time;

        let outcome = resolver.place_bid(product_id, 7, 100, None, now).unwrap();
        assert!(outcome.extended);
        assert_eq!(outcome.end_time, old_end + Duration::minutes(5));
    }

    #[test]
    fn test_no_extension_outside_window_or_without_flag() {
        let (resolver, ledger, _rx) = harness();
        let product_id = list_product(&ledger, None, true); // ends in 2h
        let outcome = resolver.place_bid(product_id, 7, 100, None, Utc::now()).unwrap();
        assert!(!outcome.extended);
    }

    #[test]
    fn test_seller_and_time_window_guards() {
        let (resolver, ledger, _rx) = harness();
        let product_id = list_product(&ledger, None, false);

        assert!(matches!(
            resolver.place_bid(product_id, 10, 100, None, Utc::now()),
            Err(AuctionError::SellerSelfBid)
        ));

        let late = Utc::now() + Duration::hours(3);
        assert!(matches!(
            resolver.place_bid(product_id, 7, 100, None, late),
            Err(AuctionError::AuctionEnded { .. })
        ));
    }

    #[test]
    fn test_buy_now_ends_auction() {
        let (resolver, ledger, mut rx) = harness();
        let product_id = list_product(&ledger, Some(1000), false);

        let outcome = resolver.buy_now(product_id, 7, Utc::now()).unwrap();
        assert_eq!(outcome.current_price, 1000);
        assert_eq!(outcome.winner_id, Some(7));

        let snapshot = ledger.product_snapshot(product_id).unwrap();
        assert_eq!(snapshot.status, ProductStatus::Sold);
        assert_eq!(rx.try_recv().unwrap().kind(), "AUCTION_SUCCESS");

        // Bidding after buy-now is rejected
        assert!(matches!(
            resolver.place_bid(product_id, 8, 1010, None, Utc::now()),
            Err(AuctionError::AuctionNotActive { .. })
        ));
    }

    #[test]
    fn test_buy_now_requires_listing_price() {
        let (resolver, ledger, _rx) = harness();
        let product_id = list_product(&ledger, None, false);
        assert!(matches!(
            resolver.buy_now(product_id, 7, Utc::now()),
            Err(AuctionError::NoBuyNowPrice { .. })
        ));
    }

    #[test]
    fn test_close_auction_idempotent() {
        let (resolver, ledger, mut rx) = harness();
        let product_id = list_product(&ledger, None, false);
        resolver.place_bid(product_id, 7, 100, None, Utc::now()).unwrap();
        let _ = rx.try_recv();

        let after_end = Utc::now() + Duration::hours(3);
        assert!(resolver.close_auction(product_id, after_end).unwrap());
        assert_eq!(rx.try_recv().unwrap().kind(), "AUCTION_SUCCESS");
        assert_eq!(
            ledger.product_snapshot(product_id).unwrap().status,
            ProductStatus::Sold
        );

        // Second close is a no-op
        assert!(!resolver.close_auction(product_id, after_end).unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_without_bids_cancels() {
        let (resolver, ledger, mut rx) = harness();
        let product_id = list_product(&ledger, None, false);

        let after_end = Utc::now() + Duration::hours(3);
        assert!(resolver.close_auction(product_id, after_end).unwrap());
        assert_eq!(rx.try_recv().unwrap().kind(), "AUCTION_FAIL");
        assert_eq!(
            ledger.product_snapshot(product_id).unwrap().status,
            ProductStatus::Cancelled
        );
    }

    #[test]
    fn test_close_before_end_is_noop() {
        let (resolver, ledger, _rx) = harness();
        let product_id = list_product(&ledger, None, false);
        assert!(!resolver.close_auction(product_id, Utc::now()).unwrap());
    }
}
