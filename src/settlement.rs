use std::sync::Arc;

use chrono::Utc;
use log::info;

use crate::errors::AuctionError;
use crate::ledger::AuctionLedger;
use crate::models::{
    Feedback, Order, OrderEvent, OrderState, OrderStateMachine, PaymentStatus, ProductStatus,
};

/// Drive an order through its FSM; invalid transitions surface as errors
/// and leave the order untouched.
pub fn apply_order_event(order: &mut Order, event: OrderEvent) -> Result<OrderState, AuctionError> {
    let mut fsm = OrderStateMachine::from_state(order.status);
    let prev = fsm.consume(event).map_err(AuctionError::InvalidTransition)?;
    order.status = fsm.state();
    Ok(prev)
}

/// Post-auction settlement: the order lifecycle between winner and
/// seller, transaction cancellation and mutual feedback.
#[derive(Clone)]
pub struct SettlementEngine {
    ledger: Arc<AuctionLedger>,
}

impl SettlementEngine {
    pub fn new(ledger: Arc<AuctionLedger>) -> Self {
        Self { ledger }
    }

    /// Open the settlement order for a won auction. Idempotent: the
    /// existing order is returned when the product already has one.
    pub fn create_order(&self, product_id: u64, buyer_id: u64) -> Result<Order, AuctionError> {
        let product = self.ledger.product_snapshot(product_id)?;
        if product.status != ProductStatus::Sold {
            return Err(AuctionError::ProductNotSold { product_id });
        }
        if product.winner_id != Some(buyer_id) {
            return Err(AuctionError::PermissionDenied {
                user_id: buyer_id,
                reason: "only the auction winner may open the order".to_string(),
            });
        }

        let order = Order::new(
            self.ledger.next_id(),
            product_id,
            buyer_id,
            product.seller_id,
            product.current_price,
            Utc::now(),
        );
        Ok(self.ledger.insert_or_get_order(order))
    }

    /// Buyer files the proof of an out-of-band payment. One receipt per
    /// order, and never after the gateway flagged the payment FAILED.
    pub fn upload_payment_receipt(
        &self,
        order_id: u64,
        buyer_id: u64,
        receipt_url: String,
    ) -> Result<Order, AuctionError> {
        self.ledger.with_order_mut(order_id, |order| {
            if order.buyer_id != buyer_id {
                return Err(AuctionError::PermissionDenied {
                    user_id: buyer_id,
                    reason: "only the buyer may upload a receipt".to_string(),
                });
            }
            if order.payment_receipt.is_some() {
                return Err(AuctionError::InvalidTransition(
                    "Receipt already uploaded".to_string(),
                ));
            }
            if order.payment_status == PaymentStatus::Failed {
                return Err(AuctionError::InvalidTransition(
                    "Receipt upload requires payment status UNPAID or PAID".to_string(),
                ));
            }
            if OrderStateMachine::from_state(order.status).is_terminal() {
                return Err(AuctionError::InvalidTransition(format!(
                    "Receipt upload on {} order",
                    order.status
                )));
            }
            order.payment_receipt = Some(receipt_url);
            Ok(order.clone())
        })
    }

    pub fn record_shipping_tracking(
        &self,
        order_id: u64,
        seller_id: u64,
        tracking_code: String,
    ) -> Result<Order, AuctionError> {
        self.ledger.with_order_mut(order_id, |order| {
            if order.seller_id != seller_id {
                return Err(AuctionError::PermissionDenied {
                    user_id: seller_id,
                    reason: "only the seller may record shipping".to_string(),
                });
            }
            if order.payment_receipt.is_none() {
                return Err(AuctionError::InvalidTransition(
                    "Shipping requires an uploaded payment receipt".to_string(),
                ));
            }
            apply_order_event(order, OrderEvent::Ship)?;
            order.shipping_tracking = Some(tracking_code);
            info!("Order {} shipped", order_id);
            Ok(order.clone())
        })
    }

    pub fn confirm_delivery(&self, order_id: u64, buyer_id: u64) -> Result<Order, AuctionError> {
        self.ledger.with_order_mut(order_id, |order| {
            if order.buyer_id != buyer_id {
                return Err(AuctionError::PermissionDenied {
                    user_id: buyer_id,
                    reason: "only the buyer may confirm delivery".to_string(),
                });
            }
            apply_order_event(order, OrderEvent::ConfirmDelivery)?;
            info!("Order {} delivered", order_id);
            Ok(order.clone())
        })
    }

    /// Seller walks away from a sold auction: the product and any order
    /// are cancelled, and the winner takes a -1 feedback for not paying.
    pub fn cancel_transaction(&self, product_id: u64, seller_id: u64) -> Result<(), AuctionError> {
        let record = self.ledger.record(product_id)?;
        let winner = {
            let mut guard = record.lock().unwrap();
            if guard.product.seller_id != seller_id {
                return Err(AuctionError::PermissionDenied {
                    user_id: seller_id,
                    reason: "only the seller may cancel the transaction".to_string(),
                });
            }
            let winner = match (guard.product.status, guard.product.winner_id) {
                (ProductStatus::Sold, Some(winner)) => winner,
                _ => return Err(AuctionError::ProductNotSold { product_id }),
            };
            guard.product.status = ProductStatus::Cancelled;
            winner
        };

        if let Some(order) = self.ledger.order_by_product(product_id) {
            // Already-terminal orders stay as they are
            let _ = self.ledger.with_order_mut(order.id, |order| {
                if !OrderStateMachine::from_state(order.status).is_terminal() {
                    apply_order_event(order, OrderEvent::Cancel)?;
                }
                Ok(())
            });
        }

        self.ledger.record_feedback(Feedback {
            from_user_id: seller_id,
            to_user_id: winner,
            product_id,
            score: -1,
            comment: "The winner did not pay".to_string(),
            created_at: Utc::now(),
        });
        info!(
            "Transaction for product {} cancelled by seller {}, winner {} penalized",
            product_id, seller_id, winner
        );
        Ok(())
    }

    /// Winner rates the seller, once per transaction.
    pub fn rate_seller(
        &self,
        product_id: u64,
        rater_id: u64,
        score: i32,
        comment: String,
    ) -> Result<(), AuctionError> {
        let product = self.ledger.product_snapshot(product_id)?;
        if product.winner_id != Some(rater_id) {
            return Err(AuctionError::PermissionDenied {
                user_id: rater_id,
                reason: "only the auction winner may rate the seller".to_string(),
            });
        }
        if self.ledger.has_feedback_from(rater_id, product_id) {
            return Err(AuctionError::AlreadyRated { product_id });
        }

        self.ledger.record_feedback(Feedback {
            from_user_id: rater_id,
            to_user_id: product.seller_id,
            product_id,
            score,
            comment,
            created_at: Utc::now(),
        });
        Ok(())
    }
}
