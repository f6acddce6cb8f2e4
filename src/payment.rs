use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use log::{info, warn};
use serde::Serialize;
use sha2::Sha512;
use url::form_urlencoded;

use crate::errors::AuctionError;
use crate::ledger::AuctionLedger;
use crate::models::{Order, OrderEvent, OrderStateMachine, PaymentStatus};
use crate::settlement::apply_order_event;

type HmacSha512 = Hmac<Sha512>;

/// Gateway response code meaning the payment went through.
pub const SUCCESS_CODE: &str = "00";

const SIGNATURE_PARAM: &str = "secure_hash";
const SIGNATURE_TYPE_PARAM: &str = "secure_hash_type";

#[derive(Debug, Clone, Serialize)]
pub struct CallbackOutcome {
    pub order_id: u64,
    pub paid: bool,
    pub response_code: String,
}

/// Signed redirect integration with the external payment gateway.
/// The canonical form of a parameter set is the sorted
/// `application/x-www-form-urlencoded` query (space encoded as `+`),
/// signed with HMAC-SHA512 in lowercase hex.
#[derive(Clone)]
pub struct PaymentGateway {
    secret: String,
    tmn_code: String,
    gateway_url: String,
    return_url: String,
}

impl PaymentGateway {
    pub fn new(secret: String, tmn_code: String, gateway_url: String, return_url: String) -> Self {
        Self {
            secret,
            tmn_code,
            gateway_url,
            return_url,
        }
    }

    fn canonical_query(params: &BTreeMap<String, String>) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in params {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha512::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Redirect URL sending the buyer to the gateway's payment page.
    /// The gateway bills in hundredths, hence the x100.
    pub fn build_payment_url(
        &self,
        order: &Order,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> String {
        let mut params = BTreeMap::new();
        params.insert("version".to_string(), "2.1.0".to_string());
        params.insert("command".to_string(), "pay".to_string());
        params.insert("tmn_code".to_string(), self.tmn_code.clone());
        params.insert("txn_ref".to_string(), order.id.to_string());
        params.insert("amount".to_string(), (order.amount * 100).to_string());
        params.insert(
            "order_info".to_string(),
            format!("Payment for order {}", order.id),
        );
        params.insert("return_url".to_string(), self.return_url.clone());
        params.insert("ip_addr".to_string(), client_ip.to_string());
        params.insert(
            "create_date".to_string(),
            now.format("%Y%m%d%H%M%S").to_string(),
        );

        let query = Self::canonical_query(&params);
        let signature = self.sign(&query);
        format!("{}?{}&{}={}", self.gateway_url, query, SIGNATURE_PARAM, signature)
    }

    /// Check the signature on a callback parameter set. The signature
    /// fields themselves are excluded from the canonical string.
    pub fn verify_signature(&self, params: &HashMap<String, String>) -> Result<(), AuctionError> {
        let provided = params
            .get(SIGNATURE_PARAM)
            .ok_or(AuctionError::InvalidSignature)?;
        let provided_bytes = hex::decode(provided).map_err(|_| AuctionError::InvalidSignature)?;

        let canonical: BTreeMap<String, String> = params
            .iter()
            .filter(|(k, _)| k.as_str() != SIGNATURE_PARAM && k.as_str() != SIGNATURE_TYPE_PARAM)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let query = Self::canonical_query(&canonical);

        let mut mac = HmacSha512::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(query.as_bytes());
        mac.verify_slice(&provided_bytes)
            .map_err(|_| AuctionError::InvalidSignature)
    }

    /// Apply a verified gateway callback to the order. Idempotent on
    /// repeated success callbacks; an amount mismatch marks the payment
    /// FAILED and cancels the order, nothing is ever deleted.
    pub fn handle_callback(
        &self,
        ledger: &Arc<AuctionLedger>,
        params: &HashMap<String, String>,
    ) -> Result<CallbackOutcome, AuctionError> {
        self.verify_signature(params)?;

        let order_id: u64 = require(params, "txn_ref")?
            .parse()
            .map_err(|_| AuctionError::MissingParam("txn_ref"))?;
        let amount: u64 = require(params, "amount")?
            .parse()
            .map_err(|_| AuctionError::MissingParam("amount"))?;
        let response_code = require(params, "response_code")?.to_string();
        let txn_no = params.get("txn_no").cloned();

        ledger.with_order_mut(order_id, |order| {
            if order.payment_status == PaymentStatus::Paid {
                info!("Order {} already paid, callback ignored", order_id);
                return Ok(CallbackOutcome {
                    order_id,
                    paid: true,
                    response_code,
                });
            }

            let expected = order.amount * 100;
            if amount != expected {
                warn!(
                    "Order {} callback amount {} does not match expected {}",
                    order_id, amount, expected
                );
                order.payment_status = PaymentStatus::Failed;
                if !OrderStateMachine::from_state(order.status).is_terminal() {
                    apply_order_event(order, OrderEvent::Cancel)?;
                }
                return Err(AuctionError::AmountMismatch {
                    expected,
                    received: amount,
                });
            }

            if response_code == SUCCESS_CODE {
                apply_order_event(order, OrderEvent::ConfirmPayment)?;
                order.payment_status = PaymentStatus::Paid;
                order.gateway_txn_no = txn_no;
                info!("Order {} paid via gateway", order_id);
                Ok(CallbackOutcome {
                    order_id,
                    paid: true,
                    response_code,
                })
            } else {
                order.payment_status = PaymentStatus::Failed;
                info!("Order {} payment failed with code {}", order_id, response_code);
                Ok(CallbackOutcome {
                    order_id,
                    paid: false,
                    response_code,
                })
            }
        })
    }
}

fn require<'a>(
    params: &'a HashMap<String, String>,
    key: &'static str,
) -> Result<&'a str, AuctionError> {
    params
        .get(key)
        .map(String::as_str)
        .ok_or(AuctionError::MissingParam(key))
}
