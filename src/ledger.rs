use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use log::info;
use rustc_hash::FxHashMap;

use crate::errors::AuctionError;
use crate::id_gen::SnowflakeGenRng;
use crate::models::{
    BannedBidder, Bid, BidHistoryEntry, BidStatus, Feedback, FeedbackAggregate, Order, Product,
    ProductQuestion, ProductStatus, UserProfile,
};

/// Everything that must move atomically with a bid: the product row,
/// its bids and its ban list live under one lock.
#[derive(Debug)]
pub struct AuctionRecord {
    pub product: Product,
    pub bids: Vec<Bid>,
    pub banned: Vec<BannedBidder>,
}

impl AuctionRecord {
    pub fn is_banned(&self, bidder_id: u64) -> bool {
        self.banned.iter().any(|b| b.bidder_id == bidder_id)
    }

    /// Distinct bidders holding at least one VALID bid.
    pub fn valid_bidder_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .bids
            .iter()
            .filter(|b| b.status == BidStatus::Valid)
            .map(|b| b.bidder_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Proxy ceiling of the current leader: the highest ceiling among
    /// their VALID bids.
    pub fn leader_ceiling(&self) -> Option<u64> {
        let leader = self.product.winner_id?;
        self.bids
            .iter()
            .filter(|b| b.status == BidStatus::Valid && b.bidder_id == leader)
            .map(|b| b.max_amount)
            .max()
    }
}

struct OrderStore {
    by_id: FxHashMap<u64, Order>,
    // Unique index: one order per product
    by_product: FxHashMap<u64, u64>,
}

struct FeedbackStore {
    entries: Vec<Feedback>,
    aggregates: FxHashMap<u64, FeedbackAggregate>,
}

/// Authoritative in-memory state of the settlement core. Per-product
/// mutual exclusion comes from each record's own mutex; the outer maps
/// are only locked long enough to look up or insert handles.
pub struct AuctionLedger {
    products: RwLock<FxHashMap<u64, Arc<Mutex<AuctionRecord>>>>,
    orders: Mutex<OrderStore>,
    feedback: Mutex<FeedbackStore>,
    users: RwLock<FxHashMap<u64, UserProfile>>,
    questions: Mutex<FxHashMap<u64, ProductQuestion>>,
    id_gen: Mutex<SnowflakeGenRng>,
}

impl AuctionLedger {
    pub fn new(machine_id: u8) -> Self {
        Self {
            products: RwLock::new(FxHashMap::default()),
            orders: Mutex::new(OrderStore {
                by_id: FxHashMap::default(),
                by_product: FxHashMap::default(),
            }),
            feedback: Mutex::new(FeedbackStore {
                entries: Vec::new(),
                aggregates: FxHashMap::default(),
            }),
            users: RwLock::new(FxHashMap::default()),
            questions: Mutex::new(FxHashMap::default()),
            id_gen: Mutex::new(SnowflakeGenRng::new(machine_id)),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.id_gen.lock().unwrap().generate()
    }

    // ---- users ----

    pub fn register_user(&self, profile: UserProfile) {
        self.users.write().unwrap().insert(profile.id, profile);
    }

    pub fn user(&self, user_id: u64) -> Option<UserProfile> {
        self.users.read().unwrap().get(&user_id).cloned()
    }

    pub fn user_email(&self, user_id: u64) -> String {
        self.user(user_id).map(|u| u.email).unwrap_or_default()
    }

    // ---- products ----

    #[allow(clippy::too_many_arguments)]
    pub fn create_product(
        &self,
        seller_id: u64,
        name: String,
        description: String,
        start_price: u64,
        step_price: u64,
        buy_now_price: Option<u64>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        auto_extend: bool,
    ) -> Result<Product, AuctionError> {
        if end_time <= start_time {
            return Err(AuctionError::InvalidAmount(
                "end_time must be after start_time".to_string(),
            ));
        }
        if step_price == 0 {
            return Err(AuctionError::InvalidAmount("step_price must be positive".to_string()));
        }
        let product = Product {
            id: self.next_id(),
            seller_id,
            name,
            description,
            start_price,
            step_price,
            buy_now_price,
            start_time,
            end_time,
            auto_extend,
            status: ProductStatus::Active,
            current_price: start_price,
            winner_id: None,
            created_at: Utc::now(),
        };
        let record = AuctionRecord {
            product: product.clone(),
            bids: Vec::new(),
            banned: Vec::new(),
        };
        self.products
            .write()
            .unwrap()
            .insert(product.id, Arc::new(Mutex::new(record)));
        info!("Product {} listed by seller {}", product.id, seller_id);
        Ok(product)
    }

    /// Handle to a product's record. Callers lock it for the duration of
    /// one operation and must not hold it across awaits.
    pub fn record(&self, product_id: u64) -> Result<Arc<Mutex<AuctionRecord>>, AuctionError> {
        self.products
            .read()
            .unwrap()
            .get(&product_id)
            .cloned()
            .ok_or(AuctionError::ProductNotFound(product_id))
    }

    pub fn product_snapshot(&self, product_id: u64) -> Result<Product, AuctionError> {
        let record = self.record(product_id)?;
        let guard = record.lock().unwrap();
        Ok(guard.product.clone())
    }

    /// ACTIVE products whose end time has passed; feed for the close scan.
    pub fn expired_active_ids(&self, now: DateTime<Utc>) -> Vec<u64> {
        let handles: Vec<Arc<Mutex<AuctionRecord>>> =
            self.products.read().unwrap().values().cloned().collect();
        handles
            .into_iter()
            .filter_map(|handle| {
                let guard = handle.lock().unwrap();
                let p = &guard.product;
                (p.status == ProductStatus::Active && p.end_time <= now).then_some(p.id)
            })
            .collect()
    }

    pub fn append_description(
        &self,
        product_id: u64,
        seller_id: u64,
        addition: &str,
    ) -> Result<Product, AuctionError> {
        let record = self.record(product_id)?;
        let mut guard = record.lock().unwrap();
        if guard.product.seller_id != seller_id {
            return Err(AuctionError::PermissionDenied {
                user_id: seller_id,
                reason: "only the seller may edit the description".to_string(),
            });
        }
        // Append-only: revisions are separated by a dated marker
        let stamp = Utc::now().format("%Y-%m-%d %H:%M");
        guard.product.description = format!(
            "{}\n\n[{}] {}",
            guard.product.description, stamp, addition
        );
        Ok(guard.product.clone())
    }

    /// Bid history sorted by amount descending, bidder names masked.
    pub fn bid_history(&self, product_id: u64) -> Result<Vec<BidHistoryEntry>, AuctionError> {
        let record = self.record(product_id)?;
        let guard = record.lock().unwrap();
        let mut bids = guard.bids.clone();
        drop(guard);

        bids.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.placed_at.cmp(&b.placed_at)));
        Ok(bids
            .into_iter()
            .map(|b| BidHistoryEntry {
                bidder_name: self
                    .user(b.bidder_id)
                    .map(|u| u.masked_name())
                    .unwrap_or_else(|| "****".to_string()),
                amount: b.amount,
                status: b.status,
                placed_at: b.placed_at,
            })
            .collect())
    }

    pub fn suggested_price(&self, product_id: u64) -> Result<u64, AuctionError> {
        let record = self.record(product_id)?;
        let guard = record.lock().unwrap();
        Ok(guard.product.min_valid_price())
    }

    // ---- orders ----

    /// Insert a fresh order unless the product already has one; the
    /// existing order is returned in that case (idempotent create).
    pub fn insert_or_get_order(&self, order: Order) -> Order {
        let mut store = self.orders.lock().unwrap();
        if let Some(existing_id) = store.by_product.get(&order.product_id) {
            return store.by_id[existing_id].clone();
        }
        store.by_product.insert(order.product_id, order.id);
        store.by_id.insert(order.id, order.clone());
        info!("Order {} opened for product {}", order.id, order.product_id);
        order
    }

    pub fn order(&self, order_id: u64) -> Result<Order, AuctionError> {
        self.orders
            .lock()
            .unwrap()
            .by_id
            .get(&order_id)
            .cloned()
            .ok_or(AuctionError::OrderNotFound(order_id))
    }

    pub fn order_by_product(&self, product_id: u64) -> Option<Order> {
        let store = self.orders.lock().unwrap();
        let id = store.by_product.get(&product_id)?;
        store.by_id.get(id).cloned()
    }

    /// Run a closure against an order under the store lock. Gateway
    /// callbacks rely on this for their check-and-set idempotency.
    /// `updated_at` is bumped whenever the order changed, even when the
    /// closure also returns an error (e.g. a failed-payment mark).
    pub fn with_order_mut<R>(
        &self,
        order_id: u64,
        f: impl FnOnce(&mut Order) -> Result<R, AuctionError>,
    ) -> Result<R, AuctionError> {
        let mut store = self.orders.lock().unwrap();
        let order = store
            .by_id
            .get_mut(&order_id)
            .ok_or(AuctionError::OrderNotFound(order_id))?;
        let before = order.clone();
        let result = f(order);
        if result.is_ok() || *order != before {
            order.updated_at = Utc::now();
        }
        result
    }

    // ---- feedback ----

    pub fn record_feedback(&self, feedback: Feedback) {
        let mut store = self.feedback.lock().unwrap();
        store
            .aggregates
            .entry(feedback.to_user_id)
            .or_default()
            .record(feedback.score);
        store.entries.push(feedback);
    }

    pub fn feedback_aggregate(&self, user_id: u64) -> FeedbackAggregate {
        self.feedback
            .lock()
            .unwrap()
            .aggregates
            .get(&user_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn has_feedback_from(&self, from_user_id: u64, product_id: u64) -> bool {
        self.feedback
            .lock()
            .unwrap()
            .entries
            .iter()
            .any(|f| f.from_user_id == from_user_id && f.product_id == product_id)
    }

    // ---- questions ----

    pub fn insert_question(&self, question: ProductQuestion) {
        self.questions.lock().unwrap().insert(question.id, question);
    }

    pub fn question(&self, question_id: u64) -> Result<ProductQuestion, AuctionError> {
        self.questions
            .lock()
            .unwrap()
            .get(&question_id)
            .cloned()
            .ok_or(AuctionError::QuestionNotFound(question_id))
    }

    pub fn set_answer(&self, question_id: u64, answer: String) -> Result<ProductQuestion, AuctionError> {
        let mut store = self.questions.lock().unwrap();
        let question = store
            .get_mut(&question_id)
            .ok_or(AuctionError::QuestionNotFound(question_id))?;
        question.answer = Some(answer);
        Ok(question.clone())
    }
}
