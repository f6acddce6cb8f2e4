pub mod ban;
pub mod bidding;
pub mod configure;
pub mod eligibility;
pub mod errors;
pub mod fanout;
pub mod gateway;
pub mod id_gen;
pub mod ledger;
pub mod logger;
pub mod models;
pub mod payment;
pub mod questions;
pub mod scheduler;
pub mod settlement;
