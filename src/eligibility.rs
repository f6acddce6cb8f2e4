use serde::Serialize;

use crate::errors::AuctionError;
use crate::ledger::AuctionLedger;
use crate::models::FeedbackAggregate;

/// A bidder needs at least this share of positive feedback to bid.
pub const MIN_POSITIVE_RATIO: f64 = 0.80;

#[derive(Debug, Clone, Serialize)]
pub struct EligibilityReport {
    pub eligible: bool,
    pub positive_count: u32,
    pub rating_count: u32,
    pub ratio: Option<f64>,
    pub reason: String,
}

/// Pure check over the aggregates. Users who were never rated are
/// allowed in (new-bidder exemption).
pub fn evaluate(agg: &FeedbackAggregate) -> EligibilityReport {
    match agg.positive_ratio() {
        None => EligibilityReport {
            eligible: true,
            positive_count: 0,
            rating_count: 0,
            ratio: None,
            reason: "New bidder allowed".to_string(),
        },
        Some(ratio) if ratio < MIN_POSITIVE_RATIO => EligibilityReport {
            eligible: false,
            positive_count: agg.positive_count,
            rating_count: agg.rating_count,
            ratio: Some(ratio),
            reason: format!("Positive feedback ratio {:.2} below {:.2}", ratio, MIN_POSITIVE_RATIO),
        },
        Some(ratio) => EligibilityReport {
            eligible: true,
            positive_count: agg.positive_count,
            rating_count: agg.rating_count,
            ratio: Some(ratio),
            reason: "Eligible".to_string(),
        },
    }
}

pub fn report_for(ledger: &AuctionLedger, bidder_id: u64) -> EligibilityReport {
    evaluate(&ledger.feedback_aggregate(bidder_id))
}

/// Gate used by the bid resolver; errors carry the counts so the client
/// can explain the rejection.
pub fn check_bidder(ledger: &AuctionLedger, bidder_id: u64) -> Result<(), AuctionError> {
    let agg = ledger.feedback_aggregate(bidder_id);
    let report = evaluate(&agg);
    if report.eligible {
        Ok(())
    } else {
        Err(AuctionError::IneligibleBidder {
            positive: agg.positive_count,
            total: agg.rating_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agg(positive: u32, total: u32) -> FeedbackAggregate {
        FeedbackAggregate {
            rating_score: 0,
            rating_count: total,
            positive_count: positive,
        }
    }

    #[test]
    fn test_new_bidder_exempt() {
        let report = evaluate(&agg(0, 0));
        assert!(report.eligible);
        assert_eq!(report.ratio, None);
    }

    #[test]
    fn test_ratio_boundary() {
        // 4 of 5 = exactly 0.80: allowed
        assert!(evaluate(&agg(4, 5)).eligible);
        // 3 of 4 = 0.75: rejected
        let report = evaluate(&agg(3, 4));
        assert!(!report.eligible);
        assert_eq!(report.ratio, Some(0.75));
    }

    #[test]
    fn test_check_bidder_error_carries_counts() {
        let ledger = AuctionLedger::new(1);
        let now = chrono::Utc::now();
        for score in [-1, -1, -1, 1] {
            ledger.record_feedback(crate::models::Feedback {
                from_user_id: 1,
                to_user_id: 9,
                product_id: 1,
                score,
                comment: String::new(),
                created_at: now,
            });
        }
        match check_bidder(&ledger, 9) {
            Err(AuctionError::IneligibleBidder { positive, total }) => {
                assert_eq!(positive, 1);
                assert_eq!(total, 4);
            }
            other => panic!("expected IneligibleBidder, got {:?}", other),
        }
    }
}
