use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One feedback entry left after a settled (or cancelled) transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub from_user_id: u64,
    pub to_user_id: u64,
    pub product_id: u64,
    pub score: i32,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Running per-user totals used by the eligibility check.
/// A score >= 0 counts as positive.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FeedbackAggregate {
    pub rating_score: i64,
    pub rating_count: u32,
    pub positive_count: u32,
}

impl FeedbackAggregate {
    pub fn record(&mut self, score: i32) {
        self.rating_count += 1;
        self.rating_score += score as i64;
        if score >= 0 {
            self.positive_count += 1;
        }
    }

    /// None when the user has never been rated.
    pub fn positive_ratio(&self) -> Option<f64> {
        if self.rating_count == 0 {
            return None;
        }
        Some(self.positive_count as f64 / self.rating_count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_tracks_positive_ratio() {
        let mut agg = FeedbackAggregate::default();
        assert_eq!(agg.positive_ratio(), None);

        agg.record(1);
        agg.record(1);
        agg.record(0);
        agg.record(-1);

        assert_eq!(agg.rating_count, 4);
        assert_eq!(agg.rating_score, 1);
        assert_eq!(agg.positive_count, 3);
        assert_eq!(agg.positive_ratio(), Some(0.75));
    }
}
