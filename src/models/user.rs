use serde::{Deserialize, Serialize};

/// Profile data synced from the account service. The settlement core
/// only needs names (for masked history) and emails (for notifications).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub full_name: String,
    pub email: String,
}

impl UserProfile {
    /// Public rendering of a bidder in history: "**** {last name}".
    pub fn masked_name(&self) -> String {
        match self.full_name.split_whitespace().last() {
            Some(last) => format!("**** {}", last),
            None => "****".to_string(),
        }
    }
}
