use std::sync::Arc;

use chrono::Utc;

use crate::errors::AuctionError;
use crate::fanout::Notifier;
use crate::ledger::AuctionLedger;
use crate::models::{
    NewAnswerNote, NewQuestionNote, NotificationEvent, ProductQuestion,
};

fn product_url(product_id: u64) -> String {
    format!("/products/{}", product_id)
}

/// Q&A between prospective bidders and the seller of a listing.
#[derive(Clone)]
pub struct QuestionDesk {
    ledger: Arc<AuctionLedger>,
    notifier: Notifier,
}

impl QuestionDesk {
    pub fn new(ledger: Arc<AuctionLedger>, notifier: Notifier) -> Self {
        Self { ledger, notifier }
    }

    pub fn ask_question(
        &self,
        product_id: u64,
        asker_id: u64,
        text: String,
    ) -> Result<ProductQuestion, AuctionError> {
        let product = self.ledger.product_snapshot(product_id)?;
        if product.seller_id == asker_id {
            return Err(AuctionError::PermissionDenied {
                user_id: asker_id,
                reason: "sellers answer questions, they do not ask them".to_string(),
            });
        }

        let question = ProductQuestion {
            id: self.ledger.next_id(),
            product_id,
            asker_id,
            question: text.clone(),
            answer: None,
            created_at: Utc::now(),
        };
        self.ledger.insert_question(question.clone());

        self.notifier
            .notify(NotificationEvent::NewQuestion(NewQuestionNote {
                product_name: product.name,
                seller_email: self.ledger.user_email(product.seller_id),
                question: text,
                product_url: product_url(product_id),
            }));

        Ok(question)
    }

    /// Answer once; the asker and everyone with a standing bid hear
    /// about it.
    pub fn answer_question(
        &self,
        question_id: u64,
        seller_id: u64,
        text: String,
    ) -> Result<ProductQuestion, AuctionError> {
        let question = self.ledger.question(question_id)?;
        let product = self.ledger.product_snapshot(question.product_id)?;
        if product.seller_id != seller_id {
            return Err(AuctionError::PermissionDenied {
                user_id: seller_id,
                reason: "only the seller may answer".to_string(),
            });
        }
        if question.answer.is_some() {
            return Err(AuctionError::AlreadyAnswered { question_id });
        }

        let answered = self.ledger.set_answer(question_id, text.clone())?;

        let record = self.ledger.record(question.product_id)?;
        let mut recipients: Vec<u64> = record.lock().unwrap().valid_bidder_ids();
        if !recipients.contains(&question.asker_id) {
            recipients.push(question.asker_id);
        }
        let emails: Vec<String> = recipients
            .into_iter()
            .map(|id| self.ledger.user_email(id))
            .filter(|e| !e.is_empty())
            .collect();

        self.notifier
            .notify(NotificationEvent::NewAnswer(NewAnswerNote {
                product_name: product.name,
                question: question.question,
                answer: text,
                emails,
            }));

        Ok(answered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::models::{Bid, BidStatus, NotificationEvent, UserProfile};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn harness() -> (QuestionDesk, Arc<AuctionLedger>, UnboundedReceiver<NotificationEvent>) {
        let ledger = Arc::new(AuctionLedger::new(1));
        let (notifier, rx) = Notifier::channel();
        (QuestionDesk::new(ledger.clone(), notifier), ledger, rx)
    }

    fn list_product(ledger: &AuctionLedger) -> u64 {
        let now = Utc::now();
        ledger
            .create_product(
                10,
                "bookshelf".to_string(),
                String::new(),
                100,
                10,
                None,
                now,
                now + Duration::hours(1),
                false,
            )
            .unwrap()
            .id
    }

    #[test]
    fn test_ask_and_answer_flow() {
        let (desk, ledger, mut rx) = harness();
        let product_id = list_product(&ledger);
        ledger.register_user(UserProfile {
            id: 7,
            full_name: "Pham Thu Ha".to_string(),
            email: "ha@example.com".to_string(),
        });

        let question = desk
            .ask_question(product_id, 7, "Any scratches?".to_string())
            .unwrap();
        assert_eq!(rx.try_recv().unwrap().kind(), "NEW_QUESTION");

        let answered = desk
            .answer_question(question.id, 10, "None at all".to_string())
            .unwrap();
        assert_eq!(answered.answer.as_deref(), Some("None at all"));
        match rx.try_recv().unwrap() {
            NotificationEvent::NewAnswer(note) => {
                assert!(note.emails.contains(&"ha@example.com".to_string()));
            }
            other => panic!("expected NewAnswer, got {:?}", other),
        }
    }

    #[test]
    fn test_answer_reaches_standing_bidders() {
        let (desk, ledger, mut rx) = harness();
        let product_id = list_product(&ledger);
        ledger.register_user(UserProfile {
            id: 8,
            full_name: "Vo Minh Tri".to_string(),
            email: "tri@example.com".to_string(),
        });
        {
            let record = ledger.record(product_id).unwrap();
            record.lock().unwrap().bids.push(Bid {
                id: ledger.next_id(),
                product_id,
                bidder_id: 8,
                amount: 120,
                max_amount: 120,
                status: BidStatus::Valid,
                placed_at: Utc::now(),
            });
        }

        let question = desk.ask_question(product_id, 9, "Dimensions?".to_string()).unwrap();
        let _ = rx.try_recv();
        desk.answer_question(question.id, 10, "2m x 1m".to_string()).unwrap();

        match rx.try_recv().unwrap() {
            NotificationEvent::NewAnswer(note) => {
                assert!(note.emails.contains(&"tri@example.com".to_string()));
            }
            other => panic!("expected NewAnswer, got {:?}", other),
        }
    }

    #[test]
    fn test_guards() {
        let (desk, ledger, _rx) = harness();
        let product_id = list_product(&ledger);

        assert!(matches!(
            desk.ask_question(product_id, 10, "self q".to_string()),
            Err(AuctionError::PermissionDenied { .. })
        ));

        let question = desk.ask_question(product_id, 7, "q".to_string()).unwrap();
        assert!(matches!(
            desk.answer_question(question.id, 99, "a".to_string()),
            Err(AuctionError::PermissionDenied { .. })
        ));

        desk.answer_question(question.id, 10, "a".to_string()).unwrap();
        assert!(matches!(
            desk.answer_question(question.id, 10, "again".to_string()),
            Err(AuctionError::AlreadyAnswered { .. })
        ));
    }
}
