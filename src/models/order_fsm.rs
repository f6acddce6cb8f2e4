use serde::{Deserialize, Serialize};
use std::fmt;

/// States of the settlement lifecycle of a won auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderState {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events driving the settlement FSM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    ConfirmPayment,
    Ship,
    ConfirmDelivery,
    Cancel,
}

/// The Finite State Machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStateMachine {
    state: OrderState,
}

impl OrderStateMachine {
    /// Create new FSM in initial state
    pub fn new() -> Self {
        Self { state: OrderState::Pending }
    }

    /// Resume an FSM from a stored state
    pub fn from_state(state: OrderState) -> Self {
        Self { state }
    }

    /// Access current state
    pub fn state(&self) -> OrderState {
        self.state
    }

    /// Consumes an event and transitions the state.
    /// Returns Ok previous_state on success, Err if invalid transition.
    pub fn consume(&mut self, event: OrderEvent) -> Result<OrderState, String> {
        let prev_state = self.state;
        let new_state = match (prev_state, event) {
            // Transitions from Pending
            (OrderState::Pending, OrderEvent::ConfirmPayment) => OrderState::Paid,
            // Receipt-paid orders ship before any gateway confirmation
            (OrderState::Pending, OrderEvent::Ship) => OrderState::Shipped,
            (OrderState::Pending, OrderEvent::Cancel) => OrderState::Cancelled,

            // Transitions from Paid
            (OrderState::Paid, OrderEvent::Ship) => OrderState::Shipped,
            (OrderState::Paid, OrderEvent::Cancel) => OrderState::Cancelled,

            // Transitions from Shipped
            (OrderState::Shipped, OrderEvent::ConfirmDelivery) => OrderState::Delivered,
            (OrderState::Shipped, OrderEvent::Cancel) => OrderState::Cancelled,

            // Terminal states
            (OrderState::Delivered, _) => return Err(format!("Cannot transition from terminal state Delivered with event {:?}", event)),
            (OrderState::Cancelled, _) => return Err(format!("Cannot transition from terminal state Cancelled with event {:?}", event)),

            // Invalid
            _ => return Err(format!("Invalid transition from {:?} with event {:?}", prev_state, event)),
        };

        self.state = new_state;
        Ok(prev_state)
    }

    /// Check if terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, OrderState::Delivered | OrderState::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        self.state.as_str()
    }
}

impl Default for OrderStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut fsm = OrderStateMachine::new();
        assert_eq!(fsm.state(), OrderState::Pending);

        assert_eq!(fsm.consume(OrderEvent::ConfirmPayment).unwrap(), OrderState::Pending);
        assert_eq!(fsm.state(), OrderState::Paid);

        assert_eq!(fsm.consume(OrderEvent::Ship).unwrap(), OrderState::Paid);
        assert_eq!(fsm.state(), OrderState::Shipped);

        assert_eq!(fsm.consume(OrderEvent::ConfirmDelivery).unwrap(), OrderState::Shipped);
        assert_eq!(fsm.state(), OrderState::Delivered);
        assert!(fsm.is_terminal());
    }

    #[test]
    fn test_cancel_paths() {
        for start in [OrderState::Pending, OrderState::Paid, OrderState::Shipped] {
            let mut fsm = OrderStateMachine::from_state(start);
            fsm.consume(OrderEvent::Cancel).unwrap();
            assert_eq!(fsm.state(), OrderState::Cancelled);
            assert!(fsm.is_terminal());
        }
    }

    #[test]
    fn test_ship_from_pending() {
        let mut fsm = OrderStateMachine::new();
        assert_eq!(fsm.consume(OrderEvent::Ship).unwrap(), OrderState::Pending);
        assert_eq!(fsm.state(), OrderState::Shipped);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut fsm = OrderStateMachine::new();
        assert!(fsm.consume(OrderEvent::ConfirmDelivery).is_err());
        // State must be unchanged after a rejected event
        assert_eq!(fsm.state(), OrderState::Pending);

        let mut shipped = OrderStateMachine::from_state(OrderState::Shipped);
        assert!(shipped.consume(OrderEvent::ConfirmPayment).is_err());
        assert_eq!(shipped.state(), OrderState::Shipped);
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let mut delivered = OrderStateMachine::from_state(OrderState::Delivered);
        assert!(delivered.consume(OrderEvent::Cancel).is_err());

        let mut cancelled = OrderStateMachine::from_state(OrderState::Cancelled);
        assert!(cancelled.consume(OrderEvent::ConfirmPayment).is_err());
    }
}
