use std::sync::{Arc, Mutex};

use super::domain::Payment;

/// Outbound hook for the payment-processing collaborator.
pub trait PaymentPublisher: Send + Sync {
    fn publish(&self, payment: &Payment) -> Result<(), PublishError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("payment transport unavailable: {0}")]
    Transport(String),
}

/// Collects published payments in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPaymentPublisher {
    events: Arc<Mutex<Vec<Payment>>>,
}

impl InMemoryPaymentPublisher {
    pub fn events(&self) -> Vec<Payment> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl PaymentPublisher for InMemoryPaymentPublisher {
    fn publish(&self, payment: &Payment) -> Result<(), PublishError> {
        let mut guard = self
            .events
            .lock()
            .map_err(|_| PublishError::Transport("publisher lock poisoned".to_string()))?;
        guard.push(payment.clone());
        Ok(())
    }
}
