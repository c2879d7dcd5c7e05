//! Per-call request envelope carrying the one-shot retry marker

use transport::RequestDescriptor;
use uuid::Uuid;

/// Where an envelope is in its retry budget. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retried,
}

/// One call site's request plus its retry state.
#[derive(Debug)]
pub struct RequestEnvelope {
    id: Uuid,
    target: RequestDescriptor,
    attempt: Attempt,
}

impl RequestEnvelope {
    pub fn new(target: RequestDescriptor) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            attempt: Attempt::First,
        }
    }

    /// Correlation id for logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &RequestDescriptor {
        &self.target
    }

    pub fn retried(&self) -> bool {
        self.attempt == Attempt::Retried
    }

    /// Spend the retry. Returns `false` if it was already spent.
    pub fn mark_retried(&mut self) -> bool {
        match self.attempt {
            Attempt::First => {
                self.attempt = Attempt::Retried;
                true
            }
            Attempt::Retried => false,
        }
    }
}
