//! Hosted-checkout stand-in for development and tests.
//!
//! Sessions start `open`; `mark_paid` plays the part of the shopper completing the
//! hosted page.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::services::checkout::{CheckoutRequest, CheckoutSession, PaymentError, PaymentSession, PaymentState};
use crate::ports::PaymentGateway;

pub struct SandboxGateway {
    base_url: String,
    sessions: Mutex<HashMap<String, PaymentSession>>,
}

impl Default for SandboxGateway {
    fn default() -> Self { Self::new("https://sandbox.checkout.local") }
}

impl SandboxGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), sessions: Mutex::new(HashMap::new()) }
    }

    pub fn mark_paid(&self, session_id: &str) -> Result<(), PaymentError> { self.set_state(session_id, PaymentState::Paid) }

    pub fn expire(&self, session_id: &str) -> Result<(), PaymentError> { self.set_state(session_id, PaymentState::Expired) }

    /// Lets tests simulate a provider that lost or mangled the metadata.
    pub fn edit_metadata(&self, session_id: &str, f: impl FnOnce(&mut std::collections::BTreeMap<String, String>)) -> Result<(), PaymentError> {
        let mut sessions = self.sessions.lock().map_err(|_| PaymentError::Unavailable("sandbox lock poisoned".into()))?;
        let session = sessions.get_mut(session_id).ok_or_else(|| PaymentError::UnknownSession(session_id.to_string()))?;
        f(&mut session.metadata);
        Ok(())
    }

    fn set_state(&self, session_id: &str, state: PaymentState) -> Result<(), PaymentError> {
        let mut sessions = self.sessions.lock().map_err(|_| PaymentError::Unavailable("sandbox lock poisoned".into()))?;
        let session = sessions.get_mut(session_id).ok_or_else(|| PaymentError::UnknownSession(session_id.to_string()))?;
        session.state = state;
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, PaymentError> {
        if request.line_items.is_empty() {
            return Err(PaymentError::Rejected("no line items".into()));
        }
        if let Some(item) = request.line_items.iter().find(|l| l.quantity == 0 || !l.unit_price.is_positive()) {
            return Err(PaymentError::Rejected(format!("line {} has no chargeable amount", item.id)));
        }
        let session_id = format!("cs_test_{}", Uuid::new_v4().simple());
        let session = PaymentSession {
            session_id: session_id.clone(),
            state: PaymentState::Open,
            amount_total: request.amount_total(),
            metadata: request.metadata.clone(),
        };
        self.sessions
            .lock()
            .map_err(|_| PaymentError::Unavailable("sandbox lock poisoned".into()))?
            .insert(session_id.clone(), session);
        tracing::debug!(%session_id, amount = %request.amount_total(), "sandbox session created");
        Ok(CheckoutSession { redirect_url: format!("{}/pay/{session_id}", self.base_url), session_id })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<PaymentSession, PaymentError> {
        self.sessions
            .lock()
            .map_err(|_| PaymentError::Unavailable("sandbox lock poisoned".into()))?
            .get(session_id)
            .cloned()
            .ok_or_else(|| PaymentError::UnknownSession(session_id.to_string()))
    }
}
