//! In-process gateway for local runs and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CreateIntent, GatewayError, GatewayIntent, IntentStatus, PaymentGateway};

/// Intents start in `requires_payment_method`; tests drive them forward with
/// [`SandboxGateway::set_status`].
#[derive(Default)]
pub struct SandboxGateway {
    intents: Mutex<HashMap<String, (CreateIntent, GatewayIntent)>>,
    created: AtomicUsize,
    lookups_down: AtomicBool,
}

impl SandboxGateway {
    pub fn new() -> Self { Self::default() }

    pub fn created_count(&self) -> usize { self.created.load(Ordering::SeqCst) }

    pub async fn set_status(&self, id: &str, status: IntentStatus) -> Result<(), GatewayError> {
        let mut intents = self.intents.lock().await;
        let (_, intent) = intents.get_mut(id).ok_or_else(|| GatewayError::UnknownIntent(id.to_string()))?;
        intent.status = status;
        Ok(())
    }

    /// The request an intent was created with.
    pub async fn request_for(&self, id: &str) -> Option<CreateIntent> {
        self.intents.lock().await.get(id).map(|(req, _)| req.clone())
    }

    /// Makes every lookup fail until switched back.
    pub fn set_lookups_down(&self, down: bool) { self.lookups_down.store(down, Ordering::SeqCst); }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_intent(&self, request: CreateIntent) -> Result<GatewayIntent, GatewayError> {
        if request.amount_minor <= 0 {
            return Err(GatewayError::Rejected { status: 400, message: "Amount must be at least 1".into() });
        }
        let id = format!("pi_{}", Uuid::new_v4().simple());
        let intent = GatewayIntent {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret_{}", Uuid::new_v4().simple())),
            status: IntentStatus::RequiresPaymentMethod,
        };
        self.intents.lock().await.insert(id, (request, intent.clone()));
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(intent)
    }

    async fn retrieve_intent(&self, id: &str) -> Result<GatewayIntent, GatewayError> {
        if self.lookups_down.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected { status: 503, message: "sandbox lookups disabled".into() });
        }
        self.intents
            .lock()
            .await
            .get(id)
            .map(|(_, intent)| intent.clone())
            .ok_or_else(|| GatewayError::UnknownIntent(id.to_string()))
    }
}
