//! Payment Service
//!
//! Every payment is a local record mirroring one gateway intent. Before a new
//! intent is created for an order, the order's active payment (if any) is
//! reconciled against the gateway so a customer is never charged twice.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus, Payment, PaymentError, PaymentStatus};
use crate::domain::value_objects::{to_minor_units, Lifecycle};
use crate::gateway::{CreateIntent, GatewayIntent, IntentStatus, PaymentGateway};
use crate::messaging::{publish_all, EventPublisher};
use crate::services::not_found;
use crate::services::orders::order_error;
use crate::services::views::{single, IntentCreated, Joiner, PaymentView};
use crate::store::{Filter, Sort, StoreError, Stores};
use crate::{CoreError, Result};

/// Outcome of checking an existing CREATED payment with the gateway.
enum Reconciled {
    /// The intent can still be completed with this secret.
    Reuse(String),
    /// The old attempt is dead; a new intent may be created.
    Replace,
}

#[derive(Clone)]
pub struct PaymentService {
    stores: Stores,
    gateway: Arc<dyn PaymentGateway>,
    events: Arc<dyn EventPublisher>,
    currency: String,
}

impl PaymentService {
    pub fn new(stores: Stores, gateway: Arc<dyn PaymentGateway>, events: Arc<dyn EventPublisher>, currency: impl Into<String>) -> Self {
        Self { stores, gateway, events, currency: currency.into().to_uppercase() }
    }

    async fn load_order(&self, order_id: Uuid) -> Result<Order> {
        self.stores.orders.find_by_id(order_id).await?.ok_or_else(|| not_found("Order", order_id))
    }

    async fn active_payment(&self, order_id: Uuid) -> Result<Option<Payment>> {
        let payments = self.stores.payments.find(Filter::all().eq("order_id", order_id), Sort::NewestFirst).await?;
        Ok(payments.into_iter().find(|p| p.status().is_active()))
    }

    async fn save_payment(&self, mut payment: Payment) -> Result<Payment> {
        let events = payment.take_events();
        let payment = self.stores.payments.save(payment).await?;
        publish_all(self.events.as_ref(), events).await;
        Ok(payment)
    }

    /// Marks the payment SUCCESS and its order PAID.
    ///
    /// An order that can no longer become PAID leaves the payment CREATED so
    /// the captured charge stays visible for a manual refund.
    async fn settle(&self, mut payment: Payment) -> Result<Payment> {
        let mut order = self.load_order(payment.order_id()).await?;
        if order.status() != OrderStatus::Paid && !order.status().can_become(OrderStatus::Paid) {
            warn!(payment_id = %payment.id(), order_id = %order.id(), status = %order.status(), "gateway charge succeeded for an order that cannot be paid");
            return Err(CoreError::Invalid(format!(
                "Order {} is {} and cannot be marked PAID; payment {} needs a refund",
                order.id(),
                order.status(),
                payment.id()
            )));
        }
        payment.mark_succeeded().map_err(payment_error)?;
        let payment = self.save_payment(payment).await?;
        if order.status() != OrderStatus::Paid {
            order.mark_paid().map_err(order_error)?;
            let events = order.take_events();
            self.stores.orders.save(order).await?;
            publish_all(self.events.as_ref(), events).await;
        }
        info!(payment_id = %payment.id(), order_id = %payment.order_id(), "payment succeeded, order paid");
        Ok(payment)
    }

    async fn fail(&self, mut payment: Payment, reason: String) -> Result<Payment> {
        payment.mark_failed(reason.clone()).map_err(payment_error)?;
        let payment = self.save_payment(payment).await?;
        warn!(payment_id = %payment.id(), order_id = %payment.order_id(), %reason, "payment marked failed");
        Ok(payment)
    }

    async fn reconcile(&self, existing: Payment) -> Result<Reconciled> {
        match existing.status() {
            PaymentStatus::Success => {
                return Err(CoreError::Invalid(format!("Order {} is already paid", existing.order_id())));
            }
            PaymentStatus::Failed => return Ok(Reconciled::Replace),
            PaymentStatus::Created => {}
        }
        let intent = match self.gateway.retrieve_intent(existing.external_intent_id()).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(payment_id = %existing.id(), error = %e, "could not look up existing payment intent");
                self.fail(existing, format!("gateway lookup failed: {e}")).await?;
                return Ok(Reconciled::Replace);
            }
        };
        match intent.status {
            ref s if s.is_awaiting_customer() => Ok(Reconciled::Reuse(client_secret(&intent)?)),
            IntentStatus::Succeeded => {
                let order_id = existing.order_id();
                self.settle(existing).await?;
                Err(CoreError::Invalid(format!("Payment for order {order_id} already completed")))
            }
            IntentStatus::Canceled | IntentStatus::RequiresCapture => {
                self.fail(existing, format!("gateway status {}", intent.status)).await?;
                Ok(Reconciled::Replace)
            }
            ref other => Err(CoreError::Upstream(format!(
                "Payment intent {} is in unexpected state {other}",
                existing.external_intent_id()
            ))),
        }
    }

    /// Starts (or resumes) payment of a PENDING order owned by the caller.
    #[instrument(skip(self))]
    pub async fn create_intent(&self, user_id: Uuid, order_id: Uuid) -> Result<IntentCreated> {
        let order = self.load_order(order_id).await?;
        if !order.is_owned_by(user_id) {
            return Err(CoreError::Forbidden(format!("Order {order_id} does not belong to user {user_id}")));
        }
        if order.status() != OrderStatus::Pending {
            return Err(CoreError::Invalid(format!("Order {order_id} is {}, expected PENDING", order.status())));
        }

        if let Some(existing) = self.active_payment(order_id).await? {
            if let Reconciled::Reuse(client_secret) = self.reconcile(existing.clone()).await? {
                info!(payment_id = %existing.id(), "reusing awaiting payment intent");
                return Ok(IntentCreated { payment_id: existing.id(), client_secret, amount: existing.amount(), currency: existing.currency().to_string() });
            }
        }

        let amount_minor = to_minor_units(order.total_amount())
            .ok_or_else(|| CoreError::Invalid(format!("Order total {} cannot be charged", order.total_amount())))?;
        let intent = self
            .gateway
            .create_intent(CreateIntent {
                amount_minor,
                currency: self.currency.clone(),
                description: format!("Payment for Order #{order_id}"),
                metadata: BTreeMap::from([("order_id".to_string(), order_id.to_string()), ("user_id".to_string(), user_id.to_string())]),
            })
            .await?;
        let client_secret = client_secret(&intent)?;

        let mut payment = Payment::open(user_id, order_id, order.total_amount(), self.currency.clone(), intent.id.clone());
        let events = payment.take_events();
        match self.stores.payments.create(payment).await {
            Ok(payment) => {
                info!(payment_id = %payment.id(), intent_id = %intent.id, amount_minor, "payment intent created");
                publish_all(self.events.as_ref(), events).await;
                Ok(IntentCreated { payment_id: payment.id(), client_secret, amount: payment.amount(), currency: payment.currency().to_string() })
            }
            Err(StoreError::Conflict { key, .. }) => {
                warn!(%order_id, %key, intent_id = %intent.id, "concurrent payment intent won, re-reading");
                self.resume_winner(order_id, key).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the secret of the payment that beat us to the active slot, if
    /// it can still be completed.
    async fn resume_winner(&self, order_id: Uuid, key: String) -> Result<IntentCreated> {
        let conflict = || CoreError::Conflict(format!("Another payment for order {order_id} is in progress ({key})"));
        let Some(winner) = self.active_payment(order_id).await? else { return Err(conflict()) };
        if winner.status() != PaymentStatus::Created {
            return Err(conflict());
        }
        let intent = self.gateway.retrieve_intent(winner.external_intent_id()).await?;
        if !intent.status.is_awaiting_customer() {
            return Err(conflict());
        }
        Ok(IntentCreated { payment_id: winner.id(), client_secret: client_secret(&intent)?, amount: winner.amount(), currency: winner.currency().to_string() })
    }

    /// Verifies a completed intent with the gateway and marks the order PAID.
    #[instrument(skip(self))]
    pub async fn confirm(&self, user_id: Uuid, order_id: Uuid, external_intent_id: &str) -> Result<PaymentView> {
        let filter = Filter::all().eq("external_intent_id", external_intent_id).eq("order_id", order_id).eq("owner_id", user_id);
        let payment = self
            .stores
            .payments
            .find_one(filter, Sort::NewestFirst)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Payment record for intent {external_intent_id} not found")))?;
        match payment.status() {
            PaymentStatus::Success => return Err(CoreError::Invalid(format!("Payment {} is already confirmed", payment.id()))),
            PaymentStatus::Failed => return Err(CoreError::Invalid(format!("Payment {} has already failed", payment.id()))),
            PaymentStatus::Created => {}
        }

        let intent = self.gateway.retrieve_intent(external_intent_id).await?;
        if intent.status != IntentStatus::Succeeded {
            let status = intent.status.to_string();
            self.fail(payment, format!("gateway status {status}")).await?;
            return Err(CoreError::Invalid(format!("Payment failed. Gateway status: {status}")));
        }

        let payment = self.settle(payment).await?;
        single(Joiner::new(&self.stores).payments(vec![payment]).await?)
    }

    pub async fn by_id(&self, payment_id: Uuid) -> Result<PaymentView> {
        let payment = self.stores.payments.find_by_id(payment_id).await?.ok_or_else(|| not_found("Payment", payment_id))?;
        single(Joiner::new(&self.stores).payments(vec![payment]).await?)
    }

    pub async fn by_user(&self, user_id: Uuid) -> Result<Vec<PaymentView>> {
        let payments = self.stores.payments.find(Filter::all().eq("owner_id", user_id), Sort::NewestFirst).await?;
        Joiner::new(&self.stores).payments(payments).await
    }

    pub async fn all(&self) -> Result<Vec<PaymentView>> {
        let payments = self.stores.payments.find(Filter::all(), Sort::NewestFirst).await?;
        Joiner::new(&self.stores).payments(payments).await
    }
}

fn client_secret(intent: &GatewayIntent) -> Result<String> {
    intent.client_secret.clone().ok_or_else(|| CoreError::Upstream(format!("Payment intent {} has no client secret", intent.id)))
}

fn payment_error(err: PaymentError) -> CoreError {
    CoreError::Invalid(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product;
    use crate::gateway::{GatewayError, SandboxGateway};
    use crate::services::testing::Harness;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use crate::ErrorKind;
    use rust_decimal::Decimal;

    async fn stored(h: &Harness, payment_id: Uuid) -> Payment {
        h.stores.payments.find_by_id(payment_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_create_intent_guards() {
        let h = Harness::new();
        let customer = h.customer().await;
        let stranger = h.customer().await;
        let panel = h.product(100).await;
        let order = h.order(customer, &panel).await;
        let payments = &h.services.payments;
        assert_eq!(payments.create_intent(customer.id, Uuid::new_v4()).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(payments.create_intent(stranger.id, order.id).await.unwrap_err().kind(), ErrorKind::Forbidden);
        h.services.orders.cancel(order.id, &customer).await.unwrap();
        assert_eq!(payments.create_intent(customer.id, order.id).await.unwrap_err().kind(), ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn test_awaiting_intent_is_reused() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(15000).await;
        let order = h.order(customer, &panel).await;
        let first = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
        let second = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.currency, "INR");
        assert_eq!(h.gateway.created_count(), 1);
    }

    #[tokio::test]
    async fn test_canceled_intent_is_replaced() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(100).await;
        let order = h.order(customer, &panel).await;
        let first = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
        let old = stored(&h, first.payment_id).await;
        h.gateway.set_status(old.external_intent_id(), IntentStatus::Canceled).await.unwrap();

        let second = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
        assert_ne!(first.payment_id, second.payment_id);
        assert_eq!(stored(&h, first.payment_id).await.status(), PaymentStatus::Failed);
        assert_eq!(h.gateway.created_count(), 2);
        let active: Vec<_> = h.services.payments.by_user(customer.id).await.unwrap().into_iter().filter(|p| p.status.is_active()).collect();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_marks_failed_and_replaces() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(100).await;
        let order = h.order(customer, &panel).await;
        let first = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
        h.gateway.set_lookups_down(true);
        let second = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
        assert_ne!(first.payment_id, second.payment_id);
        assert_eq!(stored(&h, first.payment_id).await.status(), PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_succeeded_intent_settles_order() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(100).await;
        let order = h.order(customer, &panel).await;
        let first = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
        let payment = stored(&h, first.payment_id).await;
        h.gateway.set_status(payment.external_intent_id(), IntentStatus::Succeeded).await.unwrap();

        let err = h.services.payments.create_intent(customer.id, order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(stored(&h, first.payment_id).await.status(), PaymentStatus::Success);
        assert_eq!(h.services.orders.by_id(order.id).await.unwrap().status, OrderStatus::Paid);
        assert_eq!(h.gateway.created_count(), 1);
    }

    #[tokio::test]
    async fn test_unexpected_status_is_upstream_failure() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(100).await;
        let order = h.order(customer, &panel).await;
        let first = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
        let payment = stored(&h, first.payment_id).await;
        h.gateway.set_status(payment.external_intent_id(), IntentStatus::Other("processing".into())).await.unwrap();
        let err = h.services.payments.create_intent(customer.id, order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
        assert_eq!(stored(&h, first.payment_id).await.status(), PaymentStatus::Created);
    }

    #[tokio::test]
    async fn test_confirm() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(100).await;
        let order = h.order(customer, &panel).await;
        let intent = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
        let ext = stored(&h, intent.payment_id).await.external_intent_id().to_string();
        let payments = &h.services.payments;

        assert_eq!(payments.confirm(customer.id, order.id, "pi_unknown").await.unwrap_err().kind(), ErrorKind::NotFound);
        h.gateway.set_status(&ext, IntentStatus::Succeeded).await.unwrap();
        let view = payments.confirm(customer.id, order.id, &ext).await.unwrap();
        assert_eq!(view.status, PaymentStatus::Success);
        assert_eq!(view.amount, Decimal::new(100, 0));
        assert_eq!(view.order.map(|o| o.status), Some(OrderStatus::Paid));
        assert_eq!(payments.confirm(customer.id, order.id, &ext).await.unwrap_err().kind(), ErrorKind::Invalid);
        assert!(h.events.subjects().await.contains(&"order.paid".to_string()));
    }

    #[tokio::test]
    async fn test_confirm_unsucceeded_marks_failed() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(100).await;
        let order = h.order(customer, &panel).await;
        let intent = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
        let ext = stored(&h, intent.payment_id).await.external_intent_id().to_string();

        let err = h.services.payments.confirm(customer.id, order.id, &ext).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(err.to_string().contains("requires_payment_method"));
        assert_eq!(stored(&h, intent.payment_id).await.status(), PaymentStatus::Failed);
        assert_eq!(h.services.orders.by_id(order.id).await.unwrap().status, OrderStatus::Pending);
        // Terminal
        assert_eq!(h.services.payments.confirm(customer.id, order.id, &ext).await.unwrap_err().kind(), ErrorKind::Invalid);
    }

    /// Stores a competing CREATED payment for the order the first time an
    /// intent is requested, as a concurrent checkout would.
    struct RacingGateway {
        inner: Arc<SandboxGateway>,
        stores: Stores,
        winner_status: IntentStatus,
        raced: AtomicBool,
    }

    #[async_trait]
    impl PaymentGateway for RacingGateway {
        async fn create_intent(&self, request: CreateIntent) -> std::result::Result<GatewayIntent, GatewayError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                let winner = self.inner.create_intent(request.clone()).await?;
                self.inner.set_status(&winner.id, self.winner_status.clone()).await?;
                let owner_id = request.metadata["user_id"].parse().unwrap();
                let order_id = request.metadata["order_id"].parse().unwrap();
                self.stores.payments.create(Payment::open(owner_id, order_id, Decimal::ONE, "INR", winner.id)).await.unwrap();
            }
            self.inner.create_intent(request).await
        }

        async fn retrieve_intent(&self, id: &str) -> std::result::Result<GatewayIntent, GatewayError> {
            self.inner.retrieve_intent(id).await
        }
    }

    fn racing_payments(h: &Harness, winner_status: IntentStatus) -> PaymentService {
        let gateway = RacingGateway { inner: h.gateway.clone(), stores: h.stores.clone(), winner_status, raced: AtomicBool::new(false) };
        PaymentService::new(h.stores.clone(), Arc::new(gateway), h.events.clone(), "INR")
    }

    #[tokio::test]
    async fn test_lost_race_resumes_awaiting_winner() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(100).await;
        let order = h.order(customer, &panel).await;
        let payments = racing_payments(&h, IntentStatus::RequiresPaymentMethod);

        let resumed = payments.create_intent(customer.id, order.id).await.unwrap();
        let winner = stored(&h, resumed.payment_id).await;
        let winner_intent = h.gateway.retrieve_intent(winner.external_intent_id()).await.unwrap();
        assert_eq!(Some(resumed.client_secret), winner_intent.client_secret);
        assert_eq!(h.stores.payments.find(Filter::all().eq("order_id", order.id), Sort::NewestFirst).await.unwrap().len(), 1);
        assert_eq!(h.gateway.created_count(), 2);
    }

    #[tokio::test]
    async fn test_lost_race_to_finished_winner_is_conflict() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(100).await;
        let order = h.order(customer, &panel).await;
        let payments = racing_payments(&h, IntentStatus::Succeeded);

        let err = payments.create_intent(customer.id, order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(h.services.orders.by_id(order.id).await.unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_charge_on_cancelled_order_is_not_settled() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(100).await;
        let order = h.order(customer, &panel).await;
        let intent = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
        let ext = stored(&h, intent.payment_id).await.external_intent_id().to_string();
        h.services.orders.cancel(order.id, &customer).await.unwrap();
        h.gateway.set_status(&ext, IntentStatus::Succeeded).await.unwrap();

        let err = h.services.payments.confirm(customer.id, order.id, &ext).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(err.to_string().contains("CANCELLED"));
        assert_eq!(stored(&h, intent.payment_id).await.status(), PaymentStatus::Created);
        assert_eq!(h.services.orders.by_id(order.id).await.unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_uncharged_total_is_invalid() {
        let h = Harness::new();
        let customer = h.customer().await;
        let pricey = h.stores.products.create(product::sample("Utility 1GW", Decimal::from_i128_with_scale(10_i128.pow(27), 0))).await.unwrap();
        let order = h.order(customer, &pricey).await;
        let err = h.services.payments.create_intent(customer.id, order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(h.gateway.created_count(), 0);
    }

    #[tokio::test]
    async fn test_active_payment_unique_per_order() {
        let h = Harness::new();
        let customer = h.customer().await;
        let order_id = Uuid::new_v4();
        h.stores.payments.create(Payment::open(customer.id, order_id, Decimal::ONE, "INR", "pi_a")).await.unwrap();
        let err = h.stores.payments.create(Payment::open(customer.id, order_id, Decimal::ONE, "INR", "pi_b")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_reads() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(100).await;
        let order = h.order(customer, &panel).await;
        let intent = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
        let view = h.services.payments.by_id(intent.payment_id).await.unwrap();
        assert_eq!(view.user.map(|u| u.id), Some(customer.id));
        assert_eq!(h.services.payments.all().await.unwrap().len(), 1);
        assert_eq!(h.services.payments.by_id(Uuid::new_v4()).await.unwrap_err().kind(), ErrorKind::NotFound);
    }
}
