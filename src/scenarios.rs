//! End-to-end purchase flows over the in-memory store and sandbox gateway.

use rust_decimal::Decimal;

use crate::domain::aggregates::{InstallationStatus, OrderStatus, ProductPatch};
use crate::services::testing::Harness;
use crate::ErrorKind;

#[tokio::test]
async fn test_price_changes_never_reach_orders() {
    let h = Harness::new();
    let customer = h.customer().await;
    let panel = h.product(10000).await;

    let cart = h.services.carts.add_item(customer.id, panel.id(), 2).await.unwrap();
    assert_eq!(cart.total_amount, Decimal::new(20000, 0));

    let order = h.services.orders.create_from_cart(customer.id).await.unwrap();
    assert_eq!(order.total_amount, Decimal::new(20000, 0));
    assert_eq!(order.items[0].price_at_purchase, Decimal::new(10000, 0));

    h.services.catalog.update(panel.id(), ProductPatch { price: Some(Decimal::new(20000, 0)), ..Default::default() }).await.unwrap();
    let order = h.services.orders.by_id(order.id).await.unwrap();
    assert_eq!(order.items[0].price_at_purchase, Decimal::new(10000, 0));
    assert_eq!(order.total_amount, Decimal::new(20000, 0));
}

#[tokio::test]
async fn test_intent_amount_and_reuse() {
    let h = Harness::new();
    let customer = h.customer().await;
    let panel = h.product(15000).await;
    let order = h.order(customer, &panel).await;

    let first = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
    let payment = h.stores.payments.find_by_id(first.payment_id).await.unwrap().unwrap();
    let request = h.gateway.request_for(payment.external_intent_id()).await.unwrap();
    assert_eq!(request.amount_minor, 1_500_000);
    assert_eq!(request.currency, "INR");
    assert_eq!(request.metadata.get("order_id"), Some(&order.id.to_string()));

    let second = h.services.payments.create_intent(customer.id, order.id).await.unwrap();
    assert_eq!(second.client_secret, first.client_secret);
    assert_eq!(h.gateway.created_count(), 1);
}

#[tokio::test]
async fn test_installation_requires_paid_order_once() {
    let h = Harness::new();
    let customer = h.customer().await;
    let tech = h.technician().await;
    let panel = h.product(500).await;
    let order = h.order(customer, &panel).await;

    let err = h.services.installations.assign(order.id, tech.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    h.pay(customer, order.id).await;
    let inst = h.services.installations.assign(order.id, tech.id).await.unwrap();
    assert_eq!(inst.status, InstallationStatus::Pending);

    let err = h.services.installations.assign(order.id, tech.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(err.to_string().contains("already assigned"));
}

#[tokio::test]
async fn test_installation_cannot_move_backwards() {
    let h = Harness::new();
    let customer = h.customer().await;
    let tech = h.technician().await;
    let panel = h.product(500).await;
    let order = h.paid_order(customer, &panel).await;
    let inst = h.services.installations.assign(order.id, tech.id).await.unwrap();
    h.services.installations.update_status(inst.id, InstallationStatus::InProgress, None, tech.id).await.unwrap();

    let err = h.services.installations.update_status(inst.id, InstallationStatus::Pending, None, tech.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(err.to_string().contains("COMPLETED"));
}

#[tokio::test]
async fn test_review_only_after_completion_and_once() {
    let h = Harness::new();
    let customer = h.customer().await;
    let tech = h.technician().await;
    let panel = h.product(500).await;
    let order = h.paid_order(customer, &panel).await;
    let inst = h.services.installations.assign(order.id, tech.id).await.unwrap();
    let reviews = &h.services.reviews;

    let err = reviews.add_for_order(customer.id, order.id, 5, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    h.services.installations.update_status(inst.id, InstallationStatus::InProgress, None, tech.id).await.unwrap();
    let err = reviews.add_for_order(customer.id, order.id, 5, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    h.services.installations.update_status(inst.id, InstallationStatus::Completed, Some("Commissioned".into()), tech.id).await.unwrap();
    let review = reviews.add_for_order(customer.id, order.id, 5, Some("Clean install".into())).await.unwrap();
    assert_eq!(review.rating, 5);

    let err = reviews.add_for_order(customer.id, order.id, 4, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    let order = h.services.orders.by_id(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    let subjects = h.events.subjects().await;
    for expected in ["order.placed", "payment.intent_created", "payment.succeeded", "order.paid", "installation.assigned", "review.submitted"] {
        assert!(subjects.iter().any(|s| s == expected), "missing {expected}");
    }
}
