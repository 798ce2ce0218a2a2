//! Review Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::events::{DomainEvent, ReviewEvent};
use crate::domain::value_objects::Rating;
use crate::store::{Document, UniqueKey};

/// Either an order review (`order_id` set, technician captured) or a product
/// review (`product_id` set, purchase proven by `verified_order_id`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Review {
    id: Uuid,
    customer_id: Uuid,
    order_id: Option<Uuid>,
    product_id: Option<Uuid>,
    verified_order_id: Option<Uuid>,
    technician_id: Option<Uuid>,
    rating: Rating,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Review {
    pub const COMMENT_MAX: usize = 500;

    pub fn for_order(customer_id: Uuid, order_id: Uuid, technician_id: Uuid, rating: Rating, comment: Option<String>) -> Result<Self, ReviewError> {
        Self::build(customer_id, Some(order_id), None, None, Some(technician_id), rating, comment)
    }

    pub fn for_product(customer_id: Uuid, product_id: Uuid, verified_order_id: Uuid, rating: Rating, comment: Option<String>) -> Result<Self, ReviewError> {
        Self::build(customer_id, None, Some(product_id), Some(verified_order_id), None, rating, comment)
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        customer_id: Uuid, order_id: Option<Uuid>, product_id: Option<Uuid>, verified_order_id: Option<Uuid>,
        technician_id: Option<Uuid>, rating: Rating, comment: Option<String>,
    ) -> Result<Self, ReviewError> {
        let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        if comment.as_ref().is_some_and(|c| c.chars().count() > Self::COMMENT_MAX) {
            return Err(ReviewError::CommentTooLong);
        }
        let now = Utc::now();
        let mut review = Self {
            id: Uuid::now_v7(), customer_id, order_id, product_id, verified_order_id, technician_id, rating, comment,
            created_at: now, updated_at: now, events: vec![],
        };
        review.raise_event(DomainEvent::Review(ReviewEvent::Submitted { review_id: review.id, customer_id, order_id, product_id, rating: rating.value() }));
        Ok(review)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn customer_id(&self) -> Uuid { self.customer_id }
    pub fn order_id(&self) -> Option<Uuid> { self.order_id }
    pub fn product_id(&self) -> Option<Uuid> { self.product_id }
    pub fn verified_order_id(&self) -> Option<Uuid> { self.verified_order_id }
    pub fn technician_id(&self) -> Option<Uuid> { self.technician_id }
    pub fn rating(&self) -> Rating { self.rating }
    pub fn comment(&self) -> Option<&str> { self.comment.as_deref() }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

impl Document for Review {
    const COLLECTION: &'static str = "reviews";
    const UNIQUE_KEYS: &'static [UniqueKey] = &[
        UniqueKey::on("customer_order", &["customer_id", "order_id"]),
        UniqueKey::on("customer_product", &["customer_id", "product_id"]),
    ];
    fn id(&self) -> Uuid { self.id }
    fn created_at(&self) -> DateTime<Utc> { self.created_at }
    fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ReviewError { CommentTooLong }
impl std::error::Error for ReviewError {}
impl std::fmt::Display for ReviewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::CommentTooLong => write!(f, "Comment cannot exceed {} characters", Review::COMMENT_MAX) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_product_review_keeps_order_slot_empty() {
        let r = Review::for_product(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Rating::new(4).unwrap(), None).unwrap();
        let doc = serde_json::to_value(&r).unwrap();
        assert!(doc["order_id"].is_null());
        assert!(doc["verified_order_id"].is_string());
        assert_eq!(doc["rating"], 4);
        assert!(UniqueKey::on("customer_order", &["customer_id", "order_id"]).key_of(&doc).is_none());
    }
    #[test]
    fn test_comment_limit() {
        let err = Review::for_order(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Rating::new(5).unwrap(), Some("y".repeat(501)));
        assert_eq!(err.unwrap_err(), ReviewError::CommentTooLong);
    }
}
