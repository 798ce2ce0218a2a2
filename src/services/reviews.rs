//! Review Service

use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{InstallationStatus, OrderStatus, Review, ReviewError};
use crate::domain::value_objects::Rating;
use crate::messaging::{publish_all, EventPublisher};
use crate::services::not_found;
use crate::services::views::{single, Joiner, ReviewView};
use crate::store::{Filter, Sort, StoreError, Stores};
use crate::{CoreError, Result};

#[derive(Clone)]
pub struct ReviewService {
    stores: Stores,
    events: Arc<dyn EventPublisher>,
}

impl ReviewService {
    pub fn new(stores: Stores, events: Arc<dyn EventPublisher>) -> Self { Self { stores, events } }

    async fn views(&self, reviews: Vec<Review>) -> Result<Vec<ReviewView>> {
        Joiner::new(&self.stores).reviews(reviews).await
    }

    /// Stores the review. A uniqueness race lost after the duplicate check
    /// surfaces as Conflict.
    async fn submit(&self, mut review: Review, duplicate: String) -> Result<ReviewView> {
        let events = review.take_events();
        let review = self.stores.reviews.create(review).await.map_err(|e| match e {
            StoreError::Conflict { .. } => CoreError::Conflict(duplicate),
            other => other.into(),
        })?;
        info!(review_id = %review.id(), rating = review.rating().value(), "review submitted");
        publish_all(self.events.as_ref(), events).await;
        single(self.views(vec![review]).await?)
    }

    /// Reviews a paid order whose installation is COMPLETED.
    #[instrument(skip(self, comment))]
    pub async fn add_for_order(&self, customer_id: Uuid, order_id: Uuid, rating: i64, comment: Option<String>) -> Result<ReviewView> {
        let rating = Rating::new(rating).map_err(|e| CoreError::Invalid(e.to_string()))?;
        let order = self.stores.orders.find_by_id(order_id).await?.ok_or_else(|| not_found("Order", order_id))?;
        if !order.is_owned_by(customer_id) {
            return Err(CoreError::Forbidden(format!("Order {order_id} does not belong to customer {customer_id}")));
        }
        if order.status() != OrderStatus::Paid {
            return Err(CoreError::Invalid(format!("Cannot review order {order_id} with status {}. Order must be PAID", order.status())));
        }
        let installation = self
            .stores
            .installations
            .find_one(Filter::all().eq("order_id", order_id), Sort::NewestFirst)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Installation not found for order {order_id}")))?;
        if installation.status() != InstallationStatus::Completed {
            return Err(CoreError::Invalid(format!(
                "Cannot review installation with status {}. Installation must be COMPLETED",
                installation.status()
            )));
        }
        let existing = self.stores.reviews.find_one(Filter::all().eq("customer_id", customer_id).eq("order_id", order_id), Sort::NewestFirst).await?;
        let duplicate = format!("Review already exists for order {order_id}");
        if existing.is_some() {
            return Err(CoreError::Invalid(duplicate));
        }

        let review = Review::for_order(customer_id, order_id, installation.technician_id(), rating, comment).map_err(review_error)?;
        self.submit(review, duplicate).await
    }

    /// Reviews a product the customer has bought on a PAID order.
    #[instrument(skip(self, comment))]
    pub async fn add_for_product(&self, customer_id: Uuid, product_id: Uuid, rating: i64, comment: Option<String>) -> Result<ReviewView> {
        let rating = Rating::new(rating).map_err(|e| CoreError::Invalid(e.to_string()))?;
        let existing = self.stores.reviews.find_one(Filter::all().eq("customer_id", customer_id).eq("product_id", product_id), Sort::NewestFirst).await?;
        let duplicate = format!("You have already reviewed solar panel {product_id}");
        if existing.is_some() {
            return Err(CoreError::Invalid(duplicate));
        }
        let purchases = Filter::all()
            .eq("owner_id", customer_id)
            .eq("status", OrderStatus::Paid)
            .has_element("items", json!({ "product_id": product_id }));
        let verified = self
            .stores
            .orders
            .find_one(purchases, Sort::NewestFirst)
            .await?
            .ok_or_else(|| CoreError::Forbidden(format!("Solar panel {product_id} is not a verified purchase")))?;

        let review = Review::for_product(customer_id, product_id, verified.id(), rating, comment).map_err(review_error)?;
        self.submit(review, duplicate).await
    }

    pub async fn by_id(&self, review_id: Uuid) -> Result<ReviewView> {
        let review = self.stores.reviews.find_by_id(review_id).await?.ok_or_else(|| not_found("Review", review_id))?;
        single(self.views(vec![review]).await?)
    }

    pub async fn by_customer(&self, customer_id: Uuid) -> Result<Vec<ReviewView>> {
        let found = self.stores.reviews.find(Filter::all().eq("customer_id", customer_id), Sort::NewestFirst).await?;
        self.views(found).await
    }

    pub async fn by_product(&self, product_id: Uuid) -> Result<Vec<ReviewView>> {
        let found = self.stores.reviews.find(Filter::all().eq("product_id", product_id), Sort::NewestFirst).await?;
        self.views(found).await
    }

    pub async fn all(&self) -> Result<Vec<ReviewView>> {
        let found = self.stores.reviews.find(Filter::all(), Sort::NewestFirst).await?;
        self.views(found).await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, review_id: Uuid) -> Result<()> {
        if !self.stores.reviews.delete(review_id).await? {
            return Err(not_found("Review", review_id));
        }
        info!(%review_id, "review deleted");
        Ok(())
    }
}

fn review_error(err: ReviewError) -> CoreError {
    CoreError::Invalid(err.to_string())
}
