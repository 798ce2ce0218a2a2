//! HTTP surface.
//!
//! Thin axum handlers over [`Services`]. The caller's identity is taken from
//! the `x-user-id` and `x-user-role` headers set by the upstream auth proxy.
//! Role gates live here; ownership rules live in the services.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::domain::aggregates::{InstallationStatus, NewProduct, NewUser, Product, ProductPatch, Role, User};
use crate::services::views::{CartView, InstallationView, IntentCreated, OrderView, PaymentView, ReviewView};
use crate::services::{Actor, ProductQuery, Services};
use crate::{CoreError, ErrorKind};

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),
}

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self { ApiError::Validation(err.to_string()) }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Invalid => StatusCode::BAD_REQUEST,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn code_of(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NotFound => "NOT_FOUND",
        ErrorKind::Invalid => "INVALID",
        ErrorKind::Forbidden => "FORBIDDEN",
        ErrorKind::Conflict => "CONFLICT",
        ErrorKind::UpstreamFailure => "UPSTREAM_FAILURE",
        ErrorKind::Internal => "INTERNAL",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Core(e) if e.kind() == ErrorKind::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, code_of(ErrorKind::Internal), "An internal error occurred".to_string())
            }
            ApiError::Core(e) => (status_of(e.kind()), code_of(e.kind()), e.to_string()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "INVALID", msg.clone()),
        };
        if status.is_server_error() {
            tracing::error!(error_code = code, error = %self, "Request failed");
        } else {
            tracing::warn!(error_code = code, message = %message, "Request rejected");
        }
        (status, Json(json!({ "error": { "code": code, "message": message } }))).into_response()
    }
}

// =============================================================================
// Identity
// =============================================================================

/// The authenticated caller, read from the auth proxy headers.
pub struct Caller(pub Actor);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        let id = header("x-user-id")
            .ok_or_else(|| ApiError::Unauthorized("Missing x-user-id header".into()))?
            .parse::<Uuid>()
            .map_err(|_| ApiError::Unauthorized("Malformed x-user-id header".into()))?;
        let role = match header("x-user-role") {
            Some(r) => r.parse::<Role>().map_err(ApiError::Unauthorized)?,
            None => Role::Customer,
        };
        Ok(Caller(Actor::new(id, role)))
    }
}

fn require(actor: &Actor, role: Role) -> ApiResult<()> {
    if actor.role != role {
        return Err(CoreError::Forbidden(format!("Requires role {role}, caller is {}", actor.role)).into());
    }
    Ok(())
}

fn require_self_or_admin(actor: &Actor, owner: Uuid) -> ApiResult<()> {
    if actor.id != owner && !actor.is_admin() {
        return Err(CoreError::Forbidden("Not authorized to view this record".into()).into());
    }
    Ok(())
}

// =============================================================================
// Request bodies
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest { pub order_id: Uuid }

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmPaymentRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1))]
    pub payment_intent_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest { pub order_id: Uuid, pub technician_id: Uuid }

#[derive(Debug, Deserialize, Validate)]
pub struct StatusRequest {
    pub status: String,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct OrderReviewRequest {
    pub order_id: Uuid,
    #[validate(range(min = 1, max = 5))]
    pub rating: i64,
    #[validate(length(max = 500))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: i64,
    #[validate(length(max = 500))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleQuery { pub role: Role }

// =============================================================================
// Router
// =============================================================================

pub fn router(services: Services) -> Router {
    let api = Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", get(get_product).put(update_product).delete(deactivate_product))
        .route("/users", post(register_user))
        .route("/users/:id", get(get_user))
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/items", post(add_cart_item))
        .route("/cart/items/:product_id", delete(remove_cart_item))
        .route("/orders", get(my_orders).post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/payments", get(my_payments))
        .route("/payments/intent", post(create_intent))
        .route("/payments/confirm", post(confirm_payment))
        .route("/payments/:id", get(get_payment))
        .route("/installations", get(my_installations).post(assign_installation))
        .route("/installations/:id", get(get_installation))
        .route("/installations/:id/status", patch(update_installation_status))
        .route("/reviews", get(my_reviews).post(review_order))
        .route("/reviews/:id", get(get_review).delete(delete_review))
        .route("/reviews/products/:product_id", get(product_reviews).post(review_product))
        .route("/admin/users", get(users_by_role))
        .route("/admin/orders", get(all_orders))
        .route("/admin/payments", get(all_payments))
        .route("/admin/installations", get(all_installations))
        .route("/admin/reviews", get(all_reviews));

    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "solar-commerce"})) }))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { services })
}

// Catalog

async fn list_products(State(s): State<AppState>, Query(q): Query<ProductQuery>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(s.services.catalog.list(&q).await?))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Product>> {
    Ok(Json(s.services.catalog.get(id).await?))
}

async fn create_product(State(s): State<AppState>, Caller(actor): Caller, Json(r): Json<NewProduct>) -> ApiResult<(StatusCode, Json<Product>)> {
    require(&actor, Role::Admin)?;
    Ok((StatusCode::CREATED, Json(s.services.catalog.create(r).await?)))
}

async fn update_product(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>, Json(r): Json<ProductPatch>) -> ApiResult<Json<Product>> {
    require(&actor, Role::Admin)?;
    Ok(Json(s.services.catalog.update(id, r).await?))
}

async fn deactivate_product(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<Json<Product>> {
    require(&actor, Role::Admin)?;
    Ok(Json(s.services.catalog.deactivate(id).await?))
}

// Users

/// Open registration creates customers; other roles need an admin caller.
async fn register_user(State(s): State<AppState>, caller: Option<Caller>, Json(r): Json<NewUser>) -> ApiResult<(StatusCode, Json<User>)> {
    if r.role != Role::Customer {
        let Some(Caller(actor)) = caller else { return Err(ApiError::Unauthorized("Only admins may create staff accounts".into())) };
        require(&actor, Role::Admin)?;
    }
    Ok((StatusCode::CREATED, Json(s.services.users.register(r).await?)))
}

async fn get_user(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<Json<User>> {
    require_self_or_admin(&actor, id)?;
    Ok(Json(s.services.users.get(id).await?))
}

async fn users_by_role(State(s): State<AppState>, Caller(actor): Caller, Query(q): Query<RoleQuery>) -> ApiResult<Json<Vec<User>>> {
    require(&actor, Role::Admin)?;
    Ok(Json(s.services.users.list_by_role(q.role).await?))
}

// Cart

async fn get_cart(State(s): State<AppState>, Caller(actor): Caller) -> ApiResult<Json<CartView>> {
    Ok(Json(s.services.carts.get_or_create(actor.id).await?))
}

async fn add_cart_item(State(s): State<AppState>, Caller(actor): Caller, Json(r): Json<AddItemRequest>) -> ApiResult<Json<CartView>> {
    r.validate()?;
    Ok(Json(s.services.carts.add_item(actor.id, r.product_id, r.quantity).await?))
}

async fn remove_cart_item(State(s): State<AppState>, Caller(actor): Caller, Path(product_id): Path<Uuid>) -> ApiResult<Json<CartView>> {
    Ok(Json(s.services.carts.remove_item(actor.id, product_id).await?))
}

async fn clear_cart(State(s): State<AppState>, Caller(actor): Caller) -> ApiResult<Json<CartView>> {
    Ok(Json(s.services.carts.clear(actor.id).await?))
}

// Orders

async fn create_order(State(s): State<AppState>, Caller(actor): Caller) -> ApiResult<(StatusCode, Json<OrderView>)> {
    Ok((StatusCode::CREATED, Json(s.services.orders.create_from_cart(actor.id).await?)))
}

async fn my_orders(State(s): State<AppState>, Caller(actor): Caller) -> ApiResult<Json<Vec<OrderView>>> {
    Ok(Json(s.services.orders.by_user(actor.id).await?))
}

async fn get_order(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<Json<OrderView>> {
    Ok(Json(s.services.orders.by_id_for(id, &actor).await?))
}

async fn cancel_order(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<Json<OrderView>> {
    Ok(Json(s.services.orders.cancel(id, &actor).await?))
}

async fn all_orders(State(s): State<AppState>, Caller(actor): Caller) -> ApiResult<Json<Vec<OrderView>>> {
    require(&actor, Role::Admin)?;
    Ok(Json(s.services.orders.all().await?))
}

// Payments

async fn create_intent(State(s): State<AppState>, Caller(actor): Caller, Json(r): Json<CreateIntentRequest>) -> ApiResult<Json<IntentCreated>> {
    require(&actor, Role::Customer)?;
    Ok(Json(s.services.payments.create_intent(actor.id, r.order_id).await?))
}

async fn confirm_payment(State(s): State<AppState>, Caller(actor): Caller, Json(r): Json<ConfirmPaymentRequest>) -> ApiResult<Json<PaymentView>> {
    r.validate()?;
    Ok(Json(s.services.payments.confirm(actor.id, r.order_id, &r.payment_intent_id).await?))
}

async fn my_payments(State(s): State<AppState>, Caller(actor): Caller) -> ApiResult<Json<Vec<PaymentView>>> {
    Ok(Json(s.services.payments.by_user(actor.id).await?))
}

async fn get_payment(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<Json<PaymentView>> {
    let view = s.services.payments.by_id(id).await?;
    require_self_or_admin(&actor, view.owner_id)?;
    Ok(Json(view))
}

async fn all_payments(State(s): State<AppState>, Caller(actor): Caller) -> ApiResult<Json<Vec<PaymentView>>> {
    require(&actor, Role::Admin)?;
    Ok(Json(s.services.payments.all().await?))
}

// Installations

async fn assign_installation(State(s): State<AppState>, Caller(actor): Caller, Json(r): Json<AssignRequest>) -> ApiResult<(StatusCode, Json<InstallationView>)> {
    require(&actor, Role::Admin)?;
    Ok((StatusCode::CREATED, Json(s.services.installations.assign(r.order_id, r.technician_id).await?)))
}

async fn update_installation_status(
    State(s): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<Uuid>,
    Json(r): Json<StatusRequest>,
) -> ApiResult<Json<InstallationView>> {
    require(&actor, Role::Technician)?;
    r.validate()?;
    let status = r.status.parse::<InstallationStatus>().map_err(|e| CoreError::Invalid(e.to_string()))?;
    Ok(Json(s.services.installations.update_status(id, status, r.notes, actor.id).await?))
}

/// Technicians see their assignments, customers their own installations.
async fn my_installations(State(s): State<AppState>, Caller(actor): Caller) -> ApiResult<Json<Vec<InstallationView>>> {
    let found = match actor.role {
        Role::Technician => s.services.installations.list_for_technician(actor.id).await?,
        _ => s.services.installations.list_for_customer(actor.id).await?,
    };
    Ok(Json(found))
}

async fn get_installation(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<Json<InstallationView>> {
    let view = s.services.installations.by_id(id).await?;
    if actor.id != view.customer_id && actor.id != view.technician_id && !actor.is_admin() {
        return Err(CoreError::Forbidden(format!("Not authorized to view installation {id}")).into());
    }
    Ok(Json(view))
}

async fn all_installations(State(s): State<AppState>, Caller(actor): Caller) -> ApiResult<Json<Vec<InstallationView>>> {
    require(&actor, Role::Admin)?;
    Ok(Json(s.services.installations.list_all().await?))
}

// Reviews

async fn review_order(State(s): State<AppState>, Caller(actor): Caller, Json(r): Json<OrderReviewRequest>) -> ApiResult<(StatusCode, Json<ReviewView>)> {
    require(&actor, Role::Customer)?;
    r.validate()?;
    Ok((StatusCode::CREATED, Json(s.services.reviews.add_for_order(actor.id, r.order_id, r.rating, r.comment).await?)))
}

async fn review_product(
    State(s): State<AppState>,
    Caller(actor): Caller,
    Path(product_id): Path<Uuid>,
    Json(r): Json<ProductReviewRequest>,
) -> ApiResult<(StatusCode, Json<ReviewView>)> {
    require(&actor, Role::Customer)?;
    r.validate()?;
    Ok((StatusCode::CREATED, Json(s.services.reviews.add_for_product(actor.id, product_id, r.rating, r.comment).await?)))
}

async fn product_reviews(State(s): State<AppState>, Path(product_id): Path<Uuid>) -> ApiResult<Json<Vec<ReviewView>>> {
    Ok(Json(s.services.reviews.by_product(product_id).await?))
}

async fn my_reviews(State(s): State<AppState>, Caller(actor): Caller) -> ApiResult<Json<Vec<ReviewView>>> {
    Ok(Json(s.services.reviews.by_customer(actor.id).await?))
}

async fn get_review(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ReviewView>> {
    Ok(Json(s.services.reviews.by_id(id).await?))
}

async fn delete_review(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    require(&actor, Role::Admin)?;
    s.services.reviews.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn all_reviews(State(s): State<AppState>, Caller(actor): Caller) -> ApiResult<Json<Vec<ReviewView>>> {
    require(&actor, Role::Admin)?;
    Ok(Json(s.services.reviews.all().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::Harness;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn request(method: &str, uri: &str, actor: Option<Actor>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri).header("content-type", "application/json");
        if let Some(a) = actor {
            builder = builder.header("x-user-id", a.id.to_string()).header("x-user-role", a.role.to_string());
        }
        builder.body(body.map_or_else(Body::empty, |b| Body::from(b.to_string()))).unwrap()
    }

    async fn send(h: &Harness, req: Request<Body>) -> (StatusCode, Value) {
        let response = router(h.services.clone()).oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health() {
        let h = Harness::new();
        let (status, body) = send(&h, request("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_identity_required() {
        let h = Harness::new();
        let (status, body) = send(&h, request("GET", "/api/v1/cart", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_cart_and_checkout_over_http() {
        let h = Harness::new();
        let customer = h.customer().await;
        let panel = h.product(10000).await;

        let add = json!({"product_id": panel.id(), "quantity": 0});
        let (status, body) = send(&h, request("POST", "/api/v1/cart/items", Some(customer), Some(add))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID");

        let add = json!({"product_id": panel.id(), "quantity": 2});
        let (status, body) = send(&h, request("POST", "/api/v1/cart/items", Some(customer), Some(add))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_amount"], "20000");

        let (status, body) = send(&h, request("POST", "/api/v1/orders", Some(customer), None)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "PENDING");
        let order_id = body["id"].as_str().unwrap().to_string();

        let stranger = h.customer().await;
        let (status, _) = send(&h, request("GET", &format!("/api/v1/orders/{order_id}"), Some(stranger), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&h, request("POST", "/api/v1/payments/intent", Some(customer), Some(json!({"order_id": order_id})))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["client_secret"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_role_gates_and_error_mapping() {
        let h = Harness::new();
        let customer = h.customer().await;
        let admin = h.admin().await;

        let (status, body) = send(&h, request("GET", "/api/v1/admin/orders", Some(customer), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let (status, _) = send(&h, request("GET", "/api/v1/admin/orders", Some(admin), None)).await;
        assert_eq!(status, StatusCode::OK);

        let missing = format!("/api/v1/products/{}", Uuid::new_v4());
        let (status, body) = send(&h, request("GET", &missing, None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let staff = json!({"email": "tech@solar.in", "role": "TECHNICIAN"});
        let (status, _) = send(&h, request("POST", "/api/v1/users", Some(customer), Some(staff.clone()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&h, request("POST", "/api/v1/users", Some(admin), Some(staff.clone()))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(&h, request("POST", "/api/v1/users", Some(admin), Some(staff))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_owner_without_directory_entry_reads_own_records() {
        let h = Harness::new();
        let customer = Actor::new(Uuid::now_v7(), Role::Customer);
        let stranger = h.customer().await;
        let tech = h.technician().await;
        let panel = h.product(100).await;
        let order = h.paid_order(customer, &panel).await;
        let payment = h.services.payments.by_user(customer.id).await.unwrap().remove(0);
        assert!(payment.user.is_none());

        let uri = format!("/api/v1/payments/{}", payment.id);
        let (status, body) = send(&h, request("GET", &uri, Some(customer), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["owner_id"], customer.id.to_string());
        let (status, _) = send(&h, request("GET", &uri, Some(stranger), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let inst = h.services.installations.assign(order.id, tech.id).await.unwrap();
        let uri = format!("/api/v1/installations/{}", inst.id);
        let (status, body) = send(&h, request("GET", &uri, Some(customer), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["customer_id"], customer.id.to_string());
        let (status, _) = send(&h, request("GET", &uri, Some(tech), None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&h, request("GET", &uri, Some(stranger), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_installation_status_over_http() {
        let h = Harness::new();
        let customer = h.customer().await;
        let tech = h.technician().await;
        let panel = h.product(100).await;
        let order = h.paid_order(customer, &panel).await;
        let inst = h.services.installations.assign(order.id, tech.id).await.unwrap();
        let uri = format!("/api/v1/installations/{}/status", inst.id);

        let (status, _) = send(&h, request("PATCH", &uri, Some(customer), Some(json!({"status": "IN_PROGRESS"})))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(&h, request("PATCH", &uri, Some(tech), Some(json!({"status": "COMPLETED"})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"].as_str().unwrap().contains("Allowed: IN_PROGRESS"));
        let (status, body) = send(&h, request("PATCH", &uri, Some(tech), Some(json!({"status": "in_progress", "notes": "On site"})))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "IN_PROGRESS");
    }
}
