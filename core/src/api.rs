use axum::{
    extract::Json,
    http::StatusCode,
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::controller::{Controller, Notice, PurchaseTrigger, ViewState};
use crate::errors::{AppError, NoticeKind};
use crate::purchase::PurchaseState;

#[derive(Deserialize, ToSchema)]
pub struct AmountRequest {
    /// Whole number of base units.
    #[schema(example = "1000000")]
    pub amount: String,
}

#[derive(Serialize, ToSchema)]
pub struct PurchaseStarted {
    #[schema(example = "1000000")]
    pub amount: String,
}

#[derive(Serialize, ToSchema)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[utoipa::path(
    get,
    path = "/state",
    responses((status = 200, description = "Current view state", body = ViewState)),
    tag = "Wallet"
)]
async fn state(Extension(controller): Extension<Arc<Controller>>) -> Json<ViewState> {
    Json(controller.view())
}

#[utoipa::path(
    post,
    path = "/connect",
    responses(
        (status = 200, description = "Session opened", body = ViewState),
        (status = 403, description = "Holder declined authorization"),
        (status = 503, description = "No wallet available")
    ),
    tag = "Wallet"
)]
async fn connect(
    Extension(controller): Extension<Arc<Controller>>,
) -> Result<Json<ViewState>, AppError> {
    controller.connect().await?;
    Ok(Json(controller.view()))
}

#[utoipa::path(
    post,
    path = "/disconnect",
    responses((status = 200, description = "Session closed", body = ViewState)),
    tag = "Wallet"
)]
async fn disconnect(Extension(controller): Extension<Arc<Controller>>) -> Json<ViewState> {
    controller.disconnect().await;
    Json(controller.view())
}

#[utoipa::path(
    post,
    path = "/amount",
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Amount set", body = ViewState),
        (status = 400, description = "Amount is not a whole number of base units")
    ),
    tag = "Purchase"
)]
async fn set_amount(
    Extension(controller): Extension<Arc<Controller>>,
    Json(payload): Json<AmountRequest>,
) -> Result<Json<ViewState>, AppError> {
    controller.set_amount(&payload.amount)?;
    Ok(Json(controller.view()))
}

#[utoipa::path(
    post,
    path = "/purchase",
    responses(
        (status = 202, description = "Purchase started in the background", body = PurchaseStarted),
        (status = 409, description = "Purchase disabled or already in flight")
    ),
    tag = "Purchase"
)]
async fn purchase(
    Extension(controller): Extension<Arc<Controller>>,
) -> Result<(StatusCode, Json<PurchaseStarted>), AppError> {
    let ticket = match controller.begin_purchase().await {
        Ok(ticket) => ticket,
        Err(PurchaseTrigger::Ignored) => {
            return Err(AppError::Conflict("a purchase is already in flight".to_string()))
        }
        Err(_) => {
            return Err(AppError::Conflict(
                "connect a wallet and set a non-zero amount first".to_string(),
            ))
        }
    };

    let amount = ticket.amount().to_string();
    tokio::spawn(async move {
        match controller.run_purchase(ticket).await {
            PurchaseTrigger::Completed(receipt) => {
                tracing::info!(purchase_tx = ?receipt.purchase_tx, "Background purchase finished")
            }
            PurchaseTrigger::Failed(e) => tracing::warn!(error = %e, "Background purchase failed"),
            _ => {}
        }
    });

    Ok((StatusCode::ACCEPTED, Json(PurchaseStarted { amount })))
}

#[utoipa::path(
    post,
    path = "/purchase/cancel",
    responses((status = 200, description = "Whether a pending wait was cancelled", body = CancelResponse)),
    tag = "Purchase"
)]
async fn cancel_purchase(Extension(controller): Extension<Arc<Controller>>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: controller.cancel_purchase(),
    })
}

#[utoipa::path(
    post,
    path = "/balance/refresh",
    responses((status = 200, description = "Balances re-read", body = ViewState)),
    tag = "Wallet"
)]
async fn refresh_balance(Extension(controller): Extension<Arc<Controller>>) -> Json<ViewState> {
    controller.refresh_balance().await;
    Json(controller.view())
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(OpenApi)]
#[openapi(
    paths(state, connect, disconnect, set_amount, purchase, cancel_purchase, refresh_balance),
    components(schemas(
        ViewState, Notice, NoticeKind, PurchaseState,
        AmountRequest, PurchaseStarted, CancelResponse
    )),
    tags(
        (name = "Wallet", description = "Wallet session and balances"),
        (name = "Purchase", description = "Approve-then-purchase flow")
    ),
    info(
        title = "Issuance API",
        version = "0.1.0",
        description = "Control surface for connecting a wallet and purchasing issuance tokens"
    )
)]
pub struct ApiDoc;

pub fn router(controller: Arc<Controller>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health_check))
        .route("/state", get(state))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
        .route("/amount", post(set_amount))
        .route("/purchase", post(purchase))
        .route("/purchase/cancel", post(cancel_purchase))
        .route("/balance/refresh", post(refresh_balance))
        .layer(Extension(controller))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
