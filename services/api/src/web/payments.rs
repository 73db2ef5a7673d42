//! services/api/src/web/payments.rs
//!
//! Payment-intent endpoint. Cart items are resolved against the local store
//! before being attached as intent metadata, so the metadata always reflects
//! real rows rather than whatever the client sent.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use library_core::domain::{BookId, PaymentItem, PaymentMetadata, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::web::books::store_error;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CartItem {
    pub book_id: i64,
    pub quantity: u32,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateIntentRequest {
    pub items: Vec<CartItem>,
    /// Total charge in the currency's minor unit.
    pub amount: i64,
    pub currency: String,
}

#[derive(Serialize, ToSchema)]
pub struct CreateIntentResponse {
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
}

//=========================================================================================
// Handler
//=========================================================================================

/// POST /payments/intent - Create a payment intent for the user's cart
#[utoipa::path(
    post,
    path = "/payments/intent",
    request_body = CreateIntentRequest,
    responses(
        (status = 200, description = "Intent created", body = CreateIntentResponse),
        (status = 400, description = "Empty or invalid cart"),
        (status = 500, description = "Payment provider error")
    )
)]
pub async fn create_intent_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateIntentRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.items.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "At least one item is required".to_string(),
        ));
    }
    if req.amount <= 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Amount must be positive".to_string(),
        ));
    }

    // Resolve each cart line against our own rows. Items that name a book we
    // do not have are dropped from the metadata, mirroring the lookup misses
    // a stale cart can produce.
    let mut items = Vec::with_capacity(req.items.len());
    for line in &req.items {
        let book_id = BookId::new(line.book_id).map_err(|e| {
            (StatusCode::BAD_REQUEST, e.to_string())
        })?;

        match state
            .store
            .find_book(book_id)
            .await
            .map_err(|e| store_error("cart item lookup failed", e))?
        {
            Some(book) => items.push(PaymentItem {
                book_id: book.id,
                google_book_id: book.google_book_id,
                title: book.title,
                author: book.author,
                quantity: line.quantity,
            }),
            None => warn!("cart names unknown book {book_id}; omitting from metadata"),
        }
    }

    let metadata = PaymentMetadata {
        user_id: user.id,
        items,
    };

    let client_secret = state
        .payments
        .create_intent(req.amount, &req.currency, &metadata)
        .await
        .map_err(|e| {
            error!("failed to create payment intent: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create payment intent".to_string(),
            )
        })?;

    Ok(Json(CreateIntentResponse { client_secret }))
}
