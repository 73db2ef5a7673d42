//! services/api/src/web/favorites.rs
//!
//! Favorites endpoints: a flat per-user set of local book rows.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use library_core::domain::{BookId, FavoriteView, User};
use library_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::web::books::store_error;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct AddFavoriteRequest {
    pub book_id: i64,
}

#[derive(Serialize, ToSchema)]
pub struct FavoriteResponse {
    pub book_id_in_db: i64,
    pub google_book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
    pub favorited_at: DateTime<Utc>,
}

impl From<FavoriteView> for FavoriteResponse {
    fn from(favorite: FavoriteView) -> Self {
        Self {
            book_id_in_db: favorite.book_id.get(),
            google_book_id: favorite.google_book_id,
            title: favorite.title,
            author: favorite.author,
            cover_image_url: favorite.cover_image_url,
            favorited_at: favorite.favorited_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct FavoriteStatusResponse {
    pub is_favorite: bool,
}

#[derive(Serialize, ToSchema)]
pub struct FavoriteMessageResponse {
    pub message: String,
}

fn parse_book_id(raw: i64) -> Result<BookId, (StatusCode, String)> {
    BookId::new(raw).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /favorites - Add a book to the user's favorites
#[utoipa::path(
    post,
    path = "/favorites",
    request_body = AddFavoriteRequest,
    responses(
        (status = 201, description = "Favorite added", body = FavoriteMessageResponse),
        (status = 400, description = "Invalid book id"),
        (status = 404, description = "Unknown book"),
        (status = 409, description = "Already favorited"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn add_favorite_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<AddFavoriteRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let book_id = parse_book_id(req.book_id)?;

    state
        .store
        .add_favorite(user.id, book_id)
        .await
        .map_err(|e| match e {
            PortError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            other => store_error("failed to add favorite", other),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(FavoriteMessageResponse {
            message: "Book added to favorites".to_string(),
        }),
    ))
}

/// DELETE /favorites/{book_id} - Remove a book from the user's favorites
#[utoipa::path(
    delete,
    path = "/favorites/{book_id}",
    params(("book_id" = i64, Path, description = "Local book id")),
    responses(
        (status = 200, description = "Favorite removed", body = FavoriteMessageResponse),
        (status = 400, description = "Invalid book id"),
        (status = 404, description = "Book was not favorited"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn remove_favorite_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(raw_book_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let book_id = parse_book_id(raw_book_id)?;

    let removed = state
        .store
        .remove_favorite(user.id, book_id)
        .await
        .map_err(|e| store_error("failed to remove favorite", e))?;

    if !removed {
        return Err((
            StatusCode::NOT_FOUND,
            "Book is not in your favorites".to_string(),
        ));
    }

    Ok(Json(FavoriteMessageResponse {
        message: "Book removed from favorites".to_string(),
    }))
}

/// GET /favorites - The user's favorited books
#[utoipa::path(
    get,
    path = "/favorites",
    responses(
        (status = 200, description = "Favorites, newest first", body = [FavoriteResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_favorites_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let favorites = state
        .store
        .favorites_for_user(user.id)
        .await
        .map_err(|e| store_error("failed to fetch favorites", e))?;

    Ok(Json(
        favorites
            .into_iter()
            .map(FavoriteResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// GET /favorites/{book_id}/status - Whether the user favorited this book
#[utoipa::path(
    get,
    path = "/favorites/{book_id}/status",
    params(("book_id" = i64, Path, description = "Local book id")),
    responses(
        (status = 200, description = "Favorite status", body = FavoriteStatusResponse),
        (status = 400, description = "Invalid book id"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn favorite_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(raw_book_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let book_id = parse_book_id(raw_book_id)?;

    let is_favorite = state
        .store
        .is_favorite(user.id, book_id)
        .await
        .map_err(|e| store_error("failed to check favorite status", e))?;

    Ok(Json(FavoriteStatusResponse { is_favorite }))
}
