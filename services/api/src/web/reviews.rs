//! services/api/src/web/reviews.rs
//!
//! Review endpoints. Reviews always target a local book row, never a raw
//! catalog id.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use library_core::domain::{BookId, Review, User, UserReview};
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
pub struct AddReviewRequest {
    pub book_id: i64,
    pub rating: i32,
    pub review_text: String,
}

#[derive(Serialize, ToSchema)]
pub struct ReviewResponse {
    pub id: i64,
    pub book_id: i64,
    pub rating: i32,
    pub review_text: String,
    pub created_at: DateTime<Utc>,
    pub email: String,
}

impl From<Review> for ReviewResponse {
    fn from(review: Review) -> Self {
        Self {
            id: review.id,
            book_id: review.book_id.get(),
            rating: review.rating,
            review_text: review.review_text,
            created_at: review.created_at,
            email: review.reviewer_email,
        }
    }
}

/// A review of the requesting user's own, joined with its book for display.
#[derive(Serialize, ToSchema)]
pub struct MyReviewResponse {
    pub id: i64,
    pub rating: i32,
    pub review_text: String,
    pub created_at: DateTime<Utc>,
    pub book_id_in_db: i64,
    pub google_book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
}

impl From<UserReview> for MyReviewResponse {
    fn from(review: UserReview) -> Self {
        Self {
            id: review.id,
            rating: review.rating,
            review_text: review.review_text,
            created_at: review.created_at,
            book_id_in_db: review.book_id.get(),
            google_book_id: review.google_book_id,
            title: review.title,
            author: review.author,
            cover_image_url: review.cover_image_url,
        }
    }
}

fn parse_book_id(raw: i64) -> Result<BookId, (StatusCode, String)> {
    BookId::new(raw).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /reviews - Add a review for a book
#[utoipa::path(
    post,
    path = "/reviews",
    request_body = AddReviewRequest,
    responses(
        (status = 201, description = "Review created", body = ReviewResponse),
        (status = 400, description = "Invalid rating or empty text"),
        (status = 404, description = "Unknown book"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn add_review_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<AddReviewRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let book_id = parse_book_id(req.book_id)?;
    if !(1..=5).contains(&req.rating) {
        return Err((
            StatusCode::BAD_REQUEST,
            "Rating must be between 1 and 5".to_string(),
        ));
    }
    if req.review_text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Review text is required".to_string(),
        ));
    }

    let review = state
        .store
        .add_review(user.id, book_id, req.rating, req.review_text.trim())
        .await
        .map_err(|e| match e {
            PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            other => store_error("failed to add review", other),
        })?;

    Ok((StatusCode::CREATED, Json(ReviewResponse::from(review))))
}

/// GET /reviews/book/{book_id} - All reviews for one book, newest first
#[utoipa::path(
    get,
    path = "/reviews/book/{book_id}",
    params(("book_id" = i64, Path, description = "Local book id")),
    responses(
        (status = 200, description = "Reviews for the book", body = [ReviewResponse]),
        (status = 400, description = "Invalid book id"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn book_reviews_handler(
    State(state): State<Arc<AppState>>,
    Path(raw_book_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let book_id = parse_book_id(raw_book_id)?;

    let reviews = state
        .store
        .reviews_for_book(book_id)
        .await
        .map_err(|e| store_error("failed to fetch reviews", e))?;

    Ok(Json(
        reviews
            .into_iter()
            .map(ReviewResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// GET /reviews/mine - The authenticated user's reviews
#[utoipa::path(
    get,
    path = "/reviews/mine",
    responses(
        (status = 200, description = "The user's reviews, newest first", body = [MyReviewResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn my_reviews_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let reviews = state
        .store
        .reviews_by_user(user.id)
        .await
        .map_err(|e| store_error("failed to fetch user reviews", e))?;

    Ok(Json(
        reviews
            .into_iter()
            .map(MyReviewResponse::from)
            .collect::<Vec<_>>(),
    ))
}
