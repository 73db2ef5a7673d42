//! services/api/src/web/books.rs
//!
//! Book endpoints: catalog search and details merged with local availability,
//! local registration, and the checkout/check-in/purchase operations that run
//! through the availability engine.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use library_core::domain::{Book, CatalogVolume, LoanView, NewBook, User};
use library_core::engine::{CheckoutRequest, EngineError};
use library_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SearchParams {
    pub query: Option<String>,
    pub genre: Option<String>,
    pub author: Option<String>,
}

/// A catalog hit annotated with what we know about it locally.
#[derive(Serialize, ToSchema)]
pub struct BookSummary {
    pub google_book_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub cover_image_url: Option<String>,
    pub published_date: Option<String>,
    pub categories: Vec<String>,
    pub page_count: Option<i32>,
    pub publisher: Option<String>,
    pub web_reader_link: Option<String>,
    pub availability_status: String,
    pub book_id_in_db: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterBookRequest {
    pub google_book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RegisterBookResponse {
    pub book_id_in_db: i64,
    pub message: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CheckoutBookRequest {
    pub google_book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CheckoutBookResponse {
    pub message: String,
    pub book_id_in_db: i64,
    pub due_date: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema)]
pub struct CheckinRequest {
    pub book_id: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct PurchaseConfirmationRequest {
    pub book_id_in_db: i64,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// One checkout episode as shown on the shelf and history pages.
#[derive(Serialize, ToSchema)]
pub struct LoanResponse {
    pub book_id_in_db: i64,
    pub google_book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
    pub checkout_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: String,
}

impl From<LoanView> for LoanResponse {
    fn from(loan: LoanView) -> Self {
        Self {
            book_id_in_db: loan.book_id.get(),
            google_book_id: loan.google_book_id,
            title: loan.title,
            author: loan.author,
            cover_image_url: loan.cover_image_url,
            checkout_date: loan.checkout_date,
            return_date: loan.return_date,
            status: loan.status.as_str().to_string(),
        }
    }
}

//=========================================================================================
// Availability Merging and Filtering
//=========================================================================================

/// Annotates a catalog volume with its local row, when one exists. Books the
/// library has never touched read as available.
fn merge_availability(volume: CatalogVolume, local: Option<&Book>) -> BookSummary {
    let (availability_status, book_id_in_db) = match local {
        Some(book) => (book.status.as_str().to_string(), Some(book.id.get())),
        None => ("available".to_string(), None),
    };
    BookSummary {
        google_book_id: volume.google_book_id,
        title: volume.title,
        authors: volume.authors,
        description: volume.description,
        cover_image_url: volume.cover_image_url,
        published_date: volume.published_date,
        categories: volume.categories,
        page_count: volume.page_count,
        publisher: volume.publisher,
        web_reader_link: volume.web_reader_link,
        availability_status,
        book_id_in_db,
    }
}

/// Case-insensitive substring match over the volume's categories. A book with
/// no categories at all is kept; the catalog's tagging is too sparse to treat
/// absence as a mismatch.
fn matches_genre(categories: &[String], genre: &str) -> bool {
    if categories.is_empty() {
        return true;
    }
    let genre = genre.to_lowercase();
    categories.iter().any(|c| c.to_lowercase().contains(&genre))
}

fn matches_author(authors: &[String], author: &str) -> bool {
    let author = author.to_lowercase();
    authors.iter().any(|a| a.to_lowercase().contains(&author))
}

//=========================================================================================
// Error Mapping
//=========================================================================================

pub(crate) fn engine_error(e: EngineError) -> (StatusCode, String) {
    match e {
        EngineError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg),
        EngineError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        EngineError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        EngineError::Store(inner) => {
            error!("store failure during availability operation: {inner}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error".to_string(),
            )
        }
    }
}

pub(crate) fn store_error(context: &str, e: PortError) -> (StatusCode, String) {
    error!("{context}: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Server error".to_string(),
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /books/search - Search the catalog, annotated with local availability
#[utoipa::path(
    get,
    path = "/books/search",
    params(
        ("query" = Option<String>, Query, description = "Free-text search terms"),
        ("genre" = Option<String>, Query, description = "Category filter, substring match"),
        ("author" = Option<String>, Query, description = "Author filter, substring match")
    ),
    responses(
        (status = 200, description = "Matching books", body = [BookSummary]),
        (status = 400, description = "Missing search query"),
        (status = 500, description = "Catalog unavailable")
    )
)]
pub async fn search_books_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let query = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or((
            StatusCode::BAD_REQUEST,
            "A search query is required".to_string(),
        ))?;

    let volumes = state
        .catalog
        .search(query, params.genre.as_deref())
        .await
        .map_err(|e| store_error("catalog search failed", e))?;

    let mut results = Vec::with_capacity(volumes.len());
    for volume in volumes {
        let local = state
            .store
            .find_book_by_catalog_id(&volume.google_book_id)
            .await
            .map_err(|e| store_error("availability lookup failed", e))?;
        results.push(merge_availability(volume, local.as_ref()));
    }

    // The catalog's own subject filter is broad; the authoritative filtering
    // happens here.
    if let Some(genre) = params.genre.as_deref().filter(|g| !g.is_empty()) {
        results.retain(|b| matches_genre(&b.categories, genre));
    }
    if let Some(author) = params.author.as_deref().filter(|a| !a.is_empty()) {
        results.retain(|b| matches_author(&b.authors, author));
    }

    Ok(Json(results))
}

/// GET /books/{google_book_id} - Catalog details merged with local status
#[utoipa::path(
    get,
    path = "/books/{google_book_id}",
    params(("google_book_id" = String, Path, description = "External catalog id")),
    responses(
        (status = 200, description = "Book details", body = BookSummary),
        (status = 404, description = "Unknown catalog id"),
        (status = 500, description = "Catalog unavailable")
    )
)]
pub async fn book_details_handler(
    State(state): State<Arc<AppState>>,
    Path(google_book_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let volume = state
        .catalog
        .lookup(&google_book_id)
        .await
        .map_err(|e| match e {
            PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            other => store_error("catalog lookup failed", other),
        })?;

    let local = state
        .store
        .find_book_by_catalog_id(&volume.google_book_id)
        .await
        .map_err(|e| store_error("availability lookup failed", e))?;

    Ok(Json(merge_availability(volume, local.as_ref())))
}

/// POST /books/register - Register a catalog item locally as available
#[utoipa::path(
    post,
    path = "/books/register",
    request_body = RegisterBookRequest,
    responses(
        (status = 200, description = "Book registered", body = RegisterBookResponse),
        (status = 400, description = "Missing required fields"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_book_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterBookRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.google_book_id.trim().is_empty() || req.title.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Google Book ID and Title are required to register book".to_string(),
        ));
    }

    let book_id = state
        .store
        .register_book(&NewBook {
            google_book_id: req.google_book_id,
            title: req.title,
            author: req.author,
            cover_image_url: req.cover_image_url,
        })
        .await
        .map_err(|e| store_error("book registration failed", e))?;

    Ok(Json(RegisterBookResponse {
        book_id_in_db: book_id.get(),
        message: "Book registered in local DB".to_string(),
    }))
}

/// POST /books/checkout - Check a book out to the authenticated user
#[utoipa::path(
    post,
    path = "/books/checkout",
    request_body = CheckoutBookRequest,
    responses(
        (status = 200, description = "Book checked out", body = CheckoutBookResponse),
        (status = 400, description = "Missing required fields"),
        (status = 409, description = "Book is not available"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn checkout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CheckoutBookRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let receipt = state
        .engine
        .checkout(
            CheckoutRequest {
                google_book_id: req.google_book_id,
                title: req.title,
                author: req.author,
                cover_image_url: req.cover_image_url,
            },
            &user,
        )
        .await
        .map_err(engine_error)?;

    Ok(Json(CheckoutBookResponse {
        message: "Book checked out successfully! It is due in 1 month.".to_string(),
        book_id_in_db: receipt.book_id.get(),
        due_date: receipt.due_date,
    }))
}

/// POST /books/checkin - Return a checked-out book
#[utoipa::path(
    post,
    path = "/books/checkin",
    request_body = CheckinRequest,
    responses(
        (status = 200, description = "Book checked in", body = MessageResponse),
        (status = 400, description = "Invalid book id"),
        (status = 404, description = "No open loan for this book"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn checkin_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CheckinRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .engine
        .check_in(req.book_id, &user)
        .await
        .map_err(engine_error)?;

    Ok(Json(MessageResponse {
        message: "Book checked in successfully!".to_string(),
    }))
}

/// GET /books/checked-out - The user's currently open loans
#[utoipa::path(
    get,
    path = "/books/checked-out",
    responses(
        (status = 200, description = "Open loans", body = [LoanResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn checked_out_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let loans = state
        .store
        .open_loans_for_user(user.id)
        .await
        .map_err(|e| store_error("open loan lookup failed", e))?;

    Ok(Json(
        loans.into_iter().map(LoanResponse::from).collect::<Vec<_>>(),
    ))
}

/// GET /books/history - Every loan the user has ever opened
#[utoipa::path(
    get,
    path = "/books/history",
    responses(
        (status = 200, description = "Loan history, newest first", body = [LoanResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let loans = state
        .store
        .loan_history_for_user(user.id)
        .await
        .map_err(|e| store_error("loan history lookup failed", e))?;

    Ok(Json(
        loans.into_iter().map(LoanResponse::from).collect::<Vec<_>>(),
    ))
}

/// POST /books/purchase-confirmation - Record a completed purchase
#[utoipa::path(
    post,
    path = "/books/purchase-confirmation",
    request_body = PurchaseConfirmationRequest,
    responses(
        (status = 200, description = "Purchase recorded", body = MessageResponse),
        (status = 404, description = "Unknown book"),
        (status = 409, description = "Book is not available for purchase"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn purchase_confirmation_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<PurchaseConfirmationRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .engine
        .confirm_purchase(req.book_id_in_db, &user)
        .await
        .map_err(engine_error)?;

    Ok(Json(MessageResponse {
        message: "Purchase confirmed and email sent!".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use library_core::domain::{AvailabilityStatus, BookId};

    fn volume(id: &str) -> CatalogVolume {
        CatalogVolume {
            google_book_id: id.to_string(),
            title: "Dune".to_string(),
            authors: vec!["Frank Herbert".to_string()],
            description: None,
            cover_image_url: None,
            published_date: None,
            categories: vec!["Science Fiction".to_string()],
            page_count: Some(412),
            publisher: None,
            web_reader_link: None,
        }
    }

    #[test]
    fn unknown_books_read_as_available_with_no_local_id() {
        let summary = merge_availability(volume("g1"), None);
        assert_eq!(summary.availability_status, "available");
        assert_eq!(summary.book_id_in_db, None);
    }

    #[test]
    fn locally_known_books_carry_their_row_and_status() {
        let book = Book {
            id: BookId::new(42).unwrap(),
            google_book_id: "g1".to_string(),
            title: "Dune".to_string(),
            author: Some("Frank Herbert".to_string()),
            cover_image_url: None,
            status: AvailabilityStatus::CheckedOut,
        };
        let summary = merge_availability(volume("g1"), Some(&book));
        assert_eq!(summary.availability_status, "checked_out");
        assert_eq!(summary.book_id_in_db, Some(42));
    }

    #[test]
    fn genre_filter_is_a_case_insensitive_substring_match() {
        let cats = vec!["Science Fiction".to_string()];
        assert!(matches_genre(&cats, "science"));
        assert!(matches_genre(&cats, "FICTION"));
        assert!(!matches_genre(&cats, "romance"));
        // Untagged volumes pass through rather than vanish.
        assert!(matches_genre(&[], "romance"));
    }

    #[test]
    fn author_filter_matches_any_listed_author() {
        let authors = vec!["Frank Herbert".to_string(), "Brian Herbert".to_string()];
        assert!(matches_author(&authors, "herbert"));
        assert!(matches_author(&authors, "Brian"));
        assert!(!matches_author(&authors, "asimov"));
        assert!(!matches_author(&[], "herbert"));
    }
}
