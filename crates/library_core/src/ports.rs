//! crates/library_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Book, BookId, CatalogVolume, DueLoan, FavoriteView, HistoryEntry, LoanView, NewBook,
    Notification, PaymentMetadata, Review, User, UserCredentials, UserReview,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting state: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistent Store
//=========================================================================================

/// The one store capability the availability engine needs: opening the atomic
/// unit its transition protocol runs in.
#[async_trait]
pub trait BookTxSource: Send + Sync {
    async fn begin_book_tx(&self) -> PortResult<Box<dyn BookTransaction>>;
}

/// The persistent store. Owns every row; the availability engine is the only
/// caller allowed to mutate book status or open/close checkout episodes, and
/// it does so exclusively through [`BookTransaction`].
#[async_trait]
pub trait LibraryStore: BookTxSource {
    // --- Users and auth sessions ---
    async fn create_user(&self, email: &str, password_hash: &str) -> PortResult<User>;

    async fn find_credentials(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Resolves a session cookie to the user it belongs to, if still valid.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<User>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Books (read side and explicit registration) ---
    async fn find_book_by_catalog_id(&self, google_book_id: &str) -> PortResult<Option<Book>>;

    async fn find_book(&self, id: BookId) -> PortResult<Option<Book>>;

    /// Resolve-or-create outside the engine: registers a catalog item locally
    /// with `available` status, or returns the existing row's id.
    async fn register_book(&self, book: &NewBook) -> PortResult<BookId>;

    // --- Checkout episodes (read side) ---
    async fn open_loans_for_user(&self, user_id: Uuid) -> PortResult<Vec<LoanView>>;

    async fn loan_history_for_user(&self, user_id: Uuid) -> PortResult<Vec<LoanView>>;

    /// Recent reading history for the recommendation prompt, newest first.
    async fn reading_history(&self, user_id: Uuid, limit: i64) -> PortResult<Vec<HistoryEntry>>;

    /// Open loans with a due date inside `(from, to]`, for the reminder scan.
    async fn loans_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PortResult<Vec<DueLoan>>;

    // --- Reviews ---
    async fn add_review(
        &self,
        user_id: Uuid,
        book_id: BookId,
        rating: i32,
        review_text: &str,
    ) -> PortResult<Review>;

    async fn reviews_for_book(&self, book_id: BookId) -> PortResult<Vec<Review>>;

    async fn reviews_by_user(&self, user_id: Uuid) -> PortResult<Vec<UserReview>>;

    // --- Favorites ---
    async fn add_favorite(&self, user_id: Uuid, book_id: BookId) -> PortResult<()>;

    /// Returns whether a favorite row was actually removed.
    async fn remove_favorite(&self, user_id: Uuid, book_id: BookId) -> PortResult<bool>;

    async fn favorites_for_user(&self, user_id: Uuid) -> PortResult<Vec<FavoriteView>>;

    async fn is_favorite(&self, user_id: Uuid, book_id: BookId) -> PortResult<bool>;
}

/// One atomic read-modify-write unit scoped to a book row.
///
/// Reads take row locks so that concurrent status transitions on the same book
/// are serialized: of two racing callers, one observes the other's committed
/// state. Dropping the transaction without calling [`commit`](Self::commit)
/// rolls back every write made through it.
#[async_trait]
pub trait BookTransaction: Send {
    /// Looks up a book by its external catalog id, locking the row if present.
    async fn find_for_update(&mut self, google_book_id: &str) -> PortResult<Option<Book>>;

    /// Looks up a book by local id, locking the row if present.
    async fn load_for_update(&mut self, id: BookId) -> PortResult<Option<Book>>;

    /// Inserts a brand-new book row. The store's uniqueness constraint on the
    /// catalog id surfaces a lost race as `PortError::Conflict`.
    async fn insert_book(
        &mut self,
        book: &NewBook,
        status: crate::domain::AvailabilityStatus,
    ) -> PortResult<BookId>;

    async fn update_status(
        &mut self,
        id: BookId,
        status: crate::domain::AvailabilityStatus,
    ) -> PortResult<()>;

    async fn insert_episode(
        &mut self,
        user_id: Uuid,
        book_id: BookId,
        status: crate::domain::EpisodeStatus,
        checkout_date: DateTime<Utc>,
        return_date: Option<DateTime<Utc>>,
    ) -> PortResult<()>;

    /// Flips the open episode for (user, book) to `returned` with the given
    /// timestamp. Returns false when no such open episode exists.
    async fn close_open_episode(
        &mut self,
        user_id: Uuid,
        book_id: BookId,
        returned_at: DateTime<Utc>,
    ) -> PortResult<bool>;

    async fn commit(self: Box<Self>) -> PortResult<()>;
}

//=========================================================================================
// External Collaborators
//=========================================================================================

/// The remote book-metadata source. Read-only, no concept of local
/// availability.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn search(&self, query: &str, subject: Option<&str>) -> PortResult<Vec<CatalogVolume>>;

    async fn lookup(&self, google_book_id: &str) -> PortResult<CatalogVolume>;
}

/// Where the engine hands off outbound notifications.
///
/// Submitting never blocks and never fails from the caller's perspective; the
/// transactional outcome of the operation that emitted the notification is
/// already sealed by the time this is called.
pub trait NotificationSink: Send + Sync {
    fn submit(&self, notification: Notification);
}

/// Actual email delivery, driven by the notification worker (never by the
/// engine). Failures are logged by the worker and go nowhere else.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> PortResult<()>;
}

/// Wraps the third-party payment-intent API. The one contract the core relies
/// on is that the metadata round-trips the purchased item list.
#[async_trait]
pub trait PaymentBridge: Send + Sync {
    /// Creates a payment intent and returns its client secret.
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: &PaymentMetadata,
    ) -> PortResult<String>;
}

/// Free-text book recommendations from a language model. Pass-through; no
/// structural contract beyond plain text.
#[async_trait]
pub trait RecommendationService: Send + Sync {
    async fn recommend(&self, prompt: &str) -> PortResult<String>;
}
