//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `LibraryStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use library_core::domain::{
    AvailabilityStatus, Book, BookId, DueLoan, EpisodeStatus, FavoriteView, HistoryEntry,
    LoanView, NewBook, Review, User, UserCredentials, UserReview,
};
use library_core::ports::{
    BookTransaction, BookTxSource, LibraryStore, PortError, PortResult,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `LibraryStore` port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps sqlx failures onto the port taxonomy. Unique violations become
/// `Conflict` so callers (the engine's insert race, duplicate signups,
/// duplicate favorites) can react without knowing about Postgres.
fn map_db_err(e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::RowNotFound => PortError::NotFound(e.to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Conflict(db.to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            PortError::NotFound(db.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn parse_availability(s: &str) -> PortResult<AvailabilityStatus> {
    s.parse()
        .map_err(|e: library_core::domain::UnknownStatus| PortError::Unexpected(e.to_string()))
}

fn parse_episode(s: &str) -> PortResult<EpisodeStatus> {
    s.parse()
        .map_err(|e: library_core::domain::UnknownStatus| PortError::Unexpected(e.to_string()))
}

fn book_id(raw: i64) -> PortResult<BookId> {
    BookId::new(raw).map_err(|e| PortError::Unexpected(e.to_string()))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct BookRecord {
    id: i64,
    google_book_id: String,
    title: String,
    author: Option<String>,
    cover_image_url: Option<String>,
    availability_status: String,
}

impl BookRecord {
    fn to_domain(self) -> PortResult<Book> {
        Ok(Book {
            id: book_id(self.id)?,
            google_book_id: self.google_book_id,
            title: self.title,
            author: self.author,
            cover_image_url: self.cover_image_url,
            status: parse_availability(&self.availability_status)?,
        })
    }
}

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
}

impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    password_hash: String,
}

impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            email: self.email,
            password_hash: self.password_hash,
        }
    }
}

#[derive(FromRow)]
struct LoanRecord {
    book_id: i64,
    google_book_id: String,
    title: String,
    author: Option<String>,
    cover_image_url: Option<String>,
    checkout_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    status: String,
}

impl LoanRecord {
    fn to_domain(self) -> PortResult<LoanView> {
        Ok(LoanView {
            book_id: book_id(self.book_id)?,
            google_book_id: self.google_book_id,
            title: self.title,
            author: self.author,
            cover_image_url: self.cover_image_url,
            checkout_date: self.checkout_date,
            return_date: self.return_date,
            status: parse_episode(&self.status)?,
        })
    }
}

#[derive(FromRow)]
struct HistoryRecord {
    title: String,
    author: Option<String>,
}

#[derive(FromRow)]
struct DueLoanRecord {
    user_email: String,
    title: String,
    author: Option<String>,
    return_date: DateTime<Utc>,
}

#[derive(FromRow)]
struct ReviewRecord {
    id: i64,
    book_id: i64,
    rating: i32,
    review_text: String,
    created_at: DateTime<Utc>,
    reviewer_email: String,
}

impl ReviewRecord {
    fn to_domain(self) -> PortResult<Review> {
        Ok(Review {
            id: self.id,
            book_id: book_id(self.book_id)?,
            rating: self.rating,
            review_text: self.review_text,
            created_at: self.created_at,
            reviewer_email: self.reviewer_email,
        })
    }
}

#[derive(FromRow)]
struct UserReviewRecord {
    id: i64,
    rating: i32,
    review_text: String,
    created_at: DateTime<Utc>,
    book_id: i64,
    google_book_id: String,
    title: String,
    author: Option<String>,
    cover_image_url: Option<String>,
}

impl UserReviewRecord {
    fn to_domain(self) -> PortResult<UserReview> {
        Ok(UserReview {
            id: self.id,
            rating: self.rating,
            review_text: self.review_text,
            created_at: self.created_at,
            book_id: book_id(self.book_id)?,
            google_book_id: self.google_book_id,
            title: self.title,
            author: self.author,
            cover_image_url: self.cover_image_url,
        })
    }
}

#[derive(FromRow)]
struct FavoriteRecord {
    book_id: i64,
    google_book_id: String,
    title: String,
    author: Option<String>,
    cover_image_url: Option<String>,
    favorited_at: DateTime<Utc>,
}

impl FavoriteRecord {
    fn to_domain(self) -> PortResult<FavoriteView> {
        Ok(FavoriteView {
            book_id: book_id(self.book_id)?,
            google_book_id: self.google_book_id,
            title: self.title,
            author: self.author,
            cover_image_url: self.cover_image_url,
            favorited_at: self.favorited_at,
        })
    }
}

//=========================================================================================
// `BookTxSource` Trait Implementation (the engine's transaction boundary)
//=========================================================================================

/// One open Postgres transaction scoped to a book row.
///
/// `FOR UPDATE` on the reads gives the engine its linearization: the second of
/// two racing callers blocks on the row lock and then observes the winner's
/// committed status. Dropping this struct without `commit` rolls back.
struct PgBookTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BookTxSource for PgStore {
    async fn begin_book_tx(&self) -> PortResult<Box<dyn BookTransaction>> {
        let tx = self.pool.begin().await.map_err(map_db_err)?;
        Ok(Box::new(PgBookTx { tx }))
    }
}

#[async_trait]
impl BookTransaction for PgBookTx {
    async fn find_for_update(&mut self, google_book_id: &str) -> PortResult<Option<Book>> {
        let record = sqlx::query_as::<_, BookRecord>(
            "SELECT id, google_book_id, title, author, cover_image_url, availability_status
             FROM books WHERE google_book_id = $1 FOR UPDATE",
        )
        .bind(google_book_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        record.map(BookRecord::to_domain).transpose()
    }

    async fn load_for_update(&mut self, id: BookId) -> PortResult<Option<Book>> {
        let record = sqlx::query_as::<_, BookRecord>(
            "SELECT id, google_book_id, title, author, cover_image_url, availability_status
             FROM books WHERE id = $1 FOR UPDATE",
        )
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        record.map(BookRecord::to_domain).transpose()
    }

    async fn insert_book(&mut self, book: &NewBook, status: AvailabilityStatus) -> PortResult<BookId> {
        let raw: i64 = sqlx::query_scalar(
            "INSERT INTO books (google_book_id, title, author, cover_image_url, availability_status)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&book.google_book_id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.cover_image_url)
        .bind(status.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        book_id(raw)
    }

    async fn update_status(&mut self, id: BookId, status: AvailabilityStatus) -> PortResult<()> {
        let result = sqlx::query("UPDATE books SET availability_status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("book {id} not found")));
        }
        Ok(())
    }

    async fn insert_episode(
        &mut self,
        user_id: Uuid,
        book_id: BookId,
        status: EpisodeStatus,
        checkout_date: DateTime<Utc>,
        return_date: Option<DateTime<Utc>>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO checkouts (user_id, book_id, checkout_date, return_date, status)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind(book_id.get())
        .bind(checkout_date)
        .bind(return_date)
        .bind(status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn close_open_episode(
        &mut self,
        user_id: Uuid,
        book_id: BookId,
        returned_at: DateTime<Utc>,
    ) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE checkouts SET return_date = $1, status = 'returned'
             WHERE user_id = $2 AND book_id = $3 AND status = 'checked_out'",
        )
        .bind(returned_at)
        .bind(user_id)
        .bind(book_id.get())
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        self.tx.commit().await.map_err(map_db_err)
    }
}

//=========================================================================================
// `LibraryStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl LibraryStore for PgStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING id, email",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match map_db_err(e) {
            PortError::Conflict(_) => PortError::Conflict("email already registered".into()),
            other => other,
        })?;
        Ok(record.to_domain())
    }

    async fn find_credentials(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| PortError::NotFound(format!("no user with email {email}")))?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT u.id, u.email FROM auth_sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?
        .ok_or(PortError::Unauthorized)?;
        Ok(record.to_domain())
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn find_book_by_catalog_id(&self, google_book_id: &str) -> PortResult<Option<Book>> {
        let record = sqlx::query_as::<_, BookRecord>(
            "SELECT id, google_book_id, title, author, cover_image_url, availability_status
             FROM books WHERE google_book_id = $1",
        )
        .bind(google_book_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        record.map(BookRecord::to_domain).transpose()
    }

    async fn find_book(&self, id: BookId) -> PortResult<Option<Book>> {
        let record = sqlx::query_as::<_, BookRecord>(
            "SELECT id, google_book_id, title, author, cover_image_url, availability_status
             FROM books WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        record.map(BookRecord::to_domain).transpose()
    }

    async fn register_book(&self, book: &NewBook) -> PortResult<BookId> {
        // Insert-if-absent, then read back: the same shape the unique
        // constraint already guarantees, so losing a race here is harmless.
        sqlx::query(
            "INSERT INTO books (google_book_id, title, author, cover_image_url, availability_status)
             VALUES ($1, $2, $3, $4, 'available')
             ON CONFLICT (google_book_id) DO NOTHING",
        )
        .bind(&book.google_book_id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.cover_image_url)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        let raw: i64 = sqlx::query_scalar("SELECT id FROM books WHERE google_book_id = $1")
            .bind(&book.google_book_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
        book_id(raw)
    }

    async fn open_loans_for_user(&self, user_id: Uuid) -> PortResult<Vec<LoanView>> {
        let records = sqlx::query_as::<_, LoanRecord>(
            "SELECT b.id AS book_id, b.google_book_id, b.title, b.author, b.cover_image_url,
                    c.checkout_date, c.return_date, c.status
             FROM checkouts c
             JOIN books b ON c.book_id = b.id
             WHERE c.user_id = $1 AND c.status = 'checked_out'
             ORDER BY c.checkout_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        records.into_iter().map(LoanRecord::to_domain).collect()
    }

    async fn loan_history_for_user(&self, user_id: Uuid) -> PortResult<Vec<LoanView>> {
        let records = sqlx::query_as::<_, LoanRecord>(
            "SELECT b.id AS book_id, b.google_book_id, b.title, b.author, b.cover_image_url,
                    c.checkout_date, c.return_date, c.status
             FROM checkouts c
             JOIN books b ON c.book_id = b.id
             WHERE c.user_id = $1
             ORDER BY c.checkout_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        records.into_iter().map(LoanRecord::to_domain).collect()
    }

    async fn reading_history(&self, user_id: Uuid, limit: i64) -> PortResult<Vec<HistoryEntry>> {
        let records = sqlx::query_as::<_, HistoryRecord>(
            "SELECT b.title, b.author
             FROM checkouts c
             JOIN books b ON c.book_id = b.id
             WHERE c.user_id = $1
             ORDER BY c.checkout_date DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(records
            .into_iter()
            .map(|r| HistoryEntry {
                title: r.title,
                author: r.author,
            })
            .collect())
    }

    async fn loans_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PortResult<Vec<DueLoan>> {
        let records = sqlx::query_as::<_, DueLoanRecord>(
            "SELECT u.email AS user_email, b.title, b.author, c.return_date
             FROM checkouts c
             JOIN books b ON c.book_id = b.id
             JOIN users u ON c.user_id = u.id
             WHERE c.status = 'checked_out'
               AND c.return_date IS NOT NULL
               AND c.return_date > $1
               AND c.return_date <= $2",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(records
            .into_iter()
            .map(|r| DueLoan {
                user_email: r.user_email,
                title: r.title,
                author: r.author,
                return_date: r.return_date,
            })
            .collect())
    }

    async fn add_review(
        &self,
        user_id: Uuid,
        book_id: BookId,
        rating: i32,
        review_text: &str,
    ) -> PortResult<Review> {
        let record = sqlx::query_as::<_, ReviewRecord>(
            "WITH inserted AS (
                 INSERT INTO reviews (user_id, book_id, rating, review_text)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id, user_id, book_id, rating, review_text, created_at
             )
             SELECT i.id, i.book_id, i.rating, i.review_text, i.created_at,
                    u.email AS reviewer_email
             FROM inserted i
             JOIN users u ON u.id = i.user_id",
        )
        .bind(user_id)
        .bind(book_id.get())
        .bind(rating)
        .bind(review_text)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;
        record.to_domain()
    }

    async fn reviews_for_book(&self, book_id: BookId) -> PortResult<Vec<Review>> {
        let records = sqlx::query_as::<_, ReviewRecord>(
            "SELECT r.id, r.book_id, r.rating, r.review_text, r.created_at,
                    u.email AS reviewer_email
             FROM reviews r
             JOIN users u ON r.user_id = u.id
             WHERE r.book_id = $1
             ORDER BY r.created_at DESC",
        )
        .bind(book_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        records.into_iter().map(ReviewRecord::to_domain).collect()
    }

    async fn reviews_by_user(&self, user_id: Uuid) -> PortResult<Vec<UserReview>> {
        let records = sqlx::query_as::<_, UserReviewRecord>(
            "SELECT r.id, r.rating, r.review_text, r.created_at,
                    b.id AS book_id, b.google_book_id, b.title, b.author, b.cover_image_url
             FROM reviews r
             JOIN books b ON r.book_id = b.id
             WHERE r.user_id = $1
             ORDER BY r.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        records.into_iter().map(UserReviewRecord::to_domain).collect()
    }

    async fn add_favorite(&self, user_id: Uuid, book_id: BookId) -> PortResult<()> {
        sqlx::query("INSERT INTO favorites (user_id, book_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(book_id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| match map_db_err(e) {
                PortError::Conflict(_) => {
                    PortError::Conflict("book is already in your favorites".into())
                }
                other => other,
            })?;
        Ok(())
    }

    async fn remove_favorite(&self, user_id: Uuid, book_id: BookId) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND book_id = $2")
            .bind(user_id)
            .bind(book_id.get())
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn favorites_for_user(&self, user_id: Uuid) -> PortResult<Vec<FavoriteView>> {
        let records = sqlx::query_as::<_, FavoriteRecord>(
            "SELECT b.id AS book_id, b.google_book_id, b.title, b.author, b.cover_image_url,
                    f.created_at AS favorited_at
             FROM favorites f
             JOIN books b ON f.book_id = b.id
             WHERE f.user_id = $1
             ORDER BY f.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        records.into_iter().map(FavoriteRecord::to_domain).collect()
    }

    async fn is_favorite(&self, user_id: Uuid, book_id: BookId) -> PortResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM favorites WHERE user_id = $1 AND book_id = $2)",
        )
        .bind(user_id)
        .bind(book_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(exists)
    }
}
