//! crates/library_core/src/engine.rs
//!
//! The Book Availability Engine: every status-changing action on a book
//! (checkout, check-in, purchase) runs through this module, inside one store
//! transaction, so that a book's availability status and the existence of an
//! open checkout episode never disagree.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    due_date, AvailabilityStatus, BookAction, BookId, EpisodeStatus, NewBook, Notification, User,
};
use crate::ports::{BookTxSource, NotificationSink, PortError};

//=========================================================================================
// Engine Error Taxonomy
//=========================================================================================

/// Everything an availability operation can fail with.
///
/// Notification delivery is deliberately absent: by the time a notification is
/// submitted the transaction has committed, and delivery problems are logged
/// by the outbound worker without ever touching the operation's outcome.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed identifier or missing required field; rejected before any
    /// store access.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested transition is not legal from the book's current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No matching open episode (or no such book) for the request.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store failed mid-operation; the transaction was rolled back and no
    /// partial state remains.
    #[error("Store failure: {0}")]
    Store(PortError),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<PortError> for EngineError {
    fn from(e: PortError) -> Self {
        EngineError::Store(e)
    }
}

//=========================================================================================
// Operation Payloads
//=========================================================================================

/// A checkout request as it arrives from the caller, keyed by the external
/// catalog id because the book may not exist locally yet.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub google_book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
}

/// What a successful checkout hands back to the caller.
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub book_id: BookId,
    pub due_date: DateTime<Utc>,
}

//=========================================================================================
// The Engine
//=========================================================================================

/// Serializes all status-changing actions on a book through a single
/// transactional protocol.
///
/// Every operation is all-or-nothing with respect to store state: any store
/// error rolls back every write made so far and surfaces as
/// [`EngineError::Store`]. Nothing is retried automatically; resubmitting is
/// safe because the transition guards reject illegal repeats with `Conflict`
/// or `NotFound` instead of corrupting state.
pub struct AvailabilityEngine {
    store: Arc<dyn BookTxSource>,
    notifications: Arc<dyn NotificationSink>,
}

impl AvailabilityEngine {
    pub fn new(store: Arc<dyn BookTxSource>, notifications: Arc<dyn NotificationSink>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Checks a book out to `user`, registering it locally first if this is
    /// the first time anyone has touched it.
    ///
    /// The resolve-or-create read and the status transition share one
    /// transaction scoped to the book row, so of two callers racing on a
    /// never-seen book exactly one succeeds; the other observes the freshly
    /// committed `checked_out` state (or loses the insert race on the catalog
    /// id) and gets `Conflict`.
    pub async fn checkout(
        &self,
        request: CheckoutRequest,
        user: &User,
    ) -> EngineResult<CheckoutReceipt> {
        if request.google_book_id.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "a catalog id is required to check out a book".into(),
            ));
        }
        if request.title.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "a title is required to check out a book".into(),
            ));
        }

        let now = Utc::now();
        let due = due_date(now);

        let mut tx = self.store.begin_book_tx().await?;

        let book_id = match tx.find_for_update(&request.google_book_id).await? {
            None => {
                let new_book = NewBook {
                    google_book_id: request.google_book_id.clone(),
                    title: request.title.clone(),
                    author: request.author.clone(),
                    cover_image_url: request.cover_image_url.clone(),
                };
                // A lost insert race on the catalog id means the winner holds
                // the book checked out.
                match tx.insert_book(&new_book, AvailabilityStatus::CheckedOut).await {
                    Ok(id) => id,
                    Err(PortError::Conflict(_)) => {
                        return Err(EngineError::Conflict(
                            "book is currently checked out by another user".into(),
                        ))
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Some(book) => {
                let next = book
                    .status
                    .apply(BookAction::Checkout)
                    .map_err(|e| EngineError::Conflict(e.to_string()))?;
                tx.update_status(book.id, next).await?;
                book.id
            }
        };

        tx.insert_episode(user.id, book_id, EpisodeStatus::CheckedOut, now, Some(due))
            .await?;
        tx.commit().await?;

        self.notifications.submit(Notification::CheckedOut {
            to: user.email.clone(),
            title: request.title,
            author: request.author,
            due_date: due,
        });

        Ok(CheckoutReceipt { book_id, due_date: due })
    }

    /// Returns a checked-out book.
    ///
    /// Only the user holding the open episode may check the book in; a second
    /// check-in, or a check-in by anyone else, finds no open episode and is
    /// rejected with `NotFound` before any write happens.
    pub async fn check_in(&self, raw_book_id: i64, user: &User) -> EngineResult<()> {
        let book_id = BookId::new(raw_book_id)
            .map_err(|e| EngineError::InvalidArgument(e.to_string()))?;
        let now = Utc::now();

        let mut tx = self.store.begin_book_tx().await?;

        if !tx.close_open_episode(user.id, book_id, now).await? {
            return Err(EngineError::NotFound(
                "book not found as checked out by this user".into(),
            ));
        }

        let book = tx.load_for_update(book_id).await?.ok_or_else(|| {
            // An open episode without a book row would mean the invariant is
            // already broken; treat it as a store failure, not a user error.
            EngineError::Store(PortError::Unexpected(format!(
                "open episode references missing book {book_id}"
            )))
        })?;

        let next = book
            .status
            .apply(BookAction::CheckIn)
            .map_err(|e| EngineError::Conflict(e.to_string()))?;
        tx.update_status(book_id, next).await?;
        tx.commit().await?;

        self.notifications.submit(Notification::CheckedIn {
            to: user.email.clone(),
            title: book.title,
            author: book.author,
        });

        Ok(())
    }

    /// Records a confirmed purchase.
    ///
    /// Purchase requires the book to be `available`: a concurrent loan (or an
    /// earlier purchase) is a `Conflict`, never silently overridden.
    pub async fn confirm_purchase(&self, raw_book_id: i64, user: &User) -> EngineResult<()> {
        let book_id = BookId::new(raw_book_id)
            .map_err(|e| EngineError::InvalidArgument(e.to_string()))?;
        let now = Utc::now();

        let mut tx = self.store.begin_book_tx().await?;

        let book = tx
            .load_for_update(book_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("book is not registered locally".into()))?;

        let next = book
            .status
            .apply(BookAction::Purchase)
            .map_err(|e| EngineError::Conflict(e.to_string()))?;
        tx.update_status(book_id, next).await?;
        tx.insert_episode(user.id, book_id, EpisodeStatus::Purchased, now, None)
            .await?;
        tx.commit().await?;

        self.notifications.submit(Notification::Purchased {
            to: user.email.clone(),
            title: book.title,
            author: book.author,
        });

        Ok(())
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Book;
    use crate::ports::{BookTransaction, PortResult};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq)]
    struct Episode {
        user_id: Uuid,
        book_id: BookId,
        status: EpisodeStatus,
        checkout_date: DateTime<Utc>,
        return_date: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Clone, Default)]
    struct StoreState {
        books: Vec<Book>,
        episodes: Vec<Episode>,
        next_book_id: i64,
    }

    impl StoreState {
        fn open_episodes_for(&self, book_id: BookId) -> usize {
            self.episodes
                .iter()
                .filter(|e| e.book_id == book_id && e.status == EpisodeStatus::CheckedOut)
                .count()
        }

        /// The central invariant: `checked_out` status iff exactly one open
        /// episode.
        fn assert_consistent(&self) {
            for book in &self.books {
                let open = self.open_episodes_for(book.id);
                match book.status {
                    AvailabilityStatus::CheckedOut => assert_eq!(open, 1, "book {}", book.id),
                    _ => assert_eq!(open, 0, "book {}", book.id),
                }
            }
        }
    }

    /// Where, if anywhere, the fake store should blow up.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    enum FailPoint {
        #[default]
        Never,
        OnInsertBook,
        OnUpdateStatus,
        OnInsertEpisode,
        OnCommit,
    }

    /// An in-memory store with snapshot-transaction semantics: a transaction
    /// works on a copy of the state and only a successful commit publishes it.
    struct FakeStore {
        state: Arc<Mutex<StoreState>>,
        fail: FailPoint,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(StoreState {
                    next_book_id: 1,
                    ..StoreState::default()
                })),
                fail: FailPoint::Never,
            }
        }

        fn failing_at(fail: FailPoint) -> Self {
            Self { fail, ..Self::new() }
        }

        fn snapshot(&self) -> StoreState {
            self.state.lock().unwrap().clone()
        }

        fn seed_book(&self, google_book_id: &str, status: AvailabilityStatus) -> BookId {
            let mut state = self.state.lock().unwrap();
            let id = BookId::new(state.next_book_id).unwrap();
            state.next_book_id += 1;
            state.books.push(Book {
                id,
                google_book_id: google_book_id.to_string(),
                title: "Seeded".into(),
                author: Some("Anon".into()),
                cover_image_url: None,
                status,
            });
            id
        }

        fn seed_open_episode(&self, user_id: Uuid, book_id: BookId) {
            let now = Utc::now();
            self.state.lock().unwrap().episodes.push(Episode {
                user_id,
                book_id,
                status: EpisodeStatus::CheckedOut,
                checkout_date: now,
                return_date: Some(due_date(now)),
            });
        }
    }

    struct FakeTx {
        shared: Arc<Mutex<StoreState>>,
        working: StoreState,
        fail: FailPoint,
    }

    fn boom() -> PortError {
        PortError::Unexpected("injected store failure".into())
    }

    #[async_trait]
    impl BookTxSource for FakeStore {
        async fn begin_book_tx(&self) -> PortResult<Box<dyn BookTransaction>> {
            Ok(Box::new(FakeTx {
                shared: Arc::clone(&self.state),
                working: self.snapshot(),
                fail: self.fail,
            }))
        }
    }

    #[async_trait]
    impl BookTransaction for FakeTx {
        async fn find_for_update(&mut self, google_book_id: &str) -> PortResult<Option<Book>> {
            Ok(self
                .working
                .books
                .iter()
                .find(|b| b.google_book_id == google_book_id)
                .cloned())
        }

        async fn load_for_update(&mut self, id: BookId) -> PortResult<Option<Book>> {
            Ok(self.working.books.iter().find(|b| b.id == id).cloned())
        }

        async fn insert_book(
            &mut self,
            book: &NewBook,
            status: AvailabilityStatus,
        ) -> PortResult<BookId> {
            if self.fail == FailPoint::OnInsertBook {
                return Err(boom());
            }
            if self
                .working
                .books
                .iter()
                .any(|b| b.google_book_id == book.google_book_id)
            {
                return Err(PortError::Conflict("duplicate catalog id".into()));
            }
            let id = BookId::new(self.working.next_book_id).unwrap();
            self.working.next_book_id += 1;
            self.working.books.push(Book {
                id,
                google_book_id: book.google_book_id.clone(),
                title: book.title.clone(),
                author: book.author.clone(),
                cover_image_url: book.cover_image_url.clone(),
                status,
            });
            Ok(id)
        }

        async fn update_status(&mut self, id: BookId, status: AvailabilityStatus) -> PortResult<()> {
            if self.fail == FailPoint::OnUpdateStatus {
                return Err(boom());
            }
            let book = self
                .working
                .books
                .iter_mut()
                .find(|b| b.id == id)
                .ok_or_else(|| PortError::NotFound(format!("book {id}")))?;
            book.status = status;
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
            if self.fail == FailPoint::OnInsertEpisode {
                return Err(boom());
            }
            self.working.episodes.push(Episode {
                user_id,
                book_id,
                status,
                checkout_date,
                return_date,
            });
            Ok(())
        }

        async fn close_open_episode(
            &mut self,
            user_id: Uuid,
            book_id: BookId,
            returned_at: DateTime<Utc>,
        ) -> PortResult<bool> {
            let episode = self.working.episodes.iter_mut().find(|e| {
                e.user_id == user_id
                    && e.book_id == book_id
                    && e.status == EpisodeStatus::CheckedOut
            });
            match episode {
                Some(e) => {
                    e.status = EpisodeStatus::Returned;
                    e.return_date = Some(returned_at);
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn commit(self: Box<Self>) -> PortResult<()> {
            if self.fail == FailPoint::OnCommit {
                return Err(boom());
            }
            *self.shared.lock().unwrap() = self.working;
            Ok(())
        }
    }

    /// Records every submitted notification; `broken` simulates a torn-down
    /// outbound channel, which must be invisible to callers.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Notification>>,
        broken: bool,
    }

    impl NotificationSink for RecordingSink {
        fn submit(&self, notification: Notification) {
            if self.broken {
                return;
            }
            self.sent.lock().unwrap().push(notification);
        }
    }

    fn reader(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: format!("{name}@example.com"),
        }
    }

    fn dune_request() -> CheckoutRequest {
        CheckoutRequest {
            google_book_id: "GB123".into(),
            title: "Dune".into(),
            author: Some("F. Herbert".into()),
            cover_image_url: Some("https://books.example/dune.jpg".into()),
        }
    }

    fn engine_with(store: FakeStore) -> (AvailabilityEngine, Arc<FakeStore>, Arc<RecordingSink>) {
        let store = Arc::new(store);
        let sink = Arc::new(RecordingSink::default());
        let engine = AvailabilityEngine::new(
            Arc::clone(&store) as Arc<dyn BookTxSource>,
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
        );
        (engine, store, sink)
    }

    #[tokio::test]
    async fn checkout_of_never_seen_book_creates_row_and_episode() {
        let (engine, store, sink) = engine_with(FakeStore::new());
        let user = reader("paul");

        let before = Utc::now();
        let receipt = engine.checkout(dune_request(), &user).await.unwrap();

        let state = store.snapshot();
        state.assert_consistent();
        assert_eq!(state.books.len(), 1);
        assert_eq!(state.books[0].google_book_id, "GB123");
        assert_eq!(state.books[0].status, AvailabilityStatus::CheckedOut);
        assert_eq!(state.episodes.len(), 1);
        assert_eq!(state.episodes[0].status, EpisodeStatus::CheckedOut);
        assert_eq!(state.episodes[0].return_date, Some(receipt.due_date));

        // Due date is one month out from "now".
        assert!(receipt.due_date >= due_date(before));
        assert!(receipt.due_date <= due_date(Utc::now()));

        let sent = sink.sent.lock().unwrap();
        assert!(matches!(
            sent.as_slice(),
            [Notification::CheckedOut { to, title, .. }]
                if to == &user.email && title == "Dune"
        ));
    }

    #[tokio::test]
    async fn checkout_of_checked_out_book_conflicts_and_leaves_store_unchanged() {
        let (engine, store, sink) = engine_with(FakeStore::new());
        let holder = reader("holder");
        let id = store.seed_book("GB123", AvailabilityStatus::CheckedOut);
        store.seed_open_episode(holder.id, id);
        let before = store.snapshot();

        let err = engine.checkout(dune_request(), &reader("late")).await.unwrap_err();

        assert!(matches!(err, EngineError::Conflict(_)));
        let after = store.snapshot();
        assert_eq!(after.books.len(), before.books.len());
        assert_eq!(after.episodes, before.episodes);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkout_of_purchased_book_conflicts() {
        let (engine, store, _sink) = engine_with(FakeStore::new());
        store.seed_book("GB123", AvailabilityStatus::Purchased);

        let err = engine.checkout(dune_request(), &reader("u")).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn checkout_rejects_blank_identifiers_before_touching_the_store() {
        let (engine, store, _sink) = engine_with(FakeStore::new());
        let mut request = dune_request();
        request.google_book_id = "  ".into();

        let err = engine.checkout(request, &reader("u")).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        assert!(store.snapshot().books.is_empty());
    }

    #[tokio::test]
    async fn lost_insert_race_surfaces_as_conflict() {
        // Two callers race on a never-seen book: one commits first, and the
        // loser must see Conflict, whether it lost at the read (committed
        // status already checked_out) or at the insert (duplicate catalog
        // id). Both paths land on the same error kind.
        let (engine, store, _sink) = engine_with(FakeStore::new());
        engine.checkout(dune_request(), &reader("winner")).await.unwrap();

        let err = engine.checkout(dune_request(), &reader("loser")).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        let mut tx = store.begin_book_tx().await.unwrap();
        let stale = NewBook {
            google_book_id: "GB123".into(),
            title: "Dune".into(),
            author: None,
            cover_image_url: None,
        };
        // Inserting behind someone else's committed row is the unique
        // violation the adapter maps to Conflict.
        let race = tx.insert_book(&stale, AvailabilityStatus::CheckedOut).await;
        assert!(matches!(race, Err(PortError::Conflict(_))));
    }

    #[tokio::test]
    async fn check_in_flips_episode_and_frees_the_book() {
        let (engine, store, sink) = engine_with(FakeStore::new());
        let user = reader("paul");
        let receipt = engine.checkout(dune_request(), &user).await.unwrap();

        engine.check_in(receipt.book_id.get(), &user).await.unwrap();

        let state = store.snapshot();
        state.assert_consistent();
        assert_eq!(state.books[0].status, AvailabilityStatus::Available);
        assert_eq!(state.episodes[0].status, EpisodeStatus::Returned);
        assert!(state.episodes[0].return_date.is_some());

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[1], Notification::CheckedIn { title, .. } if title == "Dune"));
    }

    #[tokio::test]
    async fn check_in_without_open_episode_is_not_found() {
        let (engine, store, sink) = engine_with(FakeStore::new());
        let id = store.seed_book("GB123", AvailabilityStatus::Available);
        let before = store.snapshot();

        let err = engine.check_in(id.get(), &reader("u")).await.unwrap_err();

        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(store.snapshot().episodes, before.episodes);
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn check_in_by_another_user_is_not_found() {
        let (engine, _store, _sink) = engine_with(FakeStore::new());
        let holder = reader("holder");
        let receipt = engine.checkout(dune_request(), &holder).await.unwrap();

        let err = engine
            .check_in(receipt.book_id.get(), &reader("impostor"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn double_check_in_is_not_found() {
        let (engine, _store, _sink) = engine_with(FakeStore::new());
        let user = reader("u");
        let receipt = engine.checkout(dune_request(), &user).await.unwrap();

        engine.check_in(receipt.book_id.get(), &user).await.unwrap();
        let err = engine.check_in(receipt.book_id.get(), &user).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn check_in_rejects_malformed_ids_before_touching_the_store() {
        let (engine, _store, _sink) = engine_with(FakeStore::new());
        for bad in [0, -1, -9999] {
            let err = engine.check_in(bad, &reader("u")).await.unwrap_err();
            assert!(matches!(err, EngineError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn check_in_then_checkout_by_another_user_gets_a_fresh_due_date() {
        let (engine, store, _sink) = engine_with(FakeStore::new());
        let first = reader("first");
        let second = reader("second");

        let receipt = engine.checkout(dune_request(), &first).await.unwrap();
        engine.check_in(receipt.book_id.get(), &first).await.unwrap();

        let before = Utc::now();
        let receipt2 = engine.checkout(dune_request(), &second).await.unwrap();

        assert_eq!(receipt2.book_id, receipt.book_id);
        assert!(receipt2.due_date >= due_date(before));

        let state = store.snapshot();
        state.assert_consistent();
        assert_eq!(state.episodes.len(), 2);
        assert_eq!(state.episodes[1].user_id, second.id);
        assert_eq!(state.episodes[1].status, EpisodeStatus::CheckedOut);
    }

    #[tokio::test]
    async fn purchase_of_available_book_succeeds() {
        let (engine, store, sink) = engine_with(FakeStore::new());
        let id = store.seed_book("GB123", AvailabilityStatus::Available);
        let user = reader("buyer");

        engine.confirm_purchase(id.get(), &user).await.unwrap();

        let state = store.snapshot();
        state.assert_consistent();
        assert_eq!(state.books[0].status, AvailabilityStatus::Purchased);
        assert_eq!(state.episodes.len(), 1);
        assert_eq!(state.episodes[0].status, EpisodeStatus::Purchased);
        assert_eq!(state.episodes[0].return_date, None);

        let sent = sink.sent.lock().unwrap();
        assert!(matches!(sent.as_slice(), [Notification::Purchased { .. }]));
    }

    #[tokio::test]
    async fn purchase_of_checked_out_book_conflicts() {
        let (engine, store, _sink) = engine_with(FakeStore::new());
        let holder = reader("holder");
        let id = store.seed_book("GB123", AvailabilityStatus::CheckedOut);
        store.seed_open_episode(holder.id, id);

        let err = engine.confirm_purchase(id.get(), &reader("buyer")).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        assert_eq!(store.snapshot().books[0].status, AvailabilityStatus::CheckedOut);
    }

    #[tokio::test]
    async fn purchase_of_unregistered_book_is_not_found() {
        let (engine, _store, _sink) = engine_with(FakeStore::new());
        let err = engine.confirm_purchase(42, &reader("u")).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn store_failure_at_any_step_persists_nothing() {
        for fail in [
            FailPoint::OnInsertBook,
            FailPoint::OnInsertEpisode,
            FailPoint::OnCommit,
        ] {
            let (engine, store, sink) = engine_with(FakeStore::failing_at(fail));
            let err = engine.checkout(dune_request(), &reader("u")).await.unwrap_err();
            assert!(matches!(err, EngineError::Store(_)), "{fail:?}");

            let state = store.snapshot();
            assert!(state.books.is_empty(), "{fail:?}");
            assert!(state.episodes.is_empty(), "{fail:?}");
            assert!(sink.sent.lock().unwrap().is_empty(), "{fail:?}");
        }

        // Same rollback completeness for a check-in that fails mid-flight.
        let (engine, store, _sink) = engine_with(FakeStore::new());
        let user = reader("u");
        let receipt = engine.checkout(dune_request(), &user).await.unwrap();
        let committed = store.snapshot();

        let failing = FakeStore {
            state: Arc::clone(&store.state),
            fail: FailPoint::OnUpdateStatus,
        };
        let (engine2, store2, _sink2) = engine_with(failing);
        let err = engine2.check_in(receipt.book_id.get(), &user).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        assert_eq!(store2.snapshot().episodes, committed.episodes);
    }

    #[tokio::test]
    async fn broken_notification_channel_never_changes_the_outcome() {
        let store = Arc::new(FakeStore::new());
        let sink = Arc::new(RecordingSink {
            broken: true,
            ..RecordingSink::default()
        });
        let engine = AvailabilityEngine::new(
            Arc::clone(&store) as Arc<dyn BookTxSource>,
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
        );
        let user = reader("u");

        let receipt = engine.checkout(dune_request(), &user).await.unwrap();
        engine.check_in(receipt.book_id.get(), &user).await.unwrap();

        let state = store.snapshot();
        state.assert_consistent();
        assert_eq!(state.books[0].status, AvailabilityStatus::Available);
        assert!(sink.sent.lock().unwrap().is_empty());
    }
}
