//! crates/library_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Duration, Months, Utc};
use uuid::Uuid;

//=========================================================================================
// Identifiers
//=========================================================================================

/// A locally assigned book identifier.
///
/// Distinct from the external catalog id: the catalog id is a string issued by
/// Google Books, while this is the integer primary key of our own `books` row.
/// Construction rejects non-positive values so every `BookId` in the system is
/// known to be well formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BookId(i64);

/// Raised when a caller supplies a book id that cannot possibly exist.
#[derive(Debug, thiserror::Error)]
#[error("{0} is not a valid book id")]
pub struct InvalidBookId(pub i64);

impl BookId {
    pub fn new(raw: i64) -> Result<Self, InvalidBookId> {
        if raw > 0 {
            Ok(Self(raw))
        } else {
            Err(InvalidBookId(raw))
        }
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

//=========================================================================================
// The Availability State Machine
//=========================================================================================

/// The single authoritative state of a book.
///
/// A book's status and the existence of an open checkout episode must never
/// disagree; the only actor allowed to change this value is the
/// `AvailabilityEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityStatus {
    Available,
    CheckedOut,
    Purchased,
}

/// A status-changing action requested against one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookAction {
    Checkout,
    CheckIn,
    Purchase,
}

/// The requested action is not legal from the book's current state.
#[derive(Debug, thiserror::Error)]
#[error("cannot {action:?} a book that is {from:?}")]
pub struct TransitionRejected {
    pub from: AvailabilityStatus,
    pub action: BookAction,
}

impl AvailabilityStatus {
    /// Applies an action to the current status, returning the next status.
    ///
    /// Only the documented (from-state, action) pairs are accepted; every
    /// other combination is rejected. `Purchased` has no outgoing transitions.
    pub fn apply(self, action: BookAction) -> Result<Self, TransitionRejected> {
        use AvailabilityStatus::*;
        match (self, action) {
            (Available, BookAction::Checkout) => Ok(CheckedOut),
            (CheckedOut, BookAction::CheckIn) => Ok(Available),
            (Available, BookAction::Purchase) => Ok(Purchased),
            (from, action) => Err(TransitionRejected { from, action }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::CheckedOut => "checked_out",
            Self::Purchased => "purchased",
        }
    }
}

impl std::str::FromStr for AvailabilityStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "checked_out" => Ok(Self::CheckedOut),
            "purchased" => Ok(Self::Purchased),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A status string read back from storage did not match any known variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown status value: {0}")]
pub struct UnknownStatus(pub String);

/// The state of one checkout episode (a lending or purchase record).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeStatus {
    CheckedOut,
    Returned,
    Purchased,
}

impl EpisodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckedOut => "checked_out",
            Self::Returned => "returned",
            Self::Purchased => "purchased",
        }
    }
}

impl std::str::FromStr for EpisodeStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checked_out" => Ok(Self::CheckedOut),
            "returned" => Ok(Self::Returned),
            "purchased" => Ok(Self::Purchased),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Computes the due date for a loan starting at `checkout_at`.
///
/// One calendar month out, clamped to 31 days for the handful of dates where
/// adding a month would overflow the calendar.
pub fn due_date(checkout_at: DateTime<Utc>) -> DateTime<Utc> {
    checkout_at
        .checked_add_months(Months::new(1))
        .unwrap_or(checkout_at + Duration::days(31))
}

//=========================================================================================
// Books and Checkout Episodes
//=========================================================================================

/// A catalog item tracked locally, created on first checkout, purchase or
/// explicit registration. Never deleted.
#[derive(Debug, Clone)]
pub struct Book {
    pub id: BookId,
    pub google_book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
    pub status: AvailabilityStatus,
}

/// The fields needed to register a book locally for the first time.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub google_book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
}

/// One checkout episode joined with its book, as shown on the user's shelf.
#[derive(Debug, Clone)]
pub struct LoanView {
    pub book_id: BookId,
    pub google_book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
    pub checkout_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: EpisodeStatus,
}

/// A past or present loan reduced to what the recommendation prompt needs.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub title: String,
    pub author: Option<String>,
}

/// An open loan due soon, as produced by the daily reminder scan.
#[derive(Debug, Clone)]
pub struct DueLoan {
    pub user_email: String,
    pub title: String,
    pub author: Option<String>,
    pub return_date: DateTime<Utc>,
}

//=========================================================================================
// Users
//=========================================================================================

/// An authenticated user, as seen by handlers and the engine.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
}

/// Only used internally for login; contains sensitive data.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
}

//=========================================================================================
// Reviews and Favorites
//=========================================================================================

/// A review of a book, joined with the reviewer's email for display.
#[derive(Debug, Clone)]
pub struct Review {
    pub id: i64,
    pub book_id: BookId,
    pub rating: i32,
    pub review_text: String,
    pub created_at: DateTime<Utc>,
    pub reviewer_email: String,
}

/// A review written by the requesting user, joined with its book.
#[derive(Debug, Clone)]
pub struct UserReview {
    pub id: i64,
    pub rating: i32,
    pub review_text: String,
    pub created_at: DateTime<Utc>,
    pub book_id: BookId,
    pub google_book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
}

/// One favorited book, joined in for the favorites page.
#[derive(Debug, Clone)]
pub struct FavoriteView {
    pub book_id: BookId,
    pub google_book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub cover_image_url: Option<String>,
    pub favorited_at: DateTime<Utc>,
}

//=========================================================================================
// Catalog, Payments and Notifications
//=========================================================================================

/// Book metadata as returned by the external catalog. The catalog has no
/// concept of local availability; merging in our status happens at the edge.
#[derive(Debug, Clone)]
pub struct CatalogVolume {
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
}

/// One line of a payment intent's metadata. The payment bridge must round-trip
/// these so a later purchase confirmation can name the right local rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentItem {
    pub book_id: BookId,
    pub google_book_id: String,
    pub title: String,
    pub author: Option<String>,
    pub quantity: u32,
}

/// Everything the payment bridge attaches to an intent for reconciliation.
#[derive(Debug, Clone)]
pub struct PaymentMetadata {
    pub user_id: Uuid,
    pub items: Vec<PaymentItem>,
}

/// An outbound email request emitted by the engine or the reminder scan.
///
/// Delivery is fire-and-forget: these are handed to a sink and the emitting
/// operation never learns whether the mail went out.
#[derive(Debug, Clone)]
pub enum Notification {
    CheckedOut {
        to: String,
        title: String,
        author: Option<String>,
        due_date: DateTime<Utc>,
    },
    CheckedIn {
        to: String,
        title: String,
        author: Option<String>,
    },
    Purchased {
        to: String,
        title: String,
        author: Option<String>,
    },
    DueSoon {
        to: String,
        title: String,
        author: Option<String>,
        return_date: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn transition_table_accepts_only_documented_pairs() {
        use AvailabilityStatus::*;
        use BookAction::*;

        assert_eq!(Available.apply(Checkout).unwrap(), CheckedOut);
        assert_eq!(CheckedOut.apply(CheckIn).unwrap(), Available);
        assert_eq!(Available.apply(Purchase).unwrap(), Purchased);

        for (from, action) in [
            (Available, CheckIn),
            (CheckedOut, Checkout),
            (CheckedOut, Purchase),
            (Purchased, Checkout),
            (Purchased, CheckIn),
            (Purchased, Purchase),
        ] {
            let err = from.apply(action).unwrap_err();
            assert_eq!(err.from, from);
            assert_eq!(err.action, action);
        }
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            AvailabilityStatus::Available,
            AvailabilityStatus::CheckedOut,
            AvailabilityStatus::Purchased,
        ] {
            assert_eq!(status.as_str().parse::<AvailabilityStatus>().unwrap(), status);
        }
        assert!("lost".parse::<AvailabilityStatus>().is_err());

        for status in [
            EpisodeStatus::CheckedOut,
            EpisodeStatus::Returned,
            EpisodeStatus::Purchased,
        ] {
            assert_eq!(status.as_str().parse::<EpisodeStatus>().unwrap(), status);
        }
    }

    #[test]
    fn book_id_rejects_non_positive_values() {
        assert!(BookId::new(1).is_ok());
        assert!(BookId::new(0).is_err());
        assert!(BookId::new(-7).is_err());
    }

    #[test]
    fn due_date_is_one_month_out() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        assert_eq!(due_date(start), Utc.with_ymd_and_hms(2024, 4, 15, 12, 0, 0).unwrap());

        // End-of-month checkouts clamp to the last day of the next month.
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 9, 0, 0).unwrap();
        assert_eq!(due_date(start), Utc.with_ymd_and_hms(2024, 2, 29, 9, 0, 0).unwrap());
    }
}
