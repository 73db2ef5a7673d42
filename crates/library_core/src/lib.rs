pub mod domain;
pub mod engine;
pub mod ports;

pub use domain::{
    AvailabilityStatus, Book, BookAction, BookId, EpisodeStatus, NewBook, Notification, User,
    UserCredentials,
};
pub use engine::{AvailabilityEngine, CheckoutReceipt, CheckoutRequest, EngineError};
pub use ports::{
    BookTransaction, BookTxSource, CatalogSource, LibraryStore, NotificationSender,
    NotificationSink, PaymentBridge, PortError, PortResult, RecommendationService,
};
