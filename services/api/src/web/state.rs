//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use library_core::engine::AvailabilityEngine;
use library_core::ports::{
    CatalogSource, LibraryStore, NotificationSink, PaymentBridge, RecommendationService,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
///
/// Every collaborator is an injected trait object rather than a module-level
/// singleton, so tests can substitute fakes for any of them.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LibraryStore>,
    pub engine: Arc<AvailabilityEngine>,
    pub catalog: Arc<dyn CatalogSource>,
    pub payments: Arc<dyn PaymentBridge>,
    pub recommender: Arc<dyn RecommendationService>,
    pub notifications: Arc<dyn NotificationSink>,
    pub config: Arc<Config>,
}
