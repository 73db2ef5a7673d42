//! services/api/src/lib.rs
//!
//! The HTTP service crate: adapters for external systems, the notification
//! pipeline, the reminder scheduler, and the axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod notifications;
pub mod reminders;
pub mod web;
