//! services/api/src/reminders.rs
//!
//! The daily due-date reminder scan, scheduled with tokio-cron-scheduler.
//!
//! The scan reads a snapshot of open loans due in roughly seven days and
//! submits one reminder per row. It runs independently of in-flight checkout
//! and check-in operations; a loan returned at the same instant the scanner
//! reads it costs at worst one stray reminder, never a state inconsistency.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use library_core::domain::Notification;
use library_core::ports::{LibraryStore, NotificationSink, PortResult};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// The window of due dates a scan picks up: more than six days out but within
/// seven. A daily schedule therefore sends exactly one reminder per loan.
pub fn reminder_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (now + Duration::days(6), now + Duration::days(7))
}

/// Runs one scan: fetch due-soon loans and hand each to the sink.
pub async fn run_due_soon_scan(
    store: &dyn LibraryStore,
    sink: &dyn NotificationSink,
) -> PortResult<usize> {
    let (from, to) = reminder_window(Utc::now());
    let due = store.loans_due_between(from, to).await?;

    for loan in &due {
        sink.submit(Notification::DueSoon {
            to: loan.user_email.clone(),
            title: loan.title.clone(),
            author: loan.author.clone(),
            return_date: loan.return_date,
        });
    }
    Ok(due.len())
}

/// Installs the daily reminder job and starts the scheduler.
pub async fn start_reminder_scheduler(
    store: Arc<dyn LibraryStore>,
    sink: Arc<dyn NotificationSink>,
    schedule: &str,
) -> Result<JobScheduler, tokio_cron_scheduler::JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let store = Arc::clone(&store);
        let sink = Arc::clone(&sink);
        Box::pin(async move {
            match run_due_soon_scan(store.as_ref(), sink.as_ref()).await {
                Ok(count) => info!("due-date reminder scan queued {count} reminders"),
                Err(e) => error!("due-date reminder scan failed: {e}"),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    info!("reminder scheduler started");
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_spans_the_seventh_day_only() {
        let now = Utc::now();
        let (from, to) = reminder_window(now);
        assert_eq!(from, now + Duration::days(6));
        assert_eq!(to, now + Duration::days(7));

        // A loan due in exactly six days is outside the half-open window and
        // will be picked up by tomorrow's scan instead.
        assert!(now + Duration::days(6) <= from);
        assert!(now + Duration::days(7) <= to);
    }
}
