use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use crate::models::{Booking, Reminder, ReminderKind, ReminderStatus};
use crate::services::reminders::NotificationSender;
use crate::services::store::{BookingScan, BookingStore};

const SCAN_PAGE_SIZE: usize = 200;

/// Where a reminder stands relative to the current delivery window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    Unscheduled,
    AlreadySent,
    NotYet,
    Now,
    /// Fell due before the window opened; never delivered.
    Missed,
}

/// Classifies a reminder against the window `(window_start, now]`.
pub fn classify(reminder: Option<&Reminder>, window_start: DateTime<Utc>, now: DateTime<Utc>) -> Due {
    let Some(reminder) = reminder else {
        return Due::Unscheduled;
    };
    if reminder.status == ReminderStatus::Sent {
        return Due::AlreadySent;
    }
    if reminder.due_at > now {
        Due::NotYet
    } else if reminder.due_at > window_start {
        Due::Now
    } else {
        Due::Missed
    }
}

/// Outcome counts for one sweep.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SweepReport {
    pub started_at: Option<DateTime<Utc>>,
    pub scanned: usize,
    pub dispatched: usize,
    pub send_failures: usize,
    /// Sent, but the `sent` status was not stored; the next tick may resend.
    pub commit_failures: usize,
    pub missed: usize,
    pub missed_day_before: usize,
    pub missed_hour_before: usize,
    /// A page could not be read even after a retry; the rest of the table
    /// was not visited.
    pub scan_failed: bool,
}

impl SweepReport {
    fn had_activity(&self) -> bool {
        self.dispatched > 0 || self.send_failures > 0 || self.commit_failures > 0 || self.scan_failed
    }
}

enum UnitOutcome {
    Dispatched,
    SendFailed,
    CommitFailed,
}

/// Periodic sweep that dispatches due reminders.
///
/// Each (booking, kind) pair is handled on its own: the reminder is sent and,
/// only after a successful send, its status is set to `sent`. A failed send
/// stays `pending` and is retried on later ticks until it leaves the window.
/// A crash between send and status commit can produce a duplicate, so
/// delivery is at least once for that gap rather than exactly once.
pub struct ReminderScheduler {
    store: Arc<dyn BookingStore>,
    sender: Arc<dyn NotificationSender>,
    window: Duration,
    page_size: usize,
    running: tokio::sync::Mutex<()>,
    last_report: Mutex<Option<SweepReport>>,
}

impl ReminderScheduler {
    pub fn new(store: Arc<dyn BookingStore>, sender: Arc<dyn NotificationSender>, window: Duration) -> Self {
        Self {
            store,
            sender,
            window,
            page_size: SCAN_PAGE_SIZE,
            running: tokio::sync::Mutex::new(()),
            last_report: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn last_report(&self) -> Option<SweepReport> {
        self.last_report.lock().ok().and_then(|r| r.clone())
    }

    /// Runs one sweep as of `now`. Concurrent callers wait for the running
    /// sweep to finish, so ticks never overlap.
    pub async fn tick(&self, now: DateTime<Utc>) -> SweepReport {
        let _running = self.running.lock().await;

        let window_start = now - self.window;
        let mut report = SweepReport {
            started_at: Some(now),
            ..Default::default()
        };

        let mut scan = BookingScan::new(self.store.as_ref(), self.page_size);
        loop {
            // A failed fetch leaves the cursor in place, so the retry reads the same page
            let first = scan.next_page().await;
            let fetched = match first {
                Err(e) => {
                    tracing::warn!(error = %e, scanned = report.scanned, "booking page fetch failed, retrying once");
                    scan.next_page().await
                }
                ok => ok,
            };
            let page = match fetched {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, scanned = report.scanned, "booking scan failed, sweep cut short");
                    report.scan_failed = true;
                    break;
                }
            };

            for booking in page {
                report.scanned += 1;
                let booking = Arc::new(booking);
                for kind in ReminderKind::ALL {
                    match classify(booking.reminder(kind), window_start, now) {
                        Due::Now => match self.dispatch(&booking, kind).await {
                            UnitOutcome::Dispatched => report.dispatched += 1,
                            UnitOutcome::SendFailed => report.send_failures += 1,
                            UnitOutcome::CommitFailed => report.commit_failures += 1,
                        },
                        Due::Missed => {
                            tracing::debug!(
                                customer_id = %booking.customer_id,
                                booking_id = %booking.booking_id,
                                kind = kind.as_str(),
                                "reminder missed its delivery window"
                            );
                            report.missed += 1;
                            match kind {
                                ReminderKind::DayBefore => report.missed_day_before += 1,
                                ReminderKind::HourBefore => report.missed_hour_before += 1,
                            }
                        }
                        Due::Unscheduled | Due::AlreadySent | Due::NotYet => {}
                    }
                }
            }
        }

        if report.had_activity() {
            tracing::info!(
                scanned = report.scanned,
                dispatched = report.dispatched,
                send_failures = report.send_failures,
                commit_failures = report.commit_failures,
                "reminder sweep finished"
            );
        } else {
            tracing::debug!(scanned = report.scanned, "reminder sweep finished, nothing due");
        }

        if let Ok(mut last) = self.last_report.lock() {
            *last = Some(report.clone());
        }
        report
    }

    /// Sends one reminder and commits its status. Runs as a separate task so
    /// a panic inside a sender only costs this one unit.
    async fn dispatch(&self, booking: &Arc<Booking>, kind: ReminderKind) -> UnitOutcome {
        let store = Arc::clone(&self.store);
        let sender = Arc::clone(&self.sender);
        let key = booking.key();
        let booking = Arc::clone(booking);
        let task_key = key.clone();

        let task = tokio::spawn(async move {
            let key = task_key;

            if let Err(e) = sender.send(&booking, kind).await {
                tracing::error!(
                    error = %e,
                    booking = %key,
                    kind = kind.as_str(),
                    "reminder send failed, will retry while inside the window"
                );
                return UnitOutcome::SendFailed;
            }

            match store.update_status(&key, kind, ReminderStatus::Sent).await {
                Ok(true) => {
                    tracing::info!(booking = %key, kind = kind.as_str(), "reminder sent");
                    UnitOutcome::Dispatched
                }
                Ok(false) => {
                    tracing::warn!(booking = %key, kind = kind.as_str(), "reminder sent but booking no longer has it");
                    UnitOutcome::Dispatched
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        booking = %key,
                        kind = kind.as_str(),
                        "reminder sent but status not stored, may be sent again"
                    );
                    UnitOutcome::CommitFailed
                }
            }
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    booking = %key,
                    kind = kind.as_str(),
                    "reminder dispatch task aborted"
                );
                UnitOutcome::SendFailed
            }
        }
    }

    /// Ticks forever on a fixed interval. The first tick runs immediately.
    pub async fn run(self: Arc<Self>, every: std::time::Duration) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            every_secs = every.as_secs(),
            window_mins = self.window.num_minutes(),
            "reminder scheduler started"
        );

        loop {
            interval.tick().await;
            self.tick(Utc::now()).await;
        }
    }
}
