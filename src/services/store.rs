use async_trait::async_trait;

use crate::errors::StoreError;
use crate::models::{Booking, BookingFields, BookingKey, ReminderKind, ReminderStatus};

/// One page of a full scan.
#[derive(Debug, Default)]
pub struct ScanPage {
    pub bookings: Vec<Booking>,
    /// Where the next page starts; `None` once the scan is exhausted. May be
    /// set even when `bookings` is short, because unreadable records are
    /// skipped but still advance the cursor.
    pub next: Option<BookingKey>,
}

/// Persistent bookings keyed by (customer id, booking id).
///
/// Every write is a merge: fields that are not supplied keep their stored
/// value. A reminder status that reached `sent` never goes back to `pending`.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Creates the record if absent, otherwise merges the supplied fields.
    async fn upsert_merge(&self, key: &BookingKey, fields: &BookingFields) -> Result<(), StoreError>;

    /// Reads up to `limit` bookings after `after`. Callers must not rely on
    /// the order between pages beyond the cursor contract.
    async fn scan_page(&self, after: Option<&BookingKey>, limit: usize) -> Result<ScanPage, StoreError>;

    /// Point update of one reminder status. Returns `false` if the booking or
    /// its reminder does not exist.
    async fn update_status(
        &self,
        key: &BookingKey,
        kind: ReminderKind,
        status: ReminderStatus,
    ) -> Result<bool, StoreError>;

    async fn get(&self, key: &BookingKey) -> Result<Option<Booking>, StoreError>;
}

/// Lazy full scan over a store, fetched one page at a time. Dropping it and
/// creating a new one restarts from the beginning.
pub struct BookingScan<'a> {
    store: &'a dyn BookingStore,
    cursor: Option<BookingKey>,
    page_size: usize,
    done: bool,
}

impl<'a> BookingScan<'a> {
    pub fn new(store: &'a dyn BookingStore, page_size: usize) -> Self {
        Self {
            store,
            cursor: None,
            page_size: page_size.max(1),
            done: false,
        }
    }

    /// Next batch of bookings, or `None` when the scan is finished.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Booking>>, StoreError> {
        if self.done {
            return Ok(None);
        }

        let page = self
            .store
            .scan_page(self.cursor.as_ref(), self.page_size)
            .await?;

        match page.next {
            Some(next) => self.cursor = Some(next),
            None => self.done = true,
        }
        Ok(Some(page.bookings))
    }

    /// Drains the remaining pages.
    pub async fn collect(mut self) -> Result<Vec<Booking>, StoreError> {
        let mut all = vec![];
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}
