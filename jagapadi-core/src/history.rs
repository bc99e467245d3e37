//! Bounded, persisted history of detection records.
//!
//! The log is most-recent-first and never holds more than
//! [`HISTORY_CAPACITY`] records. Persistence is best-effort: a failing store
//! is logged and otherwise ignored.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{Local, NaiveDate, TimeZone};
use tokio::sync::watch;

use crate::report;
use crate::service::ServiceClient;
use crate::store::{KeyValueStore, HISTORY_KEY};
use crate::types::{DailyStats, DetectionRecord, HISTORY_CAPACITY};

/// Where [`HistoryStore::load`] found its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySource {
    Remote,
    Local,
    Empty,
}

/// Owner of the history log.
pub struct HistoryStore {
    records: RwLock<Vec<DetectionRecord>>,
    store: Arc<dyn KeyValueStore>,
    stats: watch::Sender<DailyStats>,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (stats, _) = watch::channel(DailyStats::default());
        Self {
            records: RwLock::new(Vec::new()),
            store,
            stats,
        }
    }

    /// Insert `record` as the most recent entry, evicting the oldest beyond capacity.
    pub fn append(&self, record: DetectionRecord) {
        {
            let mut records = self.write();
            records.insert(0, record);
            records.truncate(HISTORY_CAPACITY);
        }
        self.persist();
        self.refresh_stats();
    }

    /// Populate the log: the service's history first, then the local copy.
    pub async fn load(&self, client: &ServiceClient) -> HistorySource {
        let source = match client.history().await {
            Ok(entries) => {
                let fetched = entries.len();
                let records: Vec<DetectionRecord> = entries
                    .into_iter()
                    .filter_map(|entry| entry.into_record())
                    .collect();
                if records.len() < fetched {
                    tracing::warn!(
                        skipped = fetched - records.len(),
                        "Dropped remote history entries without a usable timestamp"
                    );
                }
                self.replace(records);
                HistorySource::Remote
            }
            Err(e) => {
                tracing::info!(error = %e, "Failed to load history from service, using local copy");
                self.load_local()
            }
        };

        tracing::info!(records = self.len(), source = ?source, "History loaded");
        source
    }

    /// Populate the log from the local store only.
    pub fn load_local(&self) -> HistorySource {
        match self.read_persisted() {
            Some(records) => {
                self.replace(records);
                HistorySource::Local
            }
            None => {
                self.replace(Vec::new());
                HistorySource::Empty
            }
        }
    }

    /// Linear lookup by record id.
    pub fn find_by_id(&self, id: &str) -> Option<DetectionRecord> {
        self.read().iter().find(|r| r.id() == id).cloned()
    }

    /// Snapshot of the log, most recent first.
    pub fn records(&self) -> Vec<DetectionRecord> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Stats for today in local time.
    pub fn daily_stats(&self) -> DailyStats {
        self.daily_stats_on(Local::now().date_naive(), &Local)
    }

    /// Stats for `day` as observed in `tz`.
    pub fn daily_stats_on<Tz: TimeZone>(&self, day: NaiveDate, tz: &Tz) -> DailyStats {
        compute_daily_stats(&self.read(), day, tz)
    }

    /// Watch today's stats; updated on every change to the log.
    pub fn subscribe_stats(&self) -> watch::Receiver<DailyStats> {
        self.stats.subscribe()
    }

    /// Text report for one record, if it exists.
    pub fn generate_report(&self, id: &str) -> Option<String> {
        self.find_by_id(id).map(|record| report::generate_report(&record))
    }

    /// Forget all records locally and, when given a client, on the service.
    pub async fn clear(&self, client: Option<&ServiceClient>) {
        self.write().clear();
        if let Err(e) = self.store.remove(HISTORY_KEY) {
            tracing::warn!(error = %e, "Failed to remove persisted history");
        }
        self.refresh_stats();

        if let Some(client) = client {
            match client.clear_history().await {
                Ok(message) => tracing::info!(%message, "Cleared service history"),
                Err(e) => tracing::warn!(error = %e, "Failed to clear service history"),
            }
        }
    }

    fn replace(&self, mut records: Vec<DetectionRecord>) {
        records.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        records.truncate(HISTORY_CAPACITY);
        *self.write() = records;
        self.refresh_stats();
    }

    fn read_persisted(&self) -> Option<Vec<DetectionRecord>> {
        let raw = match self.store.get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "History store unavailable");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(records) => Some(records),
            Err(e) => {
                tracing::warn!(error = %e, "Persisted history is corrupt, ignoring it");
                None
            }
        }
    }

    fn persist(&self) {
        let serialized = match serde_json::to_string(&*self.read()) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize history");
                return;
            }
        };
        if let Err(e) = self.store.set(HISTORY_KEY, &serialized) {
            tracing::warn!(error = %e, "History not saved");
        }
    }

    fn refresh_stats(&self) {
        let stats = self.daily_stats();
        self.stats.send_replace(stats);
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<DetectionRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<DetectionRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Aggregate the records whose timestamp falls on `day` in `tz`.
pub fn compute_daily_stats<Tz: TimeZone>(
    records: &[DetectionRecord],
    day: NaiveDate,
    tz: &Tz,
) -> DailyStats {
    let todays: Vec<&DetectionRecord> = records
        .iter()
        .filter(|r| r.timestamp().with_timezone(tz).date_naive() == day)
        .collect();

    if todays.is_empty() {
        return DailyStats::default();
    }

    let detections = todays.iter().map(|r| r.total_detections()).sum();
    let confidence_sum: u64 = todays.iter().map(|r| u64::from(r.avg_confidence())).sum();
    let n = todays.len() as u64;

    DailyStats {
        detections,
        // Mean rounded half up.
        accuracy: ((confidence_sum * 2 + n) / (2 * n)) as u8,
    }
}
