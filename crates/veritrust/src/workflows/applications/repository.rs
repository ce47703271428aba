use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use tracing::warn;

use super::domain::{ApplicationId, ApplicationRecord, JobId, JobPosting};
use super::feed::{ApplicationFilter, SnapshotFeed, Subscription};
use crate::config::StoreConfig;

/// Storage abstraction so the service can be exercised against any document store.
///
/// Writes are whole-record replacements; the last write wins.
pub trait ApplicationStore: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, StoreError>;
    fn update(&self, record: ApplicationRecord) -> Result<ApplicationRecord, StoreError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError>;
    fn query(&self, filter: &ApplicationFilter) -> Result<Vec<ApplicationRecord>, StoreError>;
    fn subscribe(&self, filter: ApplicationFilter) -> Result<Subscription, StoreError>;
}

/// Read access to authoritative job postings.
pub trait JobDirectory: Send + Sync {
    fn job(&self, id: &JobId) -> Result<Option<JobPosting>, StoreError>;
}

/// Time source for `applied_at` and per-transition stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Process-local store backed by a map and a [`SnapshotFeed`].
///
/// `set_available(false)` makes every call fail with [`StoreError::Unavailable`], which is
/// how outages are simulated.
pub struct InMemoryApplicationStore {
    records: Mutex<BTreeMap<ApplicationId, ApplicationRecord>>,
    feed: SnapshotFeed,
    available: AtomicBool,
}

impl Default for InMemoryApplicationStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

impl InMemoryApplicationStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            feed: SnapshotFeed::new(config.subscription_capacity),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn live_subscriptions(&self) -> usize {
        self.feed.live_subscriptions()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<ApplicationId, ApplicationRecord>>, StoreError> {
        if !self.available.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        self.records.lock().map_err(|_| {
            warn!("application store mutex poisoned");
            StoreError::Unavailable("store lock poisoned".to_string())
        })
    }
}

fn ordered(mut records: Vec<ApplicationRecord>) -> Vec<ApplicationRecord> {
    records.sort_by(|a, b| a.applied_at.cmp(&b.applied_at).then_with(|| a.id.cmp(&b.id)));
    records
}

impl ApplicationStore for InMemoryApplicationStore {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, StoreError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&record.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        self.feed.publish(record.clone());
        Ok(record)
    }

    fn update(&self, record: ApplicationRecord) -> Result<ApplicationRecord, StoreError> {
        let mut guard = self.lock()?;
        if !guard.contains_key(&record.id) {
            return Err(StoreError::NotFound);
        }
        guard.insert(record.id.clone(), record.clone());
        self.feed.publish(record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.get(id).cloned())
    }

    fn query(&self, filter: &ApplicationFilter) -> Result<Vec<ApplicationRecord>, StoreError> {
        let guard = self.lock()?;
        Ok(ordered(
            guard
                .values()
                .filter(|record| filter.matches(record))
                .cloned()
                .collect(),
        ))
    }

    fn subscribe(&self, filter: ApplicationFilter) -> Result<Subscription, StoreError> {
        let guard = self.lock()?;
        let initial = ordered(
            guard
                .values()
                .filter(|record| filter.matches(record))
                .cloned()
                .collect(),
        );
        let subscription = self.feed.subscribe(filter, initial);
        drop(guard);
        Ok(subscription)
    }
}

/// Process-local job postings keyed by id.
#[derive(Default)]
pub struct InMemoryJobDirectory {
    jobs: RwLock<HashMap<JobId, JobPosting>>,
}

impl InMemoryJobDirectory {
    pub fn with_jobs(postings: impl IntoIterator<Item = JobPosting>) -> Self {
        let jobs = postings
            .into_iter()
            .map(|posting| (posting.job_id.clone(), posting))
            .collect();
        Self {
            jobs: RwLock::new(jobs),
        }
    }

    pub fn publish(&self, posting: JobPosting) -> Result<(), StoreError> {
        let mut guard = self
            .jobs
            .write()
            .map_err(|_| StoreError::Unavailable("job directory lock poisoned".to_string()))?;
        guard.insert(posting.job_id.clone(), posting);
        Ok(())
    }
}

impl JobDirectory for InMemoryJobDirectory {
    fn job(&self, id: &JobId) -> Result<Option<JobPosting>, StoreError> {
        let guard = self
            .jobs
            .read()
            .map_err(|_| StoreError::Unavailable("job directory lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }
}
