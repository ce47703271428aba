use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::applications::domain::{
    ApplicationId, ApplicationRecord, CompanyId, JobId, JobPosting, ProofArtifact, Session,
};
use crate::workflows::applications::feed::{ApplicationFilter, Subscription};
use crate::workflows::applications::repository::{
    ApplicationStore, Clock, InMemoryApplicationStore, InMemoryJobDirectory, StoreError,
};
use crate::workflows::applications::{application_router, ApplicationService};

pub(super) type MemoryService = ApplicationService<InMemoryApplicationStore, InMemoryJobDirectory>;

/// Clock that advances one minute per reading so successive stamps are distinguishable.
pub(super) struct SteppingClock {
    next: Mutex<DateTime<Utc>>,
}

impl SteppingClock {
    pub(super) fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            next: Mutex::new(start),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut guard = self.next.lock().expect("clock mutex poisoned");
        let current = *guard;
        *guard = current + Duration::minutes(1);
        current
    }
}

pub(super) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn acme() -> Session {
    Session::company("co-acme")
}

pub(super) fn globex() -> Session {
    Session::company("co-globex")
}

pub(super) fn sam() -> Session {
    Session::candidate("cand-sam")
}

pub(super) fn riley() -> Session {
    Session::candidate("cand-riley")
}

pub(super) fn backend_intern() -> JobId {
    JobId::new("job-backend-intern")
}

pub(super) fn data_analyst() -> JobId {
    JobId::new("job-data-analyst")
}

pub(super) fn jobs() -> InMemoryJobDirectory {
    InMemoryJobDirectory::with_jobs([
        JobPosting {
            job_id: backend_intern(),
            owner_company_id: CompanyId::new("co-acme"),
            title: "Backend Intern".to_string(),
            company_name: "Acme Corp".to_string(),
        },
        JobPosting {
            job_id: data_analyst(),
            owner_company_id: CompanyId::new("co-globex"),
            title: "Data Analyst".to_string(),
            company_name: "Globex".to_string(),
        },
    ])
}

pub(super) fn proof() -> ProofArtifact {
    ProofArtifact {
        storage_key: "proofs/co-acme/offer-letter.pdf".to_string(),
        file_name: "offer-letter.pdf".to_string(),
    }
}

pub(super) fn build_service() -> (MemoryService, Arc<InMemoryApplicationStore>) {
    let store = Arc::new(InMemoryApplicationStore::default());
    let service = ApplicationService::with_clock(
        store.clone(),
        Arc::new(jobs()),
        Arc::new(SteppingClock::starting_at(start_time())),
    );
    (service, store)
}

/// Service plus one application from Sam to Acme's backend internship.
pub(super) fn service_with_application() -> (MemoryService, Arc<InMemoryApplicationStore>, ApplicationId)
{
    let (service, store) = build_service();
    let record = service
        .apply(Some(&sam()), &backend_intern(), "Sam Carter")
        .expect("application submitted");
    (service, store, record.id)
}

/// Overwrite the stored status string directly, bypassing the status machine.
pub(super) fn force_status(store: &InMemoryApplicationStore, id: &ApplicationId, raw: &str) {
    let mut record = store
        .fetch(id)
        .expect("store reachable")
        .expect("record present");
    record.stored_status = raw.to_string();
    store.update(record).expect("raw write succeeds");
}

pub(super) fn application_router_with_service(service: MemoryService) -> axum::Router {
    application_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Which store call parks until the test releases it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum GatePoint {
    Query,
    Update,
}

/// Store that parks one kind of call until the test releases it, to hold work in flight.
pub(super) struct GatedStore {
    inner: InMemoryApplicationStore,
    point: GatePoint,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

pub(super) struct Gate {
    pub(super) entered: Receiver<()>,
    pub(super) release: Sender<()>,
}

impl GatedStore {
    pub(super) fn new(point: GatePoint) -> (Self, Gate) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        (
            Self {
                inner: InMemoryApplicationStore::default(),
                point,
                entered: Mutex::new(entered_tx),
                release: Mutex::new(release_rx),
            },
            Gate {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }

    fn park(&self, at: GatePoint) {
        if self.point != at {
            return;
        }
        self.entered
            .lock()
            .expect("gate mutex poisoned")
            .send(())
            .expect("test listening");
        self.release
            .lock()
            .expect("gate mutex poisoned")
            .recv()
            .expect("test releases gate");
    }

    pub(super) fn records(&self) -> &InMemoryApplicationStore {
        &self.inner
    }
}

impl ApplicationStore for GatedStore {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, StoreError> {
        self.inner.insert(record)
    }

    fn update(&self, record: ApplicationRecord) -> Result<ApplicationRecord, StoreError> {
        self.park(GatePoint::Update);
        self.inner.update(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError> {
        self.inner.fetch(id)
    }

    fn query(&self, filter: &ApplicationFilter) -> Result<Vec<ApplicationRecord>, StoreError> {
        self.park(GatePoint::Query);
        self.inner.query(filter)
    }

    fn subscribe(&self, filter: ApplicationFilter) -> Result<Subscription, StoreError> {
        self.inner.subscribe(filter)
    }
}
