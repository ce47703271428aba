use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use tracing::{info, warn};

use super::domain::{
    ApplicationId, ApplicationRecord, ApplicationSnapshot, CandidateId, JobId, Role, Session,
};
use super::feed::{ApplicationFilter, Subscription};
use super::machine::{self, ApplicationStatus, TransitionError, TransitionRequest};
use super::repository::{ApplicationStore, Clock, JobDirectory, StoreError, SystemClock};
use super::views::ApplicationView;

/// Service composing the store, job directory and status machine.
pub struct ApplicationService<S, J> {
    store: Arc<S>,
    jobs: Arc<J>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<HashSet<ApplicationId>>,
    applying: Mutex<HashSet<(CandidateId, JobId)>>,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

fn authenticated(session: Option<&Session>) -> Result<&Session, ApplicationServiceError> {
    session.ok_or(ApplicationServiceError::AuthRequired)
}

impl<S, J> ApplicationService<S, J>
where
    S: ApplicationStore + 'static,
    J: JobDirectory + 'static,
{
    pub fn new(store: Arc<S>, jobs: Arc<J>) -> Self {
        Self::with_clock(store, jobs, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, jobs: Arc<J>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            jobs,
            clock,
            in_flight: Mutex::new(HashSet::new()),
            applying: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Candidate applies to a job. The company is always taken from the job's owner.
    ///
    /// The duplicate check and the insert run under one (candidate, job) slot, so two
    /// concurrent applies to the same job cannot both land.
    pub fn apply(
        &self,
        session: Option<&Session>,
        job_id: &JobId,
        candidate_name: &str,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        let session = authenticated(session)?;
        let candidate_id = session
            .candidate_id()
            .ok_or(ApplicationServiceError::Forbidden {
                reason: "only candidates can apply to jobs",
            })?;

        let job = self
            .jobs
            .job(job_id)?
            .ok_or_else(|| ApplicationServiceError::JobNotFound(job_id.clone()))?;

        let Some(_slot) = claim(&self.applying, (candidate_id.clone(), job_id.clone()))? else {
            return Err(ApplicationServiceError::AlreadyApplied(job_id.clone()));
        };

        let existing = self
            .store
            .query(&ApplicationFilter::Candidate(candidate_id.clone()))?;
        if existing.iter().any(|record| &record.job_id == job_id) {
            return Err(ApplicationServiceError::AlreadyApplied(job_id.clone()));
        }

        let candidate_name = match candidate_name.trim() {
            "" => candidate_id.0.clone(),
            name => name.to_string(),
        };

        let record = ApplicationRecord {
            id: next_application_id(),
            candidate_id,
            job_id: job.job_id.clone(),
            company_id: job.owner_company_id.clone(),
            stored_status: ApplicationStatus::Pending.label().to_string(),
            applied_at: self.clock.now(),
            action_date: None,
            verification_date: None,
            proof: None,
            confirmation: None,
            snapshot: ApplicationSnapshot {
                job_title: job.title,
                company_name: job.company_name,
                candidate_name,
            },
        };

        let stored = self.store.insert(record).map_err(|err| match err {
            StoreError::Conflict => ApplicationServiceError::AlreadyApplied(job_id.clone()),
            other => other.into(),
        })?;
        info!(
            application_id = %stored.id,
            job_id = %stored.job_id,
            company_id = %stored.company_id,
            "application submitted"
        );
        Ok(stored)
    }

    /// Move an application through the status machine and persist the result.
    ///
    /// On any failure the stored record is left as it was.
    pub fn transition(
        &self,
        session: Option<&Session>,
        request: TransitionRequest,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        let session = authenticated(session)?;
        let Some(_slot) = claim(&self.in_flight, request.application_id.clone())? else {
            return Err(ApplicationServiceError::TransitionInFlight(
                request.application_id.clone(),
            ));
        };

        let record = self.owned_record(session, &request.application_id)?;
        let current = record.status();
        if !record.status_recognized() {
            warn!(
                application_id = %record.id,
                stored_status = %record.stored_status,
                "unrecognized stored status, treating as pending"
            );
        }

        let plan = machine::plan(current, session.role, &request, self.clock.now())?;
        let next = record.with_transition(&plan);

        match self.store.update(next) {
            Ok(stored) => {
                info!(
                    application_id = %stored.id,
                    from = plan.from.label(),
                    to = plan.to.label(),
                    actor = session.role.label(),
                    "application status changed"
                );
                Ok(stored)
            }
            Err(err) => {
                warn!(
                    application_id = %record.id,
                    to = plan.to.label(),
                    error = %err,
                    "status change not persisted"
                );
                Err(err.into())
            }
        }
    }

    pub fn get(&self, id: &ApplicationId) -> Result<ApplicationRecord, ApplicationServiceError> {
        self.store
            .fetch(id)?
            .ok_or_else(|| ApplicationServiceError::NotFound(id.clone()))
    }

    /// Role-specific view of one application the session is party to.
    pub fn view(
        &self,
        session: Option<&Session>,
        id: &ApplicationId,
    ) -> Result<ApplicationView, ApplicationServiceError> {
        let session = authenticated(session)?;
        let record = self.owned_record(session, id)?;
        Ok(ApplicationView::derive(&record, session.role))
    }

    /// Every application the session is party to, oldest first.
    pub fn list_for(
        &self,
        session: Option<&Session>,
    ) -> Result<Vec<ApplicationView>, ApplicationServiceError> {
        let session = authenticated(session)?;
        let records = self.store.query(&ApplicationFilter::for_session(session))?;
        Ok(records
            .iter()
            .map(|record| ApplicationView::derive(record, session.role))
            .collect())
    }

    /// Live feed of the session's applications.
    pub fn subscribe_for(
        &self,
        session: Option<&Session>,
    ) -> Result<Subscription, ApplicationServiceError> {
        let session = authenticated(session)?;
        Ok(self
            .store
            .subscribe(ApplicationFilter::for_session(session))?)
    }

    fn owned_record(
        &self,
        session: &Session,
        id: &ApplicationId,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        let record = self.get(id)?;
        if !record.is_visible_to(session) {
            return Err(ApplicationServiceError::Forbidden {
                reason: match session.role {
                    Role::Candidate => "application belongs to another candidate",
                    Role::Company => "application was sent to another company",
                },
            });
        }
        Ok(record)
    }
}

/// Reserve `key` in `registry`. `None` when another caller already holds it.
fn claim<K: Hash + Eq + Clone>(
    registry: &Mutex<HashSet<K>>,
    key: K,
) -> Result<Option<InFlightSlot<'_, K>>, StoreError> {
    let mut guard = registry
        .lock()
        .map_err(|_| StoreError::Unavailable("in-flight registry poisoned".to_string()))?;
    if !guard.insert(key.clone()) {
        return Ok(None);
    }
    Ok(Some(InFlightSlot { registry, key }))
}

/// Marks a key as having a write outstanding until dropped.
struct InFlightSlot<'a, K: Hash + Eq> {
    registry: &'a Mutex<HashSet<K>>,
    key: K,
}

impl<K: Hash + Eq> Drop for InFlightSlot<'_, K> {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.registry.lock() {
            guard.remove(&self.key);
        }
    }
}

/// Error raised by the application service.
#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error("sign in required")]
    AuthRequired,
    #[error("forbidden: {reason}")]
    Forbidden { reason: &'static str },
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("already applied to job {0}")]
    AlreadyApplied(JobId),
    #[error("a status change for application {0} is already in progress")]
    TransitionInFlight(ApplicationId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("application store error: {0}")]
    Persistence(#[from] StoreError),
}

impl ApplicationServiceError {
    /// Whether repeating the same request later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApplicationServiceError::Persistence(StoreError::Unavailable(_))
                | ApplicationServiceError::TransitionInFlight(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApplicationServiceError::AuthRequired => StatusCode::UNAUTHORIZED,
            ApplicationServiceError::Forbidden { .. }
            | ApplicationServiceError::Transition(TransitionError::WrongActor { .. }) => {
                StatusCode::FORBIDDEN
            }
            ApplicationServiceError::JobNotFound(_) | ApplicationServiceError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ApplicationServiceError::AlreadyApplied(_)
            | ApplicationServiceError::TransitionInFlight(_) => StatusCode::CONFLICT,
            ApplicationServiceError::Transition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApplicationServiceError::Persistence(StoreError::Unavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApplicationServiceError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
