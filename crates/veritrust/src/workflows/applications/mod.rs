//! Application review workflow: the status machine, the store seam with live
//! snapshot subscriptions, role-specific read models, and the HTTP surface.

pub mod domain;
pub mod feed;
pub mod machine;
pub mod repository;
pub mod router;
pub mod service;
pub mod views;

#[cfg(test)]
mod tests;

pub use domain::{
    ApplicationId, ApplicationRecord, ApplicationSnapshot, CandidateId, CompanyId, JobId,
    JobPosting, ProofArtifact, Role, Session,
};
pub use feed::{ApplicationFilter, SnapshotFeed, Subscription};
pub use machine::{
    ApplicationStatus, TransitionError, TransitionPlan, TransitionRequest, TRANSITIONS,
};
pub use repository::{
    ApplicationStore, Clock, InMemoryApplicationStore, InMemoryJobDirectory, JobDirectory,
    StoreError, SystemClock,
};
pub use router::{application_router, ROLE_HEADER, USER_HEADER};
pub use service::{ApplicationService, ApplicationServiceError};
pub use views::{ApplicationBoard, ApplicationView, TimelineEntry};
