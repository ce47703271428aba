use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::machine::{ApplicationStatus, TransitionPlan};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Identifier wrapper for submitted applications.
    ApplicationId
);
opaque_id!(
    /// Candidate (student) account identifier.
    CandidateId
);
opaque_id!(
    /// Job posting identifier.
    JobId
);
opaque_id!(
    /// Company (recruiter) account identifier.
    CompanyId
);

/// The two account kinds on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Candidate,
    Company,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Candidate => "candidate",
            Role::Company => "company",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "candidate" | "student" => Some(Role::Candidate),
            "company" | "recruiter" => Some(Role::Company),
            _ => None,
        }
    }
}

/// Acting identity supplied by the identity provider and passed explicitly to every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub role: Role,
}

impl Session {
    pub fn candidate(id: impl Into<String>) -> Self {
        Self {
            user_id: id.into(),
            role: Role::Candidate,
        }
    }

    pub fn company(id: impl Into<String>) -> Self {
        Self {
            user_id: id.into(),
            role: Role::Company,
        }
    }

    pub fn candidate_id(&self) -> Option<CandidateId> {
        (self.role == Role::Candidate).then(|| CandidateId(self.user_id.clone()))
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        (self.role == Role::Company).then(|| CompanyId(self.user_id.clone()))
    }
}

/// Authoritative job record; `owner_company_id` is the only valid source of an application's company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    pub job_id: JobId,
    pub owner_company_id: CompanyId,
    pub title: String,
    pub company_name: String,
}

/// Reference to an uploaded proof document. The bytes live in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofArtifact {
    pub storage_key: String,
    pub file_name: String,
}

impl ProofArtifact {
    pub fn is_attached(&self) -> bool {
        !self.storage_key.trim().is_empty()
    }
}

/// Display copies captured when the candidate applies. Never re-synced afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSnapshot {
    pub job_title: String,
    pub company_name: String,
    pub candidate_name: String,
}

/// Persisted application document.
///
/// `status` holds the raw stored value so that corrupt or legacy strings survive a
/// round-trip untouched; consumers read it through [`ApplicationRecord::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub candidate_id: CandidateId,
    pub job_id: JobId,
    pub company_id: CompanyId,
    #[serde(rename = "status")]
    pub stored_status: String,
    pub applied_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<ProofArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<String>,
    pub snapshot: ApplicationSnapshot,
}

impl ApplicationRecord {
    /// Status normalized at read time; unrecognized values read as `pending`.
    pub fn status(&self) -> ApplicationStatus {
        ApplicationStatus::normalize(&self.stored_status)
    }

    pub fn status_recognized(&self) -> bool {
        ApplicationStatus::parse(&self.stored_status).is_some()
    }

    /// Copy of this record with a planned transition applied. `applied_at` is carried over untouched.
    pub fn with_transition(&self, plan: &TransitionPlan) -> ApplicationRecord {
        let mut next = self.clone();
        next.stored_status = plan.to.label().to_string();
        next.action_date = Some(plan.action_date);
        if let Some(verified_at) = plan.verification_date {
            next.verification_date = Some(verified_at);
        }
        if let Some(proof) = &plan.proof {
            next.proof = Some(proof.clone());
        }
        if let Some(confirmation) = &plan.confirmation {
            next.confirmation = Some(confirmation.clone());
        }
        next
    }

    pub fn is_visible_to(&self, session: &Session) -> bool {
        match session.role {
            Role::Candidate => self.candidate_id.0 == session.user_id,
            Role::Company => self.company_id.0 == session.user_id,
        }
    }
}
