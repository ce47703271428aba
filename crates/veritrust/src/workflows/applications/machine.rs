//! Review status machine.
//!
//! One enumeration covers both the plain review flow
//! (`pending -> reviewed -> accepted | rejected`) and the proof-of-placement flow
//! (`reviewed -> approved -> pending_for_proof -> verified`). Every legal move is listed
//! in [`TRANSITIONS`]; anything else is refused without touching the record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, ProofArtifact, Role};

/// Closed set of review states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Reviewed,
    Accepted,
    Rejected,
    Approved,
    PendingForProof,
    Verified,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 7] = [
        ApplicationStatus::Pending,
        ApplicationStatus::Reviewed,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
        ApplicationStatus::Approved,
        ApplicationStatus::PendingForProof,
        ApplicationStatus::Verified,
    ];

    /// Stored wire value.
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Reviewed => "reviewed",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::PendingForProof => "pending_for_proof",
            ApplicationStatus::Verified => "verified",
        }
    }

    /// Strict parse of a stored value. `under_review` is the legacy spelling of `reviewed`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "pending" => Some(ApplicationStatus::Pending),
            "reviewed" | "under_review" => Some(ApplicationStatus::Reviewed),
            "accepted" => Some(ApplicationStatus::Accepted),
            "rejected" => Some(ApplicationStatus::Rejected),
            "approved" => Some(ApplicationStatus::Approved),
            "pending_for_proof" => Some(ApplicationStatus::PendingForProof),
            "verified" => Some(ApplicationStatus::Verified),
            _ => None,
        }
    }

    /// Read-time normalization: anything unrecognized is treated as `pending`.
    pub fn normalize(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(ApplicationStatus::Pending)
    }

    pub const fn display_label(self, viewer: Role) -> &'static str {
        match (self, viewer) {
            (ApplicationStatus::Pending, _) => "Pending",
            (ApplicationStatus::Reviewed, Role::Candidate) => "Under Review",
            (ApplicationStatus::Reviewed, Role::Company) => "Reviewed",
            (ApplicationStatus::Accepted, _) => "Accepted",
            (ApplicationStatus::Rejected, _) => "Rejected",
            (ApplicationStatus::Approved, _) => "Approved",
            (ApplicationStatus::PendingForProof, Role::Candidate) => "Awaiting Your Confirmation",
            (ApplicationStatus::PendingForProof, Role::Company) => "Proof Uploaded",
            (ApplicationStatus::Verified, _) => "Verified",
        }
    }

    /// Every legal move out of this state, regardless of actor.
    pub fn allowed_next(self) -> impl Iterator<Item = ApplicationStatus> {
        TRANSITIONS
            .iter()
            .filter(move |rule| rule.from == self)
            .map(|rule| rule.to)
    }

    /// Moves out of this state the given role may request.
    pub fn actions_for(self, actor: Role) -> Vec<ApplicationStatus> {
        TRANSITIONS
            .iter()
            .filter(|rule| rule.from == self && rule.actor == actor)
            .map(|rule| rule.to)
            .collect()
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().next().is_none()
    }
}

/// Extra condition a transition carries beyond the source state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionGuard {
    None,
    ProofAttached,
    ConfirmationProvided,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub actor: Role,
    pub guard: TransitionGuard,
}

const fn rule(
    from: ApplicationStatus,
    to: ApplicationStatus,
    actor: Role,
    guard: TransitionGuard,
) -> TransitionRule {
    TransitionRule {
        from,
        to,
        actor,
        guard,
    }
}

pub static TRANSITIONS: [TransitionRule; 7] = [
    rule(
        ApplicationStatus::Pending,
        ApplicationStatus::Reviewed,
        Role::Company,
        TransitionGuard::None,
    ),
    rule(
        ApplicationStatus::Pending,
        ApplicationStatus::Rejected,
        Role::Company,
        TransitionGuard::None,
    ),
    rule(
        ApplicationStatus::Reviewed,
        ApplicationStatus::Accepted,
        Role::Company,
        TransitionGuard::None,
    ),
    rule(
        ApplicationStatus::Reviewed,
        ApplicationStatus::Approved,
        Role::Company,
        TransitionGuard::None,
    ),
    rule(
        ApplicationStatus::Reviewed,
        ApplicationStatus::Rejected,
        Role::Company,
        TransitionGuard::None,
    ),
    rule(
        ApplicationStatus::Approved,
        ApplicationStatus::PendingForProof,
        Role::Company,
        TransitionGuard::ProofAttached,
    ),
    rule(
        ApplicationStatus::PendingForProof,
        ApplicationStatus::Verified,
        Role::Candidate,
        TransitionGuard::ConfirmationProvided,
    ),
];

/// Mutation request issued by either observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub application_id: ApplicationId,
    pub requested: ApplicationStatus,
    #[serde(default)]
    pub proof: Option<ProofArtifact>,
    #[serde(default)]
    pub confirmation: Option<String>,
}

impl TransitionRequest {
    pub fn new(application_id: ApplicationId, requested: ApplicationStatus) -> Self {
        Self {
            application_id,
            requested,
            proof: None,
            confirmation: None,
        }
    }

    pub fn with_proof(mut self, proof: ProofArtifact) -> Self {
        self.proof = Some(proof);
        self
    }

    pub fn with_confirmation(mut self, confirmation: impl Into<String>) -> Self {
        self.confirmation = Some(confirmation.into());
        self
    }
}

/// Field updates produced by a successful transition, applied atomically by the store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub action_date: DateTime<Utc>,
    pub verification_date: Option<DateTime<Utc>>,
    pub proof: Option<ProofArtifact>,
    pub confirmation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot move application from {} to {}", .from.label(), .to.label())]
    NotAllowed {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error(
        "{} may not move application from {} to {}",
        .actor.label(),
        .from.label(),
        .to.label()
    )]
    WrongActor {
        actor: Role,
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("moving to pending_for_proof requires an uploaded proof document")]
    MissingProof,
    #[error("verification requires a non-empty confirmation")]
    MissingConfirmation,
}

/// Pure transition planning.
///
/// `current` must already be normalized (see [`ApplicationStatus::normalize`]).
pub fn plan(
    current: ApplicationStatus,
    actor: Role,
    request: &TransitionRequest,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, TransitionError> {
    let to = request.requested;
    let rule = TRANSITIONS
        .iter()
        .find(|rule| rule.from == current && rule.to == to)
        .ok_or(TransitionError::NotAllowed { from: current, to })?;

    if rule.actor != actor {
        return Err(TransitionError::WrongActor {
            actor,
            from: current,
            to,
        });
    }

    let mut plan = TransitionPlan {
        from: current,
        to,
        action_date: now,
        verification_date: None,
        proof: None,
        confirmation: None,
    };

    match rule.guard {
        TransitionGuard::None => {}
        TransitionGuard::ProofAttached => {
            let proof = request
                .proof
                .as_ref()
                .filter(|proof| proof.is_attached())
                .ok_or(TransitionError::MissingProof)?;
            plan.proof = Some(proof.clone());
        }
        TransitionGuard::ConfirmationProvided => {
            let confirmation = request
                .confirmation
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .ok_or(TransitionError::MissingConfirmation)?;
            plan.confirmation = Some(confirmation.to_string());
            plan.verification_date = Some(now);
        }
    }

    Ok(plan)
}
