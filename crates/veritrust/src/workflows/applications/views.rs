use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::domain::{ApplicationId, ApplicationRecord, ProofArtifact, Role};
use super::feed::Subscription;
use super::machine::ApplicationStatus;

/// Role-specific rendering of one application, derived from a single full snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationView {
    pub application_id: ApplicationId,
    pub viewer: Role,
    pub status: ApplicationStatus,
    pub status_label: &'static str,
    pub status_recognized: bool,
    pub allowed_actions: Vec<ApplicationStatus>,
    pub job_title: String,
    pub company_name: String,
    pub candidate_name: String,
    pub timeline: Vec<TimelineEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<ProofArtifact>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub label: String,
    pub at: DateTime<Utc>,
}

impl ApplicationView {
    pub fn derive(record: &ApplicationRecord, viewer: Role) -> Self {
        let status = record.status();

        let mut timeline = vec![TimelineEntry {
            label: "Applied".to_string(),
            at: record.applied_at,
        }];
        if let Some(at) = record.action_date {
            timeline.push(TimelineEntry {
                label: status.display_label(viewer).to_string(),
                at,
            });
        }
        if let Some(at) = record.verification_date {
            if status != ApplicationStatus::Verified || record.action_date != Some(at) {
                timeline.push(TimelineEntry {
                    label: "Verified".to_string(),
                    at,
                });
            }
        }

        Self {
            application_id: record.id.clone(),
            viewer,
            status,
            status_label: status.display_label(viewer),
            status_recognized: record.status_recognized(),
            allowed_actions: status.actions_for(viewer),
            job_title: record.snapshot.job_title.clone(),
            company_name: record.snapshot.company_name.clone(),
            candidate_name: record.snapshot.candidate_name.clone(),
            timeline,
            proof: record.proof.clone(),
        }
    }
}

/// An observer's local copy of the records it follows.
///
/// Each incoming snapshot replaces the previous copy wholesale; views are always
/// re-derived from the latest snapshot, never from accumulated changes.
#[derive(Debug, Clone)]
pub struct ApplicationBoard {
    viewer: Role,
    records: BTreeMap<ApplicationId, ApplicationRecord>,
}

impl ApplicationBoard {
    pub fn new(viewer: Role) -> Self {
        Self {
            viewer,
            records: BTreeMap::new(),
        }
    }

    pub fn viewer(&self) -> Role {
        self.viewer
    }

    /// Replace the stored copy. Returns `false` when the snapshot is identical to what we hold.
    pub fn apply(&mut self, record: ApplicationRecord) -> bool {
        match self.records.get(&record.id) {
            Some(existing) if existing == &record => false,
            _ => {
                self.records.insert(record.id.clone(), record);
                true
            }
        }
    }

    pub fn view(&self, id: &ApplicationId) -> Option<ApplicationView> {
        self.records
            .get(id)
            .map(|record| ApplicationView::derive(record, self.viewer))
    }

    /// Views ordered by application time.
    pub fn views(&self) -> Vec<ApplicationView> {
        let mut records: Vec<&ApplicationRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.applied_at.cmp(&b.applied_at).then_with(|| a.id.cmp(&b.id)));
        records
            .into_iter()
            .map(|record| ApplicationView::derive(record, self.viewer))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Wait for the next snapshot and fold it in. `None` once the subscription ends.
    pub async fn sync_next(&mut self, subscription: &mut Subscription) -> Option<ApplicationView> {
        let record = subscription.recv().await?;
        let id = record.id.clone();
        let changed = self.apply(record);
        debug!(application_id = %id, viewer = self.viewer.label(), changed, "board updated");
        self.view(&id)
    }

    /// Drive the board until the subscription ends, returning how many snapshots changed it.
    pub async fn follow(&mut self, mut subscription: Subscription) -> usize {
        let mut changed = 0;
        while let Some(record) = subscription.recv().await {
            if self.apply(record) {
                changed += 1;
            }
        }
        changed
    }
}
