//! Live snapshot fan-out.
//!
//! Stores publish every written record here; observers hold a [`Subscription`] that
//! yields the records matching their filter as full replacements, in arrival order.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

use super::domain::{ApplicationId, ApplicationRecord, CandidateId, CompanyId, Role, Session};

/// Selects which records an observer sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ApplicationFilter {
    Candidate(CandidateId),
    Company(CompanyId),
    Application(ApplicationId),
}

impl ApplicationFilter {
    pub fn for_session(session: &Session) -> Self {
        match session.role {
            Role::Candidate => ApplicationFilter::Candidate(CandidateId(session.user_id.clone())),
            Role::Company => ApplicationFilter::Company(CompanyId(session.user_id.clone())),
        }
    }

    pub fn matches(&self, record: &ApplicationRecord) -> bool {
        match self {
            ApplicationFilter::Candidate(id) => &record.candidate_id == id,
            ApplicationFilter::Company(id) => &record.company_id == id,
            ApplicationFilter::Application(id) => &record.id == id,
        }
    }
}

/// Broadcast hub shared by a store and all of its subscriptions.
#[derive(Debug, Clone)]
pub struct SnapshotFeed {
    sender: broadcast::Sender<ApplicationRecord>,
    live: Arc<AtomicUsize>,
    capacity: usize,
}

impl SnapshotFeed {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            live: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    /// Fan a written record out to every subscriber. Returns how many receivers saw it.
    pub fn publish(&self, record: ApplicationRecord) -> usize {
        let id = record.id.clone();
        match self.sender.send(record) {
            Ok(receivers) => {
                debug!(application_id = %id, receivers, "snapshot published");
                receivers
            }
            Err(_) => 0,
        }
    }

    /// Open a subscription that first replays `initial`, then follows live writes.
    ///
    /// Callers must collect `initial` and call this under the same lock that guards
    /// writes, otherwise a write can land between the two and be seen twice or not at all.
    pub fn subscribe(
        &self,
        filter: ApplicationFilter,
        initial: Vec<ApplicationRecord>,
    ) -> Subscription {
        let receiver = self.sender.subscribe();
        let live = self.live.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(?filter, live, "subscription opened");

        Subscription {
            filter,
            backlog: initial.into(),
            stream: BroadcastStream::new(receiver),
            live: self.live.clone(),
        }
    }

    pub fn live_subscriptions(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Cancellable stream of full application snapshots.
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) detaches it from the feed.
pub struct Subscription {
    filter: ApplicationFilter,
    backlog: VecDeque<ApplicationRecord>,
    stream: BroadcastStream<ApplicationRecord>,
    live: Arc<AtomicUsize>,
}

impl Subscription {
    pub fn filter(&self) -> &ApplicationFilter {
        &self.filter
    }

    /// Next matching snapshot, or `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<ApplicationRecord> {
        self.next().await
    }

    /// Release the subscription now rather than at end of scope.
    pub fn unsubscribe(self) {}
}

impl Stream for Subscription {
    type Item = ApplicationRecord;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(record) = this.backlog.pop_front() {
            return Poll::Ready(Some(record));
        }

        loop {
            match ready!(Pin::new(&mut this.stream).poll_next(cx)) {
                Some(Ok(record)) => {
                    if this.filter.matches(&record) {
                        return Poll::Ready(Some(record));
                    }
                }
                // Later snapshots replace the skipped ones, so lag is not fatal.
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    debug!(filter = ?this.filter, skipped, "subscriber lagged");
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let remaining = self.live.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        debug!(filter = ?self.filter, remaining, "subscription closed");
    }
}
