use crate::infra::job_directory;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use veritrust::error::AppError;
use veritrust::workflows::applications::{
    ApplicationBoard, ApplicationId, ApplicationService, ApplicationServiceError,
    ApplicationStatus, ApplicationStore, ApplicationView, InMemoryApplicationStore,
    InMemoryJobDirectory, JobId, ProofArtifact, Role, Session, Subscription, TransitionRequest,
};

const NOTIFICATION_WAIT: Duration = Duration::from_millis(250);

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Finish through the proof-of-placement flow (approved, proof upload, candidate confirmation)
    #[arg(long)]
    pub(crate) proof_flow: bool,
    /// Overwrite the stored status with this raw value before reviewing, to show read-time normalization
    #[arg(long)]
    pub(crate) corrupt_status: Option<String>,
    /// Attempt an illegal move after the application is closed
    #[arg(long)]
    pub(crate) show_rejections: bool,
}

type DemoService = ApplicationService<InMemoryApplicationStore, InMemoryJobDirectory>;

struct Observer {
    board: ApplicationBoard,
    feed: Subscription,
}

impl Observer {
    async fn refresh(&mut self) -> Option<ApplicationView> {
        let mut latest = None;
        while let Ok(Some(view)) =
            timeout(NOTIFICATION_WAIT, self.board.sync_next(&mut self.feed)).await
        {
            latest = Some(view);
        }
        latest
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        proof_flow,
        corrupt_status,
        show_rejections,
    } = args;

    let store = Arc::new(InMemoryApplicationStore::default());
    let service: DemoService =
        ApplicationService::new(store.clone(), Arc::new(job_directory(true)));

    let candidate = Session::candidate("cand-sam");
    let company = Session::company("co-acme");

    println!("VeriTrust review workflow demo");
    let record = service.apply(
        Some(&candidate),
        &JobId::new("job-backend-intern"),
        "Sam Carter",
    )?;
    println!(
        "Sam applied to '{}' at {} ({})",
        record.snapshot.job_title, record.snapshot.company_name, record.id
    );

    let mut observers = [
        Observer {
            board: ApplicationBoard::new(Role::Candidate),
            feed: service.subscribe_for(Some(&candidate))?,
        },
        Observer {
            board: ApplicationBoard::new(Role::Company),
            feed: service.subscribe_for(Some(&company))?,
        },
    ];
    render(&mut observers).await;

    if let Some(raw) = corrupt_status {
        let mut corrupted = service.get(&record.id)?;
        corrupted.stored_status = raw.clone();
        store
            .update(corrupted)
            .map_err(ApplicationServiceError::from)?;
        println!("\nStored status overwritten with '{raw}'");
        render(&mut observers).await;
    }

    let mut steps = vec![step(&company, &record.id, ApplicationStatus::Reviewed)];
    if proof_flow {
        steps.push(step(&company, &record.id, ApplicationStatus::Approved));
        steps.push(
            step(&company, &record.id, ApplicationStatus::PendingForProof).with_request(|request| {
                request.with_proof(ProofArtifact {
                    storage_key: format!("proofs/{}/offer-letter.pdf", record.id),
                    file_name: "offer-letter.pdf".to_string(),
                })
            }),
        );
        steps.push(
            step(&candidate, &record.id, ApplicationStatus::Verified)
                .with_request(|request| request.with_confirmation("I received the offer letter")),
        );
    } else {
        steps.push(step(&company, &record.id, ApplicationStatus::Accepted));
    }

    for step in steps {
        apply_step(&service, &step)?;
        render(&mut observers).await;
    }

    if show_rejections {
        println!("\nAttempting to reopen the closed application");
        let attempt = TransitionRequest::new(record.id.clone(), ApplicationStatus::Reviewed);
        match service.transition(Some(&company), attempt) {
            Ok(_) => println!("- unexpectedly accepted"),
            Err(err) => println!("- refused: {err}"),
        }
    }

    for observer in observers {
        observer.feed.unsubscribe();
    }
    println!("\nLive subscriptions after teardown: {}", store.live_subscriptions());

    Ok(())
}

struct Step {
    actor: Session,
    request: TransitionRequest,
}

impl Step {
    fn with_request(mut self, f: impl FnOnce(TransitionRequest) -> TransitionRequest) -> Self {
        self.request = f(self.request);
        self
    }
}

fn step(actor: &Session, id: &ApplicationId, to: ApplicationStatus) -> Step {
    Step {
        actor: actor.clone(),
        request: TransitionRequest::new(id.clone(), to),
    }
}

fn apply_step(service: &DemoService, step: &Step) -> Result<(), AppError> {
    println!(
        "\n{} requests '{}'",
        step.actor.role.label(),
        step.request.requested.label()
    );
    service.transition(Some(&step.actor), step.request.clone())?;
    Ok(())
}

async fn render(observers: &mut [Observer]) {
    for observer in observers.iter_mut() {
        let Some(view) = observer.refresh().await else {
            continue;
        };
        let actions = if view.allowed_actions.is_empty() {
            "none".to_string()
        } else {
            view.allowed_actions
                .iter()
                .map(|status| status.label())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let note = if view.status_recognized {
            ""
        } else {
            " (unrecognized stored value)"
        };
        println!(
            "- {} view: {}{} | actions: {}",
            observer.board.viewer().label(),
            view.status_label,
            note,
            actions
        );
    }
}
