use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use veritrust::workflows::applications::{CompanyId, InMemoryJobDirectory, JobId, JobPosting};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Postings used by `serve --seed-jobs` and the demo walkthrough.
pub(crate) fn demo_postings() -> Vec<JobPosting> {
    vec![
        JobPosting {
            job_id: JobId::new("job-backend-intern"),
            owner_company_id: CompanyId::new("co-acme"),
            title: "Backend Intern".to_string(),
            company_name: "Acme Corp".to_string(),
        },
        JobPosting {
            job_id: JobId::new("job-data-analyst"),
            owner_company_id: CompanyId::new("co-globex"),
            title: "Junior Data Analyst".to_string(),
            company_name: "Globex".to_string(),
        },
    ]
}

pub(crate) fn job_directory(seed: bool) -> InMemoryJobDirectory {
    if seed {
        InMemoryJobDirectory::with_jobs(demo_postings())
    } else {
        InMemoryJobDirectory::default()
    }
}
