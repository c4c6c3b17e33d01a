//! Runner de la cola de jobs
//!
//! Loop de reclamo con concurrencia acotada por semáforo (100 workers por
//! defecto) y timeout duro de 30 minutos por job. El dispatch es un enum
//! etiquetado sobre los cuatro kinds; el gate de la FSM garantiza un solo
//! job en vuelo por VIN, así que acá no hace falta más orden que ese.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::jobs::queue::{Job, JobKind, JobQueue};
use crate::metrics;
use crate::onboarding::delete::DeleteWorker;
use crate::onboarding::disconnect::DisconnectWorker;
use crate::onboarding::onboard::OnboardingWorker;
use crate::onboarding::verify::VerifyWorker;
use crate::utils::errors::{AppError, AppResult};

const JOB_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Los cuatro workers del ciclo de vida, como variantes etiquetadas
pub struct Workers {
    pub verify: VerifyWorker,
    pub onboard: OnboardingWorker,
    pub disconnect: DisconnectWorker,
    pub delete: DeleteWorker,
}

impl Workers {
    async fn dispatch(&self, job: &Job) -> AppResult<()> {
        match JobKind::from_str(&job.kind) {
            Some(JobKind::Verify) => self.verify.work(&job.parsed_args()?).await,
            Some(JobKind::Onboard) => self.onboard.work(&job.parsed_args()?).await,
            Some(JobKind::Disconnect) => self.disconnect.work(&job.parsed_args()?).await,
            Some(JobKind::Delete) => self.delete.work(&job.parsed_args()?).await,
            None => Err(AppError::Internal(format!(
                "unknown job kind: {}",
                job.kind
            ))),
        }
    }
}

pub struct JobRunner {
    queue: JobQueue,
    workers: Arc<Workers>,
    semaphore: Arc<Semaphore>,
}

impl JobRunner {
    pub fn new(queue: JobQueue, workers: Workers, max_workers: usize) -> Self {
        Self {
            queue,
            workers: Arc::new(workers),
            semaphore: Arc::new(Semaphore::new(max_workers)),
        }
    }

    /// Loop principal. Al cancelarse deja de reclamar jobs nuevos; los que
    /// están en vuelo corren hasta completarse o hasta su timeout.
    pub async fn run(self: Arc<Self>, cancellation: CancellationToken) {
        info!("Job runner iniciado");

        loop {
            if cancellation.is_cancelled() {
                info!("Job runner detenido, no se reclaman más jobs");
                return;
            }

            let free_slots = self.semaphore.available_permits();
            if free_slots == 0 {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }

            let claimed = match self.queue.claim(free_slots as i64).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!("Fallo reclamando jobs: {}", e);
                    tokio::time::sleep(POLL_INTERVAL).await;
                    continue;
                }
            };

            if claimed.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = cancellation.cancelled() => {}
                }
                continue;
            }

            for job in claimed {
                let permit = match self.semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                let runner = self.clone();
                tokio::spawn(async move {
                    runner.run_job(job).await;
                    drop(permit);
                });
            }
        }
    }

    async fn run_job(&self, job: Job) {
        debug!("Ejecutando job {} ({})", job.id, job.kind);

        let outcome = tokio::time::timeout(JOB_TIMEOUT, self.workers.dispatch(&job)).await;

        match outcome {
            Ok(Ok(())) => {
                metrics::COMPLETED_JOBS.inc();
                if let Err(e) = self.queue.complete(job.id).await {
                    error!("Fallo marcando el job {} como completado: {}", job.id, e);
                }
                debug!("Job {} completado", job.id);
            }
            Ok(Err(e)) => {
                metrics::DISCARDED_JOBS.inc();
                warn!("Job {} ({}) falló: {}", job.id, job.kind, e);
                if let Err(discard_err) = self.queue.discard(job.id, &e.to_string()).await {
                    error!("Fallo descartando el job {}: {}", job.id, discard_err);
                }
            }
            Err(_) => {
                metrics::DISCARDED_JOBS.inc();
                warn!("Job {} ({}) excedió el timeout", job.id, job.kind);
                if let Err(discard_err) =
                    self.queue.discard(job.id, "job timed out").await
                {
                    error!("Fallo descartando el job {}: {}", job.id, discard_err);
                }
            }
        }
    }
}
