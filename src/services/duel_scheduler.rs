//! Duel scheduler: drains the durable queue with a bounded worker pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    parse_scores, CompetitionTemplate, DuelRequest, DuelResult, Experiment, MetricScores, PromptVars,
    SchedulerConfig, ScoreMatrix,
};
use crate::domain::ports::{ChatModel, DuelQueue, ResultStore};
use crate::services::report::format_scores;
use crate::services::retry::RetryPolicy;

/// What happened to one dequeued duel.
#[derive(Debug, Clone, PartialEq)]
pub enum DuelOutcome {
    /// Scored and recorded in this run.
    Scored(MetricScores),
    /// A result for this duel key was already stored; nothing was invoked.
    AlreadyRecorded,
    /// Marked failed; stays failed until a later `retry_failed`.
    Failed(String),
}

/// Shared state of one scheduler, cloned into every spawned duel.
struct DuelContext {
    experiment: Experiment,
    template: CompetitionTemplate,
    workers: HashMap<String, Arc<dyn ChatModel>>,
    queue: Arc<dyn DuelQueue>,
    store: Arc<dyn ResultStore>,
    policy: RetryPolicy,
    live: Mutex<ScoreMatrix>,
}

/// Drains an experiment's duel queue and aggregates the results.
pub struct DuelScheduler {
    context: Arc<DuelContext>,
    config: SchedulerConfig,
}

impl DuelScheduler {
    /// Scheduler over resolved worker handles; normally built by `ExperimentBuilder`.
    pub fn new(
        experiment: Experiment,
        template: CompetitionTemplate,
        workers: HashMap<String, Arc<dyn ChatModel>>,
        queue: Arc<dyn DuelQueue>,
        store: Arc<dyn ResultStore>,
        policy: RetryPolicy,
        config: SchedulerConfig,
    ) -> Self {
        let live = ScoreMatrix::new(experiment.worker_ids.len(), template.metrics());
        Self {
            context: Arc::new(DuelContext {
                experiment,
                template,
                workers,
                queue,
                store,
                policy,
                live: Mutex::new(live),
            }),
            config,
        }
    }

    /// The stored experiment this scheduler drains.
    pub fn experiment(&self) -> &Experiment {
        &self.context.experiment
    }

    /// Competition the duels are graded against.
    pub fn template(&self) -> &CompetitionTemplate {
        &self.context.template
    }

    /// Pool size used when the caller does not pick one.
    pub fn default_workers(&self) -> usize {
        self.config.workers.unwrap_or(self.context.experiment.worker_ids.len())
    }

    /// Scores accumulated by duels completed during this process.
    pub async fn live_scores(&self) -> ScoreMatrix {
        self.context.live.lock().await.clone()
    }

    /// Drain the queue with `n_workers` concurrent duels and return the
    /// score matrix rebuilt from every stored result.
    #[instrument(skip(self), fields(template = %self.context.template.id()))]
    pub async fn run(&self, n_workers: usize) -> DomainResult<ScoreMatrix> {
        if n_workers == 0 {
            return Err(DomainError::Configuration("worker pool size must be at least 1".to_string()));
        }

        let queue = &self.context.queue;
        match queue.prune(false).await {
            Ok(removed) => debug!(removed, "Pruned completed queue items"),
            Err(e) => debug!(error = %e, "Startup prune failed"),
        }
        if queue.retry_failed().await? {
            info!("Re-queued failed duels from a previous run");
        }
        if queue.retry_locked().await? {
            warn!("Recovered duels left locked by an interrupted run");
        }

        let counts = queue.status_counts().await?;
        info!(pending = counts.pending, workers = n_workers, "Starting duel scheduler");

        let progress = self.spawn_progress_reporter();
        let drained = self.drain(n_workers).await;
        progress.abort();
        drained?;

        if let Err(e) = queue.prune(false).await {
            warn!(error = %e, "Final prune failed");
        }

        let scores = self.rebuild_scores().await?;
        self.log_report(&scores);
        Ok(scores)
    }

    async fn drain(&self, n_workers: usize) -> DomainResult<()> {
        let semaphore = Arc::new(Semaphore::new(n_workers));
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut recovery_passes = 0;

        loop {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| DomainError::ValidationFailed("Semaphore closed".to_string()))?;

            while let Some(joined) = in_flight.try_join_next() {
                log_join_error(joined);
            }

            let next = match self.context.queue.get().await {
                Ok(next) => next,
                Err(e) => {
                    drop(permit);
                    settle(&mut in_flight).await;
                    return Err(e);
                }
            };

            if let Some(request) = next {
                let context = self.context.clone();
                in_flight.spawn(async move {
                    let _permit = permit;
                    context.dispatch_duel(request).await;
                });
                continue;
            }

            drop(permit);
            settle(&mut in_flight).await;

            if recovery_passes < self.config.max_recovery_passes && self.context.queue.retry_failed().await? {
                recovery_passes += 1;
                info!(pass = recovery_passes, "Retrying failed duels");
                continue;
            }
            return Ok(());
        }
    }

    fn spawn_progress_reporter(&self) -> JoinHandle<()> {
        let queue = self.context.queue.clone();
        let period = Duration::from_secs(self.config.progress_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match queue.pending_count().await {
                    Ok(pending) => info!(pending, "Pending duels"),
                    Err(e) => debug!(error = %e, "Could not read pending count"),
                }
            }
        })
    }

    /// Score matrix built from the committed results only.
    pub async fn rebuild_scores(&self) -> DomainResult<ScoreMatrix> {
        let context = &self.context;
        let mut matrix = ScoreMatrix::new(context.experiment.worker_ids.len(), context.template.metrics());
        for result in context.store.list_results().await? {
            let (Some(master), Some(student)) = (
                context.experiment.worker_index(&result.master_id),
                context.experiment.worker_index(&result.student_id),
            ) else {
                warn!(master = %result.master_id, student = %result.student_id, "Result for unknown worker ignored");
                continue;
            };
            if let Err(e) = matrix.update(master, student, &result.scores) {
                warn!(error = %e, round = result.round, "Stored result does not fit the score matrix");
            }
        }
        Ok(matrix)
    }

    /// Run one dequeued duel to completion, including its queue transition.
    pub async fn dispatch_duel(&self, request: DuelRequest) -> DuelOutcome {
        self.context.dispatch_duel(request).await
    }

    fn log_report(&self, scores: &ScoreMatrix) {
        let students = scores.student_averages();
        let masters = scores.master_averages();
        info!(results = scores.total_count(), "Duels complete");
        for (i, worker) in self.context.experiment.worker_ids.iter().enumerate() {
            info!(
                worker = %worker,
                as_student = %format_scores(students[i].as_ref()),
                as_master = %format_scores(masters[i].as_ref()),
                "Average scores"
            );
        }
    }
}

impl DuelContext {
    async fn dispatch_duel(&self, request: DuelRequest) -> DuelOutcome {
        let Some(message_id) = request.message_id else {
            error!(master = %request.master_id, student = %request.student_id, "Duel request has no message id");
            return DuelOutcome::Failed("missing message id".to_string());
        };

        let outcome = match self.execute_duel(&request).await {
            Ok(Some(scores)) => self.record(&request, scores).await,
            Ok(None) => {
                info!(
                    master = %request.master_id,
                    student = %request.student_id,
                    round = request.round,
                    "Result already recorded, skipping"
                );
                Ok(DuelOutcome::AlreadyRecorded)
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(outcome) => match self.queue.mark_done(message_id).await {
                Ok(()) => outcome,
                Err(e) => {
                    error!(%message_id, error = %e, "Could not mark duel done");
                    DuelOutcome::Failed(e.to_string())
                }
            },
            Err(e) => {
                error!(
                    master = %request.master_id,
                    student = %request.student_id,
                    round = request.round,
                    error = %e,
                    "Duel failed"
                );
                if let Err(mark_err) = self.queue.mark_failed(message_id).await {
                    error!(%message_id, error = %mark_err, "Could not mark duel failed");
                }
                DuelOutcome::Failed(e.to_string())
            }
        }
    }

    /// Student answers, master grades. `None` when the duel is already stored.
    async fn execute_duel(&self, request: &DuelRequest) -> DomainResult<Option<MetricScores>> {
        let master = self.worker(&request.master_id)?;
        let student = self.worker(&request.student_id)?;

        if self.store.has_result(&request.key()).await? {
            return Ok(None);
        }

        let mut vars = PromptVars::from([("task", request.task.clone())]);
        let question = self.template.question().render(&vars)?;
        let answer = self.policy.complete(student.as_ref(), &question).await.map_err(|e| {
            DomainError::Invocation { worker_id: request.student_id.clone(), reason: e.to_string() }
        })?;

        vars.insert("answer", answer);
        let evaluation_prompt = self.template.evaluation().render(&vars)?;
        let evaluation = self.policy.complete(master.as_ref(), &evaluation_prompt).await.map_err(|e| {
            DomainError::Invocation { worker_id: request.master_id.clone(), reason: e.to_string() }
        })?;

        Ok(Some(parse_scores(&evaluation, self.template.metrics())?))
    }

    async fn record(&self, request: &DuelRequest, scores: MetricScores) -> DomainResult<DuelOutcome> {
        let result = DuelResult::new(request, scores);
        if self.store.save_duel_result(&result).await? {
            let master = self.index_of(&request.master_id)?;
            let student = self.index_of(&request.student_id)?;
            self.live.lock().await.update(master, student, &result.scores)?;
        } else {
            debug!(round = request.round, "Concurrent duplicate result dropped");
        }

        info!(
            master = %request.master_id,
            student = %request.student_id,
            round = request.round,
            scores = %format_scores(Some(&result.scores)),
            "Duel scored"
        );
        Ok(DuelOutcome::Scored(result.scores))
    }

    fn worker(&self, worker_id: &str) -> DomainResult<&Arc<dyn ChatModel>> {
        self.workers
            .get(worker_id)
            .ok_or_else(|| DomainError::UnknownWorker(worker_id.to_string()))
    }

    fn index_of(&self, worker_id: &str) -> DomainResult<usize> {
        self.experiment
            .worker_index(worker_id)
            .ok_or_else(|| DomainError::UnknownWorker(worker_id.to_string()))
    }
}

async fn settle(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.join_next().await {
        log_join_error(joined);
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        // The item stays locked and is recovered by the next run.
        error!(error = %e, "Duel task panicked");
    }
}
