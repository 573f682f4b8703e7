//! Creates a new experiment or resumes a stored one.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CompetitionTask, CompetitionTemplate, DuelRequest, Experiment, PlanConfig, PromptVars, RetryConfig,
    SchedulerConfig, TaskAssignment,
};
use crate::domain::ports::{ChatModel, DuelQueue, ModelFactory, ResultStore};
use crate::services::duel_scheduler::DuelScheduler;
use crate::services::retry::RetryPolicy;

/// Resolved plan for a new experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Plan {
    rounds: usize,
    task_count: usize,
    pairs_per_round: usize,
}

/// Sets up (or resumes) the experiment stored in one database and hands back its scheduler.
pub struct ExperimentBuilder {
    worker_ids: Vec<String>,
    template_id: String,
    factory: Arc<dyn ModelFactory>,
    queue: Arc<dyn DuelQueue>,
    store: Arc<dyn ResultStore>,
    plan: PlanConfig,
    retry: RetryConfig,
    scheduler: SchedulerConfig,
    seed: Option<u64>,
}

impl ExperimentBuilder {
    /// `worker_ids` may be empty when resuming.
    pub fn new(
        worker_ids: Vec<String>,
        template_id: impl Into<String>,
        factory: Arc<dyn ModelFactory>,
        queue: Arc<dyn DuelQueue>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            worker_ids,
            template_id: template_id.into(),
            factory,
            queue,
            store,
            plan: PlanConfig::default(),
            retry: RetryConfig::default(),
            scheduler: SchedulerConfig::default(),
            seed: None,
        }
    }

    /// Override rounds, task pool size and pair sampling for a new experiment.
    pub fn with_plan(mut self, plan: PlanConfig) -> Self {
        self.plan = plan;
        self
    }

    /// Retry policy wrapped around every model call.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Concurrency and progress settings for the scheduler.
    pub fn with_scheduler_config(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Fix the seed used for pair sampling and random task assignment.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Return a scheduler bound to a fresh or resumed experiment.
    #[instrument(skip(self), fields(template = %self.template_id))]
    pub async fn create(self) -> DomainResult<DuelScheduler> {
        let template = CompetitionTemplate::from_id(&self.template_id)?;
        let policy = RetryPolicy::from_config(&self.retry);

        let experiment = match self.store.load_experiment().await? {
            Some(experiment) if experiment.initialized => self.resume(experiment).await?,
            stale => {
                if stale.is_some() {
                    warn!("Discarding a partially initialized experiment");
                }
                self.store.reset().await?;
                self.queue.clear().await?;
                self.initialize(&template, &policy).await?
            }
        };

        let workers = self.resolve_workers(&experiment.worker_ids)?;
        Ok(DuelScheduler::new(
            experiment,
            template,
            workers,
            self.queue.clone(),
            self.store.clone(),
            policy,
            self.scheduler.clone(),
        ))
    }

    async fn resume(&self, experiment: Experiment) -> DomainResult<Experiment> {
        info!(created_at = %experiment.created_at, "Continuing existing experiment");

        if experiment.template_id != self.template_id {
            return Err(DomainError::Configuration(format!(
                "experiment was created with template '{}' but '{}' was requested; finish the previous experiment first",
                experiment.template_id, self.template_id
            )));
        }
        if !self.worker_ids.is_empty() && self.worker_ids != experiment.worker_ids {
            warn!(
                stored = ?experiment.worker_ids,
                requested = ?self.worker_ids,
                "Requested workers differ from the stored experiment; using the stored list"
            );
        }

        let counts = self.queue.status_counts().await?;
        if counts.pending + counts.locked + counts.failed == 0 {
            warn!("Queue is empty; the experiment appears to be complete");
        }
        Ok(experiment)
    }

    async fn initialize(&self, template: &CompetitionTemplate, policy: &RetryPolicy) -> DomainResult<Experiment> {
        info!("Initializing a new experiment");
        let plan = self.validate_plan()?;
        let workers = self.resolve_workers(&self.worker_ids)?;

        let experiment = Experiment::new(
            template.id(),
            self.worker_ids.clone(),
            plan.rounds,
            plan.pairs_per_round,
            plan.task_count,
        );
        self.store.save_experiment(&experiment).await?;

        info!(
            competition = template.name(),
            rounds = plan.rounds,
            duels = experiment.total_duels,
            pairs_per_round = plan.pairs_per_round,
            workers = ?self.worker_ids,
            "Starting competition"
        );

        let tasks = self.generate_tasks(template, policy, &workers, plan.task_count).await?;
        let requests = self.plan_duels(template, &plan, &tasks);
        let enqueued = self.queue.add_all(&requests).await?;
        self.store.mark_initialized().await?;

        info!(enqueued, "All duels scheduled");
        Ok(Experiment { initialized: true, ..experiment })
    }

    fn validate_plan(&self) -> DomainResult<Plan> {
        let n = self.worker_ids.len();
        if n < 2 {
            return Err(DomainError::Configuration(format!(
                "at least two workers are required to start a competition, got {n}"
            )));
        }
        let unique: HashSet<&String> = self.worker_ids.iter().collect();
        if unique.len() != n {
            return Err(DomainError::Configuration("worker ids must be unique".to_string()));
        }

        let all_pairs = n * (n - 1);
        let plan = Plan {
            rounds: self.plan.rounds.unwrap_or(n),
            task_count: self.plan.tasks.unwrap_or(n),
            pairs_per_round: self.plan.pairs_per_round.unwrap_or(all_pairs),
        };

        if plan.rounds == 0 {
            return Err(DomainError::Configuration("rounds must be at least 1".to_string()));
        }
        if plan.task_count == 0 || plan.task_count % n != 0 {
            return Err(DomainError::Configuration(format!(
                "task count {} must be a positive multiple of the number of workers ({n})",
                plan.task_count
            )));
        }
        if plan.pairs_per_round == 0 || plan.pairs_per_round > all_pairs {
            return Err(DomainError::Configuration(format!(
                "pairs per round must be between 1 and {all_pairs}, got {}",
                plan.pairs_per_round
            )));
        }
        Ok(plan)
    }

    fn resolve_workers(&self, worker_ids: &[String]) -> DomainResult<HashMap<String, Arc<dyn ChatModel>>> {
        worker_ids
            .iter()
            .map(|id| Ok((id.clone(), self.factory.create(id)?)))
            .collect()
    }

    /// Task `i` is written by worker `i mod N`.
    async fn generate_tasks(
        &self,
        template: &CompetitionTemplate,
        policy: &RetryPolicy,
        workers: &HashMap<String, Arc<dyn ChatModel>>,
        task_count: usize,
    ) -> DomainResult<Vec<CompetitionTask>> {
        let prompt = template.task_generation().render(&PromptVars::new())?;
        let mut tasks = Vec::with_capacity(task_count);

        for index in 0..task_count {
            let author = &self.worker_ids[index % self.worker_ids.len()];
            let model = workers
                .get(author)
                .ok_or_else(|| DomainError::UnknownWorker(author.clone()))?;

            info!(task = index + 1, worker = %author, "Generating task");
            let text = policy.complete(model.as_ref(), &prompt).await.map_err(|e| DomainError::Invocation {
                worker_id: author.clone(),
                reason: e.to_string(),
            })?;

            let task = CompetitionTask::new(index, text.trim(), author.as_str());
            self.store.save_task(&task).await?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    fn plan_duels(&self, template: &CompetitionTemplate, plan: &Plan, tasks: &[CompetitionTask]) -> Vec<DuelRequest> {
        let mut rng = self.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let all_pairs: Vec<(&String, &String)> = self
            .worker_ids
            .iter()
            .flat_map(|master| {
                self.worker_ids
                    .iter()
                    .filter(move |student| *student != master)
                    .map(move |student| (master, student))
            })
            .collect();

        let mut requests = Vec::with_capacity(plan.rounds * plan.pairs_per_round);
        for round in 0..plan.rounds {
            let pairs: Vec<(&String, &String)> = if plan.pairs_per_round == all_pairs.len() {
                all_pairs.clone()
            } else {
                all_pairs.choose_multiple(&mut rng, plan.pairs_per_round).copied().collect()
            };

            for (master, student) in pairs {
                let task_index = match self.plan.task_assignment {
                    TaskAssignment::PerRound => round % tasks.len(),
                    TaskAssignment::Random => rng.gen_range(0..tasks.len()),
                };
                requests.push(DuelRequest {
                    master_id: master.clone(),
                    student_id: student.clone(),
                    template_id: template.id().to_string(),
                    task: tasks[task_index].description.clone(),
                    task_index,
                    round,
                    message_id: None,
                });
            }
        }
        requests
    }
}
