//! Pool reconciler: drives one run from pool lookup to report.
//!
//! A run ensures the resource group, then the network, then fans out one
//! provisioning task per desired instance and joins them all. Run-level
//! failures (pool lookup, group, network) abort the run; instance failures
//! only mark their own index as failed.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use poolgrid_core::config::ReconcileConfig;
use poolgrid_core::{
    ErrorKind, InstanceFailure, InstanceSpec, NetworkTopology, Pool, ProvisioningResult, RunId,
    RunOutcome, RunPhase, RunReport,
};
use poolgrid_provider::{ProviderGateway, RetryConfig};
use poolgrid_state::StateStore;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::call::StepEnv;
use crate::cancel::CancelToken;
use crate::ensure;
use crate::error::{ReconcileError, ReconcileResult};
use crate::instance::provision_instance;
use crate::journal::{RunJournal, steps};
use crate::machine::RunMachine;
use crate::plan;
use crate::ports::{PoolStore, StepLog};
use crate::registry::RunRegistry;

/// Tuning knobs of a reconciler.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Upper bound on instance tasks in flight at once.
    pub max_parallel_instances: usize,
    pub call_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self::from(&ReconcileConfig::default())
    }
}

impl From<&ReconcileConfig> for ReconcileSettings {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            max_parallel_instances: config.max_parallel_instances.max(1),
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            retry: RetryConfig {
                max_attempts: config.retry.max_attempts.max(1),
                initial_delay: Duration::from_millis(config.retry.initial_delay_ms),
                max_delay: Duration::from_millis(config.retry.max_delay_ms),
                backoff_multiplier: config.retry.backoff_multiplier,
            },
        }
    }
}

pub struct Reconciler {
    provider: Arc<dyn ProviderGateway>,
    pools: Arc<dyn PoolStore>,
    steps: Arc<dyn StepLog>,
    registry: RunRegistry,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn ProviderGateway>,
        pools: Arc<dyn PoolStore>,
        steps: Arc<dyn StepLog>,
        registry: RunRegistry,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            provider,
            pools,
            steps,
            registry,
            settings,
        }
    }

    /// Pools, step log and run records all live in `store`.
    pub fn with_store(
        provider: Arc<dyn ProviderGateway>,
        store: StateStore,
        settings: ReconcileSettings,
    ) -> Self {
        Self::new(
            provider,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            RunRegistry::new(store),
            settings,
        )
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn new_run_id() -> RunId {
        uuid::Uuid::new_v4().to_string()
    }

    /// Run to completion in the caller's task.
    ///
    /// Passing the id of a finished run re-drives it: steps it already
    /// recorded are replayed from the step log.
    pub async fn run(&self, run_id: &str, pool_id: &str) -> ReconcileResult<RunReport> {
        self.run_with_cancel(run_id, pool_id, CancelToken::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        run_id: &str,
        pool_id: &str,
        cancel: CancelToken,
    ) -> ReconcileResult<RunReport> {
        self.registry.begin(run_id, pool_id, cancel.clone()).await?;
        Ok(self.drive(run_id, pool_id, cancel).await)
    }

    /// Start a new run in the background and return its id.
    pub async fn start(self: &Arc<Self>, pool_id: &str) -> ReconcileResult<RunId> {
        let run_id = Self::new_run_id();
        self.spawn(&run_id, pool_id).await?;
        Ok(run_id)
    }

    /// Re-drive an existing run id in the background.
    pub async fn replay(self: &Arc<Self>, run_id: &str) -> ReconcileResult<()> {
        let record = self
            .registry
            .status(run_id)?
            .ok_or_else(|| ReconcileError::RunNotFound(run_id.to_string()))?;
        self.spawn(run_id, &record.pool_id).await
    }

    pub async fn cancel(&self, run_id: &str) -> bool {
        self.registry.cancel(run_id).await
    }

    async fn spawn(self: &Arc<Self>, run_id: &str, pool_id: &str) -> ReconcileResult<()> {
        let cancel = CancelToken::new();
        self.registry.begin(run_id, pool_id, cancel.clone()).await?;
        let this = Arc::clone(self);
        let run_id = run_id.to_string();
        let pool_id = pool_id.to_string();
        tokio::spawn(async move {
            this.drive(&run_id, &pool_id, cancel).await;
        });
        Ok(())
    }

    /// Drive a registered run to a terminal phase. Always yields a report.
    async fn drive(&self, run_id: &str, pool_id: &str, cancel: CancelToken) -> RunReport {
        let mut machine = RunMachine::new(run_id, pool_id, epoch_secs());
        let journal = RunJournal::new(run_id, Arc::clone(&self.steps));
        let env = StepEnv::new(Arc::clone(&self.provider))
            .with_call_timeout(self.settings.call_timeout)
            .with_retry(self.settings.retry.clone())
            .with_cancel(cancel);

        info!(run = %run_id, pool = %pool_id, provider = %self.provider.name(), "run started");

        let report = match self.execute(&mut machine, &env, &journal).await {
            Ok(results) => match machine.complete(results, epoch_secs()) {
                Ok(report) => report,
                Err(e) => machine.fail(&e, epoch_secs()),
            },
            Err(e) => {
                error!(
                    run = %run_id,
                    pool = %pool_id,
                    kind = ?e.kind(),
                    error = %e,
                    "run failed"
                );
                machine.fail(&e, epoch_secs())
            }
        };

        self.registry.finish(&report, machine.phase()).await;

        match &report.outcome {
            RunOutcome::Success => info!(
                run = %run_id,
                instances = report.instances.len(),
                "run completed"
            ),
            RunOutcome::Partial { failed_indices } => warn!(
                run = %run_id,
                instances = report.instances.len(),
                failed = ?failed_indices,
                "run completed with failed instances"
            ),
            RunOutcome::Failed { .. } => {}
        }
        report
    }

    async fn execute(
        &self,
        machine: &mut RunMachine,
        env: &StepEnv,
        journal: &RunJournal,
    ) -> ReconcileResult<Vec<ProvisioningResult>> {
        let pool_id = machine.pool_id().to_string();
        let pool: Pool = journal
            .step(steps::LOAD_POOL, 0, &pool_id, || async {
                self.pools
                    .load_pool(&pool_id)
                    .await?
                    .ok_or_else(|| ReconcileError::PoolNotFound(pool_id.clone()))
            })
            .await?;
        pool.validate()?;

        self.enter(machine, RunPhase::EnsuringGroup).await?;
        let group_spec = plan::resource_group_spec(&pool);
        journal
            .step(steps::RESOURCE_GROUP, 0, &group_spec, || {
                ensure::ensure_resource_group(env, &group_spec)
            })
            .await?;

        self.enter(machine, RunPhase::EnsuringNetwork).await?;
        let key = pool.network_key();
        let tags = pool.resource_tags();
        let topology = journal
            .step(steps::NETWORK, 0, &(&key, &tags), || {
                ensure::ensure_network(env, &key, &tags)
            })
            .await?;

        self.enter(machine, RunPhase::Provisioning).await?;
        let results = self
            .fan_out(env, journal, pool.instance_specs(), topology)
            .await;

        self.enter(machine, RunPhase::Joining).await?;
        Ok(results)
    }

    async fn enter(&self, machine: &mut RunMachine, phase: RunPhase) -> ReconcileResult<()> {
        machine.advance(phase)?;
        self.registry.set_phase(machine.run_id(), phase).await;
        Ok(())
    }

    /// One task per instance, at most `max_parallel_instances` at once.
    /// A permit is taken before a task is spawned, so pending instances
    /// stay as specs until a slot frees up. Each task returns its own
    /// result; results are collected in index order once every task has
    /// finished.
    async fn fan_out(
        &self,
        env: &StepEnv,
        journal: &RunJournal,
        instances: Vec<InstanceSpec>,
        topology: NetworkTopology,
    ) -> Vec<ProvisioningResult> {
        let limit = Arc::new(Semaphore::new(self.settings.max_parallel_instances.max(1)));
        let topology = Arc::new(topology);

        let mut tasks = Vec::with_capacity(instances.len());
        for instance in instances {
            let env = env.clone();
            let journal = journal.clone();
            let topology = Arc::clone(&topology);
            let permit = Arc::clone(&limit).acquire_owned().await.ok();
            let index = instance.index;
            let name = instance.name.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                provision_instance(&env, &journal, &instance, &topology).await
            });
            tasks.push((index, name, handle));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (index, name, handle) in tasks {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(run = %journal.run_id(), instance = %name, error = %e, "instance task aborted");
                    ProvisioningResult::failed(
                        index,
                        name,
                        InstanceFailure {
                            step: "provision_instance".to_string(),
                            kind: ErrorKind::Internal,
                            message: format!("instance task ended abnormally: {e}"),
                        },
                    )
                }
            };
            results.push(result);
        }
        results
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let mut config = ReconcileConfig::default();
        config.max_parallel_instances = 0;
        config.call_timeout_secs = 9;
        config.retry.max_attempts = 0;
        config.retry.initial_delay_ms = 250;

        let settings = ReconcileSettings::from(&config);
        assert_eq!(settings.max_parallel_instances, 1);
        assert_eq!(settings.call_timeout, Duration::from_secs(9));
        assert_eq!(settings.retry.max_attempts, 1);
        assert_eq!(settings.retry.initial_delay, Duration::from_millis(250));
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(Reconciler::new_run_id(), Reconciler::new_run_id());
    }
}
