//! Run state machine.
//!
//! `Loading → EnsuringGroup → EnsuringNetwork → Provisioning → Joining →
//! Completed`, with `Failed` reachable from every non-terminal phase.

use poolgrid_core::{ProvisioningResult, RunPhase, RunReport};
use tracing::{debug, warn};

use crate::error::{ReconcileError, ReconcileResult};

/// One run's progress through its phases.
#[derive(Debug, Clone)]
pub struct RunMachine {
    run_id: String,
    pool_id: String,
    phase: RunPhase,
    started_at: u64,
}

impl RunMachine {
    pub fn new(run_id: &str, pool_id: &str, started_at: u64) -> Self {
        Self {
            run_id: run_id.to_string(),
            pool_id: pool_id.to_string(),
            phase: RunPhase::Loading,
            started_at,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn pool_id(&self) -> &str {
        &self.pool_id
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Move to `to` if the transition is legal.
    pub fn advance(&mut self, to: RunPhase) -> ReconcileResult<()> {
        use RunPhase::*;
        let legal = match (self.phase, to) {
            (Loading, EnsuringGroup)
            | (EnsuringGroup, EnsuringNetwork)
            | (EnsuringNetwork, Provisioning)
            | (Provisioning, Joining)
            | (Joining, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        };
        if !legal {
            return Err(ReconcileError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        debug!(run = %self.run_id, from = ?self.phase, to = ?to, "run phase changed");
        self.phase = to;
        Ok(())
    }

    /// Finish from `Joining` with the collected instance results.
    pub fn complete(
        &mut self,
        results: Vec<ProvisioningResult>,
        finished_at: u64,
    ) -> ReconcileResult<RunReport> {
        self.advance(RunPhase::Completed)?;
        Ok(RunReport::from_results(
            &self.run_id,
            &self.pool_id,
            results,
            self.started_at,
            finished_at,
        ))
    }

    /// Abort with a run-level error.
    pub fn fail(&mut self, err: &ReconcileError, finished_at: u64) -> RunReport {
        if self.phase.is_terminal() {
            warn!(run = %self.run_id, phase = ?self.phase, "failing a run that already finished");
        }
        self.phase = RunPhase::Failed;
        RunReport::failed(
            &self.run_id,
            &self.pool_id,
            err.kind(),
            err.to_string(),
            self.started_at,
            finished_at,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolgrid_core::{ErrorKind, RunOutcome};

    fn at_joining() -> RunMachine {
        let mut machine = RunMachine::new("r1", "p1", 100);
        for phase in [
            RunPhase::EnsuringGroup,
            RunPhase::EnsuringNetwork,
            RunPhase::Provisioning,
            RunPhase::Joining,
        ] {
            machine.advance(phase).unwrap();
        }
        machine
    }

    #[test]
    fn happy_path_reaches_completed() {
        let mut machine = at_joining();
        let results = vec![ProvisioningResult::succeeded(0, "p1-vm-0", "vm-0", None)];
        let report = machine.complete(results, 200).unwrap();
        assert_eq!(machine.phase(), RunPhase::Completed);
        assert!(report.is_success());
        assert_eq!((report.started_at, report.finished_at), (100, 200));
    }

    #[test]
    fn phases_cannot_be_skipped() {
        let mut machine = RunMachine::new("r1", "p1", 0);
        let err = machine.advance(RunPhase::Provisioning).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::InvalidTransition {
                from: RunPhase::Loading,
                to: RunPhase::Provisioning
            }
        ));
        assert_eq!(machine.phase(), RunPhase::Loading);
    }

    #[test]
    fn completing_before_join_is_rejected() {
        let mut machine = RunMachine::new("r1", "p1", 0);
        machine.advance(RunPhase::EnsuringGroup).unwrap();
        assert!(machine.complete(Vec::new(), 1).is_err());
    }

    #[test]
    fn failure_is_reachable_from_any_active_phase() {
        let mut machine = RunMachine::new("r1", "p1", 0);
        machine.advance(RunPhase::EnsuringGroup).unwrap();
        machine.advance(RunPhase::EnsuringNetwork).unwrap();
        let report = machine.fail(&ReconcileError::PoolNotFound("p1".to_string()), 5);
        assert_eq!(machine.phase(), RunPhase::Failed);
        assert!(matches!(
            report.outcome,
            RunOutcome::Failed {
                kind: ErrorKind::PoolNotFound,
                ..
            }
        ));
        assert!(machine.advance(RunPhase::Failed).is_err());
    }
}
