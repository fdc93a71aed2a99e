//! Per-instance provisioning task.
//!
//! Runs public IP, public NIC, optional game NIC and VM strictly in that
//! order. The first failing step ends the task; its result records which
//! step failed and why. Nothing here touches other instances.

use poolgrid_core::{InstanceFailure, InstanceSpec, NetworkTopology, ProvisioningResult};
use poolgrid_provider::{PublicIp, VirtualMachine};
use tracing::{info, warn};

use crate::call::StepEnv;
use crate::ensure;
use crate::error::ReconcileError;
use crate::journal::{RunJournal, steps};
use crate::plan;

/// Provision one instance. Never fails: errors become a failed result.
pub async fn provision_instance(
    env: &StepEnv,
    journal: &RunJournal,
    instance: &InstanceSpec,
    topology: &NetworkTopology,
) -> ProvisioningResult {
    match provision(env, journal, instance, topology).await {
        Ok((vm, pip)) => {
            info!(
                run = %journal.run_id(),
                instance = %instance.name,
                ip = %pip.ip_address,
                "instance provisioned"
            );
            ProvisioningResult::succeeded(instance.index, &instance.name, vm.id, Some(pip.ip_address))
        }
        Err((step, err)) => {
            warn!(
                run = %journal.run_id(),
                instance = %instance.name,
                step,
                error = %err,
                "instance provisioning failed"
            );
            ProvisioningResult::failed(
                instance.index,
                &instance.name,
                InstanceFailure {
                    step: step.to_string(),
                    kind: err.kind(),
                    message: err.to_string(),
                },
            )
        }
    }
}

async fn provision(
    env: &StepEnv,
    journal: &RunJournal,
    instance: &InstanceSpec,
    topology: &NetworkTopology,
) -> Result<(VirtualMachine, PublicIp), (&'static str, ReconcileError)> {
    let index = instance.index;

    let pip_spec = plan::public_ip_spec(instance);
    let pip = journal
        .step(steps::PUBLIC_IP, index, &pip_spec, || {
            ensure::ensure_public_ip(env, &pip_spec)
        })
        .await
        .map_err(|e| (steps::PUBLIC_IP, e))?;

    let nic_spec = plan::public_nic_spec(instance, topology, &pip.id);
    let public_nic = journal
        .step(steps::PUBLIC_NIC, index, &nic_spec, || {
            ensure::ensure_network_interface(env, &nic_spec)
        })
        .await
        .map_err(|e| (steps::PUBLIC_NIC, e))?;

    let mut secondary_nic_ids = Vec::new();
    if let Some(game_spec) = plan::game_nic_spec(instance, topology) {
        let game_nic = journal
            .step(steps::GAME_NIC, index, &game_spec, || {
                ensure::ensure_network_interface(env, &game_spec)
            })
            .await
            .map_err(|e| (steps::GAME_NIC, e))?;
        secondary_nic_ids.push(game_nic.id);
    }

    let vm_spec = plan::vm_spec(instance, &public_nic.id, secondary_nic_ids);
    let vm = journal
        .step(steps::INSTANCE, index, &vm_spec, || {
            ensure::ensure_instance(env, &vm_spec)
        })
        .await
        .map_err(|e| (steps::INSTANCE, e))?;

    Ok((vm, pip))
}
