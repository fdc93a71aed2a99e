//! Declared and derived state of a VM pool.
//!
//! A `Pool` is read once per run and never mutated by the reconciler. The
//! `InstanceSpec`s are a pure function of the pool, and the
//! `NetworkTopology` is produced once by the network step and then shared
//! read-only by every instance task.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::naming;

/// Unique identifier of a pool.
pub type PoolId = String;

/// Default VM size when a pool does not choose one.
pub const DEFAULT_VM_SIZE: &str = "Standard_D3_v2";

/// Default administrator account name.
pub const DEFAULT_ADMIN_USERNAME: &str = "poolgrid";

/// Upper bound on `desired_vm_count`.
pub const MAX_INSTANCES_PER_POOL: u32 = 1000;

/// A required identity field is missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Fail with a `ValidationError` when `value` is blank.
pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(())
}

// ── Pool ──────────────────────────────────────────────────────────

/// Declared desired state of a group of VMs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pool {
    pub id: PoolId,
    pub resource_group_name: String,
    pub location: String,
    pub desired_vm_count: u32,
    /// Virtual network to place instances in. Defaults to `{id}-vnet`.
    #[serde(default)]
    pub vnet_name: Option<String>,
    /// Give every instance a secondary NIC on the game subnet.
    #[serde(default = "default_dual_homed")]
    pub dual_homed: bool,
    #[serde(default = "default_vm_size")]
    pub vm_size: String,
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    /// Opaque reference handed to the provider; never resolved here.
    pub admin_credentials_ref: String,
    /// Extra tags applied to every resource of the pool.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn default_dual_homed() -> bool {
    true
}

fn default_vm_size() -> String {
    DEFAULT_VM_SIZE.to_string()
}

fn default_admin_username() -> String {
    DEFAULT_ADMIN_USERNAME.to_string()
}

impl Pool {
    /// Check the identity fields every downstream name is built from.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("pool id", &self.id)?;
        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ValidationError::new(
                "pool id",
                format!("'{}' may only contain ASCII letters, digits and '-'", self.id),
            ));
        }
        require("resource group name", &self.resource_group_name)?;
        require("location", &self.location)?;
        require("vm size", &self.vm_size)?;
        require("admin username", &self.admin_username)?;
        require("admin credentials ref", &self.admin_credentials_ref)?;
        if self.desired_vm_count > MAX_INSTANCES_PER_POOL {
            return Err(ValidationError::new(
                "desired vm count",
                format!(
                    "{} exceeds the limit of {MAX_INSTANCES_PER_POOL}",
                    self.desired_vm_count
                ),
            ));
        }
        if let Some(vnet) = &self.vnet_name {
            require("vnet name", vnet)?;
        }
        Ok(())
    }

    /// Name of the pool's virtual network.
    pub fn vnet_name(&self) -> String {
        self.vnet_name
            .clone()
            .unwrap_or_else(|| naming::default_vnet_name(&self.id))
    }

    /// Natural key of the pool's network topology.
    pub fn network_key(&self) -> NetworkKey {
        NetworkKey {
            pool_id: self.id.clone(),
            resource_group_name: self.resource_group_name.clone(),
            location: self.location.clone(),
            vnet_name: self.vnet_name(),
            dual_homed: self.dual_homed,
        }
    }

    /// Tags stamped on every resource: the pool's own tags plus `pool-id`.
    pub fn resource_tags(&self) -> BTreeMap<String, String> {
        let mut tags = self.tags.clone();
        tags.insert(naming::POOL_ID_TAG.to_string(), self.id.clone());
        tags
    }

    /// One spec per index in `[0, desired_vm_count)`, in index order.
    pub fn instance_specs(&self) -> Vec<InstanceSpec> {
        (0..self.desired_vm_count)
            .map(|index| InstanceSpec {
                index,
                name: naming::instance_name(&self.id, index),
                pool_id: self.id.clone(),
                resource_group_name: self.resource_group_name.clone(),
                location: self.location.clone(),
                vm_size: self.vm_size.clone(),
                admin_username: self.admin_username.clone(),
                admin_credentials_ref: self.admin_credentials_ref.clone(),
                tags: self.resource_tags(),
            })
            .collect()
    }
}

/// Identity of a pool's network: resource group, location and vnet name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkKey {
    pub pool_id: PoolId,
    pub resource_group_name: String,
    pub location: String,
    pub vnet_name: String,
    pub dual_homed: bool,
}

// ── Instances ─────────────────────────────────────────────────────

/// One desired VM, derived from its pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceSpec {
    pub index: u32,
    pub name: String,
    pub pool_id: PoolId,
    pub resource_group_name: String,
    pub location: String,
    pub vm_size: String,
    pub admin_username: String,
    pub admin_credentials_ref: String,
    pub tags: BTreeMap<String, String>,
}

impl InstanceSpec {
    pub fn public_ip_name(&self) -> String {
        naming::public_ip_name(&self.name)
    }

    pub fn public_nic_name(&self) -> String {
        naming::public_nic_name(&self.name)
    }

    pub fn game_nic_name(&self) -> String {
        naming::game_nic_name(&self.name)
    }
}

// ── Network topology ──────────────────────────────────────────────

/// Identifier and name of a provider resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceRef {
    pub id: String,
    pub name: String,
}

/// A subnet inside the pool's virtual network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubnetRef {
    pub id: String,
    pub name: String,
    pub address_prefix: String,
}

/// Network context shared by every instance of a pool.
///
/// `game_subnet` and `game_nsg` are present only for dual-homed pools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkTopology {
    pub virtual_network: ResourceRef,
    pub public_subnet: SubnetRef,
    pub game_subnet: Option<SubnetRef>,
    pub public_nsg: ResourceRef,
    pub game_nsg: Option<ResourceRef>,
}

impl NetworkTopology {
    /// Whether instances get a secondary attachment.
    pub fn is_dual_homed(&self) -> bool {
        self.game_subnet.is_some()
    }
}
