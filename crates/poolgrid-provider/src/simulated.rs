//! Simulated provider: an in-memory cloud.
//!
//! Keeps every created resource in memory, records each call in a journal
//! and can be told to fail or stall specific calls. The daemon uses it for
//! local runs; tests use it as the fake `ProviderGateway`.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::gateway::ProviderGateway;
use crate::resources::*;

const SUBSCRIPTION: &str = "simulated";

/// Journal entries kept by default; older calls are dropped first.
pub const DEFAULT_JOURNAL_LIMIT: usize = 10_000;

/// Whether a journaled call read or mutated provider state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOp {
    Get,
    Create,
}

/// One entry of the call journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCall {
    pub op: CallOp,
    pub kind: ResourceKind,
    pub name: String,
}

/// How an injected fault behaves.
#[derive(Debug, Clone, PartialEq)]
pub enum FaultMode {
    /// Fail with `ProviderError::Rejected`.
    Reject(String),
    /// Fail immediately with `ProviderError::Timeout`.
    Timeout,
    /// Sleep before answering normally, to trip the caller's timeout.
    Stall(Duration),
}

/// A fault matched against calls by operation, kind and resource name.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub op: CallOp,
    pub kind: ResourceKind,
    pub name: String,
    pub mode: FaultMode,
    /// How many matching calls to affect; `None` affects all of them.
    pub remaining: Option<u32>,
}

impl Fault {
    pub fn reject_create(kind: ResourceKind, name: &str, reason: &str) -> Self {
        Self {
            op: CallOp::Create,
            kind,
            name: name.to_string(),
            mode: FaultMode::Reject(reason.to_string()),
            remaining: None,
        }
    }

    pub fn timeout_create(kind: ResourceKind, name: &str) -> Self {
        Self {
            op: CallOp::Create,
            kind,
            name: name.to_string(),
            mode: FaultMode::Timeout,
            remaining: None,
        }
    }

    pub fn stall(op: CallOp, kind: ResourceKind, name: &str, delay: Duration) -> Self {
        Self {
            op,
            kind,
            name: name.to_string(),
            mode: FaultMode::Stall(delay),
            remaining: None,
        }
    }

    /// Limit the fault to the first `n` matching calls.
    pub fn times(mut self, n: u32) -> Self {
        self.remaining = Some(n);
        self
    }

    fn matches(&self, op: CallOp, kind: ResourceKind, name: &str) -> bool {
        self.op == op && self.kind == kind && self.name == name && self.remaining != Some(0)
    }
}

struct Cloud {
    groups: BTreeMap<String, ResourceGroup>,
    security_groups: BTreeMap<ResourceKey, SecurityGroup>,
    networks: BTreeMap<ResourceKey, VirtualNetwork>,
    public_ips: BTreeMap<ResourceKey, PublicIp>,
    nics: BTreeMap<ResourceKey, NetworkInterface>,
    vms: BTreeMap<ResourceKey, VirtualMachine>,
    journal: VecDeque<ProviderCall>,
    journal_limit: usize,
    faults: Vec<Fault>,
}

impl Default for Cloud {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
            security_groups: BTreeMap::new(),
            networks: BTreeMap::new(),
            public_ips: BTreeMap::new(),
            nics: BTreeMap::new(),
            vms: BTreeMap::new(),
            journal: VecDeque::new(),
            journal_limit: DEFAULT_JOURNAL_LIMIT,
            faults: Vec::new(),
        }
    }
}

impl Cloud {
    /// Journal the call and consume a matching fault, if any.
    fn enter(&mut self, op: CallOp, kind: ResourceKind, name: &str) -> Option<FaultMode> {
        if self.journal_limit > 0 {
            if self.journal.len() >= self.journal_limit {
                self.journal.pop_front();
            }
            self.journal.push_back(ProviderCall {
                op,
                kind,
                name: name.to_string(),
            });
        }
        let fault = self.faults.iter_mut().find(|f| f.matches(op, kind, name))?;
        if let Some(n) = fault.remaining.as_mut() {
            *n -= 1;
        }
        Some(fault.mode.clone())
    }

    fn group_exists(&self, name: &str) -> ProviderResult<()> {
        if self.groups.contains_key(name) {
            Ok(())
        } else {
            Err(ProviderError::InvalidRequest(format!(
                "resource group '{name}' does not exist"
            )))
        }
    }
}

/// In-memory `ProviderGateway`.
pub struct SimulatedProvider {
    cloud: Mutex<Cloud>,
    latency: Duration,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self {
            cloud: Mutex::new(Cloud::default()),
            latency: Duration::ZERO,
        }
    }

    /// Add a fixed delay to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Keep at most `limit` journal entries; 0 disables the journal.
    pub fn with_journal_limit(self, limit: usize) -> Self {
        let mut cloud = self.cloud.into_inner();
        cloud.journal_limit = limit;
        cloud.journal.truncate(limit);
        Self {
            cloud: Mutex::new(cloud),
            latency: self.latency,
        }
    }

    /// Register a fault for subsequent calls.
    pub async fn inject(&self, fault: Fault) {
        self.cloud.lock().await.faults.push(fault);
    }

    /// Remove all registered faults.
    pub async fn clear_faults(&self) {
        self.cloud.lock().await.faults.clear();
    }

    /// Journaled calls, oldest first.
    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.cloud.lock().await.journal.iter().cloned().collect()
    }

    /// Create calls made so far.
    pub async fn mutating_calls(&self) -> Vec<ProviderCall> {
        self.cloud
            .lock()
            .await
            .journal
            .iter()
            .filter(|c| c.op == CallOp::Create)
            .cloned()
            .collect()
    }

    /// Number of journaled calls matching `op` and `kind`.
    pub async fn count(&self, op: CallOp, kind: ResourceKind) -> usize {
        self.cloud
            .lock()
            .await
            .journal
            .iter()
            .filter(|c| c.op == op && c.kind == kind)
            .count()
    }

    /// Forget the call journal, keeping resources and faults.
    pub async fn reset_journal(&self) {
        self.cloud.lock().await.journal.clear();
    }

    /// Number of existing resources of `kind`.
    pub async fn resource_count(&self, kind: ResourceKind) -> usize {
        let cloud = self.cloud.lock().await;
        match kind {
            ResourceKind::ResourceGroup => cloud.groups.len(),
            ResourceKind::SecurityGroup => cloud.security_groups.len(),
            ResourceKind::VirtualNetwork => cloud.networks.len(),
            ResourceKind::PublicIp => cloud.public_ips.len(),
            ResourceKind::NetworkInterface => cloud.nics.len(),
            ResourceKind::VirtualMachine => cloud.vms.len(),
        }
    }

    /// Journal the call, apply latency and any matching fault.
    async fn begin(&self, op: CallOp, kind: ResourceKind, name: &str) -> ProviderResult<()> {
        let fault = self.cloud.lock().await.enter(op, kind, name);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match fault {
            None => Ok(()),
            Some(FaultMode::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Some(FaultMode::Reject(reason)) => Err(ProviderError::Rejected(reason)),
            Some(FaultMode::Timeout) => Err(ProviderError::Timeout(format!("{kind} '{name}'"))),
        }
    }
}

/// Stable fake address derived from the resource name.
fn simulated_address(name: &str) -> String {
    let h = name
        .bytes()
        .fold(0x811c_9dc5_u32, |h, b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193));
    format!("20.{}.{}.{}", (h >> 16) & 0xff, (h >> 8) & 0xff, (h & 0xfe).max(4))
}

fn already_exists(kind: ResourceKind, key: &ResourceKey) -> ProviderError {
    ProviderError::AlreadyExists(format!("{kind} '{key}'"))
}

#[async_trait]
impl ProviderGateway for SimulatedProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn get_resource_group(&self, name: &str) -> ProviderResult<Option<ResourceGroup>> {
        self.begin(CallOp::Get, ResourceKind::ResourceGroup, name)
            .await?;
        Ok(self.cloud.lock().await.groups.get(name).cloned())
    }

    async fn create_resource_group(
        &self,
        spec: &ResourceGroupSpec,
    ) -> ProviderResult<ResourceGroup> {
        let kind = ResourceKind::ResourceGroup;
        self.begin(CallOp::Create, kind, &spec.name).await?;
        let mut cloud = self.cloud.lock().await;
        let key = ResourceKey::new("", &spec.name);
        if cloud.groups.contains_key(&spec.name) {
            return Err(already_exists(kind, &key));
        }
        let group = ResourceGroup {
            id: resource_id(SUBSCRIPTION, kind, &key),
            name: spec.name.clone(),
            location: spec.location.clone(),
        };
        cloud.groups.insert(spec.name.clone(), group.clone());
        debug!(name = %spec.name, "simulated resource group created");
        Ok(group)
    }

    async fn get_security_group(&self, key: &ResourceKey) -> ProviderResult<Option<SecurityGroup>> {
        self.begin(CallOp::Get, ResourceKind::SecurityGroup, &key.name)
            .await?;
        Ok(self.cloud.lock().await.security_groups.get(key).cloned())
    }

    async fn create_security_group(
        &self,
        spec: &SecurityGroupSpec,
    ) -> ProviderResult<SecurityGroup> {
        let kind = ResourceKind::SecurityGroup;
        self.begin(CallOp::Create, kind, &spec.name).await?;
        let mut cloud = self.cloud.lock().await;
        cloud.group_exists(&spec.resource_group)?;
        let key = spec.key();
        if cloud.security_groups.contains_key(&key) {
            return Err(already_exists(kind, &key));
        }
        let nsg = SecurityGroup {
            id: resource_id(SUBSCRIPTION, kind, &key),
            name: spec.name.clone(),
            resource_group: spec.resource_group.clone(),
            location: spec.location.clone(),
        };
        cloud.security_groups.insert(key, nsg.clone());
        Ok(nsg)
    }

    async fn get_virtual_network(
        &self,
        key: &ResourceKey,
    ) -> ProviderResult<Option<VirtualNetwork>> {
        self.begin(CallOp::Get, ResourceKind::VirtualNetwork, &key.name)
            .await?;
        Ok(self.cloud.lock().await.networks.get(key).cloned())
    }

    async fn create_virtual_network(
        &self,
        spec: &VirtualNetworkSpec,
    ) -> ProviderResult<VirtualNetwork> {
        let kind = ResourceKind::VirtualNetwork;
        self.begin(CallOp::Create, kind, &spec.name).await?;
        let mut cloud = self.cloud.lock().await;
        cloud.group_exists(&spec.resource_group)?;
        let key = spec.key();
        if cloud.networks.contains_key(&key) {
            return Err(already_exists(kind, &key));
        }
        for subnet in &spec.subnets {
            if !cloud
                .security_groups
                .values()
                .any(|nsg| nsg.id == subnet.security_group_id)
            {
                return Err(ProviderError::InvalidRequest(format!(
                    "subnet '{}' references unknown security group '{}'",
                    subnet.name, subnet.security_group_id
                )));
            }
        }
        let id = resource_id(SUBSCRIPTION, kind, &key);
        let vnet = VirtualNetwork {
            subnets: spec
                .subnets
                .iter()
                .map(|s| Subnet {
                    id: format!("{id}/subnets/{}", s.name),
                    name: s.name.clone(),
                    address_prefix: s.address_prefix.clone(),
                    security_group_id: s.security_group_id.clone(),
                })
                .collect(),
            id,
            name: spec.name.clone(),
            resource_group: spec.resource_group.clone(),
            location: spec.location.clone(),
            address_space: spec.address_space.clone(),
        };
        cloud.networks.insert(key, vnet.clone());
        debug!(name = %spec.name, subnets = vnet.subnets.len(), "simulated network created");
        Ok(vnet)
    }

    async fn get_public_ip(&self, key: &ResourceKey) -> ProviderResult<Option<PublicIp>> {
        self.begin(CallOp::Get, ResourceKind::PublicIp, &key.name)
            .await?;
        Ok(self.cloud.lock().await.public_ips.get(key).cloned())
    }

    async fn create_public_ip(&self, spec: &PublicIpSpec) -> ProviderResult<PublicIp> {
        let kind = ResourceKind::PublicIp;
        self.begin(CallOp::Create, kind, &spec.name).await?;
        let mut cloud = self.cloud.lock().await;
        cloud.group_exists(&spec.resource_group)?;
        let key = spec.key();
        if cloud.public_ips.contains_key(&key) {
            return Err(already_exists(kind, &key));
        }
        let pip = PublicIp {
            id: resource_id(SUBSCRIPTION, kind, &key),
            name: spec.name.clone(),
            ip_address: simulated_address(&spec.name),
            dns_label: spec.dns_label.clone(),
        };
        cloud.public_ips.insert(key, pip.clone());
        Ok(pip)
    }

    async fn get_network_interface(
        &self,
        key: &ResourceKey,
    ) -> ProviderResult<Option<NetworkInterface>> {
        self.begin(CallOp::Get, ResourceKind::NetworkInterface, &key.name)
            .await?;
        Ok(self.cloud.lock().await.nics.get(key).cloned())
    }

    async fn create_network_interface(
        &self,
        spec: &NetworkInterfaceSpec,
    ) -> ProviderResult<NetworkInterface> {
        let kind = ResourceKind::NetworkInterface;
        self.begin(CallOp::Create, kind, &spec.name).await?;
        let mut cloud = self.cloud.lock().await;
        cloud.group_exists(&spec.resource_group)?;
        let key = spec.key();
        if cloud.nics.contains_key(&key) {
            return Err(already_exists(kind, &key));
        }
        let subnet_known = cloud
            .networks
            .values()
            .flat_map(|n| n.subnets.iter())
            .any(|s| s.id == spec.subnet_id);
        if !subnet_known {
            return Err(ProviderError::InvalidRequest(format!(
                "unknown subnet '{}'",
                spec.subnet_id
            )));
        }
        if let Some(pip_id) = &spec.public_ip_id {
            if !cloud.public_ips.values().any(|p| &p.id == pip_id) {
                return Err(ProviderError::InvalidRequest(format!(
                    "unknown public ip '{pip_id}'"
                )));
            }
        }
        let nic = NetworkInterface {
            id: resource_id(SUBSCRIPTION, kind, &key),
            name: spec.name.clone(),
            subnet_id: spec.subnet_id.clone(),
            security_group_id: spec.security_group_id.clone(),
            public_ip_id: spec.public_ip_id.clone(),
        };
        cloud.nics.insert(key, nic.clone());
        Ok(nic)
    }

    async fn get_virtual_machine(
        &self,
        key: &ResourceKey,
    ) -> ProviderResult<Option<VirtualMachine>> {
        self.begin(CallOp::Get, ResourceKind::VirtualMachine, &key.name)
            .await?;
        Ok(self.cloud.lock().await.vms.get(key).cloned())
    }

    async fn create_virtual_machine(
        &self,
        spec: &VirtualMachineSpec,
    ) -> ProviderResult<VirtualMachine> {
        let kind = ResourceKind::VirtualMachine;
        self.begin(CallOp::Create, kind, &spec.name).await?;
        let mut cloud = self.cloud.lock().await;
        cloud.group_exists(&spec.resource_group)?;
        let key = spec.key();
        if cloud.vms.contains_key(&key) {
            return Err(already_exists(kind, &key));
        }
        let nic_ids: Vec<String> = std::iter::once(spec.primary_nic_id.clone())
            .chain(spec.secondary_nic_ids.iter().cloned())
            .collect();
        for nic_id in &nic_ids {
            if !cloud.nics.values().any(|n| &n.id == nic_id) {
                return Err(ProviderError::InvalidRequest(format!(
                    "unknown network interface '{nic_id}'"
                )));
            }
        }
        let vm = VirtualMachine {
            id: resource_id(SUBSCRIPTION, kind, &key),
            name: spec.name.clone(),
            size: spec.size.clone(),
            nic_ids,
        };
        cloud.vms.insert(key, vm.clone());
        debug!(name = %spec.name, "simulated virtual machine created");
        Ok(vm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_spec(name: &str) -> ResourceGroupSpec {
        ResourceGroupSpec {
            name: name.to_string(),
            location: "westeurope".to_string(),
            tags: Tags::new(),
        }
    }

    fn pip_spec(rg: &str, name: &str) -> PublicIpSpec {
        PublicIpSpec {
            resource_group: rg.to_string(),
            name: name.to_string(),
            location: "westeurope".to_string(),
            dns_label: name.to_string(),
            static_allocation: true,
            sku: PublicIpSku::Standard,
            tags: Tags::new(),
        }
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let provider = SimulatedProvider::new();
        assert!(provider.get_resource_group("rg").await.unwrap().is_none());
        assert_eq!(provider.count(CallOp::Get, ResourceKind::ResourceGroup).await, 1);
    }

    #[tokio::test]
    async fn create_then_get() {
        let provider = SimulatedProvider::new();
        let created = provider.create_resource_group(&group_spec("rg")).await.unwrap();
        let fetched = provider.get_resource_group("rg").await.unwrap();
        assert_eq!(fetched, Some(created));
    }

    #[tokio::test]
    async fn duplicate_create_reports_already_exists() {
        let provider = SimulatedProvider::new();
        provider.create_resource_group(&group_spec("rg")).await.unwrap();
        let err = provider
            .create_resource_group(&group_spec("rg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AlreadyExists(_)));
        assert_eq!(provider.resource_count(ResourceKind::ResourceGroup).await, 1);
    }

    #[tokio::test]
    async fn create_requires_existing_group() {
        let provider = SimulatedProvider::new();
        let err = provider.create_public_ip(&pip_spec("rg", "ip")).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn reject_fault_applies_only_to_matching_name() {
        let provider = SimulatedProvider::new();
        provider.create_resource_group(&group_spec("rg")).await.unwrap();
        provider
            .inject(Fault::reject_create(ResourceKind::PublicIp, "bad", "quota exceeded"))
            .await;

        let err = provider.create_public_ip(&pip_spec("rg", "bad")).await.unwrap_err();
        assert_eq!(err, ProviderError::Rejected("quota exceeded".to_string()));
        assert!(provider.create_public_ip(&pip_spec("rg", "good")).await.is_ok());
    }

    #[tokio::test]
    async fn limited_fault_expires() {
        let provider = SimulatedProvider::new();
        provider
            .inject(Fault::timeout_create(ResourceKind::ResourceGroup, "rg").times(1))
            .await;

        let first = provider.create_resource_group(&group_spec("rg")).await;
        assert!(matches!(first, Err(ProviderError::Timeout(_))));
        assert!(provider.create_resource_group(&group_spec("rg")).await.is_ok());
    }

    #[tokio::test]
    async fn journal_records_calls_in_order() {
        let provider = SimulatedProvider::new();
        provider.get_resource_group("rg").await.unwrap();
        provider.create_resource_group(&group_spec("rg")).await.unwrap();

        let calls = provider.calls().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].op, CallOp::Get);
        assert_eq!(calls[1].op, CallOp::Create);
        assert_eq!(provider.mutating_calls().await.len(), 1);

        provider.reset_journal().await;
        assert!(provider.calls().await.is_empty());
        assert_eq!(provider.resource_count(ResourceKind::ResourceGroup).await, 1);
    }

    #[tokio::test]
    async fn journal_keeps_only_the_newest_calls() {
        let provider = SimulatedProvider::new().with_journal_limit(2);
        provider.get_resource_group("a").await.unwrap();
        provider.get_resource_group("b").await.unwrap();
        provider.create_resource_group(&group_spec("c")).await.unwrap();

        let names: Vec<String> = provider.calls().await.into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["b", "c"]);

        let quiet = SimulatedProvider::new().with_journal_limit(0);
        quiet.create_resource_group(&group_spec("rg")).await.unwrap();
        assert!(quiet.calls().await.is_empty());
        assert_eq!(quiet.resource_count(ResourceKind::ResourceGroup).await, 1);
    }

    #[test]
    fn simulated_addresses_are_stable() {
        assert_eq!(simulated_address("p1-vm-0-pip"), simulated_address("p1-vm-0-pip"));
        assert!(simulated_address("p1-vm-0-pip").starts_with("20."));
    }
}
