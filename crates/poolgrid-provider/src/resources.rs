//! Resource specs and provider resources.
//!
//! Specs describe what the reconciler wants created; resources are what the
//! provider reports back. Both are plain serializable data so they can be
//! hashed into and recorded in the step log. Tag maps are ordered.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kinds of resource the gateway manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ResourceGroup,
    SecurityGroup,
    VirtualNetwork,
    PublicIp,
    NetworkInterface,
    VirtualMachine,
}

impl ResourceKind {
    /// Provider type segment used in resource ids.
    pub fn type_path(self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "resourceGroups",
            ResourceKind::SecurityGroup => "Microsoft.Network/networkSecurityGroups",
            ResourceKind::VirtualNetwork => "Microsoft.Network/virtualNetworks",
            ResourceKind::PublicIp => "Microsoft.Network/publicIPAddresses",
            ResourceKind::NetworkInterface => "Microsoft.Network/networkInterfaces",
            ResourceKind::VirtualMachine => "Microsoft.Compute/virtualMachines",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::ResourceGroup => "resource group",
            ResourceKind::SecurityGroup => "security group",
            ResourceKind::VirtualNetwork => "virtual network",
            ResourceKind::PublicIp => "public ip",
            ResourceKind::NetworkInterface => "network interface",
            ResourceKind::VirtualMachine => "virtual machine",
        };
        f.write_str(s)
    }
}

/// Natural key of a resource inside a resource group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub resource_group: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(resource_group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.name)
    }
}

pub type Tags = BTreeMap<String, String>;

// ── Resource group ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroupSpec {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub id: String,
    pub name: String,
    pub location: String,
}

// ── Security group ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    pub resource_group: String,
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: Tags,
}

impl SecurityGroupSpec {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.resource_group, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub location: String,
}

// ── Virtual network ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub name: String,
    pub address_prefix: String,
    pub security_group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualNetworkSpec {
    pub resource_group: String,
    pub name: String,
    pub location: String,
    pub address_space: String,
    pub subnets: Vec<SubnetSpec>,
    #[serde(default)]
    pub tags: Tags,
}

impl VirtualNetworkSpec {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.resource_group, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub name: String,
    pub address_prefix: String,
    pub security_group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualNetwork {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub address_space: String,
    pub subnets: Vec<Subnet>,
}

impl VirtualNetwork {
    pub fn subnet(&self, name: &str) -> Option<&Subnet> {
        self.subnets.iter().find(|s| s.name == name)
    }
}

// ── Public IP ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicIpSku {
    Basic,
    #[default]
    Standard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIpSpec {
    pub resource_group: String,
    pub name: String,
    pub location: String,
    /// DNS label; the instance name.
    pub dns_label: String,
    pub static_allocation: bool,
    pub sku: PublicIpSku,
    #[serde(default)]
    pub tags: Tags,
}

impl PublicIpSpec {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.resource_group, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIp {
    pub id: String,
    pub name: String,
    pub ip_address: String,
    pub dns_label: String,
}

// ── Network interface ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterfaceSpec {
    pub resource_group: String,
    pub name: String,
    pub location: String,
    pub subnet_id: String,
    pub security_group_id: String,
    /// Only the primary (public) NIC carries a public IP.
    pub public_ip_id: Option<String>,
    #[serde(default)]
    pub tags: Tags,
}

impl NetworkInterfaceSpec {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.resource_group, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub id: String,
    pub name: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub public_ip_id: Option<String>,
}

// ── Virtual machine ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachineSpec {
    pub resource_group: String,
    pub name: String,
    pub location: String,
    pub size: String,
    pub admin_username: String,
    /// Opaque credentials reference; resolved by the provider.
    pub admin_credentials_ref: String,
    pub primary_nic_id: String,
    pub secondary_nic_ids: Vec<String>,
    #[serde(default)]
    pub tags: Tags,
}

impl VirtualMachineSpec {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.resource_group, &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: String,
    pub name: String,
    pub size: String,
    pub nic_ids: Vec<String>,
}

/// Provider-style resource id.
pub fn resource_id(subscription: &str, kind: ResourceKind, key: &ResourceKey) -> String {
    match kind {
        ResourceKind::ResourceGroup => {
            format!("/subscriptions/{subscription}/resourceGroups/{}", key.name)
        }
        _ => format!(
            "/subscriptions/{subscription}/resourceGroups/{}/providers/{}/{}",
            key.resource_group,
            kind.type_path(),
            key.name
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_ids_are_scoped_by_group() {
        let key = ResourceKey::new("rg", "p1-vm-0-pip");
        assert_eq!(
            resource_id("sub", ResourceKind::PublicIp, &key),
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/publicIPAddresses/p1-vm-0-pip"
        );
        assert_eq!(
            resource_id("sub", ResourceKind::ResourceGroup, &ResourceKey::new("", "rg")),
            "/subscriptions/sub/resourceGroups/rg"
        );
    }

    #[test]
    fn subnet_lookup_by_name() {
        let vnet = VirtualNetwork {
            id: "vnet".to_string(),
            name: "p1-vnet".to_string(),
            resource_group: "rg".to_string(),
            location: "westeurope".to_string(),
            address_space: "10.0.0.0/24".to_string(),
            subnets: vec![Subnet {
                id: "vnet/subnets/public".to_string(),
                name: "public".to_string(),
                address_prefix: "10.0.0.0/27".to_string(),
                security_group_id: "nsg".to_string(),
            }],
        };
        assert!(vnet.subnet("public").is_some());
        assert!(vnet.subnet("game").is_none());
    }

    #[test]
    fn kind_display() {
        assert_eq!(ResourceKind::NetworkInterface.to_string(), "network interface");
    }
}
