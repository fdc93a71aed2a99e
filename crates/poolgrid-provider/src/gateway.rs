//! Cloud provider gateway trait definition.

use async_trait::async_trait;

use crate::error::ProviderResult;
use crate::resources::*;

/// Cloud provider abstraction used by the reconciler.
///
/// Every resource kind has a `get_*` lookup by natural key, returning
/// `Ok(None)` when the resource does not exist, and a `create_*` call. A
/// create for a name that already exists fails with
/// [`ProviderError::AlreadyExists`](crate::ProviderError::AlreadyExists);
/// callers needing create-or-get semantics look up first.
///
/// Implementations bound nothing themselves: the caller wraps each call in
/// its own timeout.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Returns the provider name (e.g., "simulated")
    fn name(&self) -> &str;

    async fn get_resource_group(&self, name: &str) -> ProviderResult<Option<ResourceGroup>>;

    async fn create_resource_group(&self, spec: &ResourceGroupSpec)
    -> ProviderResult<ResourceGroup>;

    async fn get_security_group(&self, key: &ResourceKey) -> ProviderResult<Option<SecurityGroup>>;

    async fn create_security_group(
        &self,
        spec: &SecurityGroupSpec,
    ) -> ProviderResult<SecurityGroup>;

    /// Look up a virtual network together with its subnets.
    async fn get_virtual_network(
        &self,
        key: &ResourceKey,
    ) -> ProviderResult<Option<VirtualNetwork>>;

    /// Create a virtual network and all of its subnets in one call.
    async fn create_virtual_network(
        &self,
        spec: &VirtualNetworkSpec,
    ) -> ProviderResult<VirtualNetwork>;

    async fn get_public_ip(&self, key: &ResourceKey) -> ProviderResult<Option<PublicIp>>;

    async fn create_public_ip(&self, spec: &PublicIpSpec) -> ProviderResult<PublicIp>;

    async fn get_network_interface(
        &self,
        key: &ResourceKey,
    ) -> ProviderResult<Option<NetworkInterface>>;

    async fn create_network_interface(
        &self,
        spec: &NetworkInterfaceSpec,
    ) -> ProviderResult<NetworkInterface>;

    async fn get_virtual_machine(
        &self,
        key: &ResourceKey,
    ) -> ProviderResult<Option<VirtualMachine>>;

    async fn create_virtual_machine(
        &self,
        spec: &VirtualMachineSpec,
    ) -> ProviderResult<VirtualMachine>;
}
