//! Idempotent Ensure-* operations.
//!
//! Each operation checks the identity fields it was given, asks the
//! provider whether the named resource exists and creates it only when it
//! does not. An existing resource is returned unchanged without any
//! mutating call. A create that loses a race (`AlreadyExists`) adopts the
//! resource that won.

use std::future::Future;

use poolgrid_core::naming::{
    self, SUBNET_GAME, SUBNET_GAME_PREFIX, SUBNET_PUBLIC, SUBNET_PUBLIC_PREFIX, VNET_ADDRESS_SPACE,
};
use poolgrid_core::{NetworkKey, NetworkTopology, ResourceRef, SubnetRef, ValidationError, require};
use poolgrid_provider::*;
use tracing::{debug, info};

use crate::call::StepEnv;
use crate::error::{ReconcileError, ReconcileResult};

/// Get `name`, create it if missing.
async fn get_or_create<T, G, GFut, C, CFut>(
    env: &StepEnv,
    kind: ResourceKind,
    name: &str,
    get: G,
    create: C,
) -> ReconcileResult<T>
where
    G: Fn() -> GFut,
    GFut: Future<Output = ProviderResult<Option<T>>>,
    C: Fn() -> CFut,
    CFut: Future<Output = ProviderResult<T>>,
{
    if let Some(existing) = env.call(CallOp::Get, kind, name, &get).await? {
        debug!(%kind, name, "already exists");
        return Ok(existing);
    }

    match env.call(CallOp::Create, kind, name, &create).await {
        Ok(created) => {
            info!(%kind, name, "created");
            Ok(created)
        }
        Err(ReconcileError::Provider {
            source: ProviderError::AlreadyExists(_),
            ..
        }) => {
            debug!(%kind, name, "created concurrently, adopting existing resource");
            env.call(CallOp::Get, kind, name, &get)
                .await?
                .ok_or_else(|| {
                    ReconcileError::provider(
                        kind,
                        name,
                        ProviderError::Rejected("reported as existing but not found".to_string()),
                    )
                })
        }
        Err(e) => Err(e),
    }
}

fn require_placement(resource_group: &str, name: &str, location: &str) -> Result<(), ValidationError> {
    require("resource group name", resource_group)?;
    require("name", name)?;
    require("location", location)
}

pub async fn ensure_resource_group(
    env: &StepEnv,
    spec: &ResourceGroupSpec,
) -> ReconcileResult<ResourceGroup> {
    require("resource group name", &spec.name)?;
    require("location", &spec.location)?;
    let provider = env.provider.as_ref();
    get_or_create(
        env,
        ResourceKind::ResourceGroup,
        &spec.name,
        move || provider.get_resource_group(&spec.name),
        move || provider.create_resource_group(spec),
    )
    .await
}

pub async fn ensure_security_group(
    env: &StepEnv,
    spec: &SecurityGroupSpec,
) -> ReconcileResult<SecurityGroup> {
    require_placement(&spec.resource_group, &spec.name, &spec.location)?;
    let provider = env.provider.as_ref();
    let key = spec.key();
    let key = &key;
    get_or_create(
        env,
        ResourceKind::SecurityGroup,
        &spec.name,
        move || provider.get_security_group(key),
        move || provider.create_security_group(spec),
    )
    .await
}

pub async fn ensure_virtual_network(
    env: &StepEnv,
    spec: &VirtualNetworkSpec,
) -> ReconcileResult<VirtualNetwork> {
    require_placement(&spec.resource_group, &spec.name, &spec.location)?;
    require("address space", &spec.address_space)?;
    for subnet in &spec.subnets {
        require("subnet name", &subnet.name)?;
        require("subnet security group", &subnet.security_group_id)?;
    }
    let provider = env.provider.as_ref();
    let key = spec.key();
    let key = &key;
    get_or_create(
        env,
        ResourceKind::VirtualNetwork,
        &spec.name,
        move || provider.get_virtual_network(key),
        move || provider.create_virtual_network(spec),
    )
    .await
}

/// Ensure the pool's security groups, virtual network and subnets.
///
/// The public subnet is always present; the game subnet and its security
/// group only when `key.dual_homed` is set.
pub async fn ensure_network(
    env: &StepEnv,
    key: &NetworkKey,
    tags: &Tags,
) -> ReconcileResult<NetworkTopology> {
    require("pool id", &key.pool_id)?;
    require_placement(&key.resource_group_name, &key.vnet_name, &key.location)?;

    let nsg_spec = |name: String| SecurityGroupSpec {
        resource_group: key.resource_group_name.clone(),
        name,
        location: key.location.clone(),
        tags: tags.clone(),
    };

    let public_nsg = ensure_security_group(env, &nsg_spec(naming::public_nsg_name(&key.pool_id))).await?;
    let game_nsg = if key.dual_homed {
        Some(ensure_security_group(env, &nsg_spec(naming::game_nsg_name(&key.pool_id))).await?)
    } else {
        None
    };

    let mut subnets = vec![SubnetSpec {
        name: SUBNET_PUBLIC.to_string(),
        address_prefix: SUBNET_PUBLIC_PREFIX.to_string(),
        security_group_id: public_nsg.id.clone(),
    }];
    if let Some(nsg) = &game_nsg {
        subnets.push(SubnetSpec {
            name: SUBNET_GAME.to_string(),
            address_prefix: SUBNET_GAME_PREFIX.to_string(),
            security_group_id: nsg.id.clone(),
        });
    }

    let vnet = ensure_virtual_network(
        env,
        &VirtualNetworkSpec {
            resource_group: key.resource_group_name.clone(),
            name: key.vnet_name.clone(),
            location: key.location.clone(),
            address_space: VNET_ADDRESS_SPACE.to_string(),
            subnets,
            tags: tags.clone(),
        },
    )
    .await?;

    topology(&vnet, &public_nsg, game_nsg.as_ref())
}

/// Shape the network resources into the topology shared by instances.
fn topology(
    vnet: &VirtualNetwork,
    public_nsg: &SecurityGroup,
    game_nsg: Option<&SecurityGroup>,
) -> ReconcileResult<NetworkTopology> {
    let subnet_ref = |name: &str| -> ReconcileResult<SubnetRef> {
        let subnet = vnet.subnet(name).ok_or_else(|| {
            ValidationError::new(
                "virtual network",
                format!("existing network '{}' has no '{name}' subnet", vnet.name),
            )
        })?;
        Ok(SubnetRef {
            id: subnet.id.clone(),
            name: subnet.name.clone(),
            address_prefix: subnet.address_prefix.clone(),
        })
    };
    let nsg_ref = |nsg: &SecurityGroup| ResourceRef {
        id: nsg.id.clone(),
        name: nsg.name.clone(),
    };

    Ok(NetworkTopology {
        virtual_network: ResourceRef {
            id: vnet.id.clone(),
            name: vnet.name.clone(),
        },
        public_subnet: subnet_ref(SUBNET_PUBLIC)?,
        game_subnet: match game_nsg {
            Some(_) => Some(subnet_ref(SUBNET_GAME)?),
            None => None,
        },
        public_nsg: nsg_ref(public_nsg),
        game_nsg: game_nsg.map(nsg_ref),
    })
}

pub async fn ensure_public_ip(env: &StepEnv, spec: &PublicIpSpec) -> ReconcileResult<PublicIp> {
    require_placement(&spec.resource_group, &spec.name, &spec.location)?;
    require("dns label", &spec.dns_label)?;
    let provider = env.provider.as_ref();
    let key = spec.key();
    let key = &key;
    get_or_create(
        env,
        ResourceKind::PublicIp,
        &spec.name,
        move || provider.get_public_ip(key),
        move || provider.create_public_ip(spec),
    )
    .await
}

pub async fn ensure_network_interface(
    env: &StepEnv,
    spec: &NetworkInterfaceSpec,
) -> ReconcileResult<NetworkInterface> {
    require_placement(&spec.resource_group, &spec.name, &spec.location)?;
    require("subnet id", &spec.subnet_id)?;
    require("security group id", &spec.security_group_id)?;
    if let Some(pip) = &spec.public_ip_id {
        require("public ip id", pip)?;
    }
    let provider = env.provider.as_ref();
    let key = spec.key();
    let key = &key;
    get_or_create(
        env,
        ResourceKind::NetworkInterface,
        &spec.name,
        move || provider.get_network_interface(key),
        move || provider.create_network_interface(spec),
    )
    .await
}

pub async fn ensure_instance(
    env: &StepEnv,
    spec: &VirtualMachineSpec,
) -> ReconcileResult<VirtualMachine> {
    require_placement(&spec.resource_group, &spec.name, &spec.location)?;
    require("vm size", &spec.size)?;
    require("admin username", &spec.admin_username)?;
    require("admin credentials ref", &spec.admin_credentials_ref)?;
    require("primary nic id", &spec.primary_nic_id)?;
    for nic in &spec.secondary_nic_ids {
        require("secondary nic id", nic)?;
    }
    let provider = env.provider.as_ref();
    let key = spec.key();
    let key = &key;
    get_or_create(
        env,
        ResourceKind::VirtualMachine,
        &spec.name,
        move || provider.get_virtual_machine(key),
        move || provider.create_virtual_machine(spec),
    )
    .await
}
