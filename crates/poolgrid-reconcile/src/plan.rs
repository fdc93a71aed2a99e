//! Provider specs derived from a pool and its instances.
//!
//! Pure functions: the same pool always yields the same specs, which is
//! what makes step input hashes stable across runs.

use poolgrid_core::{InstanceSpec, NetworkTopology, Pool};
use poolgrid_provider::{
    NetworkInterfaceSpec, PublicIpSku, PublicIpSpec, ResourceGroupSpec, VirtualMachineSpec,
};

pub fn resource_group_spec(pool: &Pool) -> ResourceGroupSpec {
    ResourceGroupSpec {
        name: pool.resource_group_name.clone(),
        location: pool.location.clone(),
        tags: pool.resource_tags(),
    }
}

/// Static Standard public IP whose DNS label is the instance name.
pub fn public_ip_spec(instance: &InstanceSpec) -> PublicIpSpec {
    PublicIpSpec {
        resource_group: instance.resource_group_name.clone(),
        name: instance.public_ip_name(),
        location: instance.location.clone(),
        dns_label: instance.name.clone(),
        static_allocation: true,
        sku: PublicIpSku::Standard,
        tags: instance.tags.clone(),
    }
}

pub fn public_nic_spec(
    instance: &InstanceSpec,
    topology: &NetworkTopology,
    public_ip_id: &str,
) -> NetworkInterfaceSpec {
    NetworkInterfaceSpec {
        resource_group: instance.resource_group_name.clone(),
        name: instance.public_nic_name(),
        location: instance.location.clone(),
        subnet_id: topology.public_subnet.id.clone(),
        security_group_id: topology.public_nsg.id.clone(),
        public_ip_id: Some(public_ip_id.to_string()),
        tags: instance.tags.clone(),
    }
}

/// Secondary NIC on the game subnet; `None` for single-homed topologies.
pub fn game_nic_spec(
    instance: &InstanceSpec,
    topology: &NetworkTopology,
) -> Option<NetworkInterfaceSpec> {
    let subnet = topology.game_subnet.as_ref()?;
    let nsg = topology.game_nsg.as_ref()?;
    Some(NetworkInterfaceSpec {
        resource_group: instance.resource_group_name.clone(),
        name: instance.game_nic_name(),
        location: instance.location.clone(),
        subnet_id: subnet.id.clone(),
        security_group_id: nsg.id.clone(),
        public_ip_id: None,
        tags: instance.tags.clone(),
    })
}

pub fn vm_spec(
    instance: &InstanceSpec,
    primary_nic_id: &str,
    secondary_nic_ids: Vec<String>,
) -> VirtualMachineSpec {
    VirtualMachineSpec {
        resource_group: instance.resource_group_name.clone(),
        name: instance.name.clone(),
        location: instance.location.clone(),
        size: instance.vm_size.clone(),
        admin_username: instance.admin_username.clone(),
        admin_credentials_ref: instance.admin_credentials_ref.clone(),
        primary_nic_id: primary_nic_id.to_string(),
        secondary_nic_ids,
        tags: instance.tags.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolgrid_core::{ResourceRef, SubnetRef};
    use std::collections::BTreeMap;

    fn pool() -> Pool {
        Pool {
            id: "p1".to_string(),
            resource_group_name: "rg-games".to_string(),
            location: "westeurope".to_string(),
            desired_vm_count: 2,
            vnet_name: None,
            dual_homed: true,
            vm_size: "Standard_D3_v2".to_string(),
            admin_username: "poolgrid".to_string(),
            admin_credentials_ref: "vault://admin".to_string(),
            tags: BTreeMap::from([("team".to_string(), "games".to_string())]),
        }
    }

    fn topology(dual_homed: bool) -> NetworkTopology {
        let subnet = |name: &str| SubnetRef {
            id: format!("vnet/subnets/{name}"),
            name: name.to_string(),
            address_prefix: "10.0.0.0/27".to_string(),
        };
        let nsg = |name: &str| ResourceRef {
            id: format!("nsg/{name}"),
            name: name.to_string(),
        };
        NetworkTopology {
            virtual_network: ResourceRef {
                id: "vnet".to_string(),
                name: "p1-vnet".to_string(),
            },
            public_subnet: subnet("public"),
            game_subnet: dual_homed.then(|| subnet("game")),
            public_nsg: nsg("public"),
            game_nsg: dual_homed.then(|| nsg("game")),
        }
    }

    #[test]
    fn public_ip_is_static_and_labelled_with_instance_name() {
        let instance = &pool().instance_specs()[1];
        let spec = public_ip_spec(instance);
        assert_eq!(spec.name, "p1-vm-1-pip");
        assert_eq!(spec.dns_label, "p1-vm-1");
        assert!(spec.static_allocation);
        assert_eq!(spec.sku, PublicIpSku::Standard);
        assert_eq!(spec.tags["pool-id"], "p1");
        assert_eq!(spec.tags["team"], "games");
    }

    #[test]
    fn nics_attach_to_their_subnets() {
        let instance = &pool().instance_specs()[0];
        let public = public_nic_spec(instance, &topology(true), "pip-id");
        assert_eq!(public.subnet_id, "vnet/subnets/public");
        assert_eq!(public.public_ip_id.as_deref(), Some("pip-id"));

        let game = game_nic_spec(instance, &topology(true)).unwrap();
        assert_eq!(game.name, "p1-vm-0-game-nic");
        assert_eq!(game.subnet_id, "vnet/subnets/game");
        assert!(game.public_ip_id.is_none());

        assert!(game_nic_spec(instance, &topology(false)).is_none());
    }

    #[test]
    fn group_spec_carries_pool_tags() {
        let spec = resource_group_spec(&pool());
        assert_eq!(spec.name, "rg-games");
        assert_eq!(spec.tags["pool-id"], "p1");
    }
}
