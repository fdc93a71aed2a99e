//! Deterministic resource names and the fixed network layout.
//!
//! Every name the reconciler asks the provider for is derived from the pool
//! id and the instance index, so a re-driven run always addresses the same
//! resources.

/// Subnet carrying the public NIC of every instance.
pub const SUBNET_PUBLIC: &str = "public";

/// Subnet carrying the secondary (game traffic) NIC of dual-homed instances.
pub const SUBNET_GAME: &str = "game";

/// Address space of the pool's virtual network.
pub const VNET_ADDRESS_SPACE: &str = "10.0.0.0/24";

/// Address prefix of the public subnet.
pub const SUBNET_PUBLIC_PREFIX: &str = "10.0.0.0/27";

/// Address prefix of the game subnet.
pub const SUBNET_GAME_PREFIX: &str = "10.0.0.32/27";

/// Tag key stamped on every resource created for a pool.
pub const POOL_ID_TAG: &str = "pool-id";

/// Name of the VM at `index` in pool `pool_id`.
pub fn instance_name(pool_id: &str, index: u32) -> String {
    format!("{pool_id}-vm-{index}")
}

/// Default virtual network name when the pool does not set one.
pub fn default_vnet_name(pool_id: &str) -> String {
    format!("{pool_id}-vnet")
}

/// Security group bound to the public subnet.
pub fn public_nsg_name(pool_id: &str) -> String {
    format!("{pool_id}-public-nsg")
}

/// Security group bound to the game subnet.
pub fn game_nsg_name(pool_id: &str) -> String {
    format!("{pool_id}-game-nsg")
}

/// Static public IP of an instance.
pub fn public_ip_name(instance: &str) -> String {
    format!("{instance}-pip")
}

/// Primary NIC of an instance, attached to the public subnet.
pub fn public_nic_name(instance: &str) -> String {
    format!("{instance}-public-nic")
}

/// Secondary NIC of an instance, attached to the game subnet.
pub fn game_nic_name(instance: &str) -> String {
    format!("{instance}-game-nic")
}
