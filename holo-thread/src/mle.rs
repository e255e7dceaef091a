//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv6Addr;

use derive_new::new;
use ipnetwork::Ipv6Network;
use serde::{Deserialize, Serialize};

use crate::packet::consts::{ALOC16_LEADER, ALOC16_SERVICE_START};

// Path cost reported for unreachable destinations.
pub const PATH_COST_INFINITE: u16 = 16;

const RLOC16_ROUTER_ID_SHIFT: u16 = 10;
const RLOC16_ROUTER_MASK: u16 = 0xfc00;
const RLOC16_CHILD_ID_MASK: u16 = 0x01ff;

// View of the MLE routing table consumed by the Network Data Leader.
pub trait RouterTable {
    // Whether the given router ID is currently allocated.
    fn is_router_id_allocated(&self, router_id: u8) -> bool;

    // Returns the cost of the path towards the given RLOC16.
    fn path_cost(&self, rloc16: u16) -> u16;

    // Returns the RLOC16 of this device.
    fn own_rloc16(&self) -> u16;

    // Returns the RLOC16 of the current Leader.
    fn leader_rloc16(&self) -> u16;

    // Returns the mesh-local /64 prefix.
    fn mesh_local_prefix(&self) -> Ipv6Network;

    // Returns the RLOC16 of the primary Backbone Router, if any.
    fn backbone_router_primary(&self) -> Option<u16> {
        None
    }

    fn is_own_rloc16(&self, rloc16: u16) -> bool {
        self.own_rloc16() == rloc16
    }

    // Whether this device answers for the given RLOC16.
    fn has_rloc16(&self, rloc16: u16) -> bool {
        self.is_own_rloc16(rloc16)
    }

    fn is_mesh_local_address(&self, addr: &Ipv6Addr) -> bool {
        self.mesh_local_prefix().contains(*addr)
    }
}

// Static routing table snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterTableSnapshot {
    pub rloc16: u16,
    pub leader_rloc16: u16,
    pub mesh_local_prefix: Ipv6Network,
    pub routers: Vec<RouterInfo>,
    pub backbone_router_primary: Option<u16>,
}

// Allocated router and the cost of the path towards it.
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouterInfo {
    pub router_id: u8,
    pub path_cost: u16,
}

// ===== impl RouterTableSnapshot =====

impl RouterTable for RouterTableSnapshot {
    fn is_router_id_allocated(&self, router_id: u8) -> bool {
        self.routers.iter().any(|router| router.router_id == router_id)
    }

    fn path_cost(&self, rloc16: u16) -> u16 {
        if router_id_match(rloc16, self.rloc16) {
            return 0;
        }
        self.routers
            .iter()
            .find(|router| router.router_id == router_id(rloc16))
            .map(|router| router.path_cost)
            .unwrap_or(PATH_COST_INFINITE)
    }

    fn own_rloc16(&self) -> u16 {
        self.rloc16
    }

    fn leader_rloc16(&self) -> u16 {
        self.leader_rloc16
    }

    fn mesh_local_prefix(&self) -> Ipv6Network {
        self.mesh_local_prefix
    }

    fn backbone_router_primary(&self) -> Option<u16> {
        self.backbone_router_primary
    }
}

impl Default for RouterTableSnapshot {
    fn default() -> RouterTableSnapshot {
        let mesh_local_prefix = Ipv6Network::new(
            Ipv6Addr::new(0xfdde, 0xad00, 0xbeef, 0, 0, 0, 0, 0),
            64,
        )
        .unwrap();

        RouterTableSnapshot {
            rloc16: 0,
            leader_rloc16: 0,
            mesh_local_prefix,
            routers: vec![RouterInfo::new(0, 0)],
            backbone_router_primary: None,
        }
    }
}

// ===== global functions =====

pub const fn router_id(rloc16: u16) -> u8 {
    (rloc16 >> RLOC16_ROUTER_ID_SHIFT) as u8
}

pub const fn child_id(rloc16: u16) -> u16 {
    rloc16 & RLOC16_CHILD_ID_MASK
}

// Whether the RLOC16 belongs to an end device rather than a router.
pub const fn is_child(rloc16: u16) -> bool {
    child_id(rloc16) != 0
}

pub const fn parent_rloc16(rloc16: u16) -> u16 {
    rloc16 & RLOC16_ROUTER_MASK
}

pub const fn router_id_match(a: u16, b: u16) -> bool {
    router_id(a) == router_id(b)
}

pub const fn service_aloc16(service_id: u8) -> u16 {
    ALOC16_SERVICE_START + service_id as u16
}

pub const fn service_id_from_aloc16(aloc16: u16) -> u8 {
    (aloc16 - ALOC16_SERVICE_START) as u8
}

pub const fn dhcp_agent_aloc16(context_id: u8) -> u16 {
    ALOC16_LEADER | context_id as u16
}
