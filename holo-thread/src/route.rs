//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::net::Ipv6Addr;

use ipnetwork::Ipv6Network;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::leader::Leader;
use crate::mle::{self, RouterTable};
use crate::packet::NetworkData;
use crate::packet::consts::{
    ALOC16_BACKBONE_ROUTER_PRIMARY, ALOC16_COMMISSIONER_END,
    ALOC16_COMMISSIONER_START, ALOC16_DHCP_AGENT_END, ALOC16_DHCP_AGENT_START,
    ALOC16_LEADER, ALOC16_ND_AGENT_END, ALOC16_ND_AGENT_START,
    ALOC16_SERVICE_END, ALOC16_SERVICE_START, CONTEXT_ID_MESH_LOCAL,
};
use crate::packet::tlv::{BorderRouterEntry, PrefixTlv, RoutePreference};

// 6LoWPAN context used for header compression.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LowpanContext {
    pub prefix: Ipv6Network,
    pub context_id: u8,
    pub compress: bool,
}

// ===== impl NetworkData =====

impl NetworkData {
    // Selects the next hop for traffic from `source` to `destination`.
    //
    // For each prefix matching the source address, external routes in the
    // same domain are tried first, then the Border Routers providing a
    // default route for that prefix.
    pub fn route_lookup(
        &self,
        rt: &impl RouterTable,
        source: &Ipv6Addr,
        destination: &Ipv6Addr,
    ) -> Result<u16, Error> {
        for prefix in self.prefixes() {
            if !prefix.prefix.contains(*source) {
                continue;
            }

            if let Some(rloc16) =
                self.external_route_lookup(rt, prefix.domain_id, destination)
            {
                return Ok(rloc16);
            }
            if let Some(rloc16) = default_route_lookup(rt, prefix) {
                return Ok(rloc16);
            }
        }

        Err(Error::NoRoute)
    }

    // Selects the best Has Route entry among the longest prefixes covering
    // the destination address.
    pub fn external_route_lookup(
        &self,
        rt: &impl RouterTable,
        domain_id: u8,
        destination: &Ipv6Addr,
    ) -> Option<u16> {
        let mut best: Option<(u8, (RoutePreference, u16))> = None;

        for prefix in self.prefixes() {
            if prefix.domain_id != domain_id
                || !prefix.prefix.contains(*destination)
            {
                continue;
            }

            // A longer prefix always wins.
            let plen = prefix.prefix.prefix();
            if best.is_some_and(|(best_plen, _)| plen <= best_plen) {
                continue;
            }

            let candidates = prefix
                .has_routes()
                .flat_map(|has_route| has_route.entries.iter())
                .map(|entry| (entry.preference(), entry.rloc16));
            if let Some(candidate) = best_candidate(rt, candidates) {
                best = Some((plen, candidate));
            }
        }

        best.map(|(_, (_, rloc16))| rloc16)
    }

    // Resolves an anycast locator to the RLOC16 of the node serving it.
    pub fn anycast_lookup(
        &self,
        rt: &impl RouterTable,
        aloc16: u16,
    ) -> Result<u16, Error> {
        let rloc16 = match aloc16 {
            ALOC16_LEADER => rt.leader_rloc16(),
            ALOC16_DHCP_AGENT_START..=ALOC16_DHCP_AGENT_END => {
                let context_id = (aloc16 & 0x000f) as u8;
                self.agent_lookup(rt, context_id, BorderRouterEntry::is_dhcp_agent)?
            }
            ALOC16_SERVICE_START..=ALOC16_SERVICE_END => {
                let service_id = mle::service_id_from_aloc16(aloc16);
                self.service_lookup(rt, service_id)?
            }
            ALOC16_COMMISSIONER_START..=ALOC16_COMMISSIONER_END => self
                .commissioning_dataset()
                .locator
                .ok_or(Error::NoRoute)?,
            ALOC16_BACKBONE_ROUTER_PRIMARY => {
                rt.backbone_router_primary().ok_or(Error::Drop)?
            }
            ALOC16_ND_AGENT_START..=ALOC16_ND_AGENT_END => {
                let context_id = (aloc16 - ALOC16_ND_AGENT_START + 1) as u8;
                self.agent_lookup(rt, context_id, BorderRouterEntry::is_nd_agent)?
            }
            _ => return Err(Error::Drop),
        };

        // Children are reached through their parent, unless this device is
        // the parent.
        if mle::is_child(rloc16) {
            let parent = mle::parent_rloc16(rloc16);
            if !rt.has_rloc16(parent) {
                return Ok(parent);
            }
        }

        Ok(rloc16)
    }

    // Returns the 6LoWPAN context covering the address. The mesh-local
    // prefix always maps to context 0.
    pub fn context_by_address(
        &self,
        rt: &impl RouterTable,
        addr: &Ipv6Addr,
    ) -> Option<LowpanContext> {
        let mut best = rt
            .is_mesh_local_address(addr)
            .then(|| mesh_local_context(rt));

        for prefix in self.prefixes() {
            if !prefix.prefix.contains(*addr) {
                continue;
            }
            let Some(context) = prefix.context() else {
                continue;
            };
            if best.is_none_or(|best| prefix.prefix.prefix() > best.prefix.prefix())
            {
                best = Some(LowpanContext {
                    prefix: prefix.prefix,
                    context_id: context.context_id,
                    compress: context.compress,
                });
            }
        }

        best
    }

    pub fn context_by_id(
        &self,
        rt: &impl RouterTable,
        context_id: u8,
    ) -> Option<LowpanContext> {
        if context_id == CONTEXT_ID_MESH_LOCAL {
            return Some(mesh_local_context(rt));
        }

        let prefix = self.find_prefix_by_context_id(context_id)?;
        let context = prefix.context()?;
        Some(LowpanContext {
            prefix: prefix.prefix,
            context_id: context.context_id,
            compress: context.compress,
        })
    }

    // Whether the address belongs to the mesh-local prefix or to a prefix
    // advertised as on-mesh by any Border Router.
    pub fn is_on_mesh(&self, rt: &impl RouterTable, addr: &Ipv6Addr) -> bool {
        if rt.is_mesh_local_address(addr) {
            return true;
        }

        self.prefixes()
            .filter(|prefix| prefix.prefix.contains(*addr))
            .flat_map(|prefix| prefix.border_routers())
            .flat_map(|border_router| border_router.entries.iter())
            .any(|entry| entry.is_on_mesh())
    }

    // Selects the best Border Router flagged as agent for the prefix bound to
    // the Context ID.
    fn agent_lookup(
        &self,
        rt: &impl RouterTable,
        context_id: u8,
        is_agent: fn(&BorderRouterEntry) -> bool,
    ) -> Result<u16, Error> {
        let prefix = self
            .find_prefix_by_context_id(context_id)
            .ok_or(Error::NoRoute)?;

        let candidates = prefix
            .border_routers()
            .flat_map(|border_router| border_router.entries.iter())
            .filter(|entry| is_agent(entry))
            .map(|entry| (entry.preference(), entry.rloc16));
        best_candidate(rt, candidates)
            .map(|(_, rloc16)| rloc16)
            .ok_or(Error::NoRoute)
    }

    // Selects the best server of a service. Servers carry no preference.
    fn service_lookup(
        &self,
        rt: &impl RouterTable,
        service_id: u8,
    ) -> Result<u16, Error> {
        let service = self
            .find_service_by_id(service_id)
            .ok_or(Error::NoRoute)?;

        let candidates = service
            .servers()
            .map(|server| (RoutePreference::Medium, server.rloc16));
        best_candidate(rt, candidates)
            .map(|(_, rloc16)| rloc16)
            .ok_or(Error::NoRoute)
    }
}

// ===== impl Leader =====

impl Leader {
    pub fn route_lookup(
        &self,
        rt: &impl RouterTable,
        source: &Ipv6Addr,
        destination: &Ipv6Addr,
    ) -> Result<u16, Error> {
        self.netdata.route_lookup(rt, source, destination)
    }

    pub fn anycast_lookup(
        &self,
        rt: &impl RouterTable,
        aloc16: u16,
    ) -> Result<u16, Error> {
        self.netdata.anycast_lookup(rt, aloc16)
    }

    pub fn context_by_address(
        &self,
        rt: &impl RouterTable,
        addr: &Ipv6Addr,
    ) -> Option<LowpanContext> {
        self.netdata.context_by_address(rt, addr)
    }

    pub fn context_by_id(
        &self,
        rt: &impl RouterTable,
        context_id: u8,
    ) -> Option<LowpanContext> {
        self.netdata.context_by_id(rt, context_id)
    }

    pub fn is_on_mesh(&self, rt: &impl RouterTable, addr: &Ipv6Addr) -> bool {
        self.netdata.is_on_mesh(rt, addr)
    }
}

// ===== helper functions =====

fn default_route_lookup(rt: &impl RouterTable, prefix: &PrefixTlv) -> Option<u16> {
    let candidates = prefix
        .border_routers()
        .flat_map(|border_router| border_router.entries.iter())
        .filter(|entry| entry.is_default_route())
        .map(|entry| (entry.preference(), entry.rloc16));
    best_candidate(rt, candidates).map(|(_, rloc16)| rloc16)
}

// Returns the best candidate. Ties keep the first candidate found.
fn best_candidate<I>(
    rt: &impl RouterTable,
    candidates: I,
) -> Option<(RoutePreference, u16)>
where
    I: IntoIterator<Item = (RoutePreference, u16)>,
{
    let mut best = None;
    for candidate in candidates {
        if best.is_none_or(|best| {
            compare_route_entries(rt, candidate, best) == Ordering::Greater
        }) {
            best = Some(candidate);
        }
    }
    best
}

fn mesh_local_context(rt: &impl RouterTable) -> LowpanContext {
    LowpanContext {
        prefix: rt.mesh_local_prefix(),
        context_id: CONTEXT_ID_MESH_LOCAL,
        compress: true,
    }
}

// ===== global functions =====

// Three-way comparison of two route entries, given as (preference, RLOC16)
// pairs. `Ordering::Greater` means the first entry is preferred.
pub fn compare_route_entries(
    rt: &impl RouterTable,
    first: (RoutePreference, u16),
    second: (RoutePreference, u16),
) -> Ordering {
    let (first_pref, first_rloc16) = first;
    let (second_pref, second_rloc16) = second;

    first_pref
        .cmp(&second_pref)
        .then_with(|| tie_break(rt, first_rloc16, second_rloc16))
}

// On full devices, prefer the lower path cost, then routers over children.
#[cfg(not(feature = "mtd"))]
fn tie_break(rt: &impl RouterTable, first: u16, second: u16) -> Ordering {
    let first_cost = rt.path_cost(first);
    let second_cost = rt.path_cost(second);

    second_cost
        .cmp(&first_cost)
        .then_with(|| (!mle::is_child(first)).cmp(&!mle::is_child(second)))
}

// On minimal devices, prefer the entry registered by this device.
#[cfg(feature = "mtd")]
fn tie_break(rt: &impl RouterTable, first: u16, second: u16) -> Ordering {
    rt.is_own_rloc16(first).cmp(&rt.is_own_rloc16(second))
}

// ===== unit tests =====
