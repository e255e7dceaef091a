//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

use crate::config::LeaderCfg;
use crate::context_ids::ContextIds;
use crate::debug::Debug;
use crate::error::{Error, ValidationError};
use crate::mle::{self, RouterTable};
use crate::packet::consts::{
    BORDER_ROUTER_ENTRY_SIZE, CONTEXT_VALUE_SIZE, HAS_ROUTE_ENTRY_SIZE,
    NETDATA_MAX_SIZE, SERVICE_ID_MAX, SERVICE_ID_MIN, TLV_HDR_SIZE, TlvType,
};
use crate::packet::tlv::{
    BorderRouterTlv, ContextTlv, HasRouteTlv, PrefixSubTlv, PrefixTlv,
    ServiceSubTlv, ServiceTlv,
};
use crate::packet::{NetDataTlv, NetworkData};
use crate::tasks::messages::output::NetDataChangedMsg;

// Thread Network Data Leader.
//
// Owns the authoritative copy of the Network Data, merges the registrations
// received from routers and keeps track of the 6LoWPAN Context IDs.
#[derive(Clone, Debug)]
pub struct Leader {
    pub config: LeaderCfg,
    pub(crate) netdata: NetworkData,
    pub(crate) version: u8,
    pub(crate) stable_version: u8,
    pub(crate) context_ids: ContextIds,
    notify_tx: Option<UnboundedSender<NetDataChangedMsg>>,
}

// How entries are matched against an RLOC16 when they are removed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum MatchMode {
    // Match the exact RLOC16.
    Rloc16,
    // Match any RLOC16 sharing the same router ID.
    RouterId,
}

// Changes accumulated during a single Network Data update.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChangedFlags {
    pub changed: bool,
    pub stable_changed: bool,
}

// ===== impl Leader =====

impl Leader {
    pub fn new(config: LeaderCfg) -> Leader {
        let context_ids = ContextIds::new(config.context_id_reuse_delay());
        let mut leader = Leader {
            config,
            netdata: Default::default(),
            version: 0,
            stable_version: 0,
            context_ids,
            notify_tx: None,
        };
        leader.reset();
        leader
    }

    // Sets the channel used to signal Network Data changes.
    pub fn set_notifier(&mut self, tx: UnboundedSender<NetDataChangedMsg>) {
        self.notify_tx = Some(tx);
    }

    // Discards all Network Data and picks random initial versions.
    pub fn reset(&mut self) {
        self.netdata = Default::default();
        self.version = rand::random();
        self.stable_version = rand::random();
        self.context_ids.clear();
        self.context_ids
            .set_reuse_delay(self.config.context_id_reuse_delay());
        Debug::LeaderReset(self.version, self.stable_version).log();
    }

    pub fn network_data(&self) -> &NetworkData {
        &self.netdata
    }

    // Returns the subset of the Network Data distributed to sleepy children.
    pub fn stable_network_data(&self) -> NetworkData {
        self.netdata.stable_subset()
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn stable_version(&self) -> u8 {
        self.stable_version
    }

    pub fn context_ids(&self) -> &ContextIds {
        &self.context_ids
    }

    // Returns when the context reuse timer needs to fire next.
    pub fn context_reuse_deadline(&self) -> Option<Instant> {
        self.context_ids.next_deadline()
    }

    // Replaces all entries previously registered by a router with the
    // entries of its new Network Data.
    //
    // The registration is rejected as a whole when it can't be decoded or
    // fails validation. When the Network Data runs out of space, the TLVs
    // that fit are still merged and the capacity error is returned at the
    // end.
    pub fn register_network_data(
        &mut self,
        rt: &impl RouterTable,
        rloc16: u16,
        data: &[u8],
    ) -> Result<(), Error> {
        if !rt.is_router_id_allocated(mle::router_id(rloc16)) {
            return Err(Error::RouterIdNotAllocated(rloc16));
        }

        let netdata = NetworkData::decode(data)
            .map_err(|error| Error::InvalidNetData(rloc16, error))?;
        validate(&netdata, rloc16)
            .map_err(|error| Error::InvalidRegistration(rloc16, error))?;
        Debug::NetDataRegister(rloc16, &netdata).log();

        let mut flags = ChangedFlags::default();
        self.remove_rloc(rloc16, MatchMode::Rloc16, Some(&netdata), &mut flags);

        let mut result = Ok(());
        for tlv in &netdata.tlvs {
            let tlv_result = match tlv {
                NetDataTlv::Prefix(prefix) => self.add_prefix(prefix, &mut flags),
                NetDataTlv::Service(service) => {
                    self.add_service(service, &mut flags)
                }
                _ => Ok(()),
            };
            if result.is_ok() {
                result = tlv_result;
            }
        }

        self.increment_versions(flags);
        result
    }

    // Checks whether a registration would be merged in full, without
    // modifying the Network Data.
    pub fn would_fit(
        &self,
        rt: &impl RouterTable,
        rloc16: u16,
        data: &[u8],
    ) -> bool {
        let mut scratch = Leader {
            notify_tx: None,
            ..self.clone()
        };
        scratch.register_network_data(rt, rloc16, data).is_ok()
    }

    // Removes all entries registered by the given RLOC16.
    pub fn remove_border_router(&mut self, rloc16: u16, mode: MatchMode) {
        Debug::NetDataRemoveRloc(rloc16, mode).log();

        let mut flags = ChangedFlags::default();
        self.remove_rloc(rloc16, mode, None, &mut flags);
        self.increment_versions(flags);
    }

    // Releases the Context IDs whose reuse delay has expired, removing
    // them from the Network Data.
    pub fn handle_context_reuse_timer(&mut self) {
        let now = Instant::now();
        for context_id in self.context_ids.release_expired(now) {
            self.remove_context(context_id);
        }
    }

    // Adopts Network Data distributed by a previous Leader.
    //
    // Entries from unallocated router IDs are removed and the Context ID
    // tracker is synchronized with the Context TLVs found.
    pub fn restore_network_data(
        &mut self,
        rt: &impl RouterTable,
        version: u8,
        stable_version: u8,
        data: &[u8],
    ) -> Result<(), Error> {
        let netdata = NetworkData::decode(data)
            .map_err(|error| Error::InvalidNetData(rt.leader_rloc16(), error))?;

        self.netdata = netdata;
        self.version = version;
        self.stable_version = stable_version;
        self.context_ids.clear();
        Debug::LeaderRestore(version, stable_version).log();

        // Remove entries from unallocated router IDs.
        let mut flags = ChangedFlags::default();
        for rloc16 in self.registered_rloc16s() {
            if !rt.is_router_id_allocated(mle::router_id(rloc16)) {
                self.remove_rloc(rloc16, MatchMode::RouterId, None, &mut flags);
            }
        }
        self.increment_versions(flags);

        // Synchronize the Context ID tracker.
        let now = Instant::now();
        let contexts = self
            .netdata
            .prefixes()
            .filter_map(|prefix| prefix.context())
            .map(|context| (context.context_id, context.compress))
            .collect::<Vec<_>>();
        for (context_id, compress) in contexts {
            self.context_ids.mark_as_in_use(context_id);
            if !compress {
                self.context_ids.schedule_to_remove(context_id, now);
            }
        }

        // Resign the active commissioner, if any.
        let dataset = self.commissioning_dataset();
        if dataset.locator.is_some() {
            let session_id = dataset.session_id.unwrap_or(0).wrapping_add(1);
            self.set_empty_commissioner_data(session_id)?;
        }

        Ok(())
    }

    pub(crate) fn increment_versions(&mut self, flags: ChangedFlags) {
        if flags.stable_changed {
            self.stable_version = self.stable_version.wrapping_add(1);
        }
        if flags.changed {
            self.version = self.version.wrapping_add(1);
            Debug::VersionIncrement(self.version, self.stable_version).log();
            Debug::NetDataUpdate(&self.netdata).log();
            self.notify();
        }
    }

    fn notify(&self) {
        if let Some(notify_tx) = &self.notify_tx {
            let msg = NetDataChangedMsg {
                version: self.version,
                stable_version: self.stable_version,
                data: self.netdata.encode().freeze(),
            };
            let _ = notify_tx.send(msg);
        }
    }

    // Removes all entries matching the RLOC16, except those present in the
    // exclusion set.
    fn remove_rloc(
        &mut self,
        rloc16: u16,
        mode: MatchMode,
        exclude: Option<&NetworkData>,
        flags: &mut ChangedFlags,
    ) {
        let now = Instant::now();
        let mut idx = 0;

        while idx < self.netdata.tlvs.len() {
            let keep = match &mut self.netdata.tlvs[idx] {
                NetDataTlv::Prefix(prefix) => {
                    let exclude = exclude
                        .and_then(|exclude| exclude.find_prefix(&prefix.prefix));
                    remove_rloc_in_prefix(
                        prefix,
                        rloc16,
                        mode,
                        exclude,
                        &mut self.context_ids,
                        now,
                        flags,
                    );
                    update_prefix(prefix)
                }
                NetDataTlv::Service(service) => {
                    let exclude = exclude.and_then(|exclude| {
                        exclude.find_service(
                            service.enterprise_number,
                            &service.service_data,
                        )
                    });
                    remove_rloc_in_service(service, rloc16, mode, exclude, flags);
                    update_service(service)
                }
                _ => true,
            };

            // Re-check the same position when the TLV was removed.
            if keep {
                idx += 1;
            } else {
                self.netdata.tlvs.remove(idx);
            }
        }
    }

    fn add_prefix(
        &mut self,
        src: &PrefixTlv,
        flags: &mut ChangedFlags,
    ) -> Result<(), Error> {
        let pos = self.netdata.find_prefix_pos(&src.prefix);
        let (mut dst, dst_len) =
            match pos.and_then(|pos| self.netdata.tlvs[pos].as_prefix()) {
                Some(prefix) => (prefix.clone(), prefix.len()),
                None => (PrefixTlv::new(src.domain_id, src.prefix), 0),
            };
        let limit = NETDATA_MAX_SIZE.saturating_sub(self.netdata.len() - dst_len);

        let result = if dst.len() > limit {
            Err(Error::NetDataFull)
        } else {
            self.merge_prefix(&mut dst, src, limit, flags)
        };

        // Write back the updated TLV, discarding it when left empty.
        match pos {
            Some(pos) if update_prefix(&mut dst) => {
                self.netdata.tlvs[pos] = NetDataTlv::Prefix(dst);
            }
            Some(pos) => {
                self.netdata.tlvs.remove(pos);
            }
            None if update_prefix(&mut dst) => {
                self.netdata.tlvs.push(NetDataTlv::Prefix(dst));
            }
            None => (),
        }

        result
    }

    fn merge_prefix(
        &mut self,
        dst: &mut PrefixTlv,
        src: &PrefixTlv,
        limit: usize,
        flags: &mut ChangedFlags,
    ) -> Result<(), Error> {
        for stlv in &src.sub_tlvs {
            match stlv {
                PrefixSubTlv::HasRoute(has_route) => {
                    add_has_route(dst, has_route, limit, flags)?;
                }
                PrefixSubTlv::BorderRouter(border_router) => {
                    self.add_border_router(dst, border_router, limit, flags)?;
                }
                _ => (),
            }
        }

        Ok(())
    }

    fn add_border_router(
        &mut self,
        dst: &mut PrefixTlv,
        src: &BorderRouterTlv,
        limit: usize,
        flags: &mut ChangedFlags,
    ) -> Result<(), Error> {
        let Some(entry) = src.entries.first() else {
            return Ok(());
        };

        // Every prefix with a Border Router needs a 6LoWPAN context.
        let existing_context = dst.context().map(|context| context.context_id);
        let context_id = match existing_context {
            Some(context_id) => context_id,
            None => self
                .context_ids
                .unallocated_id()
                .ok_or(Error::ContextIdsExhausted)?,
        };

        let existing = dst.border_router(src.stable);
        let duplicate =
            existing.is_some_and(|stlv| stlv.entries.contains(entry));
        let mut needed = 0;
        match existing {
            Some(_) if duplicate => (),
            Some(_) => needed += BORDER_ROUTER_ENTRY_SIZE,
            None => needed += TLV_HDR_SIZE + BORDER_ROUTER_ENTRY_SIZE,
        }
        if existing_context.is_none() {
            needed += TLV_HDR_SIZE + CONTEXT_VALUE_SIZE;
        }
        if dst.len() + needed > limit {
            return Err(Error::NetDataFull);
        }

        match dst.border_router_mut(src.stable) {
            Some(_) if duplicate => (),
            Some(border_router) => {
                border_router.entries.push(*entry);
                flags.update(src.stable);
            }
            None => {
                let mut border_router = BorderRouterTlv::new(src.stable);
                border_router.entries.push(*entry);
                dst.sub_tlvs.push(PrefixSubTlv::BorderRouter(border_router));
                flags.update(src.stable);
            }
        }
        if existing_context.is_none() {
            let context =
                ContextTlv::new(false, false, context_id, dst.prefix.prefix());
            dst.sub_tlvs.push(PrefixSubTlv::Context(context));
        }
        if let Some(context) = dst.context_mut() {
            context.stable |= src.stable;
            context.compress = true;
        }
        self.context_ids.mark_as_in_use(context_id);

        Ok(())
    }

    fn add_service(
        &mut self,
        src: &ServiceTlv,
        flags: &mut ChangedFlags,
    ) -> Result<(), Error> {
        let Some(server) = src.servers().next() else {
            return Ok(());
        };

        let pos = self
            .netdata
            .find_service_pos(src.enterprise_number, &src.service_data);
        let (mut dst, dst_len) =
            match pos.and_then(|pos| self.netdata.tlvs[pos].as_service()) {
                Some(service) => (service.clone(), service.len()),
                None => {
                    let service_id = self
                        .unallocated_service_id()
                        .ok_or(Error::ServiceIdsExhausted)?;
                    let service = ServiceTlv::new(
                        service_id,
                        src.enterprise_number,
                        src.service_data.clone(),
                    );
                    (service, 0)
                }
            };
        let limit = NETDATA_MAX_SIZE.saturating_sub(self.netdata.len() - dst_len);

        let result = if dst.servers().any(|dst_server| dst_server == server) {
            Ok(())
        } else if dst.len() + server.len() > limit {
            Err(Error::NetDataFull)
        } else {
            dst.sub_tlvs.push(ServiceSubTlv::Server(server.clone()));
            flags.update(server.stable);
            Ok(())
        };

        // Write back the updated TLV, discarding it when left empty.
        match pos {
            Some(pos) if update_service(&mut dst) => {
                self.netdata.tlvs[pos] = NetDataTlv::Service(dst);
            }
            Some(pos) => {
                self.netdata.tlvs.remove(pos);
            }
            None if update_service(&mut dst) => {
                Debug::ServiceIdAllocate(dst.service_id).log();
                self.netdata.tlvs.push(NetDataTlv::Service(dst));
            }
            None => (),
        }

        result
    }

    // Returns the lowest Service ID not assigned to any service.
    fn unallocated_service_id(&self) -> Option<u8> {
        (SERVICE_ID_MIN..=SERVICE_ID_MAX).find(|service_id| {
            self.netdata.find_service_by_id(*service_id).is_none()
        })
    }

    // Strips the Context TLV bound to the given Context ID.
    fn remove_context(&mut self, context_id: u8) {
        Debug::ContextIdRemove(context_id).log();

        self.netdata.tlvs.retain_mut(|tlv| match tlv {
            NetDataTlv::Prefix(prefix) => {
                prefix.sub_tlvs.retain(|stlv| {
                    !stlv
                        .as_context()
                        .is_some_and(|context| context.context_id == context_id)
                });
                update_prefix(prefix)
            }
            _ => true,
        });

        self.increment_versions(ChangedFlags {
            changed: true,
            stable_changed: true,
        });
    }

    // Returns all RLOC16s present in the Network Data entries.
    fn registered_rloc16s(&self) -> Vec<u16> {
        let mut rloc16s = vec![];
        for tlv in &self.netdata.tlvs {
            match tlv {
                NetDataTlv::Prefix(prefix) => {
                    for has_route in prefix.has_routes() {
                        rloc16s.extend(has_route.entries.iter().map(|e| e.rloc16));
                    }
                    for border_router in prefix.border_routers() {
                        rloc16s.extend(
                            border_router.entries.iter().map(|e| e.rloc16),
                        );
                    }
                }
                NetDataTlv::Service(service) => {
                    rloc16s.extend(service.servers().map(|server| server.rloc16));
                }
                _ => (),
            }
        }
        rloc16s.sort_unstable();
        rloc16s.dedup();
        rloc16s
    }
}

// ===== impl MatchMode =====

impl MatchMode {
    pub fn matches(&self, entry_rloc16: u16, rloc16: u16) -> bool {
        match self {
            MatchMode::Rloc16 => entry_rloc16 == rloc16,
            MatchMode::RouterId => mle::router_id_match(entry_rloc16, rloc16),
        }
    }
}

// ===== impl ChangedFlags =====

impl ChangedFlags {
    pub fn update(&mut self, stable: bool) {
        self.changed = true;
        self.stable_changed |= stable;
    }
}

// ===== helper functions =====

fn add_has_route(
    dst: &mut PrefixTlv,
    src: &HasRouteTlv,
    limit: usize,
    flags: &mut ChangedFlags,
) -> Result<(), Error> {
    let Some(entry) = src.entries.first() else {
        return Ok(());
    };

    let existing = dst.has_route(src.stable);
    if existing.is_some_and(|stlv| stlv.entries.contains(entry)) {
        return Ok(());
    }
    let needed = match existing {
        Some(_) => HAS_ROUTE_ENTRY_SIZE,
        None => TLV_HDR_SIZE + HAS_ROUTE_ENTRY_SIZE,
    };
    if dst.len() + needed > limit {
        return Err(Error::NetDataFull);
    }

    match dst.has_route_mut(src.stable) {
        Some(has_route) => has_route.entries.push(*entry),
        None => {
            let mut has_route = HasRouteTlv::new(src.stable);
            has_route.entries.push(*entry);
            dst.sub_tlvs.push(PrefixSubTlv::HasRoute(has_route));
        }
    }
    flags.update(src.stable);

    Ok(())
}

fn remove_rloc_in_prefix(
    prefix: &mut PrefixTlv,
    rloc16: u16,
    mode: MatchMode,
    exclude: Option<&PrefixTlv>,
    context_ids: &mut ContextIds,
    now: Instant,
    flags: &mut ChangedFlags,
) {
    for stlv in &mut prefix.sub_tlvs {
        match stlv {
            PrefixSubTlv::HasRoute(has_route) => {
                let stable = has_route.stable;
                let exclude = exclude.and_then(|exclude| exclude.has_route(stable));
                has_route.entries.retain(|entry| {
                    let remove = mode.matches(entry.rloc16, rloc16)
                        && !exclude
                            .is_some_and(|exclude| exclude.entries.contains(entry));
                    if remove {
                        flags.update(stable);
                    }
                    !remove
                });
            }
            PrefixSubTlv::BorderRouter(border_router) => {
                let stable = border_router.stable;
                let exclude =
                    exclude.and_then(|exclude| exclude.border_router(stable));
                border_router.entries.retain(|entry| {
                    let remove = mode.matches(entry.rloc16, rloc16)
                        && !exclude
                            .is_some_and(|exclude| exclude.entries.contains(entry));
                    if remove {
                        flags.update(stable);
                    }
                    !remove
                });
            }
            _ => (),
        }
    }

    // Remove Sub-TLVs left without entries.
    prefix.sub_tlvs.retain(|stlv| match stlv {
        PrefixSubTlv::HasRoute(has_route) => !has_route.entries.is_empty(),
        PrefixSubTlv::BorderRouter(border_router) => {
            !border_router.entries.is_empty()
        }
        _ => true,
    });

    // The context remains compressible only while a Border Router refers
    // to the prefix.
    let has_border_router = prefix.has_border_router();
    if let Some(context) = prefix.context_mut() {
        context.compress = has_border_router;
        if has_border_router {
            context_ids.mark_as_in_use(context.context_id);
        } else {
            context_ids.schedule_to_remove(context.context_id, now);
        }
    }
}

fn remove_rloc_in_service(
    service: &mut ServiceTlv,
    rloc16: u16,
    mode: MatchMode,
    exclude: Option<&ServiceTlv>,
    flags: &mut ChangedFlags,
) {
    service.sub_tlvs.retain(|stlv| match stlv {
        ServiceSubTlv::Server(server) => {
            let remove = mode.matches(server.rloc16, rloc16)
                && !exclude.is_some_and(|exclude| {
                    exclude.servers().any(|exclude| exclude == server)
                });
            if remove {
                flags.update(server.stable);
            }
            !remove
        }
        _ => true,
    });
}

// Updates the stable flag of a Prefix TLV. Returns whether the TLV should be
// kept.
fn update_prefix(prefix: &mut PrefixTlv) -> bool {
    if prefix.sub_tlvs.is_empty() {
        return false;
    }
    prefix.update_stable();
    true
}

// Updates the stable flag of a Service TLV. Returns whether the TLV should be
// kept.
fn update_service(service: &mut ServiceTlv) -> bool {
    if service.servers().next().is_none() {
        return false;
    }
    service.update_stable();
    true
}

// ===== global functions =====

// Validates a Network Data registration received from the given RLOC16.
pub fn validate(netdata: &NetworkData, rloc16: u16) -> Result<(), ValidationError> {
    for (idx, tlv) in netdata.tlvs.iter().enumerate() {
        let previous = &netdata.tlvs[..idx];
        match tlv {
            NetDataTlv::Prefix(prefix) => {
                if previous.iter().any(|tlv| {
                    tlv.as_prefix().is_some_and(|p| p.prefix == prefix.prefix)
                }) {
                    return Err(ValidationError::DuplicatePrefix(prefix.prefix));
                }
                validate_prefix(prefix, rloc16)?;
            }
            NetDataTlv::Service(service) => {
                if previous.iter().any(|tlv| {
                    tlv.as_service().is_some_and(|s| {
                        s.matches(service.enterprise_number, &service.service_data)
                    })
                }) {
                    return Err(ValidationError::DuplicateService(
                        service.enterprise_number,
                    ));
                }
                validate_service(service, rloc16)?;
            }
            _ => (),
        }
    }

    Ok(())
}

fn validate_prefix(
    prefix: &PrefixTlv,
    rloc16: u16,
) -> Result<(), ValidationError> {
    let mut seen = vec![];

    for stlv in &prefix.sub_tlvs {
        let (tlv_type, stable, entries) = match stlv {
            PrefixSubTlv::HasRoute(stlv) => (
                TlvType::HasRoute,
                stlv.stable,
                stlv.entries.iter().map(|e| e.rloc16).collect::<Vec<_>>(),
            ),
            PrefixSubTlv::BorderRouter(stlv) => (
                TlvType::BorderRouter,
                stlv.stable,
                stlv.entries.iter().map(|e| e.rloc16).collect::<Vec<_>>(),
            ),
            _ => continue,
        };

        if seen.contains(&(tlv_type, stable)) {
            return Err(ValidationError::DuplicateSubTlv(tlv_type as u8, stable));
        }
        seen.push((tlv_type, stable));

        if entries.len() != 1 {
            return Err(ValidationError::InvalidEntryCount(
                tlv_type as u8,
                entries.len(),
            ));
        }
        if entries[0] != rloc16 {
            return Err(ValidationError::RlocMismatch(entries[0]));
        }
    }

    Ok(())
}

fn validate_service(
    service: &ServiceTlv,
    rloc16: u16,
) -> Result<(), ValidationError> {
    let mut servers = service.servers();
    let Some(server) = servers.next() else {
        return Ok(());
    };
    if servers.next().is_some() {
        return Err(ValidationError::DuplicateSubTlv(
            TlvType::Server as u8,
            server.stable,
        ));
    }
    if server.rloc16 != rloc16 {
        return Err(ValidationError::RlocMismatch(server.rloc16));
    }

    Ok(())
}
