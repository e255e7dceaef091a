//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use tracing::{debug, debug_span};

use crate::leader::MatchMode;
use crate::packet::NetworkData;
use crate::packet::meshcop::CommissioningState;

// Network Data Leader debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    LeaderReset(u8, u8),
    LeaderRestore(u8, u8),
    // Network Data
    NetDataRegister(u16, &'a NetworkData),
    NetDataRemoveRloc(u16, MatchMode),
    NetDataUpdate(&'a NetworkData),
    VersionIncrement(u8, u8),
    // Context IDs
    ContextIdInUse(u8),
    ContextIdScheduleRemoval(u8, Duration),
    ContextIdRemove(u8),
    ContextReuseTimerStart(Duration),
    // Services
    ServiceIdAllocate(u8),
    // Commissioning
    CommissioningDataSet(usize),
    CommissioningSetReq(CommissioningState),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::LeaderReset(version, stable_version)
            | Debug::LeaderRestore(version, stable_version)
            | Debug::VersionIncrement(version, stable_version) => {
                // Parent span(s): netdata-leader
                debug!(%version, %stable_version, "{}", self);
            }
            Debug::NetDataRegister(rloc16, netdata) => {
                // Parent span(s): netdata-leader
                debug_span!("netdata").in_scope(|| {
                    let rloc16 = format!("{rloc16:#06x}");
                    let data = serde_json::to_string(&netdata).unwrap();
                    debug!(%rloc16, %data, "{}", self);
                })
            }
            Debug::NetDataRemoveRloc(rloc16, mode) => {
                // Parent span(s): netdata-leader
                debug_span!("netdata").in_scope(|| {
                    let rloc16 = format!("{rloc16:#06x}");
                    debug!(%rloc16, ?mode, "{}", self);
                })
            }
            Debug::NetDataUpdate(netdata) => {
                // Parent span(s): netdata-leader
                debug_span!("netdata").in_scope(|| {
                    let data = serde_json::to_string(&netdata).unwrap();
                    debug!(%data, "{}", self);
                })
            }
            Debug::ContextIdInUse(context_id)
            | Debug::ContextIdRemove(context_id) => {
                // Parent span(s): netdata-leader
                debug_span!("context-id").in_scope(|| {
                    debug!(%context_id, "{}", self);
                })
            }
            Debug::ContextIdScheduleRemoval(context_id, delay) => {
                // Parent span(s): netdata-leader
                debug_span!("context-id").in_scope(|| {
                    debug!(%context_id, ?delay, "{}", self);
                })
            }
            Debug::ContextReuseTimerStart(remaining) => {
                // Parent span(s): netdata-leader
                debug!(?remaining, "{}", self);
            }
            Debug::ServiceIdAllocate(service_id) => {
                // Parent span(s): netdata-leader
                debug!(%service_id, "{}", self);
            }
            Debug::CommissioningDataSet(length) => {
                // Parent span(s): netdata-leader
                debug_span!("commissioning").in_scope(|| {
                    debug!(%length, "{}", self);
                })
            }
            Debug::CommissioningSetReq(state) => {
                // Parent span(s): netdata-leader
                debug_span!("commissioning").in_scope(|| {
                    debug!(?state, "{}", self);
                })
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::LeaderReset(..) => {
                write!(f, "network data reset")
            }
            Debug::LeaderRestore(..) => {
                write!(f, "network data restored")
            }
            Debug::NetDataRegister(..) => {
                write!(f, "network data registration")
            }
            Debug::NetDataRemoveRloc(..) => {
                write!(f, "removing entries")
            }
            Debug::NetDataUpdate(..) => {
                write!(f, "network data updated")
            }
            Debug::VersionIncrement(..) => {
                write!(f, "version incremented")
            }
            Debug::ContextIdInUse(..) => {
                write!(f, "context id in use")
            }
            Debug::ContextIdScheduleRemoval(..) => {
                write!(f, "context id scheduled for removal")
            }
            Debug::ContextIdRemove(..) => {
                write!(f, "context id removed")
            }
            Debug::ContextReuseTimerStart(..) => {
                write!(f, "starting context reuse timer")
            }
            Debug::ServiceIdAllocate(..) => {
                write!(f, "service id allocated")
            }
            Debug::CommissioningDataSet(..) => {
                write!(f, "commissioning data set")
            }
            Debug::CommissioningSetReq(..) => {
                write!(f, "commissioning set request")
            }
        }
    }
}
