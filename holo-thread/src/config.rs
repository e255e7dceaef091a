//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use serde::{Deserialize, Serialize};

// Network Data Leader configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeaderCfg {
    // Time a released 6LoWPAN Context ID is held before it can be reused,
    // in seconds.
    pub context_id_reuse_delay: u32,
}

// ===== impl LeaderCfg =====

impl LeaderCfg {
    pub const DFLT_CONTEXT_ID_REUSE_DELAY: u32 = 48 * 60 * 60;

    pub fn context_id_reuse_delay(&self) -> Duration {
        Duration::from_secs(self.context_id_reuse_delay.into())
    }
}

impl Default for LeaderCfg {
    fn default() -> LeaderCfg {
        LeaderCfg {
            context_id_reuse_delay: LeaderCfg::DFLT_CONTEXT_ID_REUSE_DELAY,
        }
    }
}
