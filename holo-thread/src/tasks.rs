//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tokio::sync::mpsc::Sender;
use tokio::time::Instant;

use crate::task::TimeoutTask;

//
// Network Data Leader tasks diagram:
//                                 +--------------+
//                                 |  MLE / CoAP  |
//                                 +--------------+
//                                       | ^
//                                       | |
//                         input_rx (1x) V | (1x) output_tx
//                                 +--------------+
//                                 |              |
//   context_reuse_timer (0/1x) -> |   instance   |
//        netdata_changed (1x)  -> |              |
//                                 +--------------+
//

// Network Data Leader inter-task message types.
pub mod messages {
    use serde::{Deserialize, Serialize};

    // Type aliases.
    pub type ProtocolInputMsg = input::ProtocolMsg;
    pub type ProtocolOutputMsg = output::ProtocolMsg;

    // Input messages (child task -> main task).
    pub mod input {
        use bytes::Bytes;

        use super::*;
        use crate::leader::MatchMode;
        use crate::mle::RouterTableSnapshot;

        #[derive(Debug, Deserialize, Serialize)]
        pub enum ProtocolMsg {
            ServerData(ServerDataMsg),
            RemoveBorderRouter(RemoveBorderRouterMsg),
            CommissioningSet(CommissioningSetMsg),
            CommissioningGet(CommissioningGetMsg),
            RouterTableUpdate(RouterTableUpdateMsg),
            ContextReuseTimer(ContextReuseTimerMsg),
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct ServerDataMsg {
            pub rloc16: u16,
            pub data: Bytes,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct RemoveBorderRouterMsg {
            pub rloc16: u16,
            pub mode: MatchMode,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct CommissioningSetMsg {
            pub data: Bytes,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct CommissioningGetMsg {
            pub tlv_types: Vec<u8>,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct RouterTableUpdateMsg {
            pub router_table: RouterTableSnapshot,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct ContextReuseTimerMsg {}
    }

    // Output messages (main task -> child task).
    pub mod output {
        use bytes::Bytes;

        use super::*;
        use crate::error::ErrorKind;
        use crate::packet::meshcop::CommissioningState;

        #[derive(Debug, Deserialize, Serialize)]
        pub enum ProtocolMsg {
            NetDataChanged(NetDataChangedMsg),
            ServerDataResponse(ServerDataResponseMsg),
            CommissioningSetResponse(CommissioningSetResponseMsg),
            CommissioningGetResponse(CommissioningGetResponseMsg),
        }

        #[derive(Clone, Debug, Deserialize, Serialize)]
        pub struct NetDataChangedMsg {
            pub version: u8,
            pub stable_version: u8,
            pub data: Bytes,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct ServerDataResponseMsg {
            pub rloc16: u16,
            pub error: Option<ErrorKind>,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct CommissioningSetResponseMsg {
            pub state: CommissioningState,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct CommissioningGetResponseMsg {
            pub data: Option<Bytes>,
        }
    }
}

// ===== Network Data Leader tasks =====

// Context ID reuse timer.
pub(crate) fn context_reuse_timer(
    deadline: Instant,
    context_reuse_timerp: &Sender<messages::input::ContextReuseTimerMsg>,
) -> TimeoutTask {
    let context_reuse_timerp = context_reuse_timerp.clone();
    TimeoutTask::at(deadline, move || async move {
        let msg = messages::input::ContextReuseTimerMsg {};
        let _ = context_reuse_timerp.send(msg).await;
    })
}
