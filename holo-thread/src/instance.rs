//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tokio::sync::mpsc;
use tokio::sync::mpsc::{Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tracing::{Instrument, debug_span};

use crate::config::LeaderCfg;
use crate::debug::Debug;
use crate::leader::Leader;
use crate::mle::RouterTableSnapshot;
use crate::task::TimeoutTask;
use crate::tasks;
use crate::tasks::messages::input::ContextReuseTimerMsg;
use crate::tasks::messages::output::{
    CommissioningGetResponseMsg, CommissioningSetResponseMsg,
    NetDataChangedMsg, ServerDataResponseMsg,
};
use crate::tasks::messages::{ProtocolInputMsg, ProtocolOutputMsg};

// Network Data Leader instance.
//
// Serializes all operations on the Leader and drives the context reuse
// timer.
#[derive(Debug)]
pub struct Instance {
    // Network Data Leader.
    pub leader: Leader,
    // Latest view of the MLE router table.
    pub router_table: RouterTableSnapshot,
    // Output channel.
    pub tx: UnboundedSender<ProtocolOutputMsg>,
    // Context ID reuse timer.
    context_reuse_task: Option<TimeoutTask>,
    context_reuse_timerp: Sender<ContextReuseTimerMsg>,
}

#[derive(Clone, Debug)]
pub struct ProtocolInputChannelsTx {
    // Requests from the MLE and MeshCoP layers.
    pub requests: UnboundedSender<ProtocolInputMsg>,
}

#[derive(Debug)]
pub struct ProtocolInputChannelsRx {
    // Requests from the MLE and MeshCoP layers.
    pub requests: UnboundedReceiver<ProtocolInputMsg>,
    // Context ID reuse timer.
    context_reuse_timer: Receiver<ContextReuseTimerMsg>,
    // Network Data change notifications.
    netdata_changed: UnboundedReceiver<NetDataChangedMsg>,
}

// ===== impl Instance =====

impl Instance {
    pub fn new(
        config: LeaderCfg,
        router_table: RouterTableSnapshot,
        tx: UnboundedSender<ProtocolOutputMsg>,
    ) -> (Instance, ProtocolInputChannelsTx, ProtocolInputChannelsRx) {
        let (requestsp, requestsc) = mpsc::unbounded_channel();
        let (context_reuse_timerp, context_reuse_timerc) = mpsc::channel(4);
        let (netdata_changedp, netdata_changedc) = mpsc::unbounded_channel();

        let mut leader = Leader::new(config);
        leader.set_notifier(netdata_changedp);

        let instance = Instance {
            leader,
            router_table,
            tx,
            context_reuse_task: None,
            context_reuse_timerp,
        };
        let channels_tx = ProtocolInputChannelsTx {
            requests: requestsp,
        };
        let channels_rx = ProtocolInputChannelsRx {
            requests: requestsc,
            context_reuse_timer: context_reuse_timerc,
            netdata_changed: netdata_changedc,
        };

        (instance, channels_tx, channels_rx)
    }

    // Processes messages until all request senders are dropped, returning
    // the final Leader state.
    //
    // Change notifications raised while processing a message are sent
    // right after the message's own response.
    pub async fn run(mut self, mut rx: ProtocolInputChannelsRx) -> Leader {
        async move {
            loop {
                tokio::select! {
                    biased;
                    msg = rx.requests.recv() => {
                        let Some(msg) = msg else {
                            break;
                        };
                        self.process_protocol_msg(msg);
                    }
                    Some(msg) = rx.context_reuse_timer.recv() => {
                        let msg = ProtocolInputMsg::ContextReuseTimer(msg);
                        self.process_protocol_msg(msg);
                    }
                }
                self.flush_netdata_changed(&mut rx.netdata_changed);
            }

            self.leader
        }
        .instrument(debug_span!("netdata-leader"))
        .await
    }

    pub fn process_protocol_msg(&mut self, msg: ProtocolInputMsg) {
        let rt = &self.router_table;

        match msg {
            // Network Data registration from a router or border router.
            ProtocolInputMsg::ServerData(msg) => {
                let result =
                    self.leader.register_network_data(rt, msg.rloc16, &msg.data);
                if let Err(error) = &result {
                    error.log();
                }
                self.send(ProtocolOutputMsg::ServerDataResponse(
                    ServerDataResponseMsg {
                        rloc16: msg.rloc16,
                        error: result.err().map(|error| error.kind()),
                    },
                ));
            }
            // Router or child went away.
            ProtocolInputMsg::RemoveBorderRouter(msg) => {
                self.leader.remove_border_router(msg.rloc16, msg.mode);
            }
            // Commissioning Set request.
            ProtocolInputMsg::CommissioningSet(msg) => {
                let state = self.leader.handle_commissioning_set(&msg.data);
                self.send(ProtocolOutputMsg::CommissioningSetResponse(
                    CommissioningSetResponseMsg { state },
                ));
            }
            // Commissioning Get request.
            ProtocolInputMsg::CommissioningGet(msg) => {
                let data = self.leader.commissioning_get(&msg.tlv_types);
                self.send(ProtocolOutputMsg::CommissioningGetResponse(
                    CommissioningGetResponseMsg { data },
                ));
            }
            // The MLE router table has changed.
            ProtocolInputMsg::RouterTableUpdate(msg) => {
                self.router_table = msg.router_table;
            }
            // Context ID reuse delay has expired.
            ProtocolInputMsg::ContextReuseTimer(_msg) => {
                self.context_reuse_task = None;
                self.leader.handle_context_reuse_timer();
            }
        }

        self.update_context_reuse_timer();
    }

    // Arms the context reuse timer for the earliest pending Context ID
    // removal, or stops it when there's none.
    fn update_context_reuse_timer(&mut self) {
        let Some(deadline) = self.leader.context_reuse_deadline() else {
            self.context_reuse_task = None;
            return;
        };

        if self
            .context_reuse_task
            .as_ref()
            .is_some_and(|task| task.deadline() == deadline)
        {
            return;
        }

        let task =
            tasks::context_reuse_timer(deadline, &self.context_reuse_timerp);
        Debug::ContextReuseTimerStart(task.remaining()).log();
        self.context_reuse_task = Some(task);
    }

    fn flush_netdata_changed(
        &self,
        netdata_changed: &mut UnboundedReceiver<NetDataChangedMsg>,
    ) {
        while let Ok(msg) = netdata_changed.try_recv() {
            self.send(ProtocolOutputMsg::NetDataChanged(msg));
        }
    }

    fn send(&self, msg: ProtocolOutputMsg) {
        let _ = self.tx.send(msg);
    }
}
