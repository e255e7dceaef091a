//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::Bytes;
use num_traits::FromPrimitive;

use crate::debug::Debug;
use crate::error::Error;
use crate::leader::{ChangedFlags, Leader};
use crate::packet::consts::{MeshcopTlvType, NETDATA_MAX_SIZE, TLV_HDR_SIZE};
use crate::packet::meshcop::{
    self, CommissioningDataset, CommissioningState, MeshcopTlv,
};
use crate::packet::tlv::CommissioningDataTlv;
use crate::packet::{NetDataTlv, NetworkData};

// ===== impl Leader =====

impl Leader {
    // Replaces the Commissioning Data TLV. An empty value removes it.
    //
    // The size is checked before the current TLV is dropped, so a failed
    // update leaves the existing Commissioning Data in place.
    pub fn set_commissioning_data(&mut self, value: &[u8]) -> Result<(), Error> {
        let existing_len = self
            .netdata
            .commissioning_data()
            .map(|tlv| tlv.len())
            .unwrap_or(0);
        let new_len = if value.is_empty() {
            0
        } else {
            TLV_HDR_SIZE + value.len()
        };
        if new_len >= NETDATA_MAX_SIZE
            || self.netdata.len() - existing_len + new_len > NETDATA_MAX_SIZE
        {
            return Err(Error::CommissioningDataTooLarge(value.len()));
        }

        self.netdata
            .tlvs
            .retain(|tlv| tlv.as_commissioning_data().is_none());
        if !value.is_empty() {
            let tlv =
                CommissioningDataTlv::new(false, Bytes::copy_from_slice(value));
            self.netdata.tlvs.push(NetDataTlv::CommissioningData(tlv));
        }
        Debug::CommissioningDataSet(value.len()).log();

        // Commissioning Data is never part of the stable subset.
        self.increment_versions(ChangedFlags {
            changed: true,
            stable_changed: false,
        });

        Ok(())
    }

    pub fn commissioning_dataset(&self) -> CommissioningDataset {
        self.netdata.commissioning_dataset()
    }

    // Processes a Commissioning Set request from the active commissioner.
    pub fn handle_commissioning_set(&mut self, data: &[u8]) -> CommissioningState {
        let state = self.commissioning_set(data);
        Debug::CommissioningSetReq(state).log();
        state
    }

    // Returns the requested MeshCoP TLVs from the Commissioning Data, in the
    // order they were requested. An empty request returns all of them.
    pub fn commissioning_get(&self, tlv_types: &[u8]) -> Option<Bytes> {
        let tlv = self.netdata.commissioning_data()?;
        if tlv_types.is_empty() {
            return Some(tlv.value.clone());
        }

        let tlvs = MeshcopTlv::decode_list(&tlv.value).ok()?;
        let tlvs = tlv_types
            .iter()
            .filter_map(|tlv_type| {
                tlvs.iter().find(|tlv| tlv.tlv_type == *tlv_type).cloned()
            })
            .collect::<Vec<_>>();
        Some(meshcop::encode_list(&tlvs).freeze())
    }

    // Leaves only a Commissioner Session ID in the Commissioning Data.
    pub(crate) fn set_empty_commissioner_data(
        &mut self,
        session_id: u16,
    ) -> Result<(), Error> {
        let tlvs = [MeshcopTlv::session_id(session_id)];
        let value = meshcop::encode_list(&tlvs);
        self.set_commissioning_data(&value)
    }

    fn commissioning_set(&mut self, data: &[u8]) -> CommissioningState {
        let Ok(tlvs) = MeshcopTlv::decode_list(data) else {
            return CommissioningState::Reject;
        };

        let mut session_id = None;
        let mut has_valid_tlv = false;
        for tlv in &tlvs {
            match MeshcopTlvType::from_u8(tlv.tlv_type) {
                Some(MeshcopTlvType::SteeringData)
                | Some(MeshcopTlvType::JoinerUdpPort) => has_valid_tlv = true,
                // The Border Agent Locator is owned by the Leader.
                Some(MeshcopTlvType::BorderAgentLocator) => {
                    return CommissioningState::Reject;
                }
                Some(MeshcopTlvType::CommissionerSessionId) => {
                    session_id = tlv.value_u16();
                }
                _ => (),
            }
        }
        let Some(session_id) = session_id else {
            return CommissioningState::Reject;
        };
        if !has_valid_tlv {
            return CommissioningState::Reject;
        }

        let current = self
            .netdata
            .commissioning_data()
            .and_then(|tlv| MeshcopTlv::decode_list(&tlv.value).ok())
            .unwrap_or_default();
        let current_session_id = current
            .iter()
            .find(|tlv| tlv.is_type(MeshcopTlvType::CommissionerSessionId))
            .and_then(|tlv| tlv.value_u16());
        if current_session_id.is_some_and(|current| current != session_id) {
            return CommissioningState::Reject;
        }

        // Carry over the Border Agent Locator of the active commissioner.
        let mut tlvs = tlvs;
        tlvs.extend(
            current
                .into_iter()
                .filter(|tlv| tlv.is_type(MeshcopTlvType::BorderAgentLocator)),
        );

        let value = meshcop::encode_list(&tlvs);
        match self.set_commissioning_data(&value) {
            Ok(()) => CommissioningState::Accept,
            Err(error) => {
                error.log();
                CommissioningState::Reject
            }
        }
    }
}

// ===== impl NetworkData =====

impl NetworkData {
    // Returns the commissioning dataset. Malformed Commissioning Data yields
    // an empty dataset.
    pub fn commissioning_dataset(&self) -> CommissioningDataset {
        self.commissioning_data()
            .and_then(|tlv| MeshcopTlv::decode_list(&tlv.value).ok())
            .map(|tlvs| CommissioningDataset::from_tlvs(&tlvs))
            .unwrap_or_default()
    }
}
