//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::consts::{MESHCOP_EXTENDED_LEN, MeshcopTlvType};
use crate::packet::error::{DecodeError, DecodeResult};

// Maximum length of the Steering Data, in bytes.
const STEERING_DATA_MAX_LEN: usize = 16;

// MeshCoP TLV, as carried in the Commissioning Data TLV.
//
// The length field is a single byte, or the 0xff marker followed by a
// 16-bit length for the extended form.
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct MeshcopTlv {
    pub tlv_type: u8,
    pub value: Bytes,
}

// Commissioning dataset extracted from the Commissioning Data TLV.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct CommissioningDataset {
    pub locator: Option<u16>,
    pub session_id: Option<u16>,
    pub steering_data: Option<Bytes>,
    pub joiner_udp_port: Option<u16>,
    pub has_extra_tlv: bool,
}

// Value of the MeshCoP State TLV.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum CommissioningState {
    Accept,
    Reject,
}

// ===== impl MeshcopTlv =====

impl MeshcopTlv {
    // Decodes a sequence of MeshCoP TLVs.
    pub fn decode_list(data: &[u8]) -> DecodeResult<Vec<MeshcopTlv>> {
        let mut buf = Bytes::copy_from_slice(data);
        let mut tlvs = vec![];

        while !buf.is_empty() {
            if buf.remaining() < 2 {
                return Err(DecodeError::IncompleteMeshcopTlv);
            }
            let tlv_type = buf.try_get_u8()?;
            let tlv_len = match buf.try_get_u8()? {
                MESHCOP_EXTENDED_LEN => {
                    if buf.remaining() < 2 {
                        return Err(DecodeError::IncompleteMeshcopTlv);
                    }
                    buf.try_get_u16()?
                }
                tlv_len => tlv_len as u16,
            };
            if tlv_len as usize > buf.remaining() {
                return Err(DecodeError::InvalidMeshcopTlvLength(
                    tlv_type, tlv_len,
                ));
            }
            let value = buf.copy_to_bytes(tlv_len as usize);
            tlvs.push(MeshcopTlv { tlv_type, value });
        }

        Ok(tlvs)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.tlv_type);
        if self.value.len() >= MESHCOP_EXTENDED_LEN as usize {
            buf.put_u8(MESHCOP_EXTENDED_LEN);
            buf.put_u16(self.value.len() as u16);
        } else {
            buf.put_u8(self.value.len() as u8);
        }
        buf.put_slice(&self.value);
    }

    pub fn len(&self) -> usize {
        let hdr_len = if self.value.len() >= MESHCOP_EXTENDED_LEN as usize {
            4
        } else {
            2
        };
        hdr_len + self.value.len()
    }

    pub fn is_type(&self, tlv_type: MeshcopTlvType) -> bool {
        self.tlv_type == tlv_type as u8
    }

    // Reads the value as a 16-bit integer.
    pub fn value_u16(&self) -> Option<u16> {
        let mut value = self.value.clone();
        value.try_get_u16().ok()
    }

    pub fn session_id(session_id: u16) -> MeshcopTlv {
        let value = Bytes::copy_from_slice(&session_id.to_be_bytes());
        MeshcopTlv::new(MeshcopTlvType::CommissionerSessionId as u8, value)
    }
}

// ===== impl CommissioningDataset =====

impl CommissioningDataset {
    pub fn from_tlvs(tlvs: &[MeshcopTlv]) -> Self {
        let mut dataset = CommissioningDataset::default();

        for tlv in tlvs {
            match MeshcopTlvType::from_u8(tlv.tlv_type) {
                Some(MeshcopTlvType::BorderAgentLocator) => {
                    if let Some(locator) = tlv.value_u16() {
                        dataset.locator = Some(locator);
                    }
                }
                Some(MeshcopTlvType::CommissionerSessionId) => {
                    if let Some(session_id) = tlv.value_u16() {
                        dataset.session_id = Some(session_id);
                    }
                }
                Some(MeshcopTlvType::SteeringData) => {
                    let len = tlv.value.len();
                    if len > 0 && len <= STEERING_DATA_MAX_LEN {
                        dataset.steering_data = Some(tlv.value.clone());
                    }
                }
                Some(MeshcopTlvType::JoinerUdpPort) => {
                    if let Some(port) = tlv.value_u16() {
                        dataset.joiner_udp_port = Some(port);
                    }
                }
                _ => dataset.has_extra_tlv = true,
            }
        }

        dataset
    }
}

// ===== global functions =====

pub fn encode_list(tlvs: &[MeshcopTlv]) -> BytesMut {
    let mut buf = BytesMut::new();
    for tlv in tlvs {
        tlv.encode(&mut buf);
    }
    buf
}
