//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod consts;
pub mod error;
pub mod meshcop;
pub mod tlv;

use bytes::{Bytes, BytesMut};
use enum_as_inner::EnumAsInner;
use ipnetwork::Ipv6Network;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::mle;
use crate::packet::consts::{NETDATA_MAX_SIZE, RLOC16_INVALID, TlvType};
pub use crate::packet::error::{DecodeError, DecodeResult};
use crate::packet::tlv::{
    CommissioningDataTlv, PrefixSubTlv, PrefixTlv, ServiceSubTlv, ServiceTlv,
    UnknownTlv, tlv_decode_next,
};

// Thread Network Data: an ordered sequence of top-level TLVs.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct NetworkData {
    pub tlvs: Vec<NetDataTlv>,
}

#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum NetDataTlv {
    Prefix(PrefixTlv),
    Service(ServiceTlv),
    CommissioningData(CommissioningDataTlv),
    Unknown(UnknownTlv),
}

// ===== impl NetworkData =====

impl NetworkData {
    // Decodes Network Data from a bytes buffer.
    //
    // Decoding fails as a whole if any TLV or Sub-TLV doesn't fit within the
    // region that encloses it.
    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        let mut tlvs = vec![];

        while !buf.is_empty() {
            let (tlv_type, stable, buf_tlv) = tlv_decode_next(&mut buf)?;
            let tlv = match TlvType::from_u8(tlv_type) {
                Some(TlvType::Prefix) => {
                    NetDataTlv::Prefix(PrefixTlv::decode(stable, buf_tlv)?)
                }
                Some(TlvType::Service) => {
                    NetDataTlv::Service(ServiceTlv::decode(stable, buf_tlv)?)
                }
                Some(TlvType::CommissioningData) => {
                    NetDataTlv::CommissioningData(CommissioningDataTlv::new(
                        stable, buf_tlv,
                    ))
                }
                _ => NetDataTlv::Unknown(UnknownTlv::new(
                    tlv_type, stable, buf_tlv,
                )),
            };
            tlvs.push(tlv);
        }

        Ok(NetworkData { tlvs })
    }

    // Encodes Network Data into a bytes buffer.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(NETDATA_MAX_SIZE);
        for tlv in &self.tlvs {
            tlv.encode(&mut buf);
        }
        buf
    }

    // Returns the encoded length, in bytes.
    pub fn len(&self) -> usize {
        self.tlvs.iter().map(|tlv| tlv.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tlvs.is_empty()
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &PrefixTlv> {
        self.tlvs.iter().filter_map(|tlv| tlv.as_prefix())
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceTlv> {
        self.tlvs.iter().filter_map(|tlv| tlv.as_service())
    }

    pub fn find_prefix(&self, prefix: &Ipv6Network) -> Option<&PrefixTlv> {
        self.prefixes().find(|tlv| tlv.prefix == *prefix)
    }

    pub(crate) fn find_prefix_pos(&self, prefix: &Ipv6Network) -> Option<usize> {
        self.tlvs.iter().position(|tlv| {
            tlv.as_prefix().is_some_and(|tlv| tlv.prefix == *prefix)
        })
    }

    pub fn find_service(
        &self,
        enterprise_number: u32,
        service_data: &[u8],
    ) -> Option<&ServiceTlv> {
        self.services()
            .find(|tlv| tlv.matches(enterprise_number, service_data))
    }

    pub(crate) fn find_service_pos(
        &self,
        enterprise_number: u32,
        service_data: &[u8],
    ) -> Option<usize> {
        self.tlvs.iter().position(|tlv| {
            tlv.as_service()
                .is_some_and(|tlv| tlv.matches(enterprise_number, service_data))
        })
    }

    pub fn find_service_by_id(&self, service_id: u8) -> Option<&ServiceTlv> {
        self.services().find(|tlv| tlv.service_id == service_id)
    }

    // Returns the Prefix TLV bound to the given 6LoWPAN context.
    pub fn find_prefix_by_context_id(
        &self,
        context_id: u8,
    ) -> Option<&PrefixTlv> {
        self.prefixes().find(|tlv| {
            tlv.context()
                .is_some_and(|context| context.context_id == context_id)
        })
    }

    pub fn commissioning_data(&self) -> Option<&CommissioningDataTlv> {
        self.tlvs.iter().find_map(|tlv| tlv.as_commissioning_data())
    }

    // Returns the subset of the Network Data that is distributed to sleepy
    // children.
    //
    // Non-stable TLVs and Sub-TLVs are removed. The RLOC16 of Has Route and
    // Border Router entries is replaced with an invalid RLOC16 (or with the
    // DHCPv6 agent ALOC16 for DHCPv6 entries), and the RLOC16 of servers is
    // replaced with the service ALOC16.
    pub fn stable_subset(&self) -> NetworkData {
        let mut netdata = self.clone();

        netdata.tlvs.retain_mut(|tlv| match tlv {
            NetDataTlv::Prefix(prefix) => {
                if !prefix.stable {
                    return false;
                }
                prefix.sub_tlvs.retain(|stlv| stlv.stable());

                let context_id = prefix.context().map(|ctx| ctx.context_id);
                for stlv in &mut prefix.sub_tlvs {
                    match stlv {
                        PrefixSubTlv::HasRoute(has_route) => {
                            for entry in &mut has_route.entries {
                                entry.rloc16 = RLOC16_INVALID;
                            }
                        }
                        PrefixSubTlv::BorderRouter(border_router) => {
                            for entry in &mut border_router.entries {
                                entry.rloc16 = match context_id {
                                    Some(context_id) if entry.is_dhcp_agent() => {
                                        mle::dhcp_agent_aloc16(context_id)
                                    }
                                    _ => RLOC16_INVALID,
                                };
                            }
                        }
                        _ => (),
                    }
                }
                !prefix.sub_tlvs.is_empty()
            }
            NetDataTlv::Service(service) => {
                if !service.stable {
                    return false;
                }
                service.sub_tlvs.retain(|stlv| stlv.stable());

                let aloc16 = mle::service_aloc16(service.service_id);
                for stlv in &mut service.sub_tlvs {
                    if let ServiceSubTlv::Server(server) = stlv {
                        server.rloc16 = aloc16;
                    }
                }
                !service.sub_tlvs.is_empty()
            }
            NetDataTlv::CommissioningData(tlv) => tlv.stable,
            NetDataTlv::Unknown(tlv) => tlv.stable,
        });

        netdata
    }
}

// ===== impl NetDataTlv =====

impl NetDataTlv {
    pub fn stable(&self) -> bool {
        match self {
            NetDataTlv::Prefix(tlv) => tlv.stable,
            NetDataTlv::Service(tlv) => tlv.stable,
            NetDataTlv::CommissioningData(tlv) => tlv.stable,
            NetDataTlv::Unknown(tlv) => tlv.stable,
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            NetDataTlv::Prefix(tlv) => tlv.encode(buf),
            NetDataTlv::Service(tlv) => tlv.encode(buf),
            NetDataTlv::CommissioningData(tlv) => tlv.encode(buf),
            NetDataTlv::Unknown(tlv) => tlv.encode(buf),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            NetDataTlv::Prefix(tlv) => tlv.len(),
            NetDataTlv::Service(tlv) => tlv.len(),
            NetDataTlv::CommissioningData(tlv) => tlv.len(),
            NetDataTlv::Unknown(tlv) => tlv.len(),
        }
    }
}
