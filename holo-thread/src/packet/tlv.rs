//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv6Addr;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use ipnetwork::Ipv6Network;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::consts::*;
use crate::packet::error::{DecodeError, DecodeResult};

//
// Prefix TLV.
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Type = 1   |S|    Length     |   Domain ID   | Prefix Length |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                     Prefix (variable length)                  |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                      Sub-TLVs (variable)                      |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PrefixTlv {
    pub stable: bool,
    pub domain_id: u8,
    pub prefix: Ipv6Network,
    pub sub_tlvs: Vec<PrefixSubTlv>,
}

#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PrefixSubTlv {
    HasRoute(HasRouteTlv),
    BorderRouter(BorderRouterTlv),
    Context(ContextTlv),
    Unknown(UnknownTlv),
}

//
// Has Route sub-TLV.
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Type = 0   |S|    Length     |            RLOC16             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |Prf|N|P|  Rsv  |                      ...                      |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct HasRouteTlv {
    pub stable: bool,
    #[new(default)]
    pub entries: Vec<HasRouteEntry>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct HasRouteEntry {
    pub rloc16: u16,
    pub flags: HasRouteFlags,
}

// Has Route entry flags. The two most significant bits hold the route
// preference.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct HasRouteFlags: u8 {
        const PREFERENCE = 0xc0;
        const NAT64 = 0x20;
        const ADV_PIO = 0x10;
    }
}

//
// Border Router sub-TLV.
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Type = 2   |S|    Length     |            RLOC16             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |Prf|P|S|D|C|R|O|N|D|  Reserved |              ...              |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct BorderRouterTlv {
    pub stable: bool,
    #[new(default)]
    pub entries: Vec<BorderRouterEntry>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct BorderRouterEntry {
    pub rloc16: u16,
    pub flags: BorderRouterFlags,
}

// Border Router entry flags. The two most significant bits hold the
// route preference.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct BorderRouterFlags: u16 {
        const PREFERENCE = 0xc000;
        const PREFERRED = 0x2000;
        const SLAAC = 0x1000;
        const DHCP = 0x0800;
        const CONFIGURE = 0x0400;
        const DEFAULT_ROUTE = 0x0200;
        const ON_MESH = 0x0100;
        const ND_DNS = 0x0080;
        const DOMAIN_PREFIX = 0x0040;
    }
}

// Route preference advertised by Has Route and Border Router entries.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum RoutePreference {
    Low = -1,
    Medium = 0,
    High = 1,
}

//
// Context sub-TLV.
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Type = 3   |S|    Length     |Res|C|  CID  |Context Length |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ContextTlv {
    pub stable: bool,
    pub compress: bool,
    pub context_id: u8,
    pub context_length: u8,
}

//
// Service TLV.
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Type = 5   |S|    Length     |T|  Rsv  | SID |   Enterprise  |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |       Number (omitted when T is set)          |  S_data_len   |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |       Service Data (variable)       |   Sub-TLVs (variable)   |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ServiceTlv {
    pub stable: bool,
    pub service_id: u8,
    pub enterprise_number: u32,
    pub service_data: Bytes,
    pub sub_tlvs: Vec<ServiceSubTlv>,
}

#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum ServiceSubTlv {
    Server(ServerTlv),
    Unknown(UnknownTlv),
}

//
// Server sub-TLV.
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Type = 6   |S|    Length     |           Server16            |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                    Server Data (variable)                     |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ServerTlv {
    pub stable: bool,
    pub rloc16: u16,
    pub server_data: Bytes,
}

// Commissioning Data TLV. The value is a sequence of MeshCoP TLVs which is
// always replaced as a whole.
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct CommissioningDataTlv {
    pub stable: bool,
    pub value: Bytes,
}

#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct UnknownTlv {
    pub tlv_type: u8,
    pub stable: bool,
    pub value: Bytes,
}

// ===== impl PrefixTlv =====

impl PrefixTlv {
    pub fn new(domain_id: u8, prefix: Ipv6Network) -> Self {
        PrefixTlv {
            stable: false,
            domain_id,
            prefix,
            sub_tlvs: vec![],
        }
    }

    pub(crate) fn decode(stable: bool, mut buf: Bytes) -> DecodeResult<Self> {
        let tlv_len = buf.len() as u8;
        if buf.remaining() < PREFIX_HDR_SIZE {
            return Err(DecodeError::InvalidTlvLength(
                TlvType::Prefix as u8,
                tlv_len,
            ));
        }
        let domain_id = buf.try_get_u8()?;

        // Parse prefix length.
        let plen = buf.try_get_u8()?;
        if plen > IPV6_MAX_PREFIXLEN {
            return Err(DecodeError::InvalidPrefixLength(plen));
        }

        // Parse prefix (variable length).
        let plen_wire = prefix_wire_len(plen);
        if buf.remaining() < plen_wire {
            return Err(DecodeError::InvalidTlvLength(
                TlvType::Prefix as u8,
                tlv_len,
            ));
        }
        let mut prefix_bytes = [0; 16];
        buf.try_copy_to_slice(&mut prefix_bytes[..plen_wire])?;
        let prefix = prefix_masked(Ipv6Addr::from(prefix_bytes), plen)?;

        // Parse Sub-TLVs.
        let mut sub_tlvs = vec![];
        while buf.has_remaining() {
            let (stlv_type, stlv_stable, buf_stlv) = tlv_decode_next(&mut buf)?;
            let stlv = match TlvType::from_u8(stlv_type) {
                Some(TlvType::HasRoute) => PrefixSubTlv::HasRoute(
                    HasRouteTlv::decode(stlv_stable, buf_stlv)?,
                ),
                Some(TlvType::BorderRouter) => PrefixSubTlv::BorderRouter(
                    BorderRouterTlv::decode(stlv_stable, buf_stlv)?,
                ),
                Some(TlvType::Context) => PrefixSubTlv::Context(
                    ContextTlv::decode(stlv_stable, buf_stlv)?,
                ),
                _ => PrefixSubTlv::Unknown(UnknownTlv::new(
                    stlv_type,
                    stlv_stable,
                    buf_stlv,
                )),
            };
            sub_tlvs.push(stlv);
        }

        Ok(PrefixTlv {
            stable,
            domain_id,
            prefix,
            sub_tlvs,
        })
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let start_pos = tlv_encode_start(buf, TlvType::Prefix as u8, self.stable);
        buf.put_u8(self.domain_id);
        let plen = self.prefix.prefix();
        buf.put_u8(plen);
        let plen_wire = prefix_wire_len(plen);
        buf.put(&self.prefix.ip().octets()[0..plen_wire]);
        for stlv in &self.sub_tlvs {
            stlv.encode(buf);
        }
        tlv_encode_end(buf, start_pos);
    }

    pub(crate) fn len(&self) -> usize {
        TLV_HDR_SIZE
            + Self::hdr_len(self.prefix.prefix())
            + self.sub_tlvs.iter().map(|stlv| stlv.len()).sum::<usize>()
    }

    // Length of the fixed fields that precede the Sub-TLVs.
    pub(crate) const fn hdr_len(plen: u8) -> usize {
        PREFIX_HDR_SIZE + prefix_wire_len(plen)
    }

    pub fn has_route(&self, stable: bool) -> Option<&HasRouteTlv> {
        self.sub_tlvs
            .iter()
            .filter_map(|stlv| stlv.as_has_route())
            .find(|stlv| stlv.stable == stable)
    }

    pub(crate) fn has_route_mut(
        &mut self,
        stable: bool,
    ) -> Option<&mut HasRouteTlv> {
        self.sub_tlvs
            .iter_mut()
            .filter_map(|stlv| stlv.as_has_route_mut())
            .find(|stlv| stlv.stable == stable)
    }

    pub fn border_router(&self, stable: bool) -> Option<&BorderRouterTlv> {
        self.sub_tlvs
            .iter()
            .filter_map(|stlv| stlv.as_border_router())
            .find(|stlv| stlv.stable == stable)
    }

    pub(crate) fn border_router_mut(
        &mut self,
        stable: bool,
    ) -> Option<&mut BorderRouterTlv> {
        self.sub_tlvs
            .iter_mut()
            .filter_map(|stlv| stlv.as_border_router_mut())
            .find(|stlv| stlv.stable == stable)
    }

    pub fn has_routes(&self) -> impl Iterator<Item = &HasRouteTlv> {
        self.sub_tlvs.iter().filter_map(|stlv| stlv.as_has_route())
    }

    pub fn border_routers(&self) -> impl Iterator<Item = &BorderRouterTlv> {
        self.sub_tlvs.iter().filter_map(|stlv| stlv.as_border_router())
    }

    pub fn has_border_router(&self) -> bool {
        self.border_routers().next().is_some()
    }

    pub fn context(&self) -> Option<&ContextTlv> {
        self.sub_tlvs.iter().find_map(|stlv| stlv.as_context())
    }

    pub(crate) fn context_mut(&mut self) -> Option<&mut ContextTlv> {
        self.sub_tlvs.iter_mut().find_map(|stlv| stlv.as_context_mut())
    }

    // Recomputes the TLV stable flag from its Sub-TLVs.
    pub(crate) fn update_stable(&mut self) {
        self.stable = self.sub_tlvs.iter().any(|stlv| stlv.stable());
    }
}

// ===== impl PrefixSubTlv =====

impl PrefixSubTlv {
    pub fn stable(&self) -> bool {
        match self {
            PrefixSubTlv::HasRoute(stlv) => stlv.stable,
            PrefixSubTlv::BorderRouter(stlv) => stlv.stable,
            PrefixSubTlv::Context(stlv) => stlv.stable,
            PrefixSubTlv::Unknown(stlv) => stlv.stable,
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            PrefixSubTlv::HasRoute(stlv) => stlv.encode(buf),
            PrefixSubTlv::BorderRouter(stlv) => stlv.encode(buf),
            PrefixSubTlv::Context(stlv) => stlv.encode(buf),
            PrefixSubTlv::Unknown(stlv) => stlv.encode(buf),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            PrefixSubTlv::HasRoute(stlv) => stlv.len(),
            PrefixSubTlv::BorderRouter(stlv) => stlv.len(),
            PrefixSubTlv::Context(stlv) => stlv.len(),
            PrefixSubTlv::Unknown(stlv) => stlv.len(),
        }
    }
}

// ===== impl HasRouteTlv =====

impl HasRouteTlv {
    pub(crate) fn decode(stable: bool, mut buf: Bytes) -> DecodeResult<Self> {
        let tlv_len = buf.len();
        if tlv_len % HAS_ROUTE_ENTRY_SIZE != 0 {
            return Err(DecodeError::InvalidTlvLength(
                TlvType::HasRoute as u8,
                tlv_len as u8,
            ));
        }

        let mut entries = vec![];
        while buf.has_remaining() {
            let rloc16 = buf.try_get_u16()?;
            let flags = HasRouteFlags::from_bits_retain(buf.try_get_u8()?);
            entries.push(HasRouteEntry { rloc16, flags });
        }

        Ok(HasRouteTlv { stable, entries })
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let start_pos =
            tlv_encode_start(buf, TlvType::HasRoute as u8, self.stable);
        for entry in &self.entries {
            buf.put_u16(entry.rloc16);
            buf.put_u8(entry.flags.bits());
        }
        tlv_encode_end(buf, start_pos);
    }

    pub(crate) fn len(&self) -> usize {
        TLV_HDR_SIZE + self.entries.len() * HAS_ROUTE_ENTRY_SIZE
    }
}

// ===== impl HasRouteEntry =====

impl HasRouteEntry {
    const PREFERENCE_SHIFT: u8 = 6;

    pub fn new(
        rloc16: u16,
        preference: RoutePreference,
        flags: HasRouteFlags,
    ) -> Self {
        let bits = (flags.bits() & !HasRouteFlags::PREFERENCE.bits())
            | (preference.to_bits() << Self::PREFERENCE_SHIFT);
        HasRouteEntry {
            rloc16,
            flags: HasRouteFlags::from_bits_retain(bits),
        }
    }

    pub fn preference(&self) -> RoutePreference {
        RoutePreference::from_bits(self.flags.bits() >> Self::PREFERENCE_SHIFT)
    }
}

// ===== impl BorderRouterTlv =====

impl BorderRouterTlv {
    pub(crate) fn decode(stable: bool, mut buf: Bytes) -> DecodeResult<Self> {
        let tlv_len = buf.len();
        if tlv_len % BORDER_ROUTER_ENTRY_SIZE != 0 {
            return Err(DecodeError::InvalidTlvLength(
                TlvType::BorderRouter as u8,
                tlv_len as u8,
            ));
        }

        let mut entries = vec![];
        while buf.has_remaining() {
            let rloc16 = buf.try_get_u16()?;
            let flags =
                BorderRouterFlags::from_bits_retain(buf.try_get_u16()?);
            entries.push(BorderRouterEntry { rloc16, flags });
        }

        Ok(BorderRouterTlv { stable, entries })
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let start_pos =
            tlv_encode_start(buf, TlvType::BorderRouter as u8, self.stable);
        for entry in &self.entries {
            buf.put_u16(entry.rloc16);
            buf.put_u16(entry.flags.bits());
        }
        tlv_encode_end(buf, start_pos);
    }

    pub(crate) fn len(&self) -> usize {
        TLV_HDR_SIZE + self.entries.len() * BORDER_ROUTER_ENTRY_SIZE
    }
}

// ===== impl BorderRouterEntry =====

impl BorderRouterEntry {
    const PREFERENCE_SHIFT: u8 = 14;

    pub fn new(
        rloc16: u16,
        preference: RoutePreference,
        flags: BorderRouterFlags,
    ) -> Self {
        let bits = (flags.bits() & !BorderRouterFlags::PREFERENCE.bits())
            | ((preference.to_bits() as u16) << Self::PREFERENCE_SHIFT);
        BorderRouterEntry {
            rloc16,
            flags: BorderRouterFlags::from_bits_retain(bits),
        }
    }

    pub fn preference(&self) -> RoutePreference {
        RoutePreference::from_bits(
            (self.flags.bits() >> Self::PREFERENCE_SHIFT) as u8,
        )
    }

    pub fn is_default_route(&self) -> bool {
        self.flags.contains(BorderRouterFlags::DEFAULT_ROUTE)
    }

    pub fn is_on_mesh(&self) -> bool {
        self.flags.contains(BorderRouterFlags::ON_MESH)
    }

    // Whether this entry advertises a DHCPv6 agent.
    pub fn is_dhcp_agent(&self) -> bool {
        self.flags
            .intersects(BorderRouterFlags::DHCP | BorderRouterFlags::CONFIGURE)
    }

    // Whether this entry advertises an ND proxy agent.
    pub fn is_nd_agent(&self) -> bool {
        self.flags.contains(BorderRouterFlags::ND_DNS)
    }
}

// ===== impl RoutePreference =====

impl RoutePreference {
    // Decodes a two-bit preference field. The reserved value is treated as
    // medium preference.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0x01 => RoutePreference::High,
            0x03 => RoutePreference::Low,
            _ => RoutePreference::Medium,
        }
    }

    pub const fn to_bits(self) -> u8 {
        match self {
            RoutePreference::High => 0x01,
            RoutePreference::Medium => 0x00,
            RoutePreference::Low => 0x03,
        }
    }
}

// ===== impl ContextTlv =====

impl ContextTlv {
    pub(crate) fn decode(stable: bool, mut buf: Bytes) -> DecodeResult<Self> {
        let tlv_len = buf.len();
        if tlv_len < CONTEXT_VALUE_SIZE {
            return Err(DecodeError::InvalidTlvLength(
                TlvType::Context as u8,
                tlv_len as u8,
            ));
        }

        let flags = buf.try_get_u8()?;
        let context_length = buf.try_get_u8()?;

        Ok(ContextTlv {
            stable,
            compress: flags & CONTEXT_COMPRESS_BIT != 0,
            context_id: flags & CONTEXT_ID_MASK,
            context_length,
        })
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let start_pos =
            tlv_encode_start(buf, TlvType::Context as u8, self.stable);
        let mut flags = self.context_id & CONTEXT_ID_MASK;
        if self.compress {
            flags |= CONTEXT_COMPRESS_BIT;
        }
        buf.put_u8(flags);
        buf.put_u8(self.context_length);
        tlv_encode_end(buf, start_pos);
    }

    pub(crate) fn len(&self) -> usize {
        TLV_HDR_SIZE + CONTEXT_VALUE_SIZE
    }
}

// ===== impl ServiceTlv =====

impl ServiceTlv {
    pub fn new(
        service_id: u8,
        enterprise_number: u32,
        service_data: Bytes,
    ) -> Self {
        ServiceTlv {
            stable: false,
            service_id,
            enterprise_number,
            service_data,
            sub_tlvs: vec![],
        }
    }

    pub(crate) fn decode(stable: bool, mut buf: Bytes) -> DecodeResult<Self> {
        let tlv_len = buf.len() as u8;
        let invalid_len =
            || DecodeError::InvalidTlvLength(TlvType::Service as u8, tlv_len);

        if !buf.has_remaining() {
            return Err(invalid_len());
        }
        let flags = buf.try_get_u8()?;
        let service_id = flags & SERVICE_ID_MASK;
        let enterprise_number = if flags & SERVICE_THREAD_ENTERPRISE_BIT != 0 {
            THREAD_ENTERPRISE_NUMBER
        } else {
            if buf.remaining() < 4 {
                return Err(invalid_len());
            }
            buf.try_get_u32()?
        };

        // Parse service data.
        if !buf.has_remaining() {
            return Err(invalid_len());
        }
        let service_data_len = buf.try_get_u8()?;
        if service_data_len as usize > buf.remaining() {
            return Err(DecodeError::InvalidServiceDataLength(
                service_data_len,
            ));
        }
        let service_data = buf.copy_to_bytes(service_data_len as usize);

        // Parse Sub-TLVs.
        let mut sub_tlvs = vec![];
        while buf.has_remaining() {
            let (stlv_type, stlv_stable, buf_stlv) = tlv_decode_next(&mut buf)?;
            let stlv = match TlvType::from_u8(stlv_type) {
                Some(TlvType::Server) => ServiceSubTlv::Server(
                    ServerTlv::decode(stlv_stable, buf_stlv)?,
                ),
                _ => ServiceSubTlv::Unknown(UnknownTlv::new(
                    stlv_type,
                    stlv_stable,
                    buf_stlv,
                )),
            };
            sub_tlvs.push(stlv);
        }

        Ok(ServiceTlv {
            stable,
            service_id,
            enterprise_number,
            service_data,
            sub_tlvs,
        })
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let start_pos =
            tlv_encode_start(buf, TlvType::Service as u8, self.stable);
        let mut flags = self.service_id & SERVICE_ID_MASK;
        if self.enterprise_number == THREAD_ENTERPRISE_NUMBER {
            flags |= SERVICE_THREAD_ENTERPRISE_BIT;
            buf.put_u8(flags);
        } else {
            buf.put_u8(flags);
            buf.put_u32(self.enterprise_number);
        }
        buf.put_u8(self.service_data.len() as u8);
        buf.put_slice(&self.service_data);
        for stlv in &self.sub_tlvs {
            stlv.encode(buf);
        }
        tlv_encode_end(buf, start_pos);
    }

    pub(crate) fn len(&self) -> usize {
        TLV_HDR_SIZE
            + Self::hdr_len(self.enterprise_number, self.service_data.len())
            + self.sub_tlvs.iter().map(|stlv| stlv.len()).sum::<usize>()
    }

    // Length of the fixed fields that precede the Sub-TLVs.
    pub(crate) const fn hdr_len(
        enterprise_number: u32,
        service_data_len: usize,
    ) -> usize {
        let mut len = 1 + 1 + service_data_len;
        if enterprise_number != THREAD_ENTERPRISE_NUMBER {
            len += 4;
        }
        len
    }

    // Whether this TLV describes the given service.
    pub fn matches(&self, enterprise_number: u32, service_data: &[u8]) -> bool {
        self.enterprise_number == enterprise_number
            && self.service_data.as_ref() == service_data
    }

    pub fn servers(&self) -> impl Iterator<Item = &ServerTlv> {
        self.sub_tlvs.iter().filter_map(|stlv| stlv.as_server())
    }

    pub(crate) fn update_stable(&mut self) {
        self.stable = self.sub_tlvs.iter().any(|stlv| stlv.stable());
    }
}

// ===== impl ServiceSubTlv =====

impl ServiceSubTlv {
    pub fn stable(&self) -> bool {
        match self {
            ServiceSubTlv::Server(stlv) => stlv.stable,
            ServiceSubTlv::Unknown(stlv) => stlv.stable,
        }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            ServiceSubTlv::Server(stlv) => stlv.encode(buf),
            ServiceSubTlv::Unknown(stlv) => stlv.encode(buf),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            ServiceSubTlv::Server(stlv) => stlv.len(),
            ServiceSubTlv::Unknown(stlv) => stlv.len(),
        }
    }
}

// ===== impl ServerTlv =====

impl ServerTlv {
    pub(crate) fn decode(stable: bool, mut buf: Bytes) -> DecodeResult<Self> {
        let tlv_len = buf.len();
        if tlv_len < SERVER_HDR_SIZE {
            return Err(DecodeError::InvalidTlvLength(
                TlvType::Server as u8,
                tlv_len as u8,
            ));
        }

        let rloc16 = buf.try_get_u16()?;
        let server_data = buf;

        Ok(ServerTlv {
            stable,
            rloc16,
            server_data,
        })
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let start_pos =
            tlv_encode_start(buf, TlvType::Server as u8, self.stable);
        buf.put_u16(self.rloc16);
        buf.put_slice(&self.server_data);
        tlv_encode_end(buf, start_pos);
    }

    pub(crate) fn len(&self) -> usize {
        TLV_HDR_SIZE + SERVER_HDR_SIZE + self.server_data.len()
    }
}

// ===== impl CommissioningDataTlv =====

impl CommissioningDataTlv {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let start_pos = tlv_encode_start(
            buf,
            TlvType::CommissioningData as u8,
            self.stable,
        );
        buf.put_slice(&self.value);
        tlv_encode_end(buf, start_pos);
    }

    pub(crate) fn len(&self) -> usize {
        TLV_HDR_SIZE + self.value.len()
    }
}

// ===== impl UnknownTlv =====

impl UnknownTlv {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let start_pos = tlv_encode_start(buf, self.tlv_type, self.stable);
        buf.put_slice(&self.value);
        tlv_encode_end(buf, start_pos);
    }

    pub(crate) fn len(&self) -> usize {
        TLV_HDR_SIZE + self.value.len()
    }
}

// ===== helper functions =====

const fn prefix_wire_len(len: u8) -> usize {
    (len as usize).div_ceil(8)
}

fn prefix_masked(addr: Ipv6Addr, plen: u8) -> DecodeResult<Ipv6Network> {
    Ipv6Network::new(addr, plen)
        .and_then(|prefix| Ipv6Network::new(prefix.network(), plen))
        .map_err(|_| DecodeError::InvalidPrefixLength(plen))
}

// ===== global functions =====

// Decodes the next TLV from the buffer, returning its type, stable flag and
// value. The declared length must fit within the remaining buffer.
pub(crate) fn tlv_decode_next(
    buf: &mut Bytes,
) -> DecodeResult<(u8, bool, Bytes)> {
    if buf.remaining() < TLV_HDR_SIZE {
        return Err(DecodeError::IncompleteTlv);
    }
    let tlv_type_stable = buf.try_get_u8()?;
    let tlv_type = tlv_type_stable >> 1;
    let stable = tlv_type_stable & TLV_STABLE_BIT != 0;
    let tlv_len = buf.try_get_u8()?;
    if tlv_len as usize > buf.remaining() {
        return Err(DecodeError::InvalidTlvLength(tlv_type, tlv_len));
    }
    let value = buf.copy_to_bytes(tlv_len as usize);
    Ok((tlv_type, stable, value))
}

pub(crate) fn tlv_encode_start(
    buf: &mut BytesMut,
    tlv_type: u8,
    stable: bool,
) -> usize {
    let start_pos = buf.len();
    buf.put_u8((tlv_type << 1) | stable as u8);
    // The TLV length will be rewritten later.
    buf.put_u8(0);
    start_pos
}

pub(crate) fn tlv_encode_end(buf: &mut BytesMut, start_pos: usize) {
    // Rewrite TLV length.
    buf[start_pos + 1] = (buf.len() - start_pos - TLV_HDR_SIZE) as u8;
}
