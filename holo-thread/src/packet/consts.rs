//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

// Maximum size of the Network Data, in bytes.
pub const NETDATA_MAX_SIZE: usize = 254;

// Maximum IPv6 prefix length.
pub const IPV6_MAX_PREFIXLEN: u8 = 128;

// Enterprise number assigned to Thread services.
pub const THREAD_ENTERPRISE_NUMBER: u32 = 44970;

// Size of the TLV header (type and length).
pub const TLV_HDR_SIZE: usize = 2;
// Bit carrying the stable flag in the TLV type byte.
pub const TLV_STABLE_BIT: u8 = 0x01;

// Fixed sizes of the Prefix sub-TLV entries.
pub const HAS_ROUTE_ENTRY_SIZE: usize = 3;
pub const BORDER_ROUTER_ENTRY_SIZE: usize = 4;
pub const CONTEXT_VALUE_SIZE: usize = 2;
pub const PREFIX_HDR_SIZE: usize = 2;
pub const SERVER_HDR_SIZE: usize = 2;

// Context TLV value flags.
pub const CONTEXT_COMPRESS_BIT: u8 = 0x10;
pub const CONTEXT_ID_MASK: u8 = 0x0f;

// Service TLV value flags.
pub const SERVICE_THREAD_ENTERPRISE_BIT: u8 = 0x80;
pub const SERVICE_ID_MASK: u8 = 0x0f;

// Range of Service IDs assigned by the Leader.
pub const SERVICE_ID_MIN: u8 = 0;
pub const SERVICE_ID_MAX: u8 = 15;

// Range of 6LoWPAN Context IDs assigned by the Leader. Context ID 0 is
// implicitly bound to the mesh-local prefix.
pub const CONTEXT_ID_MESH_LOCAL: u8 = 0;
pub const CONTEXT_ID_MIN: u8 = 1;
pub const CONTEXT_ID_MAX: u8 = 15;

// RLOC16 used in the stable subset of the Network Data.
pub const RLOC16_INVALID: u16 = 0xfffe;

// Anycast locator (ALOC16) ranges.
pub const ALOC16_LEADER: u16 = 0xfc00;
pub const ALOC16_DHCP_AGENT_START: u16 = 0xfc01;
pub const ALOC16_DHCP_AGENT_END: u16 = 0xfc0f;
pub const ALOC16_SERVICE_START: u16 = 0xfc10;
pub const ALOC16_SERVICE_END: u16 = 0xfc2f;
pub const ALOC16_COMMISSIONER_START: u16 = 0xfc30;
pub const ALOC16_COMMISSIONER_END: u16 = 0xfc37;
pub const ALOC16_BACKBONE_ROUTER_PRIMARY: u16 = 0xfc38;
pub const ALOC16_ND_AGENT_START: u16 = 0xfc40;
pub const ALOC16_ND_AGENT_END: u16 = 0xfc4e;

// Network Data TLV types.
//
// IANA registry:
// https://www.iana.org/assignments/thread/thread.xhtml
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum TlvType {
    HasRoute = 0,
    Prefix = 1,
    BorderRouter = 2,
    Context = 3,
    CommissioningData = 4,
    Service = 5,
    Server = 6,
}

// MeshCoP TLV types carried inside the Commissioning Data TLV.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum MeshcopTlvType {
    SteeringData = 8,
    BorderAgentLocator = 9,
    CommissionerSessionId = 11,
    JoinerUdpPort = 18,
}

// Extended MeshCoP TLV length marker.
pub const MESHCOP_EXTENDED_LEN: u8 = 0xff;
