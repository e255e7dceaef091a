//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::TryGetError;
use serde::{Deserialize, Serialize};

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;

// Network Data decode errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum DecodeError {
    IncompleteTlv,
    InvalidTlvLength(u8, u8),
    InvalidPrefixLength(u8),
    InvalidServiceDataLength(u8),
    IncompleteMeshcopTlv,
    InvalidMeshcopTlvLength(u8, u16),
    ReadOutOfBounds,
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::IncompleteTlv => {
                write!(f, "incomplete TLV header")
            }
            DecodeError::InvalidTlvLength(tlv_type, tlv_len) => {
                write!(f, "invalid TLV length: type {tlv_type} length {tlv_len}")
            }
            DecodeError::InvalidPrefixLength(plen) => {
                write!(f, "invalid prefix length: {plen}")
            }
            DecodeError::InvalidServiceDataLength(len) => {
                write!(f, "invalid service data length: {len}")
            }
            DecodeError::IncompleteMeshcopTlv => {
                write!(f, "incomplete MeshCoP TLV header")
            }
            DecodeError::InvalidMeshcopTlvLength(tlv_type, tlv_len) => {
                write!(
                    f,
                    "invalid MeshCoP TLV length: type {tlv_type} length {tlv_len}"
                )
            }
            DecodeError::ReadOutOfBounds => {
                write!(f, "attempt to read out of bounds")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<TryGetError> for DecodeError {
    fn from(_error: TryGetError) -> DecodeError {
        DecodeError::ReadOutOfBounds
    }
}
