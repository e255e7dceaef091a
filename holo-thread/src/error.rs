//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ipnetwork::Ipv6Network;
use serde::{Deserialize, Serialize};
use tracing::{warn, warn_span};

use crate::packet::DecodeError;

// Network Data Leader errors.
#[derive(Debug)]
pub enum Error {
    // Network Data registration
    InvalidNetData(u16, DecodeError),
    InvalidRegistration(u16, ValidationError),
    RouterIdNotAllocated(u16),
    // Capacity
    NetDataFull,
    ContextIdsExhausted,
    ServiceIdsExhausted,
    CommissioningDataTooLarge(usize),
    // Lookups
    NoRoute,
    Drop,
}

// Error categories reported to the callers of the Leader.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum ErrorKind {
    Parse,
    NoBufs,
    NoRoute,
    NotFound,
    Drop,
    InvalidState,
}

// Reasons for rejecting a well-formed Network Data registration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidationError {
    DuplicatePrefix(Ipv6Network),
    DuplicateService(u32),
    DuplicateSubTlv(u8, bool),
    InvalidEntryCount(u8, usize),
    RlocMismatch(u16),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::InvalidNetData(rloc16, error) => {
                warn_span!("netdata").in_scope(|| {
                    let rloc16 = format!("{rloc16:#06x}");
                    warn!(%rloc16, error = %with_source(error), "{}", self);
                });
            }
            Error::InvalidRegistration(rloc16, error) => {
                warn_span!("netdata").in_scope(|| {
                    let rloc16 = format!("{rloc16:#06x}");
                    warn!(%rloc16, %error, "{}", self);
                });
            }
            Error::RouterIdNotAllocated(rloc16) => {
                warn_span!("netdata").in_scope(|| {
                    let rloc16 = format!("{rloc16:#06x}");
                    warn!(%rloc16, "{}", self);
                });
            }
            Error::NetDataFull
            | Error::ContextIdsExhausted
            | Error::ServiceIdsExhausted => {
                warn_span!("netdata").in_scope(|| {
                    warn!("{}", self);
                });
            }
            Error::CommissioningDataTooLarge(length) => {
                warn_span!("commissioning").in_scope(|| {
                    warn!(%length, "{}", self);
                });
            }
            Error::NoRoute | Error::Drop => {
                warn!("{}", self);
            }
        }
    }

    // Returns the category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidNetData(..) | Error::InvalidRegistration(..) => {
                ErrorKind::Parse
            }
            Error::RouterIdNotAllocated(..) | Error::NoRoute => {
                ErrorKind::NoRoute
            }
            Error::NetDataFull
            | Error::ContextIdsExhausted
            | Error::ServiceIdsExhausted
            | Error::CommissioningDataTooLarge(..) => ErrorKind::NoBufs,
            Error::Drop => ErrorKind::Drop,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidNetData(..) => {
                write!(f, "failed to decode network data registration")
            }
            Error::InvalidRegistration(..) => {
                write!(f, "invalid network data registration")
            }
            Error::RouterIdNotAllocated(..) => {
                write!(f, "registration from unallocated router id")
            }
            Error::NetDataFull => {
                write!(f, "network data is full")
            }
            Error::ContextIdsExhausted => {
                write!(f, "no context id available")
            }
            Error::ServiceIdsExhausted => {
                write!(f, "no service id available")
            }
            Error::CommissioningDataTooLarge(..) => {
                write!(f, "commissioning data doesn't fit")
            }
            Error::NoRoute => {
                write!(f, "no route")
            }
            Error::Drop => {
                write!(f, "unsupported anycast locator")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidNetData(_, error) => Some(error),
            Error::InvalidRegistration(_, error) => Some(error),
            _ => None,
        }
    }
}

// ===== impl ValidationError =====

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::DuplicatePrefix(prefix) => {
                write!(f, "duplicate prefix: {prefix}")
            }
            ValidationError::DuplicateService(enterprise_number) => {
                write!(f, "duplicate service: enterprise {enterprise_number}")
            }
            ValidationError::DuplicateSubTlv(tlv_type, stable) => {
                write!(f, "duplicate sub-TLV: type {tlv_type} stable {stable}")
            }
            ValidationError::InvalidEntryCount(tlv_type, count) => {
                write!(f, "invalid entry count: type {tlv_type} count {count}")
            }
            ValidationError::RlocMismatch(rloc16) => {
                write!(f, "entry with foreign RLOC16: {rloc16:#06x}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
