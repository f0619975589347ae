// Path: crates/osd-target/src/sense.rs

//! Descriptor-format sense data.
//!
//! Layout: an 8-byte header (`0x72`, key, ASC, ASCQ, 3 reserved, additional
//! length), an object identification descriptor naming the pid/oid and the
//! function bitmasks, and for short reads a command-specific information
//! descriptor holding the count of bytes actually read.

use crate::bytes::{get_u32, get_u64};
use osd_types::consts::MAX_SENSE_LEN;
use osd_types::{OsdError, StorageError};

pub const SENSE_RESPONSE_CODE: u8 = 0x72;
pub const SENSE_HDR_LEN: usize = 8;

const OID_DESC_TYPE: u8 = 0x06;
const OID_DESC_LEN: usize = 32;
const CSI_DESC_TYPE: u8 = 0x01;
const CSI_DESC_LEN: usize = 12;

/// Function state bits of the object identification descriptor.
pub mod sfb {
    pub const VALIDATE: u32 = 0x8000_0000;
    pub const CMD_CAP_V: u32 = 0x2000_0000;
    pub const COMMAND: u32 = 0x1000_0000;
    pub const IMP_ST_ATT: u32 = 0x0100_0000;
    pub const SA_CAP_V: u32 = 0x0020_0000;
    pub const SET_ATT: u32 = 0x0010_0000;
    pub const GA_CAP_V: u32 = 0x0002_0000;
    pub const GET_ATT: u32 = 0x0001_0000;
    /// Reported as not initiated on every failure.
    pub const NOT_INITIATED: u32 = 0x3030_10b0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SenseKey {
    NoSense = 0x0,
    RecoveredError = 0x1,
    NotReady = 0x2,
    MediumError = 0x3,
    HardwareError = 0x4,
    IllegalRequest = 0x5,
    UnitAttention = 0x6,
    DataProtection = 0x7,
}

impl SenseKey {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x0 => Self::NoSense,
            0x1 => Self::RecoveredError,
            0x2 => Self::NotReady,
            0x3 => Self::MediumError,
            0x4 => Self::HardwareError,
            0x5 => Self::IllegalRequest,
            0x6 => Self::UnitAttention,
            0x7 => Self::DataProtection,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoSense => "no_sense",
            Self::RecoveredError => "recovered_error",
            Self::NotReady => "not_ready",
            Self::MediumError => "medium_error",
            Self::HardwareError => "hardware_error",
            Self::IllegalRequest => "illegal_request",
            Self::UnitAttention => "unit_attention",
            Self::DataProtection => "data_protection",
        }
    }
}

/// Additional sense code and qualifier, `ASC << 8 | ASCQ`.
pub mod asc {
    pub const PARAMETER_LIST_LENGTH_ERROR: u16 = 0x1A00;
    pub const INVALID_COMMAND_OPERATION_CODE: u16 = 0x2000;
    pub const INVALID_FIELD_IN_CDB: u16 = 0x2400;
    pub const INVALID_FIELD_IN_PARAMETER_LIST: u16 = 0x2600;
    pub const PARTITION_OR_COLLECTION_CONTAINS_USER_OBJECTS: u16 = 0x2C0A;
    pub const READ_PAST_END_OF_USER_OBJECT: u16 = 0x3B17;
    pub const SYSTEM_RESOURCE_FAILURE: u16 = 0x5500;
}

fn header(key: SenseKey, code: u16, additional: usize) -> Vec<u8> {
    let [asc, ascq] = code.to_be_bytes();
    vec![
        SENSE_RESPONSE_CODE,
        key as u8,
        asc,
        ascq,
        0,
        0,
        0,
        additional as u8,
    ]
}

/// A sense block with no descriptors, used for an unrecognised opcode.
pub fn header_only(key: SenseKey, code: u16) -> Vec<u8> {
    header(key, code, 0)
}

fn oid_descriptor(out: &mut Vec<u8>, pid: u64, oid: u64) {
    out.extend_from_slice(&[OID_DESC_TYPE, (OID_DESC_LEN - 2) as u8, 0, 0, 0, 0, 0, 0]);
    out.extend_from_slice(&sfb::NOT_INITIATED.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&pid.to_be_bytes());
    out.extend_from_slice(&oid.to_be_bytes());
}

/// Header plus object identification descriptor.
pub fn basic(key: SenseKey, code: u16, pid: u64, oid: u64) -> Vec<u8> {
    let mut out = header(key, code, OID_DESC_LEN);
    oid_descriptor(&mut out, pid, oid);
    out
}

/// Header, object identification and command-specific information.
pub fn with_csi(key: SenseKey, code: u16, pid: u64, oid: u64, csi: u64) -> Vec<u8> {
    let mut out = header(key, code, OID_DESC_LEN + CSI_DESC_LEN);
    oid_descriptor(&mut out, pid, oid);
    out.extend_from_slice(&[CSI_DESC_TYPE, (CSI_DESC_LEN - 2) as u8, 0, 0]);
    out.extend_from_slice(&csi.to_be_bytes());
    debug_assert!(out.len() <= MAX_SENSE_LEN);
    out
}

pub fn classify(err: &OsdError) -> (SenseKey, u16) {
    use SenseKey::*;
    match err {
        OsdError::InvalidArgument(_) | OsdError::NotFound(_) | OsdError::Overflow => {
            (IllegalRequest, asc::INVALID_FIELD_IN_CDB)
        }
        OsdError::Storage(StorageError::NotFound) => (IllegalRequest, asc::INVALID_FIELD_IN_CDB),
        OsdError::InvalidParameterList(_) => (IllegalRequest, asc::INVALID_FIELD_IN_PARAMETER_LIST),
        OsdError::ParameterListLength(_) => (IllegalRequest, asc::PARAMETER_LIST_LENGTH_ERROR),
        OsdError::NotEmpty { .. } => (
            IllegalRequest,
            asc::PARTITION_OR_COLLECTION_CONTAINS_USER_OBJECTS,
        ),
        OsdError::Unimplemented(_) => (IllegalRequest, asc::INVALID_COMMAND_OPERATION_CODE),
        OsdError::OutOfMemory(_) | OsdError::Io(_) | OsdError::Storage(_) => {
            (HardwareError, asc::SYSTEM_RESOURCE_FAILURE)
        }
    }
}

/// A parsed view of a sense block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseInfo {
    pub key: u8,
    pub code: u16,
    pub pid: Option<u64>,
    pub oid: Option<u64>,
    pub csi: Option<u64>,
}

impl SenseInfo {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.first() != Some(&SENSE_RESPONSE_CODE) {
            return None;
        }
        let key = *buf.get(1)?;
        let code = u16::from_be_bytes([*buf.get(2)?, *buf.get(3)?]);
        let additional = usize::from(*buf.get(7)?);
        let end = (SENSE_HDR_LEN + additional).min(buf.len());
        let mut info = Self {
            key,
            code,
            pid: None,
            oid: None,
            csi: None,
        };
        let mut at = SENSE_HDR_LEN;
        while at + 2 <= end {
            let ty = *buf.get(at)?;
            let len = usize::from(*buf.get(at + 1)?) + 2;
            match ty {
                OID_DESC_TYPE => {
                    info.pid = get_u64(buf, at + 16);
                    info.oid = get_u64(buf, at + 24);
                }
                CSI_DESC_TYPE => info.csi = get_u64(buf, at + 4),
                _ => {}
            }
            at += len;
        }
        Some(info)
    }

    /// The not-initiated function mask of the object descriptor, if any.
    pub fn not_initiated(buf: &[u8]) -> Option<u32> {
        get_u32(buf, SENSE_HDR_LEN + 8)
    }
}
