// Path: crates/osd-types/src/consts.rs

//! Constants that fix the on-the-wire layouts of the object command set.

// --- Command descriptor block ---

/// Total size of a command descriptor block.
pub const OSD_CDB_SIZE: usize = 200;
/// Operation code of the variable-length CDB.
pub const VARLEN_CDB: u8 = 0x7f;
/// Additional CDB length carried in byte 7.
pub const OSD_ADDITIONAL_CDB_LEN: u8 = (OSD_CDB_SIZE - 8) as u8;

// --- Object identifiers ---

pub const ROOT_PID: u64 = 0;
pub const ROOT_OID: u64 = 0;
pub const PARTITION_OID: u64 = 0;
/// Lowest partition id a client may create or have allocated.
pub const PARTITION_PID_LB: u64 = 0x10000;
/// Lowest user-object id inside a partition.
pub const USEROBJECT_OID_LB: u64 = 0x10000;
/// Lowest collection id inside a partition.
pub const COLLECTION_OID_LB: u64 = 0x10000;

// --- Attribute page ranges ---

pub const USEROBJECT_PG: u32 = 0x0;
pub const PARTITION_PG: u32 = 0x3000_0000;
pub const COLLECTION_PG: u32 = 0x6000_0000;
pub const ROOT_PG: u32 = 0x9000_0000;
pub const RESERVED_PG: u32 = 0xC000_0000;
pub const ANY_PG: u32 = 0xF000_0000;
/// Width of each of the user/partition/collection/root page classes.
pub const PAGE_CLASS_WIDTH: u32 = 0x3000_0000;

/// Relative page numbers inside a class.
pub const STD_PG_LB: u32 = 0x0;
pub const STD_PG_UB: u32 = 0x7F;
pub const RSRV_PG_LB: u32 = 0x80;
pub const RSRV_PG_UB: u32 = 0x7FFF;
pub const VEND_PG_LB: u32 = 0x8000;
pub const VEND_PG_UB: u32 = 0xEFFF;
pub const OTHR_STD_PG_LB: u32 = 0xF000;
pub const OTHR_STD_PG_UB: u32 = 0xFFFF;
pub const LUN_PG_LB: u32 = 0x1_0000;
pub const LUN_PG_UB: u32 = 0x1FFF_FFFF;

/// Well-known pages of a user object.
pub const USER_DIR_PG: u32 = USEROBJECT_PG;
pub const USER_INFO_PG: u32 = USEROBJECT_PG + 0x1;
pub const USER_QUOTA_PG: u32 = USEROBJECT_PG + 0x2;
pub const USER_TMSTMP_PG: u32 = USEROBJECT_PG + 0x3;
pub const USER_COLL_PG: u32 = USEROBJECT_PG + 0x4;

pub const PARTITION_DIR_PG: u32 = PARTITION_PG;
pub const PARTITION_INFO_PG: u32 = PARTITION_PG + 0x1;
pub const COLLECTION_DIR_PG: u32 = COLLECTION_PG;
pub const COLLECTION_INFO_PG: u32 = COLLECTION_PG + 0x1;
/// Progress of the last collection command (computed).
pub const COLL_TRACKING_PG: u32 = COLLECTION_PG + 0x4;
pub const ROOT_DIR_PG: u32 = ROOT_PG;
pub const ROOT_INFO_PG: u32 = ROOT_PG + 0x1;

/// The current command attributes page (virtual).
pub const CUR_CMD_ATTR_PG: u32 = 0xFFFF_FFFE;
/// Wildcard page selector.
pub const GETALLATTR_PG: u32 = 0xFFFF_FFFF;
/// Wildcard attribute-number selector.
pub const ATTRNUM_GETALL: u32 = 0xFFFF_FFFF;
/// An attribute number that may never be set.
pub const ATTRNUM_UNMODIFIABLE: u32 = 0xFFFF_FFFF;

/// Attribute number 0 of every page holds its identification string.
pub const ATTRNUM_PAGE_ID: u32 = 0;
pub const ATTRNUM_INFO_PID: u32 = 1;
pub const ATTRNUM_INFO_OID: u32 = 2;

pub const ATTR_PAGE_ID_LEN: usize = 40;
pub const UNIDENTIFIED_PAGE_ID: &str = "        unidentified attributes page   ";

pub const ROOT_INFO_PAGE_ID: &str = "INCITS  T10 Root Information";
pub const PARTITION_DIR_PAGE_ID: &str = "INCITS  T10 Partition Directory";
pub const PARTITION_INFO_PAGE_ID: &str = "INCITS  T10 Partition Information";
pub const COLLECTION_INFO_PAGE_ID: &str = "INCITS  T10 Collection Information";
pub const USEROBJECT_INFO_PAGE_ID: &str = "INCITS  T10 User Object Information";
pub const COLL_TRACKING_PAGE_ID: &str = "INCITS  T10 Command Tracking";

// --- List entries ---

pub const LE_PAGE_OFF: usize = 0;
pub const LE_NUMBER_OFF: usize = 4;
pub const LE_LEN_OFF: usize = 8;
pub const LE_VAL_OFF: usize = 10;

pub const MLE_OID_OFF: usize = 0;
pub const MLE_PAGE_OFF: usize = 8;
pub const MLE_NUMBER_OFF: usize = 12;
pub const MLE_LEN_OFF: usize = 16;
pub const MLE_VAL_OFF: usize = 18;

/// Length sentinel for an undefined attribute value.
pub const NULL_ATTR_LEN: u16 = 0xFFFF;
/// Largest length a list entry can declare for a defined value.
pub const MAX_ATTR_VAL_LEN: usize = 0xFFFE;

// --- Attribute lists ---

pub const LIST_HDR_LEN: usize = 8;
/// Attribute numbers to retrieve: `(page, number)` pairs.
pub const RTRV_ATTR_LIST: u8 = 0x1;
/// Retrieved or to-be-set values for a single object.
pub const RTRVD_SET_ATTR_LIST: u8 = 0x9;
/// Retrieved values for several created objects.
pub const RTRVD_CREATE_MULTIOBJ_LIST: u8 = 0xF;
/// Size of one `(page, number)` pair in a retrieval list.
pub const RTRV_ATTR_ENTRY_LEN: usize = 8;

// --- Get/set attribute formats (CDB byte 11, bits 4-5) ---

pub const GETFIELD_SETVALUE: u8 = 1;
pub const GETPAGE_SETVALUE: u8 = 2;
pub const GETLIST_SETLIST: u8 = 3;

/// Largest value a single-value set can carry inside the CDB.
pub const CDB_SET_VALUE_MAX: usize = 18;

// --- List and query results ---

/// Start of the object descriptor list inside LIST and QUERY results.
pub const ML_ODL_OFF: usize = 24;
/// Byte holding the LIST format tag.
pub const LIST_FMT_OFF: usize = 23;
/// Byte holding the QUERY format tag.
pub const QUERY_FMT_OFF: usize = 12;
pub const LIST_FMT_IDS: u8 = 0x21 << 2;
pub const LIST_FMT_IDS_ATTRS: u8 = 0x22 << 2;
/// Per-object descriptor ahead of an attribute sub-list.
pub const LIST_ATTR_DESC_LEN: usize = 16;
pub const LIST_ATTR_DESC_LEN_OFF: usize = 12;

/// Query list header length.
pub const QUERY_LIST_HDR_LEN: usize = 4;
/// Fixed part of a query criterion (reserved, length, page, number, min len).
pub const QUERY_CRIT_FIXED_LEN: usize = 14;

pub const QUERY_UNION: u8 = 0;
pub const QUERY_INTERSECT: u8 = 1;

// --- Current command attributes page ---

pub const CCAP_RICV: u32 = 1;
pub const CCAP_OBJT: u32 = 2;
pub const CCAP_PID: u32 = 3;
pub const CCAP_OID: u32 = 4;
pub const CCAP_APPADDR: u32 = 5;

pub const CCAP_RICV_LEN: usize = 20;
pub const CCAP_OBJT_LEN: usize = 1;
pub const CCAP_PID_LEN: usize = 8;
pub const CCAP_OID_LEN: usize = 8;
pub const CCAP_APPADDR_LEN: usize = 8;

pub const CCAP_RICV_OFF: usize = 8;
pub const CCAP_OBJT_OFF: usize = 28;
pub const CCAP_PID_OFF: usize = 32;
pub const CCAP_OID_OFF: usize = 40;
pub const CCAP_APPADDR_OFF: usize = 48;
pub const CCAP_TOTAL_LEN: usize = 56;

// --- User object timestamps page ---

pub const UTSAP_CTIME: u32 = 1;
pub const UTSAP_ATTR_ATIME: u32 = 2;
pub const UTSAP_ATTR_MTIME: u32 = 3;
pub const UTSAP_DATA_ATIME: u32 = 4;
pub const UTSAP_DATA_MTIME: u32 = 5;

pub const UTSAP_TIME_LEN: usize = 6;
pub const UTSAP_CTIME_OFF: usize = 8;
pub const UTSAP_ATTR_ATIME_OFF: usize = 14;
pub const UTSAP_ATTR_MTIME_OFF: usize = 20;
pub const UTSAP_DATA_ATIME_OFF: usize = 26;
pub const UTSAP_DATA_MTIME_OFF: usize = 32;
pub const UTSAP_TOTAL_LEN: usize = 38;

// --- Collection command tracking page ---

pub const CTP_PERCENT_COMPLETE: u32 = 0x1;
pub const CTP_ACTIVE_COMMAND_STATUS: u32 = 0x2;
pub const CTP_ENDED_COMMAND_STATUS: u32 = 0x3;
pub const CTP_SENSE_DATA: u32 = 0x4;
pub const CTP_NUMBER_OF_MEMBERS: u32 = 0x11;
pub const CTP_OBJECTS_PROCESSED: u32 = 0x12;

/// Ended-status value of a command that is still running.
pub const CTP_STATUS_ACTIVE: u16 = 0xFFFF;
/// Collections whose last command is remembered at once.
pub const MAX_TRACKED_COLLECTIONS: usize = 10;

// --- Sense data ---

pub const MAX_SENSE_LEN: usize = 252;
