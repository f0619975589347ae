// Path: crates/osd-types/src/object.rs

use crate::consts::*;
use serde::{Deserialize, Serialize};

/// The kind of an object addressed by `(pid, oid)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    /// The single root object `(0, 0)`.
    Root,
    /// A partition `(pid, 0)`.
    Partition,
    /// A collection inside a partition.
    Collection,
    /// A user object inside a partition.
    UserObject,
    /// No such object.
    Illegal,
}

impl ObjectType {
    /// The one-byte type code reported in the current command page and
    /// persisted in the catalog.
    pub fn code(self) -> u8 {
        match self {
            Self::Root => 0x01,
            Self::Partition => 0x02,
            Self::Collection => 0x40,
            Self::UserObject => 0x80,
            Self::Illegal => 0x00,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::Root,
            0x02 => Self::Partition,
            0x40 => Self::Collection,
            0x80 => Self::UserObject,
            _ => Self::Illegal,
        }
    }

    /// First page of the attribute range owned by this object type.
    pub fn page_base(self) -> Option<u32> {
        match self {
            Self::UserObject => Some(USEROBJECT_PG),
            Self::Partition => Some(PARTITION_PG),
            Self::Collection => Some(COLLECTION_PG),
            Self::Root => Some(ROOT_PG),
            Self::Illegal => None,
        }
    }

    /// Returns the object type whose attribute range contains `page`, if any.
    pub fn owning_page_range(page: u32) -> Option<Self> {
        match page {
            p if p < PARTITION_PG => Some(Self::UserObject),
            p if p < COLLECTION_PG => Some(Self::Partition),
            p if p < ROOT_PG => Some(Self::Collection),
            p if p < RESERVED_PG => Some(Self::Root),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Partition => "partition",
            Self::Collection => "collection",
            Self::UserObject => "user_object",
            Self::Illegal => "illegal",
        }
    }
}

/// Classification of a page by its offset inside a U/P/C/R range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClass {
    /// Pages defined by the command set standard.
    Standard,
    /// Reserved for future standardisation.
    Reserved,
    /// Vendor specific pages.
    Vendor,
    /// Pages reserved for other standards.
    OtherStandard,
    /// Application (logical unit) defined pages.
    Lun,
    /// The reserved tail of each range, the reserved page block and the
    /// any-object pages.
    Unsettable,
}

impl PageClass {
    pub fn of(page: u32) -> Self {
        if page >= RESERVED_PG {
            return Self::Unsettable;
        }
        match page % PAGE_CLASS_WIDTH {
            STD_PG_LB..=STD_PG_UB => Self::Standard,
            RSRV_PG_LB..=RSRV_PG_UB => Self::Reserved,
            VEND_PG_LB..=VEND_PG_UB => Self::Vendor,
            OTHR_STD_PG_LB..=OTHR_STD_PG_UB => Self::OtherStandard,
            LUN_PG_LB..=LUN_PG_UB => Self::Lun,
            _ => Self::Unsettable,
        }
    }

    /// Whether a client may set attributes on pages of this class.
    pub fn is_settable(self) -> bool {
        matches!(self, Self::Standard | Self::Vendor | Self::Lun)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_round_trip() {
        for t in [
            ObjectType::Root,
            ObjectType::Partition,
            ObjectType::Collection,
            ObjectType::UserObject,
        ] {
            assert_eq!(ObjectType::from_code(t.code()), t);
        }
        assert_eq!(ObjectType::from_code(0x33), ObjectType::Illegal);
    }

    #[test]
    fn pages_map_to_their_owning_range() {
        assert_eq!(
            ObjectType::owning_page_range(USER_TMSTMP_PG),
            Some(ObjectType::UserObject)
        );
        assert_eq!(
            ObjectType::owning_page_range(PARTITION_INFO_PG),
            Some(ObjectType::Partition)
        );
        assert_eq!(
            ObjectType::owning_page_range(COLLECTION_PG + LUN_PG_LB),
            Some(ObjectType::Collection)
        );
        assert_eq!(ObjectType::owning_page_range(ROOT_PG), Some(ObjectType::Root));
        assert_eq!(ObjectType::owning_page_range(CUR_CMD_ATTR_PG), None);
    }

    #[test]
    fn settable_classes() {
        assert!(PageClass::of(USER_INFO_PG).is_settable());
        assert!(PageClass::of(PARTITION_PG + LUN_PG_LB).is_settable());
        assert!(PageClass::of(ROOT_PG + 0x8000).is_settable());
        assert!(!PageClass::of(0x100).is_settable());
        assert!(!PageClass::of(0x2000_0000).is_settable());
        assert!(!PageClass::of(CUR_CMD_ATTR_PG).is_settable());
        assert!(!PageClass::of(ANY_PG + 1).is_settable());
    }
}
