// Path: crates/osd-api/src/storage/mod.rs

//! API for the attribute store and the object catalog.
//!
//! Both are implemented over one transaction handle so that a command can
//! create an object, set its attributes and record memberships atomically.

pub use osd_types::error::StorageError;
use osd_types::ObjectType;

/// Encodes a u64 into a big-endian byte array, suitable for ordered key scans.
#[inline]
pub fn be64(x: u64) -> [u8; 8] {
    x.to_be_bytes()
}
/// Encodes a u32 into a big-endian byte array.
#[inline]
pub fn be32(x: u32) -> [u8; 4] {
    x.to_be_bytes()
}

/// One stored attribute.
#[derive(Clone, PartialEq, Eq)]
pub struct AttrRecord {
    pub page: u32,
    pub number: u32,
    pub value: Vec<u8>,
}

impl std::fmt::Debug for AttrRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AttrRecord({:#x}/{:#x}={})",
            self.page,
            self.number,
            hex::encode(&self.value)
        )
    }
}

/// Which objects of a partition an enumeration yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFilter {
    /// User objects and collections.
    All,
    Collections,
    UserObjects,
}

impl ObjectFilter {
    pub fn admits(self, ty: ObjectType) -> bool {
        match self {
            Self::All => matches!(ty, ObjectType::Collection | ObjectType::UserObject),
            Self::Collections => ty == ObjectType::Collection,
            Self::UserObjects => ty == ObjectType::UserObject,
        }
    }
}

/// Read access to the `(pid, oid, page, number) -> value` relation.
///
/// Enumerations return records ordered by `(page, number)`.
pub trait AttributeRead {
    /// Fetches one attribute, `None` when it is not set.
    fn try_get_attr(
        &self,
        pid: u64,
        oid: u64,
        page: u32,
        number: u32,
    ) -> Result<Option<Vec<u8>>, StorageError>;

    /// Fetches one attribute, failing with `NotFound` when it is not set.
    fn get_attr(&self, pid: u64, oid: u64, page: u32, number: u32) -> Result<Vec<u8>, StorageError> {
        self.try_get_attr(pid, oid, page, number)?
            .ok_or(StorageError::NotFound)
    }

    /// Every attribute of one object.
    fn object_attrs(&self, pid: u64, oid: u64) -> Result<Vec<AttrRecord>, StorageError>;

    /// Every attribute on one page of an object.
    fn page_attrs(&self, pid: u64, oid: u64, page: u32) -> Result<Vec<AttrRecord>, StorageError>;

    /// The same attribute number across every page of an object.
    fn number_attrs(
        &self,
        pid: u64,
        oid: u64,
        number: u32,
    ) -> Result<Vec<AttrRecord>, StorageError> {
        Ok(self
            .object_attrs(pid, oid)?
            .into_iter()
            .filter(|r| r.number == number)
            .collect())
    }
}

/// Mutations of the attribute relation.
pub trait AttributeWrite: AttributeRead {
    /// Inserts or overwrites one attribute.
    fn set_attr(
        &self,
        pid: u64,
        oid: u64,
        page: u32,
        number: u32,
        value: &[u8],
    ) -> Result<(), StorageError>;

    /// Removes one attribute. Returns whether it existed.
    fn delete_attr(&self, pid: u64, oid: u64, page: u32, number: u32)
        -> Result<bool, StorageError>;

    /// Removes every attribute of an object. Returns the number removed.
    fn delete_all_attrs(&self, pid: u64, oid: u64) -> Result<usize, StorageError>;
}

/// Read access to object existence and collection membership.
///
/// Id enumerations are ascending and start at the given lower bound.
pub trait CatalogRead {
    /// The type of `(pid, oid)`, `Illegal` when it does not exist.
    fn object_type(&self, pid: u64, oid: u64) -> Result<ObjectType, StorageError>;

    fn list_partitions(&self, from_pid: u64) -> Result<Vec<u64>, StorageError>;

    fn list_objects(
        &self,
        pid: u64,
        from_oid: u64,
        filter: ObjectFilter,
    ) -> Result<Vec<u64>, StorageError>;

    /// Members of a collection, each listed once however many slots name it.
    fn collection_members(&self, pid: u64, cid: u64, from_oid: u64)
        -> Result<Vec<u64>, StorageError>;

    /// Collections an object belongs to, with the attribute number of each membership.
    fn object_collections(&self, pid: u64, oid: u64) -> Result<Vec<(u64, u32)>, StorageError>;

    /// True when the partition holds no user objects or collections.
    fn partition_is_empty(&self, pid: u64) -> Result<bool, StorageError>;

    /// True when no membership row names `cid` as its collection.
    fn collection_is_empty(&self, pid: u64, cid: u64) -> Result<bool, StorageError>;

    /// Largest partition id in use.
    fn max_pid(&self) -> Result<Option<u64>, StorageError>;

    /// Largest object id in use inside a partition.
    fn max_oid(&self, pid: u64) -> Result<Option<u64>, StorageError>;
}

/// Mutations of the catalog. Removal cascades to attributes and memberships.
pub trait CatalogWrite: CatalogRead + AttributeWrite {
    /// Records a new object. Returns `false` when `(pid, oid)` already exists.
    fn insert_object(&self, pid: u64, oid: u64, ty: ObjectType) -> Result<bool, StorageError>;

    /// Removes an object with all of its attributes and every membership
    /// row naming it as member or as collection. Returns whether it existed.
    fn remove_object(&self, pid: u64, oid: u64) -> Result<bool, StorageError>;

    fn insert_member(&self, pid: u64, cid: u64, oid: u64, number: u32)
        -> Result<(), StorageError>;

    /// Removes the membership held through attribute `number`. Other slots
    /// naming the same collection are kept. Returns whether it existed.
    fn remove_member(&self, pid: u64, cid: u64, oid: u64, number: u32)
        -> Result<bool, StorageError>;

    /// Drops every membership of a collection, returning `(oid, number)` of each.
    fn clear_collection(&self, pid: u64, cid: u64) -> Result<Vec<(u64, u32)>, StorageError>;

    /// Drops every object, attribute and membership.
    fn wipe(&self) -> Result<(), StorageError>;
}
