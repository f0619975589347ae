// Path: crates/osd-storage/src/redb_store.rs
use crate::keys::{k_attr, k_member, k_object, read_u32, read_u64};
use crate::metrics::metrics;
use osd_api::query::{QueryExecutor, QueryPlan};
use osd_api::storage::{
    AttrRecord, AttributeRead, AttributeWrite, CatalogRead, CatalogWrite, ObjectFilter,
    StorageError,
};
use osd_types::consts::USER_COLL_PG;
use osd_types::{ObjectType, RetryHint};
use redb::{
    Database, ReadTransaction, ReadableTable, TableDefinition, TableError, WriteTransaction,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// ---- Table definitions (single DB, prefix-encoded keys) ----
const OBJECTS: TableDefinition<&[u8], u8> = TableDefinition::new("OBJECTS"); // [pid][oid] -> type code
const ATTRS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ATTRS"); // [pid][oid][page][number] -> value
const MEMBERS: TableDefinition<&[u8], u32> = TableDefinition::new("MEMBERS"); // [pid][cid][oid][number] -> number
const MEMBER_OF: TableDefinition<&[u8], u32> = TableDefinition::new("MEMBER_OF"); // [pid][oid][cid][number] -> number

fn backend<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// A table missing from a read snapshot means the schema was dropped under
/// us (a concurrent FORMAT, or a fresh file).
fn read_table_err(e: TableError) -> StorageError {
    match e {
        TableError::TableDoesNotExist(name) => {
            StorageError::Retryable(format!("table {name} does not exist"))
        }
        other => backend(other),
    }
}

/// The attribute, catalog and membership store.
#[derive(Clone)]
pub struct RedbObjectStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbObjectStore")
            .field("path", &self.path)
            .finish()
    }
}

impl RedbObjectStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path).map_err(backend)?;
        let store = Self {
            db: Arc::new(db),
            path,
        };
        store.ensure_schema()?;
        tracing::info!(target: "storage", path = %store.path.display(), "object store opened");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates any missing table.
    pub fn ensure_schema(&self) -> Result<(), StorageError> {
        let w = self.db.begin_write().map_err(backend)?;
        {
            w.open_table(OBJECTS).map_err(backend)?;
            w.open_table(ATTRS).map_err(backend)?;
            w.open_table(MEMBERS).map_err(backend)?;
            w.open_table(MEMBER_OF).map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    fn read_once<T, E>(
        &self,
        op: &mut impl FnMut(&ReadView<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let txn = self.db.begin_read().map_err(backend)?;
        op(&ReadView { txn })
    }

    /// Runs `op` against one consistent snapshot. A `Retryable` failure
    /// re-creates the schema and runs `op` once more on a fresh snapshot.
    pub fn read<T, E>(&self, mut op: impl FnMut(&ReadView<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StorageError> + RetryHint,
    {
        match self.read_once(&mut op) {
            Err(e) if e.is_retryable() => {
                tracing::warn!(target: "storage", "snapshot missed the schema; retrying once");
                metrics().inc_retries();
                self.ensure_schema()?;
                self.read_once(&mut op)
            }
            other => other,
        }
    }

    /// Runs `op` inside one write transaction, committing on `Ok` and
    /// aborting on `Err`.
    pub fn write<T, E>(&self, op: impl FnOnce(&WriteView<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let view = WriteView {
            txn: self.db.begin_write().map_err(backend)?,
        };
        match op(&view) {
            Ok(v) => {
                view.txn.commit().map_err(backend)?;
                Ok(v)
            }
            Err(e) => {
                if let Err(abort) = view.txn.abort() {
                    tracing::error!(target: "storage", error = %abort, "failed to abort write transaction");
                }
                Err(e)
            }
        }
    }
}

/// A read-only snapshot.
pub struct ReadView<'db> {
    txn: ReadTransaction<'db>,
}

/// A write transaction. Reads through it observe its own writes.
pub struct WriteView<'db> {
    txn: WriteTransaction<'db>,
}

impl ReadView<'_> {
    fn table_err(e: TableError) -> StorageError {
        read_table_err(e)
    }
}

impl WriteView<'_> {
    fn table_err(e: TableError) -> StorageError {
        backend(e)
    }
}

// --- Range helpers shared by both views ---

fn collect_attrs<T>(t: &T, lo: &[u8], hi: &[u8]) -> Result<Vec<AttrRecord>, StorageError>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in t.range(lo..=hi).map_err(backend)? {
        let (k, v) = entry.map_err(backend)?;
        let key = k.value();
        out.push(AttrRecord {
            page: read_u32(key, 16)?,
            number: read_u32(key, 20)?,
            value: v.value().to_vec(),
        });
    }
    Ok(out)
}

/// Reads the second id and the value of every `[pid][a][b][number]` row in range.
fn collect_pairs<T>(t: &T, lo: &[u8], hi: &[u8]) -> Result<Vec<(u64, u32)>, StorageError>
where
    T: ReadableTable<&'static [u8], u32>,
{
    let mut out = Vec::new();
    for entry in t.range(lo..=hi).map_err(backend)? {
        let (k, v) = entry.map_err(backend)?;
        out.push((read_u64(k.value(), 16)?, v.value()));
    }
    Ok(out)
}

fn collect_objects<T>(
    t: &T,
    lo: &[u8],
    hi: &[u8],
    filter: ObjectFilter,
) -> Result<Vec<u64>, StorageError>
where
    T: ReadableTable<&'static [u8], u8>,
{
    let mut out = Vec::new();
    for entry in t.range(lo..=hi).map_err(backend)? {
        let (k, v) = entry.map_err(backend)?;
        if filter.admits(ObjectType::from_code(v.value())) {
            out.push(read_u64(k.value(), 8)?);
        }
    }
    Ok(out)
}

fn range_is_empty<T, V>(t: &T, lo: &[u8], hi: &[u8]) -> Result<bool, StorageError>
where
    T: ReadableTable<&'static [u8], V>,
    V: redb::RedbValue + 'static,
{
    Ok(t.range(lo..=hi).map_err(backend)?.next().is_none())
}

fn last_key<T>(t: &T, lo: &[u8], hi: &[u8]) -> Result<Option<Vec<u8>>, StorageError>
where
    T: ReadableTable<&'static [u8], u8>,
{
    match t.range(lo..=hi).map_err(backend)?.next_back() {
        Some(entry) => Ok(Some(entry.map_err(backend)?.0.value().to_vec())),
        None => Ok(None),
    }
}

fn first_key_from<T>(t: &T, lo: &[u8]) -> Result<Option<(Vec<u8>, u8)>, StorageError>
where
    T: ReadableTable<&'static [u8], u8>,
{
    match t.range(lo..).map_err(backend)?.next() {
        Some(entry) => {
            let (k, v) = entry.map_err(backend)?;
            Ok(Some((k.value().to_vec(), v.value())))
        }
        None => Ok(None),
    }
}

// The read side is identical for both views; only the table-open error
// policy differs, which `Self::table_err` selects.
macro_rules! impl_read_side {
    ($view:ident) => {
        impl AttributeRead for $view<'_> {
            fn try_get_attr(
                &self,
                pid: u64,
                oid: u64,
                page: u32,
                number: u32,
            ) -> Result<Option<Vec<u8>>, StorageError> {
                let t = self.txn.open_table(ATTRS).map_err(Self::table_err)?;
                let value = t
                    .get(k_attr(pid, oid, page, number).as_slice())
                    .map_err(backend)?
                    .map(|v| v.value().to_vec());
                Ok(value)
            }

            fn object_attrs(&self, pid: u64, oid: u64) -> Result<Vec<AttrRecord>, StorageError> {
                let t = self.txn.open_table(ATTRS).map_err(Self::table_err)?;
                collect_attrs(
                    &t,
                    &k_attr(pid, oid, 0, 0),
                    &k_attr(pid, oid, u32::MAX, u32::MAX),
                )
            }

            fn page_attrs(
                &self,
                pid: u64,
                oid: u64,
                page: u32,
            ) -> Result<Vec<AttrRecord>, StorageError> {
                let t = self.txn.open_table(ATTRS).map_err(Self::table_err)?;
                collect_attrs(
                    &t,
                    &k_attr(pid, oid, page, 0),
                    &k_attr(pid, oid, page, u32::MAX),
                )
            }
        }

        impl CatalogRead for $view<'_> {
            fn object_type(&self, pid: u64, oid: u64) -> Result<ObjectType, StorageError> {
                let t = self.txn.open_table(OBJECTS).map_err(Self::table_err)?;
                let ty = t
                    .get(k_object(pid, oid).as_slice())
                    .map_err(backend)?
                    .map_or(ObjectType::Illegal, |v| ObjectType::from_code(v.value()));
                Ok(ty)
            }

            fn list_partitions(&self, from_pid: u64) -> Result<Vec<u64>, StorageError> {
                let t = self.txn.open_table(OBJECTS).map_err(Self::table_err)?;
                let mut out = Vec::new();
                let mut next = Some(from_pid.max(1));
                // Hop from partition to partition instead of walking their objects.
                while let Some(pid) = next {
                    let Some((key, code)) = first_key_from(&t, &k_object(pid, 0))? else {
                        break;
                    };
                    let found = read_u64(&key, 0)?;
                    if read_u64(&key, 8)? == 0
                        && ObjectType::from_code(code) == ObjectType::Partition
                    {
                        out.push(found);
                    }
                    next = found.checked_add(1);
                }
                Ok(out)
            }

            fn list_objects(
                &self,
                pid: u64,
                from_oid: u64,
                filter: ObjectFilter,
            ) -> Result<Vec<u64>, StorageError> {
                let t = self.txn.open_table(OBJECTS).map_err(Self::table_err)?;
                collect_objects(
                    &t,
                    &k_object(pid, from_oid.max(1)),
                    &k_object(pid, u64::MAX),
                    filter,
                )
            }

            fn collection_members(
                &self,
                pid: u64,
                cid: u64,
                from_oid: u64,
            ) -> Result<Vec<u64>, StorageError> {
                let t = self.txn.open_table(MEMBERS).map_err(Self::table_err)?;
                let pairs = collect_pairs(
                    &t,
                    &k_member(pid, cid, from_oid, 0),
                    &k_member(pid, cid, u64::MAX, u32::MAX),
                )?;
                // Slots of one member are adjacent in key order.
                let mut oids: Vec<u64> = pairs.into_iter().map(|(oid, _)| oid).collect();
                oids.dedup();
                Ok(oids)
            }

            fn object_collections(
                &self,
                pid: u64,
                oid: u64,
            ) -> Result<Vec<(u64, u32)>, StorageError> {
                let t = self.txn.open_table(MEMBER_OF).map_err(Self::table_err)?;
                collect_pairs(
                    &t,
                    &k_member(pid, oid, 0, 0),
                    &k_member(pid, oid, u64::MAX, u32::MAX),
                )
            }

            fn partition_is_empty(&self, pid: u64) -> Result<bool, StorageError> {
                let t = self.txn.open_table(OBJECTS).map_err(Self::table_err)?;
                range_is_empty(&t, &k_object(pid, 1), &k_object(pid, u64::MAX))
            }

            fn collection_is_empty(&self, pid: u64, cid: u64) -> Result<bool, StorageError> {
                let t = self.txn.open_table(MEMBERS).map_err(Self::table_err)?;
                range_is_empty(
                    &t,
                    &k_member(pid, cid, 0, 0),
                    &k_member(pid, cid, u64::MAX, u32::MAX),
                )
            }

            fn max_pid(&self) -> Result<Option<u64>, StorageError> {
                let t = self.txn.open_table(OBJECTS).map_err(Self::table_err)?;
                match last_key(&t, &k_object(1, 0), &k_object(u64::MAX, u64::MAX))? {
                    Some(key) => Ok(Some(read_u64(&key, 0)?)),
                    None => Ok(None),
                }
            }

            fn max_oid(&self, pid: u64) -> Result<Option<u64>, StorageError> {
                let t = self.txn.open_table(OBJECTS).map_err(Self::table_err)?;
                match last_key(&t, &k_object(pid, 1), &k_object(pid, u64::MAX))? {
                    Some(key) => Ok(Some(read_u64(&key, 8)?)),
                    None => Ok(None),
                }
            }
        }

        impl QueryExecutor for $view<'_> {
            fn execute_query(&self, plan: &QueryPlan) -> Result<Vec<u64>, StorageError> {
                crate::query::execute_plan(self, plan)
            }
        }
    };
}

impl_read_side!(ReadView);
impl_read_side!(WriteView);

impl WriteView<'_> {
    fn delete_range<V>(
        &self,
        def: TableDefinition<&'static [u8], V>,
        lo: &[u8],
        hi: &[u8],
    ) -> Result<usize, StorageError>
    where
        V: redb::RedbValue + 'static,
    {
        let mut table = self.txn.open_table(def).map_err(backend)?;
        let keys_to_delete: Vec<Vec<u8>> = table
            .range(lo..=hi)
            .map_err(backend)?
            .map(|r| r.map(|(k, _)| k.value().to_vec()))
            .collect::<Result<_, _>>()
            .map_err(backend)?;
        for key in &keys_to_delete {
            table.remove(key.as_slice()).map_err(backend)?;
        }
        Ok(keys_to_delete.len())
    }

    fn unlink_member(
        &self,
        pid: u64,
        cid: u64,
        oid: u64,
        number: u32,
    ) -> Result<bool, StorageError> {
        let existed = {
            let mut members = self.txn.open_table(MEMBERS).map_err(backend)?;
            let removed = members
                .remove(k_member(pid, cid, oid, number).as_slice())
                .map_err(backend)?
                .is_some();
            removed
        };
        let mut member_of = self.txn.open_table(MEMBER_OF).map_err(backend)?;
        member_of
            .remove(k_member(pid, oid, cid, number).as_slice())
            .map_err(backend)?;
        Ok(existed)
    }
}

impl AttributeWrite for WriteView<'_> {
    fn set_attr(
        &self,
        pid: u64,
        oid: u64,
        page: u32,
        number: u32,
        value: &[u8],
    ) -> Result<(), StorageError> {
        let mut t = self.txn.open_table(ATTRS).map_err(backend)?;
        t.insert(k_attr(pid, oid, page, number).as_slice(), value)
            .map_err(backend)?;
        metrics().inc_attr_writes(1);
        Ok(())
    }

    fn delete_attr(
        &self,
        pid: u64,
        oid: u64,
        page: u32,
        number: u32,
    ) -> Result<bool, StorageError> {
        let mut t = self.txn.open_table(ATTRS).map_err(backend)?;
        let existed = t
            .remove(k_attr(pid, oid, page, number).as_slice())
            .map_err(backend)?
            .is_some();
        if existed {
            metrics().inc_attr_deletes(1);
        }
        Ok(existed)
    }

    fn delete_all_attrs(&self, pid: u64, oid: u64) -> Result<usize, StorageError> {
        let n = self.delete_range(
            ATTRS,
            &k_attr(pid, oid, 0, 0),
            &k_attr(pid, oid, u32::MAX, u32::MAX),
        )?;
        metrics().inc_attr_deletes(n as u64);
        Ok(n)
    }
}

impl CatalogWrite for WriteView<'_> {
    fn insert_object(&self, pid: u64, oid: u64, ty: ObjectType) -> Result<bool, StorageError> {
        let mut t = self.txn.open_table(OBJECTS).map_err(backend)?;
        let key = k_object(pid, oid);
        if t.get(key.as_slice()).map_err(backend)?.is_some() {
            return Ok(false);
        }
        t.insert(key.as_slice(), ty.code()).map_err(backend)?;
        metrics().inc_objects_created(ty.as_str());
        Ok(true)
    }

    fn remove_object(&self, pid: u64, oid: u64) -> Result<bool, StorageError> {
        let ty = self.object_type(pid, oid)?;
        if ty == ObjectType::Illegal {
            return Ok(false);
        }
        self.delete_all_attrs(pid, oid)?;

        // Memberships naming the object as member.
        for (cid, number) in self.object_collections(pid, oid)? {
            self.unlink_member(pid, cid, oid, number)?;
        }
        // Memberships naming the object as collection, with the members'
        // collection-page entries that point at it.
        for (member, number) in self.clear_collection(pid, oid)? {
            self.delete_attr(pid, member, USER_COLL_PG, number)?;
        }

        let mut t = self.txn.open_table(OBJECTS).map_err(backend)?;
        t.remove(k_object(pid, oid).as_slice()).map_err(backend)?;
        metrics().inc_objects_removed(ty.as_str());
        Ok(true)
    }

    fn insert_member(
        &self,
        pid: u64,
        cid: u64,
        oid: u64,
        number: u32,
    ) -> Result<(), StorageError> {
        {
            let mut members = self.txn.open_table(MEMBERS).map_err(backend)?;
            members
                .insert(k_member(pid, cid, oid, number).as_slice(), number)
                .map_err(backend)?;
        }
        let mut member_of = self.txn.open_table(MEMBER_OF).map_err(backend)?;
        member_of
            .insert(k_member(pid, oid, cid, number).as_slice(), number)
            .map_err(backend)?;
        Ok(())
    }

    fn remove_member(
        &self,
        pid: u64,
        cid: u64,
        oid: u64,
        number: u32,
    ) -> Result<bool, StorageError> {
        self.unlink_member(pid, cid, oid, number)
    }

    fn clear_collection(&self, pid: u64, cid: u64) -> Result<Vec<(u64, u32)>, StorageError> {
        let rows = {
            let t = self.txn.open_table(MEMBERS).map_err(backend)?;
            collect_pairs(
                &t,
                &k_member(pid, cid, 0, 0),
                &k_member(pid, cid, u64::MAX, u32::MAX),
            )?
        };
        for (oid, number) in &rows {
            self.unlink_member(pid, cid, *oid, *number)?;
        }
        Ok(rows)
    }

    fn wipe(&self) -> Result<(), StorageError> {
        self.txn.delete_table(OBJECTS).map_err(backend)?;
        self.txn.delete_table(ATTRS).map_err(backend)?;
        self.txn.delete_table(MEMBERS).map_err(backend)?;
        self.txn.delete_table(MEMBER_OF).map_err(backend)?;
        self.txn.open_table(OBJECTS).map_err(backend)?;
        self.txn.open_table(ATTRS).map_err(backend)?;
        self.txn.open_table(MEMBERS).map_err(backend)?;
        self.txn.open_table(MEMBER_OF).map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osd_api::query::{Combinator, Criterion};
    use tempfile::{tempdir, TempDir};

    const P: u64 = 0x10000;
    const C: u64 = 0x10000;
    const PG: u32 = 0x10000;

    fn store() -> (TempDir, RedbObjectStore) {
        let dir = tempdir().unwrap();
        let store = RedbObjectStore::open(dir.path().join("osd.redb")).unwrap();
        (dir, store)
    }

    fn w<T>(
        store: &RedbObjectStore,
        op: impl FnOnce(&WriteView<'_>) -> Result<T, StorageError>,
    ) -> T {
        store.write(op).unwrap()
    }

    fn r<T>(store: &RedbObjectStore, op: impl FnMut(&ReadView<'_>) -> Result<T, StorageError>) -> T {
        store.read(op).unwrap()
    }

    #[test]
    fn set_overwrites_and_delete_removes() {
        let (_d, s) = store();
        w(&s, |t| {
            t.set_attr(P, 1, PG, 1, b"first")?;
            t.set_attr(P, 1, PG, 1, b"second")
        });
        let all = r(&s, |t| t.object_attrs(P, 1));
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, b"second");

        assert!(w(&s, |t| t.delete_attr(P, 1, PG, 1)));
        assert_eq!(
            s.read(|t| t.get_attr(P, 1, PG, 1)),
            Err(StorageError::NotFound)
        );
    }

    #[test]
    fn enumerations_follow_page_then_number_order() {
        let (_d, s) = store();
        w(&s, |t| {
            t.set_attr(P, 1, PG + 1, 7, b"c")?;
            t.set_attr(P, 1, PG, 2, b"b")?;
            t.set_attr(P, 1, PG, 1, b"a")?;
            t.set_attr(P, 2, PG, 1, b"other")
        });
        let page = r(&s, |t| t.page_attrs(P, 1, PG));
        assert_eq!(
            page.iter().map(|a| a.number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        let across = r(&s, |t| t.number_attrs(P, 1, 7));
        assert_eq!(across.len(), 1);
        assert_eq!(across[0].page, PG + 1);
        assert_eq!(r(&s, |t| t.object_attrs(P, 1)).len(), 3);
    }

    #[test]
    fn aborted_write_leaves_nothing() {
        let (_d, s) = store();
        let res: Result<(), StorageError> = s.write(|t| {
            t.insert_object(P, 0, ObjectType::Partition)?;
            t.set_attr(P, 0, 0x3000_0001, 1, b"x")?;
            Err(StorageError::Backend("boom".into()))
        });
        assert!(res.is_err());
        assert_eq!(r(&s, |t| t.object_type(P, 0)), ObjectType::Illegal);
        assert!(r(&s, |t| t.object_attrs(P, 0)).is_empty());
    }

    #[test]
    fn remove_cascades_attributes_and_memberships() {
        let (_d, s) = store();
        w(&s, |t| {
            t.insert_object(P, 0, ObjectType::Partition)?;
            t.insert_object(P, C, ObjectType::Collection)?;
            t.insert_object(P, C + 1, ObjectType::UserObject)?;
            t.set_attr(P, C + 1, PG, 1, b"v")?;
            t.set_attr(P, C + 1, USER_COLL_PG, 1, &C.to_be_bytes())?;
            t.insert_member(P, C, C + 1, 1)
        });
        assert!(!r(&s, |t| t.collection_is_empty(P, C)));
        assert_eq!(r(&s, |t| t.object_collections(P, C + 1)), vec![(C, 1)]);

        assert!(w(&s, |t| t.remove_object(P, C + 1)));
        assert!(r(&s, |t| t.object_attrs(P, C + 1)).is_empty());
        assert!(r(&s, |t| t.collection_is_empty(P, C)));
        assert!(!w(&s, |t| t.remove_object(P, C + 1)));
    }

    #[test]
    fn removing_a_collection_clears_member_pointers() {
        let (_d, s) = store();
        w(&s, |t| {
            t.insert_object(P, C, ObjectType::Collection)?;
            t.insert_object(P, C + 5, ObjectType::UserObject)?;
            t.set_attr(P, C + 5, USER_COLL_PG, 3, &C.to_be_bytes())?;
            t.insert_member(P, C, C + 5, 3)
        });
        w(&s, |t| t.remove_object(P, C));
        assert!(r(&s, |t| t.object_collections(P, C + 5)).is_empty());
        assert_eq!(
            r(&s, |t| t.try_get_attr(P, C + 5, USER_COLL_PG, 3)),
            None
        );
    }

    #[test]
    fn one_member_in_two_slots_survives_losing_one() {
        let (_d, s) = store();
        w(&s, |t| {
            t.insert_object(P, C, ObjectType::Collection)?;
            t.insert_object(P, C + 1, ObjectType::UserObject)?;
            t.insert_member(P, C, C + 1, 1)?;
            t.insert_member(P, C, C + 1, 2)
        });
        assert_eq!(r(&s, |t| t.collection_members(P, C, 0)), vec![C + 1]);
        assert_eq!(
            r(&s, |t| t.object_collections(P, C + 1)),
            vec![(C, 1), (C, 2)]
        );

        assert!(w(&s, |t| t.remove_member(P, C, C + 1, 1)));
        assert!(!w(&s, |t| t.remove_member(P, C, C + 1, 1)));
        assert_eq!(r(&s, |t| t.collection_members(P, C, 0)), vec![C + 1]);
        assert_eq!(r(&s, |t| t.object_collections(P, C + 1)), vec![(C, 2)]);
        assert!(!r(&s, |t| t.collection_is_empty(P, C)));

        assert!(w(&s, |t| t.remove_member(P, C, C + 1, 2)));
        assert!(r(&s, |t| t.collection_is_empty(P, C)));
    }

    #[test]
    fn catalog_enumerations_and_bounds() {
        let (_d, s) = store();
        w(&s, |t| {
            t.insert_object(0, 0, ObjectType::Root)?;
            for pid in [P, P + 2, P + 9] {
                t.insert_object(pid, 0, ObjectType::Partition)?;
            }
            t.insert_object(P, 0x10000, ObjectType::UserObject)?;
            t.insert_object(P, 0x10001, ObjectType::Collection)?;
            t.insert_object(P, 0x10002, ObjectType::UserObject)?;
            Ok(())
        });
        assert_eq!(r(&s, |t| t.list_partitions(0)), vec![P, P + 2, P + 9]);
        assert_eq!(r(&s, |t| t.list_partitions(P + 1)), vec![P + 2, P + 9]);
        assert_eq!(
            r(&s, |t| t.list_objects(P, 0, ObjectFilter::All)),
            vec![0x10000, 0x10001, 0x10002]
        );
        assert_eq!(
            r(&s, |t| t.list_objects(P, 0x10001, ObjectFilter::UserObjects)),
            vec![0x10002]
        );
        assert_eq!(
            r(&s, |t| t.list_objects(P, 0, ObjectFilter::Collections)),
            vec![0x10001]
        );
        assert_eq!(r(&s, |t| t.max_pid()), Some(P + 9));
        assert_eq!(r(&s, |t| t.max_oid(P)), Some(0x10002));
        assert_eq!(r(&s, |t| t.max_oid(P + 2)), None);
        assert!(!r(&s, |t| t.partition_is_empty(P)));
        assert!(r(&s, |t| t.partition_is_empty(P + 2)));
        assert!(!w(&s, |t| t.insert_object(P, 0x10000, ObjectType::UserObject)));
    }

    #[test]
    fn wipe_drops_everything() {
        let (_d, s) = store();
        w(&s, |t| {
            t.insert_object(P, 0, ObjectType::Partition)?;
            t.set_attr(P, 0, 0x3000_0001, 1, b"x")?;
            t.insert_member(P, C, C + 1, 1)
        });
        w(&s, |t| t.wipe());
        assert_eq!(r(&s, |t| t.max_pid()), None);
        assert!(r(&s, |t| t.object_attrs(P, 0)).is_empty());
        assert!(r(&s, |t| t.collection_is_empty(P, C)));
    }

    fn query_fixture(s: &RedbObjectStore) -> Vec<u64> {
        let values = [4u64, 49, 20, 101, 59, 75, 200, 67, 323, 1];
        let ids: Vec<u64> = (0..values.len() as u64).map(|i| 0x10001 + i).collect();
        w(s, |t| {
            t.insert_object(P, C, ObjectType::Collection)?;
            for (i, oid) in ids.iter().enumerate() {
                t.insert_object(P, *oid, ObjectType::UserObject)?;
                t.set_attr(P, *oid, PG, 1, &values[i].to_be_bytes())?;
                t.set_attr(P, *oid, PG, 2, &(i as u64 % 2).to_be_bytes())?;
                t.insert_member(P, C, *oid, 1)?;
            }
            Ok(())
        });
        ids
    }

    #[test]
    fn range_query_selects_inclusive_window() {
        let (_d, s) = store();
        let ids = query_fixture(&s);
        let plan = QueryPlan::builder(P, C)
            .criterion(
                Criterion::new(PG, 1)
                    .with_min(40u64.to_be_bytes())
                    .with_max(80u64.to_be_bytes()),
            )
            .build();
        let got = r(&s, |t| t.execute_query(&plan));
        assert_eq!(got, vec![ids[1], ids[4], ids[5], ids[7]]);
    }

    #[test]
    fn intersect_and_union_follow_set_algebra() {
        let (_d, s) = store();
        let ids = query_fixture(&s);
        let window = Criterion::new(PG, 1)
            .with_min(40u64.to_be_bytes())
            .with_max(80u64.to_be_bytes());
        let odd = Criterion::new(PG, 2)
            .with_min(1u64.to_be_bytes())
            .with_max(1u64.to_be_bytes());

        let both = |c: Combinator| {
            QueryPlan::builder(P, C)
                .combinator(c)
                .criterion(window.clone())
                .criterion(odd.clone())
                .build()
        };
        let inter = r(&s, |t| t.execute_query(&both(Combinator::Intersect)));
        assert_eq!(inter, vec![ids[1], ids[5], ids[7]]);

        let union = r(&s, |t| t.execute_query(&both(Combinator::Union)));
        assert_eq!(
            union,
            vec![ids[1], ids[3], ids[4], ids[5], ids[7], ids[9]]
        );

        let everything = QueryPlan::builder(P, C).build();
        assert_eq!(r(&s, |t| t.execute_query(&everything)), ids);
    }

    #[test]
    fn query_is_scoped_to_collection_members() {
        let (_d, s) = store();
        let ids = query_fixture(&s);
        w(&s, |t| t.remove_member(P, C, ids[1], 1));
        let plan = QueryPlan::builder(P, C)
            .criterion(Criterion::new(PG, 1).with_max(50u64.to_be_bytes()))
            .build();
        assert_eq!(
            r(&s, |t| t.execute_query(&plan)),
            vec![ids[0], ids[2], ids[9]]
        );
    }

    #[test]
    fn retryable_snapshot_is_retried_once() {
        let (_d, s) = store();
        let mut calls = 0;
        let res: Result<u32, StorageError> = s.read(|_| {
            calls += 1;
            if calls == 1 {
                Err(StorageError::Retryable("schema".into()))
            } else {
                Ok(7)
            }
        });
        assert_eq!(res, Ok(7));
        assert_eq!(calls, 2);

        let mut calls = 0;
        let res: Result<u32, StorageError> = s.read(|_| {
            calls += 1;
            Err(StorageError::Retryable("schema".into()))
        });
        assert!(res.is_err());
        assert_eq!(calls, 2);
    }
}
