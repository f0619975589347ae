// Path: crates/osd-target/src/dispatch.rs

//! Executes one command.
//!
//! 1. Validate opcode and length marker, decode the service action and the
//!    attribute parameters.
//! 2. Size the data-in buffer: the larger of the command's own output and
//!    the end of the retrieved-attributes segment. Only the bytes actually
//!    produced go back; gaps before the retrieved attributes stay zero.
//! 3. Run the service action. Commands that can change anything run in one
//!    write transaction together with their attribute sets and gets; the
//!    rest run against a read snapshot.
//! 4. Apply sets, then gets, so a get sees what the same command set.
//! 5. Map any failure to sense data naming the addressed object. Collection
//!    commands also leave their outcome on the collection's tracking page.

use crate::attr::{self, AttrContext, Selected};
use crate::cdb::{AttrParams, Cdb, ServiceAction};
use crate::list;
use crate::objfile::ObjectFiles;
use crate::query;
use crate::sense::{self, asc, SenseKey};
use crate::target::{init_root, page_id, Response, Target};
use crate::tracking::{self, CommandTracker};
use crate::vpage::CurrentCommand;
use osd_api::query::QueryExecutor;
use osd_api::storage::{AttributeRead, CatalogRead, CatalogWrite, ObjectFilter};
use osd_telemetry::time::Timer;
use osd_telemetry::{command_metrics, error_metrics};
use osd_types::config::TargetConfig;
use osd_types::consts::*;
use osd_types::{ErrorCode, ObjectType, OsdError};
use std::path::Path;
use tracing::{debug, info, warn};

/// Everything a handler may read through.
pub trait StoreView: AttributeRead + CatalogRead + QueryExecutor {}
impl<T: AttributeRead + CatalogRead + QueryExecutor + ?Sized> StoreView for T {}

/// Data file effects that follow the fate of the command's transaction.
#[derive(Debug, Default)]
struct FileJournal {
    created: Vec<(u64, u64)>,
    doomed: Vec<(u64, u64)>,
    format: bool,
}

impl FileJournal {
    fn rollback(self, files: &ObjectFiles) {
        for (pid, oid) in self.created {
            if let Err(e) = files.remove(pid, oid) {
                warn!(target: "dispatch", pid, oid, error = %e, "failed to drop data file of aborted create");
            }
        }
    }

    fn commit(self, files: &ObjectFiles) {
        if self.format {
            if let Err(e) = files.remove_all() {
                warn!(target: "dispatch", error = %e, "failed to clear object data after format");
            }
        }
        for (pid, oid) in self.doomed {
            if let Err(e) = files.remove(pid, oid) {
                warn!(target: "dispatch", pid, oid, error = %e, "failed to remove data file");
            }
        }
    }
}

/// Where the attribute post-step applies.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrTarget {
    None,
    Object(u64, u64),
    /// Objects of a multi-object create: only current command gets.
    Created(u64, Vec<u64>),
    /// Sets go to every member, gets to the collection.
    Members(u64, u64),
}

#[derive(Debug, Default)]
struct Done {
    /// Data-in bytes the action itself produced.
    used: usize,
    /// Bytes actually read by a READ that ran past the end.
    past_end: Option<u64>,
    /// Requested list identifier and continuation id of a LIST.
    list: Option<(u32, u64)>,
    /// Member count and objects processed by a tracked collection command.
    tracked: Option<(u64, u64)>,
}

struct Env<'a> {
    files: &'a ObjectFiles,
    tracking: &'a CommandTracker,
    config: &'a TargetConfig,
    db_path: &'a Path,
}

impl Env<'_> {
    fn ctx<'b>(&'b self, ccap: &'b CurrentCommand) -> AttrContext<'b> {
        AttrContext {
            ccap,
            tracking: self.tracking,
            files: self.files,
            db_path: self.db_path,
            max_attr_len: self.config.max_attr_len,
        }
    }
}

struct Command<'a> {
    cdb: Cdb<'a>,
    action: ServiceAction,
    params: AttrParams<'a>,
    data_out: &'a [u8],
}

fn alloc(len: usize) -> Result<Vec<u8>, OsdError> {
    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|e| OsdError::OutOfMemory(format!("{len} byte response: {e}")))?;
    out.resize(len, 0);
    Ok(out)
}

fn slice_of<'d>(data: &'d [u8], off: Option<u64>, len: u64, what: &str) -> Result<&'d [u8], OsdError> {
    let short = || OsdError::ParameterListLength(format!("{what} lies outside data-out"));
    let off = usize::try_from(off.ok_or_else(short)?).map_err(|_| short())?;
    let len = usize::try_from(len).map_err(|_| short())?;
    let end = off.checked_add(len).ok_or_else(short)?;
    data.get(off..end).ok_or_else(short)
}

fn segment(out: &mut [u8], off: u64, len: u64) -> Result<&mut [u8], OsdError> {
    let bad = || OsdError::InvalidArgument("retrieved attributes outside the response".into());
    let off = usize::try_from(off).map_err(|_| bad())?;
    let end = off
        .checked_add(usize::try_from(len).map_err(|_| bad())?)
        .ok_or_else(bad)?;
    out.get_mut(off..end).ok_or_else(bad)
}

/// End of the retrieved attributes inside the response, 0 when none came back.
fn retrieved_end(off: u64, used: usize) -> usize {
    match usize::try_from(off) {
        Ok(off) if used > 0 => off.saturating_add(used),
        _ => 0,
    }
}

fn expect_type<V: CatalogRead + ?Sized>(
    view: &V,
    pid: u64,
    oid: u64,
    want: ObjectType,
) -> Result<(), OsdError> {
    match view.object_type(pid, oid)? {
        found if found == want => Ok(()),
        ObjectType::Illegal => Err(OsdError::NotFound(format!(
            "{} {pid:#x}/{oid:#x}",
            want.as_str()
        ))),
        found => Err(OsdError::InvalidArgument(format!(
            "{pid:#x}/{oid:#x} is a {}, not a {}",
            found.as_str(),
            want.as_str()
        ))),
    }
}

fn existing<V: CatalogRead + ?Sized>(view: &V, pid: u64, oid: u64) -> Result<ObjectType, OsdError> {
    match view.object_type(pid, oid)? {
        ObjectType::Illegal => Err(OsdError::NotFound(format!("object {pid:#x}/{oid:#x}"))),
        ty => Ok(ty),
    }
}

/// Picks the requested id, or the next free one at or above `lb`.
fn allocate_id(requested: u64, lb: u64, max_in_use: Option<u64>, taken: bool) -> Result<u64, OsdError> {
    if requested == 0 {
        let next = match max_in_use {
            Some(max) => max
                .checked_add(1)
                .ok_or_else(|| OsdError::InvalidArgument("id space exhausted".into()))?,
            None => lb,
        };
        return Ok(next.max(lb));
    }
    if requested < lb {
        return Err(OsdError::InvalidArgument(format!(
            "id {requested:#x} below {lb:#x}"
        )));
    }
    if taken {
        return Err(OsdError::InvalidArgument(format!(
            "id {requested:#x} already exists"
        )));
    }
    Ok(requested)
}

fn create_partition<W: CatalogWrite + ?Sized>(w: &W, requested: u64) -> Result<u64, OsdError> {
    let taken = requested != 0 && w.object_type(requested, PARTITION_OID)? != ObjectType::Illegal;
    let pid = allocate_id(requested, PARTITION_PID_LB, w.max_pid()?, taken)?;
    w.insert_object(pid, PARTITION_OID, ObjectType::Partition)?;
    w.set_attr(pid, PARTITION_OID, PARTITION_DIR_PG, ATTRNUM_PAGE_ID, &page_id(PARTITION_DIR_PAGE_ID))?;
    w.set_attr(pid, PARTITION_OID, PARTITION_INFO_PG, ATTRNUM_PAGE_ID, &page_id(PARTITION_INFO_PAGE_ID))?;
    w.set_attr(pid, PARTITION_OID, PARTITION_INFO_PG, ATTRNUM_INFO_PID, &pid.to_be_bytes())?;
    Ok(pid)
}

fn create_in_partition<W: CatalogWrite + ?Sized>(
    w: &W,
    pid: u64,
    requested: u64,
    ty: ObjectType,
) -> Result<u64, OsdError> {
    let taken = requested != 0 && w.object_type(pid, requested)? != ObjectType::Illegal;
    let oid = allocate_id(requested, USEROBJECT_OID_LB, w.max_oid(pid)?, taken)?;
    w.insert_object(pid, oid, ty)?;
    let (page, id) = match ty {
        ObjectType::Collection => (COLLECTION_INFO_PG, COLLECTION_INFO_PAGE_ID),
        _ => (USER_INFO_PG, USEROBJECT_INFO_PAGE_ID),
    };
    w.set_attr(pid, oid, page, ATTRNUM_PAGE_ID, &page_id(id))?;
    w.set_attr(pid, oid, page, ATTRNUM_INFO_PID, &pid.to_be_bytes())?;
    w.set_attr(pid, oid, page, ATTRNUM_INFO_OID, &oid.to_be_bytes())?;
    Ok(oid)
}

impl Command<'_> {
    fn pid(&self) -> u64 {
        self.cdb.pid()
    }

    fn oid(&self) -> u64 {
        self.cdb.oid()
    }

    fn is_read_only(&self) -> bool {
        use ServiceAction::*;
        matches!(
            self.action,
            List | ListCollection | Query | GetAttributes | Read
        ) && !self.params.has_set()
    }

    /// Size of the data-in buffer.
    fn outlen(&self, limit: u64) -> Result<usize, OsdError> {
        use ServiceAction::*;
        let own = match self.action {
            Read => self.cdb.length(),
            List | ListCollection | Query => self.cdb.alloc_len(),
            _ => 0,
        };
        let wants_segment = match self.params {
            AttrParams::Page {
                get_page,
                alloc_len,
                retrieved_off,
                ..
            } => get_page != 0 && alloc_len != 0 && retrieved_off.is_none(),
            AttrParams::List {
                get_list_len,
                alloc_len,
                retrieved_off,
                ..
            } => get_list_len != 0 && alloc_len != 0 && retrieved_off.is_none(),
            _ => false,
        };
        if wants_segment {
            return Err(OsdError::InvalidArgument(
                "attribute retrieval without a retrieved offset".into(),
            ));
        }
        let len = own.max(self.params.retrieved_extent());
        if len > limit {
            return Err(OsdError::InvalidArgument(format!(
                "response of {len} bytes exceeds {limit}"
            )));
        }
        usize::try_from(len).map_err(|_| OsdError::OutOfMemory(format!("{len} byte response")))
    }

    /// Retrieval pairs from the get list, for LIST in attribute mode.
    fn list_pairs(&self) -> Result<Vec<(u32, u32)>, OsdError> {
        match self.params {
            AttrParams::List {
                get_list_len,
                get_list_off,
                ..
            } if get_list_len != 0 => attr::parse_get_list(slice_of(
                self.data_out,
                get_list_off,
                u64::from(get_list_len),
                "get list",
            )?),
            _ => Ok(Vec::new()),
        }
    }

    fn write_data(&self) -> Result<&[u8], OsdError> {
        slice_of(self.data_out, Some(0), self.cdb.length(), "write data")
    }

    /// Commands that only read. Also reached from the write path when
    /// such a command carries sets.
    fn inspect<V: StoreView + ?Sized>(
        &self,
        view: &V,
        env: &Env<'_>,
        ccap: &mut CurrentCommand,
        out: &mut [u8],
    ) -> Result<(Done, AttrTarget), OsdError> {
        use ServiceAction::*;
        let (pid, oid) = (self.pid(), self.oid());
        match self.action {
            Read => {
                expect_type(view, pid, oid, ObjectType::UserObject)?;
                let len = usize::try_from(self.cdb.length())
                    .map_err(|_| OsdError::InvalidArgument("read length".into()))?;
                let dst = out
                    .get_mut(..len)
                    .ok_or_else(|| OsdError::InvalidArgument("read length".into()))?;
                let r = env.files.read(pid, oid, dst, self.cdb.offset())?;
                ccap.record(ObjectType::UserObject, pid, oid);
                debug!(target: "dispatch", pid, oid, read = r.read, past_end = r.past_end, "read");
                // The zero-filled tail past the end counts as produced.
                let done = Done {
                    used: len,
                    past_end: r.past_end.then_some(r.read as u64),
                    ..Done::default()
                };
                Ok((done, AttrTarget::Object(pid, oid)))
            }
            GetAttributes => {
                let ty = existing(view, pid, oid)?;
                ccap.record(ty, pid, oid);
                Ok((Done::default(), AttrTarget::Object(pid, oid)))
            }
            List => {
                let initial = self.cdb.initial_oid();
                let ids = if pid == ROOT_PID {
                    ccap.record(ObjectType::Root, ROOT_PID, ROOT_OID);
                    view.list_partitions(initial.max(PARTITION_PID_LB))?
                } else {
                    expect_type(view, pid, PARTITION_OID, ObjectType::Partition)?;
                    ccap.record(ObjectType::Partition, pid, PARTITION_OID);
                    view.list_objects(pid, initial, ObjectFilter::All)?
                };
                let done = self.emit_list(view, env, ccap, out, &ids, |id| {
                    if pid == ROOT_PID {
                        (id, PARTITION_OID)
                    } else {
                        (pid, id)
                    }
                })?;
                Ok((done, AttrTarget::None))
            }
            ListCollection => {
                let cid = oid;
                let initial = self.cdb.initial_oid();
                expect_type(view, pid, PARTITION_OID, ObjectType::Partition)?;
                let ids = if cid == 0 {
                    ccap.record(ObjectType::Partition, pid, PARTITION_OID);
                    view.list_objects(pid, initial, ObjectFilter::Collections)?
                } else {
                    expect_type(view, pid, cid, ObjectType::Collection)?;
                    ccap.record(ObjectType::Collection, pid, cid);
                    view.collection_members(pid, cid, initial)?
                };
                let done = self.emit_list(view, env, ccap, out, &ids, |id| (pid, id))?;
                let target = if self.cdb.list_attr() {
                    AttrTarget::None
                } else {
                    AttrTarget::Object(pid, cid)
                };
                Ok((done, target))
            }
            Query => {
                let cid = oid;
                let list = slice_of(
                    self.data_out,
                    Some(0),
                    u64::from(self.cdb.query_list_len()),
                    "query list",
                )?;
                let plan = query::parse_query_list(list, pid, cid)?;
                let alloc = usize::try_from(self.cdb.alloc_len()).unwrap_or(usize::MAX);
                let dst = out.get_mut(..alloc.min(out.len())).unwrap_or_default();
                let used = query::run(view, &plan, dst)?;
                ccap.record(ObjectType::Collection, pid, cid);
                let done = Done {
                    used,
                    ..Done::default()
                };
                Ok((done, AttrTarget::Object(pid, cid)))
            }
            other => Err(OsdError::InvalidArgument(format!(
                "{} is not a read-only command",
                other.name()
            ))),
        }
    }

    fn emit_list<V: StoreView + ?Sized>(
        &self,
        view: &V,
        env: &Env<'_>,
        ccap: &CurrentCommand,
        out: &mut [u8],
        ids: &[u64],
        address: impl Fn(u64) -> (u64, u64),
    ) -> Result<Done, OsdError> {
        let list_id = self.cdb.list_id();
        let alloc = usize::try_from(self.cdb.alloc_len()).unwrap_or(usize::MAX);
        let dst = out.get_mut(..alloc.min(out.len())).unwrap_or_default();
        let outcome = if self.cdb.list_attr() {
            let pairs = self.list_pairs()?;
            let ctx = env.ctx(ccap);
            list::list_with_attrs(dst, ids, list_id, |id| {
                let (pid, oid) = address(id);
                let mut all: Vec<Selected> = Vec::new();
                for &(page, number) in &pairs {
                    all.extend(attr::select_for_list(view, &ctx, pid, oid, page, number)?);
                }
                Ok(all)
            })?
        } else {
            list::list_ids(dst, ids, list_id)
        };
        debug!(
            target: "dispatch",
            ids = ids.len(),
            cont_id = outcome.cont_id,
            written = outcome.written,
            "list"
        );
        Ok(Done {
            used: outcome.written,
            list: Some((list_id, outcome.cont_id)),
            ..Done::default()
        })
    }

    /// Commands that change the catalog, attributes or data.
    fn modify<W: CatalogWrite + ?Sized>(
        &self,
        w: &W,
        env: &Env<'_>,
        ccap: &mut CurrentCommand,
        journal: &mut FileJournal,
    ) -> Result<(Done, AttrTarget), OsdError> {
        use ServiceAction::*;
        let (pid, oid) = (self.pid(), self.oid());
        let files = env.files;
        let mut done = Done::default();
        let target = match self.action {
            Format => {
                w.wipe()?;
                init_root(w)?;
                journal.format = true;
                ccap.record(ObjectType::Root, ROOT_PID, ROOT_OID);
                info!(target: "dispatch", capacity = self.cdb.capacity(), "formatted");
                AttrTarget::Object(ROOT_PID, ROOT_OID)
            }
            CreatePartition => {
                let pid = create_partition(w, pid)?;
                ccap.record(ObjectType::Partition, pid, PARTITION_OID);
                info!(target: "dispatch", pid, "partition created");
                AttrTarget::Object(pid, PARTITION_OID)
            }
            RemovePartition => {
                expect_type(w, pid, PARTITION_OID, ObjectType::Partition)?;
                if !w.partition_is_empty(pid)? {
                    return Err(OsdError::NotEmpty { pid, oid: PARTITION_OID });
                }
                w.remove_object(pid, PARTITION_OID)?;
                ccap.record(ObjectType::Partition, pid, PARTITION_OID);
                info!(target: "dispatch", pid, "partition removed");
                AttrTarget::Object(ROOT_PID, ROOT_OID)
            }
            Create => {
                expect_type(w, pid, PARTITION_OID, ObjectType::Partition)?;
                let count = self.cdb.numoid().max(1);
                if count > 1 {
                    if oid != 0 {
                        return Err(OsdError::InvalidArgument(
                            "multi-object create with a requested id".into(),
                        ));
                    }
                    if self.params.has_set() {
                        return Err(OsdError::InvalidArgument(
                            "attribute sets during multi-object create".into(),
                        ));
                    }
                }
                let mut created = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    let new = create_in_partition(w, pid, oid, ObjectType::UserObject)?;
                    files.create(pid, new)?;
                    journal.created.push((pid, new));
                    created.push(new);
                }
                let last = created.last().copied().unwrap_or_default();
                ccap.record(ObjectType::UserObject, pid, last);
                debug!(target: "dispatch", pid, count, last, "user objects created");
                if count > 1 {
                    AttrTarget::Created(pid, created)
                } else {
                    AttrTarget::Object(pid, last)
                }
            }
            CreateAndWrite => {
                expect_type(w, pid, PARTITION_OID, ObjectType::Partition)?;
                let data = self.write_data()?;
                let new = create_in_partition(w, pid, oid, ObjectType::UserObject)?;
                files.create(pid, new)?;
                journal.created.push((pid, new));
                files.write(pid, new, data, self.cdb.offset())?;
                ccap.record(ObjectType::UserObject, pid, new);
                AttrTarget::Object(pid, new)
            }
            Remove => {
                expect_type(w, pid, oid, ObjectType::UserObject)?;
                w.remove_object(pid, oid)?;
                journal.doomed.push((pid, oid));
                ccap.record(ObjectType::UserObject, pid, oid);
                AttrTarget::Object(pid, PARTITION_OID)
            }
            Write | Append | Clear | Punch | Flush => {
                expect_type(w, pid, oid, ObjectType::UserObject)?;
                let (len, off) = (self.cdb.length(), self.cdb.offset());
                match self.action {
                    Write => files.write(pid, oid, self.write_data()?, off)?,
                    Append => ccap.append_offset = files.append(pid, oid, self.write_data()?)?,
                    Clear => files.clear(pid, oid, off, len)?,
                    Punch => files.punch(pid, oid, off, len)?,
                    _ if env.config.sync_data => files.sync(pid, oid)?,
                    _ => {}
                }
                ccap.record(ObjectType::UserObject, pid, oid);
                AttrTarget::Object(pid, oid)
            }
            CreateCollection => {
                expect_type(w, pid, PARTITION_OID, ObjectType::Partition)?;
                let cid = create_in_partition(w, pid, oid, ObjectType::Collection)?;
                ccap.record(ObjectType::Collection, pid, cid);
                AttrTarget::Object(pid, cid)
            }
            RemoveCollection => {
                expect_type(w, pid, oid, ObjectType::Collection)?;
                if !self.cdb.force_remove() && !w.collection_is_empty(pid, oid)? {
                    return Err(OsdError::NotEmpty { pid, oid });
                }
                w.remove_object(pid, oid)?;
                ccap.record(ObjectType::Collection, pid, oid);
                AttrTarget::Object(pid, PARTITION_OID)
            }
            RemoveMemberObjects => {
                expect_type(w, pid, oid, ObjectType::Collection)?;
                let members = w.collection_members(pid, oid, 0)?;
                let mut removed = 0u64;
                for &member in &members {
                    if w.object_type(pid, member)? == ObjectType::UserObject {
                        w.remove_object(pid, member)?;
                        journal.doomed.push((pid, member));
                        removed += 1;
                    }
                }
                done.tracked = Some((members.len() as u64, removed));
                ccap.record(ObjectType::Collection, pid, oid);
                debug!(target: "dispatch", pid, cid = oid, removed, "member objects removed");
                AttrTarget::Object(pid, PARTITION_OID)
            }
            FlushCollection => {
                expect_type(w, pid, oid, ObjectType::Collection)?;
                ccap.record(ObjectType::Collection, pid, oid);
                AttrTarget::Object(pid, oid)
            }
            FlushPartition => {
                expect_type(w, pid, PARTITION_OID, ObjectType::Partition)?;
                ccap.record(ObjectType::Partition, pid, PARTITION_OID);
                AttrTarget::Object(pid, PARTITION_OID)
            }
            FlushOsd => {
                ccap.record(ObjectType::Root, ROOT_PID, ROOT_OID);
                AttrTarget::Object(ROOT_PID, ROOT_OID)
            }
            SetAttributes => {
                let ty = existing(w, pid, oid)?;
                ccap.record(ty, pid, oid);
                AttrTarget::Object(pid, oid)
            }
            SetMemberAttributes => {
                expect_type(w, pid, oid, ObjectType::Collection)?;
                let members = w.collection_members(pid, oid, 0)?.len() as u64;
                done.tracked = Some((members, 0));
                ccap.record(ObjectType::Collection, pid, oid);
                AttrTarget::Members(pid, oid)
            }
            SetKey | SetMasterKey | GetMemberAttributes | PerformScsiCommand
            | PerformTaskMgmt => return Err(OsdError::Unimplemented(self.action.name())),
            Read | GetAttributes | List | ListCollection | Query => {
                return Err(OsdError::InvalidArgument(format!(
                    "{} is not a modifying command",
                    self.action.name()
                )))
            }
        };
        Ok((done, target))
    }

    /// Returns how many objects received the sets.
    fn apply_sets<W: CatalogWrite + ?Sized>(
        &self,
        w: &W,
        env: &Env<'_>,
        ccap: &CurrentCommand,
        target: &AttrTarget,
    ) -> Result<usize, OsdError> {
        let objects: Vec<(u64, u64)> = match target {
            AttrTarget::Object(pid, oid) => vec![(*pid, *oid)],
            AttrTarget::Members(pid, cid) => w
                .collection_members(*pid, *cid, 0)?
                .into_iter()
                .map(|m| (*pid, m))
                .collect(),
            AttrTarget::None | AttrTarget::Created(..) => return Ok(0),
        };
        let count = objects.len();
        let ctx = env.ctx(ccap);
        match self.params {
            AttrParams::Field {
                page,
                number,
                value,
            } => {
                for (pid, oid) in objects {
                    attr::set_attr(w, &ctx, pid, oid, page, number, value)?;
                }
            }
            AttrParams::Page {
                set_page,
                set_number,
                set_len,
                set_off,
                ..
            } if set_page != 0 => {
                let value = slice_of(self.data_out, set_off, u64::from(set_len), "set value")?;
                for (pid, oid) in objects {
                    attr::set_attr(w, &ctx, pid, oid, set_page, set_number, value)?;
                }
            }
            AttrParams::List {
                set_list_len,
                set_list_off,
                ..
            } if set_list_len != 0 => {
                let list = slice_of(self.data_out, set_list_off, u64::from(set_list_len), "set list")?;
                for (pid, oid) in objects {
                    attr::set_list(w, &ctx, list, pid, oid)?;
                }
            }
            _ => return Ok(0),
        }
        Ok(count)
    }

    fn apply_gets<V: StoreView + ?Sized>(
        &self,
        view: &V,
        env: &Env<'_>,
        ccap: &CurrentCommand,
        target: &AttrTarget,
        out: &mut [u8],
    ) -> Result<usize, OsdError> {
        let (pid, oids, multi) = match target {
            AttrTarget::None => return Ok(0),
            AttrTarget::Object(pid, oid) | AttrTarget::Members(pid, oid) => (*pid, vec![*oid], false),
            AttrTarget::Created(pid, oids) => (*pid, oids.clone(), true),
        };
        let ctx = env.ctx(ccap);
        let only_ccap = |page: u32| {
            if multi && page != CUR_CMD_ATTR_PG {
                Err(OsdError::InvalidArgument(
                    "multi-object create retrieves only the current command page".into(),
                ))
            } else {
                Ok(())
            }
        };
        match self.params {
            AttrParams::Page {
                get_page,
                alloc_len,
                retrieved_off: Some(off),
                ..
            } if get_page != 0 && alloc_len != 0 => {
                only_ccap(get_page)?;
                let seg = segment(out, off, u64::from(alloc_len))?;
                let oid = oids.last().copied().unwrap_or_default();
                let used = attr::get_page(view, &ctx, seg, pid, oid, get_page)?;
                Ok(retrieved_end(off, used))
            }
            AttrParams::List {
                get_list_len,
                get_list_off,
                alloc_len,
                retrieved_off: Some(off),
                ..
            } if get_list_len != 0 && alloc_len != 0 => {
                let list = slice_of(self.data_out, get_list_off, u64::from(get_list_len), "get list")?;
                let pairs = attr::parse_get_list(list)?;
                for &(page, _) in &pairs {
                    only_ccap(page)?;
                }
                let seg = segment(out, off, u64::from(alloc_len))?;
                let used = attr::get_list(view, &ctx, seg, &pairs, pid, &oids, multi)?;
                Ok(retrieved_end(off, used))
            }
            _ => Ok(0),
        }
    }
}

impl Target {
    /// Executes one command descriptor block with its data-out buffer.
    pub fn execute(&mut self, raw: &[u8], data_out: &[u8]) -> Response {
        let cdb = match Cdb::new(raw) {
            Ok(cdb) if cdb.opcode() == VARLEN_CDB => cdb,
            _ => {
                warn!(target: "dispatch", len = raw.len(), opcode = raw.first().copied(), "bad opcode");
                return Response::check(
                    Vec::new(),
                    sense::header_only(SenseKey::IllegalRequest, asc::INVALID_COMMAND_OPERATION_CODE),
                );
            }
        };
        if cdb.additional_len() != OSD_ADDITIONAL_CDB_LEN {
            warn!(target: "dispatch", additional = cdb.additional_len(), "bad CDB length marker");
            return Response::check(
                Vec::new(),
                sense::header_only(SenseKey::IllegalRequest, asc::INVALID_FIELD_IN_CDB),
            );
        }

        let (pid, oid) = (cdb.pid(), cdb.oid());
        let Some(action) = cdb.action() else {
            warn!(target: "dispatch", code = cdb.action_code(), pid, oid, "unknown service action");
            command_metrics().inc_command_sense("unknown", SenseKey::IllegalRequest.as_str());
            return Response::check(
                Vec::new(),
                sense::basic(
                    SenseKey::IllegalRequest,
                    asc::INVALID_COMMAND_OPERATION_CODE,
                    pid,
                    oid,
                ),
            );
        };

        let _timer = Timer::new(command_metrics(), action.name());
        command_metrics().inc_data_bytes("out", data_out.len() as u64);
        debug!(
            target: "dispatch",
            action = action.name(),
            pid,
            oid,
            cdb = %hex::encode(raw.get(..32).unwrap_or_default()),
            "command"
        );
        self.ccap.reset();

        let result = cdb.attr_params().and_then(|params| {
            self.run(&Command {
                cdb,
                action,
                params,
                data_out,
            })
        });

        match result {
            Ok((data, done)) => {
                command_metrics().inc_data_bytes("in", data.len() as u64);
                match done.past_end {
                    Some(read) => {
                        command_metrics()
                            .inc_command_sense(action.name(), SenseKey::RecoveredError.as_str());
                        let sense = sense::with_csi(
                            SenseKey::RecoveredError,
                            asc::READ_PAST_END_OF_USER_OBJECT,
                            pid,
                            oid,
                            read,
                        );
                        Response::check(data, sense)
                    }
                    None => Response::good(data),
                }
            }
            Err(e) => {
                let (key, code) = sense::classify(&e);
                warn!(
                    target: "dispatch",
                    action = action.name(),
                    pid,
                    oid,
                    error = %e,
                    code = e.code(),
                    "command failed"
                );
                error_metrics().inc_error("command", e.code());
                command_metrics().inc_command_sense(action.name(), key.as_str());
                let sense = sense::basic(key, code, pid, oid);
                if tracking::is_tracked(action) {
                    self.tracking.fail(pid, oid, &sense);
                }
                Response::check(Vec::new(), sense)
            }
        }
    }

    fn run(&mut self, cmd: &Command<'_>) -> Result<(Vec<u8>, Done), OsdError> {
        use ServiceAction::*;
        if matches!(
            cmd.action,
            SetKey | SetMasterKey | GetMemberAttributes | PerformScsiCommand | PerformTaskMgmt
        ) {
            return Err(OsdError::Unimplemented(cmd.action.name()));
        }
        let outlen = cmd.outlen(self.config.max_cdb_data_len)?;
        if matches!(cmd.action, List | ListCollection) {
            self.lists.check(cmd.cdb.list_id())?;
        }

        let Target {
            config,
            db_path,
            store,
            files,
            ccap,
            lists,
            tracking,
        } = self;
        let (pid, oid) = (cmd.pid(), cmd.oid());
        if tracking::is_tracked(cmd.action) {
            tracking.begin(pid, oid, cmd.action);
        }
        let env = Env {
            files,
            tracking,
            config,
            db_path,
        };

        let (mut out, done, gets_end) = if cmd.is_read_only() {
            store.read(|view| -> Result<_, OsdError> {
                let mut out = alloc(outlen)?;
                let (done, target) = cmd.inspect(view, &env, ccap, &mut out)?;
                let gets_end = cmd.apply_gets(view, &env, ccap, &target, &mut out)?;
                Ok((out, done, gets_end))
            })?
        } else {
            let mut journal = FileJournal::default();
            let result = store.write(|w| -> Result<_, OsdError> {
                let mut out = alloc(outlen)?;
                let (mut done, target) = match cmd.action {
                    Read | GetAttributes | List | ListCollection | Query => {
                        cmd.inspect(w, &env, ccap, &mut out)?
                    }
                    _ => cmd.modify(w, &env, ccap, &mut journal)?,
                };
                let set_on = cmd.apply_sets(w, &env, ccap, &target)?;
                if cmd.action == SetMemberAttributes {
                    if let Some((_, processed)) = done.tracked.as_mut() {
                        *processed = set_on as u64;
                    }
                }
                let gets_end = cmd.apply_gets(w, &env, ccap, &target, &mut out)?;
                Ok((out, done, gets_end))
            });
            match result {
                Ok(v) => {
                    journal.commit(files);
                    v
                }
                Err(e) => {
                    journal.rollback(files);
                    return Err(e);
                }
            }
        };

        if let Some((requested, cont_id)) = done.list {
            let id = lists.settle(requested, cont_id);
            list::patch_list_id(&mut out, id);
        }
        out.truncate(done.used.max(gets_end));
        if let Some((members, processed)) = done.tracked {
            tracking.finish(pid, oid, members, processed);
        }
        match cmd.action {
            Format => {
                lists.clear();
                tracking.clear();
            }
            RemoveCollection => tracking.forget(pid, oid),
            _ => {}
        }
        Ok((out, done))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_allocation() {
        assert_eq!(allocate_id(0, 0x10000, None, false).unwrap(), 0x10000);
        assert_eq!(allocate_id(0, 0x10000, Some(0), false).unwrap(), 0x10000);
        assert_eq!(allocate_id(0, 0x10000, Some(0x10004), false).unwrap(), 0x10005);
        assert_eq!(allocate_id(0x20000, 0x10000, Some(0x10004), false).unwrap(), 0x20000);
        assert!(allocate_id(0x42, 0x10000, None, false).is_err());
        assert!(allocate_id(0x10001, 0x10000, None, true).is_err());
        assert!(allocate_id(0, 0x10000, Some(u64::MAX), false).is_err());
    }

    #[test]
    fn data_out_slices_are_checked() {
        let data = [1u8, 2, 3, 4];
        assert_eq!(slice_of(&data, Some(1), 2, "x").unwrap(), &[2, 3]);
        assert!(matches!(
            slice_of(&data, Some(3), 2, "x"),
            Err(OsdError::ParameterListLength(_))
        ));
        assert!(slice_of(&data, None, 1, "x").is_err());
        assert!(slice_of(&data, Some(u64::MAX), 1, "x").is_err());
    }

    #[test]
    fn journal_rollback_removes_created_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = ObjectFiles::open(dir.path()).unwrap();
        files.create(1, 2).unwrap();
        let journal = FileJournal {
            created: vec![(1, 2)],
            ..FileJournal::default()
        };
        journal.rollback(&files);
        assert!(files.len(1, 2).is_err());
    }
}
