// Path: crates/osd-target/tests/common/mod.rs
#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use osd_target::bytes::get_u64;
use osd_target::list_entry::{pack_attr, read_list_header, EntryFormat, Entries, ListEntry};
use osd_target::sense::SenseInfo;
use osd_target::{CdbBuilder, Response, ServiceAction, Target};
use osd_types::config::TargetConfig;
use osd_types::consts::*;
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub target: Target,
}

impl Harness {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let target = Target::open(TargetConfig::new(dir.path().join("osd")))?;
        Ok(Self { dir, target })
    }

    pub fn with_config(edit: impl FnOnce(&mut TargetConfig)) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let mut cfg = TargetConfig::new(dir.path().join("osd"));
        edit(&mut cfg);
        let target = Target::open(cfg)?;
        Ok(Self { dir, target })
    }

    pub fn exec(&mut self, cdb: CdbBuilder, data_out: &[u8]) -> Response {
        self.target.execute(&cdb.build(), data_out)
    }

    /// Runs a command that must succeed and returns its data-in.
    pub fn ok(&mut self, cdb: CdbBuilder, data_out: &[u8]) -> Result<Vec<u8>> {
        let r = self.exec(cdb, data_out);
        if !r.is_good() {
            bail!("command failed with sense {:?}", r.sense_info());
        }
        Ok(r.data)
    }

    /// Runs a command that must fail and returns `(key, asc/ascq)`.
    pub fn fails(&mut self, cdb: CdbBuilder, data_out: &[u8]) -> Result<(u8, u16)> {
        let r = self.exec(cdb, data_out);
        if r.is_good() {
            bail!("command unexpectedly succeeded");
        }
        let info = r.sense_info().ok_or_else(|| anyhow!("no sense data"))?;
        Ok((info.key, info.code))
    }

    pub fn create_partition(&mut self) -> Result<u64> {
        self.ok(CdbBuilder::new(ServiceAction::CreatePartition), &[])?;
        Ok(self.target.current_command().pid)
    }

    pub fn create_object(&mut self, pid: u64) -> Result<u64> {
        self.ok(CdbBuilder::new(ServiceAction::Create).pid(pid), &[])?;
        Ok(self.target.current_command().oid)
    }

    pub fn create_collection(&mut self, pid: u64) -> Result<u64> {
        self.ok(CdbBuilder::new(ServiceAction::CreateCollection).pid(pid), &[])?;
        Ok(self.target.current_command().oid)
    }

    pub fn set_value(&mut self, pid: u64, oid: u64, page: u32, number: u32, value: &[u8]) -> Result<()> {
        self.ok(
            CdbBuilder::new(ServiceAction::SetAttributes)
                .pid(pid)
                .oid(oid)
                .set_field(page, number, value),
            &[],
        )?;
        Ok(())
    }

    pub fn add_to_collection(&mut self, pid: u64, oid: u64, cid: u64, slot: u32) -> Result<()> {
        self.set_value(pid, oid, USER_COLL_PG, slot, &cid.to_be_bytes())
    }

    /// Retrieves `pairs` from one object through the list format.
    pub fn get_values(&mut self, pid: u64, oid: u64, pairs: &[(u32, u32)]) -> Result<Vec<Owned>> {
        let list = get_list(pairs);
        let data = self.ok(
            CdbBuilder::new(ServiceAction::GetAttributes)
                .pid(pid)
                .oid(oid)
                .get_list(list.len() as u32, 0, 4096, 0),
            &list,
        )?;
        retrieved(&data, false)
    }
}

/// An owned copy of a retrieved entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owned {
    pub oid: Option<u64>,
    pub page: u32,
    pub number: u32,
    pub value: Option<Vec<u8>>,
}

impl From<ListEntry<'_>> for Owned {
    fn from(e: ListEntry<'_>) -> Self {
        Self {
            oid: e.oid,
            page: e.page,
            number: e.number,
            value: e.value.map(<[u8]>::to_vec),
        }
    }
}

/// Decodes a retrieved-attributes list at the start of `data`.
pub fn retrieved(data: &[u8], multi: bool) -> Result<Vec<Owned>> {
    let (_, len) = read_list_header(data)?;
    let body = data
        .get(LIST_HDR_LEN..LIST_HDR_LEN + len)
        .ok_or_else(|| anyhow!("list body past data"))?;
    Entries::new(body, multi)
        .map(|e| Ok(Owned::from(e?)))
        .collect()
}

pub fn get_list(pairs: &[(u32, u32)]) -> Vec<u8> {
    let mut list = vec![RTRV_ATTR_LIST, 0, 0, 0];
    list.extend_from_slice(&((pairs.len() * RTRV_ATTR_ENTRY_LEN) as u32).to_be_bytes());
    for (page, number) in pairs {
        list.extend_from_slice(&page.to_be_bytes());
        list.extend_from_slice(&number.to_be_bytes());
    }
    list
}

pub fn set_list(values: &[(u32, u32, &[u8])]) -> Vec<u8> {
    let mut list = vec![0u8; LIST_HDR_LEN];
    for (page, number, value) in values {
        let mut entry = vec![0u8; LE_VAL_OFF + value.len() + 8];
        let n = pack_attr(&mut entry, EntryFormat::Simple, *page, *number, Some(*value))
            .unwrap_or_default();
        list.extend_from_slice(&entry[..n]);
    }
    let len = (list.len() - LIST_HDR_LEN) as u32;
    list[0] = RTRVD_SET_ATTR_LIST;
    list[4..8].copy_from_slice(&len.to_be_bytes());
    list
}

/// Lays out data-out segments at their offsets.
pub fn data_out(parts: &[(usize, &[u8])]) -> Vec<u8> {
    let end = parts.iter().map(|(off, b)| off + b.len()).max().unwrap_or(0);
    let mut out = vec![0u8; end];
    for (off, bytes) in parts {
        out[*off..off + bytes.len()].copy_from_slice(bytes);
    }
    out
}

/// Ids of a LIST or QUERY result.
pub fn result_ids(data: &[u8]) -> Vec<u64> {
    let total = get_u64(data, 0).map_or(0, |l| l as usize + 8).min(data.len());
    (ML_ODL_OFF..total)
        .step_by(8)
        .filter_map(|at| get_u64(data, at))
        .collect()
}

pub fn sense_of(r: &Response) -> Result<SenseInfo> {
    r.sense_info().ok_or_else(|| anyhow!("no sense data"))
}
