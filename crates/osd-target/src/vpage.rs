// Path: crates/osd-target/src/vpage.rs

//! Attribute pages computed on demand and never stored: the current command
//! page, the user object timestamps page and the collection command
//! tracking page.

use osd_types::consts::*;
use osd_types::{ObjectType, OsdError};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// What the current command page reports about the last executed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentCommand {
    pub object_type: ObjectType,
    pub pid: u64,
    pub oid: u64,
    pub append_offset: u64,
}

impl Default for CurrentCommand {
    fn default() -> Self {
        Self {
            object_type: ObjectType::Illegal,
            pid: 0,
            oid: 0,
            append_offset: 0,
        }
    }
}

impl CurrentCommand {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record(&mut self, object_type: ObjectType, pid: u64, oid: u64) {
        self.object_type = object_type;
        self.pid = pid;
        self.oid = oid;
    }

    /// The same page as seen by one object of a multi-object create.
    pub fn for_object(&self, oid: u64) -> Self {
        Self { oid, ..*self }
    }

    pub fn value(&self, number: u32) -> Option<Vec<u8>> {
        match number {
            CCAP_RICV => Some(vec![0; CCAP_RICV_LEN]),
            CCAP_OBJT => Some(vec![self.object_type.code()]),
            CCAP_PID => Some(self.pid.to_be_bytes().to_vec()),
            CCAP_OID => Some(self.oid.to_be_bytes().to_vec()),
            CCAP_APPADDR => Some(self.append_offset.to_be_bytes().to_vec()),
            _ => None,
        }
    }

    /// Every defined attribute, ascending by number.
    pub fn values(&self) -> Vec<(u32, Vec<u8>)> {
        (CCAP_RICV..=CCAP_APPADDR)
            .filter_map(|n| self.value(n).map(|v| (n, v)))
            .collect()
    }

    /// The page in page-format layout.
    pub fn page_bytes(&self) -> Vec<u8> {
        let mut page = Vec::with_capacity(CCAP_TOTAL_LEN);
        page.extend_from_slice(&CUR_CMD_ATTR_PG.to_be_bytes());
        page.extend_from_slice(&((CCAP_TOTAL_LEN - 8) as u32).to_be_bytes());
        page.extend_from_slice(&[0; CCAP_RICV_LEN]);
        page.push(self.object_type.code());
        page.extend_from_slice(&[0; 3]);
        page.extend_from_slice(&self.pid.to_be_bytes());
        page.extend_from_slice(&self.oid.to_be_bytes());
        page.extend_from_slice(&self.append_offset.to_be_bytes());
        debug_assert_eq!(page.len(), CCAP_TOTAL_LEN);
        page
    }
}

/// Times of a user object, milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamps {
    pub created: u64,
    pub attr_accessed: u64,
    pub attr_modified: u64,
    pub data_accessed: u64,
    pub data_modified: u64,
}

fn millis(t: std::io::Result<SystemTime>) -> u64 {
    t.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Low 48 bits, big-endian.
fn ms6(ms: u64) -> [u8; UTSAP_TIME_LEN] {
    let b = ms.to_be_bytes();
    [b[2], b[3], b[4], b[5], b[6], b[7]]
}

impl Timestamps {
    /// Data times come from the object's data file, attribute times from
    /// the database file.
    pub fn collect(data_file: &Path, db_file: &Path) -> Result<Self, OsdError> {
        let data = std::fs::metadata(data_file)?;
        let db = std::fs::metadata(db_file)?;
        let data_modified = millis(data.modified());
        let created = match millis(data.created()) {
            0 => data_modified,
            t => t,
        };
        Ok(Self {
            created,
            attr_accessed: millis(db.accessed()),
            attr_modified: millis(db.modified()),
            data_accessed: millis(data.accessed()),
            data_modified,
        })
    }

    pub fn value(&self, number: u32) -> Option<Vec<u8>> {
        let ms = match number {
            UTSAP_CTIME => self.created,
            UTSAP_ATTR_ATIME => self.attr_accessed,
            UTSAP_ATTR_MTIME => self.attr_modified,
            UTSAP_DATA_ATIME => self.data_accessed,
            UTSAP_DATA_MTIME => self.data_modified,
            _ => return None,
        };
        Some(ms6(ms).to_vec())
    }

    pub fn values(&self) -> Vec<(u32, Vec<u8>)> {
        (UTSAP_CTIME..=UTSAP_DATA_MTIME)
            .filter_map(|n| self.value(n).map(|v| (n, v)))
            .collect()
    }

    pub fn page_bytes(&self) -> Vec<u8> {
        let mut page = Vec::with_capacity(UTSAP_TOTAL_LEN);
        page.extend_from_slice(&USER_TMSTMP_PG.to_be_bytes());
        page.extend_from_slice(&((UTSAP_TOTAL_LEN - 8) as u32).to_be_bytes());
        for (_, v) in self.values() {
            page.extend_from_slice(&v);
        }
        page
    }
}

/// Progress of the last tracked command on one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTracking {
    /// Service action code of the command.
    pub action: u16,
    /// SAM status once ended, `CTP_STATUS_ACTIVE` while running.
    pub status: u16,
    pub percent_complete: u8,
    pub sense: Vec<u8>,
    pub members: u64,
    pub processed: u64,
}

impl CommandTracking {
    pub fn started(action: u16) -> Self {
        Self {
            action,
            status: CTP_STATUS_ACTIVE,
            percent_complete: 0,
            sense: Vec::new(),
            members: 0,
            processed: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CTP_STATUS_ACTIVE
    }

    /// Attributes of the tracking page. Without a record only the page
    /// identification and an idle active-command status are defined.
    pub fn page_values(record: Option<&Self>) -> Vec<(u32, Vec<u8>)> {
        let mut id = COLL_TRACKING_PAGE_ID.as_bytes().to_vec();
        id.push(0);
        let active = match record {
            Some(r) if r.is_active() => r.action,
            _ => 0,
        };
        let mut values = vec![(ATTRNUM_PAGE_ID, id)];
        if let Some(r) = record {
            values.push((CTP_PERCENT_COMPLETE, vec![r.percent_complete]));
        }
        values.push((CTP_ACTIVE_COMMAND_STATUS, active.to_be_bytes().to_vec()));
        let Some(r) = record else {
            return values;
        };
        values.push((CTP_ENDED_COMMAND_STATUS, r.status.to_be_bytes().to_vec()));
        if !r.sense.is_empty() {
            values.push((CTP_SENSE_DATA, r.sense.clone()));
        }
        values.push((CTP_NUMBER_OF_MEMBERS, r.members.to_be_bytes().to_vec()));
        values.push((CTP_OBJECTS_PROCESSED, r.processed.to_be_bytes().to_vec()));
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ccap_page_layout() {
        let mut cc = CurrentCommand::default();
        cc.record(ObjectType::UserObject, 0x10000, 0x10004);
        cc.append_offset = 4096;
        let page = cc.page_bytes();
        assert_eq!(page.len(), CCAP_TOTAL_LEN);
        assert_eq!(&page[..4], &CUR_CMD_ATTR_PG.to_be_bytes());
        assert_eq!(page[CCAP_OBJT_OFF], 0x80);
        assert_eq!(&page[CCAP_PID_OFF..CCAP_PID_OFF + 8], &0x10000u64.to_be_bytes());
        assert_eq!(&page[CCAP_OID_OFF..CCAP_OID_OFF + 8], &0x10004u64.to_be_bytes());
        assert_eq!(&page[CCAP_APPADDR_OFF..], &4096u64.to_be_bytes());
    }

    #[test]
    fn ccap_values_and_reset() {
        let mut cc = CurrentCommand::default();
        cc.record(ObjectType::Partition, 0x10000, 0);
        assert_eq!(cc.value(CCAP_OBJT), Some(vec![0x02]));
        assert_eq!(cc.value(CCAP_RICV).map(|v| v.len()), Some(CCAP_RICV_LEN));
        assert_eq!(cc.value(9), None);
        assert_eq!(cc.values().len(), 5);
        assert_eq!(cc.for_object(7).oid, 7);
        cc.reset();
        assert_eq!(cc.object_type, ObjectType::Illegal);
    }

    #[test]
    fn timestamps_are_six_bytes() {
        let ts = Timestamps {
            created: 0x0102_0304_0506_0708,
            ..Default::default()
        };
        assert_eq!(
            ts.value(UTSAP_CTIME),
            Some(vec![0x03, 0x04, 0x05, 0x06, 0x07, 0x08])
        );
        let page = ts.page_bytes();
        assert_eq!(page.len(), UTSAP_TOTAL_LEN);
        assert_eq!(&page[UTSAP_CTIME_OFF..UTSAP_CTIME_OFF + 6], &[3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn tracking_page_reflects_command_state() {
        let idle = CommandTracking::page_values(None);
        assert_eq!(
            idle.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            vec![ATTRNUM_PAGE_ID, CTP_ACTIVE_COMMAND_STATUS]
        );
        assert_eq!(idle[1].1, vec![0, 0]);

        let mut t = CommandTracking::started(0x8821);
        let running = CommandTracking::page_values(Some(&t));
        assert!(running.contains(&(CTP_ACTIVE_COMMAND_STATUS, vec![0x88, 0x21])));
        assert!(running.contains(&(CTP_ENDED_COMMAND_STATUS, vec![0xFF, 0xFF])));

        t.status = 0;
        t.percent_complete = 100;
        t.members = 3;
        t.processed = 3;
        let ended = CommandTracking::page_values(Some(&t));
        assert!(ended.contains(&(CTP_ACTIVE_COMMAND_STATUS, vec![0, 0])));
        assert!(ended.contains(&(CTP_PERCENT_COMPLETE, vec![100])));
        assert!(ended.contains(&(CTP_OBJECTS_PROCESSED, 3u64.to_be_bytes().to_vec())));
        assert!(!ended.iter().any(|(n, _)| *n == CTP_SENSE_DATA));
    }

    #[test]
    fn timestamps_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let db = dir.path().join("db");
        std::fs::write(&data, b"x").unwrap();
        std::fs::write(&db, b"y").unwrap();
        let ts = Timestamps::collect(&data, &db).unwrap();
        assert!(ts.data_modified > 0);
        assert!(ts.created > 0);
        assert!(Timestamps::collect(&dir.path().join("missing"), &db).is_err());
    }
}
