// Path: crates/osd-target/src/target.rs

use crate::list::ListRegistry;
use crate::objfile::ObjectFiles;
use crate::sense::SenseInfo;
use crate::tracking::CommandTracker;
use crate::vpage::{CommandTracking, CurrentCommand};
use osd_api::storage::{AttributeWrite, CatalogRead, CatalogWrite};
use osd_storage::RedbObjectStore;
use osd_types::config::TargetConfig;
use osd_types::consts::*;
use osd_types::error::ConfigError;
use osd_types::{ErrorCode, ObjectType, OsdError, StorageError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while bringing a target up.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("target: {0}")]
    Target(#[from] OsdError),
}

impl ErrorCode for OpenError {
    fn code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.code(),
            Self::Storage(e) => e.code(),
            Self::Target(e) => e.code(),
        }
    }
}

/// SCSI status of a completed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Good,
    CheckCondition,
}

impl Status {
    /// SAM status byte.
    pub const fn code(self) -> u8 {
        match self {
            Self::Good => 0x00,
            Self::CheckCondition => 0x02,
        }
    }
}

/// The outcome of one command: data-in and, for check conditions, sense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub data: Vec<u8>,
    pub sense: Vec<u8>,
}

impl Response {
    pub(crate) fn good(data: Vec<u8>) -> Self {
        Self {
            status: Status::Good,
            data,
            sense: Vec::new(),
        }
    }

    pub(crate) fn check(data: Vec<u8>, sense: Vec<u8>) -> Self {
        Self {
            status: Status::CheckCondition,
            data,
            sense,
        }
    }

    pub fn is_good(&self) -> bool {
        self.status == Status::Good
    }

    pub fn sense_info(&self) -> Option<SenseInfo> {
        SenseInfo::parse(&self.sense)
    }
}

/// An object storage target rooted at one directory.
pub struct Target {
    pub(crate) config: TargetConfig,
    pub(crate) db_path: PathBuf,
    pub(crate) store: RedbObjectStore,
    pub(crate) files: ObjectFiles,
    pub(crate) ccap: CurrentCommand,
    pub(crate) lists: ListRegistry,
    pub(crate) tracking: CommandTracker,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("root", &self.config.root)
            .field("open_lists", &self.lists.open_lists())
            .field("tracked_collections", &self.tracking.len())
            .finish()
    }
}

pub(crate) fn page_id(s: &str) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.push(0);
    v
}

/// Records the root object with its information page.
pub(crate) fn init_root<W: CatalogWrite + ?Sized>(w: &W) -> Result<(), StorageError> {
    w.insert_object(ROOT_PID, ROOT_OID, ObjectType::Root)?;
    w.set_attr(
        ROOT_PID,
        ROOT_OID,
        ROOT_INFO_PG,
        ATTRNUM_PAGE_ID,
        &page_id(ROOT_INFO_PAGE_ID),
    )
}

impl Target {
    /// Opens (creating when needed) the directories, the database and the
    /// root object described by `config`.
    pub fn open(config: TargetConfig) -> Result<Self, OpenError> {
        config.validate()?;
        std::fs::create_dir_all(&config.root).map_err(OsdError::from)?;
        let files = ObjectFiles::open(config.data_path())?;
        let db_path = config.db_path();
        let store = RedbObjectStore::open(&db_path)?;
        let created = store.write(|w| -> Result<bool, StorageError> {
            if w.object_type(ROOT_PID, ROOT_OID)? != ObjectType::Illegal {
                return Ok(false);
            }
            init_root(w)?;
            Ok(true)
        })?;
        tracing::info!(
            target: "target",
            root = %config.root.display(),
            fresh = created,
            "object storage target opened"
        );
        Ok(Self {
            config,
            db_path,
            store,
            files,
            ccap: CurrentCommand::default(),
            lists: ListRegistry::default(),
            tracking: CommandTracker::default(),
        })
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    pub fn store(&self) -> &RedbObjectStore {
        &self.store
    }

    pub fn files(&self) -> &ObjectFiles {
        &self.files
    }

    /// What the current command page reports for the last command.
    pub fn current_command(&self) -> &CurrentCommand {
        &self.ccap
    }

    /// The tracking record of the last collection command run on `cid`.
    pub fn command_tracking(&self, pid: u64, cid: u64) -> Option<&CommandTracking> {
        self.tracking.find(pid, cid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osd_api::storage::AttributeRead;

    #[test]
    fn open_creates_root_once() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TargetConfig::new(dir.path().join("osd"));
        let t = Target::open(cfg.clone()).unwrap();
        let id = t
            .store()
            .read(|v| v.get_attr(ROOT_PID, ROOT_OID, ROOT_INFO_PG, ATTRNUM_PAGE_ID))
            .unwrap();
        assert_eq!(id, page_id(ROOT_INFO_PAGE_ID));
        assert!(t.files().root().is_dir());
        drop(t);
        let t = Target::open(cfg).unwrap();
        assert_eq!(
            t.store().read(|v| v.object_type(0, 0)).unwrap(),
            ObjectType::Root
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = TargetConfig::new(dir.path());
        cfg.data_dir.clear();
        let err = Target::open(cfg).unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }
}
