// Path: crates/osd-target/src/tracking.rs

//! Command tracking for collection commands.
//!
//! The last REMOVE MEMBER OBJECTS or SET MEMBER ATTRIBUTES run against a
//! collection is remembered in memory and served as the collection's
//! command tracking page. Only the most recent collections are kept; the
//! oldest record is dropped when a new collection needs room.

use crate::cdb::ServiceAction;
use crate::target::Status;
use crate::vpage::CommandTracking;
use osd_types::consts::MAX_TRACKED_COLLECTIONS;
use std::collections::VecDeque;

/// Whether a service action reports progress on its collection.
pub fn is_tracked(action: ServiceAction) -> bool {
    matches!(
        action,
        ServiceAction::RemoveMemberObjects | ServiceAction::SetMemberAttributes
    )
}

/// Tracking records keyed by `(pid, cid)`, oldest first.
#[derive(Debug, Default)]
pub struct CommandTracker {
    records: VecDeque<((u64, u64), CommandTracking)>,
}

impl CommandTracker {
    pub fn find(&self, pid: u64, cid: u64) -> Option<&CommandTracking> {
        self.records
            .iter()
            .find(|(key, _)| *key == (pid, cid))
            .map(|(_, record)| record)
    }

    fn find_mut(&mut self, pid: u64, cid: u64) -> Option<&mut CommandTracking> {
        self.records
            .iter_mut()
            .find(|(key, _)| *key == (pid, cid))
            .map(|(_, record)| record)
    }

    /// Starts a fresh record for the collection, replacing its previous one.
    pub fn begin(&mut self, pid: u64, cid: u64, action: ServiceAction) {
        self.forget(pid, cid);
        if self.records.len() >= MAX_TRACKED_COLLECTIONS {
            if let Some(((p, c), _)) = self.records.pop_front() {
                tracing::debug!(target: "tracking", pid = p, cid = c, "tracking record evicted");
            }
        }
        self.records
            .push_back(((pid, cid), CommandTracking::started(action.code())));
    }

    /// Ends a running command that completed.
    pub fn finish(&mut self, pid: u64, cid: u64, members: u64, processed: u64) {
        if let Some(r) = self.find_mut(pid, cid).filter(|r| r.is_active()) {
            r.status = u16::from(Status::Good.code());
            r.percent_complete = 100;
            r.members = members;
            r.processed = processed;
        }
    }

    /// Ends a running command that failed. Its effects were rolled back, so
    /// nothing counts as processed.
    pub fn fail(&mut self, pid: u64, cid: u64, sense: &[u8]) {
        if let Some(r) = self.find_mut(pid, cid).filter(|r| r.is_active()) {
            r.status = u16::from(Status::CheckCondition.code());
            r.sense = sense.to_vec();
        }
    }

    pub fn forget(&mut self, pid: u64, cid: u64) {
        self.records.retain(|(key, _)| *key != (pid, cid));
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_finish_and_fail() {
        let mut t = CommandTracker::default();
        t.begin(1, 2, ServiceAction::RemoveMemberObjects);
        assert!(t.find(1, 2).unwrap().is_active());

        t.finish(1, 2, 4, 3);
        let r = t.find(1, 2).unwrap();
        assert_eq!((r.status, r.percent_complete, r.members, r.processed), (0, 100, 4, 3));

        // An ended record is not touched again.
        t.fail(1, 2, b"sense");
        assert!(t.find(1, 2).unwrap().sense.is_empty());

        t.begin(1, 2, ServiceAction::SetMemberAttributes);
        t.fail(1, 2, b"sense");
        let r = t.find(1, 2).unwrap();
        assert_eq!(r.status, 2);
        assert_eq!(r.sense, b"sense");
        assert_eq!(r.action, ServiceAction::SetMemberAttributes.code());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn oldest_collection_is_evicted() {
        let mut t = CommandTracker::default();
        for cid in 0..MAX_TRACKED_COLLECTIONS as u64 + 1 {
            t.begin(1, cid, ServiceAction::RemoveMemberObjects);
        }
        assert_eq!(t.len(), MAX_TRACKED_COLLECTIONS);
        assert!(t.find(1, 0).is_none());
        assert!(t.find(1, 1).is_some());

        // Restarting a collection moves it to the back.
        t.begin(1, 1, ServiceAction::RemoveMemberObjects);
        t.begin(1, 99, ServiceAction::RemoveMemberObjects);
        assert!(t.find(1, 1).is_some());
        assert!(t.find(1, 2).is_none());

        t.clear();
        assert!(t.is_empty());
    }

    #[test]
    fn only_collection_commands_are_tracked() {
        assert!(is_tracked(ServiceAction::RemoveMemberObjects));
        assert!(is_tracked(ServiceAction::SetMemberAttributes));
        assert!(!is_tracked(ServiceAction::RemoveCollection));
    }
}
