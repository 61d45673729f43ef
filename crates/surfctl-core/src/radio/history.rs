use chrono::{DateTime, Utc};

use crate::config::HistoryRetention;
use crate::model::{Grant, GrantRecord, SasState};

/// Most-recent-first grant history with bounded age and length.
pub(crate) struct GrantHistory<'a> {
    records: &'a mut Vec<GrantRecord>,
}

impl<'a> GrantHistory<'a> {
    pub(crate) fn new(records: &'a mut Vec<GrantRecord>) -> Self {
        Self { records }
    }

    pub(crate) fn contains(&self, grant: &Grant) -> bool {
        self.records.iter().any(|r| r.grant.same_as(grant))
    }

    pub(crate) fn push_front(&mut self, grant: Grant, sas_state: SasState, at: DateTime<Utc>) {
        self.records.insert(
            0,
            GrantRecord {
                grant,
                sas_state,
                superseded_at: at,
            },
        );
    }

    pub(crate) fn prune(&mut self, retention: HistoryRetention, now: DateTime<Utc>) {
        let cutoff = now - retention.max_age;
        self.records.retain(|r| r.superseded_at >= cutoff);
        self.records.truncate(retention.max_entries);
    }
}
