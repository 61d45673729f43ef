// ── Radio-node state merger ──
//
// Folds one signaling-link snapshot and one spectrum snapshot into a
// record per node, keyed by serial number. A feed that is absent for a
// cycle contributes nothing, so its fields sit at their defaults and the
// view's feed status says they are unknown. The merger remembers the last
// grant each node was seen with, so history stays correct across outages;
// given the same inputs at the same instant it always produces the same
// output.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::history::GrantHistory;
use crate::config::{HistoryRetention, InventoryEntry};
use crate::model::{Grant, LinkEntry, RadioNode, SasEntry, SasState};

/// A feed's contribution to one node.
///
/// Overlays are applied in feed order onto a node that starts from
/// defaults each cycle; a further feed only needs an impl of this trait.
pub trait Overlay {
    fn serial_number(&self) -> &str;
    fn apply(&self, node: &mut RadioNode);
}

impl Overlay for LinkEntry {
    fn serial_number(&self) -> &str {
        &self.serial_number
    }

    fn apply(&self, node: &mut RadioNode) {
        node.link_connected = self.connected;
        node.link_ip = Some(self.ip);
        node.connected_at = self.connected_at;
    }
}

impl Overlay for SasEntry {
    fn serial_number(&self) -> &str {
        &self.serial_number
    }

    fn apply(&self, node: &mut RadioNode) {
        node.sas_state = self.sas_state;
        node.fcc_id.clone_from(&self.fcc_id);
        node.active_grant = select_active(&self.grants).0.cloned();
    }
}

/// Pick the active grant: the authorized grant with the most recent state
/// transition. Earlier candidates win ties. Other authorized grants are
/// returned as demoted.
pub fn select_active(grants: &[Grant]) -> (Option<&Grant>, Vec<&Grant>) {
    let mut winner: Option<&Grant> = None;
    for grant in grants.iter().filter(|g| g.is_active()) {
        match winner {
            Some(best) if grant.state_changed_at <= best.state_changed_at => {}
            _ => winner = Some(grant),
        }
    }

    let demoted = grants
        .iter()
        .filter(|g| g.is_active())
        .filter(|g| !winner.is_some_and(|w| std::ptr::eq(*g, w)))
        .collect();
    (winner, demoted)
}

fn overlay_all<O: Overlay>(nodes: &mut BTreeMap<String, RadioNode>, entries: &[O]) {
    for entry in entries {
        let node = nodes
            .entry(entry.serial_number().to_owned())
            .or_insert_with(|| RadioNode::new(entry.serial_number()));
        entry.apply(node);
    }
}

/// Stateful merger of the two radio feeds.
#[derive(Debug, Clone, Default)]
pub struct RadioMerger {
    inventory: BTreeMap<String, InventoryEntry>,
    retention: HistoryRetention,
    nodes: BTreeMap<String, RadioNode>,
    /// Last active grant reported per node, with the SAS state at the time.
    /// Only updated by cycles that include the spectrum feed.
    observed: BTreeMap<String, (Grant, SasState)>,
}

fn active_grants(nodes: &BTreeMap<String, RadioNode>) -> BTreeMap<String, (Grant, SasState)> {
    nodes
        .iter()
        .filter_map(|(serial, node)| {
            let grant = node.active_grant.clone()?;
            Some((serial.clone(), (grant, node.sas_state)))
        })
        .collect()
}

impl RadioMerger {
    pub fn new(inventory: &[InventoryEntry], retention: HistoryRetention) -> Self {
        Self {
            inventory: inventory
                .iter()
                .map(|e| (e.serial_number.clone(), e.clone()))
                .collect(),
            retention,
            nodes: BTreeMap::new(),
            observed: BTreeMap::new(),
        }
    }

    /// Result of the last merge.
    pub fn nodes(&self) -> &BTreeMap<String, RadioNode> {
        &self.nodes
    }

    /// Resume from previously merged state, e.g. a view saved by an earlier
    /// process. Retained history is pruned on the next merge.
    pub fn restore(&mut self, nodes: BTreeMap<String, RadioNode>) {
        debug!(nodes = nodes.len(), "merger state restored");
        self.observed = active_grants(&nodes);
        self.nodes = nodes;
    }

    /// Forget a node. Inventory nodes are dropped from the inventory too,
    /// so they do not reappear on the next cycle.
    pub fn remove_node(&mut self, serial_number: &str) -> Option<RadioNode> {
        let in_inventory = self.inventory.remove(serial_number);
        let removed = self.nodes.remove(serial_number);
        self.observed.remove(serial_number);
        if removed.is_some() || in_inventory.is_some() {
            debug!(serial_number, "radio node removed");
        }
        removed.or_else(|| in_inventory.map(|e| self.seed(&e.serial_number)))
    }

    /// Merge the latest snapshots. `None` marks a feed that could not be
    /// read this cycle; the fields it owns stay at their defaults.
    pub fn merge(
        &mut self,
        link: Option<&[LinkEntry]>,
        sas: Option<&[SasEntry]>,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, RadioNode> {
        let mut next: BTreeMap<String, RadioNode> = BTreeMap::new();

        if let Some(link) = link {
            overlay_all(&mut next, link);
        }
        if let Some(sas) = sas {
            overlay_all(&mut next, sas);
        }

        // Nodes are never dropped by a merge.
        let known: BTreeSet<&String> = self.nodes.keys().chain(self.inventory.keys()).collect();
        for serial in known {
            next.entry(serial.clone())
                .or_insert_with(|| RadioNode::new(serial.as_str()));
        }

        for (serial, node) in &mut next {
            self.stamp_inventory(node);
            node.grant_history = self
                .nodes
                .get(serial)
                .map(|p| p.grant_history.clone())
                .unwrap_or_default();

            // Without the spectrum feed nothing can be said about grants.
            if sas.is_none() {
                continue;
            }
            if let Some((old, old_state)) = self.observed.get(serial) {
                let unchanged = node.active_grant.as_ref().is_some_and(|g| g.same_as(old));
                if !unchanged {
                    trace!(serial, grant_id = %old.grant_id, "active grant superseded");
                    GrantHistory::new(&mut node.grant_history).push_front(
                        old.clone(),
                        *old_state,
                        now,
                    );
                }
            }
        }

        if let Some(sas) = sas {
            for entry in sas {
                let Some(node) = next.get_mut(&entry.serial_number) else {
                    continue;
                };
                let sas_state = node.sas_state;
                let mut history = GrantHistory::new(&mut node.grant_history);
                for grant in select_active(&entry.grants).1 {
                    if !history.contains(grant) {
                        history.push_front(grant.clone(), sas_state, now);
                    }
                }
            }
            self.observed = active_grants(&next);
        }

        for node in next.values_mut() {
            GrantHistory::new(&mut node.grant_history).prune(self.retention, now);
        }

        debug!(nodes = next.len(), link = link.is_some(), sas = sas.is_some(), "merged radio state");
        self.nodes.clone_from(&next);
        next
    }

    fn stamp_inventory(&self, node: &mut RadioNode) {
        match self.inventory.get(&node.serial_number) {
            Some(entry) => {
                node.managed = true;
                node.name.clone_from(&entry.name);
                node.location.clone_from(&entry.location);
            }
            None => node.managed = false,
        }
    }

    fn seed(&self, serial_number: &str) -> RadioNode {
        let mut node = RadioNode::new(serial_number);
        self.stamp_inventory(&mut node);
        node
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;

    use chrono::{TimeDelta, TimeZone};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{ChannelType, FrequencyRange, GrantState, SasState};

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 14, hour, 0, 0).unwrap()
    }

    fn grant(id: &str, state: GrantState, changed: u32) -> Grant {
        Grant {
            grant_id: id.into(),
            state,
            frequency: Some(FrequencyRange {
                low_mhz: 3550.0,
                high_mhz: 3560.0,
            }),
            channel_type: Some(ChannelType::Pal),
            max_eirp_dbm: Some(30.0),
            expires_at: None,
            state_changed_at: Some(t(changed)),
        }
    }

    fn link(serial: &str) -> LinkEntry {
        LinkEntry {
            serial_number: serial.into(),
            ip: Ipv4Addr::new(10, 48, 0, 159),
            connected: true,
            connected_at: Some(t(9)),
        }
    }

    fn sas(serial: &str, state: SasState, grants: Vec<Grant>) -> SasEntry {
        SasEntry {
            serial_number: serial.into(),
            sas_state: state,
            grants,
            fcc_id: None,
        }
    }

    #[test]
    fn link_and_authorized_grant_merge_into_one_node() {
        let mut merger = RadioMerger::default();
        let g = grant("g-1", GrantState::Authorized, 8);
        let nodes = merger.merge(
            Some(&[link("SN-100")]),
            Some(&[sas("SN-100", SasState::Authorized, vec![g.clone()])]),
            t(10),
        );

        let node = &nodes["SN-100"];
        assert!(node.link_connected);
        assert_eq!(node.sas_state, SasState::Authorized);
        assert_eq!(node.active_grant.as_ref(), Some(&g));
        assert!(node.is_operational());
    }

    #[test]
    fn sas_only_node_is_created_disconnected() {
        let mut merger = RadioMerger::default();
        let nodes = merger.merge(
            Some(&[]),
            Some(&[sas("SN-200", SasState::Registered, vec![])]),
            t(10),
        );
        assert!(!nodes["SN-200"].link_connected);
        assert_eq!(nodes["SN-200"].sas_state, SasState::Registered);
    }

    #[test]
    fn sas_unavailable_defaults_new_nodes() {
        let mut merger = RadioMerger::default();
        let nodes = merger.merge(Some(&[link("SN-100")]), None, t(10));

        let node = &nodes["SN-100"];
        assert!(node.link_connected);
        assert_eq!(node.sas_state, SasState::Unregistered);
        assert_eq!(node.active_grant, None);
    }

    #[test]
    fn sas_outage_defaults_spectrum_fields() {
        let mut merger = RadioMerger::default();
        let g = grant("g-1", GrantState::Authorized, 8);
        merger.merge(
            Some(&[link("SN-100")]),
            Some(&[sas("SN-100", SasState::Authorized, vec![g])]),
            t(10),
        );

        let nodes = merger.merge(Some(&[link("SN-100")]), None, t(11));
        let node = &nodes["SN-100"];
        assert!(node.link_connected);
        assert_eq!(node.sas_state, SasState::Unregistered);
        assert_eq!(node.active_grant, None);
        assert!(node.grant_history.is_empty());
    }

    #[test]
    fn link_outage_defaults_link_fields() {
        let mut merger = RadioMerger::default();
        merger.merge(Some(&[link("SN-100")]), Some(&[]), t(10));

        let nodes = merger.merge(None, Some(&[]), t(11));
        let node = &nodes["SN-100"];
        assert!(!node.link_connected);
        assert_eq!(node.link_ip, None);
    }

    #[test]
    fn grant_is_unchanged_after_outage() {
        let mut merger = RadioMerger::default();
        let g = grant("g-1", GrantState::Authorized, 8);
        let snapshot = [sas("SN-100", SasState::Authorized, vec![g.clone()])];
        merger.merge(None, Some(&snapshot), t(10));
        merger.merge(None, None, t(11));

        let nodes = merger.merge(None, Some(&snapshot), t(12));
        assert_eq!(nodes["SN-100"].active_grant.as_ref(), Some(&g));
        assert!(nodes["SN-100"].grant_history.is_empty());
    }

    #[test]
    fn grant_replaced_during_outage_reaches_history() {
        let mut merger = RadioMerger::default();
        let first = grant("g-1", GrantState::Authorized, 8);
        merger.merge(
            None,
            Some(&[sas("SN-100", SasState::Authorized, vec![first.clone()])]),
            t(10),
        );
        merger.merge(None, None, t(11));

        let nodes = merger.merge(
            None,
            Some(&[sas("SN-100", SasState::Authorized, vec![grant("g-2", GrantState::Authorized, 11)])]),
            t(12),
        );
        let node = &nodes["SN-100"];
        assert_eq!(node.active_grant.as_ref().unwrap().grant_id, "g-2");
        assert_eq!(node.grant_history.len(), 1);
        assert_eq!(node.grant_history[0].grant, first);
    }

    #[test]
    fn link_then_sas_then_new_grant() {
        let mut merger = RadioMerger::default();
        let link_snapshot = [link("SN-100")];

        let nodes = merger.merge(Some(&link_snapshot), Some(&[]), t(10));
        assert!(nodes["SN-100"].link_connected);
        assert_eq!(nodes["SN-100"].sas_state, SasState::Unregistered);

        let pal = grant("g-pal", GrantState::Authorized, 10);
        let nodes = merger.merge(
            Some(&link_snapshot),
            Some(&[sas("SN-100", SasState::Authorized, vec![pal.clone()])]),
            t(11),
        );
        let node = &nodes["SN-100"];
        assert!(node.link_connected);
        assert_eq!(node.sas_state, SasState::Authorized);
        let active = node.active_grant.as_ref().unwrap();
        assert_eq!(
            active.frequency,
            Some(FrequencyRange {
                low_mhz: 3550.0,
                high_mhz: 3560.0,
            })
        );
        assert_eq!(active.channel_type, Some(ChannelType::Pal));
        assert!(node.grant_history.is_empty());

        let next = Grant {
            grant_id: "g-next".into(),
            state_changed_at: Some(t(12)),
            ..pal.clone()
        };
        let nodes = merger.merge(
            Some(&link_snapshot),
            Some(&[sas("SN-100", SasState::Authorized, vec![next.clone()])]),
            t(12),
        );
        let node = &nodes["SN-100"];
        assert_eq!(node.active_grant.as_ref(), Some(&next));
        assert_eq!(node.grant_history[0].grant, pal);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut merger = RadioMerger::default();
        let link_snapshot = [link("SN-100")];
        let sas_snapshot = [sas(
            "SN-100",
            SasState::Authorized,
            vec![
                grant("g-1", GrantState::Authorized, 8),
                grant("g-2", GrantState::Authorized, 9),
            ],
        )];

        let first = merger.merge(Some(&link_snapshot), Some(&sas_snapshot), t(10));
        let second = merger.merge(Some(&link_snapshot), Some(&sas_snapshot), t(10));
        assert_eq!(first, second);
    }

    #[test]
    fn newest_authorized_grant_wins_and_others_are_demoted() {
        let mut merger = RadioMerger::default();
        let nodes = merger.merge(
            None,
            Some(&[sas(
                "SN-100",
                SasState::Authorized,
                vec![
                    grant("g-old", GrantState::Authorized, 8),
                    grant("g-new", GrantState::Authorized, 9),
                    grant("g-idle", GrantState::Granted, 10),
                ],
            )]),
            t(10),
        );

        let node = &nodes["SN-100"];
        assert_eq!(node.active_grant.as_ref().unwrap().grant_id, "g-new");
        let history: Vec<&str> = node
            .grant_history
            .iter()
            .map(|r| r.grant.grant_id.as_str())
            .collect();
        assert_eq!(history, vec!["g-old"]);
    }

    #[test]
    fn grant_change_pushes_previous_into_history() {
        let mut merger = RadioMerger::default();
        let first = grant("g-1", GrantState::Authorized, 8);
        merger.merge(
            None,
            Some(&[sas("SN-100", SasState::Authorized, vec![first.clone()])]),
            t(10),
        );

        let nodes = merger.merge(
            None,
            Some(&[sas(
                "SN-100",
                SasState::Suspended,
                vec![grant("g-1", GrantState::Suspended, 11)],
            )]),
            t(12),
        );

        let node = &nodes["SN-100"];
        assert_eq!(node.active_grant, None);
        assert_eq!(node.grant_history.len(), 1);
        assert_eq!(node.grant_history[0].grant, first);
        assert_eq!(node.grant_history[0].sas_state, SasState::Authorized);
        assert_eq!(node.grant_history[0].superseded_at, t(12));
    }

    #[test]
    fn nodes_absent_from_both_feeds_are_kept() {
        let mut merger = RadioMerger::default();
        merger.merge(
            Some(&[link("SN-100")]),
            Some(&[sas("SN-100", SasState::Registered, vec![])]),
            t(10),
        );

        let nodes = merger.merge(Some(&[]), Some(&[]), t(11));
        let node = &nodes["SN-100"];
        assert!(!node.link_connected);
        assert_eq!(node.sas_state, SasState::Unregistered);
    }

    #[test]
    fn inventory_nodes_appear_before_any_feed() {
        let inventory = [InventoryEntry {
            serial_number: "SN-300".into(),
            name: Some("Rooftop".into()),
            location: Some("Building A".into()),
            ip: None,
        }];
        let mut merger = RadioMerger::new(&inventory, HistoryRetention::default());

        let nodes = merger.merge(None, None, t(10));
        let node = &nodes["SN-300"];
        assert!(node.managed);
        assert_eq!(node.display_name(), "Rooftop");
        assert_eq!(node.location.as_deref(), Some("Building A"));
    }

    #[test]
    fn history_is_pruned_by_age() {
        let mut merger = RadioMerger::new(
            &[],
            HistoryRetention {
                max_age: TimeDelta::hours(1),
                max_entries: 10,
            },
        );
        merger.merge(
            None,
            Some(&[sas("SN-100", SasState::Authorized, vec![grant("g-1", GrantState::Authorized, 8)])]),
            t(9),
        );
        let nodes = merger.merge(None, Some(&[sas("SN-100", SasState::Registered, vec![])]), t(10));
        assert_eq!(nodes["SN-100"].grant_history.len(), 1);

        let nodes = merger.merge(None, Some(&[sas("SN-100", SasState::Registered, vec![])]), t(12));
        assert!(nodes["SN-100"].grant_history.is_empty());
    }

    #[test]
    fn remove_node_forgets_state_and_inventory() {
        let inventory = [InventoryEntry {
            serial_number: "SN-300".into(),
            name: None,
            location: None,
            ip: None,
        }];
        let mut merger = RadioMerger::new(&inventory, HistoryRetention::default());
        merger.merge(Some(&[link("SN-100")]), None, t(10));

        assert!(merger.remove_node("SN-100").is_some());
        assert!(merger.remove_node("SN-300").is_some());
        assert!(merger.remove_node("SN-404").is_none());

        let nodes = merger.merge(None, None, t(11));
        assert!(nodes.is_empty());
    }
}
