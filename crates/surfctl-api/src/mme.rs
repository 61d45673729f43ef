// MME log reader
//
// Open5GS does not expose S1AP association state over an API, so the
// signaling-link feed is reconstructed from the tail of the MME log.
// Three line shapes matter:
//
//   12/04 10:15:32.123: [mme] INFO: eNB-S1 accepted[10.48.0.159]:36412
//   12/04 10:15:32.125: [mme] INFO: eNB-S1[10.48.0.159] max_num_of_ostreams : 10
//   12/04 10:17:01.004: [mme] WARNING: eNB-S1[10.48.0.159] connection refused!!!
//
// UE sessions come from the same tail:
//
//   [emm] INFO: [315010000000010]    Attach request
//   [emm] INFO:     IMSI[315010000000010] ENB_UE_S1AP_ID[167] MME_UE_S1AP_ID[36]
//   [emm] INFO: [315010000000010]    Attach complete
//   [emm] INFO: [315010000000010]    Detach request
//   [mme] INFO: Removed Session: UE IMSI:[315010000000010] APN:[internet]
//   [mme] INFO: [Added] Number of eNB-UEs is now 1
//   [mme] INFO: [Removed] Number of MME-Sessions is now 0

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::Error;

const ACCEPTED_MARKER: &str = "eNB-S1 accepted[";
const LINK_MARKER: &str = "eNB-S1[";
const REFUSED_MARKER: &str = "connection refused";
const STREAMS_MARKER: &str = "max_num_of_ostreams";

const ATTACH_REQUEST: &str = "Attach request";
const ATTACH_COMPLETE: &str = "Attach complete";
const DETACH_REQUEST: &str = "Detach request";
const IMSI_MARKER: &str = "IMSI[";
const ENB_UE_ID_MARKER: &str = "ENB_UE_S1AP_ID[";
const MME_UE_ID_MARKER: &str = "MME_UE_S1AP_ID[";
const SESSION_REMOVED_MARKER: &str = "Removed Session: UE IMSI:[";
const APN_MARKER: &str = "APN:[";
const ENB_UE_COUNT_MARKER: &str = "Number of eNB-UEs is now";
const SESSION_COUNT_MARKER: &str = "Number of MME-Sessions is now";

/// APN reported for a session until the log names another.
pub const DEFAULT_APN: &str = "internet";

/// Length of the `MM/DD HH:MM:SS.mmm` timestamp prefix.
const TIMESTAMP_LEN: usize = 18;

/// An eNodeB currently holding an S1 association with the MME.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S1apConnection {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub connected_at: Option<DateTime<Utc>>,
    pub sctp_streams: Option<u32>,
}

/// A UE that has completed attach and not since detached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeSession {
    pub imsi: String,
    pub apn: String,
    pub enb_ue_s1ap_id: Option<u32>,
    pub mme_ue_s1ap_id: Option<u32>,
    pub attached_at: Option<DateTime<Utc>>,
}

/// Attached UEs plus the MME's own latest counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeSessionReport {
    /// Ordered by IMSI.
    pub sessions: Vec<UeSession>,
    /// Last reported number of UEs with a radio context.
    pub enb_ue_count: u32,
    /// Last reported number of PDN sessions.
    pub session_count: u32,
}

/// Reads the tail of the MME log and reports connected eNodeBs.
#[derive(Debug, Clone)]
pub struct MmeLogReader {
    path: PathBuf,
    tail_lines: usize,
}

impl MmeLogReader {
    pub fn new(path: impl Into<PathBuf>, tail_lines: usize) -> Self {
        Self {
            path: path.into(),
            tail_lines,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the most recent `tail_lines` of the log.
    ///
    /// A missing or unreadable log is an error: the caller cannot tell
    /// "no eNodeBs" apart from "no visibility" otherwise.
    pub async fn connected_enodebs(&self) -> Result<Vec<S1apConnection>, Error> {
        let contents = self.read().await?;
        let connections = parse_s1ap(self.tail(&contents), Utc::now().year());

        debug!(
            path = %self.path.display(),
            connected = connections.len(),
            "parsed MME log"
        );
        Ok(connections)
    }

    /// UEs currently attached according to the log tail.
    pub async fn ue_sessions(&self) -> Result<UeSessionReport, Error> {
        let contents = self.read().await?;
        let report = parse_ue_sessions(self.tail(&contents), Utc::now().year());

        debug!(
            path = %self.path.display(),
            attached = report.sessions.len(),
            sessions = report.session_count,
            "parsed UE sessions"
        );
        Ok(report)
    }

    async fn read(&self) -> Result<String, Error> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::LogUnavailable {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
    }

    fn tail<'a>(&self, contents: &'a str) -> impl Iterator<Item = &'a str> {
        let total = contents.lines().count();
        contents.lines().skip(total.saturating_sub(self.tail_lines))
    }
}

/// Fold log lines into the set of currently connected eNodeBs.
///
/// Later lines win: an accept after a refusal reconnects the address, a
/// refusal after an accept drops it. `year` fills in the year the log
/// timestamps omit.
pub fn parse_s1ap<'a>(lines: impl IntoIterator<Item = &'a str>, year: i32) -> Vec<S1apConnection> {
    let mut connections: BTreeMap<Ipv4Addr, S1apConnection> = BTreeMap::new();
    let mut refused: BTreeSet<Ipv4Addr> = BTreeSet::new();

    for line in lines {
        if let Some((ip, port)) = parse_accepted(line) {
            trace!(%ip, port, "S1 accepted");
            connections.insert(
                ip,
                S1apConnection {
                    ip,
                    port,
                    connected_at: parse_timestamp(line, year),
                    sctp_streams: None,
                },
            );
            refused.remove(&ip);
            continue;
        }

        let Some((ip, rest)) = bracketed(line, LINK_MARKER).and_then(|(ip, rest)| {
            ip.parse::<Ipv4Addr>().ok().map(|ip| (ip, rest.trim_start()))
        }) else {
            continue;
        };

        if rest.starts_with(REFUSED_MARKER) {
            trace!(%ip, "S1 refused");
            refused.insert(ip);
        } else if let Some(streams) = parse_streams(rest) {
            if let Some(conn) = connections.get_mut(&ip) {
                conn.sctp_streams = Some(streams);
            }
        }
    }

    connections
        .into_values()
        .filter(|c| !refused.contains(&c.ip))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attach {
    Requested,
    Complete,
    Detached,
}

struct Tracked {
    session: UeSession,
    state: Attach,
}

/// Fold log lines into the UEs still attached at the end of the tail.
///
/// A UE counts once its attach completes. A detach request or a removed
/// session drops it until the next attach completes. S1AP ids seen on an
/// `IMSI[...]` context line are applied at the UE's next attach event.
pub fn parse_ue_sessions<'a>(
    lines: impl IntoIterator<Item = &'a str>,
    year: i32,
) -> UeSessionReport {
    let mut tracked: BTreeMap<String, Tracked> = BTreeMap::new();
    let mut contexts: BTreeMap<String, (u32, u32)> = BTreeMap::new();
    let mut report = UeSessionReport::default();

    for line in lines {
        if let Some((imsi, ids)) = parse_ue_context(line) {
            contexts.insert(imsi.to_owned(), ids);
        }

        if let Some((imsi, event)) = parse_ue_event(line) {
            let entry = tracked.entry(imsi.to_owned()).or_insert_with(|| Tracked {
                session: UeSession {
                    imsi: imsi.to_owned(),
                    apn: DEFAULT_APN.to_owned(),
                    enb_ue_s1ap_id: None,
                    mme_ue_s1ap_id: None,
                    attached_at: None,
                },
                state: Attach::Requested,
            });
            match event {
                ATTACH_REQUEST => entry.state = Attach::Requested,
                ATTACH_COMPLETE => {
                    entry.state = Attach::Complete;
                    entry.session.attached_at = parse_timestamp(line, year);
                }
                _ => entry.state = Attach::Detached,
            }
            if event != DETACH_REQUEST {
                if let Some(&(enb, mme)) = contexts.get(imsi) {
                    entry.session.enb_ue_s1ap_id = Some(enb);
                    entry.session.mme_ue_s1ap_id = Some(mme);
                }
            }
            trace!(imsi, event, "UE event");
        }

        if let Some((imsi, apn)) = parse_session_removed(line) {
            if let Some(entry) = tracked.get_mut(imsi) {
                apn.clone_into(&mut entry.session.apn);
                entry.state = Attach::Detached;
            }
        }

        if let Some(count) = parse_count(line, ENB_UE_COUNT_MARKER) {
            report.enb_ue_count = count;
        }
        if let Some(count) = parse_count(line, SESSION_COUNT_MARKER) {
            report.session_count = count;
        }
    }

    report.sessions = tracked
        .into_values()
        .filter(|t| t.state == Attach::Complete)
        .map(|t| t.session)
        .collect();
    report
}

/// `[<imsi>]  Attach request` and friends.
fn parse_ue_event(line: &str) -> Option<(&str, &'static str)> {
    let mut rest = line;
    while let Some((inner, after)) = bracketed(rest, "[") {
        if is_imsi(inner) {
            let after = after.trim_start();
            for event in [ATTACH_REQUEST, ATTACH_COMPLETE, DETACH_REQUEST] {
                if after.starts_with(event) {
                    return Some((inner, event));
                }
            }
        }
        rest = after;
    }
    None
}

fn parse_ue_context(line: &str) -> Option<(&str, (u32, u32))> {
    let (imsi, _) = bracketed(line, IMSI_MARKER)?;
    if !is_imsi(imsi) {
        return None;
    }
    let (enb, rest) = bracketed(line, ENB_UE_ID_MARKER)?;
    let (mme, _) = bracketed(rest, MME_UE_ID_MARKER)?;
    Some((imsi, (enb.parse().ok()?, mme.parse().ok()?)))
}

fn parse_session_removed(line: &str) -> Option<(&str, &str)> {
    let (imsi, rest) = bracketed(line, SESSION_REMOVED_MARKER)?;
    let (apn, _) = bracketed(rest, APN_MARKER)?;
    (is_imsi(imsi) && !apn.is_empty()).then_some((imsi, apn))
}

fn parse_count(line: &str, marker: &str) -> Option<u32> {
    let start = line.find(marker)? + marker.len();
    leading_digits(line.get(start..)?.trim_start()).parse().ok()
}

fn is_imsi(s: &str) -> bool {
    s.len() == 15 && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_accepted(line: &str) -> Option<(Ipv4Addr, u16)> {
    let (ip, rest) = bracketed(line, ACCEPTED_MARKER)?;
    let ip = ip.parse().ok()?;
    let port = leading_digits(rest.strip_prefix(':')?).parse().ok()?;
    Some((ip, port))
}

fn parse_streams(rest: &str) -> Option<u32> {
    let value = rest
        .strip_prefix(STREAMS_MARKER)?
        .trim_start()
        .strip_prefix(':')?
        .trim_start();
    leading_digits(value).parse().ok()
}

fn parse_timestamp(line: &str, year: i32) -> Option<DateTime<Utc>> {
    let stamp = line.get(..TIMESTAMP_LEN)?;
    NaiveDateTime::parse_from_str(&format!("{year}/{stamp}"), "%Y/%m/%d %H:%M:%S%.3f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Split `...marker<inner>]<rest>` into `(inner, rest)`.
fn bracketed<'a>(line: &'a str, marker: &str) -> Option<(&'a str, &'a str)> {
    let start = line.find(marker)? + marker.len();
    let tail = line.get(start..)?;
    let end = tail.find(']')?;
    Some((tail.get(..end)?, tail.get(end + 1..)?))
}

fn leading_digits(s: &str) -> &str {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.get(..end).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use pretty_assertions::assert_eq;

    const LOG: &str = "\
12/04 10:15:32.123: [mme] INFO: eNB-S1 accepted[10.48.0.159]:36412 in s1_path module (../src/mme/s1ap-sctp.c:114)
12/04 10:15:32.125: [mme] INFO: eNB-S1[10.48.0.159] max_num_of_ostreams : 10 (../src/mme/mme-sm.c:91)
12/04 10:15:32.126: [mme] INFO: [Added] Number of eNBs is now 1 (../src/mme/mme-context.c:2042)
12/04 10:16:00.000: [mme] INFO: eNB-S1 accepted[10.48.0.160]:36412 in s1_path module
12/04 10:17:01.004: [mme] WARNING: eNB-S1[10.48.0.160] connection refused!!!
";

    #[test]
    fn accepted_link_is_connected_with_streams() {
        let conns = parse_s1ap(LOG.lines(), 2025);
        assert_eq!(conns.len(), 1);

        let conn = &conns[0];
        assert_eq!(conn.ip, Ipv4Addr::new(10, 48, 0, 159));
        assert_eq!(conn.port, 36412);
        assert_eq!(conn.sctp_streams, Some(10));

        let at = conn.connected_at.unwrap();
        assert_eq!(at.year(), 2025);
        assert_eq!((at.hour(), at.minute(), at.second()), (10, 15, 32));
    }

    #[test]
    fn refused_link_is_dropped() {
        let conns = parse_s1ap(LOG.lines(), 2025);
        assert!(conns.iter().all(|c| c.ip != Ipv4Addr::new(10, 48, 0, 160)));
    }

    #[test]
    fn accept_after_refusal_reconnects() {
        let log = format!(
            "{LOG}12/04 10:20:00.000: [mme] INFO: eNB-S1 accepted[10.48.0.160]:36413 in s1_path module\n"
        );
        let conns = parse_s1ap(log.lines(), 2025);
        assert_eq!(conns.len(), 2);
        assert_eq!(conns[1].port, 36413);
    }

    #[test]
    fn garbage_lines_are_ignored() {
        let conns = parse_s1ap(
            ["eNB-S1 accepted[not-an-ip]:1", "eNB-S1[", "", "random noise"],
            2025,
        );
        assert!(conns.is_empty());
    }

    #[test]
    fn missing_timestamp_yields_none() {
        let conns = parse_s1ap(["eNB-S1 accepted[10.0.0.1]:1"], 2025);
        assert_eq!(conns[0].connected_at, None);
    }

    const UE_LOG: &str = "\
12/04 10:20:00.000: [emm] INFO: [315010000000010]    Attach request (../src/mme/emm-sm.c:407)
12/04 10:20:00.010: [emm] INFO:     IMSI[315010000000010] ENB_UE_S1AP_ID[167] MME_UE_S1AP_ID[36] (../src/mme/emm-handler.c:191)
12/04 10:20:00.500: [emm] INFO: [315010000000010]    Attach complete (../src/mme/emm-sm.c:1328)
12/04 10:20:00.501: [mme] INFO: [Added] Number of eNB-UEs is now 2 (../src/mme/mme-context.c:4692)
12/04 10:20:00.502: [mme] INFO: [Added] Number of MME-Sessions is now 2 (../src/mme/mme-context.c:4712)
12/04 10:21:00.000: [emm] INFO: [315010000000011]    Attach request (../src/mme/emm-sm.c:407)
12/04 10:21:00.400: [emm] INFO: [315010000000011]    Attach complete (../src/mme/emm-sm.c:1328)
12/04 10:22:00.000: [emm] INFO: [315010000000012]    Attach request (../src/mme/emm-sm.c:407)
12/04 10:23:00.000: [emm] INFO: [315010000000011]    Detach request (../src/mme/emm-sm.c:466)
12/04 10:23:00.100: [mme] INFO: Removed Session: UE IMSI:[315010000000011] APN:[ims] (../src/mme/mme-context.c:4791)
12/04 10:23:00.101: [mme] INFO: [Removed] Number of MME-Sessions is now 1 (../src/mme/mme-context.c:4790)
";

    #[test]
    fn completed_attach_is_a_session() {
        let report = parse_ue_sessions(UE_LOG.lines(), 2025);
        assert_eq!(report.sessions.len(), 1);

        let session = &report.sessions[0];
        assert_eq!(session.imsi, "315010000000010");
        assert_eq!(session.apn, DEFAULT_APN);
        assert_eq!(session.enb_ue_s1ap_id, Some(167));
        assert_eq!(session.mme_ue_s1ap_id, Some(36));
        let at = session.attached_at.unwrap();
        assert_eq!((at.hour(), at.minute(), at.second()), (10, 20, 0));
    }

    #[test]
    fn pending_and_detached_ues_are_not_sessions() {
        let report = parse_ue_sessions(UE_LOG.lines(), 2025);
        assert!(report.sessions.iter().all(|s| s.imsi != "315010000000011"));
        assert!(report.sessions.iter().all(|s| s.imsi != "315010000000012"));
    }

    #[test]
    fn counters_track_the_latest_report() {
        let report = parse_ue_sessions(UE_LOG.lines(), 2025);
        assert_eq!(report.enb_ue_count, 2);
        assert_eq!(report.session_count, 1);
    }

    #[test]
    fn reattach_after_detach_counts_again() {
        let log = format!(
            "{UE_LOG}12/04 10:30:00.000: [emm] INFO: [315010000000011]    Attach request\n\
             12/04 10:30:00.300: [emm] INFO: [315010000000011]    Attach complete\n"
        );
        let report = parse_ue_sessions(log.lines(), 2025);
        let imsis: Vec<&str> = report.sessions.iter().map(|s| s.imsi.as_str()).collect();
        assert_eq!(imsis, ["315010000000010", "315010000000011"]);
        // the APN from the removed session sticks to the UE
        assert_eq!(report.sessions[1].apn, "ims");
    }

    #[test]
    fn short_bracketed_numbers_are_not_imsis() {
        let report = parse_ue_sessions(
            [
                "[12345]    Attach complete",
                "IMSI[1] ENB_UE_S1AP_ID[1] MME_UE_S1AP_ID[2]",
            ],
            2025,
        );
        assert!(report.sessions.is_empty());
    }

    #[tokio::test]
    async fn reader_reports_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mme.log");
        std::fs::write(&path, UE_LOG).unwrap();

        let report = MmeLogReader::new(&path, 2000).ue_sessions().await.unwrap();
        assert_eq!(report.sessions.len(), 1);
        assert_eq!(report.session_count, 1);
    }

    #[tokio::test]
    async fn reader_tails_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mme.log");
        let mut contents = String::from("eNB-S1 accepted[10.0.0.1]:1\n");
        contents.push_str(&"filler\n".repeat(10));
        contents.push_str("eNB-S1 accepted[10.0.0.2]:2\n");
        std::fs::write(&path, contents).unwrap();

        let reader = MmeLogReader::new(&path, 5);
        let conns = reader.connected_enodebs().await.unwrap();
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].ip, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[tokio::test]
    async fn missing_log_is_unavailable() {
        let reader = MmeLogReader::new("/nonexistent/surfctl/mme.log", 100);
        let err = reader.connected_enodebs().await.unwrap_err();
        assert!(matches!(err, Error::LogUnavailable { .. }));
        let err = reader.ue_sessions().await.unwrap_err();
        assert!(matches!(err, Error::LogUnavailable { .. }));
    }
}
