//! Radio-node command handlers.
//!
//! Each invocation resumes from the view saved by the previous one, so
//! grant history carries across runs the way it does inside a long-lived
//! reconciler.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use surfctl_api::{MmeLogReader, SasClient};
use surfctl_config::Config;
use surfctl_core::{
    CoreError, FeedStatus, Grant, GrantRecord, MmeLinkSource, RadioNode, RadioSummary, RadioView,
    Reconciler, SasSpectrumSource, StateChange,
};

use crate::cli::{EnodebsArgs, EnodebsCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

type RadioReconciler = Reconciler<MmeLinkSource, SasSpectrumSource>;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "S1")]
    link: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "SAS")]
    sas: String,
    #[tabled(rename = "Grant")]
    grant: String,
}

impl NodeRow {
    fn new(n: &RadioNode, color: bool) -> Self {
        Self {
            serial: n.serial_number.clone(),
            name: n.name.clone().unwrap_or_default(),
            link: output::link(n.link_connected, color),
            ip: util::or_dash(n.link_ip),
            sas: output::sas_state(n.sas_state, color),
            grant: n.active_grant.as_ref().map_or_else(|| "-".into(), grant_summary),
        }
    }
}

#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "At")]
    at: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
}

impl From<&StateChange> for ChangeRow {
    fn from(c: &StateChange) -> Self {
        Self {
            at: c.at.format("%Y-%m-%d %H:%M:%S").to_string(),
            kind: c.kind.to_string(),
            from: c.from.clone(),
            to: c.to.clone(),
        }
    }
}

#[derive(Tabled)]
struct GrantRow {
    #[tabled(rename = "Grant")]
    grant_id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Spectrum")]
    spectrum: String,
    #[tabled(rename = "Node state")]
    sas_state: String,
    #[tabled(rename = "Superseded")]
    superseded: String,
}

impl From<&GrantRecord> for GrantRow {
    fn from(r: &GrantRecord) -> Self {
        Self {
            grant_id: r.grant.grant_id.clone(),
            state: r.grant.state.to_string(),
            spectrum: grant_summary(&r.grant),
            sas_state: r.sas_state.to_string(),
            superseded: r.superseded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

fn grant_summary(g: &Grant) -> String {
    let band = g.frequency.map_or_else(
        || "?".into(),
        |f| format!("{:.0}-{:.0} MHz", f.low_mhz, f.high_mhz),
    );
    match g.channel_type {
        Some(channel) => format!("{band} {channel}"),
        None => band,
    }
}

// ── Detail views ────────────────────────────────────────────────────

fn feed_lines(view: &RadioView, color: bool) -> String {
    let now = Utc::now();
    output::detail_block(&[
        (
            "Refreshed",
            view.refreshed_at
                .map_or_else(|| "never".into(), |at| util::ago(at, now)),
        ),
        ("S1 link", output::feed(&view.link, color)),
        ("SAS", output::feed(&view.sas, color)),
    ])
}

fn view_detail(view: &RadioView, color: bool) -> String {
    let rows: Vec<NodeRow> = view.nodes.values().map(|n| NodeRow::new(n, color)).collect();
    let s = view.summary();
    format!(
        "{}\n\n{}\n{} nodes, {} linked, {} authorized, {} operational",
        feed_lines(view, color),
        tabled::Table::new(rows).with(tabled::settings::Style::rounded()),
        s.total,
        s.link_connected,
        s.sas_authorized,
        s.operational,
    )
}

fn node_detail(n: &RadioNode, color: bool) -> String {
    let now = Utc::now();
    let mut fields = vec![
        ("Serial", n.serial_number.clone()),
        ("Name", n.display_name().to_owned()),
        ("Location", util::or_dash(n.location.as_deref())),
        ("Managed", if n.managed { "yes" } else { "no" }.to_owned()),
        ("S1 link", output::link(n.link_connected, color)),
        ("S1 address", util::or_dash(n.link_ip)),
        (
            "Connected",
            n.connected_at
                .map_or_else(|| "-".into(), |at| util::ago(at, now)),
        ),
        ("SAS state", output::sas_state(n.sas_state, color)),
        ("FCC ID", util::or_dash(n.fcc_id.as_deref())),
    ];
    match &n.active_grant {
        Some(g) => {
            fields.push(("Grant", format!("{} ({})", g.grant_id, grant_summary(g))));
            fields.push(("Max EIRP", util::or_dash(g.max_eirp_dbm.map(|e| format!("{e} dBm")))));
            fields.push((
                "Expires",
                util::or_dash(g.expires_at.map(|at| at.to_rfc3339())),
            ));
        }
        None => fields.push(("Grant", "-".into())),
    }
    fields.push(("Operational", if n.is_operational() { "yes" } else { "no" }.to_owned()));
    fields.push(("Past grants", n.grant_history.len().to_string()));
    output::detail_block(&fields)
}

/// Grant history for one node, as emitted by `enodebs history`.
#[derive(Serialize)]
struct HistoryReport<'a> {
    serial_number: &'a str,
    active_grant: Option<&'a Grant>,
    grant_history: &'a [GrantRecord],
    state_changes: Vec<StateChange>,
}

fn history_detail(report: &HistoryReport<'_>) -> String {
    let active = report
        .active_grant
        .map_or_else(|| "none".into(), |g| format!("{} ({})", g.grant_id, grant_summary(g)));
    let mut out = format!("{}: active grant {active}", report.serial_number);

    if report.state_changes.is_empty() {
        out.push_str("\n\nNo state changes recorded.");
    } else {
        let rows: Vec<ChangeRow> = report.state_changes.iter().map(ChangeRow::from).collect();
        out.push_str("\n\nState changes\n");
        out.push_str(&tabled::Table::new(rows).with(tabled::settings::Style::rounded()).to_string());
    }
    if !report.grant_history.is_empty() {
        let rows: Vec<GrantRow> = report.grant_history.iter().map(GrantRow::from).collect();
        out.push_str("\n\nPast grants (most recent first)\n");
        out.push_str(&tabled::Table::new(rows).with(tabled::settings::Style::rounded()).to_string());
    }
    out
}

#[derive(Serialize)]
struct CycleLine<'a> {
    refreshed_at: Option<chrono::DateTime<Utc>>,
    link: &'a FeedStatus,
    sas: &'a FeedStatus,
    #[serde(flatten)]
    summary: RadioSummary,
}

fn cycle_line(view: &RadioView, color: bool) -> String {
    let s = view.summary();
    format!(
        "[{}] {} nodes, {} linked, {} authorized, {} operational (S1 {}, SAS {})",
        view.refreshed_at
            .map_or_else(|| "--:--:--".into(), |at| at.format("%H:%M:%S").to_string()),
        s.total,
        s.link_connected,
        s.sas_authorized,
        s.operational,
        output::feed(&view.link, color),
        output::feed(&view.sas, color),
    )
}

// ── Reconciler wiring ───────────────────────────────────────────────

fn build_reconciler(cfg: &Config, interval: Option<u64>) -> Result<RadioReconciler, CliError> {
    let mut config = cfg.reconciler_config()?;
    if let Some(secs) = interval {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "interval".into(),
                reason: "must be greater than 0".into(),
            });
        }
        config.interval = Duration::from_secs(secs);
    }

    let reader = cfg
        .mme
        .log_path
        .as_ref()
        .map(|path| MmeLogReader::new(path, cfg.mme.tail_lines));

    let customer_id = cfg.sas.customer_id.clone().unwrap_or_default();
    // Only touch the keyring when the feed is in use.
    let token = if customer_id.is_empty() {
        None
    } else {
        surfctl_config::resolve_sas_token(&cfg.sas)
    };
    let client = SasClient::new(cfg.sas_base_url()?, customer_id, token, cfg.sas_timeout())
        .map_err(CoreError::from)?;

    Ok(Reconciler::new(
        MmeLinkSource::new(reader, &config.inventory),
        SasSpectrumSource::new(client, &config.inventory),
        config,
    ))
}

// ── Saved view ──────────────────────────────────────────────────────

async fn load_saved(path: &Path) -> Option<RadioView> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read saved radio view");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(view) => Some(view),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring corrupt saved radio view");
            None
        }
    }
}

async fn save(path: &Path, view: &RadioView) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(view).map_err(|e| CliError::Serialize(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), nodes = view.nodes.len(), "radio view saved");
    Ok(())
}

struct Session {
    reconciler: RadioReconciler,
    saved_at: PathBuf,
    resumed: bool,
}

impl Session {
    async fn open(cfg: &Config, interval: Option<u64>) -> Result<Self, CliError> {
        let reconciler = build_reconciler(cfg, interval)?;
        let saved_at = cfg.view_cache_path();
        let resumed = match load_saved(&saved_at).await {
            Some(view) => {
                reconciler.restore(view).await;
                true
            }
            None => false,
        };
        Ok(Self {
            reconciler,
            saved_at,
            resumed,
        })
    }

    /// The saved view, or a fresh one when asked or when nothing is saved.
    async fn view(&self, refresh: bool) -> Result<Arc<RadioView>, CliError> {
        if !refresh && self.resumed {
            return Ok(self.reconciler.current());
        }
        let view = self.reconciler.refresh().await;
        save(&self.saved_at, &view).await?;
        Ok(view)
    }
}

fn node_not_found(serial: String) -> CliError {
    CliError::NotFound {
        resource_type: "radio node".into(),
        identifier: serial,
        list_command: "enodebs status".into(),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: EnodebsArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color_mode());

    match args.command {
        EnodebsCommand::Status { serial, refresh } => {
            let session = Session::open(cfg, None).await?;
            let view = session.view(refresh).await?;

            let out = match serial {
                Some(serial) => {
                    let node = view.node(&serial).ok_or_else(|| node_not_found(serial.clone()))?;
                    output::render_single(
                        global.format(),
                        node,
                        |n| node_detail(n, color),
                        |n| n.serial_number.clone(),
                    )?
                }
                None => output::render_single(
                    global.format(),
                    view.as_ref(),
                    |v| view_detail(v, color),
                    |v| v.nodes.keys().cloned().collect::<Vec<_>>().join("\n"),
                )?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        EnodebsCommand::History { serial, refresh } => {
            let session = Session::open(cfg, None).await?;
            let view = session.view(refresh).await?;
            let node = view.node(&serial).ok_or_else(|| node_not_found(serial.clone()))?;

            let report = HistoryReport {
                serial_number: &node.serial_number,
                active_grant: node.active_grant.as_ref(),
                grant_history: &node.grant_history,
                state_changes: node.state_changes(),
            };
            let out = output::render_single(global.format(), &report, history_detail, |r| {
                r.grant_history
                    .iter()
                    .map(|g| g.grant.grant_id.clone())
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        EnodebsCommand::Watch { interval } => {
            let session = Session::open(cfg, interval).await?;
            let mut views = session.reconciler.subscribe();
            let cancel = CancellationToken::new();
            let task = session.reconciler.spawn(cancel.clone());
            output::notice("Watching radio nodes; Ctrl-C to stop", global.quiet);

            let shutdown = tokio::signal::ctrl_c();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    next = views.changed() => {
                        let Some(view) = next else { break };
                        save(&session.saved_at, &view).await?;

                        let cycle = CycleLine {
                            refreshed_at: view.refreshed_at,
                            link: &view.link,
                            sas: &view.sas,
                            summary: view.summary(),
                        };
                        // One document per line when streaming JSON.
                        let format = match global.format() {
                            OutputFormat::Json => OutputFormat::JsonCompact,
                            other => other,
                        };
                        let line = output::render_single(
                            format,
                            &cycle,
                            |_| cycle_line(&view, color),
                            |_| cycle_line(&view, color),
                        )?;
                        output::print_output(&line, global.quiet);
                    }
                }
            }

            cancel.cancel();
            if let Err(e) = task.await {
                warn!(error = %e, "reconciliation task ended abnormally");
            }
            Ok(())
        }

        EnodebsCommand::Remove { serial } => {
            let session = Session::open(cfg, None).await?;
            if !session.resumed {
                return Err(node_not_found(serial));
            }
            if session.reconciler.current().node(&serial).is_none() {
                return Err(node_not_found(serial));
            }
            if !util::confirm(&format!("Remove radio node {serial} from the saved view?"), global.yes)? {
                return Ok(());
            }

            let removed = session
                .reconciler
                .remove_node(&serial)
                .await
                .ok_or_else(|| node_not_found(serial.clone()))?;
            save(&session.saved_at, &session.reconciler.current()).await?;

            let config_path = crate::config_file(global);
            if removed.managed && surfctl_config::disable_enodeb(&config_path, &serial)? {
                output::notice(
                    &format!(
                        "✓ Removed {} and disabled it in {}",
                        removed.display_name(),
                        config_path.display()
                    ),
                    global.quiet,
                );
            } else {
                output::notice(
                    &format!(
                        "✓ Removed {} (it returns if a feed reports it again)",
                        removed.display_name()
                    ),
                    global.quiet,
                );
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use surfctl_core::{ChannelType, FrequencyRange, GrantState, SasState};

    use super::*;

    fn grant() -> Grant {
        Grant {
            grant_id: "g-1".into(),
            state: GrantState::Authorized,
            frequency: Some(FrequencyRange {
                low_mhz: 3550.0,
                high_mhz: 3560.0,
            }),
            channel_type: Some(ChannelType::Gaa),
            max_eirp_dbm: Some(30.0),
            expires_at: None,
            state_changed_at: None,
        }
    }

    #[test]
    fn grant_summary_shows_band_and_channel() {
        assert_eq!(grant_summary(&grant()), "3550-3560 MHz GAA");
    }

    #[test]
    fn cycle_line_counts_nodes() {
        let mut node = RadioNode::new("SN-100");
        node.link_connected = true;
        node.sas_state = SasState::Authorized;
        node.active_grant = Some(grant());
        let view = RadioView {
            refreshed_at: None,
            link: FeedStatus::Available,
            sas: FeedStatus::NotConfigured,
            nodes: [("SN-100".to_string(), node)].into(),
        };

        let line = cycle_line(&view, false);
        assert!(line.contains("1 nodes, 1 linked, 1 authorized, 1 operational"));
        assert!(line.contains("SAS not configured"));
    }

    #[tokio::test]
    async fn saved_view_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("radio-view.json");
        assert!(load_saved(&path).await.is_none());

        let view = RadioView {
            nodes: [("SN-100".to_string(), RadioNode::new("SN-100"))].into(),
            ..RadioView::default()
        };
        save(&path, &view).await.unwrap();
        assert_eq!(load_saved(&path).await.unwrap(), view);

        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(load_saved(&path).await.is_none());
    }
}
