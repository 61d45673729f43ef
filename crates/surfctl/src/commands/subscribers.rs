//! Subscriber command handlers.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use surfctl_api::{MmeLogReader, UeSession};
use surfctl_config::Config;
use surfctl_core::{CoreError, IdentityRequest, ProvisionRequest, Subscriber, SubscriberUpdate};

use crate::cli::{GlobalOpts, SubscribersArgs, SubscribersCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct SubscriberRow {
    #[tabled(rename = "IMSI")]
    imsi: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "APN")]
    apn: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&Subscriber> for SubscriberRow {
    fn from(s: &Subscriber) -> Self {
        Self {
            imsi: s.imsi.to_string(),
            name: s.name.clone(),
            ip: s.ip.to_string(),
            apn: s.profile.apn.clone(),
            created: s.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// An attached UE joined with its registry record, when one exists.
#[derive(Debug, Serialize)]
struct Connection {
    imsi: String,
    name: Option<String>,
    ip: Option<Ipv4Addr>,
    apn: String,
    enb_ue_s1ap_id: Option<u32>,
    mme_ue_s1ap_id: Option<u32>,
    attached_at: Option<DateTime<Utc>>,
}

impl Connection {
    fn join(session: UeSession, record: Option<&Subscriber>) -> Self {
        Self {
            name: record.map(|s| s.name.clone()),
            ip: record.map(|s| s.ip),
            imsi: session.imsi,
            apn: session.apn,
            enb_ue_s1ap_id: session.enb_ue_s1ap_id,
            mme_ue_s1ap_id: session.mme_ue_s1ap_id,
            attached_at: session.attached_at,
        }
    }
}

#[derive(Tabled)]
struct ConnectionRow {
    #[tabled(rename = "IMSI")]
    imsi: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "APN")]
    apn: String,
    #[tabled(rename = "S1AP IDs")]
    ids: String,
    #[tabled(rename = "Attached")]
    attached: String,
}

impl From<&Connection> for ConnectionRow {
    fn from(c: &Connection) -> Self {
        Self {
            imsi: c.imsi.clone(),
            name: c.name.clone().unwrap_or_else(|| "(not provisioned)".into()),
            ip: c.ip.map_or_else(|| "-".into(), |ip| ip.to_string()),
            apn: c.apn.clone(),
            ids: match (c.enb_ue_s1ap_id, c.mme_ue_s1ap_id) {
                (Some(enb), Some(mme)) => format!("{enb}/{mme}"),
                _ => "-".into(),
            },
            attached: c
                .attached_at
                .map_or_else(|| "-".into(), |at| at.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

fn detail(s: &Subscriber) -> String {
    let p = &s.profile;
    output::detail_block(&[
        ("IMSI", s.imsi.to_string()),
        ("Name", s.name.clone()),
        ("IP", s.ip.to_string()),
        ("APN", p.apn.clone()),
        ("QCI", p.qci.to_string()),
        ("ARP", p.arp_priority.to_string()),
        (
            "AMBR",
            format!(
                "{} Mbps up / {} Mbps down",
                p.ambr_uplink_bps / 1_000_000,
                p.ambr_downlink_bps / 1_000_000
            ),
        ),
        ("AMF", s.security.amf.clone()),
        ("Created", s.created_at.to_rfc3339()),
        ("Updated", s.updated_at.to_rfc3339()),
    ])
}

/// Key material never leaves the store in clear.
fn masked(s: Subscriber) -> Subscriber {
    Subscriber {
        security: s.security.masked(),
        ..s
    }
}

fn imsi_of(s: &Subscriber) -> String {
    s.imsi.to_string()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: SubscribersArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = util::open_registry(cfg).await?;

    match args.command {
        SubscribersCommand::List => {
            let subscribers: Vec<Subscriber> =
                registry.list().await?.into_iter().map(masked).collect();
            let out = output::render_list(
                global.format(),
                &subscribers,
                |s| SubscriberRow::from(s),
                imsi_of,
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SubscribersCommand::Get { imsi } => {
            let subscriber = masked(registry.get(&util::parse_imsi(&imsi)?).await?);
            let out = output::render_single(global.format(), &subscriber, detail, imsi_of)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SubscribersCommand::Add { identity, name, ip } => {
            let identity: IdentityRequest =
                identity.parse().map_err(|e: CoreError| CliError::Validation {
                    field: "identity".into(),
                    reason: e.to_string(),
                })?;
            let request = ProvisionRequest {
                name: name.filter(|n| !n.trim().is_empty()),
                ip,
                ..ProvisionRequest::with_identity(identity)
            };

            let subscriber = masked(registry.provision(request).await?);
            output::notice(
                &format!("✓ Provisioned {} at {}", subscriber.imsi, subscriber.ip),
                global.quiet,
            );
            let out = output::render_single(global.format(), &subscriber, detail, imsi_of)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SubscribersCommand::Update { imsi, name, ip } => {
            let update = SubscriberUpdate { name, ip };
            if update.is_empty() {
                return Err(CliError::Validation {
                    field: "update".into(),
                    reason: "nothing to change; pass --name and/or --ip".into(),
                });
            }

            let subscriber = masked(registry.update(&util::parse_imsi(&imsi)?, update).await?);
            output::notice(&format!("✓ Updated {}", subscriber.imsi), global.quiet);
            let out = output::render_single(global.format(), &subscriber, detail, imsi_of)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SubscribersCommand::Delete { imsi } => {
            let imsi = util::parse_imsi(&imsi)?;
            // Surface a missing subscriber before prompting.
            let existing = registry.get(&imsi).await?;
            if !util::confirm(
                &format!("Delete subscriber {} ({})?", existing.imsi, existing.name),
                global.yes,
            )? {
                return Ok(());
            }

            let removed = registry.delete(&imsi).await?;
            output::notice(
                &format!("✓ Deleted {}, released {}", removed.imsi, removed.ip),
                global.quiet,
            );
            Ok(())
        }

        SubscribersCommand::Sessions => {
            let Some(path) = cfg.mme.log_path.as_ref() else {
                return Err(CliError::FeedNotConfigured {
                    feed: "MME link".into(),
                });
            };
            let report = MmeLogReader::new(path, cfg.mme.tail_lines)
                .ue_sessions()
                .await
                .map_err(CoreError::from)?;

            let records: BTreeMap<String, Subscriber> = registry
                .list()
                .await?
                .into_iter()
                .map(|s| (s.imsi.to_string(), s))
                .collect();
            let connections: Vec<Connection> = report
                .sessions
                .into_iter()
                .map(|session| {
                    let record = records.get(&session.imsi);
                    Connection::join(session, record)
                })
                .collect();

            output::notice(
                &format!(
                    "{} attached, {} radio contexts, {} PDN sessions",
                    connections.len(),
                    report.enb_ue_count,
                    report.session_count
                ),
                global.quiet,
            );
            let out = output::render_list(
                global.format(),
                &connections,
                |c| ConnectionRow::from(c),
                |c| c.imsi.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
