//! Network identity and pool usage.

use surfctl_config::Config;
use surfctl_core::{NetworkInfo, PoolUsage};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util;

fn usage(u: PoolUsage) -> String {
    format!("{} of {} held, {} free", u.held, u.capacity, u.available)
}

fn detail(n: &NetworkInfo) -> String {
    let p = &n.profile;
    output::detail_block(&[
        ("PLMN", format!("{} (MCC {}, MNC {})", n.plmn, n.mcc, n.mnc)),
        ("IMSI prefix", n.imsi_prefix.clone()),
        ("IMSI suffixes", usage(n.suffixes)),
        ("APN", p.apn.clone()),
        ("QCI / ARP", format!("{} / {}", p.qci, p.arp_priority)),
        (
            "AMBR",
            format!(
                "{} Mbps up / {} Mbps down",
                p.ambr_uplink_bps / 1_000_000,
                p.ambr_downlink_bps / 1_000_000
            ),
        ),
        ("UE pool", n.ue_pool.to_string()),
        (
            "Usable range",
            format!("{} - {}", n.ue_pool.first_host(), n.ue_pool.last_host()),
        ),
        ("Gateway", util::or_dash(n.ue_gateway)),
        ("Addresses", usage(n.addresses)),
    ])
}

pub async fn handle(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = util::open_registry(cfg).await?;
    let info = registry.network_info().await;
    let out = output::render_single(global.format(), &info, detail, |n| n.plmn.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
