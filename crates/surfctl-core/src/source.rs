// ── Status feed sources ──
//
// The reconciler polls two feeds through the `StatusSource` seam. The
// production adapters wrap the MME log reader and the SAS portal client;
// tests substitute scripted sources.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::net::Ipv4Addr;

use surfctl_api::{MmeLogReader, SasClient};
use tracing::debug;

use crate::config::InventoryEntry;
use crate::convert::link_entries;
use crate::error::CoreError;
use crate::model::{LinkEntry, SasEntry};

/// One upstream feed that yields a full snapshot per call.
pub trait StatusSource: Send + Sync + 'static {
    type Entry: Send + Sync + 'static;

    /// Short human-readable feed name for logs and status output.
    fn name(&self) -> &'static str;

    /// Fetch a complete snapshot. A feed with nothing to query returns
    /// [`CoreError::FeedNotConfigured`].
    fn fetch(&self) -> impl Future<Output = Result<Vec<Self::Entry>, CoreError>> + Send;
}

// ── Signaling link ───────────────────────────────────────────────────

/// S1 associations parsed from the MME log.
#[derive(Debug, Clone)]
pub struct MmeLinkSource {
    reader: Option<MmeLogReader>,
    serial_by_ip: HashMap<Ipv4Addr, String>,
}

impl MmeLinkSource {
    /// `reader` is `None` when no log path is configured.
    pub fn new(reader: Option<MmeLogReader>, inventory: &[InventoryEntry]) -> Self {
        Self {
            reader,
            serial_by_ip: inventory
                .iter()
                .filter_map(|e| e.ip.map(|ip| (ip, e.serial_number.clone())))
                .collect(),
        }
    }
}

impl StatusSource for MmeLinkSource {
    type Entry = LinkEntry;

    fn name(&self) -> &'static str {
        "MME link"
    }

    async fn fetch(&self) -> Result<Vec<LinkEntry>, CoreError> {
        let Some(reader) = self.reader.as_ref() else {
            return Err(CoreError::FeedNotConfigured {
                feed: self.name().into(),
            });
        };
        let connections = reader.connected_enodebs().await?;
        Ok(link_entries(connections, &self.serial_by_ip))
    }
}

// ── Spectrum ─────────────────────────────────────────────────────────

/// Device registrations and grants from the SAS portal.
#[derive(Debug, Clone)]
pub struct SasSpectrumSource {
    client: SasClient,
    /// When set, only these serials are reported.
    allowed: Option<BTreeSet<String>>,
}

impl SasSpectrumSource {
    /// Restrict the feed to inventory serials when an inventory exists.
    pub fn new(client: SasClient, inventory: &[InventoryEntry]) -> Self {
        let allowed = (!inventory.is_empty())
            .then(|| inventory.iter().map(|e| e.serial_number.clone()).collect());
        Self { client, allowed }
    }
}

impl StatusSource for SasSpectrumSource {
    type Entry = SasEntry;

    fn name(&self) -> &'static str {
        "SAS portal"
    }

    async fn fetch(&self) -> Result<Vec<SasEntry>, CoreError> {
        let devices = self.client.list_devices().await?;
        let total = devices.len();

        let entries: Vec<SasEntry> = devices
            .into_iter()
            .filter(|d| {
                self.allowed
                    .as_ref()
                    .is_none_or(|allowed| allowed.contains(&d.serial_number))
            })
            .map(SasEntry::from)
            .collect();

        debug!(total, kept = entries.len(), "SAS devices fetched");
        Ok(entries)
    }
}
