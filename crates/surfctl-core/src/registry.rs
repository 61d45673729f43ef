// ── Subscriber registry ──
//
// Provisions, updates and deletes subscribers on top of a `SubscriberStore`.
// Both allocation pools sit behind one async mutex that is held for the
// whole of every mutating operation, including the store write. Inside it
// the store's own lock is taken and the pools are rebuilt from the stored
// records, so registries in other processes sharing the store are
// accounted for too.

use std::net::Ipv4Addr;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::error::{CoreError, PoolError};
use crate::model::{
    IdentityRequest, Imsi, NetworkIdentity, ProvisionRequest, ServiceProfile, Subscriber,
    SubscriberUpdate, default_name,
};
use crate::pool::{AllocationPool, Ipv4Cidr};
use crate::store::{StoreError, StoreLock, SubscriberStore};

struct Pools {
    suffixes: AllocationPool<u16>,
    addresses: AllocationPool<Ipv4Addr>,
}

impl Pools {
    fn new(config: &RegistryConfig) -> Result<Self, CoreError> {
        Ok(Self {
            suffixes: AllocationPool::imsi_suffixes(),
            addresses: AllocationPool::ue_addresses(config.ue_pool, config.ue_gateway)
                .map_err(|e| CoreError::Config {
                    message: e.to_string(),
                })?,
        })
    }

    /// Hold exactly the gateway and the values of `records`. Returns how
    /// many stored values fall outside the pools.
    fn hydrate(&mut self, records: &[Subscriber], config: &RegistryConfig) -> usize {
        self.suffixes.clear();
        self.addresses.clear();
        if let Some(gateway) = config.ue_gateway.filter(|g| self.addresses.contains(*g)) {
            if let Err(e) = self.addresses.reserve(Some(gateway)) {
                debug!(%gateway, error = %e, "gateway not held");
            }
        }

        let mut untracked = 0;
        for sub in records {
            if let Some(suffix) = sub.imsi.suffix_under(&config.network.imsi_prefix) {
                if let Err(e) = self.suffixes.reserve(Some(suffix)) {
                    debug!(imsi = %sub.imsi, error = %e, "stored IMSI suffix not tracked");
                    untracked += 1;
                }
            }
            if let Err(e) = self.addresses.reserve(Some(sub.ip)) {
                debug!(imsi = %sub.imsi, ip = %sub.ip, error = %e, "stored address not tracked");
                untracked += 1;
            }
        }
        untracked
    }

    fn release(&mut self, suffix: Option<u16>, ip: Option<Ipv4Addr>) {
        if let Some(suffix) = suffix {
            self.suffixes.release(suffix);
        }
        if let Some(ip) = ip {
            self.addresses.release(ip);
        }
    }
}

/// Static network parameters plus live pool occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInfo {
    pub mcc: String,
    pub mnc: String,
    pub plmn: String,
    pub imsi_prefix: String,
    pub profile: ServiceProfile,
    pub ue_pool: Ipv4Cidr,
    pub ue_gateway: Option<Ipv4Addr>,
    pub suffixes: PoolUsage,
    pub addresses: PoolUsage,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolUsage {
    pub capacity: usize,
    pub held: usize,
    pub available: usize,
}

impl<K: crate::pool::PoolKey> From<&AllocationPool<K>> for PoolUsage {
    fn from(pool: &AllocationPool<K>) -> Self {
        Self {
            capacity: pool.capacity(),
            held: pool.held_count(),
            available: pool.available(),
        }
    }
}

/// Subscriber lifecycle over a pluggable store.
pub struct SubscriberRegistry<S> {
    store: S,
    config: RegistryConfig,
    pools: Mutex<Pools>,
}

impl<S: SubscriberStore> SubscriberRegistry<S> {
    /// Open the registry and mark every stored identity and address as held.
    pub async fn open(store: S, config: RegistryConfig) -> Result<Self, CoreError> {
        let mut pools = Pools::new(&config)?;
        let existing = store.list().await?;
        let untracked = pools.hydrate(&existing, &config);
        if untracked > 0 {
            warn!(untracked, "stored identities or addresses fall outside the configured pools");
        }
        debug!(
            subscribers = existing.len(),
            addresses_held = pools.addresses.held_count(),
            "registry hydrated from store"
        );

        Ok(Self {
            store,
            config,
            pools: Mutex::new(pools),
        })
    }

    /// Take the store lock and rebuild the pools from the stored records.
    async fn sync(&self, pools: &mut Pools) -> Result<StoreLock, CoreError> {
        let lock = self.store.lock().await?;
        let records = self.store.list().await?;
        pools.hydrate(&records, &self.config);
        Ok(lock)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn network(&self) -> &NetworkIdentity {
        &self.config.network
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn get(&self, imsi: &Imsi) -> Result<Subscriber, CoreError> {
        self.store
            .get(imsi)
            .await?
            .ok_or_else(|| CoreError::subscriber_not_found(imsi))
    }

    /// All subscribers ordered by IMSI.
    pub async fn list(&self) -> Result<Vec<Subscriber>, CoreError> {
        Ok(self.store.list().await?)
    }

    pub async fn network_info(&self) -> NetworkInfo {
        let pools = self.pools.lock().await;
        let network = &self.config.network;
        NetworkInfo {
            mcc: network.mcc.clone(),
            mnc: network.mnc.clone(),
            plmn: network.plmn(),
            imsi_prefix: network.imsi_prefix.to_string(),
            profile: self.config.profile.clone(),
            ue_pool: self.config.ue_pool,
            ue_gateway: self.config.ue_gateway,
            suffixes: PoolUsage::from(&pools.suffixes),
            addresses: PoolUsage::from(&pools.addresses),
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Create a subscriber with a unique IMSI and address.
    ///
    /// Nothing stays reserved when this fails.
    pub async fn provision(&self, request: ProvisionRequest) -> Result<Subscriber, CoreError> {
        let mut pools = self.pools.lock().await;
        let _lock = self.sync(&mut pools).await?;
        let prefix = &self.config.network.imsi_prefix;

        let (imsi, suffix) = match request.identity {
            IdentityRequest::Next => {
                let suffix = pools.suffixes.reserve(None).map_err(pool_exhausted)?;
                (prefix.imsi_for(suffix)?, Some(suffix))
            }
            IdentityRequest::Suffix(n) => {
                let imsi = prefix.imsi_for(n)?;
                claim_suffix(&mut pools.suffixes, &imsi, n)?;
                (imsi, Some(n))
            }
            IdentityRequest::Imsi(imsi) => match imsi.suffix_under(prefix) {
                Some(n) => {
                    claim_suffix(&mut pools.suffixes, &imsi, n)?;
                    (imsi, Some(n))
                }
                None => (imsi, None),
            },
        };

        match self.store.get(&imsi).await {
            Ok(None) => {}
            Ok(Some(_)) => {
                pools.release(suffix, None);
                return Err(CoreError::DuplicateIdentity {
                    imsi: imsi.to_string(),
                });
            }
            Err(e) => {
                pools.release(suffix, None);
                return Err(e.into());
            }
        }

        let ip = match pools.addresses.reserve(request.ip) {
            Ok(ip) => ip,
            Err(e) => {
                pools.release(suffix, None);
                return Err(address_error(e, request.ip));
            }
        };

        let now = Utc::now();
        let subscriber = Subscriber {
            name: request.name.unwrap_or_else(|| default_name(&imsi)),
            imsi,
            ip,
            profile: self.config.profile.clone(),
            security: self.config.security.clone(),
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.store.create(&subscriber).await {
            pools.release(suffix, Some(ip));
            if !matches!(e, StoreError::Exists { .. }) {
                warn!(imsi = %subscriber.imsi, error = %e, "store write failed; allocation rolled back");
            }
            return Err(e.into());
        }

        info!(imsi = %subscriber.imsi, ip = %subscriber.ip, name = %subscriber.name, "subscriber provisioned");
        Ok(subscriber)
    }

    /// Change a subscriber's name and/or address.
    ///
    /// A new address is reserved before the old one is released, so a
    /// failed update leaves the subscriber on its original address.
    pub async fn update(
        &self,
        imsi: &Imsi,
        update: SubscriberUpdate,
    ) -> Result<Subscriber, CoreError> {
        let mut pools = self.pools.lock().await;
        let _lock = self.sync(&mut pools).await?;
        let mut subscriber = self.get(imsi).await?;
        let old_ip = subscriber.ip;

        let new_ip = match update.ip {
            Some(ip) if ip != old_ip => {
                pools
                    .addresses
                    .reserve(Some(ip))
                    .map_err(|e| address_error(e, Some(ip)))?;
                Some(ip)
            }
            _ => None,
        };

        if let Some(name) = update.name {
            subscriber.name = name;
        }
        if let Some(ip) = new_ip {
            subscriber.ip = ip;
        }
        subscriber.updated_at = Utc::now();

        if let Err(e) = self.store.put(&subscriber).await {
            pools.release(None, new_ip);
            return Err(e.into());
        }
        if new_ip.is_some() {
            pools.addresses.release(old_ip);
        }

        info!(imsi = %subscriber.imsi, ip = %subscriber.ip, "subscriber updated");
        Ok(subscriber)
    }

    /// Remove a subscriber and return its identity and address to the pools.
    pub async fn delete(&self, imsi: &Imsi) -> Result<Subscriber, CoreError> {
        let mut pools = self.pools.lock().await;
        let _lock = self.sync(&mut pools).await?;
        let subscriber = self.get(imsi).await?;
        let suffix = imsi.suffix_under(&self.config.network.imsi_prefix);

        // Both releases and the removal happen under the pool lock, so no
        // other caller can observe the values free while the record lives.
        let released_suffix = suffix.filter(|n| pools.suffixes.release(*n));
        let released_ip = pools.addresses.release(subscriber.ip).then_some(subscriber.ip);

        match self.store.delete(imsi).await {
            Ok(true) => {}
            Ok(false) => {
                restore(&mut pools, released_suffix, released_ip);
                return Err(CoreError::subscriber_not_found(imsi));
            }
            Err(e) => {
                restore(&mut pools, released_suffix, released_ip);
                return Err(e.into());
            }
        }

        info!(imsi = %imsi, ip = %subscriber.ip, "subscriber deleted");
        Ok(subscriber)
    }
}

fn restore(pools: &mut Pools, suffix: Option<u16>, ip: Option<Ipv4Addr>) {
    if let Some(suffix) = suffix {
        if let Err(e) = pools.suffixes.reserve(Some(suffix)) {
            warn!(suffix, error = %e, "could not restore IMSI suffix");
        }
    }
    if let Some(ip) = ip {
        if let Err(e) = pools.addresses.reserve(Some(ip)) {
            warn!(%ip, error = %e, "could not restore address");
        }
    }
}

fn claim_suffix(pool: &mut AllocationPool<u16>, imsi: &Imsi, suffix: u16) -> Result<(), CoreError> {
    pool.reserve(Some(suffix)).map(drop).map_err(|e| match e {
        PoolError::Unavailable { .. } => CoreError::DuplicateIdentity {
            imsi: imsi.to_string(),
        },
        other => CoreError::validation(other.to_string()),
    })
}

fn pool_exhausted(err: PoolError) -> CoreError {
    match err {
        PoolError::Exhausted { pool } => CoreError::PoolExhausted { pool: pool.into() },
        other => CoreError::validation(other.to_string()),
    }
}

fn address_error(err: PoolError, requested: Option<Ipv4Addr>) -> CoreError {
    match (err, requested) {
        (PoolError::Exhausted { pool }, _) => CoreError::PoolExhausted { pool: pool.into() },
        (err, Some(ip)) => CoreError::AddressUnavailable {
            ip: ip.to_string(),
            reason: err.to_string(),
        },
        (err, None) => CoreError::validation(err.to_string()),
    }
}
