// surfctl-core: subscriber provisioning and radio-node reconciliation.
//
// The registry allocates IMSIs and UE addresses from bounded pools and
// persists subscribers through a pluggable store. The reconciler polls the
// signaling-link and spectrum feeds exposed by `surfctl-api`, merges them
// per radio node, and publishes the result to any number of readers.

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod pool;
pub mod radio;
pub mod reconcile;
pub mod registry;
pub mod source;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{HistoryRetention, InventoryEntry, ReconcilerConfig, RegistryConfig};
pub use error::{CoreError, PoolError};
pub use model::*;
pub use pool::{AllocationPool, Ipv4Cidr};
pub use radio::RadioMerger;
pub use reconcile::{Reconciler, ViewStream};
pub use registry::{NetworkInfo, PoolUsage, SubscriberRegistry};
pub use source::{MmeLinkSource, SasSpectrumSource, StatusSource};
pub use store::{JsonFileStore, MemoryStore, StoreError, SubscriberStore};
