// Spectrum Access System portal client
//
// Read-only view of CBSD registration and grant state for a customer
// account. The portal offers no history, so grant history is recorded by
// `surfctl-core` from successive snapshots.

mod client;
pub mod models;

pub use client::SasClient;
pub use models::{FrequencyRange, SasDevice, SasGrant};
