// ── Radio-node reconciliation ──

mod history;
mod merge;

pub use merge::{Overlay, RadioMerger, select_active};
