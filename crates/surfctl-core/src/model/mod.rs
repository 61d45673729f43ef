// ── Domain model ──
//
// Canonical types shared by the registry, the merger and consumers.

pub mod network;
pub mod radio;
pub mod subscriber;

pub use network::{
    AuthKeys, DEFAULT_AMF, DEFAULT_K, DEFAULT_OPC, IMSI_LEN, IMSI_PREFIX_LEN, Imsi, ImsiPrefix,
    NetworkIdentity, SUFFIX_MAX, SUFFIX_MIN, ServiceProfile,
};
pub use radio::{
    ChangeKind, ChannelType, FeedStatus, FrequencyRange, Grant, GrantRecord, GrantState,
    LinkEntry, RadioNode, RadioSummary, RadioView, SasEntry, SasState, StateChange,
};
pub use subscriber::{IdentityRequest, ProvisionRequest, Subscriber, SubscriberUpdate, default_name};
