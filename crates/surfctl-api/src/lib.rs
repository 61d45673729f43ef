// surfctl-api: raw clients for the two radio-node status feeds
//
// The MME log reader reports which eNodeBs hold an S1 signaling link to the
// mobile core; the SAS client reports spectrum registration and grants.
// Neither knows about subscribers, merging, or history -- that lives in
// `surfctl-core`.

pub mod error;
pub mod mme;
pub mod sas;

pub use error::Error;
pub use mme::{DEFAULT_APN, MmeLogReader, S1apConnection, UeSession, UeSessionReport};
pub use sas::{SasClient, SasDevice, SasGrant};
