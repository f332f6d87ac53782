//! Receiver-side state and session engine: TTL-bounded session store,
//! discovered-device registry, and the transfer admission/upload logic
//! behind the protocol endpoints.

pub mod receiver;
pub mod registry;
pub mod store;

pub use receiver::{
    AdmissionPolicy, NoopHooks, ReceiverEngine, TransferEvent, TransferHooks,
};
pub use registry::{DeviceRegistry, DiscoveredDevice};
pub use store::{SessionEntry, SessionStore};
