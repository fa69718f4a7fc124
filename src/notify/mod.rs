//! Notification dispatch
//!
//! Renders fired alerts for each channel and delivers them through pluggable
//! transports, one independent task per delivery.

pub mod dispatcher;
pub mod payload;
pub mod retry;
pub mod transport;

pub use dispatcher::{
    Delivery, DeliveryOutcome, DeliveryStatus, DispatchHandle, DispatchReport, DispatchStats,
    Dispatcher, DispatcherConfig,
};
pub use payload::Notification;
pub use retry::{DeliveryError, RetryPolicy};
pub use transport::{
    EmailTransport, HttpTransport, LogEmailTransport, ReqwestHttpTransport, TransportError,
};
