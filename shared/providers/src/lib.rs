//! Outbound notification channels behind a common
//! `NotificationChannel` trait, each channel gated by a circuit breaker,
//! tied together in a `ProviderRegistry` keyed by channel kind.

pub mod chat;
pub mod channel;
pub mod circuit_breaker;
pub mod email;
pub mod push;
pub mod registry;
pub mod sms;
pub mod voice;

pub use chat::*;
pub use channel::*;
pub use circuit_breaker::*;
pub use email::*;
pub use push::*;
pub use registry::*;
pub use sms::*;
pub use voice::*;
