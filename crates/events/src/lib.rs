//! Notification channels: the pub/sub delivery path used to signal job completion.
//!
//! This crate holds the mechanics only (traits, message envelope, an in-memory
//! transport). Transport adapters backed by real brokers live in `dlpkit-infra`.

pub mod channel;
pub mod in_memory;
pub mod message;

pub use channel::{
    ChannelError, ChannelProvider, ChannelRef, NotificationChannel, NotificationPublisher,
    ReceivedMessage,
};
pub use in_memory::InMemoryPubSub;
pub use message::{JOB_NAME_ATTRIBUTE, JobNotification, Message};
