//! Notification channel abstraction (mechanics only).
//!
//! A channel is a **topic** (where the remote service publishes) plus a
//! **subscription** (where one consumer pulls from). The contract is
//! pull-based:
//!
//! - **At-least-once**: a pulled message that is not acknowledged before its lease
//!   expires is redelivered; consumers must treat duplicates as no-ops.
//! - **Per-subscription acknowledgement**: acknowledging removes the message from
//!   *this* subscription only. Two waiters pulling the same subscription compete
//!   for its messages, so anything they need to share must be shared above the
//!   transport.
//! - **No ordering guarantees** across publishers.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use dlpkit_core::{AckId, MessageId};

use crate::message::Message;

/// A registered delivery path: topic plus the subscription consumed from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    topic: String,
    subscription: String,
}

impl ChannelRef {
    pub fn new(
        topic: impl Into<String>,
        subscription: impl Into<String>,
    ) -> Result<Self, ChannelError> {
        let topic = topic.into();
        let subscription = subscription.into();
        if topic.trim().is_empty() || subscription.trim().is_empty() {
            return Err(ChannelError::InvalidName(format!(
                "topic={topic:?} subscription={subscription:?}"
            )));
        }
        Ok(Self {
            topic,
            subscription,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }
}

impl core::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.topic, self.subscription)
    }
}

/// A message leased to a consumer by `pull`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub ack_id: AckId,
    pub message: Message,
    /// 1 on first delivery, incremented on each redelivery.
    pub delivery_attempt: u32,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The topic or subscription does not exist (never created, or deleted).
    #[error("channel not found: {0}")]
    NotFound(String),

    #[error("invalid channel name: {0}")]
    InvalidName(String),

    /// A subscription with this name is already attached to another topic.
    #[error("channel conflict: {0}")]
    Conflict(String),

    /// The transport could not be reached.
    #[error("channel unavailable: {0}")]
    Unavailable(String),

    #[error("malformed message: {0}")]
    Malformed(String),

    /// Internal lock poisoning.
    #[error("channel state poisoned")]
    Poisoned,
}

/// Consumer side of a channel.
///
/// `pull` blocks for at most `wait` and may return an empty batch; an empty
/// batch is not an error.
pub trait NotificationChannel: Send + Sync {
    fn pull(
        &self,
        channel: &ChannelRef,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, ChannelError>;

    fn acknowledge(&self, channel: &ChannelRef, ack_id: &AckId) -> Result<(), ChannelError>;
}

/// Producer side of a channel (used by the remote service, or its stand-in).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, topic: &str, message: Message) -> Result<MessageId, ChannelError>;
}

/// Lifecycle of channels. Creation is idempotent.
pub trait ChannelProvider: Send + Sync {
    fn create_channel(&self, topic: &str, subscription: &str) -> Result<ChannelRef, ChannelError>;

    fn delete_channel(&self, channel: &ChannelRef) -> Result<(), ChannelError>;
}

impl<C> NotificationChannel for Arc<C>
where
    C: NotificationChannel + ?Sized,
{
    fn pull(
        &self,
        channel: &ChannelRef,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, ChannelError> {
        (**self).pull(channel, max_messages, wait)
    }

    fn acknowledge(&self, channel: &ChannelRef, ack_id: &AckId) -> Result<(), ChannelError> {
        (**self).acknowledge(channel, ack_id)
    }
}

impl<P> NotificationPublisher for Arc<P>
where
    P: NotificationPublisher + ?Sized,
{
    fn publish(&self, topic: &str, message: Message) -> Result<MessageId, ChannelError> {
        (**self).publish(topic, message)
    }
}

impl<P> ChannelProvider for Arc<P>
where
    P: ChannelProvider + ?Sized,
{
    fn create_channel(&self, topic: &str, subscription: &str) -> Result<ChannelRef, ChannelError> {
        (**self).create_channel(topic, subscription)
    }

    fn delete_channel(&self, channel: &ChannelRef) -> Result<(), ChannelError> {
        (**self).delete_channel(channel)
    }
}
