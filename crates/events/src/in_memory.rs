//! In-memory pub/sub for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use dlpkit_core::{AckId, MessageId};

use crate::channel::{
    ChannelError, ChannelProvider, ChannelRef, NotificationChannel, NotificationPublisher,
    ReceivedMessage,
};
use crate::message::Message;

/// How long a pulled message stays leased before it is redelivered.
const DEFAULT_ACK_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct Pending {
    message: Message,
    attempts: u32,
}

#[derive(Debug)]
struct Lease {
    pending: Pending,
    expires_at: Instant,
}

#[derive(Debug)]
struct SubscriptionState {
    topic: String,
    backlog: VecDeque<Pending>,
    leased: HashMap<AckId, Lease>,
}

impl SubscriptionState {
    fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            backlog: VecDeque::new(),
            leased: HashMap::new(),
        }
    }

    /// Put leases that expired unacknowledged back at the head of the backlog.
    fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<AckId> = self
            .leased
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(ack_id, _)| ack_id.clone())
            .collect();
        if expired.is_empty() {
            return;
        }

        let mut reclaimed: Vec<Pending> = expired
            .iter()
            .filter_map(|ack_id| self.leased.remove(ack_id))
            .map(|lease| lease.pending)
            .collect();
        reclaimed.sort_by_key(|p| p.message.publish_time());

        for pending in reclaimed.into_iter().rev() {
            self.backlog.push_front(pending);
        }
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.leased.values().map(|lease| lease.expires_at).min()
    }
}

#[derive(Debug, Default)]
struct State {
    /// topic -> subscription names attached to it
    topics: HashMap<String, Vec<String>>,
    subscriptions: HashMap<String, SubscriptionState>,
}

/// In-memory topics and pull subscriptions.
///
/// - No IO
/// - Fan-out: every subscription on a topic gets its own copy
/// - Acknowledge deletes from one subscription only
/// - Unacknowledged leases are redelivered after the ack deadline
#[derive(Debug)]
pub struct InMemoryPubSub {
    state: Mutex<State>,
    arrivals: Condvar,
    ack_deadline: Duration,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ack_deadline(mut self, ack_deadline: Duration) -> Self {
        self.ack_deadline = ack_deadline;
        self
    }

    /// Messages still owed to a subscription (queued plus leased-but-unacknowledged).
    pub fn outstanding(&self, channel: &ChannelRef) -> Result<usize, ChannelError> {
        let state = self.lock()?;
        let sub = state
            .subscriptions
            .get(channel.subscription())
            .ok_or_else(|| ChannelError::NotFound(channel.to_string()))?;
        Ok(sub.backlog.len() + sub.leased.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, ChannelError> {
        self.state.lock().map_err(|_| ChannelError::Poisoned)
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
            arrivals: Condvar::new(),
            ack_deadline: DEFAULT_ACK_DEADLINE,
        }
    }
}

impl NotificationPublisher for InMemoryPubSub {
    fn publish(&self, topic: &str, message: Message) -> Result<MessageId, ChannelError> {
        let mut state = self.lock()?;
        let subscribers = state
            .topics
            .get(topic)
            .cloned()
            .ok_or_else(|| ChannelError::NotFound(topic.to_string()))?;

        for name in &subscribers {
            if let Some(sub) = state.subscriptions.get_mut(name) {
                sub.backlog.push_back(Pending {
                    message: message.clone(),
                    attempts: 0,
                });
            }
        }
        drop(state);

        debug!(topic, message_id = %message.message_id(), fan_out = subscribers.len(), "published");
        self.arrivals.notify_all();
        Ok(message.message_id().clone())
    }
}

impl NotificationChannel for InMemoryPubSub {
    fn pull(
        &self,
        channel: &ChannelRef,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, ChannelError> {
        let deadline = Instant::now() + wait;
        let max_messages = max_messages.max(1);
        let ack_deadline = self.ack_deadline;
        let mut state = self.lock()?;

        loop {
            let now = Instant::now();
            let sub = state
                .subscriptions
                .get_mut(channel.subscription())
                .filter(|s| s.topic == channel.topic())
                .ok_or_else(|| ChannelError::NotFound(channel.to_string()))?;

            sub.reclaim_expired(now);

            if !sub.backlog.is_empty() {
                let take = max_messages.min(sub.backlog.len());
                let drained: Vec<Pending> = sub.backlog.drain(..take).collect();

                let mut batch = Vec::with_capacity(drained.len());
                for mut pending in drained {
                    pending.attempts += 1;
                    let ack_id = AckId::generate();
                    batch.push(ReceivedMessage {
                        ack_id: ack_id.clone(),
                        message: pending.message.clone(),
                        delivery_attempt: pending.attempts,
                    });
                    sub.leased.insert(
                        ack_id,
                        Lease {
                            pending,
                            expires_at: now + ack_deadline,
                        },
                    );
                }
                return Ok(batch);
            }

            if now >= deadline {
                return Ok(Vec::new());
            }

            let mut sleep_for = deadline - now;
            if let Some(expiry) = sub.next_expiry() {
                sleep_for = sleep_for.min(expiry.saturating_duration_since(now));
            }

            let (guard, _) = self
                .arrivals
                .wait_timeout(state, sleep_for)
                .map_err(|_| ChannelError::Poisoned)?;
            state = guard;
        }
    }

    fn acknowledge(&self, channel: &ChannelRef, ack_id: &AckId) -> Result<(), ChannelError> {
        let mut state = self.lock()?;
        let sub = state
            .subscriptions
            .get_mut(channel.subscription())
            .ok_or_else(|| ChannelError::NotFound(channel.to_string()))?;

        // Acking an expired or already-acked lease is a no-op.
        sub.leased.remove(ack_id);
        Ok(())
    }
}

impl ChannelProvider for InMemoryPubSub {
    fn create_channel(&self, topic: &str, subscription: &str) -> Result<ChannelRef, ChannelError> {
        let channel = ChannelRef::new(topic, subscription)?;
        let mut state = self.lock()?;

        if let Some(existing) = state.subscriptions.get(subscription) {
            if existing.topic != topic {
                return Err(ChannelError::Conflict(format!(
                    "subscription {subscription} is attached to topic {}",
                    existing.topic
                )));
            }
            return Ok(channel);
        }

        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(subscription.to_string());
        state
            .subscriptions
            .insert(subscription.to_string(), SubscriptionState::new(topic));

        debug!(%channel, "channel created");
        Ok(channel)
    }

    fn delete_channel(&self, channel: &ChannelRef) -> Result<(), ChannelError> {
        let mut state = self.lock()?;
        if state.subscriptions.remove(channel.subscription()).is_none() {
            return Err(ChannelError::NotFound(channel.to_string()));
        }

        let topic_now_empty = match state.topics.get_mut(channel.topic()) {
            Some(subs) => {
                subs.retain(|s| s != channel.subscription());
                subs.is_empty()
            }
            None => false,
        };
        if topic_now_empty {
            state.topics.remove(channel.topic());
        }
        drop(state);

        debug!(%channel, "channel deleted");
        // Wake blocked pulls so they observe the deletion.
        self.arrivals.notify_all();
        Ok(())
    }
}
