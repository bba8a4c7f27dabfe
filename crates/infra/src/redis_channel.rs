//! Notification channel over Redis Streams.
//!
//! - **Topic** = stream key `dlpkit:topic:<topic>`
//! - **Subscription** = consumer group on that stream
//! - `publish` = `XADD`, `pull` = `XREADGROUP`, `acknowledge` = `XACK`
//! - Entries pending longer than the ack deadline are reclaimed with `XCLAIM`
//!   and redelivered, so delivery is at-least-once.
//! - Entries that cannot be decoded are acknowledged and dropped, so they never
//!   block redelivery of the entries behind them.
//!
//! Uses the blocking connection API; each call opens a connection from the client.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redis::streams::{StreamClaimReply, StreamId, StreamReadReply};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use dlpkit_core::{AckId, MessageId};
use dlpkit_events::{
    ChannelError, ChannelProvider, ChannelRef, Message, NotificationChannel,
    NotificationPublisher, ReceivedMessage,
};

const KEY_PREFIX: &str = "dlpkit:topic:";
const DEFAULT_ACK_DEADLINE: Duration = Duration::from_secs(10);

const FIELD_MESSAGE_ID: &str = "message_id";
const FIELD_DATA: &str = "data";
const FIELD_ATTRIBUTES: &str = "attributes";
const FIELD_PUBLISH_TIME: &str = "publish_time";

#[derive(Debug, Clone)]
pub struct RedisStreamsChannel {
    client: Arc<redis::Client>,
    consumer: String,
    ack_deadline: Duration,
}

impl RedisStreamsChannel {
    /// Connect lazily to `redis_url` (e.g. `redis://localhost:6379`).
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, ChannelError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| ChannelError::Unavailable(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            consumer: format!("dlpkit-{}", Uuid::now_v7().simple()),
            ack_deadline: DEFAULT_ACK_DEADLINE,
        })
    }

    pub fn with_ack_deadline(mut self, ack_deadline: Duration) -> Self {
        self.ack_deadline = ack_deadline;
        self
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer
    }

    fn connection(&self) -> Result<redis::Connection, ChannelError> {
        self.client
            .get_connection()
            .map_err(|e| ChannelError::Unavailable(e.to_string()))
    }

    /// Claim entries another delivery left unacknowledged past the ack deadline.
    fn reclaim_expired(
        &self,
        conn: &mut redis::Connection,
        key: &str,
        group: &str,
        max_messages: usize,
    ) -> Result<Vec<ReceivedMessage>, ChannelError> {
        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(key)
            .arg(group)
            .arg("-")
            .arg("+")
            .arg(max_messages)
            .query(conn)
            .map_err(map_redis_error)?;

        let min_idle_ms = millis(self.ack_deadline);
        let expired: Vec<(String, u64)> = pending
            .into_iter()
            .filter(|(_, _, idle_ms, _)| *idle_ms >= min_idle_ms)
            .map(|(id, _, _, deliveries)| (id, deliveries))
            .collect();
        if expired.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = expired.iter().map(|(id, _)| id.as_str()).collect();
        let claimed: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(key)
            .arg(group)
            .arg(&self.consumer)
            .arg(min_idle_ms)
            .arg(&ids[..])
            .query(conn)
            .map_err(map_redis_error)?;

        let deliveries: HashMap<&str, u64> =
            expired.iter().map(|(id, n)| (id.as_str(), *n)).collect();

        let batch = decode_batch(&claimed.ids, |id| deliveries.get(id).copied().unwrap_or(1) + 1);
        self.discard_undecodable(conn, key, group, &batch.undecodable)?;
        Ok(batch.messages)
    }

    fn discard_undecodable(
        &self,
        conn: &mut redis::Connection,
        key: &str,
        group: &str,
        ids: &[String],
    ) -> Result<(), ChannelError> {
        if ids.is_empty() {
            return Ok(());
        }
        let _: u64 = redis::cmd("XACK")
            .arg(key)
            .arg(group)
            .arg(ids)
            .query(conn)
            .map_err(map_redis_error)?;
        Ok(())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Decoded messages, plus the ids of entries that could not be decoded.
#[derive(Debug, Default)]
struct DecodedBatch {
    messages: Vec<ReceivedMessage>,
    undecodable: Vec<String>,
}

fn decode_batch<F>(entries: &[StreamId], delivery_attempt: F) -> DecodedBatch
where
    F: Fn(&str) -> u64,
{
    let mut batch = DecodedBatch::default();
    for entry in entries {
        match decode_entry(entry, delivery_attempt(&entry.id)) {
            Ok(message) => batch.messages.push(message),
            Err(e) => {
                warn!(entry_id = %entry.id, error = %e, "discarding undecodable stream entry");
                batch.undecodable.push(entry.id.clone());
            }
        }
    }
    batch
}

fn stream_key(topic: &str) -> String {
    format!("{KEY_PREFIX}{topic}")
}

fn map_redis_error(e: redis::RedisError) -> ChannelError {
    match e.code() {
        Some("NOGROUP") => ChannelError::NotFound(e.to_string()),
        _ => ChannelError::Unavailable(e.to_string()),
    }
}

fn decode_entry(entry: &StreamId, delivery_attempt: u64) -> Result<ReceivedMessage, ChannelError> {
    let ack_id = AckId::new(entry.id.clone()).map_err(|e| ChannelError::Malformed(e.to_string()))?;
    Ok(ReceivedMessage {
        ack_id,
        message: try_decode(entry)?,
        delivery_attempt: u32::try_from(delivery_attempt).unwrap_or(u32::MAX),
    })
}

fn try_decode(entry: &StreamId) -> Result<Message, ChannelError> {
    let field = |name: &str| -> Result<Vec<u8>, ChannelError> {
        let value = entry
            .map
            .get(name)
            .ok_or_else(|| ChannelError::Malformed(format!("missing field {name}")))?;
        redis::from_redis_value(value).map_err(|e| ChannelError::Malformed(e.to_string()))
    };
    let text = |name: &str| -> Result<String, ChannelError> {
        String::from_utf8(field(name)?).map_err(|e| ChannelError::Malformed(e.to_string()))
    };

    let message_id =
        MessageId::new(text(FIELD_MESSAGE_ID)?).map_err(|e| ChannelError::Malformed(e.to_string()))?;
    let attributes: BTreeMap<String, String> = serde_json::from_str(&text(FIELD_ATTRIBUTES)?)
        .map_err(|e| ChannelError::Malformed(e.to_string()))?;
    let publish_time = DateTime::parse_from_rfc3339(&text(FIELD_PUBLISH_TIME)?)
        .map_err(|e| ChannelError::Malformed(e.to_string()))?
        .with_timezone(&Utc);

    Ok(Message::from_parts(message_id, field(FIELD_DATA)?, attributes, publish_time))
}

impl NotificationPublisher for RedisStreamsChannel {
    #[instrument(skip(self, message), fields(message_id = %message.message_id()), err)]
    fn publish(&self, topic: &str, message: Message) -> Result<MessageId, ChannelError> {
        let attributes = serde_json::to_string(message.attributes())
            .map_err(|e| ChannelError::Malformed(e.to_string()))?;
        let mut conn = self.connection()?;

        let _: String = redis::cmd("XADD")
            .arg(stream_key(topic))
            .arg("*")
            .arg(FIELD_MESSAGE_ID)
            .arg(message.message_id().as_str())
            .arg(FIELD_DATA)
            .arg(message.data())
            .arg(FIELD_ATTRIBUTES)
            .arg(&attributes)
            .arg(FIELD_PUBLISH_TIME)
            .arg(message.publish_time().to_rfc3339())
            .query(&mut conn)
            .map_err(map_redis_error)?;

        Ok(message.message_id().clone())
    }
}

impl NotificationChannel for RedisStreamsChannel {
    #[instrument(skip_all, fields(channel = %channel, max_messages = max_messages))]
    fn pull(
        &self,
        channel: &ChannelRef,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, ChannelError> {
        let key = stream_key(channel.topic());
        let group = channel.subscription();
        let max_messages = max_messages.max(1);
        let mut conn = self.connection()?;

        let redelivered = self.reclaim_expired(&mut conn, &key, group, max_messages)?;
        if !redelivered.is_empty() {
            debug!(count = redelivered.len(), "redelivering expired entries");
            return Ok(redelivered);
        }

        // BLOCK 0 would wait forever; a zero wait is a non-blocking read instead.
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(&self.consumer).arg("COUNT").arg(max_messages);
        let block_ms = millis(wait);
        if block_ms > 0 {
            cmd.arg("BLOCK").arg(block_ms);
        }
        cmd.arg("STREAMS").arg(&key).arg(">");

        let reply: Option<StreamReadReply> = cmd.query(&mut conn).map_err(map_redis_error)?;

        let entries: Vec<StreamId> = reply
            .map(|reply| reply.keys.into_iter().flat_map(|stream| stream.ids).collect())
            .unwrap_or_default();
        let batch = decode_batch(&entries, |_| 1);
        self.discard_undecodable(&mut conn, &key, group, &batch.undecodable)?;
        Ok(batch.messages)
    }

    fn acknowledge(&self, channel: &ChannelRef, ack_id: &AckId) -> Result<(), ChannelError> {
        let mut conn = self.connection()?;
        let acked: u64 = redis::cmd("XACK")
            .arg(stream_key(channel.topic()))
            .arg(channel.subscription())
            .arg(ack_id.as_str())
            .query(&mut conn)
            .map_err(map_redis_error)?;
        if acked == 0 {
            debug!(ack_id = %ack_id, "ack for an entry that is no longer pending");
        }
        Ok(())
    }
}

impl ChannelProvider for RedisStreamsChannel {
    fn create_channel(&self, topic: &str, subscription: &str) -> Result<ChannelRef, ChannelError> {
        let channel = ChannelRef::new(topic, subscription)?;
        let mut conn = self.connection()?;

        // `$`: the subscription only sees messages published after it exists.
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream_key(topic))
            .arg(subscription)
            .arg("$")
            .arg("MKSTREAM")
            .query(&mut conn);

        match created {
            Ok(_) => Ok(channel),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(channel),
            Err(e) => Err(map_redis_error(e)),
        }
    }

    fn delete_channel(&self, channel: &ChannelRef) -> Result<(), ChannelError> {
        let mut conn = self.connection()?;
        let destroyed: u64 = redis::cmd("XGROUP")
            .arg("DESTROY")
            .arg(stream_key(channel.topic()))
            .arg(channel.subscription())
            .query(&mut conn)
            .map_err(map_redis_error)?;
        if destroyed == 0 {
            return Err(ChannelError::NotFound(channel.to_string()));
        }
        Ok(())
    }
}
