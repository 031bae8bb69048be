//! Event fan-out for active models.
//!
//! Each active model owns one or more [`EventChannel`]s. Emitting never
//! blocks: events go into a bounded broadcast buffer and a subscriber that
//! falls behind loses the oldest events instead of stalling ingestion or the
//! liveness sweep.

use std::sync::Arc;

use parking_lot::RwLock;
use spacecommand_common::{MeasurementRecord, MeasurementValue, OfflineRecord, Timestamp};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::binding::ChannelBinding;
use crate::sensed::SensedActiveModel;
use crate::sensor::SensorActiveModel;

/// Default number of buffered events per channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A closable broadcast channel.
#[derive(Debug)]
pub struct EventChannel<T> {
    name: &'static str,
    sender: RwLock<Option<broadcast::Sender<T>>>,
}

impl<T: Clone + Send + 'static> EventChannel<T> {
    /// Create a channel buffering up to `capacity` events per subscriber.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            name,
            sender: RwLock::new(Some(sender)),
        }
    }

    /// Register a new observer.
    ///
    /// Subscribing to a closed channel yields a stream that is already
    /// terminated.
    pub fn subscribe(&self) -> EventStream<T> {
        let receiver = match self.sender.read().as_ref() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        };
        EventStream {
            name: self.name,
            receiver,
            pending: None,
        }
    }

    /// Deliver an event to all current observers.
    ///
    /// Returns the number of observers that will see it.
    pub fn emit(&self, event: T) -> usize {
        match self.sender.read().as_ref() {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Close the channel. Observers drain what is buffered and then see the
    /// end of the stream.
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            tracing::debug!(channel = self.name, "Event channel closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map_or(0, |sender| sender.receiver_count())
    }
}

/// Observer side of an [`EventChannel`].
#[derive(Debug)]
pub struct EventStream<T> {
    name: &'static str,
    receiver: broadcast::Receiver<T>,
    /// Event taken off the receiver by [`EventStream::is_terminated`].
    pending: Option<T>,
}

impl<T: Clone> EventStream<T> {
    /// Wait for the next event.
    ///
    /// Returns `None` once the channel has been closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = self.name, skipped, "Event observer lagging");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = self.name, skipped, "Event observer lagging");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Whether the channel has been closed and everything buffered consumed.
    ///
    /// Never loses an event: one still buffered is kept for the next
    /// `recv` or `try_recv`.
    pub fn is_terminated(&mut self) -> bool {
        if self.pending.is_some() {
            return false;
        }
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    self.pending = Some(event);
                    return false;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(channel = self.name, skipped, "Event observer lagging");
                }
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Closed) => return true,
            }
        }
    }
}

/// A sensor reported a new value on one of its channels.
#[derive(Debug, Clone)]
pub struct SensorValueEvent {
    pub sensor_id: String,
    pub binding: Arc<ChannelBinding>,
    pub value: MeasurementValue,
    pub received_at: Timestamp,
}

/// A sensed entity received a new value for one of its measurement types.
#[derive(Debug, Clone)]
pub struct SensedValueEvent {
    pub sensed_id: String,
    pub binding: Arc<ChannelBinding>,
    pub value: MeasurementValue,
    pub received_at: Timestamp,
}

/// A sensor exceeded its time limit.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorOfflineEvent {
    pub sensor_id: String,
    pub name: String,
    pub detected_at: Timestamp,
    pub last_value_time: Option<Timestamp>,
    pub last_heartbeat_time: Option<Timestamp>,
}

impl SensorOfflineEvent {
    pub fn to_record(&self) -> OfflineRecord {
        OfflineRecord {
            sensor_id: self.sensor_id.clone(),
            name: self.name.clone(),
            detected_at: self.detected_at,
            last_value_time: self.last_value_time,
            last_heartbeat_time: self.last_heartbeat_time,
        }
    }
}

/// A measurement routed from a sensor channel to a sensed entity.
#[derive(Debug, Clone)]
pub struct MeasurementEvent {
    pub sensor: Arc<SensorActiveModel>,
    pub sensed: Arc<SensedActiveModel>,
    pub binding: Arc<ChannelBinding>,
    pub value: MeasurementValue,
    pub received_at: Timestamp,
}

impl MeasurementEvent {
    pub fn to_record(&self) -> MeasurementRecord {
        let detail = self.binding.channel_detail();
        MeasurementRecord {
            sensor_id: self.sensor.sensor_id().to_string(),
            sensed_id: self.sensed.sensed_id().to_string(),
            channel_id: self.binding.channel_id().to_string(),
            measurement_type: detail.measurement_type.clone(),
            measurement_unit: detail.measurement_unit.clone(),
            value: self.value.clone(),
            received_at: self.received_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_observers() {
        let channel: EventChannel<u32> = EventChannel::new("test", 4);
        assert_eq!(channel.emit(1), 0);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn test_fan_out() {
        let channel: EventChannel<u32> = EventChannel::new("test", 4);
        let mut a = channel.subscribe();
        let mut b = channel.subscribe();

        assert_eq!(channel.emit(7), 2);
        assert_eq!(a.try_recv(), Some(7));
        assert_eq!(b.try_recv(), Some(7));
        assert_eq!(a.try_recv(), None);
    }

    #[test]
    fn test_lagging_observer_skips_oldest() {
        let channel: EventChannel<u32> = EventChannel::new("test", 2);
        let mut stream = channel.subscribe();

        for i in 0..5 {
            channel.emit(i);
        }

        assert_eq!(stream.try_recv(), Some(3));
        assert_eq!(stream.try_recv(), Some(4));
        assert_eq!(stream.try_recv(), None);
    }

    #[test]
    fn test_close_drains_then_terminates() {
        let channel: EventChannel<u32> = EventChannel::new("test", 4);
        let mut stream = channel.subscribe();

        channel.emit(1);
        channel.close();
        assert!(channel.is_closed());
        assert_eq!(channel.emit(2), 0);

        assert_eq!(stream.try_recv(), Some(1));
        assert!(stream.is_terminated());
    }

    #[test]
    fn test_termination_check_keeps_buffered_events() {
        let channel: EventChannel<u32> = EventChannel::new("test", 4);
        let mut stream = channel.subscribe();

        assert!(!stream.is_terminated());
        channel.emit(1);
        channel.emit(2);
        channel.close();

        assert!(!stream.is_terminated());
        assert!(!stream.is_terminated());
        assert_eq!(stream.try_recv(), Some(1));
        assert!(!stream.is_terminated());
        assert_eq!(tokio_test::block_on(stream.recv()), Some(2));
        assert!(stream.is_terminated());
        assert_eq!(stream.try_recv(), None);
    }

    #[test]
    fn test_subscribe_after_close() {
        let channel: EventChannel<u32> = EventChannel::new("test", 4);
        channel.close();

        let mut stream = channel.subscribe();
        assert!(stream.is_terminated());
    }

    #[test]
    fn test_recv_skips_lag() {
        let channel: EventChannel<u32> = EventChannel::new("test", 2);
        let mut stream = channel.subscribe();

        for i in 0..4 {
            channel.emit(i);
        }
        channel.close();

        assert_eq!(tokio_test::block_on(stream.recv()), Some(2));
        assert_eq!(tokio_test::block_on(stream.recv()), Some(3));
        assert_eq!(tokio_test::block_on(stream.recv()), None);
    }

    #[tokio::test]
    async fn test_recv_terminal_signal() {
        let channel: Arc<EventChannel<u32>> = Arc::new(EventChannel::new("test", 4));
        let mut stream = channel.subscribe();

        let producer = channel.clone();
        let task = tokio::spawn(async move {
            producer.emit(10);
            producer.close();
        });

        assert_eq!(stream.recv().await, Some(10));
        assert_eq!(stream.recv().await, None);
        task.await.unwrap();
    }
}
