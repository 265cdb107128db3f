//! The producer/consumer transport.
//!
//! Every handler owns a pair of bounded channels: a *data* channel carrying
//! [`Record`]s and a *control* channel carrying [`ControlMessage`]s, so that
//! flush and exit requests can never be starved behind a full data queue.
//! The [`Transport`] is the producer-side fan-out over all handler
//! endpoints.
//!
//! Backpressure policy: when a handler's data channel is full the record is
//! dropped *for that handler only* and its `lost_logs` counter is bumped;
//! records at [`Level::Critical`] or worse instead block for a bounded
//! timeout before falling back to the drop. Control sends block and are
//! never dropped.
//!
//! [`Record`]: ../record/struct.Record.html
//! [`ControlMessage`]: ./enum.ControlMessage.html
//! [`Transport`]: ./struct.Transport.html
//! [`Level::Critical`]: ../level/enum.Level.html#variant.Critical

use crate::{filter::FilterSet, level::Level, record::Record};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// Default high-water mark of the data channel, in records.
pub const DEFAULT_DATA_HWM: usize = 1000;
/// Default high-water mark of the control channel, in messages.
pub const DEFAULT_CTRL_HWM: usize = 1000;
/// Default bounded-send timeout for records at `Critical` or worse.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_millis(500);

/// Acknowledgement posted by a handler worker for `Flush` and `Exit`.
#[derive(Clone, Debug)]
pub struct Ack {
    pub handler: String,
    pub error: Option<String>,
}

/// Control messages, dispatched to every handler worker.
#[derive(Clone, Debug)]
pub enum ControlMessage {
    /// Drain the data channel, strongly flush the sink, then acknowledge.
    Flush(Sender<Ack>),
    /// Install a new per-handler filter set snapshot.
    Reconfigure(FilterSet),
    /// Leave the running state. With `flush` set, drain the data channel
    /// (bounded by the drain deadline) before closing the sink.
    Exit { flush: bool, ack: Sender<Ack> },
}

/// Producer-side endpoint of one handler's channel pair.
#[derive(Clone, Debug)]
pub struct Endpoint {
    name: String,
    data: Sender<Record>,
    ctrl: Sender<ControlMessage>,
    lost_logs: Arc<AtomicU64>,
    degraded: Arc<AtomicBool>,
}

/// Consumer-side endpoint, owned by the handler worker.
#[derive(Debug)]
pub struct WorkerChannels {
    pub data: Receiver<Record>,
    pub ctrl: Receiver<ControlMessage>,
    pub lost_logs: Arc<AtomicU64>,
}

/// Creates the channel pair for one handler.
pub fn endpoint(name: impl Into<String>, data_hwm: usize, ctrl_hwm: usize) -> (Endpoint, WorkerChannels) {
    let (data_tx, data_rx) = bounded(data_hwm);
    let (ctrl_tx, ctrl_rx) = bounded(ctrl_hwm);
    let lost_logs = Arc::new(AtomicU64::new(0));
    (
        Endpoint {
            name: name.into(),
            data: data_tx,
            ctrl: ctrl_tx,
            lost_logs: lost_logs.clone(),
            degraded: Arc::new(AtomicBool::new(false)),
        },
        WorkerChannels {
            data: data_rx,
            ctrl: ctrl_rx,
            lost_logs,
        },
    )
}

impl Endpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of records dropped for this handler so far.
    pub fn lost_logs(&self) -> u64 {
        self.lost_logs.load(Ordering::Relaxed)
    }

    /// Marks the handler degraded (it missed a flush deadline).
    pub fn set_degraded(&self) {
        self.degraded.store(true, Ordering::Relaxed);
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Sends one record, applying the backpressure policy.
    fn send_data(&self, record: Record, backpressure: Duration) {
        match self.data.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                if record.level() <= Level::Critical {
                    if self.data.send_timeout(record, backpressure).is_err() {
                        self.lost_logs.fetch_add(1, Ordering::Relaxed);
                    }
                } else {
                    self.lost_logs.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                // Worker already gone; account the loss.
                self.lost_logs.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Sends one control message. Blocks until there is room; control is
    /// never dropped. Returns false if the worker side is disconnected.
    pub fn send_ctrl(&self, message: ControlMessage) -> bool {
        self.ctrl.send(message).is_ok()
    }
}

/// The many-producer fan-out over all handler endpoints.
#[derive(Debug)]
pub struct Transport {
    endpoints: Vec<Endpoint>,
    backpressure: Duration,
}

impl Transport {
    pub fn new(endpoints: Vec<Endpoint>, backpressure: Duration) -> Transport {
        Transport {
            endpoints,
            backpressure,
        }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Delivers a record to every handler. Per-handler admission is
    /// re-checked by each worker against its own filter snapshot; the
    /// transport only applies the backpressure policy.
    pub fn publish(&self, record: Record) {
        let last = self.endpoints.len().saturating_sub(1);
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            if index == last {
                endpoint.send_data(record, self.backpressure);
                break;
            }
            endpoint.send_data(record.clone(), self.backpressure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::SystemTime};

    fn record(level: Level, n: u32) -> Record {
        Record::new(
            "t",
            format!("msg {}", n),
            level,
            SystemTime::now(),
            1,
            2,
            0,
            "f.rs",
            "f",
            n,
        )
    }

    #[test]
    fn fan_out_reaches_every_endpoint() {
        let (a_tx, a_rx) = endpoint("a", 10, 10);
        let (b_tx, b_rx) = endpoint("b", 10, 10);
        let transport = Transport::new(vec![a_tx, b_tx], DEFAULT_BACKPRESSURE_TIMEOUT);
        transport.publish(record(Level::Info, 1));
        assert_eq!(a_rx.data.recv().unwrap().payload(), "msg 1");
        assert_eq!(b_rx.data.recv().unwrap().payload(), "msg 1");
    }

    #[test]
    fn per_producer_order_is_preserved() {
        let (tx, rx) = endpoint("a", 100, 10);
        let transport = Transport::new(vec![tx], DEFAULT_BACKPRESSURE_TIMEOUT);
        for n in 0..50 {
            transport.publish(record(Level::Info, n));
        }
        for n in 0..50 {
            assert_eq!(rx.data.recv().unwrap().line(), n);
        }
    }

    #[test]
    fn full_channel_drops_and_counts_for_that_handler_only() {
        let (full_tx, _full_rx) = endpoint("full", 4, 10);
        let (open_tx, open_rx) = endpoint("open", 100, 10);
        let transport = Transport::new(
            vec![full_tx, open_tx],
            Duration::from_millis(1),
        );
        for n in 0..10 {
            transport.publish(record(Level::Info, n));
        }
        assert_eq!(transport.endpoints()[0].lost_logs(), 6);
        assert_eq!(transport.endpoints()[1].lost_logs(), 0);
        assert_eq!(open_rx.data.len(), 10);
    }

    #[test]
    fn critical_records_block_until_room() {
        let (tx, rx) = endpoint("a", 1, 10);
        let transport = Transport::new(vec![tx], Duration::from_secs(10));
        transport.publish(record(Level::Critical, 0));
        let drainer = thread::spawn(move || {
            let mut got = vec![];
            for _ in 0..2 {
                got.push(rx.data.recv().unwrap().line());
            }
            got
        });
        transport.publish(record(Level::Critical, 1));
        assert_eq!(drainer.join().unwrap(), vec![0, 1]);
        assert_eq!(transport.endpoints()[0].lost_logs(), 0);
    }

    #[test]
    fn control_send_reports_disconnect() {
        let (tx, rx) = endpoint("a", 1, 1);
        drop(rx);
        let (ack_tx, _ack_rx) = bounded(1);
        assert!(!tx.send_ctrl(ControlMessage::Flush(ack_tx)));
    }
}
