//! The per-handler worker runtime.
//!
//! Each handler instance is driven by one worker thread running a small
//! state machine: initialize the sink, then poll the control and data
//! channels until an exit request (or a fatal condition) is dispatched.
//! Control is checked eagerly on every iteration so a full data queue can
//! never starve flush or exit requests.
//!
//! The worker also owns the handler's error policy: sink errors are
//! recorded once per distinct rendering, duplicates are suppressed, and a
//! handler exceeding its distinct-error budget is escalated to exit.

use crate::{
    error::{Error, ErrorKind, Result},
    handler::Handler,
    transport::{Ack, ControlMessage, WorkerChannels},
};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use std::{
    collections::HashSet,
    sync::atomic::Ordering,
    thread,
    time::{Duration, Instant},
};

/// Default worker poll timeout; an expiry with no messages triggers an
/// implicit flush.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);
/// Default bound on draining the data channel during flush and exit.
pub const DEFAULT_DRAIN_DEADLINE: Duration = Duration::from_secs(2);
/// Default number of distinct errors a handler may report before it is
/// escalated to exit.
pub const DEFAULT_ERROR_BUDGET: usize = 10;

/// Tunables of one worker.
#[derive(Clone, Debug)]
pub struct WorkerOptions {
    pub poll_timeout: Duration,
    pub drain_deadline: Duration,
    pub error_budget: usize,
}

impl Default for WorkerOptions {
    fn default() -> WorkerOptions {
        WorkerOptions {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            drain_deadline: DEFAULT_DRAIN_DEADLINE,
            error_budget: DEFAULT_ERROR_BUDGET,
        }
    }
}

/// A started worker: its join handle plus the readiness report of its
/// `init` call.
#[derive(Debug)]
pub struct Worker {
    name: String,
    thread: Option<thread::JoinHandle<Result<()>>>,
    ready: Receiver<std::result::Result<(), String>>,
}

impl Worker {
    /// Spawns the worker thread for `handler`. The thread initializes the
    /// sink, reports readiness, then enters the poll loop.
    pub fn spawn(
        mut handler: Box<dyn Handler>,
        channels: WorkerChannels,
        options: WorkerOptions,
    ) -> Result<Worker> {
        let name = handler.name().to_string();
        let (ready_tx, ready_rx) = bounded(1);
        let thread = thread::Builder::new()
            .name(format!("fanlog-{}", name))
            .spawn(move || {
                crate::signal::mask_fatal_signals();
                match handler.init() {
                    Ok(()) => {
                        let _ = ready_tx.send(Ok(()));
                        run(handler.as_mut(), &channels, &options)
                    }
                    Err(error) => {
                        let _ = ready_tx.send(Err(error.to_string()));
                        Err(error)
                    }
                }
            })
            .map_err(Error::from)?;
        Ok(Worker {
            name,
            thread: Some(thread),
            ready: ready_rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drops the join handle without joining. For forked children, whose
    /// worker threads do not exist.
    pub fn forget(mut self) {
        self.thread = None;
    }

    /// Waits for the worker's `init` outcome.
    pub fn wait_ready(&self, timeout: Duration) -> Result<()> {
        match self.ready.recv_timeout(timeout) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(ErrorKind::HandlerExit(format!(
                "handler '{}' failed to initialize: {}",
                self.name, message
            ))
            .into()),
            Err(_) => Err(ErrorKind::HandlerExit(format!(
                "handler '{}' did not report readiness",
                self.name
            ))
            .into()),
        }
    }

    /// Joins the worker thread, bounded by `deadline`. A worker that fails
    /// to terminate in time is abandoned to the OS and reported as an
    /// error.
    pub fn join(mut self, deadline: Duration) -> Result<()> {
        let handle = match self.thread.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };
        let limit = Instant::now() + deadline;
        while Instant::now() < limit {
            if handle.is_finished() {
                return match handle.join() {
                    Ok(result) => result,
                    Err(_) => Err(ErrorKind::HandlerExit(format!(
                        "handler '{}' worker panicked",
                        self.name
                    ))
                    .into()),
                };
            }
            thread::sleep(Duration::from_millis(1));
        }
        // Abandoned: the thread and its sink resources leak to the OS.
        Err(ErrorKind::HandlerExit(format!(
            "handler '{}' ignored its exit deadline and was abandoned",
            self.name
        ))
        .into())
    }
}

enum Flow {
    Continue,
    Exit,
}

struct ErrorSet {
    seen: HashSet<String>,
}

impl ErrorSet {
    fn new() -> ErrorSet {
        ErrorSet {
            seen: HashSet::new(),
        }
    }

    /// Returns true if this rendering has not been recorded before.
    fn record(&mut self, error: &Error) -> bool {
        self.seen.insert(error.to_string())
    }

    fn distinct(&self) -> usize {
        self.seen.len()
    }
}

fn run(
    handler: &mut dyn Handler,
    channels: &WorkerChannels,
    options: &WorkerOptions,
) -> Result<()> {
    let mut errors = ErrorSet::new();
    let mut exit_error = None;
    loop {
        // Control first: it must not be starved behind data.
        match channels.ctrl.try_recv() {
            Ok(message) => {
                if let Flow::Exit = dispatch(handler, channels, options, &mut errors, message)? {
                    break;
                }
                continue;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                orderly_close(handler, channels, &errors);
                break;
            }
        }

        crossbeam_channel::select! {
            recv(channels.ctrl) -> message => match message {
                Ok(message) => {
                    if let Flow::Exit =
                        dispatch(handler, channels, options, &mut errors, message)?
                    {
                        break;
                    }
                }
                Err(_) => {
                    orderly_close(handler, channels, &errors);
                    break;
                }
            },
            recv(channels.data) -> record => match record {
                Ok(record) => {
                    if let Err(error) = consume(handler, &record, &mut errors, options) {
                        exit_error = Some(error);
                        orderly_close(handler, channels, &errors);
                        break;
                    }
                }
                Err(_) => {
                    orderly_close(handler, channels, &errors);
                    break;
                }
            },
            default(options.poll_timeout) => {
                // Idle tick.
                let _ = handler.process_implicit_flush();
            }
        }
    }
    match exit_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Feeds one record through consumer-side admission and the sink, applying
/// the error policy. An `Err` return means the error budget was exceeded
/// and the worker must exit.
fn consume(
    handler: &mut dyn Handler,
    record: &crate::record::Record,
    errors: &mut ErrorSet,
    options: &WorkerOptions,
) -> Result<()> {
    if !handler.filters().admits(record.logger(), record.level()) {
        return Ok(());
    }
    if let Err(error) = handler.process_log(record) {
        note_error(handler, error, errors)?;
        if errors.distinct() > options.error_budget {
            return Err(ErrorKind::HandlerExit(format!(
                "handler '{}': {}",
                handler.name(),
                ErrorKind::TooManyErrors(errors.distinct())
            ))
            .into());
        }
    }
    Ok(())
}

/// Records an error once and lets the handler apply its own policy to it.
/// Duplicates are suppressed.
fn note_error(handler: &mut dyn Handler, error: Error, errors: &mut ErrorSet) -> Result<()> {
    if errors.record(&error) {
        if let Err(secondary) = handler.process_err(&error) {
            errors.record(&secondary);
        }
    }
    Ok(())
}

fn dispatch(
    handler: &mut dyn Handler,
    channels: &WorkerChannels,
    options: &WorkerOptions,
    errors: &mut ErrorSet,
    message: ControlMessage,
) -> Result<Flow> {
    match message {
        ControlMessage::Flush(ack) => {
            drain(handler, channels, options, errors);
            let result = handler.process_explicit_flush();
            let error = result.as_ref().err().map(ToString::to_string);
            if let Err(error) = result {
                let _ = note_error(handler, error, errors);
            }
            let _ = ack.send(Ack {
                handler: handler.name().to_string(),
                error,
            });
            Ok(Flow::Continue)
        }
        ControlMessage::Reconfigure(filters) => {
            if let Err(error) = handler.process_cfg(filters) {
                let _ = note_error(handler, error, errors);
            }
            Ok(Flow::Continue)
        }
        ControlMessage::Exit { flush, ack } => {
            if flush {
                drain(handler, channels, options, errors);
            }
            let result = handler.process_exit();
            summarize(handler, channels, errors);
            let _ = ack.send(Ack {
                handler: handler.name().to_string(),
                error: result.err().map(|e| e.to_string()),
            });
            Ok(Flow::Exit)
        }
    }
}

/// Processes queued records until the data channel is momentarily empty or
/// the drain deadline expires.
fn drain(
    handler: &mut dyn Handler,
    channels: &WorkerChannels,
    options: &WorkerOptions,
    errors: &mut ErrorSet,
) {
    let deadline = Instant::now() + options.drain_deadline;
    while let Ok(record) = channels.data.try_recv() {
        if handler.filters().admits(record.logger(), record.level()) {
            if let Err(error) = handler.process_log(&record) {
                let _ = note_error(handler, error, errors);
            }
        }
        if Instant::now() >= deadline {
            break;
        }
    }
}

/// Close path for a worker whose controller vanished: best-effort drain and
/// shut the sink.
fn orderly_close(handler: &mut dyn Handler, channels: &WorkerChannels, errors: &ErrorSet) {
    while let Ok(record) = channels.data.try_recv() {
        if handler.filters().admits(record.logger(), record.level()) {
            let _ = handler.process_log(&record);
        }
    }
    let _ = handler.process_exit();
    summarize(handler, channels, errors);
}

/// One line to stderr when records were lost or errors were recorded, even
/// if the sink itself is broken.
fn summarize(handler: &dyn Handler, channels: &WorkerChannels, errors: &ErrorSet) {
    let lost = channels.lost_logs.load(Ordering::Relaxed);
    if lost > 0 || errors.distinct() > 0 {
        eprintln!(
            "fanlog handler '{}': {} lost log(s), {} distinct error(s)",
            handler.name(),
            lost,
            errors.distinct()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::proto_err,
        filter::FilterSet,
        level::Level,
        record::Record,
        transport::{endpoint, ControlMessage},
    };
    use std::{
        sync::{Arc, Mutex},
        time::SystemTime,
    };

    struct Collecting {
        filters: FilterSet,
        sink: Arc<Mutex<Vec<String>>>,
        fail_on: Option<String>,
        exited: Arc<Mutex<bool>>,
    }

    impl Collecting {
        fn boxed(
            filters: FilterSet,
        ) -> (Box<Collecting>, Arc<Mutex<Vec<String>>>, Arc<Mutex<bool>>) {
            let sink = Arc::new(Mutex::new(vec![]));
            let exited = Arc::new(Mutex::new(false));
            (
                Box::new(Collecting {
                    filters,
                    sink: sink.clone(),
                    fail_on: None,
                    exited: exited.clone(),
                }),
                sink,
                exited,
            )
        }
    }

    impl Handler for Collecting {
        fn name(&self) -> &str {
            "collecting"
        }
        fn filters(&self) -> &FilterSet {
            &self.filters
        }
        fn init(&mut self) -> Result<()> {
            Ok(())
        }
        fn process_log(&mut self, record: &Record) -> Result<()> {
            if let Some(bad) = &self.fail_on {
                if record.payload() == bad {
                    return proto_err("poisoned payload");
                }
            }
            self.sink.lock().unwrap().push(record.payload().to_string());
            Ok(())
        }
        fn process_exit(&mut self) -> Result<()> {
            *self.exited.lock().unwrap() = true;
            Ok(())
        }
        fn process_cfg(&mut self, filters: FilterSet) -> Result<()> {
            self.filters = filters;
            Ok(())
        }
    }

    fn record(logger: &str, level: Level, payload: &str) -> Record {
        Record::new(
            logger,
            payload,
            level,
            SystemTime::now(),
            1,
            2,
            0,
            "f.rs",
            "f",
            1,
        )
    }

    #[test]
    fn worker_processes_flushes_and_exits_in_order() {
        let (tx, rx) = endpoint("collecting", 16, 16);
        let (handler, sink, exited) = Collecting::boxed(FilterSet::new());
        let worker = Worker::spawn(handler, rx, WorkerOptions::default()).unwrap();
        worker.wait_ready(Duration::from_secs(1)).unwrap();

        let transport =
            crate::transport::Transport::new(vec![tx.clone()], Duration::from_millis(100));
        for n in 0..5 {
            transport.publish(record("a", Level::Info, &format!("m{}", n)));
        }

        let (ack_tx, ack_rx) = bounded(1);
        assert!(tx.send_ctrl(ControlMessage::Flush(ack_tx)));
        let ack = ack_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(ack.error.is_none());
        assert_eq!(
            *sink.lock().unwrap(),
            vec!["m0", "m1", "m2", "m3", "m4"]
        );

        let (ack_tx, ack_rx) = bounded(1);
        assert!(tx.send_ctrl(ControlMessage::Exit {
            flush: true,
            ack: ack_tx
        }));
        ack_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        worker.join(Duration::from_secs(1)).unwrap();
        assert!(*exited.lock().unwrap());
    }

    #[test]
    fn consumer_side_admission_uses_handler_filters() {
        let (tx, rx) = endpoint("collecting", 16, 16);
        let (handler, sink, _) =
            Collecting::boxed(":warning".parse().unwrap());
        let worker = Worker::spawn(handler, rx, WorkerOptions::default()).unwrap();
        worker.wait_ready(Duration::from_secs(1)).unwrap();

        let transport = crate::transport::Transport::new(vec![tx.clone()], Duration::from_millis(100));
        transport.publish(record("a", Level::Info, "filtered"));
        transport.publish(record("a", Level::Error, "admitted"));

        let (ack_tx, ack_rx) = bounded(1);
        tx.send_ctrl(ControlMessage::Flush(ack_tx));
        ack_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(*sink.lock().unwrap(), vec!["admitted"]);

        let (ack_tx, ack_rx) = bounded(1);
        tx.send_ctrl(ControlMessage::Exit { flush: false, ack: ack_tx });
        ack_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        worker.join(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn reconfigure_installs_new_snapshot() {
        let (tx, rx) = endpoint("collecting", 16, 16);
        let (handler, sink, _) = Collecting::boxed(":panic".parse().unwrap());
        let worker = Worker::spawn(handler, rx, WorkerOptions::default()).unwrap();
        worker.wait_ready(Duration::from_secs(1)).unwrap();

        let transport = crate::transport::Transport::new(vec![tx.clone()], Duration::from_millis(100));
        tx.send_ctrl(ControlMessage::Reconfigure(":lowest".parse().unwrap()));
        // Barrier: the snapshot is installed once the flush is
        // acknowledged.
        let (ack_tx, ack_rx) = bounded(1);
        tx.send_ctrl(ControlMessage::Flush(ack_tx));
        ack_rx.recv_timeout(Duration::from_secs(1)).unwrap();

        transport.publish(record("a", Level::Debug, "now visible"));

        let (ack_tx, ack_rx) = bounded(1);
        tx.send_ctrl(ControlMessage::Flush(ack_tx));
        ack_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(*sink.lock().unwrap(), vec!["now visible"]);

        let (ack_tx, ack_rx) = bounded(1);
        tx.send_ctrl(ControlMessage::Exit { flush: false, ack: ack_tx });
        ack_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        worker.join(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn error_budget_escalates_to_exit() {
        let (tx, rx) = endpoint("collecting", 64, 16);
        let sink = Arc::new(Mutex::new(vec![]));
        let exited = Arc::new(Mutex::new(false));
        let handler = Box::new(Collecting {
            filters: FilterSet::new(),
            sink: sink.clone(),
            fail_on: Some("bad".to_string()),
            exited: exited.clone(),
        });
        let options = WorkerOptions {
            error_budget: 0,
            ..WorkerOptions::default()
        };
        let worker = Worker::spawn(handler, rx, options).unwrap();
        worker.wait_ready(Duration::from_secs(1)).unwrap();

        let transport = crate::transport::Transport::new(vec![tx], Duration::from_millis(100));
        transport.publish(record("a", Level::Info, "bad"));

        let result = worker.join(Duration::from_secs(2));
        assert!(result.is_err());
        assert!(*exited.lock().unwrap());
    }
}
