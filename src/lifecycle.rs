//! The process-global lifecycle controller.
//!
//! The controller owns the transport and the handler workers. It is
//! deliberately the only piece of process-global state in the crate: `init`
//! brings the logging core up, `flush` broadcasts a synchronization point,
//! `finalize` tears everything down again, and the whole cycle may repeat
//! (tests rely on that). A child of `fork` owns no workers; it must call
//! [`fork_child_reinit`] followed by [`init`] before logging again, while
//! the parent is unaffected.
//!
//! [`init`]: ./fn.init.html
//! [`fork_child_reinit`]: ./fn.fork_child_reinit.html

use crate::{
    config::Config,
    error::{illegal_state, ErrorKind, Result},
    filter::FilterSet,
    handler::runtime::Worker,
    record::Record,
    registry::Registry,
    transport::{endpoint, Ack, ControlMessage, Endpoint, Transport},
};
use crossbeam_channel::bounded;
use lazy_static::lazy_static;
use std::{
    sync::RwLock,
    time::{Duration, Instant},
};

/// Default deadline for [`flush`] acknowledgements.
///
/// [`flush`]: ./fn.flush.html
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Bound on waiting for a handler to report `init` success or failure.
const INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Margin on top of the drain deadline before a worker is abandoned.
const JOIN_MARGIN: Duration = Duration::from_secs(1);

struct Core {
    pid: u32,
    transport: Transport,
    workers: Vec<Worker>,
    max_drain_deadline: Duration,
}

lazy_static! {
    static ref CONTROLLER: RwLock<Option<Core>> = RwLock::new(None);
}

/// Initializes the logging core: allocates the transport, starts one
/// worker per configured handler and waits for each to open its sink.
/// Partial failure tears down the already started workers and reports the
/// failing handler. Re-initialization without an intervening `finalize`
/// fails with `IllegalState`.
pub fn init(mut config: Config) -> Result<()> {
    let mut state = CONTROLLER.write().expect("controller lock poisoned");
    if state.is_some() {
        return illegal_state("logging already initialized");
    }

    crate::producer::set_format_buf_size(config.format_buf_size);

    let progname = config.progname().to_string();
    let backpressure = config.backpressure_timeout;
    let mut endpoints: Vec<Endpoint> = vec![];
    let mut workers: Vec<Worker> = vec![];
    let mut max_drain_deadline = Duration::from_secs(0);

    for handler_config in config.take_handlers() {
        let common = handler_config.common.clone();
        let name = handler_config.instance_name();
        max_drain_deadline = max_drain_deadline.max(common.drain_deadline);

        let (tx, rx) = endpoint(name, common.data_hwm, common.ctrl_hwm);
        let handler = handler_config.build(&progname);
        let spawned = Worker::spawn(handler, rx, common.worker_options());
        let worker = match spawned {
            Ok(worker) => worker,
            Err(error) => {
                teardown(&endpoints, workers, max_drain_deadline);
                return Err(error);
            }
        };
        if let Err(error) = worker.wait_ready(INIT_TIMEOUT) {
            // The failed worker exits by itself; stop the healthy ones.
            teardown(&endpoints, workers, max_drain_deadline);
            return Err(error);
        }
        endpoints.push(tx);
        workers.push(worker);
    }

    *state = Some(Core {
        pid: std::process::id(),
        transport: Transport::new(endpoints, backpressure),
        workers,
        max_drain_deadline,
    });
    Ok(())
}

/// Stops the given (healthy) workers without flushing. Used when `init`
/// fails halfway through.
fn teardown(endpoints: &[Endpoint], workers: Vec<Worker>, drain_deadline: Duration) {
    let (ack_tx, _ack_rx) = bounded::<Ack>(endpoints.len().max(1));
    for tx in endpoints {
        tx.send_ctrl(ControlMessage::Exit {
            flush: false,
            ack: ack_tx.clone(),
        });
    }
    for worker in workers {
        let _ = worker.join(drain_deadline + JOIN_MARGIN);
    }
}

/// True between a successful `init` and the next `finalize`.
pub fn is_initialized() -> bool {
    CONTROLLER
        .read()
        .expect("controller lock poisoned")
        .is_some()
}

/// Hands one record to the transport. The caller has already passed the
/// logger-level check.
pub(crate) fn dispatch(record: Record) -> Result<()> {
    let state = CONTROLLER.read().expect("controller lock poisoned");
    match state.as_ref() {
        Some(core) => {
            if core.pid != std::process::id() {
                return illegal_state("logging not reinitialized after fork");
            }
            core.transport.publish(record);
            Ok(())
        }
        None => illegal_state("logging not initialized"),
    }
}

/// Per-handler counts of records dropped under backpressure since `init`.
pub fn lost_logs() -> Result<Vec<(String, u64)>> {
    let state = CONTROLLER.read().expect("controller lock poisoned");
    match state.as_ref() {
        Some(core) => Ok(core
            .transport
            .endpoints()
            .iter()
            .map(|tx| (tx.name().to_string(), tx.lost_logs()))
            .collect()),
        None => illegal_state("logging not initialized"),
    }
}

/// Broadcasts a flush with the default deadline. See
/// [`flush_with_deadline`].
///
/// [`flush_with_deadline`]: ./fn.flush_with_deadline.html
pub fn flush() -> Result<()> {
    flush_with_deadline(DEFAULT_FLUSH_TIMEOUT)
}

/// Broadcasts a flush on every handler's control channel and waits for all
/// acknowledgements. When the deadline expires, handlers that have not
/// acknowledged are marked degraded but keep running. On return with
/// success, every record enqueued by the calling thread before this call
/// has been processed by every handler that admitted it.
pub fn flush_with_deadline(deadline: Duration) -> Result<()> {
    let state = CONTROLLER.read().expect("controller lock poisoned");
    let core = match state.as_ref() {
        Some(core) => core,
        None => return illegal_state("logging not initialized"),
    };

    let endpoints = core.transport.endpoints();
    let (ack_tx, ack_rx) = bounded::<Ack>(endpoints.len().max(1));
    let mut expected = vec![];
    for tx in endpoints {
        if tx.send_ctrl(ControlMessage::Flush(ack_tx.clone())) {
            expected.push(tx.name().to_string());
        }
    }
    drop(ack_tx);

    let mut causes: Vec<String> = vec![];
    let limit = Instant::now() + deadline;
    while !expected.is_empty() {
        let remaining = match limit.checked_duration_since(Instant::now()) {
            Some(remaining) => remaining,
            None => break,
        };
        match ack_rx.recv_timeout(remaining) {
            Ok(ack) => {
                // Names may repeat (two file handlers); one ack settles
                // one instance.
                if let Some(position) = expected.iter().position(|name| *name == ack.handler) {
                    expected.remove(position);
                }
                if let Some(error) = ack.error {
                    causes.push(format!("{}: {}", ack.handler, error));
                }
            }
            Err(_) => break,
        }
    }
    for name in &expected {
        if let Some(tx) = endpoints.iter().find(|tx| tx.name() == *name) {
            tx.set_degraded();
        }
        causes.push(format!("{}: no acknowledgement within {:?}", name, deadline));
    }

    if causes.is_empty() {
        Ok(())
    } else {
        Err(ErrorKind::FlushFailed(causes.len(), causes).into())
    }
}

/// Transitions every handler to exiting (draining first when `flush_first`
/// is set), joins the workers and releases the transport. A worker that
/// ignores its drain deadline is abandoned to the OS and reported in the
/// aggregate result. After `finalize`, `init` may be called again.
pub fn finalize(flush_first: bool) -> Result<()> {
    let mut state = CONTROLLER.write().expect("controller lock poisoned");
    let core = match state.take() {
        Some(core) => core,
        None => return illegal_state("logging not initialized"),
    };

    let endpoints = core.transport.endpoints();
    let (ack_tx, _ack_rx) = bounded::<Ack>(endpoints.len().max(1));
    for tx in endpoints {
        tx.send_ctrl(ControlMessage::Exit {
            flush: flush_first,
            ack: ack_tx.clone(),
        });
    }
    drop(ack_tx);

    let mut causes: Vec<String> = vec![];
    let join_deadline = core.max_drain_deadline + JOIN_MARGIN;
    for worker in core.workers {
        let name = worker.name().to_string();
        if let Err(error) = worker.join(join_deadline) {
            causes.push(format!("{}: {}", name, error));
        }
    }

    if causes.is_empty() {
        Ok(())
    } else {
        Err(ErrorKind::FlushFailed(causes.len(), causes).into())
    }
}

/// Replaces the registry-wide filter set and pushes the snapshot to every
/// handler worker.
pub fn reconfigure(filters: FilterSet) -> Result<()> {
    Registry::global().set_filters(filters.clone());
    let state = CONTROLLER.read().expect("controller lock poisoned");
    if let Some(core) = state.as_ref() {
        for tx in core.transport.endpoints() {
            tx.send_ctrl(ControlMessage::Reconfigure(filters.clone()));
        }
    }
    Ok(())
}

/// Drops the (inherited, thread-less) logging state in a forked child so
/// `init` can be called again. The parent's state is its own and remains
/// untouched by this call in the child.
pub fn fork_child_reinit() {
    let mut state = CONTROLLER.write().expect("controller lock poisoned");
    if let Some(core) = state.take() {
        // The worker threads did not survive the fork; just forget them.
        for worker in core.workers {
            worker.forget();
        }
    }
}
