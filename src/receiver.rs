//! The remote receiver.
//!
//! Subscribes to one or more remote publishers (see
//! [`handler::remote`]) and re-injects every received record into the
//! local logging core, subject to the local filters. The blocking entry
//! point [`recv`] returns once every connected publisher has announced its
//! exit on the `.ctrl/exit` topic; the [`RemoteReceiver`] variant runs the
//! same loop on a worker thread and can be unblocked early with
//! [`RemoteReceiver::stop`], which posts a local control message.
//!
//! [`handler::remote`]: ../handler/remote/index.html
//! [`recv`]: ./fn.recv.html
//! [`RemoteReceiver`]: ./struct.RemoteReceiver.html
//! [`RemoteReceiver::stop`]: ./struct.RemoteReceiver.html#method.stop

use crate::{
    error::{bad_cfg, Error, Result},
    record::Record,
    registry::Registry,
    wire,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::{
    io::Read,
    net::{TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

/// Parameters of the receiver.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceiverConfig {
    /// `tcp://host:port` endpoints to subscribe to.
    pub urls: Vec<String>,
    /// Bind the URLs and wait for publishers to connect, instead of
    /// connecting to bound publishers.
    pub bind: bool,
}

enum Event {
    Record(Box<Record>),
    PublisherConnected,
    PublisherExited,
    PublisherClosed,
    Failed(Error),
}

/// Receives until all connected publishers have exited. Blocking.
pub fn recv(config: &ReceiverConfig) -> Result<()> {
    let (_stop_tx, stop_rx) = unbounded();
    recv_until_stopped(config, &stop_rx)
}

/// The asynchronous receiver: same loop as [`recv`], on its own thread.
///
/// [`recv`]: ./fn.recv.html
#[derive(Debug)]
pub struct RemoteReceiver {
    stop_tx: Sender<()>,
    handle: thread::JoinHandle<Result<()>>,
}

impl RemoteReceiver {
    /// Starts the receive loop on a worker thread.
    pub fn start(config: ReceiverConfig) -> Result<RemoteReceiver> {
        let (stop_tx, stop_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("fanlog-receiver".to_string())
            .spawn(move || {
                crate::signal::mask_fatal_signals();
                recv_until_stopped(&config, &stop_rx)
            })
            .map_err(Error::from)?;
        Ok(RemoteReceiver { stop_tx, handle })
    }

    /// Unblocks and joins the receive loop.
    pub fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(());
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => crate::error::handler_exit("receiver thread panicked"),
        }
    }
}

fn recv_until_stopped(config: &ReceiverConfig, stop: &Receiver<()>) -> Result<()> {
    if config.urls.is_empty() {
        return bad_cfg("at least one URL is required");
    }

    let done = Arc::new(AtomicBool::new(false));
    let (events_tx, events_rx) = unbounded();
    let mut connected: usize = 0;

    if config.bind {
        for url in &config.urls {
            let authority = wire::tcp_authority(url)?;
            let listener = TcpListener::bind(authority)?;
            listener.set_nonblocking(true)?;
            spawn_acceptor(listener, events_tx.clone(), done.clone());
        }
    } else {
        for url in &config.urls {
            let authority = wire::tcp_authority(url)?.to_string();
            let mut stream = TcpStream::connect(&authority)
                .map_err(|error| -> Error {
                    crate::error::ErrorKind::BadConfig(format!(
                        "cannot connect to '{}': {}",
                        url, error
                    ))
                    .into()
                })?;
            wire::write_frames(&mut stream, &[wire::SUBSCRIBE_HELLO.as_bytes()])?;
            connected += 1;
            spawn_reader(stream, events_tx.clone(), done.clone());
        }
    }
    drop(events_tx);

    let mut exited: usize = 0;
    let mut alive = connected;
    let result = loop {
        crossbeam_channel::select! {
            recv(events_rx) -> event => match event {
                Ok(Event::Record(record)) => inject(*record),
                Ok(Event::PublisherConnected) => {
                    connected += 1;
                    alive += 1;
                }
                Ok(Event::PublisherExited) => exited += 1,
                Ok(Event::PublisherClosed) => alive = alive.saturating_sub(1),
                Ok(Event::Failed(error)) => break Err(error),
                Err(_) => break Ok(()),
            },
            recv(stop) -> _ => break Ok(()),
        }
        // All connected publishers announced their exit, or everyone hung
        // up without one.
        if connected > 0 && exited >= connected {
            break Ok(());
        }
        if !config.bind && alive == 0 {
            break Ok(());
        }
    };
    done.store(true, Ordering::SeqCst);
    result
}

/// Re-injects a remote record through the local filters and transport.
fn inject(record: Record) {
    let logger = Registry::global().get_or_create(record.logger());
    if !logger.enabled(record.level()) {
        return;
    }
    if let Err(error) = crate::lifecycle::dispatch(record) {
        crate::producer::report_producer_error(&error);
    }
}

fn spawn_acceptor(listener: TcpListener, events: Sender<Event>, done: Arc<AtomicBool>) {
    let _ = thread::Builder::new()
        .name("fanlog-receiver-accept".to_string())
        .spawn(move || {
            crate::signal::mask_fatal_signals();
            while !done.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let _ = stream.set_nonblocking(false);
                        if events.send(Event::PublisherConnected).is_err() {
                            return;
                        }
                        spawn_reader(stream, events.clone(), done.clone());
                    }
                    Err(ref error)
                        if error.kind() == std::io::ErrorKind::WouldBlock =>
                    {
                        thread::sleep(Duration::from_millis(50));
                    }
                    Err(_) => return,
                }
            }
        });
}

fn spawn_reader(stream: TcpStream, events: Sender<Event>, done: Arc<AtomicBool>) {
    let _ = thread::Builder::new()
        .name("fanlog-receiver-read".to_string())
        .spawn(move || {
            crate::signal::mask_fatal_signals();
            let mut stream = stream;
            loop {
                match read_message(&mut stream, &done) {
                    Ok(Some(frames)) => {
                        if let Some(event) = classify(&frames) {
                            if events.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => {
                        let _ = events.send(Event::PublisherClosed);
                        return;
                    }
                    Err(error) => {
                        let _ = events.send(Event::Failed(error));
                        return;
                    }
                }
            }
        });
}

/// Maps one wire message to a receiver event. Unknown topics are ignored.
fn classify(frames: &[Vec<u8>]) -> Option<Event> {
    if frames[0] == wire::EXIT_TOPIC.as_bytes() {
        return Some(Event::PublisherExited);
    }
    if frames[0].starts_with(wire::RECORD_TOPIC_PREFIX.as_bytes()) {
        return match wire::decode_record(frames) {
            Ok(record) => Some(Event::Record(Box::new(record))),
            Err(error) => Some(Event::Failed(error)),
        };
    }
    None
}

/// Reads one message, polling the stop flag while idle between messages.
/// `Ok(None)` means the peer closed or the receiver was stopped.
fn read_message(stream: &mut TcpStream, done: &AtomicBool) -> Result<Option<Vec<Vec<u8>>>> {
    let mut count = [0u8; 1];
    loop {
        if done.load(Ordering::SeqCst) {
            return Ok(None);
        }
        stream.set_read_timeout(Some(Duration::from_millis(200)))?;
        match stream.read(&mut count) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(ref error)
                if error.kind() == std::io::ErrorKind::WouldBlock
                    || error.kind() == std::io::ErrorKind::TimedOut
                    || error.kind() == std::io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error.into()),
        }
    }
    // The rest of the message follows immediately; read it blocking.
    stream.set_read_timeout(None)?;
    wire::read_frames_after_count(stream, count[0]).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use std::time::SystemTime;

    fn sample(payload: &str) -> Record {
        Record::new(
            "remote.test",
            payload,
            Level::Notice,
            SystemTime::now(),
            9,
            9,
            1,
            "r.rs",
            "r",
            5,
        )
    }

    #[test]
    fn rejects_empty_url_list() {
        let config = ReceiverConfig {
            urls: vec![],
            bind: false,
        };
        assert!(recv(&config).is_err());
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let config = ReceiverConfig {
            urls: vec!["ipc:///tmp/x".to_string()],
            bind: true,
        };
        assert!(recv(&config).is_err());
    }

    #[test]
    fn bind_mode_returns_after_publisher_exit() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let url = format!("tcp://127.0.0.1:{}", port);

        let receiver = RemoteReceiver::start(ReceiverConfig {
            urls: vec![url.clone()],
            bind: true,
        })
        .unwrap();

        // A publisher connects, emits one record and exits.
        let authority = wire::tcp_authority(&url).unwrap().to_string();
        let mut publisher = loop {
            match TcpStream::connect(&authority) {
                Ok(stream) => break stream,
                Err(_) => thread::sleep(Duration::from_millis(10)),
            }
        };
        let frames = wire::encode_record(&sample("over the wire"));
        let borrowed: Vec<&[u8]> = frames.iter().map(|f| f.as_slice()).collect();
        wire::write_frames(&mut publisher, &borrowed).unwrap();
        let exit = wire::encode_exit("prog");
        let borrowed: Vec<&[u8]> = exit.iter().map(|f| f.as_slice()).collect();
        wire::write_frames(&mut publisher, &borrowed).unwrap();

        receiver.stop_aware_join();
    }

    impl RemoteReceiver {
        /// Join without stopping: used where the loop is expected to end on
        /// its own.
        fn stop_aware_join(self) {
            self.handle
                .join()
                .expect("receiver thread panicked")
                .expect("receiver failed");
        }
    }

    #[test]
    fn stop_unblocks_the_loop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let receiver = RemoteReceiver::start(ReceiverConfig {
            urls: vec![format!("tcp://127.0.0.1:{}", port)],
            bind: true,
        })
        .unwrap();
        thread::sleep(Duration::from_millis(50));
        receiver.stop().unwrap();
    }
}
