//! The remote publisher handler.
//!
//! Publishes records over TCP in the multipart wire format (see
//! [`wire`]). The publisher either binds its URL and serves any number of
//! subscribing peers, or connects to a single remote endpoint that bound
//! it. When binding, the handler can optionally wait for a number of
//! subscribers to say hello before accepting records; that
//! synchronization is a soft bound: after roughly a second it warns and
//! proceeds.
//!
//! Peers that send the `URLs?` config query get a JSON list of the bound
//! URLs and are disconnected.
//!
//! [`wire`]: ../../wire/index.html

use crate::{
    error::{bad_cfg, Result},
    filter::FilterSet,
    handler::Handler,
    record::Record,
    wire,
};
use std::{
    io::ErrorKind as IoErrorKind,
    net::{TcpListener, TcpStream},
    thread,
    time::{Duration, Instant},
};

/// Soft deadline for subscriber synchronization.
pub const SUBSCRIBER_SYNC_TIMEOUT: Duration = Duration::from_secs(1);
/// Default bound on establishing the outgoing connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Parameters of the remote publisher handler.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteConfig {
    /// `tcp://host:port` endpoint.
    pub url: String,
    /// Bind the URL and serve subscribers instead of connecting out.
    pub bind: bool,
    /// With `bind`, how many subscribers to wait for before accepting
    /// records. Zero disables the synchronization.
    pub subscriber_sync_count: usize,
    /// Without `bind`, how long to retry the outgoing connection.
    pub connect_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> RemoteConfig {
        RemoteConfig {
            url: String::new(),
            bind: false,
            subscriber_sync_count: 0,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Remote publisher sink.
pub struct RemoteHandler {
    name: String,
    filters: FilterSet,
    progname: String,
    config: RemoteConfig,
    listener: Option<TcpListener>,
    subscribers: Vec<TcpStream>,
    stream: Option<TcpStream>,
}

impl RemoteHandler {
    pub fn new(
        name: impl Into<String>,
        filters: FilterSet,
        progname: impl Into<String>,
        config: RemoteConfig,
    ) -> RemoteHandler {
        RemoteHandler {
            name: name.into(),
            filters,
            progname: progname.into(),
            config,
            listener: None,
            subscribers: vec![],
            stream: None,
        }
    }

    /// Accepts pending peers: subscribers are kept, config queries are
    /// answered and dropped.
    fn accept_pending(&mut self) {
        let listener = match self.listener.as_ref() {
            Some(listener) => listener,
            None => return,
        };
        loop {
            match listener.accept() {
                Ok((mut peer, _)) => {
                    let _ = peer.set_nonblocking(false);
                    let _ = peer.set_read_timeout(Some(Duration::from_millis(100)));
                    match wire::read_frames(&mut peer) {
                        Ok(Some(frames)) if frames[0] == wire::SUBSCRIBE_HELLO.as_bytes() => {
                            let _ = peer.set_read_timeout(None);
                            self.subscribers.push(peer);
                        }
                        Ok(Some(frames)) if frames[0] == wire::URLS_QUERY.as_bytes() => {
                            if let Ok(reply) =
                                wire::encode_urls_reply(&[self.config.url.clone()])
                            {
                                let _ = wire::write_frames(&mut peer, &[&reply]);
                            }
                        }
                        _ => {}
                    }
                }
                Err(ref error) if error.kind() == IoErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
    }

    fn broadcast(&mut self, frames: &[Vec<u8>]) -> Result<()> {
        let borrowed: Vec<&[u8]> = frames.iter().map(|f| f.as_slice()).collect();
        if let Some(stream) = self.stream.as_mut() {
            wire::write_frames(stream, &borrowed)?;
            return Ok(());
        }
        // Dead subscribers are dropped, the rest keep receiving.
        let mut alive = Vec::with_capacity(self.subscribers.len());
        for mut peer in self.subscribers.drain(..) {
            if wire::write_frames(&mut peer, &borrowed).is_ok() {
                alive.push(peer);
            }
        }
        self.subscribers = alive;
        Ok(())
    }

    fn init_bind(&mut self) -> Result<()> {
        let authority = wire::tcp_authority(&self.config.url)?;
        let listener = TcpListener::bind(authority)?;
        listener.set_nonblocking(true)?;
        self.listener = Some(listener);

        if self.config.subscriber_sync_count > 0 {
            let deadline = Instant::now() + SUBSCRIBER_SYNC_TIMEOUT;
            while self.subscribers.len() < self.config.subscriber_sync_count {
                if Instant::now() >= deadline {
                    eprintln!(
                        "fanlog handler '{}': {} of {} subscriber(s) after {:?}, proceeding",
                        self.name,
                        self.subscribers.len(),
                        self.config.subscriber_sync_count,
                        SUBSCRIBER_SYNC_TIMEOUT
                    );
                    break;
                }
                self.accept_pending();
                thread::sleep(Duration::from_millis(10));
            }
        }
        Ok(())
    }

    fn init_connect(&mut self) -> Result<()> {
        let authority = wire::tcp_authority(&self.config.url)?.to_string();
        let deadline = Instant::now() + self.config.connect_timeout;
        loop {
            match TcpStream::connect(&authority) {
                Ok(stream) => {
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(error) => {
                    if Instant::now() >= deadline {
                        return bad_cfg(format!(
                            "cannot connect to '{}': {}",
                            self.config.url, error
                        ));
                    }
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }
}

impl Handler for RemoteHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn filters(&self) -> &FilterSet {
        &self.filters
    }

    fn init(&mut self) -> Result<()> {
        if self.config.bind {
            self.init_bind()
        } else {
            self.init_connect()
        }
    }

    fn process_log(&mut self, record: &Record) -> Result<()> {
        self.accept_pending();
        self.broadcast(&wire::encode_record(record))
    }

    fn process_implicit_flush(&mut self) -> Result<()> {
        // Writes are unbuffered; the idle tick just picks up new peers.
        self.accept_pending();
        Ok(())
    }

    fn process_exit(&mut self) -> Result<()> {
        self.accept_pending();
        let exit = wire::encode_exit(&self.progname);
        let result = self.broadcast(&exit);
        self.subscribers.clear();
        self.stream = None;
        self.listener = None;
        result
    }

    fn process_cfg(&mut self, filters: FilterSet) -> Result<()> {
        self.filters = filters;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use std::time::SystemTime;

    fn record(payload: &str) -> Record {
        Record::new(
            "r",
            payload,
            Level::Notice,
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
    fn bind_publishes_to_subscribers() {
        let mut handler = RemoteHandler::new(
            "remote",
            FilterSet::new(),
            "prog",
            RemoteConfig {
                url: "tcp://127.0.0.1:0".to_string(),
                bind: true,
                ..RemoteConfig::default()
            },
        );
        handler.init().unwrap();
        let addr = handler.listener.as_ref().unwrap().local_addr().unwrap();

        let mut subscriber = TcpStream::connect(addr).unwrap();
        wire::write_frames(&mut subscriber, &[wire::SUBSCRIBE_HELLO.as_bytes()]).unwrap();
        // Retry until the nonblocking accept has picked the peer up.
        let deadline = Instant::now() + Duration::from_secs(2);
        while handler.subscribers.is_empty() && Instant::now() < deadline {
            handler.process_implicit_flush().unwrap();
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(handler.subscribers.len(), 1);

        handler.process_log(&record("over the wire")).unwrap();
        let frames = wire::read_frames(&mut subscriber).unwrap().unwrap();
        let decoded = wire::decode_record(&frames).unwrap();
        assert_eq!(decoded.payload(), "over the wire");

        handler.process_exit().unwrap();
        let frames = wire::read_frames(&mut subscriber).unwrap().unwrap();
        assert_eq!(frames[0], wire::EXIT_TOPIC.as_bytes().to_vec());
        assert_eq!(frames[1], b"prog".to_vec());
    }

    #[test]
    fn urls_query_is_answered() {
        let mut handler = RemoteHandler::new(
            "remote",
            FilterSet::new(),
            "prog",
            RemoteConfig {
                url: "tcp://127.0.0.1:0".to_string(),
                bind: true,
                ..RemoteConfig::default()
            },
        );
        handler.init().unwrap();
        let addr = handler.listener.as_ref().unwrap().local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        wire::write_frames(&mut client, &[wire::URLS_QUERY.as_bytes()]).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut reply = None;
        while reply.is_none() && Instant::now() < deadline {
            handler.process_implicit_flush().unwrap();
            client
                .set_read_timeout(Some(Duration::from_millis(50)))
                .unwrap();
            if let Ok(Some(frames)) = wire::read_frames(&mut client) {
                reply = Some(frames);
            }
        }
        let reply = reply.expect("no reply to the URLs query");
        assert_eq!(
            wire::decode_urls_reply(&reply[0]).unwrap(),
            vec!["tcp://127.0.0.1:0".to_string()]
        );
        handler.process_exit().unwrap();
    }

    #[test]
    fn connect_timeout_reports_bad_config() {
        let mut handler = RemoteHandler::new(
            "remote",
            FilterSet::new(),
            "prog",
            RemoteConfig {
                // Reserved port that nothing listens on.
                url: "tcp://127.0.0.1:1".to_string(),
                bind: false,
                connect_timeout: Duration::from_millis(50),
                ..RemoteConfig::default()
            },
        );
        assert!(handler.init().is_err());
        handler.process_exit().unwrap();
    }

    #[test]
    fn subscriber_sync_is_soft() {
        let mut handler = RemoteHandler::new(
            "remote",
            FilterSet::new(),
            "prog",
            RemoteConfig {
                url: "tcp://127.0.0.1:0".to_string(),
                bind: true,
                subscriber_sync_count: 1,
                ..RemoteConfig::default()
            },
        );
        // Nobody subscribes: init warns and still succeeds.
        handler.init().unwrap();
        handler.process_log(&record("dropped on the floor")).unwrap();
        handler.process_exit().unwrap();
    }
}
