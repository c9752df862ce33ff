// src/connection.rs - Persistent outbound connection with reconnect-and-resend
use crate::config::ConnectionConfig;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint address '{0}'")]
    InvalidAddress(String),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
    #[error("shutdown requested")]
    Shutdown,
}

/// One live channel to the consumer. Dropped (not reused) after a failure.
pub trait Transport {
    fn send_line(&mut self, line: &str) -> Result<(), TransportError>;

    fn close(&mut self) {}
}

/// Opens fresh transports to the configured endpoint.
pub trait Connector {
    type Conn: Transport;

    fn endpoint(&self) -> String;

    fn connect(&mut self) -> Result<Self::Conn, TransportError>;
}

/// Newline-delimited JSON over TCP.
pub struct TcpTransport {
    stream: TcpStream,
}

impl Transport for TcpTransport {
    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.stream
            .write_all(line.as_bytes())
            .and_then(|_| self.stream.write_all(b"\n"))
            .and_then(|_| self.stream.flush())
            .map_err(TransportError::Send)
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

pub struct TcpConnector {
    addr: String,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>, config: &ConnectionConfig) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
        }
    }

    fn resolve(&self) -> Result<SocketAddr, TransportError> {
        self.addr
            .to_socket_addrs()
            .map_err(|e| TransportError::Connect {
                addr: self.addr.clone(),
                source: e,
            })?
            .next()
            .ok_or_else(|| TransportError::InvalidAddress(self.addr.clone()))
    }
}

impl Connector for TcpConnector {
    type Conn = TcpTransport;

    fn endpoint(&self) -> String {
        self.addr.clone()
    }

    fn connect(&mut self) -> Result<TcpTransport, TransportError> {
        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
            TransportError::Connect {
                addr: self.addr.clone(),
                source: e,
            }
        })?;
        stream.set_nodelay(true).ok();
        stream.set_write_timeout(Some(self.write_timeout)).ok();
        Ok(TcpTransport { stream })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// First attempt failed, the resend on a fresh connection succeeded.
    Resent,
    Dropped,
}

/// Owns the single connection to the consumer.
///
/// Connecting retries forever at a fixed delay and blocks the caller. A send
/// that fails tears the connection down, reconnects, and retries that one
/// event exactly once; a second failure drops the event.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    conn: Option<C::Conn>,
    state: ConnectionState,
    reconnect_delay: Duration,
    shutdown: Option<Arc<AtomicBool>>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, reconnect_delay: Duration) -> Self {
        Self {
            connector,
            conn: None,
            state: ConnectionState::Disconnected,
            reconnect_delay,
            shutdown: None,
        }
    }

    /// Lets a pending reconnect give up once `flag` is set.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Blocks until connected. Only returns an error if shutdown is requested.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let mut attempt: u64 = 0;
        loop {
            if self.shutdown_requested() {
                self.state = ConnectionState::Disconnected;
                return Err(TransportError::Shutdown);
            }
            attempt += 1;
            self.state = ConnectionState::Connecting;

            match self.connector.connect() {
                Ok(conn) => {
                    self.conn = Some(conn);
                    self.state = ConnectionState::Connected;
                    info!(endpoint = %self.connector.endpoint(), attempt, "Connected");
                    return Ok(());
                }
                Err(e) => {
                    self.state = ConnectionState::Disconnected;
                    warn!(
                        attempt,
                        error = %e,
                        "Connection attempt failed, retrying in {:?}",
                        self.reconnect_delay
                    );
                    std::thread::sleep(self.reconnect_delay);
                }
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
        self.state = ConnectionState::Disconnected;
    }

    fn try_send(&mut self, line: &str) -> Result<(), TransportError> {
        self.connect()?;
        match self.conn.as_mut() {
            Some(conn) => conn.send_line(line),
            None => Err(TransportError::Shutdown),
        }
    }

    pub fn send(&mut self, line: &str) -> Delivery {
        let first = match self.try_send(line) {
            Ok(()) => return Delivery::Sent,
            Err(TransportError::Shutdown) => return Delivery::Dropped,
            Err(e) => e,
        };

        warn!(error = %first, "Send failed, reconnecting");
        self.teardown();

        match self.try_send(line) {
            Ok(()) => Delivery::Resent,
            Err(e) => {
                error!(error = %e, "Resend after reconnect failed, dropping event");
                self.teardown();
                Delivery::Dropped
            }
        }
    }

    pub fn close(&mut self) {
        if self.conn.is_some() {
            info!(endpoint = %self.connector.endpoint(), "Closing connection");
        }
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::rc::Rc;

    // Shared log of what the fake transports did
    #[derive(Default)]
    struct Script {
        connect_failures: u32,
        send_results: VecDeque<bool>,
        connects: u32,
        delivered: Vec<String>,
        closed: u32,
    }

    struct FakeTransport {
        script: Rc<RefCell<Script>>,
    }

    impl Transport for FakeTransport {
        fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
            let mut s = self.script.borrow_mut();
            if s.send_results.pop_front().unwrap_or(true) {
                s.delivered.push(line.to_string());
                Ok(())
            } else {
                Err(TransportError::Send(io::Error::from(io::ErrorKind::BrokenPipe)))
            }
        }

        fn close(&mut self) {
            self.script.borrow_mut().closed += 1;
        }
    }

    struct FakeConnector {
        script: Rc<RefCell<Script>>,
    }

    impl Connector for FakeConnector {
        type Conn = FakeTransport;

        fn endpoint(&self) -> String {
            "fake:0".to_string()
        }

        fn connect(&mut self) -> Result<FakeTransport, TransportError> {
            let mut s = self.script.borrow_mut();
            s.connects += 1;
            if s.connect_failures > 0 {
                s.connect_failures -= 1;
                return Err(TransportError::Connect {
                    addr: "fake:0".to_string(),
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                });
            }
            Ok(FakeTransport {
                script: Rc::clone(&self.script),
            })
        }
    }

    fn manager(script: Script) -> (ConnectionManager<FakeConnector>, Rc<RefCell<Script>>) {
        let script = Rc::new(RefCell::new(script));
        let connector = FakeConnector {
            script: Rc::clone(&script),
        };
        (ConnectionManager::new(connector, Duration::ZERO), script)
    }

    #[test]
    fn test_connect_retries_until_success() {
        let (mut m, script) = manager(Script {
            connect_failures: 4,
            ..Script::default()
        });
        assert_eq!(m.state(), ConnectionState::Disconnected);
        m.connect().unwrap();
        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(script.borrow().connects, 5);
    }

    #[test]
    fn test_send_on_healthy_connection() {
        let (mut m, script) = manager(Script::default());
        assert_eq!(m.send("a"), Delivery::Sent);
        assert_eq!(m.send("b"), Delivery::Sent);
        assert_eq!(script.borrow().connects, 1);
        assert_eq!(script.borrow().delivered, vec!["a", "b"]);
    }

    #[test]
    fn test_failed_send_resent_once_on_new_connection() {
        let (mut m, script) = manager(Script {
            send_results: VecDeque::from([true, false, true]),
            ..Script::default()
        });
        m.send("first");
        assert_eq!(m.send("second"), Delivery::Resent);

        let s = script.borrow();
        assert_eq!(s.connects, 2, "connection is re-created, not reused");
        assert_eq!(s.closed, 1);
        assert_eq!(s.delivered, vec!["first", "second"]);
    }

    #[test]
    fn test_second_failure_drops_event() {
        let (mut m, script) = manager(Script {
            send_results: VecDeque::from([false, false, true]),
            ..Script::default()
        });
        assert_eq!(m.send("lost"), Delivery::Dropped);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(script.borrow().delivered.is_empty());

        // next event reconnects and goes through
        assert_eq!(m.send("next"), Delivery::Sent);
        assert_eq!(script.borrow().delivered, vec!["next"]);
        assert_eq!(script.borrow().connects, 3);
    }

    #[test]
    fn test_reconnect_waits_through_outage() {
        let (mut m, script) = manager(Script::default());
        m.connect().unwrap();
        {
            let mut s = script.borrow_mut();
            s.send_results = VecDeque::from([false]);
            s.connect_failures = 3;
        }
        assert_eq!(m.send("event"), Delivery::Resent);
        assert_eq!(script.borrow().connects, 5);
    }

    #[test]
    fn test_shutdown_interrupts_reconnect() {
        let flag = Arc::new(AtomicBool::new(true));
        let (m, script) = manager(Script {
            connect_failures: u32::MAX,
            ..Script::default()
        });
        let mut m = m.with_shutdown(Arc::clone(&flag));
        assert!(matches!(m.connect(), Err(TransportError::Shutdown)));
        assert_eq!(m.send("x"), Delivery::Dropped);
        assert_eq!(script.borrow().connects, 0);
    }

    #[test]
    fn test_tcp_transport_writes_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut m = ConnectionManager::new(
            TcpConnector::new(addr, &ConnectionConfig::default()),
            Duration::from_millis(10),
        );
        assert_eq!(m.send(r#"{"none":{"action":"none"}}"#), Delivery::Sent);
        assert_eq!(m.send(r#"{"pointer":{"action":"pointer","x":0.1,"y":0.2}}"#), Delivery::Sent);

        let (stream, _) = listener.accept().unwrap();
        let mut lines = BufReader::new(stream).lines();
        assert_eq!(lines.next().unwrap().unwrap(), r#"{"none":{"action":"none"}}"#);
        assert!(lines.next().unwrap().unwrap().starts_with(r#"{"pointer""#));
        m.close();
    }

    #[test]
    fn test_tcp_connector_rejects_bad_address() {
        let mut c = TcpConnector::new("not an address", &ConnectionConfig::default());
        assert!(c.connect().is_err());
    }
}
