// nexus_gateway/src/net/server.rs
//
// Single-threaded, readiness-polled reactor. Owns the listening
// socket, the connection table, the shared risk engine, and the
// outbound sequence counter. Connections receive a mutable borrow of
// the risk engine only during their own turn, so no locking is used
// anywhere in this module.

use crate::error::GatewayError;
use crate::net::connection::{Connection, ConnOutcome, SequenceCounter};
use crate::risk::RiskLimits;
use crate::risk::RiskEngine;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use socket2::{Domain, Socket, Type};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

/// OS backlog for the listening socket.
const BACKLOG: i32 = 20;
const LISTENER_TOKEN: Token = Token(usize::MAX);
const EVENTS_CAPACITY: usize = 128;

pub struct GatewayServer {
    poll: Poll,
    listener: TcpListener,
    listening: bool,
    connections: Slab<Connection>,
    risk: RiskEngine,
    sequence: SequenceCounter,
    addr: SocketAddr,
}

impl GatewayServer {
    /// Resolve `host:port`, bind with address reuse enabled, and start
    /// listening with a fixed OS backlog. Does not begin polling or
    /// accepting connections until [`GatewayServer::run`] is called.
    pub fn bind(host: &str, port: u16, limits: RiskLimits) -> Result<Self, GatewayError> {
        let label = format!("{host}:{port}");
        let addr = resolve_addr(&label)?;

        let std_listener = bind_and_listen(addr).map_err(|source| GatewayError::BindListen {
            addr: label.clone(),
            source,
        })?;
        let listener = TcpListener::from_std(std_listener);
        let poll = Poll::new().map_err(GatewayError::Io)?;

        Ok(Self {
            poll,
            listener,
            listening: false,
            connections: Slab::new(),
            risk: RiskEngine::new(limits),
            sequence: SequenceCounter::default(),
            addr,
        })
    }

    /// Register the listener for read-readiness. Idempotent.
    pub fn listen(&mut self) -> Result<(), GatewayError> {
        if self.listening {
            return Ok(());
        }
        self.poll
            .registry()
            .register(&mut self.listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(GatewayError::Io)?;
        self.listening = true;
        tracing::info!(addr = %self.addr, "gateway listening");
        Ok(())
    }

    /// Run the readiness-poll loop forever. One suspension point per
    /// iteration; everything between two waits runs to completion.
    pub fn run(&mut self) -> Result<(), GatewayError> {
        self.listen()?;
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        loop {
            self.poll.poll(&mut events, None).map_err(GatewayError::Io)?;

            let mut to_close = Vec::new();
            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_all(),
                    Token(key) => {
                        if let Some(conn) = self.connections.get_mut(key) {
                            let outcome = conn.handle_readable(&mut self.risk, &mut self.sequence);
                            if outcome == ConnOutcome::Close {
                                to_close.push(key);
                            }
                        }
                    }
                }
            }

            for key in to_close {
                self.close_connection(key);
            }
        }
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let entry = self.connections.vacant_entry();
                    let token = Token(entry.key());
                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        tracing::warn!(error = %e, "failed to register new connection");
                        continue;
                    }
                    tracing::info!(peer = %peer, token = token.0, "accepted connection");
                    entry.insert(Connection::new(stream));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    /// Deregister and drop a connection, replaying a DeleteOrder risk
    /// evaluation for every order still live in its trader book so
    /// disconnecting never silently inflates exposure.
    fn close_connection(&mut self, key: usize) {
        if !self.connections.contains(key) {
            return;
        }
        let mut conn = self.connections.remove(key);
        let live = conn.live_orders();
        for order in &live {
            let _ = self.risk.evaluate_delete(order);
        }
        let _ = self.poll.registry().deregister(&mut conn.stream);
        tracing::info!(
            token = key,
            replayed_deletes = live.len(),
            "connection closed"
        );
    }
}

fn resolve_addr(label: &str) -> Result<SocketAddr, GatewayError> {
    let mut addrs = label
        .to_socket_addrs()
        .map_err(|source| GatewayError::AddrResolution {
            addr: label.to_string(),
            source,
        })?;
    addrs.next().ok_or_else(|| GatewayError::AddrResolution {
        addr: label.to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"),
    })
}

fn bind_and_listen(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}
