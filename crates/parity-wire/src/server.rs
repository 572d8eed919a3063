use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parity_engine::Database;
use tracing::{debug, info, warn};

use crate::error::WireError;
use crate::message::{Message, read_message, write_message};
use crate::session::Session;

/// A loopback OP_MSG server over a shared [`Database`].
pub struct Server {
    db: Arc<Database>,
    listener: TcpListener,
}

impl Server {
    pub fn bind(db: Arc<Database>, addr: impl ToSocketAddrs) -> Result<Self, WireError> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self { db, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, WireError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop on a background thread.
    pub fn spawn(self) -> Result<ServerHandle, WireError> {
        let addr = self.listener.local_addr()?;
        // Poll-based accept so the loop can observe the shutdown flag.
        self.listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let connections: Arc<Connections> = Arc::default();

        let accept_thread = {
            let shutdown = Arc::clone(&shutdown);
            let connections = Arc::clone(&connections);
            thread::spawn(move || accept_loop(self, &shutdown, connections))
        };

        info!(%addr, "wire server listening");
        Ok(ServerHandle {
            addr,
            shutdown,
            connections,
            accept_thread: Some(accept_thread),
        })
    }
}

/// Read halves of the open connections, keyed by connection number. A
/// handler removes its own entry when it returns.
type Connections = Mutex<HashMap<u64, TcpStream>>;

fn accept_loop(server: Server, shutdown: &AtomicBool, connections: Arc<Connections>) -> Vec<JoinHandle<()>> {
    let next_id = Arc::new(AtomicI32::new(1));
    let mut next_conn = 0_u64;
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    while !shutdown.load(Ordering::Relaxed) {
        match server.listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "connection accepted");
                let registered = stream
                    .set_nonblocking(false)
                    .and_then(|()| stream.try_clone());
                let conn = next_conn;
                next_conn += 1;
                match registered {
                    Ok(read_half) => {
                        lock(&connections).insert(conn, read_half);
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to register connection");
                        continue;
                    }
                }

                handles.retain(|h| !h.is_finished());
                let db = Arc::clone(&server.db);
                let next_id = Arc::clone(&next_id);
                let connections = Arc::clone(&connections);
                handles.push(thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, db, &next_id) {
                        warn!(%peer, error = %e, "connection error");
                    }
                    lock(&connections).remove(&conn);
                    debug!(%peer, "connection closed");
                }));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                warn!(error = %e, "accept error");
            }
        }
    }
    handles
}

fn lock(connections: &Connections) -> MutexGuard<'_, HashMap<u64, TcpStream>> {
    connections.lock().unwrap_or_else(PoisonError::into_inner)
}

fn handle_connection(stream: TcpStream, db: Arc<Database>, next_id: &AtomicI32) -> Result<(), WireError> {
    let session = Session::new(db);
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    loop {
        let Some(request) = read_message(&mut reader)? else {
            // Client disconnected or the server is shutting down.
            return Ok(());
        };
        let silent = request.more_to_come();
        let request_id = request.request_id;
        let body = session.handle(request);
        if silent {
            continue;
        }
        let mut reply = Message::new(next_id.fetch_add(1, Ordering::Relaxed), body);
        reply.response_to = request_id;
        write_message(&mut writer, &reply)?;
    }
}

/// Owns a running server. Dropping the handle stops it.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    connections: Arc<Connections>,
    accept_thread: Option<JoinHandle<Vec<JoinHandle<()>>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connections whose handler is still running.
    pub fn open_connections(&self) -> usize {
        lock(&self.connections).len()
    }

    /// Stop accepting, unblock every connection handler and wait for them.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        let Some(accept_thread) = self.accept_thread.take() else {
            return;
        };
        self.shutdown.store(true, Ordering::Relaxed);
        let handles = accept_thread.join().unwrap_or_default();
        debug!(open = self.open_connections(), "closing connections");

        // Shutting down the read half turns a blocked read into a clean EOF.
        for stream in lock(&self.connections).values() {
            let _ = stream.shutdown(Shutdown::Read);
        }
        for handle in handles {
            let _ = handle.join();
        }
        info!(addr = %self.addr, "wire server stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
