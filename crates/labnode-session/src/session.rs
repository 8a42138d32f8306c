use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use labnode_frame::{Fields, FrameReader, FrameWriter, Value};
use labnode_transport::{ByteStream, Endpoint};
use tokio::io::WriteHalf;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{validate_timeout, SessionConfig};
use crate::dispatch::{Command, ReadLoop};
use crate::error::{Result, SessionError};
use crate::pool::{RequestId, RequestIdPool};
use crate::protocol::REQUEST_ID;

type LinkWriter = FrameWriter<WriteHalf<Box<dyn ByteStream>>>;

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// One physical connection: writer, identifier pool and read loop.
///
/// Discarded as a whole on disconnect; a reconnect builds a new one.
struct Connection {
    writer: Arc<tokio::sync::Mutex<LinkWriter>>,
    ids: RequestIdPool,
    commands: mpsc::UnboundedSender<Command>,
    // Cancelled once the connection is no longer usable.
    shutdown: CancellationToken,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    peer: String,
}

impl Connection {
    fn is_live(&self) -> bool {
        !self.shutdown.is_cancelled()
    }
}

/// A request/response session with one Labnode.
///
/// Any number of tasks may call [`send_request`](Self::send_request)
/// concurrently; at most `id_pool_size` requests are in flight at once and
/// each response is delivered only to the task that sent the request.
/// `connect` and `disconnect` are serialized.
///
/// Dropping the session stops its read loop.
pub struct Session {
    endpoint: Endpoint,
    config: SessionConfig,
    timeout: Mutex<Duration>,
    lifecycle: tokio::sync::Mutex<()>,
    state: Mutex<ConnectionState>,
    connection: Mutex<Option<Arc<Connection>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Create a disconnected session for `endpoint`.
    pub fn new(endpoint: Endpoint, config: SessionConfig) -> Self {
        let timeout = config.timeout;
        Self {
            endpoint,
            config,
            timeout: Mutex::new(timeout),
            lifecycle: tokio::sync::Mutex::new(()),
            state: Mutex::new(ConnectionState::Disconnected),
            connection: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current per-request timeout.
    pub fn timeout(&self) -> Duration {
        *lock(&self.timeout)
    }

    /// Change the per-request timeout. Applies to requests sent afterwards.
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        validate_timeout(timeout)?;
        *lock(&self.timeout) = timeout;
        Ok(())
    }

    /// Current lifecycle state.
    ///
    /// A connection whose peer went away reports `Disconnected` even before
    /// `disconnect` is called.
    pub fn state(&self) -> ConnectionState {
        let state = *lock(&self.state);
        if state == ConnectionState::Connected && self.live_connection().is_none() {
            ConnectionState::Disconnected
        } else {
            state
        }
    }

    pub fn is_connected(&self) -> bool {
        self.live_connection().is_some()
    }

    /// Free request identifiers, or `None` while disconnected.
    pub fn available_ids(&self) -> Option<usize> {
        self.live_connection().map(|conn| conn.ids.available())
    }

    /// Open the endpoint and start the read loop.
    ///
    /// Returns immediately if already connected. Opening is bounded by the
    /// session timeout.
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.live_connection().is_some() {
            return Ok(());
        }
        self.config.validate()?;
        self.reap().await;

        self.set_state(ConnectionState::Connecting);
        let timeout = self.timeout();
        let opened = tokio::time::timeout(timeout, self.endpoint.open()).await;
        let stream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(err.into());
            }
            Err(_) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(SessionError::Timeout(timeout));
            }
        };

        let peer = stream.peer().to_string();
        self.install(Box::new(stream), peer);
        Ok(())
    }

    /// Run the session over an already open byte stream.
    ///
    /// Behaves like [`connect`](Self::connect); if the session is already
    /// connected the given stream is dropped.
    pub async fn connect_stream<S>(&self, stream: S) -> Result<()>
    where
        S: ByteStream + 'static,
    {
        let _lifecycle = self.lifecycle.lock().await;
        if self.live_connection().is_some() {
            debug!("already connected, ignoring supplied stream");
            return Ok(());
        }
        self.config.validate()?;
        self.reap().await;

        self.set_state(ConnectionState::Connecting);
        self.install(Box::new(stream), self.endpoint.to_string());
        Ok(())
    }

    fn install(&self, stream: Box<dyn ByteStream>, peer: String) {
        let (read_half, write_half) = tokio::io::split(stream);
        let writer = Arc::new(tokio::sync::Mutex::new(FrameWriter::with_config(
            write_half,
            self.config.frame.clone(),
        )));
        let ids = RequestIdPool::new(self.config.id_pool_size);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let read_loop = ReadLoop {
            reader: FrameReader::with_config(read_half, self.config.frame.clone()),
            writer: Arc::clone(&writer),
            commands: command_rx,
            shutdown: shutdown.clone(),
            ids: ids.clone(),
            read_error_backoff: self.config.read_error_backoff,
            close_timeout: self.config.close_timeout,
            peer: peer.clone(),
        };
        let task = tokio::spawn(read_loop.run());

        let connection = Connection {
            writer,
            ids,
            commands,
            shutdown,
            reader_task: Mutex::new(Some(task)),
            peer,
        };
        info!(peer = %connection.peer, "session connected");
        *lock(&self.connection) = Some(Arc::new(connection));
        self.set_state(ConnectionState::Connected);
    }

    /// Stop the read loop and close the link.
    ///
    /// Every request still waiting fails with
    /// [`SessionError::ConnectionClosed`]. Does nothing when not connected.
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if lock(&self.connection).is_none() {
            return;
        }
        self.set_state(ConnectionState::Disconnecting);
        self.reap().await;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Tear down the current connection, live or not, and wait for its read
    /// loop. Must be called with the lifecycle lock held.
    async fn reap(&self) {
        let Some(connection) = lock(&self.connection).take() else {
            return;
        };
        connection.shutdown.cancel();
        let task = lock(&connection.reader_task).take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                if err.is_panic() {
                    error!(peer = %connection.peer, "read loop panicked");
                }
            }
        }
        debug!(peer = %connection.peer, "connection released");
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    fn live_connection(&self) -> Option<Arc<Connection>> {
        lock(&self.connection)
            .as_ref()
            .filter(|conn| conn.is_live())
            .cloned()
    }

    /// Send `fields` as one request.
    ///
    /// The request id field is added here and stripped from the response.
    /// Without `response_expected` this returns `Ok(None)` once the frame
    /// is written. The request identifier is always returned to the pool,
    /// also when the returned future is dropped early.
    pub async fn send_request(
        &self,
        fields: Fields,
        response_expected: bool,
    ) -> Result<Option<Fields>> {
        let conn = self.live_connection().ok_or(SessionError::NotConnected)?;
        let timeout = self.timeout();

        let id = conn.ids.acquire().await?;
        let mut request = fields;
        request.insert(REQUEST_ID, Value::from(id.get()));
        let mut in_flight = InFlight::new(&conn, id);

        let slot = if response_expected {
            let (tx, rx) = oneshot::channel();
            conn.commands
                .send(Command::Register {
                    id: in_flight.id(),
                    slot: tx,
                })
                .map_err(|_| SessionError::ConnectionClosed)?;
            in_flight.registered = true;
            Some(rx)
        } else {
            None
        };

        let exchange = async {
            conn.writer.lock().await.write_frame(&request).await?;
            debug!(id = in_flight.id(), "request sent");
            match slot {
                Some(rx) => rx.await.map_err(|_| SessionError::ConnectionClosed)?.map(Some),
                None => Ok(None),
            }
        };

        let outcome = tokio::select! {
            biased;
            result = tokio::time::timeout(timeout, exchange) => {
                result.unwrap_or(Err(SessionError::Timeout(timeout)))
            }
            () = conn.shutdown.cancelled() => Err(SessionError::ConnectionClosed),
        };

        if matches!(outcome, Ok(Some(_))) {
            // The read loop removed the slot when it delivered the response.
            in_flight.registered = false;
        }
        outcome
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, fields: Fields) -> Result<Fields> {
        self.send_request(fields, true)
            .await?
            .ok_or_else(|| SessionError::InvalidReply("no response".to_string()))
    }

    /// Send a request without waiting for a response.
    pub async fn send(&self, fields: Fields) -> Result<()> {
        self.send_request(fields, false).await.map(|_| ())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(connection) = lock(&self.connection).take() {
            connection.shutdown.cancel();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint.to_string())
            .field("state", &self.state())
            .field("timeout", &self.timeout())
            .finish()
    }
}

/// Cleanup for one outstanding request.
///
/// On drop the read loop is told to forget the slot before the identifier
/// goes back to the pool, so a later request reusing the id never meets a
/// stale slot.
struct InFlight<'a> {
    conn: &'a Connection,
    id: Option<RequestId>,
    registered: bool,
}

impl<'a> InFlight<'a> {
    fn new(conn: &'a Connection, id: RequestId) -> Self {
        Self {
            conn,
            id: Some(id),
            registered: false,
        }
    }

    fn id(&self) -> u8 {
        self.id.as_ref().map_or(0, RequestId::get)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.registered {
            let _ = self.conn.commands.send(Command::Forget(self.id()));
        }
        drop(self.id.take());
    }
}
