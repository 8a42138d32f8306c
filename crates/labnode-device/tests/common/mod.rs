//! A scripted Labnode for driver tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use labnode_device::{ApiVersion, DeviceHandle, DeviceRegistry, PidController};
use labnode_frame::{encode_frame, encode_payload, Fields, FrameReader, Value};
use labnode_session::{Session, SessionConfig, API_VERSION, DEVICE_TYPE, REQUEST_ID};
use labnode_transport::{Endpoint, TcpEndpoint};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

pub struct StubDevice {
    reader: FrameReader<BoxedRead>,
    writer: BoxedWrite,
}

impl StubDevice {
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FrameReader::new(Box::new(read_half)),
            writer: Box::new(write_half),
        }
    }

    pub async fn recv(&mut self) -> Fields {
        tokio::time::timeout(Duration::from_secs(2), self.reader.read_frame())
            .await
            .expect("request within 2s")
            .expect("well-formed request")
    }

    pub async fn try_recv(&mut self, wait: Duration) -> Option<Fields> {
        tokio::time::timeout(wait, self.reader.read_frame())
            .await
            .ok()
            .map(|frame| frame.expect("well-formed request"))
    }

    /// Answer `request` with `body`, echoing its request id.
    pub async fn reply_to(&mut self, request: &Fields, body: Fields) {
        let mut response = body;
        let id = request.get(&REQUEST_ID).cloned().expect("request id");
        response.insert(REQUEST_ID, id);
        let mut wire = BytesMut::new();
        encode_frame(&encode_payload(&response).unwrap(), &mut wire);
        self.writer.write_all(&wire).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Receive one request and answer it with `body`.
    pub async fn respond(&mut self, body: Fields) -> Fields {
        let request = self.recv().await;
        self.reply_to(&request, body).await;
        request
    }

    /// Answer the identification request.
    pub async fn identify_as(&mut self, device_type: i64, api: ApiVersion) {
        let request = self.recv().await;
        assert!(request.contains_key(&DEVICE_TYPE));
        assert!(request.contains_key(&API_VERSION));
        let version = Value::Array(vec![
            Value::from(api.major),
            Value::from(api.minor),
            Value::from(api.patch),
        ]);
        self.reply_to(
            &request,
            fields(&[(DEVICE_TYPE, Value::Integer(device_type)), (API_VERSION, version)]),
        )
        .await;
    }

    /// True once the client closed its end.
    pub async fn closed_by_client(&mut self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_secs(2), self.reader.read_frame()).await,
            Ok(Err(err)) if err.is_end_of_stream()
        )
    }
}

pub fn fields(entries: &[(i32, Value)]) -> Fields {
    entries.iter().cloned().collect()
}

pub fn placeholder_endpoint() -> Endpoint {
    Endpoint::Tcp(TcpEndpoint::new("stub.invalid", 4223))
}

/// A session connected to a stub over an in-memory pipe.
pub async fn connected_session() -> (Arc<Session>, StubDevice) {
    let (client, device) = tokio::io::duplex(16 * 1024);
    let session = Arc::new(Session::new(placeholder_endpoint(), SessionConfig::default()));
    session.connect_stream(client).await.unwrap();
    (session, StubDevice::new(device))
}

/// A PID driver for firmware speaking `api`.
pub async fn pid(api: ApiVersion) -> (PidController, StubDevice) {
    let (session, device) = connected_session().await;
    (PidController::new(session, api), device)
}

/// Identify over a pipe and return the resulting handle.
pub async fn attached(device_type: i64, api: ApiVersion) -> (DeviceHandle, StubDevice) {
    let (session, mut device) = connected_session().await;
    let registry = DeviceRegistry::default();
    let (handle, ()) = tokio::join!(DeviceHandle::attach(session, &registry), async {
        device.identify_as(device_type, api).await;
    });
    (handle.unwrap(), device)
}

/// A TCP listener on loopback and an endpoint pointing at it.
pub async fn tcp_stub() -> (TcpListener, Endpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, Endpoint::Tcp(TcpEndpoint::new("127.0.0.1", port)))
}

pub async fn accept(listener: &TcpListener) -> StubDevice {
    let (stream, _) = listener.accept().await.unwrap();
    StubDevice::new(stream)
}
