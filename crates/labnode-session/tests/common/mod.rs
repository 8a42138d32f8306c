//! In-memory stand-in for a Labnode on the far end of a duplex pipe.

#![allow(dead_code)]

use std::time::Duration;

use bytes::BytesMut;
use labnode_frame::{encode_frame, encode_payload, Fields, FrameReader, Value};
use labnode_session::{Session, SessionConfig, REQUEST_ID};
use labnode_transport::{Endpoint, TcpEndpoint};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

pub struct StubDevice {
    reader: FrameReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

/// A session-side stream and the device end of the same pipe.
pub fn pipe() -> (DuplexStream, StubDevice) {
    let (client, device) = tokio::io::duplex(16 * 1024);
    let (read_half, write_half) = tokio::io::split(device);
    (
        client,
        StubDevice {
            reader: FrameReader::new(read_half),
            writer: write_half,
        },
    )
}

pub fn session(config: SessionConfig) -> Session {
    Session::new(Endpoint::Tcp(TcpEndpoint::new("stub.invalid", 4223)), config)
}

pub async fn connected(config: SessionConfig) -> (Session, StubDevice) {
    let (client, device) = pipe();
    let session = session(config);
    session.connect_stream(client).await.unwrap();
    (session, device)
}

pub fn fields(entries: &[(i32, Value)]) -> Fields {
    entries.iter().cloned().collect()
}

pub fn getter(function: i32) -> Fields {
    fields(&[(function, Value::Null)])
}

pub fn request_id(request: &Fields) -> i64 {
    request
        .get(&REQUEST_ID)
        .and_then(Value::as_i64)
        .expect("request carries an id")
}

impl StubDevice {
    /// Next request sent by the session.
    pub async fn recv(&mut self) -> Fields {
        tokio::time::timeout(Duration::from_secs(2), self.reader.read_frame())
            .await
            .expect("request within 2s")
            .expect("well-formed request")
    }

    /// Next request, or `None` if nothing arrives within `wait`.
    pub async fn try_recv(&mut self, wait: Duration) -> Option<Fields> {
        tokio::time::timeout(wait, self.reader.read_frame())
            .await
            .ok()
            .map(|frame| frame.expect("well-formed request"))
    }

    /// Send `body` as the response to `request`.
    pub async fn reply_to(&mut self, request: &Fields, body: Fields) {
        let mut response = body;
        response.insert(REQUEST_ID, Value::Integer(request_id(request)));
        self.send_fields(&response).await;
    }

    /// Echo the request back, answering every getter with `value`.
    pub async fn answer(&mut self, request: &Fields, value: Value) {
        let body = request
            .keys()
            .filter(|key| **key != REQUEST_ID)
            .map(|key| (*key, value.clone()))
            .collect();
        self.reply_to(request, body).await;
    }

    pub async fn send_fields(&mut self, fields: &Fields) {
        let mut wire = BytesMut::new();
        encode_frame(&encode_payload(fields).unwrap(), &mut wire);
        self.send_raw(&wire).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// True once the session closed its end of the pipe.
    pub async fn closed_by_session(&mut self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_secs(2), self.reader.read_frame()).await,
            Ok(Err(err)) if err.is_end_of_stream()
        )
    }
}
