//! A blocking Labnode stand-in the CLI can connect to over loopback TCP.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};
use std::thread;

use bytes::BytesMut;
use labnode_frame::{decode_frame, decode_payload, encode_frame, encode_payload, Fields, Value};

pub const SERIAL_NUMBER: i64 = 4711;

#[derive(Clone, Copy)]
pub enum Behavior {
    /// Answer like a PID controller with the given device type.
    Respond { device_type: i64 },
    /// Read requests and never answer.
    Silent,
}

pub struct StubDevice {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Fields>>>,
}

impl StubDevice {
    pub fn spawn(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                serve(stream, behavior, &log);
            }
        });

        Self { addr, requests }
    }

    pub fn endpoint(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    /// Every request received so far, request ids included.
    pub fn requests(&self) -> Vec<Fields> {
        self.requests.lock().expect("request log").clone()
    }
}

fn serve(stream: TcpStream, behavior: Behavior, log: &Mutex<Vec<Fields>>) {
    let mut writer = stream.try_clone().expect("clone stream");
    let mut reader = BufReader::new(stream);
    let mut frame = Vec::new();

    loop {
        frame.clear();
        match reader.read_until(0x00, &mut frame) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        if frame.last() != Some(&0x00) {
            return;
        }
        frame.pop();
        if frame.is_empty() {
            continue;
        }

        let Ok(payload) = decode_frame(&frame) else { continue };
        let Ok(request) = decode_payload(&payload) else { continue };
        log.lock().expect("request log").push(request.clone());

        let Behavior::Respond { device_type } = behavior else { continue };
        let reply: Fields = request
            .iter()
            .map(|(key, value)| match *key {
                -1 => (-1, value.clone()),
                key => (key, answer(key, device_type)),
            })
            .collect();

        let mut wire = BytesMut::new();
        encode_frame(&encode_payload(&reply).expect("encode reply"), &mut wire);
        if writer.write_all(&wire).is_err() {
            return;
        }
    }
}

fn version(major: i64, minor: i64, patch: i64) -> Value {
    Value::Array(vec![
        Value::Integer(major),
        Value::Integer(minor),
        Value::Integer(patch),
    ])
}

fn answer(key: i32, device_type: i64) -> Value {
    match key {
        -2 => Value::Integer(device_type),
        -3 => version(0, 11, 0),
        -4 => version(1, 2, 3),
        -5 => version(2, 0, 0),
        -6 => Value::Integer(SERIAL_NUMBER),
        -8 => Value::Bytes(vec![0x02, 0x00, 0x5e, 0x10, 0x00, 0x01]),
        -9 => Value::Integer(98304),
        -14 => Value::Bool(true),
        -18 => Value::Integer(2048),
        -22 => Value::Integer(65535),
        -23 => Value::Integer(0),
        // Other getters read zero; setters and actions are acknowledged.
        _ => Value::Integer(0),
    }
}

pub fn labnode(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_labnode"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .env_remove("LABNODE_ENDPOINT")
        .output()
        .expect("labnode should run")
}

pub fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be one JSON document")
}
