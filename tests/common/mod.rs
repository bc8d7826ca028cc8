//! In-process fake PostgreSQL backend over `tokio::io::duplex`.

#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use pgpd::{ConnectOpts, SslMode, Stream, Target};

/// `(oid, schema, name, sql_type)` rows served for the catalog query.
pub const CATALOG: &[(u32, &str, &str, &str)] = &[
    (19, "pg_catalog", "name", "name"),
    (23, "pg_catalog", "int4", "integer"),
    (25, "pg_catalog", "text", "text"),
    (26, "pg_catalog", "oid", "oid"),
];

pub fn connect_opts(password: Option<&str>) -> ConnectOpts {
    ConnectOpts {
        target: Target::Tcp {
            host: "localhost".into(),
            port: 5432,
        },
        user: "user".into(),
        password: password.map(str::to_string),
        database: Some("db".into()),
        ssl_mode: SslMode::Disable,
    }
}

/// Spawns one fake server per connection attempt and keeps their handles.
#[derive(Default)]
pub struct Harness {
    attempts: Arc<AtomicUsize>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport factory for `Client::open_with`. `script` receives the
    /// zero-based attempt number and the server end of the connection.
    pub fn connector<F, Fut>(
        &self,
        script: F,
    ) -> impl FnMut(Target) -> std::future::Ready<io::Result<Stream>>
    where
        F: Fn(usize, FakeServer) -> Fut + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let attempts = Arc::clone(&self.attempts);
        let tasks = Arc::clone(&self.tasks);
        move |_target| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            let (client, server) = tokio::io::duplex(64 * 1024);
            let task = tokio::spawn(script(attempt, FakeServer::new(server)));
            tasks.lock().unwrap().push(task);
            std::future::ready(Ok(Stream::custom(client)))
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait for every server script; re-raises their assertion failures.
    pub async fn join(&self) {
        let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            task.await.unwrap();
        }
    }
}

pub struct FakeServer {
    io: DuplexStream,
}

impl FakeServer {
    pub fn new(io: DuplexStream) -> Self {
        Self { io }
    }

    pub async fn send(&mut self, tag: u8, payload: &[u8]) {
        let mut buf = vec![tag];
        buf.extend_from_slice(&((payload.len() + 4) as i32).to_be_bytes());
        buf.extend_from_slice(payload);
        self.io.write_all(&buf).await.unwrap();
    }

    pub async fn read_message(&mut self) -> (u8, Vec<u8>) {
        let tag = self.io.read_u8().await.unwrap();
        let len = self.io.read_i32().await.unwrap() as usize;
        let mut payload = vec![0; len - 4];
        self.io.read_exact(&mut payload).await.unwrap();
        (tag, payload)
    }

    pub async fn expect(&mut self, tag: u8) -> Vec<u8> {
        let (got, payload) = self.read_message().await;
        assert_eq!(got as char, tag as char);
        payload
    }

    /// Everything the client sends until it closes the connection.
    pub async fn read_to_end(&mut self) -> Vec<u8> {
        let mut rest = Vec::new();
        self.io.read_to_end(&mut rest).await.unwrap();
        rest
    }

    pub async fn read_startup(&mut self) -> Vec<(String, String)> {
        let len = self.io.read_i32().await.unwrap() as usize;
        let mut body = vec![0; len - 4];
        self.io.read_exact(&mut body).await.unwrap();
        assert_eq!(&body[..4], &196608_i32.to_be_bytes());

        let mut params = Vec::new();
        let mut parts = body[4..].split(|&b| b == 0);
        loop {
            let name = parts.next().unwrap();
            if name.is_empty() {
                break;
            }
            let value = parts.next().unwrap();
            params.push((
                String::from_utf8(name.to_vec()).unwrap(),
                String::from_utf8(value.to_vec()).unwrap(),
            ));
        }
        params
    }

    /// Read the SSLRequest and answer with `answer`.
    pub async fn answer_ssl(&mut self, answer: u8) {
        let mut request = [0u8; 8];
        self.io.read_exact(&mut request).await.unwrap();
        assert_eq!(request, [0, 0, 0, 8, 0x04, 0xd2, 0x16, 0x2f]);
        self.io.write_all(&[answer]).await.unwrap();
    }

    pub async fn auth(&mut self, code: i32, data: &[u8]) {
        let mut payload = code.to_be_bytes().to_vec();
        payload.extend_from_slice(data);
        self.send(b'R', &payload).await;
    }

    pub async fn auth_ok(&mut self) {
        self.auth(0, &[]).await;
    }

    pub async fn ready(&mut self) {
        self.send(b'Z', b"I").await;
    }

    pub async fn error(&mut self, severity: &str, code: &str, message: &str) {
        self.send(b'E', &error_fields(severity, code, message)).await;
    }

    pub async fn notice(&mut self, message: &str) {
        self.send(b'N', &error_fields("NOTICE", "00000", message))
            .await;
    }

    /// ParameterStatus, BackendKeyData and ReadyForQuery after authentication.
    pub async fn finish_startup(&mut self) {
        self.send(b'S', b"server_version\x0017.0\0").await;
        self.send(b'S', b"client_encoding\0UTF8\0").await;
        let mut key = 4242_u32.to_be_bytes().to_vec();
        key.extend_from_slice(&7_u32.to_be_bytes());
        self.send(b'K', &key).await;
        self.ready().await;
    }

    pub async fn serve_catalog(&mut self, types: &[(u32, &str, &str, &str)]) {
        let query = self.expect(b'Q').await;
        let query = String::from_utf8(query).unwrap();
        assert!(query.starts_with("SELECT t.oid, n.nspname, t.typname, format_type"));

        self.send(
            b'T',
            &row_description(&[
                ("oid", 26, 0),
                ("nspname", 19, 0),
                ("typname", 19, 0),
                ("sql_type", 25, 0),
            ]),
        )
        .await;
        for (oid, schema, name, sql_type) in types {
            let oid = oid.to_string();
            self.send(b'D', &data_row(&[&oid, schema, name, sql_type]))
                .await;
        }
        self.send(b'C', format!("SELECT {}\0", types.len()).as_bytes())
            .await;
        self.ready().await;
    }

    /// Trust authentication, startup parameters and the catalog.
    pub async fn accept(&mut self) {
        self.read_startup().await;
        self.auth_ok().await;
        self.finish_startup().await;
        self.serve_catalog(CATALOG).await;
    }

    /// Read Parse/Describe/Sync and return the SQL text.
    pub async fn expect_describe(&mut self) -> String {
        let parse = self.expect(b'P').await;
        assert_eq!(parse[0], 0, "unnamed statement");
        assert_eq!(&parse[parse.len() - 2..], &[0, 0], "no parameter type hints");
        let sql = String::from_utf8(parse[1..parse.len() - 3].to_vec()).unwrap();

        assert_eq!(self.expect(b'D').await, b"S\0");
        assert!(self.expect(b'S').await.is_empty());
        sql
    }

    /// Answer a describe with the given parameter OIDs and columns
    /// (`None` sends NoData).
    pub async fn describe_ok(&mut self, params: &[u32], rows: Option<&[(&str, u32, u16)]>) {
        self.send(b'1', &[]).await;
        self.send(b't', &parameter_description(params)).await;
        match rows {
            Some(rows) => self.send(b'T', &row_description(rows)).await,
            None => self.send(b'n', &[]).await,
        }
        self.ready().await;
    }

    pub async fn expect_terminate(&mut self) {
        assert!(self.expect(b'X').await.is_empty());
        assert!(self.read_to_end().await.is_empty());
    }

    /// Run SCRAM-SHA-256 as the server holding `password`.
    ///
    /// Returns whether the client proof was valid. The server-final message
    /// is sent either way, signed with the server's own keys.
    pub async fn scram(&mut self, password: &str) -> bool {
        self.auth(10, b"SCRAM-SHA-256\0\0").await;

        let initial = self.expect(b'p').await;
        let nul = initial.iter().position(|&b| b == 0).unwrap();
        assert_eq!(&initial[..nul], b"SCRAM-SHA-256");
        let len = i32::from_be_bytes(initial[nul + 1..nul + 5].try_into().unwrap()) as usize;
        let client_first = std::str::from_utf8(&initial[nul + 5..]).unwrap().to_string();
        assert_eq!(client_first.len(), len);

        let client_first_bare = client_first.strip_prefix("n,,").unwrap().to_string();
        let client_nonce = client_first_bare.split_once(",r=").unwrap().1.to_string();

        let salt = b"0123456789abcdef";
        let nonce = format!("{}SERVERNONCE", client_nonce);
        let server_first = format!("r={},s={},i=4096", nonce, BASE64.encode(salt));
        self.auth(11, server_first.as_bytes()).await;

        let client_final = self.expect(b'p').await;
        let client_final = String::from_utf8(client_final).unwrap();
        let (without_proof, proof) = client_final.rsplit_once(",p=").unwrap();
        assert_eq!(without_proof, format!("c=biws,r={}", nonce));

        let mut salted = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, 4096, &mut salted);
        let client_key = hmac(&salted, b"Client Key");
        let stored_key = Sha256::digest(&client_key);
        let auth_message = format!("{},{},{}", client_first_bare, server_first, without_proof);
        let client_signature = hmac(&stored_key, auth_message.as_bytes());

        let proof = BASE64.decode(proof).unwrap();
        let recovered: Vec<u8> = proof
            .iter()
            .zip(&client_signature)
            .map(|(a, b)| a ^ b)
            .collect();
        let valid = Sha256::digest(&recovered).as_slice() == stored_key.as_slice();

        let server_key = hmac(&salted, b"Server Key");
        let server_signature = hmac(&server_key, auth_message.as_bytes());
        self.auth(12, format!("v={}", BASE64.encode(server_signature)).as_bytes())
            .await;

        valid
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key).unwrap();
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn error_fields(severity: &str, code: &str, message: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    for (field, value) in [(b'S', severity), (b'V', severity), (b'C', code), (b'M', message)] {
        payload.push(field);
        payload.extend_from_slice(value.as_bytes());
        payload.push(0);
    }
    payload.push(0);
    payload
}

pub fn row_description(fields: &[(&str, u32, u16)]) -> Vec<u8> {
    let mut payload = (fields.len() as u16).to_be_bytes().to_vec();
    for (name, oid, format) in fields {
        payload.extend_from_slice(name.as_bytes());
        payload.push(0);
        payload.extend_from_slice(&0_u32.to_be_bytes());
        payload.extend_from_slice(&0_i16.to_be_bytes());
        payload.extend_from_slice(&oid.to_be_bytes());
        payload.extend_from_slice(&(-1_i16).to_be_bytes());
        payload.extend_from_slice(&(-1_i32).to_be_bytes());
        payload.extend_from_slice(&format.to_be_bytes());
    }
    payload
}

pub fn data_row(columns: &[&str]) -> Vec<u8> {
    let mut payload = (columns.len() as u16).to_be_bytes().to_vec();
    for column in columns {
        payload.extend_from_slice(&(column.len() as i32).to_be_bytes());
        payload.extend_from_slice(column.as_bytes());
    }
    payload
}

pub fn parameter_description(oids: &[u32]) -> Vec<u8> {
    let mut payload = (oids.len() as u16).to_be_bytes().to_vec();
    for oid in oids {
        payload.extend_from_slice(&oid.to_be_bytes());
    }
    payload
}
