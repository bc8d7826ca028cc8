//! Authentication messages and credential derivation.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::protocol::codec::MessageBuilder;

/// The only SASL mechanism this client speaks.
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// GS2 header for "no channel binding".
const GS2_HEADER: &str = "n,,";

/// `base64(GS2_HEADER)`, sent back in the client-final-message.
const CHANNEL_BINDING: &str = "biws";

/// Random bytes in a client nonce, before base64 encoding.
const NONCE_LEN: usize = 18;

/// Write a PasswordMessage (cleartext or MD5 hashed password).
pub fn write_password(buf: &mut Vec<u8>, password: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_cstr(password);
    msg.finish();
}

/// Compute MD5 password hash.
///
/// PostgreSQL MD5 password format: "md5" + md5(md5(password + username) + salt)
pub fn md5_password(username: &str, password: &str, salt: &[u8; 4]) -> String {
    use md5::Md5;

    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(username.as_bytes());
    let first_hash_hex = format!("{:x}", hasher.finalize());

    let mut hasher = Md5::new();
    hasher.update(first_hash_hex.as_bytes());
    hasher.update(salt);

    format!("md5{:x}", hasher.finalize())
}

/// Write a SASLInitialResponse message.
///
/// mechanism: SASL mechanism name (e.g., "SCRAM-SHA-256")
/// initial_response: Client-first-message for SCRAM
pub fn write_sasl_initial_response(buf: &mut Vec<u8>, mechanism: &str, initial_response: &[u8]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_cstr(mechanism);
    msg.write_i32(initial_response.len() as i32);
    msg.write_bytes(initial_response);
    msg.finish();
}

/// Write a SASLResponse message.
///
/// response: Client-final-message for SCRAM
pub fn write_sasl_response(buf: &mut Vec<u8>, response: &[u8]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_bytes(response);
    msg.finish();
}

/// SCRAM-SHA-256 client state for one authentication exchange.
///
/// Holds the client nonce, the client-first-message-bare, and, once the
/// server-first-message has been processed, the server signature the
/// server-final-message must carry.
pub struct ScramClient {
    password: String,
    nonce: String,
    client_first_bare: String,
    server_signature: Option<String>,
}

impl std::fmt::Debug for ScramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScramClient")
            .field("nonce", &self.nonce)
            .field("client_first_bare", &self.client_first_bare)
            .finish_non_exhaustive()
    }
}

impl ScramClient {
    /// Create a new SCRAM client with a fresh random nonce.
    pub fn new(user: &str, password: &str) -> Self {
        use rand::Rng;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce_bytes);
        Self::with_nonce(user, password, BASE64.encode(nonce_bytes))
    }

    /// Create a SCRAM client with a caller-chosen nonce.
    pub fn with_nonce(user: &str, password: &str, nonce: String) -> Self {
        let client_first_bare = format!("n={},r={}", user, nonce);
        Self {
            password: password.to_string(),
            nonce,
            client_first_bare,
            server_signature: None,
        }
    }

    /// The client nonce.
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Generate the client-first-message: `n,,n=<user>,r=<nonce>`.
    pub fn client_first_message(&self) -> String {
        format!("{}{}", GS2_HEADER, self.client_first_bare)
    }

    /// Process server-first-message and generate client-final-message.
    pub fn process_server_first(&mut self, server_first: &str) -> Result<String> {
        let attrs = parse_attributes(server_first)?;

        let combined_nonce = attribute(&attrs, "r")?;
        if !combined_nonce.starts_with(&self.nonce) {
            return Err(Error::Auth(
                "SCRAM-SHA-256 nonce mismatch: server nonce does not extend client nonce".into(),
            ));
        }

        let salt = BASE64
            .decode(attribute(&attrs, "s")?)
            .map_err(|e| Error::Protocol(format!("SCRAM-SHA-256: invalid salt: {}", e)))?;
        let iterations: u32 = attribute(&attrs, "i")?
            .parse()
            .ok()
            .filter(|&i| i > 0)
            .ok_or_else(|| Error::Protocol("SCRAM-SHA-256: invalid iteration count".into()))?;

        let mut salted_password = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            self.password.as_bytes(),
            &salt,
            iterations,
            &mut salted_password,
        );

        let client_key = hmac_sha256(&salted_password, b"Client Key")?;
        let stored_key = Sha256::digest(&client_key);

        let client_final_without_proof = format!("c={},r={}", CHANNEL_BINDING, combined_nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare, server_first, client_final_without_proof
        );

        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes())?;
        let client_proof = xor(&client_key, &client_signature)?;

        let server_key = hmac_sha256(&salted_password, b"Server Key")?;
        let server_signature = hmac_sha256(&server_key, auth_message.as_bytes())?;
        self.server_signature = Some(BASE64.encode(server_signature));

        Ok(format!(
            "{},p={}",
            client_final_without_proof,
            BASE64.encode(client_proof)
        ))
    }

    /// Verify server-final-message: it must be exactly `v=<ServerSignature>`.
    pub fn verify_server_final(&self, server_final: &str) -> Result<()> {
        let expected = self
            .server_signature
            .as_ref()
            .ok_or_else(|| Error::Protocol("SCRAM-SHA-256: server-final before server-first".into()))?;

        match server_final.strip_prefix("v=") {
            Some(signature) if signature == expected => Ok(()),
            _ => Err(Error::Auth("SCRAM-SHA-256 verification failure".into())),
        }
    }
}

/// Split `k=v,k=v,...` on the first `=` of each attribute.
fn parse_attributes(data: &str) -> Result<Vec<(&str, &str)>> {
    data.split(',')
        .map(|part| {
            part.split_once('=').ok_or_else(|| {
                Error::Protocol(format!("SCRAM-SHA-256: malformed attribute '{}'", part))
            })
        })
        .collect()
}

fn attribute<'a>(attrs: &[(&str, &'a str)], key: &str) -> Result<&'a str> {
    attrs
        .iter()
        .rev()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
        .ok_or_else(|| Error::Protocol(format!("SCRAM-SHA-256: missing attribute '{}'", key)))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
        .map_err(|e| Error::Auth(format!("HMAC error: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn xor(a: &[u8], b: &[u8]) -> Result<Vec<u8>> {
    if a.len() != b.len() {
        return Err(Error::Auth(format!(
            "SCRAM-SHA-256: XOR operand length mismatch: {} != {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b).map(|(x, y)| x ^ y).collect())
}
