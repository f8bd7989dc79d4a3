//! SCRAM-SHA-256 client (RFC 5802 / RFC 7677) without channel binding.
//!
//! The exchange is three messages long:
//!
//! ```text
//! client-first  → n,,n=,r=<client nonce>
//! server-first  ← r=<nonce>,s=<salt>,i=<iterations>
//! client-final  → c=biws,r=<nonce>,p=<proof>
//! server-final  ← v=<server signature>
//! ```
//!
//! The user name is left empty in `client-first`; the server already knows
//! it from the StartupMessage.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 24;

/// "biws" is base64("n,,"): GS2 header with no channel binding.
const CHANNEL_BINDING: &str = "c=biws";

enum State {
    Initial,
    AwaitingFinal { server_signature: Vec<u8> },
    Done,
}

/// Client side of a SCRAM-SHA-256 exchange.
pub struct ScramSha256 {
    password: String,
    client_nonce: String,
    state: State,
}

impl ScramSha256 {
    /// SASL mechanism name.
    pub const MECHANISM: &'static str = "SCRAM-SHA-256";

    /// Start an exchange with a fresh random nonce.
    pub fn new(password: impl Into<String>) -> Self {
        let nonce = rand::rng()
            .sample_iter(&rand::distr::Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect::<String>();
        Self::with_nonce(password, nonce)
    }

    /// Start an exchange with a caller-chosen nonce.
    pub fn with_nonce(password: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            client_nonce: nonce.into(),
            state: State::Initial,
        }
    }

    fn client_first_bare(&self) -> String {
        format!("n=,r={}", self.client_nonce)
    }

    /// The client-first-message, sent in SASLInitialResponse.
    #[must_use]
    pub fn client_first(&self) -> Vec<u8> {
        format!("n,,{}", self.client_first_bare()).into_bytes()
    }

    /// Consume the server-first-message and produce the client-final-message.
    pub fn handle_server_first(&mut self, data: &[u8]) -> Result<Vec<u8>, AuthError> {
        if !matches!(self.state, State::Initial) {
            return Err(AuthError::Scram("unexpected server-first-message".into()));
        }
        let server_first = std::str::from_utf8(data)
            .map_err(|_| AuthError::Scram("server-first-message is not UTF-8".into()))?;

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for part in server_first.split(',') {
            if let Some(v) = part.strip_prefix("r=") {
                nonce = Some(v);
            } else if let Some(v) = part.strip_prefix("s=") {
                salt = Some(v);
            } else if let Some(v) = part.strip_prefix("i=") {
                iterations = Some(
                    v.parse::<u32>()
                        .map_err(|_| AuthError::Scram(format!("bad iteration count: {v}")))?,
                );
            }
        }
        let (Some(nonce), Some(salt), Some(iterations)) = (nonce, salt, iterations) else {
            return Err(AuthError::Scram("incomplete server-first-message".into()));
        };
        if !nonce.starts_with(&self.client_nonce) || nonce.len() == self.client_nonce.len() {
            return Err(AuthError::Scram("server nonce mismatch".into()));
        }
        if iterations == 0 {
            return Err(AuthError::Scram("iteration count must be positive".into()));
        }
        let salt = BASE64
            .decode(salt)
            .map_err(|_| AuthError::Scram("bad salt encoding".into()))?;

        let mut salted_password = [0u8; 32];
        pbkdf2_hmac::<Sha256>(
            self.password.as_bytes(),
            &salt,
            iterations,
            &mut salted_password,
        );

        let client_key = hmac_sha256(&salted_password, b"Client Key")?;
        let stored_key = Sha256::digest(&client_key);

        let client_final_without_proof = format!("{CHANNEL_BINDING},r={nonce}");
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first,
            client_final_without_proof
        );

        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(a, b)| a ^ b)
            .collect();

        let server_key = hmac_sha256(&salted_password, b"Server Key")?;
        let server_signature = hmac_sha256(&server_key, auth_message.as_bytes())?;

        self.state = State::AwaitingFinal { server_signature };
        Ok(format!("{client_final_without_proof},p={}", BASE64.encode(&proof)).into_bytes())
    }

    /// Verify the server-final-message.
    pub fn verify_server_final(&mut self, data: &[u8]) -> Result<(), AuthError> {
        let State::AwaitingFinal { server_signature } = &self.state else {
            return Err(AuthError::Scram("unexpected server-final-message".into()));
        };
        let server_final = std::str::from_utf8(data)
            .map_err(|_| AuthError::Scram("server-final-message is not UTF-8".into()))?;

        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(AuthError::Scram(format!("server rejected exchange: {err}")));
        }
        let verifier = server_final
            .split(',')
            .find_map(|part| part.strip_prefix("v="))
            .ok_or_else(|| AuthError::Scram("missing server signature".into()))?;
        let verifier = BASE64
            .decode(verifier)
            .map_err(|_| AuthError::Scram("bad server signature encoding".into()))?;

        if verifier != *server_signature {
            return Err(AuthError::ServerSignatureMismatch);
        }
        self.state = State::Done;
        tracing::debug!("SCRAM server signature verified");
        Ok(())
    }

    /// Whether the server signature has been verified.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.state, State::Done)
    }
}

impl std::fmt::Debug for ScramSha256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScramSha256")
            .field("password", &"[REDACTED]")
            .field("complete", &self.is_complete())
            .finish_non_exhaustive()
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, AuthError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AuthError::Scram(format!("HMAC key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // RFC 7677 exchange, recomputed for an empty SASL user name.
    const CLIENT_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const SERVER_FIRST: &str = "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
    const CLIENT_FINAL: &str = "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=qvT2SWdEH5Q06albL+hjSYuUhCG7VndFyzIb7CK4n9k=";
    const SERVER_FINAL: &str = "v=3HO6Qt1M4MKJrmlKaoOqLAI0/0TV0HZe7J9H3MBtSOg=";

    #[test]
    fn test_full_exchange() {
        let mut scram = ScramSha256::with_nonce("pencil", CLIENT_NONCE);
        assert_eq!(scram.client_first(), b"n,,n=,r=rOprNGfwEbeRWgbNEkqO");

        let client_final = scram.handle_server_first(SERVER_FIRST.as_bytes()).unwrap();
        assert_eq!(std::str::from_utf8(&client_final).unwrap(), CLIENT_FINAL);

        scram.verify_server_final(SERVER_FINAL.as_bytes()).unwrap();
        assert!(scram.is_complete());
    }

    #[test]
    fn test_wrong_server_signature() {
        let mut scram = ScramSha256::with_nonce("pencil", CLIENT_NONCE);
        scram.handle_server_first(SERVER_FIRST.as_bytes()).unwrap();
        let result = scram.verify_server_final(b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=");
        assert!(matches!(result, Err(AuthError::ServerSignatureMismatch)));
    }

    #[test]
    fn test_nonce_mismatch() {
        let mut scram = ScramSha256::with_nonce("pencil", "someothernonce");
        let result = scram.handle_server_first(SERVER_FIRST.as_bytes());
        assert!(matches!(result, Err(AuthError::Scram(_))));
    }

    #[test]
    fn test_server_error_attribute() {
        let mut scram = ScramSha256::with_nonce("pencil", CLIENT_NONCE);
        scram.handle_server_first(SERVER_FIRST.as_bytes()).unwrap();
        let result = scram.verify_server_final(b"e=invalid-proof");
        assert!(matches!(result, Err(AuthError::Scram(msg)) if msg.contains("invalid-proof")));
    }

    #[test]
    fn test_final_before_first_rejected() {
        let mut scram = ScramSha256::new("pencil");
        assert!(scram.verify_server_final(SERVER_FINAL.as_bytes()).is_err());
    }

    #[test]
    fn test_random_nonce_shape() {
        let scram = ScramSha256::new("pw");
        let first = String::from_utf8(scram.client_first()).unwrap();
        let nonce = first.strip_prefix("n,,n=,r=").unwrap();
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
