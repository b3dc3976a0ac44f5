//! IAM auth token generation for managed-database connections.
//!
//! The token is a SigV4-presigned request against the `rds-db` service,
//! rendered without a scheme as `host:port/?<query>`. The database engine
//! accepts it in place of the password for users granted the
//! `rds_iam`/`AWSAuthenticationPlugin` role. Tokens are short-lived (900 s)
//! and must never be logged or returned to RPC callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{BrokerError, BrokerResult};

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "rds-db";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const TOKEN_EXPIRY_SECONDS: u32 = 900;

/// What the broker knows about the connection target when it asks for a
/// token. The region falls back to the provider's configured region when
/// absent.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub region: Option<String>,
}

/// Seam between the broker and the token source, so connection logic can be
/// tested without real credentials.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_auth_token(&self, request: &AuthRequest) -> BrokerResult<String>;
}

/// AWS credentials used for signing.
#[derive(Clone)]
pub struct SigningCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Token provider backed by local SigV4 presigning.
pub struct SigV4TokenProvider {
    credentials: SigningCredentials,
    region: String,
}

impl SigV4TokenProvider {
    pub fn new(credentials: SigningCredentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    /// Presign at an explicit instant. The public trait method calls this
    /// with `Utc::now()`; tests call it directly for deterministic output.
    fn presign_at(&self, request: &AuthRequest, now: DateTime<Utc>) -> String {
        let region = request.region.as_deref().unwrap_or(&self.region);
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/{}/aws4_request", date_stamp, region, SERVICE);
        let credential = format!("{}/{}", self.credentials.access_key_id, scope);

        // Query parameters in byte-sorted key order, AWS-encoded.
        let mut params: Vec<(String, String)> = vec![
            ("Action".to_string(), "connect".to_string()),
            ("DBUser".to_string(), request.username.clone()),
            ("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()),
            ("X-Amz-Credential".to_string(), credential),
            ("X-Amz-Date".to_string(), amz_date.clone()),
            ("X-Amz-Expires".to_string(), TOKEN_EXPIRY_SECONDS.to_string()),
        ];
        if let Some(token) = &self.credentials.session_token {
            params.push(("X-Amz-Security-Token".to_string(), token.clone()));
        }
        params.push(("X-Amz-SignedHeaders".to_string(), "host".to_string()));
        params.sort();

        let canonical_query = params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let host = format!("{}:{}", request.hostname, request.port);
        let canonical_request = format!(
            "GET\n/\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            canonical_query, host
        );

        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = hex::encode(self.signing_key(&date_stamp, region, &string_to_sign));

        format!("{}/?{}&X-Amz-Signature={}", host, canonical_query, signature)
    }

    fn signing_key(&self, date_stamp: &str, region: &str, string_to_sign: &str) -> Vec<u8> {
        let secret = format!("AWS4{}", self.credentials.secret_access_key);
        let k_date = hmac_sha256(secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, region.as_bytes());
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        hmac_sha256(&k_signing, string_to_sign.as_bytes())
    }
}

#[async_trait]
impl TokenProvider for SigV4TokenProvider {
    async fn get_auth_token(&self, request: &AuthRequest) -> BrokerResult<String> {
        if self.credentials.access_key_id.is_empty() || self.credentials.secret_access_key.is_empty()
        {
            return Err(BrokerError::auth("AWS credentials are not configured"));
        }
        if request.username.is_empty() {
            return Err(BrokerError::auth("Database username is required"));
        }
        Ok(self.presign_at(request, Utc::now()))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// AWS-style percent encoding: unreserved characters pass through, everything
/// else is encoded, uppercase hex.
fn uri_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                out.push('%');
                out.push_str(&format!("{:02X}", byte));
            }
        }
    }
    out
}

/// Fixed-token provider for tests and local development against databases
/// that accept a plain password.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_auth_token(&self, _request: &AuthRequest) -> BrokerResult<String> {
        Ok(self.token.clone())
    }
}
