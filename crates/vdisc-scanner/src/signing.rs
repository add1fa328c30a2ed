//! HMAC request signing for the scanning service API.

use std::fmt;

use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const AUTH_SCHEME: &str = "VERACODE-HMAC-SHA-256";
const REQUEST_VERSION: &[u8] = b"vcode_request_version_1";

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("API key secret is not valid hex")]
    SecretNotHex(#[from] hex::FromHexError),
    #[error("invalid HMAC key")]
    InvalidKey,
    #[error("request URL has no host: {0}")]
    MissingHost(String),
}

#[derive(Clone)]
pub struct ApiCredentials {
    pub key_id: String,
    key_secret: String,
}

impl ApiCredentials {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        }
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .finish()
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SigningError::InvalidKey)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Builds the `Authorization` header value for one request.
///
/// The signing key is derived secret -> nonce -> timestamp -> request version,
/// then applied to `id=..&host=..&url=<path?query>&method=..`.
pub fn authorization_header(
    credentials: &ApiCredentials,
    method: &str,
    url: &Url,
    timestamp_ms: i64,
    nonce: &[u8],
) -> Result<String, SigningError> {
    let host = url
        .host_str()
        .ok_or_else(|| SigningError::MissingHost(url.to_string()))?;
    let path_and_query = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };
    let data = format!(
        "id={}&host={host}&url={path_and_query}&method={}",
        credentials.key_id,
        method.to_ascii_uppercase()
    );
    let timestamp = timestamp_ms.to_string();

    let secret = hex::decode(credentials.key_secret.trim())?;
    let key_nonce = hmac_sha256(&secret, nonce)?;
    let key_date = hmac_sha256(&key_nonce, timestamp.as_bytes())?;
    let signing_key = hmac_sha256(&key_date, REQUEST_VERSION)?;
    let signature = hmac_sha256(&signing_key, data.as_bytes())?;

    Ok(format!(
        "{AUTH_SCHEME} id={},ts={timestamp},nonce={},sig={}",
        credentials.key_id,
        hex::encode(nonce),
        hex::encode(signature)
    ))
}
