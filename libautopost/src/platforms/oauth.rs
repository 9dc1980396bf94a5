//! OAuth 1.0a request signing (HMAC-SHA1) for the X API
//!
//! Only the user-context flow is supported: the consumer key/secret and access
//! token/secret are all known up front. Multipart and JSON bodies are not part
//! of the signature base string, so callers only pass query parameters.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;

use crate::credentials::TwitterCredentials;
use crate::error::PlatformError;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters stay as they are
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn encode(value: &str) -> String {
    utf8_percent_encode(value, RFC3986).to_string()
}

#[derive(Debug, Clone)]
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: SecretString,
    token: String,
    token_secret: SecretString,
}

impl OAuth1Signer {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: SecretString,
        token: impl Into<String>,
        token_secret: SecretString,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret,
            token: token.into(),
            token_secret,
        }
    }

    pub fn from_credentials(credentials: &TwitterCredentials) -> Self {
        Self::new(
            credentials.api_key.clone(),
            credentials.api_secret.clone(),
            credentials.access_token.clone(),
            credentials.access_secret.clone(),
        )
    }

    /// `Authorization` header value with a fresh nonce and the current time
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<String, PlatformError> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.sign_with(method, url, params, &nonce, &timestamp)
    }

    /// Deterministic form of [`authorization_header`](Self::authorization_header)
    pub fn sign_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, PlatformError> {
        let oauth_params = [
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp),
            ("oauth_token", self.token.as_str()),
            ("oauth_version", "1.0"),
        ];

        let signature = self.signature(method, url, params, &oauth_params)?;

        let mut header: Vec<String> = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect();
        header.push(format!("oauth_signature=\"{}\"", encode(&signature)));
        header.sort();

        Ok(format!("OAuth {}", header.join(", ")))
    }

    fn signature(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        oauth_params: &[(&str, &str)],
    ) -> Result<String, PlatformError> {
        let base = signature_base_string(method, url, params.iter().chain(oauth_params));
        let key = format!(
            "{}&{}",
            encode(self.consumer_secret.expose_secret()),
            encode(self.token_secret.expose_secret())
        );

        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|e| PlatformError::Authentication(format!("X signing key rejected: {}", e)))?;
        mac.update(base.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

fn parameter_string<'a>(params: impl Iterator<Item = &'a (&'a str, &'a str)>) -> String {
    let mut encoded: Vec<(String, String)> = params.map(|(k, v)| (encode(k), encode(v))).collect();
    encoded.sort();
    encoded
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn signature_base_string<'a>(
    method: &str,
    url: &str,
    params: impl Iterator<Item = &'a (&'a str, &'a str)>,
) -> String {
    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(url),
        encode(&parameter_string(params))
    )
}
