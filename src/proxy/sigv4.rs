//! AWS Signature Version 4 request signing
//!
//! Produces the `Authorization`, `x-amz-date` and, for temporary
//! credentials, `x-amz-security-token` headers for a request.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::AUTHORIZATION;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const AMZ_DATE: HeaderName = HeaderName::from_static("x-amz-date");
const AMZ_SECURITY_TOKEN: HeaderName = HeaderName::from_static("x-amz-security-token");

/// AWS SigV4 signer
#[derive(Clone)]
pub struct SigV4Signer {
    access_key: String,
    secret_key: String,
    session_token: Option<String>,
    region: String,
    service: String,
}

impl std::fmt::Debug for SigV4Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigV4Signer")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl SigV4Signer {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        session_token: Option<String>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token,
            region: region.into(),
            service: service.into(),
        }
    }

    /// Headers to add to the request so that it verifies at `timestamp`
    pub fn sign(
        &self,
        method: &Method,
        url: &Url,
        body: &[u8],
        timestamp: DateTime<Utc>,
    ) -> AppResult<HeaderMap> {
        let host = url
            .host_str()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("URL has no host: {}", url)))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = timestamp.format("%Y%m%d").to_string();

        // Already sorted by name.
        let mut signed: Vec<(&str, &str)> = vec![("host", host.as_str()), ("x-amz-date", amz_date.as_str())];
        if let Some(token) = &self.session_token {
            signed.push(("x-amz-security-token", token.as_str()));
        }

        let canonical_headers: String = signed
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();
        let signed_headers = signed
            .iter()
            .map(|(k, _)| *k)
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri(url.path()),
            canonical_query(url),
            canonical_headers,
            signed_headers,
            hex::encode(Sha256::digest(body))
        );

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = hex::encode(self.signing_key(&date_stamp)?.sign(string_to_sign.as_bytes())?);
        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key, credential_scope, signed_headers, signature
        );

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, sensitive(&authorization)?);
        headers.insert(AMZ_DATE, sensitive(&amz_date)?);
        if let Some(token) = &self.session_token {
            headers.insert(AMZ_SECURITY_TOKEN, sensitive(token)?);
        }
        Ok(headers)
    }

    fn signing_key(&self, date_stamp: &str) -> AppResult<SigningKey> {
        let k_date = hmac_sha256(
            format!("AWS4{}", self.secret_key).as_bytes(),
            date_stamp.as_bytes(),
        )?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        Ok(SigningKey(hmac_sha256(&k_service, b"aws4_request")?))
    }
}

struct SigningKey(Vec<u8>);

impl SigningKey {
    fn sign(&self, data: &[u8]) -> AppResult<Vec<u8>> {
        hmac_sha256(&self.0, data)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> AppResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC key error: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sensitive(value: &str) -> AppResult<HeaderValue> {
    let mut value = HeaderValue::from_str(value).map_err(|_| {
        AppError::Internal(anyhow::anyhow!("Signature header contains invalid characters"))
    })?;
    value.set_sensitive(true);
    Ok(value)
}

/// Percent-encode one path segment, `/` included
///
/// Used for ids that land in a request path (Bedrock model ids carry `:`),
/// so the path sent and the path signed agree.
pub fn encode_path_segment(segment: &str) -> String {
    uri_encode(segment, true)
}

/// RFC 3986 encoding of everything but unreserved characters
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Canonical path: the request path with every segment encoded once more
fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        uri_encode(path, false)
    }
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, true), uri_encode(&v, true)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}
