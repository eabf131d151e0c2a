//! HTTP plumbing: the shared client, transient-failure retries, byte-range fetches, and the two
//! operator-supplied APIs (manifest-URL resolution and Widevine key acquisition).

use std::collections::HashMap;
use std::time::Duration;

use backoff::ExponentialBackoff;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::config::RelayConfig;
use crate::{Error, Result};

/// A `Client` from the `reqwest` crate, used for all downloads. Callers may build their own to
/// set a proxy (including SOCKS5), custom headers or timeouts.
pub type HttpClient = reqwest::Client;

pub fn default_client() -> Result<HttpClient> {
    let client = reqwest::Client::builder()
        .timeout(Duration::new(30, 0))
        .gzip(true)
        .build()?;
    Ok(client)
}

fn reqwest_error_transient_p(e: &reqwest::Error) -> bool {
    if e.is_timeout() || e.is_connect() {
        return true;
    }
    if let Some(s) = e.status() {
        if s == reqwest::StatusCode::REQUEST_TIMEOUT
            || s == reqwest::StatusCode::TOO_MANY_REQUESTS
            || s == reqwest::StatusCode::SERVICE_UNAVAILABLE
            || s == reqwest::StatusCode::GATEWAY_TIMEOUT
        {
            return true;
        }
    }
    false
}

fn categorize_reqwest_error(e: reqwest::Error) -> backoff::Error<reqwest::Error> {
    if reqwest_error_transient_p(&e) {
        backoff::Error::retry_after(e, Duration::new(5, 0))
    } else {
        backoff::Error::permanent(e)
    }
}

fn backoff_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        max_elapsed_time: Some(Duration::from_secs(60)),
        ..ExponentialBackoff::default()
    }
}

/// Fetch the manifest, returning its text and the possibly-redirected final URL.
pub async fn fetch_manifest(client: &HttpClient, url: &Url) -> Result<(String, Url)> {
    let fetch = || async {
        let response = client
            .get(url.clone())
            .header("Accept", "application/dash+xml,video/vnd.mpeg.dash.mpd")
            .header("Accept-Language", "en-US,en")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(categorize_reqwest_error)?;
        let redirected = response.url().clone();
        let text = response.text().await.map_err(categorize_reqwest_error)?;
        Ok((text, redirected)) as std::result::Result<(String, Url), backoff::Error<reqwest::Error>>
    };
    let result = backoff::future::retry_notify(backoff_policy(), fetch, |err, dur| {
        info!("Transient error at {:?}: {:?}", dur, err);
    })
    .await?;
    Ok(result)
}

/// Fetch a whole resource.
pub async fn fetch_bytes(client: &HttpClient, url: &Url, accept: &str) -> Result<Vec<u8>> {
    let fetch = || async {
        client
            .get(url.clone())
            .header("Accept", accept)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(categorize_reqwest_error)?
            .bytes()
            .await
            .map_err(categorize_reqwest_error)
    };
    let bytes = backoff::future::retry_notify(backoff_policy(), fetch, |err, dur| {
        info!("Transient error at {:?}: {:?}", dur, err);
    })
    .await?;
    Ok(bytes.to_vec())
}

/// Fetch a byte range `[start..end]` (inclusive; open-ended when `end` is `None`).
pub async fn fetch_range(
    client: &HttpClient,
    url: &Url,
    start: u64,
    end: Option<u64>,
) -> Result<Vec<u8>> {
    let range = match end {
        Some(end) => format!("bytes={start}-{end}"),
        None => format!("bytes={start}-"),
    };
    let fetch = || async {
        client
            .get(url.clone())
            .header("Range", range.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(categorize_reqwest_error)?
            .bytes()
            .await
            .map_err(categorize_reqwest_error)
    };
    let bytes = backoff::future::retry_notify(backoff_policy(), fetch, |err, dur| {
        info!("Transient error at {:?}: {:?}", dur, err);
    })
    .await?;
    Ok(bytes.to_vec())
}

/// Try each candidate URI in order, returning the first successful fetch.
pub async fn fetch_first(client: &HttpClient, uris: &[Url], accept: &str) -> Result<Vec<u8>> {
    let mut last_error: Option<Error> = None;
    for uri in uris {
        match fetch_bytes(client, uri, accept).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => {
                warn!(uri = %uri, error = %e, "segment fetch candidate failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or(Error::OperationAborted))
}

fn substitute(format: &str, config: &RelayConfig) -> String {
    format
        .replace("{service}", &config.service)
        .replace("{id}", &config.content_id)
}

fn percent_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// The operator API's answer to "where is the MPD right now".
#[derive(Debug, Clone)]
pub struct ManifestLocation {
    pub url: Url,
    /// Unix seconds after which the manifest URL must be re-resolved.
    pub expiry: i64,
}

#[derive(Deserialize)]
struct ManifestUrlResponse {
    data: String,
    expiry: i64,
}

/// Resolve the current manifest URL through the operator API.
pub async fn resolve_manifest_url(
    client: &HttpClient,
    config: &RelayConfig,
) -> Result<ManifestLocation> {
    let api_url = Url::parse(&substitute(&config.apiformat_mpd, config))?;
    let body = fetch_bytes(client, &api_url, "application/json").await?;
    let response: ManifestUrlResponse = serde_json::from_slice(&body)?;
    Ok(ManifestLocation {
        url: Url::parse(&response.data)?,
        expiry: response.expiry,
    })
}

#[derive(Deserialize)]
struct KeyResponse {
    status: bool,
    #[serde(default)]
    keys: HashMap<String, String>,
}

/// Fetch the Widevine content key for `pssh_b64` (base64 of a size-prefixed pssh box). Returns
/// `(key_id, key)` as lowercase hex, or `None` when the service declines; callers treat `None`
/// as fatal for the cycle.
pub async fn fetch_decryption_key(
    client: &HttpClient,
    config: &RelayConfig,
    pssh_b64: &str,
) -> Result<Option<(String, String)>> {
    let api_url = Url::parse(
        &substitute(&config.apiformat_key, config).replace("{pssh-box}", &percent_encode(pssh_b64)),
    )?;
    let body = fetch_bytes(client, &api_url, "application/json").await?;
    let response: KeyResponse = serde_json::from_slice(&body)?;
    if !response.status {
        warn!("key service returned status=false");
        return Ok(None);
    }
    match response.keys.into_iter().next() {
        Some((key_id, key)) => Ok(Some((key_id.to_lowercase(), key.to_lowercase()))),
        None => {
            warn!("key service response carries no keys");
            Ok(None)
        }
    }
}
