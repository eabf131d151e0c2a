//! UTCTiming clock synchronisation for dynamic presentations: one HTTP request against the
//! first supported scheme, yielding the offset between the server's wall clock and ours.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::fetch::HttpClient;
use crate::mpd;

/// Resolve the clock offset in milliseconds (`server_now - local_now`). Failures and
/// unrecognized schemes are logged and yield 0, never an error: a skewed clock degrades the
/// live-edge estimate but must not stop the ingest.
pub async fn fetch_clock_offset_ms(client: &HttpClient, timings: &[mpd::UTCTiming]) -> i64 {
    for timing in timings {
        let scheme = timing.schemeIdUri.as_deref().unwrap_or_default();
        let value = timing.value.as_deref().unwrap_or_default();
        debug!(scheme, value, "attempting UTCTiming synchronisation");
        let server_now = match scheme {
            "urn:mpeg:dash:utc:http-head:2014" | "urn:mpeg:dash:utc:http-head:2012" => {
                http_head_date(client, value).await
            }
            "urn:mpeg:dash:utc:http-xsdate:2014"
            | "urn:mpeg:dash:utc:http-xsdate:2012"
            | "urn:mpeg:dash:utc:http-iso:2014"
            | "urn:mpeg:dash:utc:http-iso:2012" => http_body_date(client, value).await,
            "urn:mpeg:dash:utc:direct:2014" | "urn:mpeg:dash:utc:direct:2012" => parse_date(value),
            other => {
                warn!(scheme = other, "unrecognized UTCTiming scheme");
                continue;
            }
        };
        if let Some(date) = server_now {
            let offset = date.timestamp_millis() - Utc::now().timestamp_millis();
            debug!(offset_ms = offset, "clock offset established");
            return offset;
        }
    }
    0
}

async fn http_head_date(client: &HttpClient, url: &str) -> Option<DateTime<Utc>> {
    let response = match client.head(url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(url, error = %e, "UTCTiming HEAD request failed");
            return None;
        }
    };
    let header = response.headers().get(reqwest::header::DATE)?.to_str().ok()?;
    match DateTime::parse_from_rfc2822(header) {
        Ok(date) => Some(date.with_timezone(&Utc)),
        Err(e) => {
            warn!(header, error = %e, "unparseable Date header from UTCTiming source");
            None
        }
    }
}

async fn http_body_date(client: &HttpClient, url: &str) -> Option<DateTime<Utc>> {
    let text = match client.get(url).send().await {
        Ok(r) => match r.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!(url, error = %e, "reading UTCTiming response failed");
                return None;
            }
        },
        Err(e) => {
            warn!(url, error = %e, "UTCTiming GET request failed");
            return None;
        }
    };
    parse_date(text.trim())
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    match crate::mpd::parse_xs_datetime(s) {
        Ok(date) => Some(date),
        Err(e) => {
            warn!(value = s, error = %e, "unparseable UTCTiming date");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_direct_scheme() {
        let client = crate::fetch::default_client().unwrap();
        let now = Utc::now();
        let timing = mpd::UTCTiming {
            schemeIdUri: Some("urn:mpeg:dash:utc:direct:2014".to_string()),
            value: Some(now.to_rfc3339()),
        };
        let offset = fetch_clock_offset_ms(&client, &[timing]).await;
        assert!(offset.abs() < 2_000);
    }

    #[tokio::test]
    async fn test_unrecognized_scheme_yields_zero() {
        let client = crate::fetch::default_client().unwrap();
        let timing = mpd::UTCTiming {
            schemeIdUri: Some("urn:mpeg:dash:utc:ntp:2014".to_string()),
            value: Some("ntp.example.com".to_string()),
        };
        assert_eq!(fetch_clock_offset_ms(&client, &[timing]).await, 0);
    }
}
