#![allow(dead_code)]
//! Shared code for our test harness.

use std::sync::Once;

use url::Url;

use dash_hls_relay::config::RelayConfig;
use dash_hls_relay::dash::ManifestService;
use dash_hls_relay::fetch;

static TRACING_INIT: Once = Once::new();

pub fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    TRACING_INIT.call_once(|| {
        let fmt_layer = fmt::layer().compact().with_target(false);
        let filter_layer = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info,reqwest=warn,hyper=warn,h2=warn"))
            .expect("initializing logging");
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    });
}

pub fn test_base_url() -> Url {
    Url::parse("http://cdn.example.com/live/manifest.mpd").unwrap()
}

/// A service suitable for parsing manifests from strings, without any operator API behind it.
pub fn offline_service() -> ManifestService {
    ManifestService::new(RelayConfig::default(), fetch::default_client().unwrap())
}

/// Parse a manifest string into a fresh service and return the service.
pub async fn parse_into_service(xml: &str) -> anyhow::Result<ManifestService> {
    let mut service = offline_service();
    service.parse_manifest(xml, &test_base_url()).await?;
    Ok(service)
}
