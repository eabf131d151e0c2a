//! Runtime configuration consumed by the core. The command-line surface and JSON loader live in
//! the embedding binary; the core only sees this plain struct.

use std::path::PathBuf;

/// Which bandwidth tier of the sorted variant list to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BandwidthTier {
    Low,
    #[default]
    Mid,
    High,
}

impl BandwidthTier {
    pub fn from_str(s: &str) -> Option<BandwidthTier> {
        match s {
            "low" => Some(BandwidthTier::Low),
            "mid" | "medium" => Some(BandwidthTier::Mid),
            "high" => Some(BandwidthTier::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Operator service name, substituted for `{service}` in the API formats.
    pub service: String,
    /// Content identifier, substituted for `{id}`.
    pub content_id: String,
    /// URL format of the manifest-resolution API; `{service}` and `{id}` are substituted.
    pub apiformat_mpd: String,
    /// URL format of the decryption-key API; `{service}`, `{id}` and `{pssh-box}` are
    /// substituted.
    pub apiformat_key: String,
    /// Acceptable audio languages, in preference order.
    pub languages: Vec<String>,
    pub bandwidth: BandwidthTier,
    /// Maximum number of segments retained per HLS media playlist.
    pub max_segment_num: usize,
    /// Path of the external decryption helper.
    pub decrypt_script: PathBuf,
    /// Working directory holding the transient `download/` and `output/` trees.
    pub repo_root: PathBuf,
    /// Directory the HLS playlists and decrypted segments are written to.
    pub outpath: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            service: String::new(),
            content_id: String::new(),
            apiformat_mpd: String::new(),
            apiformat_key: String::new(),
            languages: vec!["en".to_string()],
            bandwidth: BandwidthTier::default(),
            max_segment_num: 6,
            decrypt_script: PathBuf::from("decrypt.sh"),
            repo_root: PathBuf::from("."),
            outpath: PathBuf::from("/var/www/html"),
        }
    }
}
