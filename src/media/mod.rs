//! The semantic media model built from a parsed manifest: streams, variants, the presentation
//! and its timeline. Streams are owned by the orchestrator's stream map and addressed by their
//! origin key `(period id, representation id)`; variants reference them by key rather than
//! owning them, so a manifest refresh can replace map entries without invalidating variants.

pub mod combiner;
pub mod segment;
pub mod timeline;

use std::collections::BTreeSet;

use crate::dash::source::SegmentIndexSource;
use crate::fetch::HttpClient;
use crate::media::segment::SegmentIndex;
use crate::media::timeline::PresentationTimeline;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Audio,
    Video,
    Text,
    Image,
    Application,
}

impl ContentType {
    pub fn from_str(s: &str) -> Option<ContentType> {
        match s {
            "audio" => Some(ContentType::Audio),
            "video" => Some(ContentType::Video),
            "text" => Some(ContentType::Text),
            "image" => Some(ContentType::Image),
            "application" => Some(ContentType::Application),
            _ => None,
        }
    }

    /// Derive the content type from a MIME type ("audio/mp4" -> Audio).
    pub fn from_mime(mime: &str) -> Option<ContentType> {
        ContentType::from_str(mime.split('/').next().unwrap_or_default())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Audio => "audio",
            ContentType::Video => "video",
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::Application => "application",
        }
    }
}

/// Transfer characteristics of a video stream, signalled via CICP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoRange {
    Sdr,
    Pq,
    Hlg,
}

/// DRM initialization data attached to a `DrmInfo`.
#[derive(Debug, Clone, PartialEq)]
pub struct InitData {
    pub init_data_type: String,
    pub data: Vec<u8>,
}

/// A normalized DRM descriptor for one key system.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrmInfo {
    /// Reverse-domain key system name, e.g. "com.widevine.alpha".
    pub key_system: String,
    pub license_server_uri: Option<String>,
    pub robustness: Option<String>,
    pub init_data: Vec<InitData>,
    /// Hex-encoded, lowercased key IDs.
    pub key_ids: BTreeSet<String>,
}

impl DrmInfo {
    pub fn new(key_system: &str) -> Self {
        DrmInfo {
            key_system: key_system.to_string(),
            ..DrmInfo::default()
        }
    }

    pub fn is_widevine(&self) -> bool {
        self.key_system == "com.widevine.alpha"
    }

    /// The first "cenc" init-data payload, base64-encoded, as key services consume it.
    pub fn pssh_base64(&self) -> Option<String> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        self.init_data
            .iter()
            .find(|d| d.init_data_type == "cenc")
            .map(|d| STANDARD.encode(&d.data))
    }
}

/// Identifies a stream across manifest refreshes.
pub type StreamKey = (String, String);

/// One elementary stream of one period, as described by a Representation.
#[derive(Debug)]
pub struct Stream {
    /// Globally unique, assigned at parse time.
    pub id: u64,
    /// `(Period.id, Representation.id)`.
    pub origin: StreamKey,
    pub content_type: ContentType,
    pub mime_type: String,
    pub codecs: String,
    /// Normalized (lowercased) language tag; empty when undeclared.
    pub language: String,
    pub label: Option<String>,
    pub roles: Vec<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub channel_count: Option<u32>,
    pub sampling_rate: Option<u32>,
    pub bandwidth: u64,
    pub drm_infos: Vec<DrmInfo>,
    pub key_ids: BTreeSet<String>,
    pub video_range: Option<VideoRange>,
    pub encrypted: bool,
    pub forced: bool,
    pub tiles_layout: Option<String>,
    pub trick_mode_for: Option<String>,
    /// Lazily realized from `index_source` on first use.
    pub segment_index: Option<SegmentIndex>,
    pub index_source: SegmentIndexSource,
}

impl Stream {
    /// Realize the segment index. The factory captured its context at parse time, so a later
    /// manifest refresh does not interfere with an index being created.
    pub async fn create_segment_index(&mut self, client: &HttpClient) -> Result<()> {
        if self.segment_index.is_some() {
            return Ok(());
        }
        let index = self.index_source.create(client).await?;
        self.segment_index = Some(index);
        Ok(())
    }

    /// The codec prefix before the first dot, lowercased: "avc1.64001f" -> "avc1".
    pub fn codec_base(&self) -> String {
        codec_base(&self.codecs)
    }
}

pub fn codec_base(codecs: &str) -> String {
    codecs
        .split(',')
        .next()
        .unwrap_or_default()
        .split('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// A stream spliced across consecutive periods: metadata from its leading member plus the member
/// keys in period order. The member streams stay in the orchestrator's map.
#[derive(Debug, Clone)]
pub struct CombinedStream {
    pub content_type: ContentType,
    pub mime_type: String,
    pub codecs: String,
    pub language: String,
    pub label: Option<String>,
    pub roles: Vec<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub channel_count: Option<u32>,
    pub sampling_rate: Option<u32>,
    pub bandwidth: u64,
    pub drm_infos: Vec<DrmInfo>,
    pub encrypted: bool,
    /// Member stream keys, one per period, in period order.
    pub members: Vec<StreamKey>,
}

impl CombinedStream {
    pub fn from_stream(stream: &Stream) -> Self {
        CombinedStream {
            content_type: stream.content_type,
            mime_type: stream.mime_type.clone(),
            codecs: stream.codecs.clone(),
            language: stream.language.clone(),
            label: stream.label.clone(),
            roles: stream.roles.clone(),
            width: stream.width,
            height: stream.height,
            frame_rate: stream.frame_rate,
            channel_count: stream.channel_count,
            sampling_rate: stream.sampling_rate,
            bandwidth: stream.bandwidth,
            drm_infos: stream.drm_infos.clone(),
            encrypted: stream.encrypted,
            members: vec![stream.origin.clone()],
        }
    }
}

/// An (audio, video) pair with aggregate bandwidth.
#[derive(Debug, Clone)]
pub struct Variant {
    pub id: u64,
    pub language: String,
    pub bandwidth: u64,
    pub audio: CombinedStream,
    pub video: CombinedStream,
}

/// The root of the media model; one per ingest, rebuilt on every manifest refresh.
#[derive(Debug)]
pub struct Presentation {
    pub timeline: PresentationTimeline,
    pub variants: Vec<Variant>,
    pub text_streams: Vec<CombinedStream>,
    pub image_streams: Vec<CombinedStream>,
    /// Always false for this engine; carried for parity with the manifest model.
    pub sequence_mode: bool,
    pub min_buffer_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(ContentType::from_mime("audio/mp4"), Some(ContentType::Audio));
        assert_eq!(ContentType::from_mime("video/webm"), Some(ContentType::Video));
        assert_eq!(ContentType::from_str("application"), Some(ContentType::Application));
        assert_eq!(ContentType::from_mime("bogus/mp4"), None);
    }

    #[test]
    fn test_codec_base() {
        assert_eq!(codec_base("avc1.64001f"), "avc1");
        assert_eq!(codec_base("mp4a.40.2,avc1.4d401f"), "mp4a");
        assert_eq!(codec_base("AVC1.64001F"), "avc1");
        assert_eq!(codec_base(""), "");
    }

    #[test]
    fn test_drm_info_pssh_base64() {
        let mut info = DrmInfo::new("com.widevine.alpha");
        assert!(info.is_widevine());
        assert_eq!(info.pssh_base64(), None);
        info.init_data.push(InitData {
            init_data_type: "cenc".to_string(),
            data: vec![1, 2, 3],
        });
        assert_eq!(info.pssh_base64().as_deref(), Some("AQID"));
    }
}
