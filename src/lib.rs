//! A Rust library for re-serving a live, Widevine-encrypted DASH (MPEG-DASH) presentation as an
//! HLS event stream. The library fetches and parses a DASH MPD manifest (XML format) to Rust
//! structs, resolves the segment addressing modes (SegmentBase with a SIDX or WebM Cues index,
//! SegmentList, SegmentTemplate), models the live presentation timeline, and drives a rolling
//! live-window loop that downloads encrypted fMP4 segments, hands them to an external decryption
//! helper, and rewrites HLS master and media playlists with a bounded number of retained segments.
//!
//! [DASH](https://en.wikipedia.org/wiki/Dynamic_Adaptive_Streaming_over_HTTP) (dynamic adaptive
//! streaming over HTTP), also called MPEG-DASH, is a technology used for media streaming over the
//! web. The Media Presentation Description (MPD) is a description of the resources (manifest or
//! "playlist") forming a streaming service, that a DASH client uses to determine which assets to
//! request in order to perform adaptive streaming of the content. HLS (HTTP Live Streaming) is the
//! playlist-based protocol this library emits, consisting of a master playlist referencing media
//! playlists of media segments.
//!
//! The library does not play media and does not implement a Widevine client: decryption keys are
//! obtained from an operator-supplied HTTP endpoint, and the actual decryption is delegated to an
//! external helper program invoked as a subprocess.

// Reference dash.js library: https://github.com/Dash-Industry-Forum/dash.js
// Google Shaka player: https://github.com/google/shaka-player
// DASH-IF timing model: https://dashif.org/Guidelines-TimingModel/

pub mod config;
pub mod dash;
pub mod decrypt;
pub mod ebml;
pub mod fetch;
pub mod hls;
pub mod media;
pub mod mp4;
pub mod mpd;
pub mod reader;
pub mod webm;

pub use crate::mpd::{parse, MPD};

/// How serious an error is for the ongoing ingest: a `Critical` error terminates the run unless a
/// supervising loop re-classifies it, a `Recoverable` error is logged and the loop continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Recoverable,
}

/// The subsystem an error originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Manifest,
    Media,
    Player,
    Segment,
    Network,
}

/// Stable error codes, independent of the human-readable message. `Display` renders the
/// conventional SCREAMING_SNAKE form used in logs and by operators' alerting rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCode {
    DashInvalidXml,
    DashNoSegmentInfo,
    DashUnsupportedContainer,
    DashWebmMissingInit,
    DashConflictingKeyIds,
    DashNoCommonKeySystem,
    DashDuplicateRepresentationId,
    DashEmptyPeriod,
    DashEmptyAdaptationSet,
    DashPsshBadEncoding,
    DashMultipleKeyIdsNotSupported,
    DashXlinkDepthLimit,
    Mp4SidxWrongBoxType,
    Mp4SidxInvalidTimescale,
    Mp4SidxTypeNotSupported,
    WebmCuesElementMissing,
    WebmEbmlHeaderElementMissing,
    WebmSegmentElementMissing,
    WebmInfoElementMissing,
    WebmDurationElementMissing,
    WebmCueTimeElementMissing,
    WebmCueTrackPositionsElementMissing,
    BufferReadOutOfBounds,
    IntegerOverflow,
    EbmlOverflow,
    EbmlBadFloatingPointSize,
    OperationAborted,
    SegmentManipulationFailed,
    HlsCouldNotGuessCodecs,
    NoLanguageMatch,
    KeyFetchFailed,
    InvalidDuration,
    InvalidDateTime,
    Network,
    Io,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::DashInvalidXml => "DASH_INVALID_XML",
            ErrorCode::DashNoSegmentInfo => "DASH_NO_SEGMENT_INFO",
            ErrorCode::DashUnsupportedContainer => "DASH_UNSUPPORTED_CONTAINER",
            ErrorCode::DashWebmMissingInit => "DASH_WEBM_MISSING_INIT",
            ErrorCode::DashConflictingKeyIds => "DASH_CONFLICTING_KEY_IDS",
            ErrorCode::DashNoCommonKeySystem => "DASH_NO_COMMON_KEY_SYSTEM",
            ErrorCode::DashDuplicateRepresentationId => "DASH_DUPLICATE_REPRESENTATION_ID",
            ErrorCode::DashEmptyPeriod => "DASH_EMPTY_PERIOD",
            ErrorCode::DashEmptyAdaptationSet => "DASH_EMPTY_ADAPTATION_SET",
            ErrorCode::DashPsshBadEncoding => "DASH_PSSH_BAD_ENCODING",
            ErrorCode::DashMultipleKeyIdsNotSupported => "DASH_MULTIPLE_KEY_IDS_NOT_SUPPORTED",
            ErrorCode::DashXlinkDepthLimit => "DASH_XLINK_DEPTH_LIMIT",
            ErrorCode::Mp4SidxWrongBoxType => "MP4_SIDX_WRONG_BOX_TYPE",
            ErrorCode::Mp4SidxInvalidTimescale => "MP4_SIDX_INVALID_TIMESCALE",
            ErrorCode::Mp4SidxTypeNotSupported => "MP4_SIDX_TYPE_NOT_SUPPORTED",
            ErrorCode::WebmCuesElementMissing => "WEBM_CUES_ELEMENT_MISSING",
            ErrorCode::WebmEbmlHeaderElementMissing => "WEBM_EBML_HEADER_ELEMENT_MISSING",
            ErrorCode::WebmSegmentElementMissing => "WEBM_SEGMENT_ELEMENT_MISSING",
            ErrorCode::WebmInfoElementMissing => "WEBM_INFO_ELEMENT_MISSING",
            ErrorCode::WebmDurationElementMissing => "WEBM_DURATION_ELEMENT_MISSING",
            ErrorCode::WebmCueTimeElementMissing => "WEBM_CUE_TIME_ELEMENT_MISSING",
            ErrorCode::WebmCueTrackPositionsElementMissing => {
                "WEBM_CUE_TRACK_POSITIONS_ELEMENT_MISSING"
            }
            ErrorCode::BufferReadOutOfBounds => "BUFFER_READ_OUT_OF_BOUNDS",
            ErrorCode::IntegerOverflow => "INTEGER_OVERFLOW",
            ErrorCode::EbmlOverflow => "EBML_OVERFLOW",
            ErrorCode::EbmlBadFloatingPointSize => "EBML_BAD_FLOATING_POINT_SIZE",
            ErrorCode::OperationAborted => "OPERATION_ABORTED",
            ErrorCode::SegmentManipulationFailed => "SEGMENT_MANIPULATION_FAILED",
            ErrorCode::HlsCouldNotGuessCodecs => "HLS_COULD_NOT_GUESS_CODECS",
            ErrorCode::NoLanguageMatch => "NO_LANGUAGE_MATCH",
            ErrorCode::KeyFetchFailed => "KEY_FETCH_FAILED",
            ErrorCode::InvalidDuration => "INVALID_DURATION",
            ErrorCode::InvalidDateTime => "INVALID_DATETIME",
            ErrorCode::Network => "NETWORK",
            ErrorCode::Io => "IO",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid MPD XML: {0}")]
    InvalidXml(String),
    #[error("representation {0} has no usable segment info")]
    NoSegmentInfo(String),
    #[error("unsupported media container {0:?}")]
    UnsupportedContainer(String),
    #[error("WebM SegmentBase requires an Initialization element")]
    WebmMissingInit,
    #[error("conflicting default key IDs within one AdaptationSet")]
    ConflictingKeyIds,
    #[error("multiple default key IDs on one element are not supported")]
    MultipleKeyIdsNotSupported,
    #[error("no common key system across representations")]
    NoCommonKeySystem,
    #[error("duplicate representation ID {0} in dynamic manifest")]
    DuplicateRepresentationId(String),
    #[error("period {0} contains no usable streams")]
    EmptyPeriod(String),
    #[error("adaptation set contains no usable representations")]
    EmptyAdaptationSet,
    #[error("cenc:pssh content is not valid base64")]
    PsshBadEncoding(#[source] base64::DecodeError),
    #[error("xlink dereference depth limit reached")]
    XlinkDepthLimit,
    #[error("expected a sidx box, found {0:?}")]
    SidxWrongBoxType(String),
    #[error("sidx box declares a zero timescale")]
    SidxInvalidTimescale,
    #[error("hierarchical sidx references are not supported")]
    SidxTypeNotSupported,
    #[error("WebM Cues element missing")]
    WebmCuesElementMissing,
    #[error("WebM EBML header missing")]
    WebmEbmlHeaderElementMissing,
    #[error("WebM Segment element missing")]
    WebmSegmentElementMissing,
    #[error("WebM Info element missing")]
    WebmInfoElementMissing,
    #[error("WebM Duration element missing")]
    WebmDurationElementMissing,
    #[error("WebM CueTime element missing")]
    WebmCueTimeElementMissing,
    #[error("WebM CueTrackPositions element missing")]
    WebmCueTrackPositionsElementMissing,
    #[error("read of {requested} bytes at position {position} exceeds buffer length {length}")]
    BufferReadOutOfBounds {
        position: usize,
        requested: usize,
        length: usize,
    },
    #[error("integer exceeds the 53-bit safe range")]
    IntegerOverflow,
    #[error("EBML variable-size integer exceeds the 53-bit safe range")]
    EbmlOverflow,
    #[error("EBML float element has a size other than 4 or 8 bytes")]
    EbmlBadFloatingPointSize,
    #[error("operation aborted")]
    OperationAborted,
    #[error("segment manipulation failed: {0}")]
    SegmentManipulationFailed(String),
    #[error("could not guess codecs for the HLS master playlist")]
    CouldNotGuessCodecs,
    #[error("no variant matches the configured languages {0:?}")]
    NoLanguageMatch(Vec<String>),
    #[error("key fetch failed: {0}")]
    KeyFetchFailed(String),
    #[error("invalid xs:duration {0:?}")]
    InvalidDuration(String),
    #[error("invalid xs:dateTime {0:?}")]
    InvalidDateTime(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error {1}")]
    Io(#[source] std::io::Error, String),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidXml(_) => ErrorCode::DashInvalidXml,
            Error::NoSegmentInfo(_) => ErrorCode::DashNoSegmentInfo,
            Error::UnsupportedContainer(_) => ErrorCode::DashUnsupportedContainer,
            Error::WebmMissingInit => ErrorCode::DashWebmMissingInit,
            Error::ConflictingKeyIds => ErrorCode::DashConflictingKeyIds,
            Error::MultipleKeyIdsNotSupported => ErrorCode::DashMultipleKeyIdsNotSupported,
            Error::NoCommonKeySystem => ErrorCode::DashNoCommonKeySystem,
            Error::DuplicateRepresentationId(_) => ErrorCode::DashDuplicateRepresentationId,
            Error::EmptyPeriod(_) => ErrorCode::DashEmptyPeriod,
            Error::EmptyAdaptationSet => ErrorCode::DashEmptyAdaptationSet,
            Error::PsshBadEncoding(_) => ErrorCode::DashPsshBadEncoding,
            Error::XlinkDepthLimit => ErrorCode::DashXlinkDepthLimit,
            Error::SidxWrongBoxType(_) => ErrorCode::Mp4SidxWrongBoxType,
            Error::SidxInvalidTimescale => ErrorCode::Mp4SidxInvalidTimescale,
            Error::SidxTypeNotSupported => ErrorCode::Mp4SidxTypeNotSupported,
            Error::WebmCuesElementMissing => ErrorCode::WebmCuesElementMissing,
            Error::WebmEbmlHeaderElementMissing => ErrorCode::WebmEbmlHeaderElementMissing,
            Error::WebmSegmentElementMissing => ErrorCode::WebmSegmentElementMissing,
            Error::WebmInfoElementMissing => ErrorCode::WebmInfoElementMissing,
            Error::WebmDurationElementMissing => ErrorCode::WebmDurationElementMissing,
            Error::WebmCueTimeElementMissing => ErrorCode::WebmCueTimeElementMissing,
            Error::WebmCueTrackPositionsElementMissing => {
                ErrorCode::WebmCueTrackPositionsElementMissing
            }
            Error::BufferReadOutOfBounds { .. } => ErrorCode::BufferReadOutOfBounds,
            Error::IntegerOverflow => ErrorCode::IntegerOverflow,
            Error::EbmlOverflow => ErrorCode::EbmlOverflow,
            Error::EbmlBadFloatingPointSize => ErrorCode::EbmlBadFloatingPointSize,
            Error::OperationAborted => ErrorCode::OperationAborted,
            Error::SegmentManipulationFailed(_) => ErrorCode::SegmentManipulationFailed,
            Error::CouldNotGuessCodecs => ErrorCode::HlsCouldNotGuessCodecs,
            Error::NoLanguageMatch(_) => ErrorCode::NoLanguageMatch,
            Error::KeyFetchFailed(_) => ErrorCode::KeyFetchFailed,
            Error::InvalidDuration(_) => ErrorCode::InvalidDuration,
            Error::InvalidDateTime(_) => ErrorCode::InvalidDateTime,
            Error::Network(_) => ErrorCode::Network,
            Error::UrlParse(_) => ErrorCode::DashInvalidXml,
            Error::Json(_) => ErrorCode::KeyFetchFailed,
            Error::Io(..) => ErrorCode::Io,
        }
    }

    pub fn category(&self) -> Category {
        match self.code() {
            ErrorCode::DashInvalidXml
            | ErrorCode::DashNoSegmentInfo
            | ErrorCode::DashUnsupportedContainer
            | ErrorCode::DashWebmMissingInit
            | ErrorCode::DashConflictingKeyIds
            | ErrorCode::DashNoCommonKeySystem
            | ErrorCode::DashDuplicateRepresentationId
            | ErrorCode::DashEmptyPeriod
            | ErrorCode::DashEmptyAdaptationSet
            | ErrorCode::DashPsshBadEncoding
            | ErrorCode::DashMultipleKeyIdsNotSupported
            | ErrorCode::DashXlinkDepthLimit
            | ErrorCode::InvalidDuration
            | ErrorCode::InvalidDateTime => Category::Manifest,
            ErrorCode::Mp4SidxWrongBoxType
            | ErrorCode::Mp4SidxInvalidTimescale
            | ErrorCode::Mp4SidxTypeNotSupported
            | ErrorCode::WebmCuesElementMissing
            | ErrorCode::WebmEbmlHeaderElementMissing
            | ErrorCode::WebmSegmentElementMissing
            | ErrorCode::WebmInfoElementMissing
            | ErrorCode::WebmDurationElementMissing
            | ErrorCode::WebmCueTimeElementMissing
            | ErrorCode::WebmCueTrackPositionsElementMissing
            | ErrorCode::BufferReadOutOfBounds
            | ErrorCode::IntegerOverflow
            | ErrorCode::EbmlOverflow
            | ErrorCode::EbmlBadFloatingPointSize => Category::Media,
            ErrorCode::OperationAborted
            | ErrorCode::NoLanguageMatch
            | ErrorCode::HlsCouldNotGuessCodecs => Category::Player,
            ErrorCode::SegmentManipulationFailed | ErrorCode::Io => Category::Segment,
            ErrorCode::KeyFetchFailed | ErrorCode::Network => Category::Network,
        }
    }

    /// The default severity of this error. A supervising loop may downgrade a `Critical` error to
    /// recoverable treatment, e.g. during manifest refresh.
    pub fn severity(&self) -> Severity {
        match self.code() {
            ErrorCode::OperationAborted => Severity::Recoverable,
            _ => Severity::Critical,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(
            Error::SidxInvalidTimescale.code().to_string(),
            "MP4_SIDX_INVALID_TIMESCALE"
        );
        assert_eq!(
            Error::WebmCuesElementMissing.code().to_string(),
            "WEBM_CUES_ELEMENT_MISSING"
        );
        assert_eq!(Error::IntegerOverflow.code().to_string(), "INTEGER_OVERFLOW");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::InvalidXml("x".into()).category(), Category::Manifest);
        assert_eq!(Error::SidxTypeNotSupported.category(), Category::Media);
        assert_eq!(
            Error::SegmentManipulationFailed("decrypt".into()).category(),
            Category::Segment
        );
        assert_eq!(
            Error::KeyFetchFailed("status false".into()).category(),
            Category::Network
        );
        assert_eq!(Error::OperationAborted.severity(), Severity::Recoverable);
        assert_eq!(Error::ConflictingKeyIds.severity(), Severity::Critical);
    }
}
