//! Combining per-period streams into cross-period variants. Streams from consecutive periods
//! that describe "the same" content (matched on language, roles, channel count, label and codec
//! family) are spliced into one logical stream; audio and video streams are then paired into
//! variants whose DRM requirements are mutually satisfiable.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::media::{CombinedStream, ContentType, Stream, StreamKey, Variant};

/// One period's worth of parsed streams, in document order.
#[derive(Debug, Clone)]
pub struct PeriodStreams {
    pub period_id: String,
    pub start: f64,
    pub stream_keys: Vec<StreamKey>,
}

/// The combiner output: variants plus the text and image stream lists.
#[derive(Debug, Default)]
pub struct CombinedOutput {
    pub variants: Vec<Variant>,
    pub text_streams: Vec<CombinedStream>,
    pub image_streams: Vec<CombinedStream>,
}

/// Re-run on every manifest refresh over the full period list.
pub fn combine(
    periods: &[PeriodStreams],
    streams: &HashMap<StreamKey, Stream>,
) -> CombinedOutput {
    let audio = combine_content_type(periods, streams, ContentType::Audio);
    let video = combine_content_type(periods, streams, ContentType::Video);
    let text_streams = combine_content_type(periods, streams, ContentType::Text);
    let image_streams = combine_content_type(periods, streams, ContentType::Image);

    let mut variants = Vec::new();
    let mut id = 0u64;
    for video_stream in &video {
        for audio_stream in &audio {
            if !drm_compatible(audio_stream, video_stream) {
                debug!(
                    audio = %audio_stream.language,
                    "skipping variant with incompatible key systems"
                );
                continue;
            }
            variants.push(Variant {
                id,
                language: if audio_stream.language.is_empty() {
                    video_stream.language.clone()
                } else {
                    audio_stream.language.clone()
                },
                bandwidth: audio_stream.bandwidth + video_stream.bandwidth,
                audio: audio_stream.clone(),
                video: video_stream.clone(),
            });
            id += 1;
        }
    }
    if variants.is_empty() && (!audio.is_empty() || !video.is_empty()) {
        warn!("no audio+video variants could be combined from this manifest");
    }

    CombinedOutput {
        variants,
        text_streams,
        image_streams,
    }
}

/// Splice one content type across periods: the first period's streams lead; every later period
/// contributes its best-matching stream to each leader.
fn combine_content_type(
    periods: &[PeriodStreams],
    streams: &HashMap<StreamKey, Stream>,
    content_type: ContentType,
) -> Vec<CombinedStream> {
    let per_period: Vec<Vec<&Stream>> = periods
        .iter()
        .map(|p| {
            p.stream_keys
                .iter()
                .filter_map(|k| streams.get(k))
                .filter(|s| s.content_type == content_type)
                .collect()
        })
        .collect();

    let Some(leaders) = per_period.first() else {
        return Vec::new();
    };

    let mut combined: Vec<CombinedStream> = leaders.iter().map(|s| CombinedStream::from_stream(s)).collect();
    for (period_index, candidates) in per_period.iter().enumerate().skip(1) {
        for (leader, output) in leaders.iter().zip(combined.iter_mut()) {
            match find_partner(leader, candidates) {
                Some(partner) => output.members.push(partner.origin.clone()),
                None => warn!(
                    period = %periods[period_index].period_id,
                    content_type = content_type.as_str(),
                    "no continuation stream found in period"
                ),
            }
        }
    }
    combined
}

/// The cross-period matching discipline: exact tuple match first, then the most compatible
/// candidate, then (as a last resort) any stream of the type.
fn find_partner<'a>(leader: &Stream, candidates: &[&'a Stream]) -> Option<&'a Stream> {
    candidates
        .iter()
        .max_by_key(|c| match_score(leader, c))
        .copied()
}

fn match_score(a: &Stream, b: &Stream) -> u32 {
    let exact = a.language == b.language
        && a.roles == b.roles
        && a.channel_count == b.channel_count
        && a.label == b.label
        && a.codec_base() == b.codec_base();
    if exact {
        return 100;
    }
    let mut score = 0;
    if a.codec_base() == b.codec_base() {
        score += 8;
    }
    if a.language == b.language {
        score += 4;
    }
    if a.channel_count == b.channel_count {
        score += 2;
    }
    if a.roles == b.roles {
        score += 1;
    }
    if a.label == b.label {
        score += 1;
    }
    score
}

/// A variant requires a key system satisfiable by both halves. A clear stream imposes no
/// constraint.
fn drm_compatible(audio: &CombinedStream, video: &CombinedStream) -> bool {
    if audio.drm_infos.is_empty() || video.drm_infos.is_empty() {
        return true;
    }
    audio
        .drm_infos
        .iter()
        .any(|a| video.drm_infos.iter().any(|v| v.key_system == a.key_system))
}
