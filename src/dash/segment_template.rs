//! SegmentTemplate resolution: URI-template expansion against either an explicit
//! SegmentTimeline or a fixed `@duration`, producing the representation's segment references.

use std::sync::Arc;

use tracing::warn;
use url::Url;

use crate::dash::context::Context;
use crate::dash::resolve_uris;
use crate::dash::source::{EagerSource, SegmentIndexSource};
use crate::dash::template::{self, TemplateValues};
use crate::media::segment::{InitSegmentReference, MediaQuality, SegmentReference, GAP_TOLERANCE};
use crate::media::timeline::PresentationTimeline;
use crate::mpd;
use crate::{Error, Result};

/// One expanded timeline entry. `start`/`end` are seconds relative to the period start;
/// `unscaled_start` is in timescale units (presentation-time-offset already subtracted) and
/// feeds `$Time$` substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub start: f64,
    pub end: f64,
    pub unscaled_start: i64,
}

/// Expand a SegmentTimeline's `S` elements. `period_duration` bounds a trailing negative
/// repeat; entries whose timing cannot be established are dropped with a warning.
pub fn expand_timeline(
    segments: &[mpd::S],
    timescale: u64,
    unscaled_pto: u64,
    period_duration: Option<f64>,
) -> Vec<TimelineEntry> {
    let timescale = timescale.max(1) as f64;
    let pto = unscaled_pto as i64;
    let mut entries: Vec<TimelineEntry> = Vec::new();
    let mut last_end: i64 = -pto;

    for (i, s) in segments.iter().enumerate() {
        let Some(d) = s.d else {
            warn!("S element is missing @d; dropping it and all subsequent entries");
            break;
        };
        let d = d as i64;
        let mut start = match s.t {
            Some(t) => t as i64 - pto,
            None => last_end,
        };
        let mut repeat = s.r.unwrap_or(0);

        if repeat < 0 {
            match segments.get(i + 1) {
                Some(next) => match next.t {
                    Some(next_t) => {
                        let next_start = next_t as i64 - pto;
                        if start >= next_start {
                            warn!("S@r repeats past the next S element; dropping the remainder");
                            break;
                        }
                        repeat = ((next_start - start) as f64 / d as f64).ceil() as i64 - 1;
                    }
                    None => {
                        warn!("S@r is negative but the next S has no @t; dropping the remainder");
                        break;
                    }
                },
                None => {
                    let Some(period_duration) = period_duration.filter(|d| d.is_finite()) else {
                        warn!("S@r is negative on the last S and the period is unbounded; dropping it");
                        break;
                    };
                    let period_units = period_duration * timescale;
                    repeat = ((period_units - start as f64) / d as f64).ceil() as i64 - 1;
                }
            }
        }

        // Stretch the previous entry up to this start rather than leaving a gap or overlap, and
        // note anything at or above the tolerance.
        if let Some(previous) = entries.last_mut() {
            let delta = (start - last_end).abs() as f64 / timescale;
            if delta >= GAP_TOLERANCE {
                warn!(gap_seconds = delta, "SegmentTimeline has a gap/overlap between S elements");
            }
            previous.end = start as f64 / timescale;
        }

        for _ in 0..=repeat {
            let end = start + d;
            entries.push(TimelineEntry {
                start: start as f64 / timescale,
                end: end as f64 / timescale,
                unscaled_start: start,
            });
            start = end;
            last_end = end;
        }
    }
    entries
}

/// Build the segment-index source for a representation addressed by SegmentTemplate.
pub fn create_source(
    ctx: &Context,
    timeline: &PresentationTimeline,
    rep_id: &str,
) -> Result<(SegmentIndexSource, Option<Arc<InitSegmentReference>>)> {
    let st = ctx
        .inherited_segment_template()
        .cloned()
        .ok_or_else(|| Error::NoSegmentInfo(rep_id.to_string()))?;

    let timescale = st.timescale.unwrap_or(1).max(1);
    let unscaled_pto = st.presentationTimeOffset.unwrap_or(0);
    let pto_seconds = unscaled_pto as f64 / timescale as f64;
    let period_start = ctx.period_info.start;
    let period_end = ctx.period_info.end();
    let timestamp_offset = period_start - pto_seconds;

    let init_segment = create_init_segment(ctx, st.initialization.as_deref(), rep_id);

    let media = st
        .media
        .as_deref()
        .ok_or_else(|| Error::NoSegmentInfo(rep_id.to_string()))?;

    let mut start_number = st.startNumber.unwrap_or(1);
    if start_number == 0 {
        warn!("SegmentTemplate@startNumber of 0 is not allowed; treating it as 1");
        start_number = 1;
    }

    let media_uris = |number: u64, time: i64| -> Vec<Url> {
        let path = template::fill(
            media,
            &TemplateValues {
                representation_id: Some(rep_id),
                number: Some(number),
                bandwidth: Some(ctx.bandwidth),
                time: Some(time.max(0) as u64),
            },
        );
        resolve_uris(ctx.base_urls(), &path)
    };

    let mut references = Vec::new();
    if let Some(segment_timeline) = &st.SegmentTimeline {
        let entries = expand_timeline(
            &segment_timeline.segments,
            timescale,
            unscaled_pto,
            ctx.period_info.duration,
        );
        for (position, entry) in entries.iter().enumerate() {
            references.push(SegmentReference::new(
                period_start + entry.start,
                period_start + entry.end,
                media_uris(start_number + position as u64, entry.unscaled_start),
                0,
                None,
                init_segment.clone(),
                timestamp_offset,
                period_start,
                period_end,
            ));
        }
    } else {
        let unscaled_duration = st
            .duration
            .ok_or_else(|| Error::NoSegmentInfo(rep_id.to_string()))?;
        let segment_duration = unscaled_duration / timescale as f64;

        // Which positions (0-based from the period start) are currently addressable: the whole
        // period when its duration is known, otherwise the live availability window.
        let (first_position, last_position) = if let Some(duration) = ctx.period_info.duration {
            let total = (duration / segment_duration).ceil() as u64;
            if total == 0 {
                return Err(Error::NoSegmentInfo(rep_id.to_string()));
            }
            (0, total - 1)
        } else {
            let window_start = timeline.segment_availability_start();
            let window_end = timeline.segment_availability_end();
            if !window_end.is_finite() {
                // neither a period duration nor a bounded availability window: the segment run
                // cannot be enumerated
                return Err(Error::NoSegmentInfo(rep_id.to_string()));
            }
            let first = ((window_start - period_start).max(0.0) / segment_duration).floor() as u64;
            let last_time = window_end - period_start;
            if last_time < segment_duration {
                return Ok((
                    SegmentIndexSource::Eager(EagerSource {
                        references: Vec::new(),
                        period_start,
                        period_end,
                    }),
                    init_segment,
                ));
            }
            let last = (last_time / segment_duration).floor() as u64 - 1;
            (first.min(last), last)
        };

        for position in first_position..=last_position {
            let start = period_start + position as f64 * segment_duration;
            let end = start + segment_duration;
            let unscaled_time = (position as f64 * unscaled_duration) as i64;
            references.push(SegmentReference::new(
                start,
                end,
                media_uris(start_number + position, unscaled_time),
                0,
                None,
                init_segment.clone(),
                timestamp_offset,
                period_start,
                period_end,
            ));
        }
    }

    Ok((
        SegmentIndexSource::Eager(EagerSource {
            references,
            period_start,
            period_end,
        }),
        init_segment,
    ))
}

/// Resolve the `@initialization` template into an init-segment reference carrying the stream's
/// quality attributes.
fn create_init_segment(
    ctx: &Context,
    initialization: Option<&str>,
    rep_id: &str,
) -> Option<Arc<InitSegmentReference>> {
    let template = initialization?;
    let path = template::fill(
        template,
        &TemplateValues {
            representation_id: Some(rep_id),
            bandwidth: Some(ctx.bandwidth),
            number: None,
            time: None,
        },
    );
    let uris = resolve_uris(ctx.base_urls(), &path);
    let mut init = InitSegmentReference::new(uris, 0, None);
    init.quality = MediaQuality {
        bandwidth: ctx.bandwidth,
        codecs: ctx.inherit(|f| f.codecs.as_deref()).unwrap_or_default().to_string(),
        width: ctx.inherit(|f| f.width.as_ref()).copied(),
        height: ctx.inherit(|f| f.height.as_ref()).copied(),
        frame_rate: ctx.inherit(|f| f.frame_rate.as_ref()).copied(),
        sampling_rate: ctx.inherit(|f| f.sampling_rate.as_ref()).copied(),
        channel_count: ctx.inherit(|f| f.channel_count.as_ref()).copied(),
    };
    Some(Arc::new(init))
}
