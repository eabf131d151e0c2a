//! SegmentList resolution: an explicit list of SegmentURL elements, timed by `@duration`, a
//! SegmentTimeline, or (for a single segment) the period duration.

use std::sync::Arc;

use tracing::warn;

use crate::dash::context::Context;
use crate::dash::resolve_uris;
use crate::dash::segment_base::parse_byte_range;
use crate::dash::segment_template::expand_timeline;
use crate::dash::source::{EagerSource, SegmentIndexSource};
use crate::media::segment::{InitSegmentReference, SegmentReference};
use crate::{Error, Result};

pub fn create_source(
    ctx: &Context,
    rep_id: &str,
) -> Result<(SegmentIndexSource, Option<Arc<InitSegmentReference>>)> {
    let sl = ctx
        .inherited_segment_list()
        .cloned()
        .ok_or_else(|| Error::NoSegmentInfo(rep_id.to_string()))?;

    let init_segment = sl.Initialization.as_ref().map(|initialization| {
        let uris = match initialization.sourceURL.as_deref() {
            Some(source_url) => resolve_uris(ctx.base_urls(), source_url),
            None => ctx.base_urls().to_vec(),
        };
        let (start, end) = initialization
            .range
            .as_deref()
            .and_then(parse_byte_range)
            .map(|(s, e)| (s, Some(e)))
            .unwrap_or((0, None));
        Arc::new(InitSegmentReference::new(uris, start, end))
    });

    let timescale = sl.timescale.unwrap_or(1).max(1);
    let unscaled_pto = sl.presentationTimeOffset.unwrap_or(0);
    let pto_seconds = unscaled_pto as f64 / timescale as f64;
    let period_start = ctx.period_info.start;
    let period_end = ctx.period_info.end();
    let timestamp_offset = period_start - pto_seconds;

    if sl.segment_urls.is_empty() {
        return Err(Error::NoSegmentInfo(rep_id.to_string()));
    }

    let segment_duration = sl.duration.map(|d| d as f64 / timescale as f64);
    let timeline_entries = match &sl.SegmentTimeline {
        Some(timeline) => {
            let entries = expand_timeline(
                &timeline.segments,
                timescale,
                unscaled_pto,
                ctx.period_info.duration,
            );
            if entries.is_empty() {
                // an explicitly declared but empty (or unusable) timeline
                return Err(Error::NoSegmentInfo(rep_id.to_string()));
            }
            Some(entries)
        }
        None => None,
    };

    let mut count = sl.segment_urls.len();
    match &timeline_entries {
        Some(entries) => {
            if entries.len() != count {
                warn!(
                    urls = count,
                    timeline = entries.len(),
                    "SegmentList URL count differs from its SegmentTimeline; truncating"
                );
                count = count.min(entries.len());
            }
        }
        None => {
            if segment_duration.is_none() {
                if count > 1 {
                    return Err(Error::NoSegmentInfo(rep_id.to_string()));
                }
                // a single segment may span the whole period instead
                if ctx.period_info.duration.is_none() {
                    return Err(Error::NoSegmentInfo(rep_id.to_string()));
                }
            }
        }
    }

    let mut references = Vec::with_capacity(count);
    for (i, segment_url) in sl.segment_urls.iter().take(count).enumerate() {
        let uris = match segment_url.media.as_deref() {
            Some(media) => resolve_uris(ctx.base_urls(), media),
            None => ctx.base_urls().to_vec(),
        };
        let (start_byte, end_byte) = segment_url
            .mediaRange
            .as_deref()
            .and_then(parse_byte_range)
            .map(|(s, e)| (s, Some(e)))
            .unwrap_or((0, None));

        let (start, end) = match &timeline_entries {
            Some(entries) => (period_start + entries[i].start, period_start + entries[i].end),
            None => match segment_duration {
                Some(d) => (period_start + i as f64 * d, period_start + (i + 1) as f64 * d),
                // single segment spanning the period
                None => (period_start, period_end),
            },
        };

        references.push(SegmentReference::new(
            start,
            end,
            uris,
            start_byte,
            end_byte,
            init_segment.clone(),
            timestamp_offset,
            period_start,
            period_end,
        ));
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
