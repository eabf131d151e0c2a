//! SegmentBase resolution: the representation is one media file carrying its own index (SIDX for
//! fMP4, Cues for WebM) in a declared byte range. The factory records the range; the index is
//! fetched and parsed when the stream's segment index is first realized.

use std::sync::Arc;

use tracing::warn;

use crate::dash::context::Context;
use crate::dash::resolve_uris;
use crate::dash::source::{Container, SegmentBaseSource, SegmentIndexSource};
use crate::media::segment::{InitSegmentReference, MediaQuality};
use crate::{Error, Result};

/// Parse a DASH byte-range attribute of the form "first-last".
pub(crate) fn parse_byte_range(s: &str) -> Option<(u64, u64)> {
    let (first, last) = s.split_once('-')?;
    Some((first.trim().parse().ok()?, last.trim().parse().ok()?))
}

pub fn create_source(
    ctx: &mut Context,
    rep_id: &str,
) -> Result<(SegmentIndexSource, Option<Arc<InitSegmentReference>>)> {
    let sb = ctx
        .inherited_segment_base()
        .cloned()
        .ok_or_else(|| Error::NoSegmentInfo(rep_id.to_string()))?;

    let mime = ctx
        .inherit(|f| f.mime_type.as_deref())
        .unwrap_or_default()
        .to_string();
    let container = if mime.contains("mp4") {
        Container::Mp4
    } else if mime.contains("webm") {
        Container::Webm
    } else {
        return Err(Error::UnsupportedContainer(mime));
    };

    let media_uris = ctx.base_urls().to_vec();
    if media_uris.is_empty() {
        return Err(Error::NoSegmentInfo(rep_id.to_string()));
    }

    let index_range = sb
        .indexRange
        .as_deref()
        .or_else(|| sb.RepresentationIndex.as_ref().and_then(|ri| ri.range.as_deref()))
        .and_then(parse_byte_range);
    let Some((index_start, index_end)) = index_range else {
        // Serving the SIDX through a dedicated index request is not implemented; without a
        // declared range the representation cannot be indexed.
        if !ctx.index_range_warning_given {
            warn!("SegmentBase without @indexRange; the representation cannot be used");
            ctx.index_range_warning_given = true;
        }
        return Err(Error::NoSegmentInfo(rep_id.to_string()));
    };

    let init_segment = match &sb.initialization {
        Some(initialization) => {
            let uris = match initialization.sourceURL.as_deref() {
                Some(source_url) => resolve_uris(ctx.base_urls(), source_url),
                None => media_uris.clone(),
            };
            let (start, end) = initialization
                .range
                .as_deref()
                .and_then(parse_byte_range)
                .map(|(s, e)| (s, Some(e)))
                .unwrap_or((0, None));
            InitSegmentReference::new(uris, start, end)
        }
        None => {
            if container == Container::Webm {
                // the Cues cannot be interpreted without the Info element of the init segment
                return Err(Error::WebmMissingInit);
            }
            // self-initializing fMP4: everything before the index is initialization data
            InitSegmentReference::new(media_uris.clone(), 0, Some(index_start.saturating_sub(1)))
        }
    };
    let mut init_segment = init_segment;
    init_segment.quality = MediaQuality {
        bandwidth: ctx.bandwidth,
        codecs: ctx.inherit(|f| f.codecs.as_deref()).unwrap_or_default().to_string(),
        width: ctx.inherit(|f| f.width.as_ref()).copied(),
        height: ctx.inherit(|f| f.height.as_ref()).copied(),
        frame_rate: ctx.inherit(|f| f.frame_rate.as_ref()).copied(),
        sampling_rate: ctx.inherit(|f| f.sampling_rate.as_ref()).copied(),
        channel_count: ctx.inherit(|f| f.channel_count.as_ref()).copied(),
    };
    let init_segment = Arc::new(init_segment);

    let timescale = sb.timescale.unwrap_or(1).max(1);
    let pto_seconds = sb.presentationTimeOffset.unwrap_or(0) as f64 / timescale as f64;
    let period_start = ctx.period_info.start;

    let source = SegmentBaseSource {
        media_uris,
        index_start,
        index_end,
        init_segment: init_segment.clone(),
        container,
        timestamp_offset: period_start - pto_seconds,
        period_start,
        period_end: ctx.period_info.end(),
    };
    Ok((
        SegmentIndexSource::SegmentBase(Box::new(source)),
        Some(init_segment),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dash::context::{InheritanceFrame, PeriodInfo};
    use crate::mpd;
    use url::Url;

    fn context(mime: &str, segment_base: mpd::SegmentBase) -> Context {
        let mut representation = InheritanceFrame {
            base_urls: vec![Url::parse("http://cdn.example.com/media.mp4").unwrap()],
            mime_type: Some(mime.to_string()),
            ..Default::default()
        };
        representation.segment_base = Some(segment_base);
        Context {
            dynamic: false,
            period: InheritanceFrame::default(),
            adaptation_set: InheritanceFrame::default(),
            representation,
            period_info: PeriodInfo {
                id: "p0".to_string(),
                start: 0.0,
                duration: Some(30.0),
                is_last_period: true,
            },
            bandwidth: 1000,
            profiles: vec![],
            index_range_warning_given: false,
        }
    }

    #[test]
    fn test_parse_byte_range() {
        assert_eq!(parse_byte_range("100-200"), Some((100, 200)));
        assert_eq!(parse_byte_range("bogus"), None);
    }

    #[test]
    fn test_mp4_source() {
        let sb = mpd::SegmentBase {
            indexRange: Some("800-1199".to_string()),
            initialization: Some(mpd::Initialization {
                sourceURL: Some("init.mp4".to_string()),
                range: Some("0-799".to_string()),
            }),
            ..Default::default()
        };
        let mut ctx = context("video/mp4", sb);
        let (source, init) = create_source(&mut ctx, "v1").unwrap();
        let init = init.unwrap();
        assert_eq!(init.uris[0].as_str(), "http://cdn.example.com/init.mp4");
        assert_eq!((init.start_byte, init.end_byte), (0, Some(799)));
        match source {
            SegmentIndexSource::SegmentBase(sb) => {
                assert_eq!(sb.container, Container::Mp4);
                assert_eq!((sb.index_start, sb.index_end), (800, 1199));
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_container() {
        let sb = mpd::SegmentBase {
            indexRange: Some("0-100".to_string()),
            ..Default::default()
        };
        let mut ctx = context("video/mp2t", sb);
        assert!(matches!(
            create_source(&mut ctx, "v1"),
            Err(Error::UnsupportedContainer(_))
        ));
    }

    #[test]
    fn test_webm_requires_init() {
        let sb = mpd::SegmentBase {
            indexRange: Some("0-100".to_string()),
            ..Default::default()
        };
        let mut ctx = context("video/webm", sb);
        assert!(matches!(create_source(&mut ctx, "v1"), Err(Error::WebmMissingInit)));
    }

    #[test]
    fn test_missing_index_range() {
        let sb = mpd::SegmentBase::default();
        let mut ctx = context("video/mp4", sb);
        assert!(matches!(create_source(&mut ctx, "v1"), Err(Error::NoSegmentInfo(_))));
        assert!(ctx.index_range_warning_given);
    }
}
