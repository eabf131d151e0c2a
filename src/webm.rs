//! Parser for the WebM (Matroska) Cues index, yielding one `SegmentReference` per cue point.
//! The init segment supplies the Segment payload offset, timecode scale and duration; the index
//! fetch supplies the Cues element itself.

use std::sync::Arc;

use url::Url;

use crate::ebml::{EbmlElement, EbmlParser};
use crate::media::segment::{InitSegmentReference, SegmentReference};
use crate::{Error, Result};

pub const EBML_ID: u64 = 0x1A45_DFA3;
pub const SEGMENT_ID: u64 = 0x1853_8067;
pub const INFO_ID: u64 = 0x1549_A966;
pub const TIMECODE_SCALE_ID: u64 = 0x2A_D7B1;
pub const DURATION_ID: u64 = 0x4489;
pub const CUES_ID: u64 = 0x1C53_BB6B;
pub const CUE_POINT_ID: u64 = 0xBB;
pub const CUE_TIME_ID: u64 = 0xB3;
pub const CUE_TRACK_POSITIONS_ID: u64 = 0xB7;
pub const CUE_CLUSTER_POSITION_ID: u64 = 0xF1;

/// Matroska's default timecode scale, in nanoseconds per timecode unit.
const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

#[derive(Clone)]
pub struct WebmContext {
    pub uris: Vec<Url>,
    pub init_segment: Option<Arc<InitSegmentReference>>,
    pub timestamp_offset: f64,
    pub append_window_start: f64,
    pub append_window_end: f64,
}

struct SegmentInfo {
    /// Offset of the Segment payload within the init data; cluster positions are relative to it.
    segment_offset: u64,
    /// Seconds per timecode unit.
    timecode_scale: f64,
    /// Presentation duration in seconds.
    duration: f64,
}

/// Parse the Cues of a WebM container. `init_data` covers the init segment (EBML header,
/// Segment, Info); `cues_data` covers the fetched index range.
pub fn parse(cues_data: &[u8], init_data: &[u8], context: &WebmContext) -> Result<Vec<SegmentReference>> {
    let info = parse_init(init_data)?;

    let mut parser = EbmlParser::new(cues_data);
    let cues = find_element(&mut parser, CUES_ID).ok_or(Error::WebmCuesElementMissing)?;
    parse_cues(&cues, &info, context)
}

fn parse_init(init_data: &[u8]) -> Result<SegmentInfo> {
    let mut parser = EbmlParser::new(init_data);
    let ebml = parser.parse_element()?;
    if ebml.id != EBML_ID {
        return Err(Error::WebmEbmlHeaderElementMissing);
    }
    let segment = find_element(&mut parser, SEGMENT_ID).ok_or(Error::WebmSegmentElementMissing)?;
    let segment_offset = segment.offset as u64;

    let mut segment_parser = segment.create_parser();
    let info = find_element(&mut segment_parser, INFO_ID).ok_or(Error::WebmInfoElementMissing)?;

    let mut timecode_scale_ns = DEFAULT_TIMECODE_SCALE;
    let mut duration_units: Option<f64> = None;
    let mut info_parser = info.create_parser();
    while info_parser.has_more_data() {
        let child = info_parser.parse_element()?;
        match child.id {
            TIMECODE_SCALE_ID => timecode_scale_ns = child.get_uint()?,
            DURATION_ID => duration_units = Some(child.get_float()?),
            _ => {}
        }
    }
    let duration_units = duration_units.ok_or(Error::WebmDurationElementMissing)?;
    let timecode_scale = timecode_scale_ns as f64 / 1e9;
    Ok(SegmentInfo {
        segment_offset,
        timecode_scale,
        duration: duration_units * timecode_scale,
    })
}

fn parse_cues(
    cues: &EbmlElement,
    info: &SegmentInfo,
    context: &WebmContext,
) -> Result<Vec<SegmentReference>> {
    // (time in seconds, byte offset of the cluster)
    let mut cue_points: Vec<(f64, u64)> = Vec::new();

    let mut parser = cues.create_parser();
    while parser.has_more_data() {
        let element = parser.parse_element()?;
        if element.id != CUE_POINT_ID {
            continue;
        }
        let mut time: Option<u64> = None;
        let mut position: Option<u64> = None;
        let mut point_parser = element.create_parser();
        while point_parser.has_more_data() {
            let child = point_parser.parse_element()?;
            match child.id {
                CUE_TIME_ID => time = Some(child.get_uint()?),
                CUE_TRACK_POSITIONS_ID if position.is_none() => {
                    let mut positions_parser = child.create_parser();
                    while positions_parser.has_more_data() {
                        let pos = positions_parser.parse_element()?;
                        if pos.id == CUE_CLUSTER_POSITION_ID {
                            position = Some(pos.get_uint()?);
                            break;
                        }
                    }
                }
                _ => {}
            }
        }
        let time = time.ok_or(Error::WebmCueTimeElementMissing)?;
        let position = position.ok_or(Error::WebmCueTrackPositionsElementMissing)?;
        cue_points.push((time as f64 * info.timecode_scale, info.segment_offset + position));
    }

    if cue_points.is_empty() {
        return Err(Error::WebmCuesElementMissing);
    }

    let mut references = Vec::with_capacity(cue_points.len());
    for (i, (start, start_byte)) in cue_points.iter().enumerate() {
        let next = cue_points.get(i + 1);
        let end_time = next.map_or(info.duration, |(t, _)| *t);
        let end_byte = next.map(|(_, b)| *b - 1);
        references.push(SegmentReference::new(
            start + context.timestamp_offset,
            end_time + context.timestamp_offset,
            context.uris.clone(),
            *start_byte,
            end_byte,
            context.init_segment.clone(),
            context.timestamp_offset,
            context.append_window_start,
            context.append_window_end,
        ));
    }
    Ok(references)
}

fn find_element<'a>(parser: &mut EbmlParser<'a>, id: u64) -> Option<EbmlElement<'a>> {
    while parser.has_more_data() {
        match parser.parse_element() {
            Ok(element) if element.id == id => return Some(element),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
    None
}
