//! Parser for the ISO-BMFF `sidx` (Segment Index) box, yielding one `SegmentReference` per
//! subsegment. Byte ranges are anchored at the first byte after the sidx box, offset by the
//! declared `first_offset`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use url::Url;

use crate::media::segment::{InitSegmentReference, SegmentReference};
use crate::mp4::{Mp4Parser, ParsedBox};
use crate::reader::Reader;
use crate::{Error, Result};

/// Everything the sidx references need beyond the raw box: where the box sits in the remote
/// resource, which URIs serve the media, the init segment, and the period's timestamp offset.
#[derive(Clone)]
pub struct SidxContext {
    pub sidx_offset: u64,
    pub uris: Vec<Url>,
    pub init_segment: Option<Arc<InitSegmentReference>>,
    pub timestamp_offset: f64,
    pub append_window_start: f64,
    pub append_window_end: f64,
}

/// Locate and parse the `sidx` box in `data`. Fails with `MP4_SIDX_WRONG_BOX_TYPE` when the
/// buffer holds no sidx box at all.
pub fn parse(data: &[u8], context: &SidxContext) -> Result<Vec<SegmentReference>> {
    let result: Rc<RefCell<Option<Result<Vec<SegmentReference>>>>> = Rc::default();
    let result_cb = Rc::clone(&result);
    let ctx = context.clone();
    Mp4Parser::new()
        .full_box("sidx", move |parsed: &mut ParsedBox| {
            let refs = parse_sidx(parsed, &ctx);
            *result_cb.borrow_mut() = Some(refs);
            parsed.parser.stop();
            Ok(())
        })
        .parse(data, false)?;

    match Rc::try_unwrap(result).map(RefCell::into_inner).unwrap_or(None) {
        Some(parsed) => parsed,
        None => {
            let leading = data.get(4..8).map(|b| String::from_utf8_lossy(b).into_owned());
            Err(Error::SidxWrongBoxType(leading.unwrap_or_default()))
        }
    }
}

fn parse_sidx(parsed: &mut ParsedBox, context: &SidxContext) -> Result<Vec<SegmentReference>> {
    let version = parsed.version.unwrap_or(0);
    parse_references(&mut parsed.reader, version, parsed.size, context)
}

/// Parse the sidx payload. `box_size` is the declared size of the whole box: the media byte
/// ranges start at `sidx_offset + box_size + first_offset`.
pub fn parse_references(
    reader: &mut Reader,
    version: u8,
    box_size: u64,
    context: &SidxContext,
) -> Result<Vec<SegmentReference>> {
    reader.skip(4)?; // reference_ID

    let timescale = reader.read_u32()?;
    if timescale == 0 {
        return Err(Error::SidxInvalidTimescale);
    }

    let (earliest_presentation_time, first_offset) = if version == 0 {
        (reader.read_u32()? as u64, reader.read_u32()? as u64)
    } else {
        (reader.read_u64()?, reader.read_u64()?)
    };

    reader.skip(2)?; // reserved
    let reference_count = reader.read_u16()?;

    let timescale = timescale as f64;
    let mut unscaled_start = earliest_presentation_time;
    let mut start_byte = context.sidx_offset + box_size + first_offset;
    let mut references = Vec::with_capacity(reference_count as usize);

    for _ in 0..reference_count {
        // 1 bit reference_type, 31 bits referenced_size
        let chunk = reader.read_u32()?;
        let reference_type = chunk >> 31;
        let reference_size = (chunk & 0x7FFF_FFFF) as u64;

        let subsegment_duration = reader.read_u32()? as u64;

        // starts_with_SAP / SAP_type / SAP_delta_time
        reader.skip(4)?;

        // a reference_type of 1 points at another sidx (hierarchical index)
        if reference_type == 1 {
            return Err(Error::SidxTypeNotSupported);
        }

        references.push(SegmentReference::new(
            unscaled_start as f64 / timescale + context.timestamp_offset,
            (unscaled_start + subsegment_duration) as f64 / timescale + context.timestamp_offset,
            context.uris.clone(),
            start_byte,
            Some(start_byte + reference_size - 1),
            context.init_segment.clone(),
            context.timestamp_offset,
            context.append_window_start,
            context.append_window_end,
        ));

        unscaled_start += subsegment_duration;
        start_byte += reference_size;
    }

    Ok(references)
}
