//! The late factory behind `Stream::create_segment_index`. Each representation's resolver leaves
//! behind one of these, capturing everything needed to build the index on demand: either the
//! references themselves (SegmentList, SegmentTemplate) or the coordinates of an on-media index
//! to fetch and parse (SegmentBase with SIDX or WebM Cues).

use std::sync::Arc;

use url::Url;

use crate::fetch::{self, HttpClient};
use crate::media::segment::{InitSegmentReference, SegmentIndex, SegmentReference};
use crate::mp4::sidx::{self, SidxContext};
use crate::webm::{self, WebmContext};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Webm,
}

/// References fully known at parse time.
#[derive(Debug, Clone)]
pub struct EagerSource {
    pub references: Vec<SegmentReference>,
    pub period_start: f64,
    pub period_end: f64,
}

/// An index that lives inside the media container and must be fetched by byte range.
#[derive(Debug, Clone)]
pub struct SegmentBaseSource {
    pub media_uris: Vec<Url>,
    pub index_start: u64,
    pub index_end: u64,
    pub init_segment: Arc<InitSegmentReference>,
    pub container: Container,
    pub timestamp_offset: f64,
    pub period_start: f64,
    pub period_end: f64,
}

#[derive(Debug, Clone)]
pub enum SegmentIndexSource {
    SegmentBase(Box<SegmentBaseSource>),
    Eager(EagerSource),
    /// Text/image streams served without a segment source.
    TextInline,
}

impl SegmentIndexSource {
    pub async fn create(&self, client: &HttpClient) -> Result<SegmentIndex> {
        match self {
            SegmentIndexSource::Eager(source) => {
                let mut index = SegmentIndex::new(source.references.clone());
                index.fit(source.period_start, source.period_end, true);
                index.check_gaps();
                Ok(index)
            }
            SegmentIndexSource::TextInline => Ok(SegmentIndex::default()),
            SegmentIndexSource::SegmentBase(source) => {
                let index_bytes = fetch::fetch_range(
                    client,
                    &source.media_uris[0],
                    source.index_start,
                    Some(source.index_end),
                )
                .await?;
                let references = match source.container {
                    Container::Mp4 => sidx::parse(
                        &index_bytes,
                        &SidxContext {
                            sidx_offset: source.index_start,
                            uris: source.media_uris.clone(),
                            init_segment: Some(source.init_segment.clone()),
                            timestamp_offset: source.timestamp_offset,
                            append_window_start: source.period_start,
                            append_window_end: source.period_end,
                        },
                    )?,
                    Container::Webm => {
                        // the Cues need Info (timecode scale, duration) from the init segment
                        let init = &source.init_segment;
                        let init_bytes = fetch::fetch_range(
                            client,
                            &init.uris[0],
                            init.start_byte,
                            init.end_byte,
                        )
                        .await?;
                        webm::parse(
                            &index_bytes,
                            &init_bytes,
                            &WebmContext {
                                uris: source.media_uris.clone(),
                                init_segment: Some(source.init_segment.clone()),
                                timestamp_offset: source.timestamp_offset,
                                append_window_start: source.period_start,
                                append_window_end: source.period_end,
                            },
                        )?
                    }
                };
                let mut index = SegmentIndex::new(references);
                index.fit(source.period_start, source.period_end, true);
                index.check_gaps();
                Ok(index)
            }
        }
    }
}
