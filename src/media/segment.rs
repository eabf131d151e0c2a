//! Segment references and the ordered, gap-free index over them. Times are seconds on the
//! presentation timeline; byte ranges are inclusive, with `end_byte = None` meaning "to EOF".

use std::sync::Arc;

use tracing::warn;
use url::Url;

/// Adjacent references closer than this are considered contiguous; larger jumps are logged.
pub const GAP_TOLERANCE: f64 = 1.0 / 15.0;

/// Quality attributes of the stream an init segment belongs to, carried so the HLS master
/// playlist can be written without re-consulting the manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaQuality {
    pub bandwidth: u64,
    pub codecs: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub sampling_rate: Option<u32>,
    pub channel_count: Option<u32>,
}

/// Reference to an initialization segment.
#[derive(Debug, Clone, PartialEq)]
pub struct InitSegmentReference {
    pub uris: Vec<Url>,
    pub start_byte: u64,
    pub end_byte: Option<u64>,
    pub quality: MediaQuality,
}

impl InitSegmentReference {
    pub fn new(uris: Vec<Url>, start_byte: u64, end_byte: Option<u64>) -> Self {
        InitSegmentReference {
            uris,
            start_byte,
            end_byte,
            quality: MediaQuality::default(),
        }
    }
}

/// Reference to one media segment.
#[derive(Debug, Clone)]
pub struct SegmentReference {
    pub start_time: f64,
    pub end_time: f64,
    uris: Vec<Url>,
    pub start_byte: u64,
    pub end_byte: Option<u64>,
    pub init_segment: Option<Arc<InitSegmentReference>>,
    /// Seconds added to the container-internal presentation timestamps.
    pub timestamp_offset: f64,
    pub append_window_start: f64,
    pub append_window_end: f64,
}

impl SegmentReference {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        start_time: f64,
        end_time: f64,
        uris: Vec<Url>,
        start_byte: u64,
        end_byte: Option<u64>,
        init_segment: Option<Arc<InitSegmentReference>>,
        timestamp_offset: f64,
        append_window_start: f64,
        append_window_end: f64,
    ) -> Self {
        debug_assert!(start_time <= end_time);
        if let Some(end) = end_byte {
            debug_assert!(start_byte < end);
        }
        SegmentReference {
            start_time,
            end_time,
            uris,
            start_byte,
            end_byte,
            init_segment,
            timestamp_offset,
            append_window_start,
            append_window_end,
        }
    }

    /// The candidate URLs for this segment, one per configured CDN/BaseURL.
    pub fn uris(&self) -> &[Url] {
        &self.uris
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// An ordered sequence of non-overlapping segment references.
#[derive(Debug, Default)]
pub struct SegmentIndex {
    references: Vec<SegmentReference>,
    /// Abort handle of a background update timer, for indexes built from a live template.
    timer: Option<tokio::task::AbortHandle>,
}

impl SegmentIndex {
    pub fn new(references: Vec<SegmentReference>) -> Self {
        debug_assert!(references.windows(2).all(|w| w[0].start_time <= w[1].start_time));
        SegmentIndex {
            references,
            timer: None,
        }
    }

    pub fn references(&self) -> &[SegmentReference] {
        &self.references
    }

    pub fn get(&self, i: usize) -> Option<&SegmentReference> {
        self.references.get(i)
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn set_timer(&mut self, handle: tokio::task::AbortHandle) {
        self.timer = Some(handle);
    }

    /// Append new references, preserving order. Existing references that start at or after the
    /// first new reference are replaced; older ones stay visible.
    pub fn merge(&mut self, new_references: Vec<SegmentReference>) {
        let Some(first) = new_references.first() else {
            return;
        };
        let first_start = first.start_time;
        self.references.retain(|r| r.start_time < first_start - GAP_TOLERANCE);
        self.references.extend(new_references);
    }

    /// `merge` followed by `evict`: used on manifest refresh so that references which have
    /// slipped out of the availability window are dropped in the same pass.
    pub fn merge_and_evict(&mut self, new_references: Vec<SegmentReference>, min_availability_start: f64) {
        self.merge(new_references);
        self.evict(min_availability_start);
    }

    /// Drop references whose end time precedes the availability window start.
    pub fn evict(&mut self, min_availability_start: f64) {
        self.references.retain(|r| r.end_time > min_availability_start);
    }

    /// Truncate the index to the period bounds. A period with an unknown (infinite) end is left
    /// unfitted. With `is_new`, the final reference is clamped to end exactly at the period end.
    pub fn fit(&mut self, period_start: f64, period_end: f64, is_new: bool) {
        if !period_end.is_finite() {
            return;
        }
        self.references
            .retain(|r| r.end_time > period_start && r.start_time < period_end);
        if is_new {
            if let Some(last) = self.references.last_mut() {
                if last.end_time > period_end {
                    last.end_time = period_end;
                }
            }
        }
        for r in &mut self.references {
            r.append_window_start = period_start;
            r.append_window_end = period_end;
        }
    }

    /// Cancel any update timer and render the index inert.
    pub fn release(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.references.clear();
    }

    pub fn for_each_top_level_reference<F: FnMut(&SegmentReference)>(&self, mut f: F) {
        for r in &self.references {
            f(r);
        }
    }

    /// Check the adjacency invariant, logging any gap at or above the tolerance.
    pub fn check_gaps(&self) {
        for pair in self.references.windows(2) {
            let gap = (pair[1].start_time - pair[0].end_time).abs();
            if gap >= GAP_TOLERANCE {
                warn!(
                    gap_seconds = gap,
                    at = pair[0].end_time,
                    "gap between adjacent segment references"
                );
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::reference;
    use super::*;

    #[test]
    fn test_merge_appends_in_order() {
        let mut index = SegmentIndex::new(vec![reference(0.0, 2.0, "s1.m4s"), reference(2.0, 4.0, "s2.m4s")]);
        index.merge(vec![reference(4.0, 6.0, "s3.m4s")]);
        let starts: Vec<f64> = index.references().iter().map(|r| r.start_time).collect();
        assert_eq!(starts, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_merge_replaces_overlapping_tail() {
        let mut index = SegmentIndex::new(vec![reference(0.0, 2.0, "s1.m4s"), reference(2.0, 4.0, "s2.m4s")]);
        // refreshed manifest re-describes the segment starting at 2.0
        index.merge(vec![reference(2.0, 4.5, "s2b.m4s"), reference(4.5, 6.0, "s3.m4s")]);
        let starts: Vec<f64> = index.references().iter().map(|r| r.start_time).collect();
        assert_eq!(starts, vec![0.0, 2.0, 4.5]);
        assert_eq!(index.get(1).unwrap().end_time, 4.5);
    }

    #[test]
    fn test_merge_and_evict() {
        let mut index = SegmentIndex::new(vec![reference(0.0, 2.0, "s1.m4s"), reference(2.0, 4.0, "s2.m4s")]);
        index.merge_and_evict(vec![reference(4.0, 6.0, "s3.m4s")], 2.5);
        let starts: Vec<f64> = index.references().iter().map(|r| r.start_time).collect();
        assert_eq!(starts, vec![2.0, 4.0]);
    }

    #[test]
    fn test_fit_truncates_to_period() {
        let mut index = SegmentIndex::new(vec![
            reference(0.0, 2.0, "s1.m4s"),
            reference(2.0, 4.0, "s2.m4s"),
            reference(4.0, 6.0, "s3.m4s"),
        ]);
        index.fit(1.0, 5.0, true);
        assert_eq!(index.len(), 3);
        assert_eq!(index.get(2).unwrap().end_time, 5.0);
        assert_eq!(index.get(0).unwrap().append_window_end, 5.0);

        // an unknown period end leaves the index unfitted
        let mut open = SegmentIndex::new(vec![reference(0.0, 2.0, "s1.m4s")]);
        open.fit(0.0, f64::INFINITY, true);
        assert_eq!(open.get(0).unwrap().end_time, 2.0);
    }

    #[test]
    fn test_release_clears() {
        let mut index = SegmentIndex::new(vec![reference(0.0, 2.0, "s1.m4s")]);
        index.release();
        assert!(index.is_empty());
    }
}
