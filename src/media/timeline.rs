//! The presentation timeline: how wall-clock time maps onto the media timeline of a live or
//! static presentation, and which span of segments is currently available.
//
// https://dashif.org/Guidelines-TimingModel/#availability-window

use chrono::{DateTime, Utc};

use crate::media::segment::SegmentReference;

#[derive(Debug, Clone)]
pub struct PresentationTimeline {
    /// Wall-clock zero point of the media timeline. Unused for static presentations.
    availability_start: Option<DateTime<Utc>>,
    /// Milliseconds to add to the local clock to approximate the server clock.
    clock_offset_ms: i64,
    /// How long a segment stays available after it first appears. Infinite for VOD.
    segment_availability_duration: f64,
    /// Presentation duration in seconds; infinite while unknown.
    duration: f64,
    is_static: bool,
    max_segment_duration: f64,
    presentation_delay: f64,
    /// Fixed "now" for tests and deterministic replays; seconds since the Unix epoch.
    now_override: Option<f64>,
}

impl PresentationTimeline {
    pub fn new(availability_start: Option<DateTime<Utc>>, presentation_delay: f64) -> Self {
        PresentationTimeline {
            availability_start,
            clock_offset_ms: 0,
            segment_availability_duration: f64::INFINITY,
            duration: f64::INFINITY,
            is_static: true,
            max_segment_duration: 1.0,
            presentation_delay,
            now_override: None,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.is_static
    }

    pub fn set_static(&mut self, is_static: bool) {
        self.is_static = is_static;
    }

    pub fn set_clock_offset(&mut self, offset_ms: i64) {
        self.clock_offset_ms = offset_ms;
    }

    pub fn clock_offset(&self) -> i64 {
        self.clock_offset_ms
    }

    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration;
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn set_segment_availability_duration(&mut self, duration: f64) {
        debug_assert!(duration >= 0.0);
        self.segment_availability_duration = duration;
    }

    pub fn segment_availability_duration(&self) -> f64 {
        self.segment_availability_duration
    }

    pub fn presentation_delay(&self) -> f64 {
        self.presentation_delay
    }

    pub fn max_segment_duration(&self) -> f64 {
        self.max_segment_duration
    }

    /// Widen the known maximum segment duration.
    pub fn notify_max_segment_duration(&mut self, duration: f64) {
        self.max_segment_duration = self.max_segment_duration.max(duration);
    }

    /// Account for freshly parsed references: the live edge cannot trail a segment the manifest
    /// just promised, and the maximum segment duration may grow.
    pub fn notify_segments(&mut self, references: &[SegmentReference]) {
        for reference in references {
            self.notify_max_segment_duration(reference.duration());
        }
    }

    /// Override the clock, mostly for tests. Seconds since the Unix epoch.
    pub fn set_now_override(&mut self, now: Option<f64>) {
        self.now_override = now;
    }

    fn now_seconds(&self) -> f64 {
        match self.now_override {
            Some(now) => now,
            None => (Utc::now().timestamp_millis() + self.clock_offset_ms) as f64 / 1000.0,
        }
    }

    fn availability_start_seconds(&self) -> f64 {
        self.availability_start
            .map(|t| t.timestamp_millis() as f64 / 1000.0)
            .unwrap_or(0.0)
    }

    /// The latest presentation time for which a segment may currently be requested.
    pub fn segment_availability_end(&self) -> f64 {
        if self.is_static {
            return self.duration;
        }
        let live_edge =
            self.now_seconds() - self.availability_start_seconds() - self.max_segment_duration;
        live_edge.min(self.duration)
    }

    /// The earliest presentation time still inside the availability window.
    pub fn segment_availability_start(&self) -> f64 {
        if self.is_static {
            return 0.0;
        }
        let start = self.segment_availability_end() - self.segment_availability_duration;
        start.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::segment::test_util::reference;

    #[test]
    fn test_static_availability() {
        let mut timeline = PresentationTimeline::new(None, 0.0);
        timeline.set_duration(120.0);
        assert_eq!(timeline.segment_availability_end(), 120.0);
        assert_eq!(timeline.segment_availability_start(), 0.0);
        assert!(!timeline.is_live());
    }

    #[test]
    fn test_live_window() {
        let start = DateTime::from_timestamp(1_000_000, 0).unwrap();
        let mut timeline = PresentationTimeline::new(Some(start), 1.5);
        timeline.set_static(false);
        timeline.set_segment_availability_duration(30.0);
        timeline.notify_max_segment_duration(4.0);
        // 100 seconds into the presentation
        timeline.set_now_override(Some(1_000_100.0));

        assert_eq!(timeline.segment_availability_end(), 96.0);
        assert_eq!(timeline.segment_availability_start(), 66.0);
    }

    #[test]
    fn test_clock_offset_shifts_now() {
        let start = DateTime::from_timestamp(0, 0).unwrap();
        let mut timeline = PresentationTimeline::new(Some(start), 0.0);
        timeline.set_static(false);
        let before = timeline.segment_availability_end();
        timeline.set_clock_offset(10_000);
        let after = timeline.segment_availability_end();
        assert!((after - before - 10.0).abs() < 0.5);
    }

    #[test]
    fn test_notify_segments_updates_max_duration() {
        let mut timeline = PresentationTimeline::new(None, 0.0);
        timeline.notify_segments(&[reference(0.0, 6.0, "s1.m4s")]);
        assert_eq!(timeline.max_segment_duration(), 6.0);
        // shorter segments never shrink the bound
        timeline.notify_segments(&[reference(6.0, 8.0, "s2.m4s")]);
        assert_eq!(timeline.max_segment_duration(), 6.0);
    }
}
