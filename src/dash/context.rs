//! The inheritance model of the MPD walk. Each level (Period, AdaptationSet, Representation)
//! constructs an immutable frame by copying its parent's frame and overriding whatever the XML
//! element declares; querying walks Representation -> AdaptationSet -> Period. The whole context
//! is cheaply cloneable so segment-index factories can capture a snapshot at parse time,
//! independent of later walk state.

use url::Url;

use crate::mpd;

/// Per-level inherited values.
#[derive(Debug, Clone, Default)]
pub struct InheritanceFrame {
    /// Resolved against the parent frame's BaseURLs; one entry per CDN candidate.
    pub base_urls: Vec<Url>,
    pub segment_base: Option<mpd::SegmentBase>,
    pub segment_list: Option<mpd::SegmentList>,
    pub segment_template: Option<mpd::SegmentTemplate>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub content_type: Option<String>,
    pub mime_type: Option<String>,
    pub codecs: Option<String>,
    pub frame_rate: Option<f64>,
    pub pixel_aspect_ratio: Option<String>,
    /// schemeIdUris of announced in-band event streams.
    pub emsg_schemes: Vec<String>,
    pub id: Option<String>,
    pub channel_count: Option<u32>,
    pub sampling_rate: Option<u32>,
    /// Sum of `@availabilityTimeOffset` along the inheritance chain.
    pub availability_time_offset: f64,
}

impl InheritanceFrame {
    /// Start a child frame from a parent: everything inherited, per-node id reset.
    pub fn derive(parent: &InheritanceFrame) -> InheritanceFrame {
        let mut frame = parent.clone();
        frame.id = None;
        frame
    }

    /// Resolve BaseURL children against the inherited URLs. Several BaseURLs denote alternative
    /// CDN locations; a relative child multiplies against every inherited candidate.
    pub fn apply_base_urls(&mut self, base_urls: &[mpd::BaseURL]) {
        if base_urls.is_empty() {
            return;
        }
        let mut resolved = Vec::new();
        for base in base_urls {
            self.availability_time_offset += base.availability_time_offset.unwrap_or(0.0);
            if let Ok(absolute) = Url::parse(&base.base) {
                resolved.push(absolute);
                continue;
            }
            for parent in &self.base_urls {
                if let Ok(joined) = parent.join(&base.base) {
                    resolved.push(joined);
                }
            }
        }
        if !resolved.is_empty() {
            self.base_urls = resolved;
        }
    }

    /// Fold one level's segment descriptors into the frame, accumulating availabilityTimeOffset
    /// from SegmentBase and SegmentTemplate. A re-declared descriptor merges attribute-wise with
    /// the inherited one: attributes set on the child win, absent ones fall through.
    pub fn apply_segment_info(
        &mut self,
        segment_base: &Option<mpd::SegmentBase>,
        segment_list: &Option<mpd::SegmentList>,
        segment_template: &Option<mpd::SegmentTemplate>,
    ) {
        if let Some(sb) = segment_base {
            self.availability_time_offset += sb.availabilityTimeOffset.unwrap_or(0.0);
            self.segment_base = Some(match &self.segment_base {
                Some(parent) => merge_segment_base(sb, parent),
                None => sb.clone(),
            });
        }
        if let Some(sl) = segment_list {
            self.segment_list = Some(match &self.segment_list {
                Some(parent) => merge_segment_list(sl, parent),
                None => sl.clone(),
            });
        }
        if let Some(st) = segment_template {
            self.availability_time_offset += st.availabilityTimeOffset.unwrap_or(0.0);
            self.segment_template = Some(match &self.segment_template {
                Some(parent) => merge_segment_template(st, parent),
                None => st.clone(),
            });
        }
    }
}

fn merge_segment_template(child: &mpd::SegmentTemplate, parent: &mpd::SegmentTemplate) -> mpd::SegmentTemplate {
    mpd::SegmentTemplate {
        initialization: child.initialization.clone().or_else(|| parent.initialization.clone()),
        media: child.media.clone().or_else(|| parent.media.clone()),
        index: child.index.clone().or_else(|| parent.index.clone()),
        SegmentTimeline: child.SegmentTimeline.clone().or_else(|| parent.SegmentTimeline.clone()),
        startNumber: child.startNumber.or(parent.startNumber),
        duration: child.duration.or(parent.duration),
        timescale: child.timescale.or(parent.timescale),
        presentationTimeOffset: child.presentationTimeOffset.or(parent.presentationTimeOffset),
        availabilityTimeOffset: child.availabilityTimeOffset.or(parent.availabilityTimeOffset),
    }
}

fn merge_segment_base(child: &mpd::SegmentBase, parent: &mpd::SegmentBase) -> mpd::SegmentBase {
    mpd::SegmentBase {
        initialization: child.initialization.clone().or_else(|| parent.initialization.clone()),
        RepresentationIndex: child
            .RepresentationIndex
            .clone()
            .or_else(|| parent.RepresentationIndex.clone()),
        timescale: child.timescale.or(parent.timescale),
        presentationTimeOffset: child.presentationTimeOffset.or(parent.presentationTimeOffset),
        indexRange: child.indexRange.clone().or_else(|| parent.indexRange.clone()),
        indexRangeExact: child.indexRangeExact.or(parent.indexRangeExact),
        availabilityTimeOffset: child.availabilityTimeOffset.or(parent.availabilityTimeOffset),
    }
}

fn merge_segment_list(child: &mpd::SegmentList, parent: &mpd::SegmentList) -> mpd::SegmentList {
    mpd::SegmentList {
        duration: child.duration.or(parent.duration),
        timescale: child.timescale.or(parent.timescale),
        presentationTimeOffset: child.presentationTimeOffset.or(parent.presentationTimeOffset),
        Initialization: child.Initialization.clone().or_else(|| parent.Initialization.clone()),
        SegmentTimeline: child.SegmentTimeline.clone().or_else(|| parent.SegmentTimeline.clone()),
        segment_urls: if child.segment_urls.is_empty() {
            parent.segment_urls.clone()
        } else {
            child.segment_urls.clone()
        },
    }
}

/// Timing of the period being walked.
#[derive(Debug, Clone)]
pub struct PeriodInfo {
    pub id: String,
    /// Seconds from the presentation start.
    pub start: f64,
    /// `None` while unknown (open-ended last period of a live presentation).
    pub duration: Option<f64>,
    pub is_last_period: bool,
}

impl PeriodInfo {
    pub fn end(&self) -> f64 {
        match self.duration {
            Some(d) => self.start + d,
            None => f64::INFINITY,
        }
    }
}

/// The mutable walk state, shallow-copyable at representation time so per-stream factories see a
/// snapshot.
#[derive(Debug, Clone)]
pub struct Context {
    pub dynamic: bool,
    pub period: InheritanceFrame,
    pub adaptation_set: InheritanceFrame,
    pub representation: InheritanceFrame,
    pub period_info: PeriodInfo,
    pub bandwidth: u64,
    pub profiles: Vec<String>,
    pub index_range_warning_given: bool,
}

impl Context {
    /// Walk Representation -> AdaptationSet -> Period, returning the first hit.
    pub fn inherit<'a, T: ?Sized>(
        &'a self,
        get: impl Fn(&'a InheritanceFrame) -> Option<&'a T>,
    ) -> Option<&'a T> {
        get(&self.representation)
            .or_else(|| get(&self.adaptation_set))
            .or_else(|| get(&self.period))
    }

    pub fn inherited_segment_base(&self) -> Option<&mpd::SegmentBase> {
        self.inherit(|f| f.segment_base.as_ref())
    }

    pub fn inherited_segment_list(&self) -> Option<&mpd::SegmentList> {
        self.inherit(|f| f.segment_list.as_ref())
    }

    pub fn inherited_segment_template(&self) -> Option<&mpd::SegmentTemplate> {
        self.inherit(|f| f.segment_template.as_ref())
    }

    pub fn base_urls(&self) -> &[Url] {
        &self.representation.base_urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_resolution() {
        let mut frame = InheritanceFrame {
            base_urls: vec![Url::parse("http://cdn.example.com/live/").unwrap()],
            ..Default::default()
        };
        frame.apply_base_urls(&[mpd::BaseURL {
            base: "video/".to_string(),
            ..Default::default()
        }]);
        assert_eq!(frame.base_urls[0].as_str(), "http://cdn.example.com/live/video/");

        // an absolute child replaces the inherited bases
        frame.apply_base_urls(&[mpd::BaseURL {
            base: "https://other.example.com/a/".to_string(),
            ..Default::default()
        }]);
        assert_eq!(frame.base_urls[0].as_str(), "https://other.example.com/a/");
    }

    #[test]
    fn test_multiple_cdn_candidates() {
        let mut frame = InheritanceFrame {
            base_urls: vec![Url::parse("http://cdn1.example.com/").unwrap()],
            ..Default::default()
        };
        frame.apply_base_urls(&[
            mpd::BaseURL {
                base: "http://cdn2.example.com/".to_string(),
                ..Default::default()
            },
            mpd::BaseURL {
                base: "http://cdn3.example.com/".to_string(),
                ..Default::default()
            },
        ]);
        assert_eq!(frame.base_urls.len(), 2);
    }

    #[test]
    fn test_availability_time_offset_accumulates() {
        let mut frame = InheritanceFrame::default();
        frame.apply_base_urls(&[mpd::BaseURL {
            base: "http://cdn.example.com/".to_string(),
            availability_time_offset: Some(1.5),
            ..Default::default()
        }]);
        frame.apply_segment_info(
            &Some(mpd::SegmentBase {
                availabilityTimeOffset: Some(0.5),
                ..Default::default()
            }),
            &None,
            &Some(mpd::SegmentTemplate {
                availabilityTimeOffset: Some(1.0),
                ..Default::default()
            }),
        );
        assert_eq!(frame.availability_time_offset, 3.0);
    }

    #[test]
    fn test_inheritance_order() {
        let mut period = InheritanceFrame::default();
        period.mime_type = Some("video/mp4".to_string());
        period.codecs = Some("avc1".to_string());
        let mut adaptation = InheritanceFrame::derive(&period);
        adaptation.codecs = Some("hvc1".to_string());
        let representation = InheritanceFrame::derive(&adaptation);

        let ctx = Context {
            dynamic: false,
            period,
            adaptation_set: adaptation,
            representation,
            period_info: PeriodInfo {
                id: "p0".to_string(),
                start: 0.0,
                duration: None,
                is_last_period: true,
            },
            bandwidth: 0,
            profiles: vec![],
            index_range_warning_given: false,
        };
        assert_eq!(ctx.inherit(|f| f.codecs.as_deref()), Some("hvc1"));
        assert_eq!(ctx.inherit(|f| f.mime_type.as_deref()), Some("video/mp4"));
        assert_eq!(ctx.period_info.end(), f64::INFINITY);
    }
}
