//! The DASH orchestrator: resolves the manifest URL through the operator API, fetches and parses
//! the MPD, walks Period/AdaptationSet/Representation building the stream map and the
//! presentation, and schedules refreshes whose cadence follows `minimumUpdatePeriod` adjusted by
//! an EWMA of observed refresh latency.

pub mod clock;
pub mod content_protection;
pub mod context;
pub mod segment_base;
pub mod segment_list;
pub mod segment_template;
pub mod source;
pub mod template;

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RelayConfig;
use crate::dash::content_protection::ProtectionContext;
use crate::dash::context::{Context, InheritanceFrame, PeriodInfo};
use crate::dash::source::SegmentIndexSource;
use crate::fetch::{self, HttpClient};
use crate::media::combiner::{self, PeriodStreams};
use crate::media::timeline::PresentationTimeline;
use crate::media::{ContentType, Presentation, Stream, StreamKey, VideoRange};
use crate::mpd;
use crate::{Error, Result};

/// Floor for the refresh timer, seconds.
pub const MIN_UPDATE_PERIOD: f64 = 3.0;

const ROLE_SCHEME: &str = "urn:mpeg:dash:role:2011";
const TRICKMODE_SCHEME: &str = "http://dashif.org/guidelines/trickmode";
const THUMBNAIL_SCHEME: &str = "http://dashif.org/guidelines/thumbnail_tile";
const CICP_TRANSFER_SCHEME: &str = "urn:mpeg:mpegB:cicp:TransferCharacteristics";

/// Resolve a possibly-relative path against every BaseURL candidate.
pub(crate) fn resolve_uris(base_urls: &[Url], path: &str) -> Vec<Url> {
    if let Ok(absolute) = Url::parse(path) {
        return vec![absolute];
    }
    base_urls.iter().filter_map(|base| base.join(path).ok()).collect()
}

/// Exponentially-weighted moving average with zero-bias correction, used to estimate manifest
/// refresh latency.
#[derive(Debug, Clone)]
pub struct Ewma {
    alpha: f64,
    estimate: f64,
    total_weight: f64,
}

impl Ewma {
    /// `half_life` is the number of samples after which a sample's weight halves.
    pub fn new(half_life: f64) -> Self {
        Ewma {
            alpha: (0.5f64).powf(1.0 / half_life),
            estimate: 0.0,
            total_weight: 0.0,
        }
    }

    pub fn sample(&mut self, value: f64) {
        self.estimate = self.alpha * self.estimate + (1.0 - self.alpha) * value;
        self.total_weight = self.alpha * self.total_weight + (1.0 - self.alpha);
    }

    pub fn estimate(&self) -> f64 {
        if self.total_weight == 0.0 {
            return 0.0;
        }
        self.estimate / self.total_weight
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Starting,
    Live,
    Refreshing,
    Stopping,
    Stopped,
}

pub struct ManifestService {
    config: RelayConfig,
    client: HttpClient,
    state: ServiceState,
    manifest_uri: Option<Url>,
    /// Unix seconds after which the manifest URL must be re-resolved through the operator API.
    expire_time: i64,
    /// Set when the manifest URL was (re-)resolved; the saver couples this to key acquisition.
    pub manifest_expired: bool,
    /// `minimumUpdatePeriod` in seconds; -1 when the manifest does not carry one.
    update_period: f64,
    ewma: Ewma,
    streams: HashMap<StreamKey, Stream>,
    presentation: Option<Presentation>,
    next_stream_id: u64,
    clock_synced: bool,
}

impl ManifestService {
    pub fn new(config: RelayConfig, client: HttpClient) -> Self {
        ManifestService {
            config,
            client,
            state: ServiceState::Idle,
            manifest_uri: None,
            expire_time: 0,
            manifest_expired: false,
            update_period: -1.0,
            ewma: Ewma::new(5.0),
            streams: HashMap::new(),
            presentation: None,
            next_stream_id: 0,
            clock_synced: false,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn presentation(&self) -> Option<&Presentation> {
        self.presentation.as_ref()
    }

    pub fn presentation_mut(&mut self) -> Option<&mut Presentation> {
        self.presentation.as_mut()
    }

    pub fn streams_mut(&mut self) -> &mut HashMap<StreamKey, Stream> {
        &mut self.streams
    }

    /// Resolve the manifest URL and parse the first manifest. Key acquisition is forced on the
    /// first saver cycle by leaving `manifest_expired` set.
    pub async fn start(&mut self) -> Result<()> {
        self.state = ServiceState::Starting;
        self.resolve_manifest_location().await?;
        self.request_manifest().await?;
        self.manifest_expired = true;
        self.state = ServiceState::Live;
        Ok(())
    }

    async fn resolve_manifest_location(&mut self) -> Result<()> {
        let location = fetch::resolve_manifest_url(&self.client, &self.config).await?;
        info!(url = %location.url, expiry = location.expiry, "manifest URL resolved");
        self.manifest_uri = Some(location.url);
        self.expire_time = location.expiry;
        self.manifest_expired = true;
        Ok(())
    }

    /// Fetch and parse the current manifest URI, recording the refresh latency.
    pub async fn request_manifest(&mut self) -> Result<()> {
        let uri = self
            .manifest_uri
            .clone()
            .ok_or_else(|| Error::KeyFetchFailed("manifest URL not resolved".to_string()))?;
        let started = Instant::now();
        let (xml, redirected) = fetch::fetch_manifest(&self.client, &uri).await?;
        self.parse_manifest(&xml, &redirected).await?;
        self.ewma.sample(started.elapsed().as_secs_f64());
        Ok(())
    }

    /// One refresh tick: re-resolve the manifest URL if it has expired, then re-fetch the MPD.
    /// Refresh errors are downgraded to recoverable so the timer keeps running.
    pub async fn on_update(&mut self) -> Result<()> {
        self.state = ServiceState::Refreshing;
        if Utc::now().timestamp() >= self.expire_time {
            info!("manifest URL reached its expiry; re-resolving through the operator API");
            if let Err(e) = self.resolve_manifest_location().await {
                self.state = ServiceState::Live;
                warn!(code = %e.code(), error = %e, "manifest URL re-resolution failed");
                return Ok(());
            }
        }
        let result = self.request_manifest().await;
        self.state = ServiceState::Live;
        if let Err(e) = result {
            // downgraded from critical so the refresh timer continues
            warn!(code = %e.code(), error = %e, "manifest refresh failed; will retry");
        }
        Ok(())
    }

    /// When to refresh next, given how long the current cycle took.
    pub fn next_update_delay(&self, elapsed: f64) -> std::time::Duration {
        let period = if self.update_period >= 0.0 {
            self.update_period
        } else {
            MIN_UPDATE_PERIOD
        };
        let delay = MIN_UPDATE_PERIOD
            .max(period - elapsed)
            .max(self.ewma.estimate());
        std::time::Duration::from_secs_f64(delay)
    }

    pub fn update_period(&self) -> f64 {
        self.update_period
    }

    /// Release every segment index and discard all state.
    pub fn stop(&mut self) {
        self.state = ServiceState::Stopping;
        for stream in self.streams.values_mut() {
            if let Some(index) = &mut stream.segment_index {
                index.release();
            }
        }
        self.streams.clear();
        self.presentation = None;
        self.state = ServiceState::Stopped;
    }

    /// Parse one MPD document and rebuild the presentation. `base` is the (possibly redirected)
    /// URL the document was fetched from.
    pub async fn parse_manifest(&mut self, xml: &str, base: &Url) -> Result<()> {
        let document = mpd::parse(xml)?;
        let dynamic = document.mpdtype.as_deref() == Some("dynamic");

        // Location redirects subsequent refreshes
        if let Some(location) = document.locations.first() {
            match Url::parse(&location.url) {
                Ok(url) => {
                    info!(url = %url, "manifest Location redirects future refreshes");
                    self.manifest_uri = Some(url);
                }
                Err(e) => warn!(error = %e, "ignoring unparseable Location element"),
            }
        }

        self.update_period = document
            .minimumUpdatePeriod
            .map(|d| d.as_secs_f64())
            .unwrap_or(-1.0);

        let min_buffer_time = document
            .minBufferTime
            .map(|d| d.as_secs_f64())
            .unwrap_or(2.0);
        let presentation_delay = document
            .suggestedPresentationDelay
            .map(|d| d.as_secs_f64())
            .unwrap_or(1.5 * min_buffer_time);

        let mut timeline =
            PresentationTimeline::new(document.availabilityStartTime, presentation_delay);
        // preserve cross-refresh timeline state
        if let Some(previous) = &self.presentation {
            timeline.set_clock_offset(previous.timeline.clock_offset());
            timeline.notify_max_segment_duration(previous.timeline.max_segment_duration());
        }
        timeline.set_static(!dynamic);
        timeline.set_segment_availability_duration(
            document
                .timeShiftBufferDepth
                .map(|d| d.as_secs_f64())
                .unwrap_or(f64::INFINITY),
        );
        timeline.set_duration(
            document
                .mediaPresentationDuration
                .map(|d| d.as_secs_f64())
                .unwrap_or(f64::INFINITY),
        );
        if let Some(max) = document.maxSegmentDuration {
            timeline.notify_max_segment_duration(max.as_secs_f64());
        }

        if dynamic && !self.clock_synced && !document.UTCTiming.is_empty() {
            let offset = clock::fetch_clock_offset_ms(&self.client, &document.UTCTiming).await;
            timeline.set_clock_offset(offset);
            self.clock_synced = true;
        }

        let profiles: Vec<String> = document
            .profiles
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        let mut root_frame = InheritanceFrame {
            base_urls: vec![base.clone()],
            ..Default::default()
        };
        root_frame.apply_base_urls(&document.base_url);

        let presentation_duration = document.mediaPresentationDuration.map(|d| d.as_secs_f64());
        let mut period_streams: Vec<PeriodStreams> = Vec::new();
        let mut previous_end = 0.0f64;

        for (index, period) in document.periods.iter().enumerate() {
            if period.href.is_some() {
                // xlink dereferencing is not implemented; a period demanding it cannot be
                // expanded further
                return Err(Error::XlinkDepthLimit);
            }
            let start = period.start.map(|d| d.as_secs_f64()).unwrap_or(previous_end);
            let next_start = document
                .periods
                .get(index + 1)
                .and_then(|p| p.start)
                .map(|d| d.as_secs_f64());
            let is_last = index + 1 == document.periods.len();
            let duration = match next_start {
                Some(next) => Some(next - start),
                None if is_last => presentation_duration
                    .map(|total| total - start)
                    .or_else(|| period.duration.map(|d| d.as_secs_f64())),
                None => period.duration.map(|d| d.as_secs_f64()),
            };
            previous_end = start + duration.unwrap_or(0.0);

            let period_id = period
                .id
                .clone()
                .unwrap_or_else(|| format!("__sp_period_{start}"));
            let period_info = PeriodInfo {
                id: period_id.clone(),
                start,
                duration,
                is_last_period: is_last,
            };

            let mut period_frame = InheritanceFrame::derive(&root_frame);
            period_frame.id = Some(period_id.clone());
            period_frame.apply_base_urls(&period.BaseURL);
            period_frame.apply_segment_info(
                &period.SegmentBase,
                &period.SegmentList,
                &period.SegmentTemplate,
            );

            let mut keys_this_period: Vec<StreamKey> = Vec::new();
            let mut rep_ids_seen: HashSet<String> = HashSet::new();
            for adaptation in &period.adaptations {
                let context_seed = Context {
                    dynamic,
                    period: period_frame.clone(),
                    adaptation_set: InheritanceFrame::default(),
                    representation: InheritanceFrame::default(),
                    period_info: period_info.clone(),
                    bandwidth: 0,
                    profiles: profiles.clone(),
                    index_range_warning_given: false,
                };
                let Some(streams) =
                    self.parse_adaptation_set(adaptation, context_seed, &timeline)?
                else {
                    continue; // dropped (unrecognized EssentialProperty)
                };
                for stream in streams {
                    if dynamic && !rep_ids_seen.insert(stream.origin.1.clone()) {
                        return Err(Error::DuplicateRepresentationId(stream.origin.1.clone()));
                    }
                    keys_this_period.push(stream.origin.clone());
                    self.upsert_stream(stream, &timeline);
                }
            }
            if keys_this_period.is_empty() {
                return Err(Error::EmptyPeriod(period_id));
            }
            period_streams.push(PeriodStreams {
                period_id,
                start,
                stream_keys: keys_this_period,
            });
        }

        // let the timeline know about all freshly described segments
        for key in period_streams.iter().flat_map(|p| &p.stream_keys) {
            if let Some(stream) = self.streams.get(key) {
                if let SegmentIndexSource::Eager(eager) = &stream.index_source {
                    timeline.notify_segments(&eager.references);
                }
            }
        }

        let combined = combiner::combine(&period_streams, &self.streams);
        debug!(
            variants = combined.variants.len(),
            text = combined.text_streams.len(),
            "manifest parsed"
        );
        self.presentation = Some(Presentation {
            timeline,
            variants: combined.variants,
            text_streams: combined.text_streams,
            image_streams: combined.image_streams,
            sequence_mode: false,
            min_buffer_time,
        });
        Ok(())
    }

    /// Parse one AdaptationSet into streams. Returns `None` when the set must be dropped
    /// silently (unrecognized EssentialProperty).
    fn parse_adaptation_set(
        &mut self,
        adaptation: &mpd::AdaptationSet,
        mut ctx: Context,
        timeline: &PresentationTimeline,
    ) -> Result<Option<Vec<Stream>>> {
        let mut trick_mode_for: Option<String> = None;
        let mut tiles_layout: Option<String> = None;
        for property in &adaptation.EssentialProperty {
            match property.schemeIdUri.as_deref() {
                Some(TRICKMODE_SCHEME) => trick_mode_for = property.value.clone(),
                Some(THUMBNAIL_SCHEME) => tiles_layout = property.value.clone(),
                Some(other) => {
                    debug!(scheme = other, "dropping AdaptationSet with unrecognized EssentialProperty");
                    return Ok(None);
                }
                None => return Ok(None),
            }
        }

        let mut video_range: Option<VideoRange> = None;
        for property in &adaptation.SupplementalProperty {
            if property.schemeIdUri.as_deref() == Some(CICP_TRANSFER_SCHEME) {
                video_range = match property.value.as_deref() {
                    Some("16") => Some(VideoRange::Pq),
                    Some("18") => Some(VideoRange::Hlg),
                    Some(_) => Some(VideoRange::Sdr),
                    None => None,
                };
            }
        }

        let mut roles: Vec<String> = Vec::new();
        let mut forced = false;
        for role in &adaptation.roles {
            if role.schemeIdUri.as_deref() != Some(ROLE_SCHEME) {
                continue;
            }
            if let Some(value) = &role.value {
                if value == "forced_subtitle" || value == "forced-subtitle" {
                    forced = true;
                }
                roles.push(value.clone());
            }
        }

        ctx.adaptation_set = InheritanceFrame::derive(&ctx.period);
        ctx.adaptation_set.id = adaptation.id.clone();
        ctx.adaptation_set.apply_base_urls(&adaptation.BaseURL);
        ctx.adaptation_set.apply_segment_info(
            &adaptation.SegmentBase,
            &adaptation.SegmentList,
            &adaptation.SegmentTemplate,
        );
        ctx.adaptation_set.content_type = adaptation.contentType.clone();
        ctx.adaptation_set.mime_type = adaptation.mimeType.clone();
        ctx.adaptation_set.codecs = adaptation.codecs.clone();
        ctx.adaptation_set.frame_rate = adaptation
            .frameRate
            .as_deref()
            .and_then(mpd::parse_frame_rate);
        ctx.adaptation_set.pixel_aspect_ratio = adaptation.par.clone();
        ctx.adaptation_set.width = adaptation.width;
        ctx.adaptation_set.height = adaptation.height;
        ctx.adaptation_set.sampling_rate = adaptation.audioSamplingRate;
        ctx.adaptation_set.channel_count = parse_channel_count(&adaptation.AudioChannelConfiguration);
        ctx.adaptation_set.emsg_schemes = adaptation
            .InbandEventStream
            .iter()
            .filter_map(|e| e.schemeIdUri.clone())
            .collect();

        let mut protection = content_protection::parse_adaptation_set(&adaptation.ContentProtection)?;

        let language = normalize_language(adaptation.lang.as_deref().unwrap_or_default());
        let label = adaptation.Label.as_ref().and_then(|l| l.content.clone());

        if adaptation.representations.is_empty() {
            return Err(Error::EmptyAdaptationSet);
        }

        let mut streams = Vec::new();
        for representation in &adaptation.representations {
            match self.parse_representation(
                representation,
                &ctx,
                timeline,
                &mut protection,
                &language,
                &label,
                &roles,
                forced,
                video_range,
                &trick_mode_for,
                &tiles_layout,
            ) {
                Ok(stream) => streams.push(stream),
                Err(e) => {
                    let content_type = ctx.adaptation_set.content_type.as_deref().unwrap_or("");
                    let absorbable = matches!(e, Error::NoSegmentInfo(_))
                        && matches!(content_type, "text" | "image" | "application");
                    if absorbable {
                        warn!(error = %e, "dropping text/image representation without segment info");
                        continue;
                    }
                    return Err(e);
                }
            }
        }
        if streams.is_empty() {
            return Err(Error::EmptyAdaptationSet);
        }
        Ok(Some(streams))
    }

    #[allow(clippy::too_many_arguments)]
    fn parse_representation(
        &mut self,
        representation: &mpd::Representation,
        parent_ctx: &Context,
        timeline: &PresentationTimeline,
        protection: &mut ProtectionContext,
        language: &str,
        label: &Option<String>,
        roles: &[String],
        forced: bool,
        video_range: Option<VideoRange>,
        trick_mode_for: &Option<String>,
        tiles_layout: &Option<String>,
    ) -> Result<Stream> {
        let mut ctx = parent_ctx.clone();
        ctx.representation = InheritanceFrame::derive(&ctx.adaptation_set);
        ctx.representation.id = representation.id.clone();
        ctx.representation.apply_base_urls(&representation.BaseURL);
        ctx.representation.apply_segment_info(
            &representation.SegmentBase,
            &representation.SegmentList,
            &representation.SegmentTemplate,
        );
        if representation.mimeType.is_some() {
            ctx.representation.mime_type = representation.mimeType.clone();
        }
        if representation.codecs.is_some() {
            ctx.representation.codecs = representation.codecs.clone();
        }
        if representation.width.is_some() {
            ctx.representation.width = representation.width;
        }
        if representation.height.is_some() {
            ctx.representation.height = representation.height;
        }
        if let Some(rate) = representation.frameRate.as_deref().and_then(mpd::parse_frame_rate) {
            ctx.representation.frame_rate = Some(rate);
        }
        if representation.audioSamplingRate.is_some() {
            ctx.representation.sampling_rate = representation.audioSamplingRate;
        }
        if let Some(channels) = parse_channel_count(&representation.AudioChannelConfiguration) {
            ctx.representation.channel_count = Some(channels);
        }
        ctx.bandwidth = representation.bandwidth.unwrap_or(0);

        content_protection::parse_representation(&representation.ContentProtection, protection)?;

        let rep_id = representation.id.clone().unwrap_or_else(|| {
            format!("__rep_{}", self.next_stream_id)
        });

        let mime_type = ctx
            .inherit(|f| f.mime_type.as_deref())
            .unwrap_or_default()
            .to_string();
        let content_type = resolve_content_type(&ctx, &mime_type);

        // exactly one addressing mode, except that text/application may go without
        let has_base = ctx.inherited_segment_base().is_some();
        let has_list = ctx.inherited_segment_list().is_some();
        let has_template = ctx.inherited_segment_template().is_some();
        let mode_count = [has_base, has_list, has_template].iter().filter(|b| **b).count();

        let (index_source, _init) = if mode_count == 1 {
            if has_base {
                segment_base::create_source(&mut ctx, &rep_id)?
            } else if has_list {
                segment_list::create_source(&ctx, &rep_id)?
            } else {
                segment_template::create_source(&ctx, timeline, &rep_id)?
            }
        } else {
            if matches!(
                content_type,
                ContentType::Text | ContentType::Application | ContentType::Image
            ) {
                (SegmentIndexSource::TextInline, None)
            } else {
                return Err(Error::NoSegmentInfo(rep_id));
            }
        };

        let id = self.next_stream_id;
        self.next_stream_id += 1;

        Ok(Stream {
            id,
            origin: (ctx.period_info.id.clone(), rep_id),
            content_type,
            mime_type,
            codecs: ctx.inherit(|f| f.codecs.as_deref()).unwrap_or_default().to_string(),
            language: language.to_string(),
            label: label.clone(),
            roles: roles.to_vec(),
            width: ctx.inherit(|f| f.width.as_ref()).copied(),
            height: ctx.inherit(|f| f.height.as_ref()).copied(),
            frame_rate: ctx.inherit(|f| f.frame_rate.as_ref()).copied(),
            channel_count: ctx.inherit(|f| f.channel_count.as_ref()).copied(),
            sampling_rate: ctx.inherit(|f| f.sampling_rate.as_ref()).copied(),
            bandwidth: ctx.bandwidth,
            drm_infos: protection.drm_infos.clone(),
            key_ids: protection
                .default_kid
                .iter()
                .cloned()
                .collect(),
            video_range,
            encrypted: protection.encrypted(),
            forced,
            tiles_layout: tiles_layout.clone(),
            trick_mode_for: trick_mode_for.clone(),
            segment_index: None,
            index_source,
        })
    }

    /// Insert or refresh a stream in the map. A stream seen before keeps its realized segment
    /// index: the index is evicted up to the availability window start, then the fresh
    /// references are merged in. This protects against a dropped Period discarding its index
    /// mid-playback.
    fn upsert_stream(&mut self, stream: Stream, timeline: &PresentationTimeline) {
        use std::collections::hash_map::Entry;
        match self.streams.entry(stream.origin.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(stream);
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if let (Some(index), SegmentIndexSource::Eager(eager)) =
                    (&mut existing.segment_index, &stream.index_source)
                {
                    index.evict(timeline.segment_availability_start());
                    index.merge(eager.references.clone());
                    index.fit(eager.period_start, eager.period_end, false);
                }
                existing.index_source = stream.index_source;
                existing.bandwidth = stream.bandwidth;
                existing.drm_infos = stream.drm_infos;
                existing.key_ids = stream.key_ids;
                existing.encrypted = stream.encrypted;
            }
        }
    }
}

fn resolve_content_type(ctx: &Context, mime_type: &str) -> ContentType {
    let declared = ctx.inherit(|f| f.content_type.as_deref());
    match declared {
        Some(ct) if ct != "application" => {
            ContentType::from_str(ct).unwrap_or(ContentType::Application)
        }
        // absent or "application": guess from the MIME prefix
        _ => ContentType::from_mime(mime_type).unwrap_or(ContentType::Application),
    }
}

fn parse_channel_count(configs: &[mpd::AudioChannelConfiguration]) -> Option<u32> {
    configs.iter().find_map(|c| c.value.as_deref()?.parse().ok())
}

/// Lowercase the tag; "und" (undetermined) collapses to the empty string.
pub fn normalize_language(lang: &str) -> String {
    let lower = lang.to_ascii_lowercase();
    if lower == "und" {
        String::new()
    } else {
        lower
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ewma_converges() {
        let mut ewma = Ewma::new(5.0);
        assert_eq!(ewma.estimate(), 0.0);
        ewma.sample(1.0);
        // a single sample is reported unbiased
        assert!((ewma.estimate() - 1.0).abs() < 1e-9);
        for _ in 0..50 {
            ewma.sample(3.0);
        }
        assert!((ewma.estimate() - 3.0).abs() < 0.01);
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("EN"), "en");
        assert_eq!(normalize_language("und"), "");
        assert_eq!(normalize_language(""), "");
    }

    #[test]
    fn test_next_update_delay_floor() {
        let service = ManifestService::new(
            crate::config::RelayConfig::default(),
            crate::fetch::default_client().unwrap(),
        );
        // no update period, no samples: the 3 s floor applies
        assert_eq!(service.next_update_delay(0.0).as_secs_f64(), MIN_UPDATE_PERIOD);
        assert_eq!(service.next_update_delay(10.0).as_secs_f64(), MIN_UPDATE_PERIOD);
    }
}
