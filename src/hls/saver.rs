//! The live-window segment saver: each cycle selects a variant, refreshes the Widevine key when
//! the manifest URL was re-resolved, walks the live edge of both tracks, and for every new
//! segment fetches, concatenates with the init data, decrypts through the external helper and
//! rotates the rolling HLS playlists. Pacing throttles the loop to real time once the window is
//! saturated.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};
use url::Url;

use crate::config::{BandwidthTier, RelayConfig};
use crate::dash::ManifestService;
use crate::decrypt;
use crate::fetch::{self, HttpClient};
use crate::hls::{master_playlist, MediaPlaylist};
use crate::media::{CombinedStream, Presentation, Variant};
use crate::{Error, Result};

/// The Widevine content key in use for the current manifest-URL lease.
#[derive(Debug, Clone)]
pub struct DecryptionKey {
    pub key_id: String,
    pub key: String,
}

/// One downloadable item of a track: the init segment (index 0, duration 0) or a media segment.
#[derive(Debug, Clone)]
struct TrackItem {
    /// Candidate URLs, one per CDN; the first is also the identity used for resumption.
    uris: Vec<Url>,
    duration: f64,
    end_time: f64,
    /// Canonical stem used for every on-disk name.
    name: String,
    is_init: bool,
}

impl TrackItem {
    fn primary_uri(&self) -> &Url {
        &self.uris[0]
    }
}

struct TrackState {
    playlist: MediaPlaylist,
    last_segment_uri: Option<String>,
    playlist_name: &'static str,
}

impl TrackState {
    fn new(playlist_name: &'static str, max_segments: usize) -> Self {
        TrackState {
            playlist: MediaPlaylist::new(0, max_segments),
            last_segment_uri: None,
            playlist_name,
        }
    }
}

pub struct SegmentSaver {
    config: RelayConfig,
    client: HttpClient,
    audio: TrackState,
    video: TrackState,
    master_written: bool,
    buffer_full: bool,
    key: Option<DecryptionKey>,
}

impl SegmentSaver {
    pub fn new(config: RelayConfig, client: HttpClient) -> Self {
        let max = config.max_segment_num;
        SegmentSaver {
            config,
            client,
            audio: TrackState::new("audioVariant.m3u8", max),
            video: TrackState::new("videoVariant.m3u8", max),
            master_written: false,
            buffer_full: false,
            key: None,
        }
    }

    pub fn current_key(&self) -> Option<&DecryptionKey> {
        self.key.as_ref()
    }

    pub fn media_sequence(&self, track: &str) -> u64 {
        match track {
            "audio" => self.audio.playlist.media_sequence(),
            _ => self.video.playlist.media_sequence(),
        }
    }

    /// Drive the ingest until an unrecoverable error. The manifest refresh runs between saver
    /// cycles, never during one.
    pub async fn run(&mut self, service: &mut ManifestService) -> Result<()> {
        service.start().await?;
        let mut last_refresh = Instant::now();
        loop {
            if let Err(e) = self.run_cycle(service).await {
                // a failed cycle is abandoned; the next refresh may repair the manifest state
                warn!(code = %e.code(), error = %e, "segment-saver cycle failed");
                if !matches!(e, Error::SegmentManipulationFailed(_) | Error::Network(_)) {
                    return Err(e);
                }
            }
            let elapsed = last_refresh.elapsed();
            if elapsed >= service.next_update_delay(elapsed.as_secs_f64()) {
                service.on_update().await?;
                last_refresh = Instant::now();
            }
        }
    }

    /// One saver cycle over the currently selected variant.
    pub async fn run_cycle(&mut self, service: &mut ManifestService) -> Result<()> {
        let Some(presentation) = service.presentation() else {
            return Ok(());
        };
        let variant = select_variant(&presentation.variants, &self.config)?.clone();
        let availability_end = presentation.timeline.segment_availability_end();
        let target_duration = target_duration(service, presentation);
        self.audio.playlist.set_target_duration(target_duration);
        self.video.playlist.set_target_duration(target_duration);

        // key refresh is coupled to manifest-URL expiry
        if service.manifest_expired {
            let key = self.fetch_key(&variant).await?;
            info!(key_id = %key.key_id, "decryption key refreshed");
            self.key = Some(key);
            service.manifest_expired = false;
        }

        self.ensure_directories().await?;

        let audio_items = track_items(service, &variant.audio, &self.client).await?;
        let video_items = track_items(service, &variant.video, &self.client).await?;

        if !self.master_written {
            self.write_master(&variant).await?;
            self.master_written = true;
        }

        let audio_selected = select_live_edge(
            &audio_items,
            self.audio.last_segment_uri.as_deref(),
            self.config.max_segment_num,
            availability_end,
        );
        let video_selected = select_live_edge(
            &video_items,
            self.video.last_segment_uri.as_deref(),
            self.config.max_segment_num,
            availability_end,
        );
        debug!(
            audio = audio_selected.len(),
            video = video_selected.len(),
            "segments selected at the live edge"
        );

        self.ensure_init(&audio_items, "audio").await?;
        self.ensure_init(&video_items, "video").await?;

        let slots = audio_selected.len().max(video_selected.len());
        for slot in 0..slots {
            let slot_started = Instant::now();
            let mut slot_duration = 0.0f64;
            for (track_is_audio, selected) in [(true, &audio_selected), (false, &video_selected)] {
                let Some(item) = selected.get(slot) else { continue };
                slot_duration = slot_duration.max(item.duration);
                let item = (**item).clone();
                self.process_item(&item, track_is_audio).await?;
            }
            // throttle to real time once the rolling window is saturated
            if self.buffer_full {
                let elapsed_ms = slot_started.elapsed().as_secs_f64() * 1000.0;
                let duration_ms = slot_duration * 1000.0;
                if elapsed_ms < duration_ms {
                    tokio::time::sleep(std::time::Duration::from_millis(
                        (duration_ms - elapsed_ms) as u64,
                    ))
                    .await;
                }
            }
        }

        if let Some(last) = audio_selected.iter().rev().find(|i| !i.is_init) {
            self.audio.last_segment_uri = Some(last.primary_uri().to_string());
        }
        if let Some(last) = video_selected.iter().rev().find(|i| !i.is_init) {
            self.video.last_segment_uri = Some(last.primary_uri().to_string());
        }

        self.cleanup().await;
        Ok(())
    }

    /// Fetch one segment through the decrypt pipeline and rotate the playlist.
    async fn process_item(&mut self, item: &TrackItem, is_audio: bool) -> Result<()> {
        let track_name = if is_audio { "audio" } else { "video" };
        let download_dir = self.config.repo_root.join("download").join(track_name);
        let output_dir = self.config.repo_root.join("output").join(track_name);
        let publish_dir = self.config.outpath.join(track_name);

        let bytes = fetch::fetch_first(
            &self.client,
            &item.uris,
            if is_audio { "audio/*;q=0.9,*/*;q=0.5" } else { "video/*" },
        )
        .await?;

        if item.is_init {
            write_file(&download_dir.join("init.mp4"), &bytes).await?;
            return Ok(());
        }

        let download_path = download_dir.join(&item.name);
        write_file(&download_path, &bytes).await?;

        // init + media must be one fragment for the decrypter
        let init_bytes = tokio::fs::read(download_dir.join("init.mp4"))
            .await
            .map_err(|e| Error::Io(e, String::from("reading cached init segment")))?;
        let merged_path = output_dir.join(&item.name);
        let mut merged = init_bytes;
        merged.extend_from_slice(&bytes);
        write_file(&merged_path, &merged).await?;

        let key = self
            .key
            .as_ref()
            .ok_or_else(|| Error::KeyFetchFailed(String::from("no key available for decryption")))?;
        let published = publish_dir.join(format!("{}.mp4", item.name));
        decrypt::decrypt_segment(
            &self.config.decrypt_script,
            &key.key_id,
            &key.key,
            &merged_path,
            &published,
            &self.config.repo_root,
            track_name,
        )
        .await?;

        let track = if is_audio { &mut self.audio } else { &mut self.video };
        let evicted = track.playlist.push(item.duration, format!("{}.mp4", item.name));
        if let Some(evicted) = evicted {
            let stale = publish_dir.join(&evicted.filename);
            if tokio::fs::remove_file(&stale).await.is_err() {
                warn!(file = %stale.display(), "could not unlink evicted segment");
            }
            self.buffer_full = true;
        }

        let playlist_path = publish_dir.join(track.playlist_name);
        write_atomically(&playlist_path, track.playlist.render().as_bytes()).await?;
        Ok(())
    }

    async fn fetch_key(&self, variant: &Variant) -> Result<DecryptionKey> {
        let pssh = widevine_pssh_base64(variant)
            .ok_or_else(|| Error::KeyFetchFailed(String::from("variant carries no Widevine PSSH")))?;
        match fetch::fetch_decryption_key(&self.client, &self.config, &pssh).await? {
            Some((key_id, key)) => Ok(DecryptionKey { key_id, key }),
            None => Err(Error::KeyFetchFailed(String::from(
                "key service declined the request",
            ))),
        }
    }

    async fn write_master(&self, variant: &Variant) -> Result<()> {
        let video = &variant.video;
        let master = master_playlist(
            &variant.language,
            variant.bandwidth,
            video.width.unwrap_or(0),
            video.height.unwrap_or(0),
            &video.codecs,
            video.frame_rate.unwrap_or(25.0),
        )?;
        write_atomically(&self.config.outpath.join("master.m3u8"), master.as_bytes()).await
    }

    /// Make sure `download/{track}/init.mp4` exists before any concatenation.
    async fn ensure_init(&self, items: &[TrackItem], track: &str) -> Result<()> {
        let init_path = self.config.repo_root.join("download").join(track).join("init.mp4");
        if tokio::fs::metadata(&init_path).await.is_ok() {
            return Ok(());
        }
        let Some(init) = items.iter().find(|i| i.is_init) else {
            return Ok(());
        };
        let bytes = fetch::fetch_first(&self.client, &init.uris, "*/*").await?;
        write_file(&init_path, &bytes).await
    }

    async fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.config.repo_root.join("download/audio"),
            self.config.repo_root.join("download/video"),
            self.config.repo_root.join("output/audio"),
            self.config.repo_root.join("output/video"),
            self.config.outpath.join("audio"),
            self.config.outpath.join("video"),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| Error::Io(e, format!("creating {}", dir.display())))?;
        }
        Ok(())
    }

    /// Purge the transient working trees. Downloaded init segments are re-fetched next cycle if
    /// needed.
    async fn cleanup(&self) {
        for dir in [
            self.config.repo_root.join("download"),
            self.config.repo_root.join("output"),
        ] {
            if tokio::fs::remove_dir_all(&dir).await.is_err() {
                debug!(dir = %dir.display(), "nothing to clean up");
            }
        }
    }
}

fn target_duration(service: &ManifestService, presentation: &Presentation) -> u64 {
    let update_period = service.update_period();
    if update_period >= 0.0 {
        update_period.floor() as u64
    } else {
        presentation.timeline.max_segment_duration().ceil() as u64
    }
}

/// The first "cenc" Widevine init data of the variant, base64-encoded.
fn widevine_pssh_base64(variant: &Variant) -> Option<String> {
    variant
        .video
        .drm_infos
        .iter()
        .chain(variant.audio.drm_infos.iter())
        .find(|info| info.is_widevine())
        .and_then(|info| info.pssh_base64())
}

/// Build the downloadable item list of one track: the init segment at index 0 (duration 0),
/// then every reference of the stream's first per-period index.
async fn track_items(
    service: &mut ManifestService,
    combined: &CombinedStream,
    client: &HttpClient,
) -> Result<Vec<TrackItem>> {
    let member = combined
        .members
        .first()
        .ok_or_else(|| Error::EmptyAdaptationSet)?
        .clone();
    let stream = service
        .streams_mut()
        .get_mut(&member)
        .ok_or_else(|| Error::EmptyAdaptationSet)?;
    stream.create_segment_index(client).await?;
    let index = stream
        .segment_index
        .as_ref()
        .expect("segment index realized above");

    let mut items = Vec::with_capacity(index.len() + 1);
    if let Some(init) = index.get(0).and_then(|r| r.init_segment.clone()) {
        if !init.uris.is_empty() {
            items.push(TrackItem {
                uris: init.uris.clone(),
                duration: 0.0,
                end_time: 0.0,
                name: String::from("init"),
                is_init: true,
            });
        }
    }
    index.for_each_top_level_reference(|reference| {
        if reference.uris().is_empty() {
            return;
        }
        let name = canonical_segment_name(&reference.uris()[0]);
        items.push(TrackItem {
            uris: reference.uris().to_vec(),
            duration: reference.duration(),
            end_time: reference.end_time,
            name,
            is_init: false,
        });
    });
    Ok(items)
}

/// Live-edge selection: resume right after the previously emitted segment when it is still
/// listed; otherwise locate the start of the final `max_segments` window of currently-available
/// segments.
fn select_live_edge<'a>(
    items: &'a [TrackItem],
    last_segment_uri: Option<&str>,
    max_segments: usize,
    availability_end: f64,
) -> Vec<&'a TrackItem> {
    if let Some(last) = last_segment_uri {
        if let Some(position) = items.iter().position(|i| i.primary_uri().as_str() == last) {
            return items[position + 1..].iter().collect();
        }
    }
    let total = items.len();
    for k in 0..total {
        if k + max_segments < total && items[k + max_segments].end_time > availability_end {
            return items[k..].iter().collect();
        }
    }
    // fewer segments than one full window: take everything
    if total <= max_segments + 1 {
        return items.iter().collect();
    }
    items[total - max_segments..].iter().collect()
}

/// Segment names are the zero-padded 12-digit decimal form of the hex-parsed URL stem, falling
/// back to the stem verbatim when it is not hex.
fn canonical_segment_name(uri: &Url) -> String {
    let file = uri
        .path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or("segment");
    let stem = file.rsplit_once('.').map(|(s, _)| s).unwrap_or(file);
    match u64::from_str_radix(stem, 16) {
        Ok(value) => format!("{value:012}"),
        Err(_) => stem.to_string(),
    }
}

/// Sort by bandwidth, split into three tiers, then pick by language preference from the top of
/// the configured tier.
pub fn select_variant<'a>(variants: &'a [Variant], config: &RelayConfig) -> Result<&'a Variant> {
    if variants.is_empty() {
        return Err(Error::NoLanguageMatch(config.languages.clone()));
    }
    let mut sorted: Vec<&Variant> = variants.iter().collect();
    sorted.sort_by_key(|v| v.bandwidth);
    let n = sorted.len();

    let (tier_start, tier_end) = match config.bandwidth {
        BandwidthTier::Low => (0, n / 3),
        BandwidthTier::Mid => (n / 3 + 1, 2 * n / 3),
        BandwidthTier::High => (2 * n / 3 + 1, n - 1),
    };
    let tier_start = tier_start.min(n - 1);
    let tier_end = tier_end.clamp(tier_start, n - 1);
    let tier = &sorted[tier_start..=tier_end];

    for language in &config.languages {
        for variant in tier.iter().rev() {
            if variant.language == *language {
                return Ok(*variant);
            }
        }
    }
    Err(Error::NoLanguageMatch(config.languages.clone()))
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::Io(e, format!("creating {}", parent.display())))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| Error::Io(e, format!("writing {}", path.display())))
}

/// Write-then-rename so a reader never observes a half-written playlist.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp: PathBuf = path.with_extension("tmp");
    write_file(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::Io(e, format!("renaming into {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::CombinedStream;
    use crate::media::ContentType;

    fn variant(id: u64, bandwidth: u64, language: &str) -> Variant {
        let stream = CombinedStream {
            content_type: ContentType::Audio,
            mime_type: String::new(),
            codecs: String::new(),
            language: language.to_string(),
            label: None,
            roles: vec![],
            width: None,
            height: None,
            frame_rate: None,
            channel_count: None,
            sampling_rate: None,
            bandwidth,
            drm_infos: vec![],
            encrypted: false,
            members: vec![],
        };
        Variant {
            id,
            language: language.to_string(),
            bandwidth,
            audio: stream.clone(),
            video: stream,
        }
    }

    fn config(tier: BandwidthTier, languages: &[&str]) -> RelayConfig {
        RelayConfig {
            bandwidth: tier,
            languages: languages.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_tier_split_for_five_variants() {
        let variants: Vec<Variant> = (0..5).map(|i| variant(i, (i + 1) * 1000, "en")).collect();

        let low = select_variant(&variants, &config(BandwidthTier::Low, &["en"])).unwrap();
        assert_eq!(low.bandwidth, 2000); // highest of indices [0..1]
        let mid = select_variant(&variants, &config(BandwidthTier::Mid, &["en"])).unwrap();
        assert_eq!(mid.bandwidth, 4000); // highest of indices [2..3]
        let high = select_variant(&variants, &config(BandwidthTier::High, &["en"])).unwrap();
        assert_eq!(high.bandwidth, 5000); // index [4..4]
    }

    #[test]
    fn test_language_preference_order() {
        let variants = vec![
            variant(0, 1000, "de"),
            variant(1, 2000, "en"),
            variant(2, 3000, "fr"),
        ];
        let chosen =
            select_variant(&variants, &config(BandwidthTier::Low, &["en", "de"])).unwrap();
        // tier low = [0..1]; "en" is preferred over "de"
        assert_eq!(chosen.language, "en");

        let err = select_variant(&variants, &config(BandwidthTier::Low, &["ja"])).unwrap_err();
        assert!(matches!(err, Error::NoLanguageMatch(_)));
    }

    #[test]
    fn test_canonical_segment_name() {
        let url = Url::parse("http://cdn.example.com/seg/0000abcd.m4s").unwrap();
        assert_eq!(canonical_segment_name(&url), "000000043981");
        let url = Url::parse("http://cdn.example.com/seg/live-chunk.m4s").unwrap();
        assert_eq!(canonical_segment_name(&url), "live-chunk");
    }

    fn item(name: &str, end_time: f64) -> TrackItem {
        TrackItem {
            uris: vec![Url::parse(&format!("http://cdn.example.com/{name}.m4s")).unwrap()],
            duration: 6.0,
            end_time,
            name: name.to_string(),
            is_init: false,
        }
    }

    #[test]
    fn test_live_edge_resumption() {
        let items: Vec<TrackItem> = (0..10).map(|i| item(&format!("s{i}"), (i as f64 + 1.0) * 6.0)).collect();
        let selected = select_live_edge(
            &items,
            Some("http://cdn.example.com/s7.m4s"),
            3,
            f64::INFINITY,
        );
        let names: Vec<&str> = selected.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["s8", "s9"]);
    }

    #[test]
    fn test_live_edge_first_start() {
        // 10 segments ending at 6..60, availability end 40: the window starts at the earliest k
        // where items[k+3].end_time > 40, i.e. k = 3 (items[6] ends at 42)
        let items: Vec<TrackItem> = (0..10).map(|i| item(&format!("s{i}"), (i as f64 + 1.0) * 6.0)).collect();
        let selected = select_live_edge(&items, None, 3, 40.0);
        assert_eq!(selected[0].name, "s3");
    }
}
