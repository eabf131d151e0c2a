// Tests for manifest parsing and the semantic model built from it.
//
// To run these tests while enabling printing to stdout/stderr
//
//    cargo test --test parsing -- --show-output

pub mod common;

use common::{parse_into_service, setup_logging, test_base_url};
use dash_hls_relay::dash::source::SegmentIndexSource;
use dash_hls_relay::{ErrorCode, parse};

#[tokio::test]
async fn test_static_single_period_number_template() -> anyhow::Result<()> {
    setup_logging();
    // one audio and one video representation, SegmentTemplate with $Number$
    let xml = r#"<MPD type="static" minBufferTime="PT2S">
      <Period id="p0" duration="PT30S">
        <AdaptationSet contentType="audio" mimeType="audio/mp4" lang="en">
          <SegmentTemplate media="audio/seg_$Number$.m4s" initialization="audio/init.mp4"
                           timescale="1" duration="6" startNumber="1"/>
          <Representation id="a1" bandwidth="128000" codecs="mp4a.40.2" audioSamplingRate="48000"/>
        </AdaptationSet>
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <SegmentTemplate media="video/seg_$Number$.m4s" initialization="video/init.mp4"
                           timescale="1" duration="6" startNumber="1"/>
          <Representation id="v1" bandwidth="2000000" codecs="avc1.64001f"
                          width="1280" height="720" frameRate="30"/>
        </AdaptationSet>
      </Period>
    </MPD>"#;
    let mut service = parse_into_service(xml).await?;

    let presentation = service.presentation().expect("a presentation");
    assert_eq!(presentation.variants.len(), 1);
    assert!(!presentation.timeline.is_live());
    assert_eq!(presentation.min_buffer_time, 2.0);

    let variant = presentation.variants[0].clone();
    assert_eq!(variant.language, "en");
    assert_eq!(variant.bandwidth, 2_128_000);

    for (member, prefix) in [
        (variant.audio.members[0].clone(), "audio"),
        (variant.video.members[0].clone(), "video"),
    ] {
        let client = service.client().clone();
        let stream = service.streams_mut().get_mut(&member).expect("stream in map");
        stream.create_segment_index(&client).await?;
        let index = stream.segment_index.as_ref().unwrap();
        assert_eq!(index.len(), 5);
        let starts: Vec<f64> = index.references().iter().map(|r| r.start_time).collect();
        assert_eq!(starts, vec![0.0, 6.0, 12.0, 18.0, 24.0]);
        for (i, reference) in index.references().iter().enumerate() {
            let expected = format!("http://cdn.example.com/live/{prefix}/seg_{}.m4s", i + 1);
            assert_eq!(reference.uris()[0].as_str(), expected);
            let init = reference.init_segment.as_ref().expect("an init segment");
            assert_eq!(
                init.uris[0].as_str(),
                format!("http://cdn.example.com/live/{prefix}/init.mp4")
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_presentation_delay_default() -> anyhow::Result<()> {
    setup_logging();
    let xml = r#"<MPD type="static" minBufferTime="PT4S" mediaPresentationDuration="PT30S">
      <Period id="p0" duration="PT30S">
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <SegmentTemplate media="seg_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="v1" bandwidth="1000" codecs="avc1.64001f"/>
        </AdaptationSet>
        <AdaptationSet contentType="audio" mimeType="audio/mp4" lang="en">
          <SegmentTemplate media="a_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="a1" bandwidth="100" codecs="mp4a.40.2"/>
        </AdaptationSet>
      </Period>
    </MPD>"#;
    let service = parse_into_service(xml).await?;
    let presentation = service.presentation().unwrap();
    // no suggestedPresentationDelay: defaults to 1.5 x minBufferTime
    assert_eq!(presentation.timeline.presentation_delay(), 6.0);
    assert_eq!(presentation.timeline.duration(), 30.0);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_representation_ids_in_dynamic_manifest() {
    setup_logging();
    let xml = r#"<MPD type="dynamic" availabilityStartTime="2024-03-01T00:00:00Z" minimumUpdatePeriod="PT6S">
      <Period id="p0" start="PT0S" duration="PT60S">
        <AdaptationSet contentType="audio" mimeType="audio/mp4" lang="en">
          <SegmentTemplate media="a_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="r1" bandwidth="100" codecs="mp4a.40.2"/>
        </AdaptationSet>
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <SegmentTemplate media="v_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="r1" bandwidth="1000" codecs="avc1.64001f"/>
        </AdaptationSet>
      </Period>
    </MPD>"#;
    let mut service = common::offline_service();
    let err = service
        .parse_manifest(xml, &test_base_url())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DashDuplicateRepresentationId);
}

#[tokio::test]
async fn test_unrecognized_essential_property_drops_adaptation_set() {
    setup_logging();
    // the only AdaptationSet carries an EssentialProperty we don't understand: it is dropped
    // silently, which leaves the period empty
    let xml = r#"<MPD type="static">
      <Period id="p0" duration="PT30S">
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <EssentialProperty schemeIdUri="urn:example:custom:scheme" value="1"/>
          <SegmentTemplate media="seg_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="v1" bandwidth="1000" codecs="avc1.64001f"/>
        </AdaptationSet>
      </Period>
    </MPD>"#;
    let mut service = common::offline_service();
    let err = service
        .parse_manifest(xml, &test_base_url())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DashEmptyPeriod);
}

#[tokio::test]
async fn test_text_stream_without_segment_source_is_allowed() -> anyhow::Result<()> {
    setup_logging();
    let xml = r#"<MPD type="static">
      <Period id="p0" duration="PT30S">
        <AdaptationSet contentType="audio" mimeType="audio/mp4" lang="en">
          <SegmentTemplate media="a_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="a1" bandwidth="100" codecs="mp4a.40.2"/>
        </AdaptationSet>
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <SegmentTemplate media="v_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="v1" bandwidth="1000" codecs="avc1.64001f"/>
        </AdaptationSet>
        <AdaptationSet contentType="text" mimeType="text/vtt" lang="en">
          <Representation id="t1" bandwidth="500"/>
        </AdaptationSet>
      </Period>
    </MPD>"#;
    let mut service = common::offline_service();
    service.parse_manifest(xml, &test_base_url()).await?;
    let presentation = service.presentation().unwrap();
    assert_eq!(presentation.text_streams.len(), 1);
    let key = presentation.text_streams[0].members[0].clone();
    let stream = service.streams_mut().get(&key).unwrap();
    assert!(matches!(stream.index_source, SegmentIndexSource::TextInline));
    Ok(())
}

#[tokio::test]
async fn test_period_without_id_gets_synthetic_name() -> anyhow::Result<()> {
    setup_logging();
    let xml = r#"<MPD type="static">
      <Period duration="PT30S">
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <SegmentTemplate media="v_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="v1" bandwidth="1000" codecs="avc1.64001f"/>
        </AdaptationSet>
      </Period>
    </MPD>"#;
    let mut service = common::offline_service();
    service.parse_manifest(xml, &test_base_url()).await?;
    let keys: Vec<_> = service.streams_mut().keys().cloned().collect();
    assert_eq!(keys[0].0, "__sp_period_0");
    Ok(())
}

#[test]
fn test_root_element_validation() {
    let err = parse("<Playlist></Playlist>").unwrap_err();
    assert_eq!(err.code(), ErrorCode::DashInvalidXml);
}

#[tokio::test]
async fn test_hdr_signalling() -> anyhow::Result<()> {
    setup_logging();
    let xml = r#"<MPD type="static">
      <Period id="p0" duration="PT30S">
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <SupplementalProperty schemeIdUri="urn:mpeg:mpegB:cicp:TransferCharacteristics" value="16"/>
          <SegmentTemplate media="v_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="v1" bandwidth="1000" codecs="hvc1.2.4.L123"/>
        </AdaptationSet>
      </Period>
    </MPD>"#;
    let mut service = common::offline_service();
    service.parse_manifest(xml, &test_base_url()).await?;
    let stream = service
        .streams_mut()
        .get(&("p0".to_string(), "v1".to_string()))
        .unwrap();
    assert_eq!(stream.video_range, Some(dash_hls_relay::media::VideoRange::Pq));
    Ok(())
}
