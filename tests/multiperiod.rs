// Tests for combining streams across periods into variants.

pub mod common;

use common::{parse_into_service, setup_logging};

const TWO_PERIODS: &str = r#"<MPD type="static" mediaPresentationDuration="PT60S">
  <Period id="p0" start="PT0S">
    <AdaptationSet contentType="audio" mimeType="audio/mp4" lang="en">
      <SegmentTemplate media="p0/a_$Number$.m4s" timescale="1" duration="6"/>
      <Representation id="a-en" bandwidth="128000" codecs="mp4a.40.2"/>
    </AdaptationSet>
    <AdaptationSet contentType="audio" mimeType="audio/mp4" lang="de">
      <SegmentTemplate media="p0/ad_$Number$.m4s" timescale="1" duration="6"/>
      <Representation id="a-de" bandwidth="128000" codecs="mp4a.40.2"/>
    </AdaptationSet>
    <AdaptationSet contentType="video" mimeType="video/mp4">
      <SegmentTemplate media="p0/v_$Number$.m4s" timescale="1" duration="6"/>
      <Representation id="v1" bandwidth="2000000" codecs="avc1.64001f" width="1280" height="720"/>
    </AdaptationSet>
  </Period>
  <Period id="p1" start="PT30S">
    <AdaptationSet contentType="audio" mimeType="audio/mp4" lang="de">
      <SegmentTemplate media="p1/ad_$Number$.m4s" timescale="1" duration="6"/>
      <Representation id="a-de" bandwidth="128000" codecs="mp4a.40.2"/>
    </AdaptationSet>
    <AdaptationSet contentType="audio" mimeType="audio/mp4" lang="en">
      <SegmentTemplate media="p1/a_$Number$.m4s" timescale="1" duration="6"/>
      <Representation id="a-en" bandwidth="128000" codecs="mp4a.40.2"/>
    </AdaptationSet>
    <AdaptationSet contentType="video" mimeType="video/mp4">
      <SegmentTemplate media="p1/v_$Number$.m4s" timescale="1" duration="6"/>
      <Representation id="v1" bandwidth="2000000" codecs="avc1.64001f" width="1280" height="720"/>
    </AdaptationSet>
  </Period>
</MPD>"#;

#[tokio::test]
async fn test_variants_splice_across_periods() -> anyhow::Result<()> {
    setup_logging();
    let service = parse_into_service(TWO_PERIODS).await?;
    let presentation = service.presentation().unwrap();

    // one variant per audio language
    assert_eq!(presentation.variants.len(), 2);
    let en = presentation
        .variants
        .iter()
        .find(|v| v.language == "en")
        .expect("an English variant");
    assert_eq!(
        en.audio.members,
        vec![
            ("p0".to_string(), "a-en".to_string()),
            ("p1".to_string(), "a-en".to_string()),
        ]
    );
    assert_eq!(en.video.members.len(), 2);
    assert_eq!(en.bandwidth, 2_128_000);
    Ok(())
}

#[tokio::test]
async fn test_second_period_references_are_time_shifted() -> anyhow::Result<()> {
    setup_logging();
    let mut service = parse_into_service(TWO_PERIODS).await?;
    let client = service.client().clone();

    let key = ("p1".to_string(), "a-en".to_string());
    let stream = service.streams_mut().get_mut(&key).unwrap();
    stream.create_segment_index(&client).await?;
    let index = stream.segment_index.as_ref().unwrap();

    // 30 s period, 6 s segments, shifted by the period start
    assert_eq!(index.len(), 5);
    assert_eq!(index.get(0).unwrap().start_time, 30.0);
    assert_eq!(index.references().last().unwrap().end_time, 60.0);
    assert!(index
        .get(0)
        .unwrap()
        .uris()[0]
        .as_str()
        .ends_with("p1/a_1.m4s"));
    Ok(())
}
