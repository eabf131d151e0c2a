// Tests for dynamic (live) manifests: timeline expansion against period bounds, and stream-map
// preservation across manifest refreshes.

pub mod common;

use common::{parse_into_service, setup_logging, test_base_url};

#[tokio::test]
async fn test_timeline_negative_repeat_fills_period() -> anyhow::Result<()> {
    setup_logging();
    // @r = -1 with no next S and a 60 s period: six 10 s references
    let xml = r#"<MPD type="dynamic" availabilityStartTime="2024-03-01T00:00:00Z"
                      minimumUpdatePeriod="PT6S" timeShiftBufferDepth="PT2M">
      <Period id="p0" start="PT0S" duration="PT60S">
        <AdaptationSet contentType="audio" mimeType="audio/mp4" lang="en">
          <SegmentTemplate media="a_$Time$.m4s" timescale="1" startNumber="1">
            <SegmentTimeline>
              <S t="0" d="10" r="-1"/>
            </SegmentTimeline>
          </SegmentTemplate>
          <Representation id="a1" bandwidth="128000" codecs="mp4a.40.2"/>
        </AdaptationSet>
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <SegmentTemplate media="v_$Time$.m4s" timescale="1" startNumber="1">
            <SegmentTimeline>
              <S t="0" d="10" r="-1"/>
            </SegmentTimeline>
          </SegmentTemplate>
          <Representation id="v1" bandwidth="2000000" codecs="avc1.64001f" width="1280" height="720"/>
        </AdaptationSet>
      </Period>
    </MPD>"#;
    let mut service = parse_into_service(xml).await?;
    let presentation = service.presentation().unwrap();
    assert!(presentation.timeline.is_live());
    let member = presentation.variants[0].audio.members[0].clone();

    let client = service.client().clone();
    let stream = service.streams_mut().get_mut(&member).unwrap();
    stream.create_segment_index(&client).await?;
    let index = stream.segment_index.as_ref().unwrap();

    assert_eq!(index.len(), 6);
    let starts: Vec<f64> = index.references().iter().map(|r| r.start_time).collect();
    assert_eq!(starts, vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0]);
    assert_eq!(index.references().last().unwrap().end_time, 60.0);
    Ok(())
}

#[tokio::test]
async fn test_refresh_preserves_realized_indexes() -> anyhow::Result<()> {
    setup_logging();
    let manifest = |timeline: &str| {
        format!(
            r#"<MPD type="dynamic" availabilityStartTime="2024-03-01T00:00:00Z"
                    minimumUpdatePeriod="PT6S">
      <Period id="p0" start="PT0S" duration="PT600S">
        <AdaptationSet contentType="audio" mimeType="audio/mp4" lang="en">
          <SegmentTemplate media="a_$Time$.m4s" timescale="1">
            <SegmentTimeline>{timeline}</SegmentTimeline>
          </SegmentTemplate>
          <Representation id="a1" bandwidth="128000" codecs="mp4a.40.2"/>
        </AdaptationSet>
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <SegmentTemplate media="v_$Time$.m4s" timescale="1">
            <SegmentTimeline>{timeline}</SegmentTimeline>
          </SegmentTemplate>
          <Representation id="v1" bandwidth="2000000" codecs="avc1.64001f"/>
        </AdaptationSet>
      </Period>
    </MPD>"#
        )
    };

    let first = manifest(r#"<S t="0" d="6" r="2"/>"#); // segments at 0, 6, 12
    let mut service = parse_into_service(&first).await?;
    let key = ("p0".to_string(), "a1".to_string());
    let client = service.client().clone();
    service
        .streams_mut()
        .get_mut(&key)
        .unwrap()
        .create_segment_index(&client)
        .await?;
    assert_eq!(
        service.streams_mut().get(&key).unwrap().segment_index.as_ref().unwrap().len(),
        3
    );

    // the refreshed manifest has dropped the first segment and added two more
    let second = manifest(r#"<S t="6" d="6" r="3"/>"#); // 6, 12, 18, 24
    service.parse_manifest(&second, &test_base_url()).await?;

    let stream = service.streams_mut().get(&key).unwrap();
    let index = stream.segment_index.as_ref().expect("index survived the refresh");
    let starts: Vec<f64> = index.references().iter().map(|r| r.start_time).collect();
    // the pre-refresh reference at 0 is still visible; the tail was replaced/extended
    assert_eq!(starts, vec![0.0, 6.0, 12.0, 18.0, 24.0]);
    Ok(())
}

#[tokio::test]
async fn test_period_start_defaults_to_previous_end() -> anyhow::Result<()> {
    setup_logging();
    let xml = r#"<MPD type="static">
      <Period id="p0" duration="PT30S">
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <SegmentTemplate media="v_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="v1" bandwidth="1000" codecs="avc1.64001f"/>
        </AdaptationSet>
      </Period>
      <Period id="p1" duration="PT30S">
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <SegmentTemplate media="w_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="v1" bandwidth="1000" codecs="avc1.64001f"/>
        </AdaptationSet>
      </Period>
    </MPD>"#;
    let mut service = parse_into_service(xml).await?;
    let client = service.client().clone();
    let key = ("p1".to_string(), "v1".to_string());
    let stream = service.streams_mut().get_mut(&key).unwrap();
    stream.create_segment_index(&client).await?;
    let index = stream.segment_index.as_ref().unwrap();
    // the second period starts where the first ended
    assert_eq!(index.get(0).unwrap().start_time, 30.0);
    Ok(())
}
