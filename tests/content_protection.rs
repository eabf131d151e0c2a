// Tests for ContentProtection handling at the manifest level: key-ID normalization, PSSH init
// data, and key-system intersection across representations.

pub mod common;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::{setup_logging, test_base_url};
use dash_hls_relay::ErrorCode;

#[tokio::test]
async fn test_widevine_descriptor_from_manifest() -> anyhow::Result<()> {
    setup_logging();
    let pssh_b64 = STANDARD.encode([0xDEu8, 0xAD, 0xBE, 0xEF]);
    let xml = format!(
        r#"<MPD type="static" xmlns:cenc="urn:mpeg:cenc:2013">
      <Period id="p0" duration="PT30S">
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <ContentProtection schemeIdUri="urn:mpeg:dash:mp4protection:2011" value="cenc"
                             cenc:default_KID="9EB4050D-E44B-4802-932E-27D75083E266"/>
          <ContentProtection schemeIdUri="urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed">
            <cenc:pssh>{pssh_b64}</cenc:pssh>
          </ContentProtection>
          <SegmentTemplate media="v_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="v1" bandwidth="1000" codecs="avc1.64001f"/>
        </AdaptationSet>
        <AdaptationSet contentType="audio" mimeType="audio/mp4" lang="en">
          <ContentProtection schemeIdUri="urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed">
            <cenc:pssh>{pssh_b64}</cenc:pssh>
          </ContentProtection>
          <SegmentTemplate media="a_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="a1" bandwidth="100" codecs="mp4a.40.2"/>
        </AdaptationSet>
      </Period>
    </MPD>"#
    );
    let mut service = common::offline_service();
    service.parse_manifest(&xml, &test_base_url()).await?;

    let stream = service
        .streams_mut()
        .get(&("p0".to_string(), "v1".to_string()))
        .unwrap();
    assert!(stream.encrypted);
    assert_eq!(stream.drm_infos.len(), 1);
    let info = &stream.drm_infos[0];
    assert_eq!(info.key_system, "com.widevine.alpha");
    assert_eq!(info.pssh_base64().as_deref(), Some(pssh_b64.as_str()));
    assert!(stream.key_ids.contains("9eb4050de44b4802932e27d75083e266"));

    // the variant exposes the Widevine descriptor for the key client
    let presentation = service.presentation().unwrap();
    assert!(presentation.variants[0]
        .video
        .drm_infos
        .iter()
        .any(|i| i.is_widevine()));
    Ok(())
}

#[tokio::test]
async fn test_key_system_intersection_across_representations() {
    setup_logging();
    // the AdaptationSet offers {Widevine, PlayReady}; representation 1 narrows to {Widevine};
    // representation 2 offers only {PlayReady}, leaving an empty intersection
    let xml = r#"<MPD type="static">
      <Period id="p0" duration="PT30S">
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <ContentProtection schemeIdUri="urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed"/>
          <ContentProtection schemeIdUri="urn:uuid:9a04f079-9840-4286-ab92-e65be0885f95"/>
          <SegmentTemplate media="v_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="v1" bandwidth="1000" codecs="avc1.64001f">
            <ContentProtection schemeIdUri="urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed"/>
          </Representation>
          <Representation id="v2" bandwidth="2000" codecs="avc1.64001f">
            <ContentProtection schemeIdUri="urn:uuid:9a04f079-9840-4286-ab92-e65be0885f95"/>
          </Representation>
        </AdaptationSet>
      </Period>
    </MPD>"#;
    let mut service = common::offline_service();
    let err = service
        .parse_manifest(xml, &test_base_url())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DashNoCommonKeySystem);
}

#[tokio::test]
async fn test_conflicting_default_kids() {
    setup_logging();
    let xml = r#"<MPD type="static" xmlns:cenc="urn:mpeg:cenc:2013">
      <Period id="p0" duration="PT30S">
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <ContentProtection schemeIdUri="urn:mpeg:dash:mp4protection:2011"
                             cenc:default_KID="11111111-1111-1111-1111-111111111111"/>
          <ContentProtection schemeIdUri="urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed"
                             cenc:default_KID="22222222-2222-2222-2222-222222222222"/>
          <SegmentTemplate media="v_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="v1" bandwidth="1000" codecs="avc1.64001f"/>
        </AdaptationSet>
      </Period>
    </MPD>"#;
    let mut service = common::offline_service();
    let err = service
        .parse_manifest(xml, &test_base_url())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DashConflictingKeyIds);
}

#[tokio::test]
async fn test_clear_content_has_no_drm_info() -> anyhow::Result<()> {
    setup_logging();
    let xml = r#"<MPD type="static">
      <Period id="p0" duration="PT30S">
        <AdaptationSet contentType="video" mimeType="video/mp4">
          <SegmentTemplate media="v_$Number$.m4s" timescale="1" duration="6"/>
          <Representation id="v1" bandwidth="1000" codecs="avc1.64001f"/>
        </AdaptationSet>
      </Period>
    </MPD>"#;
    let mut service = common::offline_service();
    service.parse_manifest(xml, &test_base_url()).await?;
    let stream = service
        .streams_mut()
        .get(&("p0".to_string(), "v1".to_string()))
        .unwrap();
    assert!(!stream.encrypted);
    assert!(stream.drm_infos.is_empty());
    Ok(())
}
