//! The serde-based document model for the DASH MPD manifest format, as formally defined in
//! ISO/IEC 23009-1. Deserialization uses the quick_xml crate; serde ignores unknown fields, so
//! the model only covers the elements and attributes the relay consumes. When MPD files in
//! practical use diverge from the formal standard, this model prefers to interoperate with
//! existing practice.

#![allow(non_snake_case)]

use std::time::Duration;

use chrono::DateTime;
use regex::Regex;
use serde::de;
use serde::Deserialize;

use crate::{Error, Result};

/// Type representing an xs:dateTime, as per <https://www.w3.org/TR/xmlschema-2/#dateTime>
// Something like 2021-06-03T13:00:00Z or 2022-12-06T22:27:53
pub type XsDatetime = DateTime<chrono::offset::Utc>;

// Parse an XML duration string, as per https://www.w3.org/TR/xmlschema-2/#duration
//
// The lexical representation for duration is the ISO 8601 extended format PnYnMnDTnHnMnS, where
// nY represents the number of years, nM the number of months, nD the number of days, 'T' is the
// date/time separator, nH the number of hours, nM the number of minutes and nS the number of
// seconds. The number of seconds can include decimal digits to arbitrary precision.
//
// Examples: "PT0H0M30.030S", "PT1.2S", PT1004199059S, PT130S
//
// Limitations: we can't represent negative durations (leading "-" character) due to the choice of
// a std::time::Duration. We only accept fractional parts of seconds.
pub fn parse_xs_duration(s: &str) -> Result<Duration> {
    let re = Regex::new(concat!(
        r"^(?P<sign>[+-])?P",
        r"(?:(?P<years>\d+)Y)?",
        r"(?:(?P<months>\d+)M)?",
        r"(?:(?P<weeks>\d+)W)?",
        r"(?:(?P<days>\d+)D)?",
        r"(?:(?P<hastime>T)", // time part must begin with a T
        r"(?:(?P<hours>\d+)H)?",
        r"(?:(?P<minutes>\d+)M)?",
        r"(?:(?P<seconds>\d+)(?:(?P<nanoseconds>[.,]\d+)?)S)?",
        r")?"
    ))
    .unwrap();
    match re.captures(s) {
        Some(m) => {
            if m.name("hastime").is_none()
                && m.name("years").is_none()
                && m.name("months").is_none()
                && m.name("weeks").is_none()
                && m.name("days").is_none()
            {
                return Err(Error::InvalidDuration("empty".to_string()));
            }
            let mut secs: u64 = 0;
            let mut nsecs: u32 = 0;
            if let Some(s) = m.name("nanoseconds") {
                let mut s = &s.as_str()[1..]; // drop initial "."
                if s.len() > 9 {
                    s = &s[..9];
                }
                let padded = format!("{s:0<9}");
                nsecs = padded.parse::<u32>().unwrap();
            }
            if let Some(s) = m.name("seconds") {
                secs += s.as_str().parse::<u64>().unwrap();
            }
            if let Some(s) = m.name("minutes") {
                secs += s.as_str().parse::<u64>().unwrap() * 60;
            }
            if let Some(s) = m.name("hours") {
                secs += s.as_str().parse::<u64>().unwrap() * 60 * 60;
            }
            if let Some(s) = m.name("days") {
                secs += s.as_str().parse::<u64>().unwrap() * 60 * 60 * 24;
            }
            if let Some(s) = m.name("weeks") {
                secs += s.as_str().parse::<u64>().unwrap() * 60 * 60 * 24 * 7;
            }
            if let Some(s) = m.name("months") {
                secs += s.as_str().parse::<u64>().unwrap() * 60 * 60 * 24 * 30;
            }
            if let Some(s) = m.name("years") {
                secs += s.as_str().parse::<u64>().unwrap() * 60 * 60 * 24 * 365;
            }
            if let Some(s) = m.name("sign") {
                if s.as_str() == "-" {
                    return Err(Error::InvalidDuration(
                        "can't represent negative durations".to_string(),
                    ));
                }
            }
            Ok(Duration::new(secs, nsecs))
        }
        None => Err(Error::InvalidDuration(s.to_string())),
    }
}

// We can't use the parsing functionality from the chrono crate alone, because that assumes RFC
// 3339 format (including a timezone), whereas the xs:dateTime type allows the timezone to be
// omitted.
pub fn parse_xs_datetime(s: &str) -> Result<XsDatetime> {
    use chrono::{LocalResult, NaiveDate, TimeZone};
    use iso8601::Date;
    use num_traits::cast::FromPrimitive;
    match DateTime::<chrono::offset::FixedOffset>::parse_from_rfc3339(s) {
        Ok(dt) => Ok(dt.into()),
        Err(_) => match iso8601::datetime(s) {
            Ok(dt) => {
                let nd = match dt.date {
                    Date::YMD { year, month, day } => NaiveDate::from_ymd_opt(year, month, day)
                        .ok_or(Error::InvalidDateTime(s.to_string()))?,
                    Date::Week { year, ww, d } => {
                        let d = chrono::Weekday::from_u32(d)
                            .ok_or(Error::InvalidDateTime(s.to_string()))?;
                        NaiveDate::from_isoywd_opt(year, ww, d)
                            .ok_or(Error::InvalidDateTime(s.to_string()))?
                    }
                    Date::Ordinal { year, ddd } => NaiveDate::from_yo_opt(year, ddd)
                        .ok_or(Error::InvalidDateTime(s.to_string()))?,
                };
                let nd = nd
                    .and_hms_nano_opt(
                        dt.time.hour,
                        dt.time.minute,
                        dt.time.second,
                        dt.time.millisecond * 1000 * 1000,
                    )
                    .ok_or(Error::InvalidDateTime(s.to_string()))?;
                let tz_secs = dt.time.tz_offset_hours * 3600 + dt.time.tz_offset_minutes * 60;
                match chrono::FixedOffset::east_opt(tz_secs)
                    .ok_or(Error::InvalidDateTime(s.to_string()))?
                    .from_local_datetime(&nd)
                {
                    LocalResult::Single(local) => Ok(local.with_timezone(&chrono::Utc)),
                    _ => Err(Error::InvalidDateTime(s.to_string())),
                }
            }
            Err(_) => Err(Error::InvalidDateTime(s.to_string())),
        },
    }
}

// Deserialize an optional XML duration string to an Option<Duration>. This is a little trickier
// than deserializing a required field with serde.
fn deserialize_xs_duration<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: de::Deserializer<'de>,
{
    match <Option<String>>::deserialize(deserializer) {
        Ok(optstring) => match optstring {
            Some(xs) => match parse_xs_duration(&xs) {
                Ok(d) => Ok(Some(d)),
                Err(e) => Err(de::Error::custom(e)),
            },
            None => Ok(None),
        },
        // the field isn't present; return an Ok(None)
        Err(_) => Ok(None),
    }
}

// Deserialize an optional XML datetime string (type xs:dateTime) to an Option<XsDatetime>.
fn deserialize_xs_datetime<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<XsDatetime>, D::Error>
where
    D: de::Deserializer<'de>,
{
    match <Option<String>>::deserialize(deserializer) {
        Ok(optstring) => match optstring {
            Some(xs) => match parse_xs_datetime(&xs) {
                Ok(d) => Ok(Some(d)),
                Err(e) => Err(de::Error::custom(e)),
            },
            None => Ok(None),
        },
        Err(_) => Ok(None),
    }
}

/// Parse an MPD @frameRate attribute, serialized either as a rational ("30000/1001") or as a
/// plain number ("25").
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        if let (Ok(numerator), Ok(denominator)) = (num.parse::<f64>(), den.parse::<f64>()) {
            if denominator != 0.0 {
                return Some(numerator / denominator);
            }
        }
        return None;
    }
    s.parse::<f64>().ok()
}

/// Describes a sequence of contiguous Segments with identical duration.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct S {
    /// Time (in timescale units) of the first segment of the run.
    #[serde(rename = "@t")]
    pub t: Option<u64>,
    /// The duration (shall not exceed the value of MPD@maxSegmentDuration).
    #[serde(rename = "@d")]
    pub d: Option<u64>,
    /// The repeat count (number of contiguous Segments with identical MPD duration minus one),
    /// defaulting to zero if not present. May be negative, meaning "repeat until the next S
    /// element or the period end".
    #[serde(rename = "@r")]
    pub r: Option<i64>,
}

/// Contains a sequence of `S` elements, each of which describes a sequence of contiguous
/// segments of identical duration.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SegmentTimeline {
    #[serde(rename = "S")]
    pub segments: Vec<S>,
}

/// The first media segment in a sequence of Segments. Subsequent segments can be concatenated to
/// this segment to produce a media stream.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Initialization {
    #[serde(rename = "@sourceURL")]
    pub sourceURL: Option<String>,
    #[serde(rename = "@range")]
    pub range: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RepresentationIndex {
    #[serde(rename = "@range")]
    pub range: Option<String>,
    #[serde(rename = "@sourceURL")]
    pub sourceURL: Option<String>,
}

/// Allows template-based `SegmentURL` construction. Specifies various substitution rules using
/// dynamic values such as `$Time$` and `$Number$` that map to a sequence of Segments.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SegmentTemplate {
    #[serde(rename = "@initialization")]
    pub initialization: Option<String>,
    #[serde(rename = "@media")]
    pub media: Option<String>,
    #[serde(rename = "@index")]
    pub index: Option<String>,
    pub SegmentTimeline: Option<SegmentTimeline>,
    #[serde(rename = "@startNumber")]
    pub startNumber: Option<u64>,
    // note: the spec says this is an unsigned int, not an xs:duration. In practice, some
    // manifests use a floating point value.
    #[serde(rename = "@duration")]
    pub duration: Option<f64>,
    #[serde(rename = "@timescale")]
    pub timescale: Option<u64>,
    #[serde(rename = "@presentationTimeOffset")]
    pub presentationTimeOffset: Option<u64>,
    #[serde(rename = "@availabilityTimeOffset")]
    pub availabilityTimeOffset: Option<f64>,
}

/// A URI string that specifies one or more common locations for Segments and other resources,
/// used as a prefix for SegmentURLs. Can be specified at the level of the MPD node, or Period,
/// AdaptationSet, Representation, and can be nested (the client combines the prefixes).
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BaseURL {
    #[serde(rename = "$text")]
    pub base: String,
    /// Elements with the same `@serviceLocation` value are likely to have their URLs resolve to
    /// services at a common network location, for example the same CDN.
    #[serde(rename = "@serviceLocation")]
    pub serviceLocation: Option<String>,
    #[serde(rename = "@availabilityTimeOffset")]
    pub availability_time_offset: Option<f64>,
}

/// Specifies some common information concerning media segments, and the byte range holding the
/// segment index of the containing media file.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SegmentBase {
    #[serde(rename = "Initialization")]
    pub initialization: Option<Initialization>,
    pub RepresentationIndex: Option<RepresentationIndex>,
    #[serde(rename = "@timescale")]
    pub timescale: Option<u64>,
    #[serde(rename = "@presentationTimeOffset")]
    pub presentationTimeOffset: Option<u64>,
    #[serde(rename = "@indexRange")]
    pub indexRange: Option<String>,
    #[serde(rename = "@indexRangeExact")]
    pub indexRangeExact: Option<bool>,
    #[serde(rename = "@availabilityTimeOffset")]
    pub availabilityTimeOffset: Option<f64>,
}

/// The URL of a media segment.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SegmentURL {
    #[serde(rename = "@media")]
    pub media: Option<String>, // actually a URI
    #[serde(rename = "@mediaRange")]
    pub mediaRange: Option<String>,
    #[serde(rename = "@index")]
    pub index: Option<String>,
    #[serde(rename = "@indexRange")]
    pub indexRange: Option<String>,
}

/// Contains a sequence of SegmentURL elements.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SegmentList {
    // note: the spec says this is an unsigned int, not an xs:duration
    #[serde(rename = "@duration")]
    pub duration: Option<u64>,
    #[serde(rename = "@timescale")]
    pub timescale: Option<u64>,
    #[serde(rename = "@presentationTimeOffset")]
    pub presentationTimeOffset: Option<u64>,
    pub Initialization: Option<Initialization>,
    pub SegmentTimeline: Option<SegmentTimeline>,
    #[serde(rename = "SegmentURL")]
    pub segment_urls: Vec<SegmentURL>,
}

/// Specifies information concerning the audio channel (e.g. stereo, multichannel).
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AudioChannelConfiguration {
    #[serde(rename = "@schemeIdUri")]
    pub schemeIdUri: Option<String>,
    #[serde(rename = "@value")]
    pub value: Option<String>,
}

/// A "role" annotation on an AdaptationSet (e.g. "main", "caption", "subtitle").
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Role {
    #[serde(rename = "@schemeIdUri")]
    pub schemeIdUri: Option<String>,
    #[serde(rename = "@value")]
    pub value: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Label {
    #[serde(rename = "$text")]
    pub content: Option<String>,
}

/// A property an AdaptationSet claims the client must understand to present the content.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EssentialProperty {
    #[serde(rename = "@schemeIdUri")]
    pub schemeIdUri: Option<String>,
    #[serde(rename = "@value")]
    pub value: Option<String>,
}

/// A property a client may use if understood, and safely ignore otherwise.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SupplementalProperty {
    #[serde(rename = "@schemeIdUri")]
    pub schemeIdUri: Option<String>,
    #[serde(rename = "@value")]
    pub value: Option<String>,
}

/// In-band event stream announcement (`emsg` boxes carried inside media segments).
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct InbandEventStream {
    #[serde(rename = "@schemeIdUri")]
    pub schemeIdUri: Option<String>,
    #[serde(rename = "@value")]
    pub value: Option<String>,
}

/// The base64 text content of a `<cenc:pssh>` element.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CencPssh {
    #[serde(rename = "$text")]
    pub content: Option<String>,
}

/// A Microsoft PlayReady Object, base64 in the element text.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MsprPro {
    #[serde(rename = "$text")]
    pub content: Option<String>,
}

/// Widevine-style license acquisition URL element (`<ms:laurl licenseUrl="..."/>`).
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MsLaurl {
    #[serde(rename = "@licenseUrl")]
    pub licenseUrl: Option<String>,
}

/// ClearKey license acquisition URL element (`<clearkey:Laurl Lic_type="EME-1.0">...</>`).
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ClearKeyLaurl {
    #[serde(rename = "@Lic_type")]
    pub lic_type: Option<String>,
    #[serde(rename = "$text")]
    pub content: Option<String>,
}

/// Contains information on DRM (rights management) mechanisms used in the stream.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ContentProtection {
    #[serde(rename = "@schemeIdUri")]
    pub schemeIdUri: Option<String>,
    #[serde(rename = "@value")]
    pub value: Option<String>,
    #[serde(rename = "@cenc:default_KID", alias = "@default_KID")]
    pub default_KID: Option<String>,
    #[serde(rename = "cenc:pssh", alias = "pssh")]
    pub cenc_pssh: Vec<CencPssh>,
    #[serde(rename = "mspr:pro", alias = "pro")]
    pub msprpro: Option<MsprPro>,
    #[serde(rename = "ms:laurl", alias = "laurl")]
    pub laurl: Option<MsLaurl>,
    #[serde(rename = "clearkey:Laurl", alias = "Laurl")]
    pub clearkey_laurl: Option<ClearKeyLaurl>,
}

/// A Representation element contains information that describes how the media content is encoded
/// at one quality level.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Representation {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    #[serde(rename = "@bandwidth")]
    pub bandwidth: Option<u64>,
    #[serde(rename = "@mimeType")]
    pub mimeType: Option<String>,
    #[serde(rename = "@codecs")]
    pub codecs: Option<String>,
    #[serde(rename = "@width")]
    pub width: Option<u32>,
    #[serde(rename = "@height")]
    pub height: Option<u32>,
    #[serde(rename = "@frameRate")]
    pub frameRate: Option<String>,
    #[serde(rename = "@audioSamplingRate")]
    pub audioSamplingRate: Option<u32>,
    #[serde(rename = "@xlink:href", alias = "@href")]
    pub href: Option<String>,
    pub BaseURL: Vec<BaseURL>,
    pub AudioChannelConfiguration: Vec<AudioChannelConfiguration>,
    pub ContentProtection: Vec<ContentProtection>,
    pub SegmentBase: Option<SegmentBase>,
    pub SegmentList: Option<SegmentList>,
    pub SegmentTemplate: Option<SegmentTemplate>,
}

/// Contains a set of Representations, one per quality level of a single content component.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AdaptationSet {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    #[serde(rename = "@contentType")]
    pub contentType: Option<String>,
    #[serde(rename = "@mimeType")]
    pub mimeType: Option<String>,
    #[serde(rename = "@codecs")]
    pub codecs: Option<String>,
    #[serde(rename = "@lang")]
    pub lang: Option<String>,
    #[serde(rename = "@width")]
    pub width: Option<u32>,
    #[serde(rename = "@height")]
    pub height: Option<u32>,
    #[serde(rename = "@frameRate")]
    pub frameRate: Option<String>,
    #[serde(rename = "@par")]
    pub par: Option<String>,
    #[serde(rename = "@audioSamplingRate")]
    pub audioSamplingRate: Option<u32>,
    #[serde(rename = "@xlink:href", alias = "@href")]
    pub href: Option<String>,
    pub BaseURL: Vec<BaseURL>,
    #[serde(rename = "Role")]
    pub roles: Vec<Role>,
    pub Label: Option<Label>,
    pub EssentialProperty: Vec<EssentialProperty>,
    pub SupplementalProperty: Vec<SupplementalProperty>,
    pub InbandEventStream: Vec<InbandEventStream>,
    pub AudioChannelConfiguration: Vec<AudioChannelConfiguration>,
    pub ContentProtection: Vec<ContentProtection>,
    pub SegmentBase: Option<SegmentBase>,
    pub SegmentList: Option<SegmentList>,
    pub SegmentTemplate: Option<SegmentTemplate>,
    #[serde(rename = "Representation")]
    pub representations: Vec<Representation>,
}

/// Describes a chunk of the content with a start time and a duration.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Period {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    #[serde(rename = "@start", deserialize_with = "deserialize_xs_duration")]
    pub start: Option<Duration>,
    #[serde(rename = "@duration", deserialize_with = "deserialize_xs_duration")]
    pub duration: Option<Duration>,
    #[serde(rename = "@xlink:href", alias = "@href")]
    pub href: Option<String>,
    pub BaseURL: Vec<BaseURL>,
    pub SegmentBase: Option<SegmentBase>,
    pub SegmentList: Option<SegmentList>,
    pub SegmentTemplate: Option<SegmentTemplate>,
    #[serde(rename = "AdaptationSet")]
    pub adaptations: Vec<AdaptationSet>,
}

/// A clock synchronisation source for live presentations.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct UTCTiming {
    #[serde(rename = "@schemeIdUri")]
    pub schemeIdUri: Option<String>,
    #[serde(rename = "@value")]
    pub value: Option<String>,
}

/// A URI string to which a new request for an updated manifest should be made. This feature is
/// intended for servers and clients that can't use sticky HTTP redirects.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Location {
    #[serde(rename = "$text")]
    pub url: String,
}

/// The root node of a parsed DASH MPD manifest.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MPD {
    #[serde(rename = "@id")]
    pub id: Option<String>,
    /// "static" or "dynamic"; static (VOD) when absent.
    #[serde(rename = "@type")]
    pub mpdtype: Option<String>,
    #[serde(rename = "@profiles")]
    pub profiles: Option<String>,
    #[serde(rename = "@availabilityStartTime", deserialize_with = "deserialize_xs_datetime")]
    pub availabilityStartTime: Option<XsDatetime>,
    #[serde(rename = "@publishTime", deserialize_with = "deserialize_xs_datetime")]
    pub publishTime: Option<XsDatetime>,
    #[serde(rename = "@minimumUpdatePeriod", deserialize_with = "deserialize_xs_duration")]
    pub minimumUpdatePeriod: Option<Duration>,
    #[serde(rename = "@minBufferTime", deserialize_with = "deserialize_xs_duration")]
    pub minBufferTime: Option<Duration>,
    #[serde(rename = "@timeShiftBufferDepth", deserialize_with = "deserialize_xs_duration")]
    pub timeShiftBufferDepth: Option<Duration>,
    #[serde(rename = "@suggestedPresentationDelay", deserialize_with = "deserialize_xs_duration")]
    pub suggestedPresentationDelay: Option<Duration>,
    #[serde(rename = "@maxSegmentDuration", deserialize_with = "deserialize_xs_duration")]
    pub maxSegmentDuration: Option<Duration>,
    #[serde(rename = "@mediaPresentationDuration", deserialize_with = "deserialize_xs_duration")]
    pub mediaPresentationDuration: Option<Duration>,
    #[serde(rename = "BaseURL")]
    pub base_url: Vec<BaseURL>,
    #[serde(rename = "Location")]
    pub locations: Vec<Location>,
    #[serde(rename = "UTCTiming")]
    pub UTCTiming: Vec<UTCTiming>,
    #[serde(rename = "Period")]
    pub periods: Vec<Period>,
}

/// Parse an MPD manifest. The root element must be `MPD`; anything else (or malformed XML) fails
/// with `DASH_INVALID_XML`.
pub fn parse(xml: &str) -> Result<MPD> {
    use quick_xml::events::Event;

    // quick_xml's serde layer deserializes whatever the root element happens to be, so the root
    // name is validated separately.
    let mut reader = quick_xml::Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.local_name();
                if name.as_ref() != b"MPD" {
                    return Err(Error::InvalidXml(format!(
                        "root element is {}, expected MPD",
                        String::from_utf8_lossy(name.as_ref())
                    )));
                }
                break;
            }
            Ok(Event::Decl(_) | Event::Comment(_) | Event::Text(_) | Event::PI(_) | Event::DocType(_)) => {}
            Ok(Event::Eof) => return Err(Error::InvalidXml("no root element".to_string())),
            Ok(_) => return Err(Error::InvalidXml("unexpected XML structure".to_string())),
            Err(e) => return Err(Error::InvalidXml(e.to_string())),
        }
    }
    quick_xml::de::from_str(xml).map_err(|e| Error::InvalidXml(e.to_string()))
}
