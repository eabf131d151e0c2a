//! ContentProtection resolution: normalizing `cenc:default_KID`, decoding `<cenc:pssh>` init
//! data, mapping scheme UUIDs to key systems, extracting license URLs (Widevine `ms:laurl`,
//! ClearKey `Laurl`, PlayReady PRO), and intersecting key systems across representations.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::warn;

use crate::media::{DrmInfo, InitData};
use crate::mpd;
use crate::reader::Reader;
use crate::{Error, Result};

const MP4_PROTECTION_SCHEME: &str = "urn:mpeg:dash:mp4protection:2011";

/// Scheme UUID -> key system. Lowercased schemeIdUris.
fn key_system_for_scheme(scheme: &str) -> Option<&'static str> {
    match scheme {
        "urn:uuid:1077efec-c0b2-4d02-ace3-3c1e52e2fb4b" => Some("org.w3.clearkey"),
        "urn:uuid:e2719d58-a985-b3c9-781a-b030af78d30e" => Some("org.w3.clearkey"),
        "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed" => Some("com.widevine.alpha"),
        "urn:uuid:9a04f079-9840-4286-ab92-e65be0885f95" => Some("com.microsoft.playready"),
        "urn:uuid:79f0049a-4098-8642-ab92-e65be0885f95" => Some("com.microsoft.playready"),
        "urn:uuid:f239e769-efa3-4850-9c16-a903c6932efb" => Some("com.adobe.primetime"),
        _ => None,
    }
}

/// What one element list (AdaptationSet's or Representation's ContentProtection children)
/// resolves to.
#[derive(Debug, Default, Clone)]
pub struct ParsedProtection {
    pub drm_infos: Vec<DrmInfo>,
    /// Normalized (lowercased, no hyphens) default key ID, if any.
    pub default_kid: Option<String>,
}

/// The per-AdaptationSet protection state, updated as each Representation is parsed.
#[derive(Debug, Default, Clone)]
pub struct ProtectionContext {
    pub drm_infos: Vec<DrmInfo>,
    pub default_kid: Option<String>,
}

impl ProtectionContext {
    pub fn encrypted(&self) -> bool {
        !self.drm_infos.is_empty()
    }
}

pub fn parse_adaptation_set(elements: &[mpd::ContentProtection]) -> Result<ProtectionContext> {
    let parsed = parse_elements(elements)?;
    Ok(ProtectionContext {
        drm_infos: parsed.drm_infos,
        default_kid: parsed.default_kid,
    })
}

/// Parse a Representation's ContentProtection and fold it into the AdaptationSet context. If the
/// set was unknown or unencrypted and the representation declares DRM, the declaration replaces
/// the context; otherwise the key systems are intersected. An empty intersection is fatal.
pub fn parse_representation(
    elements: &[mpd::ContentProtection],
    context: &mut ProtectionContext,
) -> Result<()> {
    let parsed = parse_elements(elements)?;

    if let Some(kid) = &parsed.default_kid {
        match &context.default_kid {
            Some(existing) if existing != kid => return Err(Error::ConflictingKeyIds),
            _ => context.default_kid = Some(kid.clone()),
        }
    }

    if parsed.drm_infos.is_empty() {
        return Ok(());
    }
    if context.drm_infos.is_empty() {
        context.drm_infos = parsed.drm_infos;
        return Ok(());
    }
    let intersection: Vec<DrmInfo> = context
        .drm_infos
        .iter()
        .filter(|info| parsed.drm_infos.iter().any(|p| p.key_system == info.key_system))
        .cloned()
        .collect();
    if intersection.is_empty() {
        return Err(Error::NoCommonKeySystem);
    }
    context.drm_infos = intersection;
    Ok(())
}

fn parse_elements(elements: &[mpd::ContentProtection]) -> Result<ParsedProtection> {
    let mut default_kid: Option<String> = None;
    let mut default_init_data: Vec<InitData> = Vec::new();
    let mut drm_infos: Vec<DrmInfo> = Vec::new();

    for element in elements {
        let scheme = element
            .schemeIdUri
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();

        if let Some(kid) = &element.default_KID {
            let normalized = kid.to_ascii_lowercase().replace('-', "");
            if normalized.contains(' ') {
                return Err(Error::MultipleKeyIdsNotSupported);
            }
            match &default_kid {
                Some(existing) if *existing != normalized => {
                    return Err(Error::ConflictingKeyIds);
                }
                _ => default_kid = Some(normalized),
            }
        }

        let mut init_data = Vec::new();
        for pssh in &element.cenc_pssh {
            let Some(text) = &pssh.content else { continue };
            let data = STANDARD
                .decode(text.trim())
                .map_err(Error::PsshBadEncoding)?;
            init_data.push(InitData {
                init_data_type: "cenc".to_string(),
                data,
            });
        }

        if scheme == MP4_PROTECTION_SCHEME {
            // contributes the default init data but is not itself a DRM system
            default_init_data.extend(init_data);
            continue;
        }

        let Some(key_system) = key_system_for_scheme(&scheme) else {
            if !scheme.is_empty() {
                warn!(scheme = %scheme, "unrecognized ContentProtection scheme");
            }
            continue;
        };

        let mut info = DrmInfo::new(key_system);
        info.init_data = init_data;
        info.license_server_uri = match key_system {
            "com.widevine.alpha" => element
                .laurl
                .as_ref()
                .and_then(|l| l.licenseUrl.clone()),
            "org.w3.clearkey" => element.clearkey_laurl.as_ref().and_then(|l| {
                if l.lic_type.as_deref() == Some("EME-1.0") {
                    l.content.clone()
                } else {
                    None
                }
            }),
            "com.microsoft.playready" => element
                .msprpro
                .as_ref()
                .and_then(|pro| pro.content.as_deref())
                .and_then(|text| match STANDARD.decode(text.trim()) {
                    Ok(bytes) => parse_pro_la_url(&bytes),
                    Err(e) => {
                        warn!(error = %e, "PlayReady PRO is not valid base64");
                        None
                    }
                }),
            _ => None,
        };
        drm_infos.push(info);
    }

    for info in &mut drm_infos {
        if info.init_data.is_empty() {
            info.init_data = default_init_data.clone();
        }
        if let Some(kid) = &default_kid {
            info.key_ids.insert(kid.clone());
        }
    }

    Ok(ParsedProtection {
        drm_infos,
        default_kid,
    })
}

/// Walk a PlayReady Object: little-endian `u32` total size, `u16` record count, then
/// `(u16 type, u16 size, size bytes)` records. Record type 1 holds the rights-management header,
/// a UTF-16LE `WRMHEADER` XML document whose `DATA/LA_URL` element names the license server.
pub fn parse_pro_la_url(data: &[u8]) -> Option<String> {
    let mut reader = Reader::little_endian(data);
    let declared = reader.read_u32().ok()?;
    if declared as usize != data.len() {
        warn!(
            declared,
            actual = data.len(),
            "PlayReady PRO size field does not match the object length"
        );
        return None;
    }
    let _record_count = reader.read_u16().ok()?;
    while reader.has_more() {
        let record_type = reader.read_u16().ok()?;
        let size = reader.read_u16().ok()? as usize;
        if size % 2 != 0 || size > reader.remaining() {
            warn!("PlayReady PRO record has an odd or out-of-bounds size");
            return None;
        }
        let record = reader.read_bytes(size).ok()?;
        // type 1 = rights management header
        if record_type == 1 {
            let utf16: Vec<u16> = record
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            let xml = String::from_utf16_lossy(&utf16);
            return extract_la_url(&xml);
        }
    }
    None
}

fn extract_la_url(wrmheader: &str) -> Option<String> {
    let open = wrmheader.find("<LA_URL>")? + "<LA_URL>".len();
    let close = wrmheader[open..].find("</LA_URL>")? + open;
    Some(wrmheader[open..close].trim().to_string())
}
