//! Locating and interpreting `pssh` (Protection System Specific Header) boxes inside an
//! initialization segment's `moov` box. Each record carries a DRM system ID, an optional key-ID
//! list (version 1), the system-specific payload, and the original box bytes so the box can be
//! re-emitted verbatim towards a license/key service.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;

use crate::mp4::{children, Mp4Parser, ParsedBox};
use crate::Result;

pub const WIDEVINE_SYSTEM_ID: [u8; 16] = [
    0xed, 0xef, 0x8b, 0xa9, 0x79, 0xd6, 0x4a, 0xce, 0xa3, 0xc8, 0x27, 0xdc, 0xd5, 0x1d, 0x21, 0xed,
];
pub const PLAYREADY_SYSTEM_ID: [u8; 16] = [
    0x9a, 0x04, 0xf0, 0x79, 0x98, 0x40, 0x42, 0x86, 0xab, 0x92, 0xe6, 0x5b, 0xe0, 0x88, 0x5f, 0x95,
];
pub const COMMON_SYSTEM_ID: [u8; 16] = [
    0x10, 0x77, 0xef, 0xec, 0xc0, 0xb2, 0x4d, 0x02, 0xac, 0xe3, 0x3c, 0x1e, 0x52, 0xe2, 0xfb, 0x4b,
];

/// One parsed `pssh` box.
#[derive(Debug, Clone, Eq)]
pub struct PsshBox {
    pub system_id: [u8; 16],
    pub version: u8,
    /// Key IDs listed in a version-1 box. Version 0 carries none.
    pub key_ids: Vec<[u8; 16]>,
    /// The system-specific payload.
    pub data: Vec<u8>,
    /// The original box bytes, header included.
    pub box_bytes: Vec<u8>,
}

// Two PSSH records are equal iff their boxes are byte-equal, header included.
impl PartialEq for PsshBox {
    fn eq(&self, other: &Self) -> bool {
        self.box_bytes == other.box_bytes
    }
}

impl std::hash::Hash for PsshBox {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.box_bytes.hash(state);
    }
}

impl PsshBox {
    pub fn is_widevine(&self) -> bool {
        self.system_id == WIDEVINE_SYSTEM_ID
    }

    pub fn system_id_hex(&self) -> String {
        hex::encode(self.system_id)
    }
}

/// Walk `moov -> pssh` over an init segment. Content without any `pssh` box is legitimate (the
/// stream may be clear), so an empty result only warrants a warning.
pub fn parse_init_segment(data: &[u8]) -> Result<Vec<PsshBox>> {
    let found: Rc<RefCell<Vec<PsshBox>>> = Rc::default();
    let found_cb = Rc::clone(&found);
    Mp4Parser::new()
        .basic_box("moov", children)
        .full_box("pssh", move |parsed| {
            let record = parse_pssh(parsed)?;
            found_cb.borrow_mut().push(record);
            Ok(())
        })
        .parse(data, false)?;

    let mut records = Rc::try_unwrap(found)
        .map(RefCell::into_inner)
        .unwrap_or_default();
    if records.is_empty() {
        warn!("no pssh box found in init segment; content may be clear");
    }
    dedup(&mut records);
    Ok(records)
}

fn parse_pssh(parsed: &mut ParsedBox) -> Result<PsshBox> {
    let version = parsed.version.unwrap_or(0);
    let mut system_id = [0u8; 16];
    system_id.copy_from_slice(parsed.reader.read_bytes(16)?);

    let mut key_ids = Vec::new();
    if version > 0 {
        let kid_count = parsed.reader.read_u32()?;
        for _ in 0..kid_count {
            let mut kid = [0u8; 16];
            kid.copy_from_slice(parsed.reader.read_bytes(16)?);
            key_ids.push(kid);
        }
    }
    let data_size = parsed.reader.read_u32()? as usize;
    let data = parsed.reader.read_bytes(data_size)?.to_vec();

    Ok(PsshBox {
        system_id,
        version,
        key_ids,
        data,
        box_bytes: parsed.full_data().to_vec(),
    })
}

/// Drop records whose box bytes duplicate an earlier record, preserving order.
pub fn dedup(records: &mut Vec<PsshBox>) {
    let mut seen: Vec<Vec<u8>> = Vec::new();
    records.retain(|r| {
        if seen.iter().any(|b| *b == r.box_bytes) {
            false
        } else {
            seen.push(r.box_bytes.clone());
            true
        }
    });
}

/// Assemble a `pssh` box with a leading 4-byte size, as consumed by key services that expect the
/// box verbatim. Version 1 carries the key-ID list; version 0 omits it.
pub fn build(system_id: &[u8; 16], key_ids: &[[u8; 16]], data: &[u8], version: u8) -> Vec<u8> {
    let kid_bytes = if version > 0 { 4 + 16 * key_ids.len() } else { 0 };
    let size = 12 + 16 + kid_bytes + 4 + data.len();
    let mut out = Vec::with_capacity(size);
    out.extend_from_slice(&(size as u32).to_be_bytes());
    out.extend_from_slice(b"pssh");
    out.push(version);
    out.extend_from_slice(&[0, 0, 0]); // flags
    out.extend_from_slice(system_id);
    if version > 0 {
        out.extend_from_slice(&(key_ids.len() as u32).to_be_bytes());
        for kid in key_ids {
            out.extend_from_slice(kid);
        }
    }
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out
}

/// Parse a standalone `pssh` box produced by [`build`] or extracted from a manifest.
pub fn parse_box(data: &[u8]) -> Result<Option<PsshBox>> {
    let found: Rc<RefCell<Option<PsshBox>>> = Rc::default();
    let found_cb = Rc::clone(&found);
    Mp4Parser::new()
        .full_box("pssh", move |parsed| {
            *found_cb.borrow_mut() = Some(parse_pssh(parsed)?);
            parsed.parser.stop();
            Ok(())
        })
        .parse(data, false)?;
    Ok(Rc::try_unwrap(found).map(RefCell::into_inner).unwrap_or(None))
}
