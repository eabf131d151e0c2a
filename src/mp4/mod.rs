//! A registry-driven ISO-BMFF box walker. Callers register per-FourCC callbacks as either "basic
//! box" or "full box" (version + flags) handlers; the walker reads box headers, hands each
//! matching callback a bounds-checked reader over the box payload, and skips unknown boxes.
//
// The walker mirrors the classic streaming-player design: handlers are registered once, the
// parser is cheap to clone, and `children` / `sample_description` / `all_data` are reusable
// payload callbacks for the standard container layouts.

pub mod pssh;
pub mod sidx;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::reader::Reader;
use crate::Result;

/// The big-endian 32-bit code for a four-character ASCII box name.
pub fn box_name_to_type(name: &str) -> u32 {
    let bytes = name.as_bytes();
    assert_eq!(bytes.len(), 4, "box names are exactly four characters");
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// The printable name of a box type, for diagnostics.
pub fn box_type_to_name(box_type: u32) -> String {
    box_type
        .to_be_bytes()
        .iter()
        .map(|b| {
            if b.is_ascii_graphic() {
                *b as char
            } else {
                '?'
            }
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BoxKind {
    Basic,
    Full,
}

type Callback = Rc<RefCell<dyn FnMut(&mut ParsedBox) -> Result<()>>>;

/// One parsed box, handed to a registered callback. `reader` covers the box payload only;
/// `size`, `start` and `header_size` support byte-range arithmetic relative to the original
/// buffer (the SIDX parser computes its first media byte from them).
pub struct ParsedBox<'a> {
    pub parser: Mp4Parser,
    /// Full-box version, `None` for basic boxes.
    pub version: Option<u8>,
    /// Full-box flags (24 bits), `None` for basic boxes.
    pub flags: Option<u32>,
    pub reader: Reader<'a>,
    /// The declared size of the box, header included.
    pub size: u64,
    /// Absolute offset of the box start within the outermost parsed buffer.
    pub start: u64,
    /// 8, 12, 16 or 20 bytes depending on 64-bit size and full-box fields.
    pub header_size: u64,
    /// The whole box, header included, for callers that re-emit boxes verbatim.
    full_data: &'a [u8],
    stop_on_partial: bool,
}

impl<'a> ParsedBox<'a> {
    pub fn full_data(&self) -> &'a [u8] {
        self.full_data
    }
}

#[derive(Clone, Default)]
pub struct Mp4Parser {
    handlers: Rc<RefCell<HashMap<u32, (BoxKind, Callback)>>>,
    done: Rc<Cell<bool>>,
}

impl Mp4Parser {
    pub fn new() -> Self {
        Mp4Parser::default()
    }

    /// Register a callback for a box without version/flags fields.
    pub fn basic_box<F>(self, name: &str, callback: F) -> Self
    where
        F: FnMut(&mut ParsedBox) -> Result<()> + 'static,
    {
        self.handlers.borrow_mut().insert(
            box_name_to_type(name),
            (BoxKind::Basic, Rc::new(RefCell::new(callback))),
        );
        self
    }

    /// Register a callback for a full box; the walker consumes the version/flags word before
    /// handing over the payload.
    pub fn full_box<F>(self, name: &str, callback: F) -> Self
    where
        F: FnMut(&mut ParsedBox) -> Result<()> + 'static,
    {
        self.handlers.borrow_mut().insert(
            box_name_to_type(name),
            (BoxKind::Full, Rc::new(RefCell::new(callback))),
        );
        self
    }

    /// Halt the walk. Used by callbacks to short-circuit a search once the target box has been
    /// handled.
    pub fn stop(&self) {
        self.done.set(true);
    }

    pub fn stopped(&self) -> bool {
        self.done.get()
    }

    /// Walk the top-level boxes of `data`. With `stop_on_partial`, a truncated box header ends
    /// the walk cleanly instead of failing with `BUFFER_READ_OUT_OF_BOUNDS`.
    pub fn parse(&self, data: &[u8], stop_on_partial: bool) -> Result<()> {
        self.done.set(false);
        let mut reader = Reader::big_endian(data);
        while reader.has_more() && !self.done.get() {
            self.parse_next(0, &mut reader, stop_on_partial)?;
        }
        Ok(())
    }

    /// Parse a single box at the reader's position. `abs_start` is the absolute offset of the
    /// reader's origin within the outermost buffer.
    pub fn parse_next(
        &self,
        abs_start: u64,
        reader: &mut Reader,
        stop_on_partial: bool,
    ) -> Result<()> {
        let start = reader.position();
        if !self.has_enough(reader, 8, stop_on_partial)? {
            return Ok(());
        }
        let mut size = reader.read_u32()? as u64;
        let box_type = reader.read_u32()?;
        match size {
            0 => {
                // box extends to the end of the buffer
                size = (reader.len() - start) as u64;
            }
            1 => {
                if !self.has_enough(reader, 8, stop_on_partial)? {
                    return Ok(());
                }
                size = reader.read_u64()?;
            }
            _ => {}
        }

        let entry = self
            .handlers
            .borrow()
            .get(&box_type)
            .map(|(kind, cb)| (*kind, Rc::clone(cb)));
        // malformed sizes are clamped to the buffer
        let end = ((start as u64).saturating_add(size) as usize).min(reader.len());
        match entry {
            Some((kind, callback)) => {
                let (version, flags) = if kind == BoxKind::Full {
                    if !self.has_enough(reader, 4, stop_on_partial)? {
                        return Ok(());
                    }
                    let word = reader.read_u32()?;
                    (Some((word >> 24) as u8), Some(word & 0x00FF_FFFF))
                } else {
                    (None, None)
                };
                let header_size = (reader.position() - start) as u64;
                let payload_len = end.saturating_sub(reader.position());
                let mut cloned = reader.clone();
                cloned.seek(start)?;
                let full_data = cloned.read_bytes(end - start)?;
                let payload = reader.read_bytes(payload_len)?;
                let mut parsed = ParsedBox {
                    parser: self.clone(),
                    version,
                    flags,
                    reader: Reader::big_endian(payload),
                    size,
                    start: abs_start + start as u64,
                    header_size,
                    full_data,
                    stop_on_partial,
                };
                callback.borrow_mut()(&mut parsed)?;
            }
            None => {
                // never move backwards, even for nonsense sizes
                reader.seek(end.max(reader.position()))?;
            }
        }
        Ok(())
    }

    fn has_enough(&self, reader: &mut Reader, n: usize, stop_on_partial: bool) -> Result<bool> {
        if reader.remaining() >= n {
            return Ok(true);
        }
        if stop_on_partial {
            let len = reader.len();
            reader.seek(len)?;
            self.done.set(true);
            return Ok(false);
        }
        // let the following read produce the out-of-bounds error
        Ok(true)
    }
}

/// Payload callback that recursively walks the child boxes of a container until the payload is
/// exhausted or the parser is stopped.
pub fn children(parsed: &mut ParsedBox) -> Result<()> {
    let base = parsed.start + parsed.header_size;
    while parsed.reader.has_more() && !parsed.parser.stopped() {
        let parser = parsed.parser.clone();
        parser.parse_next(base, &mut parsed.reader, parsed.stop_on_partial)?;
    }
    Ok(())
}

/// Payload callback for `stsd`-style boxes: a leading `u32` entry count followed by that many
/// child boxes.
pub fn sample_description(parsed: &mut ParsedBox) -> Result<()> {
    let base = parsed.start + parsed.header_size;
    let count = parsed.reader.read_u32()?;
    for _ in 0..count {
        if parsed.parser.stopped() {
            break;
        }
        let parser = parsed.parser.clone();
        parser.parse_next(base, &mut parsed.reader, parsed.stop_on_partial)?;
    }
    Ok(())
}

/// Wrap a `&[u8]` callback as a payload callback receiving the entire remaining payload.
pub fn all_data<F>(mut callback: F) -> impl FnMut(&mut ParsedBox) -> Result<()>
where
    F: FnMut(&[u8]) -> Result<()> + 'static,
{
    move |parsed: &mut ParsedBox| {
        let n = parsed.reader.remaining();
        let data = parsed.reader.read_bytes(n)?;
        callback(data)
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    /// Assemble a box from a name and payload fragments, computing the size field.
    pub fn make_box(name: &str, payload: &[&[u8]]) -> Vec<u8> {
        let body_len: usize = payload.iter().map(|p| p.len()).sum();
        let mut out = Vec::with_capacity(8 + body_len);
        out.extend_from_slice(&((8 + body_len) as u32).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        for p in payload {
            out.extend_from_slice(p);
        }
        out
    }

    /// Assemble a full box (version + flags) from a name and payload fragments.
    pub fn make_full_box(name: &str, version: u8, flags: u32, payload: &[&[u8]]) -> Vec<u8> {
        let body_len: usize = payload.iter().map(|p| p.len()).sum();
        let mut out = Vec::with_capacity(12 + body_len);
        out.extend_from_slice(&((12 + body_len) as u32).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(version);
        out.extend_from_slice(&flags.to_be_bytes()[1..]);
        for p in payload {
            out.extend_from_slice(p);
        }
        out
    }
}
