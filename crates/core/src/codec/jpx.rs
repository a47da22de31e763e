//! JPEG2000 container header scanning.
//!
//! When an image uses JPXDecode and carries no ColorSpace entry, the
//! component count, bit depth and color space have to be recovered from the
//! JP2 container itself before the (external) decoder ever runs. The
//! container is a sequence of length-prefixed boxes (4-byte big-endian
//! length, 4-byte tag); we look for `jp2h` and read its `ihdr`, `bpcc`,
//! `colr` and `pclr` sub-boxes.
//!
//! A malformed header does not fail the image: plenty of real-world files
//! have no usable header at all and decode fine, so scan errors are absorbed
//! and zeroed defaults are returned.

use crate::error::{RenderError, Result};
use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, warn};

/// Header facts recovered from a JP2 container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JpxInfo {
    /// Component count from `ihdr`.
    pub comps: u32,
    /// Bits per component (`ihdr`, overridden by `bpcc`/`pclr`).
    pub bpc: u32,
    /// Enumerated color space code from a method-1 `colr` box (0 if none).
    pub cs_enum: u32,
    /// True when a method-2 `colr` box supplied an embedded ICC profile.
    pub icc_based: bool,
    /// Byte offset of the ICC profile within the scanned data.
    pub icc_offset: u32,
    /// ICC profile length in bytes.
    pub icc_length: u32,
}

const LEN_IHDR: usize = 14;

const fn tag4(a: u8, b: u8, c: u8, d: u8) -> u32 {
    ((a as u32) << 24) | ((b as u32) << 16) | ((c as u32) << 8) | d as u32
}

const TAG_JP2H: u32 = tag4(b'j', b'p', b'2', b'h');
const TAG_IHDR: u32 = tag4(b'i', b'h', b'd', b'r');
const TAG_BPCC: u32 = tag4(b'b', b'p', b'c', b'c');
const TAG_COLR: u32 = tag4(b'c', b'o', b'l', b'r');
const TAG_PCLR: u32 = tag4(b'p', b'c', b'l', b'r');
const TAG_CDEF: u32 = tag4(b'c', b'd', b'e', b'f');

/// Scan a JP2 container for header info.
///
/// Never fails: any structural error is logged and zeroed defaults come
/// back, letting the image proceed on whatever the decoder makes of it.
pub fn scan_jpx_header(data: &[u8]) -> JpxInfo {
    match scan_inner(data) {
        Ok(info) => info,
        Err(e) => {
            warn!(error = %e, "ignoring malformed JPX header");
            JpxInfo::default()
        }
    }
}

struct BoxCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BoxCursor<'a> {
    /// Read one box header. The returned length excludes the 8 header
    /// bytes already consumed.
    fn get_box(&mut self, budget: usize) -> Result<(usize, u32)> {
        if budget < 8 || self.pos + 8 > self.data.len() {
            return Err(RenderError::LimitCheck("JPX box header truncated".into()));
        }
        let len = BigEndian::read_u32(&self.data[self.pos..]) as usize;
        let tag = BigEndian::read_u32(&self.data[self.pos + 4..]);
        if len < 8 {
            return Err(RenderError::LimitCheck(format!(
                "JPX box length {len} too small"
            )));
        }
        self.pos += 8;
        debug!(len, tag, "JPX box");
        Ok((len - 8, tag))
    }

    fn payload(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(RenderError::LimitCheck("JPX box payload truncated".into()));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) {
        self.pos += len;
    }
}

fn scan_inner(data: &[u8]) -> Result<JpxInfo> {
    let mut info = JpxInfo::default();
    let mut cur = BoxCursor { data, pos: 0 };
    let mut avail = data.len() as i64;

    // Find the 'jp2h' box, skipping over everything else.
    let jp2h_len = loop {
        if avail <= 0 {
            return Err(RenderError::DecodeError("no jp2h box found".into()));
        }
        let (box_len, tag) = cur.get_box(avail as usize)?;
        avail -= 8;
        if box_len == 0 || box_len as i64 > avail {
            warn!(box_len, "invalid JPX header box length");
            return Err(RenderError::SyntaxError("invalid JPX box length".into()));
        }
        if tag == TAG_JP2H {
            break box_len;
        }
        cur.skip(box_len);
        avail -= box_len as i64;
    };

    // From here we only look inside jp2h. The first sub-box must be ihdr.
    let mut avail = jp2h_len as i64;
    let (ihdr_len, tag) = cur.get_box(avail as usize)?;
    avail -= 8;
    if tag != TAG_IHDR || ihdr_len != LEN_IHDR {
        return Err(RenderError::SyntaxError("jp2h does not start with ihdr".into()));
    }
    let ihdr = cur.payload(LEN_IHDR)?;
    avail -= LEN_IHDR as i64;

    let comps = u32::from(BigEndian::read_u16(&ihdr[8..]));
    // Depth is stored minus one; 255 means per-component depths in bpcc.
    let mut bpc = u32::from(ihdr[10]);
    if bpc != 255 {
        bpc += 1;
    }

    let mut got_color = false;
    while avail > 0 {
        let (box_len, tag) = cur.get_box(avail as usize)?;
        avail -= 8;
        if box_len == 0 {
            return Err(RenderError::SyntaxError("empty box inside jp2h".into()));
        }
        let payload = cur.payload(box_len)?;
        avail -= box_len as i64;

        match tag {
            TAG_BPCC => {
                let depth = payload[0];
                if payload
                    .iter()
                    .take(comps as usize)
                    .any(|&d| d != depth)
                {
                    warn!("JPX color channels do not share one depth, output may be wrong");
                }
                bpc = u32::from(depth) + 1;
            }
            TAG_COLR => {
                if got_color {
                    debug!("ignoring extra colr box");
                    continue;
                }
                let meth = payload[0];
                if meth == 1 && payload.len() >= 7 {
                    info.cs_enum = BigEndian::read_u32(&payload[3..]);
                } else if meth == 2 {
                    info.icc_based = true;
                    info.icc_offset = (cur.pos - box_len + 3) as u32;
                    info.icc_length = (box_len - 3) as u32;
                    info.cs_enum = 0;
                } else {
                    debug!(meth, "unexpected colr method");
                    info.cs_enum = 0;
                }
                got_color = true;
            }
            TAG_PCLR => {
                // Only the palette depth matters here.
                if payload.len() >= 4 {
                    bpc = u32::from(payload[3] & 0x7) + 1;
                }
            }
            TAG_CDEF => {
                debug!("cdef box not supported");
            }
            _ => {}
        }
    }

    info.comps = comps;
    info.bpc = bpc;
    Ok(info)
}
