//! Codec modules for PDF stream decompression.
//!
//! This module contains:
//! - the stream filter chain (`decode_stream` / `decode_data`)
//! - `jpx`: JPEG2000 container header scanning
//!
//! FlateDecode, LZWDecode, ASCIIHexDecode, ASCII85Decode and RunLengthDecode
//! are decoded in-repo. DCTDecode, JPXDecode, JBIG2Decode and CCITTFaxDecode
//! carry their own image compression and are delegated to an `ExternalFilter`
//! implementation when one is supplied.

pub mod jpx;

use crate::error::{RenderError, Result};
use crate::model::objects::{Dict, Object, Stream};
use crate::model::store::ObjectStore;
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Hook for filters whose decoders live outside this crate.
pub trait ExternalFilter {
    /// Decode `data` according to `filter` (e.g. "DCTDecode"), yielding raw
    /// raster bytes.
    fn decode(&self, filter: &str, parms: Option<&Dict>, data: &[u8]) -> Result<Vec<u8>>;
}

fn is_flate(name: &str) -> bool {
    name == "FlateDecode" || name.eq_ignore_ascii_case("Fl")
}

fn is_lzw(name: &str) -> bool {
    name == "LZWDecode" || name.eq_ignore_ascii_case("LZW")
}

fn is_asciihex(name: &str) -> bool {
    name == "ASCIIHexDecode" || name.eq_ignore_ascii_case("AHx")
}

fn is_ascii85(name: &str) -> bool {
    name == "ASCII85Decode" || name.eq_ignore_ascii_case("A85")
}

fn is_runlength(name: &str) -> bool {
    name == "RunLengthDecode" || name.eq_ignore_ascii_case("RL")
}

/// Image-compression filters that are always last in a chain.
pub fn is_image_filter(name: &str) -> bool {
    matches!(
        name,
        "DCTDecode" | "DCT" | "JPXDecode" | "JBIG2Decode" | "CCITTFaxDecode" | "CCF"
    )
}

/// Collect the filter chain of a stream dictionary as (name, params) pairs.
///
/// `Filter` may be a single name or an array; `DecodeParms` aligns with it
/// entry by entry (a single params dictionary applies to every filter).
pub fn get_filters(store: &ObjectStore, dict: &Dict) -> Vec<(String, Option<Dict>)> {
    let filters: Vec<String> = match store.known_get2(dict, "Filter", "F") {
        Some(obj) => match &*obj {
            Object::Name(n) => vec![n.clone()],
            Object::Array(arr) => arr
                .iter()
                .filter_map(|o| {
                    store
                        .resolve(o)
                        .ok()
                        .and_then(|r| r.as_name().ok().map(str::to_string))
                })
                .collect(),
            _ => Vec::new(),
        },
        None => Vec::new(),
    };
    if filters.is_empty() {
        return Vec::new();
    }

    let parms: Vec<Option<Dict>> = match store.known_get2(dict, "DecodeParms", "DP") {
        Some(obj) => match &*obj {
            Object::Dict(d) => vec![Some(d.clone())],
            Object::Array(arr) => arr
                .iter()
                .map(|o| {
                    store
                        .resolve(o)
                        .ok()
                        .and_then(|r| r.as_dict().ok().cloned())
                })
                .collect(),
            _ => Vec::new(),
        },
        None => Vec::new(),
    };

    let parms = if parms.is_empty() {
        vec![None; filters.len()]
    } else if parms.len() == 1 && filters.len() > 1 {
        vec![parms[0].clone(); filters.len()]
    } else {
        parms
    };

    filters
        .into_iter()
        .enumerate()
        .map(|(i, f)| (f, parms.get(i).cloned().flatten()))
        .collect()
}

/// Decode a stream's raw data through its full filter chain.
pub fn decode_stream(
    store: &ObjectStore,
    stream: &Stream,
    external: Option<&dyn ExternalFilter>,
) -> Result<Vec<u8>> {
    decode_data(store, &stream.dict, stream.raw_data(), external)
}

/// Decode raw bytes through the filter chain described by `dict`.
pub fn decode_data(
    store: &ObjectStore,
    dict: &Dict,
    data: &[u8],
    external: Option<&dyn ExternalFilter>,
) -> Result<Vec<u8>> {
    let mut data = data.to_vec();

    for (filter, parms) in get_filters(store, dict) {
        if is_flate(&filter) {
            data = flate_decode(&data)?;
        } else if is_lzw(&filter) {
            let early = parms
                .as_ref()
                .and_then(|p| store.known_get_int(p, "EarlyChange"))
                .unwrap_or(1);
            data = lzw_decode(&data, early != 0)?;
        } else if is_asciihex(&filter) {
            data = asciihex_decode(&data)?;
        } else if is_ascii85(&filter) {
            data = ascii85_decode(&data)?;
        } else if is_runlength(&filter) {
            data = runlength_decode(&data)?;
        } else if is_image_filter(&filter) {
            return match external {
                Some(ext) => ext.decode(&filter, parms.as_ref(), &data),
                None => Err(RenderError::DecodeError(format!(
                    "no decoder available for {filter}"
                ))),
            };
        } else {
            return Err(RenderError::Undefined(format!("filter {filter}")));
        }

        if let Some(p) = &parms {
            let predictor = store.known_get_int(p, "Predictor").unwrap_or(1);
            if predictor > 1 {
                let colors = store.known_get_int(p, "Colors").unwrap_or(1) as usize;
                let columns = store.known_get_int(p, "Columns").unwrap_or(1) as usize;
                let bits = store.known_get_int(p, "BitsPerComponent").unwrap_or(8) as usize;
                data = apply_predictor(predictor, &data, colors, columns, bits)?;
            }
        }
    }

    Ok(data)
}

fn flate_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| RenderError::DecodeError(format!("FlateDecode: {e}")))?;
    Ok(out)
}

fn lzw_decode(data: &[u8], early_change: bool) -> Result<Vec<u8>> {
    let mut decoder = if early_change {
        weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
    } else {
        weezl::decode::Decoder::new(weezl::BitOrder::Msb, 8)
    };
    decoder
        .decode(data)
        .map_err(|e| RenderError::DecodeError(format!("LZWDecode: {e}")))
}

fn asciihex_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut hi: Option<u8> = None;
    for &b in data {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            b'>' => break,
            b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\x00' => continue,
            _ => {
                return Err(RenderError::DecodeError(format!(
                    "ASCIIHexDecode: invalid byte {b:#x}"
                )));
            }
        };
        match hi.take() {
            Some(h) => out.push((h << 4) | digit),
            None => hi = Some(digit),
        }
    }
    // An odd final digit behaves as if followed by 0.
    if let Some(h) = hi {
        out.push(h << 4);
    }
    Ok(out)
}

fn ascii85_decode(data: &[u8]) -> Result<Vec<u8>> {
    let data = data.strip_prefix(b"<~").unwrap_or(data);
    let end = data.iter().position(|&b| b == b'~').unwrap_or(data.len());
    let data = &data[..end];

    let mut out = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut n = 0;
    for &b in data {
        match b {
            b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\x00' => continue,
            b'z' if n == 0 => {
                out.extend_from_slice(&[0, 0, 0, 0]);
                continue;
            }
            b'!'..=b'u' => {
                group[n] = b - b'!';
                n += 1;
                if n == 5 {
                    let v = group.iter().fold(0u32, |acc, &d| {
                        acc.wrapping_mul(85).wrapping_add(u32::from(d))
                    });
                    out.extend_from_slice(&v.to_be_bytes());
                    n = 0;
                }
            }
            _ => {
                return Err(RenderError::DecodeError(format!(
                    "ASCII85Decode: invalid byte {b:#x}"
                )));
            }
        }
    }
    if n == 1 {
        return Err(RenderError::DecodeError(
            "ASCII85Decode: truncated final group".into(),
        ));
    }
    if n > 1 {
        // Pad with 'u' and keep n-1 output bytes.
        for slot in group.iter_mut().skip(n) {
            *slot = 84;
        }
        let v = group.iter().fold(0u32, |acc, &d| {
            acc.wrapping_mul(85).wrapping_add(u32::from(d))
        });
        out.extend_from_slice(&v.to_be_bytes()[..n - 1]);
    }
    Ok(out)
}

fn runlength_decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let len = data[i];
        i += 1;
        match len {
            128 => break,
            0..=127 => {
                let n = len as usize + 1;
                if i + n > data.len() {
                    return Err(RenderError::DecodeError(
                        "RunLengthDecode: truncated literal run".into(),
                    ));
                }
                out.extend_from_slice(&data[i..i + n]);
                i += n;
            }
            129..=255 => {
                let n = 257 - len as usize;
                let Some(&b) = data.get(i) else {
                    return Err(RenderError::DecodeError(
                        "RunLengthDecode: truncated repeat run".into(),
                    ));
                };
                out.extend(std::iter::repeat_n(b, n));
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Undo a TIFF (2) or PNG (10..15) predictor applied before compression.
fn apply_predictor(
    predictor: i64,
    data: &[u8],
    colors: usize,
    columns: usize,
    bits: usize,
) -> Result<Vec<u8>> {
    let bpp = (colors * bits).div_ceil(8).max(1);
    let row_bytes = (colors * columns * bits).div_ceil(8);

    if predictor == 2 {
        if bits != 8 {
            // Sub-byte TIFF prediction is rare enough to pass through.
            return Ok(data.to_vec());
        }
        let mut out = data.to_vec();
        for row in out.chunks_mut(row_bytes) {
            for i in bpp..row.len() {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        return Ok(out);
    }

    if !(10..=15).contains(&predictor) {
        return Err(RenderError::RangeCheck(format!("Predictor {predictor}")));
    }

    // PNG predictors: each row is prefixed with a filter-type byte.
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_bytes];
    for chunk in data.chunks(row_bytes + 1) {
        if chunk.len() < row_bytes + 1 {
            break;
        }
        let ftype = chunk[0];
        let mut row = chunk[1..].to_vec();
        match ftype {
            0 => {}
            1 => {
                for i in bpp..row_bytes {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            2 => {
                for i in 0..row_bytes {
                    row[i] = row[i].wrapping_add(prev[i]);
                }
            }
            3 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                    row[i] = row[i].wrapping_add(((left + prev[i] as u16) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    let upleft = if i >= bpp { prev[i - bpp] } else { 0 };
                    row[i] = row[i].wrapping_add(paeth(left, prev[i], upleft));
                }
            }
            _ => {
                return Err(RenderError::DecodeError(format!(
                    "invalid PNG predictor filter {ftype}"
                )));
            }
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    Ok(out)
}

const fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i32 + b as i32 - c as i32;
    let pa = (p - a as i32).abs();
    let pb = (p - b as i32).abs();
    let pc = (p - c as i32).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::objects::dict_from;
    use flate2::{Compression, write::ZlibEncoder};
    use std::io::Write;

    #[test]
    fn asciihex_roundtrip() {
        assert_eq!(asciihex_decode(b"48 65 6C 6c 6F>").unwrap(), b"Hello");
        // Odd trailing digit is padded with zero.
        assert_eq!(asciihex_decode(b"7>").unwrap(), vec![0x70]);
    }

    #[test]
    fn ascii85_known_vector() {
        assert_eq!(ascii85_decode(b"87cUR~>").unwrap(), b"Hell");
        assert_eq!(ascii85_decode(b"z~>").unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn runlength_literal_and_repeat() {
        // 2 literal bytes, then 'X' repeated 3 times, then EOD.
        let data = [1u8, b'a', b'b', 254, b'X', 128];
        assert_eq!(runlength_decode(&data).unwrap(), b"abXXX");
    }

    #[test]
    fn flate_chain_via_dict() {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"raster bytes").unwrap();
        let compressed = enc.finish().unwrap();

        let store = ObjectStore::new();
        let dict = dict_from([("Filter", Object::Name("FlateDecode".into()))]);
        let out = decode_data(&store, &dict, &compressed, None).unwrap();
        assert_eq!(out, b"raster bytes");
    }

    #[test]
    fn image_filter_without_decoder_fails() {
        let store = ObjectStore::new();
        let dict = dict_from([("Filter", Object::Name("DCTDecode".into()))]);
        assert!(matches!(
            decode_data(&store, &dict, b"\xff\xd8", None),
            Err(RenderError::DecodeError(_))
        ));
    }

    #[test]
    fn png_up_predictor() {
        // Two rows of 3 bytes, Up filter: second row adds the first.
        let store = ObjectStore::new();
        let raw = [0u8, 1, 2, 3, 2u8, 1, 1, 1];
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&raw).unwrap();
        let compressed = enc.finish().unwrap();

        let parms = dict_from([
            ("Predictor", Object::Int(12)),
            ("Colors", Object::Int(3)),
            ("Columns", Object::Int(1)),
            ("BitsPerComponent", Object::Int(8)),
        ]);
        let dict = dict_from([
            ("Filter", Object::Name("FlateDecode".into())),
            ("DecodeParms", Object::Dict(parms)),
        ]);
        let out = decode_data(&store, &dict, &compressed, None).unwrap();
        assert_eq!(out, vec![1, 2, 3, 2, 3, 4]);
    }
}
