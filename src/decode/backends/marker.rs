//! Marker barcode backend.
//!
//! A minimal one-dimensional code used by the synthetic camera and the test suite.
//! Each symbol is a horizontal run of pixels, one byte per pixel:
//!
//! ```text
//! 0xC5 0x3A <len> <payload bytes...> <checksum>
//! ```
//!
//! A byte `b` is painted as red = `b`, green = `255 - b`. Neutral (gray) pixels can
//! never satisfy that relation, so camera background does not produce false starts.
//! The checksum is the XOR of `len` and every payload byte.

use image::{Rgba, RgbaImage};

use crate::decode::backend::BarcodeDecoder;
use crate::error::DecodeError;

const MAGIC: [u8; 2] = [0xC5, 0x3A];
const MARKER_ROWS: u32 = 6;
const MARKER_BLUE: u8 = 0x40;

/// Paint `text` as a marker symbol centered in `image`.
///
/// Returns false when the payload is longer than 255 bytes or does not fit.
pub fn paint_marker(image: &mut RgbaImage, text: &str) -> bool {
    let payload = text.as_bytes();
    let Ok(len) = u8::try_from(payload.len()) else {
        return false;
    };

    let mut symbol = Vec::with_capacity(payload.len() + 4);
    symbol.extend_from_slice(&MAGIC);
    symbol.push(len);
    symbol.extend_from_slice(payload);
    symbol.push(checksum(len, payload));

    let width = symbol.len() as u32;
    if width > image.width() || MARKER_ROWS > image.height() {
        return false;
    }

    let x0 = (image.width() - width) / 2;
    let y0 = (image.height() - MARKER_ROWS) / 2;
    for row in 0..MARKER_ROWS {
        for (offset, byte) in symbol.iter().enumerate() {
            image.put_pixel(x0 + offset as u32, y0 + row, encode(*byte));
        }
    }
    true
}

/// Decoder for marker symbols.
#[derive(Default)]
pub struct MarkerDecoder;

impl MarkerDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl BarcodeDecoder for MarkerDecoder {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn decode(&self, image: &RgbaImage) -> Result<Option<String>, DecodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::InvalidImage("empty image".into()));
        }
        for y in 0..image.height() {
            if let Some(x) = find_start(image, y) {
                return read_symbol(image, x, y).map(Some);
            }
        }
        Ok(None)
    }
}

fn encode(byte: u8) -> Rgba<u8> {
    Rgba([byte, 255 - byte, MARKER_BLUE, 255])
}

fn decode_pixel(pixel: &Rgba<u8>) -> Option<u8> {
    let [r, g, b, _] = pixel.0;
    (g == 255 - r && b == MARKER_BLUE).then_some(r)
}

fn checksum(len: u8, payload: &[u8]) -> u8 {
    payload.iter().fold(len, |acc, byte| acc ^ byte)
}

fn find_start(image: &RgbaImage, y: u32) -> Option<u32> {
    (0..image.width().saturating_sub(1)).find(|&x| {
        decode_pixel(image.get_pixel(x, y)) == Some(MAGIC[0])
            && decode_pixel(image.get_pixel(x + 1, y)) == Some(MAGIC[1])
    })
}

fn read_symbol(image: &RgbaImage, x: u32, y: u32) -> Result<String, DecodeError> {
    let byte_at = |offset: u32| -> Result<u8, DecodeError> {
        let column = x + offset;
        if column >= image.width() {
            return Err(DecodeError::Corrupt("symbol truncated at image edge".into()));
        }
        decode_pixel(image.get_pixel(column, y))
            .ok_or_else(|| DecodeError::Corrupt(format!("unreadable cell at column {column}")))
    };

    let len = byte_at(2)?;
    let payload = (0..u32::from(len))
        .map(|i| byte_at(3 + i))
        .collect::<Result<Vec<u8>, _>>()?;
    let expected = byte_at(3 + u32::from(len))?;
    if checksum(len, &payload) != expected {
        return Err(DecodeError::Corrupt("checksum mismatch".into()));
    }
    String::from_utf8(payload).map_err(|e| DecodeError::Corrupt(e.to_string()))
}
