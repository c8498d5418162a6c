//! Encoded polyline decoding.
//!
//! Standard variable-length polyline format: each coordinate is stored as a
//! latitude delta followed by a longitude delta, zig-zag encoded and split
//! into 5-bit chunks offset by 63. A chunk with bit `0x20` set is followed by
//! another chunk of the same value.
//!
//! See <https://developers.google.com/maps/documentation/utilities/polylinealgorithm>.

use geo::Point;

use crate::models::types::{Result, TransitError};

const PRECISION: f64 = 100_000.0;
const ASCII_OFFSET: u8 = 63;
const CONTINUATION: i64 = 0x20;
const CHUNK_MASK: i64 = 0x1f;

/// Decode an encoded polyline into `(lon, lat)` points.
///
/// # Errors
///
/// Fails if a character lies below the ASCII offset, the string ends in the
/// middle of a value, or the running coordinate leaves the `i64` range.
/// The error carries the byte offset where the offending value starts.
pub fn decode_polyline(encoded: &str) -> Result<Vec<Point>> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::with_capacity(bytes.len() / 4);

    let mut cursor = 0;
    let mut lat: i64 = 0;
    let mut lon: i64 = 0;
    while cursor < bytes.len() {
        lat = accumulate(lat, bytes, &mut cursor)?;
        lon = accumulate(lon, bytes, &mut cursor)?;
        points.push(Point::new(lon as f64 / PRECISION, lat as f64 / PRECISION));
    }

    Ok(points)
}

fn accumulate(total: i64, bytes: &[u8], cursor: &mut usize) -> Result<i64> {
    let start = *cursor;
    total
        .checked_add(next_delta(bytes, cursor)?)
        .ok_or(TransitError::InvalidPolyline(start))
}

fn next_delta(bytes: &[u8], cursor: &mut usize) -> Result<i64> {
    let mut result: i64 = 0;
    let mut shift = 0;
    loop {
        let byte = *bytes
            .get(*cursor)
            .ok_or(TransitError::InvalidPolyline(*cursor))?;
        if byte < ASCII_OFFSET || shift > 60 {
            return Err(TransitError::InvalidPolyline(*cursor));
        }
        *cursor += 1;

        let chunk = i64::from(byte - ASCII_OFFSET);
        result |= (chunk & CHUNK_MASK) << shift;
        shift += 5;
        if chunk & CONTINUATION == 0 {
            break;
        }
    }

    Ok(if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    })
}
