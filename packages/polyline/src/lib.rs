#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Flexible polyline codec.
//!
//! Route providers return shapes as a compact string: a header (format
//! version, coordinate precision, optional third dimension) followed by
//! zig-zag encoded deltas for every coordinate, all packed into 5-bit
//! varint groups over a URL-safe 64-character alphabet.
//!
//! Only the 2D points are kept. A third dimension (altitude, elevation,
//! ...) is still read so the stream stays aligned, then discarded.

use thiserror::Error;
use traffic_map_geography_models::GeoPoint;

/// The only header version this codec understands.
pub const FORMAT_VERSION: u64 = 1;

/// Highest precision (decimal places) the 4-bit header field can express.
pub const MAX_PRECISION: u32 = 15;

const ENCODING_TABLE: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Sentinel for bytes outside the alphabet.
const INVALID: u8 = 0xFF;

/// Maps an input byte to its 6-bit value, or [`INVALID`].
#[allow(clippy::cast_possible_truncation)]
const DECODING_TABLE: [u8; 256] = {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < ENCODING_TABLE.len() {
        table[ENCODING_TABLE[i] as usize] = i as u8;
        i += 1;
    }
    table
};

const CONTINUATION_BIT: u8 = 0x20;
const PAYLOAD_MASK: u8 = 0x1F;

/// Errors produced while decoding a polyline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The input was empty or ended before the header was complete.
    #[error("polyline header is missing or incomplete")]
    MissingHeader,
    /// The header declares a format version this codec does not support.
    #[error("unsupported polyline format version {0}")]
    UnsupportedVersion(u64),
    /// A byte outside the encoding alphabet was found.
    #[error("invalid character {character:?} at byte {position}")]
    InvalidCharacter {
        /// The offending character.
        character: char,
        /// Byte offset in the input.
        position: usize,
    },
    /// The input ended in the middle of a varint group.
    #[error("polyline ends in the middle of a value")]
    Truncated,
    /// The input ended after some, but not all, dimensions of a point.
    #[error("polyline ends in the middle of a point ({values} trailing values)")]
    IncompletePoint {
        /// How many values of the final point were present.
        values: usize,
    },
    /// A varint group was too long to fit in 64 bits.
    #[error("value at byte {position} overflows 64 bits")]
    Overflow {
        /// Byte offset where the value started.
        position: usize,
    },
    /// The reconstructed coordinate is not a valid latitude/longitude.
    #[error("decoded coordinate ({lat}, {lng}) is out of range")]
    InvalidCoordinate {
        /// Decoded latitude.
        lat: f64,
        /// Decoded longitude.
        lng: f64,
    },
}

/// Errors produced while encoding a polyline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Requested precision does not fit in the header.
    #[error("precision {0} exceeds the maximum of {MAX_PRECISION}")]
    PrecisionTooLarge(u32),
}

/// Kind of third dimension carried by an encoded polyline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThirdDimension {
    /// Plain 2D polyline.
    Absent,
    /// Level (floor number).
    Level,
    /// Altitude above sea level.
    Altitude,
    /// Elevation above ground.
    Elevation,
    /// Reserved value 4.
    Reserved1,
    /// Reserved value 5.
    Reserved2,
    /// Application-defined value 6.
    Custom1,
    /// Application-defined value 7.
    Custom2,
}

impl ThirdDimension {
    const fn from_bits(bits: u64) -> Self {
        match bits & 0x7 {
            0 => Self::Absent,
            1 => Self::Level,
            2 => Self::Altitude,
            3 => Self::Elevation,
            4 => Self::Reserved1,
            5 => Self::Reserved2,
            6 => Self::Custom1,
            _ => Self::Custom2,
        }
    }
}

/// Decoded header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Decimal places of latitude/longitude.
    pub precision: u32,
    /// Which third dimension, if any, follows each lat/lng pair.
    pub third_dimension: ThirdDimension,
    /// Decimal places of the third dimension.
    pub third_dimension_precision: u32,
}

impl Header {
    const fn dimensions(self) -> usize {
        match self.third_dimension {
            ThirdDimension::Absent => 2,
            _ => 3,
        }
    }
}

/// A decoded polyline: its header plus the 2D points.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPolyline {
    /// Header fields.
    pub header: Header,
    /// Points in stream order.
    pub points: Vec<GeoPoint>,
}

/// Decodes a flexible polyline into its 2D points.
///
/// # Errors
///
/// Returns [`DecodeError`] if the string contains characters outside the
/// alphabet, declares an unsupported version, or ends mid-value or
/// mid-point.
pub fn decode(encoded: &str) -> Result<Vec<GeoPoint>, DecodeError> {
    decode_with_header(encoded).map(|decoded| decoded.points)
}

/// Decodes a flexible polyline, also returning its header.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_with_header(encoded: &str) -> Result<DecodedPolyline, DecodeError> {
    let mut values = VarintReader::new(encoded);

    let version = values.next().ok_or(DecodeError::MissingHeader)??;
    if version != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let content = values.next().ok_or(DecodeError::MissingHeader)??;
    #[allow(clippy::cast_possible_truncation)]
    let header = Header {
        precision: (content & 0xF) as u32,
        third_dimension: ThirdDimension::from_bits(content >> 4),
        third_dimension_precision: ((content >> 7) & 0xF) as u32,
    };

    let dimensions = header.dimensions();
    let scale = 10f64.powi(i32::try_from(header.precision).unwrap_or(0));
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;
    let mut points = Vec::new();
    let mut point = [0i64; 3];
    let mut filled = 0;

    for value in values {
        point[filled] = unzigzag(value?);
        filled += 1;
        if filled < dimensions {
            continue;
        }
        filled = 0;
        lat = lat.wrapping_add(point[0]);
        lng = lng.wrapping_add(point[1]);
        // point[2] is the third dimension delta; read to keep alignment.

        #[allow(clippy::cast_precision_loss)]
        let (lat_deg, lng_deg) = (lat as f64 / scale, lng as f64 / scale);
        let p = GeoPoint::new(lat_deg, lng_deg).map_err(|_| DecodeError::InvalidCoordinate {
            lat: lat_deg,
            lng: lng_deg,
        })?;
        points.push(p);
    }

    if filled != 0 {
        return Err(DecodeError::IncompletePoint { values: filled });
    }

    Ok(DecodedPolyline { header, points })
}

/// Encodes 2D points as a flexible polyline with `precision` decimal places.
///
/// # Errors
///
/// Returns [`EncodeError::PrecisionTooLarge`] if `precision` exceeds
/// [`MAX_PRECISION`].
pub fn encode(points: &[GeoPoint], precision: u32) -> Result<String, EncodeError> {
    if precision > MAX_PRECISION {
        return Err(EncodeError::PrecisionTooLarge(precision));
    }
    let scale = 10f64.powi(i32::try_from(precision).unwrap_or(0));
    let mut out = String::with_capacity(points.len() * 8 + 2);
    write_unsigned(&mut out, FORMAT_VERSION);
    write_unsigned(&mut out, u64::from(precision));

    let mut last_lat = 0i64;
    let mut last_lng = 0i64;
    for p in points {
        #[allow(clippy::cast_possible_truncation)]
        let lat = (p.lat * scale).round() as i64;
        #[allow(clippy::cast_possible_truncation)]
        let lng = (p.lng * scale).round() as i64;
        write_signed(&mut out, lat - last_lat);
        write_signed(&mut out, lng - last_lng);
        last_lat = lat;
        last_lng = lng;
    }
    Ok(out)
}

/// Iterates unsigned varints out of the character stream.
struct VarintReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> VarintReader<'a> {
    const fn new(encoded: &'a str) -> Self {
        Self {
            bytes: encoded.as_bytes(),
            position: 0,
        }
    }

    fn read(&mut self) -> Result<u64, DecodeError> {
        let start = self.position;
        let mut result: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let Some(&byte) = self.bytes.get(self.position) else {
                return Err(DecodeError::Truncated);
            };
            let value = DECODING_TABLE[usize::from(byte)];
            if value == INVALID {
                return Err(DecodeError::InvalidCharacter {
                    character: char::from(byte),
                    position: self.position,
                });
            }
            self.position += 1;
            let payload = u64::from(value & PAYLOAD_MASK);
            // The last group that fits starts at bit 60 and may only carry 4 bits.
            if shift >= u64::BITS || (shift > u64::BITS - 5 && payload >> (u64::BITS - shift) != 0)
            {
                return Err(DecodeError::Overflow { position: start });
            }
            result |= payload << shift;
            if value & CONTINUATION_BIT == 0 {
                return Ok(result);
            }
            shift += 5;
        }
    }
}

impl Iterator for VarintReader<'_> {
    type Item = Result<u64, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.bytes.len() {
            return None;
        }
        let item = self.read();
        if item.is_err() {
            // Stop after the first error.
            self.position = self.bytes.len();
        }
        Some(item)
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn unzigzag(value: u64) -> i64 {
    let magnitude = (value >> 1) as i64;
    if value & 1 == 1 { !magnitude } else { magnitude }
}

#[allow(clippy::cast_sign_loss)]
const fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn write_unsigned(out: &mut String, mut value: u64) {
    while value > u64::from(PAYLOAD_MASK) {
        #[allow(clippy::cast_possible_truncation)]
        let chunk = (value & u64::from(PAYLOAD_MASK)) as u8 | CONTINUATION_BIT;
        out.push(char::from(ENCODING_TABLE[usize::from(chunk)]));
        value >>= 5;
    }
    #[allow(clippy::cast_possible_truncation)]
    let last = value as usize;
    out.push(char::from(ENCODING_TABLE[last]));
}

fn write_signed(out: &mut String, value: i64) {
    write_unsigned(out, zigzag(value));
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "BFoz5xJ67i1B1B7PzIhaxL7Y";

    fn assert_close(actual: GeoPoint, lat: f64, lng: f64) {
        assert!(
            (actual.lat - lat).abs() < 1e-9 && (actual.lng - lng).abs() < 1e-9,
            "expected ({lat}, {lng}), got {actual:?}"
        );
    }

    #[test]
    fn decodes_sample() {
        let points = decode(SAMPLE).unwrap();
        assert_eq!(points.len(), 4);
        assert_close(points[0], 50.10228, 8.69821);
        assert_close(points[1], 50.10201, 8.69567);
        assert_close(points[2], 50.10063, 8.69150);
        assert_close(points[3], 50.09878, 8.68752);
        assert!((-90.0..=90.0).contains(&points[0].lat));
    }

    #[test]
    fn reads_header() {
        let decoded = decode_with_header(SAMPLE).unwrap();
        assert_eq!(decoded.header.precision, 5);
        assert_eq!(decoded.header.third_dimension, ThirdDimension::Absent);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let truncated = &SAMPLE[..SAMPLE.len() - 2];
        assert_eq!(
            decode(truncated),
            Err(DecodeError::IncompletePoint { values: 1 })
        );
        let mid_value = &SAMPLE[..SAMPLE.len() - 1];
        assert_eq!(decode(mid_value), Err(DecodeError::Truncated));
    }

    #[test]
    fn skips_third_dimension() {
        // Same 2D shape with an altitude value after every pair.
        let decoded = decode_with_header("BlBoz5xJ67i1BU1B7PUzIhaUxL7YU").unwrap();
        assert_eq!(decoded.header.third_dimension, ThirdDimension::Altitude);
        assert_eq!(decoded.points.len(), 4);
        assert_close(decoded.points[3], 50.09878, 8.68752);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(decode(""), Err(DecodeError::MissingHeader));
        assert_eq!(decode("B"), Err(DecodeError::MissingHeader));
        assert_eq!(decode("CF"), Err(DecodeError::UnsupportedVersion(2)));
        assert!(matches!(
            decode("BFoz5x!J"),
            Err(DecodeError::InvalidCharacter { character: '!', .. })
        ));
    }

    #[test]
    fn rejects_values_wider_than_64_bits() {
        // Twelve full groups fill bits 0..60; the thirteenth has room for 4 more.
        let full = "_".repeat(12);
        assert_eq!(
            decode(&format!("{full}P")),
            Err(DecodeError::UnsupportedVersion(u64::MAX))
        );
        assert_eq!(
            decode(&format!("{full}Q")),
            Err(DecodeError::Overflow { position: 0 })
        );
        assert_eq!(
            decode(&format!("{full}_A")),
            Err(DecodeError::Overflow { position: 0 })
        );
    }

    #[test]
    fn header_only_is_an_empty_polyline() {
        assert_eq!(decode("BF"), Ok(vec![]));
    }

    #[test]
    fn encodes_sample() {
        let points = decode(SAMPLE).unwrap();
        assert_eq!(encode(&points, 5).unwrap(), SAMPLE);
    }

    #[test]
    fn round_trip_within_precision() {
        let original = [
            GeoPoint { lat: 34.052_235, lng: -118.243_683 },
            GeoPoint { lat: 34.061_111, lng: -118.250_001 },
            GeoPoint { lat: -33.868_820, lng: 151.209_296 },
            GeoPoint { lat: 0.0, lng: 0.0 },
            GeoPoint { lat: 89.999_99, lng: -179.999_99 },
        ];
        for precision in [5, 6, 7] {
            let encoded = encode(&original, precision).unwrap();
            let decoded = decode_with_header(&encoded).unwrap();
            assert_eq!(decoded.header.precision, precision);
            let tolerance = 10f64.powi(-i32::try_from(precision).unwrap());
            for (a, b) in original.iter().zip(&decoded.points) {
                assert!((a.lat - b.lat).abs() <= tolerance);
                assert!((a.lng - b.lng).abs() <= tolerance);
            }
        }
    }

    #[test]
    fn rejects_excessive_precision() {
        assert_eq!(encode(&[], 16), Err(EncodeError::PrecisionTooLarge(16)));
    }
}
