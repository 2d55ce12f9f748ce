//! Geography codec.
//!
//! Geography columns are stored the way PostGIS prints them: hex-encoded extended WKB
//! (EWKB) points carrying SRID 4326. Callers only ever see a `[longitude, latitude]`
//! pair. Encoding writes the IEEE-754 bytes verbatim, so a pair always decodes back to
//! exactly the same values.

use crate::catalog::GEOGRAPHY_SRID;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// WKB geometry type code for a point.
const WKB_POINT: u32 = 1;

/// EWKB flag marking an embedded SRID.
const EWKB_SRID_FLAG: u32 = 0x2000_0000;

/// EWKB flags for Z and M dimensions.
const EWKB_ZM_FLAGS: u32 = 0x8000_0000 | 0x4000_0000;

/// Length of a little-endian EWKB point with SRID.
const EWKB_POINT_LEN: usize = 1 + 4 + 4 + 8 + 8;

/// Geography codec errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    /// The stored value is not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// The stored value ended early.
    #[error("truncated geometry: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes needed.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Bytes follow the point.
    #[error("trailing data: {0} bytes after the point")]
    TrailingBytes(usize),

    /// First byte is neither 0 (big endian) nor 1 (little endian).
    #[error("invalid byte order marker {0}")]
    InvalidByteOrder(u8),

    /// Only 2D points are supported.
    #[error("unsupported geometry type {0:#x}")]
    UnsupportedGeometry(u32),

    /// Stored SRID differs from 4326.
    #[error("unexpected SRID {0}")]
    UnexpectedSrid(u32),

    /// Longitude or latitude outside the valid range.
    #[error("coordinates out of range: [{longitude}, {latitude}]")]
    OutOfRange {
        /// Longitude in degrees.
        longitude: f64,
        /// Latitude in degrees.
        latitude: f64,
    },
}

/// A WGS 84 coordinate pair, serialized as `[longitude, latitude]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    /// Longitude in degrees, -180..=180.
    pub longitude: f64,
    /// Latitude in degrees, -90..=90.
    pub latitude: f64,
}

impl Coordinates {
    /// Create a coordinate pair, checking ranges.
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, GeoError> {
        if !(-180.0..=180.0).contains(&longitude) || !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::OutOfRange {
                longitude,
                latitude,
            });
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }

    /// Build from a `[longitude, latitude]` pair.
    pub fn from_pair(pair: [f64; 2]) -> Result<Self, GeoError> {
        Self::new(pair[0], pair[1])
    }

    /// The `[longitude, latitude]` pair.
    pub fn to_pair(self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

impl Serialize for Coordinates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_pair().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Coordinates {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pair = <[f64; 2]>::deserialize(deserializer)?;
        Coordinates::from_pair(pair).map_err(serde::de::Error::custom)
    }
}

/// Encode a coordinate pair as an uppercase hex EWKB point with SRID 4326.
pub fn encode(coordinates: Coordinates) -> String {
    let mut bytes = Vec::with_capacity(EWKB_POINT_LEN);
    bytes.push(1);
    bytes.extend_from_slice(&(WKB_POINT | EWKB_SRID_FLAG).to_le_bytes());
    bytes.extend_from_slice(&GEOGRAPHY_SRID.to_le_bytes());
    bytes.extend_from_slice(&coordinates.longitude.to_le_bytes());
    bytes.extend_from_slice(&coordinates.latitude.to_le_bytes());
    hex::encode_upper(bytes)
}

/// Decode a hex (E)WKB point into a coordinate pair.
///
/// Accepts either byte order, and plain WKB without an SRID (assumed 4326).
pub fn decode(stored: &str) -> Result<Coordinates, GeoError> {
    let bytes = hex::decode(stored).map_err(|e| GeoError::InvalidHex(e.to_string()))?;
    let mut reader = WkbReader::new(&bytes)?;

    let type_code = reader.read_u32()?;
    if type_code & EWKB_ZM_FLAGS != 0 || type_code & !EWKB_SRID_FLAG != WKB_POINT {
        return Err(GeoError::UnsupportedGeometry(type_code));
    }
    if type_code & EWKB_SRID_FLAG != 0 {
        let srid = reader.read_u32()?;
        if srid != GEOGRAPHY_SRID {
            return Err(GeoError::UnexpectedSrid(srid));
        }
    }

    let longitude = reader.read_f64()?;
    let latitude = reader.read_f64()?;
    reader.finish()?;
    Coordinates::new(longitude, latitude)
}

struct WkbReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    little_endian: bool,
}

impl<'a> WkbReader<'a> {
    fn new(bytes: &'a [u8]) -> Result<Self, GeoError> {
        let order = *bytes.first().ok_or(GeoError::Truncated {
            expected: 1,
            actual: 0,
        })?;
        let little_endian = match order {
            0 => false,
            1 => true,
            other => return Err(GeoError::InvalidByteOrder(other)),
        };
        Ok(Self {
            bytes,
            pos: 1,
            little_endian,
        })
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], GeoError> {
        let end = self.pos + N;
        let slice = self.bytes.get(self.pos..end).ok_or(GeoError::Truncated {
            expected: end,
            actual: self.bytes.len(),
        })?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        self.pos = end;
        Ok(buf)
    }

    fn read_u32(&mut self) -> Result<u32, GeoError> {
        let buf = self.take::<4>()?;
        Ok(if self.little_endian {
            u32::from_le_bytes(buf)
        } else {
            u32::from_be_bytes(buf)
        })
    }

    fn finish(&self) -> Result<(), GeoError> {
        match self.bytes.len() - self.pos {
            0 => Ok(()),
            extra => Err(GeoError::TrailingBytes(extra)),
        }
    }

    fn read_f64(&mut self) -> Result<f64, GeoError> {
        let buf = self.take::<8>()?;
        Ok(if self.little_endian {
            f64::from_le_bytes(buf)
        } else {
            f64::from_be_bytes(buf)
        })
    }
}

/// A stored geography point.
///
/// Holds the stored representation; use [`Geography::coordinates`] to read the pair and
/// [`Geography::from_coordinates`] to write one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geography(String);

impl Geography {
    /// Build the stored representation for a coordinate pair.
    pub fn from_coordinates(coordinates: Coordinates) -> Self {
        Geography(encode(coordinates))
    }

    /// Build from a `[longitude, latitude]` pair.
    pub fn from_pair(pair: [f64; 2]) -> Result<Self, GeoError> {
        Ok(Self::from_coordinates(Coordinates::from_pair(pair)?))
    }

    /// Wrap an already stored value after checking it decodes.
    pub fn from_stored(stored: impl Into<String>) -> Result<Self, GeoError> {
        let stored = stored.into();
        decode(&stored)?;
        Ok(Geography(stored))
    }

    /// Decode the coordinate pair.
    pub fn coordinates(&self) -> Result<Coordinates, GeoError> {
        decode(&self.0)
    }

    /// The stored hex EWKB string.
    pub fn as_stored(&self) -> &str {
        &self.0
    }
}

impl Serialize for Geography {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Geography {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stored = String::deserialize(deserializer)?;
        Geography::from_stored(stored).map_err(serde::de::Error::custom)
    }
}
