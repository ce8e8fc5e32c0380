//! Dense voxel grids for participating media.
//!
//! Grids are stored in the binary "VOL" format (version 3, float32 payload):
//!
//! ```text
//! "VOL" u8:version i32:encoding i32:size_x i32:size_y i32:size_z i32:channels
//! f32x3:bbox_min f32x3:bbox_max f32 * (size_x * size_y * size_z * channels)
//! ```
//!
//! All multi-byte values are little-endian. Voxels are laid out x-fastest.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use glrt_math::Vec3;
use thiserror::Error;

const MAGIC: &[u8; 3] = b"VOL";
const VERSION: u8 = 3;
const ENCODING_FLOAT32: i32 = 1;

/// Errors that can occur while reading or writing a volume grid.
#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid identifier: {0:?}")]
    InvalidMagic([u8; 3]),

    #[error("Invalid version: {0}")]
    UnsupportedVersion(u8),

    #[error("Unsupported voxel encoding {0} (only float32 is supported)")]
    UnsupportedEncoding(i32),

    #[error("Invalid grid dimensions: {0}x{1}x{2} with {3} channels")]
    InvalidDimensions(i32, i32, i32, i32),

    #[error("Truncated voxel payload: expected {expected} bytes, found {found}")]
    TruncatedPayload { expected: usize, found: usize },
}

pub type VolumeResult<T> = Result<T, VolumeError>;

/// A dense grid of float voxels with a world-space extent.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    pub size_x: usize,
    pub size_y: usize,
    pub size_z: usize,
    pub channels: usize,
    pub bbox_min: Vec3,
    pub bbox_max: Vec3,
    /// Largest voxel value, used as the majorant for delta tracking
    pub max_value: f32,
    pub data: Vec<f32>,
}

impl Volume {
    /// Create a zero-filled grid.
    pub fn new(size_x: usize, size_y: usize, size_z: usize, channels: usize) -> Self {
        Self {
            size_x,
            size_y,
            size_z,
            channels,
            bbox_min: Vec3::ZERO,
            bbox_max: Vec3::ONE,
            max_value: 0.0,
            data: vec![0.0; size_x * size_y * size_z * channels],
        }
    }

    /// Set the world-space extent of the grid.
    pub fn with_range(mut self, bbox_min: Vec3, bbox_max: Vec3) -> Self {
        self.bbox_min = bbox_min;
        self.bbox_max = bbox_max;
        self
    }

    fn offset(&self, x: usize, y: usize, z: usize, ch: usize) -> usize {
        ((z * self.size_y + y) * self.size_x + x) * self.channels + ch
    }

    /// Voxel value, or `None` outside the grid.
    pub fn get(&self, x: usize, y: usize, z: usize, ch: usize) -> Option<f32> {
        if x >= self.size_x || y >= self.size_y || z >= self.size_z || ch >= self.channels {
            return None;
        }
        self.data.get(self.offset(x, y, z, ch)).copied()
    }

    /// Write a voxel value. Out-of-range coordinates are ignored.
    pub fn set(&mut self, x: usize, y: usize, z: usize, ch: usize, value: f32) {
        if x >= self.size_x || y >= self.size_y || z >= self.size_z || ch >= self.channels {
            return;
        }
        let i = self.offset(x, y, z, ch);
        self.data[i] = value;
    }

    /// Recompute `max_value` from the voxel data.
    pub fn update_max_value(&mut self) {
        self.max_value = self.data.iter().copied().fold(-1.0e10, f32::max);
    }

    /// Load a grid from a VOL file.
    pub fn load(path: impl AsRef<Path>) -> VolumeResult<Self> {
        let file = File::open(path.as_ref())?;
        Self::read(&mut BufReader::new(file))
    }

    /// Read a grid in VOL format.
    pub fn read<R: Read>(reader: &mut R) -> VolumeResult<Self> {
        let mut magic = [0u8; 3];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(VolumeError::InvalidMagic(magic));
        }

        let version = reader.read_u8()?;
        if version != VERSION {
            return Err(VolumeError::UnsupportedVersion(version));
        }

        let encoding = reader.read_i32::<LittleEndian>()?;
        if encoding != ENCODING_FLOAT32 {
            return Err(VolumeError::UnsupportedEncoding(encoding));
        }

        let sx = reader.read_i32::<LittleEndian>()?;
        let sy = reader.read_i32::<LittleEndian>()?;
        let sz = reader.read_i32::<LittleEndian>()?;
        let ch = reader.read_i32::<LittleEndian>()?;
        if sx < 0 || sy < 0 || sz < 0 || ch < 0 {
            return Err(VolumeError::InvalidDimensions(sx, sy, sz, ch));
        }

        let bbox_min = read_vec3(reader)?;
        let bbox_max = read_vec3(reader)?;

        let count = (sx as usize)
            .checked_mul(sy as usize)
            .and_then(|n| n.checked_mul(sz as usize))
            .and_then(|n| n.checked_mul(ch as usize))
            .ok_or(VolumeError::InvalidDimensions(sx, sy, sz, ch))?;
        let expected = count
            .checked_mul(std::mem::size_of::<f32>())
            .ok_or(VolumeError::InvalidDimensions(sx, sy, sz, ch))?;

        // Grow with the bytes actually present; the header alone can claim any size.
        let mut payload = Vec::new();
        reader.take(expected as u64).read_to_end(&mut payload)?;
        if payload.len() != expected {
            return Err(VolumeError::TruncatedPayload {
                expected,
                found: payload.len(),
            });
        }

        let mut data = vec![0.0f32; count];
        LittleEndian::read_f32_into(&payload, &mut data);

        let mut volume = Self {
            size_x: sx as usize,
            size_y: sy as usize,
            size_z: sz as usize,
            channels: ch as usize,
            bbox_min,
            bbox_max,
            max_value: 0.0,
            data,
        };
        volume.update_max_value();
        Ok(volume)
    }

    /// Save the grid as a VOL file.
    pub fn save(&self, path: impl AsRef<Path>) -> VolumeResult<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Write the grid in VOL format.
    pub fn write<W: Write>(&self, writer: &mut W) -> VolumeResult<()> {
        let dims = [self.size_x, self.size_y, self.size_z, self.channels];
        let mut header = [0i32; 4];
        for (h, d) in header.iter_mut().zip(dims) {
            *h = i32::try_from(d).map_err(|_| {
                VolumeError::InvalidDimensions(
                    self.size_x as i32,
                    self.size_y as i32,
                    self.size_z as i32,
                    self.channels as i32,
                )
            })?;
        }

        writer.write_all(MAGIC)?;
        writer.write_u8(VERSION)?;
        writer.write_i32::<LittleEndian>(ENCODING_FLOAT32)?;
        for h in header {
            writer.write_i32::<LittleEndian>(h)?;
        }
        write_vec3(writer, self.bbox_min)?;
        write_vec3(writer, self.bbox_max)?;
        for &v in &self.data {
            writer.write_f32::<LittleEndian>(v)?;
        }
        Ok(())
    }
}

fn read_vec3<R: Read>(reader: &mut R) -> std::io::Result<Vec3> {
    Ok(Vec3::new(
        reader.read_f32::<LittleEndian>()?,
        reader.read_f32::<LittleEndian>()?,
        reader.read_f32::<LittleEndian>()?,
    ))
}

fn write_vec3<W: Write>(writer: &mut W, v: Vec3) -> std::io::Result<()> {
    writer.write_f32::<LittleEndian>(v.x)?;
    writer.write_f32::<LittleEndian>(v.y)?;
    writer.write_f32::<LittleEndian>(v.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ramp() -> Volume {
        let mut vol = Volume::new(2, 3, 4, 1).with_range(Vec3::splat(-1.0), Vec3::splat(1.0));
        for z in 0..4 {
            for y in 0..3 {
                for x in 0..2 {
                    vol.set(x, y, z, 0, (x + 10 * y + 100 * z) as f32);
                }
            }
        }
        vol.update_max_value();
        vol
    }

    #[test]
    fn test_layout_is_x_fastest() {
        let vol = ramp();
        assert_eq!(vol.data[1], 1.0);
        assert_eq!(vol.data[2], 10.0);
        assert_eq!(vol.data[6], 100.0);
        assert_eq!(vol.get(1, 2, 3, 0), Some(321.0));
        assert_eq!(vol.get(2, 0, 0, 0), None);
        assert_eq!(vol.max_value, 321.0);
    }

    #[test]
    fn test_write_then_read() {
        let vol = ramp();
        let mut bytes = Vec::new();
        vol.write(&mut bytes).unwrap();

        // header (3 + 1 + 5*4 + 6*4) + payload
        assert_eq!(bytes.len(), 48 + 24 * 4);
        assert_eq!(&bytes[..3], b"VOL");

        let back = Volume::read(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(back, vol);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("density.vol");
        let vol = ramp();
        vol.save(&path).unwrap();

        let back = Volume::load(&path).unwrap();
        assert_eq!(back.size_z, 4);
        assert_eq!(back.bbox_min, Vec3::splat(-1.0));
        assert_eq!(back.max_value, 321.0);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let err = Volume::read(&mut Cursor::new(b"VOX\x03".to_vec())).unwrap_err();
        assert!(matches!(err, VolumeError::InvalidMagic(m) if &m == b"VOX"));
    }

    #[test]
    fn test_rejects_bad_version() {
        let err = Volume::read(&mut Cursor::new(b"VOL\x02".to_vec())).unwrap_err();
        assert!(matches!(err, VolumeError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_rejects_non_float_encoding() {
        let mut bytes = b"VOL\x03".to_vec();
        bytes.extend_from_slice(&2i32.to_le_bytes());
        let err = Volume::read(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, VolumeError::UnsupportedEncoding(2)));
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let mut bytes = Vec::new();
        ramp().write(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 4);

        let err = Volume::read(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(
            err,
            VolumeError::TruncatedPayload {
                expected: 96,
                found: 92
            }
        ));
    }

    #[test]
    fn test_oversized_header_without_payload() {
        let mut bytes = b"VOL\x03".to_vec();
        for v in [1i32, 65536, 65536, 4096, 1] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for v in [0.0f32, 0.0, 0.0, 1.0, 1.0, 1.0, 0.5] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(bytes.len(), 52);

        let err = Volume::read(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(
            err,
            VolumeError::TruncatedPayload { found: 4, .. }
        ));
    }
}
