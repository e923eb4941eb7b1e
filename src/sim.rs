// sim.rs

// --- External Crate Imports ---
use log::debug;
use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Size of the fixed SIM header in bytes.
pub const HEADER_SIZE: u64 = 16;

/// Magic bytes opening every SIM file.
pub const MAGIC: &[u8; 3] = b"sim";

/// The only SIM format version this reader understands.
pub const VERSION: u8 = 1;

/// Upper bound on the per-record sample name field declared in the header.
pub const MAX_SAMPLE_NAME_SIZE: u16 = 255;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("I/O error reading SIM data: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}: not a SIM file (magic bytes {:?})", .path.display(), .found)]
    Magic { path: PathBuf, found: [u8; 3] },

    #[error("{}: unsupported SIM version {}", .path.display(), .version)]
    Version { path: PathBuf, version: u8 },

    #[error("{}: unrecognized number format tag {} (expected 0 for float or 1 for integer)", .path.display(), .tag)]
    NumberFormat { path: PathBuf, tag: u8 },

    #[error("{}: sample name size {} outside supported range 1..={}", .path.display(), .size, MAX_SAMPLE_NAME_SIZE)]
    NameSize { path: PathBuf, size: u16 },

    #[error("{}: channel count must be at least 1", .path.display())]
    ZeroChannels { path: PathBuf },

    #[error("{}: sample name in record {} is not valid UTF-8", .path.display(), .record_index)]
    BadName { path: PathBuf, record_index: u32 },

    #[error("{}: file ends inside record {} ({} samples declared)", .path.display(), .record_index, .declared)]
    Truncated {
        path: PathBuf,
        record_index: u32,
        declared: u32,
    },
}

/// Numeric encoding of the intensity values, declared once in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormat {
    /// 4-byte little-endian IEEE floats.
    Float,
    /// 2-byte little-endian unsigned integers.
    Integer,
}

impl NumberFormat {
    fn from_tag(tag: u8, path: &Path) -> Result<Self, SimError> {
        match tag {
            0 => Ok(NumberFormat::Float),
            1 => Ok(NumberFormat::Integer),
            _ => Err(SimError::NumberFormat {
                path: path.to_path_buf(),
                tag,
            }),
        }
    }
}

/// Intensity values of one record, tagged with their on-disk encoding.
///
/// Consumers read through [`Intensities::value`], so the encoding is decided
/// once at open time and never branches into downstream arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub enum Intensities {
    Float(Vec<f32>),
    Integer(Vec<u16>),
}

impl Intensities {
    /// Numeric value at `index`, regardless of encoding.
    #[inline]
    pub fn value(&self, index: usize) -> f64 {
        match self {
            Intensities::Float(values) => f64::from(values[index]),
            Intensities::Integer(values) => f64::from(values[index]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Intensities::Float(values) => values.len(),
            Intensities::Integer(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One sample's worth of data: the sample name plus probes x channels
/// intensity values indexed as `probe * num_channels + channel`.
#[derive(Debug, Clone)]
pub struct SimRecord {
    pub name: String,
    pub intensities: Intensities,
}

/// Open handle on a SIM file: immutable header fields plus a read cursor.
///
/// The cursor is shared by every pass over the file, so callers take the
/// handle by mutable reference and call [`Sim::reset`] before each pass.
#[derive(Debug)]
pub struct Sim {
    reader: BufReader<File>,
    path: PathBuf,
    pub name_size: u16,
    pub num_samples: u32,
    pub num_probes: u32,
    pub num_channels: u8,
    pub number_format: NumberFormat,
    records_read: u32,
}

impl Sim {
    /// Opens `path`, validates the 16-byte header, and leaves the cursor at
    /// the first record.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut reader = BufReader::new(file);

        let mut header = [0u8; HEADER_SIZE as usize];
        reader.read_exact(&mut header)?;

        if &header[0..3] != MAGIC {
            return Err(SimError::Magic {
                path,
                found: [header[0], header[1], header[2]],
            });
        }
        let version = header[3];
        if version != VERSION {
            return Err(SimError::Version { path, version });
        }
        let name_size = u16::from_le_bytes([header[4], header[5]]);
        let num_samples = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
        let num_probes = u32::from_le_bytes([header[10], header[11], header[12], header[13]]);
        let num_channels = header[14];
        let number_format = NumberFormat::from_tag(header[15], &path)?;

        if name_size == 0 || name_size > MAX_SAMPLE_NAME_SIZE {
            return Err(SimError::NameSize {
                path,
                size: name_size,
            });
        }
        if num_channels == 0 {
            return Err(SimError::ZeroChannels { path });
        }

        debug!(
            "Opened SIM file {}: {} samples, {} probes, {} channels, {:?} values.",
            path.display(),
            num_samples,
            num_probes,
            num_channels,
            number_format
        );

        Ok(Sim {
            reader,
            path,
            name_size,
            num_samples,
            num_probes,
            num_channels,
            number_format,
            records_read: 0,
        })
    }

    /// Number of intensity values held by every record.
    pub fn values_per_record(&self) -> usize {
        self.num_probes as usize * self.num_channels as usize
    }

    /// Number of records consumed since open or the last reset.
    pub fn records_read(&self) -> u32 {
        self.records_read
    }

    /// Repositions the cursor to the first record. Callable at any time,
    /// including before any read.
    pub fn reset(&mut self) -> Result<(), SimError> {
        self.reader.seek(SeekFrom::Start(HEADER_SIZE))?;
        self.records_read = 0;
        Ok(())
    }

    /// Reads the next record in insertion order, or `None` once all declared
    /// samples have been consumed. A file that runs out of bytes before the
    /// declared sample count is [`SimError::Truncated`].
    pub fn next_record(&mut self) -> Result<Option<SimRecord>, SimError> {
        if self.records_read == self.num_samples {
            return Ok(None);
        }
        let record_index = self.records_read;

        let mut name_buffer = vec![0u8; self.name_size as usize];
        self.read_record_bytes(&mut name_buffer, record_index)?;
        // Names shorter than the name field are NUL-padded on disk.
        let name_end = name_buffer
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_buffer.len());
        let name = std::str::from_utf8(&name_buffer[..name_end])
            .map_err(|_| SimError::BadName {
                path: self.path.clone(),
                record_index,
            })?
            .to_string();

        let count = self.values_per_record();
        let intensities = match self.number_format {
            NumberFormat::Float => {
                let mut raw = vec![0u8; count * 4];
                self.read_record_bytes(&mut raw, record_index)?;
                let values = raw
                    .chunks_exact(4)
                    .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                    .collect();
                Intensities::Float(values)
            }
            NumberFormat::Integer => {
                let mut raw = vec![0u8; count * 2];
                self.read_record_bytes(&mut raw, record_index)?;
                let values = raw
                    .chunks_exact(2)
                    .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
                    .collect();
                Intensities::Integer(values)
            }
        };

        self.records_read += 1;
        Ok(Some(SimRecord { name, intensities }))
    }

    fn read_record_bytes(
        &mut self,
        buffer: &mut [u8],
        record_index: u32,
    ) -> Result<(), SimError> {
        self.reader.read_exact(buffer).map_err(|error| {
            if error.kind() == std::io::ErrorKind::UnexpectedEof {
                SimError::Truncated {
                    path: self.path.clone(),
                    record_index,
                    declared: self.num_samples,
                }
            } else {
                SimError::Io(error)
            }
        })
    }
}
