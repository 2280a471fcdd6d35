use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

use super::ReferenceTrack;
use crate::pitch::PitchEstimate;

const MAGIC: &[u8; 4] = b"VSRT";
const VERSION: u32 = 1;
// magic + version + hop seconds + count
const HEADER_LEN: usize = 4 + 4 + 8 + 4;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("reference asset I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a reference pitch asset (bad magic bytes)")]
    BadMagic,
    #[error("unsupported reference asset version {0}")]
    UnsupportedVersion(u32),
    #[error("reference asset header truncated after {0} bytes")]
    TruncatedHeader(usize),
    #[error("reference asset truncated: header promises {expected} values, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("reference asset has {0} trailing bytes")]
    TrailingData(usize),
    #[error("hop duration must be positive and finite (got {0})")]
    InvalidHop(f64),
    #[error("malformed JSON reference asset: {0}")]
    Json(#[from] serde_json::Error),
    #[error("reference recording has {samples} samples, fewer than one {frame}-sample frame")]
    TooShort { samples: usize, frame: usize },
    #[error("reference recording contains a non-finite sample at index {0}")]
    NonFiniteSample(usize),
}

/// On-disk encoding, chosen from the file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetFormat {
    /// `VSRT`, u32 version, f64 hop seconds, u32 count, then f32 Hz values,
    /// all little-endian. 0 Hz marks an unvoiced window.
    Binary,
    /// `{"hop_seconds": .., "pitches_hz": [..]}`
    Json,
}

impl AssetFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => AssetFormat::Json,
            _ => AssetFormat::Binary,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct JsonAsset {
    hop_seconds: f64,
    pitches_hz: Vec<f32>,
}

pub fn save(track: &ReferenceTrack, path: &Path) -> Result<(), AssetError> {
    let mut writer = BufWriter::new(File::create(path)?);
    match AssetFormat::from_path(path) {
        AssetFormat::Binary => write_binary(track, &mut writer)?,
        AssetFormat::Json => write_json(track, &mut writer)?,
    }
    writer.flush()?;
    log::info!("Saved reference track ({} windows) to {}", track.len(), path.display());
    Ok(())
}

pub fn load(path: &Path) -> Result<ReferenceTrack, AssetError> {
    let reader = BufReader::new(File::open(path)?);
    let track = match AssetFormat::from_path(path) {
        AssetFormat::Binary => read_binary(reader)?,
        AssetFormat::Json => read_json(reader)?,
    };
    log::info!(
        "Loaded reference track from {}: {} windows, hop {:.2} ms",
        path.display(),
        track.len(),
        track.hop_seconds() * 1000.0
    );
    Ok(track)
}

pub fn write_binary<W: Write>(track: &ReferenceTrack, writer: &mut W) -> Result<(), AssetError> {
    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    writer.write_all(&track.hop_seconds().to_le_bytes())?;
    writer.write_all(&(track.len() as u32).to_le_bytes())?;
    for pitch in track.pitches() {
        writer.write_all(&pitch.to_stored().to_le_bytes())?;
    }
    Ok(())
}

pub fn read_binary<R: Read>(mut reader: R) -> Result<ReferenceTrack, AssetError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    if bytes.len() < 4 || &bytes[..4] != MAGIC {
        return Err(AssetError::BadMagic);
    }
    if bytes.len() < HEADER_LEN {
        return Err(AssetError::TruncatedHeader(bytes.len()));
    }

    let version = u32::from_le_bytes(field(&bytes, 4));
    if version != VERSION {
        return Err(AssetError::UnsupportedVersion(version));
    }
    let hop_seconds = f64::from_le_bytes(field(&bytes, 8));
    let count = u32::from_le_bytes(field(&bytes, 16)) as usize;

    let body = &bytes[HEADER_LEN..];
    let found = body.len() / 4;
    if found < count {
        return Err(AssetError::Truncated { expected: count, found });
    }
    if body.len() > count * 4 {
        return Err(AssetError::TrailingData(body.len() - count * 4));
    }

    let pitches = body
        .chunks_exact(4)
        .map(|chunk| PitchEstimate::from_stored(f32::from_le_bytes(field(chunk, 0))))
        .collect();
    ReferenceTrack::new(hop_seconds, pitches)
}

pub fn write_json<W: Write>(track: &ReferenceTrack, writer: &mut W) -> Result<(), AssetError> {
    let asset = JsonAsset {
        hop_seconds: track.hop_seconds(),
        pitches_hz: track.pitches().iter().map(|p| p.to_stored()).collect(),
    };
    serde_json::to_writer(writer, &asset)?;
    Ok(())
}

pub fn read_json<R: Read>(reader: R) -> Result<ReferenceTrack, AssetError> {
    let asset: JsonAsset = serde_json::from_reader(reader)?;
    let pitches = asset
        .pitches_hz
        .into_iter()
        .map(PitchEstimate::from_stored)
        .collect();
    ReferenceTrack::new(asset.hop_seconds, pitches)
}

fn field<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}
