// src/codec.rs
//! Tile layer payload codec, compatible with Tiled's base64 tile data.
//!
//! Tiles are flattened row-major, written as little-endian `i32`s, optionally
//! compressed with zlib or zstd and finally base64 encoded with the standard
//! padded alphabet.

use crate::error::CodecError;
use crate::matrix::{TileExtent, TileId, TileMatrix};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TileEncoding {
    #[default]
    PlainText,
    Base64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TileCompression {
    #[default]
    None,
    Zlib,
    Zstd,
}

impl TileEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            TileEncoding::PlainText => "plain",
            TileEncoding::Base64 => "base64",
        }
    }
}

impl TileCompression {
    pub fn as_str(self) -> &'static str {
        match self {
            TileCompression::None => "none",
            TileCompression::Zlib => "zlib",
            TileCompression::Zstd => "zstd",
        }
    }
}

impl fmt::Display for TileEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TileCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TileEncoding {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" | "plain-text" | "csv" => Ok(TileEncoding::PlainText),
            "base64" => Ok(TileEncoding::Base64),
            other => Err(CodecError::UnsupportedEncoding(other.to_owned())),
        }
    }
}

impl FromStr for TileCompression {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(TileCompression::None),
            "zlib" => Ok(TileCompression::Zlib),
            "zstd" => Ok(TileCompression::Zstd),
            other => Err(CodecError::UnsupportedCompression(other.to_owned())),
        }
    }
}

/// Per-map tile layer serialization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TileFormat {
    pub encoding: TileEncoding,
    pub compression: TileCompression,
    /// `None` selects the compressor's default level.
    pub compression_level: Option<i32>,
}

impl TileFormat {
    pub const fn plain() -> Self {
        Self {
            encoding: TileEncoding::PlainText,
            compression: TileCompression::None,
            compression_level: None,
        }
    }

    pub const fn base64(compression: TileCompression) -> Self {
        Self {
            encoding: TileEncoding::Base64,
            compression,
            compression_level: None,
        }
    }

    /// Plain text data can not be compressed, and levels must fit the
    /// selected compressor.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.encoding == TileEncoding::PlainText && self.compression != TileCompression::None
        {
            return Err(CodecError::UnsupportedCompression(format!(
                "{} with plain text encoding",
                self.compression
            )));
        }
        if let Some(level) = self.compression_level {
            match self.compression {
                TileCompression::Zlib if !(-1..=9).contains(&level) => {
                    return Err(CodecError::InvalidLevel {
                        compression: "zlib",
                        level,
                    })
                }
                TileCompression::Zstd if !zstd::compression_level_range().contains(&level) => {
                    return Err(CodecError::InvalidLevel {
                        compression: "zstd",
                        level,
                    })
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn tiles_to_bytes(tiles: &TileMatrix) -> Vec<u8> {
    let extent = tiles.extent();
    let mut bytes = Vec::with_capacity(extent.tile_count() * 4);
    for id in tiles.rows().iter().flatten() {
        bytes.extend_from_slice(&id.to_le_bytes());
    }
    bytes
}

fn bytes_to_tiles(bytes: &[u8], extent: TileExtent) -> Result<TileMatrix, CodecError> {
    let expected = extent.tile_count() * 4;
    if bytes.len() != expected {
        return Err(CodecError::SizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    let flat: Vec<TileId> = bytes
        .chunks_exact(4)
        .map(|b| TileId::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    TileMatrix::from_flat(extent, &flat).ok_or(CodecError::SizeMismatch {
        expected,
        actual: bytes.len(),
    })
}

fn compress(
    bytes: Vec<u8>,
    compression: TileCompression,
    level: Option<i32>,
) -> Result<Vec<u8>, CodecError> {
    match compression {
        TileCompression::None => Ok(bytes),
        TileCompression::Zlib => {
            let level = match level {
                Some(l) if l >= 0 => Compression::new(l as u32),
                _ => Compression::default(),
            };
            let mut encoder = ZlibEncoder::new(Vec::new(), level);
            encoder.write_all(&bytes).map_err(CodecError::Zlib)?;
            encoder.finish().map_err(CodecError::Zlib)
        }
        TileCompression::Zstd => {
            // Level 0 selects zstd's default.
            zstd::stream::encode_all(bytes.as_slice(), level.unwrap_or(0))
                .map_err(CodecError::Zstd)
        }
    }
}

fn decompress(bytes: Vec<u8>, compression: TileCompression) -> Result<Vec<u8>, CodecError> {
    match compression {
        TileCompression::None => Ok(bytes),
        TileCompression::Zlib => {
            let mut out = Vec::new();
            ZlibDecoder::new(bytes.as_slice())
                .read_to_end(&mut out)
                .map_err(CodecError::Zlib)?;
            Ok(out)
        }
        TileCompression::Zstd => {
            zstd::stream::decode_all(bytes.as_slice()).map_err(CodecError::Zstd)
        }
    }
}

/// Encodes `tiles` as base64 text, compressing first when requested.
pub fn encode_tiles(
    tiles: &TileMatrix,
    compression: TileCompression,
    level: Option<i32>,
) -> Result<String, CodecError> {
    TileFormat {
        encoding: TileEncoding::Base64,
        compression,
        compression_level: level,
    }
    .validate()?;
    let bytes = compress(tiles_to_bytes(tiles), compression, level)?;
    Ok(STANDARD.encode(bytes))
}

/// Reverses [`encode_tiles`]. Whitespace inside `text` is ignored, so
/// indented XML payloads decode as-is.
pub fn decode_tiles(
    text: &str,
    extent: TileExtent,
    compression: TileCompression,
) -> Result<TileMatrix, CodecError> {
    TileFormat::base64(compression).validate()?;
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let raw = STANDARD.decode(compact)?;
    let bytes = decompress(raw, compression)?;
    bytes_to_tiles(&bytes, extent)
}

/// Writes tiles as decimal text. Values within a row are joined by
/// `separator`; rows are joined by `row_separator`.
pub fn tiles_to_plain_text(tiles: &TileMatrix, separator: &str, row_separator: &str) -> String {
    tiles
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .map(TileId::to_string)
                .collect::<Vec<_>>()
                .join(separator)
        })
        .collect::<Vec<_>>()
        .join(row_separator)
}

/// Parses decimal tile text separated by commas and/or whitespace.
pub fn parse_plain_tiles(text: &str, extent: TileExtent) -> Result<TileMatrix, CodecError> {
    let flat = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<TileId>()
                .map_err(|_| CodecError::CorruptPlainText(token.to_owned()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    TileMatrix::from_flat(extent, &flat).ok_or(CodecError::TileCountMismatch {
        expected: extent.tile_count(),
        actual: flat.len(),
    })
}
