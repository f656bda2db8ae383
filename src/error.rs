// src/error.rs
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Failures of the tile-data codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64 tile data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("zlib stream error: {0}")]
    Zlib(#[source] std::io::Error),

    #[error("zstd stream error: {0}")]
    Zstd(#[source] std::io::Error),

    #[error("tile data holds {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("plain text tile data holds {actual} tiles, expected {expected}")]
    TileCountMismatch { expected: usize, actual: usize },

    #[error("unsupported tile compression: {0}")]
    UnsupportedCompression(String),

    #[error("unsupported tile encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("invalid {compression} compression level {level}")]
    InvalidLevel { compression: &'static str, level: i32 },

    #[error("invalid tile identifier in plain text data: {0:?}")]
    CorruptPlainText(String),
}

/// Recoverable failures while reading or writing save files.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("YAML error at {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("XML error at {path}: {message}")]
    Xml { path: PathBuf, message: String },

    #[error("no save format handles {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error("no save format registered with id {0}")]
    UnknownFormatId(String),

    #[error("{format} does not support {what}")]
    UnsupportedDirection {
        format: &'static str,
        what: &'static str,
    },

    #[error("property '{name}' has unsupported type '{kind}'")]
    UnsupportedPropertyType { name: String, kind: String },

    #[error("missing key '{key}' in {context}")]
    MissingKey { context: String, key: String },

    #[error("invalid value for '{key}' in {context}: {value}")]
    InvalidValue {
        context: String,
        key: String,
        value: String,
    },

    #[error("unsupported version {version} in {path}")]
    UnsupportedVersion { path: PathBuf, version: i64 },

    #[error("unsupported layer type '{0}'")]
    UnsupportedLayerType(String),

    #[error("unsupported object type '{0}'")]
    UnsupportedObjectType(String),

    #[error("file does not exist: {path}")]
    NoSuchFile { path: PathBuf },

    #[error("tile data of layer '{layer}' is corrupt: {source}")]
    TileData {
        layer: String,
        #[source]
        source: CodecError,
    },

    #[error("invalid map: {0}")]
    InvalidMap(String),
}

/// Rejected edits. These are expected during interactive use and leave the
/// document unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("the map must keep at least one row and one column")]
    MinimumExtent,

    #[error("no layer with uuid {0}")]
    UnknownLayer(Uuid),

    #[error("no object with uuid {0}")]
    UnknownObject(Uuid),

    #[error("no tileset with uuid {0}")]
    UnknownTileset(Uuid),

    #[error("layer {0} is not a tile layer")]
    NotATileLayer(Uuid),

    #[error("layer {0} is not an object layer")]
    NotAnObjectLayer(Uuid),

    #[error("layer {0} is not a group layer")]
    NotAGroupLayer(Uuid),

    #[error("layer {0} cannot be moved further")]
    CannotMove(Uuid),

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,
}
