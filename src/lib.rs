//! Tilemap document model with undoable edits and Tactile/Tiled save formats.
//!
//! A [`Map`] is edited through [`Command`]s recorded on a [`CommandStack`],
//! converted to the format-neutral [`IrMap`] and written by one of the
//! handlers in a [`SaveFormatRegistry`].

pub mod codec;
pub mod command;
mod convert;
pub mod error;
pub mod format;
pub mod ir_map;
pub mod layer;
pub mod map;
pub mod matrix;
pub mod object;
pub mod property;
pub mod settings;
pub mod tileset;
pub mod tileset_bundle;

pub use codec::{TileCompression, TileEncoding, TileFormat};
pub use command::{Command, CommandStack};
pub use error::{CodecError, EditError, MapError};
pub use format::{ReadOptions, SaveFormat, SaveFormatId, SaveFormatRegistry, WriteOptions};
pub use ir_map::IrMap;
pub use layer::{Layer, LayerKind, LayerType};
pub use map::Map;
pub use matrix::{TileExtent, TileId, TileMatrix, TilePos, EMPTY_TILE};
pub use object::{Object, ObjectKind};
pub use property::{Color, Metadata, Properties, PropertyType, PropertyValue};
pub use settings::EditorSettings;
pub use tileset::{NullTextureLoader, TextureLoader, Tileset};
pub use tileset_bundle::{TilesetBundle, TilesetRef};
