// src/format/mod.rs
//! Save-format handlers and the registry that dispatches to them.
//!
//! Every handler translates between its on-disk grammar and the format
//! agnostic [`IrMap`]/[`IrTileset`] types. The registry picks a handler by
//! file extension when loading and by [`SaveFormatId`] when saving.

pub mod tactile_yaml;
pub mod tiled_json;
pub mod tiled_xml;
mod xml_tree;

use crate::codec::{self, TileEncoding, TileFormat};
use crate::error::{CodecError, MapError};
use crate::ir_map::{IrMap, IrTileset};
use crate::matrix::{TileExtent, TileMatrix};
use crate::property::{Metadata, PropertyType, PropertyValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use tactile_yaml::TactileYamlFormat;
pub use tiled_json::TiledJsonFormat;
pub use tiled_xml::TiledXmlFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveFormatId {
    #[default]
    TactileYaml,
    TiledJson,
    TiledXml,
}

impl SaveFormatId {
    pub fn as_str(self) -> &'static str {
        match self {
            SaveFormatId::TactileYaml => "tactile-yaml",
            SaveFormatId::TiledJson => "tiled-json",
            SaveFormatId::TiledXml => "tiled-xml",
        }
    }

    /// Extension used for map files written in this format.
    pub fn map_extension(self) -> &'static str {
        match self {
            SaveFormatId::TactileYaml => "yaml",
            SaveFormatId::TiledJson => "tmj",
            SaveFormatId::TiledXml => "tmx",
        }
    }

    /// Extension used for external tileset files.
    pub fn tileset_extension(self) -> &'static str {
        match self {
            SaveFormatId::TactileYaml => "yaml",
            SaveFormatId::TiledJson => "json",
            SaveFormatId::TiledXml => "tsx",
        }
    }
}

impl fmt::Display for SaveFormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Directory relative image and tileset paths are resolved against.
    pub base_dir: PathBuf,
    /// Turns missing keys and missing tileset images into hard errors.
    pub strict_mode: bool,
}

impl ReadOptions {
    /// Options anchored at the directory containing `path`.
    pub fn for_file(path: &Path) -> Self {
        Self {
            base_dir: parent_dir(path),
            strict_mode: false,
        }
    }

    /// Unwraps a key the emitters always write. In strict mode a missing key
    /// is an error, otherwise `default` is used.
    pub(crate) fn require<T>(
        &self,
        value: Option<T>,
        context: &str,
        key: &str,
        default: T,
    ) -> Result<T, MapError> {
        match value {
            Some(value) => Ok(value),
            None if self.strict_mode => Err(MapError::MissingKey {
                context: context.to_owned(),
                key: key.to_owned(),
            }),
            None => {
                debug!("{context} has no '{key}', using the default");
                Ok(default)
            }
        }
    }

    /// Resolves a path read from a file in `base_dir`.
    pub(crate) fn resolve(&self, relative: &str) -> PathBuf {
        self.base_dir.join(relative)
    }

    /// Options for files referenced from a file in `base_dir`, anchored at
    /// the directory of `path`.
    pub(crate) fn nested(&self, path: &Path) -> Self {
        Self {
            base_dir: parent_dir(path),
            strict_mode: self.strict_mode,
        }
    }

    /// A missing tileset image only fails strict reads.
    pub(crate) fn check_image(&self, path: &Path) -> Result<(), MapError> {
        if path.exists() {
            Ok(())
        } else if self.strict_mode {
            Err(MapError::NoSuchFile {
                path: path.to_path_buf(),
            })
        } else {
            warn!("tileset image {} does not exist", path.display());
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Directory written paths are made relative to, and where external
    /// tileset files are placed.
    pub base_dir: PathBuf,
    pub use_external_tilesets: bool,
    pub use_indentation: bool,
    /// Writes plain text tile data one row per line.
    pub fold_tile_layer_data: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::new(),
            use_external_tilesets: false,
            use_indentation: true,
            fold_tile_layer_data: false,
        }
    }
}

impl WriteOptions {
    pub fn for_file(path: &Path) -> Self {
        Self {
            base_dir: parent_dir(path),
            ..Self::default()
        }
    }
}

/// One on-disk format. A handler may refuse a direction by returning
/// [`MapError::UnsupportedDirection`].
pub trait SaveFormat: Send + Sync {
    fn id(&self) -> SaveFormatId;

    /// `extension` comes without the leading dot, in any case.
    fn is_valid_extension(&self, extension: &str) -> bool;

    fn load_map(&self, path: &Path, options: &ReadOptions) -> Result<IrMap, MapError>;

    fn load_tileset(&self, path: &Path, options: &ReadOptions) -> Result<IrTileset, MapError>;

    fn save_map(&self, path: &Path, map: &IrMap, options: &WriteOptions) -> Result<(), MapError>;

    fn save_tileset(
        &self,
        path: &Path,
        tileset: &IrTileset,
        options: &WriteOptions,
    ) -> Result<(), MapError>;
}

/// Registered save formats, consulted in registration order.
#[derive(Clone, Default)]
pub struct SaveFormatRegistry {
    formats: Vec<Arc<dyn SaveFormat>>,
}

impl fmt::Debug for SaveFormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.formats.iter().map(|format| format.id()))
            .finish()
    }
}

impl SaveFormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the Tactile YAML, Tiled JSON and Tiled XML handlers.
    pub fn with_builtin_formats() -> Self {
        let mut registry = Self::new();
        registry.add_format(Arc::new(TactileYamlFormat));
        registry.add_format(Arc::new(TiledJsonFormat));
        registry.add_format(Arc::new(TiledXmlFormat));
        registry
    }

    pub fn add_format(&mut self, format: Arc<dyn SaveFormat>) {
        debug!("registered save format {}", format.id());
        self.formats.push(format);
    }

    /// Unregisters the first handler with `id` and hands it back.
    pub fn remove_format(&mut self, id: SaveFormatId) -> Option<Arc<dyn SaveFormat>> {
        let index = self.formats.iter().position(|f| f.id() == id)?;
        Some(self.formats.remove(index))
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn format(&self, id: SaveFormatId) -> Option<&dyn SaveFormat> {
        self.formats
            .iter()
            .find(|f| f.id() == id)
            .map(|f| f.as_ref())
    }

    /// First handler accepting the extension of `path`.
    pub fn format_for_path(&self, path: &Path) -> Option<&dyn SaveFormat> {
        let extension = path.extension()?.to_string_lossy().to_ascii_lowercase();
        self.formats
            .iter()
            .find(|f| f.is_valid_extension(&extension))
            .map(|f| f.as_ref())
    }

    fn format_for_load(&self, path: &Path) -> Result<&dyn SaveFormat, MapError> {
        self.format_for_path(path)
            .ok_or_else(|| MapError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
    }

    fn format_for_save(&self, id: SaveFormatId) -> Result<&dyn SaveFormat, MapError> {
        self.format(id)
            .ok_or_else(|| MapError::UnknownFormatId(id.to_string()))
    }

    pub fn load_map(&self, path: &Path, options: &ReadOptions) -> Result<IrMap, MapError> {
        let format = self.format_for_load(path)?;
        info!("loading map {} as {}", path.display(), format.id());
        format.load_map(path, options)
    }

    pub fn load_tileset(&self, path: &Path, options: &ReadOptions) -> Result<IrTileset, MapError> {
        let format = self.format_for_load(path)?;
        info!("loading tileset {} as {}", path.display(), format.id());
        format.load_tileset(path, options)
    }

    /// Saves with the handler registered for `id`, whatever the extension of
    /// `path` says. Missing parent directories are created first.
    pub fn save_map(
        &self,
        id: SaveFormatId,
        path: &Path,
        map: &IrMap,
        options: &WriteOptions,
    ) -> Result<(), MapError> {
        let format = self.format_for_save(id)?;
        create_parent_dir(path)?;
        info!("saving map {} as {}", path.display(), id);
        format.save_map(path, map, options)
    }

    pub fn save_tileset(
        &self,
        id: SaveFormatId,
        path: &Path,
        tileset: &IrTileset,
        options: &WriteOptions,
    ) -> Result<(), MapError> {
        let format = self.format_for_save(id)?;
        create_parent_dir(path)?;
        info!("saving tileset {} as {}", path.display(), id);
        format.save_tileset(path, tileset, options)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn create_parent_dir(path: &Path) -> Result<(), MapError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir).map_err(|source| MapError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

pub(crate) fn read_text(path: &Path) -> Result<String, MapError> {
    std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            MapError::NoSuchFile {
                path: path.to_path_buf(),
            }
        } else {
            MapError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

pub(crate) fn write_text(path: &Path, text: &str) -> Result<(), MapError> {
    std::fs::write(path, text).map_err(|source| MapError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Unwraps a key no format can do without, strict mode or not.
pub(crate) fn required<T>(value: Option<T>, context: &str, key: &str) -> Result<T, MapError> {
    value.ok_or_else(|| MapError::MissingKey {
        context: context.to_owned(),
        key: key.to_owned(),
    })
}

/// Tile layer payload as text, plain or base64 according to `format`.
pub(crate) fn encode_layer_data(
    tiles: &TileMatrix,
    format: &TileFormat,
    separator: &str,
    row_separator: &str,
) -> Result<String, CodecError> {
    match format.encoding {
        TileEncoding::PlainText => Ok(codec::tiles_to_plain_text(tiles, separator, row_separator)),
        TileEncoding::Base64 => {
            codec::encode_tiles(tiles, format.compression, format.compression_level)
        }
    }
}

pub(crate) fn decode_layer_data(
    text: &str,
    extent: TileExtent,
    format: &TileFormat,
) -> Result<TileMatrix, CodecError> {
    match format.encoding {
        TileEncoding::PlainText => codec::parse_plain_tiles(text, extent),
        TileEncoding::Base64 => codec::decode_tiles(text, extent, format.compression),
    }
}

/// Shortest decimal form of `value` widened to `f64`, so `0.1f32` is
/// written as `0.1` rather than `0.10000000149011612`.
pub(crate) fn widen_f32(value: f32) -> f64 {
    value.to_string().parse().unwrap_or(f64::from(value))
}

/// Path property values are stored with forward slashes.
pub(crate) fn slash_separated(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Tiled's name for the type of `value`. Vector values have no Tiled
/// counterpart and are rejected.
pub(crate) fn tiled_property_type(name: &str, value: &PropertyValue) -> Result<&'static str, MapError> {
    match value.kind() {
        PropertyType::Path => Ok("file"),
        kind if kind.is_vector() => Err(MapError::UnsupportedPropertyType {
            name: name.to_owned(),
            kind: kind.name().to_owned(),
        }),
        kind => Ok(kind.name()),
    }
}

/// Tiled files have no place for components.
pub(crate) fn warn_dropped_components(meta: &Metadata, context: &str, format: SaveFormatId) {
    if !meta.components.is_empty() {
        warn!(
            "{} components of {context} are not stored in {format} files",
            meta.components.len()
        );
    }
}

/// File name of an external tileset written next to the map.
pub(crate) fn external_tileset_name(tileset: &IrTileset, id: SaveFormatId) -> String {
    format!("{}.{}", tileset.name, id.tileset_extension())
}

/// `target` relative to `base` with forward slashes, for paths stored in
/// save files. Paths with nothing in common are written unchanged.
pub(crate) fn relative_path(target: &Path, base: &Path) -> String {
    fn to_parts(path: &Path) -> Vec<Component<'_>> {
        path.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }
    let target_parts = to_parts(target);
    let base_parts = to_parts(base);

    let common = target_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let unrelated = target.is_absolute() != base.is_absolute()
        || (target.is_absolute() && common == 0);
    if unrelated {
        return slash_path(&target_parts);
    }

    let mut parts = vec!["..".to_owned(); base_parts.len() - common];
    parts.extend(
        target_parts[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

fn slash_path(parts: &[Component<'_>]) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            Component::RootDir => out.push('/'),
            Component::Prefix(p) => out.push_str(&p.as_os_str().to_string_lossy()),
            other => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(&other.as_os_str().to_string_lossy());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_use_forward_slashes() {
        let base = Path::new("/maps/level1");
        assert_eq!(
            relative_path(Path::new("/maps/level1/tiles/grass.png"), base),
            "tiles/grass.png"
        );
        assert_eq!(
            relative_path(Path::new("/maps/shared/grass.png"), base),
            "../shared/grass.png"
        );
        assert_eq!(relative_path(Path::new("grass.png"), Path::new("")), "grass.png");
        assert_eq!(
            relative_path(Path::new("./out/grass.png"), Path::new("out")),
            "grass.png"
        );
    }

    #[test]
    fn relative_path_keeps_unrelated_paths() {
        assert_eq!(
            relative_path(Path::new("assets/grass.png"), Path::new("/maps")),
            "assets/grass.png"
        );
    }

    #[test]
    fn builtin_registry_routes_by_extension() {
        let registry = SaveFormatRegistry::with_builtin_formats();
        let id_of = |name: &str| registry.format_for_path(Path::new(name)).map(|f| f.id());
        assert_eq!(id_of("a.yaml"), Some(SaveFormatId::TactileYaml));
        assert_eq!(id_of("a.YML"), Some(SaveFormatId::TactileYaml));
        assert_eq!(id_of("a.tmj"), Some(SaveFormatId::TiledJson));
        assert_eq!(id_of("a.json"), Some(SaveFormatId::TiledJson));
        assert_eq!(id_of("a.tmx"), Some(SaveFormatId::TiledXml));
        assert_eq!(id_of("a.tsx"), Some(SaveFormatId::TiledXml));
        assert_eq!(id_of("a.xml"), Some(SaveFormatId::TiledXml));
        assert_eq!(id_of("a.png"), None);
        assert_eq!(id_of("no_extension"), None);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let registry = SaveFormatRegistry::with_builtin_formats();
        let err = registry
            .load_map(Path::new("map.txt"), &ReadOptions::default())
            .unwrap_err();
        assert!(matches!(err, MapError::UnsupportedFormat { ref path } if path == Path::new("map.txt")));
    }

    #[test]
    fn removed_format_is_handed_back() {
        let mut registry = SaveFormatRegistry::with_builtin_formats();
        let removed = registry.remove_format(SaveFormatId::TiledJson).unwrap();
        assert_eq!(removed.id(), SaveFormatId::TiledJson);
        assert_eq!(registry.len(), 2);
        assert!(registry.format_for_path(Path::new("a.tmj")).is_none());
        assert!(registry.remove_format(SaveFormatId::TiledJson).is_none());
    }

    #[test]
    fn strict_require_reports_missing_key() {
        let strict = ReadOptions {
            base_dir: PathBuf::new(),
            strict_mode: true,
        };
        let err = strict.require::<i32>(None, "map", "tile-width", 32).unwrap_err();
        assert!(matches!(err, MapError::MissingKey { ref key, .. } if key == "tile-width"));
        assert_eq!(ReadOptions::default().require(None, "map", "tile-width", 32).unwrap(), 32);
    }
}
