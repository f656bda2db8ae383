// src/format/tiled_json.rs
//! Tiled JSON maps (`.tmj`, `.json`) and tilesets.
//!
//! Only finite orthogonal maps are supported. Components have no Tiled
//! counterpart and are dropped with a warning when saving.

use super::{
    decode_layer_data, encode_layer_data, external_tileset_name, file_stem, read_text, relative_path,
    required, slash_separated, tiled_property_type, warn_dropped_components, widen_f32, write_text,
    ReadOptions, SaveFormat, SaveFormatId, WriteOptions,
};
use crate::codec::{TileCompression, TileEncoding, TileFormat};
use crate::error::{CodecError, MapError};
use crate::ir_map::{
    IrAnimationFrame, IrLayer, IrLayerKind, IrMap, IrObject, IrTile, IrTileset, IrTilesetRef,
};
use crate::matrix::{TileExtent, TileId, TileMatrix};
use crate::object::ObjectKind;
use crate::property::{Color, Metadata, Properties, PropertyType, PropertyValue};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const TILED_VERSION: &str = "1.10.2";
const FORMAT_VERSION: &str = "1.10";

#[derive(Debug, Clone, Copy, Default)]
pub struct TiledJsonFormat;

fn default_true() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &f32) -> bool {
    *value == 0.0
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonMap {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tiledversion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    orientation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    renderorder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    infinite: Option<bool>,
    width: Option<usize>,
    height: Option<usize>,
    tilewidth: Option<i32>,
    tileheight: Option<i32>,
    nextlayerid: Option<i32>,
    nextobjectid: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compressionlevel: Option<i32>,
    #[serde(default)]
    layers: Vec<JsonLayer>,
    #[serde(default)]
    tilesets: Vec<JsonTilesetEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonLayer {
    id: Option<i32>,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    opacity: Option<f32>,
    visible: Option<bool>,
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    height: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    draworder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    objects: Option<Vec<JsonObject>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    layers: Option<Vec<JsonLayer>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonObject {
    id: Option<i32>,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", alias = "class", default)]
    tag: String,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
    #[serde(default, skip_serializing_if = "is_zero")]
    rotation: f32,
    #[serde(default = "default_true")]
    visible: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    point: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    ellipse: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonProperty {
    name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<JsonValue>,
}

/// Entry of a map's `tilesets` array: either `firstgid` + `source`, or
/// `firstgid` + an inline tileset.
#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonTilesetEntry {
    firstgid: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(flatten)]
    tileset: JsonTileset,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonTileset {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tiledversion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    columns: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tilewidth: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tileheight: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tilecount: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imagewidth: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imageheight: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    margin: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spacing: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tiles: Vec<JsonTile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonTile {
    id: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    animation: Vec<JsonFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    objectgroup: Option<JsonObjectGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<JsonProperty>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonFrame {
    tileid: Option<i32>,
    duration: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonObjectGroup {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    draworder: Option<String>,
    #[serde(default)]
    objects: Vec<JsonObject>,
}

// ---------------------------------------------------------------------------
// Properties

fn property_from_json(
    property: JsonProperty,
    context: &str,
    options: &ReadOptions,
) -> Result<(String, PropertyValue), MapError> {
    let JsonProperty { name, kind, value } = property;
    let type_name = kind.unwrap_or_else(|| "string".to_owned());
    let kind = PropertyType::from_name(&type_name).ok_or_else(|| {
        MapError::UnsupportedPropertyType {
            name: name.clone(),
            kind: type_name.clone(),
        }
    })?;

    let Some(value) = value else {
        let fallback = options.require(
            None,
            &format!("property '{name}' of {context}"),
            "value",
            PropertyValue::default_of(kind),
        )?;
        return Ok((name, fallback));
    };

    let int = || value.as_i64().and_then(|v| i32::try_from(v).ok());
    let parsed = match kind {
        PropertyType::Str => value.as_str().map(|s| PropertyValue::String(s.to_owned())),
        PropertyType::Int => int().map(PropertyValue::Int),
        PropertyType::Float => value.as_f64().map(|v| PropertyValue::Float(v as f32)),
        PropertyType::Bool => value.as_bool().map(PropertyValue::Bool),
        PropertyType::Path => value.as_str().map(|s| PropertyValue::Path(PathBuf::from(s))),
        PropertyType::Color => value
            .as_str()
            .and_then(Color::from_argb_hex)
            .map(PropertyValue::Color),
        PropertyType::Object => int().map(PropertyValue::Object),
        vector => value
            .as_str()
            .and_then(|s| PropertyValue::parse_vector(vector, s)),
    };
    let parsed = parsed.ok_or_else(|| MapError::InvalidValue {
        context: context.to_owned(),
        key: name.clone(),
        value: value.to_string(),
    })?;
    Ok((name, parsed))
}

fn properties_from_json(
    items: Vec<JsonProperty>,
    context: &str,
    options: &ReadOptions,
) -> Result<Properties, MapError> {
    items
        .into_iter()
        .map(|p| property_from_json(p, context, options))
        .collect()
}

fn meta_from_json(
    items: Vec<JsonProperty>,
    context: &str,
    options: &ReadOptions,
) -> Result<Metadata, MapError> {
    Ok(Metadata {
        properties: properties_from_json(items, context, options)?,
        components: Default::default(),
    })
}

fn properties_to_json(meta: &Metadata, context: &str) -> Result<Vec<JsonProperty>, MapError> {
    warn_dropped_components(meta, context, SaveFormatId::TiledJson);
    meta.properties
        .iter()
        .map(|(name, value)| {
            let kind = tiled_property_type(name, value)?;
            let value = match value {
                PropertyValue::String(s) => JsonValue::from(s.as_str()),
                PropertyValue::Int(v) | PropertyValue::Object(v) => JsonValue::from(*v),
                PropertyValue::Float(v) => JsonValue::from(widen_f32(*v)),
                PropertyValue::Bool(b) => JsonValue::from(*b),
                PropertyValue::Path(p) => JsonValue::from(slash_separated(p)),
                PropertyValue::Color(c) => JsonValue::from(c.to_argb_hex()),
                // Vectors were rejected by `tiled_property_type`.
                _ => JsonValue::Null,
            };
            Ok(JsonProperty {
                name: name.to_owned(),
                kind: Some(kind.to_owned()),
                value: Some(value),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parsing

fn object_from_json(object: JsonObject, options: &ReadOptions) -> Result<IrObject, MapError> {
    let id = options.require(object.id, "object", "id", 0)?;
    let context = format!("object {id}");
    let kind = if object.point {
        ObjectKind::Point
    } else if object.ellipse {
        ObjectKind::Ellipse
    } else {
        ObjectKind::Rect
    };
    Ok(IrObject {
        meta: meta_from_json(object.properties, &context, options)?,
        id,
        kind,
        x: object.x,
        y: object.y,
        width: object.width,
        height: object.height,
        name: object.name,
        tag: object.tag,
        visible: object.visible,
    })
}

fn objects_from_json(
    objects: Vec<JsonObject>,
    options: &ReadOptions,
) -> Result<Vec<IrObject>, MapError> {
    objects
        .into_iter()
        .map(|o| object_from_json(o, options))
        .collect()
}

struct LayerParser<'a> {
    options: &'a ReadOptions,
    extent: TileExtent,
    /// Encoding of the first tile layer, which becomes the map's format.
    detected: Option<TileFormat>,
}

impl LayerParser<'_> {
    fn tile_format(
        &self,
        encoding: Option<&str>,
        compression: Option<&str>,
    ) -> Result<TileFormat, CodecError> {
        let encoding: TileEncoding = encoding.unwrap_or("csv").parse()?;
        let compression: TileCompression = compression.unwrap_or("").parse()?;
        Ok(TileFormat {
            encoding,
            compression,
            compression_level: None,
        })
    }

    fn tiles(
        &mut self,
        data: Option<JsonValue>,
        encoding: Option<&str>,
        compression: Option<&str>,
        context: &str,
    ) -> Result<TileMatrix, CodecError> {
        let format = self.tile_format(encoding, compression)?;
        if self.detected.is_none() {
            self.detected = Some(format);
        }
        match data {
            Some(JsonValue::String(text)) => decode_layer_data(&text, self.extent, &format),
            Some(JsonValue::Array(items)) => {
                let flat = items
                    .iter()
                    .map(|item| {
                        item.as_i64()
                            .and_then(|v| TileId::try_from(v).ok())
                            .ok_or_else(|| CodecError::CorruptPlainText(item.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                TileMatrix::from_flat(self.extent, &flat).ok_or(CodecError::TileCountMismatch {
                    expected: self.extent.tile_count(),
                    actual: flat.len(),
                })
            }
            Some(other) => Err(CodecError::CorruptPlainText(other.to_string())),
            None => {
                warn!("{context} has no tile data, leaving it empty");
                Ok(TileMatrix::new(self.extent))
            }
        }
    }

    fn layer(&mut self, layer: JsonLayer) -> Result<IrLayer, MapError> {
        let options = self.options;
        let id = options.require(layer.id, "layer", "id", 0)?;
        let name = options.require(layer.name, &format!("layer {id}"), "name", String::new())?;
        let context = format!("layer '{name}'");
        let type_name = required(layer.kind, &context, "type")?;

        let kind = match type_name.as_str() {
            "tilelayer" => {
                let dims = [
                    ("height", layer.height, self.extent.rows),
                    ("width", layer.width, self.extent.cols),
                ];
                if let Some((key, actual, _)) = dims
                    .into_iter()
                    .find(|&(_, actual, expected)| actual.is_some_and(|v| v != expected))
                {
                    return Err(MapError::InvalidValue {
                        context,
                        key: key.to_owned(),
                        value: actual.unwrap_or_default().to_string(),
                    });
                }
                if layer.data.is_none() {
                    options.require(None, &context, "data", ())?;
                }
                let tiles = self
                    .tiles(
                        layer.data,
                        layer.encoding.as_deref(),
                        layer.compression.as_deref(),
                        &context,
                    )
                    .map_err(|source| MapError::TileData {
                        layer: name.clone(),
                        source,
                    })?;
                IrLayerKind::Tiles { tiles }
            }
            "objectgroup" => IrLayerKind::Objects {
                objects: objects_from_json(layer.objects.unwrap_or_default(), options)?,
            },
            "group" => IrLayerKind::Group {
                layers: layer
                    .layers
                    .unwrap_or_default()
                    .into_iter()
                    .map(|child| self.layer(child))
                    .collect::<Result<_, _>>()?,
            },
            other => return Err(MapError::UnsupportedLayerType(other.to_owned())),
        };

        Ok(IrLayer {
            meta: meta_from_json(layer.properties, &context, options)?,
            id,
            opacity: options.require(layer.opacity, &context, "opacity", 1.0)?,
            visible: options.require(layer.visible, &context, "visible", true)?,
            name,
            kind,
        })
    }
}

fn tileset_from_json(
    tileset: JsonTileset,
    fallback_name: String,
    is_embedded: bool,
    options: &ReadOptions,
) -> Result<IrTileset, MapError> {
    let name = options.require(tileset.name, "tileset", "name", fallback_name)?;
    let context = format!("tileset '{name}'");
    if tileset.margin.unwrap_or(0) != 0 || tileset.spacing.unwrap_or(0) != 0 {
        warn!("{context} uses margin or spacing, which is ignored");
    }

    let tile_count = required(tileset.tilecount, &context, "tilecount")?;
    let image = required(tileset.image, &context, "image")?;
    let image_path = options.resolve(&image);
    options.check_image(&image_path)?;

    let mut tiles = Vec::with_capacity(tileset.tiles.len());
    for tile in tileset.tiles {
        let index = required(tile.id, &context, "id")?;
        let tile_context = format!("tile {index} of {context}");
        if !(0..tile_count).contains(&index) {
            return Err(MapError::InvalidValue {
                context: tile_context,
                key: "id".to_owned(),
                value: index.to_string(),
            });
        }
        let animation = tile
            .animation
            .into_iter()
            .map(|frame| {
                Ok(IrAnimationFrame {
                    tile_index: required(frame.tileid, &tile_context, "tileid")?,
                    duration_ms: required(frame.duration, &tile_context, "duration")?,
                })
            })
            .collect::<Result<_, MapError>>()?;
        let objects = match tile.objectgroup {
            Some(group) => objects_from_json(group.objects, options)?,
            None => Vec::new(),
        };
        tiles.push(IrTile {
            index,
            meta: meta_from_json(tile.properties, &tile_context, options)?,
            objects,
            animation,
        });
    }
    tiles.sort_by_key(|t| t.index);

    Ok(IrTileset {
        meta: meta_from_json(tileset.properties, &context, options)?,
        tile_width: required(tileset.tilewidth, &context, "tilewidth")?,
        tile_height: required(tileset.tileheight, &context, "tileheight")?,
        tile_count,
        column_count: required(tileset.columns, &context, "columns")?,
        image_path,
        image_width: options.require(tileset.imagewidth, &context, "imagewidth", 0)?,
        image_height: options.require(tileset.imageheight, &context, "imageheight", 0)?,
        tiles,
        is_embedded,
        name,
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(path: &Path, text: &str) -> Result<T, MapError> {
    serde_json::from_str(text).map_err(|source| MapError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn read_tileset_file(path: &Path, options: &ReadOptions) -> Result<IrTileset, MapError> {
    let tileset: JsonTileset = parse_json(path, &read_text(path)?)?;
    tileset_from_json(tileset, file_stem(path), false, options)
}

fn parse_map(doc: JsonMap, path: &Path, options: &ReadOptions) -> Result<IrMap, MapError> {
    let invalid = |key: &str, value: String| MapError::InvalidValue {
        context: "map".to_owned(),
        key: key.to_owned(),
        value,
    };
    if let Some(kind) = doc.kind.filter(|k| k != "map") {
        return Err(invalid("type", kind));
    }
    if let Some(orientation) = doc.orientation.filter(|o| o != "orthogonal") {
        return Err(invalid("orientation", orientation));
    }
    if doc.infinite == Some(true) {
        return Err(MapError::InvalidMap(format!(
            "{} is an infinite map",
            path.display()
        )));
    }

    let col_count = required(doc.width, "map", "width")?;
    let row_count = required(doc.height, "map", "height")?;
    let extent = TileExtent::new(row_count, col_count);
    if extent.is_empty() {
        return Err(MapError::InvalidMap(format!(
            "{} has an empty extent {row_count}x{col_count}",
            path.display()
        )));
    }

    let mut tilesets = Vec::with_capacity(doc.tilesets.len());
    for entry in doc.tilesets {
        let first_tile_id = required(entry.firstgid, "tileset reference", "firstgid")?;
        let tileset = match entry.source {
            Some(source) => {
                let source = options.resolve(&source);
                read_tileset_file(&source, &options.nested(&source))?
            }
            None => tileset_from_json(entry.tileset, String::new(), true, options)?,
        };
        tilesets.push(IrTilesetRef {
            first_tile_id,
            tileset,
        });
    }
    tilesets.sort_by_key(|t| t.first_tile_id);

    let mut parser = LayerParser {
        options,
        extent,
        detected: None,
    };
    let layers = doc
        .layers
        .into_iter()
        .map(|layer| parser.layer(layer))
        .collect::<Result<Vec<_>, _>>()?;

    let mut tile_format = parser.detected.unwrap_or_else(TileFormat::plain);
    if tile_format.compression != TileCompression::None {
        tile_format.compression_level = doc.compressionlevel.filter(|&level| level != -1);
    }
    tile_format
        .validate()
        .map_err(|e| MapError::InvalidMap(format!("tile format: {e}")))?;

    Ok(IrMap {
        meta: meta_from_json(doc.properties, "map", options)?,
        row_count,
        col_count,
        tile_width: options.require(doc.tilewidth, "map", "tilewidth", 32)?,
        tile_height: options.require(doc.tileheight, "map", "tileheight", 32)?,
        next_layer_id: options.require(doc.nextlayerid, "map", "nextlayerid", 1)?,
        next_object_id: options.require(doc.nextobjectid, "map", "nextobjectid", 1)?,
        tile_format,
        component_definitions: Vec::new(),
        tilesets,
        layers,
    })
}

// ---------------------------------------------------------------------------
// Emitting

fn object_to_json(object: &IrObject) -> Result<JsonObject, MapError> {
    Ok(JsonObject {
        id: Some(object.id),
        name: object.name.clone(),
        tag: object.tag.clone(),
        x: object.x,
        y: object.y,
        width: object.width,
        height: object.height,
        rotation: 0.0,
        visible: object.visible,
        point: object.kind == ObjectKind::Point,
        ellipse: object.kind == ObjectKind::Ellipse,
        properties: properties_to_json(&object.meta, &format!("object {}", object.id))?,
    })
}

fn objects_to_json(objects: &[IrObject]) -> Result<Vec<JsonObject>, MapError> {
    objects.iter().map(object_to_json).collect()
}

fn layer_to_json(layer: &IrLayer, map: &IrMap) -> Result<JsonLayer, MapError> {
    let context = format!("layer '{}'", layer.name);
    let mut out = JsonLayer {
        id: Some(layer.id),
        name: Some(layer.name.clone()),
        opacity: Some(layer.opacity),
        visible: Some(layer.visible),
        properties: properties_to_json(&layer.meta, &context)?,
        ..JsonLayer::default()
    };
    match &layer.kind {
        IrLayerKind::Tiles { tiles } => {
            let format = &map.tile_format;
            out.kind = Some("tilelayer".to_owned());
            out.width = Some(map.col_count);
            out.height = Some(map.row_count);
            out.data = Some(match format.encoding {
                TileEncoding::PlainText => JsonValue::from(tiles.to_flat()),
                TileEncoding::Base64 => {
                    out.encoding = Some("base64".to_owned());
                    if format.compression != TileCompression::None {
                        out.compression = Some(format.compression.as_str().to_owned());
                    }
                    let text = encode_layer_data(tiles, format, "", "").map_err(|source| {
                        MapError::TileData {
                            layer: layer.name.clone(),
                            source,
                        }
                    })?;
                    JsonValue::from(text)
                }
            });
        }
        IrLayerKind::Objects { objects } => {
            out.kind = Some("objectgroup".to_owned());
            out.draworder = Some("topdown".to_owned());
            out.objects = Some(objects_to_json(objects)?);
        }
        IrLayerKind::Group { layers } => {
            out.kind = Some("group".to_owned());
            out.layers = Some(
                layers
                    .iter()
                    .map(|child| layer_to_json(child, map))
                    .collect::<Result<_, _>>()?,
            );
        }
    }
    Ok(out)
}

fn tileset_to_json(tileset: &IrTileset, dir: &Path) -> Result<JsonTileset, MapError> {
    let context = format!("tileset '{}'", tileset.name);
    let tiles = tileset
        .tiles
        .iter()
        .map(|tile| {
            let objectgroup = if tile.objects.is_empty() {
                None
            } else {
                Some(JsonObjectGroup {
                    kind: Some("objectgroup".to_owned()),
                    draworder: Some("index".to_owned()),
                    objects: objects_to_json(&tile.objects)?,
                })
            };
            Ok(JsonTile {
                id: Some(tile.index),
                animation: tile
                    .animation
                    .iter()
                    .map(|frame| JsonFrame {
                        tileid: Some(frame.tile_index),
                        duration: Some(frame.duration_ms),
                    })
                    .collect(),
                objectgroup,
                properties: properties_to_json(
                    &tile.meta,
                    &format!("tile {} of {context}", tile.index),
                )?,
            })
        })
        .collect::<Result<_, MapError>>()?;

    Ok(JsonTileset {
        name: Some(tileset.name.clone()),
        columns: Some(tileset.column_count),
        tilewidth: Some(tileset.tile_width),
        tileheight: Some(tileset.tile_height),
        tilecount: Some(tileset.tile_count),
        image: Some(relative_path(&tileset.image_path, dir)),
        imagewidth: Some(tileset.image_width),
        imageheight: Some(tileset.image_height),
        margin: Some(0),
        spacing: Some(0),
        tiles,
        properties: properties_to_json(&tileset.meta, &context)?,
        ..JsonTileset::default()
    })
}

fn external_tileset_to_json(tileset: &IrTileset, dir: &Path) -> Result<JsonTileset, MapError> {
    Ok(JsonTileset {
        kind: Some("tileset".to_owned()),
        version: Some(JsonValue::from(FORMAT_VERSION)),
        tiledversion: Some(TILED_VERSION.to_owned()),
        ..tileset_to_json(tileset, dir)?
    })
}

fn to_json<T: Serialize>(path: &Path, doc: &T, options: &WriteOptions) -> Result<String, MapError> {
    let text = if options.use_indentation {
        serde_json::to_string_pretty(doc)
    } else {
        serde_json::to_string(doc)
    };
    text.map_err(|source| MapError::Json {
        path: path.to_path_buf(),
        source,
    })
}

impl SaveFormat for TiledJsonFormat {
    fn id(&self) -> SaveFormatId {
        SaveFormatId::TiledJson
    }

    fn is_valid_extension(&self, extension: &str) -> bool {
        matches!(extension.to_ascii_lowercase().as_str(), "tmj" | "json")
    }

    fn load_map(&self, path: &Path, options: &ReadOptions) -> Result<IrMap, MapError> {
        let doc: JsonMap = parse_json(path, &read_text(path)?)?;
        parse_map(doc, path, options)
    }

    fn load_tileset(&self, path: &Path, options: &ReadOptions) -> Result<IrTileset, MapError> {
        read_tileset_file(path, options)
    }

    fn save_map(&self, path: &Path, map: &IrMap, options: &WriteOptions) -> Result<(), MapError> {
        if !map.component_definitions.is_empty() {
            warn!("component definitions are not stored in Tiled JSON files");
        }

        let mut tilesets = Vec::with_capacity(map.tilesets.len());
        for entry in &map.tilesets {
            if options.use_external_tilesets {
                let file_name = external_tileset_name(&entry.tileset, self.id());
                let tileset_path = options.base_dir.join(&file_name);
                self.save_tileset(&tileset_path, &entry.tileset, options)?;
                info!("wrote tileset {}", tileset_path.display());
                tilesets.push(JsonTilesetEntry {
                    firstgid: Some(entry.first_tile_id),
                    source: Some(file_name),
                    tileset: JsonTileset::default(),
                });
            } else {
                tilesets.push(JsonTilesetEntry {
                    firstgid: Some(entry.first_tile_id),
                    source: None,
                    tileset: tileset_to_json(&entry.tileset, &options.base_dir)?,
                });
            }
        }

        let doc = JsonMap {
            kind: Some("map".to_owned()),
            version: Some(JsonValue::from(FORMAT_VERSION)),
            tiledversion: Some(TILED_VERSION.to_owned()),
            orientation: Some("orthogonal".to_owned()),
            renderorder: Some("right-down".to_owned()),
            infinite: Some(false),
            width: Some(map.col_count),
            height: Some(map.row_count),
            tilewidth: Some(map.tile_width),
            tileheight: Some(map.tile_height),
            nextlayerid: Some(map.next_layer_id),
            nextobjectid: Some(map.next_object_id),
            compressionlevel: Some(map.tile_format.compression_level.unwrap_or(-1)),
            layers: map
                .layers
                .iter()
                .map(|layer| layer_to_json(layer, map))
                .collect::<Result<_, _>>()?,
            tilesets,
            properties: properties_to_json(&map.meta, "map")?,
        };
        write_text(path, &to_json(path, &doc, options)?)
    }

    fn save_tileset(
        &self,
        path: &Path,
        tileset: &IrTileset,
        options: &WriteOptions,
    ) -> Result<(), MapError> {
        let doc = external_tileset_to_json(tileset, &options.base_dir)?;
        write_text(path, &to_json(path, &doc, options)?)
    }
}
