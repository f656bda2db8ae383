// src/format/tactile_yaml.rs
//! Tactile's native YAML format.
//!
//! Maps reference their tilesets through separate `<name>.yaml` files placed
//! next to the map. This is the only format that stores components.

use super::{
    decode_layer_data, encode_layer_data, external_tileset_name, file_stem, read_text, relative_path,
    required, slash_separated, widen_f32, write_text, ReadOptions, SaveFormat, SaveFormatId,
    WriteOptions,
};
use crate::codec::{TileCompression, TileEncoding, TileFormat};
use crate::error::MapError;
use crate::ir_map::{
    IrAnimationFrame, IrLayer, IrLayerKind, IrMap, IrObject, IrTile, IrTileset, IrTilesetRef,
};
use crate::matrix::{TileExtent, TileMatrix};
use crate::object::ObjectKind;
use crate::property::{
    Color, ComponentDefinition, Components, Metadata, Properties, PropertyType, PropertyValue,
};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const FORMAT_VERSION: i64 = 1;

#[derive(Debug, Clone, Copy, Default)]
pub struct TactileYamlFormat;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct YamlMap {
    version: Option<i64>,
    row_count: Option<usize>,
    column_count: Option<usize>,
    tile_width: Option<i32>,
    tile_height: Option<i32>,
    next_layer_id: Option<i32>,
    next_object_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tile_format: Option<YamlTileFormat>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    component_definitions: Vec<YamlComponentDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tilesets: Vec<YamlTilesetRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    layers: Vec<YamlLayer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<YamlProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<YamlComponent>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct YamlTileFormat {
    encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zlib_compression_level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zstd_compression_level: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct YamlComponentDefinition {
    name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<YamlAttribute>,
}

#[derive(Debug, Serialize, Deserialize)]
struct YamlAttribute {
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct YamlTilesetRef {
    first_global_id: Option<i32>,
    path: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct YamlLayer {
    name: Option<String>,
    id: Option<i32>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    objects: Vec<YamlObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    layers: Vec<YamlLayer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<YamlProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<YamlComponent>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct YamlObject {
    id: Option<i32>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    visible: Option<bool>,
    #[serde(default, skip_serializing_if = "is_zero")]
    x: f32,
    #[serde(default, skip_serializing_if = "is_zero")]
    y: f32,
    #[serde(default, skip_serializing_if = "is_zero")]
    width: f32,
    #[serde(default, skip_serializing_if = "is_zero")]
    height: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<YamlProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<YamlComponent>,
}

fn is_zero(value: &f32) -> bool {
    *value == 0.0
}

#[derive(Debug, Serialize, Deserialize)]
struct YamlProperty {
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct YamlComponent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    values: Vec<YamlComponentValue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct YamlComponentValue {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct YamlTileset {
    version: Option<i64>,
    name: Option<String>,
    tile_width: Option<i32>,
    tile_height: Option<i32>,
    tile_count: Option<i32>,
    column_count: Option<i32>,
    image_path: Option<String>,
    image_width: Option<i32>,
    image_height: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tiles: Vec<YamlTile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<YamlProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<YamlComponent>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct YamlTile {
    id: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    animation: Vec<YamlFrame>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    objects: Vec<YamlObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    properties: Vec<YamlProperty>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    components: Vec<YamlComponent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct YamlFrame {
    tile: Option<i32>,
    duration: Option<u64>,
}

// ---------------------------------------------------------------------------
// Values

fn value_to_yaml(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::String(s) => Value::String(s.clone()),
        PropertyValue::Int(v) | PropertyValue::Object(v) => Value::Number((*v).into()),
        PropertyValue::Float(v) => Value::Number(widen_f32(*v).into()),
        PropertyValue::Bool(b) => Value::Bool(*b),
        PropertyValue::Path(p) => Value::String(slash_separated(p)),
        PropertyValue::Color(c) => Value::String(c.to_rgba_hex()),
        vector => Value::String(vector.vector_text().unwrap_or_default()),
    }
}

fn value_from_yaml(
    context: &str,
    name: &str,
    kind: PropertyType,
    value: &Value,
) -> Result<PropertyValue, MapError> {
    let int = || value.as_i64().and_then(|v| i32::try_from(v).ok());
    let parsed = match kind {
        PropertyType::Str => value.as_str().map(|s| PropertyValue::String(s.to_owned())),
        PropertyType::Int => int().map(PropertyValue::Int),
        PropertyType::Float => value.as_f64().map(|v| PropertyValue::Float(v as f32)),
        PropertyType::Bool => value.as_bool().map(PropertyValue::Bool),
        PropertyType::Path => value.as_str().map(|s| PropertyValue::Path(PathBuf::from(s))),
        PropertyType::Color => value
            .as_str()
            .and_then(Color::from_rgba_hex)
            .map(PropertyValue::Color),
        PropertyType::Object => int().map(PropertyValue::Object),
        vector => value
            .as_str()
            .and_then(|s| PropertyValue::parse_vector(vector, s)),
    };
    parsed.ok_or_else(|| MapError::InvalidValue {
        context: context.to_owned(),
        key: name.to_owned(),
        value: format!("{value:?}"),
    })
}

fn property_type(name: &str, type_name: &str) -> Result<PropertyType, MapError> {
    PropertyType::from_name(type_name).ok_or_else(|| MapError::UnsupportedPropertyType {
        name: name.to_owned(),
        kind: type_name.to_owned(),
    })
}

// ---------------------------------------------------------------------------
// Parsing

struct Parser<'a> {
    options: &'a ReadOptions,
    definitions: &'a [ComponentDefinition],
}

impl Parser<'_> {
    fn properties(&self, items: Vec<YamlProperty>, context: &str) -> Result<Properties, MapError> {
        let mut out = Properties::new();
        for item in items {
            let type_name = self
                .options
                .require(item.kind, context, "type", "string".to_owned())?;
            let kind = property_type(&item.name, &type_name)?;
            let value = match &item.value {
                Some(value) => value_from_yaml(context, &item.name, kind, value)?,
                None => self.options.require(
                    None,
                    &format!("property '{}' of {context}", item.name),
                    "value",
                    PropertyValue::default_of(kind),
                )?,
            };
            out.insert(item.name, value);
        }
        Ok(out)
    }

    fn components(&self, items: Vec<YamlComponent>, context: &str) -> Result<Components, MapError> {
        let mut out = Components::new();
        for item in items {
            let Some(definition) = self.definitions.iter().find(|d| d.name == item.kind) else {
                if self.options.strict_mode {
                    return Err(MapError::InvalidValue {
                        context: context.to_owned(),
                        key: "components".to_owned(),
                        value: item.kind,
                    });
                }
                warn!("{context} uses undefined component '{}', ignoring it", item.kind);
                continue;
            };

            let mut values = definition.instantiate();
            for entry in item.values {
                let Some(kind) = definition.attributes.get(&entry.name).map(PropertyValue::kind)
                else {
                    warn!(
                        "component '{}' has no attribute '{}', ignoring it",
                        item.kind, entry.name
                    );
                    continue;
                };
                let value = match &entry.value {
                    Some(value) => value_from_yaml(context, &entry.name, kind, value)?,
                    None => PropertyValue::default_of(kind),
                };
                values.insert(entry.name, value);
            }
            out.insert(item.kind, values);
        }
        Ok(out)
    }

    fn meta(
        &self,
        properties: Vec<YamlProperty>,
        components: Vec<YamlComponent>,
        context: &str,
    ) -> Result<Metadata, MapError> {
        Ok(Metadata {
            properties: self.properties(properties, context)?,
            components: self.components(components, context)?,
        })
    }

    fn object(&self, object: YamlObject) -> Result<IrObject, MapError> {
        let id = self.options.require(object.id, "object", "id", 0)?;
        let context = format!("object {id}");
        let type_name = required(object.kind, &context, "type")?;
        let kind = ObjectKind::from_name(&type_name)
            .ok_or_else(|| MapError::UnsupportedObjectType(type_name.clone()))?;
        Ok(IrObject {
            meta: self.meta(object.properties, object.components, &context)?,
            id,
            kind,
            x: object.x,
            y: object.y,
            width: object.width,
            height: object.height,
            name: object.name,
            tag: object.tag,
            visible: object.visible.unwrap_or(true),
        })
    }

    fn objects(&self, objects: Vec<YamlObject>) -> Result<Vec<IrObject>, MapError> {
        objects.into_iter().map(|o| self.object(o)).collect()
    }

    fn layer(
        &self,
        layer: YamlLayer,
        extent: TileExtent,
        format: &TileFormat,
    ) -> Result<IrLayer, MapError> {
        let id = self.options.require(layer.id, "layer", "id", 0)?;
        let name = self
            .options
            .require(layer.name, &format!("layer {id}"), "name", String::new())?;
        let context = format!("layer '{name}'");
        let type_name = required(layer.kind, &context, "type")?;

        let kind = match type_name.as_str() {
            "tile-layer" => {
                let tiles = match &layer.data {
                    Some(data) => decode_layer_data(data, extent, format).map_err(|source| {
                        MapError::TileData {
                            layer: name.clone(),
                            source,
                        }
                    })?,
                    None => {
                        self.options.require(None, &context, "data", ())?;
                        TileMatrix::new(extent)
                    }
                };
                IrLayerKind::Tiles { tiles }
            }
            "object-layer" => IrLayerKind::Objects {
                objects: self.objects(layer.objects)?,
            },
            "group-layer" => IrLayerKind::Group {
                layers: layer
                    .layers
                    .into_iter()
                    .map(|child| self.layer(child, extent, format))
                    .collect::<Result<_, _>>()?,
            },
            other => return Err(MapError::UnsupportedLayerType(other.to_owned())),
        };

        Ok(IrLayer {
            meta: self.meta(layer.properties, layer.components, &context)?,
            id,
            name,
            opacity: layer.opacity.unwrap_or(1.0),
            visible: layer.visible.unwrap_or(true),
            kind,
        })
    }

    fn tile(&self, tile: YamlTile, tileset: &str, tile_count: i32) -> Result<IrTile, MapError> {
        let index = required(tile.id, &format!("tile of tileset '{tileset}'"), "id")?;
        let context = format!("tile {index} of tileset '{tileset}'");
        if !(0..tile_count).contains(&index) {
            return Err(MapError::InvalidValue {
                context,
                key: "id".to_owned(),
                value: index.to_string(),
            });
        }
        let animation = tile
            .animation
            .into_iter()
            .map(|frame| {
                Ok(IrAnimationFrame {
                    tile_index: required(frame.tile, &context, "tile")?,
                    duration_ms: required(frame.duration, &context, "duration")?,
                })
            })
            .collect::<Result<_, MapError>>()?;
        Ok(IrTile {
            index,
            meta: self.meta(tile.properties, tile.components, &context)?,
            objects: self.objects(tile.objects)?,
            animation,
        })
    }

    fn tileset(&self, doc: YamlTileset, path: &Path) -> Result<IrTileset, MapError> {
        check_version(doc.version, path, self.options)?;
        let name = self
            .options
            .require(doc.name, "tileset", "name", file_stem(path))?;
        let context = format!("tileset '{name}'");

        let tile_count = required(doc.tile_count, &context, "tile-count")?;
        let image = required(doc.image_path, &context, "image-path")?;
        let image_path = self.options.resolve(&image);
        self.options.check_image(&image_path)?;

        let mut tiles = doc
            .tiles
            .into_iter()
            .map(|tile| self.tile(tile, &name, tile_count))
            .collect::<Result<Vec<_>, _>>()?;
        tiles.sort_by_key(|t| t.index);

        Ok(IrTileset {
            meta: self.meta(doc.properties, doc.components, &context)?,
            tile_width: required(doc.tile_width, &context, "tile-width")?,
            tile_height: required(doc.tile_height, &context, "tile-height")?,
            tile_count,
            column_count: required(doc.column_count, &context, "column-count")?,
            image_path,
            image_width: self.options.require(doc.image_width, &context, "image-width", 0)?,
            image_height: self
                .options
                .require(doc.image_height, &context, "image-height", 0)?,
            tiles,
            is_embedded: false,
            name,
        })
    }
}

fn check_version(version: Option<i64>, path: &Path, options: &ReadOptions) -> Result<(), MapError> {
    let version = options.require(version, "document", "version", FORMAT_VERSION)?;
    if version != FORMAT_VERSION {
        return Err(MapError::UnsupportedVersion {
            path: path.to_path_buf(),
            version,
        });
    }
    Ok(())
}

fn parse_tile_format(
    format: Option<YamlTileFormat>,
    options: &ReadOptions,
) -> Result<TileFormat, MapError> {
    let Some(format) = format else {
        return Ok(TileFormat::plain());
    };
    let invalid = |key: &str, value: String| MapError::InvalidValue {
        context: "tile-format".to_owned(),
        key: key.to_owned(),
        value,
    };

    let encoding = options.require(
        format.encoding,
        "tile-format",
        "encoding",
        TileEncoding::PlainText.as_str().to_owned(),
    )?;
    let encoding: TileEncoding = encoding
        .parse()
        .map_err(|_| invalid("encoding", encoding.clone()))?;
    let compression: TileCompression = match format.compression {
        Some(text) => text.parse().map_err(|_| invalid("compression", text.clone()))?,
        None => TileCompression::None,
    };
    let compression_level = match compression {
        TileCompression::Zlib => format.zlib_compression_level,
        TileCompression::Zstd => format.zstd_compression_level,
        TileCompression::None => None,
    };

    let parsed = TileFormat {
        encoding,
        compression,
        compression_level,
    };
    parsed
        .validate()
        .map_err(|e| MapError::InvalidMap(format!("tile format: {e}")))?;
    Ok(parsed)
}

fn parse_component_definitions(
    items: Vec<YamlComponentDefinition>,
    options: &ReadOptions,
) -> Result<Vec<ComponentDefinition>, MapError> {
    items
        .into_iter()
        .map(|item| {
            let context = format!("component '{}'", item.name);
            let mut attributes = Properties::new();
            for attribute in item.attributes {
                let type_name =
                    options.require(attribute.kind, &context, "type", "string".to_owned())?;
                let kind = property_type(&attribute.name, &type_name)?;
                let value = match &attribute.default {
                    Some(value) => value_from_yaml(&context, &attribute.name, kind, value)?,
                    None => PropertyValue::default_of(kind),
                };
                attributes.insert(attribute.name, value);
            }
            Ok(ComponentDefinition {
                name: item.name,
                attributes,
            })
        })
        .collect()
}

fn read_tileset_file(
    path: &Path,
    options: &ReadOptions,
    definitions: &[ComponentDefinition],
) -> Result<IrTileset, MapError> {
    let text = read_text(path)?;
    let doc: YamlTileset = serde_yaml::from_str(&text).map_err(|source| MapError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    Parser {
        options,
        definitions,
    }
    .tileset(doc, path)
}

fn parse_map(doc: YamlMap, path: &Path, options: &ReadOptions) -> Result<IrMap, MapError> {
    check_version(doc.version, path, options)?;
    let row_count = required(doc.row_count, "map", "row-count")?;
    let col_count = required(doc.column_count, "map", "column-count")?;
    let extent = TileExtent::new(row_count, col_count);
    if extent.is_empty() {
        return Err(MapError::InvalidMap(format!(
            "{} has an empty extent {row_count}x{col_count}",
            path.display()
        )));
    }

    let tile_format = parse_tile_format(doc.tile_format, options)?;
    let definitions = parse_component_definitions(doc.component_definitions, options)?;
    let parser = Parser {
        options,
        definitions: &definitions,
    };

    let mut tilesets = Vec::with_capacity(doc.tilesets.len());
    for entry in doc.tilesets {
        let first_tile_id = required(entry.first_global_id, "tileset reference", "first-global-id")?;
        let source = options.resolve(&required(entry.path, "tileset reference", "path")?);
        let tileset = read_tileset_file(&source, &options.nested(&source), &definitions)?;
        tilesets.push(IrTilesetRef {
            first_tile_id,
            tileset,
        });
    }
    tilesets.sort_by_key(|t| t.first_tile_id);

    let layers = doc
        .layers
        .into_iter()
        .map(|layer| parser.layer(layer, extent, &tile_format))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IrMap {
        meta: parser.meta(doc.properties, doc.components, "map")?,
        row_count,
        col_count,
        tile_width: options.require(doc.tile_width, "map", "tile-width", 32)?,
        tile_height: options.require(doc.tile_height, "map", "tile-height", 32)?,
        next_layer_id: options.require(doc.next_layer_id, "map", "next-layer-id", 1)?,
        next_object_id: options.require(doc.next_object_id, "map", "next-object-id", 1)?,
        tile_format,
        component_definitions: definitions,
        tilesets,
        layers,
    })
}

// ---------------------------------------------------------------------------
// Emitting

fn emit_properties(properties: &Properties) -> Vec<YamlProperty> {
    properties
        .iter()
        .map(|(name, value)| YamlProperty {
            name: name.to_owned(),
            kind: Some(value.kind().name().to_owned()),
            value: Some(value_to_yaml(value)),
        })
        .collect()
}

fn emit_components(components: &Components) -> Vec<YamlComponent> {
    components
        .iter()
        .map(|(kind, values)| YamlComponent {
            kind: kind.clone(),
            values: values
                .iter()
                .map(|(name, value)| YamlComponentValue {
                    name: name.to_owned(),
                    value: Some(value_to_yaml(value)),
                })
                .collect(),
        })
        .collect()
}

fn emit_object(object: &IrObject) -> YamlObject {
    YamlObject {
        id: Some(object.id),
        kind: Some(object.kind.as_str().to_owned()),
        name: object.name.clone(),
        tag: object.tag.clone(),
        visible: (!object.visible).then_some(false),
        x: object.x,
        y: object.y,
        width: object.width,
        height: object.height,
        properties: emit_properties(&object.meta.properties),
        components: emit_components(&object.meta.components),
    }
}

fn emit_layer(
    layer: &IrLayer,
    format: &TileFormat,
    options: &WriteOptions,
) -> Result<YamlLayer, MapError> {
    let mut out = YamlLayer {
        name: Some(layer.name.clone()),
        id: Some(layer.id),
        opacity: (layer.opacity != 1.0).then_some(layer.opacity),
        visible: (!layer.visible).then_some(false),
        properties: emit_properties(&layer.meta.properties),
        components: emit_components(&layer.meta.components),
        ..YamlLayer::default()
    };
    match &layer.kind {
        IrLayerKind::Tiles { tiles } => {
            out.kind = Some("tile-layer".to_owned());
            let row_separator = if options.fold_tile_layer_data { "\n" } else { " " };
            let data = encode_layer_data(tiles, format, " ", row_separator).map_err(|source| {
                MapError::TileData {
                    layer: layer.name.clone(),
                    source,
                }
            })?;
            out.data = Some(data);
        }
        IrLayerKind::Objects { objects } => {
            out.kind = Some("object-layer".to_owned());
            out.objects = objects.iter().map(emit_object).collect();
        }
        IrLayerKind::Group { layers } => {
            out.kind = Some("group-layer".to_owned());
            out.layers = layers
                .iter()
                .map(|child| emit_layer(child, format, options))
                .collect::<Result<_, _>>()?;
        }
    }
    Ok(out)
}

fn emit_tile_format(format: &TileFormat) -> Option<YamlTileFormat> {
    if format.encoding == TileEncoding::PlainText {
        return None;
    }
    let mut out = YamlTileFormat {
        encoding: Some(format.encoding.as_str().to_owned()),
        compression: Some(format.compression.as_str().to_owned()),
        ..YamlTileFormat::default()
    };
    match format.compression {
        TileCompression::Zlib => out.zlib_compression_level = format.compression_level,
        TileCompression::Zstd => out.zstd_compression_level = format.compression_level,
        TileCompression::None => {}
    }
    Some(out)
}

fn emit_tileset(tileset: &IrTileset, dir: &Path) -> YamlTileset {
    let tiles = tileset
        .tiles
        .iter()
        .map(|tile| YamlTile {
            id: Some(tile.index),
            animation: tile
                .animation
                .iter()
                .map(|frame| YamlFrame {
                    tile: Some(frame.tile_index),
                    duration: Some(frame.duration_ms),
                })
                .collect(),
            objects: tile.objects.iter().map(emit_object).collect(),
            properties: emit_properties(&tile.meta.properties),
            components: emit_components(&tile.meta.components),
        })
        .collect();

    YamlTileset {
        version: Some(FORMAT_VERSION),
        name: Some(tileset.name.clone()),
        tile_width: Some(tileset.tile_width),
        tile_height: Some(tileset.tile_height),
        tile_count: Some(tileset.tile_count),
        column_count: Some(tileset.column_count),
        image_path: Some(relative_path(&tileset.image_path, dir)),
        image_width: Some(tileset.image_width),
        image_height: Some(tileset.image_height),
        tiles,
        properties: emit_properties(&tileset.meta.properties),
        components: emit_components(&tileset.meta.components),
    }
}

fn emit_component_definitions(definitions: &[ComponentDefinition]) -> Vec<YamlComponentDefinition> {
    definitions
        .iter()
        .map(|definition| YamlComponentDefinition {
            name: definition.name.clone(),
            attributes: definition
                .attributes
                .iter()
                .map(|(name, value)| YamlAttribute {
                    name: name.to_owned(),
                    kind: Some(value.kind().name().to_owned()),
                    default: (!value.is_default()).then(|| value_to_yaml(value)),
                })
                .collect(),
        })
        .collect()
}

fn to_yaml<T: Serialize>(path: &Path, doc: &T) -> Result<String, MapError> {
    serde_yaml::to_string(doc).map_err(|source| MapError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

fn write_tileset_file(path: &Path, tileset: &IrTileset, dir: &Path) -> Result<(), MapError> {
    let text = to_yaml(path, &emit_tileset(tileset, dir))?;
    write_text(path, &text)
}

impl SaveFormat for TactileYamlFormat {
    fn id(&self) -> SaveFormatId {
        SaveFormatId::TactileYaml
    }

    fn is_valid_extension(&self, extension: &str) -> bool {
        matches!(extension.to_ascii_lowercase().as_str(), "yml" | "yaml")
    }

    fn load_map(&self, path: &Path, options: &ReadOptions) -> Result<IrMap, MapError> {
        let text = read_text(path)?;
        let doc: YamlMap = serde_yaml::from_str(&text).map_err(|source| MapError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        parse_map(doc, path, options)
    }

    /// Components in a standalone tileset can not be typed without the map's
    /// definitions and are skipped.
    fn load_tileset(&self, path: &Path, options: &ReadOptions) -> Result<IrTileset, MapError> {
        read_tileset_file(path, options, &[])
    }

    fn save_map(&self, path: &Path, map: &IrMap, options: &WriteOptions) -> Result<(), MapError> {
        let mut tilesets = Vec::with_capacity(map.tilesets.len());
        for entry in &map.tilesets {
            let file_name = external_tileset_name(&entry.tileset, self.id());
            let tileset_path = options.base_dir.join(&file_name);
            write_tileset_file(&tileset_path, &entry.tileset, &options.base_dir)?;
            info!("wrote tileset {}", tileset_path.display());
            tilesets.push(YamlTilesetRef {
                first_global_id: Some(entry.first_tile_id),
                path: Some(file_name),
            });
        }

        let doc = YamlMap {
            version: Some(FORMAT_VERSION),
            row_count: Some(map.row_count),
            column_count: Some(map.col_count),
            tile_width: Some(map.tile_width),
            tile_height: Some(map.tile_height),
            next_layer_id: Some(map.next_layer_id),
            next_object_id: Some(map.next_object_id),
            tile_format: emit_tile_format(&map.tile_format),
            component_definitions: emit_component_definitions(&map.component_definitions),
            tilesets,
            layers: map
                .layers
                .iter()
                .map(|layer| emit_layer(layer, &map.tile_format, options))
                .collect::<Result<_, _>>()?,
            properties: emit_properties(&map.meta.properties),
            components: emit_components(&map.meta.components),
        };
        write_text(path, &to_yaml(path, &doc)?)
    }

    fn save_tileset(
        &self,
        path: &Path,
        tileset: &IrTileset,
        options: &WriteOptions,
    ) -> Result<(), MapError> {
        write_tileset_file(path, tileset, &options.base_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::matrix::TilePos;

    fn parse(text: &str, options: &ReadOptions) -> Result<IrMap, MapError> {
        let doc: YamlMap = serde_yaml::from_str(text).unwrap();
        parse_map(doc, Path::new("map.yaml"), options)
    }

    fn strict() -> ReadOptions {
        ReadOptions {
            base_dir: PathBuf::new(),
            strict_mode: true,
        }
    }

    const MINIMAL: &str = r##"
version: 1
row-count: 2
column-count: 3
tile-width: 16
tile-height: 16
next-layer-id: 2
next-object-id: 1
layers:
  - name: Ground
    id: 1
    type: tile-layer
    opacity: 0.5
    data: |-
      1 2 3
      4 5 6
    properties:
      - name: solid
        type: bool
        value: true
      - name: tint
        type: color
        value: "#FF000080"
"##;

    #[test]
    fn parses_plain_tile_layer() {
        let map = parse(MINIMAL, &strict()).unwrap();
        assert_eq!(map.extent(), TileExtent::new(2, 3));
        assert_eq!(map.tile_format, TileFormat::plain());
        let layer = &map.layers[0];
        assert_eq!(layer.name, "Ground");
        assert_eq!(layer.opacity, 0.5);
        assert!(layer.visible);
        let IrLayerKind::Tiles { tiles } = &layer.kind else {
            panic!("expected a tile layer");
        };
        assert_eq!(tiles.tile_at(TilePos::new(1, 2)), Some(6));
        assert_eq!(layer.meta.properties.get_bool("solid"), Some(true));
        assert_eq!(
            layer.meta.properties.get_color("tint"),
            Some(Color::rgba(0xFF, 0, 0, 0x80))
        );
    }

    #[test]
    fn rejects_other_versions() {
        let text = MINIMAL.replace("version: 1", "version: 2");
        let err = parse(&text, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, MapError::UnsupportedVersion { version: 2, .. }));
    }

    #[test]
    fn strict_mode_requires_emitted_keys() {
        let text = MINIMAL.replace("tile-width: 16\n", "");
        let err = parse(&text, &strict()).unwrap_err();
        assert!(matches!(err, MapError::MissingKey { ref key, .. } if key == "tile-width"));

        let lenient = parse(&text, &ReadOptions::default()).unwrap();
        assert_eq!(lenient.tile_width, 32);
    }

    #[test]
    fn missing_property_value_defaults_when_lenient() {
        let text = MINIMAL.replace("        value: true\n", "");
        assert!(matches!(
            parse(&text, &strict()),
            Err(MapError::MissingKey { ref key, .. }) if key == "value"
        ));
        let map = parse(&text, &ReadOptions::default()).unwrap();
        assert_eq!(map.layers[0].meta.properties.get_bool("solid"), Some(false));
    }

    #[test]
    fn unknown_property_type_is_rejected() {
        let text = MINIMAL.replace("type: bool", "type: class");
        let err = parse(&text, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, MapError::UnsupportedPropertyType { ref kind, .. } if kind == "class"));
    }

    #[test]
    fn unknown_layer_type_is_rejected() {
        let text = MINIMAL.replace("type: tile-layer", "type: image-layer");
        let err = parse(&text, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, MapError::UnsupportedLayerType(ref t) if t == "image-layer"));
    }

    #[test]
    fn wrong_tile_count_is_tile_data_error() {
        let text = MINIMAL.replace("4 5 6", "4 5");
        let err = parse(&text, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, MapError::TileData { ref layer, .. } if layer == "Ground"));
    }

    #[test]
    fn parses_base64_tile_format() {
        let text = MINIMAL
            .replace(
                "next-object-id: 1\n",
                "next-object-id: 1\ntile-format:\n  encoding: base64\n  compression: zlib\n  zlib-compression-level: 6\n",
            )
            .replace("data: |-\n      1 2 3\n      4 5 6", "data: eJxjZGBgYAJiZiBmAWJWIGYDYgAA+AAW");
        let map = parse(&text, &strict()).unwrap();
        assert_eq!(map.tile_format.compression, TileCompression::Zlib);
        assert_eq!(map.tile_format.compression_level, Some(6));
        let IrLayerKind::Tiles { tiles } = &map.layers[0].kind else {
            panic!("expected a tile layer");
        };
        assert_eq!(tiles.to_flat(), vec![1, 2, 3, 4, 5, 6]);

        let corrupt = text.replace("eJxjZGBgYAJiZiBmAWJWIGYDYgAA+AAW", "AAAAAAAA");
        let err = parse(&corrupt, &ReadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            MapError::TileData { ref layer, source: CodecError::Zlib(_) } if layer == "Ground"
        ));
    }

    #[test]
    fn tile_format_levels_follow_compression() {
        let format = TileFormat {
            encoding: TileEncoding::Base64,
            compression: TileCompression::Zstd,
            compression_level: Some(7),
        };
        let emitted = emit_tile_format(&format).unwrap();
        assert_eq!(emitted.zstd_compression_level, Some(7));
        assert_eq!(emitted.zlib_compression_level, None);
        assert_eq!(parse_tile_format(Some(emitted), &strict()).unwrap(), format);
        assert!(emit_tile_format(&TileFormat::plain()).is_none());
    }

    #[test]
    fn plain_data_is_folded_into_rows() {
        let map = parse(MINIMAL, &ReadOptions::default()).unwrap();
        let options = WriteOptions {
            fold_tile_layer_data: true,
            ..WriteOptions::default()
        };
        let layer = emit_layer(&map.layers[0], &map.tile_format, &options).unwrap();
        assert_eq!(layer.data.as_deref(), Some("1 2 3\n4 5 6"));
        assert_eq!(layer.opacity, Some(0.5));
        assert_eq!(layer.visible, None);
    }

    #[test]
    fn components_follow_definitions() {
        let text = format!(
            "{MINIMAL}{}",
            r#"component-definitions:
  - name: Health
    attributes:
      - name: max
        type: int
        default: 100
      - name: regen
        type: float
components:
  - type: Health
    values:
      - name: regen
        value: 1.5
"#
        );
        let map = parse(&text, &strict()).unwrap();
        let health = &map.meta.components["Health"];
        assert_eq!(health.get_i32("max"), Some(100));
        assert_eq!(health.get_f32("regen"), Some(1.5));

        let undefined = text.replace("  - type: Health", "  - type: Mana");
        assert!(parse(&undefined, &strict()).is_err());
        assert!(parse(&undefined, &ReadOptions::default())
            .unwrap()
            .meta
            .components
            .is_empty());
    }
}
