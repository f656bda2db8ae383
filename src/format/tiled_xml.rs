// src/format/tiled_xml.rs
//! Tiled XML maps (`.tmx`) and tilesets (`.tsx`).
//!
//! Default-valued attributes are omitted on write and defaulted on read,
//! the same way Tiled itself treats them.

use super::xml_tree::XmlElement;
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
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const TILED_VERSION: &str = "1.10.2";
const FORMAT_VERSION: &str = "1.10";

#[derive(Debug, Clone, Copy, Default)]
pub struct TiledXmlFormat;

// ---------------------------------------------------------------------------
// Properties

fn property_from_xml(
    node: &XmlElement,
    context: &str,
    options: &ReadOptions,
) -> Result<(String, PropertyValue), MapError> {
    let name = required(node.attr("name"), context, "name")?.to_owned();
    let type_name = node.attr("type").unwrap_or("string");
    let kind =
        PropertyType::from_name(type_name).ok_or_else(|| MapError::UnsupportedPropertyType {
            name: name.clone(),
            kind: type_name.to_owned(),
        })?;

    // Multi-line strings are stored as element text.
    let raw = match node.attr("value") {
        Some(value) => value,
        None if kind == PropertyType::Str && !node.text.is_empty() => node.text.as_str(),
        None => {
            let fallback = options.require(
                None,
                &format!("property '{name}' of {context}"),
                "value",
                PropertyValue::default_of(kind),
            )?;
            return Ok((name, fallback));
        }
    };

    let parsed = match kind {
        PropertyType::Str => Some(PropertyValue::String(raw.to_owned())),
        PropertyType::Int => raw.parse().ok().map(PropertyValue::Int),
        PropertyType::Float => raw.parse().ok().map(PropertyValue::Float),
        PropertyType::Bool => match raw {
            "true" | "1" => Some(PropertyValue::Bool(true)),
            "false" | "0" => Some(PropertyValue::Bool(false)),
            _ => None,
        },
        PropertyType::Path => Some(PropertyValue::Path(PathBuf::from(raw))),
        PropertyType::Color => Color::from_argb_hex(raw).map(PropertyValue::Color),
        PropertyType::Object => raw.parse().ok().map(PropertyValue::Object),
        vector => PropertyValue::parse_vector(vector, raw),
    };
    let parsed = parsed.ok_or_else(|| MapError::InvalidValue {
        context: context.to_owned(),
        key: name.clone(),
        value: raw.to_owned(),
    })?;
    Ok((name, parsed))
}

fn meta_from_xml(
    node: &XmlElement,
    context: &str,
    options: &ReadOptions,
) -> Result<Metadata, MapError> {
    let properties = match node.child("properties") {
        Some(list) => list
            .children_named("property")
            .map(|p| property_from_xml(p, context, options))
            .collect::<Result<Properties, _>>()?,
        None => Properties::new(),
    };
    Ok(Metadata {
        properties,
        components: Default::default(),
    })
}

fn properties_to_xml(meta: &Metadata, context: &str) -> Result<Option<XmlElement>, MapError> {
    warn_dropped_components(meta, context, SaveFormatId::TiledXml);
    if meta.properties.is_empty() {
        return Ok(None);
    }

    let mut list = XmlElement::new("properties");
    for (name, value) in meta.properties.iter() {
        let kind = tiled_property_type(name, value)?;
        let mut node = XmlElement::new("property").with_attr("name", name);
        // Strings are the default type and carry no `type` attribute.
        if kind != "string" {
            node = node.with_attr("type", kind);
        }
        node = match value {
            PropertyValue::String(s) if s.contains('\n') => node.with_text(s.as_str()),
            PropertyValue::String(s) => node.with_attr("value", s),
            PropertyValue::Int(v) | PropertyValue::Object(v) => node.with_attr("value", v),
            PropertyValue::Float(v) => node.with_attr("value", widen_f32(*v)),
            PropertyValue::Bool(b) => node.with_attr("value", b),
            PropertyValue::Path(p) => node.with_attr("value", slash_separated(p)),
            PropertyValue::Color(c) => node.with_attr("value", c.to_argb_hex()),
            // Vectors were rejected by `tiled_property_type`.
            _ => node,
        };
        list.children.push(node);
    }
    Ok(Some(list))
}

fn push_properties(node: &mut XmlElement, meta: &Metadata, context: &str) -> Result<(), MapError> {
    if let Some(list) = properties_to_xml(meta, context)? {
        node.children.push(list);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parsing

fn object_from_xml(node: &XmlElement, options: &ReadOptions) -> Result<IrObject, MapError> {
    let id = options.require(node.parse_attr("id")?, "object", "id", 0)?;
    let kind = if node.child("point").is_some() {
        ObjectKind::Point
    } else if node.child("ellipse").is_some() {
        ObjectKind::Ellipse
    } else {
        ObjectKind::Rect
    };
    Ok(IrObject {
        meta: meta_from_xml(node, &format!("object {id}"), options)?,
        id,
        kind,
        x: node.parse_attr("x")?.unwrap_or(0.0),
        y: node.parse_attr("y")?.unwrap_or(0.0),
        width: node.parse_attr("width")?.unwrap_or(0.0),
        height: node.parse_attr("height")?.unwrap_or(0.0),
        name: node.attr("name").unwrap_or_default().to_owned(),
        tag: node
            .attr("type")
            .or_else(|| node.attr("class"))
            .unwrap_or_default()
            .to_owned(),
        visible: node.bool_attr("visible")?.unwrap_or(true),
    })
}

fn objects_from_xml(node: &XmlElement, options: &ReadOptions) -> Result<Vec<IrObject>, MapError> {
    node.children_named("object")
        .map(|o| object_from_xml(o, options))
        .collect()
}

fn is_layer_node(node: &XmlElement) -> bool {
    matches!(node.name.as_str(), "layer" | "objectgroup" | "group")
}

struct LayerParser<'a> {
    options: &'a ReadOptions,
    extent: TileExtent,
    /// Encoding of the first tile layer, which becomes the map's format.
    detected: Option<TileFormat>,
}

impl LayerParser<'_> {
    fn tiles(&mut self, data: &XmlElement) -> Result<TileMatrix, CodecError> {
        let Some(encoding) = data.attr("encoding") else {
            // Legacy layout with one `<tile gid>` element per cell.
            self.detected = self.detected.or(Some(TileFormat::plain()));
            let flat = data
                .children_named("tile")
                .map(|tile| match tile.attr("gid") {
                    None => Ok(0),
                    Some(gid) => gid
                        .parse::<TileId>()
                        .map_err(|_| CodecError::CorruptPlainText(gid.to_owned())),
                })
                .collect::<Result<Vec<_>, _>>()?;
            return TileMatrix::from_flat(self.extent, &flat).ok_or(
                CodecError::TileCountMismatch {
                    expected: self.extent.tile_count(),
                    actual: flat.len(),
                },
            );
        };

        let format = TileFormat {
            encoding: encoding.parse::<TileEncoding>()?,
            compression: data.attr("compression").unwrap_or("").parse()?,
            compression_level: None,
        };
        self.detected = self.detected.or(Some(format));
        decode_layer_data(data.text.trim(), self.extent, &format)
    }

    fn layer(&mut self, node: &XmlElement) -> Result<IrLayer, MapError> {
        let options = self.options;
        let id = options.require(node.parse_attr("id")?, "layer", "id", 0)?;
        let name = options.require(
            node.attr("name").map(str::to_owned),
            &format!("layer {id}"),
            "name",
            String::new(),
        )?;
        let context = format!("layer '{name}'");

        let kind = match node.name.as_str() {
            "layer" => {
                let dims = [
                    ("height", node.parse_attr::<usize>("height")?, self.extent.rows),
                    ("width", node.parse_attr::<usize>("width")?, self.extent.cols),
                ];
                for (key, actual, expected) in dims {
                    if actual.is_some_and(|v| v != expected) {
                        warn!("{context} has {key} {actual:?}, the map has {expected}");
                    }
                }
                let data = required(node.child("data"), &context, "data")?;
                let tiles = self.tiles(data).map_err(|source| MapError::TileData {
                    layer: name.clone(),
                    source,
                })?;
                IrLayerKind::Tiles { tiles }
            }
            "objectgroup" => IrLayerKind::Objects {
                objects: objects_from_xml(node, options)?,
            },
            "group" => IrLayerKind::Group {
                layers: node
                    .children
                    .iter()
                    .filter(|child| is_layer_node(child))
                    .map(|child| self.layer(child))
                    .collect::<Result<_, _>>()?,
            },
            other => return Err(MapError::UnsupportedLayerType(other.to_owned())),
        };

        Ok(IrLayer {
            meta: meta_from_xml(node, &context, options)?,
            id,
            opacity: node.parse_attr("opacity")?.unwrap_or(1.0),
            visible: node.bool_attr("visible")?.unwrap_or(true),
            name,
            kind,
        })
    }
}

fn tile_from_xml(
    node: &XmlElement,
    tileset: &str,
    tile_count: i32,
    options: &ReadOptions,
) -> Result<IrTile, MapError> {
    let index: i32 = required(node.parse_attr("id")?, tileset, "id")?;
    let context = format!("tile {index} of {tileset}");
    if !(0..tile_count).contains(&index) {
        return Err(MapError::InvalidValue {
            context,
            key: "id".to_owned(),
            value: index.to_string(),
        });
    }

    let animation = match node.child("animation") {
        Some(list) => list
            .children_named("frame")
            .map(|frame| {
                Ok(IrAnimationFrame {
                    tile_index: required(frame.parse_attr("tileid")?, &context, "tileid")?,
                    duration_ms: required(frame.parse_attr("duration")?, &context, "duration")?,
                })
            })
            .collect::<Result<_, MapError>>()?,
        None => Vec::new(),
    };
    let objects = match node.child("objectgroup") {
        Some(group) => objects_from_xml(group, options)?,
        None => Vec::new(),
    };

    Ok(IrTile {
        index,
        meta: meta_from_xml(node, &context, options)?,
        objects,
        animation,
    })
}

fn tileset_from_xml(
    node: &XmlElement,
    fallback_name: String,
    is_embedded: bool,
    options: &ReadOptions,
) -> Result<IrTileset, MapError> {
    if node.name != "tileset" {
        return Err(MapError::InvalidMap(format!(
            "expected a <tileset> element, found <{}>",
            node.name
        )));
    }
    let name = options.require(
        node.attr("name").map(str::to_owned),
        "tileset",
        "name",
        fallback_name,
    )?;
    let context = format!("tileset '{name}'");
    if node.parse_attr::<i32>("margin")?.unwrap_or(0) != 0
        || node.parse_attr::<i32>("spacing")?.unwrap_or(0) != 0
    {
        warn!("{context} uses margin or spacing, which is ignored");
    }

    let tile_count = required(node.parse_attr("tilecount")?, &context, "tilecount")?;
    let image = required(node.child("image"), &context, "image")?;
    let image_path = options.resolve(required(image.attr("source"), &context, "source")?);
    options.check_image(&image_path)?;

    let mut tiles = node
        .children_named("tile")
        .map(|tile| tile_from_xml(tile, &context, tile_count, options))
        .collect::<Result<Vec<_>, _>>()?;
    tiles.sort_by_key(|t| t.index);

    Ok(IrTileset {
        meta: meta_from_xml(node, &context, options)?,
        tile_width: required(node.parse_attr("tilewidth")?, &context, "tilewidth")?,
        tile_height: required(node.parse_attr("tileheight")?, &context, "tileheight")?,
        tile_count,
        column_count: required(node.parse_attr("columns")?, &context, "columns")?,
        image_path,
        image_width: options.require(image.parse_attr("width")?, &context, "width", 0)?,
        image_height: options.require(image.parse_attr("height")?, &context, "height", 0)?,
        tiles,
        is_embedded,
        name,
    })
}

fn read_tileset_file(path: &Path, options: &ReadOptions) -> Result<IrTileset, MapError> {
    let root = XmlElement::parse(path, &read_text(path)?)?;
    tileset_from_xml(&root, file_stem(path), false, options)
}

fn parse_map(root: &XmlElement, path: &Path, options: &ReadOptions) -> Result<IrMap, MapError> {
    if root.name != "map" {
        return Err(MapError::InvalidMap(format!(
            "{} has root <{}>, expected <map>",
            path.display(),
            root.name
        )));
    }
    if let Some(orientation) = root.attr("orientation").filter(|&o| o != "orthogonal") {
        return Err(MapError::InvalidValue {
            context: "map".to_owned(),
            key: "orientation".to_owned(),
            value: orientation.to_owned(),
        });
    }
    if root.bool_attr("infinite")? == Some(true) {
        return Err(MapError::InvalidMap(format!(
            "{} is an infinite map",
            path.display()
        )));
    }

    let col_count: usize = required(root.parse_attr("width")?, "map", "width")?;
    let row_count: usize = required(root.parse_attr("height")?, "map", "height")?;
    let extent = TileExtent::new(row_count, col_count);
    if extent.is_empty() {
        return Err(MapError::InvalidMap(format!(
            "{} has an empty extent {row_count}x{col_count}",
            path.display()
        )));
    }

    let mut tilesets = Vec::new();
    for node in root.children_named("tileset") {
        let first_tile_id = required(node.parse_attr("firstgid")?, "tileset reference", "firstgid")?;
        let tileset = match node.attr("source") {
            Some(source) => {
                let source = options.resolve(source);
                read_tileset_file(&source, &options.nested(&source))?
            }
            None => tileset_from_xml(node, String::new(), true, options)?,
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
    let layers = root
        .children
        .iter()
        .filter(|child| is_layer_node(child))
        .map(|child| parser.layer(child))
        .collect::<Result<Vec<_>, _>>()?;

    let mut tile_format = parser.detected.unwrap_or_else(TileFormat::plain);
    if tile_format.compression != TileCompression::None {
        tile_format.compression_level = root
            .parse_attr::<i32>("compressionlevel")?
            .filter(|&level| level != -1);
    }
    tile_format
        .validate()
        .map_err(|e| MapError::InvalidMap(format!("tile format: {e}")))?;

    Ok(IrMap {
        meta: meta_from_xml(root, "map", options)?,
        row_count,
        col_count,
        tile_width: options.require(root.parse_attr("tilewidth")?, "map", "tilewidth", 32)?,
        tile_height: options.require(root.parse_attr("tileheight")?, "map", "tileheight", 32)?,
        next_layer_id: options.require(root.parse_attr("nextlayerid")?, "map", "nextlayerid", 1)?,
        next_object_id: options.require(
            root.parse_attr("nextobjectid")?,
            "map",
            "nextobjectid",
            1,
        )?,
        tile_format,
        component_definitions: Vec::new(),
        tilesets,
        layers,
    })
}

// ---------------------------------------------------------------------------
// Emitting

fn object_to_xml(object: &IrObject) -> Result<XmlElement, MapError> {
    let mut node = XmlElement::new("object").with_attr("id", object.id);
    if !object.name.is_empty() {
        node = node.with_attr("name", &object.name);
    }
    if !object.tag.is_empty() {
        node = node.with_attr("type", &object.tag);
    }
    for (key, value) in [
        ("x", object.x),
        ("y", object.y),
        ("width", object.width),
        ("height", object.height),
    ] {
        if value != 0.0 {
            node = node.with_attr(key, widen_f32(value));
        }
    }
    if !object.visible {
        node = node.with_attr("visible", 0);
    }

    push_properties(&mut node, &object.meta, &format!("object {}", object.id))?;
    match object.kind {
        ObjectKind::Point => node.children.push(XmlElement::new("point")),
        ObjectKind::Ellipse => node.children.push(XmlElement::new("ellipse")),
        ObjectKind::Rect => {}
    }
    Ok(node)
}

struct Emitter<'a> {
    map: &'a IrMap,
    options: &'a WriteOptions,
}

impl Emitter<'_> {
    fn tile_data(&self, layer: &IrLayer, tiles: &TileMatrix) -> Result<XmlElement, MapError> {
        let format = &self.map.tile_format;
        let mut data = XmlElement::new("data");
        let text = match format.encoding {
            TileEncoding::PlainText => {
                data = data.with_attr("encoding", "csv");
                let row_separator = if self.options.fold_tile_layer_data {
                    ",\n"
                } else {
                    ","
                };
                let text = encode_layer_data(tiles, format, ",", row_separator);
                // Tiled puts folded CSV on lines of its own.
                text.map(|t| {
                    if self.options.fold_tile_layer_data {
                        format!("\n{t}\n")
                    } else {
                        t
                    }
                })
            }
            TileEncoding::Base64 => {
                data = data.with_attr("encoding", "base64");
                if format.compression != TileCompression::None {
                    data = data.with_attr("compression", format.compression.as_str());
                }
                encode_layer_data(tiles, format, "", "")
            }
        };
        let text = text.map_err(|source| MapError::TileData {
            layer: layer.name.clone(),
            source,
        })?;
        Ok(data.with_text(text))
    }

    fn layer(&self, layer: &IrLayer) -> Result<XmlElement, MapError> {
        let element = match layer.kind {
            IrLayerKind::Tiles { .. } => "layer",
            IrLayerKind::Objects { .. } => "objectgroup",
            IrLayerKind::Group { .. } => "group",
        };
        let mut node = XmlElement::new(element)
            .with_attr("id", layer.id)
            .with_attr("name", &layer.name);
        if let IrLayerKind::Tiles { .. } = layer.kind {
            node = node
                .with_attr("width", self.map.col_count)
                .with_attr("height", self.map.row_count);
        }
        if layer.opacity != 1.0 {
            node = node.with_attr("opacity", widen_f32(layer.opacity));
        }
        if !layer.visible {
            node = node.with_attr("visible", 0);
        }
        push_properties(&mut node, &layer.meta, &format!("layer '{}'", layer.name))?;

        match &layer.kind {
            IrLayerKind::Tiles { tiles } => node.children.push(self.tile_data(layer, tiles)?),
            IrLayerKind::Objects { objects } => {
                for object in objects {
                    node.children.push(object_to_xml(object)?);
                }
            }
            IrLayerKind::Group { layers } => {
                for child in layers {
                    node.children.push(self.layer(child)?);
                }
            }
        }
        Ok(node)
    }
}

fn tile_to_xml(tile: &IrTile, tileset: &str) -> Result<XmlElement, MapError> {
    let mut node = XmlElement::new("tile").with_attr("id", tile.index);
    push_properties(&mut node, &tile.meta, &format!("tile {} of {tileset}", tile.index))?;
    if !tile.objects.is_empty() {
        let mut group = XmlElement::new("objectgroup").with_attr("draworder", "index");
        for object in &tile.objects {
            group.children.push(object_to_xml(object)?);
        }
        node.children.push(group);
    }
    if !tile.animation.is_empty() {
        let mut animation = XmlElement::new("animation");
        for frame in &tile.animation {
            animation.children.push(
                XmlElement::new("frame")
                    .with_attr("tileid", frame.tile_index)
                    .with_attr("duration", frame.duration_ms),
            );
        }
        node.children.push(animation);
    }
    Ok(node)
}

/// Fills `node` with the tileset's attributes and children.
fn tileset_to_xml(
    mut node: XmlElement,
    tileset: &IrTileset,
    dir: &Path,
) -> Result<XmlElement, MapError> {
    let context = format!("tileset '{}'", tileset.name);
    node = node
        .with_attr("name", &tileset.name)
        .with_attr("tilewidth", tileset.tile_width)
        .with_attr("tileheight", tileset.tile_height)
        .with_attr("tilecount", tileset.tile_count)
        .with_attr("columns", tileset.column_count);
    push_properties(&mut node, &tileset.meta, &context)?;
    node.children.push(
        XmlElement::new("image")
            .with_attr("source", relative_path(&tileset.image_path, dir))
            .with_attr("width", tileset.image_width)
            .with_attr("height", tileset.image_height),
    );
    for tile in &tileset.tiles {
        node.children.push(tile_to_xml(tile, &context)?);
    }
    Ok(node)
}

fn external_tileset_to_xml(tileset: &IrTileset, dir: &Path) -> Result<XmlElement, MapError> {
    let root = XmlElement::new("tileset")
        .with_attr("version", FORMAT_VERSION)
        .with_attr("tiledversion", TILED_VERSION);
    tileset_to_xml(root, tileset, dir)
}

impl SaveFormat for TiledXmlFormat {
    fn id(&self) -> SaveFormatId {
        SaveFormatId::TiledXml
    }

    fn is_valid_extension(&self, extension: &str) -> bool {
        matches!(
            extension.to_ascii_lowercase().as_str(),
            "tmx" | "tsx" | "xml"
        )
    }

    fn load_map(&self, path: &Path, options: &ReadOptions) -> Result<IrMap, MapError> {
        let root = XmlElement::parse(path, &read_text(path)?)?;
        parse_map(&root, path, options)
    }

    fn load_tileset(&self, path: &Path, options: &ReadOptions) -> Result<IrTileset, MapError> {
        read_tileset_file(path, options)
    }

    fn save_map(&self, path: &Path, map: &IrMap, options: &WriteOptions) -> Result<(), MapError> {
        if !map.component_definitions.is_empty() {
            warn!("component definitions are not stored in Tiled XML files");
        }

        let mut root = XmlElement::new("map")
            .with_attr("version", FORMAT_VERSION)
            .with_attr("tiledversion", TILED_VERSION)
            .with_attr("orientation", "orthogonal")
            .with_attr("renderorder", "right-down")
            .with_attr("width", map.col_count)
            .with_attr("height", map.row_count)
            .with_attr("tilewidth", map.tile_width)
            .with_attr("tileheight", map.tile_height)
            .with_attr("infinite", 0)
            .with_attr("nextlayerid", map.next_layer_id)
            .with_attr("nextobjectid", map.next_object_id);
        if let Some(level) = map.tile_format.compression_level {
            root = root.with_attr("compressionlevel", level);
        }
        push_properties(&mut root, &map.meta, "map")?;

        for entry in &map.tilesets {
            let node = XmlElement::new("tileset").with_attr("firstgid", entry.first_tile_id);
            if options.use_external_tilesets {
                let file_name = external_tileset_name(&entry.tileset, self.id());
                let tileset_path = options.base_dir.join(&file_name);
                self.save_tileset(&tileset_path, &entry.tileset, options)?;
                info!("wrote tileset {}", tileset_path.display());
                root.children.push(node.with_attr("source", file_name));
            } else {
                root.children
                    .push(tileset_to_xml(node, &entry.tileset, &options.base_dir)?);
            }
        }

        let emitter = Emitter { map, options };
        for layer in &map.layers {
            root.children.push(emitter.layer(layer)?);
        }
        write_text(path, &root.write(path, options.use_indentation)?)
    }

    fn save_tileset(
        &self,
        path: &Path,
        tileset: &IrTileset,
        options: &WriteOptions,
    ) -> Result<(), MapError> {
        let root = external_tileset_to_xml(tileset, &options.base_dir)?;
        write_text(path, &root.write(path, options.use_indentation)?)
    }
}
