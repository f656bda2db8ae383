// src/ir_map.rs
use crate::codec::TileFormat;
use crate::matrix::{TileExtent, TileId, TileMatrix};
use crate::object::ObjectKind;
use crate::property::{ComponentDefinition, Metadata};
use std::path::PathBuf;

/// Canonical, format-agnostic map.
///
/// Produced fresh by every parser and consumed by every emitter; it carries
/// no identity beyond its values.
#[derive(Debug, Clone, PartialEq)]
pub struct IrMap {
    pub meta: Metadata,
    pub row_count: usize,
    pub col_count: usize,
    pub tile_width: i32,
    pub tile_height: i32,
    pub next_layer_id: i32,
    pub next_object_id: i32,
    pub tile_format: TileFormat,
    pub component_definitions: Vec<ComponentDefinition>,
    pub tilesets: Vec<IrTilesetRef>, // sorted by first_tile_id
    pub layers: Vec<IrLayer>,        // draw order: array order
}

impl IrMap {
    pub fn extent(&self) -> TileExtent {
        TileExtent::new(self.row_count, self.col_count)
    }

    /// Total number of layers, nested ones included.
    pub fn layer_count(&self) -> usize {
        fn count(layers: &[IrLayer]) -> usize {
            layers
                .iter()
                .map(|l| match &l.kind {
                    IrLayerKind::Group { layers } => 1 + count(layers),
                    _ => 1,
                })
                .sum()
        }
        count(&self.layers)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrTilesetRef {
    pub first_tile_id: TileId,
    pub tileset: IrTileset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrTileset {
    pub meta: Metadata,
    pub name: String,
    pub tile_width: i32,
    pub tile_height: i32,
    pub tile_count: i32,
    pub column_count: i32,
    /// Resolved against the reading base directory.
    pub image_path: PathBuf,
    pub image_width: i32,
    pub image_height: i32,
    /// Only tiles with animations, objects or metadata, ascending by index.
    pub tiles: Vec<IrTile>,
    pub is_embedded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrTile {
    pub index: i32,
    pub meta: Metadata,
    pub objects: Vec<IrObject>,
    pub animation: Vec<IrAnimationFrame>,
}

impl IrTile {
    pub fn new(index: i32) -> Self {
        Self {
            index,
            meta: Metadata::default(),
            objects: Vec::new(),
            animation: Vec::new(),
        }
    }

    pub fn is_plain(&self) -> bool {
        self.meta.is_empty() && self.objects.is_empty() && self.animation.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrAnimationFrame {
    pub tile_index: i32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrLayerKind {
    Tiles { tiles: TileMatrix },
    Objects { objects: Vec<IrObject> },
    Group { layers: Vec<IrLayer> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrLayer {
    pub meta: Metadata,
    pub id: i32,
    pub name: String,
    pub opacity: f32,
    pub visible: bool,
    pub kind: IrLayerKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrObject {
    pub meta: Metadata,
    pub id: i32,
    pub kind: ObjectKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub name: String,
    pub tag: String,
    pub visible: bool,
}
