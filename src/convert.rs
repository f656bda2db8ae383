// src/convert.rs
//! Conversion between the live [`Map`] document and the save-file IR.

use crate::error::MapError;
use crate::ir_map::*;
use crate::layer::{Layer, LayerKind};
use crate::map::Map;
use crate::object::Object;
use crate::tileset::{AnimationFrame, TileAnimation, Texture, TextureHandle, TextureLoader, Tileset};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

fn object_to_ir(object: &Object) -> IrObject {
    IrObject {
        meta: object.meta.clone(),
        id: object.id,
        kind: object.kind,
        x: object.x,
        y: object.y,
        width: object.width,
        height: object.height,
        name: object.name.clone(),
        tag: object.tag.clone(),
        visible: object.visible,
    }
}

fn object_from_ir(ir: &IrObject) -> Object {
    let mut object = Object::new(ir.id, ir.kind);
    object.x = ir.x;
    object.y = ir.y;
    object.width = ir.width;
    object.height = ir.height;
    object.visible = ir.visible;
    object.name = ir.name.clone();
    object.tag = ir.tag.clone();
    object.meta = ir.meta.clone();
    object
}

fn tileset_to_ir(tileset: &Tileset, embedded: bool) -> IrTileset {
    let tiles = tileset
        .tiles()
        .map(|(index, def)| IrTile {
            index,
            meta: def.meta.clone(),
            objects: def.objects.iter().map(object_to_ir).collect(),
            animation: def
                .animation
                .as_ref()
                .map(|a| {
                    a.frames()
                        .iter()
                        .map(|f| IrAnimationFrame {
                            tile_index: f.tile_index,
                            duration_ms: f.duration.as_millis() as u64,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .filter(|tile| !tile.is_plain())
        .collect();

    IrTileset {
        meta: tileset.meta.clone(),
        name: tileset.name.clone(),
        tile_width: tileset.tile_width,
        tile_height: tileset.tile_height,
        tile_count: tileset.tile_count,
        column_count: tileset.column_count,
        image_path: tileset.image_path.clone(),
        image_width: tileset.image_width,
        image_height: tileset.image_height,
        tiles,
        is_embedded: embedded,
    }
}

fn tileset_from_ir(ir: &IrTileset, loader: &mut dyn TextureLoader) -> Result<Tileset, MapError> {
    let texture = loader.load_texture(&ir.image_path).unwrap_or_else(|| {
        debug!("no texture for tileset image {}", ir.image_path.display());
        Texture {
            handle: TextureHandle::default(),
            width: ir.image_width,
            height: ir.image_height,
        }
    });
    let mut tileset = Tileset::with_grid(
        ir.name.clone(),
        ir.image_path.clone(),
        texture,
        ir.tile_width,
        ir.tile_height,
        ir.tile_count,
        ir.column_count,
    );
    tileset.meta = ir.meta.clone();

    for tile in &ir.tiles {
        let def = tileset.tile_mut(tile.index).ok_or_else(|| {
            MapError::InvalidMap(format!(
                "tile index {} is outside tileset '{}' ({} tiles)",
                tile.index, ir.name, ir.tile_count
            ))
        })?;
        def.meta = tile.meta.clone();
        def.objects = tile.objects.iter().map(object_from_ir).collect();
        if !tile.animation.is_empty() {
            def.animation = Some(TileAnimation::new(
                tile.animation
                    .iter()
                    .map(|f| AnimationFrame {
                        tile_index: f.tile_index,
                        duration: Duration::from_millis(f.duration_ms),
                    })
                    .collect(),
            ));
        }
    }
    Ok(tileset)
}

impl Map {
    fn layer_to_ir(&self, layer: &Layer) -> IrLayer {
        let kind = match &layer.kind {
            LayerKind::Tile(tiles) => IrLayerKind::Tiles {
                tiles: tiles.clone(),
            },
            LayerKind::Object(objects) => IrLayerKind::Objects {
                objects: objects.iter().map(object_to_ir).collect(),
            },
            LayerKind::Group(children) => IrLayerKind::Group {
                layers: self.layers_to_ir(children),
            },
        };
        IrLayer {
            meta: layer.meta.clone(),
            id: layer.id,
            name: layer.name.clone(),
            opacity: layer.opacity,
            visible: layer.visible,
            kind,
        }
    }

    fn layers_to_ir(&self, uuids: &[Uuid]) -> Vec<IrLayer> {
        uuids
            .iter()
            .filter_map(|&u| self.layer(u))
            .map(|l| self.layer_to_ir(l))
            .collect()
    }

    /// Snapshot of the document for the save formats.
    pub fn to_ir(&self) -> IrMap {
        let mut tilesets: Vec<IrTilesetRef> = self
            .tilesets()
            .iter()
            .map(|r| IrTilesetRef {
                first_tile_id: r.first_tile,
                tileset: tileset_to_ir(&r.tileset, r.embedded),
            })
            .collect();
        tilesets.sort_by_key(|t| t.first_tile_id);

        let extent = self.extent();
        IrMap {
            meta: self.meta.clone(),
            row_count: extent.rows,
            col_count: extent.cols,
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            next_layer_id: self.next_layer_id(),
            next_object_id: self.next_object_id(),
            tile_format: self.tile_format,
            component_definitions: self.component_definitions.clone(),
            tilesets,
            layers: self.layers_to_ir(self.layers().children(None)),
        }
    }

    fn import_layers(
        &mut self,
        parent: Option<Uuid>,
        layers: &[IrLayer],
        max_ids: &mut (i32, i32),
    ) -> Result<(), MapError> {
        for ir in layers {
            max_ids.0 = max_ids.0.max(ir.id);
            let kind = match &ir.kind {
                IrLayerKind::Tiles { tiles } => {
                    if tiles.extent() != self.extent() {
                        return Err(MapError::InvalidMap(format!(
                            "tile layer '{}' is {}x{} but the map is {}x{}",
                            ir.name,
                            tiles.extent().rows,
                            tiles.extent().cols,
                            self.extent().rows,
                            self.extent().cols
                        )));
                    }
                    LayerKind::Tile(tiles.clone())
                }
                IrLayerKind::Objects { objects } => {
                    for o in objects {
                        max_ids.1 = max_ids.1.max(o.id);
                    }
                    LayerKind::Object(objects.iter().map(object_from_ir).collect())
                }
                IrLayerKind::Group { .. } => LayerKind::Group(Vec::new()),
            };

            let mut layer = Layer::new(ir.id, ir.name.clone(), kind);
            layer.opacity = ir.opacity.clamp(0.0, 1.0);
            layer.visible = ir.visible;
            layer.meta = ir.meta.clone();
            let uuid = self
                .insert_layer(parent, layer)
                .map_err(|e| MapError::InvalidMap(e.to_string()))?;

            if let IrLayerKind::Group { layers } = &ir.kind {
                self.import_layers(Some(uuid), layers, max_ids)?;
            }
        }
        Ok(())
    }

    /// Builds a document from a parsed save file.
    pub fn from_ir(ir: &IrMap, loader: &mut dyn TextureLoader) -> Result<Map, MapError> {
        if ir.row_count == 0 || ir.col_count == 0 {
            return Err(MapError::InvalidMap(format!(
                "map extent {}x{} is empty",
                ir.row_count, ir.col_count
            )));
        }
        ir.tile_format
            .validate()
            .map_err(|e| MapError::InvalidMap(e.to_string()))?;

        let mut map = Map::new(ir.extent(), ir.tile_width, ir.tile_height);
        map.meta = ir.meta.clone();
        map.tile_format = ir.tile_format;
        map.component_definitions = ir.component_definitions.clone();

        let mut refs: Vec<&IrTilesetRef> = ir.tilesets.iter().collect();
        refs.sort_by_key(|r| r.first_tile_id);
        let mut previous_end = 1;
        for r in refs {
            if r.first_tile_id < previous_end || r.tileset.tile_count < 0 {
                return Err(MapError::InvalidMap(format!(
                    "tileset '{}' starting at tile {} overlaps another tileset",
                    r.tileset.name, r.first_tile_id
                )));
            }
            previous_end = r.first_tile_id.saturating_add(r.tileset.tile_count);
            let tileset = tileset_from_ir(&r.tileset, loader)?;
            map.tilesets_mut()
                .attach_tileset_at(tileset, r.first_tile_id, r.tileset.is_embedded);
        }

        let mut max_ids = (0, 0);
        map.import_layers(None, &ir.layers, &mut max_ids)?;
        let after_layers = max_ids
            .0
            .checked_add(1)
            .ok_or_else(|| MapError::InvalidMap("layer id overflow".into()))?;
        let after_objects = max_ids
            .1
            .checked_add(1)
            .ok_or_else(|| MapError::InvalidMap("object id overflow".into()))?;
        map.set_next_ids(
            ir.next_layer_id.max(after_layers),
            ir.next_object_id.max(after_objects),
        );

        if let Some(&first) = map.layers().preorder().first() {
            map.select_layer(first)
                .map_err(|e| MapError::InvalidMap(e.to_string()))?;
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerType;
    use crate::matrix::{TileExtent, TilePos};
    use crate::property::{ComponentDefinition, PropertyValue};
    use crate::tileset::NullTextureLoader;
    use std::path::PathBuf;

    fn sample_map() -> Map {
        let mut map = Map::new(TileExtent::new(3, 4), 16, 16);
        map.meta
            .properties
            .insert("music", PropertyValue::Path(PathBuf::from("theme.ogg")));
        map.component_definitions.push(ComponentDefinition {
            name: "Health".into(),
            attributes: [("hp".to_string(), PropertyValue::Int(10))]
                .into_iter()
                .collect(),
        });

        let mut ts = Tileset::with_grid(
            "terrain".into(),
            PathBuf::from("terrain.png"),
            Texture {
                handle: TextureHandle(0),
                width: 64,
                height: 64,
            },
            16,
            16,
            16,
            4,
        );
        let tile = ts.tile_mut(2).unwrap();
        tile.animation = Some(TileAnimation::new(vec![AnimationFrame {
            tile_index: 3,
            duration: Duration::from_millis(150),
        }]));
        map.attach_tileset(ts, true);

        let tiles = map.add_layer(LayerType::Tile, None).unwrap();
        map.set_tile(tiles, TilePos::new(2, 3), 7).unwrap();
        let group = map.add_layer(LayerType::Group, None).unwrap();
        let objects = map.add_layer(LayerType::Object, Some(group)).unwrap();
        let rect = map.add_rectangle(objects, 1.0, 2.0, 3.0, 4.0).unwrap();
        map.set_object_tag(rect, "spawn").unwrap();
        map.set_layer_opacity(group, 0.5).unwrap();
        map
    }

    #[test]
    fn ir_snapshot_reflects_document() {
        let ir = sample_map().to_ir();
        assert_eq!(ir.extent(), TileExtent::new(3, 4));
        assert_eq!(ir.layer_count(), 3);
        assert_eq!(ir.next_layer_id, 4);
        assert_eq!(ir.next_object_id, 2);
        assert_eq!(ir.tilesets[0].first_tile_id, 1);
        assert_eq!(ir.tilesets[0].tileset.tiles.len(), 1);
        assert_eq!(ir.tilesets[0].tileset.tiles[0].animation[0].duration_ms, 150);

        match &ir.layers[1].kind {
            IrLayerKind::Group { layers } => match &layers[0].kind {
                IrLayerKind::Objects { objects } => assert_eq!(objects[0].tag, "spawn"),
                other => panic!("expected object layer, got {other:?}"),
            },
            other => panic!("expected group layer, got {other:?}"),
        }
    }

    #[test]
    fn document_survives_ir_round_trip() {
        let ir = sample_map().to_ir();
        let map = Map::from_ir(&ir, &mut NullTextureLoader).unwrap();
        assert_eq!(map.to_ir(), ir);
        assert!(map.active_layer().is_some());
    }

    #[test]
    fn rejects_mismatched_tile_layer() {
        let mut ir = sample_map().to_ir();
        if let IrLayerKind::Tiles { tiles } = &mut ir.layers[0].kind {
            tiles.add_row();
        }
        assert!(matches!(
            Map::from_ir(&ir, &mut NullTextureLoader),
            Err(MapError::InvalidMap(_))
        ));
    }

    #[test]
    fn rejects_overlapping_tilesets() {
        let mut ir = sample_map().to_ir();
        let mut second = ir.tilesets[0].clone();
        second.first_tile_id = 10;
        ir.tilesets.push(second);
        assert!(matches!(
            Map::from_ir(&ir, &mut NullTextureLoader),
            Err(MapError::InvalidMap(_))
        ));
    }

    #[test]
    fn counters_never_fall_behind_existing_ids() {
        let mut ir = sample_map().to_ir();
        ir.next_layer_id = 1;
        ir.next_object_id = 1;
        let map = Map::from_ir(&ir, &mut NullTextureLoader).unwrap();
        assert_eq!(map.next_layer_id(), 4);
        assert_eq!(map.next_object_id(), 2);
    }

    #[test]
    fn rejects_ids_with_no_successor() {
        let mut ir = sample_map().to_ir();
        ir.layers[0].id = i32::MAX;
        assert!(matches!(
            Map::from_ir(&ir, &mut NullTextureLoader),
            Err(MapError::InvalidMap(ref msg)) if msg == "layer id overflow"
        ));

        let mut ir = sample_map().to_ir();
        if let IrLayerKind::Group { layers } = &mut ir.layers[1].kind {
            if let IrLayerKind::Objects { objects } = &mut layers[0].kind {
                objects[0].id = i32::MAX;
            }
        }
        assert!(matches!(
            Map::from_ir(&ir, &mut NullTextureLoader),
            Err(MapError::InvalidMap(ref msg)) if msg == "object id overflow"
        ));
    }
}
