// src/map.rs
use crate::codec::TileFormat;
use crate::error::EditError;
use crate::layer::{DetachedLayer, Layer, LayerKind, LayerTree, LayerType};
use crate::matrix::{TileExtent, TileId, TileMatrix, TilePos, EMPTY_TILE};
use crate::object::{Object, ObjectKind};
use crate::property::{ComponentDefinition, Metadata};
use crate::tileset::Tileset;
use crate::tileset_bundle::{TilesetBundle, TilesetRef};
use tracing::debug;
use uuid::Uuid;

/// Tiles reset by [`Map::fix_tiles`], per layer in pre-order, positions in
/// row-major order.
pub type FixedTiles = Vec<(Uuid, Vec<(TilePos, TileId)>)>;

/// An object taken out of its layer, with enough context to put it back.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedObject {
    pub layer: Uuid,
    pub index: usize,
    pub object: Object,
}

/// The map document: a layer tree, attached tilesets and id counters.
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    pub uuid: Uuid,
    pub name: String,
    pub meta: Metadata,
    pub tile_width: i32,
    pub tile_height: i32,
    pub tile_format: TileFormat,
    pub component_definitions: Vec<ComponentDefinition>,
    extent: TileExtent,
    layers: LayerTree,
    tilesets: TilesetBundle,
    active_layer: Option<Uuid>,
    next_layer_id: i32,
    next_object_id: i32,
    tile_layer_suffix: i32,
    object_layer_suffix: i32,
    group_layer_suffix: i32,
}

impl Default for Map {
    fn default() -> Self {
        Self::new(TileExtent::new(5, 5), 32, 32)
    }
}

impl Map {
    /// Panics if either dimension of `extent` is zero.
    pub fn new(extent: TileExtent, tile_width: i32, tile_height: i32) -> Self {
        assert!(!extent.is_empty(), "invalid map extent {extent:?}");
        Self {
            uuid: Uuid::new_v4(),
            name: String::new(),
            meta: Metadata::default(),
            tile_width,
            tile_height,
            tile_format: TileFormat::default(),
            component_definitions: Vec::new(),
            extent,
            layers: LayerTree::new(),
            tilesets: TilesetBundle::new(),
            active_layer: None,
            next_layer_id: 1,
            next_object_id: 1,
            tile_layer_suffix: 1,
            object_layer_suffix: 1,
            group_layer_suffix: 1,
        }
    }

    #[inline]
    pub fn extent(&self) -> TileExtent {
        self.extent
    }

    #[inline]
    pub fn layers(&self) -> &LayerTree {
        &self.layers
    }

    pub fn layer(&self, uuid: Uuid) -> Option<&Layer> {
        self.layers.get(uuid)
    }

    pub fn layer_mut(&mut self, uuid: Uuid) -> Option<&mut Layer> {
        self.layers.get_mut(uuid)
    }

    #[inline]
    pub fn tilesets(&self) -> &TilesetBundle {
        &self.tilesets
    }

    #[inline]
    pub fn tilesets_mut(&mut self) -> &mut TilesetBundle {
        &mut self.tilesets
    }

    #[inline]
    pub fn active_layer(&self) -> Option<Uuid> {
        self.active_layer
    }

    #[inline]
    pub fn next_layer_id(&self) -> i32 {
        self.next_layer_id
    }

    #[inline]
    pub fn next_object_id(&self) -> i32 {
        self.next_object_id
    }

    /// Used when restoring counters from a save file. Counters never move
    /// backwards.
    pub fn set_next_ids(&mut self, next_layer_id: i32, next_object_id: i32) {
        self.next_layer_id = self.next_layer_id.max(next_layer_id);
        self.next_object_id = self.next_object_id.max(next_object_id);
    }

    fn take_layer_id(&mut self) -> i32 {
        let id = self.next_layer_id;
        self.next_layer_id += 1;
        id
    }

    fn take_object_id(&mut self) -> i32 {
        let id = self.next_object_id;
        self.next_object_id += 1;
        id
    }

    fn take_suffix(&mut self, layer_type: LayerType) -> i32 {
        let counter = match layer_type {
            LayerType::Tile => &mut self.tile_layer_suffix,
            LayerType::Object => &mut self.object_layer_suffix,
            LayerType::Group => &mut self.group_layer_suffix,
        };
        let suffix = *counter;
        *counter += 1;
        suffix
    }

    fn tile_layers_mut(&mut self) -> impl Iterator<Item = &mut TileMatrix> {
        self.layers.layers_mut().filter_map(Layer::tiles_mut)
    }

    pub fn add_row(&mut self) {
        self.extent.rows += 1;
        self.tile_layers_mut().for_each(TileMatrix::add_row);
    }

    pub fn add_column(&mut self) {
        self.extent.cols += 1;
        self.tile_layers_mut().for_each(TileMatrix::add_column);
    }

    /// Fails on a single-row map.
    pub fn remove_row(&mut self) -> Result<(), EditError> {
        if self.extent.rows <= 1 {
            return Err(EditError::MinimumExtent);
        }
        self.extent.rows -= 1;
        self.tile_layers_mut().for_each(|m| {
            m.remove_row();
        });
        Ok(())
    }

    /// Fails on a single-column map.
    pub fn remove_column(&mut self) -> Result<(), EditError> {
        if self.extent.cols <= 1 {
            return Err(EditError::MinimumExtent);
        }
        self.extent.cols -= 1;
        self.tile_layers_mut().for_each(|m| {
            m.remove_column();
        });
        Ok(())
    }

    /// Panics if either dimension of `extent` is zero.
    pub fn resize(&mut self, extent: TileExtent) {
        assert!(!extent.is_empty(), "invalid map extent {extent:?}");
        self.extent = extent;
        self.tile_layers_mut().for_each(|m| m.resize(extent));
    }

    /// Copies of every tile layer's tiles.
    pub fn snapshot_tile_layers(&self) -> Vec<(Uuid, TileMatrix)> {
        self.layers
            .layers()
            .filter_map(|l| Some((l.uuid, l.tiles()?.clone())))
            .collect()
    }

    /// Resizes to `extent` and puts back tiles taken by
    /// [`Map::snapshot_tile_layers`] at that extent.
    pub fn restore_tile_layers(&mut self, extent: TileExtent, snapshot: &[(Uuid, TileMatrix)]) {
        self.resize(extent);
        for (uuid, saved) in snapshot {
            if let Some(tiles) = self.layers.get_mut(*uuid).and_then(Layer::tiles_mut) {
                if saved.extent() == extent {
                    *tiles = saved.clone();
                }
            }
        }
    }

    /// Clears every non-empty tile that no attached tileset owns.
    pub fn fix_tiles(&mut self) -> FixedTiles {
        let mut fixed = FixedTiles::new();
        for uuid in self.layers.preorder() {
            let Some(tiles) = self.layers.get_mut(uuid).and_then(Layer::tiles_mut) else {
                continue;
            };
            let invalid: Vec<(TilePos, TileId)> = tiles
                .iter()
                .filter(|&(_, id)| id != EMPTY_TILE && !self.tilesets.is_valid_tile(id))
                .collect();
            if invalid.is_empty() {
                continue;
            }
            for &(pos, _) in &invalid {
                tiles.set_tile(pos, EMPTY_TILE);
            }
            fixed.push((uuid, invalid));
        }
        debug!("fixed {} layer(s) with invalid tiles", fixed.len());
        fixed
    }

    /// Puts back tiles cleared by [`Map::fix_tiles`].
    pub fn restore_tiles(&mut self, fixed: &FixedTiles) {
        for (uuid, tiles) in fixed {
            if let Some(matrix) = self.layers.get_mut(*uuid).and_then(Layer::tiles_mut) {
                for &(pos, id) in tiles {
                    matrix.set_tile(pos, id);
                }
            }
        }
    }

    /// Creates an empty layer with the next id and a default name.
    pub fn add_layer(
        &mut self,
        layer_type: LayerType,
        parent: Option<Uuid>,
    ) -> Result<Uuid, EditError> {
        if let Some(p) = parent {
            match self.layers.get(p).map(Layer::layer_type) {
                Some(LayerType::Group) => {}
                Some(_) => return Err(EditError::NotAGroupLayer(p)),
                None => return Err(EditError::UnknownLayer(p)),
            }
        }
        let suffix = self.take_suffix(layer_type);
        let name = format!("{} {}", layer_type.default_name(), suffix);
        let id = self.take_layer_id();
        let layer = Layer::empty(layer_type, id, name, self.extent);
        let uuid = self.layers.insert(parent, None, layer)?;
        if self.active_layer.is_none() {
            self.active_layer = Some(uuid);
        }
        Ok(uuid)
    }

    /// Inserts an already built layer, used when importing documents.
    ///
    /// Tile layers must match the map extent.
    pub fn insert_layer(&mut self, parent: Option<Uuid>, layer: Layer) -> Result<Uuid, EditError> {
        if let LayerKind::Tile(tiles) = &layer.kind {
            assert_eq!(
                tiles.extent(),
                self.extent,
                "tile layer '{}' does not match the map extent",
                layer.name
            );
        }
        self.layers.insert(parent, None, layer)
    }

    /// Takes a layer (and its subtree) out of the map.
    pub fn remove_layer(&mut self, uuid: Uuid) -> Result<DetachedLayer, EditError> {
        let detached = self.layers.detach(uuid).ok_or(EditError::UnknownLayer(uuid))?;
        if let Some(active) = self.active_layer {
            if detached.nodes().iter().any(|l| l.uuid == active) {
                self.active_layer = None;
            }
        }
        Ok(detached)
    }

    /// Reverses [`Map::remove_layer`].
    pub fn restore_layer(&mut self, detached: DetachedLayer) -> Result<Uuid, EditError> {
        let uuid = self.layers.reattach(detached)?;
        if self.active_layer.is_none() {
            self.active_layer = Some(uuid);
        }
        Ok(uuid)
    }

    /// Deep copy of a layer placed right after it, with fresh layer and
    /// object ids. Names are copied unchanged.
    pub fn duplicate_layer(&mut self, uuid: Uuid) -> Result<Uuid, EditError> {
        let mut next_layer_id = self.next_layer_id;
        let mut next_object_id = self.next_object_id;
        let copy = self.layers.duplicate(
            uuid,
            &mut || {
                next_layer_id += 1;
                next_layer_id - 1
            },
            &mut || {
                next_object_id += 1;
                next_object_id - 1
            },
        )?;
        self.next_layer_id = next_layer_id;
        self.next_object_id = next_object_id;
        Ok(copy)
    }

    pub fn select_layer(&mut self, uuid: Uuid) -> Result<(), EditError> {
        if !self.layers.contains(uuid) {
            return Err(EditError::UnknownLayer(uuid));
        }
        self.active_layer = Some(uuid);
        Ok(())
    }

    pub fn move_layer_up(&mut self, uuid: Uuid) -> Result<(), EditError> {
        self.layers.move_up(uuid)
    }

    pub fn move_layer_down(&mut self, uuid: Uuid) -> Result<(), EditError> {
        self.layers.move_down(uuid)
    }

    fn existing_layer_mut(&mut self, uuid: Uuid) -> Result<&mut Layer, EditError> {
        self.layers.get_mut(uuid).ok_or(EditError::UnknownLayer(uuid))
    }

    /// Returns the previous name.
    pub fn rename_layer(&mut self, uuid: Uuid, name: impl Into<String>) -> Result<String, EditError> {
        let layer = self.existing_layer_mut(uuid)?;
        Ok(std::mem::replace(&mut layer.name, name.into()))
    }

    /// Clamps to `[0, 1]` and returns the previous opacity.
    pub fn set_layer_opacity(&mut self, uuid: Uuid, opacity: f32) -> Result<f32, EditError> {
        let layer = self.existing_layer_mut(uuid)?;
        Ok(std::mem::replace(&mut layer.opacity, opacity.clamp(0.0, 1.0)))
    }

    /// Returns the previous visibility.
    pub fn set_layer_visible(&mut self, uuid: Uuid, visible: bool) -> Result<bool, EditError> {
        let layer = self.existing_layer_mut(uuid)?;
        Ok(std::mem::replace(&mut layer.visible, visible))
    }

    fn tile_matrix_mut(&mut self, uuid: Uuid) -> Result<&mut TileMatrix, EditError> {
        self.existing_layer_mut(uuid)?
            .tiles_mut()
            .ok_or(EditError::NotATileLayer(uuid))
    }

    pub fn tile_at(&self, layer: Uuid, pos: TilePos) -> Option<TileId> {
        self.layers.get(layer)?.tiles()?.tile_at(pos)
    }

    /// `Ok(false)` when `pos` lies outside the map.
    pub fn set_tile(&mut self, layer: Uuid, pos: TilePos, id: TileId) -> Result<bool, EditError> {
        Ok(self.tile_matrix_mut(layer)?.set_tile(pos, id))
    }

    /// Writes several tiles at once and returns the previous values of the
    /// in-bounds positions.
    pub fn set_tiles(
        &mut self,
        layer: Uuid,
        tiles: &[(TilePos, TileId)],
    ) -> Result<Vec<(TilePos, TileId)>, EditError> {
        let matrix = self.tile_matrix_mut(layer)?;
        let mut previous = Vec::with_capacity(tiles.len());
        for &(pos, id) in tiles {
            if let Some(old) = matrix.tile_at(pos) {
                previous.push((pos, old));
                matrix.set_tile(pos, id);
            }
        }
        Ok(previous)
    }

    /// Flood fill on one tile layer; returns the rewritten positions.
    pub fn flood(
        &mut self,
        layer: Uuid,
        origin: TilePos,
        replacement: TileId,
    ) -> Result<Vec<TilePos>, EditError> {
        let matrix = self.tile_matrix_mut(layer)?;
        let mut affected = Vec::new();
        matrix.flood(origin, replacement, Some(&mut affected));
        Ok(affected)
    }

    /// Adds an object with the next object id to an object layer.
    pub fn add_object(
        &mut self,
        layer: Uuid,
        kind: ObjectKind,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<Uuid, EditError> {
        let layer_ref = self.layers.get(layer).ok_or(EditError::UnknownLayer(layer))?;
        if layer_ref.objects().is_none() {
            return Err(EditError::NotAnObjectLayer(layer));
        }
        let id = self.take_object_id();
        let object = Object::new(id, kind).with_bounds(x, y, width, height);
        let uuid = object.uuid;
        if let Some(objects) = self.layers.get_mut(layer).and_then(Layer::objects_mut) {
            objects.push(object);
        }
        Ok(uuid)
    }

    pub fn add_rectangle(&mut self, layer: Uuid, x: f32, y: f32, w: f32, h: f32) -> Result<Uuid, EditError> {
        self.add_object(layer, ObjectKind::Rect, x, y, w, h)
    }

    pub fn add_ellipse(&mut self, layer: Uuid, x: f32, y: f32, w: f32, h: f32) -> Result<Uuid, EditError> {
        self.add_object(layer, ObjectKind::Ellipse, x, y, w, h)
    }

    pub fn add_point(&mut self, layer: Uuid, x: f32, y: f32) -> Result<Uuid, EditError> {
        self.add_object(layer, ObjectKind::Point, x, y, 0.0, 0.0)
    }

    pub fn object(&self, uuid: Uuid) -> Option<&Object> {
        let (layer, index) = self.layers.find_object(uuid)?;
        self.layers.get(layer)?.objects()?.get(index)
    }

    pub fn object_mut(&mut self, uuid: Uuid) -> Option<&mut Object> {
        let (layer, index) = self.layers.find_object(uuid)?;
        self.layers.get_mut(layer)?.objects_mut()?.get_mut(index)
    }

    fn existing_object_mut(&mut self, uuid: Uuid) -> Result<&mut Object, EditError> {
        self.object_mut(uuid).ok_or(EditError::UnknownObject(uuid))
    }

    /// Removes an object from whichever layer holds it.
    pub fn remove_object(&mut self, uuid: Uuid) -> Result<RemovedObject, EditError> {
        let (layer, index) = self
            .layers
            .find_object(uuid)
            .ok_or(EditError::UnknownObject(uuid))?;
        let objects = self
            .layers
            .get_mut(layer)
            .and_then(Layer::objects_mut)
            .ok_or(EditError::NotAnObjectLayer(layer))?;
        let object = objects.remove(index);
        Ok(RemovedObject {
            layer,
            index,
            object,
        })
    }

    /// Reverses [`Map::remove_object`].
    pub fn restore_object(&mut self, removed: RemovedObject) -> Result<Uuid, EditError> {
        let RemovedObject {
            layer,
            index,
            object,
        } = removed;
        let objects = self
            .existing_layer_mut(layer)?
            .objects_mut()
            .ok_or(EditError::NotAnObjectLayer(layer))?;
        let uuid = object.uuid;
        let at = index.min(objects.len());
        objects.insert(at, object);
        Ok(uuid)
    }

    /// Returns the previous position.
    pub fn move_object(&mut self, uuid: Uuid, x: f32, y: f32) -> Result<(f32, f32), EditError> {
        let object = self.existing_object_mut(uuid)?;
        let old = (object.x, object.y);
        object.x = x;
        object.y = y;
        Ok(old)
    }

    pub fn set_object_name(&mut self, uuid: Uuid, name: impl Into<String>) -> Result<String, EditError> {
        let object = self.existing_object_mut(uuid)?;
        Ok(std::mem::replace(&mut object.name, name.into()))
    }

    pub fn set_object_tag(&mut self, uuid: Uuid, tag: impl Into<String>) -> Result<String, EditError> {
        let object = self.existing_object_mut(uuid)?;
        Ok(std::mem::replace(&mut object.tag, tag.into()))
    }

    pub fn set_object_visible(&mut self, uuid: Uuid, visible: bool) -> Result<bool, EditError> {
        let object = self.existing_object_mut(uuid)?;
        Ok(std::mem::replace(&mut object.visible, visible))
    }

    /// Attaches at the next free tile id; returns the tileset UUID.
    pub fn attach_tileset(&mut self, tileset: Tileset, embedded: bool) -> Uuid {
        let uuid = tileset.uuid;
        let first = self.tilesets.attach_tileset(tileset, embedded);
        debug!("attached tileset {uuid} at tile {first}");
        uuid
    }

    pub fn detach_tileset(&mut self, uuid: Uuid) -> Result<TilesetRef, EditError> {
        self.tilesets
            .detach_tileset(uuid)
            .ok_or(EditError::UnknownTileset(uuid))
    }

    /// Reattaches a tileset at its original first tile id.
    pub fn restore_tileset(&mut self, tileset: TilesetRef) {
        self.tilesets
            .attach_tileset_at(tileset.tileset, tileset.first_tile, tileset.embedded);
    }
}
