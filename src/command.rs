// src/command.rs
//! Reversible map edits and the bounded undo/redo stack.

use crate::error::EditError;
use crate::layer::{DetachedLayer, LayerType};
use crate::map::{FixedTiles, Map, RemovedObject};
use crate::matrix::{TileExtent, TileId, TileMatrix, TilePos};
use crate::object::ObjectKind;
use crate::tileset::Tileset;
use crate::tileset_bundle::TilesetRef;
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

/// Undo history length used when nothing else is configured.
pub const DEFAULT_CAPACITY: usize = 100;

/// Extent and tile layer contents from before a resizing edit.
type TileSnapshot = (TileExtent, Vec<(Uuid, TileMatrix)>);

/// A reversible edit. Each variant carries what it needs to undo itself;
/// the undo payload is filled in by the first `redo`.
#[derive(Clone, Debug)]
pub enum Command {
    AddRow,
    AddColumn,
    RemoveRow { before: Option<TileSnapshot> },
    RemoveColumn { before: Option<TileSnapshot> },
    Resize { extent: TileExtent, before: Option<TileSnapshot> },
    FixTiles { fixed: FixedTiles },
    AddLayer {
        layer_type: LayerType,
        parent: Option<Uuid>,
        added: Option<Uuid>,
        undone: Option<DetachedLayer>,
    },
    RemoveLayer { layer: Uuid, removed: Option<DetachedLayer> },
    DuplicateLayer {
        source: Uuid,
        copy: Option<Uuid>,
        undone: Option<DetachedLayer>,
    },
    MoveLayerUp { layer: Uuid },
    MoveLayerDown { layer: Uuid },
    RenameLayer { layer: Uuid, name: String, previous: Option<String> },
    SetLayerOpacity { layer: Uuid, opacity: f32, previous: Option<f32> },
    SetLayerVisible { layer: Uuid, visible: bool, previous: Option<bool> },
    SetTiles {
        layer: Uuid,
        tiles: Vec<(TilePos, TileId)>,
        previous: Vec<(TilePos, TileId)>,
    },
    Flood {
        layer: Uuid,
        origin: TilePos,
        replacement: TileId,
        target: Option<TileId>,
        affected: Vec<TilePos>,
    },
    AddObject {
        layer: Uuid,
        kind: ObjectKind,
        bounds: [f32; 4],
        added: Option<Uuid>,
        undone: Option<RemovedObject>,
    },
    RemoveObject { object: Uuid, removed: Option<RemovedObject> },
    MoveObject { object: Uuid, to: (f32, f32), from: Option<(f32, f32)> },
    SetObjectName { object: Uuid, name: String, previous: Option<String> },
    SetObjectTag { object: Uuid, tag: String, previous: Option<String> },
    SetObjectVisible { object: Uuid, visible: bool, previous: Option<bool> },
    AttachTileset {
        uuid: Uuid,
        tileset: Option<Tileset>,
        embedded: bool,
        undone: Option<TilesetRef>,
    },
    DetachTileset { tileset: Uuid, removed: Option<TilesetRef> },
}

impl Command {
    pub fn resize(extent: TileExtent) -> Self {
        Command::Resize {
            extent,
            before: None,
        }
    }

    pub fn add_layer(layer_type: LayerType, parent: Option<Uuid>) -> Self {
        Command::AddLayer {
            layer_type,
            parent,
            added: None,
            undone: None,
        }
    }

    pub fn remove_layer(layer: Uuid) -> Self {
        Command::RemoveLayer {
            layer,
            removed: None,
        }
    }

    pub fn duplicate_layer(source: Uuid) -> Self {
        Command::DuplicateLayer {
            source,
            copy: None,
            undone: None,
        }
    }

    pub fn rename_layer(layer: Uuid, name: impl Into<String>) -> Self {
        Command::RenameLayer {
            layer,
            name: name.into(),
            previous: None,
        }
    }

    pub fn set_layer_opacity(layer: Uuid, opacity: f32) -> Self {
        Command::SetLayerOpacity {
            layer,
            opacity,
            previous: None,
        }
    }

    pub fn set_layer_visible(layer: Uuid, visible: bool) -> Self {
        Command::SetLayerVisible {
            layer,
            visible,
            previous: None,
        }
    }

    /// Stamp (or erase, with [`crate::EMPTY_TILE`]) a set of tiles.
    pub fn set_tiles(layer: Uuid, tiles: Vec<(TilePos, TileId)>) -> Self {
        Command::SetTiles {
            layer,
            tiles,
            previous: Vec::new(),
        }
    }

    pub fn flood(layer: Uuid, origin: TilePos, replacement: TileId) -> Self {
        Command::Flood {
            layer,
            origin,
            replacement,
            target: None,
            affected: Vec::new(),
        }
    }

    pub fn add_rectangle(layer: Uuid, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::add_object(layer, ObjectKind::Rect, [x, y, width, height])
    }

    pub fn add_ellipse(layer: Uuid, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::add_object(layer, ObjectKind::Ellipse, [x, y, width, height])
    }

    pub fn add_point(layer: Uuid, x: f32, y: f32) -> Self {
        Self::add_object(layer, ObjectKind::Point, [x, y, 0.0, 0.0])
    }

    fn add_object(layer: Uuid, kind: ObjectKind, bounds: [f32; 4]) -> Self {
        Command::AddObject {
            layer,
            kind,
            bounds,
            added: None,
            undone: None,
        }
    }

    pub fn remove_object(object: Uuid) -> Self {
        Command::RemoveObject {
            object,
            removed: None,
        }
    }

    pub fn move_object(object: Uuid, x: f32, y: f32) -> Self {
        Command::MoveObject {
            object,
            to: (x, y),
            from: None,
        }
    }

    pub fn set_object_name(object: Uuid, name: impl Into<String>) -> Self {
        Command::SetObjectName {
            object,
            name: name.into(),
            previous: None,
        }
    }

    pub fn set_object_tag(object: Uuid, tag: impl Into<String>) -> Self {
        Command::SetObjectTag {
            object,
            tag: tag.into(),
            previous: None,
        }
    }

    pub fn set_object_visible(object: Uuid, visible: bool) -> Self {
        Command::SetObjectVisible {
            object,
            visible,
            previous: None,
        }
    }

    pub fn attach_tileset(tileset: Tileset, embedded: bool) -> Self {
        Command::AttachTileset {
            uuid: tileset.uuid,
            tileset: Some(tileset),
            embedded,
            undone: None,
        }
    }

    pub fn detach_tileset(tileset: Uuid) -> Self {
        Command::DetachTileset {
            tileset,
            removed: None,
        }
    }

    /// Short human readable label, used for "Undo ..." menu entries.
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddRow => "Add Row",
            Command::AddColumn => "Add Column",
            Command::RemoveRow { .. } => "Remove Row",
            Command::RemoveColumn { .. } => "Remove Column",
            Command::Resize { .. } => "Resize Map",
            Command::FixTiles { .. } => "Fix Invalid Tiles",
            Command::AddLayer { .. } => "Add Layer",
            Command::RemoveLayer { .. } => "Remove Layer",
            Command::DuplicateLayer { .. } => "Duplicate Layer",
            Command::MoveLayerUp { .. } => "Move Layer Up",
            Command::MoveLayerDown { .. } => "Move Layer Down",
            Command::RenameLayer { .. } => "Rename Layer",
            Command::SetLayerOpacity { .. } => "Set Layer Opacity",
            Command::SetLayerVisible { .. } => "Set Layer Visibility",
            Command::SetTiles { .. } => "Stamp Tiles",
            Command::Flood { .. } => "Flood Fill",
            Command::AddObject { kind, .. } => match kind {
                ObjectKind::Point => "Add Point",
                ObjectKind::Rect => "Add Rectangle",
                ObjectKind::Ellipse => "Add Ellipse",
            },
            Command::RemoveObject { .. } => "Remove Object",
            Command::MoveObject { .. } => "Move Object",
            Command::SetObjectName { .. } => "Set Object Name",
            Command::SetObjectTag { .. } => "Set Object Tag",
            Command::SetObjectVisible { .. } => "Set Object Visibility",
            Command::AttachTileset { .. } => "Add Tileset",
            Command::DetachTileset { .. } => "Remove Tileset",
        }
    }

    /// Applies the edit, capturing what `undo` needs.
    pub fn redo(&mut self, map: &mut Map) -> Result<(), EditError> {
        match self {
            Command::AddRow => map.add_row(),
            Command::AddColumn => map.add_column(),
            Command::RemoveRow { before } => {
                let snapshot = (map.extent(), map.snapshot_tile_layers());
                map.remove_row()?;
                *before = Some(snapshot);
            }
            Command::RemoveColumn { before } => {
                let snapshot = (map.extent(), map.snapshot_tile_layers());
                map.remove_column()?;
                *before = Some(snapshot);
            }
            Command::Resize { extent, before } => {
                *before = Some((map.extent(), map.snapshot_tile_layers()));
                map.resize(*extent);
            }
            Command::FixTiles { fixed } => *fixed = map.fix_tiles(),
            Command::AddLayer {
                layer_type,
                parent,
                added,
                undone,
            } => match undone.take() {
                Some(detached) => {
                    map.restore_layer(detached)?;
                }
                None => *added = Some(map.add_layer(*layer_type, *parent)?),
            },
            Command::RemoveLayer { layer, removed } => *removed = Some(map.remove_layer(*layer)?),
            Command::DuplicateLayer {
                source,
                copy,
                undone,
            } => match undone.take() {
                Some(detached) => {
                    map.restore_layer(detached)?;
                }
                None => *copy = Some(map.duplicate_layer(*source)?),
            },
            Command::MoveLayerUp { layer } => map.move_layer_up(*layer)?,
            Command::MoveLayerDown { layer } => map.move_layer_down(*layer)?,
            Command::RenameLayer {
                layer,
                name,
                previous,
            } => *previous = Some(map.rename_layer(*layer, name.clone())?),
            Command::SetLayerOpacity {
                layer,
                opacity,
                previous,
            } => *previous = Some(map.set_layer_opacity(*layer, *opacity)?),
            Command::SetLayerVisible {
                layer,
                visible,
                previous,
            } => *previous = Some(map.set_layer_visible(*layer, *visible)?),
            Command::SetTiles {
                layer,
                tiles,
                previous,
            } => *previous = map.set_tiles(*layer, tiles)?,
            Command::Flood {
                layer,
                origin,
                replacement,
                target,
                affected,
            } => {
                let original = map.tile_at(*layer, *origin);
                *affected = map.flood(*layer, *origin, *replacement)?;
                *target = original;
            }
            Command::AddObject {
                layer,
                kind,
                bounds,
                added,
                undone,
            } => match undone.take() {
                Some(removed) => {
                    map.restore_object(removed)?;
                }
                None => {
                    let [x, y, w, h] = *bounds;
                    *added = Some(map.add_object(*layer, *kind, x, y, w, h)?);
                }
            },
            Command::RemoveObject { object, removed } => {
                *removed = Some(map.remove_object(*object)?)
            }
            Command::MoveObject { object, to, from } => {
                *from = Some(map.move_object(*object, to.0, to.1)?)
            }
            Command::SetObjectName {
                object,
                name,
                previous,
            } => *previous = Some(map.set_object_name(*object, name.clone())?),
            Command::SetObjectTag {
                object,
                tag,
                previous,
            } => *previous = Some(map.set_object_tag(*object, tag.clone())?),
            Command::SetObjectVisible {
                object,
                visible,
                previous,
            } => *previous = Some(map.set_object_visible(*object, *visible)?),
            Command::AttachTileset {
                uuid,
                tileset,
                embedded,
                undone,
            } => match (undone.take(), tileset.take()) {
                (Some(attached), _) => map.restore_tileset(attached),
                (None, Some(tileset)) => {
                    map.attach_tileset(tileset, *embedded);
                }
                (None, None) => return Err(EditError::UnknownTileset(*uuid)),
            },
            Command::DetachTileset { tileset, removed } => {
                *removed = Some(map.detach_tileset(*tileset)?)
            }
        }
        Ok(())
    }

    /// Reverts a previous `redo`.
    pub fn undo(&mut self, map: &mut Map) -> Result<(), EditError> {
        match self {
            Command::AddRow => map.remove_row()?,
            Command::AddColumn => map.remove_column()?,
            Command::RemoveRow { before }
            | Command::RemoveColumn { before }
            | Command::Resize { before, .. } => {
                if let Some((extent, tiles)) = before.take() {
                    map.restore_tile_layers(extent, &tiles);
                }
            }
            Command::FixTiles { fixed } => map.restore_tiles(fixed),
            Command::AddLayer { added, undone, .. } => {
                if let Some(uuid) = *added {
                    *undone = Some(map.remove_layer(uuid)?);
                }
            }
            Command::RemoveLayer { removed, .. } => {
                if let Some(detached) = removed.take() {
                    map.restore_layer(detached)?;
                }
            }
            Command::DuplicateLayer { copy, undone, .. } => {
                if let Some(uuid) = *copy {
                    *undone = Some(map.remove_layer(uuid)?);
                }
            }
            Command::MoveLayerUp { layer } => map.move_layer_down(*layer)?,
            Command::MoveLayerDown { layer } => map.move_layer_up(*layer)?,
            Command::RenameLayer {
                layer, previous, ..
            } => {
                if let Some(name) = previous.take() {
                    map.rename_layer(*layer, name)?;
                }
            }
            Command::SetLayerOpacity {
                layer, previous, ..
            } => {
                if let Some(opacity) = previous.take() {
                    map.set_layer_opacity(*layer, opacity)?;
                }
            }
            Command::SetLayerVisible {
                layer, previous, ..
            } => {
                if let Some(visible) = previous.take() {
                    map.set_layer_visible(*layer, visible)?;
                }
            }
            Command::SetTiles {
                layer, previous, ..
            } => {
                let restore: Vec<_> = previous.drain(..).rev().collect();
                map.set_tiles(*layer, &restore)?;
            }
            Command::Flood {
                layer,
                target,
                affected,
                ..
            } => {
                if let Some(original) = target.take() {
                    let restore: Vec<_> = affected.drain(..).map(|p| (p, original)).collect();
                    map.set_tiles(*layer, &restore)?;
                }
            }
            Command::AddObject { added, undone, .. } => {
                if let Some(uuid) = *added {
                    *undone = Some(map.remove_object(uuid)?);
                }
            }
            Command::RemoveObject { removed, .. } => {
                if let Some(object) = removed.take() {
                    map.restore_object(object)?;
                }
            }
            Command::MoveObject { object, from, .. } => {
                if let Some((x, y)) = from.take() {
                    map.move_object(*object, x, y)?;
                }
            }
            Command::SetObjectName {
                object, previous, ..
            } => {
                if let Some(name) = previous.take() {
                    map.set_object_name(*object, name)?;
                }
            }
            Command::SetObjectTag {
                object, previous, ..
            } => {
                if let Some(tag) = previous.take() {
                    map.set_object_tag(*object, tag)?;
                }
            }
            Command::SetObjectVisible {
                object, previous, ..
            } => {
                if let Some(visible) = previous.take() {
                    map.set_object_visible(*object, visible)?;
                }
            }
            Command::AttachTileset { uuid, undone, .. } => {
                *undone = Some(map.detach_tileset(*uuid)?);
            }
            Command::DetachTileset { removed, .. } => {
                if let Some(tileset) = removed.take() {
                    map.restore_tileset(tileset);
                }
            }
        }
        Ok(())
    }
}

/// Bounded undo/redo history.
///
/// `cursor` counts the commands currently applied; commands at or after it
/// can be redone. When full, pushing evicts the oldest command, so undoing
/// everything lands on the oldest retained state.
#[derive(Debug)]
pub struct CommandStack {
    commands: VecDeque<Command>,
    cursor: usize,
    clean: Option<usize>,
    capacity: usize,
}

impl Default for CommandStack {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl CommandStack {
    /// Capacities below one are raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            commands: VecDeque::new(),
            cursor: 0,
            clean: Some(0),
            capacity: capacity.max(1),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Index of the last applied command.
    #[inline]
    pub fn index(&self) -> Option<usize> {
        self.cursor.checked_sub(1)
    }

    /// Number of applied commands when the document was last marked clean,
    /// or `None` once that state is no longer reachable.
    #[inline]
    pub fn clean_index(&self) -> Option<usize> {
        self.clean
    }

    pub fn is_clean(&self) -> bool {
        self.clean == Some(self.cursor)
    }

    pub fn mark_as_clean(&mut self) {
        self.clean = Some(self.cursor);
    }

    /// Forgets the clean state; the document stays dirty until marked again.
    pub fn reset_clean_index(&mut self) {
        self.clean = None;
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.commands.len()
    }

    pub fn undo_text(&self) -> Option<&'static str> {
        self.index().map(|i| self.commands[i].name())
    }

    pub fn redo_text(&self) -> Option<&'static str> {
        self.commands.get(self.cursor).map(Command::name)
    }

    pub fn clear(&mut self) {
        self.clean = if self.is_clean() { Some(0) } else { None };
        self.commands.clear();
        self.cursor = 0;
    }

    fn evict_oldest(&mut self) {
        if self.commands.pop_front().is_some() {
            self.cursor = self.cursor.saturating_sub(1);
            self.clean = match self.clean {
                Some(c) if c > 0 => Some(c - 1),
                _ => None,
            };
        }
    }

    /// Applies `command` to `map` and records it. A command that fails to
    /// apply is not recorded.
    pub fn push(&mut self, mut command: Command, map: &mut Map) -> Result<(), EditError> {
        command.redo(map)?;
        debug!("executed '{}'", command.name());

        self.commands.truncate(self.cursor);
        if self.clean.is_some_and(|c| c > self.cursor) {
            self.clean = None;
        }
        if self.commands.len() >= self.capacity {
            self.evict_oldest();
        }
        self.commands.push_back(command);
        self.cursor = self.commands.len();
        Ok(())
    }

    pub fn undo(&mut self, map: &mut Map) -> Result<(), EditError> {
        let index = self.index().ok_or(EditError::NothingToUndo)?;
        self.commands[index].undo(map)?;
        self.cursor = index;
        Ok(())
    }

    pub fn redo(&mut self, map: &mut Map) -> Result<(), EditError> {
        let command = self
            .commands
            .get_mut(self.cursor)
            .ok_or(EditError::NothingToRedo)?;
        command.redo(map)?;
        self.cursor += 1;
        Ok(())
    }

    /// Shrinking drops the oldest applied commands first, then the newest
    /// redoable ones.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.commands.len() > self.capacity {
            if self.cursor > 0 {
                self.evict_oldest();
            } else {
                self.commands.pop_back();
                if self.clean.is_some_and(|c| c > self.commands.len()) {
                    self.clean = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::EMPTY_TILE;

    fn map_with_tile_layer() -> (Map, Uuid) {
        let mut map = Map::default();
        let layer = map.add_layer(LayerType::Tile, None).unwrap();
        (map, layer)
    }

    #[test]
    fn push_executes_and_undo_reverts() {
        let mut map = Map::default();
        let mut stack = CommandStack::default();
        stack.push(Command::AddRow, &mut map).unwrap();
        assert_eq!(map.extent(), TileExtent::new(6, 5));
        assert_eq!(stack.undo_text(), Some("Add Row"));

        stack.undo(&mut map).unwrap();
        assert_eq!(map.extent(), TileExtent::new(5, 5));
        assert!(!stack.can_undo());
        assert_eq!(stack.redo_text(), Some("Add Row"));

        stack.redo(&mut map).unwrap();
        assert_eq!(map.extent(), TileExtent::new(6, 5));
        assert_eq!(stack.undo(&mut map), Ok(()));
        assert_eq!(stack.undo(&mut map), Err(EditError::NothingToUndo));
    }

    #[test]
    fn default_capacity_matches_default_settings() {
        assert_eq!(CommandStack::default().capacity(), DEFAULT_CAPACITY);
        assert_eq!(
            crate::settings::EditorSettings::default().command_stack().capacity(),
            CommandStack::default().capacity()
        );
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut map = Map::default();
        let mut stack = CommandStack::new(3);
        for _ in 0..4 {
            stack.push(Command::AddColumn, &mut map).unwrap();
        }
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.index(), Some(2));

        while stack.can_undo() {
            stack.undo(&mut map).unwrap();
        }
        // The first column was evicted and can no longer be undone.
        assert_eq!(map.extent(), TileExtent::new(5, 6));
    }

    #[test]
    fn push_discards_redo_branch() {
        let mut map = Map::default();
        let mut stack = CommandStack::default();
        stack.push(Command::AddRow, &mut map).unwrap();
        stack.push(Command::AddColumn, &mut map).unwrap();
        stack.undo(&mut map).unwrap();
        stack.push(Command::AddRow, &mut map).unwrap();
        assert_eq!(stack.len(), 2);
        assert!(!stack.can_redo());
        assert_eq!(map.extent(), TileExtent::new(7, 5));
    }

    #[test]
    fn failed_command_is_not_recorded() {
        let mut map = Map::new(TileExtent::new(1, 1), 32, 32);
        let mut stack = CommandStack::default();
        let result = stack.push(Command::RemoveRow { before: None }, &mut map);
        assert_eq!(result, Err(EditError::MinimumExtent));
        assert!(stack.is_empty());
    }

    #[test]
    fn clean_index_tracks_saves() {
        let mut map = Map::default();
        let mut stack = CommandStack::new(2);
        assert!(stack.is_clean());

        stack.push(Command::AddRow, &mut map).unwrap();
        assert!(!stack.is_clean());
        stack.mark_as_clean();
        assert_eq!(stack.clean_index(), Some(1));

        stack.push(Command::AddRow, &mut map).unwrap();
        stack.undo(&mut map).unwrap();
        assert!(stack.is_clean());

        stack.redo(&mut map).unwrap();
        stack.push(Command::AddRow, &mut map).unwrap();
        // The saved state is now the oldest reachable one.
        assert_eq!(stack.clean_index(), Some(0));
        while stack.can_undo() {
            stack.undo(&mut map).unwrap();
        }
        assert!(stack.is_clean());

        stack.redo(&mut map).unwrap();
        stack.redo(&mut map).unwrap();
        stack.push(Command::AddRow, &mut map).unwrap();
        assert_eq!(stack.clean_index(), None);
    }

    #[test]
    fn clean_index_shifts_on_eviction() {
        let mut map = Map::default();
        let mut stack = CommandStack::new(3);
        stack.push(Command::AddRow, &mut map).unwrap();
        stack.push(Command::AddRow, &mut map).unwrap();
        stack.mark_as_clean();
        assert_eq!(stack.clean_index(), Some(2));
        stack.push(Command::AddRow, &mut map).unwrap();
        stack.push(Command::AddRow, &mut map).unwrap();
        assert_eq!(stack.clean_index(), Some(1));
        stack.reset_clean_index();
        assert_eq!(stack.clean_index(), None);
    }

    #[test]
    fn discarding_clean_branch_forgets_clean_state() {
        let mut map = Map::default();
        let mut stack = CommandStack::default();
        stack.push(Command::AddRow, &mut map).unwrap();
        stack.mark_as_clean();
        stack.undo(&mut map).unwrap();
        stack.push(Command::AddColumn, &mut map).unwrap();
        assert_eq!(stack.clean_index(), None);
        stack.undo(&mut map).unwrap();
        assert!(!stack.is_clean());
    }

    #[test]
    fn set_capacity_trims() {
        let mut map = Map::default();
        let mut stack = CommandStack::new(5);
        for _ in 0..5 {
            stack.push(Command::AddRow, &mut map).unwrap();
        }
        stack.set_capacity(2);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.index(), Some(1));

        stack.set_capacity(0);
        assert_eq!(stack.capacity(), 1);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn remove_row_undo_restores_lost_tiles() {
        let (mut map, layer) = map_with_tile_layer();
        map.set_tile(layer, TilePos::new(4, 2), 3).unwrap();
        let mut stack = CommandStack::default();
        stack
            .push(Command::RemoveRow { before: None }, &mut map)
            .unwrap();
        assert_eq!(map.tile_at(layer, TilePos::new(4, 2)), None);
        stack.undo(&mut map).unwrap();
        assert_eq!(map.tile_at(layer, TilePos::new(4, 2)), Some(3));
    }

    #[test]
    fn resize_undo_restores_extent_and_tiles() {
        let (mut map, layer) = map_with_tile_layer();
        map.set_tile(layer, TilePos::new(4, 4), 8).unwrap();
        let mut stack = CommandStack::default();
        stack
            .push(Command::resize(TileExtent::new(2, 2)), &mut map)
            .unwrap();
        assert_eq!(map.extent(), TileExtent::new(2, 2));
        stack.undo(&mut map).unwrap();
        assert_eq!(map.extent(), TileExtent::new(5, 5));
        assert_eq!(map.tile_at(layer, TilePos::new(4, 4)), Some(8));
    }

    #[test]
    fn stamp_and_flood_undo() {
        let (mut map, layer) = map_with_tile_layer();
        let mut stack = CommandStack::default();
        stack
            .push(
                Command::set_tiles(
                    layer,
                    vec![(TilePos::new(0, 0), 2), (TilePos::new(0, 0), 3), (TilePos::new(9, 9), 1)],
                ),
                &mut map,
            )
            .unwrap();
        assert_eq!(map.tile_at(layer, TilePos::new(0, 0)), Some(3));

        stack
            .push(Command::flood(layer, TilePos::new(2, 2), 5), &mut map)
            .unwrap();
        assert_eq!(map.tile_at(layer, TilePos::new(4, 4)), Some(5));
        assert_eq!(map.tile_at(layer, TilePos::new(0, 0)), Some(3));

        stack.undo(&mut map).unwrap();
        assert_eq!(map.tile_at(layer, TilePos::new(4, 4)), Some(EMPTY_TILE));
        stack.undo(&mut map).unwrap();
        assert_eq!(map.tile_at(layer, TilePos::new(0, 0)), Some(EMPTY_TILE));
    }

    #[test]
    fn layer_commands_round_trip() {
        let mut map = Map::default();
        let mut stack = CommandStack::default();
        stack
            .push(Command::add_layer(LayerType::Group, None), &mut map)
            .unwrap();
        let group = map.active_layer().unwrap();
        stack
            .push(Command::duplicate_layer(group), &mut map)
            .unwrap();
        assert_eq!(map.layers().len(), 2);
        let ids_after_duplicate = map.next_layer_id();

        stack.undo(&mut map).unwrap();
        assert_eq!(map.layers().len(), 1);
        stack.redo(&mut map).unwrap();
        assert_eq!(map.layers().len(), 2);
        assert_eq!(map.next_layer_id(), ids_after_duplicate);

        stack.push(Command::remove_layer(group), &mut map).unwrap();
        assert!(map.layer(group).is_none());
        stack.undo(&mut map).unwrap();
        assert_eq!(map.layers().children(None)[0], group);

        stack
            .push(Command::rename_layer(group, "Walls"), &mut map)
            .unwrap();
        stack
            .push(Command::set_layer_opacity(group, 0.25), &mut map)
            .unwrap();
        stack
            .push(Command::set_layer_visible(group, false), &mut map)
            .unwrap();
        stack
            .push(Command::MoveLayerDown { layer: group }, &mut map)
            .unwrap();
        assert_eq!(map.layers().children(None)[1], group);

        for _ in 0..4 {
            stack.undo(&mut map).unwrap();
        }
        let layer = map.layer(group).unwrap();
        assert_eq!(layer.name, "Group Layer 1");
        assert_eq!(layer.opacity, 1.0);
        assert!(layer.visible);
        assert_eq!(map.layers().children(None)[0], group);
    }

    #[test]
    fn object_commands_round_trip() {
        let mut map = Map::default();
        let layer = map.add_layer(LayerType::Object, None).unwrap();
        let mut stack = CommandStack::default();

        stack
            .push(Command::add_rectangle(layer, 1.0, 1.0, 4.0, 4.0), &mut map)
            .unwrap();
        let object = map.layer(layer).unwrap().objects().unwrap()[0].uuid;
        stack.undo(&mut map).unwrap();
        assert!(map.object(object).is_none());
        stack.redo(&mut map).unwrap();
        assert_eq!(map.object(object).unwrap().id, 1);
        assert_eq!(map.next_object_id(), 2);

        stack
            .push(Command::move_object(object, 10.0, 12.0), &mut map)
            .unwrap();
        stack
            .push(Command::set_object_name(object, "chest"), &mut map)
            .unwrap();
        stack
            .push(Command::set_object_tag(object, "loot"), &mut map)
            .unwrap();
        stack
            .push(Command::set_object_visible(object, false), &mut map)
            .unwrap();
        stack.push(Command::remove_object(object), &mut map).unwrap();
        assert!(map.object(object).is_none());

        for _ in 0..5 {
            stack.undo(&mut map).unwrap();
        }
        let restored = map.object(object).unwrap();
        assert_eq!((restored.x, restored.y), (1.0, 1.0));
        assert!(restored.name.is_empty());
        assert!(restored.tag.is_empty());
        assert!(restored.visible);
    }

    #[test]
    fn fix_tiles_command_restores_invalid_tiles() {
        let (mut map, layer) = map_with_tile_layer();
        map.set_tile(layer, TilePos::new(1, 1), 42).unwrap();
        let mut stack = CommandStack::default();
        stack
            .push(Command::FixTiles { fixed: Vec::new() }, &mut map)
            .unwrap();
        assert_eq!(map.tile_at(layer, TilePos::new(1, 1)), Some(EMPTY_TILE));
        stack.undo(&mut map).unwrap();
        assert_eq!(map.tile_at(layer, TilePos::new(1, 1)), Some(42));
    }

    #[test]
    fn tileset_commands_round_trip() {
        use crate::tileset::{Texture, TextureHandle};
        use std::path::PathBuf;

        let mut map = Map::default();
        let tileset = Tileset::with_grid(
            "ts".into(),
            PathBuf::from("ts.png"),
            Texture {
                handle: TextureHandle(0),
                width: 64,
                height: 32,
            },
            32,
            32,
            2,
            2,
        );
        let uuid = tileset.uuid;
        let mut stack = CommandStack::default();
        stack
            .push(Command::attach_tileset(tileset, false), &mut map)
            .unwrap();
        assert!(map.tilesets().contains(uuid));
        stack.undo(&mut map).unwrap();
        assert!(!map.tilesets().contains(uuid));
        stack.redo(&mut map).unwrap();
        assert_eq!(map.tilesets().get(uuid).unwrap().first_tile, 1);

        stack.push(Command::detach_tileset(uuid), &mut map).unwrap();
        assert!(map.tilesets().is_empty());
        stack.undo(&mut map).unwrap();
        assert_eq!(map.tilesets().active_tileset_id(), Some(uuid));
    }
}
