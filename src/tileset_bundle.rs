// src/tileset_bundle.rs
use crate::error::EditError;
use crate::matrix::TileId;
use crate::tileset::Tileset;
use std::time::Instant;
use uuid::Uuid;

/// A tileset attached to a map, owning the tile ids
/// `[first_tile, first_tile + tile_count)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TilesetRef {
    pub tileset: Tileset,
    pub first_tile: TileId,
    pub embedded: bool,
}

impl TilesetRef {
    /// Exclusive end of the owned id range.
    #[inline]
    pub fn end_tile(&self) -> TileId {
        self.first_tile.saturating_add(self.tileset.tile_count)
    }

    #[inline]
    pub fn contains(&self, id: TileId) -> bool {
        id >= self.first_tile && id < self.end_tile()
    }

    pub fn to_local(&self, id: TileId) -> Option<i32> {
        self.contains(id).then(|| id - self.first_tile)
    }

    pub fn to_global(&self, index: i32) -> Option<TileId> {
        self.tileset
            .is_valid_index(index)
            .then(|| self.first_tile + index)
    }

    fn overlaps(&self, first: TileId, end: TileId) -> bool {
        first < self.end_tile() && self.first_tile < end
    }
}

/// Tilesets attached to one map, in attach order.
#[derive(Debug, Clone, PartialEq)]
pub struct TilesetBundle {
    refs: Vec<TilesetRef>,
    active: Option<Uuid>,
    next_tile_id: TileId,
}

impl Default for TilesetBundle {
    fn default() -> Self {
        Self {
            refs: Vec::new(),
            active: None,
            next_tile_id: 1,
        }
    }
}

impl TilesetBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `tileset` at the next free id and returns its first tile id.
    pub fn attach_tileset(&mut self, tileset: Tileset, embedded: bool) -> TileId {
        let first = self.next_tile_id;
        self.attach_tileset_at(tileset, first, embedded);
        first
    }

    /// Attaches `tileset` with an explicit first tile id.
    ///
    /// Panics if its id range overlaps an attached tileset, or if a tileset
    /// with the same UUID is attached.
    pub fn attach_tileset_at(&mut self, tileset: Tileset, first_tile: TileId, embedded: bool) {
        let end = first_tile.saturating_add(tileset.tile_count);
        assert!(
            first_tile > 0,
            "first tile id must be positive, got {first_tile}"
        );
        assert!(
            !self.refs.iter().any(|r| r.overlaps(first_tile, end)),
            "tile range [{first_tile}, {end}) of '{}' overlaps an attached tileset",
            tileset.name
        );
        assert!(
            !self.contains(tileset.uuid),
            "tileset {} is already attached",
            tileset.uuid
        );

        if self.active.is_none() {
            self.active = Some(tileset.uuid);
        }
        self.next_tile_id = self.next_tile_id.max(end);
        self.refs.push(TilesetRef {
            tileset,
            first_tile,
            embedded,
        });
    }

    /// Detaches a tileset without renumbering the others.
    pub fn detach_tileset(&mut self, uuid: Uuid) -> Option<TilesetRef> {
        let index = self.refs.iter().position(|r| r.tileset.uuid == uuid)?;
        let removed = self.refs.remove(index);
        if self.active == Some(uuid) {
            self.active = self.refs.first().map(|r| r.tileset.uuid);
        }
        Some(removed)
    }

    pub fn select_tileset(&mut self, uuid: Uuid) -> Result<(), EditError> {
        if !self.contains(uuid) {
            return Err(EditError::UnknownTileset(uuid));
        }
        self.active = Some(uuid);
        Ok(())
    }

    #[inline]
    pub fn active_tileset_id(&self) -> Option<Uuid> {
        self.active
    }

    #[inline]
    pub fn next_tile_id(&self) -> TileId {
        self.next_tile_id
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.refs.iter().any(|r| r.tileset.uuid == uuid)
    }

    pub fn get(&self, uuid: Uuid) -> Option<&TilesetRef> {
        self.refs.iter().find(|r| r.tileset.uuid == uuid)
    }

    pub fn get_mut(&mut self, uuid: Uuid) -> Option<&mut TilesetRef> {
        self.refs.iter_mut().find(|r| r.tileset.uuid == uuid)
    }

    pub fn is_valid_tile(&self, id: TileId) -> bool {
        self.refs.iter().filter(|r| r.contains(id)).count() == 1
    }

    /// Owner of `id` and the local tile index inside it.
    pub fn find_tileset(&self, id: TileId) -> Option<(&TilesetRef, i32)> {
        let owner = self.refs.iter().find(|r| r.contains(id))?;
        Some((owner, id - owner.first_tile))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TilesetRef> {
        self.refs.iter()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Per-frame update of every tileset's animations.
    pub fn update(&mut self, now: Instant) {
        for r in &mut self.refs {
            r.tileset.update(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tileset::{Texture, TextureHandle};
    use std::path::PathBuf;

    fn tileset(tile_count: i32) -> Tileset {
        Tileset::with_grid(
            format!("ts{tile_count}"),
            PathBuf::from("tiles.png"),
            Texture {
                handle: TextureHandle(0),
                width: 16 * tile_count,
                height: 16,
            },
            16,
            16,
            tile_count,
            tile_count,
        )
    }

    #[test]
    fn attach_assigns_consecutive_ranges() {
        let mut bundle = TilesetBundle::new();
        let a = tileset(10);
        let a_id = a.uuid;
        assert_eq!(bundle.attach_tileset(a, false), 1);
        assert_eq!(bundle.attach_tileset(tileset(5), true), 11);
        assert_eq!(bundle.next_tile_id(), 16);
        assert_eq!(bundle.active_tileset_id(), Some(a_id));
    }

    #[test]
    fn find_tileset_resolves_local_index() {
        let mut bundle = TilesetBundle::new();
        bundle.attach_tileset(tileset(10), false);
        let b = tileset(5);
        let b_id = b.uuid;
        bundle.attach_tileset(b, false);

        let (owner, local) = bundle.find_tileset(13).unwrap();
        assert_eq!(owner.tileset.uuid, b_id);
        assert_eq!(local, 2);
        assert!(bundle.is_valid_tile(1));
        assert!(bundle.is_valid_tile(15));
        assert!(!bundle.is_valid_tile(16));
        assert!(!bundle.is_valid_tile(0));
        assert!(bundle.find_tileset(16).is_none());
    }

    #[test]
    #[should_panic(expected = "overlaps")]
    fn overlapping_range_panics() {
        let mut bundle = TilesetBundle::new();
        bundle.attach_tileset_at(tileset(10), 1, false);
        bundle.attach_tileset_at(tileset(4), 8, false);
    }

    #[test]
    fn adjacent_ranges_do_not_overlap() {
        let mut bundle = TilesetBundle::new();
        bundle.attach_tileset_at(tileset(10), 11, false);
        bundle.attach_tileset_at(tileset(10), 1, false);
        assert_eq!(bundle.next_tile_id(), 21);
        assert_eq!(bundle.len(), 2);
    }

    #[test]
    fn detach_keeps_ranges_and_moves_selection() {
        let mut bundle = TilesetBundle::new();
        let a = tileset(10);
        let a_id = a.uuid;
        let b = tileset(5);
        let b_id = b.uuid;
        bundle.attach_tileset(a, false);
        bundle.attach_tileset(b, false);
        bundle.select_tileset(b_id).unwrap();

        let removed = bundle.detach_tileset(b_id).unwrap();
        assert_eq!(removed.first_tile, 11);
        assert_eq!(bundle.active_tileset_id(), Some(a_id));
        assert_eq!(bundle.next_tile_id(), 16);

        bundle.detach_tileset(a_id).unwrap();
        assert_eq!(bundle.active_tileset_id(), None);
        assert!(bundle.detach_tileset(a_id).is_none());
    }

    #[test]
    fn selecting_unknown_tileset_fails() {
        let mut bundle = TilesetBundle::new();
        let id = Uuid::new_v4();
        assert_eq!(bundle.select_tileset(id), Err(EditError::UnknownTileset(id)));
    }
}
