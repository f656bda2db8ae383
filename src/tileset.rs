// src/tileset.rs
use crate::object::Object;
use crate::property::Metadata;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Opaque handle handed out by the texture loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    pub handle: TextureHandle,
    pub width: i32,
    pub height: i32,
}

/// Image loading collaborator; the core never decodes pixels itself.
pub trait TextureLoader {
    fn load_texture(&mut self, path: &Path) -> Option<Texture>;
}

/// Loader that never produces textures, for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTextureLoader;

impl TextureLoader for NullTextureLoader {
    fn load_texture(&mut self, _path: &Path) -> Option<Texture> {
        None
    }
}

/// Everything needed to create a tileset from an image atlas.
#[derive(Debug, Clone, PartialEq)]
pub struct TilesetInfo {
    pub image_path: PathBuf,
    pub texture: Texture,
    pub tile_width: i32,
    pub tile_height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationFrame {
    pub tile_index: i32,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileAnimation {
    frames: Vec<AnimationFrame>,
    current: usize,
    last_switch: Option<Instant>,
}

impl TileAnimation {
    pub fn new(frames: Vec<AnimationFrame>) -> Self {
        Self {
            frames,
            current: 0,
            last_switch: None,
        }
    }

    pub fn frames(&self) -> &[AnimationFrame] {
        &self.frames
    }

    pub fn current_tile(&self) -> Option<i32> {
        self.frames.get(self.current).map(|f| f.tile_index)
    }

    fn update(&mut self, now: Instant) {
        let Some(frame) = self.frames.get(self.current) else {
            return;
        };
        match self.last_switch {
            None => self.last_switch = Some(now),
            Some(last) if now.saturating_duration_since(last) >= frame.duration => {
                self.current = (self.current + 1) % self.frames.len();
                self.last_switch = Some(now);
            }
            Some(_) => {}
        }
    }
}

/// Per-tile extras; plain tiles have no entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileDef {
    pub meta: Metadata,
    pub objects: Vec<Object>,
    pub animation: Option<TileAnimation>,
}

#[derive(Debug, Clone)]
pub struct Tileset {
    pub uuid: Uuid,
    pub name: String,
    pub meta: Metadata,
    pub tile_width: i32,
    pub tile_height: i32,
    pub tile_count: i32,
    pub column_count: i32,
    pub image_path: PathBuf,
    pub image_width: i32,
    pub image_height: i32,
    pub texture: TextureHandle,
    tiles: BTreeMap<i32, TileDef>,
    appearance: RefCell<HashMap<i32, i32>>,
}

impl PartialEq for Tileset {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
            && self.name == other.name
            && self.meta == other.meta
            && self.tile_width == other.tile_width
            && self.tile_height == other.tile_height
            && self.tile_count == other.tile_count
            && self.column_count == other.column_count
            && self.image_path == other.image_path
            && self.image_width == other.image_width
            && self.image_height == other.image_height
            && self.tiles == other.tiles
    }
}

impl Tileset {
    /// Derives the tile grid from the texture size.
    ///
    /// Panics if the tile size is not positive.
    pub fn new(info: TilesetInfo) -> Self {
        assert!(
            info.tile_width > 0 && info.tile_height > 0,
            "invalid tile size {}x{}",
            info.tile_width,
            info.tile_height
        );
        let column_count = info.texture.width / info.tile_width;
        let row_count = info.texture.height / info.tile_height;
        let name = info
            .image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::with_grid(
            name,
            info.image_path,
            info.texture,
            info.tile_width,
            info.tile_height,
            row_count * column_count,
            column_count,
        )
    }

    /// Tileset with an explicit grid, as read from save files.
    pub fn with_grid(
        name: String,
        image_path: PathBuf,
        texture: Texture,
        tile_width: i32,
        tile_height: i32,
        tile_count: i32,
        column_count: i32,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name,
            meta: Metadata::default(),
            tile_width,
            tile_height,
            tile_count,
            column_count,
            image_path,
            image_width: texture.width,
            image_height: texture.height,
            texture: texture.handle,
            tiles: BTreeMap::new(),
            appearance: RefCell::new(HashMap::new()),
        }
    }

    pub fn row_count(&self) -> i32 {
        if self.column_count > 0 {
            self.tile_count / self.column_count
        } else {
            0
        }
    }

    #[inline]
    pub fn is_valid_index(&self, index: i32) -> bool {
        (0..self.tile_count).contains(&index)
    }

    pub fn tile(&self, index: i32) -> Option<&TileDef> {
        self.tiles.get(&index)
    }

    /// Creates the entry for `index` on first access.
    pub fn tile_mut(&mut self, index: i32) -> Option<&mut TileDef> {
        if !self.is_valid_index(index) {
            return None;
        }
        Some(self.tiles.entry(index).or_default())
    }

    pub fn tiles(&self) -> impl Iterator<Item = (i32, &TileDef)> {
        self.tiles.iter().map(|(&i, t)| (i, t))
    }

    /// Advances tile animations and invalidates the appearance cache.
    pub fn update(&mut self, now: Instant) {
        self.appearance.get_mut().clear();
        for tile in self.tiles.values_mut() {
            if let Some(animation) = &mut tile.animation {
                animation.update(now);
            }
        }
    }

    /// Tile index to draw in place of `index`, following animations.
    pub fn appearance_of(&self, index: i32) -> i32 {
        if let Some(&cached) = self.appearance.borrow().get(&index) {
            return cached;
        }
        let shown = self
            .tiles
            .get(&index)
            .and_then(|t| t.animation.as_ref())
            .and_then(TileAnimation::current_tile)
            .unwrap_or(index);
        self.appearance.borrow_mut().insert(index, shown);
        shown
    }

    pub fn cached_appearances(&self) -> usize {
        self.appearance.borrow().len()
    }
}
