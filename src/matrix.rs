// src/matrix.rs
use std::collections::VecDeque;

/// Global tile identifier. Zero means "no tile".
pub type TileId = i32;

pub const EMPTY_TILE: TileId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TilePos {
    pub row: usize,
    pub col: usize,
}

impl TilePos {
    #[inline]
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileExtent {
    pub rows: usize,
    pub cols: usize,
}

impl TileExtent {
    #[inline]
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    #[inline]
    pub fn contains(self, pos: TilePos) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    #[inline]
    pub fn tile_count(self) -> usize {
        self.rows * self.cols
    }
}

/// Row-major grid of tile identifiers. Every row has `extent.cols` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileMatrix {
    rows: Vec<Vec<TileId>>,
    cols: usize,
}

impl TileMatrix {
    /// Creates an empty-filled matrix.
    ///
    /// Panics if either dimension of `extent` is zero.
    pub fn new(extent: TileExtent) -> Self {
        assert!(!extent.is_empty(), "invalid tile extent {extent:?}");
        Self {
            rows: vec![vec![EMPTY_TILE; extent.cols]; extent.rows],
            cols: extent.cols,
        }
    }

    /// Builds a matrix from row-major tiles, `None` if the slice length does
    /// not match `extent`.
    pub fn from_flat(extent: TileExtent, tiles: &[TileId]) -> Option<Self> {
        if extent.is_empty() || tiles.len() != extent.tile_count() {
            return None;
        }
        Some(Self {
            rows: tiles.chunks(extent.cols).map(<[TileId]>::to_vec).collect(),
            cols: extent.cols,
        })
    }

    /// Builds a matrix from nested rows, `None` if rows are ragged or empty.
    pub fn from_rows(rows: Vec<Vec<TileId>>) -> Option<Self> {
        let cols = rows.first().map(Vec::len)?;
        if cols == 0 || rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        Some(Self { rows, cols })
    }

    #[inline]
    pub fn extent(&self) -> TileExtent {
        TileExtent::new(self.rows.len(), self.cols)
    }

    #[inline]
    pub fn rows(&self) -> &[Vec<TileId>] {
        &self.rows
    }

    /// Row-major copy of all tiles.
    pub fn to_flat(&self) -> Vec<TileId> {
        self.rows.iter().flatten().copied().collect()
    }

    /// Iterates `(position, tile)` pairs in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (TilePos, TileId)> + '_ {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .map(move |(c, &id)| (TilePos::new(r, c), id))
        })
    }

    #[inline]
    pub fn tile_at(&self, pos: TilePos) -> Option<TileId> {
        self.rows.get(pos.row)?.get(pos.col).copied()
    }

    /// Returns `false` and leaves the matrix untouched when `pos` is out of
    /// bounds.
    pub fn set_tile(&mut self, pos: TilePos, id: TileId) -> bool {
        match self.rows.get_mut(pos.row).and_then(|row| row.get_mut(pos.col)) {
            Some(slot) => {
                *slot = id;
                true
            }
            None => false,
        }
    }

    pub fn add_row(&mut self) {
        self.rows.push(vec![EMPTY_TILE; self.cols]);
    }

    pub fn add_column(&mut self) {
        self.cols += 1;
        for row in &mut self.rows {
            row.push(EMPTY_TILE);
        }
    }

    /// Drops the last row. Refuses to go below one row.
    pub fn remove_row(&mut self) -> bool {
        if self.rows.len() <= 1 {
            return false;
        }
        self.rows.pop();
        true
    }

    /// Drops the last column. Refuses to go below one column.
    pub fn remove_column(&mut self) -> bool {
        if self.cols <= 1 {
            return false;
        }
        self.cols -= 1;
        for row in &mut self.rows {
            row.pop();
        }
        true
    }

    /// Adds or drops trailing rows and columns, filling new cells with
    /// [`EMPTY_TILE`].
    ///
    /// Panics if either dimension of `extent` is zero.
    pub fn resize(&mut self, extent: TileExtent) {
        assert!(!extent.is_empty(), "invalid tile extent {extent:?}");
        self.rows
            .resize_with(extent.rows, || vec![EMPTY_TILE; extent.cols]);
        for row in &mut self.rows {
            row.resize(extent.cols, EMPTY_TILE);
        }
        self.cols = extent.cols;
    }

    /// 4-connected flood fill from `origin`.
    ///
    /// Every rewritten position is appended to `affected` in visitation order.
    /// Out-of-bounds origins and origins already holding `replacement` are
    /// no-ops.
    pub fn flood(
        &mut self,
        origin: TilePos,
        replacement: TileId,
        mut affected: Option<&mut Vec<TilePos>>,
    ) {
        let Some(target) = self.tile_at(origin) else {
            return;
        };
        if target == replacement {
            return;
        }

        let mut queue = VecDeque::new();
        self.set_tile(origin, replacement);
        queue.push_back(origin);

        while let Some(pos) = queue.pop_front() {
            if let Some(out) = affected.as_deref_mut() {
                out.push(pos);
            }

            let neighbours = [
                pos.row.checked_sub(1).map(|r| TilePos::new(r, pos.col)),
                Some(TilePos::new(pos.row + 1, pos.col)),
                pos.col.checked_sub(1).map(|c| TilePos::new(pos.row, c)),
                Some(TilePos::new(pos.row, pos.col + 1)),
            ];
            for next in neighbours.into_iter().flatten() {
                if self.tile_at(next) == Some(target) {
                    self.set_tile(next, replacement);
                    queue.push_back(next);
                }
            }
        }
    }
}
