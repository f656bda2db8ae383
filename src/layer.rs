// src/layer.rs
//! Layer tree stored as an arena keyed by layer UUID.
//!
//! The map's invisible root group is implicit: top-level layers have no
//! parent and their order lives in [`LayerTree`] itself.

use crate::error::EditError;
use crate::matrix::{TileExtent, TileMatrix};
use crate::object::Object;
use crate::property::Metadata;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    Tile,
    Object,
    Group,
}

impl LayerType {
    pub fn default_name(self) -> &'static str {
        match self {
            LayerType::Tile => "Tile Layer",
            LayerType::Object => "Object Layer",
            LayerType::Group => "Group Layer",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    Tile(TileMatrix),
    Object(Vec<Object>),
    /// Child layer UUIDs in draw order.
    Group(Vec<Uuid>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub uuid: Uuid,
    pub id: i32,
    pub name: String,
    pub opacity: f32,
    pub visible: bool,
    pub meta: Metadata,
    pub kind: LayerKind,
    parent: Option<Uuid>,
}

impl Layer {
    pub fn new(id: i32, name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id,
            name: name.into(),
            opacity: 1.0,
            visible: true,
            meta: Metadata::default(),
            kind,
            parent: None,
        }
    }

    /// Empty layer of `layer_type`; tile layers are sized to `extent`.
    pub fn empty(layer_type: LayerType, id: i32, name: impl Into<String>, extent: TileExtent) -> Self {
        let kind = match layer_type {
            LayerType::Tile => LayerKind::Tile(TileMatrix::new(extent)),
            LayerType::Object => LayerKind::Object(Vec::new()),
            LayerType::Group => LayerKind::Group(Vec::new()),
        };
        Self::new(id, name, kind)
    }

    pub fn layer_type(&self) -> LayerType {
        match self.kind {
            LayerKind::Tile(_) => LayerType::Tile,
            LayerKind::Object(_) => LayerType::Object,
            LayerKind::Group(_) => LayerType::Group,
        }
    }

    /// `None` for top-level layers.
    #[inline]
    pub fn parent(&self) -> Option<Uuid> {
        self.parent
    }

    pub fn tiles(&self) -> Option<&TileMatrix> {
        match &self.kind {
            LayerKind::Tile(tiles) => Some(tiles),
            _ => None,
        }
    }

    pub fn tiles_mut(&mut self) -> Option<&mut TileMatrix> {
        match &mut self.kind {
            LayerKind::Tile(tiles) => Some(tiles),
            _ => None,
        }
    }

    pub fn objects(&self) -> Option<&[Object]> {
        match &self.kind {
            LayerKind::Object(objects) => Some(objects),
            _ => None,
        }
    }

    pub fn objects_mut(&mut self) -> Option<&mut Vec<Object>> {
        match &mut self.kind {
            LayerKind::Object(objects) => Some(objects),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Uuid] {
        match &self.kind {
            LayerKind::Group(children) => children,
            _ => &[],
        }
    }
}

/// A subtree removed from a [`LayerTree`], remembering where it was.
#[derive(Debug, Clone, PartialEq)]
pub struct DetachedLayer {
    pub parent: Option<Uuid>,
    pub index: usize,
    /// Subtree nodes in pre-order; the first one is the detached layer.
    nodes: Vec<Layer>,
}

impl DetachedLayer {
    pub fn root(&self) -> &Layer {
        &self.nodes[0]
    }

    pub fn uuid(&self) -> Uuid {
        self.nodes[0].uuid
    }

    pub fn nodes(&self) -> &[Layer] {
        &self.nodes
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerTree {
    nodes: HashMap<Uuid, Layer>,
    top: Vec<Uuid>,
}

impl LayerTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.nodes.contains_key(&uuid)
    }

    pub fn get(&self, uuid: Uuid) -> Option<&Layer> {
        self.nodes.get(&uuid)
    }

    pub fn get_mut(&mut self, uuid: Uuid) -> Option<&mut Layer> {
        self.nodes.get_mut(&uuid)
    }

    /// Top-level layers, or the children of `parent`.
    pub fn children(&self, parent: Option<Uuid>) -> &[Uuid] {
        match parent {
            None => &self.top,
            Some(p) => self.nodes.get(&p).map(Layer::children).unwrap_or(&[]),
        }
    }

    fn children_mut(&mut self, parent: Option<Uuid>) -> Result<&mut Vec<Uuid>, EditError> {
        match parent {
            None => Ok(&mut self.top),
            Some(p) => match self.nodes.get_mut(&p).map(|l| &mut l.kind) {
                Some(LayerKind::Group(children)) => Ok(children),
                Some(_) => Err(EditError::NotAGroupLayer(p)),
                None => Err(EditError::UnknownLayer(p)),
            },
        }
    }

    /// Inserts a childless layer under `parent` at `index` (appends when
    /// `None`).
    ///
    /// Panics if a layer with the same UUID is already in the tree.
    pub fn insert(
        &mut self,
        parent: Option<Uuid>,
        index: Option<usize>,
        mut layer: Layer,
    ) -> Result<Uuid, EditError> {
        assert!(
            !self.nodes.contains_key(&layer.uuid),
            "layer {} is already in the tree",
            layer.uuid
        );
        let uuid = layer.uuid;
        let siblings = self.children_mut(parent)?;
        let at = index.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(at, uuid);
        layer.parent = parent;
        self.nodes.insert(uuid, layer);
        Ok(uuid)
    }

    pub fn local_index(&self, uuid: Uuid) -> Option<usize> {
        let parent = self.nodes.get(&uuid)?.parent;
        self.children(parent).iter().position(|&c| c == uuid)
    }

    /// Position of `uuid` in a pre-order walk of the whole tree.
    pub fn global_index(&self, uuid: Uuid) -> Option<usize> {
        self.preorder().iter().position(|&c| c == uuid)
    }

    pub fn sibling_count(&self, uuid: Uuid) -> Option<usize> {
        let parent = self.nodes.get(&uuid)?.parent;
        Some(self.children(parent).len())
    }

    fn preorder_from(&self, uuid: Uuid, out: &mut Vec<Uuid>) {
        let mut stack = vec![uuid];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(layer) = self.nodes.get(&current) {
                stack.extend(layer.children().iter().rev());
            }
        }
    }

    /// Every layer UUID, parents before children, siblings in draw order.
    pub fn preorder(&self) -> Vec<Uuid> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for &uuid in &self.top {
            self.preorder_from(uuid, &mut out);
        }
        out
    }

    /// Pre-order UUIDs of the subtree rooted at `uuid`, itself included.
    pub fn subtree(&self, uuid: Uuid) -> Vec<Uuid> {
        let mut out = Vec::new();
        if self.contains(uuid) {
            self.preorder_from(uuid, &mut out);
        }
        out
    }

    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.nodes.values()
    }

    pub fn layers_mut(&mut self) -> impl Iterator<Item = &mut Layer> {
        self.nodes.values_mut()
    }

    /// Removes the subtree rooted at `uuid`.
    pub fn detach(&mut self, uuid: Uuid) -> Option<DetachedLayer> {
        let index = self.local_index(uuid)?;
        let parent = self.nodes.get(&uuid)?.parent;
        if let Ok(siblings) = self.children_mut(parent) {
            siblings.remove(index);
        }
        let nodes = self
            .subtree(uuid)
            .into_iter()
            .filter_map(|id| self.nodes.remove(&id))
            .collect();
        Some(DetachedLayer {
            parent,
            index,
            nodes,
        })
    }

    /// Puts a detached subtree back where it was taken from.
    ///
    /// Panics if any of its UUIDs is already in the tree.
    pub fn reattach(&mut self, detached: DetachedLayer) -> Result<Uuid, EditError> {
        let DetachedLayer {
            parent,
            index,
            nodes,
        } = detached;
        for layer in &nodes {
            assert!(
                !self.nodes.contains_key(&layer.uuid),
                "layer {} is already in the tree",
                layer.uuid
            );
        }
        let mut nodes = nodes.into_iter();
        let Some(root) = nodes.next() else {
            return Err(EditError::UnknownLayer(Uuid::nil()));
        };
        let uuid = root.uuid;
        let group_children = root.children().to_vec();
        let mut root = root;
        if let LayerKind::Group(children) = &mut root.kind {
            children.clear();
        }
        self.insert(parent, Some(index), root)?;
        if let Some(LayerKind::Group(children)) = self.nodes.get_mut(&uuid).map(|l| &mut l.kind) {
            *children = group_children;
        }
        for layer in nodes {
            self.nodes.insert(layer.uuid, layer);
        }
        Ok(uuid)
    }

    /// Deep copy of the subtree rooted at `uuid`, inserted right after it.
    ///
    /// Copies get fresh UUIDs, layer ids from `next_layer_id` (in pre-order)
    /// and object ids from `next_object_id`.
    pub fn duplicate(
        &mut self,
        uuid: Uuid,
        next_layer_id: &mut dyn FnMut() -> i32,
        next_object_id: &mut dyn FnMut() -> i32,
    ) -> Result<Uuid, EditError> {
        let source = self.nodes.get(&uuid).ok_or(EditError::UnknownLayer(uuid))?;
        let parent = source.parent;
        let index = self.local_index(uuid).ok_or(EditError::UnknownLayer(uuid))?;

        let originals = self.subtree(uuid);
        let remap: HashMap<Uuid, Uuid> = originals.iter().map(|&id| (id, Uuid::new_v4())).collect();

        let mut copies = Vec::with_capacity(originals.len());
        for original in &originals {
            let Some(layer) = self.nodes.get(original) else {
                continue;
            };
            let mut copy = layer.clone();
            copy.uuid = remap[original];
            copy.id = next_layer_id();
            copy.parent = copy.parent.map(|p| remap.get(&p).copied().unwrap_or(p));
            match &mut copy.kind {
                LayerKind::Group(children) => {
                    for child in children.iter_mut() {
                        *child = remap[&*child];
                    }
                }
                LayerKind::Object(objects) => {
                    for object in objects.iter_mut() {
                        object.uuid = Uuid::new_v4();
                        object.id = next_object_id();
                    }
                }
                LayerKind::Tile(_) => {}
            }
            copies.push(copy);
        }

        let new_root = remap[&uuid];
        self.reattach(DetachedLayer {
            parent,
            index: index + 1,
            nodes: copies,
        })?;
        Ok(new_root)
    }

    pub fn can_move_up(&self, uuid: Uuid) -> bool {
        self.local_index(uuid).is_some_and(|i| i > 0)
    }

    pub fn can_move_down(&self, uuid: Uuid) -> bool {
        match (self.local_index(uuid), self.sibling_count(uuid)) {
            (Some(i), Some(n)) => i + 1 < n,
            _ => false,
        }
    }

    /// Swaps the layer with its previous sibling.
    pub fn move_up(&mut self, uuid: Uuid) -> Result<(), EditError> {
        if !self.can_move_up(uuid) {
            return Err(EditError::CannotMove(uuid));
        }
        self.swap_with_offset(uuid, -1)
    }

    /// Swaps the layer with its next sibling.
    pub fn move_down(&mut self, uuid: Uuid) -> Result<(), EditError> {
        if !self.can_move_down(uuid) {
            return Err(EditError::CannotMove(uuid));
        }
        self.swap_with_offset(uuid, 1)
    }

    fn swap_with_offset(&mut self, uuid: Uuid, offset: isize) -> Result<(), EditError> {
        let index = self.local_index(uuid).ok_or(EditError::UnknownLayer(uuid))?;
        let parent = self.nodes.get(&uuid).and_then(|l| l.parent);
        let siblings = self.children_mut(parent)?;
        let other = index.checked_add_signed(offset).ok_or(EditError::CannotMove(uuid))?;
        siblings.swap(index, other);
        Ok(())
    }

    /// Finds the object layer holding the object `object`.
    pub fn find_object(&self, object: Uuid) -> Option<(Uuid, usize)> {
        self.nodes.values().find_map(|layer| {
            let index = layer.objects()?.iter().position(|o| o.uuid == object)?;
            Some((layer.uuid, index))
        })
    }
}
