// src/object.rs
use crate::property::Metadata;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Point,
    Rect,
    Ellipse,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Point => "point",
            ObjectKind::Rect => "rect",
            ObjectKind::Ellipse => "ellipse",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "point" => Some(ObjectKind::Point),
            "rect" => Some(ObjectKind::Rect),
            "ellipse" => Some(ObjectKind::Ellipse),
            _ => None,
        }
    }
}

/// Point, rectangle or ellipse placed on an object layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub uuid: Uuid,
    /// Map-scoped id, allocated from the map's object counter.
    pub id: i32,
    pub kind: ObjectKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub visible: bool,
    pub name: String,
    pub tag: String,
    pub meta: Metadata,
}

impl Object {
    pub fn new(id: i32, kind: ObjectKind) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id,
            kind,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            visible: true,
            name: String::new(),
            tag: String::new(),
            meta: Metadata::default(),
        }
    }

    /// Points have no size.
    pub fn with_bounds(mut self, x: f32, y: f32, width: f32, height: f32) -> Self {
        self.x = x;
        self.y = y;
        if self.kind != ObjectKind::Point {
            self.width = width;
            self.height = height;
        }
        self
    }
}
