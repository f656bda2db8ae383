// src/property.rs
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Wire type of a property or component attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Str,
    Int,
    Int2,
    Int3,
    Int4,
    Float,
    Float2,
    Float3,
    Float4,
    Bool,
    Path,
    Color,
    Object,
}

impl PropertyType {
    pub fn name(self) -> &'static str {
        match self {
            PropertyType::Str => "string",
            PropertyType::Int => "int",
            PropertyType::Int2 => "int2",
            PropertyType::Int3 => "int3",
            PropertyType::Int4 => "int4",
            PropertyType::Float => "float",
            PropertyType::Float2 => "float2",
            PropertyType::Float3 => "float3",
            PropertyType::Float4 => "float4",
            PropertyType::Bool => "bool",
            PropertyType::Path => "path",
            PropertyType::Color => "color",
            PropertyType::Object => "object",
        }
    }

    /// Accepts both Tactile (`path`) and Tiled (`file`) spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "string" => PropertyType::Str,
            "int" => PropertyType::Int,
            "int2" => PropertyType::Int2,
            "int3" => PropertyType::Int3,
            "int4" => PropertyType::Int4,
            "float" => PropertyType::Float,
            "float2" => PropertyType::Float2,
            "float3" => PropertyType::Float3,
            "float4" => PropertyType::Float4,
            "bool" => PropertyType::Bool,
            "path" | "file" => PropertyType::Path,
            "color" => PropertyType::Color,
            "object" => PropertyType::Object,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_vector(self) -> bool {
        matches!(
            self,
            PropertyType::Int2
                | PropertyType::Int3
                | PropertyType::Int4
                | PropertyType::Float2
                | PropertyType::Float3
                | PropertyType::Float4
        )
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl Color {
    pub const BLACK: Color = Color::rgba(0, 0, 0, 0xFF);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    fn hex_bytes(text: &str) -> Option<Vec<u8>> {
        let digits = text.strip_prefix('#')?;
        if !digits.is_ascii() || !(digits.len() == 6 || digits.len() == 8) {
            return None;
        }
        (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
            .collect()
    }

    /// Parses `#RRGGBB` or `#RRGGBBAA`.
    pub fn from_rgba_hex(text: &str) -> Option<Self> {
        match Self::hex_bytes(text)?.as_slice() {
            &[r, g, b] => Some(Self::rgba(r, g, b, 0xFF)),
            &[r, g, b, a] => Some(Self::rgba(r, g, b, a)),
            _ => None,
        }
    }

    /// Parses `#RRGGBB` or `#AARRGGBB`.
    pub fn from_argb_hex(text: &str) -> Option<Self> {
        match Self::hex_bytes(text)?.as_slice() {
            &[r, g, b] => Some(Self::rgba(r, g, b, 0xFF)),
            &[a, r, g, b] => Some(Self::rgba(r, g, b, a)),
            _ => None,
        }
    }

    pub fn to_rgba_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
    }

    pub fn to_argb_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.a, self.r, self.g, self.b)
    }
}

/// Typed property or component attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Int(i32),
    Int2([i32; 2]),
    Int3([i32; 3]),
    Int4([i32; 4]),
    Float(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    Bool(bool),
    Path(PathBuf),
    Color(Color),
    /// Object id reference, zero for "none".
    Object(i32),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyType {
        match self {
            PropertyValue::String(_) => PropertyType::Str,
            PropertyValue::Int(_) => PropertyType::Int,
            PropertyValue::Int2(_) => PropertyType::Int2,
            PropertyValue::Int3(_) => PropertyType::Int3,
            PropertyValue::Int4(_) => PropertyType::Int4,
            PropertyValue::Float(_) => PropertyType::Float,
            PropertyValue::Float2(_) => PropertyType::Float2,
            PropertyValue::Float3(_) => PropertyType::Float3,
            PropertyValue::Float4(_) => PropertyType::Float4,
            PropertyValue::Bool(_) => PropertyType::Bool,
            PropertyValue::Path(_) => PropertyType::Path,
            PropertyValue::Color(_) => PropertyType::Color,
            PropertyValue::Object(_) => PropertyType::Object,
        }
    }

    /// The value a freshly created attribute of `kind` holds.
    pub fn default_of(kind: PropertyType) -> Self {
        match kind {
            PropertyType::Str => PropertyValue::String(String::new()),
            PropertyType::Int => PropertyValue::Int(0),
            PropertyType::Int2 => PropertyValue::Int2([0; 2]),
            PropertyType::Int3 => PropertyValue::Int3([0; 3]),
            PropertyType::Int4 => PropertyValue::Int4([0; 4]),
            PropertyType::Float => PropertyValue::Float(0.0),
            PropertyType::Float2 => PropertyValue::Float2([0.0; 2]),
            PropertyType::Float3 => PropertyValue::Float3([0.0; 3]),
            PropertyType::Float4 => PropertyValue::Float4([0.0; 4]),
            PropertyType::Bool => PropertyValue::Bool(false),
            PropertyType::Path => PropertyValue::Path(PathBuf::new()),
            PropertyType::Color => PropertyValue::Color(Color::BLACK),
            PropertyType::Object => PropertyValue::Object(0),
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default_of(self.kind())
    }

    /// Vector components joined by `;`, `None` for scalar values.
    pub fn vector_text(&self) -> Option<String> {
        fn join<T: ToString>(items: &[T]) -> String {
            items
                .iter()
                .map(T::to_string)
                .collect::<Vec<_>>()
                .join(";")
        }
        match self {
            PropertyValue::Int2(v) => Some(join(v)),
            PropertyValue::Int3(v) => Some(join(v)),
            PropertyValue::Int4(v) => Some(join(v)),
            PropertyValue::Float2(v) => Some(join(v)),
            PropertyValue::Float3(v) => Some(join(v)),
            PropertyValue::Float4(v) => Some(join(v)),
            _ => None,
        }
    }

    /// Parses `;`-separated vector text for one of the vector types.
    pub fn parse_vector(kind: PropertyType, text: &str) -> Option<Self> {
        fn parts<T: std::str::FromStr, const N: usize>(text: &str) -> Option<[T; N]> {
            let items = text
                .split(';')
                .map(|s| s.trim().parse::<T>().ok())
                .collect::<Option<Vec<T>>>()?;
            items.try_into().ok()
        }
        match kind {
            PropertyType::Int2 => parts(text).map(PropertyValue::Int2),
            PropertyType::Int3 => parts(text).map(PropertyValue::Int3),
            PropertyType::Int4 => parts(text).map(PropertyValue::Int4),
            PropertyType::Float2 => parts(text).map(PropertyValue::Float2),
            PropertyType::Float3 => parts(text).map(PropertyValue::Float3),
            PropertyType::Float4 => parts(text).map(PropertyValue::Float4),
            _ => None,
        }
    }
}

/// Named properties, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    values: BTreeMap<String, PropertyValue>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: PropertyValue) -> Option<PropertyValue> {
        self.values.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.values.remove(name)
    }

    /// Returns `false` if `from` does not exist or `to` is taken.
    pub fn rename(&mut self, from: &str, to: impl Into<String>) -> bool {
        let to = to.into();
        if self.values.contains_key(&to) {
            return false;
        }
        match self.values.remove(from) {
            Some(value) => {
                self.values.insert(to, value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PropertyValue> {
        self.values.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i32(&self, name: &str) -> Option<i32> {
        match self.get(name)? {
            PropertyValue::Int(v) | PropertyValue::Object(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_f32(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            PropertyValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_color(&self, name: &str) -> Option<Color> {
        match self.get(name)? {
            PropertyValue::Color(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromIterator<(String, PropertyValue)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Component instances attached to a context, keyed by component name.
pub type Components = BTreeMap<String, Properties>;

/// Properties and components shared by maps, layers, objects, tilesets and tiles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub properties: Properties,
    pub components: Components,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.components.is_empty()
    }
}

/// Map-level component type with typed default attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentDefinition {
    pub name: String,
    pub attributes: Properties,
}

impl ComponentDefinition {
    /// Instance of this component holding the default attribute values.
    pub fn instantiate(&self) -> Properties {
        self.attributes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_type_names_round_trip() {
        for kind in [
            PropertyType::Str,
            PropertyType::Int,
            PropertyType::Int3,
            PropertyType::Float4,
            PropertyType::Bool,
            PropertyType::Path,
            PropertyType::Color,
            PropertyType::Object,
        ] {
            assert_eq!(PropertyType::from_name(kind.name()), Some(kind));
        }
        assert_eq!(PropertyType::from_name("file"), Some(PropertyType::Path));
        assert_eq!(PropertyType::from_name("class"), None);
    }

    #[test]
    fn parses_color_layouts() {
        let c = Color::rgba(0x11, 0x22, 0x33, 0x44);
        assert_eq!(c.to_rgba_hex(), "#11223344");
        assert_eq!(c.to_argb_hex(), "#44112233");
        assert_eq!(Color::from_rgba_hex("#11223344"), Some(c));
        assert_eq!(Color::from_argb_hex("#44112233"), Some(c));
        assert_eq!(
            Color::from_argb_hex("#112233"),
            Some(Color::rgba(0x11, 0x22, 0x33, 0xFF))
        );
        assert_eq!(Color::from_rgba_hex("112233"), None);
        assert_eq!(Color::from_rgba_hex("#12345"), None);
        assert_eq!(Color::from_rgba_hex("#GG0000"), None);
    }

    #[test]
    fn vectors_use_semicolons() {
        let v = PropertyValue::Float3([1.5, -2.0, 0.25]);
        let text = v.vector_text().unwrap();
        assert_eq!(text, "1.5;-2;0.25");
        assert_eq!(PropertyValue::parse_vector(PropertyType::Float3, &text), Some(v));
        assert_eq!(
            PropertyValue::parse_vector(PropertyType::Int2, "4;5"),
            Some(PropertyValue::Int2([4, 5]))
        );
        assert_eq!(PropertyValue::parse_vector(PropertyType::Int2, "4;5;6"), None);
        assert_eq!(PropertyValue::Int(1).vector_text(), None);
    }

    #[test]
    fn typed_getters_check_kind() {
        let mut props = Properties::new();
        props.insert("solid", PropertyValue::Bool(true));
        props.insert("damage", PropertyValue::Int(10));
        props.insert("theme", PropertyValue::String("forest".into()));

        assert_eq!(props.get_bool("solid"), Some(true));
        assert_eq!(props.get_i32("damage"), Some(10));
        assert_eq!(props.get_f32("damage"), None);
        assert_eq!(props.get_string("theme"), Some("forest"));

        assert!(props.rename("theme", "biome"));
        assert!(!props.rename("theme", "biome"));
        assert!(!props.rename("solid", "damage"));
        let names: Vec<_> = props.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["biome", "damage", "solid"]);
    }

    #[test]
    fn defaults_are_recognised() {
        assert!(PropertyValue::default_of(PropertyType::Color).is_default());
        assert!(!PropertyValue::Int(3).is_default());
        assert_eq!(PropertyValue::Path("a".into()).kind(), PropertyType::Path);
    }
}
