// tests/format_tests.rs

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tilemap_core::ir_map::{
    IrAnimationFrame, IrLayer, IrLayerKind, IrMap, IrObject, IrTile, IrTileset, IrTilesetRef,
};
use tilemap_core::property::ComponentDefinition;
use tilemap_core::{
    Color, MapError, Metadata, ObjectKind, Properties, PropertyValue, ReadOptions, SaveFormat,
    SaveFormatId, SaveFormatRegistry, TileCompression, TileExtent, TileFormat, TileMatrix,
    WriteOptions,
};

const ALL_FORMATS: [SaveFormatId; 3] = [
    SaveFormatId::TactileYaml,
    SaveFormatId::TiledJson,
    SaveFormatId::TiledXml,
];

fn properties(items: Vec<(&str, PropertyValue)>) -> Properties {
    items
        .into_iter()
        .map(|(name, value)| (name.to_owned(), value))
        .collect()
}

fn meta(items: Vec<(&str, PropertyValue)>) -> Metadata {
    Metadata {
        properties: properties(items),
        components: Default::default(),
    }
}

fn object(id: i32, kind: ObjectKind, bounds: [f32; 4]) -> IrObject {
    IrObject {
        meta: Metadata::default(),
        id,
        kind,
        x: bounds[0],
        y: bounds[1],
        width: bounds[2],
        height: bounds[3],
        name: String::new(),
        tag: String::new(),
        visible: true,
    }
}

fn layer(id: i32, name: &str, kind: IrLayerKind) -> IrLayer {
    IrLayer {
        meta: Metadata::default(),
        id,
        name: name.to_owned(),
        opacity: 1.0,
        visible: true,
        kind,
    }
}

fn tiles(extent: TileExtent, offset: i32) -> TileMatrix {
    let flat: Vec<i32> = (0..extent.tile_count() as i32).map(|i| (i + offset) % 7).collect();
    TileMatrix::from_flat(extent, &flat).unwrap()
}

/// A map touching every feature the Tiled formats can store.
fn sample_map(dir: &Path, tile_format: TileFormat) -> IrMap {
    let extent = TileExtent::new(3, 4);

    let mut door = object(1, ObjectKind::Rect, [1.5, 2.0, 16.0, 8.0]);
    door.name = "door".into();
    door.tag = "portal".into();
    door.meta = meta(vec![("target", PropertyValue::Object(2))]);
    let mut hidden = object(3, ObjectKind::Ellipse, [4.0, 4.0, 6.0, 2.0]);
    hidden.visible = false;

    let mut things = layer(
        3,
        "Things",
        IrLayerKind::Objects {
            objects: vec![door, object(2, ObjectKind::Point, [4.0, 4.0, 0.0, 0.0]), hidden],
        },
    );
    things.opacity = 0.5;

    let mut folder = layer(
        2,
        "Folder",
        IrLayerKind::Group {
            layers: vec![
                things,
                layer(4, "Detail", IrLayerKind::Tiles { tiles: tiles(extent, 3) }),
            ],
        },
    );
    folder.visible = false;

    let mut ground = layer(1, "Ground", IrLayerKind::Tiles { tiles: tiles(extent, 0) });
    ground.meta = meta(vec![("solid", PropertyValue::Bool(true))]);

    let tileset = IrTileset {
        meta: meta(vec![("biome", PropertyValue::String("forest".into()))]),
        name: "terrain".into(),
        tile_width: 16,
        tile_height: 16,
        tile_count: 8,
        column_count: 4,
        image_path: dir.join("terrain.png"),
        image_width: 64,
        image_height: 32,
        tiles: vec![
            IrTile {
                index: 2,
                meta: meta(vec![("speed", PropertyValue::Float(0.25))]),
                objects: vec![object(1, ObjectKind::Rect, [0.0, 0.0, 8.0, 8.0])],
                animation: vec![
                    IrAnimationFrame {
                        tile_index: 3,
                        duration_ms: 150,
                    },
                    IrAnimationFrame {
                        tile_index: 2,
                        duration_ms: 100,
                    },
                ],
            },
            IrTile {
                index: 5,
                meta: meta(vec![("fx", PropertyValue::Path(PathBuf::from("fx/sparkle.png")))]),
                objects: Vec::new(),
                animation: Vec::new(),
            },
        ],
        is_embedded: true,
    };

    IrMap {
        meta: meta(vec![
            ("title", PropertyValue::String("Meadow".into())),
            ("gravity", PropertyValue::Float(9.5)),
            ("lives", PropertyValue::Int(3)),
            ("tint", PropertyValue::Color(Color::rgba(0x10, 0x20, 0x30, 0x40))),
            ("music", PropertyValue::Path(PathBuf::from("audio/theme.ogg"))),
        ]),
        row_count: extent.rows,
        col_count: extent.cols,
        tile_width: 16,
        tile_height: 16,
        next_layer_id: 5,
        next_object_id: 4,
        tile_format,
        component_definitions: Vec::new(),
        tilesets: vec![IrTilesetRef {
            first_tile_id: 1,
            tileset,
        }],
        layers: vec![ground, folder],
    }
}

fn with_components(mut map: IrMap) -> IrMap {
    map.component_definitions.push(ComponentDefinition {
        name: "Health".into(),
        attributes: properties(vec![
            ("hp", PropertyValue::Int(10)),
            ("regen", PropertyValue::Float2([0.5, 1.0])),
        ]),
    });
    map.meta.components.insert(
        "Health".into(),
        properties(vec![
            ("hp", PropertyValue::Int(7)),
            ("regen", PropertyValue::Float2([0.0, 2.0])),
        ]),
    );
    map.meta
        .properties
        .insert("spawn", PropertyValue::Int2([3, 4]));
    map
}

fn expected_after_load(mut map: IrMap, id: SaveFormatId, external: bool) -> IrMap {
    let embedded = id != SaveFormatId::TactileYaml && !external;
    for entry in &mut map.tilesets {
        entry.tileset.is_embedded = embedded;
    }
    map
}

fn map_path(dir: &TempDir, id: SaveFormatId) -> PathBuf {
    dir.path().join(format!("level.{}", id.map_extension()))
}

fn save_and_load(map: &IrMap, id: SaveFormatId, options: WriteOptions, path: &Path) -> IrMap {
    let registry = SaveFormatRegistry::with_builtin_formats();
    registry.save_map(id, path, map, &options).unwrap();
    registry
        .load_map(path, &ReadOptions::for_file(path))
        .unwrap_or_else(|e| panic!("reloading {} failed: {e}", path.display()))
}

#[test]
fn every_format_round_trips_every_tile_format() {
    let formats = [
        TileFormat::plain(),
        TileFormat::base64(TileCompression::None),
        TileFormat::base64(TileCompression::Zlib),
        TileFormat::base64(TileCompression::Zstd),
        TileFormat {
            compression_level: Some(6),
            ..TileFormat::base64(TileCompression::Zlib)
        },
    ];

    for id in ALL_FORMATS {
        for tile_format in formats {
            for external in [false, true] {
                let dir = TempDir::new().unwrap();
                let mut map = sample_map(dir.path(), tile_format);
                if id == SaveFormatId::TactileYaml {
                    map = with_components(map);
                }
                let path = map_path(&dir, id);
                let options = WriteOptions {
                    use_external_tilesets: external,
                    ..WriteOptions::for_file(&path)
                };

                let loaded = save_and_load(&map, id, options, &path);
                assert_eq!(
                    loaded,
                    expected_after_load(map, id, external),
                    "{id} with {tile_format:?}, external tilesets: {external}"
                );
            }
        }
    }
}

#[test]
fn folded_and_compact_output_reads_back() {
    for id in ALL_FORMATS {
        let dir = TempDir::new().unwrap();
        let map = sample_map(dir.path(), TileFormat::plain());
        let path = map_path(&dir, id);
        let options = WriteOptions {
            use_indentation: false,
            fold_tile_layer_data: true,
            ..WriteOptions::for_file(&path)
        };
        let loaded = save_and_load(&map, id, options, &path);
        assert_eq!(loaded, expected_after_load(map, id, false), "{id}");
    }
}

#[test]
fn external_tilesets_are_written_next_to_the_map() {
    for id in ALL_FORMATS {
        let dir = TempDir::new().unwrap();
        let map = sample_map(dir.path(), TileFormat::plain());
        let path = map_path(&dir, id);
        let options = WriteOptions {
            use_external_tilesets: true,
            ..WriteOptions::for_file(&path)
        };
        SaveFormatRegistry::with_builtin_formats()
            .save_map(id, &path, &map, &options)
            .unwrap();

        let tileset_path = dir.path().join(format!("terrain.{}", id.tileset_extension()));
        assert!(tileset_path.exists(), "{id} did not write {}", tileset_path.display());
    }
}

#[test]
fn standalone_tilesets_load_through_the_registry() {
    let registry = SaveFormatRegistry::with_builtin_formats();
    for id in ALL_FORMATS {
        let dir = TempDir::new().unwrap();
        let tileset = sample_map(dir.path(), TileFormat::plain()).tilesets[0]
            .tileset
            .clone();
        let path = dir.path().join(format!("terrain.{}", id.tileset_extension()));
        registry
            .save_tileset(id, &path, &tileset, &WriteOptions::for_file(&path))
            .unwrap();

        let loaded = registry
            .load_tileset(&path, &ReadOptions::for_file(&path))
            .unwrap();
        assert_eq!(
            loaded,
            IrTileset {
                is_embedded: false,
                ..tileset
            },
            "{id}"
        );
    }
}

#[test]
fn format_is_chosen_by_id_not_extension() {
    let dir = TempDir::new().unwrap();
    let map = sample_map(dir.path(), TileFormat::plain());
    let path = dir.path().join("level.tmj");
    let registry = SaveFormatRegistry::with_builtin_formats();
    registry
        .save_map(
            SaveFormatId::TiledXml,
            &path,
            &map,
            &WriteOptions::for_file(&path),
        )
        .unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("<?xml"));
    // The extension routes loading to the JSON handler, which rejects it.
    assert!(matches!(
        registry.load_map(&path, &ReadOptions::for_file(&path)),
        Err(MapError::Json { .. })
    ));
}

#[test]
fn unregistered_format_cannot_save() {
    let dir = TempDir::new().unwrap();
    let map = sample_map(dir.path(), TileFormat::plain());
    let mut registry = SaveFormatRegistry::with_builtin_formats();
    let removed = registry.remove_format(SaveFormatId::TiledJson).unwrap();
    assert_eq!(removed.id(), SaveFormatId::TiledJson);
    assert_eq!(registry.len(), 2);

    let path = dir.path().join("level.tmj");
    let err = registry
        .save_map(
            SaveFormatId::TiledJson,
            &path,
            &map,
            &WriteOptions::for_file(&path),
        )
        .unwrap_err();
    assert!(matches!(err, MapError::UnknownFormatId(ref id) if id == "tiled-json"));
    assert!(matches!(
        registry.load_map(&path, &ReadOptions::default()),
        Err(MapError::UnsupportedFormat { .. })
    ));
}

#[test]
fn saving_creates_missing_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("maps").join("forest").join("level.yaml");
    let map = sample_map(dir.path(), TileFormat::plain());
    SaveFormatRegistry::with_builtin_formats()
        .save_map(
            SaveFormatId::TactileYaml,
            &path,
            &map,
            &WriteOptions::for_file(&path),
        )
        .unwrap();
    assert!(path.exists());
}

#[test]
fn saving_below_a_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();
    let path = blocker.join("level.tmx");
    let map = sample_map(dir.path(), TileFormat::plain());

    let err = SaveFormatRegistry::with_builtin_formats()
        .save_map(
            SaveFormatId::TiledXml,
            &path,
            &map,
            &WriteOptions::for_file(&path),
        )
        .unwrap_err();
    assert!(matches!(err, MapError::Io { .. }));
}

#[test]
fn strict_mode_requires_tileset_images() {
    let registry = SaveFormatRegistry::with_builtin_formats();
    for id in ALL_FORMATS {
        let dir = TempDir::new().unwrap();
        let map = sample_map(dir.path(), TileFormat::plain());
        let path = map_path(&dir, id);
        registry
            .save_map(id, &path, &map, &WriteOptions::for_file(&path))
            .unwrap();

        let mut options = ReadOptions::for_file(&path);
        assert!(registry.load_map(&path, &options).is_ok(), "{id}");

        options.strict_mode = true;
        let err = registry.load_map(&path, &options).unwrap_err();
        assert!(
            matches!(err, MapError::NoSuchFile { ref path } if path.ends_with("terrain.png")),
            "{id}: {err}"
        );

        fs::write(dir.path().join("terrain.png"), b"").unwrap();
        assert!(registry.load_map(&path, &options).is_ok(), "{id}");
    }
}

#[test]
fn tiled_formats_reject_vector_properties() {
    let registry = SaveFormatRegistry::with_builtin_formats();
    for id in [SaveFormatId::TiledJson, SaveFormatId::TiledXml] {
        let dir = TempDir::new().unwrap();
        let mut map = sample_map(dir.path(), TileFormat::plain());
        map.meta
            .properties
            .insert("spawn", PropertyValue::Int2([3, 4]));
        let path = map_path(&dir, id);
        let err = registry
            .save_map(id, &path, &map, &WriteOptions::for_file(&path))
            .unwrap_err();
        assert!(
            matches!(err, MapError::UnsupportedPropertyType { ref name, .. } if name == "spawn"),
            "{id}: {err}"
        );
    }
}

#[test]
fn tiled_formats_drop_components() {
    let registry = SaveFormatRegistry::with_builtin_formats();
    for id in [SaveFormatId::TiledJson, SaveFormatId::TiledXml] {
        let dir = TempDir::new().unwrap();
        let mut map = with_components(sample_map(dir.path(), TileFormat::plain()));
        map.meta.properties.remove("spawn");
        let path = map_path(&dir, id);
        registry
            .save_map(id, &path, &map, &WriteOptions::for_file(&path))
            .unwrap();

        let loaded = registry
            .load_map(&path, &ReadOptions::for_file(&path))
            .unwrap();
        assert!(loaded.component_definitions.is_empty());
        assert!(loaded.meta.components.is_empty());
        assert_eq!(loaded.meta.properties, map.meta.properties);
    }
}
