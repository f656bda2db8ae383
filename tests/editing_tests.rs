// tests/editing_tests.rs

use std::path::PathBuf;
use tempfile::TempDir;
use tilemap_core::tileset::{Texture, TextureHandle};
use tilemap_core::{
    Command, CommandStack, EditError, EditorSettings, LayerType, Map, NullTextureLoader,
    SaveFormatId, SaveFormatRegistry, TileExtent, TilePos, Tileset,
};

fn terrain(dir: &std::path::Path) -> Tileset {
    Tileset::with_grid(
        "terrain".into(),
        dir.join("terrain.png"),
        Texture {
            handle: TextureHandle(1),
            width: 64,
            height: 64,
        },
        16,
        16,
        16,
        4,
    )
}

#[test]
fn stamping_and_filling_undo_in_order() {
    let mut map = Map::new(TileExtent::new(4, 4), 16, 16);
    let mut stack = CommandStack::new(10);

    stack
        .push(Command::add_layer(LayerType::Tile, None), &mut map)
        .unwrap();
    let layer = map.layers().preorder()[0];

    stack
        .push(
            Command::set_tiles(layer, vec![(TilePos::new(0, 0), 1), (TilePos::new(1, 1), 2)]),
            &mut map,
        )
        .unwrap();
    stack
        .push(Command::flood(layer, TilePos::new(3, 3), 3), &mut map)
        .unwrap();

    assert_eq!(map.tile_at(layer, TilePos::new(2, 2)), Some(3));
    assert_eq!(map.tile_at(layer, TilePos::new(0, 0)), Some(1));
    assert_eq!(stack.undo_text(), Some("Flood Fill"));

    stack.undo(&mut map).unwrap();
    assert_eq!(map.tile_at(layer, TilePos::new(2, 2)), Some(0));
    assert_eq!(stack.undo_text(), Some("Stamp Tiles"));
    stack.undo(&mut map).unwrap();
    assert_eq!(map.tile_at(layer, TilePos::new(0, 0)), Some(0));

    stack.redo(&mut map).unwrap();
    stack.redo(&mut map).unwrap();
    assert_eq!(map.tile_at(layer, TilePos::new(1, 1)), Some(2));
    assert_eq!(map.tile_at(layer, TilePos::new(3, 0)), Some(3));
    assert!(matches!(stack.redo(&mut map), Err(EditError::NothingToRedo)));
}

#[test]
fn clean_state_follows_undo() {
    let mut map = Map::new(TileExtent::new(4, 4), 16, 16);
    let mut stack = EditorSettings::default().command_stack();
    stack
        .push(Command::add_layer(LayerType::Tile, None), &mut map)
        .unwrap();
    stack.mark_as_clean();
    assert!(stack.is_clean());

    stack.push(Command::AddRow, &mut map).unwrap();
    assert!(!stack.is_clean());
    assert_eq!(map.extent(), TileExtent::new(5, 4));

    stack.undo(&mut map).unwrap();
    assert!(stack.is_clean());
    assert_eq!(map.extent(), TileExtent::new(4, 4));
}

#[test]
fn edited_map_survives_a_save() {
    let dir = TempDir::new().unwrap();
    let mut map = Map::new(TileExtent::new(3, 3), 16, 16);
    let mut stack = CommandStack::default();

    stack
        .push(Command::attach_tileset(terrain(dir.path()), false), &mut map)
        .unwrap();
    stack
        .push(Command::add_layer(LayerType::Tile, None), &mut map)
        .unwrap();
    stack
        .push(Command::add_layer(LayerType::Object, None), &mut map)
        .unwrap();
    let layers = map.layers().preorder();
    let (tiles, objects) = (layers[0], layers[1]);

    stack
        .push(Command::flood(tiles, TilePos::new(0, 0), 5), &mut map)
        .unwrap();
    stack
        .push(Command::add_rectangle(objects, 2.0, 2.0, 8.0, 8.0), &mut map)
        .unwrap();
    stack
        .push(Command::rename_layer(objects, "Things"), &mut map)
        .unwrap();

    let registry = SaveFormatRegistry::with_builtin_formats();
    let settings = EditorSettings {
        use_external_tilesets: true,
        ..EditorSettings::default()
    };
    for id in [
        SaveFormatId::TactileYaml,
        SaveFormatId::TiledJson,
        SaveFormatId::TiledXml,
    ] {
        let path: PathBuf = dir.path().join(format!("edited.{}", id.map_extension()));
        registry
            .save_map(id, &path, &map.to_ir(), &settings.write_options(dir.path()))
            .unwrap();

        let ir = registry
            .load_map(&path, &settings.read_options(dir.path()))
            .unwrap();
        let reloaded = Map::from_ir(&ir, &mut NullTextureLoader).unwrap();
        let reloaded_layers = reloaded.layers().preorder();

        assert_eq!(reloaded.tilesets().next_tile_id(), 17, "{id}");
        assert_eq!(
            reloaded.tile_at(reloaded_layers[0], TilePos::new(2, 2)),
            Some(5),
            "{id}"
        );
        let things = reloaded.layer(reloaded_layers[1]).unwrap();
        assert_eq!(things.name, "Things", "{id}");
        assert_eq!(things.objects().map(<[_]>::len), Some(1), "{id}");
        assert_eq!(reloaded.next_object_id(), map.next_object_id(), "{id}");
    }
}

#[test]
fn rejected_edits_are_not_recorded() {
    let mut map = Map::new(TileExtent::new(1, 1), 16, 16);
    let mut stack = CommandStack::new(4);

    assert!(matches!(
        stack.push(Command::RemoveRow { before: None }, &mut map),
        Err(EditError::MinimumExtent)
    ));
    assert!(stack.is_empty());
    assert!(!stack.can_undo());
    assert_eq!(map.extent(), TileExtent::new(1, 1));
}
