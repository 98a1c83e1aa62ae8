use std::fs;
use std::fs::File;
use std::path::Path;

use lem_formats::ground::{GroundColors, GroundFile, OBJECT_INFO_COUNT, PIECE_INFO_COUNT};
use lem_formats::level::{Level, LevelMetal, LevelObject, LevelPiece, ObjectModifiers, read_levels};
use lem_formats::planar::{SPECIAL_HEIGHT, SPECIAL_WIDTH};
use lem_formats::{Effect, ObjectInfo, PieceInfo, VgaColor, encode_stored_chunk};
use lem_render::{CANVAS_WIDTH, LevelImager, RenderConfig};

const BLOCK_PLANE: usize = 8;

/// 8x8 block with every pixel opaque and set to `color`, planes then mask.
fn solid_block(color: u8) -> Vec<u8> {
    let mut blob = Vec::new();
    for plane in 0..4 {
        let fill = if color & (1 << plane) != 0 { 0xFF } else { 0x00 };
        blob.extend([fill; BLOCK_PLANE]);
    }
    blob.extend([0xFF; BLOCK_PLANE]);
    blob
}

fn ground_file() -> GroundFile {
    let mut objects = vec![ObjectInfo::default(); OBJECT_INFO_COUNT];
    objects[0] = ObjectInfo {
        width: 8,
        height: 8,
        mask_offset: 32,
        effect: Effect::Exit.code(),
        effect_top_plus1: 1,
        effect_width: 2,
        effect_height: 2,
        ..ObjectInfo::default()
    };
    let mut pieces = vec![PieceInfo::default(); PIECE_INFO_COUNT];
    pieces[0] = PieceInfo {
        width: 8,
        height: 8,
        image_offset: 0,
        mask_offset: 32,
        unknown6: 0,
    };
    let mut colors = GroundColors::default();
    for i in 0..8 {
        colors.vga_standard[i] = VgaColor::new(i as u8 * 8, 0, 0);
        colors.vga_custom[i] = VgaColor::new(0, i as u8 * 8, 0);
    }
    GroundFile {
        objects,
        pieces,
        colors,
    }
}

fn special_file() -> Vec<u8> {
    let mut data = vec![0x3F; 24];
    data.extend([0u8; 16]);
    let total = SPECIAL_WIDTH / 8 * SPECIAL_HEIGHT * 3;
    for image in 0..4 {
        let mut remaining = total;
        if image == 0 {
            // pixel (0, 0) of the first strip gets colour 1
            data.extend([0x00, 0x80]);
            remaining -= 1;
        }
        while remaining > 0 {
            let run = remaining.min(128);
            data.extend([(257 - run) as u8, 0x00]);
            remaining -= run;
        }
        data.push(0x80);
    }
    encode_stored_chunk(&data)
}

fn write_data_dir(dir: &Path) {
    fs::write(dir.join("GROUND0O.DAT"), ground_file().to_bytes().unwrap()).unwrap();

    let mut graphics = encode_stored_chunk(&solid_block(3));
    graphics.extend(encode_stored_chunk(&solid_block(5)));
    // lower case on purpose: lookups ignore case
    fs::write(dir.join("vgagr0.dat"), graphics).unwrap();

    fs::write(dir.join("VGASPEC0.DAT"), special_file()).unwrap();
}

fn levels() -> Vec<Level> {
    let mut ordinary = Level::default();
    ordinary.pieces[0] = LevelPiece {
        modifiers_and_x_plus16: 16,
        y_plus4_and_id: 4 << 7,
    };
    ordinary.objects[0] = LevelObject {
        x_plus16: 16 + 16,
        y: 0,
        id: 0,
        modifiers: ObjectModifiers::empty(),
    };
    ordinary.metals[0] = LevelMetal {
        x_plus4_and_y: (4 + 100) << 7,
        width_minus1_and_height_minus1: 0x11,
        unused: 0,
    };
    ordinary.name[..8].copy_from_slice(b"ordinary");

    let mut special = ordinary.clone();
    special.special_id = 1;
    special.name[..8].copy_from_slice(b"special ");

    vec![ordinary, special]
}

fn write_level_file(path: &Path) {
    let mut container = Vec::new();
    for level in levels() {
        container.extend(encode_stored_chunk(&level.to_bytes().unwrap()));
    }
    fs::write(path, container).unwrap();
}

#[test]
fn renders_levels_from_data_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_data_dir(dir.path());
    let level_path = dir.path().join("LEVEL000.DAT");
    write_level_file(&level_path);

    let levels = read_levels(&mut File::open(&level_path).unwrap()).unwrap();
    assert_eq!(levels.len(), 2);
    assert_eq!(levels[0].display_name(), "ordinary");

    let mut imager = LevelImager::new(dir.path(), RenderConfig::default());

    let ordinary = imager.render(&levels[0]).unwrap();
    assert_eq!(ordinary.indexed.len(), CANVAS_WIDTH * 160);
    assert_eq!(ordinary.indexed[0], 3);
    assert_eq!(ordinary.indexed[7 * CANVAS_WIDTH + 7], 3);
    assert_eq!(ordinary.indexed[8], 0);
    assert_eq!(ordinary.indexed[16], 5);
    assert_eq!(ordinary.palette.colors[7], VgaColor::new(0, 0, 0));
    assert_eq!(ordinary.palette.colors[9], VgaColor::new(0, 8, 0));
    // no overlay without the option
    assert_eq!(ordinary.indexed[400 + 1], 0);

    let special = imager.render(&levels[1]).unwrap();
    assert_eq!(imager.cached_grounds(), 1);
    // terrain pieces are replaced by the background strips
    assert_eq!(special.indexed[0], 0);
    assert_eq!(special.indexed[304], 9);
    assert_eq!(special.indexed[16], 5);
    assert_eq!(special.palette.colors[7], VgaColor::new(0x1F, 0x1F, 0x00));
    assert_eq!(special.palette.colors[8], VgaColor::new(0x3F, 0x3F, 0x3F));

    let png = dir.path().join("out").join("level0.png");
    fs::create_dir_all(png.parent().unwrap()).unwrap();
    ordinary.write_png(&png).unwrap();
    assert!(fs::metadata(&png).unwrap().len() > 0);
}

#[test]
fn effect_boundaries_are_drawn_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    write_data_dir(dir.path());
    let config = RenderConfig {
        effect_boundaries: true,
        ..RenderConfig::default()
    };
    let mut imager = LevelImager::new(dir.path(), config);
    let levels = levels();
    let rendered = imager.render(&levels[0]).unwrap();

    // metal area at (400, 0), 8x8 pixels, drawn in code 9 with the dashed toggle
    assert_eq!(rendered.indexed[400], 9);
    assert_eq!(rendered.indexed[403], 9 ^ 4);
    assert_eq!(rendered.indexed[7 * CANVAS_WIDTH + 400], 9 ^ 4);
    assert_eq!(rendered.indexed[CANVAS_WIDTH + 401], 0);

    // exit trigger area starts at the object's corner and covers the object
    assert_eq!(rendered.indexed[16], 1);
    assert_eq!(rendered.indexed[CANVAS_WIDTH + 17], 5);
}
