use std::env;
use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result};
use lem_formats::level::{Level, LevelMode, SkillCounts};
use lem_formats::{ObjectModifiers, PieceModifiers, read_levels};
use serde::Serialize;

#[derive(Serialize)]
struct LevelSummary {
    index: usize,
    name: String,
    release_rate: u16,
    release_count: u16,
    to_save_count: u16,
    time_minutes: u16,
    skills: SkillCounts,
    initial_x: u16,
    ground_id: u16,
    special_id: u16,
    mode: LevelMode,
    objects: Vec<ObjectPlacement>,
    pieces: Vec<PiecePlacement>,
    metals: Vec<MetalArea>,
}

#[derive(Serialize)]
struct ObjectPlacement {
    slot: usize,
    id: u16,
    x: i32,
    y: i32,
    modifiers: ObjectModifiers,
}

#[derive(Serialize)]
struct PiecePlacement {
    id: u8,
    x: i32,
    y: i32,
    modifiers: PieceModifiers,
}

#[derive(Serialize)]
struct MetalArea {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

fn summarize(index: usize, level: &Level) -> LevelSummary {
    LevelSummary {
        index,
        name: level.display_name(),
        release_rate: level.release_rate,
        release_count: level.release_count,
        to_save_count: level.to_save_count,
        time_minutes: level.time_minutes,
        skills: level.skills,
        initial_x: level.initial_x,
        ground_id: level.ground_id,
        special_id: level.special_id,
        mode: level.mode(),
        objects: level
            .objects
            .iter()
            .enumerate()
            .filter(|(_, object)| !object.is_unused())
            .map(|(slot, object)| ObjectPlacement {
                slot,
                id: object.id,
                x: object.x(),
                y: object.y(),
                modifiers: object.modifiers,
            })
            .collect(),
        pieces: level
            .pieces_in_use()
            .map(|piece| PiecePlacement {
                id: piece.id(),
                x: piece.x(),
                y: piece.y(),
                modifiers: piece.modifiers(),
            })
            .collect(),
        metals: level
            .metals
            .iter()
            .map(|metal| MetalArea {
                x: metal.x(),
                y: metal.y(),
                width: metal.width(),
                height: metal.height(),
            })
            .collect(),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .context("usage: level_dump <LEVEL00n.DAT>")?;
    let file = File::open(&path).with_context(|| format!("opening {path}"))?;
    let levels = read_levels(&mut BufReader::new(file)).with_context(|| format!("reading {path}"))?;

    let summaries: Vec<LevelSummary> = levels
        .iter()
        .enumerate()
        .map(|(index, level)| summarize(index, level))
        .collect();
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}
