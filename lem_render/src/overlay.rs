//! Dashed outlines around indestructible areas and object trigger areas.

use anyhow::Result;
use lem_formats::ground::{Effect, ObjectInfo, VgaGround};
use lem_formats::level::{Level, LevelMetal, LevelObject};
use lem_formats::MASK_BIT;
use log::warn;

use crate::config::MissingSpritePolicy;
use crate::error::RenderError;
use crate::framebuffer::{CANVAS_HEIGHT, CANVAS_WIDTH, Framebuffer};

/// Inclusive pixel rectangle; may extend past the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

const MAX_X: i32 = CANVAS_WIDTH as i32 - 1;
const MAX_Y: i32 = CANVAS_HEIGHT as i32 - 1;

/// Marker colour at `(x, y)`: alternates the effect code's bit 2 every two
/// pixels along a line.
#[inline]
fn marker(code: u8, x: i32, y: i32) -> u8 {
    let sum = x + y;
    let toggle = ((sum << 2) & (sum << 1) & 0x04) as u8;
    MASK_BIT | (code ^ toggle)
}

fn hline(fb: &mut Framebuffer, x1: i32, x2: i32, y: i32, code: u8) {
    if x1 > MAX_X || x2 < 0 || !(0..=MAX_Y).contains(&y) {
        return;
    }
    for x in x1.max(0)..=x2.min(MAX_X) {
        fb.set(x, y, marker(code, x, y));
    }
}

fn vline(fb: &mut Framebuffer, x: i32, y1: i32, y2: i32, code: u8) {
    if !(0..=MAX_X).contains(&x) || y1 > MAX_Y || y2 < 0 {
        return;
    }
    for y in y1.max(0)..=y2.min(MAX_Y) {
        fb.set(x, y, marker(code, x, y));
    }
}

/// Draw the four edges of `rect`, clipped to the canvas.
pub fn draw_boundary(fb: &mut Framebuffer, rect: Rect, code: u8) {
    hline(fb, rect.x1, rect.x2, rect.y1, code);
    hline(fb, rect.x1, rect.x2, rect.y2, code);
    vline(fb, rect.x1, rect.y1, rect.y2, code);
    vline(fb, rect.x2, rect.y1, rect.y2, code);
}

pub fn metal_rect(metal: &LevelMetal) -> Rect {
    let x1 = metal.x() * 4;
    let y1 = metal.y() * 4;
    Rect {
        x1,
        y1,
        x2: x1 + metal.width() * 4 - 1,
        y2: y1 + metal.height() * 4 - 1,
    }
}

/// Trigger area of a placed object, snapped to the 4-pixel grid. `None` when
/// the object has no effect or an empty area.
pub fn object_effect_rect(object: &LevelObject, info: &ObjectInfo) -> Option<Rect> {
    if info.effect == Effect::None.code() || info.effect_width == 0 || info.effect_height == 0 {
        return None;
    }
    let x1 = (object.x() + i32::from(info.effect_left) * 4) & !3;
    let y1 = (object.y() + info.effect_top() * 4) & !3;
    Some(Rect {
        x1,
        y1,
        x2: x1 + i32::from(info.effect_width) * 4 - 1,
        y2: y1 + i32::from(info.effect_height) * 4 - 1,
    })
}

/// Outline every metal area and the trigger area of every used object.
pub fn draw_level_boundaries(
    fb: &mut Framebuffer,
    ground: &VgaGround,
    level: &Level,
    policy: MissingSpritePolicy,
) -> Result<()> {
    for metal in &level.metals {
        draw_boundary(fb, metal_rect(metal), Effect::Indestructible.code());
    }

    for (slot, object) in level.objects.iter().enumerate() {
        if object.is_unused() {
            continue;
        }
        let Some(vga) = ground.objects.get(usize::from(object.id)) else {
            let err = RenderError::MissingObject {
                slot,
                id: object.id,
                available: ground.objects.len(),
            };
            match policy {
                MissingSpritePolicy::Skip => {
                    warn!("{err}; no effect boundary");
                    continue;
                }
                MissingSpritePolicy::Error => return Err(err.into()),
            }
        };
        if let Some(rect) = object_effect_rect(object, &vga.info) {
            draw_boundary(fb, rect, vga.info.effect);
        }
    }
    Ok(())
}
