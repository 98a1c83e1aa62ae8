//! Masked blits onto the terrain and object planes.
//!
//! Terrain pieces draw onto the terrain plane in list order. Objects draw onto
//! their own plane and may consult the terrain plane, which is complete by the
//! time objects are drawn. The two planes merge into one indexed image.

use anyhow::Result;
use lem_formats::ground::{VgaGround, VgaSpecial};
use lem_formats::level::{Level, ObjectModifiers, PieceModifiers};
use lem_formats::planar::SPECIAL_HEIGHT;
use lem_formats::{MASK_BIT, Sprite};
use log::{debug, warn};

use crate::config::{MissingSpritePolicy, RecolorRule, RenderConfig};
use crate::error::RenderError;
use crate::framebuffer::Framebuffer;
use crate::overlay;

/// Left edge of the special background strips.
pub const SPECIAL_LEFT: i32 = 304;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceBlend {
    Normal,
    /// Only fills pixels that are still transparent.
    Behind,
    /// Clears the destination under every opaque source pixel.
    Erase,
}

impl PieceBlend {
    pub fn from_modifiers(modifiers: PieceModifiers) -> Self {
        if modifiers.contains(PieceModifiers::BEHIND) {
            PieceBlend::Behind
        } else if modifiers.contains(PieceModifiers::ERASE) {
            PieceBlend::Erase
        } else {
            PieceBlend::Normal
        }
    }

    #[inline]
    pub fn apply(self, src: u8, dst: u8) -> u8 {
        if src & MASK_BIT == 0 {
            return dst;
        }
        match self {
            PieceBlend::Normal => src,
            PieceBlend::Behind if dst & MASK_BIT == 0 => src,
            PieceBlend::Behind => dst,
            PieceBlend::Erase => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectBlend {
    Normal,
    /// Recolours the object where it overlaps terrain.
    Mask,
    /// Draws only over terrain not yet covered by another object.
    Behind,
}

impl ObjectBlend {
    pub fn from_modifiers(modifiers: ObjectModifiers) -> Self {
        if modifiers.contains(ObjectModifiers::MASK) {
            ObjectBlend::Mask
        } else if modifiers.contains(ObjectModifiers::BEHIND) {
            ObjectBlend::Behind
        } else {
            ObjectBlend::Normal
        }
    }

    /// Combine one source pixel with the object plane (`dst`), gated by the
    /// terrain plane (`terrain`) for the masked and behind modes.
    #[inline]
    pub fn apply(self, src: u8, terrain: u8, dst: u8, recolor: RecolorRule) -> u8 {
        if src & MASK_BIT == 0 {
            return dst;
        }
        let gated = terrain & MASK_BIT != 0 && dst & MASK_BIT == 0;
        match self {
            ObjectBlend::Normal => src,
            ObjectBlend::Mask if gated => recolor.apply(src),
            ObjectBlend::Behind if gated => src,
            ObjectBlend::Mask | ObjectBlend::Behind => dst,
        }
    }
}

/// Walk the rows of `sprite` placed at `(x, y)`, bottom row first when
/// `flip` is set, calling `blend` with the source pixel and the canvas index
/// of every on-canvas destination.
fn for_each_pixel(
    sprite: &Sprite,
    x: i32,
    y: i32,
    flip: bool,
    mut blend: impl FnMut(u8, usize),
) {
    let height = sprite.height();
    for row in 0..height {
        let dst_y = y + row as i32;
        let src_row = if flip { height - 1 - row } else { row };
        for (column, &src) in sprite.row(src_row).iter().enumerate() {
            let dst_x = x + column as i32;
            if let Some(index) = Framebuffer::index(dst_x, dst_y) {
                blend(src, index);
            }
        }
    }
}

pub fn blit_piece(
    terrain: &mut Framebuffer,
    sprite: &Sprite,
    x: i32,
    y: i32,
    blend: PieceBlend,
    flip: bool,
) {
    let pixels = terrain.pixels_mut();
    for_each_pixel(sprite, x, y, flip, |src, index| {
        pixels[index] = blend.apply(src, pixels[index]);
    });
}

/// Blit an object sprite. The horizontal position is floored to a multiple
/// of 8, the granularity objects are stored at.
#[allow(clippy::too_many_arguments)]
pub fn blit_object(
    objects: &mut Framebuffer,
    terrain: &Framebuffer,
    sprite: &Sprite,
    x: i32,
    y: i32,
    blend: ObjectBlend,
    flip: bool,
    recolor: RecolorRule,
) {
    let selector = terrain.pixels();
    let pixels = objects.pixels_mut();
    for_each_pixel(sprite, x & !7, y, flip, |src, index| {
        pixels[index] = blend.apply(src, selector[index], pixels[index], recolor);
    });
}

/// Draw the special background strips stacked from the top of the canvas.
pub fn blit_special(terrain: &mut Framebuffer, images: &[Sprite]) {
    for (strip, image) in images.iter().enumerate() {
        let y = (strip * SPECIAL_HEIGHT) as i32;
        blit_piece(terrain, image, SPECIAL_LEFT, y, PieceBlend::Normal, false);
    }
}

/// Flatten both planes into palette indices 0..=15: objects win over terrain,
/// and pixels covered by neither become 0.
pub fn merge_planes(terrain: &Framebuffer, objects: &Framebuffer) -> Vec<u8> {
    terrain
        .pixels()
        .iter()
        .zip(objects.pixels())
        .map(|(&terrain, &object)| {
            if object & MASK_BIT != 0 {
                object & 0x0F
            } else if terrain & MASK_BIT != 0 {
                terrain & 0x0F
            } else {
                0
            }
        })
        .collect()
}

/// Owns the two planes of one level render.
#[derive(Debug, Default)]
pub struct Compositor {
    pub terrain: Framebuffer,
    pub objects: Framebuffer,
    config: RenderConfig,
}

impl Compositor {
    pub fn new(config: RenderConfig) -> Self {
        Compositor {
            terrain: Framebuffer::new(),
            objects: Framebuffer::new(),
            config,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn render_special(&mut self, special: &VgaSpecial) {
        blit_special(&mut self.terrain, &special.images);
    }

    /// Draw terrain pieces up to the first unused slot.
    pub fn render_pieces(&mut self, ground: &VgaGround, level: &Level) -> Result<()> {
        let mut drawn = 0usize;
        for (slot, placement) in level.pieces_in_use().enumerate() {
            let id = placement.id();
            let Some(piece) = ground.pieces.get(usize::from(id)) else {
                self.missing(RenderError::MissingPiece {
                    slot,
                    id: u16::from(id),
                    available: ground.pieces.len(),
                })?;
                continue;
            };
            let modifiers = placement.modifiers();
            blit_piece(
                &mut self.terrain,
                &piece.image,
                placement.x(),
                placement.y(),
                PieceBlend::from_modifiers(modifiers),
                modifiers.contains(PieceModifiers::FLIP),
            );
            drawn += 1;
        }
        debug!("drew {drawn} terrain pieces");
        Ok(())
    }

    /// Draw every used object's still image.
    pub fn render_objects(&mut self, ground: &VgaGround, level: &Level) -> Result<()> {
        let mut drawn = 0usize;
        for (slot, placement) in level.objects.iter().enumerate() {
            if placement.is_unused() {
                continue;
            }
            let Some(object) = ground.objects.get(usize::from(placement.id)) else {
                self.missing(RenderError::MissingObject {
                    slot,
                    id: placement.id,
                    available: ground.objects.len(),
                })?;
                continue;
            };
            blit_object(
                &mut self.objects,
                &self.terrain,
                &object.image,
                placement.x(),
                placement.y(),
                ObjectBlend::from_modifiers(placement.modifiers),
                placement.modifiers.contains(ObjectModifiers::FLIP),
                self.config.recolor,
            );
            drawn += 1;
        }
        debug!("drew {drawn} objects");
        Ok(())
    }

    /// Outline metal areas and object trigger areas on the object plane.
    pub fn render_effect_boundaries(&mut self, ground: &VgaGround, level: &Level) -> Result<()> {
        overlay::draw_level_boundaries(
            &mut self.objects,
            ground,
            level,
            self.config.missing_sprites,
        )
    }

    pub fn merge(&self) -> Vec<u8> {
        merge_planes(&self.terrain, &self.objects)
    }

    /// Run every pass for `level`. Special levels replace the terrain pieces
    /// with the special background.
    pub fn render(
        &mut self,
        ground: &VgaGround,
        special: Option<&VgaSpecial>,
        level: &Level,
    ) -> Result<Vec<u8>> {
        match special {
            Some(special) => self.render_special(special),
            None => self.render_pieces(ground, level)?,
        }
        self.render_objects(ground, level)?;
        if self.config.effect_boundaries {
            self.render_effect_boundaries(ground, level)?;
        }
        Ok(self.merge())
    }

    fn missing(&self, err: RenderError) -> Result<()> {
        match self.config.missing_sprites {
            MissingSpritePolicy::Skip => {
                warn!("{err}; skipping");
                Ok(())
            }
            MissingSpritePolicy::Error => Err(err.into()),
        }
    }
}
