use std::collections::HashMap;

use log::{debug, info, trace, warn};

use crate::cache::error::DecodeResult;
use crate::cache::reader::ByteCursor;
use crate::cache::spritedata::Sprites;
use crate::cache::store::{decode_files, index, AssetStore};
use crate::world::colour::adjust_rgb;

const TINT_MASK: u32 = 0xff00_0000;
const GREY_TINT: u32 = 0x0300_0000;


#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextureDefinition {
    pub id: u32,
    pub average_colour: u16,
    pub opaque: bool,
    pub sprite_ids: Vec<u16>,
    /// per layer after the first, only mode 0 is drawn
    pub render_modes: Vec<u8>,
    pub extra: Vec<u8>,
    pub tints: Vec<i32>,
    pub animation_direction: u8,
    pub animation_speed: u8,
}

/// Recolours grey palette entries with a tint.
fn tint_palette(palette: &mut [u32], tint: u32) {
    if tint & TINT_MASK != GREY_TINT {
        return;
    }
    let red_blue = tint & 0xff00ff;
    let green = (tint >> 8) & 0xff;
    for entry in palette.iter_mut() {
        let c = *entry;
        if c >> 8 == c & 0xffff {
            let v = c & 0xff;
            *entry = ((red_blue * v) >> 8 & 0xff00ff) | (green * v & 0xff00);
        }
    }
}

impl TextureDefinition {
    pub fn decode(id: u32, data: &[u8]) -> DecodeResult<Self> {
        let mut cursor = ByteCursor::new(data);
        let average_colour = cursor.read_u16()?;
        let opaque = cursor.read_bool()?;
        let count = cursor.read_u8()? as usize;
        let sprite_ids = (0..count).map(|_| cursor.read_u16()).collect::<DecodeResult<Vec<_>>>()?;

        let layers = count.saturating_sub(1);
        let (render_modes, extra) = if count > 1 {
            (cursor.read_bytes(layers)?.to_vec(), cursor.read_bytes(layers)?.to_vec())
        } else {
            (Vec::new(), Vec::new())
        };
        let tints = (0..count).map(|_| cursor.read_i32()).collect::<DecodeResult<Vec<_>>>()?;

        Ok(TextureDefinition {
            id,
            average_colour,
            opaque,
            sprite_ids,
            render_modes,
            extra,
            tints,
            animation_direction: cursor.read_u8()?,
            animation_speed: cursor.read_u8()?,
        })
    }

    /// Composites the referenced sprites into a `size` square of RGB pixels,
    /// 0 being transparent.
    pub fn generate_pixels(&self, sprites: &Sprites, brightness: f64, size: usize) -> Option<Vec<u32>> {
        let mut pixels = vec![0u32; size * size];

        for (layer, &sprite_id) in self.sprite_ids.iter().enumerate() {
            let Some(frame) = sprites.get(sprite_id as u32) else {
                debug!("texture {}: missing sprite {sprite_id}", self.id);
                return None;
            };
            let frame = frame.normalize();

            let mut palette = frame.palette.clone();
            tint_palette(&mut palette, self.tints.get(layer).copied().unwrap_or(0) as u32);
            for entry in palette.iter_mut() {
                *entry = adjust_rgb(*entry, brightness);
            }

            let mode = if layer == 0 { 0 } else { self.render_modes.get(layer - 1).copied().unwrap_or(0) };
            if mode != 0 {
                continue;
            }

            let source: Box<dyn Fn(usize, usize) -> usize> = match (frame.max_width as usize, size) {
                (w, s) if w == s => Box::new(move |x: usize, y: usize| y * s + x),
                (64, 128) => Box::new(|x: usize, y: usize| ((y >> 1) << 6) + (x >> 1)),
                (128, 64) => Box::new(|x: usize, y: usize| (x << 1) + ((y << 1) << 7)),
                (w, s) => {
                    warn!("texture {}: cannot scale {w} pixel sprite to {s}", self.id);
                    return None;
                }
            };

            for y in 0..size {
                for x in 0..size {
                    let index = frame.indices.get(source(x, y)).copied().unwrap_or(0) as usize;
                    pixels[y * size + x] = palette.get(index).copied().unwrap_or(0);
                }
            }
        }

        Some(pixels)
    }
}


#[derive(Debug, Default)]
pub struct TextureDefinitions {
    definitions: HashMap<u32, TextureDefinition>,
}

impl TextureDefinitions {
    pub fn load<S: AssetStore + ?Sized>(store: &S) -> Self {
        trace!("TextureDefinitions::load");
        let definitions = decode_files(store, index::TEXTURES, 0, "texture", TextureDefinition::decode);
        info!("loaded {} texture definitions", definitions.len());
        Self { definitions }
    }

    pub fn insert(&mut self, def: TextureDefinition) {
        self.definitions.insert(def.id, def);
    }

    pub fn get(&self, id: u32) -> Option<&TextureDefinition> {
        self.definitions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }
}
