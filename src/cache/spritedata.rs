use std::collections::HashMap;

use log::{debug, info, trace};

use crate::cache::error::{DecodeError, DecodeResult};
use crate::cache::reader::ByteCursor;
use crate::cache::store::{index, AssetStore};

const FLAG_VERTICAL: u8 = 1;
const FLAG_ALPHA: u8 = 2;


/// One frame of a sprite archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteFrame {
    pub offset_x: u16,
    pub offset_y: u16,
    pub width: u16,
    pub height: u16,
    pub max_width: u16,
    pub max_height: u16,
    /// palette index per pixel, row major
    pub indices: Vec<u8>,
    /// RGB entries, entry 0 is transparent
    pub palette: Vec<u32>,
    /// ARGB, 0 is transparent
    pub pixels: Vec<u32>,
}

impl SpriteFrame {
    /// Pads the frame to its full size using its offsets.
    pub fn normalize(&self) -> SpriteFrame {
        if self.width == self.max_width && self.height == self.max_height {
            return self.clone();
        }

        let (w, h) = (self.max_width as usize, self.max_height as usize);
        let mut indices = vec![0u8; w * h];
        let mut pixels = vec![0u32; w * h];
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                let tx = x + self.offset_x as usize;
                let ty = y + self.offset_y as usize;
                if tx < w && ty < h {
                    let src = y * self.width as usize + x;
                    indices[ty * w + tx] = self.indices[src];
                    pixels[ty * w + tx] = self.pixels[src];
                }
            }
        }

        SpriteFrame {
            offset_x: 0,
            offset_y: 0,
            width: self.max_width,
            height: self.max_height,
            indices,
            pixels,
            ..self.clone()
        }
    }
}

fn read_plane(cursor: &mut ByteCursor, width: usize, height: usize, vertical: bool) -> DecodeResult<Vec<u8>> {
    let bytes = cursor.read_bytes(width * height)?;
    if !vertical {
        return Ok(bytes.to_vec());
    }
    let mut plane = vec![0u8; width * height];
    for x in 0..width {
        for y in 0..height {
            plane[y * width + x] = bytes[x * height + y];
        }
    }
    Ok(plane)
}

/// Decodes all frames of a sprite archive. Frame headers and the palette
/// live in a trailer, pixel data runs forward from the start.
pub fn decode_sprites(data: &[u8]) -> DecodeResult<Vec<SpriteFrame>> {
    let mut cursor = ByteCursor::new(data);
    cursor.seek_from_end(2)?;
    let count = cursor.read_u16()? as usize;

    let header = 7 + count * 8;
    cursor.seek_from_end(header)?;
    let max_width = cursor.read_u16()?;
    let max_height = cursor.read_u16()?;
    let palette_len = cursor.read_u8()? as usize + 1;

    let mut fields = [vec![0u16; count], vec![0u16; count], vec![0u16; count], vec![0u16; count]];
    for field in fields.iter_mut() {
        for value in field.iter_mut() {
            *value = cursor.read_u16()?;
        }
    }
    let [offset_x, offset_y, width, height] = fields;

    cursor.seek_from_end(header + (palette_len - 1) * 3)?;
    let mut palette = vec![0u32; palette_len];
    for entry in palette.iter_mut().skip(1) {
        *entry = match cursor.read_u24()? {
            0 => 1,
            rgb => rgb,
        };
    }

    cursor.set_offset(0);
    let mut frames = Vec::with_capacity(count);
    for i in 0..count {
        let (w, h) = (width[i] as usize, height[i] as usize);
        let flags = cursor.read_u8()?;
        let vertical = flags & FLAG_VERTICAL != 0;
        let indices = read_plane(&mut cursor, w, h, vertical)?;
        let alphas = if flags & FLAG_ALPHA != 0 {
            read_plane(&mut cursor, w, h, vertical)?
        } else {
            indices.iter().map(|&i| if i != 0 { 0xff } else { 0 }).collect()
        };

        let pixels = indices
            .iter()
            .zip(alphas.iter())
            .map(|(&i, &a)| {
                let rgb = palette.get(i as usize).copied().ok_or(DecodeError::InvalidIndex {
                    what: "palette",
                    index: i as usize,
                    len: palette.len(),
                })?;
                Ok(rgb | (a as u32) << 24)
            })
            .collect::<DecodeResult<Vec<u32>>>()?;

        frames.push(SpriteFrame {
            offset_x: offset_x[i],
            offset_y: offset_y[i],
            width: width[i],
            height: height[i],
            max_width,
            max_height,
            indices,
            palette: palette.clone(),
            pixels,
        });
    }

    Ok(frames)
}


/// Sprite archives keyed by archive id.
#[derive(Debug, Default)]
pub struct Sprites {
    archives: HashMap<u32, Vec<SpriteFrame>>,
}

impl Sprites {
    pub fn load<S: AssetStore + ?Sized>(store: &S) -> Self {
        trace!("Sprites::load");
        let mut sprites = Self::default();
        for id in store.archive_ids(index::SPRITES) {
            let Some(data) = store.file(index::SPRITES, id, 0) else {
                continue;
            };
            match decode_sprites(&data) {
                Ok(frames) => sprites.insert(id, frames),
                Err(err) => debug!("skipping sprite {id}: {err}"),
            }
        }
        info!("loaded {} sprites", sprites.archives.len());
        sprites
    }

    pub fn insert(&mut self, id: u32, frames: Vec<SpriteFrame>) {
        self.archives.insert(id, frames);
    }

    /// first frame of a sprite archive
    pub fn get(&self, id: u32) -> Option<&SpriteFrame> {
        self.archives.get(&id).and_then(|frames| frames.first())
    }

    pub fn frames(&self, id: u32) -> Option<&[SpriteFrame]> {
        self.archives.get(&id).map(Vec::as_slice)
    }
}


#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::writer::ByteWriter;

    /// Single frame archive with a two colour palette.
    pub fn sprite_bytes(width: u16, height: u16, max: (u16, u16), offset: (u16, u16), flags: u8, pixels: &[u8], alphas: &[u8]) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_u8(flags).put_bytes(pixels).put_bytes(alphas);
        // palette entries 1 and 2
        w.put_u24(0xff0000).put_u24(0);
        w.put_u16(max.0).put_u16(max.1).put_u8(2);
        w.put_u16(offset.0).put_u16(offset.1).put_u16(width).put_u16(height);
        w.put_u16(1);
        w.into_inner()
    }

    #[test]
    fn horizontal_frame() {
        let data = sprite_bytes(2, 2, (2, 2), (0, 0), 0, &[0, 1, 2, 1], &[]);
        let frames = decode_sprites(&data).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.palette, vec![0, 0xff0000, 1]);
        assert_eq!(frame.pixels, vec![0, 0xffff0000, 0xff000001, 0xffff0000]);
    }

    #[test]
    fn vertical_frame_with_alpha() {
        let data = sprite_bytes(2, 1, (2, 1), (0, 0), FLAG_VERTICAL | FLAG_ALPHA, &[1, 2], &[0x80, 0x40]);
        let frame = &decode_sprites(&data).unwrap()[0];
        assert_eq!(frame.indices, vec![1, 2]);
        assert_eq!(frame.pixels, vec![0x80ff0000, 0x40000001]);

        // column major: the two bytes of the first column come first
        let data = sprite_bytes(2, 2, (2, 2), (0, 0), FLAG_VERTICAL, &[1, 2, 0, 1], &[]);
        let frame = &decode_sprites(&data).unwrap()[0];
        assert_eq!(frame.indices, vec![1, 0, 2, 1]);
    }

    #[test]
    fn normalize_pads_with_offsets() {
        let data = sprite_bytes(1, 1, (3, 2), (2, 1), 0, &[1], &[]);
        let frame = decode_sprites(&data).unwrap()[0].normalize();
        assert_eq!((frame.width, frame.height, frame.offset_x), (3, 2, 0));
        assert_eq!(frame.indices, vec![0, 0, 0, 0, 0, 1]);
        assert_eq!(frame.pixels[5], 0xffff0000);
    }

    #[test]
    fn bad_palette_index_and_truncation() {
        let data = sprite_bytes(1, 1, (1, 1), (0, 0), 0, &[7], &[]);
        assert!(matches!(decode_sprites(&data), Err(DecodeError::InvalidIndex { what: "palette", .. })));
        assert!(decode_sprites(&[0, 5]).is_err());
    }
}
