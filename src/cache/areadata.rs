use std::collections::HashMap;

use log::{info, trace, warn};
use serde::Serialize;

use crate::cache::error::{DecodeError, DecodeResult};
use crate::cache::reader::ByteCursor;
use crate::cache::store::{config, decode_archive, AssetStore};


/// World map area, referenced by objects that show a map marker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Area {
    pub id: u32,
    pub sprite: Option<u32>,
    pub secondary_sprite: Option<u32>,
    pub name: Option<String>,
    pub text_colour: u32,
    pub text_size: u8,
    pub flags: u8,
    pub options: [Option<String>; 5],
    /// polygon corners as `(x, y)` pairs
    pub polygon: Vec<(i16, i16)>,
    pub polygon_colours: Vec<i32>,
    pub polygon_flags: Vec<u8>,
    pub menu_target: Option<String>,
    pub category: Option<u16>,
}

impl Area {
    fn apply(&mut self, cursor: &mut ByteCursor) -> DecodeResult<()> {
        loop {
            let opcode = cursor.read_u8()?;
            match opcode {
                0 => return Ok(()),
                1 => self.sprite = cursor.read_big_smart()?,
                2 => self.secondary_sprite = cursor.read_big_smart()?,
                3 => self.name = Some(cursor.read_string()?),
                4 => self.text_colour = cursor.read_u24()?,
                5 | 23 => {
                    cursor.read_u24()?;
                }
                6 => self.text_size = cursor.read_u8()?,
                7 => self.flags = cursor.read_u8()?,
                8 | 28 | 29 | 30 => {
                    cursor.read_u8()?;
                }
                10..=14 => self.options[(opcode - 10) as usize] = Some(cursor.read_string()?),
                15 => {
                    let points = cursor.read_u8()? as usize;
                    self.polygon = (0..points)
                        .map(|_| -> DecodeResult<(i16, i16)> { Ok((cursor.read_i16()?, cursor.read_i16()?)) })
                        .collect::<DecodeResult<_>>()?;
                    cursor.read_i32()?;
                    let colours = cursor.read_u8()? as usize;
                    self.polygon_colours = (0..colours).map(|_| cursor.read_i32()).collect::<DecodeResult<_>>()?;
                    self.polygon_flags = cursor.read_bytes(points)?.to_vec();
                }
                16 => {}
                17 => self.menu_target = Some(cursor.read_string()?),
                18 | 25 => {
                    cursor.read_big_smart()?;
                }
                19 => self.category = Some(cursor.read_u16()?),
                21 | 22 | 24 => {
                    cursor.read_i32()?;
                }
                _ => return Err(DecodeError::UnknownOpcode { kind: "area", opcode }),
            }
        }
    }

    pub fn decode(id: u32, data: &[u8]) -> DecodeResult<Self> {
        let mut area = Area { id, ..Default::default() };
        let mut cursor = ByteCursor::new(data);
        match area.apply(&mut cursor) {
            Ok(()) => {}
            Err(err @ DecodeError::UnknownOpcode { .. }) => warn!("area {id}: {err}, record truncated"),
            Err(err) => return Err(err),
        }
        Ok(area)
    }
}


pub fn load_areas<S: AssetStore + ?Sized>(store: &S) -> HashMap<u32, Area> {
    trace!("load_areas");
    let areas = decode_archive(store, config::AREA, "area", Area::decode);
    info!("loaded {} areas", areas.len());
    areas
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::writer::ByteWriter;

    #[test]
    fn decode_named_area() {
        let mut w = ByteWriter::new();
        w.put_u8(1).put_u16(812)
            .put_u8(3).put_string("Bank")
            .put_u8(4).put_u24(0xffff00)
            .put_u8(5).put_u24(1)
            .put_u8(11).put_string("Travel")
            .put_u8(19).put_u16(7)
            .put_u8(0);
        let area = Area::decode(4, &w.into_inner()).unwrap();

        assert_eq!(area.sprite, Some(812));
        assert_eq!(area.secondary_sprite, None);
        assert_eq!(area.name.as_deref(), Some("Bank"));
        assert_eq!(area.text_colour, 0xffff00);
        assert_eq!(area.options[1].as_deref(), Some("Travel"));
        assert_eq!(area.category, Some(7));
    }

    #[test]
    fn decode_polygon() {
        let mut w = ByteWriter::new();
        w.put_u8(15).put_u8(2)
            .put_i16(-3).put_i16(4).put_i16(5).put_i16(-6)
            .put_i32(99)
            .put_u8(1).put_i32(0x123456)
            .put_bytes(&[1, 2])
            .put_u8(16)
            .put_u8(0);
        let area = Area::decode(0, &w.into_inner()).unwrap();
        assert_eq!(area.polygon, vec![(-3, 4), (5, -6)]);
        assert_eq!(area.polygon_colours, vec![0x123456]);
        assert_eq!(area.polygon_flags, vec![1, 2]);
    }

    #[test]
    fn unknown_opcode_truncates() {
        let area = Area::decode(0, &[6, 9, 9, 1, 2]).unwrap();
        assert_eq!(area.text_size, 9);
        assert!(Area::decode(0, &[3, b'a']).is_err());
    }
}
