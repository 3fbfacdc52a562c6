//! Terrain of one region: tile decode followed by the lighting, colour
//! blending and corner passes.
//!
//! Every pass walks planes first, then x, then y. The colour blend relies on
//! that order to slide its window monotonically across the region.

use std::ops::{AddAssign, SubAssign};

use log::{debug, trace};

use crate::cache::error::DecodeResult;
use crate::cache::floordata::FloorDefinitions;
use crate::cache::reader::ByteCursor;
use crate::world::colour::{light, pack_hsl, Hsl, Palette};
use crate::world::noise::calculate_height;
use crate::world::tiles::{Corner, TileColour, TileGrid, TileOverlay, PLANES, PLANE_HEIGHT, REGION_SIZE, TILE_UNITS};

const SIZE: i32 = REGION_SIZE as i32;

/// half width of the colour blend window
pub const BLEND_RADIUS: i32 = 5;
pub const AMBIENT: i32 = 96;
const CONTRAST: i32 = 768;
const LIGHT: [i32; 3] = [-50, -10, -50];


/// Running HSL sums of the underlays inside a blend window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct HslSum {
    pub hue: i32,
    pub saturation: i32,
    pub lightness: i32,
    pub hue_multiplier: i32,
    pub count: i32,
}

impl AddAssign<&Hsl> for HslSum {
    fn add_assign(&mut self, hsl: &Hsl) {
        self.hue += hsl.weighted_hue;
        self.saturation += hsl.saturation;
        self.lightness += hsl.lightness;
        self.hue_multiplier += hsl.hue_multiplier;
        self.count += 1;
    }
}

impl SubAssign<&Hsl> for HslSum {
    fn sub_assign(&mut self, hsl: &Hsl) {
        self.hue -= hsl.weighted_hue;
        self.saturation -= hsl.saturation;
        self.lightness -= hsl.lightness;
        self.hue_multiplier -= hsl.hue_multiplier;
        self.count -= 1;
    }
}

impl AddAssign<HslSum> for HslSum {
    fn add_assign(&mut self, other: HslSum) {
        self.hue += other.hue;
        self.saturation += other.saturation;
        self.lightness += other.lightness;
        self.hue_multiplier += other.hue_multiplier;
        self.count += other.count;
    }
}

impl SubAssign<HslSum> for HslSum {
    fn sub_assign(&mut self, other: HslSum) {
        self.hue -= other.hue;
        self.saturation -= other.saturation;
        self.lightness -= other.lightness;
        self.hue_multiplier -= other.hue_multiplier;
        self.count -= other.count;
    }
}

impl HslSum {
    /// averaged packed colour, `None` when nothing contributed
    pub fn packed(&self) -> Option<u16> {
        if self.count <= 0 {
            return None;
        }
        let hue = (self.hue << 8) / self.hue_multiplier.max(1);
        Some(pack_hsl(hue, self.saturation / self.count, self.lightness / self.count))
    }
}


/// Decoded and shaded terrain of a region.
#[derive(Debug, Clone)]
pub struct Landscape {
    pub region_x: u8,
    pub region_y: u8,
    pub tiles: TileGrid,
}

impl Landscape {
    /// Reads the tile records of all four planes.
    pub fn decode(region_x: u8, region_y: u8, data: &[u8]) -> DecodeResult<Self> {
        trace!("Landscape::decode {region_x}_{region_y}");
        let mut tiles = TileGrid::new();
        let mut cursor = ByteCursor::new(data);

        let base_x = (region_x as i32) << 6;
        let base_y = (region_y as i32) << 6;

        for plane in 0..PLANES {
            for x in 0..REGION_SIZE {
                for y in 0..REGION_SIZE {
                    let below = if plane > 0 { Some(tiles.tile(plane - 1, x, y).height) } else { None };
                    let tile = tiles.tile_mut(plane, x, y);

                    loop {
                        let opcode = cursor.read_u8()?;
                        match opcode {
                            0 => {
                                tile.height = match below {
                                    None => calculate_height(base_x + x as i32 + 932731, base_y + y as i32 + 556238) * 8,
                                    Some(h) => h + PLANE_HEIGHT,
                                };
                                break;
                            }
                            1 => {
                                let mut height = cursor.read_u8()? as i32;
                                if height == 1 {
                                    height = 0;
                                }
                                tile.height = below.unwrap_or(0) + height * 8;
                                break;
                            }
                            2..=49 => {
                                let id = cursor.read_u8()?;
                                let code = opcode - 2;
                                tile.overlay = (id > 0).then_some(TileOverlay { id, shape: code / 4, orientation: code & 3 });
                            }
                            50..=81 => tile.flags = opcode - 49,
                            _ => tile.underlay = opcode - 81,
                        }
                    }
                }
            }
        }

        if cursor.remaining() > 0 {
            debug!("region {region_x}_{region_y}: {} trailing terrain bytes", cursor.remaining());
        }

        Ok(Self { region_x, region_y, tiles })
    }

    /// Runs the shading passes in order: lighting, colours, corner cache.
    pub fn build(&mut self, floors: &FloorDefinitions, palette: &Palette) {
        trace!("Landscape::build {}_{}", self.region_x, self.region_y);
        for plane in 0..PLANES {
            self.build_lighting(plane);
            self.build_colours(plane, floors, palette);
        }
        self.build_corners();
    }

    pub fn load(region_x: u8, region_y: u8, data: &[u8], floors: &FloorDefinitions, palette: &Palette) -> DecodeResult<Self> {
        let mut landscape = Self::decode(region_x, region_y, data)?;
        landscape.build(floors, palette);
        Ok(landscape)
    }

    fn height(&self, plane: usize, x: i32, y: i32) -> Option<i32> {
        self.tiles.get(plane, x, y).map(|t| t.height)
    }

    /// Directional lighting from the height gradient. Each tile also subtracts
    /// a quarter of the darkness of its west and south neighbours.
    fn build_lighting(&mut self, plane: usize) {
        let magnitude = ((LIGHT[0] * LIGHT[0] + LIGHT[1] * LIGHT[1] + LIGHT[2] * LIGHT[2]) as f64).sqrt() as i32;
        let scale = CONTRAST * magnitude >> 8;

        let mut shading = vec![0i32; REGION_SIZE * REGION_SIZE];
        let shade = |shading: &[i32], x: i32, y: i32| shading[(x * SIZE + y) as usize];

        for x in 0..SIZE {
            for y in 0..SIZE {
                if x == 0 || y == 0 || x == SIZE - 1 || y == SIZE - 1 {
                    self.tiles.tile_mut(plane, x as usize, y as usize).lighting = AMBIENT;
                    continue;
                }

                let dh_x = self.height(plane, x + 1, y).unwrap_or(0) - self.height(plane, x - 1, y).unwrap_or(0);
                let dh_y = self.height(plane, x, y + 1).unwrap_or(0) - self.height(plane, x, y - 1).unwrap_or(0);
                let distance = ((dh_x * dh_x + 0x10000 + dh_y * dh_y) as f64).sqrt().max(1.0) as i32;

                let nx = (dh_x << 8) / distance;
                let ny = 0x10000 / distance;
                let nz = (dh_y << 8) / distance;
                let lightness = AMBIENT + (LIGHT[0] * nx + LIGHT[1] * ny + LIGHT[2] * nz) / scale;

                // only the west and south entries are written before this tile
                let offset = (shade(&shading, x - 1, y) >> 2) + (shade(&shading, x, y - 1) >> 2);

                shading[(x * SIZE + y) as usize] = (AMBIENT - lightness).max(0);
                self.tiles.tile_mut(plane, x as usize, y as usize).lighting = lightness - offset;
            }
        }
    }

    /// Sums of the underlays in the window `(x - 5, x + 5] x (y - 5, y + 5]`
    /// around every tile of a plane, indexed `x * 64 + y`.
    pub fn blend_sums(&self, plane: usize, floors: &FloorDefinitions) -> Vec<HslSum> {
        let underlay = |x: i32, y: i32| {
            let tile = self.tiles.get(plane, x, y)?;
            floors.underlay(tile.underlay).map(|f| &f.hsl)
        };

        let mut sums = vec![HslSum::default(); REGION_SIZE * REGION_SIZE];
        let mut columns = vec![HslSum::default(); REGION_SIZE + 1];

        for x in -BLEND_RADIUS..SIZE + BLEND_RADIUS {
            for y in 0..SIZE {
                if let Some(hsl) = underlay(x + BLEND_RADIUS, y) {
                    columns[y as usize] += hsl;
                }
                if let Some(hsl) = underlay(x - BLEND_RADIUS, y) {
                    columns[y as usize] -= hsl;
                }
            }

            if !(0..SIZE).contains(&x) {
                continue;
            }

            let mut window = HslSum::default();
            for y in -BLEND_RADIUS..SIZE + BLEND_RADIUS {
                let top = y + BLEND_RADIUS;
                let bottom = y - BLEND_RADIUS;
                if (0..SIZE).contains(&top) {
                    window += columns[top as usize];
                }
                if (0..SIZE).contains(&bottom) {
                    window -= columns[bottom as usize];
                }
                if (0..SIZE).contains(&y) {
                    sums[(x * SIZE + y) as usize] = window;
                }
            }
        }

        sums
    }

    fn build_colours(&mut self, plane: usize, floors: &FloorDefinitions, palette: &Palette) {
        let sums = self.blend_sums(plane, floors);

        for x in 0..REGION_SIZE {
            for y in 0..REGION_SIZE {
                let tile = self.tiles.tile_mut(plane, x, y);
                if tile.underlay == 0 {
                    continue;
                }
                let Some(hsl) = sums[x * REGION_SIZE + y].packed() else {
                    debug!("tile {plane} {x} {y}: no underlay contributions");
                    continue;
                };
                let rgb = match floors.underlay(tile.underlay) {
                    Some(floor) => floor.rgb,
                    None => {
                        debug!("tile {plane} {x} {y}: missing underlay {}", tile.underlay);
                        0
                    }
                };
                let rgb_lit = light(Some(hsl), AMBIENT).map_or(0, |lit| palette.rgb(lit));
                tile.colour = Some(TileColour { hsl, rgb, rgb_lit });
            }
        }
    }

    /// Caches the height and lighting of each tile corner, corners past the
    /// region edge fall back to the tile itself.
    fn build_corners(&mut self) {
        for plane in 0..PLANES {
            for x in 0..SIZE {
                for y in 0..SIZE {
                    let own = *self.tiles.tile(plane, x as usize, y as usize);
                    let mut heights = [0; 4];
                    let mut lighting = [0; 4];
                    for corner in Corner::ALL {
                        let (dx, dy) = corner.offset();
                        let source = self.tiles.get(plane, x + dx, y + dy).unwrap_or(&own);
                        heights[corner as usize] = source.height;
                        lighting[corner as usize] = source.lighting;
                    }
                    let tile = self.tiles.tile_mut(plane, x as usize, y as usize);
                    tile.corner_heights = heights;
                    tile.corner_lighting = lighting;
                }
            }
        }
    }

    /// Ground height at a position in model units relative to the region's
    /// south west corner, interpolated between the tile corners.
    pub fn height_at(&self, plane: usize, x: f32, z: f32) -> f32 {
        let units = TILE_UNITS as f32;
        let max = (SIZE - 1) as f32;
        let tile_x = (x / units).floor().clamp(0.0, max);
        let tile_y = (z / units).floor().clamp(0.0, max);
        let fx = ((x - tile_x * units) / units).clamp(0.0, 1.0);
        let fy = ((z - tile_y * units) / units).clamp(0.0, 1.0);

        let tile = self.tiles.tile(plane.min(PLANES - 1), tile_x as usize, tile_y as usize);
        let corner = |c: Corner| tile.corner_height(c) as f32;
        let south = corner(Corner::SouthWest) * (1.0 - fx) + corner(Corner::SouthEast) * fx;
        let north = corner(Corner::NorthWest) * (1.0 - fx) + corner(Corner::NorthEast) * fx;
        south * (1.0 - fy) + north * fy
    }
}


#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::floordata::{Floor, FloorKind};
    use crate::cache::writer::ByteWriter;

    /// Terrain bytes with every tile written by `tile(plane, x, y, writer)`.
    pub fn terrain_bytes(tile: impl Fn(usize, usize, usize, &mut ByteWriter)) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        for plane in 0..PLANES {
            for x in 0..REGION_SIZE {
                for y in 0..REGION_SIZE {
                    tile(plane, x, y, &mut writer);
                }
            }
        }
        writer.into_inner()
    }

    pub fn floors(colours: &[u32]) -> FloorDefinitions {
        let mut floors = FloorDefinitions::default();
        for (id, rgb) in colours.iter().enumerate() {
            let data = [1, (rgb >> 16) as u8, (rgb >> 8) as u8, *rgb as u8, 0];
            floors.insert(FloorKind::Underlay, Floor::decode(id as u32, &data, FloorKind::Underlay).unwrap());
            floors.insert(FloorKind::Overlay, Floor::decode(id as u32, &data, FloorKind::Overlay).unwrap());
        }
        floors
    }

    /// flat ground, plane 0 covered by underlay 1
    pub fn flat_region() -> Vec<u8> {
        terrain_bytes(|plane, _, _, w| {
            if plane == 0 {
                w.put_u8(82);
            }
            w.put_u8(1).put_u8(10);
        })
    }

    #[test]
    fn opcodes_fill_tile_fields() {
        let data = terrain_bytes(|plane, x, y, w| match (plane, x, y) {
            (0, 0, 0) => {
                w.put_u8(2 + 4 * 3 + 2).put_u8(7).put_u8(55).put_u8(81 + 4).put_u8(1).put_u8(20);
            }
            (0, 0, 1) => {
                w.put_u8(1).put_u8(1);
            }
            (1, 0, 0) => {
                w.put_u8(0);
            }
            (1, 0, 1) => {
                w.put_u8(1).put_u8(3);
            }
            _ => {
                w.put_u8(0);
            }
        });
        let landscape = Landscape::decode(50, 50, &data).unwrap();
        let tiles = &landscape.tiles;

        let tile = tiles.tile(0, 0, 0);
        assert_eq!(tile.overlay, Some(TileOverlay { id: 7, shape: 3, orientation: 2 }));
        assert_eq!(tile.flags, 6);
        assert_eq!(tile.underlay, 4);
        assert_eq!(tile.height, 160);

        // explicit height 1 means 0
        assert_eq!(tiles.tile(0, 0, 1).height, 0);
        assert_eq!(tiles.tile(1, 0, 0).height, 160 + PLANE_HEIGHT);
        assert_eq!(tiles.tile(1, 0, 1).height, 24);

        let noise = tiles.tile(0, 5, 5).height;
        assert_eq!(noise % 8, 0);
        assert!((80..=480).contains(&noise));
        assert_eq!(noise, calculate_height((50 << 6) + 5 + 932731, (50 << 6) + 5 + 556238) * 8);
    }

    #[test]
    fn truncated_terrain_fails() {
        let mut data = flat_region();
        data.truncate(100);
        assert!(Landscape::decode(0, 0, &data).is_err());
    }

    fn brute_force(landscape: &Landscape, plane: usize, floors: &FloorDefinitions, x: i32, y: i32) -> HslSum {
        let mut sum = HslSum::default();
        for tx in x - BLEND_RADIUS + 1..=x + BLEND_RADIUS {
            for ty in y - BLEND_RADIUS + 1..=y + BLEND_RADIUS {
                if let Some(floor) = landscape.tiles.get(plane, tx, ty).and_then(|t| floors.underlay(t.underlay)) {
                    sum += &floor.hsl;
                }
            }
        }
        sum
    }

    #[test]
    fn sliding_window_matches_brute_force() {
        let floors = floors(&[0x40a020, 0x102080, 0xe0e0e0, 0x806040]);
        let data = terrain_bytes(|_, x, y, w| {
            // 0 leaves a hole, 5 references a missing floor
            let id = ((x * 7 + y * 13) ^ (x * y)) % 6;
            if id > 0 {
                w.put_u8(81 + id as u8);
            }
            w.put_u8(0);
        });
        let landscape = Landscape::decode(12, 34, &data).unwrap();

        for plane in [0, 2] {
            let sums = landscape.blend_sums(plane, &floors);
            for x in 0..SIZE {
                for y in 0..SIZE {
                    assert_eq!(sums[(x * SIZE + y) as usize], brute_force(&landscape, plane, &floors, x, y), "tile {x} {y}");
                }
            }
        }
    }

    #[test]
    fn uniform_underlay_blends_uniformly() {
        let floors = floors(&[0x3c7a2d]);
        let data = terrain_bytes(|plane, _, _, w| {
            if plane == 0 {
                w.put_u8(82);
            }
            w.put_u8(0);
        });
        let landscape = Landscape::load(50, 50, &data, &floors, &Palette::default()).unwrap();

        let expected = landscape.tiles.tile(0, 32, 32).colour.unwrap();
        for x in 1..REGION_SIZE - 1 {
            for y in 1..REGION_SIZE - 1 {
                assert_eq!(landscape.tiles.tile(0, x, y).colour.map(|c| c.hsl), Some(expected.hsl));
            }
        }
        assert_eq!(expected.rgb, 0x3c7a2d);
        assert_ne!(expected.rgb_lit, 0);
        assert!(landscape.tiles.tile(1, 10, 10).colour.is_none());
    }

    #[test]
    fn flat_ground_is_lit_evenly() {
        let landscape = Landscape::load(1, 1, &flat_region(), &floors(&[0x808080]), &Palette::default()).unwrap();
        let tiles = &landscape.tiles;

        assert_eq!(tiles.tile(0, 0, 10).lighting, AMBIENT);
        assert_eq!(tiles.tile(0, 63, 63).lighting, AMBIENT);
        // away from the first interior row and column the darkness feedback is constant
        let reference = tiles.tile(0, 10, 10).lighting;
        assert!(reference < AMBIENT);
        for x in 2..62 {
            for y in 2..62 {
                assert_eq!(tiles.tile(0, x, y).lighting, reference);
            }
        }
    }

    #[test]
    fn darkness_feeds_from_west_and_south() {
        let landscape = Landscape::load(1, 1, &flat_region(), &floors(&[0x808080]), &Palette::default()).unwrap();
        let tiles = &landscape.tiles;

        // flat ground: 96 - 2560 / 213 = 84, darkness 12 feeds 12 >> 2 per neighbour
        assert_eq!(tiles.tile(0, 1, 1).lighting, 84);
        assert_eq!(tiles.tile(0, 1, 5).lighting, 81);
        assert_eq!(tiles.tile(0, 5, 1).lighting, 81);
        assert_eq!(tiles.tile(0, 10, 10).lighting, 78);
        assert_eq!(tiles.tile(0, 62, 62).lighting, 78);
    }

    #[test]
    fn slopes_change_lighting() {
        let data = terrain_bytes(|_, x, _, w| {
            w.put_u8(1).put_u8((x * 2 + 2) as u8);
        });
        let rising = Landscape::load(0, 0, &data, &floors(&[]), &Palette::default()).unwrap();
        let flat = Landscape::load(0, 0, &flat_region(), &floors(&[]), &Palette::default()).unwrap();
        assert_ne!(rising.tiles.tile(0, 20, 20).lighting, flat.tiles.tile(0, 20, 20).lighting);
    }

    #[test]
    fn corners_come_from_neighbours() {
        let data = terrain_bytes(|plane, x, y, w| {
            let h = if plane == 0 { (x + y) as u8 + 2 } else { 0 };
            w.put_u8(1).put_u8(h);
        });
        let landscape = Landscape::load(0, 0, &data, &floors(&[]), &Palette::default()).unwrap();

        let tile = landscape.tiles.tile(0, 3, 4);
        assert_eq!(tile.corner_heights, [9 * 8, 10 * 8, 11 * 8, 10 * 8]);

        let edge = landscape.tiles.tile(0, 63, 63);
        assert_eq!(edge.corner_heights, [128 * 8; 4]);
        assert_eq!(edge.corner_lighting, [AMBIENT; 4]);

        assert_eq!(landscape.height_at(0, 3.0 * 128.0, 4.0 * 128.0), 72.0);
        assert_eq!(landscape.height_at(0, 3.5 * 128.0, 4.5 * 128.0), 80.0);
    }
}
