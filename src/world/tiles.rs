use serde::Serialize;

pub const REGION_SIZE: usize = 64;
pub const PLANES: usize = 4;
/// model units per tile edge
pub const TILE_UNITS: i32 = 128;
/// height added for each plane without an explicit height
pub const PLANE_HEIGHT: i32 = 240;

/// corners of a tile in the order used by corner caches
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Corner {
    SouthWest = 0,
    SouthEast = 1,
    NorthEast = 2,
    NorthWest = 3,
}

impl Corner {
    pub const ALL: [Corner; 4] = [Corner::SouthWest, Corner::SouthEast, Corner::NorthEast, Corner::NorthWest];

    /// tile offset of the neighbour owning this corner
    #[inline]
    pub fn offset(&self) -> (i32, i32) {
        match self {
            Corner::SouthWest => (0, 0),
            Corner::SouthEast => (1, 0),
            Corner::NorthEast => (1, 1),
            Corner::NorthWest => (0, 1),
        }
    }
}


#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct TileOverlay {
    /// one based overlay floor id
    pub id: u8,
    /// shape code 0..=11, drawn with shape table entry `shape + 1`
    pub shape: u8,
    pub orientation: u8,
}

/// Blended underlay colour of a tile.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct TileColour {
    /// packed HSL averaged over the neighbourhood
    pub hsl: u16,
    /// colour of the tile's own underlay definition
    pub rgb: u32,
    pub rgb_lit: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Tile {
    pub height: i32,
    pub overlay: Option<TileOverlay>,
    /// one based underlay floor id, 0 for none
    pub underlay: u8,
    pub flags: u8,
    pub colour: Option<TileColour>,
    pub lighting: i32,
    pub corner_heights: [i32; 4],
    pub corner_lighting: [i32; 4],
}

impl Default for Tile {
    fn default() -> Self {
        Self {
            height: 0,
            overlay: None,
            underlay: 0,
            flags: 0,
            colour: None,
            lighting: 0,
            corner_heights: [0; 4],
            corner_lighting: [0; 4],
        }
    }
}

impl Tile {
    #[inline]
    pub fn corner_height(&self, corner: Corner) -> i32 {
        self.corner_heights[corner as usize]
    }

    #[inline]
    pub fn corner_lighting(&self, corner: Corner) -> i32 {
        self.corner_lighting[corner as usize]
    }

    /// mean height of the four corners
    pub fn average_height(&self) -> i32 {
        self.corner_heights.iter().sum::<i32>() >> 2
    }
}


/// The 4 x 64 x 64 tiles of one region, indexed plane first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    tiles: Vec<Tile>,
}

impl TileGrid {
    pub fn new() -> Self {
        Self {
            tiles: vec![Tile::default(); PLANES * REGION_SIZE * REGION_SIZE],
        }
    }

    #[inline]
    fn index(plane: usize, x: usize, y: usize) -> usize {
        debug_assert!(plane < PLANES && x < REGION_SIZE && y < REGION_SIZE);
        (plane * REGION_SIZE + x) * REGION_SIZE + y
    }

    #[inline]
    pub fn tile(&self, plane: usize, x: usize, y: usize) -> &Tile {
        &self.tiles[Self::index(plane, x, y)]
    }

    #[inline]
    pub fn tile_mut(&mut self, plane: usize, x: usize, y: usize) -> &mut Tile {
        &mut self.tiles[Self::index(plane, x, y)]
    }

    /// tile at signed coordinates, `None` outside the region
    #[inline]
    pub fn get(&self, plane: usize, x: i32, y: i32) -> Option<&Tile> {
        if plane >= PLANES || x < 0 || y < 0 || x >= REGION_SIZE as i32 || y >= REGION_SIZE as i32 {
            return None;
        }
        Some(self.tile(plane, x as usize, y as usize))
    }

    /// all tiles of a plane in x, then y order
    pub fn plane(&self, plane: usize) -> &[Tile] {
        let start = Self::index(plane, 0, 0);
        &self.tiles[start..start + REGION_SIZE * REGION_SIZE]
    }
}

impl Default for TileGrid {
    fn default() -> Self {
        Self::new()
    }
}
