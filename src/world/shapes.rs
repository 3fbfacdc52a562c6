//! Tile shape tables and the terrain meshes built from them.
//!
//! Shape vertices are numbered 1..=16: the corners and edge midpoints run
//! anticlockwise from the south west corner (1..=8), 9..=12 sit halfway
//! between the centre and each edge and 13..=16 are the inner quarter points.

use glam::{Vec2, Vec3};
use log::debug;
use serde::Serialize;

use crate::cache::floordata::FloorDefinitions;
use crate::world::colour::{light, Palette};
use crate::world::landscape::Landscape;
use crate::world::tiles::{Corner, Tile, REGION_SIZE, TILE_UNITS};

/// `(x, y)` in quarter tiles and the corners whose heights and light are averaged
const POINTS: [(u8, u8, [Corner; 2]); 16] = {
    use Corner::*;
    [
        (0, 0, [SouthWest, SouthWest]),
        (2, 0, [SouthWest, SouthEast]),
        (4, 0, [SouthEast, SouthEast]),
        (4, 2, [SouthEast, NorthEast]),
        (4, 4, [NorthEast, NorthEast]),
        (2, 4, [NorthEast, NorthWest]),
        (0, 4, [NorthWest, NorthWest]),
        (0, 2, [NorthWest, SouthWest]),
        (2, 1, [SouthWest, SouthEast]),
        (3, 2, [SouthEast, NorthEast]),
        (2, 3, [NorthEast, NorthWest]),
        (1, 2, [NorthWest, SouthWest]),
        (1, 1, [SouthWest, SouthWest]),
        (3, 1, [SouthEast, SouthEast]),
        (3, 3, [NorthEast, NorthEast]),
        (1, 3, [NorthWest, NorthWest]),
    ]
};

const SHAPE_POINTS: [&[u8]; 13] = [
    &[1, 3, 5, 7],
    &[1, 3, 5, 7],
    &[1, 3, 5, 7],
    &[1, 3, 5, 7, 6],
    &[1, 3, 5, 7, 6],
    &[1, 3, 5, 7, 6],
    &[1, 3, 5, 7, 6],
    &[1, 3, 5, 7, 2, 6],
    &[1, 3, 5, 7, 2, 8],
    &[1, 3, 5, 7, 2, 8],
    &[1, 3, 5, 7, 11, 12],
    &[1, 3, 5, 7, 11, 12],
    &[1, 3, 5, 7, 13, 14],
];

/// `(layer, a, b, c)`, layer 1 belongs to the overlay
const SHAPE_FACES: [&[(u8, u8, u8, u8)]; 13] = [
    &[(0, 1, 2, 3), (0, 0, 1, 3)],
    &[(1, 1, 2, 3), (1, 0, 1, 3)],
    &[(0, 1, 2, 3), (1, 0, 1, 3)],
    &[(0, 0, 1, 2), (0, 0, 2, 4), (1, 0, 4, 3)],
    &[(0, 0, 1, 4), (0, 0, 4, 3), (1, 1, 2, 4)],
    &[(0, 0, 4, 3), (1, 0, 1, 2), (1, 0, 2, 4)],
    &[(0, 1, 2, 4), (1, 0, 1, 4), (1, 0, 4, 3)],
    &[(0, 4, 1, 2), (0, 4, 2, 5), (1, 0, 4, 5), (1, 0, 5, 3)],
    &[(0, 4, 1, 2), (0, 4, 2, 3), (0, 4, 3, 5), (1, 0, 4, 5)],
    &[(0, 0, 4, 5), (1, 4, 1, 2), (1, 4, 2, 3), (1, 4, 3, 5)],
    &[(0, 0, 1, 5), (0, 1, 4, 5), (0, 1, 2, 4), (1, 0, 5, 3), (1, 5, 4, 3), (1, 4, 2, 3)],
    &[(1, 0, 1, 5), (1, 1, 4, 5), (1, 1, 2, 4), (0, 0, 5, 3), (0, 5, 4, 3), (0, 4, 2, 3)],
    &[(1, 0, 5, 4), (1, 0, 1, 5), (0, 0, 4, 3), (0, 4, 5, 3), (0, 5, 2, 3), (0, 1, 2, 5)],
];

pub const SHAPE_COUNT: usize = SHAPE_POINTS.len();
pub const OVERLAY_LAYER: u8 = 1;


/// Vertex numbers of a shape after rotating it by `orientation` quarter turns.
pub fn shape_points(shape: usize, orientation: u8) -> Vec<u8> {
    let o = orientation & 3;
    SHAPE_POINTS[shape % SHAPE_COUNT]
        .iter()
        .map(|&v| match v {
            1..=8 if v & 1 == 0 => (v.wrapping_sub(2 * o + 1) & 7) + 1,
            9..=12 => (v.wrapping_sub(9 + o) & 3) + 9,
            13..=16 => (v.wrapping_sub(13 + o) & 3) + 13,
            _ => v,
        })
        .collect()
}

/// Triangles of a shape as `(layer, indices into shape_points)`.
pub fn shape_faces(shape: usize, orientation: u8) -> Vec<(u8, [usize; 3])> {
    let o = orientation & 3;
    let rotate = |i: u8| if i < 4 { (i.wrapping_sub(o) & 3) as usize } else { i as usize };
    SHAPE_FACES[shape % SHAPE_COUNT]
        .iter()
        .map(|&(layer, a, b, c)| (layer, [rotate(a), rotate(b), rotate(c)]))
        .collect()
}


#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct TerrainVertex {
    /// x east, y up, z north, in model units from the region's south west corner
    pub position: Vec3,
    /// tile local texture coordinate
    pub uv: Vec2,
    pub hsl: Option<u16>,
    pub rgb: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct TerrainFace {
    pub indices: [usize; 3],
    pub texture: Option<u8>,
    pub tile: (u8, u8),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TerrainMesh {
    pub vertices: Vec<TerrainVertex>,
    pub faces: Vec<TerrainFace>,
}

impl TerrainMesh {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    fn vertex(&mut self, tile: &Tile, x: usize, y: usize, point: u8, hsl: Option<u16>, palette: &Palette) -> usize {
        let (qx, qy, [c1, c2]) = POINTS[(point - 1) as usize];
        let height = (tile.corner_height(c1) + tile.corner_height(c2)) as f32 / 2.0;
        let lit = match (light(hsl, tile.corner_lighting(c1)), light(hsl, tile.corner_lighting(c2))) {
            (Some(a), Some(b)) => Some(((a as u32 + b as u32) >> 1) as u16),
            _ => None,
        };

        let quarter = (TILE_UNITS / 4) as f32;
        self.vertices.push(TerrainVertex {
            position: Vec3::new(
                (x as i32 * TILE_UNITS) as f32 + qx as f32 * quarter,
                height,
                (y as i32 * TILE_UNITS) as f32 + qy as f32 * quarter,
            ),
            uv: Vec2::new(qx as f32 / 4.0, qy as f32 / 4.0),
            hsl: lit,
            rgb: lit.map_or(0, |c| palette.rgb(c)),
        });
        self.vertices.len() - 1
    }

    fn add_shape(&mut self, tile: &Tile, x: usize, y: usize, shape: usize, orientation: u8, layer: u8, hsl: Option<u16>, texture: Option<u8>, palette: &Palette) {
        let points = shape_points(shape, orientation);
        let base: Vec<usize> = points.iter().map(|&p| self.vertex(tile, x, y, p, hsl, palette)).collect();
        for (face_layer, [a, b, c]) in shape_faces(shape, orientation) {
            if face_layer == layer {
                self.faces.push(TerrainFace {
                    indices: [base[a], base[b], base[c]],
                    texture,
                    tile: (x as u8, y as u8),
                });
            }
        }
    }
}


/// Two triangles per underlay tile, split along the south east to north west diagonal.
pub fn underlay_mesh(landscape: &Landscape, plane: usize, palette: &Palette) -> TerrainMesh {
    let mut mesh = TerrainMesh::default();
    for x in 0..REGION_SIZE {
        for y in 0..REGION_SIZE {
            let tile = landscape.tiles.tile(plane, x, y);
            if tile.underlay == 0 {
                continue;
            }
            let Some(colour) = tile.colour else {
                continue;
            };
            mesh.add_shape(tile, x, y, 0, 0, 0, Some(colour.hsl), None, palette);
        }
    }
    mesh
}

/// Overlay half of each shaped tile.
pub fn overlay_mesh(landscape: &Landscape, plane: usize, floors: &FloorDefinitions, palette: &Palette) -> TerrainMesh {
    let mut mesh = TerrainMesh::default();
    for x in 0..REGION_SIZE {
        for y in 0..REGION_SIZE {
            let tile = landscape.tiles.tile(plane, x, y);
            let Some(overlay) = tile.overlay else {
                continue;
            };
            let Some(floor) = floors.overlay(overlay.id) else {
                debug!("tile {plane} {x} {y}: missing overlay {}", overlay.id);
                continue;
            };
            mesh.add_shape(
                tile,
                x,
                y,
                overlay.shape as usize + 1,
                overlay.orientation,
                OVERLAY_LAYER,
                Some(floor.hsl.packed),
                floor.texture,
                palette,
            );
        }
    }
    mesh
}
