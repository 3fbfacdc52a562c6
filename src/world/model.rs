//! Decoded mesh and the per-placement operations applied to its copies.
//!
//! Positions are kept in the cache's own units (128 per tile) with the y axis
//! pointing down, as stored. The decoded model is a template: placements work
//! on clones.

use glam::{Vec2, Vec3};
use serde::Serialize;

use crate::world::colour::{light, Palette};


/// How a face is shaded, `Merged` faces sit on a seam shared with a neighbour and are not drawn.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum RenderType {
    Smooth,
    Flat,
    Merged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vertex {
    pub position: Vec3,
    pub bone: Option<u8>,
    pub uv: Vec2,
    /// accumulated face normals, divided by `shared_faces` when lit
    pub normal: Vec3,
    pub shared_faces: u32,
    pub colour: Option<u32>,
}

impl Vertex {
    pub fn new(position: Vec3, bone: Option<u8>) -> Self {
        Self {
            position,
            bone,
            uv: Vec2::ZERO,
            normal: Vec3::ZERO,
            shared_faces: 0,
            colour: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Face {
    pub a: usize,
    pub b: usize,
    pub c: usize,
    /// connectivity opcode the face was decoded with
    pub kind: u8,
    pub render: RenderType,
    /// packed HSL
    pub colour: u16,
    pub texture: Option<u16>,
    pub texture_coord: Option<usize>,
    pub uvs: Option<[Vec2; 3]>,
    pub transparency: f32,
    pub priority: u8,
    pub skin: Option<u8>,
    pub normal: Vec3,
    /// lit packed HSL per corner
    pub lit: Option<[u16; 3]>,
}

impl Face {
    pub fn new(a: usize, b: usize, c: usize, kind: u8) -> Self {
        Self {
            a,
            b,
            c,
            kind,
            render: RenderType::Smooth,
            colour: 0,
            texture: None,
            texture_coord: None,
            uvs: None,
            transparency: 1.0,
            priority: 0,
            skin: None,
            normal: Vec3::ZERO,
            lit: None,
        }
    }

    #[inline]
    pub fn indices(&self) -> [usize; 3] {
        [self.a, self.b, self.c]
    }
}

/// Texture mapping triangle, indices into the vertex list.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct MappingTriangle {
    pub p: usize,
    pub m: usize,
    pub n: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
    /// largest distance from the y axis
    pub radius_xz: f32,
    pub radius: f32,
}

impl Bounds {
    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}


/// Parameters of the model shading pass.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Lighting {
    pub ambient: i32,
    pub contrast: i32,
    pub direction: Vec3,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: 64,
            contrast: 768,
            direction: Vec3::new(-50.0, -10.0, -50.0),
        }
    }
}


#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Model {
    pub id: u32,
    pub vertices: Vec<Vertex>,
    pub faces: Vec<Face>,
    pub mapping: Vec<MappingTriangle>,
}

impl Model {
    pub fn new(id: u32) -> Self {
        Self { id, vertices: Vec::new(), faces: Vec::new(), mapping: Vec::new() }
    }

    pub fn textured_faces(&self) -> usize {
        self.faces.iter().filter(|f| f.texture.is_some()).count()
    }

    pub fn bounds(&self) -> Bounds {
        if self.vertices.is_empty() {
            return Bounds::default();
        }

        let mut bounds = Bounds {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
            radius_xz: 0.0,
            radius: 0.0,
        };
        for v in &self.vertices {
            bounds.min = bounds.min.min(v.position);
            bounds.max = bounds.max.max(v.position);
            bounds.radius_xz = bounds.radius_xz.max(v.position.x * v.position.x + v.position.z * v.position.z);
            bounds.radius = bounds.radius.max(v.position.length_squared());
        }
        bounds.radius_xz = bounds.radius_xz.sqrt();
        bounds.radius = bounds.radius.sqrt();
        bounds
    }

    /// mirrors along z and flips winding to keep faces facing out
    pub fn invert(&mut self) {
        for v in &mut self.vertices {
            v.position.z = -v.position.z;
        }
        for f in &mut self.faces {
            std::mem::swap(&mut f.a, &mut f.c);
        }
    }

    /// clockwise quarter turns around the y axis
    pub fn rotate_quarter(&mut self, turns: u8) {
        for _ in 0..(turns & 3) {
            for v in &mut self.vertices {
                let x = v.position.x;
                v.position.x = v.position.z;
                v.position.z = -x;
            }
        }
    }

    pub fn rotate_yaw(&mut self, angle: f32) {
        let (sin, cos) = angle.sin_cos();
        for v in &mut self.vertices {
            let Vec3 { x, y, z } = v.position;
            v.position = Vec3::new(x * cos + z * sin, y, z * cos - x * sin);
        }
    }

    pub fn translate(&mut self, offset: Vec3) {
        for v in &mut self.vertices {
            v.position += offset;
        }
    }

    pub fn recolour(&mut self, table: &[(u16, u16)]) {
        for (from, to) in table {
            for f in self.faces.iter_mut().filter(|f| f.texture.is_none() && f.colour == *from) {
                f.colour = *to;
            }
        }
    }

    pub fn retexture(&mut self, table: &[(u16, u16)]) {
        for (from, to) in table {
            for f in self.faces.iter_mut().filter(|f| f.texture == Some(*from)) {
                f.texture = Some(*to);
            }
        }
    }

    /// Concatenates several models into one, indices are rebased.
    pub fn merge(id: u32, parts: &[&Model]) -> Model {
        let mut result = Model::new(id);
        for part in parts {
            let base = result.vertices.len();
            let mapping_base = result.mapping.len();
            result.vertices.extend(part.vertices.iter().cloned());
            result.mapping.extend(part.mapping.iter().map(|t| MappingTriangle { p: t.p + base, m: t.m + base, n: t.n + base }));
            result.faces.extend(part.faces.iter().map(|f| Face {
                a: f.a + base,
                b: f.b + base,
                c: f.c + base,
                texture_coord: f.texture_coord.map(|t| t + mapping_base),
                ..f.clone()
            }));
        }
        result
    }

    /// Face normals scaled to 256, smooth faces also accumulate into their vertices.
    pub fn compute_normals(&mut self) {
        for v in &mut self.vertices {
            v.normal = Vec3::ZERO;
            v.shared_faces = 0;
        }

        for f in &mut self.faces {
            let a = self.vertices[f.a].position;
            let ab = self.vertices[f.b].position - a;
            let ac = self.vertices[f.c].position - a;
            let cross = ab.cross(ac);
            let len = cross.length();
            f.normal = if len > 0.0 { cross * (256.0 / len) } else { Vec3::ZERO };

            if f.render == RenderType::Smooth {
                for i in f.indices() {
                    self.vertices[i].normal += f.normal;
                    self.vertices[i].shared_faces += 1;
                }
            }
        }
    }

    /// Lit colour per face corner from the accumulated normals, merged faces stay unlit.
    pub fn apply_lighting(&mut self, lighting: &Lighting) {
        let magnitude = lighting.direction.length() as i32;
        let scale = (lighting.contrast * magnitude >> 8).max(1);

        for f in &mut self.faces {
            let colour = Some(f.colour);
            f.lit = match f.render {
                RenderType::Merged => None,
                RenderType::Flat => {
                    let l = lighting.ambient + (lighting.direction.dot(f.normal) as i32) / (scale + scale / 2);
                    let lit = light(colour, l).unwrap_or(f.colour);
                    Some([lit; 3])
                }
                RenderType::Smooth => {
                    let mut lit = [f.colour; 3];
                    for (slot, i) in f.indices().into_iter().enumerate() {
                        let v = &self.vertices[i];
                        let l = if v.shared_faces == 0 {
                            lighting.ambient + (lighting.direction.dot(f.normal) as i32) / (scale + scale / 2)
                        } else {
                            lighting.ambient + (lighting.direction.dot(v.normal) as i32) / (scale * v.shared_faces as i32)
                        };
                        lit[slot] = light(colour, l).unwrap_or(f.colour);
                    }
                    Some(lit)
                }
            };
        }
    }

    /// Gives every face its own three vertices carrying final uv, normal and colour.
    pub fn split_vertices(&mut self, palette: &Palette) {
        let mut split = Vec::with_capacity(self.faces.len() * 3);

        for f in &mut self.faces {
            let base = split.len();
            for (slot, i) in f.indices().into_iter().enumerate() {
                let mut v = self.vertices[i].clone();
                if let Some(uvs) = f.uvs {
                    v.uv = uvs[slot];
                }
                let normal = match f.render {
                    RenderType::Smooth if v.shared_faces > 0 => v.normal,
                    _ => f.normal,
                };
                v.normal = normal.normalize_or_zero();
                v.shared_faces = 1;
                v.colour = f.lit.map(|lit| palette.rgb(lit[slot]));
                split.push(v);
            }
            f.a = base;
            f.b = base + 1;
            f.c = base + 2;
        }

        self.vertices = split;
        self.mapping.clear();
        for f in &mut self.faces {
            f.texture_coord = None;
        }
    }
}
