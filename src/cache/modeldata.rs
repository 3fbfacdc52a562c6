use glam::{Vec2, Vec3};
use log::trace;

use crate::cache::error::{DecodeError, DecodeResult};
use crate::cache::reader::ByteCursor;
use crate::world::model::{Face, MappingTriangle, Model, RenderType, Vertex};

const HEADER_SIZE: usize = 18;
const MARKER_SIZE: usize = 2;
const DEFAULT_UVS: [Vec2; 3] = [Vec2::new(0.0, 1.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 0.0)];


/// How the per-face texture stream is laid out.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TexturePointer {
    /// one byte per face, bit 0 render type, bit 1 textured, upper bits mapping index
    Flags,
    /// two bytes per face holding texture id + 1, mapping indices in a separate
    /// trailing stream of one byte per textured face (255 = none)
    TextureId,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UvProjection {
    /// projection dot products are truncated to integers
    Truncated,
    Exact,
}

/// The points where model format variants differ.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DecodeStrategy {
    pub texture_pointer: TexturePointer,
    pub uv_projection: UvProjection,
}

impl DecodeStrategy {
    pub const LEGACY: DecodeStrategy = DecodeStrategy {
        texture_pointer: TexturePointer::Flags,
        uv_projection: UvProjection::Truncated,
    };

    pub const HD: DecodeStrategy = DecodeStrategy {
        texture_pointer: TexturePointer::TextureId,
        uv_projection: UvProjection::Exact,
    };

    fn pointer_width(&self) -> usize {
        match self.texture_pointer {
            TexturePointer::Flags => 1,
            TexturePointer::TextureId => 2,
        }
    }
}


/// Fixed header stored in the 18 bytes in front of the revision marker.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ModelHeader {
    pub vertex_count: usize,
    pub face_count: usize,
    pub textured_face_count: usize,
    pub use_textures: bool,
    /// `None` when every face stores its own priority
    pub shared_priority: Option<u8>,
    pub use_transparency: bool,
    pub use_face_skinning: bool,
    pub use_vertex_skinning: bool,
    pub x_len: usize,
    pub y_len: usize,
    pub z_len: usize,
    pub face_data_len: usize,
}

impl ModelHeader {
    fn read(cursor: &mut ByteCursor) -> DecodeResult<Self> {
        Ok(Self {
            vertex_count: cursor.read_u16()? as usize,
            face_count: cursor.read_u16()? as usize,
            textured_face_count: cursor.read_u8()? as usize,
            use_textures: cursor.read_bool()?,
            shared_priority: match cursor.read_u8()? {
                255 => None,
                p => Some(p),
            },
            use_transparency: cursor.read_bool()?,
            use_face_skinning: cursor.read_bool()?,
            use_vertex_skinning: cursor.read_bool()?,
            x_len: cursor.read_u16()? as usize,
            y_len: cursor.read_u16()? as usize,
            z_len: cursor.read_u16()? as usize,
            face_data_len: cursor.read_u16()? as usize,
        })
    }
}


/// Start of every sub-stream, `None` for streams the header switches off.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StreamOffsets {
    pub vertex_flags: usize,
    pub face_types: usize,
    pub face_priorities: Option<usize>,
    pub face_skins: Option<usize>,
    pub texture_pointers: Option<usize>,
    pub vertex_bones: Option<usize>,
    pub face_alphas: Option<usize>,
    pub face_data: usize,
    pub colours: usize,
    pub mapping: usize,
    pub x: usize,
    pub y: usize,
    pub z: usize,
    /// one past the z stream
    pub end: usize,
}

impl StreamOffsets {
    pub fn compute(header: &ModelHeader, strategy: &DecodeStrategy) -> Self {
        let mut offset = 0;
        let mut stream = |present: bool, len: usize| {
            let start = offset;
            if present {
                offset += len;
                Some(start)
            } else {
                None
            }
        };

        let vertex_flags = stream(true, header.vertex_count).unwrap_or_default();
        let face_types = stream(true, header.face_count).unwrap_or_default();
        let face_priorities = stream(header.shared_priority.is_none(), header.face_count);
        let face_skins = stream(header.use_face_skinning, header.face_count);
        let texture_pointers = stream(header.use_textures, header.face_count * strategy.pointer_width());
        let vertex_bones = stream(header.use_vertex_skinning, header.vertex_count);
        let face_alphas = stream(header.use_transparency, header.face_count);
        let face_data = stream(true, header.face_data_len).unwrap_or_default();
        let colours = stream(true, header.face_count * 2).unwrap_or_default();
        let mapping = stream(true, header.textured_face_count * 6).unwrap_or_default();
        let x = stream(true, header.x_len).unwrap_or_default();
        let y = stream(true, header.y_len).unwrap_or_default();
        let z = stream(true, header.z_len).unwrap_or_default();
        let end = stream(true, 0).unwrap_or_default();

        Self {
            vertex_flags,
            face_types,
            face_priorities,
            face_skins,
            texture_pointers,
            vertex_bones,
            face_alphas,
            face_data,
            colours,
            mapping,
            x,
            y,
            z,
            end,
        }
    }
}


/// A payload is decodable when it ends with the `0xFFFF` revision marker.
pub fn can_decode(data: &[u8]) -> bool {
    data.len() >= HEADER_SIZE + MARKER_SIZE && data[data.len() - 2..] == [0xFF, 0xFF]
}

fn optional_cursor(data: &[u8], offset: Option<usize>) -> Option<ByteCursor> {
    offset.map(|offset| ByteCursor::at(data, offset))
}

fn check_index(what: &'static str, index: i32, len: usize) -> DecodeResult<usize> {
    if index < 0 || index as usize >= len {
        return Err(DecodeError::InvalidIndex { what, index: index.max(0) as usize, len });
    }
    Ok(index as usize)
}


/// Decodes a model payload with the given format strategy.
pub fn decode_model(id: u32, data: &[u8], strategy: &DecodeStrategy) -> DecodeResult<Model> {
    trace!("decode_model {id}");
    if !can_decode(data) {
        return Err(DecodeError::Undecodable(format!("model {id} has no revision marker")));
    }

    // the header ends where the marker begins, so it starts at len - 20
    let body = &data[..data.len() - MARKER_SIZE];
    let mut cursor = ByteCursor::at(body, body.len() - HEADER_SIZE);
    let header = ModelHeader::read(&mut cursor)?;
    let offsets = StreamOffsets::compute(&header, strategy);

    let mut model = Model::new(id);
    decode_vertices(&mut model, body, &header, &offsets)?;
    decode_faces(&mut model, body, &header, &offsets)?;
    decode_face_attributes(&mut model, body, &header, &offsets, strategy)?;
    decode_mapping(&mut model, body, &header, &offsets)?;
    compute_uvs(&mut model, strategy);
    Ok(model)
}

fn decode_vertices(model: &mut Model, data: &[u8], header: &ModelHeader, offsets: &StreamOffsets) -> DecodeResult<()> {
    let mut flags = ByteCursor::at(data, offsets.vertex_flags);
    let mut xs = ByteCursor::at(data, offsets.x);
    let mut ys = ByteCursor::at(data, offsets.y);
    let mut zs = ByteCursor::at(data, offsets.z);
    let mut bones = optional_cursor(data, offsets.vertex_bones);

    let mut position = Vec3::ZERO;
    model.vertices.reserve(header.vertex_count);
    for _ in 0..header.vertex_count {
        let mask = flags.read_u8()?;
        if mask & 1 != 0 {
            position.x += xs.read_smart()? as f32;
        }
        if mask & 2 != 0 {
            position.y += ys.read_smart()? as f32;
        }
        if mask & 4 != 0 {
            position.z += zs.read_smart()? as f32;
        }
        let bone = match bones.as_mut() {
            Some(bones) => Some(bones.read_u8()?),
            None => None,
        };
        model.vertices.push(Vertex::new(position, bone));
    }
    Ok(())
}

fn decode_faces(model: &mut Model, data: &[u8], header: &ModelHeader, offsets: &StreamOffsets) -> DecodeResult<()> {
    let mut types = ByteCursor::at(data, offsets.face_types);
    let mut deltas = ByteCursor::at(data, offsets.face_data);

    let (mut a, mut b, mut c) = (0i32, 0i32, 0i32);
    let mut last = 0i32;
    let vertex_count = model.vertices.len();

    model.faces.reserve(header.face_count);
    for _ in 0..header.face_count {
        let kind = types.read_u8()?;
        match kind {
            1 => {
                a = deltas.read_smart()? + last;
                b = deltas.read_smart()? + a;
                c = deltas.read_smart()? + b;
                last = c;
            }
            2 => {
                b = c;
                c = deltas.read_smart()? + last;
                last = c;
            }
            3 => {
                a = c;
                c = deltas.read_smart()? + last;
                last = c;
            }
            4 => {
                std::mem::swap(&mut a, &mut b);
                c = deltas.read_smart()? + last;
                last = c;
            }
            _ => {}
        }

        model.faces.push(Face::new(
            check_index("face vertex", a, vertex_count)?,
            check_index("face vertex", b, vertex_count)?,
            check_index("face vertex", c, vertex_count)?,
            kind,
        ));
    }
    Ok(())
}

fn decode_face_attributes(model: &mut Model, data: &[u8], header: &ModelHeader, offsets: &StreamOffsets, strategy: &DecodeStrategy) -> DecodeResult<()> {
    let mut colours = ByteCursor::at(data, offsets.colours);
    let mut pointers = optional_cursor(data, offsets.texture_pointers);
    let mut priorities = optional_cursor(data, offsets.face_priorities);
    let mut alphas = optional_cursor(data, offsets.face_alphas);
    let mut skins = optional_cursor(data, offsets.face_skins);
    // separate mapping index stream of the TextureId layout
    let mut coords = ByteCursor::at(data, offsets.end);

    for face in &mut model.faces {
        face.colour = colours.read_u16()?;

        if let Some(pointers) = pointers.as_mut() {
            match strategy.texture_pointer {
                TexturePointer::Flags => {
                    let mask = pointers.read_u8()?;
                    face.render = if mask & 1 == 1 { RenderType::Flat } else { RenderType::Smooth };
                    if mask & 2 == 2 {
                        face.texture_coord = Some((mask >> 2) as usize);
                        face.texture = Some(face.colour);
                        face.colour = 127;
                    }
                }
                TexturePointer::TextureId => {
                    let texture = pointers.read_u16()?;
                    if texture > 0 {
                        face.texture = Some(texture - 1);
                        face.colour = 127;
                        face.texture_coord = match coords.read_u8()? {
                            255 => None,
                            coord => Some(coord as usize),
                        };
                    }
                }
            }
        }

        face.priority = match (priorities.as_mut(), header.shared_priority) {
            (Some(priorities), _) => priorities.read_u8()?,
            (None, Some(shared)) => shared,
            (None, None) => 0,
        };
        if let Some(alphas) = alphas.as_mut() {
            face.transparency = (255 - alphas.read_u8()? as i32) as f32 / 255.0;
        }
        if let Some(skins) = skins.as_mut() {
            face.skin = Some(skins.read_u8()?);
        }
    }
    Ok(())
}

fn decode_mapping(model: &mut Model, data: &[u8], header: &ModelHeader, offsets: &StreamOffsets) -> DecodeResult<()> {
    let mut maps = ByteCursor::at(data, offsets.mapping);
    let vertex_count = model.vertices.len();

    for _ in 0..header.textured_face_count {
        model.mapping.push(MappingTriangle {
            p: check_index("mapping vertex", maps.read_u16()? as i32, vertex_count)?,
            m: check_index("mapping vertex", maps.read_u16()? as i32, vertex_count)?,
            n: check_index("mapping vertex", maps.read_u16()? as i32, vertex_count)?,
        });
    }

    for face in &model.faces {
        if let Some(coord) = face.texture_coord {
            check_index("mapping triangle", coord as i32, model.mapping.len())?;
        }
    }
    Ok(())
}


/// Projects the face corners onto the plane spanned by a mapping triangle.
fn project_uvs(triangle: [Vec3; 3], corners: [Vec3; 3], projection: UvProjection) -> Option<[Vec2; 3]> {
    let [origin, b, c] = triangle;
    let ab = b - origin;
    let ac = c - origin;
    let normal = ab.cross(ac);

    let u_axis = ac.cross(normal);
    let v_axis = ab.cross(normal);
    let u_denominator = u_axis.dot(ab);
    let v_denominator = v_axis.dot(ac);
    if u_denominator == 0.0 || v_denominator == 0.0 {
        return None;
    }

    let component = |axis: Vec3, p: Vec3, denominator: f32| {
        let dot = axis.dot(p - origin);
        match projection {
            UvProjection::Truncated => dot.trunc() * (1.0 / denominator),
            UvProjection::Exact => dot / denominator,
        }
    };

    Some(corners.map(|p| Vec2::new(component(u_axis, p, u_denominator), component(v_axis, p, v_denominator))))
}

fn compute_uvs(model: &mut Model, strategy: &DecodeStrategy) {
    for face in model.faces.iter_mut().filter(|f| f.texture.is_some()) {
        let projected = face.texture_coord.and_then(|coord| {
            let t = model.mapping[coord];
            project_uvs(
                [model.vertices[t.p].position, model.vertices[t.m].position, model.vertices[t.n].position],
                face.indices().map(|i| model.vertices[i].position),
                strategy.uv_projection,
            )
        });
        face.uvs = Some(projected.unwrap_or(DEFAULT_UVS));
    }
}
