//! Object placements of a region and the placer that turns them into lit,
//! positioned models standing on the terrain.

use std::collections::HashMap;
use std::f32::consts::FRAC_PI_4;

use glam::Vec3;
use log::{debug, trace, warn};
use serde::Serialize;

use crate::cache::areadata::Area;
use crate::cache::error::DecodeResult;
use crate::cache::objectdata::{ObjectDefinition, ObjectDefinitions};
use crate::cache::reader::ByteCursor;
use crate::cache::varbitdata::VarpState;
use crate::world::colour::Palette;
use crate::world::landscape::Landscape;
use crate::world::merge::merge_normals;
use crate::world::model::{Lighting, Model};
use crate::world::tiles::TILE_UNITS;

const COSINE: [f32; 4] = [1.0, 0.0, -1.0, 0.0];
const SINE: [f32; 4] = [0.0, -1.0, 0.0, 1.0];
const DEFAULT_DECOR_DISPLACEMENT: u8 = 16;
const HALF_TILE: f32 = (TILE_UNITS / 2) as f32;


#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectGroup {
    Wall,
    WallDecoration,
    Interactive,
    Roof,
    Floor,
}

impl ObjectGroup {
    pub fn of(object_type: u8) -> Option<Self> {
        match object_type {
            0..=3 => Some(ObjectGroup::Wall),
            4..=8 => Some(ObjectGroup::WallDecoration),
            9..=11 => Some(ObjectGroup::Interactive),
            12..=21 => Some(ObjectGroup::Roof),
            22 => Some(ObjectGroup::Floor),
            _ => None,
        }
    }

    /// groups whose models take part in seam merging
    fn merges(&self) -> bool {
        matches!(self, ObjectGroup::Wall | ObjectGroup::Interactive)
    }
}


/// One placement record from a region's object stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInstance {
    pub id: u32,
    pub x: u8,
    pub y: u8,
    pub plane: u8,
    pub object_type: u8,
    pub rotation: u8,
}

impl ObjectInstance {
    pub fn group(&self) -> Option<ObjectGroup> {
        ObjectGroup::of(self.object_type)
    }
}

/// Decodes the placement stream: id deltas, each followed by position deltas
/// and a packed type/rotation byte. A zero delta closes either loop.
pub fn decode_placements(data: &[u8]) -> DecodeResult<Vec<ObjectInstance>> {
    trace!("decode_placements {} bytes", data.len());
    let mut cursor = ByteCursor::new(data);
    let mut instances = Vec::new();
    let mut id: i64 = -1;

    loop {
        let id_delta = cursor.read_usmart()?;
        if id_delta == 0 {
            break;
        }
        id += id_delta as i64;

        let mut position: u32 = 0;
        loop {
            let delta = cursor.read_usmart()?;
            if delta == 0 {
                break;
            }
            position += delta - 1;

            let attributes = cursor.read_u8()?;
            instances.push(ObjectInstance {
                id: id as u32,
                x: ((position >> 6) & 0x3f) as u8,
                y: (position & 0x3f) as u8,
                plane: ((position >> 12) & 3) as u8,
                object_type: attributes >> 2,
                rotation: attributes & 3,
            });
        }
    }

    Ok(instances)
}


/// Supplies decoded model templates by id.
pub trait ModelSource {
    fn model(&self, id: u32) -> Option<Model>;
}

impl ModelSource for HashMap<u32, Model> {
    fn model(&self, id: u32) -> Option<Model> {
        self.get(&id).cloned()
    }
}


#[derive(Debug, Clone, Serialize)]
pub struct PlacedObject {
    pub instance: ObjectInstance,
    /// definition after morphing
    pub definition: u32,
    pub group: ObjectGroup,
    /// rotation the model was built with, walls use `4 + r`
    pub rotation: u8,
    /// x east and z north in model units from the region corner, y is the ground height
    pub origin: Vec3,
    pub footprint: (u8, u8),
    pub model: Model,
    /// sprite shown on the map for objects that belong to an area
    pub map_marker: Option<u32>,
}

impl PlacedObject {
    /// offset of `other`'s origin in this object's model space, where y points down
    fn offset_to(&self, other: &PlacedObject) -> Vec3 {
        Vec3::new(
            other.origin.x - self.origin.x,
            self.origin.y - other.origin.y,
            other.origin.z - self.origin.z,
        )
    }

    /// footprints touch or overlap on the same plane
    fn neighbours(&self, other: &PlacedObject) -> bool {
        let span = |start: u8, size: u8| (start as i32, start as i32 + size.max(1) as i32 - 1);
        let (ax0, ax1) = span(self.instance.x, self.footprint.0);
        let (ay0, ay1) = span(self.instance.y, self.footprint.1);
        let (bx0, bx1) = span(other.instance.x, other.footprint.0);
        let (by0, by1) = span(other.instance.y, other.footprint.1);
        self.instance.plane == other.instance.plane
            && ax0 - 1 <= bx1 && bx0 <= ax1 + 1
            && ay0 - 1 <= by1 && by0 <= ay1 + 1
    }
}


/// Builds placed models for the objects of one region.
pub struct ObjectPlacer<'a> {
    pub definitions: &'a ObjectDefinitions,
    pub models: &'a dyn ModelSource,
    pub areas: &'a HashMap<u32, Area>,
    pub varps: Option<&'a VarpState>,
    pub palette: &'a Palette,
}

impl<'a> ObjectPlacer<'a> {
    pub fn place(&self, instances: &[ObjectInstance], landscape: &Landscape) -> Vec<PlacedObject> {
        trace!("ObjectPlacer::place {} instances", instances.len());
        let displacements = self.decor_displacements(instances);

        let mut placed = Vec::with_capacity(instances.len());
        for instance in instances {
            self.place_instance(instance, landscape, &displacements, &mut placed);
        }

        // seams first, light afterwards so merged faces stay unlit
        for i in 0..placed.len() {
            let (head, tail) = placed.split_at_mut(i + 1);
            let first = &mut head[i];
            if !first.group.merges() {
                continue;
            }
            for second in tail.iter_mut() {
                if second.group.merges() && first.neighbours(second) {
                    let offset = first.offset_to(second);
                    merge_normals(&mut first.model, &mut second.model, offset);
                }
            }
        }

        for object in &mut placed {
            let lighting = self.definitions.get(object.definition).map_or_else(Lighting::default, |def| Lighting {
                ambient: 64 + def.ambient as i32,
                contrast: 768 + 5 * def.contrast as i32,
                ..Lighting::default()
            });
            object.model.apply_lighting(&lighting);
            object.model.split_vertices(self.palette);
        }

        debug!("placed {} models for {} objects", placed.len(), instances.len());
        placed
    }

    /// Largest decoration displacement of the walls on each tile.
    fn decor_displacements(&self, instances: &[ObjectInstance]) -> HashMap<(u8, u8, u8), u8> {
        let mut displacements = HashMap::new();
        for instance in instances.iter().filter(|i| i.group() == Some(ObjectGroup::Wall)) {
            if let Some(def) = self.definitions.resolve(instance.id, self.varps) {
                let entry = displacements.entry((instance.plane, instance.x, instance.y)).or_insert(0);
                *entry = (*entry).max(def.decor_displacement);
            }
        }
        displacements
    }

    fn template(&self, def: &ObjectDefinition, object_type: u8) -> Option<Model> {
        let parts: Vec<Model> = def
            .model_ids(object_type)
            .into_iter()
            .filter_map(|id| {
                let model = self.models.model(id as u32);
                if model.is_none() {
                    debug!("object {}: missing model {id}", def.id);
                }
                model
            })
            .collect();

        match parts.len() {
            0 => None,
            1 => parts.into_iter().next(),
            _ => Some(Model::merge(parts[0].id, &parts.iter().collect::<Vec<_>>())),
        }
    }

    fn place_instance(
        &self,
        instance: &ObjectInstance,
        landscape: &Landscape,
        displacements: &HashMap<(u8, u8, u8), u8>,
        placed: &mut Vec<PlacedObject>,
    ) {
        let Some(group) = instance.group() else {
            debug!("object {}: unknown type {}", instance.id, instance.object_type);
            return;
        };
        let Some(def) = self.definitions.resolve(instance.id, self.varps) else {
            warn!("object {}: no definition", instance.id);
            return;
        };

        let map_marker = def.area.and_then(|area| self.areas.get(&(area as u32))).and_then(|area| area.sprite);
        let footprint = def.footprint(instance.rotation);
        let mut origin = self.origin(instance, footprint, landscape);
        if instance.object_type == 5 {
            let d = displacements.get(&(instance.plane, instance.x, instance.y)).copied().unwrap_or(DEFAULT_DECOR_DISPLACEMENT) as f32;
            let r = instance.rotation as usize;
            origin += Vec3::new(COSINE[r] * d, 0.0, SINE[r] * d);
        }

        let rotations: Vec<u8> = match instance.object_type {
            2 => vec![4 + instance.rotation, (instance.rotation + 1) & 3],
            0..=3 => vec![4 + instance.rotation],
            _ => vec![instance.rotation],
        };

        let Some(template) = self.template(def, instance.object_type) else {
            if map_marker.is_some() {
                placed.push(PlacedObject {
                    instance: *instance,
                    definition: def.id,
                    group,
                    rotation: instance.rotation,
                    origin,
                    footprint,
                    model: Model::new(0),
                    map_marker,
                });
            } else {
                debug!("object {} type {}: no models", def.id, instance.object_type);
            }
            return;
        };

        for rotation in rotations {
            let mut model = template.clone();
            self.transform(&mut model, def, instance, rotation);
            if def.contoured_ground {
                contour(&mut model, landscape, instance.plane as usize, origin);
            }
            model.compute_normals();

            placed.push(PlacedObject {
                instance: *instance,
                definition: def.id,
                group,
                rotation,
                origin,
                footprint,
                model,
                map_marker,
            });
        }
    }

    /// Centre of the footprint, standing on the mean height of its corners.
    fn origin(&self, instance: &ObjectInstance, footprint: (u8, u8), landscape: &Landscape) -> Vec3 {
        let units = TILE_UNITS as f32;
        let x0 = instance.x as f32 * units;
        let z0 = instance.y as f32 * units;
        let x1 = x0 + footprint.0 as f32 * units;
        let z1 = z0 + footprint.1 as f32 * units;

        let plane = instance.plane as usize;
        let height = [(x0, z0), (x1, z0), (x1, z1), (x0, z1)]
            .iter()
            .map(|&(x, z)| landscape.height_at(plane, x, z))
            .sum::<f32>()
            / 4.0;

        Vec3::new(
            x0 + footprint.0 as f32 * HALF_TILE,
            height,
            z0 + footprint.1 as f32 * HALF_TILE,
        )
    }

    fn transform(&self, model: &mut Model, def: &ObjectDefinition, instance: &ObjectInstance, rotation: u8) {
        if def.inverted ^ (rotation > 3) {
            model.invert();
        }
        model.recolour(&def.recolours);
        model.retexture(&def.retextures);
        model.rotate_quarter(rotation & 3);
        if instance.object_type == 11 {
            model.rotate_yaw(FRAC_PI_4);
        }

        if def.scale != [128; 3] {
            let scale = Vec3::new(def.scale[0] as f32, def.scale[1] as f32, def.scale[2] as f32) / 128.0;
            for v in &mut model.vertices {
                v.position *= scale;
            }
        }
        let [tx, ty, tz] = def.translate;
        if def.translate != [0; 3] {
            model.translate(Vec3::new(tx as f32, ty as f32, tz as f32));
        }
    }
}

/// Bends a model so its base follows the ground under it.
fn contour(model: &mut Model, landscape: &Landscape, plane: usize, origin: Vec3) {
    for v in &mut model.vertices {
        let ground = landscape.height_at(plane, origin.x + v.position.x, origin.z + v.position.z);
        v.position.y -= ground - origin.y;
    }
}
