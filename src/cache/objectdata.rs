use std::collections::HashMap;

use log::{info, trace, warn};
use serde::Serialize;

use crate::cache::error::{DecodeError, DecodeResult};
use crate::cache::reader::ByteCursor;
use crate::cache::store::{config, decode_archive, AssetStore};
use crate::cache::varbitdata::VarpState;


/// Model ids of a definition, either keyed by placement type or shared by all
/// centrepiece placements.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum ModelList {
    #[default]
    Empty,
    Typed(Vec<(u8, u16)>),
    Untyped(Vec<u16>),
}

impl ModelList {
    fn is_empty(&self) -> bool {
        match self {
            ModelList::Empty => true,
            ModelList::Typed(list) => list.is_empty(),
            ModelList::Untyped(list) => list.is_empty(),
        }
    }
}

/// Replacement table selected by a varbit or varp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Morph {
    pub varbit: Option<u16>,
    pub varp: Option<u16>,
    pub ids: Vec<Option<u32>>,
    pub default: Option<u32>,
}

impl Morph {
    /// definition id shown for the current variable values
    pub fn select(&self, state: &VarpState) -> Option<u32> {
        let value = match (self.varbit, self.varp) {
            (Some(varbit), _) => state.varbit(varbit as u32),
            (None, Some(varp)) => Some(state.varp(varp)),
            (None, None) => None,
        };
        match value {
            Some(v) if v >= 0 && (v as usize) < self.ids.len() => self.ids[v as usize],
            _ => self.default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Param {
    Int(i32),
    Str(String),
}


#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDefinition {
    pub id: u32,
    pub models: ModelList,
    pub name: Option<String>,
    pub width: u8,
    pub length: u8,
    pub solid: bool,
    pub impenetrable: bool,
    pub interactive: bool,
    pub contoured_ground: bool,
    pub delay_shading: bool,
    pub occludes: bool,
    pub animation: Option<u16>,
    pub decor_displacement: u8,
    pub ambient: i8,
    pub contrast: i8,
    pub actions: [Option<String>; 5],
    pub recolours: Vec<(u16, u16)>,
    pub retextures: Vec<(u16, u16)>,
    pub inverted: bool,
    pub casts_shadow: bool,
    pub scale: [u16; 3],
    pub map_scene: Option<u16>,
    pub surroundings: u8,
    pub translate: [i16; 3],
    pub obstructs_ground: bool,
    pub hollow: bool,
    pub support_items: u8,
    pub morph: Option<Morph>,
    pub area: Option<u16>,
    pub params: HashMap<u32, Param>,
}

fn optional_u16(value: u16) -> Option<u16> {
    (value != u16::MAX).then_some(value)
}

impl ObjectDefinition {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            models: ModelList::Empty,
            name: None,
            width: 1,
            length: 1,
            solid: true,
            impenetrable: true,
            interactive: false,
            contoured_ground: false,
            delay_shading: false,
            occludes: false,
            animation: None,
            decor_displacement: 16,
            ambient: 0,
            contrast: 0,
            actions: Default::default(),
            recolours: Vec::new(),
            retextures: Vec::new(),
            inverted: false,
            casts_shadow: true,
            scale: [128; 3],
            map_scene: None,
            surroundings: 0,
            translate: [0; 3],
            obstructs_ground: false,
            hollow: false,
            support_items: 0,
            morph: None,
            area: None,
            params: HashMap::new(),
        }
    }

    fn read_pairs(cursor: &mut ByteCursor) -> DecodeResult<Vec<(u16, u16)>> {
        let count = cursor.read_u8()?;
        (0..count).map(|_| -> DecodeResult<(u16, u16)> { Ok((cursor.read_u16()?, cursor.read_u16()?)) }).collect()
    }

    fn apply(&mut self, cursor: &mut ByteCursor, interactive: &mut Option<u8>, support_items: &mut Option<u8>) -> DecodeResult<()> {
        loop {
            let opcode = cursor.read_u8()?;
            match opcode {
                0 => return Ok(()),
                1 => {
                    let count = cursor.read_u8()? as usize;
                    if self.models.is_empty() {
                        let list = (0..count)
                            .map(|_| -> DecodeResult<(u8, u16)> {
                                let id = cursor.read_u16()?;
                                Ok((cursor.read_u8()?, id))
                            })
                            .collect::<DecodeResult<Vec<_>>>()?;
                        self.models = ModelList::Typed(list);
                    } else {
                        cursor.skip(count * 3)?;
                    }
                }
                2 => self.name = Some(cursor.read_string()?),
                5 => {
                    let count = cursor.read_u8()? as usize;
                    if self.models.is_empty() {
                        let list = (0..count).map(|_| cursor.read_u16()).collect::<DecodeResult<Vec<_>>>()?;
                        self.models = ModelList::Untyped(list);
                    } else {
                        cursor.skip(count * 2)?;
                    }
                }
                14 => self.width = cursor.read_u8()?,
                15 => self.length = cursor.read_u8()?,
                17 => self.solid = false,
                18 => self.impenetrable = false,
                19 => *interactive = Some(cursor.read_u8()?),
                21 => self.contoured_ground = true,
                22 => self.delay_shading = true,
                23 => self.occludes = true,
                24 => self.animation = optional_u16(cursor.read_u16()?),
                27 | 60 => {}
                28 => self.decor_displacement = cursor.read_u8()?,
                29 => self.ambient = cursor.read_i8()?,
                39 => self.contrast = cursor.read_i8()?,
                30..=38 => {
                    let action = cursor.read_string()?;
                    if let Some(slot) = self.actions.get_mut((opcode - 30) as usize) {
                        *slot = (!action.eq_ignore_ascii_case("hidden")).then_some(action);
                    }
                }
                40 => self.recolours = Self::read_pairs(cursor)?,
                41 => self.retextures = Self::read_pairs(cursor)?,
                62 => self.inverted = true,
                64 => self.casts_shadow = false,
                65..=67 => self.scale[(opcode - 65) as usize] = cursor.read_u16()?,
                68 => self.map_scene = Some(cursor.read_u16()?),
                69 => self.surroundings = cursor.read_u8()?,
                70..=72 => self.translate[(opcode - 70) as usize] = cursor.read_i16()?,
                73 => self.obstructs_ground = true,
                74 => self.hollow = true,
                75 => *support_items = Some(cursor.read_u8()?),
                77 | 92 => {
                    let varbit = optional_u16(cursor.read_u16()?);
                    let varp = optional_u16(cursor.read_u16()?);
                    let default = if opcode == 92 { optional_u16(cursor.read_u16()?).map(u32::from) } else { None };
                    let count = cursor.read_u8()? as usize;
                    let ids = (0..=count)
                        .map(|_| -> DecodeResult<Option<u32>> { Ok(optional_u16(cursor.read_u16()?).map(u32::from)) })
                        .collect::<DecodeResult<Vec<_>>>()?;
                    self.morph = Some(Morph { varbit, varp, ids, default });
                }
                78 => cursor.skip(3)?,
                79 => {
                    cursor.skip(5)?;
                    let count = cursor.read_u8()? as usize;
                    cursor.skip(count * 2)?;
                }
                81 => cursor.skip(1)?,
                82 => self.area = Some(cursor.read_u16()?),
                249 => {
                    let count = cursor.read_u8()?;
                    for _ in 0..count {
                        let is_string = cursor.read_u8()? == 1;
                        let key = cursor.read_u24()?;
                        let value = if is_string { Param::Str(cursor.read_string()?) } else { Param::Int(cursor.read_i32()?) };
                        self.params.insert(key, value);
                    }
                }
                _ => return Err(DecodeError::UnknownOpcode { kind: "object", opcode }),
            }
        }
    }

    pub fn decode(id: u32, data: &[u8]) -> DecodeResult<Self> {
        let mut def = ObjectDefinition::new(id);
        let mut cursor = ByteCursor::new(data);
        let mut interactive = None;
        let mut support_items = None;

        match def.apply(&mut cursor, &mut interactive, &mut support_items) {
            Ok(()) => {}
            Err(err @ DecodeError::UnknownOpcode { .. }) => warn!("object {id}: {err}, record truncated"),
            Err(err) => return Err(err),
        }

        def.interactive = match interactive {
            Some(flag) => flag == 1,
            None => {
                let centrepiece = match &def.models {
                    ModelList::Empty => false,
                    ModelList::Typed(list) => list.first().map_or(false, |(t, _)| *t == 10),
                    ModelList::Untyped(list) => !list.is_empty(),
                };
                centrepiece || def.actions.iter().any(Option::is_some)
            }
        };
        if def.hollow {
            def.solid = false;
            def.impenetrable = false;
        }
        def.support_items = support_items.unwrap_or(def.solid as u8);

        Ok(def)
    }

    /// Model ids for a placement type. Diagonal centrepieces (11) reuse the
    /// type 10 models, untyped lists only serve those two types.
    pub fn model_ids(&self, object_type: u8) -> Vec<u16> {
        let wanted = if object_type == 11 { 10 } else { object_type };
        match &self.models {
            ModelList::Typed(list) => list.iter().filter(|(t, _)| *t == wanted).map(|(_, id)| *id).collect(),
            ModelList::Untyped(list) if wanted == 10 => list.clone(),
            _ => Vec::new(),
        }
    }

    /// footprint in tiles, swapped for odd rotations
    pub fn footprint(&self, rotation: u8) -> (u8, u8) {
        if rotation & 1 == 1 {
            (self.length, self.width)
        } else {
            (self.width, self.length)
        }
    }
}


#[derive(Debug, Default)]
pub struct ObjectDefinitions {
    definitions: HashMap<u32, ObjectDefinition>,
}

impl ObjectDefinitions {
    pub fn load<S: AssetStore + ?Sized>(store: &S) -> Self {
        trace!("ObjectDefinitions::load");
        let definitions = decode_archive(store, config::OBJECT, "object", ObjectDefinition::decode);
        info!("loaded {} object definitions", definitions.len());
        Self { definitions }
    }

    pub fn insert(&mut self, def: ObjectDefinition) {
        self.definitions.insert(def.id, def);
    }

    pub fn get(&self, id: u32) -> Option<&ObjectDefinition> {
        self.definitions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Definition after morphing. Without a variable state the base definition is used.
    pub fn resolve(&self, id: u32, state: Option<&VarpState>) -> Option<&ObjectDefinition> {
        let def = self.get(id)?;
        match (&def.morph, state) {
            (Some(morph), Some(state)) => self.get(morph.select(state)?),
            _ => Some(def),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::varbitdata::Varbit;
    use crate::cache::writer::ByteWriter;

    #[test]
    fn typed_models_and_flags() {
        let mut w = ByteWriter::new();
        w.put_u8(1).put_u8(2).put_u16(100).put_u8(0).put_u16(101).put_u8(2)
            .put_u8(2).put_string("Wall")
            .put_u8(14).put_u8(2)
            .put_u8(17)
            .put_u8(28).put_u8(8)
            .put_u8(29).put_u8(0xf6)
            .put_u8(39).put_u8(3)
            .put_u8(30).put_string("Open")
            .put_u8(31).put_string("Hidden")
            .put_u8(36).put_string("Ignored")
            .put_u8(40).put_u8(1).put_u16(5).put_u16(6)
            .put_u8(62)
            .put_u8(70).put_i16(-32)
            .put_u8(82).put_u16(12)
            .put_u8(0);
        let def = ObjectDefinition::decode(7, &w.into_inner()).unwrap();

        assert_eq!(def.models, ModelList::Typed(vec![(0, 100), (2, 101)]));
        assert_eq!(def.model_ids(2), vec![101]);
        assert!(def.model_ids(10).is_empty());
        assert_eq!(def.name.as_deref(), Some("Wall"));
        assert_eq!(def.footprint(0), (2, 1));
        assert_eq!(def.footprint(1), (1, 2));
        assert!(!def.solid);
        assert_eq!(def.support_items, 0);
        assert_eq!(def.decor_displacement, 8);
        assert_eq!(def.ambient, -10);
        assert_eq!(def.contrast, 3);
        assert_eq!(def.actions[0].as_deref(), Some("Open"));
        assert_eq!(def.actions[1], None);
        assert!(def.interactive);
        assert_eq!(def.recolours, vec![(5, 6)]);
        assert!(def.inverted);
        assert_eq!(def.translate, [-32, 0, 0]);
        assert_eq!(def.area, Some(12));
    }

    #[test]
    fn untyped_models_serve_centrepieces() {
        let mut w = ByteWriter::new();
        w.put_u8(5).put_u8(2).put_u16(9).put_u16(10)
            // a second list is ignored
            .put_u8(1).put_u8(1).put_u16(1).put_u8(0)
            .put_u8(0);
        let def = ObjectDefinition::decode(1, &w.into_inner()).unwrap();
        assert_eq!(def.model_ids(10), vec![9, 10]);
        assert_eq!(def.model_ids(11), vec![9, 10]);
        assert!(def.model_ids(0).is_empty());
        assert!(def.interactive);
        assert_eq!(def.support_items, 1);
    }

    #[test]
    fn hollow_clears_solidity() {
        let def = ObjectDefinition::decode(1, &[74, 19, 0, 0]).unwrap();
        assert!(!def.solid && !def.impenetrable);
        assert!(!def.interactive);
    }

    #[test]
    fn params_are_kept() {
        let mut w = ByteWriter::new();
        w.put_u8(249).put_u8(2)
            .put_u8(1).put_u24(5).put_string("x")
            .put_u8(0).put_u24(6).put_i32(-1)
            .put_u8(0);
        let def = ObjectDefinition::decode(1, &w.into_inner()).unwrap();
        assert_eq!(def.params.get(&5), Some(&Param::Str("x".into())));
        assert_eq!(def.params.get(&6), Some(&Param::Int(-1)));
    }

    #[test]
    fn unknown_opcode_truncates_record() {
        let def = ObjectDefinition::decode(1, &[14, 3, 200, 15, 3, 0]).unwrap();
        assert_eq!(def.width, 3);
        assert_eq!(def.length, 1);
        assert!(ObjectDefinition::decode(1, &[2, b'a']).is_err());
    }

    fn morphing_definitions() -> ObjectDefinitions {
        let mut w = ByteWriter::new();
        w.put_u8(92).put_u16(4).put_u16(0xffff).put_u16(30)
            .put_u8(1).put_u16(20).put_u16(0xffff)
            .put_u8(0);
        let mut defs = ObjectDefinitions::default();
        defs.insert(ObjectDefinition::decode(10, &w.into_inner()).unwrap());
        defs.insert(ObjectDefinition::new(20));
        defs.insert(ObjectDefinition::new(30));
        defs
    }

    #[test]
    fn morph_selects_by_varbit() {
        let defs = morphing_definitions();
        let morph = defs.get(10).unwrap().morph.clone().unwrap();
        assert_eq!(morph.ids, vec![Some(20), None]);
        assert_eq!(morph.default, Some(30));

        let mut varbits = HashMap::new();
        varbits.insert(4, Varbit { varp: 2, lsb: 0, msb: 3 });
        let mut state = VarpState::new(varbits);

        assert_eq!(defs.resolve(10, None).map(|d| d.id), Some(10));
        assert_eq!(defs.resolve(10, Some(&state)).map(|d| d.id), Some(20));
        state.set(2, 1);
        assert!(defs.resolve(10, Some(&state)).is_none());
        state.set(2, 7);
        assert_eq!(defs.resolve(10, Some(&state)).map(|d| d.id), Some(30));
    }
}
