use std::collections::HashMap;

use log::{info, trace, warn};
use serde::Serialize;

use crate::cache::error::{DecodeError, DecodeResult};
use crate::cache::reader::ByteCursor;
use crate::cache::store::{config, decode_archive, AssetStore};
use crate::world::colour::Hsl;


#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FloorKind {
    Underlay,
    Overlay,
}

impl FloorKind {
    fn name(&self) -> &'static str {
        match self {
            FloorKind::Underlay => "underlay",
            FloorKind::Overlay => "overlay",
        }
    }
}


/// Floor colour definition, either a tile underlay or a shaped overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Floor {
    pub id: u32,
    pub rgb: u32,
    pub secondary_rgb: Option<u32>,
    pub texture: Option<u8>,
    pub shadowed: bool,
    pub hsl: Hsl,
    pub secondary_hsl: Option<Hsl>,
}

impl Floor {
    fn new(id: u32) -> Self {
        Self {
            id,
            rgb: 0,
            secondary_rgb: None,
            texture: None,
            shadowed: true,
            hsl: Hsl::default(),
            secondary_hsl: None,
        }
    }

    fn apply(&mut self, cursor: &mut ByteCursor, kind: FloorKind) -> DecodeResult<()> {
        loop {
            let opcode = cursor.read_u8()?;
            match (kind, opcode) {
                (_, 0) => return Ok(()),
                (_, 1) => self.rgb = cursor.read_u24()?,
                (FloorKind::Overlay, 2) => self.texture = Some(cursor.read_u8()?),
                (FloorKind::Overlay, 5) => self.shadowed = false,
                (FloorKind::Overlay, 7) => self.secondary_rgb = Some(cursor.read_u24()?),
                _ => return Err(DecodeError::UnknownOpcode { kind: kind.name(), opcode }),
            }
        }
    }

    /// Decodes a single record. An unknown opcode ends the record early,
    /// fields read before it are kept.
    pub fn decode(id: u32, data: &[u8], kind: FloorKind) -> DecodeResult<Self> {
        let mut floor = Floor::new(id);
        let mut cursor = ByteCursor::new(data);

        match floor.apply(&mut cursor, kind) {
            Ok(()) => {}
            Err(err @ DecodeError::UnknownOpcode { .. }) => warn!("{} {id}: {err}, record truncated", kind.name()),
            Err(err) => return Err(err),
        }

        floor.hsl = Hsl::from_rgb(floor.rgb);
        floor.secondary_hsl = floor.secondary_rgb.map(Hsl::from_rgb);
        Ok(floor)
    }
}


/// All underlay and overlay definitions keyed by id.
#[derive(Debug, Default)]
pub struct FloorDefinitions {
    pub underlays: HashMap<u32, Floor>,
    pub overlays: HashMap<u32, Floor>,
}

impl FloorDefinitions {
    pub fn load<S: AssetStore + ?Sized>(store: &S) -> Self {
        trace!("FloorDefinitions::load");
        let result = Self {
            underlays: Self::load_kind(store, config::UNDERLAY, FloorKind::Underlay),
            overlays: Self::load_kind(store, config::OVERLAY, FloorKind::Overlay),
        };
        info!("loaded {} underlays and {} overlays", result.underlays.len(), result.overlays.len());
        result
    }

    fn load_kind<S: AssetStore + ?Sized>(store: &S, archive: u32, kind: FloorKind) -> HashMap<u32, Floor> {
        decode_archive(store, archive, kind.name(), |id, data| Floor::decode(id, data, kind))
    }

    pub fn insert(&mut self, kind: FloorKind, floor: Floor) {
        match kind {
            FloorKind::Underlay => self.underlays.insert(floor.id, floor),
            FloorKind::Overlay => self.overlays.insert(floor.id, floor),
        };
    }

    /// underlay for a tile underlay id, ids on tiles are one based
    pub fn underlay(&self, tile_id: u8) -> Option<&Floor> {
        if tile_id == 0 {
            return None;
        }
        self.underlays.get(&(tile_id as u32 - 1))
    }

    /// overlay for a tile overlay id, ids on tiles are one based
    pub fn overlay(&self, tile_id: u8) -> Option<&Floor> {
        if tile_id == 0 {
            return None;
        }
        self.overlays.get(&(tile_id as u32 - 1))
    }
}
