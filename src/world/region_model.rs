use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::cache::areadata::{load_areas, Area};
use crate::cache::error::{DecodeError, DecodeResult};
use crate::cache::floordata::FloorDefinitions;
use crate::cache::modeldata::{decode_model, DecodeStrategy};
use crate::cache::objectdata::ObjectDefinitions;
use crate::cache::spritedata::Sprites;
use crate::cache::store::{index, locations_name, region_id, terrain_name, AssetStore};
use crate::cache::texturedata::TextureDefinitions;
use crate::cache::varbitdata::VarpState;
use crate::cache::xtea::KeyTable;
use crate::config::ServerConfig;
use crate::world::colour::Palette;
use crate::world::landscape::Landscape;
use crate::world::model::Model;
use crate::world::objects::{decode_placements, ModelSource, ObjectPlacer, PlacedObject};
use crate::world::shapes::{overlay_mesh, underlay_mesh, TerrainMesh};
use crate::world::tiles::{Tile, PLANES, REGION_SIZE};


/// Definitions decoded once from the cache, shared by every region decode.
pub struct CacheData {
    pub store: Box<dyn AssetStore + Send + Sync>,
    pub keys: KeyTable,
    pub floors: FloorDefinitions,
    pub objects: ObjectDefinitions,
    pub areas: HashMap<u32, Area>,
    pub varps: VarpState,
    pub sprites: Sprites,
    pub textures: TextureDefinitions,
    pub palette: Palette,
    pub brightness: f64,
    pub strategy: DecodeStrategy,
    models: RwLock<HashMap<u32, Option<Arc<Model>>>>,
}

impl CacheData {
    pub fn load(store: Box<dyn AssetStore + Send + Sync>, keys: KeyTable, config: &ServerConfig) -> Self {
        let start = Instant::now();
        info!("loading definitions...");
        let data = Self {
            floors: FloorDefinitions::load(store.as_ref()),
            objects: ObjectDefinitions::load(store.as_ref()),
            areas: load_areas(store.as_ref()),
            varps: VarpState::load(store.as_ref()),
            sprites: Sprites::load(store.as_ref()),
            textures: TextureDefinitions::load(store.as_ref()),
            palette: Palette::new(config.brightness),
            brightness: config.brightness,
            strategy: config.model_strategy(),
            models: RwLock::new(HashMap::new()),
            store,
            keys,
        };
        info!("definitions loaded in {:?}", start.elapsed());
        data
    }

    /// Decoded model template, memoised. Undecodable models are remembered as absent.
    pub fn template(&self, id: u32) -> Option<Arc<Model>> {
        if let Ok(models) = self.models.read() {
            if let Some(model) = models.get(&id) {
                return model.clone();
            }
        }

        let model = match self.store.file(index::MODELS, id, 0) {
            None => {
                debug!("model {id} not in cache");
                None
            }
            Some(data) => match decode_model(id, &data, &self.strategy) {
                Ok(model) => Some(Arc::new(model)),
                Err(err) => {
                    warn!("model {id}: {err}");
                    None
                }
            },
        };

        if let Ok(mut models) = self.models.write() {
            models.insert(id, model.clone());
        }
        model
    }
}

impl ModelSource for CacheData {
    fn model(&self, id: u32) -> Option<Model> {
        self.template(id).map(|model| model.as_ref().clone())
    }
}


/// A fully decoded region: terrain, meshes per plane and placed objects.
#[derive(Debug)]
pub struct Region {
    pub landscape: Landscape,
    pub underlays: Vec<TerrainMesh>,
    pub overlays: Vec<TerrainMesh>,
    pub objects: Vec<PlacedObject>,
}

#[derive(Debug, Serialize)]
pub struct PlaneSummary {
    pub plane: usize,
    pub coloured_tiles: usize,
    pub overlay_tiles: usize,
    pub underlay_faces: usize,
    pub overlay_faces: usize,
    pub objects: usize,
}

#[derive(Debug, Serialize)]
pub struct RegionSummary {
    pub region_x: u8,
    pub region_y: u8,
    pub planes: Vec<PlaneSummary>,
    pub map_markers: Vec<(u8, u8, u32)>,
}

impl Region {
    /// Decodes terrain, then objects placed on it. Missing terrain is an error,
    /// a region without a placement payload simply has no objects.
    pub fn decode(data: &CacheData, region_x: u8, region_y: u8) -> DecodeResult<Self> {
        trace!("Region::decode {region_x}_{region_y}");
        let start = Instant::now();

        let terrain = data
            .store
            .region(index::MAPS, &terrain_name(region_x, region_y), None)?
            .ok_or_else(|| DecodeError::Undecodable(format!("no terrain for region {region_x}_{region_y}")))?;
        let landscape = Landscape::load(region_x, region_y, &terrain, &data.floors, &data.palette)?;

        let key = data.keys.get(region_id(region_x, region_y));
        let instances = match data.store.region(index::MAPS, &locations_name(region_x, region_y), key)? {
            Some(locations) => decode_placements(&locations)?,
            None => {
                debug!("region {region_x}_{region_y}: no objects");
                Vec::new()
            }
        };

        let placer = ObjectPlacer {
            definitions: &data.objects,
            models: data,
            areas: &data.areas,
            varps: Some(&data.varps),
            palette: &data.palette,
        };
        let objects = placer.place(&instances, &landscape);

        let underlays = (0..PLANES).map(|plane| underlay_mesh(&landscape, plane, &data.palette)).collect();
        let overlays = (0..PLANES).map(|plane| overlay_mesh(&landscape, plane, &data.floors, &data.palette)).collect();

        info!("region {region_x}_{region_y} decoded in {:?}, {} objects", start.elapsed(), objects.len());
        Ok(Self { landscape, underlays, overlays, objects })
    }

    pub fn tile(&self, plane: usize, x: usize, y: usize) -> Option<&Tile> {
        (plane < PLANES && x < REGION_SIZE && y < REGION_SIZE).then(|| self.landscape.tiles.tile(plane, x, y))
    }

    pub fn summary(&self) -> RegionSummary {
        let planes = (0..PLANES)
            .map(|plane| {
                let tiles = self.landscape.tiles.plane(plane);
                PlaneSummary {
                    plane,
                    coloured_tiles: tiles.iter().filter(|t| t.colour.is_some()).count(),
                    overlay_tiles: tiles.iter().filter(|t| t.overlay.is_some()).count(),
                    underlay_faces: self.underlays[plane].faces.len(),
                    overlay_faces: self.overlays[plane].faces.len(),
                    objects: self.objects.iter().filter(|o| o.instance.plane as usize == plane).count(),
                }
            })
            .collect();

        RegionSummary {
            region_x: self.landscape.region_x,
            region_y: self.landscape.region_y,
            planes,
            map_markers: self
                .objects
                .iter()
                .filter_map(|o| o.map_marker.map(|sprite| (o.instance.x, o.instance.y, sprite)))
                .collect(),
        }
    }
}


/// Regions decoded on demand and kept for later requests.
pub struct RegionModel {
    pub data: Arc<CacheData>,
    regions: RwLock<HashMap<u16, Arc<Region>>>,
}

impl RegionModel {
    pub fn new(data: Arc<CacheData>) -> Self {
        Self {
            data,
            regions: RwLock::new(HashMap::new()),
        }
    }

    pub fn region(&self, region_x: u8, region_y: u8) -> DecodeResult<Arc<Region>> {
        let id = region_id(region_x, region_y);
        if let Ok(regions) = self.regions.read() {
            if let Some(region) = regions.get(&id) {
                return Ok(region.clone());
            }
        }

        let region = Arc::new(Region::decode(&self.data, region_x, region_y)?);
        if let Ok(mut regions) = self.regions.write() {
            // another request may have decoded it meanwhile, keep the first
            return Ok(regions.entry(id).or_insert(region).clone());
        }
        Ok(region)
    }

    pub fn cached_regions(&self) -> usize {
        self.regions.read().map(|r| r.len()).unwrap_or(0)
    }
}
