//! World module
//!
//! Builds the fixed set of areas from a parsed world description:
//! - Validates map dimensions, tile size and layers
//! - Slices every layer into per-area layers
//! - Derives static collision planes from tile bounding boxes
//! - Resolves door placements into area-local doors
//!
//! The world is built once at startup and never changes shape afterwards;
//! only the areas' locked state does.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GameError, WorldError};
use crate::game::area::{Area, AreaGuard, AreaId, Layer, EMPTY_TILE};
use crate::game::door::{Door, DoorId};
use crate::game::geometry::Rectangle;

/// Collision metadata for one tile of the tileset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileMetadata {
    pub id: u32,
    /// Bounding boxes in pixels relative to the tile's top-left corner
    #[serde(default)]
    pub bounding_boxes: Vec<Rectangle>,
}

/// An area declared on the map, in tile coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaDeclaration {
    pub id: AreaId,
    pub bounds: Rectangle,
}

/// A door placed on the map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoorPlacement {
    pub id: DoorId,
    /// Trigger rectangle in world pixels
    pub trigger: Rectangle,
    /// Destination tile, world tile coordinates
    pub destination_x: u32,
    pub destination_y: u32,
}

/// Fully parsed map handed to the server at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldDescription {
    /// Map width in tiles
    pub width: u32,
    /// Map height in tiles
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    #[serde(default)]
    pub tileset: Vec<TileMetadata>,
    /// Row-major tile id grids, one per layer
    pub layers: Vec<Vec<u32>>,
    pub areas: Vec<AreaDeclaration>,
    #[serde(default)]
    pub doors: Vec<DoorPlacement>,
}

/// The collection of areas making up the game map
pub struct World {
    tile_size: u32,
    tileset: Vec<TileMetadata>,
    areas: BTreeMap<AreaId, Area>,
}

impl World {
    /// Build the world from its description
    pub fn build(description: &WorldDescription) -> Result<Self, WorldError> {
        let tile_size = validate_dimensions(description)?;
        let ts = tile_size as i32;

        let mut tileset: HashMap<u32, &TileMetadata> = HashMap::new();
        let tile_bounds = Rectangle::new(0, 0, ts, ts);
        for metadata in &description.tileset {
            if !metadata
                .bounding_boxes
                .iter()
                .all(|b| tile_bounds.contains(b))
            {
                return Err(WorldError::InvalidBoundingBox(metadata.id));
            }
            tileset.insert(metadata.id, metadata);
        }

        // Areas
        let map_bounds = Rectangle::new(0, 0, description.width as i32, description.height as i32);
        let mut seen_areas = HashSet::new();
        for declaration in &description.areas {
            if !seen_areas.insert(declaration.id) {
                return Err(WorldError::DuplicateArea(declaration.id));
            }
            if declaration.bounds.is_empty() || !map_bounds.contains(&declaration.bounds) {
                return Err(WorldError::InvalidAreaBounds(declaration.id));
            }
        }

        // Doors
        let mut seen_doors = HashSet::new();
        let mut doors: HashMap<AreaId, Vec<Door>> = HashMap::new();
        for placement in &description.doors {
            if !seen_doors.insert(placement.id) {
                return Err(WorldError::DuplicateDoor(placement.id));
            }
            let door = resolve_door(placement, &description.areas, ts)?;
            debug!(
                door_id = door.id,
                source_area = door.source_area,
                destination_area = door.destination_area,
                "Resolved door"
            );
            doors.entry(door.source_area).or_default().push(door);
        }

        let mut areas = BTreeMap::new();
        for declaration in &description.areas {
            let bounds = declaration.bounds;
            let width = bounds.width() as u32;
            let height = bounds.height() as u32;

            let mut layers = Vec::with_capacity(description.layers.len());
            let mut obstacles = Vec::new();
            for grid in &description.layers {
                let layer = slice_layer(grid, description.width, &bounds);
                collect_obstacles(&layer, &tileset, ts, &mut obstacles)?;
                layers.push(layer);
            }

            let area = Area::new(
                declaration.id,
                width,
                height,
                tile_size,
                layers,
                obstacles,
                doors.remove(&declaration.id).unwrap_or_default(),
            );
            debug!(
                area_id = area.id,
                width,
                height,
                static_planes = area.static_planes().len(),
                doors = area.doors().len(),
                "Built area"
            );
            areas.insert(declaration.id, area);
        }

        info!(
            areas = areas.len(),
            doors = description.doors.len(),
            tile_size,
            "World built"
        );

        Ok(Self {
            tile_size,
            tileset: description.tileset.clone(),
            areas,
        })
    }

    /// Assemble a world from already constructed areas
    pub fn from_areas(tile_size: u32, areas: impl IntoIterator<Item = Area>) -> Self {
        Self {
            tile_size,
            tileset: Vec::new(),
            areas: areas.into_iter().map(|a| (a.id, a)).collect(),
        }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Collision metadata clients use to predict movement
    pub fn tileset(&self) -> &[TileMetadata] {
        &self.tileset
    }

    pub fn area(&self, id: AreaId) -> Option<&Area> {
        self.areas.get(&id)
    }

    /// Get an area or fail with [`GameError::AreaNotFound`]
    pub fn require_area(&self, id: AreaId) -> Result<&Area, GameError> {
        self.area(id).ok_or(GameError::AreaNotFound(id))
    }

    /// Areas in ascending id order
    pub fn areas(&self) -> impl Iterator<Item = &Area> {
        self.areas.values()
    }

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    /// Total players across all areas. Locks each area in turn.
    pub fn player_count(&self) -> usize {
        self.areas.values().map(|a| a.lock().player_count()).sum()
    }

    /// Lock two distinct areas.
    ///
    /// Locks are always taken in ascending area id, whatever order the
    /// caller names them in; the guards are returned in argument order.
    pub fn lock_pair(
        &self,
        first: AreaId,
        second: AreaId,
    ) -> Result<(AreaGuard<'_>, AreaGuard<'_>), GameError> {
        if first == second {
            return Err(GameError::SameArea(first));
        }
        let a = self.require_area(first)?;
        let b = self.require_area(second)?;

        if first < second {
            let ga = a.lock();
            let gb = b.lock();
            Ok((ga, gb))
        } else {
            let gb = b.lock();
            let ga = a.lock();
            Ok((ga, gb))
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("tile_size", &self.tile_size)
            .field("areas", &self.areas.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn validate_dimensions(description: &WorldDescription) -> Result<u32, WorldError> {
    if description.tile_width != description.tile_height {
        return Err(WorldError::NonSquareTiles {
            width: description.tile_width,
            height: description.tile_height,
        });
    }
    let invalid = WorldError::InvalidDimensions {
        width: description.width,
        height: description.height,
        tile_size: description.tile_width,
    };
    if description.width == 0 || description.height == 0 || description.tile_width == 0 {
        return Err(invalid);
    }

    // The map plus the boundary planes one tile outside it must fit in i32 pixels
    let fits = |tiles: u32| {
        (u64::from(tiles) + 2) * u64::from(description.tile_width) <= i32::MAX as u64
    };
    if !fits(description.width) || !fits(description.height) {
        return Err(invalid);
    }
    let expected = (description.width as usize)
        .checked_mul(description.height as usize)
        .ok_or(invalid)?;

    if description.layers.is_empty() {
        return Err(WorldError::NoLayers);
    }

    for (index, layer) in description.layers.iter().enumerate() {
        if layer.len() != expected {
            return Err(WorldError::LayerSizeMismatch {
                layer: index,
                expected,
                actual: layer.len(),
            });
        }
    }

    Ok(description.tile_width)
}

fn resolve_door(
    placement: &DoorPlacement,
    areas: &[AreaDeclaration],
    tile_size: i32,
) -> Result<Door, WorldError> {
    let source = areas
        .iter()
        .find(|a| a.bounds.multiply(tile_size).contains(&placement.trigger))
        .ok_or(WorldError::UnresolvedDoorSource(placement.id))?;

    let dx = placement.destination_x as i32;
    let dy = placement.destination_y as i32;
    let target = areas
        .iter()
        .find(|a| a.bounds.contains_point(dx, dy))
        .ok_or(WorldError::UnresolvedDoorTarget(placement.id))?;

    let trigger = placement
        .trigger
        .relative_to(&source.bounds.multiply(tile_size));

    Ok(Door::new(
        placement.id,
        source.id,
        trigger,
        target.id,
        (dx - target.bounds.x1) * tile_size,
        (dy - target.bounds.y1) * tile_size,
    ))
}

fn slice_layer(grid: &[u32], map_width: u32, bounds: &Rectangle) -> Layer {
    let mut tiles = Vec::with_capacity((bounds.width() * bounds.height()) as usize);
    for y in bounds.y1..bounds.y2 {
        let row = y as usize * map_width as usize;
        tiles.extend_from_slice(&grid[row + bounds.x1 as usize..row + bounds.x2 as usize]);
    }
    Layer::new(bounds.width() as u32, bounds.height() as u32, tiles)
}

fn collect_obstacles(
    layer: &Layer,
    tileset: &HashMap<u32, &TileMetadata>,
    tile_size: i32,
    obstacles: &mut Vec<Rectangle>,
) -> Result<(), WorldError> {
    for (index, &tile_id) in layer.tiles.iter().enumerate() {
        if tile_id == EMPTY_TILE {
            continue;
        }
        let metadata = tileset
            .get(&tile_id)
            .ok_or(WorldError::UnknownTile(tile_id))?;

        let x = (index as u32 % layer.width) as i32 * tile_size;
        let y = (index as u32 / layer.width) as i32 * tile_size;
        obstacles.extend(metadata.bounding_boxes.iter().map(|b| b.translate(x, y)));
    }
    Ok(())
}
