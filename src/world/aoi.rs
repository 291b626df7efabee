//! Area of Interest (AOI) manager
//!
//! Partitions a rectangular world region into a fixed table of [`Grid`] cells
//! and answers spatial queries against it. Only the cell topology is static:
//! membership changes continuously, so neighborhoods are always recomputed and
//! member sets are always read fresh.
//!
//! Cell ids are laid out row-major: `gid = row * cnts_x + col`, where the column
//! comes from the x coordinate and the row from the ground-plane z coordinate.
//! The third coordinate (height) is never looked at.

use std::fmt;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::world::entity::EntityId;
use crate::world::error::{WorldError, WorldResult};
use crate::world::grid::Grid;

/// Cell identifier
pub type GridId = usize;

/// A cell plus its up-to-8 adjacent cells
pub type Neighborhood = SmallVec<[GridId; 9]>;

// ============================================================================
// Region
// ============================================================================

/// Bounds of the AOI region and its cell counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AoiRegion {
    pub min_x: i32,
    pub max_x: i32,
    pub cnts_x: i32,
    pub min_y: i32,
    pub max_y: i32,
    pub cnts_y: i32,
}

impl AoiRegion {
    pub fn new(min_x: i32, max_x: i32, cnts_x: i32, min_y: i32, max_y: i32, cnts_y: i32) -> Self {
        Self { min_x, max_x, cnts_x, min_y, max_y, cnts_y }
    }

    /// Reject degenerate partitions
    pub fn validate(&self) -> WorldResult<()> {
        if self.cnts_x <= 0 || self.cnts_y <= 0 {
            return Err(WorldError::InvalidConfig(format!(
                "cell counts must be positive (cnts_x={}, cnts_y={})",
                self.cnts_x, self.cnts_y
            )));
        }
        if self.max_x <= self.min_x {
            return Err(WorldError::InvalidConfig(format!(
                "max_x ({}) must be greater than min_x ({})",
                self.max_x, self.min_x
            )));
        }
        if self.max_y <= self.min_y {
            return Err(WorldError::InvalidConfig(format!(
                "max_y ({}) must be greater than min_y ({})",
                self.max_y, self.min_y
            )));
        }
        if self.cell_width() == 0 || self.cell_length() == 0 {
            return Err(WorldError::InvalidConfig(format!(
                "region {}x{} is too small for {}x{} cells",
                self.max_x - self.min_x,
                self.max_y - self.min_y,
                self.cnts_x,
                self.cnts_y
            )));
        }
        Ok(())
    }

    /// Width of one cell along x (integer division, the remainder strip is not covered)
    #[inline]
    pub fn cell_width(&self) -> i32 {
        (self.max_x - self.min_x) / self.cnts_x
    }

    /// Length of one cell along y/z
    #[inline]
    pub fn cell_length(&self) -> i32 {
        (self.max_y - self.min_y) / self.cnts_y
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        (self.cnts_x as usize) * (self.cnts_y as usize)
    }

    /// Whether a ground-plane point lies inside the configured bounds (inclusive)
    pub fn contains(&self, x: f32, z: f32) -> bool {
        x >= self.min_x as f32 && x <= self.max_x as f32 && z >= self.min_y as f32 && z <= self.max_y as f32
    }
}

// ============================================================================
// AOI Manager
// ============================================================================

/// Fixed cell partition of the world region
pub struct AoiManager {
    region: AoiRegion,
    grids: Vec<Grid>,
}

impl AoiManager {
    /// Build the cell table. Fails fast on degenerate configurations.
    pub fn new(region: AoiRegion) -> WorldResult<Self> {
        region.validate()?;

        let width = region.cell_width();
        let length = region.cell_length();
        let mut grids = Vec::with_capacity(region.cell_count());

        for row in 0..region.cnts_y {
            for col in 0..region.cnts_x {
                let gid = (row * region.cnts_x + col) as GridId;
                grids.push(Grid::new(
                    gid,
                    region.min_x + col * width,
                    region.min_x + (col + 1) * width,
                    region.min_y + row * length,
                    region.min_y + (row + 1) * length,
                ));
            }
        }

        Ok(Self { region, grids })
    }

    #[inline]
    pub fn region(&self) -> &AoiRegion {
        &self.region
    }

    #[inline]
    pub fn grid_count(&self) -> usize {
        self.grids.len()
    }

    /// Look up a cell by id
    #[inline]
    pub fn grid(&self, gid: GridId) -> WorldResult<&Grid> {
        self.grids.get(gid).ok_or(WorldError::UnknownCell(gid))
    }

    pub fn grids(&self) -> impl Iterator<Item = &Grid> {
        self.grids.iter()
    }

    /// Unclamped (col, row) of a point; either may be negative or past the last cell
    #[inline]
    fn raw_cell(&self, x: f32, z: f32) -> (i64, i64) {
        let col = ((x - self.region.min_x as f32) / self.region.cell_width() as f32).floor() as i64;
        let row = ((z - self.region.min_y as f32) / self.region.cell_length() as f32).floor() as i64;
        (col, row)
    }

    /// Cell id for a ground-plane position
    ///
    /// Positions that fall outside the cell table (outside the region, or in the
    /// remainder strip left by integer division) yield `InvalidCoordinates`.
    pub fn grid_id_for(&self, x: f32, z: f32) -> WorldResult<GridId> {
        let (col, row) = self.raw_cell(x, z);
        let cols = self.region.cnts_x as i64;
        let rows = self.region.cnts_y as i64;
        if !(0..cols).contains(&col) || !(0..rows).contains(&row) {
            return Err(WorldError::InvalidCoordinates { x, z });
        }
        Ok((row * cols + col) as GridId)
    }

    /// Cell id for a position, clamped to the nearest existing cell
    ///
    /// Used by the entity lifecycle so an entity is always spatially indexed.
    pub fn clamped_grid_id_for(&self, x: f32, z: f32) -> GridId {
        let (col, row) = self.raw_cell(x, z);
        let cols = self.region.cnts_x as i64;
        let rows = self.region.cnts_y as i64;
        let col = col.clamp(0, cols - 1);
        let row = row.clamp(0, rows - 1);
        (row * cols + col) as GridId
    }

    /// The cell itself plus its adjacent cells
    ///
    /// Horizontal neighbors of `gid` are collected first, then the vertical
    /// neighbors of every cell selected so far, which yields the diagonals.
    /// Corner cells have 4 entries, edge cells 6, interior cells 9.
    pub fn neighborhood_of(&self, gid: GridId) -> WorldResult<Neighborhood> {
        if gid >= self.grids.len() {
            return Err(WorldError::UnknownCell(gid));
        }

        let cols = self.region.cnts_x as usize;
        let rows = self.region.cnts_y as usize;
        let mut cells = Neighborhood::new();
        cells.push(gid);

        let col = gid % cols;
        if col > 0 {
            cells.push(gid - 1);
        }
        if col < cols - 1 {
            cells.push(gid + 1);
        }

        let row_cells: SmallVec<[GridId; 3]> = cells.iter().copied().collect();
        for cell in row_cells {
            let row = cell / cols;
            if row > 0 {
                cells.push(cell - cols);
            }
            if row < rows - 1 {
                cells.push(cell + cols);
            }
        }

        Ok(cells)
    }

    /// Union of the member sets of every cell in `gid`'s neighborhood
    pub fn entity_ids_around(&self, gid: GridId) -> WorldResult<HashSet<EntityId>> {
        let mut ids = HashSet::new();
        for cell in self.neighborhood_of(gid)? {
            self.grids[cell].extend_members_into(&mut ids);
        }
        Ok(ids)
    }

    /// Every entity in the neighborhood of the cell containing (x, z)
    pub fn entity_ids_near(&self, x: f32, z: f32) -> WorldResult<HashSet<EntityId>> {
        let gid = self.grid_id_for(x, z)?;
        self.entity_ids_around(gid)
    }

    /// Members of a single cell
    pub fn entity_ids_in(&self, gid: GridId) -> WorldResult<HashSet<EntityId>> {
        Ok(self.grid(gid)?.members())
    }

    pub fn add_entity(&self, id: EntityId, gid: GridId) -> WorldResult<()> {
        self.grid(gid)?.add(id);
        Ok(())
    }

    pub fn remove_entity(&self, id: EntityId, gid: GridId) -> WorldResult<()> {
        self.grid(gid)?.remove(id);
        Ok(())
    }

    /// Move membership between two cells
    ///
    /// Both cells are resolved before anything is mutated. The remove and the
    /// add take each cell's lock separately, so concurrent readers may briefly
    /// see the entity in neither cell.
    pub fn move_entity(&self, id: EntityId, from: GridId, to: GridId) -> WorldResult<()> {
        let from_grid = self.grid(from)?;
        let to_grid = self.grid(to)?;
        from_grid.remove(id);
        to_grid.add(id);
        Ok(())
    }
}

impl fmt::Display for AoiManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.region;
        writeln!(
            f,
            "AOIManager:\nminX:{}, maxX:{}, cntsX:{}, minY:{}, maxY:{}, cntsY:{}\nGrids in AOI Manager:",
            r.min_x, r.max_x, r.cnts_x, r.min_y, r.max_y, r.cnts_y
        )?;
        for grid in &self.grids {
            writeln!(f, "{}", grid)?;
        }
        Ok(())
    }
}
