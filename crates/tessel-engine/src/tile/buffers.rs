use std::ops::Range;

use crate::render::tiles::{BufferSetId, TileGpu};

use super::error::{TileError, TileResult};
use super::geometry::TileAttrs;
use super::grid::TileGrid;

/// GPU mirror of one grid for one renderable.
///
/// Owns a backend buffer set: static vertex/index buffers plus four dynamic
/// attribute buffers holding one frame. `destroy` is idempotent; every other
/// operation on a destroyed set returns [`TileError::UseAfterDestroy`].
#[derive(Debug)]
pub struct BufferSet {
    id: Option<BufferSetId>,
    element_count: u32,
    layer_count: usize,
    frame: usize,
}

impl BufferSet {
    /// Allocates buffers for `grid` and uploads `frame`.
    pub fn create<G: TileGpu + ?Sized>(
        gpu: &mut G,
        grid: &TileGrid,
        frame: usize,
    ) -> TileResult<Self> {
        validate_source(grid)?;
        let frame = frame % grid.frame_count();
        let geometry = grid.geometry();

        let id = gpu.create_buffer_set(geometry, grid.frame_attributes(frame))?;
        log::debug!(
            "buffer set {id:?}: {} tiles, {} layers, frame {frame}",
            grid.tiles_per_layer(),
            grid.layer_count()
        );

        Ok(Self {
            id: Some(id),
            element_count: geometry.indices.len() as u32,
            layer_count: grid.layer_count(),
            frame,
        })
    }

    #[inline]
    pub fn id(&self) -> Option<BufferSetId> {
        self.id
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.id.is_some()
    }

    /// Total drawable elements across all layers.
    #[inline]
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    /// Frame currently mirrored in the attribute buffers.
    #[inline]
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Element range of one layer inside the shared index buffer.
    pub fn layer_elements(&self, layer: usize) -> Range<u32> {
        let per_layer = self.element_count / self.layer_count.max(1) as u32;
        let start = per_layer * layer as u32;
        start..start + per_layer
    }

    /// Re-uploads the attribute buffers named in `which` from `frame`.
    pub fn update_tile_attributes<G: TileGpu + ?Sized>(
        &mut self,
        gpu: &mut G,
        grid: &TileGrid,
        frame: usize,
        which: TileAttrs,
    ) -> TileResult<()> {
        let id = self.id.ok_or(TileError::UseAfterDestroy)?;
        if which.is_empty() {
            return Ok(());
        }
        validate_source(grid)?;
        let frame = frame % grid.frame_count();
        log::trace!("buffer set {id:?}: upload {which:?} from frame {frame}");
        gpu.upload_attributes(id, which, grid.frame_attributes(frame))?;
        self.frame = frame;
        Ok(())
    }

    /// Re-uploads geometry after a resize or layer change, then refreshes all
    /// attributes of `frame` so the set never mixes old and new layouts.
    pub fn update_geometry<G: TileGpu + ?Sized>(
        &mut self,
        gpu: &mut G,
        grid: &TileGrid,
        frame: usize,
    ) -> TileResult<()> {
        let id = self.id.ok_or(TileError::UseAfterDestroy)?;
        validate_source(grid)?;
        let geometry = grid.geometry();
        gpu.upload_geometry(id, geometry)?;
        self.element_count = geometry.indices.len() as u32;
        self.layer_count = grid.layer_count();
        log::debug!(
            "buffer set {id:?}: geometry now {} elements over {} layers",
            self.element_count,
            self.layer_count
        );
        self.update_tile_attributes(gpu, grid, frame, TileAttrs::all())
    }

    /// Releases every backend handle. Safe to call more than once.
    pub fn destroy<G: TileGpu + ?Sized>(&mut self, gpu: &mut G) {
        if let Some(id) = self.id.take() {
            log::debug!("buffer set {id:?}: released");
            gpu.release_buffer_set(id);
        }
    }
}

/// Rejects grids with nothing to draw.
pub fn validate_source(grid: &TileGrid) -> TileResult<()> {
    if grid.is_drawable() {
        Ok(())
    } else {
        Err(TileError::InvalidSource {
            frames: grid.frame_count(),
            layers: grid.layer_count(),
            width: grid.width(),
            height: grid.height(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tiles::{GpuCall, RecordingGpu};
    use crate::tile::Tile;

    #[test]
    fn create_uploads_requested_frame() {
        let mut gpu = RecordingGpu::new();
        let mut grid = TileGrid::new(2, 1, 3, 1);
        grid.set_tile(2, 0, 1, 0, Tile::new(42, 1, 0));

        let set = BufferSet::create(&mut gpu, &grid, 5).unwrap();
        assert_eq!(set.frame(), 2);
        assert_eq!(set.element_count(), 12);
        assert_eq!(gpu.chars(set.id().unwrap()), Some(&[0, 42][..]));
    }

    #[test]
    fn create_rejects_empty_grid() {
        let mut gpu = RecordingGpu::new();
        let grid = TileGrid::new(2, 2, 0, 1);
        let err = BufferSet::create(&mut gpu, &grid, 0).unwrap_err();
        assert!(matches!(err, TileError::InvalidSource { frames: 0, .. }));
        assert!(gpu.calls().is_empty());
    }

    #[test]
    fn attribute_update_forwards_only_requested_subset() {
        let mut gpu = RecordingGpu::new();
        let grid = TileGrid::new(2, 2, 1, 1);
        let mut set = BufferSet::create(&mut gpu, &grid, 0).unwrap();

        set.update_tile_attributes(&mut gpu, &grid, 0, TileAttrs::FG | TileAttrs::BG)
            .unwrap();
        set.update_tile_attributes(&mut gpu, &grid, 0, TileAttrs::empty())
            .unwrap();
        assert_eq!(gpu.attribute_uploads(), vec![TileAttrs::FG | TileAttrs::BG]);
    }

    #[test]
    fn layer_elements_partition_the_index_buffer() {
        let mut gpu = RecordingGpu::new();
        let grid = TileGrid::new(3, 2, 1, 3);
        let set = BufferSet::create(&mut gpu, &grid, 0).unwrap();
        assert_eq!(set.layer_elements(0), 0..36);
        assert_eq!(set.layer_elements(2), 72..108);
    }

    #[test]
    fn geometry_update_refreshes_counts_and_all_attributes() {
        let mut gpu = RecordingGpu::new();
        let mut grid = TileGrid::new(2, 2, 1, 1);
        let mut set = BufferSet::create(&mut gpu, &grid, 0).unwrap();

        grid.add_layer("top");
        set.update_geometry(&mut gpu, &grid, 0).unwrap();
        assert_eq!(set.element_count(), 2 * 2 * 2 * 6);
        assert_eq!(set.layer_elements(1), 24..48);
        assert_eq!(gpu.attribute_uploads(), vec![TileAttrs::all()]);
    }

    #[test]
    fn destroy_is_idempotent_and_blocks_further_use() {
        let mut gpu = RecordingGpu::new();
        let grid = TileGrid::new(1, 1, 1, 1);
        let mut set = BufferSet::create(&mut gpu, &grid, 0).unwrap();

        set.destroy(&mut gpu);
        set.destroy(&mut gpu);
        let releases = gpu
            .calls()
            .iter()
            .filter(|c| matches!(c, GpuCall::Release { .. }))
            .count();
        assert_eq!(releases, 1);
        assert_eq!(gpu.double_releases(), 0);
        assert_eq!(
            set.update_tile_attributes(&mut gpu, &grid, 0, TileAttrs::CHAR),
            Err(TileError::UseAfterDestroy)
        );
    }

    #[test]
    fn allocation_failure_is_surfaced() {
        let mut gpu = RecordingGpu::new();
        gpu.fail_allocations(true);
        let grid = TileGrid::new(1, 1, 1, 1);
        assert!(matches!(
            BufferSet::create(&mut gpu, &grid, 0),
            Err(TileError::Gpu(_))
        ));
    }
}
