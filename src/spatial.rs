use h3o::{CellIndex, LatLng, Resolution};
use tracing::debug;

use crate::config::GridKind;
use crate::error::PipelineError;
use crate::models::{CellIds, CellResolution};

const APPROX_PREFIX: &str = "approx";

/// A hierarchical grid. Only the fine cell is computed from the point;
/// coarser cells are always the fine cell's ancestors, because H3 children
/// do not tile their parent exactly.
pub trait CellGrid: Send + Sync {
    /// Fine-resolution cell id for an already validated coordinate.
    fn fine_cell(&self, latitude: f64, longitude: f64) -> Result<String, String>;

    fn ancestor(&self, cell_id: &str, resolution: CellResolution) -> Result<String, PipelineError>;

    fn is_approximate(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HexGrid;

fn h3_resolution(resolution: CellResolution) -> Result<Resolution, String> {
    Resolution::try_from(resolution.level()).map_err(|e| e.to_string())
}

impl CellGrid for HexGrid {
    fn fine_cell(&self, latitude: f64, longitude: f64) -> Result<String, String> {
        let point = LatLng::new(latitude, longitude).map_err(|e| e.to_string())?;
        Ok(point
            .to_cell(h3_resolution(CellResolution::Fine)?)
            .to_string())
    }

    fn ancestor(&self, cell_id: &str, resolution: CellResolution) -> Result<String, PipelineError> {
        let invalid = |reason: String| PipelineError::InvalidCellId {
            cell_id: cell_id.to_string(),
            reason,
        };
        let cell = cell_id
            .parse::<CellIndex>()
            .map_err(|e| invalid(e.to_string()))?;
        let target = h3_resolution(resolution).map_err(invalid)?;
        cell.parent(target)
            .map(|parent| parent.to_string())
            .ok_or_else(|| invalid(format!("no ancestor at {resolution} resolution")))
    }

    fn is_approximate(&self) -> bool {
        false
    }
}

/// Fixed lat/lon quantization with 2^5, 2^7 and 2^8 steps per degree.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproximateGrid;

impl ApproximateGrid {
    fn steps_per_degree(resolution: CellResolution) -> i64 {
        match resolution {
            CellResolution::Coarse => 1 << 5,
            CellResolution::Medium => 1 << 7,
            CellResolution::Fine => 1 << 8,
        }
    }

    fn resolution_for_level(level: u8) -> Option<CellResolution> {
        CellResolution::ALL
            .into_iter()
            .find(|resolution| resolution.level() == level)
    }

    fn quantize(latitude: f64, longitude: f64, resolution: CellResolution) -> String {
        let steps = Self::steps_per_degree(resolution) as f64;
        let lat_idx = (latitude * steps).floor() as i64;
        let lon_idx = (longitude * steps).floor() as i64;
        Self::format(resolution, lat_idx, lon_idx)
    }

    fn format(resolution: CellResolution, lat_idx: i64, lon_idx: i64) -> String {
        format!("{APPROX_PREFIX}:{}:{lat_idx}:{lon_idx}", resolution.level())
    }

    fn parse(cell_id: &str) -> Option<(CellResolution, i64, i64)> {
        let mut parts = cell_id.split(':');
        if parts.next()? != APPROX_PREFIX {
            return None;
        }
        let resolution = Self::resolution_for_level(parts.next()?.parse().ok()?)?;
        let lat_idx = parts.next()?.parse().ok()?;
        let lon_idx = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some((resolution, lat_idx, lon_idx))
    }
}

impl CellGrid for ApproximateGrid {
    fn fine_cell(&self, latitude: f64, longitude: f64) -> Result<String, String> {
        Ok(Self::quantize(latitude, longitude, CellResolution::Fine))
    }

    fn ancestor(&self, cell_id: &str, resolution: CellResolution) -> Result<String, PipelineError> {
        let (own, lat_idx, lon_idx) =
            Self::parse(cell_id).ok_or_else(|| PipelineError::InvalidCellId {
                cell_id: cell_id.to_string(),
                reason: "not an approximate grid id".to_string(),
            })?;
        if resolution > own {
            return Err(PipelineError::InvalidCellId {
                cell_id: cell_id.to_string(),
                reason: format!("no ancestor at {resolution} resolution"),
            });
        }
        let ratio = Self::steps_per_degree(own) / Self::steps_per_degree(resolution);
        Ok(Self::format(
            resolution,
            lat_idx.div_euclid(ratio),
            lon_idx.div_euclid(ratio),
        ))
    }

    fn is_approximate(&self) -> bool {
        true
    }
}

/// Cells for one coordinate. `fallback` holds the hex-grid failure that
/// forced the approximate grid, if any.
#[derive(Debug)]
pub struct IndexedCells {
    pub cells: CellIds,
    pub fallback: Option<PipelineError>,
}

pub struct SpatialIndexer {
    primary: Box<dyn CellGrid>,
    fallback: ApproximateGrid,
}

impl SpatialIndexer {
    pub fn new(kind: GridKind) -> Self {
        match kind {
            GridKind::Hex => Self::with_grid(Box::new(HexGrid)),
            GridKind::Approximate => Self::with_grid(Box::new(ApproximateGrid)),
        }
    }

    pub fn with_grid(primary: Box<dyn CellGrid>) -> Self {
        Self {
            primary,
            fallback: ApproximateGrid,
        }
    }

    pub fn validate(
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<(f64, f64), PipelineError> {
        match (latitude, longitude) {
            (Some(lat), Some(lon))
                if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) =>
            {
                Ok((lat, lon))
            }
            _ => Err(PipelineError::InvalidCoordinate {
                latitude,
                longitude,
            }),
        }
    }

    /// Cell id at one resolution, for ad-hoc lookups. Goes through `index`
    /// so it always agrees with the ancestors of the fine cell.
    pub fn cell_id(
        &self,
        latitude: Option<f64>,
        longitude: Option<f64>,
        resolution: CellResolution,
    ) -> Result<String, PipelineError> {
        Ok(self.index(latitude, longitude)?.cells.at(resolution).to_string())
    }

    pub fn index(
        &self,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<IndexedCells, PipelineError> {
        let (lat, lon) = Self::validate(latitude, longitude)?;

        match Self::cells_on(self.primary.as_ref(), lat, lon) {
            Ok(cells) => Ok(IndexedCells {
                cells,
                fallback: None,
            }),
            Err((resolution, reason)) => {
                debug!(lat, lon, %resolution, %reason, "hex grid failed, using approximate grid");
                let cells = Self::cells_on(&self.fallback, lat, lon).map_err(
                    |(resolution, reason)| PipelineError::SpatialFunctionUnavailable {
                        resolution,
                        reason,
                    },
                )?;
                Ok(IndexedCells {
                    cells,
                    fallback: Some(PipelineError::SpatialFunctionUnavailable { resolution, reason }),
                })
            }
        }
    }

    fn cells_on(
        grid: &dyn CellGrid,
        lat: f64,
        lon: f64,
    ) -> Result<CellIds, (CellResolution, String)> {
        let fine = grid
            .fine_cell(lat, lon)
            .map_err(|reason| (CellResolution::Fine, reason))?;
        let parent = |resolution: CellResolution| {
            grid.ancestor(&fine, resolution)
                .map_err(|err| (resolution, err.to_string()))
        };
        let medium = parent(CellResolution::Medium)?;
        let coarse = parent(CellResolution::Coarse)?;
        Ok(CellIds {
            coarse,
            medium,
            fine,
            approximate: grid.is_approximate(),
        })
    }

    pub fn ancestor(
        &self,
        cell_id: &str,
        resolution: CellResolution,
    ) -> Result<String, PipelineError> {
        if cell_id.starts_with(APPROX_PREFIX) {
            self.fallback.ancestor(cell_id, resolution)
        } else {
            self.primary.ancestor(cell_id, resolution)
        }
    }
}

impl Default for SpatialIndexer {
    fn default() -> Self {
        Self::new(GridKind::Hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GREENVILLE: (f64, f64) = (34.8526, -82.3940);

    struct BrokenGrid;

    impl CellGrid for BrokenGrid {
        fn fine_cell(&self, _: f64, _: f64) -> Result<String, String> {
            Err("primitive not available".to_string())
        }

        fn ancestor(&self, cell_id: &str, _: CellResolution) -> Result<String, PipelineError> {
            Err(PipelineError::InvalidCellId {
                cell_id: cell_id.to_string(),
                reason: "broken".to_string(),
            })
        }

        fn is_approximate(&self) -> bool {
            false
        }
    }

    #[test]
    fn greenville_fine_cell_nests_in_coarse_cell() {
        let indexer = SpatialIndexer::default();
        let indexed = indexer.index(Some(GREENVILLE.0), Some(GREENVILLE.1)).unwrap();
        let cells = indexed.cells;

        assert!(indexed.fallback.is_none());
        assert!(!cells.approximate);
        assert_eq!(
            indexer.ancestor(&cells.fine, CellResolution::Coarse).unwrap(),
            cells.coarse
        );
        assert_eq!(
            indexer.ancestor(&cells.medium, CellResolution::Coarse).unwrap(),
            cells.coarse
        );
        assert_eq!(
            indexer.ancestor(&cells.fine, CellResolution::Medium).unwrap(),
            cells.medium
        );
    }

    #[test]
    fn standalone_lookup_agrees_with_fine_cell_ancestors() {
        let indexer = SpatialIndexer::default();
        let fine = indexer
            .cell_id(Some(GREENVILLE.0), Some(GREENVILLE.1), CellResolution::Fine)
            .unwrap();
        for resolution in [CellResolution::Medium, CellResolution::Coarse] {
            let direct = indexer
                .cell_id(Some(GREENVILLE.0), Some(GREENVILLE.1), resolution)
                .unwrap();
            assert_eq!(indexer.ancestor(&fine, resolution).unwrap(), direct);
        }
    }

    #[test]
    fn cell_ids_are_h3_strings_at_expected_levels() {
        let indexer = SpatialIndexer::default();
        let coarse = indexer
            .cell_id(Some(GREENVILLE.0), Some(GREENVILLE.1), CellResolution::Coarse)
            .unwrap();
        let cell: CellIndex = coarse.parse().unwrap();
        assert_eq!(u8::from(cell.resolution()), 7);
        assert_eq!(coarse.len(), 15);

        let fine = indexer
            .cell_id(Some(GREENVILLE.0), Some(GREENVILLE.1), CellResolution::Fine)
            .unwrap();
        let cell: CellIndex = fine.parse().unwrap();
        assert_eq!(u8::from(cell.resolution()), 9);
    }

    #[test]
    fn identical_coordinates_map_to_identical_cells() {
        let indexer = SpatialIndexer::default();
        let a = indexer.index(Some(GREENVILLE.0), Some(GREENVILLE.1)).unwrap();
        let b = indexer.index(Some(GREENVILLE.0), Some(GREENVILLE.1)).unwrap();
        assert_eq!(a.cells, b.cells);
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let indexer = SpatialIndexer::default();
        for (lat, lon) in [
            (Some(91.0), Some(0.0)),
            (Some(0.0), Some(-180.5)),
            (None, Some(-82.0)),
            (Some(34.0), None),
            (Some(f64::NAN), Some(0.0)),
        ] {
            let err = indexer.index(lat, lon).unwrap_err();
            assert_eq!(err.code(), "INVALID_COORDINATE");
        }
    }

    #[test]
    fn failing_hex_primitive_falls_back_to_approximate_grid() {
        let indexer = SpatialIndexer::with_grid(Box::new(BrokenGrid));
        let indexed = indexer.index(Some(GREENVILLE.0), Some(GREENVILLE.1)).unwrap();

        assert!(indexed.cells.approximate);
        assert!(indexed.cells.coarse.starts_with("approx:7:"));
        match indexed.fallback {
            Some(PipelineError::SpatialFunctionUnavailable { resolution, .. }) => {
                assert_eq!(resolution, CellResolution::Fine)
            }
            other => panic!("expected fallback error, got {other:?}"),
        }
        assert_eq!(
            indexer.ancestor(&indexed.cells.fine, CellResolution::Coarse).unwrap(),
            indexed.cells.coarse
        );
    }

    #[test]
    fn approximate_grid_ids_encode_floor_indices() {
        let grid = ApproximateGrid;
        let fine = grid.fine_cell(34.8526, -82.3940).unwrap();
        assert_eq!(fine, "approx:9:8922:-21093");
        assert_eq!(
            grid.ancestor(&fine, CellResolution::Coarse).unwrap(),
            "approx:7:1115:-2637"
        );
        assert_eq!(
            ApproximateGrid::quantize(34.8526, -82.3940, CellResolution::Coarse),
            "approx:7:1115:-2637"
        );
        assert!(grid.ancestor("approx:7:1:1", CellResolution::Fine).is_err());
        assert!(grid.ancestor("approx:x:1:1", CellResolution::Coarse).is_err());
    }

    #[test]
    fn ancestor_rejects_garbage_ids() {
        let indexer = SpatialIndexer::default();
        let err = indexer.ancestor("not-a-cell", CellResolution::Coarse).unwrap_err();
        assert_eq!(err.code(), "INVALID_CELL_ID");
    }

    proptest! {
        #[test]
        fn hex_cells_nest_across_resolutions(lat in -89.9f64..89.9, lon in -179.9f64..179.9) {
            let indexer = SpatialIndexer::new(GridKind::Hex);
            let cells = indexer.index(Some(lat), Some(lon)).unwrap().cells;
            prop_assert_eq!(indexer.ancestor(&cells.fine, CellResolution::Coarse).unwrap(), cells.coarse.clone());
            prop_assert_eq!(indexer.ancestor(&cells.medium, CellResolution::Coarse).unwrap(), cells.coarse);
            prop_assert_eq!(indexer.ancestor(&cells.fine, CellResolution::Medium).unwrap(), cells.medium);
        }

        #[test]
        fn approximate_cells_nest_across_resolutions(lat in -90.0f64..=90.0, lon in -180.0f64..=180.0) {
            let indexer = SpatialIndexer::new(GridKind::Approximate);
            let cells = indexer.index(Some(lat), Some(lon)).unwrap().cells;
            prop_assert!(cells.approximate);
            prop_assert_eq!(indexer.ancestor(&cells.fine, CellResolution::Coarse).unwrap(), cells.coarse.clone());
            prop_assert_eq!(indexer.ancestor(&cells.fine, CellResolution::Medium).unwrap(), cells.medium.clone());
            prop_assert_eq!(indexer.ancestor(&cells.medium, CellResolution::Coarse).unwrap(), cells.coarse);
        }
    }
}
