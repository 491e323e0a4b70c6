use crate::errors::{CodecError, CodecResult};
use crate::pixel::{Coordinate, Pixel};

/// Returns the number of bits needed to address `max_value` distinct values;
/// 0 and 1 need no bits at all.
pub fn bits_per_value(max_value: usize) -> usize {
  if max_value <= 1 {
    0
  } else {
    (max_value as f64).log2().ceil() as usize
  }
}

/// Dimensions of a rectangular pixel tile.
///
/// A pixel's id within the tile is `row * n_columns + column`; the derived
/// bit widths are what the wire formats use to serialize ids and
/// coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionLayout {
  pub n_rows: usize,
  pub n_columns: usize,
}

impl RegionLayout {
  pub fn new(n_rows: usize, n_columns: usize) -> CodecResult<Self> {
    if n_rows == 0 || n_columns == 0 {
      return Err(CodecError::invalid_geometry(format!(
        "invalid region dimensions {}x{}",
        n_rows, n_columns,
      )));
    }
    Ok(RegionLayout { n_rows, n_columns })
  }

  pub fn n_pixels(&self) -> usize {
    self.n_rows * self.n_columns
  }

  pub fn is_inside(&self, pixel: Pixel) -> bool {
    pixel.row >= 0
      && (pixel.row as usize) < self.n_rows
      && pixel.column >= 0
      && (pixel.column as usize) < self.n_columns
  }

  pub fn check_pixel(&self, pixel: Pixel) -> CodecResult<()> {
    if pixel.row < 0 || (pixel.row as usize) >= self.n_rows {
      return Err(CodecError::pixel_out_of_range(format!(
        "pixel row = {} is outside of the region interval [0, {}]",
        pixel.row,
        self.n_rows - 1,
      )));
    }
    if pixel.column < 0 || (pixel.column as usize) >= self.n_columns {
      return Err(CodecError::pixel_out_of_range(format!(
        "pixel column = {} is outside of the region interval [0, {}]",
        pixel.column,
        self.n_columns - 1,
      )));
    }
    Ok(())
  }

  pub fn pixel_to_id(&self, pixel: Pixel) -> CodecResult<usize> {
    self.check_pixel(pixel)?;
    Ok(pixel.row as usize * self.n_columns + pixel.column as usize)
  }

  pub fn id_to_pixel(&self, pixel_id: usize) -> CodecResult<Pixel> {
    let column = pixel_id % self.n_columns;
    let row = (pixel_id - column) / self.n_columns;
    let pixel = Pixel::new(row as Coordinate, column as Coordinate);
    self.check_pixel(pixel)?;
    Ok(pixel)
  }

  pub fn bits_per_row(&self) -> usize {
    bits_per_value(self.n_rows)
  }

  pub fn bits_per_column(&self) -> usize {
    bits_per_value(self.n_columns)
  }

  pub fn bits_per_id(&self) -> usize {
    bits_per_value(self.n_pixels())
  }
}

/// An outer tile subdivided into a grid of region tiles.
///
/// The grid uses ceiling division, so the last row and column of regions may
/// be clipped; `actual_region_layout` reports the true size of any region.
#[derive(Clone, Copy, Debug)]
pub struct MultiRegionLayout {
  outer: RegionLayout,
  pub region_layout: RegionLayout,
  pub n_region_rows: usize,
  pub n_region_columns: usize,
  pub n_last_region_rows: usize,
  pub n_last_region_columns: usize,
}

fn ceil_div(x: usize, divisor: usize) -> usize {
  (x + divisor - 1) / divisor
}

impl MultiRegionLayout {
  /// Subdivides an `n_rows x n_columns` plane into tiles of `region_layout`.
  pub fn with_region_layout(n_rows: usize, n_columns: usize, region_layout: RegionLayout) -> CodecResult<Self> {
    let outer = RegionLayout::new(n_rows, n_columns)?;
    let n_region_rows = ceil_div(n_rows, region_layout.n_rows);
    let n_region_columns = ceil_div(n_columns, region_layout.n_columns);
    if n_region_rows == 0 || n_region_columns == 0 {
      return Err(CodecError::invalid_geometry("invalid multi-region layout"));
    }
    Ok(MultiRegionLayout {
      outer,
      region_layout,
      n_region_rows,
      n_region_columns,
      n_last_region_rows: n_rows - (n_region_rows - 1) * region_layout.n_rows,
      n_last_region_columns: n_columns - (n_region_columns - 1) * region_layout.n_columns,
    })
  }

  /// Subdivides an `n_rows x n_columns` plane into (at most)
  /// `n_region_rows x n_region_columns` regions of equal canonical size.
  pub fn with_region_grid(
    n_rows: usize,
    n_columns: usize,
    n_region_rows: usize,
    n_region_columns: usize,
  ) -> CodecResult<Self> {
    if n_region_rows == 0 || n_region_columns == 0 {
      return Err(CodecError::invalid_geometry("invalid multi-region layout"));
    }
    let region_layout = RegionLayout::new(
      ceil_div(n_rows, n_region_rows),
      ceil_div(n_columns, n_region_columns),
    )?;
    Self::with_region_layout(n_rows, n_columns, region_layout)
  }

  /// A trivial layout where the single region spans the whole plane.
  pub fn single(n_rows: usize, n_columns: usize) -> CodecResult<Self> {
    Self::with_region_layout(n_rows, n_columns, RegionLayout::new(n_rows, n_columns)?)
  }

  /// Re-grids an existing plane into a different region grid.
  pub fn regrid(outer: RegionLayout, n_region_rows: usize, n_region_columns: usize) -> CodecResult<Self> {
    Self::with_region_grid(outer.n_rows, outer.n_columns, n_region_rows, n_region_columns)
  }

  pub fn outer(&self) -> RegionLayout {
    self.outer
  }

  pub fn n_rows(&self) -> usize {
    self.outer.n_rows
  }

  pub fn n_columns(&self) -> usize {
    self.outer.n_columns
  }

  pub fn n_pixels(&self) -> usize {
    self.outer.n_pixels()
  }

  pub fn bits_per_id(&self) -> usize {
    self.outer.bits_per_id()
  }

  pub fn n_regions(&self) -> usize {
    self.n_region_rows * self.n_region_columns
  }

  pub fn region_id(&self, region_row_idx: usize, region_column_idx: usize) -> usize {
    region_row_idx * self.n_region_columns + region_column_idx
  }

  /// Maps a plane pixel to its (region id, region-local pixel) pair.
  /// The pixel is assumed to lie inside the outer layout.
  pub fn convert_to(&self, pixel: Pixel) -> (usize, Pixel) {
    let region_row_idx = pixel.row as usize / self.region_layout.n_rows;
    let region_column_idx = pixel.column as usize / self.region_layout.n_columns;
    let region_pixel = Pixel::new(
      (pixel.row as usize % self.region_layout.n_rows) as Coordinate,
      (pixel.column as usize % self.region_layout.n_columns) as Coordinate,
    );
    (self.region_id(region_row_idx, region_column_idx), region_pixel)
  }

  /// Inverse of `convert_to`.
  pub fn convert_from(&self, region_id: usize, region_pixel: Pixel) -> Pixel {
    let region_column_idx = region_id % self.n_region_columns;
    let region_row_idx = (region_id - region_column_idx) / self.n_region_columns;
    Pixel::new(
      (region_row_idx * self.region_layout.n_rows + region_pixel.row as usize) as Coordinate,
      (region_column_idx * self.region_layout.n_columns + region_pixel.column as usize) as Coordinate,
    )
  }

  /// The true tile size of a region, clipped for the last row/column.
  pub fn actual_region_layout(&self, region_id: usize) -> RegionLayout {
    let region_column_idx = region_id % self.n_region_columns;
    let region_row_idx = (region_id - region_column_idx) / self.n_region_columns;
    let n_rows = if region_row_idx + 1 == self.n_region_rows {
      self.n_last_region_rows
    } else {
      self.region_layout.n_rows
    };
    let n_columns = if region_column_idx + 1 == self.n_region_columns {
      self.n_last_region_columns
    } else {
      self.region_layout.n_columns
    };
    RegionLayout { n_rows, n_columns }
  }

  pub fn is_region_complete(&self, region_id: usize) -> bool {
    self.actual_region_layout(region_id) == self.region_layout
  }
}

// Two multi-region layouts agree when they partition their planes the same
// way; the outer dimensions follow from the grid and are not compared.
impl PartialEq for MultiRegionLayout {
  fn eq(&self, other: &Self) -> bool {
    self.region_layout == other.region_layout
      && self.n_region_rows == other.n_region_rows
      && self.n_region_columns == other.n_region_columns
  }
}

impl Eq for MultiRegionLayout {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_bits_per_value() {
    assert_eq!(bits_per_value(0), 0);
    assert_eq!(bits_per_value(1), 0);
    assert_eq!(bits_per_value(2), 1);
    assert_eq!(bits_per_value(15), 4);
    assert_eq!(bits_per_value(16), 4);
    assert_eq!(bits_per_value(17), 5);
    assert_eq!(bits_per_value(160000), 18);
  }

  #[test]
  fn test_derived_bit_widths() {
    let layout = RegionLayout::new(400, 100).unwrap();
    assert_eq!(layout.bits_per_row(), 9);
    assert_eq!(layout.bits_per_column(), 7);
    assert_eq!(layout.bits_per_id(), 16);
  }

  #[test]
  fn test_pixel_id_bijection() {
    let layout = RegionLayout::new(7, 5).unwrap();
    for id in 0..layout.n_pixels() {
      let pixel = layout.id_to_pixel(id).unwrap();
      assert_eq!(layout.pixel_to_id(pixel).unwrap(), id);
    }
    assert!(layout.id_to_pixel(35).is_err());
    assert!(layout.pixel_to_id(Pixel::new(7, 0)).is_err());
    assert!(layout.pixel_to_id(Pixel::new(-1, 0)).is_err());
    assert!(layout.is_inside(Pixel::new(6, 4)));
    assert!(!layout.is_inside(Pixel::new(6, 5)));
    assert!(!layout.is_inside(Pixel::new(-1, 0)));
  }

  #[test]
  fn test_zero_dimension_rejected() {
    assert!(RegionLayout::new(0, 4).is_err());
    assert!(RegionLayout::new(4, 0).is_err());
  }

  #[test]
  fn test_multi_region_bijection() {
    let layout = MultiRegionLayout::with_region_grid(400, 400, 1, 4).unwrap();
    assert_eq!(layout.region_layout, RegionLayout { n_rows: 400, n_columns: 100 });
    assert_eq!(layout.n_regions(), 4);
    for &(r, c) in &[(0, 0), (10, 20), (200, 199), (399, 399), (0, 100), (399, 0)] {
      let pixel = Pixel::new(r, c);
      let (region_id, region_pixel) = layout.convert_to(pixel);
      assert_eq!(layout.convert_from(region_id, region_pixel), pixel);
    }
  }

  #[test]
  fn test_clipped_last_regions() {
    // 10x10 in 3x3 tiles: last row/column of regions is 1 wide
    let layout = MultiRegionLayout::with_region_layout(10, 10, RegionLayout::new(3, 3).unwrap()).unwrap();
    assert_eq!(layout.n_region_rows, 4);
    assert_eq!(layout.n_region_columns, 4);
    assert_eq!(layout.n_last_region_rows, 1);
    assert_eq!(layout.n_last_region_columns, 1);
    assert!(layout.is_region_complete(0));
    assert_eq!(
      layout.actual_region_layout(3),
      RegionLayout { n_rows: 3, n_columns: 1 },
    );
    assert_eq!(
      layout.actual_region_layout(15),
      RegionLayout { n_rows: 1, n_columns: 1 },
    );
    assert!(!layout.is_region_complete(15));
  }

  #[test]
  fn test_regrid_recomputes_grid() {
    // 10 rows in 3 region rows: tiles of 4 rows, so only 3 region rows fit
    let layout = MultiRegionLayout::with_region_grid(10, 10, 3, 3).unwrap();
    assert_eq!(layout.region_layout, RegionLayout { n_rows: 4, n_columns: 4 });
    assert_eq!(layout.n_region_rows, 3);
    assert_eq!(layout.n_region_columns, 3);
    assert_eq!(layout.n_last_region_rows, 2);
  }
}
