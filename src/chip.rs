use std::collections::BTreeMap;

use crate::errors::{CodecError, CodecResult};
use crate::layout::{MultiRegionLayout, RegionLayout};
use crate::pixel::{Adc, Ordering, Pixel};

/// A rectangular tile holding a sparse pixel -> ADC mapping.
///
/// The map is keyed in row-major pixel order, which is the stable in-region
/// order every traversal and dictionary build relies on.
#[derive(Clone, Debug)]
pub struct PixelRegion {
  region_layout: RegionLayout,
  pixels: BTreeMap<Pixel, Adc>,
}

impl PixelRegion {
  pub fn new(region_layout: RegionLayout) -> Self {
    PixelRegion {
      region_layout,
      pixels: BTreeMap::new(),
    }
  }

  pub fn region_layout(&self) -> RegionLayout {
    self.region_layout
  }

  pub fn n_rows(&self) -> usize {
    self.region_layout.n_rows
  }

  pub fn n_columns(&self) -> usize {
    self.region_layout.n_columns
  }

  pub fn pixels(&self) -> &BTreeMap<Pixel, Adc> {
    &self.pixels
  }

  pub fn n_pixels(&self) -> usize {
    self.pixels.len()
  }

  pub fn has_active_pixels(&self) -> bool {
    !self.pixels.is_empty()
  }

  /// Returns the ADC of a cell, or 0 when the cell is inactive.
  pub fn adc(&self, pixel: Pixel) -> Adc {
    self.pixels.get(&pixel).copied().unwrap_or(0)
  }

  pub fn adc_at(&self, row: usize, column: usize) -> Adc {
    self.adc(Pixel::new(row as i16, column as i16))
  }

  pub fn add_pixel(&mut self, pixel: Pixel, adc: Adc) -> CodecResult<()> {
    self.region_layout.check_pixel(pixel)?;
    if self.pixels.contains_key(&pixel) {
      return Err(CodecError::duplicate_pixel(format!(
        "pixel {} is already present",
        pixel,
      )));
    }
    self.pixels.insert(pixel, adc);
    Ok(())
  }

  /// Returns (pixel, adc) pairs under `ByRow` or `ByColumn`; the
  /// region-level orderings only exist on a `Chip`.
  pub fn ordered_pixels(&self, ordering: Ordering) -> CodecResult<Vec<(Pixel, Adc)>> {
    let mut result = self.pixels.iter().map(|(&p, &a)| (p, a)).collect::<Vec<_>>();
    match ordering {
      Ordering::ByRow => (), // map order is already row-major
      Ordering::ByColumn => {
        result.sort_by_key(|&(p, _)| (p.column, p.row));
      }
      _ => {
        return Err(CodecError::unsupported_option(
          "region-level orderings are not supported on a plain pixel region",
        ));
      }
    }
    Ok(result)
  }

  pub fn has_same_pixels(&self, other: &PixelRegion) -> bool {
    self.pixels == other.pixels
  }
}

/// A chip: the full pixel plane plus its partition into macro-regions.
///
/// Sub-regions are allocated lazily; a slot stays `None` until its first
/// pixel arrives. Every pixel is stored twice: globally in the outer region
/// and locally in its sub-region (the mirror invariant), so both whole-plane
/// and per-region traversals are cheap.
#[derive(Clone, Debug)]
pub struct Chip {
  outer: PixelRegion,
  multi_region_layout: MultiRegionLayout,
  regions: Vec<Option<PixelRegion>>,
}

impl Chip {
  pub fn new(multi_region_layout: MultiRegionLayout) -> Self {
    let n_regions = multi_region_layout.n_regions();
    Chip {
      outer: PixelRegion::new(multi_region_layout.outer()),
      multi_region_layout,
      regions: if n_regions > 1 { vec![None; n_regions] } else { Vec::new() },
    }
  }

  /// Re-partitions existing pixel content into an
  /// `n_region_rows x n_region_columns` grid. The pixel set is preserved
  /// verbatim.
  pub fn from_region_grid(
    original: &PixelRegion,
    n_region_rows: usize,
    n_region_columns: usize,
  ) -> CodecResult<Self> {
    let layout = MultiRegionLayout::regrid(original.region_layout(), n_region_rows, n_region_columns)?;
    Self::from_region_and_layout(original, layout)
  }

  /// Re-partitions existing pixel content into tiles of `region_layout`.
  pub fn from_region_layout(original: &PixelRegion, region_layout: RegionLayout) -> CodecResult<Self> {
    let layout = MultiRegionLayout::with_region_layout(
      original.n_rows(),
      original.n_columns(),
      region_layout,
    )?;
    Self::from_region_and_layout(original, layout)
  }

  fn from_region_and_layout(original: &PixelRegion, layout: MultiRegionLayout) -> CodecResult<Self> {
    let mut chip = Chip::new(layout);
    chip.outer = original.clone();
    let entries = chip.outer.pixels().iter().map(|(&p, &a)| (p, a)).collect::<Vec<_>>();
    for (pixel, adc) in entries {
      chip.add_pixel_to_region(pixel, adc)?;
    }
    Ok(chip)
  }

  pub fn multi_region_layout(&self) -> &MultiRegionLayout {
    &self.multi_region_layout
  }

  pub fn outer_region(&self) -> &PixelRegion {
    &self.outer
  }

  pub fn pixels(&self) -> &BTreeMap<Pixel, Adc> {
    self.outer.pixels()
  }

  pub fn n_pixels(&self) -> usize {
    self.outer.n_pixels()
  }

  pub fn add_pixel(&mut self, pixel: Pixel, adc: Adc) -> CodecResult<()> {
    self.outer.add_pixel(pixel, adc)?;
    self.add_pixel_to_region(pixel, adc)
  }

  fn add_pixel_to_region(&mut self, pixel: Pixel, adc: Adc) -> CodecResult<()> {
    if self.multi_region_layout.n_regions() <= 1 {
      return Ok(());
    }
    let (region_id, region_pixel) = self.multi_region_layout.convert_to(pixel);
    let region_layout = self.multi_region_layout.region_layout;
    let region = self.regions[region_id].get_or_insert_with(|| PixelRegion::new(region_layout));
    region.add_pixel(region_pixel, adc)
  }

  fn check_region_id(&self, region_id: usize) -> CodecResult<()> {
    if region_id >= self.multi_region_layout.n_regions() {
      return Err(CodecError::pixel_out_of_range(format!(
        "invalid region id = {}",
        region_id,
      )));
    }
    Ok(())
  }

  pub fn is_region_active(&self, region_id: usize) -> CodecResult<bool> {
    self.check_region_id(region_id)?;
    if self.multi_region_layout.n_regions() == 1 {
      return Ok(self.outer.has_active_pixels());
    }
    Ok(self.regions[region_id].is_some())
  }

  /// Returns an active sub-region; with a single-region layout the chip
  /// itself is region 0.
  pub fn region(&self, region_id: usize) -> CodecResult<&PixelRegion> {
    if !self.is_region_active(region_id)? {
      return Err(CodecError::pixel_out_of_range(format!(
        "region {} is not active",
        region_id,
      )));
    }
    if self.multi_region_layout.n_regions() == 1 {
      return Ok(&self.outer);
    }
    Ok(self.regions[region_id].as_ref().unwrap())
  }

  /// Returns (pixel, adc) pairs in global coordinates under any of the four
  /// orderings. The region-level orderings walk regions in row-major or
  /// column-major grid order and emit each active region's pixels in its
  /// map order.
  pub fn ordered_pixels(&self, ordering: Ordering) -> CodecResult<Vec<(Pixel, Adc)>> {
    let by_row = match ordering {
      Ordering::ByRegionByRow => true,
      Ordering::ByRegionByColumn => false,
      _ => return self.outer.ordered_pixels(ordering),
    };

    let (n_outer, n_inner) = if by_row {
      (self.multi_region_layout.n_region_rows, self.multi_region_layout.n_region_columns)
    } else {
      (self.multi_region_layout.n_region_columns, self.multi_region_layout.n_region_rows)
    };

    let mut result = Vec::with_capacity(self.n_pixels());
    for n in 0..n_outer {
      for k in 0..n_inner {
        let region_id = if by_row {
          self.multi_region_layout.region_id(n, k)
        } else {
          self.multi_region_layout.region_id(k, n)
        };
        if !self.is_region_active(region_id)? {
          continue;
        }
        for (&region_pixel, &adc) in self.region(region_id)?.pixels() {
          let pixel = self.multi_region_layout.convert_from(region_id, region_pixel);
          result.push((pixel, adc));
        }
      }
    }
    Ok(result)
  }

  pub fn has_same_pixels(&self, other: &Chip) -> bool {
    self.outer.has_same_pixels(&other.outer)
  }
}

impl PartialEq for Chip {
  fn eq(&self, other: &Self) -> bool {
    self.has_same_pixels(other)
  }
}
