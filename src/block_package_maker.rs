use std::collections::VecDeque;
use std::sync::Arc;

use crate::chip::{Chip, PixelRegion};
use crate::collection::{AlphabetKind, AlphabetStatisticsCollection};
use crate::errors::{CodecError, CodecResult};
use crate::huffman_tree::Letter;
use crate::layout::{bits_per_value, MultiRegionLayout, RegionLayout};
use crate::package::{Package, PackageReader};
use crate::package_maker::PackageMaker;
use crate::pixel::{Adc, Pixel};
use crate::statistics::AlphabetStatistics;

/// The `block_raw` / `block_encoded` formats.
///
/// Each active macro-region is partitioned into readout units; active units
/// are drained round-robin, one per macro-region per readout cycle. A unit
/// is serialized as its full region id followed by all of its cells in
/// row-major order, ADC 0 standing for inactive cells. With ADC statistics
/// attached the cells are Huffman-coded against the `all_adc` alphabet,
/// otherwise written as raw fixed-width bits.
pub struct BlockPackageMaker {
  readout_unit_layout: RegionLayout,
  n_bits_per_adc: usize,
  adc_statistics: Option<Arc<AlphabetStatistics>>,
}

impl BlockPackageMaker {
  pub fn new_raw(readout_unit_layout: RegionLayout, n_bits_per_adc: usize) -> Self {
    BlockPackageMaker {
      readout_unit_layout,
      n_bits_per_adc,
      adc_statistics: None,
    }
  }

  pub fn new_encoded(
    source: &AlphabetStatisticsCollection,
    readout_unit_layout: RegionLayout,
    n_bits_per_adc: usize,
  ) -> CodecResult<Self> {
    Ok(BlockPackageMaker {
      readout_unit_layout,
      n_bits_per_adc,
      adc_statistics: Some(source.get_kind(AlphabetKind::Adc)?),
    })
  }

  pub(crate) fn full_region_id(macro_region_id: usize, region_id: usize, n_macro_regions: usize) -> usize {
    region_id * n_macro_regions + macro_region_id
  }

  pub(crate) fn split_full_region_id(full_region_id: usize, n_macro_regions: usize) -> (usize, usize) {
    let macro_region_id = full_region_id % n_macro_regions;
    (macro_region_id, (full_region_id - macro_region_id) / n_macro_regions)
  }

  fn write_cell(&self, adc: Adc, package: &mut Package) -> CodecResult<()> {
    match &self.adc_statistics {
      Some(statistics) => statistics.encode_letter(adc as Letter, package),
      None => package.write(adc as u64, self.n_bits_per_adc),
    }
  }

  fn read_cell(&self, reader: &mut PackageReader<'_>) -> CodecResult<Adc> {
    match &self.adc_statistics {
      Some(statistics) => Ok(statistics.decode_letter(reader)? as Adc),
      None => Ok(reader.read(self.n_bits_per_adc)? as Adc),
    }
  }
}

impl PackageMaker for BlockPackageMaker {
  fn format_name(&self) -> &'static str {
    if self.adc_statistics.is_some() {
      "block_encoded"
    } else {
      "block_raw"
    }
  }

  fn make(&self, chip: &Chip) -> CodecResult<Package> {
    let multi_layout = chip.multi_region_layout();
    let n_macro_regions = multi_layout.n_regions();
    let mut n_regions = 0;
    let mut macro_queues: Vec<(usize, VecDeque<(usize, PixelRegion)>)> = Vec::new();

    for macro_region_id in 0..n_macro_regions {
      if !chip.is_region_active(macro_region_id)? {
        continue;
      }
      let pixel_area = Chip::from_region_layout(chip.region(macro_region_id)?, self.readout_unit_layout)?;
      n_regions = pixel_area.multi_region_layout().n_regions();
      let mut active_regions = VecDeque::new();
      for region_id in 0..n_regions {
        if pixel_area.is_region_active(region_id)? {
          active_regions.push_back((region_id, pixel_area.region(region_id)?.clone()));
        }
      }
      if !active_regions.is_empty() {
        macro_queues.push((macro_region_id, active_regions));
      }
    }

    let n_bits_per_address = bits_per_value(n_regions * n_macro_regions);

    let mut package = Package::default();
    while !macro_queues.is_empty() {
      for (macro_region_id, queue) in &mut macro_queues {
        let (region_id, region) = queue.pop_front().unwrap();
        let full_region_id = Self::full_region_id(*macro_region_id, region_id, n_macro_regions);
        package.write(full_region_id as u64, n_bits_per_address)?;

        for row in 0..self.readout_unit_layout.n_rows {
          for column in 0..self.readout_unit_layout.n_columns {
            self.write_cell(region.adc_at(row, column), &mut package)?;
          }
        }
      }
      macro_queues.retain(|(_, queue)| !queue.is_empty());
      package.next_readout_cycle();
    }

    Ok(package)
  }

  fn read(&self, package: &Package, multi_layout: &MultiRegionLayout) -> CodecResult<Chip> {
    let mut chip = Chip::new(*multi_layout);
    let n_macro_regions = multi_layout.n_regions();
    let sub_layout = MultiRegionLayout::with_region_layout(
      multi_layout.region_layout.n_rows,
      multi_layout.region_layout.n_columns,
      self.readout_unit_layout,
    )?;
    let n_regions = sub_layout.n_regions();
    let n_bits_per_address = bits_per_value(n_regions * n_macro_regions);

    let mut reader = package.reader();
    while reader.bits_remaining() > 0 {
      let full_region_id = reader.read(n_bits_per_address)? as usize;
      let (macro_region_id, region_id) = Self::split_full_region_id(full_region_id, n_macro_regions);
      if region_id >= n_regions {
        return Err(CodecError::pixel_out_of_range(format!(
          "full region id = {} addresses readout region {} out of {}",
          full_region_id, region_id, n_regions,
        )));
      }

      for row in 0..self.readout_unit_layout.n_rows {
        for column in 0..self.readout_unit_layout.n_columns {
          let adc = self.read_cell(&mut reader)?;
          if adc != 0 {
            let readout_pixel = Pixel::new(row as i16, column as i16);
            let macro_region_pixel = sub_layout.convert_from(region_id, readout_pixel);
            let chip_pixel = multi_layout.convert_from(macro_region_id, macro_region_pixel);
            chip.add_pixel(chip_pixel, adc)?;
          }
        }
      }
    }
    Ok(chip)
  }
}

#[cfg(test)]
mod tests {
  use super::BlockPackageMaker;
  use crate::chip::Chip;
  use crate::layout::{MultiRegionLayout, RegionLayout};
  use crate::package_maker::PackageMaker;
  use crate::pixel::Pixel;

  fn chip_layout() -> MultiRegionLayout {
    MultiRegionLayout::with_region_grid(400, 400, 1, 4).unwrap()
  }

  fn readout_unit() -> RegionLayout {
    RegionLayout::new(2, 2).unwrap()
  }

  #[test]
  fn test_full_region_id_split() {
    for macro_region_id in 0..4 {
      for region_id in 0..100 {
        let full = BlockPackageMaker::full_region_id(macro_region_id, region_id, 4);
        assert_eq!(
          BlockPackageMaker::split_full_region_id(full, 4),
          (macro_region_id, region_id),
        );
      }
    }
  }

  #[test]
  fn test_empty_chip() {
    let maker = BlockPackageMaker::new_raw(readout_unit(), 4);
    let package = maker.make(&Chip::new(chip_layout())).unwrap();
    assert_eq!(package.size_bits(), 0);
    let decoded = maker.read(&package, &chip_layout()).unwrap();
    assert_eq!(decoded.n_pixels(), 0);
  }

  #[test]
  fn test_one_readout_unit_cells() {
    let maker = BlockPackageMaker::new_raw(readout_unit(), 4);
    let mut chip = Chip::new(chip_layout());
    chip.add_pixel(Pixel::new(0, 0), 1).unwrap();
    chip.add_pixel(Pixel::new(0, 1), 2).unwrap();

    let package = maker.make(&chip).unwrap();
    // address of 10000 * 4 readout regions, then four 4-bit cells
    assert_eq!(package.size_bits(), 16 + 4 * 4);
    let mut reader = package.reader();
    assert_eq!(reader.read(16).unwrap(), 0);
    assert_eq!(reader.read(4).unwrap(), 1);
    assert_eq!(reader.read(4).unwrap(), 2);
    assert_eq!(reader.read(4).unwrap(), 0);
    assert_eq!(reader.read(4).unwrap(), 0);

    let decoded = maker.read(&package, &chip_layout()).unwrap();
    assert!(decoded.has_same_pixels(&chip));
  }

  #[test]
  fn test_round_robin_across_macro_regions() {
    let maker = BlockPackageMaker::new_raw(readout_unit(), 4);
    let mut chip = Chip::new(chip_layout());
    // two readout units in macro-region 0, one in macro-region 2
    chip.add_pixel(Pixel::new(0, 0), 1).unwrap();
    chip.add_pixel(Pixel::new(4, 4), 2).unwrap();
    chip.add_pixel(Pixel::new(0, 200), 3).unwrap();

    let package = maker.make(&chip).unwrap();
    // 3 units, 32 bits each; 2 readout cycles (second pass only macro 0)
    assert_eq!(package.size_bits(), 3 * 32);
    assert_eq!(package.readout_positions(), &[64, 96]);

    let decoded = maker.read(&package, &chip_layout()).unwrap();
    assert!(decoded.has_same_pixels(&chip));
  }
}
