use std::sync::Arc;

use crate::chip::Chip;
use crate::collection::{AlphabetKind, AlphabetStatisticsCollection};
use crate::constants::{BITS_PER_N_PIXELS, SPECIAL_LETTER};
use crate::errors::{CodecError, CodecResult};
use crate::huffman_tree::Letter;
use crate::layout::{MultiRegionLayout, RegionLayout};
use crate::package::{Package, PackageReader};
use crate::package_maker::PackageMaker;
use crate::pixel::{Adc, Ordering, Pixel};
use crate::statistics::AlphabetStatistics;

/// Combined (delta row, delta column) letter of `pixel` relative to
/// `previous`, expressed as a pixel id of `layout`. Deltas wrap modulo the
/// layout dimensions, so they are always non-negative.
pub(crate) fn delta_letter(layout: RegionLayout, pixel: Pixel, previous: Pixel) -> Letter {
  let delta_row =
    (pixel.row as usize + layout.n_rows - previous.row as usize) % layout.n_rows;
  let delta_column =
    (pixel.column as usize + layout.n_columns - previous.column as usize) % layout.n_columns;
  (delta_row * layout.n_columns + delta_column) as Letter
}

/// The `combined_delta_huffman` format.
///
/// Macro-regions contribute their pixels round-robin, one per pass, each
/// pixel as a Huffman-coded combined delta from the previous pixel of the
/// same macro-region followed by its Huffman-coded ADC. Deltas outside the
/// (possibly reduced) alphabet escape through the special letter plus the
/// raw pixel id. With more than one macro-region a trailer records the
/// per-macro-region pixel counts.
pub struct DeltaPackageMaker {
  readout_unit_layout: RegionLayout,
  ordering: Ordering,
  adc_statistics: Arc<AlphabetStatistics>,
  delta_statistics: Arc<AlphabetStatistics>,
}

impl DeltaPackageMaker {
  pub fn new(
    source: &AlphabetStatisticsCollection,
    readout_unit_layout: RegionLayout,
    ordering: Ordering,
  ) -> CodecResult<Self> {
    Ok(DeltaPackageMaker {
      readout_unit_layout,
      ordering,
      adc_statistics: source.get_kind(AlphabetKind::ActiveAdc)?,
      delta_statistics: source.get_kind(AlphabetKind::DeltaRowColumn)?,
    })
  }

  fn encode_pixel(
    &self,
    package: &mut Package,
    layout: RegionLayout,
    pixel: Pixel,
    previous_pixel: Pixel,
  ) -> CodecResult<()> {
    let letter = delta_letter(layout, pixel, previous_pixel);
    if self.delta_statistics.contains(letter) {
      self.delta_statistics.encode_letter(letter, package)
    } else {
      self.delta_statistics.encode_letter(SPECIAL_LETTER, package)?;
      package.write(layout.pixel_to_id(pixel)? as u64, layout.bits_per_id())
    }
  }

  fn decode_pixel(
    &self,
    reader: &mut PackageReader<'_>,
    layout: RegionLayout,
    previous_pixel: Pixel,
  ) -> CodecResult<Pixel> {
    let letter = self.delta_statistics.decode_letter(reader)?;
    if letter == SPECIAL_LETTER {
      let pixel_id = reader.read(layout.bits_per_id())? as usize;
      return layout.id_to_pixel(pixel_id);
    }
    let delta = layout.id_to_pixel(letter as usize)?;
    Ok(Pixel::new(
      ((previous_pixel.row as usize + delta.row as usize) % layout.n_rows) as i16,
      ((previous_pixel.column as usize + delta.column as usize) % layout.n_columns) as i16,
    ))
  }
}

impl PackageMaker for DeltaPackageMaker {
  fn format_name(&self) -> &'static str {
    "combined_delta_huffman"
  }

  fn make(&self, chip: &Chip) -> CodecResult<Package> {
    let multi_layout = chip.multi_region_layout();
    let layout = multi_layout.region_layout;
    let n_macro_regions = multi_layout.n_regions();

    let mut region_pixels = Vec::with_capacity(n_macro_regions);
    let mut max_size = 0;
    for macro_region_id in 0..n_macro_regions {
      let pixels = if chip.is_region_active(macro_region_id)? {
        let pixel_area =
          Chip::from_region_layout(chip.region(macro_region_id)?, self.readout_unit_layout)?;
        pixel_area.ordered_pixels(self.ordering)?
      } else {
        Vec::new()
      };
      max_size = max_size.max(pixels.len());
      region_pixels.push(pixels);
    }

    let mut package = Package::default();
    for n in 0..max_size {
      for pixels in &region_pixels {
        if n >= pixels.len() {
          continue;
        }
        let previous_pixel = if n == 0 { Pixel::default() } else { pixels[n - 1].0 };
        let (pixel, adc) = pixels[n];
        self.encode_pixel(&mut package, layout, pixel, previous_pixel)?;
        self.adc_statistics.encode_letter(adc as Letter, &mut package)?;
      }
      if (n + 1) % 2 == 0 || n + 1 == max_size {
        package.next_readout_cycle();
      }
    }

    if n_macro_regions > 1 {
      for pixels in &region_pixels {
        package.write(pixels.len() as u64, BITS_PER_N_PIXELS)?;
      }
      package.next_readout_cycle();
    }

    Ok(package)
  }

  fn read(&self, package: &Package, multi_layout: &MultiRegionLayout) -> CodecResult<Chip> {
    let mut chip = Chip::new(*multi_layout);
    let layout = multi_layout.region_layout;
    let n_macro_regions = multi_layout.n_regions();
    let mut previous_pixel = vec![Pixel::default(); n_macro_regions];

    let mut n_pixels = vec![usize::MAX; n_macro_regions];
    let mut max_n_pixels = usize::MAX;
    if n_macro_regions > 1 {
      let trailer_bits = BITS_PER_N_PIXELS * n_macro_regions;
      let trailer_start = package.size_bits().checked_sub(trailer_bits).ok_or_else(|| {
        CodecError::underflow_recipe("delta trailer", trailer_bits, 0, package.size_bits())
      })?;
      let mut trailer_reader = package.reader_at(trailer_start)?;
      max_n_pixels = 0;
      for count in n_pixels.iter_mut() {
        *count = trailer_reader.read(BITS_PER_N_PIXELS)? as usize;
        max_n_pixels = max_n_pixels.max(*count);
      }
    }

    let mut reader = package.reader();
    for n in 0..max_n_pixels {
      if reader.bits_remaining() == 0 {
        break;
      }
      for (k, &count) in n_pixels.iter().enumerate() {
        if count <= n {
          continue;
        }
        let region_pixel = self.decode_pixel(&mut reader, layout, previous_pixel[k])?;
        let adc = self.adc_statistics.decode_letter(&mut reader)? as Adc;
        let pixel = multi_layout.convert_from(k, region_pixel);
        chip.add_pixel(pixel, adc)?;
        previous_pixel[k] = region_pixel;
      }
    }

    Ok(chip)
  }
}
