use crate::chip::Chip;
use crate::errors::{CodecError, CodecResult};
use crate::layout::MultiRegionLayout;
use crate::package::Package;

/// One wire format: a chip-to-package encoder and its inverse.
///
/// `make` serializes the chip it is given (already partitioned to the
/// configured layout by the encoder facade); `read` reconstructs a chip with
/// the provided layout. Round trips preserve the pixel set exactly.
pub trait PackageMaker {
  /// The wire-format label, e.g. `"default"` or `"block_encoded"`.
  fn format_name(&self) -> &'static str;

  fn make(&self, chip: &Chip) -> CodecResult<Package>;

  fn read(&self, package: &Package, layout: &MultiRegionLayout) -> CodecResult<Chip>;
}

/// The `default` format: every pixel as a (pixel id, ADC) pair.
///
/// A readout-cycle marker is emitted every `readout_cycle_cadence` pixels
/// and after the last one; the cadence defaults to the chip layout's region
/// count.
pub struct SinglePixelPackageMaker {
  n_bits_per_adc: usize,
  readout_cycle_cadence: Option<usize>,
}

impl SinglePixelPackageMaker {
  pub fn new(n_bits_per_adc: usize) -> Self {
    SinglePixelPackageMaker {
      n_bits_per_adc,
      readout_cycle_cadence: None,
    }
  }

  pub fn with_readout_cycle_cadence(mut self, cadence: usize) -> CodecResult<Self> {
    if cadence == 0 {
      return Err(CodecError::unsupported_option(
        "readout cycle cadence must be positive",
      ));
    }
    self.readout_cycle_cadence = Some(cadence);
    Ok(self)
  }
}

impl PackageMaker for SinglePixelPackageMaker {
  fn format_name(&self) -> &'static str {
    "default"
  }

  fn make(&self, chip: &Chip) -> CodecResult<Package> {
    let mut package = Package::default();
    let layout = chip.multi_region_layout();
    let n_bits_per_pixel_id = layout.bits_per_id();
    let cadence = self.readout_cycle_cadence.unwrap_or_else(|| layout.n_regions());

    let n_pixels = chip.n_pixels();
    for (n, (&pixel, &adc)) in chip.pixels().iter().enumerate() {
      let pixel_id = layout.outer().pixel_to_id(pixel)?;
      package.write(pixel_id as u64, n_bits_per_pixel_id)?;
      package.write(adc as u64, self.n_bits_per_adc)?;
      if (n + 1) % cadence == 0 || n + 1 == n_pixels {
        package.next_readout_cycle();
      }
    }
    Ok(package)
  }

  fn read(&self, package: &Package, layout: &MultiRegionLayout) -> CodecResult<Chip> {
    let n_bits_per_pixel_id = layout.bits_per_id();
    let mut chip = Chip::new(*layout);

    let mut reader = package.reader();
    while reader.bits_remaining() > 0 {
      let pixel_id = reader.read(n_bits_per_pixel_id)? as usize;
      let adc = reader.read(self.n_bits_per_adc)? as u16;
      let pixel = layout.outer().id_to_pixel(pixel_id)?;
      chip.add_pixel(pixel, adc)?;
    }
    Ok(chip)
  }
}

#[cfg(test)]
mod tests {
  use super::{PackageMaker, SinglePixelPackageMaker};
  use crate::chip::Chip;
  use crate::layout::{bits_per_value, MultiRegionLayout};
  use crate::pixel::Pixel;

  fn chip_layout() -> MultiRegionLayout {
    MultiRegionLayout::with_region_grid(400, 400, 1, 4).unwrap()
  }

  #[test]
  fn test_empty_chip_encodes_to_nothing() {
    let maker = SinglePixelPackageMaker::new(4);
    let chip = Chip::new(chip_layout());
    let package = maker.make(&chip).unwrap();
    assert_eq!(package.size_bits(), 0);
    assert!(package.readout_positions().is_empty());
    let decoded = maker.read(&package, &chip_layout()).unwrap();
    assert_eq!(decoded.n_pixels(), 0);
  }

  #[test]
  fn test_single_pixel_layout() {
    let maker = SinglePixelPackageMaker::new(bits_per_value(15));
    let mut chip = Chip::new(chip_layout());
    chip.add_pixel(Pixel::new(10, 20), 3).unwrap();

    let package = maker.make(&chip).unwrap();
    // 18 bits of pixel id followed by 4 bits of adc
    assert_eq!(package.size_bits(), 22);
    let mut reader = package.reader();
    assert_eq!(reader.read(18).unwrap(), 10 * 400 + 20);
    assert_eq!(reader.read(4).unwrap(), 3);

    let decoded = maker.read(&package, &chip_layout()).unwrap();
    assert!(decoded.has_same_pixels(&chip));
  }

  #[test]
  fn test_readout_cycle_cadence() {
    let maker = SinglePixelPackageMaker::new(4)
      .with_readout_cycle_cadence(2)
      .unwrap();
    let mut chip = Chip::new(chip_layout());
    for n in 0..5_i16 {
      chip.add_pixel(Pixel::new(n, n), 1).unwrap();
    }
    let package = maker.make(&chip).unwrap();
    // marker after pixels 2, 4 and the final 5th
    assert_eq!(package.readout_positions().len(), 3);
    assert!(SinglePixelPackageMaker::new(4)
      .with_readout_cycle_cadence(0)
      .is_err());
  }
}
