use std::path::PathBuf;

use crate::block_package_maker::BlockPackageMaker;
use crate::chip::Chip;
use crate::collection::AlphabetStatisticsCollection;
use crate::delta_package_maker::DeltaPackageMaker;
use crate::errors::{CodecError, CodecResult};
use crate::layout::{bits_per_value, MultiRegionLayout, RegionLayout};
use crate::package::Package;
use crate::package_maker::{PackageMaker, SinglePixelPackageMaker};
use crate::pixel::Ordering;

/// The four wire formats a [`ChipDataEncoder`] can speak.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncoderFormat {
  SinglePixel,
  Region,
  RegionWithCompressedAdc,
  Delta,
}

/// All configuration for a [`ChipDataEncoder`].
///
/// The dictionary path is only consulted by the formats that Huffman-code
/// against trained alphabets (`RegionWithCompressedAdc` and `Delta`); the
/// readout cycle cadence only by `SinglePixel`.
#[derive(Clone, Debug)]
pub struct EncoderConfig {
  pub format: EncoderFormat,
  pub chip_layout: MultiRegionLayout,
  pub readout_unit_layout: RegionLayout,
  pub max_adc: usize,
  pub ordering: Ordering,
  pub dictionary_path: Option<PathBuf>,
  pub readout_cycle_cadence: Option<usize>,
}

impl EncoderConfig {
  pub fn new(
    format: EncoderFormat,
    chip_layout: MultiRegionLayout,
    readout_unit_layout: RegionLayout,
    max_adc: usize,
  ) -> Self {
    EncoderConfig {
      format,
      chip_layout,
      readout_unit_layout,
      max_adc,
      ordering: Ordering::ByRegionByColumn,
      dictionary_path: None,
      readout_cycle_cadence: None,
    }
  }

  pub fn with_ordering(mut self, ordering: Ordering) -> Self {
    self.ordering = ordering;
    self
  }

  pub fn with_dictionary_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.dictionary_path = Some(path.into());
    self
  }

  pub fn with_readout_cycle_cadence(mut self, cadence: usize) -> Self {
    self.readout_cycle_cadence = Some(cadence);
    self
  }
}

/// Facade that owns one package maker and drives chip encoding/decoding
/// through it.
///
/// Chips whose layout differs from the configured one are re-partitioned
/// before encoding; decoding always reconstructs against the configured
/// layout.
pub struct ChipDataEncoder {
  chip_layout: MultiRegionLayout,
  package_maker: Box<dyn PackageMaker>,
  statistics_source: Option<AlphabetStatisticsCollection>,
}

impl std::fmt::Debug for ChipDataEncoder {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ChipDataEncoder")
      .field("chip_layout", &self.chip_layout)
      .field("package_maker", &self.package_maker.format_name())
      .field("statistics_source", &self.statistics_source)
      .finish()
  }
}

impl ChipDataEncoder {
  pub fn from_config(config: EncoderConfig) -> CodecResult<Self> {
    let n_bits_per_adc = bits_per_value(config.max_adc);
    let mut statistics_source = None;

    let package_maker: Box<dyn PackageMaker> = match config.format {
      EncoderFormat::SinglePixel => {
        let mut maker = SinglePixelPackageMaker::new(n_bits_per_adc);
        if let Some(cadence) = config.readout_cycle_cadence {
          maker = maker.with_readout_cycle_cadence(cadence)?;
        }
        Box::new(maker)
      }
      EncoderFormat::Region => {
        Box::new(BlockPackageMaker::new_raw(config.readout_unit_layout, n_bits_per_adc))
      }
      EncoderFormat::RegionWithCompressedAdc | EncoderFormat::Delta => {
        let path = config.dictionary_path.as_ref().ok_or_else(|| {
          CodecError::unsupported_option(format!(
            "format {:?} requires a dictionary path",
            config.format,
          ))
        })?;
        let source = AlphabetStatisticsCollection::from_path(path)?;
        let maker: Box<dyn PackageMaker> = if config.format == EncoderFormat::RegionWithCompressedAdc {
          Box::new(BlockPackageMaker::new_encoded(
            &source,
            config.readout_unit_layout,
            n_bits_per_adc,
          )?)
        } else {
          Box::new(DeltaPackageMaker::new(
            &source,
            config.readout_unit_layout,
            config.ordering,
          )?)
        };
        statistics_source = Some(source);
        maker
      }
    };

    Ok(ChipDataEncoder {
      chip_layout: config.chip_layout,
      package_maker,
      statistics_source,
    })
  }

  pub fn chip_layout(&self) -> &MultiRegionLayout {
    &self.chip_layout
  }

  pub fn format_name(&self) -> &'static str {
    self.package_maker.format_name()
  }

  pub fn statistics_source(&self) -> Option<&AlphabetStatisticsCollection> {
    self.statistics_source.as_ref()
  }

  pub fn encode(&self, chip: &Chip) -> CodecResult<Package> {
    if chip.multi_region_layout() == &self.chip_layout {
      return self.package_maker.make(chip);
    }
    let split_chip = Chip::from_region_grid(
      chip.outer_region(),
      self.chip_layout.n_region_rows,
      self.chip_layout.n_region_columns,
    )?;
    self.package_maker.make(&split_chip)
  }

  pub fn decode(&self, package: &Package) -> CodecResult<Chip> {
    self.package_maker.read(package, &self.chip_layout)
  }
}
