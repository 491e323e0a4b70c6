use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::chip::Chip;
use crate::constants::SPECIAL_LETTER;
use crate::delta_package_maker::delta_letter;
use crate::errors::{CodecError, CodecResult};
use crate::huffman_tree::Letter;
use crate::layout::{MultiRegionLayout, RegionLayout};
use crate::pixel::{Adc, Ordering, Pixel};
use crate::producer::AlphabetStatisticsProducer;

/// Trains the three codec alphabets over a corpus of chips and persists
/// them as one dictionary file.
///
/// `all_adc` sees every readout-unit cell (inactive cells count as 0),
/// `active_adc` only real pixels, and `delta_row_column` the combined delta
/// letters of the configured traversal. Only `delta_row_column` is reduced
/// on save, with the special letter carrying the dropped mass.
pub struct DictionaryBuilder {
  chip_layout: MultiRegionLayout,
  ordering: Ordering,
  readout_unit_layout: RegionLayout,
  max_alphabet_size: usize,
  all_adc: AlphabetStatisticsProducer,
  active_adc: AlphabetStatisticsProducer,
  delta_row_column: AlphabetStatisticsProducer,
  save_lock: Mutex<()>,
}

impl DictionaryBuilder {
  pub fn new(
    chip_layout: MultiRegionLayout,
    ordering: Ordering,
    readout_unit_layout: RegionLayout,
    max_adc: usize,
    max_alphabet_size: usize,
  ) -> Self {
    DictionaryBuilder {
      chip_layout,
      ordering,
      readout_unit_layout,
      max_alphabet_size,
      all_adc: AlphabetStatisticsProducer::with_alphabet("all_adc", 0..max_adc as Letter),
      active_adc: AlphabetStatisticsProducer::with_alphabet("active_adc", 1..max_adc as Letter),
      delta_row_column: AlphabetStatisticsProducer::with_alphabet(
        "delta_row_column",
        0..chip_layout.region_layout.n_pixels() as Letter,
      ),
      save_lock: Mutex::new(()),
    }
  }

  /// Feeds one chip into the three producers, re-partitioning it first if
  /// its layout differs from the configured one.
  pub fn add_chip(&self, chip: &Chip) -> CodecResult<()> {
    let split_chip;
    let chip = if chip.multi_region_layout() == &self.chip_layout {
      chip
    } else {
      split_chip = Chip::from_region_grid(
        chip.outer_region(),
        self.chip_layout.n_region_rows,
        self.chip_layout.n_region_columns,
      )?;
      &split_chip
    };

    for macro_region_id in 0..self.chip_layout.n_regions() {
      if !chip.is_region_active(macro_region_id)? {
        continue;
      }
      let pixel_area =
        Chip::from_region_layout(chip.region(macro_region_id)?, self.readout_unit_layout)?;
      let ordered_pixels = pixel_area.ordered_pixels(self.ordering)?;
      self.process_ordered_pixels(&ordered_pixels);
      self.process_region_blocks(&pixel_area)?;
    }
    Ok(())
  }

  fn process_ordered_pixels(&self, ordered_pixels: &[(Pixel, Adc)]) {
    let layout = self.chip_layout.region_layout;
    let mut previous_pixel = Pixel::default();
    for &(pixel, adc) in ordered_pixels {
      self.active_adc.add_count(adc as Letter);
      self
        .delta_row_column
        .add_count(delta_letter(layout, pixel, previous_pixel));
      previous_pixel = pixel;
    }
  }

  fn process_region_blocks(&self, pixel_area: &Chip) -> CodecResult<()> {
    for region_id in 0..pixel_area.multi_region_layout().n_regions() {
      if !pixel_area.is_region_active(region_id)? {
        continue;
      }
      let region = pixel_area.region(region_id)?;
      let layout = region.region_layout();
      for row in 0..layout.n_rows {
        for column in 0..layout.n_columns {
          self.all_adc.add_count(region.adc_at(row, column) as Letter);
        }
      }
    }
    Ok(())
  }

  /// Writes the three alphabet blocks, in training order, to `path`.
  pub fn save_dictionaries(&self, path: impl AsRef<Path>) -> CodecResult<()> {
    let _guard = self.save_lock.lock().unwrap();
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| {
      CodecError::dictionary_parse(format!(
        "error while saving dictionaries into '{}': {}",
        path.display(),
        e,
      ))
    })?;
    let mut writer = BufWriter::new(file);
    self.save_statistics(&self.all_adc, &mut writer, false)?;
    self.save_statistics(&self.active_adc, &mut writer, false)?;
    self.save_statistics(&self.delta_row_column, &mut writer, true)?;
    writer.flush().map_err(|e| {
      CodecError::dictionary_parse(format!(
        "error while saving dictionaries into '{}': {}",
        path.display(),
        e,
      ))
    })
  }

  fn save_statistics<W: Write>(
    &self,
    producer: &AlphabetStatisticsProducer,
    os: &mut W,
    reduce: bool,
  ) -> CodecResult<()> {
    let statistics = if reduce && producer.n_letters() > self.max_alphabet_size {
      producer
        .reduce(self.max_alphabet_size, producer.name(), SPECIAL_LETTER)?
        .produce()?
    } else {
      producer.produce()?
    };
    statistics.write_to(os)?;
    // blank line between blocks
    writeln!(os).map_err(|e| {
      CodecError::dictionary_parse(format!("error while writing dictionary block: {}", e))
    })
  }
}

#[cfg(test)]
mod tests {
  use std::io::BufReader;

  use super::DictionaryBuilder;
  use crate::chip::Chip;
  use crate::collection::{AlphabetKind, AlphabetStatisticsCollection};
  use crate::constants::SPECIAL_LETTER;
  use crate::layout::{MultiRegionLayout, RegionLayout};
  use crate::pixel::{Ordering, Pixel};

  fn builder() -> DictionaryBuilder {
    DictionaryBuilder::new(
      MultiRegionLayout::with_region_grid(8, 8, 1, 2).unwrap(),
      Ordering::ByRegionByColumn,
      RegionLayout::new(2, 2).unwrap(),
      15,
      8,
    )
  }

  #[test]
  fn test_training_counts() {
    let builder = builder();
    let mut chip = Chip::new(MultiRegionLayout::with_region_grid(8, 8, 1, 2).unwrap());
    chip.add_pixel(Pixel::new(0, 0), 3).unwrap();
    chip.add_pixel(Pixel::new(0, 1), 5).unwrap();
    builder.add_chip(&chip).unwrap();

    // one active 2x2 readout unit contributes 4 cells to all_adc
    assert_eq!(builder.all_adc.n_counts(), 4);
    assert_eq!(builder.active_adc.n_counts(), 2);
    assert_eq!(builder.delta_row_column.n_counts(), 2);
  }

  #[test]
  fn test_chip_repartitioned_when_layout_differs() {
    let builder = builder();
    let mut chip = Chip::new(MultiRegionLayout::single(8, 8).unwrap());
    chip.add_pixel(Pixel::new(7, 7), 1).unwrap();
    builder.add_chip(&chip).unwrap();
    assert_eq!(builder.active_adc.n_counts(), 1);
  }

  #[test]
  fn test_saved_dictionary_loads_back() {
    let builder = builder();
    let mut chip = Chip::new(MultiRegionLayout::with_region_grid(8, 8, 1, 2).unwrap());
    for n in 0..8_i16 {
      chip.add_pixel(Pixel::new(n, (n * 3) % 8), (n % 4 + 1) as u16).unwrap();
    }
    builder.add_chip(&chip).unwrap();

    let path = std::env::temp_dir().join("roc_compress_builder_test_dictionary.txt");
    builder.save_dictionaries(&path).unwrap();
    let collection = AlphabetStatisticsCollection::from_path(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(collection.len(), 3);
    let delta = collection.get_kind(AlphabetKind::DeltaRowColumn).unwrap();
    // 8x4 region tiles seed 32 letters; reduced to 8 with the special letter
    assert_eq!(delta.alphabet().len(), 8);
    assert!(delta.contains(SPECIAL_LETTER));
    let all_adc = collection.get_kind(AlphabetKind::Adc).unwrap();
    assert_eq!(all_adc.alphabet().len(), 15);

    let mut serialized = Vec::new();
    all_adc.write_to(&mut serialized).unwrap();
    let reparsed = crate::statistics::AlphabetStatistics::read_from(
      &mut BufReader::new(serialized.as_slice()),
    )
    .unwrap()
    .unwrap();
    assert_eq!(reparsed.alphabet(), all_adc.alphabet());
  }
}
