use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use crate::errors::{CodecError, CodecResult};
use crate::statistics::AlphabetStatistics;

/// The alphabets the codecs know by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlphabetKind {
  /// ADCs of all readout-unit cells, inactive ones included.
  Adc,
  /// ADCs of active pixels only.
  ActiveAdc,
  DeltaRow,
  DeltaColumn,
  /// Combined (delta row, delta column) letters.
  DeltaRowColumn,
}

impl AlphabetKind {
  pub fn canonical_name(&self) -> &'static str {
    match self {
      AlphabetKind::Adc => "all_adc",
      AlphabetKind::ActiveAdc => "active_adc",
      AlphabetKind::DeltaRow => "delta_row",
      AlphabetKind::DeltaColumn => "delta_column",
      AlphabetKind::DeltaRowColumn => "delta_row_column",
    }
  }
}

/// The alphabets of one dictionary file, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct AlphabetStatisticsCollection {
  statistics: BTreeMap<String, Arc<AlphabetStatistics>>,
}

impl AlphabetStatisticsCollection {
  /// Parses concatenated dictionary blocks until end of stream.
  pub fn from_reader<R: BufRead>(is: &mut R) -> CodecResult<Self> {
    let mut collection = AlphabetStatisticsCollection::default();
    while let Some(statistics) = AlphabetStatistics::read_from(is)? {
      let name = statistics.name().to_string();
      if collection.statistics.contains_key(&name) {
        return Err(CodecError::dictionary_parse(format!(
          "alphabet statistics with name '{}' is already defined",
          name,
        )));
      }
      collection.statistics.insert(name, Arc::new(statistics));
    }
    Ok(collection)
  }

  pub fn from_path(path: impl AsRef<Path>) -> CodecResult<Self> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
      CodecError::dictionary_parse(format!(
        "cannot open dictionary file '{}': {}",
        path.display(),
        e,
      ))
    })?;
    Self::from_reader(&mut BufReader::new(file))
  }

  pub fn len(&self) -> usize {
    self.statistics.len()
  }

  pub fn is_empty(&self) -> bool {
    self.statistics.is_empty()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.statistics.contains_key(name)
  }

  pub fn get(&self, name: &str) -> CodecResult<Arc<AlphabetStatistics>> {
    self.statistics.get(name).cloned().ok_or_else(|| {
      CodecError::unknown_alphabet(format!("alphabet statistics '{}' not found", name))
    })
  }

  pub fn get_kind(&self, kind: AlphabetKind) -> CodecResult<Arc<AlphabetStatistics>> {
    self.get(kind.canonical_name())
  }
}
