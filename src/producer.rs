use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::errors::{CodecError, CodecResult};
use crate::huffman_tree;
use crate::huffman_tree::Letter;
use crate::statistics::AlphabetStatistics;

#[derive(Clone, Debug, Default)]
struct ProducerState {
  n_counts: u64,
  letter_frequencies: BTreeMap<Letter, u64>,
}

impl ProducerState {
  fn count_limit_reached(&self) -> bool {
    self.n_counts == u64::MAX
  }

  // ascending frequency, ties broken by descending letter
  fn frequency_ordered_letters(&self, name: &str) -> CodecResult<Vec<(Letter, u64)>> {
    if self.n_counts == 0 {
      return Err(CodecError::dictionary_parse(format!(
        "statistics is not available for '{}': no counts collected",
        name,
      )));
    }
    if self.count_limit_reached() {
      log::warn!(
        "count limit was reached while collecting statistics for '{}'",
        name,
      );
    }
    let mut ordered = self
      .letter_frequencies
      .iter()
      .map(|(&l, &f)| (l, f))
      .collect::<Vec<_>>();
    ordered.sort_by(|first, second| first.1.cmp(&second.1).then(second.0.cmp(&first.0)));
    Ok(ordered)
  }
}

/// Accumulates letter counts for one alphabet and freezes them into an
/// [`AlphabetStatistics`] on demand.
///
/// Counting and freezing are serialised by an internal lock, so a producer
/// may be fed from multiple sources. Once the count reaches `u64::MAX`,
/// further counts are silently dropped and a warning is logged at produce
/// time.
#[derive(Debug)]
pub struct AlphabetStatisticsProducer {
  name: String,
  state: Mutex<ProducerState>,
}

impl Clone for AlphabetStatisticsProducer {
  fn clone(&self) -> Self {
    let state = self.state.lock().unwrap();
    AlphabetStatisticsProducer {
      name: self.name.clone(),
      state: Mutex::new(state.clone()),
    }
  }
}

impl AlphabetStatisticsProducer {
  pub fn new(name: impl Into<String>) -> Self {
    AlphabetStatisticsProducer {
      name: name.into(),
      state: Mutex::new(ProducerState::default()),
    }
  }

  /// Creates a producer with every letter of a known alphabet pre-seeded at
  /// frequency zero, so rare letters still receive Huffman codes.
  pub fn with_alphabet(name: impl Into<String>, alphabet: impl IntoIterator<Item = Letter>) -> Self {
    let producer = Self::new(name);
    {
      let mut state = producer.state.lock().unwrap();
      for letter in alphabet {
        state.letter_frequencies.insert(letter, 0);
      }
    }
    producer
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn n_letters(&self) -> usize {
    self.state.lock().unwrap().letter_frequencies.len()
  }

  pub fn n_counts(&self) -> u64 {
    self.state.lock().unwrap().n_counts
  }

  pub fn count_limit_reached(&self) -> bool {
    self.state.lock().unwrap().count_limit_reached()
  }

  pub fn add_count(&self, letter: Letter) {
    let mut state = self.state.lock().unwrap();
    if state.count_limit_reached() {
      return;
    }
    *state.letter_frequencies.entry(letter).or_insert(0) += 1;
    state.n_counts += 1;
  }

  pub fn add_counts(&self, letters: impl IntoIterator<Item = Letter>) {
    for letter in letters {
      self.add_count(letter);
    }
  }

  /// Freezes the current counts into an immutable statistics bundle.
  pub fn produce(&self) -> CodecResult<Arc<AlphabetStatistics>> {
    let state = self.state.lock().unwrap();
    let ordered = state.frequency_ordered_letters(&self.name)?;

    let mut original_probabilities = BTreeMap::new();
    let mut entropy = 0.0;
    for &(letter, frequency) in &ordered {
      let probability = frequency as f64 / state.n_counts as f64;
      original_probabilities.insert(letter, probability);
      if probability > 0.0 {
        entropy -= probability * probability.log2();
      }
    }
    log::debug!(
      "producing alphabet statistics for '{}': entropy = {}",
      self.name,
      entropy,
    );

    let huffman_table = huffman_tree::build_table(&state.letter_frequencies)?;
    let statistics = AlphabetStatistics::new(
      self.name.clone(),
      state.letter_frequencies.keys().copied().collect(),
      state.n_counts,
      original_probabilities,
      entropy,
      huffman_table,
    )?;
    Ok(Arc::new(statistics))
  }

  /// Bounds alphabet explosion: keeps the `new_alphabet_size - 1` most
  /// frequent letters and folds the rest into `special_letter`. When the
  /// alphabet already fits, returns a plain clone (name included).
  pub fn reduce(
    &self,
    new_alphabet_size: usize,
    new_name: impl Into<String>,
    special_letter: Letter,
  ) -> CodecResult<AlphabetStatisticsProducer> {
    let state = self.state.lock().unwrap();
    if new_alphabet_size <= 1 {
      return Err(CodecError::unsupported_option(format!(
        "new alphabet size = {} is too small",
        new_alphabet_size,
      )));
    }
    if state.letter_frequencies.contains_key(&special_letter) {
      return Err(CodecError::unsupported_option(format!(
        "special letter '{}' is already present in the alphabet",
        special_letter,
      )));
    }
    let ordered = state.frequency_ordered_letters(&self.name)?;
    if ordered.len() <= new_alphabet_size {
      return Ok(AlphabetStatisticsProducer {
        name: self.name.clone(),
        state: Mutex::new(state.clone()),
      });
    }

    let mut reduced_state = ProducerState {
      n_counts: state.n_counts,
      letter_frequencies: BTreeMap::new(),
    };
    let mut kept_count = 0;
    for &(letter, frequency) in ordered.iter().rev().take(new_alphabet_size - 1) {
      reduced_state.letter_frequencies.insert(letter, frequency);
      kept_count += frequency;
    }
    reduced_state
      .letter_frequencies
      .insert(special_letter, state.n_counts - kept_count);
    Ok(AlphabetStatisticsProducer {
      name: new_name.into(),
      state: Mutex::new(reduced_state),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::AlphabetStatisticsProducer;
  use crate::constants::SPECIAL_LETTER;
  use crate::errors::ErrorKind;

  #[test]
  fn test_produce_requires_counts() {
    let producer = AlphabetStatisticsProducer::with_alphabet("empty", 0..4);
    assert!(producer.produce().is_err());
    producer.add_count(2);
    assert!(producer.produce().is_ok());
  }

  #[test]
  fn test_produce_probabilities_and_entropy() {
    let producer = AlphabetStatisticsProducer::with_alphabet("adc", 0..4);
    producer.add_counts([0, 0, 0, 0, 1, 1, 2, 2]);
    let statistics = producer.produce().unwrap();
    assert_eq!(statistics.original_counts(), 8);
    assert_eq!(statistics.original_probability(0).unwrap(), 0.5);
    assert_eq!(statistics.original_probability(3).unwrap(), 0.0);
    // 0.5 * 1 + 0.25 * 2 + 0.25 * 2 = 1.5
    assert!((statistics.entropy() - 1.5).abs() < 1e-12);
  }

  #[test]
  fn test_reduce_keeps_top_letters() {
    let producer = AlphabetStatisticsProducer::new("delta");
    for letter in 0..10 {
      for _ in 0..=letter {
        producer.add_count(letter);
      }
    }
    let reduced = producer.reduce(4, "delta_reduced", SPECIAL_LETTER).unwrap();
    assert_eq!(reduced.name(), "delta_reduced");
    assert_eq!(reduced.n_letters(), 4);
    assert_eq!(reduced.n_counts(), producer.n_counts());

    let statistics = reduced.produce().unwrap();
    // top 3 letters by frequency are 9, 8, 7; the rest fold into -1
    assert!(statistics.contains(9));
    assert!(statistics.contains(8));
    assert!(statistics.contains(7));
    assert!(statistics.contains(SPECIAL_LETTER));
    let dropped_mass: u64 = (0..7).map(|l| l as u64 + 1).sum();
    assert_eq!(
      statistics.original_frequency(SPECIAL_LETTER).unwrap().round() as u64,
      dropped_mass,
    );
  }

  #[test]
  fn test_reduce_small_alphabet_is_a_clone() {
    let producer = AlphabetStatisticsProducer::with_alphabet("adc", 0..3);
    producer.add_counts([0, 1, 2]);
    let reduced = producer.reduce(8, "renamed", SPECIAL_LETTER).unwrap();
    assert_eq!(reduced.name(), "adc");
    assert_eq!(reduced.n_letters(), 3);
  }

  #[test]
  fn test_reduce_rejects_bad_arguments() {
    let producer = AlphabetStatisticsProducer::with_alphabet("adc", 0..8);
    producer.add_count(0);
    assert_eq!(
      producer.reduce(1, "x", SPECIAL_LETTER).unwrap_err().kind,
      ErrorKind::UnsupportedOption,
    );
    assert_eq!(
      producer.reduce(4, "x", 3).unwrap_err().kind,
      ErrorKind::UnsupportedOption,
    );
  }
}
