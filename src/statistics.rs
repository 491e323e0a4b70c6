use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, Write};

use crate::constants::{COLUMN_WIDTH, FLOAT_PRECISION, HEADER_WIDTH};
use crate::errors::{CodecError, CodecResult};
use crate::huffman_code::HuffmanCode;
use crate::huffman_tree::{HuffmanTable, Letter};
use crate::package::{Package, PackageReader};

const PROBABILITY_TOLERANCE: f64 = 1e-5;

/// An immutable statistics bundle for one alphabet: letter probabilities,
/// entropy, and the Huffman table built from the training counts.
///
/// Instances are validated on construction and never change afterwards, so
/// they can be shared freely between package makers.
#[derive(Clone, Debug)]
pub struct AlphabetStatistics {
  name: String,
  alphabet: BTreeSet<Letter>,
  original_counts: u64,
  original_probabilities: BTreeMap<Letter, f64>,
  entropy: f64,
  huffman_table: HuffmanTable,
}

impl AlphabetStatistics {
  pub fn new(
    name: String,
    alphabet: BTreeSet<Letter>,
    original_counts: u64,
    original_probabilities: BTreeMap<Letter, f64>,
    entropy: f64,
    huffman_table: HuffmanTable,
  ) -> CodecResult<Self> {
    if entropy < 0.0 || !entropy.is_finite() {
      return Err(CodecError::dictionary_parse(format!(
        "entropy = {} must be a non-negative number",
        entropy,
      )));
    }
    if original_counts == 0 {
      return Err(CodecError::dictionary_parse(
        "original number of counts must be positive",
      ));
    }
    if alphabet.is_empty() {
      return Err(CodecError::dictionary_parse("alphabet is empty"));
    }
    if huffman_table.len() != alphabet.len() {
      return Err(CodecError::dictionary_parse(format!(
        "Huffman table covers {} letters, alphabet has {}",
        huffman_table.len(),
        alphabet.len(),
      )));
    }
    let mut total_probability = 0.0;
    for &letter in &alphabet {
      let probability = *original_probabilities.get(&letter).ok_or_else(|| {
        CodecError::dictionary_parse(format!(
          "missing original probability for letter '{}'",
          letter,
        ))
      })?;
      if !(0.0..=1.0).contains(&probability) {
        return Err(CodecError::dictionary_parse(format!(
          "invalid original probability {} for letter '{}'",
          probability, letter,
        )));
      }
      if huffman_table.code(letter).is_none() {
        return Err(CodecError::dictionary_parse(format!(
          "missing Huffman code for letter '{}'",
          letter,
        )));
      }
      total_probability += probability;
    }
    if (total_probability - 1.0).abs() > PROBABILITY_TOLERANCE {
      return Err(CodecError::dictionary_parse(format!(
        "total original probability = {} is not consistent with 1",
        total_probability,
      )));
    }
    Ok(AlphabetStatistics {
      name,
      alphabet,
      original_counts,
      original_probabilities,
      entropy,
      huffman_table,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn alphabet(&self) -> &BTreeSet<Letter> {
    &self.alphabet
  }

  pub fn entropy(&self) -> f64 {
    self.entropy
  }

  pub fn original_counts(&self) -> u64 {
    self.original_counts
  }

  pub fn contains(&self, letter: Letter) -> bool {
    self.alphabet.contains(&letter)
  }

  fn check_letter(&self, letter: Letter) -> CodecResult<()> {
    if !self.contains(letter) {
      return Err(CodecError::unknown_letter(format!(
        "letter '{}' not present in the alphabet '{}'",
        letter, self.name,
      )));
    }
    Ok(())
  }

  pub fn original_probability(&self, letter: Letter) -> CodecResult<f64> {
    self.check_letter(letter)?;
    Ok(self.original_probabilities[&letter])
  }

  pub fn original_frequency(&self, letter: Letter) -> CodecResult<f64> {
    Ok(self.original_probability(letter)? * self.original_counts as f64)
  }

  pub fn huffman_code(&self, letter: Letter) -> CodecResult<HuffmanCode> {
    self.check_letter(letter)?;
    self.huffman_table.code(letter).ok_or_else(|| {
      CodecError::unknown_letter(format!(
        "letter '{}' has no Huffman code in '{}'",
        letter, self.name,
      ))
    })
  }

  pub fn letter_from_code(&self, code: &HuffmanCode) -> Option<Letter> {
    self.huffman_table.letter(code)
  }

  /// The expected code length in bits per letter under the original
  /// probabilities; bounded by `entropy <= value < entropy + 1`.
  pub fn expected_code_length(&self) -> f64 {
    self
      .alphabet
      .iter()
      .map(|&l| {
        self.original_probabilities[&l] * self.huffman_table.code(l).unwrap().n_bits() as f64
      })
      .sum()
  }

  /// Appends the Huffman code of `letter` to the package, one bit at a time
  /// in append order.
  pub fn encode_letter(&self, letter: Letter, package: &mut Package) -> CodecResult<()> {
    let code = self.huffman_code(letter)?;
    for n in 0..code.n_bits() {
      package.write_ex(code.bit(n) as u64, 1)?;
    }
    Ok(())
  }

  /// Consumes bits until they form a code of this alphabet and returns its
  /// letter.
  pub fn decode_letter(&self, reader: &mut PackageReader<'_>) -> CodecResult<Letter> {
    let mut code = HuffmanCode::default();
    loop {
      let bit = reader.read(1)? == 1;
      code = code.appended(bit)?;
      if let Some(letter) = self.letter_from_code(&code) {
        return Ok(letter);
      }
    }
  }

  /// Writes this bundle as one dictionary-file block.
  pub fn write_to<W: Write>(&self, os: &mut W) -> CodecResult<()> {
    let io_err = |e: std::io::Error| {
      CodecError::dictionary_parse(format!("error while writing dictionary block: {}", e))
    };
    let (w, hw, p) = (COLUMN_WIDTH, HEADER_WIDTH, FLOAT_PRECISION);
    writeln!(os, "{}", self.name).map_err(io_err)?;
    writeln!(os, "{:<hw$}{}", "number_of_letters", self.alphabet.len()).map_err(io_err)?;
    writeln!(os, "{:<hw$}{:.p$e}", "alphabet_entropy", self.entropy).map_err(io_err)?;
    writeln!(os, "{:<hw$}{}", "original_number_of_counts", self.original_counts).map_err(io_err)?;
    writeln!(
      os,
      "{:<w$}{:<w$}{:<w$}{:<w$}",
      "Letter", "Orig_probability", "Huffman_nbits", "Huffman_code",
    )
    .map_err(io_err)?;
    for &letter in &self.alphabet {
      let code = self.huffman_table.code(letter).unwrap();
      writeln!(
        os,
        "{:<w$}{:<w$.p$e}{:<w$}{}",
        letter,
        self.original_probabilities[&letter],
        code.n_bits(),
        code,
      )
      .map_err(io_err)?;
    }
    Ok(())
  }

  /// Reads the next block, skipping blank lines; returns `None` at a clean
  /// end of stream. Truncation inside a block is a parse error.
  pub fn read_from<R: BufRead>(is: &mut R) -> CodecResult<Option<AlphabetStatistics>> {
    let name = match next_content_line(is)? {
      Some(line) => line,
      None => return Ok(None),
    };

    let n_letters = parse_param::<usize>(is, "number_of_letters")?;
    let entropy = parse_param::<f64>(is, "alphabet_entropy")?;
    let original_counts = parse_param::<u64>(is, "original_number_of_counts")?;

    let header = require_line(is, "table header")?;
    if header.split_whitespace().next() != Some("Letter") {
      return Err(CodecError::dictionary_parse(format!(
        "expected table header, found '{}'",
        header,
      )));
    }

    let mut alphabet = BTreeSet::new();
    let mut original_probabilities = BTreeMap::new();
    let mut huffman_table = HuffmanTable::default();
    for _ in 0..n_letters {
      let row = require_line(is, "letter row")?;
      let tokens = row.split_whitespace().collect::<Vec<_>>();
      if tokens.len() < 3 {
        return Err(CodecError::dictionary_parse(format!(
          "malformed letter row '{}'",
          row,
        )));
      }
      let letter = parse_token::<Letter>(tokens[0], "letter")?;
      let probability = parse_token::<f64>(tokens[1], "probability")?;
      let n_bits = parse_token::<usize>(tokens[2], "code length")?;
      let code = match tokens.get(3) {
        Some(text) => text.parse::<HuffmanCode>()?,
        // a zero-length code prints as an empty column
        None if n_bits == 0 => HuffmanCode::default(),
        None => {
          return Err(CodecError::dictionary_parse(format!(
            "missing Huffman code in row '{}'",
            row,
          )));
        }
      };
      if code.n_bits() != n_bits {
        return Err(CodecError::dictionary_parse(format!(
          "Huffman code '{}' does not match its declared length {}",
          code, n_bits,
        )));
      }
      if !alphabet.insert(letter) {
        return Err(CodecError::dictionary_parse(format!(
          "letter '{}' already defined",
          letter,
        )));
      }
      original_probabilities.insert(letter, probability);
      huffman_table.insert(letter, code)?;
    }

    AlphabetStatistics::new(
      name,
      alphabet,
      original_counts,
      original_probabilities,
      entropy,
      huffman_table,
    )
    .map(Some)
  }
}

fn next_content_line<R: BufRead>(is: &mut R) -> CodecResult<Option<String>> {
  let mut line = String::new();
  loop {
    line.clear();
    let n_read = is.read_line(&mut line).map_err(|e| {
      CodecError::dictionary_parse(format!("error while reading dictionary: {}", e))
    })?;
    if n_read == 0 {
      return Ok(None);
    }
    let content = line.strip_prefix('\u{feff}').unwrap_or(&line).trim();
    if !content.is_empty() {
      return Ok(Some(content.to_string()));
    }
  }
}

fn require_line<R: BufRead>(is: &mut R, what: &str) -> CodecResult<String> {
  next_content_line(is)?.ok_or_else(|| {
    CodecError::dictionary_parse(format!("unexpected end of dictionary before {}", what))
  })
}

fn parse_token<T: std::str::FromStr>(token: &str, what: &str) -> CodecResult<T> {
  token.parse::<T>().map_err(|_| {
    CodecError::dictionary_parse(format!("cannot parse {} from '{}'", what, token))
  })
}

fn parse_param<T: std::str::FromStr>(is: &mut impl BufRead, param_name: &str) -> CodecResult<T> {
  let line = require_line(is, param_name)?;
  let mut tokens = line.split_whitespace();
  let found_name = tokens.next().unwrap_or("");
  if found_name != param_name {
    return Err(CodecError::dictionary_parse(format!(
      "expected parameter '{}', found '{}'",
      param_name, found_name,
    )));
  }
  let value = tokens.next().ok_or_else(|| {
    CodecError::dictionary_parse(format!("missing value for parameter '{}'", param_name))
  })?;
  parse_token(value, param_name)
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::io::BufReader;

  use super::AlphabetStatistics;
  use crate::errors::ErrorKind;
  use crate::huffman_tree;
  use crate::package::Package;

  fn sample_statistics() -> AlphabetStatistics {
    let frequencies = [(0_i32, 50_u64), (1, 30), (2, 15), (3, 5)]
      .into_iter()
      .collect::<BTreeMap<_, _>>();
    let n_counts: u64 = frequencies.values().sum();
    let probabilities = frequencies
      .iter()
      .map(|(&l, &f)| (l, f as f64 / n_counts as f64))
      .collect::<BTreeMap<_, _>>();
    let entropy = -probabilities
      .values()
      .filter(|&&p| p > 0.0)
      .map(|&p| p * p.log2())
      .sum::<f64>();
    AlphabetStatistics::new(
      "sample".to_string(),
      frequencies.keys().copied().collect(),
      n_counts,
      probabilities,
      entropy,
      huffman_tree::build_table(&frequencies).unwrap(),
    )
    .unwrap()
  }

  #[test]
  fn test_validation_rejects_bad_probabilities() {
    let stat = sample_statistics();
    let mut probabilities = stat.original_probabilities.clone();
    probabilities.insert(0, 0.9);
    let err = AlphabetStatistics::new(
      stat.name.clone(),
      stat.alphabet.clone(),
      stat.original_counts,
      probabilities,
      stat.entropy,
      stat.huffman_table.clone(),
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::DictionaryParse);
  }

  #[test]
  fn test_letter_lookup_errors() {
    let stat = sample_statistics();
    assert_eq!(stat.huffman_code(9).unwrap_err().kind, ErrorKind::UnknownLetter);
    assert_eq!(
      stat.original_probability(-2).unwrap_err().kind,
      ErrorKind::UnknownLetter,
    );
  }

  #[test]
  fn test_encode_decode_letters() {
    let stat = sample_statistics();
    let mut package = Package::default();
    let letters = [3, 0, 0, 2, 1, 0];
    for &letter in &letters {
      stat.encode_letter(letter, &mut package).unwrap();
    }
    let mut reader = package.reader();
    for &letter in &letters {
      assert_eq!(stat.decode_letter(&mut reader).unwrap(), letter);
    }
    assert_eq!(reader.bits_remaining(), 0);
    assert_eq!(
      stat.decode_letter(&mut reader).unwrap_err().kind,
      ErrorKind::PackageUnderflow,
    );
  }

  #[test]
  fn test_entropy_bound() {
    let stat = sample_statistics();
    let expected_len = stat.expected_code_length();
    assert!(stat.entropy() <= expected_len + 1e-9);
    assert!(expected_len < stat.entropy() + 1.0);
  }

  #[test]
  fn test_block_round_trip() {
    let stat = sample_statistics();
    let mut serialized = Vec::new();
    stat.write_to(&mut serialized).unwrap();

    let mut reader = BufReader::new(serialized.as_slice());
    let parsed = AlphabetStatistics::read_from(&mut reader).unwrap().unwrap();
    assert_eq!(parsed.name(), stat.name());
    assert_eq!(parsed.alphabet(), stat.alphabet());
    assert_eq!(parsed.original_counts(), stat.original_counts());
    for &letter in stat.alphabet() {
      assert_eq!(
        parsed.huffman_code(letter).unwrap(),
        stat.huffman_code(letter).unwrap(),
      );
      let diff = parsed.original_probability(letter).unwrap()
        - stat.original_probability(letter).unwrap();
      assert!(diff.abs() < 1e-5);
    }
    assert!(AlphabetStatistics::read_from(&mut reader).unwrap().is_none());
  }

  #[test]
  fn test_read_tolerates_bom_and_crlf() {
    let stat = sample_statistics();
    let mut serialized = Vec::new();
    stat.write_to(&mut serialized).unwrap();
    let text = String::from_utf8(serialized).unwrap();
    let windows_text = format!("\u{feff}{}", text.replace('\n', "\r\n"));

    let mut reader = BufReader::new(windows_text.as_bytes());
    let parsed = AlphabetStatistics::read_from(&mut reader).unwrap().unwrap();
    assert_eq!(parsed.name(), stat.name());
  }

  #[test]
  fn test_truncated_block_is_an_error() {
    let stat = sample_statistics();
    let mut serialized = Vec::new();
    stat.write_to(&mut serialized).unwrap();
    let text = String::from_utf8(serialized).unwrap();
    let lines = text.lines().collect::<Vec<_>>();
    let truncated = lines[..lines.len() - 1].join("\n");

    let mut reader = BufReader::new(truncated.as_bytes());
    let err = AlphabetStatistics::read_from(&mut reader).unwrap_err();
    assert_eq!(err.kind, ErrorKind::DictionaryParse);
  }
}
