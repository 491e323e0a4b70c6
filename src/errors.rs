use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// The different kinds of errors for `roc_compress`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
  /// `InvalidGeometry` errors indicate zero dimensions or an inconsistent
  /// multi-region split.
  InvalidGeometry,
  /// `PixelOutOfRange` errors occur when a pixel coordinate falls outside
  /// the layout it is addressed against.
  PixelOutOfRange,
  /// `DuplicatePixel` errors occur when a pixel is added to a region that
  /// already contains it.
  DuplicatePixel,
  /// `UnknownLetter` errors indicate a Huffman table lookup miss.
  UnknownLetter,
  /// `UnknownAlphabet` errors indicate a statistics collection lookup miss.
  UnknownAlphabet,
  /// `PackageUnderflow` errors occur when a reader runs past the end of a
  /// package without the zero-fill flag set.
  PackageUnderflow,
  /// `ValueTooWide` errors occur when a value does not fit the requested
  /// bit width, or the width exceeds 64.
  ValueTooWide,
  /// `DictionaryParse` errors indicate a malformed dictionary file:
  /// truncated blocks, duplicate names, or inconsistent probabilities.
  DictionaryParse,
  /// `UnsupportedOption` errors indicate an ordering or mode that is not
  /// available in the given context.
  UnsupportedOption,
}

/// The error type used in results for all `roc_compress` functionality.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecError {
  pub kind: ErrorKind,
  pub detail: String,
}

impl CodecError {
  pub(crate) fn new<S: AsRef<str>>(kind: ErrorKind, detail: S) -> Self {
    CodecError {
      kind,
      detail: detail.as_ref().to_string(),
    }
  }

  pub(crate) fn invalid_geometry<S: AsRef<str>>(detail: S) -> Self {
    Self::new(ErrorKind::InvalidGeometry, detail)
  }

  pub(crate) fn pixel_out_of_range<S: AsRef<str>>(detail: S) -> Self {
    Self::new(ErrorKind::PixelOutOfRange, detail)
  }

  pub(crate) fn duplicate_pixel<S: AsRef<str>>(detail: S) -> Self {
    Self::new(ErrorKind::DuplicatePixel, detail)
  }

  pub(crate) fn unknown_letter<S: AsRef<str>>(detail: S) -> Self {
    Self::new(ErrorKind::UnknownLetter, detail)
  }

  pub(crate) fn unknown_alphabet<S: AsRef<str>>(detail: S) -> Self {
    Self::new(ErrorKind::UnknownAlphabet, detail)
  }

  pub(crate) fn package_underflow<S: AsRef<str>>(detail: S) -> Self {
    Self::new(ErrorKind::PackageUnderflow, detail)
  }

  pub(crate) fn underflow_recipe(name: &str, bits_to_read: usize, bit_idx: usize, total_bits: usize) -> Self {
    Self::package_underflow(format!(
      "{}: cannot read {} bits at bit idx {} out of {}",
      name, bits_to_read, bit_idx, total_bits,
    ))
  }

  pub(crate) fn value_too_wide<S: AsRef<str>>(detail: S) -> Self {
    Self::new(ErrorKind::ValueTooWide, detail)
  }

  pub(crate) fn dictionary_parse<S: AsRef<str>>(detail: S) -> Self {
    Self::new(ErrorKind::DictionaryParse, detail)
  }

  pub(crate) fn unsupported_option<S: AsRef<str>>(detail: S) -> Self {
    Self::new(ErrorKind::UnsupportedOption, detail)
  }
}

impl Display for CodecError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "roc_compress {:?} error: {}",
      self.kind, &self.detail
    )
  }
}

impl Error for CodecError {}

pub type CodecResult<T> = Result<T, CodecError>;
