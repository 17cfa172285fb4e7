//! Fixed, ordered asset universe.
//!
//! Every matrix and vector in the pipeline is indexed by the order given
//! here; the order never changes for the lifetime of a run.

use crate::error::AllocationError;
use crate::error::Result;

/// Ordered set of tradable symbols with index lookup.
#[derive(Clone, Debug)]
pub struct Universe {
  symbols: Vec<String>,
}

impl Universe {
  /// Construct a universe from an ordered symbol list.
  ///
  /// Rejects an empty list and duplicate symbols, since both would break
  /// the index mapping the rest of the pipeline relies on.
  pub fn new<S: Into<String>>(symbols: Vec<S>) -> Result<Self> {
    let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
    if symbols.is_empty() {
      return Err(AllocationError::Configuration(
        "universe must contain at least one symbol".into(),
      ));
    }
    for (i, s) in symbols.iter().enumerate() {
      if symbols[..i].contains(s) {
        return Err(AllocationError::Configuration(format!(
          "duplicate symbol '{s}' in universe"
        )));
      }
    }
    Ok(Self { symbols })
  }

  /// Number of assets.
  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }

  /// Ordered symbol slice.
  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  /// Index of `symbol` in the fixed order, if present.
  pub fn index_of(&self, symbol: &str) -> Option<usize> {
    self.symbols.iter().position(|s| s == symbol)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn index_mapping_is_stable() {
    let u = Universe::new(vec!["SPY", "TLT", "GLD"]).unwrap();
    assert_eq!(u.len(), 3);
    assert_eq!(u.index_of("TLT"), Some(1));
    assert_eq!(u.index_of("QQQ"), None);
  }

  #[test]
  fn rejects_empty_and_duplicates() {
    assert!(Universe::new(Vec::<String>::new()).is_err());
    assert!(Universe::new(vec!["SPY", "SPY"]).is_err());
  }
}
