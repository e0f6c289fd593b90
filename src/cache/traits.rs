//! Result types for cache lookups.

/// Outcome of reading a cached collection.
///
/// `read_collection` collapses all of these into a plain (possibly empty) list;
/// callers that need to tell "no data" from "never fetched" or "storage broken"
/// use `lookup_collection` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
  /// The collection was populated and holds records
  Hit(Vec<T>),
  /// The collection was populated by a fetch that returned nothing
  Empty,
  /// The collection was never populated
  Miss,
  /// Storage could not be read or the snapshot could not be decoded
  Unavailable,
}

impl<T> CacheLookup<T> {
  /// Records in the lookup, empty for every non-hit variant.
  pub fn into_records(self) -> Vec<T> {
    match self {
      Self::Hit(records) => records,
      Self::Empty | Self::Miss | Self::Unavailable => Vec::new(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_into_records() {
    assert_eq!(CacheLookup::Hit(vec![1, 2]).into_records(), vec![1, 2]);
    assert!(CacheLookup::<i32>::Empty.into_records().is_empty());
    assert!(CacheLookup::<i32>::Miss.into_records().is_empty());
    assert!(CacheLookup::<i32>::Unavailable.into_records().is_empty());
  }
}
