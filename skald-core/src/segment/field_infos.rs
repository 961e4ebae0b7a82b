//! Per-field metadata registry
//!
//! The dictionary file stores fields by number; `FieldInfos` is the
//! segment-level registry that resolves numbers and names and knows whether a
//! field tracks term frequencies (which decides whether the on-disk header
//! carries a `sum_total_term_freq`).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Static description of one indexed field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub number: u32,
    pub name: String,
    /// Whether postings for this field record per-term occurrence counts.
    pub has_freqs: bool,
}

impl FieldInfo {
    pub fn new(number: u32, name: impl Into<String>, has_freqs: bool) -> Self {
        Self {
            number,
            name: name.into(),
            has_freqs,
        }
    }
}

/// Duplicate-free collection of `FieldInfo`, indexed by number and name
#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    fields: Vec<FieldInfo>,
    by_number: FxHashMap<u32, usize>,
    by_name: FxHashMap<String, usize>,
}

impl FieldInfos {
    pub fn new(fields: Vec<FieldInfo>) -> Result<Self> {
        let mut by_number = FxHashMap::default();
        let mut by_name = FxHashMap::default();

        for (idx, info) in fields.iter().enumerate() {
            if by_number.insert(info.number, idx).is_some() {
                return Err(Error::InvalidArgument(format!(
                    "duplicate field number: {}",
                    info.number
                )));
            }
            if by_name.insert(info.name.clone(), idx).is_some() {
                return Err(Error::InvalidArgument(format!(
                    "duplicate field name: {}",
                    info.name
                )));
            }
        }

        Ok(Self {
            fields,
            by_number,
            by_name,
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.by_number.get(&number).map(|&idx| &self.fields[idx])
    }

    pub fn by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&idx| &self.fields[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_number_and_name() {
        let infos = FieldInfos::new(vec![
            FieldInfo::new(0, "title", true),
            FieldInfo::new(3, "id", false),
        ])
        .unwrap();

        assert_eq!(infos.len(), 2);
        assert_eq!(infos.by_number(3).unwrap().name, "id");
        assert_eq!(infos.by_name("title").unwrap().number, 0);
        assert!(infos.by_number(1).is_none());
        assert!(infos.by_name("body").is_none());
    }

    #[test]
    fn test_rejects_duplicates() {
        assert!(FieldInfos::new(vec![
            FieldInfo::new(0, "a", true),
            FieldInfo::new(0, "b", true),
        ])
        .is_err());

        assert!(FieldInfos::new(vec![
            FieldInfo::new(0, "a", true),
            FieldInfo::new(1, "a", true),
        ])
        .is_err());
    }
}
