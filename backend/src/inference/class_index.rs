use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::error::ConfigurationError;

/// Immutable mapping between model output positions and labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassIndex {
    labels: Vec<String>,
    indices: HashMap<String, usize>,
}

/// Label/index pairs in file order. Keeps repeated keys so they can be rejected.
struct LabelTable(Vec<(String, u64)>);

impl<'de> Deserialize<'de> for LabelTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = LabelTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a flat object mapping labels to non-negative integer indices")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((label, index)) = map.next_entry::<String, u64>()? {
                    entries.push((label, index));
                }
                Ok(LabelTable(entries))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

impl ClassIndex {
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let file = File::open(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigurationError> {
        let table: LabelTable = serde_json::from_reader(reader)?;
        Self::from_table(table)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let table: LabelTable = serde_json::from_str(json)?;
        Self::from_table(table)
    }

    fn from_table(table: LabelTable) -> Result<Self, ConfigurationError> {
        let entries = table
            .0
            .into_iter()
            .map(|(label, index)| {
                usize::try_from(index)
                    .map(|index| (label, index))
                    .map_err(|_| ConfigurationError::InvalidSetting {
                        key: "class index".into(),
                        reason: format!("{index} does not fit in usize"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_entries(entries)
    }

    /// Inverts label→index pairs; every index in `0..len` must be used exactly once.
    pub fn from_entries<I, S>(entries: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        let mut indices: HashMap<String, usize> = HashMap::new();
        let mut by_index: HashMap<usize, String> = HashMap::new();

        for (label, index) in entries {
            let label = label.into();
            if indices.contains_key(&label) {
                return Err(ConfigurationError::DuplicateLabel(label));
            }
            if let Some(first) = by_index.get(&index) {
                return Err(ConfigurationError::DuplicateIndex {
                    index,
                    first: first.clone(),
                    second: label,
                });
            }
            indices.insert(label.clone(), index);
            by_index.insert(index, label);
        }

        if by_index.is_empty() {
            return Err(ConfigurationError::Empty);
        }

        let count = by_index.len();
        let mut labels = Vec::with_capacity(count);
        for index in 0..count {
            match by_index.remove(&index) {
                Some(label) => labels.push(label),
                None => return Err(ConfigurationError::NonContiguous { count, missing: index }),
            }
        }

        Ok(Self { labels, indices })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.indices.get(label).copied()
    }

    /// Labels ordered by class index.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}
