use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::{MusterError, Result};

/// Column name carrying the work code every record was pulled for.
pub const WORK_IDENTIFIER_FIELD: &str = "workIdentifier";
/// Column name carrying the muster roll label a record came from.
pub const MUSTER_ROLL_LABEL_FIELD: &str = "musterRollLabel";

/// What the portal's search form is asked to look up. Only works are searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchCategory {
    Work,
}

impl SearchCategory {
    /// Visible option text in the category dropdown.
    pub fn label(self) -> &'static str {
        match self {
            SearchCategory::Work => "Work",
        }
    }
}

/// Filters submitted on the home search form. Fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub category: SearchCategory,
    /// State, matched by visible option text.
    pub region: String,
    /// District, matched by the option's numeric value code.
    pub subregion: String,
    pub work_identifier: String,
}

/// State the deployment is bound to.
pub const DEFAULT_REGION: &str = "GUJARAT";
/// District value code inside [`DEFAULT_REGION`].
pub const DEFAULT_SUBREGION_CODE: &str = "1109";

impl SearchCriteria {
    /// Criteria for one work code with the deployment's fixed filters.
    ///
    /// Rejects blank codes; surrounding whitespace is dropped.
    pub fn for_work(work_identifier: &str) -> Result<Self> {
        let work_identifier = work_identifier.trim();
        if work_identifier.is_empty() {
            return Err(MusterError::InvalidWorkCode);
        }
        Ok(Self {
            category: SearchCategory::Work,
            region: DEFAULT_REGION.to_string(),
            subregion: DEFAULT_SUBREGION_CODE.to_string(),
            work_identifier: work_identifier.to_string(),
        })
    }
}

/// Opaque id of one browser window or tab.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WindowHandle(String);

impl WindowHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One muster roll link found on the asset register. The label is both what
/// gets shown and the key used to find the link again after the page reloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusterRollReference {
    pub label: String,
}

impl MusterRollReference {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub work_identifier: String,
    pub muster_roll_label: String,
}

impl Provenance {
    pub fn new(work_identifier: impl Into<String>, muster_roll_label: impl Into<String>) -> Self {
        Self {
            work_identifier: work_identifier.into(),
            muster_roll_label: muster_roll_label.into(),
        }
    }

    /// Attach (or overwrite) both provenance columns on `record`.
    pub fn stamp(&self, record: &mut FieldRecord) {
        record.insert(WORK_IDENTIFIER_FIELD, self.work_identifier.clone());
        record.insert(MUSTER_ROLL_LABEL_FIELD, self.muster_roll_label.clone());
    }
}

/// Header-keyed row, in column order. Keys are unique; re-inserting a key
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRecord {
    fields: Vec<(String, String)>,
}

impl FieldRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = FieldRecord::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Records in extraction order.
pub type RecordSet = Vec<FieldRecord>;
