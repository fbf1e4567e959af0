//! Fixture-backed collaborators: an in-memory profile store hydrated from JSON or CSV exports
//! and a static offer catalog read from JSON.

mod parser;

pub use parser::RowError;

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::allocation::{InstrumentId, InstrumentRecord, MerchantCategory};
use crate::recommendation::{
    OfferCatalog, OfferCatalogError, ProfileStore, ProfileStoreError, UserId,
};
use parser::ParseFailure;

#[derive(Debug)]
pub enum ProfileLoadError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Csv(csv::Error),
    Row(RowError),
    UnsupportedFormat(PathBuf),
}

impl std::fmt::Display for ProfileLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileLoadError::Io(err) => write!(f, "failed to read profile data: {}", err),
            ProfileLoadError::Json(err) => write!(f, "invalid profile JSON: {}", err),
            ProfileLoadError::Csv(err) => write!(f, "invalid profile CSV data: {}", err),
            ProfileLoadError::Row(err) => write!(
                f,
                "invalid value '{}' for {} on line {}",
                err.value, err.field, err.line
            ),
            ProfileLoadError::UnsupportedFormat(path) => write!(
                f,
                "unsupported profile format for {} (expected .json or .csv)",
                path.display()
            ),
        }
    }
}

impl std::error::Error for ProfileLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProfileLoadError::Io(err) => Some(err),
            ProfileLoadError::Json(err) => Some(err),
            ProfileLoadError::Csv(err) => Some(err),
            ProfileLoadError::Row(_) | ProfileLoadError::UnsupportedFormat(_) => None,
        }
    }
}

impl From<std::io::Error> for ProfileLoadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for ProfileLoadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<ParseFailure> for ProfileLoadError {
    fn from(err: ParseFailure) -> Self {
        match err {
            ParseFailure::Csv(err) => Self::Csv(err),
            ParseFailure::Row(err) => Self::Row(err),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProfileDocument {
    users: BTreeMap<String, Vec<InstrumentRecord>>,
}

/// Profile store holding every user's instruments in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryProfileStore {
    profiles: Arc<Mutex<HashMap<UserId, Vec<InstrumentRecord>>>>,
}

impl InMemoryProfileStore {
    /// Load from a `.json` document or `.csv` export, chosen by file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ProfileLoadError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("json") => Self::from_json_reader(BufReader::new(File::open(path)?)),
            Some("csv") => Self::from_csv_reader(BufReader::new(File::open(path)?)),
            _ => Err(ProfileLoadError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// `{ "users": { "<user_id>": [InstrumentRecord, ...] } }`
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, ProfileLoadError> {
        let document: ProfileDocument = serde_json::from_reader(reader)?;
        let store = Self::default();
        for (user_id, records) in document.users {
            store.upsert(UserId(user_id), records);
        }
        Ok(store)
    }

    /// One row per instrument; rows for the same user are grouped in file order.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, ProfileLoadError> {
        let store = Self::default();
        {
            let mut guard = store.profiles.lock().expect("profile mutex poisoned");
            for (user_id, record) in parser::parse_records(reader)? {
                guard.entry(user_id).or_default().push(record);
            }
        }
        Ok(store)
    }

    pub fn upsert(&self, user_id: UserId, records: Vec<InstrumentRecord>) {
        let mut guard = self.profiles.lock().expect("profile mutex poisoned");
        guard.insert(user_id, records);
    }

    pub fn user_count(&self) -> usize {
        self.profiles.lock().expect("profile mutex poisoned").len()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_instruments(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<InstrumentRecord>, ProfileStoreError> {
        let records = {
            let guard = self.profiles.lock().expect("profile mutex poisoned");
            guard.get(user_id).cloned()
        };
        records.ok_or(ProfileStoreError::NotFound)
    }
}

/// Offer catalog answering from a fixed `category -> instrument -> rate` table.
#[derive(Debug, Default, Clone)]
pub struct StaticOfferCatalog {
    rates: BTreeMap<MerchantCategory, BTreeMap<InstrumentId, Decimal>>,
}

impl StaticOfferCatalog {
    pub fn new(rates: BTreeMap<MerchantCategory, BTreeMap<InstrumentId, Decimal>>) -> Self {
        Self { rates }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ProfileLoadError> {
        Self::from_json_reader(BufReader::new(File::open(path)?))
    }

    /// `{ "<category>": { "<instrument_id>": rate } }`
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, ProfileLoadError> {
        let raw: BTreeMap<String, BTreeMap<String, Decimal>> = serde_json::from_reader(reader)?;
        let rates = raw
            .into_iter()
            .map(|(category, offers)| {
                let offers = offers
                    .into_iter()
                    .map(|(id, rate)| (InstrumentId(id), rate))
                    .collect();
                (MerchantCategory::new(&category), offers)
            })
            .collect();
        Ok(Self::new(rates))
    }
}

#[async_trait]
impl OfferCatalog for StaticOfferCatalog {
    async fn get_current_rates(
        &self,
        category: &MerchantCategory,
    ) -> Result<BTreeMap<InstrumentId, Decimal>, OfferCatalogError> {
        Ok(self.rates.get(category).cloned().unwrap_or_default())
    }
}
