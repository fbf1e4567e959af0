use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use crate::allocation::{InstrumentId, InstrumentRecord, MerchantCategory};
use crate::recommendation::UserId;

/// Field-level problem found in a CSV profile export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub line: u64,
    pub field: &'static str,
    pub value: String,
}

#[derive(Debug)]
pub(crate) enum ParseFailure {
    Csv(csv::Error),
    Row(RowError),
}

impl From<csv::Error> for ParseFailure {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

pub(crate) fn parse_records<R: Read>(
    reader: R,
) -> Result<Vec<(UserId, InstrumentRecord)>, ParseFailure> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let mut raw = csv::StringRecord::new();
    let mut records = Vec::new();

    while csv_reader.read_record(&mut raw)? {
        // Quoted fields may span lines, so take the line the record starts on.
        let line = raw.position().map_or(0, csv::Position::line);
        let row: ProfileRow = raw.deserialize(Some(&headers))?;
        records.push(row.into_record(line).map_err(ParseFailure::Row)?);
    }

    Ok(records)
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    user_id: String,
    instrument_id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    label: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    credit_limit: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    current_balance: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    default_rate: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    category_rates: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    flat_fee: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    percentage_fee: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    min_charge: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    max_charge: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    eligible_categories: Option<String>,
}

impl ProfileRow {
    fn into_record(self, line: u64) -> Result<(UserId, InstrumentRecord), RowError> {
        let decimal = |field: &'static str, raw: Option<&str>| -> Result<Option<Decimal>, RowError> {
            raw.map(|value| {
                Decimal::from_str(value).map_err(|_| RowError {
                    line,
                    field,
                    value: value.to_string(),
                })
            })
            .transpose()
        };

        let record = InstrumentRecord {
            id: InstrumentId(self.instrument_id),
            label: self.label,
            credit_limit: decimal("credit_limit", self.credit_limit.as_deref())?,
            current_balance: decimal("current_balance", self.current_balance.as_deref())?
                .unwrap_or_default(),
            reward_schedule: parse_rate_list(line, self.category_rates.as_deref())?,
            default_rate: decimal("default_rate", self.default_rate.as_deref())?
                .unwrap_or_default(),
            flat_fee: decimal("flat_fee", self.flat_fee.as_deref())?.unwrap_or_default(),
            percentage_fee: decimal("percentage_fee", self.percentage_fee.as_deref())?
                .unwrap_or_default(),
            min_charge: decimal("min_charge", self.min_charge.as_deref())?,
            max_charge: decimal("max_charge", self.max_charge.as_deref())?,
            eligible_categories: self
                .eligible_categories
                .as_deref()
                .map(parse_category_list),
        };

        Ok((UserId(self.user_id), record))
    }
}

/// `dining=0.03;travel=0.02` into a category schedule.
fn parse_rate_list(
    line: u64,
    raw: Option<&str>,
) -> Result<BTreeMap<MerchantCategory, Decimal>, RowError> {
    let mut schedule = BTreeMap::new();
    let Some(raw) = raw else {
        return Ok(schedule);
    };

    for entry in raw.split(';').map(str::trim).filter(|entry| !entry.is_empty()) {
        let invalid = || RowError {
            line,
            field: "category_rates",
            value: entry.to_string(),
        };
        let (category, rate) = entry.split_once('=').ok_or_else(invalid)?;
        let category = MerchantCategory::new(category);
        if category.is_blank() {
            return Err(invalid());
        }
        let rate = Decimal::from_str(rate.trim()).map_err(|_| invalid())?;
        schedule.insert(category, rate);
    }

    Ok(schedule)
}

fn parse_category_list(raw: &str) -> BTreeSet<MerchantCategory> {
    raw.split(';')
        .map(MerchantCategory::new)
        .filter(|category| !category.is_blank())
        .collect()
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
