// src/utils/id_generator.rs
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record kinds that carry generated IDs. The prefix is what operators read
/// out over the radio, so it stays short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    Request,
    Ambulance,
    Driver,
    Location,
}

const ALL_TYPES: [IdType; 4] = [
    IdType::Request,
    IdType::Ambulance,
    IdType::Driver,
    IdType::Location,
];

// No 0/o or 1/l, which get confused when read aloud
const SUFFIX_CHARS: &[u8] = b"23456789abcdefghijkmnpqrstuvwxyz";
const SUFFIX_LEN: usize = 5;

impl IdType {
    pub fn to_prefix(&self) -> &'static str {
        match self {
            IdType::Request => "amr",
            IdType::Ambulance => "amb",
            IdType::Driver => "drv",
            IdType::Location => "loc",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        ALL_TYPES.into_iter().find(|kind| kind.to_prefix() == prefix)
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_prefix())
    }
}

pub struct IdGenerator;

impl IdGenerator {
    /// `{prefix}-{yymmdd}-{suffix}`, e.g. `amr-240301-k7d2x`.
    pub fn generate(id_type: IdType) -> String {
        Self::generate_with_timestamp(id_type, Utc::now())
    }

    /// Same as `generate`, dated from the dispatch clock rather than wall time.
    pub fn generate_with_timestamp(id_type: IdType, timestamp: DateTime<Utc>) -> String {
        format!("{}-{}-{}", id_type, timestamp.format("%y%m%d"), Self::random_suffix())
    }

    fn random_suffix() -> String {
        let mut rng = rand::rng();
        (0..SUFFIX_LEN)
            .map(|_| SUFFIX_CHARS[rng.random_range(0..SUFFIX_CHARS.len())] as char)
            .collect()
    }

    pub fn parse_id(id: &str) -> Option<ParsedId> {
        let mut parts = id.split('-');
        let (prefix, date_part, random_suffix) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some()
            || date_part.len() != 6
            || !date_part.bytes().all(|b| b.is_ascii_digit())
            || random_suffix.len() != SUFFIX_LEN
            || !random_suffix.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return None;
        }

        let id_type = IdType::from_prefix(prefix)?;
        let year = 2000 + date_part[0..2].parse::<i32>().ok()?;
        let month = date_part[2..4].parse::<u32>().ok()?;
        let day = date_part[4..6].parse::<u32>().ok()?;

        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return None;
        }

        Some(ParsedId {
            id_type,
            year,
            month,
            day,
            random_suffix: random_suffix.to_string(),
        })
    }

    /// True when `id` parses and, if given, has the expected kind.
    pub fn validate_id(id: &str, expected_type: Option<IdType>) -> bool {
        Self::parse_id(id).is_some_and(|parsed| expected_type.is_none_or(|expected| parsed.id_type == expected))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedId {
    pub id_type: IdType,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub random_suffix: String,
}

impl ParsedId {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, self.day, 0, 0, 0).single()
    }
}
