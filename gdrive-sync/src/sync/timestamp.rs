use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Remote modification time. Compared as an instant; the string the API sent
/// is kept so it can be written back unchanged.
#[derive(Clone)]
pub struct Timestamp {
    instant: OffsetDateTime,
    raw: String,
}

impl Timestamp {
    pub fn parse(raw: &str) -> Result<Self, time::error::Parse> {
        let instant = OffsetDateTime::parse(raw, &Rfc3339)?;
        Ok(Self {
            instant,
            raw: raw.to_string(),
        })
    }

    /// `1970-01-01T00:00:00.000Z`, the value of a file that was never synced.
    pub fn epoch() -> Self {
        Self {
            instant: OffsetDateTime::UNIX_EPOCH,
            raw: "1970-01-01T00:00:00.000Z".to_string(),
        }
    }

    pub fn instant(&self) -> OffsetDateTime {
        self.instant
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.instant == other.instant
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant.cmp(&other.instant)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.raw)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(&raw).map_err(serde::de::Error::custom)
    }
}
