use std::{fmt, future::Future, str::FromStr};

use time::OffsetDateTime;

/// A scale reading that is known to be a usable number.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    text: String,
    value: f64,
}

impl Reading {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl FromStr for Reading {
    type Err = anyhow::Error;

    /// Accepts plain decimal text such as `12.34`, `80` or `.5`. Signs, exponents,
    /// repeated points and anything non-numeric are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
        let points = text.chars().filter(|&c| c == '.').count();

        if digits == 0 || points > 1 || digits + points != text.chars().count() {
            anyhow::bail!("Invalid reading {:?}: expected digits with at most one decimal point", s);
        }

        let value: f64 = text.parse()?;
        Ok(Reading {
            text: text.to_string(),
            value,
        })
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A row of the `weights` table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredReading {
    pub id: i64,
    pub weight: String,
    pub confirmed: Option<bool>,
    pub created: OffsetDateTime,
}

impl StoredReading {
    /// Parse the stored text. Rows written before validation existed may fail here.
    pub fn reading(&self) -> anyhow::Result<Reading> {
        self.weight.parse()
    }
}

pub trait WeightRepository: Send + Sync {
    fn add_reading(
        &self,
        reading: &Reading,
        confirmed: bool,
    ) -> impl Future<Output = anyhow::Result<StoredReading>> + Send;

    /// The `limit` most recent rows, newest first.
    fn recent_readings(
        &self,
        limit: i64,
    ) -> impl Future<Output = anyhow::Result<Vec<StoredReading>>> + Send;

    /// Confirmed rows created after `since`, oldest first.
    fn confirmed_since(
        &self,
        since: OffsetDateTime,
    ) -> impl Future<Output = anyhow::Result<Vec<StoredReading>>> + Send;
}
