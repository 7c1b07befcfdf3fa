//! Stat classification.
//!
//! Every producer of [`Sample`]s goes through [`classify`]: the rate engine
//! relies on the kind being right and on `is_null` being set whenever the
//! driver returned no value (never a zero in its place).

use crate::types::{Sample, StatKind};

/// A scalar as handed over by a database driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Null,
    Int(i64),
    UInt(u64),
    /// Numeric text, as returned for `VARCHAR` status columns.
    Text(String),
}

/// A raw value that cannot be read as an integer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("value {value:?} is not an integer")]
pub struct ValueError {
    pub value: String,
}

impl RawValue {
    /// Reads the value as a signed 64-bit integer, `None` for `Null`.
    ///
    /// Unsigned values above `i64::MAX` keep their bit pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] when text is not a base-10 integer.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlmon_common::classify::RawValue;
    ///
    /// assert_eq!(RawValue::Text("1024".into()).to_i64().unwrap(), Some(1024));
    /// assert_eq!(RawValue::Null.to_i64().unwrap(), None);
    /// assert!(RawValue::Text("ON".into()).to_i64().is_err());
    /// ```
    pub fn to_i64(&self) -> Result<Option<i64>, ValueError> {
        match self {
            RawValue::Null => Ok(None),
            RawValue::Int(v) => Ok(Some(*v)),
            RawValue::UInt(v) => Ok(Some(*v as i64)),
            RawValue::Text(s) => s
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ValueError { value: s.clone() }),
        }
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<u64> for RawValue {
    fn from(value: u64) -> Self {
        RawValue::UInt(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(RawValue::Null, Into::into)
    }
}

/// Wraps an already-converted value into a typed sample.
pub fn classify(kind: StatKind, value: Option<i64>) -> Sample {
    Sample {
        value: value.unwrap_or_default(),
        kind,
        is_null: value.is_none(),
    }
}

/// Converts a raw driver value and classifies it in one step.
///
/// # Errors
///
/// Propagates [`ValueError`] from [`RawValue::to_i64`].
pub fn classify_raw(kind: StatKind, raw: &RawValue) -> Result<Sample, ValueError> {
    Ok(classify(kind, raw.to_i64()?))
}
