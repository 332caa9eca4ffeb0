//! Serde helpers for `f64` fields where NaN means "missing" or "undefined".
//!
//! JSON has no NaN: `serde_json` writes it as `null` and then refuses to
//! read `null` back into an `f64`. These helpers write NaN as `null` and
//! read `null` back as NaN.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct Stats {
//!     #[serde(with = "sectorlab_core::serde_nan")]
//!     sharpe: f64,
//! }
//! ```

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if value.is_nan() {
        serializer.serialize_none()
    } else {
        serializer.serialize_f64(*value)
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// For `Option<f64>` fields that may hold `Some(NaN)`.
///
/// Pair with `default` and `skip_serializing_if = "Option::is_none"`: an
/// absent field is `None`, a `null` is `Some(NaN)`.
pub mod option {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => super::serialize(v, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        super::deserialize(deserializer).map(Some)
    }
}

/// Read a sequence whose `null` entries stand for NaN.
pub fn deserialize_values<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Option<f64>>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Column-major variant of [`deserialize_values`].
pub fn deserialize_columns<'de, D>(deserializer: D) -> Result<Vec<Vec<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Vec<Option<f64>>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|col| col.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
        .collect())
}
