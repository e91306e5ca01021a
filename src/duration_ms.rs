//! Serde helpers that encode [`Duration`] as integer milliseconds.
//!
//! Used with `#[serde(with = "crate::duration_ms")]` on model and config fields so
//! an external loader can write `"timeout": 10000`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub(crate) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
    s.serialize_u64(ms)
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
}
