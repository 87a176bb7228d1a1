//! Correlation identifiers.
//!
//! Ids are built from bytes of the injected [`RandomSource`], so a seeded
//! simulation reproduces them.

use crate::rng::RandomSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::{Builder, Uuid};

pub const SHORT_ID_MIN_LEN: usize = 8;
pub const SHORT_ID_MAX_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdFormat {
    /// `xxxxxxxx-xxxx-4xxx-xxxx-xxxxxxxxxxxx`
    #[default]
    Hyphenated,
    /// Same token with separators stripped
    Simple,
}

/// Identifier threaded through every event of one unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn random_uuid<R: RandomSource>(rng: &mut R) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    Builder::from_random_bytes(bytes).into_uuid()
}

/// Globally unique long-form id (UUID v4)
pub fn long_id<R: RandomSource>(rng: &mut R, format: IdFormat) -> CorrelationId {
    let uuid = random_uuid(rng);
    let text = match format {
        IdFormat::Hyphenated => uuid.hyphenated().to_string(),
        IdFormat::Simple => uuid.simple().to_string(),
    };
    CorrelationId(text)
}

/// Short display id of `len` hex chars (clamped to 8..=12). Collisions are tolerated.
pub fn short_id<R: RandomSource>(rng: &mut R, len: usize) -> String {
    let len = len.clamp(SHORT_ID_MIN_LEN, SHORT_ID_MAX_LEN);
    let mut text = random_uuid(rng).simple().to_string();
    text.truncate(len);
    text
}
