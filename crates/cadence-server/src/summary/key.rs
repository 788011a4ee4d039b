//! Content-addressed summary cache keys.

use sha2::{Digest, Sha256};

use super::request::{Mode, Track};

/// Prefix for every summary key; bump when the stored format changes.
pub const KEY_PREFIX: &str = "summary:v1:";

const FIELD_SEP: char = '\u{1f}';
const MODE_SEP: char = '\u{1e}';

/// Cache key for a track list and mode.
///
/// Case and surrounding whitespace do not matter; track order and mode do.
pub fn cache_key(tracks: &[Track], mode: Mode) -> String {
    let mut canonical = tracks
        .iter()
        .map(|t| {
            format!(
                "{}{}{}",
                t.name.trim().to_lowercase(),
                FIELD_SEP,
                t.artist.trim().to_lowercase()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    canonical.push(MODE_SEP);
    canonical.push_str(mode.as_str());

    let digest = Sha256::digest(canonical.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", KEY_PREFIX, hex)
}
