//! Mood classification from Spotify audio features.

use serde::{Deserialize, Serialize};

use crate::spotify::AudioFeatures;

const BALANCED_LOW: f64 = 0.4;
const BALANCED_HIGH: f64 = 0.6;
const MIDPOINT: f64 = 0.5;

/// Coarse mood of a listening session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mood {
    Balanced,
    EuphoricEnergetic,
    ContentCalm,
    TenseEnergetic,
    MelancholicCalm,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Balanced => "balanced",
            Mood::EuphoricEnergetic => "euphoric-energetic",
            Mood::ContentCalm => "content-calm",
            Mood::TenseEnergetic => "tense-energetic",
            Mood::MelancholicCalm => "melancholic-calm",
        }
    }

    /// Classify the mean valence and energy of a set of tracks.
    ///
    /// Returns `None` for an empty set.
    pub fn from_features(features: &[AudioFeatures]) -> Option<Self> {
        if features.is_empty() {
            return None;
        }
        let n = features.len() as f64;
        let valence = features.iter().map(|f| f.valence).sum::<f64>() / n;
        let energy = features.iter().map(|f| f.energy).sum::<f64>() / n;
        Some(classify(valence, energy))
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map valence and energy onto a [`Mood`].
///
/// Both values inside `[0.4, 0.6]` is `Balanced`; otherwise the quadrant
/// around 0.5 decides.
pub fn classify(valence: f64, energy: f64) -> Mood {
    let mid = |x: f64| (BALANCED_LOW..=BALANCED_HIGH).contains(&x);
    if mid(valence) && mid(energy) {
        return Mood::Balanced;
    }
    match (valence >= MIDPOINT, energy >= MIDPOINT) {
        (true, true) => Mood::EuphoricEnergetic,
        (true, false) => Mood::ContentCalm,
        (false, true) => Mood::TenseEnergetic,
        (false, false) => Mood::MelancholicCalm,
    }
}
