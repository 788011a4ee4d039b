//! Summary request body and validation.

use serde::Deserialize;

use crate::error::{Result, ServerError};

/// What the summary describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// A finished listening session.
    #[default]
    Session,
    /// What is playing right now.
    Active,
}

impl Mode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "session" => Some(Mode::Session),
            "active" => Some(Mode::Active),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Session => "session",
            Mode::Active => "active",
        }
    }
}

/// One track as sent by the widget.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
}

/// Raw `POST /?type=summary` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    #[serde(default)]
    pub tracks: Vec<TrackInput>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub track_count: Option<usize>,
}

/// A track that survived validation, trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub name: String,
    pub artist: String,
}

/// A validated summary request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryInput {
    pub tracks: Vec<Track>,
    pub mode: Mode,
    /// Size of the session as the widget counts it.
    pub track_count: usize,
}

impl SummaryRequest {
    /// Parse a request body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| ServerError::BadRequest(format!("Invalid JSON body: {}", e)))
    }

    /// Validate and normalize.
    ///
    /// Only the first `max_tracks` entries are considered; entries with an
    /// empty name or artist are dropped.
    pub fn validate(self, max_tracks: usize) -> Result<SummaryInput> {
        if self.tracks.is_empty() {
            return Err(ServerError::BadRequest("No tracks provided".to_string()));
        }

        let mode = match self.mode.as_deref() {
            None => Mode::default(),
            Some(raw) => Mode::parse(raw)
                .ok_or_else(|| ServerError::BadRequest(format!("Invalid mode: {}", raw)))?,
        };

        let track_count = self.track_count.unwrap_or(self.tracks.len());
        let tracks: Vec<Track> = self
            .tracks
            .into_iter()
            .take(max_tracks)
            .filter_map(|t| {
                let name = t.name.trim();
                let artist = t.artist.trim();
                (!name.is_empty() && !artist.is_empty()).then(|| Track {
                    name: name.to_string(),
                    artist: artist.to_string(),
                })
            })
            .collect();

        if tracks.is_empty() {
            return Err(ServerError::BadRequest(
                "No tracks with both name and artist".to_string(),
            ));
        }

        Ok(SummaryInput {
            tracks,
            mode,
            track_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<SummaryInput> {
        SummaryRequest::from_slice(json.as_bytes())?.validate(50)
    }

    #[test]
    fn test_defaults() {
        let input = parse(r#"{"tracks":[{"name":"Teardrop","artist":"Massive Attack"}]}"#).unwrap();
        assert_eq!(input.mode, Mode::Session);
        assert_eq!(input.track_count, 1);
        assert_eq!(input.tracks[0].name, "Teardrop");
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(parse("{not json"), Err(ServerError::BadRequest(_))));
    }

    #[test]
    fn test_empty_tracks() {
        let err = parse(r#"{"tracks":[]}"#).unwrap_err();
        assert_eq!(err.to_string(), "No tracks provided");
        assert!(parse("{}").is_err());
    }

    #[test]
    fn test_unknown_mode() {
        let err = parse(r#"{"tracks":[{"name":"a","artist":"b"}],"mode":"party"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Invalid mode: party");

        let input = parse(r#"{"tracks":[{"name":"a","artist":"b"}],"mode":"Active"}"#).unwrap();
        assert_eq!(input.mode, Mode::Active);
    }

    #[test]
    fn test_drops_incomplete_entries_and_trims() {
        let input = parse(
            r#"{"tracks":[{"name":"  a ","artist":" b"},{"name":"","artist":"x"},{"name":"c"}],"trackCount":12}"#,
        )
        .unwrap();
        assert_eq!(
            input.tracks,
            vec![Track {
                name: "a".into(),
                artist: "b".into()
            }]
        );
        assert_eq!(input.track_count, 12);

        assert!(parse(r#"{"tracks":[{"name":" ","artist":"x"}]}"#).is_err());
    }

    #[test]
    fn test_truncates_to_max_tracks() {
        let tracks: Vec<String> = (0..80)
            .map(|i| format!(r#"{{"name":"t{}","artist":"a"}}"#, i))
            .collect();
        let body = format!(r#"{{"tracks":[{}]}}"#, tracks.join(","));
        let input = parse(&body).unwrap();
        assert_eq!(input.tracks.len(), 50);
        assert_eq!(input.track_count, 80);
    }
}
