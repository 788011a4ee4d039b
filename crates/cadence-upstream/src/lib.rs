//! Upstream API clients for the Cadence proxy.
//!
//! Everything here runs server-side with credentials the browser never sees.
//!
//! # Components
//!
//! - [`token`]: client-credentials grant and the process-wide [`TokenCache`]
//! - [`spotify`]: artist/track search, artist images, audio features
//! - [`lastfm`]: validated `user.*` passthrough
//! - [`mood`]: valence/energy to [`Mood`] classification

pub mod error;
pub mod lastfm;
pub mod mood;
pub mod spotify;
pub mod token;

pub use error::{Result, UpstreamError};
pub use lastfm::{Forwarded, LastfmClient, LastfmQuery};
pub use mood::{Mood, classify};
pub use spotify::{ArtistMatch, AudioFeatures, SpotifyClient, TrackMatch};
pub use token::{ClientCredentials, IssuedToken, TokenCache, TokenSource};
