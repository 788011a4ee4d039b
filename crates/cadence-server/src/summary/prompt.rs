//! Prompt construction.

use cadence_llm::Message;

use super::enrich::Enrichment;
use super::request::{Mode, SummaryInput};

/// Tracks listed verbatim in the prompt.
const PROMPT_TRACKS: usize = 10;

const SYSTEM_PROMPT: &str = "You write one or two sentence captions for a music \
widget on a personal website. Be specific about genre and feel, stay warm and \
casual, and never invent facts about the artists. Reply with the caption only, \
no quotes or preamble.";

/// Build the chat messages for a summary.
pub fn build_messages(input: &SummaryInput, enrichment: Option<&Enrichment>) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(user_prompt(input, enrichment)),
    ]
}

fn user_prompt(input: &SummaryInput, enrichment: Option<&Enrichment>) -> String {
    let mut prompt = match input.mode {
        Mode::Session => format!(
            "Describe this listening session of {} tracks.\n",
            input.track_count
        ),
        Mode::Active => format!(
            "Describe what is playing right now, {} tracks into the session.\n",
            input.track_count
        ),
    };

    prompt.push_str("\nTracks:\n");
    for track in input.tracks.iter().take(PROMPT_TRACKS) {
        prompt.push_str(&format!("- {} by {}\n", track.name, track.artist));
    }
    let rest = input.tracks.len().saturating_sub(PROMPT_TRACKS);
    if rest > 0 {
        prompt.push_str(&format!("- and {} more\n", rest));
    }

    if let Some(e) = enrichment {
        if let Some(years) = e.year_range {
            if years.from == years.to {
                prompt.push_str(&format!("\nReleased in {}.\n", years.from));
            } else {
                prompt.push_str(&format!("\nReleased between {} and {}.\n", years.from, years.to));
            }
        }
        if let Some(mood) = e.mood {
            prompt.push_str(&format!("Overall mood: {}.\n", mood));
        }
    }

    prompt
}
