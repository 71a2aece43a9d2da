//! Periodic history compaction.
//!
//! Every `interval` events, the events since the last summary are condensed
//! by the generation service into a short digest plus categorized keywords
//! and ranked details. The generator is asked for a strict textual template;
//! the parser here is a line-oriented state machine that extracts what it
//! can and defaults the rest. Malformed generator output never fails a turn.

use crate::generate::{GenerationConfig, GenerationError, GenerationService};
use crate::story::{KeyDetail, Relevance, Story, StorySummary, SummaryKeywords};
use chrono::Utc;

/// Default compaction cadence, in events.
pub const DEFAULT_INTERVAL: usize = 5;

/// Default cap on retained summaries; oldest are evicted beyond this.
pub const DEFAULT_MAX_SUMMARIES: usize = 10;

/// Compacts older history into summaries and selects relevant ones for
/// context assembly.
#[derive(Debug, Clone)]
pub struct Summarizer {
    interval: usize,
    max_summaries: usize,
}

impl Summarizer {
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_summaries: DEFAULT_MAX_SUMMARIES,
        }
    }

    pub fn with_interval(mut self, interval: usize) -> Self {
        self.interval = interval.max(1);
        self
    }

    pub fn with_max_summaries(mut self, max: usize) -> Self {
        self.max_summaries = max.max(1);
        self
    }

    /// True iff the event count is a positive multiple of the interval.
    pub fn should_compact(&self, story: &Story) -> bool {
        !story.events.is_empty() && story.events.len() % self.interval == 0
    }

    /// Summarize events since the last recorded summary.
    ///
    /// Returns `Ok(None)` when there is nothing new to cover or when the
    /// generation call fails; compaction is best-effort and never aborts the
    /// surrounding turn.
    pub async fn compact(
        &self,
        story: &Story,
        generation: &dyn GenerationService,
    ) -> Result<Option<StorySummary>, GenerationError> {
        let start = story.summaries.last().map(|s| s.event_count).unwrap_or(0);
        let recent = &story.events[start.min(story.events.len())..];
        if recent.is_empty() {
            return Ok(None);
        }

        let mut prompt = format!(
            "STORY SUMMARY REQUEST\n\nStory: {} ({})\nCurrent Situation: {}\n\nRecent Events to Summarize:\n",
            story.title, story.genre, story.world.current_situation
        );
        for (i, event) in recent.iter().enumerate() {
            prompt.push_str(&format!(
                "{}. {}: {}\n",
                i + 1,
                event.kind.name(),
                event.description
            ));
        }
        prompt.push_str(
            "\nPlease create a concise summary (2-3 paragraphs) of these recent events and extract important keywords.\n\
             \nRESPONSE FORMAT:\n\
             SUMMARY:\n\
             [2-3 paragraph summary of recent events]\n\
             \nKEYWORDS:\n\
             Characters: [comma-separated character names]\n\
             Locations: [comma-separated location names]\n\
             Items: [comma-separated important items]\n\
             Concepts: [comma-separated concepts or themes]\n\
             Events: [comma-separated key events]\n\
             \nIMPORTANT DETAILS:\n\
             - [Type]: Name - Description (relevance: high/medium/low)\n\
             \nKeep the summary focused on what matters for future story development.",
        );

        let response = match generation.generate(&prompt, &GenerationConfig::summary()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "summary generation failed, skipping compaction");
                return Ok(None);
            }
        };

        let (digest, keywords, details) = parse_summary_response(&response);
        Ok(Some(StorySummary {
            event_count: story.events.len(),
            digest,
            keywords,
            details,
            created_at: Utc::now(),
        }))
    }

    /// Append a summary and evict the oldest beyond the retention cap.
    pub fn apply(&self, story: &mut Story, summary: StorySummary) {
        story.summaries.push(summary);
        let len = story.summaries.len();
        if len > self.max_summaries {
            story.summaries.drain(..len - self.max_summaries);
        }
    }

    /// Summaries worth surfacing for this input, judged by keyword overlap.
    ///
    /// A summary matches when any of its keywords appears among the input's
    /// words longer than three characters. Newest matches win, capped at
    /// `limit`.
    pub fn relevant_summaries<'a>(
        &self,
        story: &'a Story,
        input: &str,
        limit: usize,
    ) -> Vec<&'a StorySummary> {
        let words: Vec<String> = input
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.len() > 3)
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return Vec::new();
        }

        let mut matched: Vec<&StorySummary> = story
            .summaries
            .iter()
            .filter(|summary| {
                summary.keywords.iter_all().any(|keyword| {
                    let keyword = keyword.to_lowercase();
                    words.iter().any(|w| keyword.contains(w.as_str()))
                })
            })
            .collect();

        let keep = matched.len().saturating_sub(limit);
        matched.drain(..keep);
        matched
    }

    /// High-relevance details plus details whose name the input mentions.
    pub fn relevant_details<'a>(
        &self,
        story: &'a Story,
        input: &str,
        limit: usize,
    ) -> Vec<&'a KeyDetail> {
        let input = input.to_lowercase();
        let mut matched: Vec<&KeyDetail> = story
            .summaries
            .iter()
            .flat_map(|s| s.details.iter())
            .filter(|d| {
                d.relevance == Relevance::High || input.contains(&d.name.to_lowercase())
            })
            .collect();
        let keep = matched.len().saturating_sub(limit);
        matched.drain(..keep);
        matched
    }
}

impl Default for Summarizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the templated summary response.
///
/// Section markers switch parsing modes; anything unrecognized is skipped.
/// Missing sections come back as empty defaults.
fn parse_summary_response(response: &str) -> (String, SummaryKeywords, Vec<KeyDetail>) {
    enum Section {
        None,
        Summary,
        Keywords,
        Details,
    }

    let mut digest = String::new();
    let mut keywords = SummaryKeywords::default();
    let mut details = Vec::new();
    let mut section = Section::None;

    for line in response.lines() {
        let trimmed = line.trim();
        let upper = trimmed.to_uppercase();

        if upper.starts_with("SUMMARY:") {
            section = Section::Summary;
            continue;
        } else if upper.starts_with("KEYWORDS:") {
            section = Section::Keywords;
            continue;
        } else if upper.starts_with("IMPORTANT DETAILS:") {
            section = Section::Details;
            continue;
        }

        match section {
            Section::Summary if !trimmed.is_empty() => {
                if !digest.is_empty() {
                    digest.push(' ');
                }
                digest.push_str(trimmed);
            }
            Section::Keywords if !trimmed.is_empty() => {
                if let Some(rest) = strip_prefix_ci(trimmed, "Characters:") {
                    keywords.characters = split_keywords(rest);
                } else if let Some(rest) = strip_prefix_ci(trimmed, "Locations:") {
                    keywords.locations = split_keywords(rest);
                } else if let Some(rest) = strip_prefix_ci(trimmed, "Items:") {
                    keywords.items = split_keywords(rest);
                } else if let Some(rest) = strip_prefix_ci(trimmed, "Concepts:") {
                    keywords.concepts = split_keywords(rest);
                } else if let Some(rest) = strip_prefix_ci(trimmed, "Events:") {
                    keywords.events = split_keywords(rest);
                }
            }
            Section::Details if trimmed.starts_with('-') => {
                if let Some(detail) = parse_detail_line(trimmed) {
                    details.push(detail);
                }
            }
            _ => {}
        }
    }

    (digest.trim().to_string(), keywords, details)
}

// Byte-wise compare so a multi-byte char at the cut point can't panic the
// slice; prefix is ASCII, so a match guarantees the boundary.
fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.as_bytes().get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix.as_bytes()) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

fn split_keywords(rest: &str) -> Vec<String> {
    rest.split(',')
        .map(|k| k.trim().trim_matches(|c| c == '[' || c == ']').trim().to_string())
        .filter(|k| !k.is_empty() && !k.eq_ignore_ascii_case("none"))
        .collect()
}

/// Parse one `- [Type]: Name - Description (relevance: level)` line.
///
/// Every component after the type is optional in practice; a line that
/// cannot yield at least a name is dropped.
fn parse_detail_line(line: &str) -> Option<KeyDetail> {
    let rest = line.trim_start_matches('-').trim_start();
    let rest = rest.strip_prefix('[')?;
    let (kind, rest) = rest.split_once(']')?;
    let rest = rest.trim_start_matches(':').trim();

    // Trailing "(relevance: ...)" if present.
    let (body, relevance) = match rest.rfind("(relevance:") {
        Some(pos) => {
            let level = rest[pos + "(relevance:".len()..].trim_end_matches(')').trim();
            (rest[..pos].trim(), Relevance::parse(level))
        }
        None => (rest, Relevance::Low),
    };

    let (name, description) = match body.split_once(" - ") {
        Some((name, description)) => (name.trim(), description.trim()),
        None => (body.trim(), ""),
    };
    if name.is_empty() {
        return None;
    }

    Some(KeyDetail {
        kind: kind.trim().to_lowercase(),
        name: name.to_string(),
        description: description.to_string(),
        relevance,
    })
}
