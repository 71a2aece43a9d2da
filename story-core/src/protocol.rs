//! Generator roll directives.
//!
//! The generator may request a dice roll mid-response by emitting a sentinel
//! line: `ROLL: d20 | situation=<tag> | reason=<free text>`. This module
//! scans responses for that line, resolves the roll, runs a follow-up
//! generation with the outcome, and scrubs any protocol residue so players
//! never see mechanics leak into the narration.
//!
//! The parser is deliberately forgiving: the sentinel must own its line, but
//! casing, spacing, and field order do not matter, and both fields are
//! optional. A directive that cannot be parsed is simply not a directive.

use crate::context::ContextBuilder;
use crate::dice::{self, DiceOutcome, Situation};
use crate::generate::{GenerationConfig, GenerationService};
use crate::story::Story;
use rand::Rng;

const ROLL_FOLLOWUP: &str = include_str!("prompts/roll_followup.txt");

/// A parsed roll request from the generator, fields still free text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RollDirective {
    pub situation: Option<String>,
    pub reason: Option<String>,
}

/// Find the first roll directive in a response.
///
/// Returns the directive and the response with every directive line removed.
/// `None` when no line parses as a directive.
pub fn scan_directive(text: &str) -> Option<(RollDirective, String)> {
    let mut directive = None;
    let mut kept = Vec::new();

    for line in text.lines() {
        match parse_directive_line(line) {
            Some(parsed) => {
                if directive.is_none() {
                    directive = Some(parsed);
                }
            }
            None => kept.push(line),
        }
    }

    directive.map(|d| (d, kept.join("\n").trim().to_string()))
}

/// Parse one line as a roll directive, or reject it.
fn parse_directive_line(line: &str) -> Option<RollDirective> {
    let trimmed = line.trim();
    let rest = strip_prefix_ci(trimmed, "ROLL:")?.trim();

    let mut fields = rest.split('|').map(str::trim);
    // First field must be the die spec.
    if !fields.next()?.eq_ignore_ascii_case("d20") {
        return None;
    }

    let mut directive = RollDirective::default();
    for field in fields {
        if let Some(value) = strip_prefix_ci(field, "situation=") {
            let value = value.trim();
            if !value.is_empty() {
                directive.situation = Some(value.to_string());
            }
        } else if let Some(value) = strip_prefix_ci(field, "reason=") {
            let value = value.trim();
            if !value.is_empty() {
                directive.reason = Some(value.to_string());
            }
        }
    }
    Some(directive)
}

// Byte-wise compare so a multi-byte char at the cut point can't panic the
// slice; prefix is ASCII, so a match guarantees the boundary.
fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.as_bytes().get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix.as_bytes()) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Remove protocol residue from narration: leftover `ROLL:` lines, roll
/// reminders, and bracketed system-hint lines.
pub fn scrub(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim();
            let lower = trimmed.to_lowercase();
            if lower.starts_with("roll:") {
                return false;
            }
            if lower.contains("remember to roll") || lower.contains("don't forget to roll") {
                return false;
            }
            // Whole lines wrapped in brackets are system hints, not narration.
            if trimmed.len() > 1
                && ((trimmed.starts_with('[') && trimmed.ends_with(']'))
                    || (trimmed.starts_with('(')
                        && trimmed.ends_with(')')
                        && lower.contains("system")))
            {
                return false;
            }
            true
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Resolves generator-requested rolls across a second generation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollProtocol;

impl RollProtocol {
    /// Handle a first-pass response for a turn that has not rolled yet.
    ///
    /// Directive resolution order: an explicit sentinel in the response, then
    /// lexical cues in the player's own input, then no roll at all. When a
    /// roll happens, a follow-up generation narrates the outcome; if that
    /// call fails the stripped first response is kept (degraded, but the
    /// outcome is still recorded).
    pub async fn process<R: Rng>(
        &self,
        raw: String,
        player_input: &str,
        story: &Story,
        context: &ContextBuilder,
        generation: &dyn GenerationService,
        rng: &mut R,
    ) -> (String, Option<DiceOutcome>) {
        let (situation, stripped) = match scan_directive(&raw) {
            Some((directive, stripped)) => {
                let situation = directive
                    .situation
                    .as_deref()
                    .map(Situation::normalize)
                    .unwrap_or(Situation::Investigation);
                (situation, stripped)
            }
            None => match Situation::detect(player_input) {
                Some(situation) => (situation, scrub(&raw)),
                None => return (scrub(&raw), None),
            },
        };

        let outcome = dice::roll_for_situation_with_rng(situation, rng);
        tracing::debug!(situation = %outcome.situation, roll = outcome.roll, "resolved roll");

        let mut followup = context.build(story, player_input, Some(&outcome));
        followup.push_str(ROLL_FOLLOWUP);

        match generation
            .generate(&followup, &GenerationConfig::narrative())
            .await
        {
            Ok(narration) => (scrub(&narration), Some(outcome)),
            Err(e) => {
                tracing::warn!(error = %e, "roll follow-up failed, keeping first response");
                (stripped, Some(outcome))
            }
        }
    }
}
