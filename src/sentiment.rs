//! Lexicon sentiment over collected item texts.
//!
//! Every text is classified positive, negative or neutral by the sign of its
//! lexicon score; a negator within the three preceding tokens flips a word.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

static LEXICON: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| {
    let positive = [
        "good", "great", "awesome", "excellent", "amazing", "love", "best", "perfect", "fast",
        "improved", "stable", "released", "win", "nice", "useful",
    ];
    let negative = [
        "bad", "terrible", "awful", "hate", "worst", "horrible", "sucks", "disappointing", "slow",
        "broken", "bug", "crash", "vulnerability", "deprecated", "outage",
    ];
    positive
        .into_iter()
        .map(|w| (w, 1))
        .chain(negative.into_iter().map(|w| (w, -1)))
        .collect()
});

#[derive(Debug, Clone, Default)]
pub struct SentimentAnalyzer;

/// Fractions of texts per class; they sum to 1.0 (all neutral when empty).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentBreakdown {
    pub positive: f32,
    pub negative: f32,
    pub neutral: f32,
    pub samples: usize,
}

impl Default for SentimentBreakdown {
    fn default() -> Self {
        Self {
            positive: 0.0,
            negative: 0.0,
            neutral: 1.0,
            samples: 0,
        }
    }
}

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        LEXICON.get(w).copied().unwrap_or(0)
    }

    /// Returns (score, token count).
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score: i32 = 0;

        for (i, w) in tokens.iter().enumerate() {
            let base = self.word_score(w);
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
        }

        (score, tokens.len())
    }

    pub fn breakdown<I, S>(&self, texts: I) -> SentimentBreakdown
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (mut pos, mut neg, mut total) = (0usize, 0usize, 0usize);
        for t in texts {
            total += 1;
            match self.score_text(t.as_ref()).0 {
                s if s > 0 => pos += 1,
                s if s < 0 => neg += 1,
                _ => {}
            }
        }
        if total == 0 {
            return SentimentBreakdown::default();
        }
        let n = total as f32;
        SentimentBreakdown {
            positive: pos as f32 / n,
            negative: neg as f32 / n,
            neutral: (total - pos - neg) as f32 / n,
            samples: total,
        }
    }
}

/// Lowercase tokens; apostrophes stay inside words so "isn't" survives.
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "wasn't"
            | "aren't"
            | "won't"
            | "can't"
            | "cannot"
            | "without"
            | "don't"
            | "doesn't"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_flips_polarity() {
        let a = SentimentAnalyzer::new();
        assert_eq!(a.score_text("This crate is great").0, 1);
        assert_eq!(a.score_text("This crate isn't great").0, -1);
        assert_eq!(a.score_text("not a bad release at all").0, 1);
    }

    #[test]
    fn breakdown_fractions_sum_to_one() {
        let a = SentimentAnalyzer::new();
        let b = a.breakdown(["awesome release", "terrible outage", "weekly thread", "meh"]);
        assert_eq!(b.samples, 4);
        assert!((b.positive - 0.25).abs() < f32::EPSILON);
        assert!((b.negative - 0.25).abs() < f32::EPSILON);
        assert!((b.neutral - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_input_is_neutral() {
        let b = SentimentAnalyzer::new().breakdown(Vec::<String>::new());
        assert_eq!(b, SentimentBreakdown::default());
        assert_eq!(b.neutral, 1.0);
    }
}
