//! Progressive scoring of streamed output
//!
//! Output is cut into fixed token windows. Each window is searched for three
//! families of low-confidence language; enough weighted hits in one window
//! recommends restarting on a more capable tier.

use crate::config::ScorerConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};

const CHARS_PER_TOKEN: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorFamily {
    Uncertainty,
    SelfCorrection,
    Hedging,
}

impl IndicatorFamily {
    pub const ALL: [IndicatorFamily; 3] = [
        IndicatorFamily::Uncertainty,
        IndicatorFamily::SelfCorrection,
        IndicatorFamily::Hedging,
    ];

    fn phrases(self) -> &'static [&'static str] {
        match self {
            IndicatorFamily::Uncertainty => &[
                "not sure",
                "not certain",
                "might be",
                "could be wrong",
                "i don't know",
                "hard to say",
                "unclear",
            ],
            IndicatorFamily::SelfCorrection => &[
                "actually",
                "wait",
                "let me reconsider",
                "on second thought",
                "scratch that",
                "correction",
                "i mean",
            ],
            IndicatorFamily::Hedging => &[
                "possibly",
                "perhaps",
                "maybe",
                "probably",
                "it seems",
                "arguably",
                "somewhat",
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IndicatorFamily::Uncertainty => "uncertainty",
            IndicatorFamily::SelfCorrection => "self-correction",
            IndicatorFamily::Hedging => "hedging",
        }
    }
}

/// Result of analyzing one window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreVerdict {
    pub should_upgrade: bool,
    pub reason: Option<String>,
    /// Raw indicator hits across all families.
    pub matched_indicator_count: usize,
    pub weighted_count: f64,
    /// min(1, weighted hits / divisor)
    pub confidence: f64,
    /// Families with at least one hit.
    pub families: Vec<IndicatorFamily>,
    pub token_offset: usize,
}

pub struct ProgressiveScorer {
    config: ScorerConfig,
    patterns: Vec<(IndicatorFamily, Regex)>,
}

impl Default for ProgressiveScorer {
    fn default() -> Self {
        Self::new(ScorerConfig::default())
    }
}

impl ProgressiveScorer {
    pub fn new(config: ScorerConfig) -> Self {
        let patterns = IndicatorFamily::ALL
            .into_iter()
            .filter_map(|family| {
                let alternatives: Vec<String> = family
                    .phrases()
                    .iter()
                    .map(|p| regex::escape(p).replace(' ', r"\s+"))
                    .collect();
                let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
                Regex::new(&pattern).ok().map(|re| (family, re))
            })
            .collect();
        Self { config, patterns }
    }

    pub fn window_tokens(&self) -> usize {
        self.config.window_tokens.max(1)
    }

    fn weight(&self, family: IndicatorFamily) -> f64 {
        match family {
            IndicatorFamily::Uncertainty => self.config.uncertainty_weight,
            IndicatorFamily::SelfCorrection => self.config.self_correction_weight,
            IndicatorFamily::Hedging => self.config.hedging_weight,
        }
    }

    pub fn analyze(&self, window: &str, token_offset: usize) -> ScoreVerdict {
        // Curly apostrophes in "I don’t know".
        let text = window.replace('\u{2019}', "'");

        let mut hits = 0;
        let mut weighted = 0.0;
        let mut families = Vec::new();
        for (family, re) in &self.patterns {
            let n = re.find_iter(&text).count();
            if n > 0 {
                hits += n;
                weighted += n as f64 * self.weight(*family);
                families.push(*family);
            }
        }

        let divisor = if self.config.confidence_divisor > 0.0 {
            self.config.confidence_divisor
        } else {
            1.0
        };
        let confidence = (weighted / divisor).min(1.0);
        let should_upgrade =
            weighted >= self.config.hit_threshold && confidence >= self.config.confidence_floor;

        let reason = should_upgrade.then(|| {
            let names: Vec<&str> = families.iter().map(|f| f.as_str()).collect();
            format!(
                "{} low-confidence indicators ({}) at token {}",
                hits,
                names.join(", "),
                token_offset
            )
        });

        ScoreVerdict {
            should_upgrade,
            reason,
            matched_indicator_count: hits,
            weighted_count: weighted,
            confidence,
            families,
            token_offset,
        }
    }
}

/// Cuts streamed text into windows of `window_tokens` (about 4 chars each),
/// preferring to break on whitespace.
pub struct TokenWindower {
    window_chars: usize,
    buffer: String,
    emitted_tokens: usize,
}

impl TokenWindower {
    pub fn new(window_tokens: usize) -> Self {
        Self {
            window_chars: window_tokens.max(1) * CHARS_PER_TOKEN,
            buffer: String::new(),
            emitted_tokens: 0,
        }
    }

    /// Feed a chunk; returns every window it completed as `(text, token_offset)`.
    pub fn push(&mut self, chunk: &str) -> Vec<(String, usize)> {
        self.buffer.push_str(chunk);
        let mut out = Vec::new();
        while self.buffer.len() >= self.window_chars {
            let cut = split_point(&self.buffer, self.window_chars);
            let rest = self.buffer.split_off(cut);
            let window = std::mem::replace(&mut self.buffer, rest);
            out.push(self.emit(window));
        }
        out
    }

    /// The trailing partial window, if any text is left.
    pub fn finish(&mut self) -> Option<(String, usize)> {
        if self.buffer.trim().is_empty() {
            self.buffer.clear();
            return None;
        }
        let window = std::mem::take(&mut self.buffer);
        Some(self.emit(window))
    }

    fn emit(&mut self, window: String) -> (String, usize) {
        let offset = self.emitted_tokens;
        self.emitted_tokens += window.len().div_ceil(CHARS_PER_TOKEN);
        (window, offset)
    }
}

/// Byte index at or before `limit` to cut at: after the last whitespace if
/// there is one, else the nearest char boundary.
fn split_point(text: &str, limit: usize) -> usize {
    let mut limit = limit.min(text.len());
    while !text.is_char_boundary(limit) {
        limit -= 1;
    }
    match text[..limit].rfind(char::is_whitespace) {
        Some(ws) if ws > 0 => ws + text[ws..].chars().next().map_or(1, |c| c.len_utf8()),
        _ if limit > 0 => limit,
        _ => text.chars().next().map_or(text.len(), |c| c.len_utf8()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrases_match_case_insensitively_on_word_boundaries() {
        let s = ProgressiveScorer::default();
        let v = s.analyze("PERHAPS. Awaiting results, maybe.", 0);
        // "Awaiting" must not count as "wait".
        assert_eq!(v.matched_indicator_count, 2);
        assert_eq!(v.families, vec![IndicatorFamily::Hedging]);
    }

    #[test]
    fn windower_splits_on_whitespace() {
        let mut w = TokenWindower::new(2);
        let out = w.push("abc defgh ij");
        assert_eq!(out[0].0, "abc ");
        assert_eq!(out[0].1, 0);
        let tail = w.finish().unwrap();
        assert_eq!(out.iter().map(|(t, _)| t.as_str()).collect::<String>() + &tail.0, "abc defgh ij");
    }

    #[test]
    fn windower_offsets_accumulate() {
        let mut w = TokenWindower::new(10);
        let text = "word ".repeat(24);
        let windows = w.push(&text);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].1, 0);
        assert_eq!(windows[1].1, 10);
        assert!(w.finish().is_none());
    }
}
