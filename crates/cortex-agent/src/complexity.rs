//! ComplexityAssessor - picks the starting tier for a message
//!
//! Five features, each normalized to [0, 1], combined by weighted average:
//! length, code presence, technical vocabulary, interrogatives, and sentence
//! count. Pure and deterministic.

use crate::config::ComplexityConfig;
use cortex_core::{ComplexityAssessment, ComplexityLevel};
use regex::Regex;
use std::collections::HashSet;

const TECHNICAL_TERMS: &[&str] = &[
    "algorithm", "api", "async", "authentication", "backend", "benchmark", "binary", "buffer",
    "cache", "compiler", "concurrency", "config", "container", "cpu", "database", "deadlock",
    "debug", "dependency", "deploy", "docker", "encryption", "endpoint", "exception", "function",
    "garbage", "gpu", "hash", "heap", "http", "index", "kernel", "kubernetes", "latency",
    "library", "memory", "microservice", "migration", "mutex", "network", "optimize", "parser",
    "pointer", "pool", "protocol", "query", "race", "recursion", "refactor", "regex", "runtime",
    "schema", "server", "socket", "sql", "stack", "thread", "throughput", "tokio", "trait",
    "transaction", "compile", "lifetime", "borrow", "serialization", "scheduler", "timeout",
];

const INTERROGATIVES: &[&str] = &[
    "how", "why", "what", "which", "explain", "compare", "difference",
];

/// Feature values behind one assessment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComplexityFeatures {
    pub length: f64,
    pub code: f64,
    pub technical: f64,
    pub interrogative: f64,
    pub sentences: f64,
}

pub struct ComplexityAssessor {
    config: ComplexityConfig,
    terms: HashSet<String>,
    inline_code: Option<Regex>,
    sentence_end: Option<Regex>,
}

impl Default for ComplexityAssessor {
    fn default() -> Self {
        Self::new(ComplexityConfig::default())
    }
}

impl ComplexityAssessor {
    pub fn new(config: ComplexityConfig) -> Self {
        let mut terms: HashSet<String> = TECHNICAL_TERMS.iter().map(|t| t.to_string()).collect();
        terms.extend(config.extra_terms.iter().map(|t| t.to_lowercase()));
        Self {
            config,
            terms,
            inline_code: Regex::new(r"`[^`\n]+`").ok(),
            sentence_end: Regex::new(r"[.!?]+(\s|$)").ok(),
        }
    }

    pub fn assess(&self, text: &str) -> ComplexityAssessment {
        let score = self.score(&self.features(text));
        let level = if score < self.config.low_threshold {
            ComplexityLevel::Low
        } else if score < self.config.high_threshold {
            ComplexityLevel::Medium
        } else {
            ComplexityLevel::High
        };
        ComplexityAssessment {
            level,
            score,
            suggested_start_tier: level.start_tier(),
        }
    }

    pub fn features(&self, text: &str) -> ComplexityFeatures {
        let text = text.trim();
        if text.is_empty() {
            return ComplexityFeatures::default();
        }
        let c = &self.config;

        let code = if text.contains("```") {
            1.0
        } else if self.inline_code.as_ref().is_some_and(|re| re.is_match(text)) {
            0.5
        } else {
            0.0
        };

        let words: Vec<String> = text
            .split(|ch: char| !ch.is_alphanumeric() && ch != '_')
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();
        let technical: HashSet<&str> = words
            .iter()
            .filter(|w| self.terms.contains(w.as_str()))
            .map(|w| w.as_str())
            .collect();
        let questions = text.matches('?').count()
            + words
                .iter()
                .filter(|w| INTERROGATIVES.contains(&w.as_str()))
                .count();
        let sentences = self
            .sentence_end
            .as_ref()
            .map_or(1, |re| re.find_iter(text).count())
            .max(1);

        ComplexityFeatures {
            length: saturate(text.chars().count(), c.length_saturation_chars),
            code,
            technical: saturate(technical.len(), c.technical_saturation),
            interrogative: saturate(questions, c.interrogative_saturation),
            sentences: saturate(sentences, c.sentence_saturation),
        }
    }

    /// Weighted average of the features, in [0, 1].
    pub fn score(&self, f: &ComplexityFeatures) -> f64 {
        let c = &self.config;
        let weights = [
            c.length_weight,
            c.code_weight,
            c.technical_weight,
            c.interrogative_weight,
            c.sentence_weight,
        ];
        let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
        if total <= 0.0 {
            return 0.0;
        }
        let values = [f.length, f.code, f.technical, f.interrogative, f.sentences];
        let sum: f64 = weights
            .iter()
            .zip(values.iter())
            .map(|(w, v)| w.max(0.0) * v)
            .sum();
        (sum / total).clamp(0.0, 1.0)
    }
}

fn saturate(count: usize, at: usize) -> f64 {
    if at == 0 {
        return if count > 0 { 1.0 } else { 0.0 };
    }
    (count as f64 / at as f64).min(1.0)
}
