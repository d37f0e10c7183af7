//! Lexicon oracle
//!
//! A deterministic word-polarity scorer used as the built-in oracle. Each
//! token contributes its weight; negators flip the next few tokens,
//! intensifiers scale the next one, and exclamation marks push the sum
//! further from zero. The sum is squashed through a logistic curve into
//! P(POSITIVE).
//!
//! Extra words can be supplied in `<cache_dir>/lexicon.toml`:
//!
//! ```toml
//! [positive]
//! stellar = 2.5
//!
//! [negative]
//! janky = 2.0
//! ```

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::classifier::oracle::{OracleError, Prediction, SentimentOracle};
use crate::storage::Label;

/// File name looked up in the cache directory
pub const LEXICON_FILE: &str = "lexicon.toml";

/// Tokens after a negator whose polarity is flipped
const NEGATION_SCOPE: usize = 3;

/// Logistic steepness
const STEEPNESS: f64 = 1.2;

const EXCLAMATION_BOOST: f64 = 0.25;

const POSITIVE_WORDS: &[(&str, f64)] = &[
    ("love", 3.0),
    ("loved", 3.0),
    ("loves", 3.0),
    ("amazing", 3.0),
    ("awesome", 3.0),
    ("excellent", 3.0),
    ("fantastic", 3.0),
    ("wonderful", 3.0),
    ("perfect", 3.0),
    ("outstanding", 3.0),
    ("brilliant", 3.0),
    ("great", 2.5),
    ("best", 2.5),
    ("delightful", 2.5),
    ("superb", 2.5),
    ("happy", 2.0),
    ("good", 2.0),
    ("nice", 1.5),
    ("enjoy", 2.0),
    ("enjoyed", 2.0),
    ("like", 1.5),
    ("liked", 1.5),
    ("recommend", 2.0),
    ("beautiful", 2.5),
    ("pleased", 2.0),
    ("glad", 1.5),
    ("fast", 1.0),
    ("helpful", 2.0),
    ("works", 1.0),
    ("fine", 0.5),
    ("okay", 0.3),
    ("ok", 0.3),
    ("satisfied", 2.0),
    ("impressive", 2.5),
    ("reliable", 1.5),
];

const NEGATIVE_WORDS: &[(&str, f64)] = &[
    ("hate", 3.0),
    ("hated", 3.0),
    ("terrible", 3.0),
    ("awful", 3.0),
    ("horrible", 3.0),
    ("worst", 3.0),
    ("disgusting", 3.0),
    ("useless", 2.5),
    ("bad", 2.0),
    ("poor", 2.0),
    ("disappointing", 2.5),
    ("disappointed", 2.5),
    ("broken", 2.0),
    ("sad", 2.0),
    ("angry", 2.0),
    ("annoying", 2.0),
    ("boring", 2.0),
    ("slow", 1.0),
    ("waste", 2.5),
    ("refund", 1.5),
    ("problem", 1.5),
    ("problems", 1.5),
    ("fail", 2.0),
    ("failed", 2.0),
    ("fails", 2.0),
    ("ugly", 2.0),
    ("mediocre", 1.5),
    ("nothing", 0.5),
    ("wrong", 1.5),
    ("cheap", 1.0),
    ("frustrating", 2.5),
];

const NEGATORS: &[&str] = &[
    "not", "no", "never", "none", "nobody", "neither", "nor", "hardly", "barely", "without",
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.5),
    ("really", 1.5),
    ("extremely", 1.8),
    ("absolutely", 1.8),
    ("so", 1.3),
    ("super", 1.5),
    ("totally", 1.5),
    ("incredibly", 1.8),
    ("quite", 1.2),
    ("slightly", 0.5),
    ("somewhat", 0.6),
];

#[derive(Debug, Default, Deserialize)]
struct LexiconFile {
    #[serde(default)]
    positive: HashMap<String, f64>,
    #[serde(default)]
    negative: HashMap<String, f64>,
}

/// Word-polarity sentiment oracle
pub struct LexiconOracle {
    name: String,
    /// Signed weight per lowercase word
    weights: HashMap<String, f64>,
    intensifiers: HashMap<&'static str, f64>,
    tokenizer: Regex,
}

impl LexiconOracle {
    /// Build the oracle with the built-in word lists
    pub fn new(name: impl Into<String>) -> Result<Self, OracleError> {
        let tokenizer =
            Regex::new(r"[a-z]+(?:'[a-z]+)?").map_err(|e| OracleError::Load(e.to_string()))?;

        let mut weights = HashMap::new();
        for (word, weight) in POSITIVE_WORDS {
            weights.insert((*word).to_string(), *weight);
        }
        for (word, weight) in NEGATIVE_WORDS {
            weights.insert((*word).to_string(), -*weight);
        }

        Ok(Self {
            name: name.into(),
            weights,
            intensifiers: INTENSIFIERS.iter().copied().collect(),
            tokenizer,
        })
    }

    /// Build the oracle and merge `<cache_dir>/lexicon.toml` if present
    pub fn load(name: impl Into<String>, cache_dir: &Path) -> Result<Self, OracleError> {
        let mut oracle = Self::new(name)?;
        let path = cache_dir.join(LEXICON_FILE);

        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| OracleError::Load(format!("{}: {}", path.display(), e)))?;
            let file: LexiconFile = toml::from_str(&content)
                .map_err(|e| OracleError::Load(format!("{}: {}", path.display(), e)))?;
            let added = oracle.extend(file)?;
            tracing::info!(path = %path.display(), words = added, "Loaded custom lexicon");
        }

        Ok(oracle)
    }

    fn extend(&mut self, file: LexiconFile) -> Result<usize, OracleError> {
        let mut added = 0;
        for (word, weight, sign) in file
            .positive
            .into_iter()
            .map(|(w, x)| (w, x, 1.0))
            .chain(file.negative.into_iter().map(|(w, x)| (w, x, -1.0)))
        {
            if !weight.is_finite() || weight < 0.0 {
                return Err(OracleError::Load(format!(
                    "weight for {:?} must be a non-negative number",
                    word
                )));
            }
            self.weights.insert(word.to_lowercase(), sign * weight);
            added += 1;
        }
        Ok(added)
    }

    /// Signed polarity sum for one text
    fn polarity(&self, text: &str) -> f64 {
        let lowered = text.to_lowercase();
        let mut sum = 0.0;
        let mut negate_left = 0usize;
        let mut boost = 1.0;

        for token in self.tokenizer.find_iter(&lowered).map(|m| m.as_str()) {
            if NEGATORS.contains(&token) || token.ends_with("n't") {
                negate_left = NEGATION_SCOPE;
                continue;
            }
            if let Some(factor) = self.intensifiers.get(token) {
                boost *= factor;
                continue;
            }

            if let Some(weight) = self.weights.get(token) {
                let signed = if negate_left > 0 { -weight } else { *weight };
                sum += signed * boost;
            }
            boost = 1.0;
            negate_left = negate_left.saturating_sub(1);
        }

        let exclamations = lowered.matches('!').count().min(3) as f64;
        if sum != 0.0 {
            sum += sum.signum() * exclamations * EXCLAMATION_BOOST;
        }
        sum
    }

    fn distribution(&self, text: &str) -> Vec<Prediction> {
        let positive = 1.0 / (1.0 + (-STEEPNESS * self.polarity(text)).exp());
        vec![
            Prediction::new(Label::Positive, positive),
            Prediction::new(Label::Negative, 1.0 - positive),
        ]
    }
}

impl SentimentOracle for LexiconOracle {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn predict(&self, texts: &[String]) -> Result<Vec<Vec<Prediction>>, OracleError> {
        Ok(texts.iter().map(|t| self.distribution(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn top(oracle: &LexiconOracle, text: &str) -> Prediction {
        let dist = oracle.predict(&[text.to_string()]).unwrap().remove(0);
        dist.into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .unwrap()
    }

    #[test]
    fn test_positive_and_negative() {
        let oracle = LexiconOracle::new("lexicon").unwrap();

        let p = top(&oracle, "I love this product!");
        assert_eq!(p.label, Label::Positive);
        assert!(p.score > 0.5 && p.score <= 1.0);

        let n = top(&oracle, "Terrible.");
        assert_eq!(n.label, Label::Negative);
        assert!(n.score > 0.5);
    }

    #[test]
    fn test_negation_flips() {
        let oracle = LexiconOracle::new("lexicon").unwrap();
        assert_eq!(top(&oracle, "This is not good").label, Label::Negative);
        assert_eq!(top(&oracle, "It isn't bad at all").label, Label::Positive);
    }

    #[test]
    fn test_intensifier_raises_confidence() {
        let oracle = LexiconOracle::new("lexicon").unwrap();
        let plain = top(&oracle, "good");
        let boosted = top(&oracle, "very good");
        assert!(boosted.score > plain.score);
    }

    #[test]
    fn test_distribution_sums_to_one() {
        let oracle = LexiconOracle::new("lexicon").unwrap();
        let dist = oracle.predict(&["meh".to_string()]).unwrap().remove(0);
        let total: f64 = dist.iter().map(|p| p.score).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_custom_lexicon() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(LEXICON_FILE),
            "[positive]\nstellar = 3.0\n\n[negative]\njanky = 3.0\n",
        )
        .unwrap();

        let oracle = LexiconOracle::load("custom", dir.path()).unwrap();
        assert_eq!(top(&oracle, "stellar").label, Label::Positive);
        assert_eq!(top(&oracle, "janky").label, Label::Negative);
    }

    #[test]
    fn test_malformed_lexicon_fails_to_load() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(LEXICON_FILE), "[positive\n").unwrap();
        assert!(matches!(
            LexiconOracle::load("custom", dir.path()),
            Err(OracleError::Load(_))
        ));
    }
}
