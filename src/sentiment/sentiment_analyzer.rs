//! Sentiment Analysis Engine
//!
//! VADER-style lexicon scoring for short social and news text. Word valences
//! sit on a -4..4 scale and are adjusted for boosters, negation, capitalized
//! emphasis, "but" contrast and exclamation marks before being squashed into a
//! compound score in [-1, 1].

use super::SentimentScorer;
use crate::error::Result;
use std::collections::{HashMap, HashSet};

/// Normalization constant for the compound score
const ALPHA: f64 = 15.0;
/// Booster/dampener increment
const BOOST_INCR: f64 = 0.293;
/// Extra valence for an ALL CAPS word in mixed-case text
const CAPS_INCR: f64 = 0.733;
/// Multiplier applied to a word preceded by a negation
const NEGATION_SCALAR: f64 = -0.74;
/// Emphasis per exclamation mark (at most 4 counted)
const EXCLAIM_INCR: f64 = 0.292;
/// How far back modifiers are looked for
const MODIFIER_WINDOW: usize = 3;
/// Booster weight by distance (1, 2, 3 words back)
const BOOST_DECAY: [f64; MODIFIER_WINDOW] = [1.0, 0.95, 0.9];

/// Result of sentiment analysis
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentResult {
    /// Positive proportion (0.0 to 1.0)
    pub positive: f64,
    /// Negative proportion (0.0 to 1.0)
    pub negative: f64,
    /// Neutral proportion (0.0 to 1.0)
    pub neutral: f64,
    /// Compound score (-1.0 to 1.0)
    pub compound: f64,
}

impl SentimentResult {
    pub fn neutral() -> Self {
        Self {
            positive: 0.0,
            negative: 0.0,
            neutral: 1.0,
            compound: 0.0,
        }
    }
}

struct Token<'a> {
    raw: &'a str,
    word: String,
}

/// Sentiment analyzer using lexicon-based approach
pub struct SentimentAnalyzer {
    /// Word-level valences
    lexicon: HashMap<String, f64>,
    /// Emoji valences
    emoji_lexicon: HashMap<char, f64>,
    /// Intensity modifiers; positive boosts, negative dampens
    boosters: HashMap<String, f64>,
    negations: HashSet<String>,
}

impl SentimentAnalyzer {
    /// Create a new sentiment analyzer with default lexicons
    pub fn new() -> Self {
        let mut analyzer = Self {
            lexicon: HashMap::new(),
            emoji_lexicon: HashMap::new(),
            boosters: HashMap::new(),
            negations: HashSet::new(),
        };
        analyzer.init_lexicons();
        analyzer
    }

    /// Add or override word valences (-4..4 scale)
    pub fn with_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        for (word, valence) in terms {
            self.lexicon.insert(word.into().to_lowercase(), valence.clamp(-4.0, 4.0));
        }
        self
    }

    fn init_lexicons(&mut self) {
        let positive_words = [
            ("good", 1.9),
            ("great", 3.1),
            ("excellent", 2.7),
            ("amazing", 2.8),
            ("awesome", 3.1),
            ("fantastic", 2.6),
            ("wonderful", 2.7),
            ("best", 3.2),
            ("better", 1.9),
            ("love", 3.2),
            ("loved", 2.9),
            ("loving", 2.9),
            ("like", 1.5),
            ("happy", 2.7),
            ("glad", 2.0),
            ("beautiful", 2.9),
            ("nice", 1.8),
            ("strong", 2.3),
            ("win", 2.8),
            ("wins", 2.7),
            ("winning", 2.4),
            ("success", 2.7),
            ("successful", 2.8),
            ("profit", 1.9),
            ("profits", 1.9),
            ("gain", 2.4),
            ("gains", 1.8),
            ("growth", 1.6),
            ("improve", 1.9),
            ("improved", 2.1),
            ("improving", 1.8),
            ("recovery", 1.4),
            ("hope", 1.9),
            ("hopeful", 2.0),
            ("optimistic", 1.8),
            ("positive", 2.6),
            ("progress", 1.8),
            ("support", 1.7),
            ("safe", 1.9),
            ("celebrate", 2.7),
            ("praise", 2.6),
            ("thanks", 1.9),
            ("thank", 1.5),
            ("welcome", 2.0),
            ("breakthrough", 2.0),
            ("boost", 1.7),
            ("rally", 1.5),
            ("benefit", 2.0),
            ("agree", 1.5),
            ("fun", 2.3),
            ("excited", 1.4),
            ("exciting", 2.2),
            ("peace", 2.5),
            ("helpful", 1.8),
            ("impressive", 2.3),
            ("innovative", 1.9),
            ("wow", 2.8),
            ("ok", 1.2),
            ("fine", 0.8),
            ("calm", 1.3),
            ("secure", 1.4),
            ("rescued", 1.5),
            ("approved", 1.8),
        ];

        let negative_words = [
            ("bad", -2.5),
            ("terrible", -2.1),
            ("awful", -2.0),
            ("horrible", -2.5),
            ("poor", -2.1),
            ("worst", -3.1),
            ("worse", -2.1),
            ("hate", -2.7),
            ("sad", -2.1),
            ("angry", -2.3),
            ("anger", -2.7),
            ("weak", -1.9),
            ("lose", -1.7),
            ("losing", -1.6),
            ("loss", -1.3),
            ("losses", -1.7),
            ("fail", -2.5),
            ("failed", -2.3),
            ("failure", -2.3),
            ("crisis", -3.1),
            ("disaster", -3.1),
            ("crash", -1.7),
            ("collapse", -2.2),
            ("decline", -1.1),
            ("fear", -2.2),
            ("fears", -1.8),
            ("panic", -2.3),
            ("danger", -2.4),
            ("dangerous", -2.1),
            ("threat", -2.4),
            ("war", -2.9),
            ("attack", -2.1),
            ("killed", -3.5),
            ("kill", -3.7),
            ("dead", -3.3),
            ("death", -2.9),
            ("injured", -1.7),
            ("violence", -3.1),
            ("conflict", -1.3),
            ("protest", -1.0),
            ("scandal", -1.9),
            ("fraud", -2.8),
            ("corrupt", -3.0),
            ("corruption", -2.3),
            ("scam", -2.5),
            ("risk", -1.1),
            ("warning", -1.4),
            ("worried", -1.2),
            ("worry", -1.9),
            ("problem", -1.7),
            ("problems", -1.7),
            ("wrong", -2.1),
            ("layoffs", -2.0),
            ("unemployment", -1.9),
            ("recession", -2.0),
            ("debt", -1.5),
            ("delay", -1.3),
            ("broken", -2.1),
            ("sick", -2.3),
            ("pain", -2.3),
            ("hurt", -2.4),
            ("shame", -2.0),
            ("disappointed", -1.9),
            ("disappointing", -2.2),
            ("controversial", -0.8),
            ("criticism", -1.9),
            ("blame", -1.4),
            ("chaos", -2.7),
            ("destroyed", -3.4),
            ("flood", -1.4),
            ("storm", -1.2),
            ("guilty", -1.8),
            ("ugly", -2.3),
            ("stupid", -2.4),
            ("useless", -1.8),
        ];

        for (word, valence) in positive_words.iter().chain(negative_words.iter()) {
            self.lexicon.insert(word.to_string(), *valence);
        }

        let emojis = [
            ('😀', 2.2),
            ('😃', 2.2),
            ('😊', 2.4),
            ('😍', 2.7),
            ('🥳', 2.5),
            ('🎉', 2.3),
            ('👍', 1.9),
            ('👏', 1.8),
            ('❤', 2.6),
            ('💯', 1.5),
            ('🙌', 1.8),
            ('✅', 1.2),
            ('🔥', 1.0),
            ('📈', 1.4),
            ('😢', -2.1),
            ('😭', -2.3),
            ('😡', -2.6),
            ('😠', -2.4),
            ('😱', -1.9),
            ('👎', -1.9),
            ('💔', -2.4),
            ('⚠', -1.2),
            ('❌', -1.2),
            ('📉', -1.4),
        ];

        for (emoji, valence) in emojis {
            self.emoji_lexicon.insert(emoji, valence);
        }

        let boosters = [
            ("very", BOOST_INCR),
            ("really", BOOST_INCR),
            ("extremely", BOOST_INCR),
            ("absolutely", BOOST_INCR),
            ("completely", BOOST_INCR),
            ("totally", BOOST_INCR),
            ("so", BOOST_INCR),
            ("super", BOOST_INCR),
            ("incredibly", BOOST_INCR),
            ("highly", BOOST_INCR),
            ("hugely", BOOST_INCR),
            ("deeply", BOOST_INCR),
            ("truly", BOOST_INCR),
            ("especially", BOOST_INCR),
            ("remarkably", BOOST_INCR),
            ("slightly", -BOOST_INCR),
            ("somewhat", -BOOST_INCR),
            ("barely", -BOOST_INCR),
            ("hardly", -BOOST_INCR),
            ("marginally", -BOOST_INCR),
            ("partly", -BOOST_INCR),
        ];

        for (word, incr) in boosters {
            self.boosters.insert(word.to_string(), incr);
        }

        for word in [
            "not", "no", "never", "none", "neither", "nor", "nobody", "nothing", "nowhere",
            "without", "cannot", "aint",
        ] {
            self.negations.insert(word.to_string());
        }
    }

    /// Analyze sentiment of text
    pub fn analyze(&self, text: &str) -> SentimentResult {
        let tokens: Vec<Token<'_>> = text
            .split_whitespace()
            .map(|raw| Token {
                raw,
                word: clean_word(raw),
            })
            .filter(|t| !t.word.is_empty() || t.raw.chars().any(|c| self.emoji_lexicon.contains_key(&c)))
            .collect();

        if tokens.is_empty() {
            return SentimentResult::neutral();
        }

        let caps_differ = {
            let caps = tokens.iter().filter(|t| is_shouting(t.raw)).count();
            caps > 0 && caps < tokens.len()
        };

        let mut valences: Vec<f64> = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| self.token_valence(&tokens, i, token, caps_differ))
            .collect();

        // Clause after "but" dominates the one before it
        if let Some(pivot) = tokens.iter().position(|t| t.word == "but") {
            for (i, v) in valences.iter_mut().enumerate() {
                if i < pivot {
                    *v *= 0.5;
                } else if i > pivot {
                    *v *= 1.5;
                }
            }
        }

        for c in text.chars() {
            if let Some(&v) = self.emoji_lexicon.get(&c) {
                valences.push(v);
            }
        }

        let emphasis = text.chars().filter(|c| *c == '!').count().min(4) as f64 * EXCLAIM_INCR;

        let mut sum: f64 = valences.iter().sum();
        if sum > 0.0 {
            sum += emphasis;
        } else if sum < 0.0 {
            sum -= emphasis;
        }
        let compound = normalize(sum);

        // Proportions
        let mut pos_sum: f64 = valences.iter().filter(|v| **v > 0.0).map(|v| v + 1.0).sum();
        let mut neg_sum: f64 = valences.iter().filter(|v| **v < 0.0).map(|v| v - 1.0).sum();
        let neutral_count = valences.iter().filter(|v| **v == 0.0).count() as f64;

        if pos_sum > neg_sum.abs() {
            pos_sum += emphasis;
        } else if pos_sum < neg_sum.abs() {
            neg_sum -= emphasis;
        }

        let total = pos_sum + neg_sum.abs() + neutral_count;
        if total == 0.0 {
            return SentimentResult::neutral();
        }

        SentimentResult {
            positive: pos_sum / total,
            negative: neg_sum.abs() / total,
            neutral: neutral_count / total,
            compound,
        }
    }

    fn token_valence(&self, tokens: &[Token<'_>], index: usize, token: &Token<'_>, caps_differ: bool) -> f64 {
        if self.boosters.contains_key(&token.word) || self.is_negation(&token.word) {
            return 0.0;
        }
        let Some(&base) = self.lexicon.get(&token.word) else {
            return 0.0;
        };

        let sign = base.signum();
        let mut valence = base;
        if caps_differ && is_shouting(token.raw) {
            valence += sign * CAPS_INCR;
        }

        let start = index.saturating_sub(MODIFIER_WINDOW);
        for j in (start..index).rev() {
            let distance = index - j;
            let prev = &tokens[j];

            if let Some(&incr) = self.boosters.get(&prev.word) {
                let mut boost = incr * sign;
                if caps_differ && is_shouting(prev.raw) {
                    boost += sign * CAPS_INCR;
                }
                valence += boost * BOOST_DECAY[distance - 1];
            }

            if self.is_negation(&prev.word) {
                valence *= NEGATION_SCALAR;
            }
        }

        valence
    }

    fn is_negation(&self, word: &str) -> bool {
        self.negations.contains(word) || word.ends_with("n't")
    }

    /// Batch analyze multiple texts
    pub fn analyze_batch(&self, texts: &[&str]) -> Vec<SentimentResult> {
        texts.iter().map(|t| self.analyze(t)).collect()
    }
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentScorer for SentimentAnalyzer {
    fn score(&self, text: &str) -> Result<SentimentResult> {
        Ok(self.analyze(text))
    }
}

/// Lowercase and strip surrounding punctuation, keeping apostrophes
fn clean_word(word: &str) -> String {
    word.chars()
        .map(|c| if c == '\u{2019}' { '\'' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '\'' || *c == '-')
        .collect::<String>()
        .trim_matches(|c| c == '\'' || c == '-')
        .to_lowercase()
}

/// ALL CAPS word with at least two letters
fn is_shouting(raw: &str) -> bool {
    let letters: Vec<char> = raw.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() > 1 && letters.iter().all(|c| c.is_uppercase())
}

/// Squash a valence sum into [-1, 1]
fn normalize(score: f64) -> f64 {
    (score / (score * score + ALPHA).sqrt()).clamp(-1.0, 1.0)
}
