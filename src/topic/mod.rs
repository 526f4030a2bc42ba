//! Topic discovery over a run's corpus
//!
//! Documents are vectorized with TF-IDF over a bounded vocabulary and the
//! matrix is factorized with non-negative matrix factorization (multiplicative
//! updates). Each document is assigned the topic with the largest weight in
//! its mixture. Topic ids are only meaningful within one fit.


use crate::config::EnrichmentConfig;
use crate::error::{PipelineError, Result};
use crate::types::TopicAssignment;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

const EPSILON: f64 = 1e-9;
const MIN_TOKEN_CHARS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any", "are",
    "aren", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "couldn", "did", "didn", "do", "does", "doesn", "doing", "don",
    "down", "during", "each", "even", "few", "for", "from", "further", "get", "gets", "got", "had",
    "hadn", "has", "hasn", "have", "haven", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "http", "https", "i", "if", "in", "into", "is", "isn", "it",
    "its", "itself", "just", "like", "make", "many", "may", "me", "might", "more", "most", "much",
    "must", "my", "myself", "new", "no", "nor", "not", "now", "of", "off", "on", "once", "one",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "said", "same",
    "says", "she", "should", "shouldn", "since", "so", "some", "still", "such", "than", "that",
    "the", "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this",
    "those", "through", "to", "too", "under", "until", "up", "very", "via", "was", "wasn", "way",
    "we", "were", "weren", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "won", "would", "wouldn", "www", "yet", "you", "your", "yours", "yourself",
];

/// Lowercased content tokens: at least three characters, not numeric, not a stop word
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Topic model parameters
#[derive(Debug, Clone)]
pub struct TopicModel {
    pub num_topics: usize,
    pub max_features: usize,
    pub top_terms: usize,
    pub iterations: usize,
    pub seed: u64,
}

impl TopicModel {
    pub fn new(config: &EnrichmentConfig) -> Self {
        Self {
            num_topics: config.num_topics,
            max_features: config.max_features,
            top_terms: config.top_terms,
            iterations: config.iterations,
            seed: config.seed,
        }
    }

    /// Fit topics over the whole corpus.
    ///
    /// Fails with `DegenerateCorpus` when there are fewer documents or
    /// vocabulary terms than topics.
    pub fn fit<S: AsRef<str>>(&self, texts: &[S]) -> Result<FittedTopics> {
        let k = self.num_topics;
        let tokens: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t.as_ref())).collect();

        let degenerate = |terms: usize| PipelineError::DegenerateCorpus {
            documents: texts.len(),
            terms,
            topics: k,
        };

        if k == 0 || texts.len() < k {
            return Err(degenerate(0));
        }

        let vocabulary = self.select_vocabulary(&tokens);
        if vocabulary.len() < k {
            return Err(degenerate(vocabulary.len()));
        }

        let index: HashMap<String, usize> = vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        let n = tokens.len() as f64;
        let mut df = vec![0usize; vocabulary.len()];
        for doc in &tokens {
            let mut seen: Vec<usize> = doc.iter().filter_map(|t| index.get(t).copied()).collect();
            seen.sort_unstable();
            seen.dedup();
            for j in seen {
                df[j] += 1;
            }
        }
        let idf: Vec<f64> = df
            .iter()
            .map(|d| ((1.0 + n) / (1.0 + *d as f64)).ln() + 1.0)
            .collect();

        let rows: Vec<SparseRow> = tokens
            .iter()
            .map(|doc| tfidf_row(doc, &index, &idf))
            .collect();

        let (weights, components) = self.factorize(&rows, vocabulary.len());

        let top_terms = components
            .iter()
            .map(|topic| {
                let mut ranked: Vec<(usize, f64)> = topic
                    .iter()
                    .copied()
                    .enumerate()
                    .filter(|(_, w)| *w > EPSILON)
                    .collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
                ranked
                    .into_iter()
                    .take(self.top_terms)
                    .map(|(j, _)| vocabulary[j].clone())
                    .collect()
            })
            .collect();

        tracing::debug!(
            "Fitted {} topics over {} documents, {} terms",
            k,
            rows.len(),
            vocabulary.len()
        );

        Ok(FittedTopics {
            index,
            idf,
            components,
            weights,
            top_terms,
            iterations: self.iterations,
        })
    }

    /// Most frequent terms across the corpus, capped at `max_features`
    fn select_vocabulary(&self, tokens: &[Vec<String>]) -> Vec<String> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for doc in tokens {
            for t in doc {
                *counts.entry(t.as_str()).or_default() += 1;
            }
        }

        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        if self.max_features > 0 {
            ranked.truncate(self.max_features);
        }

        let mut vocabulary: Vec<String> = ranked.into_iter().map(|(t, _)| t.to_string()).collect();
        vocabulary.sort();
        vocabulary
    }

    /// X (n x V) ~ W (n x k) * H (k x V)
    fn factorize(&self, rows: &[SparseRow], terms: usize) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let k = self.num_topics;
        let n = rows.len();

        let total: f64 = rows.iter().flat_map(|r| r.iter().map(|(_, x)| *x)).sum();
        let mean = total / (n * terms).max(1) as f64;
        let scale = (mean / k as f64).sqrt().max(EPSILON);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut w: Vec<Vec<f64>> = (0..n)
            .map(|_| (0..k).map(|_| rng.random::<f64>() * scale).collect())
            .collect();
        let mut h: Vec<Vec<f64>> = (0..k)
            .map(|_| (0..terms).map(|_| rng.random::<f64>() * scale).collect())
            .collect();

        for _ in 0..self.iterations {
            // H <- H * (W'X) / (W'W H)
            let mut wtx = vec![vec![0.0; terms]; k];
            for (d, row) in rows.iter().enumerate() {
                for &(j, x) in row {
                    for t in 0..k {
                        wtx[t][j] += w[d][t] * x;
                    }
                }
            }
            let wtw = gram_of_rows(&w, k);
            for t in 0..k {
                for j in 0..terms {
                    let denom: f64 = (0..k).map(|s| wtw[t][s] * h[s][j]).sum::<f64>() + EPSILON;
                    h[t][j] *= wtx[t][j] / denom;
                }
            }

            // W <- W * (X H') / (W H H')
            let hht = gram_of_topics(&h);
            for (d, row) in rows.iter().enumerate() {
                let mut xht = vec![0.0; k];
                for &(j, x) in row {
                    for t in 0..k {
                        xht[t] += x * h[t][j];
                    }
                }
                let current = w[d].clone();
                for t in 0..k {
                    let denom: f64 = (0..k).map(|s| current[s] * hht[s][t]).sum::<f64>() + EPSILON;
                    w[d][t] *= xht[t] / denom;
                }
            }
        }

        (w, h)
    }
}

type SparseRow = Vec<(usize, f64)>;

/// L2-normalized TF-IDF weights for one tokenized document
fn tfidf_row(doc: &[String], index: &HashMap<String, usize>, idf: &[f64]) -> SparseRow {
    let mut counts: HashMap<usize, f64> = HashMap::new();
    for t in doc {
        if let Some(&j) = index.get(t) {
            *counts.entry(j).or_default() += 1.0;
        }
    }

    let mut row: SparseRow = counts.into_iter().map(|(j, tf)| (j, tf * idf[j])).collect();
    row.sort_by_key(|(j, _)| *j);

    let norm = row.iter().map(|(_, x)| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for (_, x) in row.iter_mut() {
            *x /= norm;
        }
    }
    row
}

/// W'W for an n x k matrix
fn gram_of_rows(w: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut g = vec![vec![0.0; k]; k];
    for row in w {
        for a in 0..k {
            for b in 0..k {
                g[a][b] += row[a] * row[b];
            }
        }
    }
    g
}

/// H H' for a k x V matrix
fn gram_of_topics(h: &[Vec<f64>]) -> Vec<Vec<f64>> {
    h.iter()
        .map(|a| {
            h.iter()
                .map(|b| a.iter().zip(b).map(|(x, y)| x * y).sum())
                .collect()
        })
        .collect()
}

/// Pick the heaviest topic; an all-zero mixture is treated as uniform
fn best_topic(mixture: &[f64], top_terms: &[Vec<String>]) -> TopicAssignment {
    let k = mixture.len();
    let total: f64 = mixture.iter().sum();

    if total <= EPSILON {
        return TopicAssignment {
            topic_id: 0,
            top_terms: top_terms.first().cloned().unwrap_or_default(),
            confidence: 1.0 / k as f64,
        };
    }

    let (best, weight) = mixture
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::MIN), |acc, (i, w)| if w > acc.1 { (i, w) } else { acc });

    TopicAssignment {
        topic_id: best,
        top_terms: top_terms[best].clone(),
        confidence: (weight / total).clamp(0.0, 1.0),
    }
}

/// Result of one fit: topic-term weights plus each corpus document's mixture
#[derive(Debug, Clone)]
pub struct FittedTopics {
    index: HashMap<String, usize>,
    idf: Vec<f64>,
    /// k x V topic-term weights
    components: Vec<Vec<f64>>,
    /// n x k document-topic weights
    weights: Vec<Vec<f64>>,
    top_terms: Vec<Vec<String>>,
    iterations: usize,
}

impl FittedTopics {
    pub fn num_topics(&self) -> usize {
        self.components.len()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.idf.len()
    }

    /// Highest-weighted terms of a topic
    pub fn topic_terms(&self, topic: usize) -> &[String] {
        self.top_terms.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Assignments for the fitted corpus, in input order
    pub fn assignments(&self) -> Vec<TopicAssignment> {
        self.weights
            .iter()
            .map(|mixture| best_topic(mixture, &self.top_terms))
            .collect()
    }

    /// Project a text that was not part of the fit onto the fitted topics
    pub fn assign(&self, text: &str) -> TopicAssignment {
        let k = self.num_topics();
        let row = tfidf_row(&tokenize(text), &self.index, &self.idf);
        if row.is_empty() {
            return best_topic(&vec![0.0; k], &self.top_terms);
        }

        let hht = gram_of_topics(&self.components);
        let hx: Vec<f64> = (0..k)
            .map(|t| row.iter().map(|&(j, x)| self.components[t][j] * x).sum())
            .collect();

        let mut w = vec![1.0 / k as f64; k];
        for _ in 0..self.iterations.max(1) {
            let current = w.clone();
            for t in 0..k {
                let denom: f64 = (0..k).map(|s| current[s] * hht[s][t]).sum::<f64>() + EPSILON;
                w[t] *= hx[t] / denom;
            }
        }

        best_topic(&w, &self.top_terms)
    }
}
