//! N-gram language model over label ids.
//!
//! Backs the LM-fused beam scorer: stores n-gram log-probabilities with
//! backoff weights and answers `P(label | context)` queries. Probabilities
//! are kept in natural log so they combine directly with the acoustic
//! log-probabilities; ARPA files (which store log10) are converted on load.
//!
//! The model lives in the decoder's label space: ARPA tokens are label
//! indices, with `<s>`/`</s>`/`<unk>` mapped to synthetic ids just past the
//! label space.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// N-gram model over label ids with backoff smoothing.
#[derive(Debug, Clone)]
pub struct NgramLm {
    /// Maximum n-gram order (e.g. 3 for a trigram model).
    order: usize,
    /// Number of real labels the model covers (used for the uniform
    /// fallback on unseen unigrams).
    vocab_size: usize,
    /// Key: label-id sequence. Value: (ln probability, ln backoff weight).
    ngrams: HashMap<Vec<u32>, (f32, f32)>,
    bos: u32,
    eos: u32,
    unk: u32,
}

impl NgramLm {
    /// An empty model. `vocab_size` is the number of real labels; the
    /// sentence-boundary and unknown tokens get ids just past it.
    pub fn new(order: usize, vocab_size: usize) -> Self {
        Self {
            order,
            vocab_size,
            ngrams: HashMap::new(),
            bos: vocab_size as u32,
            eos: vocab_size as u32 + 1,
            unk: vocab_size as u32 + 2,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Id of the start-of-sequence token.
    pub fn bos(&self) -> u32 {
        self.bos
    }

    /// Id of the end-of-sequence token, scored by [`end_score`](Self::end_score).
    pub fn eos(&self) -> u32 {
        self.eos
    }

    /// Add one n-gram with its natural-log probability and backoff weight.
    pub fn insert(&mut self, ngram: &[u32], log_prob: f32, backoff: f32) {
        self.ngrams.insert(ngram.to_vec(), (log_prob, backoff));
    }

    /// `ln P(label | context)`, backing off to shorter n-grams when the full
    /// one is absent. Only the last `order - 1` context labels participate.
    pub fn score(&self, context: &[u32], label: u32) -> f32 {
        let tail = context.len().saturating_sub(self.order.saturating_sub(1));
        let mut ngram: Vec<u32> = context[tail..].to_vec();
        ngram.push(label);
        self.score_ngram(&ngram)
    }

    fn score_ngram(&self, ngram: &[u32]) -> f32 {
        if ngram.is_empty() {
            return 0.0;
        }
        if let Some(&(log_prob, _)) = self.ngrams.get(ngram) {
            return log_prob;
        }
        if ngram.len() > 1 {
            let backoff = self
                .ngrams
                .get(&ngram[..ngram.len() - 1])
                .map(|&(_, bo)| bo)
                .unwrap_or(0.0);
            return backoff + self.score_ngram(&ngram[1..]);
        }
        // Unseen unigram: uniform over the label space.
        -(self.vocab_size.max(1) as f32).ln()
    }

    /// `ln P(</s> | context)`, the end-of-sequence adjustment.
    pub fn end_score(&self, context: &[u32]) -> f32 {
        self.score(context, self.eos)
    }

    /// Total `ln P` of a full label sequence (without the end token).
    pub fn score_sequence(&self, labels: &[u32]) -> f32 {
        let mut score = 0.0;
        for (i, &label) in labels.iter().enumerate() {
            score += self.score(&labels[..i], label);
        }
        score
    }

    /// Load an ARPA-format model whose tokens are decimal label indices.
    ///
    /// ```text
    /// \data\
    /// ngram 1=<count>
    /// ...
    /// \1-grams:
    /// <log10_prob> <label> [<log10_backoff>]
    /// ...
    /// \end\
    /// ```
    ///
    /// `<s>`, `</s>` and `<unk>` are accepted wherever a label index is;
    /// log10 values are converted to natural log on the way in.
    pub fn load_arpa(path: &Path, vocab_size: usize) -> std::io::Result<Self> {
        const LN_10: f32 = std::f32::consts::LN_10;

        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut lm = NgramLm::new(0, vocab_size);
        let mut max_order = 0;
        let mut current_order = 0;
        let mut in_data_section = false;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if line == "\\data\\" {
                in_data_section = true;
                continue;
            }
            if in_data_section && line.starts_with("ngram ") {
                if let Some((order, _count)) = line["ngram ".len()..].split_once('=') {
                    if let Ok(n) = order.parse::<usize>() {
                        max_order = max_order.max(n);
                    }
                }
                continue;
            }
            if let Some(order_str) = line
                .strip_prefix('\\')
                .and_then(|rest| rest.strip_suffix("-grams:"))
            {
                if let Ok(n) = order_str.parse::<usize>() {
                    current_order = n;
                    in_data_section = false;
                }
                continue;
            }
            if line == "\\end\\" {
                break;
            }

            if current_order == 0 {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < current_order + 1 {
                continue;
            }
            let log_prob = parts[0].parse::<f32>().unwrap_or(f32::NEG_INFINITY) * LN_10;
            let backoff = if parts.len() > current_order + 1 {
                parts[current_order + 1].parse::<f32>().unwrap_or(0.0) * LN_10
            } else {
                0.0
            };
            let ids: Vec<u32> = parts[1..current_order + 1]
                .iter()
                .map(|tok| lm.token_id(tok))
                .collect();
            lm.ngrams.insert(ids, (log_prob, backoff));
        }

        lm.order = max_order;
        Ok(lm)
    }

    fn token_id(&self, token: &str) -> u32 {
        match token {
            "<s>" | "<BOS>" => self.bos,
            "</s>" | "<EOS>" => self.eos,
            "<unk>" | "<UNK>" => self.unk,
            _ => token.parse::<u32>().unwrap_or(self.unk),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn bigram_lm() -> NgramLm {
        let mut lm = NgramLm::new(2, 2);
        // Unigrams with backoff weights.
        lm.insert(&[0], (0.4f32).ln(), (0.5f32).ln());
        lm.insert(&[1], (0.6f32).ln(), 0.0);
        // One bigram: P(1 | 0) = 0.9.
        lm.insert(&[0, 1], (0.9f32).ln(), 0.0);
        lm
    }

    #[test]
    fn exact_ngram_hits() {
        let lm = bigram_lm();
        assert!((lm.score(&[], 1) - (0.6f32).ln()).abs() < 1e-6);
        assert!((lm.score(&[0], 1) - (0.9f32).ln()).abs() < 1e-6);
    }

    #[test]
    fn backoff_when_bigram_missing() {
        let lm = bigram_lm();
        // P(0 | 0) backs off: bo(0) * P(0).
        let expected = (0.5f32).ln() + (0.4f32).ln();
        assert!((lm.score(&[0], 0) - expected).abs() < 1e-6);
        // Context without a stored backoff weight uses weight 1.
        let expected = (0.4f32).ln();
        assert!((lm.score(&[1], 0) - expected).abs() < 1e-6);
    }

    #[test]
    fn context_is_bounded_by_order() {
        let lm = bigram_lm();
        // Only the last label of a long context matters for a bigram model.
        assert_eq!(lm.score(&[1, 1, 0], 1), lm.score(&[0], 1));
    }

    #[test]
    fn unseen_unigram_is_uniform() {
        let lm = NgramLm::new(2, 4);
        assert!((lm.score(&[], 3) + (4f32).ln()).abs() < 1e-6);
    }

    #[test]
    fn score_sequence_sums_conditionals() {
        let lm = bigram_lm();
        let expected = lm.score(&[], 0) + lm.score(&[0], 1);
        assert!((lm.score_sequence(&[0, 1]) - expected).abs() < 1e-6);
    }

    #[test]
    fn load_arpa_round_trip() -> std::io::Result<()> {
        let dir = std::env::temp_dir();
        let path = dir.join("ctc_decode_test_lm.arpa");
        let mut file = File::create(&path)?;
        writeln!(file, "\\data\\")?;
        writeln!(file, "ngram 1=3")?;
        writeln!(file, "ngram 2=1")?;
        writeln!(file)?;
        writeln!(file, "\\1-grams:")?;
        writeln!(file, "-0.5 0 -0.3")?;
        writeln!(file, "-0.7 1")?;
        writeln!(file, "-1.0 </s>")?;
        writeln!(file)?;
        writeln!(file, "\\2-grams:")?;
        writeln!(file, "-0.1 0 1")?;
        writeln!(file, "\\end\\")?;
        drop(file);

        let lm = NgramLm::load_arpa(&path, 2)?;
        std::fs::remove_file(&path)?;

        const LN_10: f32 = std::f32::consts::LN_10;
        assert_eq!(lm.order(), 2);
        assert!((lm.score(&[], 0) - (-0.5 * LN_10)).abs() < 1e-5);
        assert!((lm.score(&[0], 1) - (-0.1 * LN_10)).abs() < 1e-5);
        // Missing bigram backs off through 0's backoff weight.
        assert!((lm.score(&[0], 0) - (-0.3 - 0.5) * LN_10).abs() < 1e-5);
        assert!((lm.end_score(&[]) - (-1.0 * LN_10)).abs() < 1e-5);
        Ok(())
    }
}
