//! CTC beam-search decoding.
//!
//! Decodes a sequence of per-timestep class log-probability distributions
//! (the output of a CTC-trained acoustic or handwriting model) into the most
//! probable label sequences. CTC's alignment model maps many frame-level
//! paths onto one label sequence (repeated labels collapse unless separated
//! by the reserved blank symbol), so the probability of a label sequence is
//! a sum over exponentially many alignments. [`BeamSearchDecoder`] tracks
//! that sum over the `beam_width` best prefixes with the standard prefix
//! beam-search recurrence; [`GreedyDecoder`] is the best-path baseline.
//!
//! The label space has `num_classes` entries, with the blank fixed as the
//! last index. Inputs are time-major `(max_time, batch_size, num_classes)`
//! tensors of log-probabilities; callers holding raw logits can go through
//! [`BeamSearchDecoder::decode_logits`], which log-softmaxes the class axis
//! first.
//!
//! ```
//! use candle::{Device, Tensor};
//! use ctc_decode::{BeamSearchDecoder, Config};
//!
//! # fn main() -> candle::Result<()> {
//! // Two timesteps over a two-class space (one label `a` plus blank):
//! // P(a) = 0.3, 0.4 and P(blank) = 0.7, 0.6. The best label sequence is
//! // [a] with probability 0.3*0.4 + 0.3*0.6 + 0.7*0.4 = 0.58, even though
//! // the single best alignment is all blanks.
//! let probs: Vec<f32> = [0.3f32, 0.7, 0.4, 0.6].iter().map(|p| p.ln()).collect();
//! let inputs = Tensor::from_vec(probs, (2, 1, 2), &Device::Cpu)?;
//!
//! let cfg = Config::new(2).with_beam_width(8);
//! let mut decoder = BeamSearchDecoder::new(&cfg)?;
//! let paths = decoder.decode(&inputs, &[2])?;
//! assert_eq!(paths[0][0].labels, [0]);
//! assert!((paths[0][0].log_prob - 0.58f32.ln()).abs() < 1e-5);
//! # Ok(())
//! # }
//! ```
//!
//! An external language model can be fused into the search through the
//! [`BeamScorer`] capability; see [`NgramBeamScorer`] for an n-gram
//! implementation.

pub mod entry;
pub mod greedy;
pub mod lm;
pub mod prob;
pub mod scorer;
pub mod search;
pub mod topn;

use serde::Deserialize;

// Defaults follow tf.nn.ctc_beam_search_decoder's attributes.
fn default_beam_width() -> usize {
    100
}
fn default_top_paths() -> usize {
    1
}
fn default_batch_size() -> usize {
    1
}
fn default_merge_repeated() -> bool {
    true
}

/// Decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Label-space size including the blank. The blank is always the last
    /// index, so real labels are `0..num_classes - 1`.
    pub num_classes: usize,
    /// Maximum number of hypotheses tracked between timesteps. Larger beams
    /// trade decode time and memory for quality.
    #[serde(default = "default_beam_width")]
    pub beam_width: usize,
    /// Number of independent sequences per decode call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Collapse adjacent identical output labels that are not separated by
    /// a blank.
    #[serde(default = "default_merge_repeated")]
    pub merge_repeated: bool,
    /// Ranked paths returned per sequence; at most `beam_width`.
    #[serde(default = "default_top_paths")]
    pub top_paths: usize,
}

impl Config {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            beam_width: default_beam_width(),
            batch_size: default_batch_size(),
            merge_repeated: default_merge_repeated(),
            top_paths: default_top_paths(),
        }
    }

    pub fn with_beam_width(mut self, beam_width: usize) -> Self {
        self.beam_width = beam_width;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_merge_repeated(mut self, merge_repeated: bool) -> Self {
        self.merge_repeated = merge_repeated;
        self
    }

    pub fn with_top_paths(mut self, top_paths: usize) -> Self {
        self.top_paths = top_paths;
        self
    }

    /// Index of the blank symbol: always the last class.
    pub fn blank_index(&self) -> usize {
        self.num_classes - 1
    }
}

/// One ranked decoding of a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPath {
    /// The label sequence, blanks already resolved.
    pub labels: Vec<u32>,
    /// Natural-log probability of the sequence (end-of-sequence adjustment
    /// included).
    pub log_prob: f32,
}

impl DecodedPath {
    /// The sequence's cost: the negated log-probability, lower is better.
    pub fn cost(&self) -> f32 {
        -self.log_prob
    }
}

pub use greedy::GreedyDecoder;
pub use lm::NgramLm;
pub use prob::{log_sum_exp, BeamProbability, LOG_ZERO};
pub use scorer::{BeamScorer, DefaultBeamScorer, NgramBeamScorer, NgramScorerState};
pub use search::BeamSearchDecoder;
pub use topn::TopN;
