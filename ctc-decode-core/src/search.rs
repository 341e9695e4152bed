//! The CTC beam-search decoder.
//!
//! Tracks the `beam_width` most probable label-sequence prefixes while
//! consuming one timestep of per-class log-probabilities at a time. Two
//! recurrences drive the update (Graves, ch. 7):
//!
//! ```text
//! P(l=abcd @ t) = P(l=abc  @ t-1) * P(d @ t)
//!               + P(l=abcd @ t-1) * (P(d @ t) + P(- @ t))
//! ```
//!
//! for prefixes already in the beam, and
//!
//! ```text
//! P(l=abc? @ t) = P(l=abc @ t-1) * P(? @ t)
//! ```
//!
//! for the fresh one-label extensions grown off them. When the extending
//! label repeats the prefix's last label, only the blank-ending mass of the
//! parent may continue it; this is what keeps "aa" distinct from "a".
//!
//! The canonical two-timestep example, with columns `(a, blank)`:
//!
//! ```text
//! P = [ 0.3 0.7 ]   t = 0
//!     [ 0.4 0.6 ]   t = 1
//! ```
//!
//! gives `P(l=ε) = 0.7 * 0.6 = 0.42` and `P(l=a) = 0.3*0.4 + 0.3*0.6 +
//! 0.7*0.4 = 0.58`, so `[a]` outranks the empty sequence even though the
//! per-frame best path is all blanks. This is the case where best-path
//! decoding is suboptimal and beam search is not.

use candle::{IndexOp, Result, Tensor, D};

use crate::entry::{BeamTree, NodeId, ROOT};
use crate::prob::{log_sum_exp, BeamProbability, LOG_ZERO};
use crate::scorer::{BeamScorer, DefaultBeamScorer};
use crate::topn::TopN;
use crate::{Config, DecodedPath};

/// A fresh hypothesis enters the beam iff it carries any probability mass at
/// all and either the beam still has room or it beats the current bottom.
fn is_candidate(prob: &BeamProbability, leaves: &TopN, beam_width: usize) -> bool {
    prob.total > LOG_ZERO
        && (leaves.len() < beam_width
            || leaves
                .peek_bottom()
                .is_some_and(|bottom| prob.total > bottom.log_prob))
}

/// Beam-search decoder over CTC output distributions.
///
/// One instance decodes one sequence at a time; [`reset`](Self::reset)
/// re-arms it for the next. The hypothesis tree is owned here exclusively
/// and grows monotonically until the next reset; the beam itself only holds
/// node ids into it.
pub struct BeamSearchDecoder<S: BeamScorer = DefaultBeamScorer> {
    num_classes: usize,
    blank_index: usize,
    beam_width: usize,
    batch_size: usize,
    merge_repeated: bool,
    top_n: usize,
    leaves: TopN,
    tree: BeamTree<S::State>,
    scorer: S,
    span: tracing::Span,
}

impl BeamSearchDecoder<DefaultBeamScorer> {
    /// Decoder without an external scorer: pure acoustic beam search.
    pub fn new(cfg: &Config) -> Result<Self> {
        Self::with_scorer(cfg, DefaultBeamScorer)
    }
}

impl<S: BeamScorer> BeamSearchDecoder<S> {
    /// Decoder fusing `scorer` into every hypothesis expansion.
    pub fn with_scorer(cfg: &Config, scorer: S) -> Result<Self> {
        if cfg.num_classes < 2 {
            candle::bail!(
                "num_classes must cover at least one label plus the blank, got {}",
                cfg.num_classes
            )
        }
        if cfg.beam_width == 0 {
            candle::bail!("beam_width must be positive")
        }
        if cfg.top_paths == 0 || cfg.top_paths > cfg.beam_width {
            candle::bail!(
                "top_paths must be in 1..={}, got {}",
                cfg.beam_width,
                cfg.top_paths
            )
        }
        let mut decoder = Self {
            num_classes: cfg.num_classes,
            blank_index: cfg.num_classes - 1,
            beam_width: cfg.beam_width,
            batch_size: cfg.batch_size,
            merge_repeated: cfg.merge_repeated,
            top_n: cfg.top_paths,
            leaves: TopN::new(cfg.beam_width),
            tree: BeamTree::new(cfg.num_classes),
            scorer,
            span: tracing::span!(tracing::Level::TRACE, "ctc-beam-search"),
        };
        decoder.reset();
        Ok(decoder)
    }

    /// Discard the hypothesis tree and reseed it with an empty prefix of
    /// probability one. May be called at any point.
    pub fn reset(&mut self) {
        self.leaves.reset();
        self.tree.reset();
        let root = self.tree.node_mut(ROOT);
        root.newp.total = 0.0; // ln 1
        root.newp.blank = 0.0;
        self.scorer.initialize_state(&mut root.state);
        self.leaves.push(ROOT, 0.0);
    }

    /// Advance the beam by one timestep of per-class log-probabilities.
    ///
    /// `log_input_t` must hold exactly `num_classes` entries, blank last,
    /// already stabilized (e.g. log-softmax output; see
    /// [`decode_logits`](Self::decode_logits) for raw logits). Underflowed
    /// entries are fine: anything at [`LOG_ZERO`] stays impossible through
    /// the log-sum recurrence.
    pub fn step(&mut self, log_input_t: &[f32]) -> Result<()> {
        if log_input_t.len() != self.num_classes {
            candle::bail!(
                "expected {} log-probabilities per timestep, got {}",
                self.num_classes,
                log_input_t.len()
            )
        }
        let _enter = self.span.enter();

        let input = log_input_t;

        // Snapshot the beam, then mutate: the container must never be
        // iterated while entries move underneath it.
        let branches = self.leaves.extract_sorted();
        self.leaves.reset();

        // P(.. @ t) becomes the new P(.. @ t-1).
        for entry in &branches {
            let node = self.tree.node_mut(entry.id);
            node.oldp = node.newp;
        }

        for entry in &branches {
            let id = entry.id;
            if let Some(parent_id) = self.tree.node(id).parent {
                if self.tree.node(parent_id).is_active() {
                    // A repeated label may only continue from the parent's
                    // blank-ending mass; a different label continues from
                    // its full mass.
                    let (parent, node) = self.tree.parent_and_child_mut(parent_id, id);
                    let previous = if node.label == parent.label {
                        parent.oldp.blank
                    } else {
                        parent.oldp.total
                    };
                    node.newp.label = log_sum_exp(
                        node.newp.label,
                        self.scorer.state_expansion_score(&node.state, previous),
                    );
                }
                let node = self.tree.node_mut(id);
                node.newp.label += input[node.label as usize];
            }
            let node = self.tree.node_mut(id);
            node.newp.blank = node.oldp.total + input[self.blank_index];
            node.newp.combine();
            let total = node.newp.total;
            self.leaves.push(id, total);
        }

        // Grow one-label extensions off every hypothesis whose previous
        // total still clears the (current) beam bottom.
        for entry in &branches {
            let id = entry.id;
            let oldp = self.tree.node(id).oldp;
            if !is_candidate(&oldp, &self.leaves, self.beam_width) {
                continue;
            }
            self.tree.populate_children(id);
            let children = match self.tree.children(id) {
                Some(children) => children,
                None => continue,
            };
            for child_id in children {
                if self.tree.node(child_id).is_active() {
                    continue;
                }
                {
                    let (parent, child) = self.tree.parent_and_child_mut(id, child_id);
                    // A brand-new prefix has no blank-ending mass yet.
                    child.newp.blank = LOG_ZERO;
                    self.scorer
                        .expand_state(&parent.state, parent.label, &mut child.state, child.label);
                    let previous = if child.label == parent.label {
                        parent.oldp.blank
                    } else {
                        parent.oldp.total
                    };
                    child.newp.label = input[child.label as usize]
                        + self.scorer.state_expansion_score(&child.state, previous);
                    child.newp.total = child.newp.label;
                }
                let newp = self.tree.node(child_id).newp;
                if is_candidate(&newp, &self.leaves, self.beam_width) {
                    if let Some(evicted) = self.leaves.push(child_id, newp.total) {
                        // The evicted hypothesis is no longer in the beam.
                        self.tree.node_mut(evicted.id).newp.reset();
                    }
                } else {
                    let child = self.tree.node_mut(child_id);
                    child.oldp.reset();
                    child.newp.reset();
                }
            }
        }
        Ok(())
    }

    /// Apply the scorer's end-of-sequence adjustment to every hypothesis in
    /// the beam and re-rank. Call exactly once per decoded sequence, after
    /// the last [`step`](Self::step); a second call would charge the
    /// adjustment twice.
    pub fn finalize(&mut self) {
        let branches = self.leaves.extract_sorted();
        self.leaves.reset();
        for entry in branches {
            let node = self.tree.node_mut(entry.id);
            self.scorer.expand_state_end(&mut node.state);
            node.newp.total += self.scorer.state_end_expansion_score(&node.state);
            let total = node.newp.total;
            self.leaves.push(entry.id, total);
        }
    }

    /// The `n` most probable label sequences currently in the beam, best
    /// first, with their log-probabilities.
    ///
    /// Fails if `n` exceeds the beam width or the current beam occupancy.
    pub fn top_paths(&self, n: usize, merge_repeated: bool) -> Result<Vec<DecodedPath>> {
        if n > self.beam_width {
            candle::bail!(
                "requested {n} paths but the beam width is {}",
                self.beam_width
            )
        }
        if n > self.leaves.len() {
            candle::bail!(
                "requested {n} paths but only {} hypotheses are in the beam",
                self.leaves.len()
            )
        }

        // Re-rank into a scratch container so the beam stays usable.
        let mut top = TopN::new(n);
        for entry in self.leaves.unsorted_iter() {
            top.push(entry.id, self.tree.node(entry.id).newp.total);
        }
        let paths = top
            .extract_sorted()
            .into_iter()
            .map(|entry| DecodedPath {
                labels: self.tree.label_seq(entry.id, merge_repeated),
                log_prob: entry.log_prob,
            })
            .collect();
        Ok(paths)
    }

    /// Decode a whole batch of sequences.
    ///
    /// `inputs` is time-major with shape `(max_time, batch_size,
    /// num_classes)` and holds log-probabilities (or unnormalized logits);
    /// `seq_lens` gives the number of valid timesteps per batch element.
    /// Returns, per batch element, the `top_paths` ranked label sequences of
    /// the configuration.
    pub fn decode(&mut self, inputs: &Tensor, seq_lens: &[usize]) -> Result<Vec<Vec<DecodedPath>>> {
        let _enter = self.span.clone().entered();
        let (max_time, batch_size, num_classes) = inputs.dims3()?;
        if num_classes != self.num_classes {
            candle::bail!(
                "input has {num_classes} classes but the decoder was built for {}",
                self.num_classes
            )
        }
        if batch_size != self.batch_size || seq_lens.len() != self.batch_size {
            candle::bail!(
                "expected {} sequences, got a batch of {batch_size} with {} lengths",
                self.batch_size,
                seq_lens.len()
            )
        }

        let mut outputs = Vec::with_capacity(self.batch_size);
        for (b, &seq_len) in seq_lens.iter().enumerate() {
            if seq_len > max_time {
                candle::bail!("sequence {b} has length {seq_len} but only {max_time} timesteps")
            }
            self.reset();
            for t in 0..seq_len {
                let row = inputs.i((t, b))?.to_vec1::<f32>()?;
                self.step(&row)?;
            }
            self.finalize();
            outputs.push(self.top_paths(self.top_n, self.merge_repeated)?);
        }
        Ok(outputs)
    }

    /// Like [`decode`](Self::decode), after normalizing raw logits with a
    /// log-softmax over the class axis.
    pub fn decode_logits(
        &mut self,
        logits: &Tensor,
        seq_lens: &[usize],
    ) -> Result<Vec<Vec<DecodedPath>>> {
        let log_probs = candle_nn::ops::log_softmax(logits, D::Minus1)?;
        self.decode(&log_probs, seq_lens)
    }

    /// Number of hypotheses currently tracked; at most the beam width.
    pub fn beam_len(&self) -> usize {
        self.leaves.len()
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    pub fn scorer_mut(&mut self) -> &mut S {
        &mut self.scorer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ln(p: f32) -> f32 {
        p.ln()
    }

    #[test]
    fn totals_stay_combined_after_every_step() -> Result<()> {
        let cfg = Config::new(4).with_beam_width(8);
        let mut decoder = BeamSearchDecoder::new(&cfg)?;
        let frames = [
            vec![ln(0.2), ln(0.3), ln(0.1), ln(0.4)],
            vec![ln(0.4), ln(0.1), ln(0.2), ln(0.3)],
            vec![ln(0.1), ln(0.1), ln(0.6), ln(0.2)],
        ];
        for frame in &frames {
            decoder.step(frame)?;
            assert!(decoder.beam_len() <= 8);
            for entry in decoder.leaves.unsorted_iter() {
                let node = decoder.tree.node(entry.id);
                assert!(node.is_active());
                let expected = log_sum_exp(node.newp.blank, node.newp.label);
                assert_eq!(node.newp.total, expected);
                assert_eq!(entry.log_prob, node.newp.total);
            }
        }
        Ok(())
    }

    #[test]
    fn eviction_deactivates_the_bottom_hypothesis() -> Result<()> {
        // Three labels but room for two hypotheses: every step must evict.
        let cfg = Config::new(4).with_beam_width(2);
        let mut decoder = BeamSearchDecoder::new(&cfg)?;
        decoder.step(&[ln(0.5), ln(0.2), ln(0.1), ln(0.2)])?;
        decoder.step(&[ln(0.1), ln(0.5), ln(0.2), ln(0.2)])?;

        assert_eq!(decoder.beam_len(), 2);
        let in_beam: Vec<NodeId> = decoder.leaves.unsorted_iter().map(|e| e.id).collect();
        for id in 0..decoder.tree.len() {
            if !in_beam.contains(&id) {
                assert!(!decoder.tree.node(id).is_active());
            }
        }
        Ok(())
    }

    #[test]
    fn children_spawn_only_from_admissible_parents() -> Result<()> {
        let cfg = Config::new(2).with_beam_width(1);
        let mut decoder = BeamSearchDecoder::new(&cfg)?;
        decoder.step(&[ln(0.1), ln(0.9)])?;
        // Width one: the root (blank-heavy) survives, its single child was
        // examined and rejected, and nothing grew below depth one.
        assert_eq!(decoder.beam_len(), 1);
        assert_eq!(decoder.tree.len(), 2);
        Ok(())
    }
}
