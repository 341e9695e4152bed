//! Greedy (best-path) CTC decoding.
//!
//! Takes the argmax class at every frame and collapses the alignment:
//! blanks are stripped and, under `merge_repeated`, a label repeating the
//! previous frame's label is dropped. `[a, a, blank, a]` therefore becomes
//! `[a, a]` merged and `[a, a, a]` unmerged. This is the fast baseline; it
//! ranks by the single best alignment rather than the best label sequence,
//! which beam search exists to fix.

use candle::{IndexOp, Result, Tensor};

use crate::{Config, DecodedPath};

/// Frame-wise argmax decoder.
pub struct GreedyDecoder {
    num_classes: usize,
    blank_index: u32,
    batch_size: usize,
    merge_repeated: bool,
    span: tracing::Span,
}

impl GreedyDecoder {
    /// The beam-specific configuration fields (`beam_width`, `top_paths`)
    /// are ignored; greedy decoding always yields one path per sequence.
    pub fn new(cfg: &Config) -> Result<Self> {
        if cfg.num_classes < 2 {
            candle::bail!(
                "num_classes must cover at least one label plus the blank, got {}",
                cfg.num_classes
            )
        }
        Ok(Self {
            num_classes: cfg.num_classes,
            blank_index: (cfg.num_classes - 1) as u32,
            batch_size: cfg.batch_size,
            merge_repeated: cfg.merge_repeated,
            span: tracing::span!(tracing::Level::TRACE, "ctc-greedy"),
        })
    }

    /// Decode a batch of sequences to their best alignment's label sequence.
    ///
    /// `inputs` is time-major with shape `(max_time, batch_size,
    /// num_classes)`, blank last; `seq_lens` gives the valid timesteps per
    /// batch element. The returned log-probability is the sum of the chosen
    /// frames' log-probabilities.
    pub fn decode(&self, inputs: &Tensor, seq_lens: &[usize]) -> Result<Vec<DecodedPath>> {
        let _enter = self.span.enter();
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
            let mut labels = Vec::new();
            let mut log_prob = 0.0;
            let mut prev = self.blank_index;
            for t in 0..seq_len {
                let row = inputs.i((t, b))?.to_vec1::<f32>()?;
                let (best, best_log_prob) = row
                    .iter()
                    .copied()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.total_cmp(b))
                    .map(|(ix, p)| (ix as u32, p))
                    .unwrap_or((self.blank_index, 0.0));
                log_prob += best_log_prob;
                if best != self.blank_index && !(self.merge_repeated && best == prev) {
                    labels.push(best);
                }
                prev = best;
            }
            outputs.push(DecodedPath { labels, log_prob });
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle::Device;

    fn frames_to_tensor(frames: &[Vec<f32>]) -> Result<Tensor> {
        let num_classes = frames[0].len();
        let data: Vec<f32> = frames.iter().flatten().copied().collect();
        Tensor::from_vec(data, (frames.len(), 1, num_classes), &Device::Cpu)
    }

    #[test]
    fn merge_repeated_keeps_blank_separated_duplicates() -> Result<()> {
        // Alignment argmax: [a, a, blank, a].
        let a = vec![0.9f32.ln(), 0.1f32.ln()];
        let blank = vec![0.1f32.ln(), 0.9f32.ln()];
        let inputs = frames_to_tensor(&[a.clone(), a.clone(), blank, a])?;

        let merged = GreedyDecoder::new(&Config::new(2))?.decode(&inputs, &[4])?;
        assert_eq!(merged[0].labels, [0, 0]);

        let cfg = Config::new(2).with_merge_repeated(false);
        let unmerged = GreedyDecoder::new(&cfg)?.decode(&inputs, &[4])?;
        assert_eq!(unmerged[0].labels, [0, 0, 0]);
        Ok(())
    }

    #[test]
    fn log_prob_sums_the_chosen_frames() -> Result<()> {
        let inputs = frames_to_tensor(&[
            vec![0.8f32.ln(), 0.2f32.ln()],
            vec![0.3f32.ln(), 0.7f32.ln()],
        ])?;
        let paths = GreedyDecoder::new(&Config::new(2))?.decode(&inputs, &[2])?;
        assert_eq!(paths[0].labels, [0]);
        let expected = 0.8f32.ln() + 0.7f32.ln();
        assert!((paths[0].log_prob - expected).abs() < 1e-6);
        assert!((paths[0].cost() + expected).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn respects_sequence_lengths() -> Result<()> {
        let a = vec![0.9f32.ln(), 0.1f32.ln()];
        let blank = vec![0.1f32.ln(), 0.9f32.ln()];
        let data: Vec<f32> = [a.clone(), a.clone(), blank.clone(), blank]
            .iter()
            .flatten()
            .copied()
            .collect();
        // Both sequences see (a, blank); the second is only one frame long.
        let inputs = Tensor::from_vec(data, (2, 2, 2), &Device::Cpu)?;
        let cfg = Config::new(2).with_batch_size(2);
        let paths = GreedyDecoder::new(&cfg)?.decode(&inputs, &[2, 1])?;
        assert_eq!(paths[0].labels, [0]);
        assert_eq!(paths[1].labels, [0]);
        Ok(())
    }
}
