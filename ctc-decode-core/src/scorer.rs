//! The pluggable hypothesis scorer.
//!
//! The beam search calls into a scorer at every hypothesis expansion and at
//! end of sequence, letting an external model (typically a language model)
//! contribute additional log-probability. State is opaque to the search: one
//! value per hypothesis, produced for a child when its node is first created
//! and carried with the node from then on.

use crate::lm::NgramLm;

/// Capability interface consumed by the beam search.
///
/// The default methods make the scorer a no-op: states stay empty,
/// `state_expansion_score` passes `previous` through unchanged and the end
/// adjustment is zero.
pub trait BeamScorer {
    /// Per-hypothesis opaque state. Children start from `Default` and are
    /// filled in by [`expand_state`](Self::expand_state).
    type State: Default;

    /// Prepare the root hypothesis' state at reset.
    fn initialize_state(&self, _state: &mut Self::State) {}

    /// Produce the child state when hypothesis `from` is extended with
    /// `to_label`. Called whenever the child is examined as a new candidate,
    /// so implementations must derive `to` from `from` alone.
    fn expand_state(
        &self,
        _from: &Self::State,
        _from_label: u32,
        _to: &mut Self::State,
        _to_label: u32,
    ) {
    }

    /// Let the scorer account for the sequence ending in this hypothesis.
    fn expand_state_end(&self, _state: &mut Self::State) {}

    /// Expansion score of the hypothesis owning `state`, folded together
    /// with `previous`, the log-probability mass the expansion starts from.
    fn state_expansion_score(&self, _state: &Self::State, previous: f32) -> f32 {
        previous
    }

    /// End-of-sequence adjustment, added to the hypothesis total once, after
    /// [`expand_state_end`](Self::expand_state_end).
    fn state_end_expansion_score(&self, _state: &Self::State) -> f32 {
        0.0
    }
}

/// Scorer that contributes nothing: pure acoustic beam search.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBeamScorer;

impl BeamScorer for DefaultBeamScorer {
    type State = ();
}

/// Per-hypothesis state of [`NgramBeamScorer`].
#[derive(Debug, Clone, Default)]
pub struct NgramScorerState {
    /// Last `order - 1` labels of the hypothesis, the LM conditioning context.
    context: Vec<u32>,
    /// `ln P_lm(label | parent context)`, cached when the node is created.
    expansion: f32,
    /// `ln P_lm(</s> | context)`, filled in at end of sequence.
    end: f32,
}

impl NgramScorerState {
    pub fn context(&self) -> &[u32] {
        &self.context
    }
}

/// Fuses an [`NgramLm`] into the beam: every label expansion pays the LM's
/// conditional log-probability (scaled by `weight`) on top of the acoustic
/// score, and `finalize` charges the end-of-sequence probability.
#[derive(Debug, Clone)]
pub struct NgramBeamScorer {
    lm: NgramLm,
    weight: f32,
}

impl NgramBeamScorer {
    pub fn new(lm: NgramLm, weight: f32) -> Self {
        Self { lm, weight }
    }

    pub fn lm(&self) -> &NgramLm {
        &self.lm
    }
}

impl BeamScorer for NgramBeamScorer {
    type State = NgramScorerState;

    fn initialize_state(&self, state: &mut Self::State) {
        *state = NgramScorerState::default();
    }

    fn expand_state(
        &self,
        from: &Self::State,
        _from_label: u32,
        to: &mut Self::State,
        to_label: u32,
    ) {
        to.expansion = self.lm.score(&from.context, to_label);
        let mut context = from.context.clone();
        context.push(to_label);
        let keep = self.lm.order().saturating_sub(1);
        if context.len() > keep {
            context.drain(..context.len() - keep);
        }
        to.context = context;
        to.end = 0.0;
    }

    fn expand_state_end(&self, state: &mut Self::State) {
        state.end = self.lm.end_score(&state.context);
    }

    fn state_expansion_score(&self, state: &Self::State, previous: f32) -> f32 {
        previous + self.weight * state.expansion
    }

    fn state_end_expansion_score(&self, state: &Self::State) -> f32 {
        self.weight * state.end
    }
}
