//! Language-model fusion in the beam search.
//!
//! Decodes an acoustically ambiguous input twice, once with the plain
//! acoustic beam search and once with an n-gram label LM fused in, and
//! prints both rankings. By default a small built-in bigram model is used;
//! pass `--lm model.arpa` to load one (tokens are label indices).
//!
//! ```bash
//! cargo run --example lm-rescoring
//! cargo run --example lm-rescoring -- --lm-weight 0.5
//! ```

use anyhow::Result;
use candle::{Device, Tensor};
use clap::Parser;
use std::path::PathBuf;

use ctc_decode::{BeamSearchDecoder, Config, NgramBeamScorer, NgramLm};
use ctc_decode_examples::format_path;

#[derive(Parser, Debug)]
#[command(author, version, about = "CTC beam search with n-gram LM fusion")]
struct Args {
    /// ARPA model over label indices. Defaults to a built-in bigram LM.
    #[arg(long)]
    lm: Option<PathBuf>,

    /// Scale of the LM contribution.
    #[arg(long, default_value_t = 1.0)]
    lm_weight: f32,

    /// Maximum number of hypotheses tracked by the beam search.
    #[arg(long, default_value_t = 8)]
    beam_width: usize,

    /// Ranked paths to return.
    #[arg(long, default_value_t = 3)]
    top_paths: usize,

    /// Enable tracing output.
    #[arg(long)]
    tracing: bool,
}

const NUM_LABELS: usize = 2;

/// A bigram model that strongly prefers label 1 after label 0.
fn builtin_lm() -> NgramLm {
    let mut lm = NgramLm::new(2, NUM_LABELS);
    lm.insert(&[0], 0.5f32.ln(), 0.0);
    lm.insert(&[1], 0.5f32.ln(), 0.0);
    lm.insert(&[0, 0], 0.1f32.ln(), 0.0);
    lm.insert(&[0, 1], 0.9f32.ln(), 0.0);
    lm
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.tracing {
        tracing_subscriber::fmt::init();
    }

    let lm = match &args.lm {
        Some(path) => NgramLm::load_arpa(path, NUM_LABELS)?,
        None => builtin_lm(),
    };

    // Three frames over (label 0, label 1, blank): a clear 0, then a frame
    // where 0 and 1 are acoustically indistinguishable, then a clear blank.
    let frames: [[f32; 3]; 3] = [[0.8, 0.1, 0.1], [0.45, 0.45, 0.1], [0.05, 0.05, 0.9]];
    let data: Vec<f32> = frames.iter().flatten().map(|p| p.ln()).collect();
    let inputs = Tensor::from_vec(data, (3, 1, 3), &Device::Cpu)?;
    let seq_lens = [3];

    let cfg = Config::new(NUM_LABELS + 1)
        .with_beam_width(args.beam_width)
        .with_top_paths(args.top_paths);

    let mut acoustic = BeamSearchDecoder::new(&cfg)?;
    let paths = acoustic.decode(&inputs, &seq_lens)?;
    println!("acoustic only:");
    for path in &paths[0] {
        println!("  {}", format_path(path));
    }

    let scorer = NgramBeamScorer::new(lm, args.lm_weight);
    let mut fused = BeamSearchDecoder::with_scorer(&cfg, scorer)?;
    let paths = fused.decode(&inputs, &seq_lens)?;
    println!("with {}-gram LM (weight {}):", fused.scorer().lm().order(), args.lm_weight);
    for path in &paths[0] {
        println!("  {}", format_path(path));
    }
    Ok(())
}
