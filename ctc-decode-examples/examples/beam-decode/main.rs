//! Beam-search vs. greedy decoding over synthetic model output.
//!
//! Generates random per-frame logits, then decodes them with both the
//! greedy best-path decoder and the beam search, printing the ranked label
//! sequences with their costs (negated log-probabilities).
//!
//! ```bash
//! cargo run --example beam-decode -- --timesteps 20 --num-classes 6
//!
//! # Wider beam, more returned paths
//! cargo run --example beam-decode -- --beam-width 32 --top-paths 5
//! ```

use anyhow::Result;
use candle::D;
use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};

use ctc_decode::{BeamSearchDecoder, Config, GreedyDecoder};
use ctc_decode_examples::{device, format_path, random_logits};

#[derive(Parser, Debug)]
#[command(author, version, about = "CTC beam search decoding demo")]
struct Args {
    /// Run on CPU rather than on GPU.
    #[arg(long)]
    cpu: bool,

    /// Number of timesteps to generate.
    #[arg(long, default_value_t = 16)]
    timesteps: usize,

    /// Label-space size including the blank.
    #[arg(long, default_value_t = 5)]
    num_classes: usize,

    /// Maximum number of hypotheses tracked by the beam search.
    #[arg(long, default_value_t = 16)]
    beam_width: usize,

    /// Ranked paths to return per sequence.
    #[arg(long, default_value_t = 3)]
    top_paths: usize,

    /// Keep adjacent repeated labels instead of merging them.
    #[arg(long)]
    no_merge_repeated: bool,

    /// RNG seed for the synthetic logits.
    #[arg(long, default_value_t = 299792458)]
    seed: u64,

    /// Enable tracing output.
    #[arg(long)]
    tracing: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.tracing {
        tracing_subscriber::fmt::init();
    }

    let device = device(args.cpu)?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let logits = random_logits(&mut rng, args.timesteps, 1, args.num_classes, &device)?;
    // Decoding walks frames on the host; bring the logits over once.
    let logits = logits.to_device(&candle::Device::Cpu)?;

    let cfg = Config::new(args.num_classes)
        .with_beam_width(args.beam_width)
        .with_top_paths(args.top_paths)
        .with_merge_repeated(!args.no_merge_repeated);
    let seq_lens = [args.timesteps];

    let greedy = GreedyDecoder::new(&cfg)?;
    let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)?;
    let best_path = greedy.decode(&log_probs, &seq_lens)?;
    println!("greedy best path:");
    println!("  {}", format_path(&best_path[0]));

    let mut decoder = BeamSearchDecoder::new(&cfg)?;
    let paths = decoder.decode_logits(&logits, &seq_lens)?;
    println!("beam search top {}:", args.top_paths);
    for path in &paths[0] {
        println!("  {}", format_path(path));
    }
    Ok(())
}
