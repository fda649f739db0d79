use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::Parser;
use legato::io::conll::ConllReader;
use legato::io::create_preface;
use legato::trainer::{Algorithm, Trainer, TrainerConfig};
use legato::{FeatureConfig, LegatoError, Task};

#[derive(Parser, Debug)]
#[clap(name = "train", about = "CRF model trainer", version)]
struct Args {
    /// Training corpus in CoNLL format: one token per line with
    /// whitespace-separated columns (word, POS, chunk, entity), blank line
    /// between sentences.
    #[clap(short = 'i', long)]
    input: PathBuf,

    /// Directory the model files are written to.
    #[clap(short = 'm', long)]
    model: PathBuf,

    /// Tagging task: pos, chunk, or ner.
    #[clap(short = 't', long, default_value = "pos")]
    task: String,

    /// Training algorithm: lbfgs or sgd.
    #[clap(long, default_value = "lbfgs")]
    trainer: String,

    /// Sigma of the L2 regularizer.
    #[clap(long, default_value = "0.707")]
    sigma: f64,

    /// Maximum number of L-BFGS iterations or SGD epochs.
    #[clap(long, default_value = "500")]
    niterations: u64,

    /// Number of epochs the SGD convergence test looks back over.
    #[clap(long, default_value = "10")]
    period: usize,

    /// Learning rate the SGD calibration starts from.
    #[clap(long, default_value = "0.1")]
    eta: f64,

    /// Relative-improvement convergence tolerance of SGD.
    #[clap(long, default_value = "1e-5")]
    delta: f64,

    /// Frequency cutoff for word features.
    #[clap(long, default_value = "1")]
    cutoff_words: u64,

    /// Aggregate frequency cutoff for whole attributes.
    #[clap(long, default_value = "1")]
    cutoff_attribs: u64,

    /// Frequency cutoff for features of every non-word type.
    #[clap(long, default_value = "1")]
    cutoff_default: u64,

    /// Seed of the SGD shuffling.
    #[clap(long, default_value = "42")]
    seed: u64,

    /// Disable the previous-word features.
    #[clap(long)]
    no_prev_words: bool,

    /// Disable the next-word features.
    #[clap(long)]
    no_next_words: bool,

    /// Disable the word-bigram features.
    #[clap(long)]
    no_word_bigrams: bool,

    /// Disable the POS features (chunk and ner tasks).
    #[clap(long)]
    no_pos: bool,

    /// Disable the shape features (ner task).
    #[clap(long)]
    no_shape: bool,
}

fn parse_args() -> Result<Option<Args>, LegatoError> {
    match Args::try_parse() {
        Ok(args) => Ok(Some(args)),
        Err(e)
            if e.kind() == clap::ErrorKind::DisplayHelp
                || e.kind() == clap::ErrorKind::DisplayVersion =>
        {
            print!("{e}");
            Ok(None)
        }
        Err(e) => Err(LegatoError::config("arguments", None, e.to_string())),
    }
}

fn run() -> Result<(), LegatoError> {
    let args = match parse_args()? {
        Some(args) => args,
        None => return Ok(()),
    };
    let task: Task = args.task.parse()?;
    let algorithm: Algorithm = args.trainer.parse()?;

    let mut features = FeatureConfig::default();
    if args.no_prev_words {
        features.use_prev_words = false;
    }
    if args.no_next_words {
        features.use_next_words = false;
    }
    if args.no_word_bigrams {
        features.use_word_bigrams = false;
    }
    if args.no_pos {
        features.use_pos = false;
        features.use_prev_pos = false;
        features.use_next_pos = false;
        features.use_pos_bigrams = false;
    }
    if args.no_shape {
        features.use_shape = false;
    }

    let config = TrainerConfig::new(task)
        .features(features)
        .algorithm(algorithm)
        .sigma(args.sigma)
        .niterations(args.niterations)
        .period(args.period)
        .eta(args.eta)
        .delta(args.delta)
        .cutoff_words(args.cutoff_words)
        .cutoff_attribs(args.cutoff_attribs)
        .cutoff_default(args.cutoff_default)
        .seed(args.seed);
    let trainer = Trainer::new(config)?;

    let uri = args.input.display().to_string();
    let file = File::open(&args.input).map_err(|e| LegatoError::io(uri.as_str(), e.to_string()))?;
    let mut reader = ConllReader::new(uri, BufReader::new(file));

    let model = trainer.train(&mut reader)?;

    let cli_args: Vec<String> = std::env::args().skip(1).collect();
    model.save(&args.model, &create_preface("train", &cli_args))?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        eprintln!("\x1b[31merror: {e}\x1b[0m");
        std::process::exit(1);
    }
}
