use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use legato::io::format::{Format, FormatReader, FormatWriter};
use legato::io::{create_preface, Reader, Writer};
use legato::{LegatoError, Model, Sentence, Tagger, Task};

#[derive(Parser, Debug)]
#[clap(name = "tag", about = "CRF tagger", version)]
struct Args {
    /// Input file of untagged sentences.
    #[clap(short = 'i', long)]
    input: PathBuf,

    /// Output file; stdout when omitted.
    #[clap(short = 'o', long)]
    output: Option<PathBuf>,

    /// Directory holding a trained model.
    #[clap(short = 'm', long)]
    model: PathBuf,

    /// Tagging task: pos, chunk, or ner.
    #[clap(short = 't', long, default_value = "pos")]
    task: String,

    /// Input format string; defaults to the task's usual input columns.
    #[clap(long)]
    ifmt: Option<String>,

    /// Output format string; defaults to the task's usual output columns.
    #[clap(long)]
    ofmt: Option<String>,
}

fn default_formats(task: Task) -> (&'static str, &'static str) {
    match task {
        Task::Pos => ("%w \n", "%w|%p \n"),
        Task::Chunk => ("%w|%p \n", "%w|%p|%c \n"),
        Task::Ner => ("%w|%p \n", "%w|%p|%n \n"),
    }
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
    let (default_ifmt, default_ofmt) = default_formats(task);
    let ifmt = Format::parse(args.ifmt.as_deref().unwrap_or(default_ifmt))?;
    let ofmt = Format::parse(args.ofmt.as_deref().unwrap_or(default_ofmt))?;

    let model = Model::load(&args.model)?;

    let uri = args.input.display().to_string();
    let file = File::open(&args.input).map_err(|e| LegatoError::io(uri.as_str(), e.to_string()))?;
    let mut reader = FormatReader::new(uri, BufReader::new(file), ifmt);

    let out: Box<dyn Write> = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| LegatoError::io(path.display().to_string(), e.to_string()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(std::io::stdout()),
    };
    let mut writer = FormatWriter::new(out, ofmt);

    let tagger = Tagger::new(&model, task);
    let mut state = tagger.new_state();
    let mut sent = Sentence::new();

    let cli_args: Vec<String> = std::env::args().skip(1).collect();
    writer.write_preface(&create_preface("tag", &cli_args))?;
    while reader.next(&mut sent)? {
        tagger.tag(&mut state, &mut sent);
        writer.next(&sent)?;
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        eprintln!("\x1b[31merror: {e}\x1b[0m");
        std::process::exit(1);
    }
}
