use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use layer2spine::{Exporter, JsonFormat, MemoryDocument, ProgressUpdate, RunOutcome, Settings};

#[derive(Parser, Debug)]
#[command(name = "layer2spine", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,

    /// More log output (repeat for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write attachment images and the skeleton JSON.
    Export(RunArgs),
    /// Validate the layer tags without writing images or JSON.
    Check(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Input document JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Settings JSON; missing keys take their defaults.
    #[arg(long)]
    settings: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Args, Debug, Default)]
struct Overrides {
    #[arg(long)]
    ignore_hidden_layers: Option<bool>,
    #[arg(long)]
    ignore_background: Option<bool>,
    #[arg(long)]
    write_template: Option<bool>,
    #[arg(long)]
    write_json: Option<bool>,
    #[arg(long)]
    trim_whitespace: Option<bool>,
    #[arg(long)]
    selection_only: Option<bool>,
    #[arg(long)]
    scale: Option<f64>,
    #[arg(long)]
    padding: Option<u32>,
    /// Image folder, relative to the document folder; empty skips images.
    #[arg(long)]
    images_dir: Option<String>,
    /// JSON file or folder, relative to the document folder; empty skips JSON.
    #[arg(long)]
    json_path: Option<String>,
    #[arg(long, value_enum)]
    format: Option<FormatChoice>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Legacy,
    Current,
}

impl Overrides {
    fn apply(self, s: &mut Settings) {
        let Self {
            ignore_hidden_layers,
            ignore_background,
            write_template,
            write_json,
            trim_whitespace,
            selection_only,
            scale,
            padding,
            images_dir,
            json_path,
            format,
        } = self;
        set(&mut s.ignore_hidden_layers, ignore_hidden_layers);
        set(&mut s.ignore_background, ignore_background);
        set(&mut s.write_template, write_template);
        set(&mut s.write_json, write_json);
        set(&mut s.trim_whitespace, trim_whitespace);
        set(&mut s.selection_only, selection_only);
        set(&mut s.scale, scale);
        set(&mut s.padding, padding);
        set(&mut s.images_dir, images_dir);
        set(&mut s.json_path, json_path);
        set(
            &mut s.format,
            format.map(|f| match f {
                FormatChoice::Legacy => JsonFormat::Legacy,
                FormatChoice::Current => JsonFormat::Current,
            }),
        );
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *field = v;
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    match cli.cmd {
        Command::Export(args) => cmd_run(args, false, cli.quiet),
        Command::Check(args) => cmd_run(args, true, cli.quiet),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::WARN,
        (false, 1) => tracing::Level::INFO,
        (false, 2) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_run(args: RunArgs, check_only: bool, quiet: bool) -> anyhow::Result<ExitCode> {
    let mut settings = match &args.settings {
        Some(path) => Settings::from_json_file(path)?,
        None => Settings::default(),
    };
    args.overrides.apply(&mut settings);

    let mut doc = MemoryDocument::from_path(&args.in_path)
        .with_context(|| format!("load document '{}'", args.in_path.display()))?;

    let mut report = |u: &ProgressUpdate<'_>| {
        if !quiet {
            eprintln!("[{:?}] {}/{} {}", u.stage, u.count, u.total, u.label);
        }
    };
    let outcome = Exporter::new(settings)
        .check_only(check_only)
        .with_progress(&mut report)
        .run(&mut doc)?;

    match outcome {
        RunOutcome::Completed(summary) => {
            if check_only {
                eprintln!(
                    "ok: {} bones, {} slots, {} attachments",
                    summary.bones, summary.slots, summary.attachments
                );
                return Ok(ExitCode::SUCCESS);
            }
            for path in &summary.images {
                eprintln!("wrote {}", path.display());
            }
            if let Some(path) = &summary.json_path {
                eprintln!("wrote {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Rejected(report) => {
            eprintln!("{}", report.summary());
            if let Some(path) = &report.log_path {
                eprintln!("error log: {}", path.display());
            }
            Ok(ExitCode::from(2))
        }
        RunOutcome::Cancelled => {
            eprintln!("cancelled");
            Ok(ExitCode::from(130))
        }
    }
}
