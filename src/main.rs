use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use vmsbackup::listing;
use vmsbackup::options::DEFAULT_MASK;
use vmsbackup::{open_path, DebugLevel, ExtractMode, ExtractOptions, FsSink, OutputType, SaveSetReader};

#[derive(Parser)]
#[command(name = "vmsbackup", about = "List and extract OpenVMS BACKUP save sets")]
struct Cli {
    /// Save-set file
    saveset: PathBuf,
    /// Listing style
    #[arg(short, long, value_enum, default_value = "brief")]
    list: ListArg,
    /// List only, extract nothing
    #[arg(short, long)]
    no_extract: bool,
    /// How file content is interpreted
    #[arg(short = 'x', long, value_enum, default_value = "smart")]
    mode: ModeArg,
    /// Files to select, `NAME` or `NAME;VERSION` (VERSION: `*`, N > 0, or 0, -1, ...)
    #[arg(short, long, default_value = DEFAULT_MASK)]
    mask: String,
    /// Recreate the [DIR.SUB] folder stack
    #[arg(short, long)]
    folders: bool,
    /// Keep the ;N version suffix in file names
    #[arg(short = 'V', long)]
    with_version: bool,
    /// Stamp extracted files with their revision date
    #[arg(short, long)]
    timestamps: bool,
    /// Read the whole save set into memory first
    #[arg(short, long)]
    ram_cache: bool,
    /// Diagnostics: -d basic, -dd enhanced
    #[arg(short, action = ArgAction::Count)]
    debug: u8,
    /// Directory extracted files are written to
    #[arg(short = 'C', long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ListArg {
    Suppress,
    Brief,
    Full,
    Csv,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Smart,
    Ascii,
    Binary,
    Raw,
}

impl From<ListArg> for OutputType {
    fn from(v: ListArg) -> Self {
        match v {
            ListArg::Suppress => OutputType::Suppress,
            ListArg::Brief    => OutputType::Brief,
            ListArg::Full     => OutputType::Full,
            ListArg::Csv      => OutputType::Csv,
        }
    }
}

impl From<ModeArg> for ExtractMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Smart  => ExtractMode::Smart,
            ModeArg::Ascii  => ExtractMode::Ascii,
            ModeArg::Binary => ExtractMode::Binary,
            ModeArg::Raw    => ExtractMode::Raw,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let opts = build_options(&cli);
    init_logging(opts.debug);

    let source = open_path(&cli.saveset, opts.ram_cache)?;
    let sink = FsSink::new(&cli.output_dir, &opts);
    let mut reader = SaveSetReader::new(source, sink, opts.clone());
    let summary = reader.run()?;

    if opts.output != OutputType::Suppress {
        println!("{}", listing::banner(&summary.save_set_name, summary.block_size));
    }
    for entry in &summary.files {
        if let Some(text) = listing::render(entry, opts.output) {
            print!("{text}");
        }
    }
    if !summary.warnings.is_empty() {
        eprintln!("{} warning(s)", summary.warnings.len());
    }
    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn build_options(cli: &Cli) -> ExtractOptions {
    let mut opts = ExtractOptions {
        output:          cli.list.into(),
        extract:         !cli.no_extract,
        mode:            cli.mode.into(),
        with_folders:    cli.folders,
        with_version:    cli.with_version,
        with_timestamps: cli.timestamps,
        ram_cache:       cli.ram_cache,
        debug:           match cli.debug {
            0 => DebugLevel::None,
            1 => DebugLevel::Basic,
            _ => DebugLevel::Enhanced,
        },
        ..ExtractOptions::default()
    };
    if let Err(e) = opts.set_mask(&cli.mask) {
        eprintln!("{e}, using '{DEFAULT_MASK}'");
    }
    opts
}

fn init_logging(debug: DebugLevel) {
    let level = match debug {
        DebugLevel::None     => tracing::Level::WARN,
        DebugLevel::Basic    => tracing::Level::DEBUG,
        DebugLevel::Enhanced => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
