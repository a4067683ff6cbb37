//! AuroraPDF CLI - merge, split, rotate and organize PDF documents from the shell.

use anyhow::{Context, Result, bail};
use aurora_pdf_core::{
    AppConfig, CompressionLevel, DirectorySink, DocumentHandle, ImageStamp, JobId, JobReport, JobTracker,
    PageSequence, RotateTarget, RotationPolicy, SourceFile, SplitSpec, Toolkit, parse_ranges,
};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyOption {
    Absolute,
    Additive,
}

impl From<PolicyOption> for RotationPolicy {
    fn from(opt: PolicyOption) -> Self {
        match opt {
            PolicyOption::Absolute => Self::Absolute,
            PolicyOption::Additive => Self::Additive,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LevelOption {
    Low,
    Medium,
    High,
}

impl From<LevelOption> for CompressionLevel {
    fn from(opt: LevelOption) -> Self {
        match opt {
            LevelOption::Low => Self::Low,
            LevelOption::Medium => Self::Medium,
            LevelOption::High => Self::High,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "aurora-pdf")]
#[command(author, version, about = "Merge, split, rotate and organize PDF documents", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory the results are written to
    #[arg(short, long, global = true, env = "AURORA_PDF_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show page count and rotation of a PDF
    Info {
        input: PathBuf,
    },

    /// Concatenate PDFs in the given order
    Merge {
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
    },

    /// Cut a PDF into several documents
    Split {
        input: PathBuf,

        /// New part every N pages
        #[arg(long, conflicts_with = "ranges")]
        every: Option<usize>,

        /// One part per range, e.g. "1-3,5,7-9"
        #[arg(long)]
        ranges: Option<String>,
    },

    /// Rotate pages
    Rotate {
        input: PathBuf,

        /// Degrees clockwise, a multiple of 90
        #[arg(short, long, allow_hyphen_values = true)]
        angle: i64,

        /// Pages to rotate, e.g. "1-3,5" (default: all pages)
        #[arg(short, long)]
        pages: Option<String>,

        /// How the angle combines with the current rotation
        #[arg(long, value_enum)]
        policy: Option<PolicyOption>,
    },

    /// Reorder, delete and duplicate pages
    Organize {
        input: PathBuf,

        /// Output page order as source page numbers, e.g. "3,1,1,2"
        #[arg(long, conflicts_with_all = ["delete", "duplicate", "moves"])]
        order: Option<String>,

        /// Pages to remove, e.g. "2,4-5"
        #[arg(long)]
        delete: Option<String>,

        /// Pages to duplicate in place, e.g. "3"
        #[arg(long)]
        duplicate: Option<String>,

        /// Move the page at position FROM to position TO (1-based, applied last)
        #[arg(long = "move", value_name = "FROM:TO", value_parser = parse_move)]
        moves: Vec<(usize, usize)>,
    },

    /// Stamp a signature image onto a page
    Sign {
        input: PathBuf,

        /// PNG or JPEG image
        #[arg(long)]
        image: PathBuf,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 72.0)]
        x: f32,

        #[arg(long, default_value_t = 72.0)]
        y: f32,

        #[arg(long, default_value_t = 150.0)]
        width: f32,

        #[arg(long, default_value_t = 50.0)]
        height: f32,
    },

    /// Losslessly compress a PDF
    Compress {
        input: PathBuf,

        #[arg(short, long, value_enum)]
        level: Option<LevelOption>,
    },
}

/// Parse a `FROM:TO` pair of 1-based positions.
fn parse_move(value: &str) -> std::result::Result<(usize, usize), String> {
    let (from, to) = value
        .split_once(':')
        .ok_or_else(|| format!("expected FROM:TO, got '{value}'"))?;
    let position = |text: &str| -> std::result::Result<usize, String> {
        match text.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(format!("invalid position '{text}'")),
        }
    };
    Ok((position(from)?, position(to)?))
}

/// Build an organize sequence from the command-line edits.
///
/// `--delete` and `--duplicate` name pages of the input document; moves
/// refer to positions in the sequence after those edits.
fn build_sequence(
    page_count: usize,
    order: Option<&str>,
    delete: Option<&str>,
    duplicate: Option<&str>,
    moves: &[(usize, usize)],
) -> Result<PageSequence> {
    if let Some(order) = order {
        let pages: Vec<usize> = parse_ranges(order, page_count).indices().map(|i| i + 1).collect();
        if pages.is_empty() {
            bail!("--order '{order}' names no pages of this document");
        }
        return Ok(PageSequence::from_page_numbers(&pages, page_count)?);
    }

    let base = PageSequence::for_pages(page_count);
    let originals: Vec<_> = base.items().iter().map(|item| item.id).collect();
    let mut sequence = base;

    if let Some(duplicate) = duplicate {
        for index in parse_ranges(duplicate, page_count).index_set() {
            let position = sequence
                .position(originals[index])
                .context("page to duplicate is no longer in the sequence")?;
            sequence = sequence
                .with_duplicate(position)
                .context("duplicate position out of range")?;
        }
    }

    if let Some(delete) = delete {
        for index in parse_ranges(delete, page_count).index_set() {
            if let Some(position) = sequence.position(originals[index]) {
                sequence = sequence.without(position).context("delete position out of range")?;
            }
        }
    }

    for &(from, to) in moves {
        sequence = sequence
            .moved(from - 1, to - 1)
            .with_context(|| format!("cannot move {from}:{to}, sequence has {} pages", sequence.len()))?;
    }

    Ok(sequence)
}

async fn read_source(toolkit: &Toolkit, path: &Path) -> Result<SourceFile> {
    info!("Loading PDF: {}", path.display());
    SourceFile::from_path(path, &toolkit.config().limits)
        .await
        .with_context(|| format!("Failed to load PDF: {}", path.display()))
}

fn progress_bar(label: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}% ({elapsed_precise})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message(label.to_string());
    pb
}

/// Mirror the running job's progress onto `pb` until the job ends.
async fn follow_job(tracker: &JobTracker, mut created: broadcast::Receiver<JobId>, pb: &ProgressBar) {
    let Ok(id) = created.recv().await else {
        return;
    };
    let Ok(mut rx) = tracker.subscribe(id).await else {
        return;
    };
    loop {
        let snapshot = rx.borrow_and_update().clone();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        pb.set_position(snapshot.progress as u64);
        if snapshot.status.is_terminal() || rx.changed().await.is_err() {
            return;
        }
    }
}

/// Run a toolkit operation with a progress bar attached.
async fn with_progress<F>(toolkit: &Toolkit, label: &str, operation: F) -> Result<JobReport>
where
    F: Future<Output = aurora_pdf_core::Result<JobReport>>,
{
    let pb = progress_bar(label);
    // Listen before the operation creates its job
    let created = toolkit.tracker().watch_created();
    let follow = follow_job(toolkit.tracker(), created, &pb);
    tokio::pin!(operation);

    let result = tokio::select! {
        result = &mut operation => result,
        () = follow => operation.await,
    };

    match &result {
        Ok(_) => pb.finish_with_message(format!("{label} complete")),
        Err(_) => pb.abandon_with_message(format!("{label} failed")),
    }
    result.with_context(|| format!("{label} failed"))
}

fn info_command(path: &Path, bytes: &[u8]) -> Result<()> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("document.pdf");
    let handle = DocumentHandle::load(bytes, name)?;

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        println!("{}: {} pages, {} bytes", path.display(), handle.page_count(), bytes.len());
        for index in handle.page_indices() {
            let rotation = handle.rotation(index)?;
            if rotation != 0 {
                println!("  page {}: rotated {} degrees", index + 1, rotation);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };

    let toolkit = Toolkit::new(config);
    let sink = DirectorySink::new(&args.output_dir);

    let report = match args.command {
        Command::Info { input } => {
            let bytes = tokio::fs::read(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            return info_command(&input, &bytes);
        }

        Command::Merge { inputs } => {
            toolkit.accept_batch(inputs.len())?;
            let mut files = Vec::with_capacity(inputs.len());
            for input in &inputs {
                files.push(read_source(&toolkit, input).await?);
            }
            with_progress(&toolkit, "Merge", toolkit.merge(files, &sink)).await?
        }

        Command::Split { input, every, ranges } => {
            let file = read_source(&toolkit, &input).await?;
            let spec = match (every, ranges) {
                (_, Some(ranges)) => SplitSpec::Ranges(ranges),
                // Missing or zero interval means one page per part
                (every, None) => SplitSpec::Interval(NonZeroUsize::new(every.unwrap_or(1)).unwrap_or(NonZeroUsize::MIN)),
            };
            with_progress(&toolkit, "Split", toolkit.split(file, spec, &sink)).await?
        }

        Command::Rotate { input, angle, pages, policy } => {
            let file = read_source(&toolkit, &input).await?;
            let target = pages.map_or(RotateTarget::All, RotateTarget::Pages);
            with_progress(
                &toolkit,
                "Rotate",
                toolkit.rotate(file, angle, target, policy.map(Into::into), &sink),
            )
            .await?
        }

        Command::Organize {
            input,
            order,
            delete,
            duplicate,
            moves,
        } => {
            let file = read_source(&toolkit, &input).await?;
            let page_count = DocumentHandle::from_source(&file)?.page_count();
            let sequence = build_sequence(
                page_count,
                order.as_deref(),
                delete.as_deref(),
                duplicate.as_deref(),
                &moves,
            )?;
            info!("Organizing into {} pages", sequence.len());
            with_progress(&toolkit, "Organize", toolkit.organize(file, sequence, &sink)).await?
        }

        Command::Sign {
            input,
            image,
            page,
            x,
            y,
            width,
            height,
        } => {
            let file = read_source(&toolkit, &input).await?;
            let image = tokio::fs::read(&image)
                .await
                .with_context(|| format!("Failed to read image {}", image.display()))?;
            let stamp = ImageStamp {
                page: page.checked_sub(1).context("pages are numbered from 1")?,
                x,
                y,
                width,
                height,
                image: bytes::Bytes::from(image),
            };
            with_progress(&toolkit, "Sign", toolkit.sign(file, stamp, &sink)).await?
        }

        Command::Compress { input, level } => {
            let file = read_source(&toolkit, &input).await?;
            with_progress(&toolkit, "Compress", toolkit.compress(file, level.map(Into::into), &sink)).await?
        }
    };

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        for artifact in &report.artifacts {
            println!("Saved {}", sink.path_for(&artifact.filename).display());
        }
    }

    Ok(())
}
