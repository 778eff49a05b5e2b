use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

use mistake_book::imaging::transform::Rect;
use mistake_book::ops::rename::{preview_batch_rename, BatchPattern};
use mistake_book::ops::stats::format_size;
use mistake_book::state::config::CropSettings;
use mistake_book::state::metadata::MetadataStore;
use mistake_book::{
    Command, CropRegion, Entry, Error, ExportFormat, JobEvent, JobOutput, MetadataRecord, Outcome, Paths,
    RepositoryService, Result,
};

/// Subject-organized repository of mistake questions
#[derive(Parser, Debug)]
#[command(name = "mistake-book", version, about)]
struct Cli {
    /// Data directory holding `repository/`, `backup/` and `config.json`
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List a directory (relative paths start at the repository root)
    List { path: Option<PathBuf> },
    /// List subject directories
    Subjects,
    /// Find files whose name contains TERM, ignoring case
    Search { term: String },
    /// File counts and sizes
    Stats,
    /// Copy files into a subject directory
    Import {
        /// Defaults to the last subject used
        #[arg(short, long)]
        subject: Option<String>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    Rename { entry: PathBuf, new_name: String },
    /// Rename to `prefix + name + suffix + _NNN + ext`
    BatchRename(BatchRenameArgs),
    Copy { entry: PathBuf, target_dir: PathBuf },
    Move { entry: PathBuf, target_dir: PathBuf },
    Delete { entry: PathBuf },
    /// Print the sidecar record of an entry
    Show { entry: PathBuf },
    /// Save sidecar fields; fields already stored are kept
    Edit(EditArgs),
    /// Add tags (comma separated)
    Tag { entry: PathBuf, tags: String },
    Enhance {
        entry: PathBuf,
        #[arg(long, default_value_t = 1.0)]
        brightness: f32,
        #[arg(long, default_value_t = 1.0)]
        contrast: f32,
        #[arg(long, default_value_t = 1.0)]
        sharpness: f32,
    },
    Crop(CropArgs),
    /// Rotate counter-clockwise by DEGREES
    Rotate {
        entry: PathBuf,
        #[arg(allow_hyphen_values = true)]
        degrees: f32,
    },
    /// Extract text into `<name>_ocr.txt`
    Ocr {
        entry: PathBuf,
        #[arg(long)]
        lang: Option<String>,
    },
    /// Export files and folders into one document (whole repository if none given).
    ///
    /// The output is the laid-out page model as JSON, ready for a PDF or
    /// Word encoder.
    Export {
        /// pdf or docx; defaults to the configured format
        #[arg(short, long)]
        format: Option<ExportFormat>,
        /// Defaults to `mistake-book.pdf.json` or `mistake-book.docx.json`
        #[arg(short, long)]
        output: Option<PathBuf>,
        paths: Vec<PathBuf>,
    },
    /// Snapshot the repository into `backup/<timestamp>`
    Backup,
    /// Show the configuration, or set KEY to VALUE
    Config { key: Option<String>, value: Option<String> },
}

#[derive(Args, Debug)]
struct BatchRenameArgs {
    #[arg(long, default_value = "")]
    prefix: String,
    #[arg(long, default_value = "")]
    suffix: String,
    #[arg(long, default_value_t = 1)]
    start: u32,
    #[arg(long, default_value_t = 3)]
    width: usize,
    /// Print the new names without renaming
    #[arg(long)]
    dry_run: bool,
    #[arg(required = true)]
    entries: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct EditArgs {
    entry: PathBuf,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    subject: Option<String>,
    #[arg(long)]
    tags: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args, Debug)]
struct CropArgs {
    entry: PathBuf,
    #[arg(long)]
    left: u32,
    #[arg(long)]
    top: u32,
    #[arg(long)]
    right: u32,
    #[arg(long)]
    bottom: u32,
    /// Bounds are percentages of the image size
    #[arg(long)]
    percent: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("❌ Could not start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let data_root = cli
        .root
        .or_else(Paths::default_root)
        .ok_or_else(|| Error::Unsupported("no data directory available on this platform".into()))?;
    let mut service = RepositoryService::open(Paths::under(&data_root), Handle::current())?;

    let command = match cli.command {
        Cmd::List { path } => Command::List { path },
        Cmd::Subjects => {
            for subject in service.subjects()? {
                println!("{subject}");
            }
            return Ok(());
        }
        Cmd::Search { term } => Command::Search { term },
        Cmd::Stats => Command::Stats,
        Cmd::Import { subject, files } => Command::Import {
            subject: subject.unwrap_or_else(|| service.config().last_subject.clone()),
            sources: files,
        },
        Cmd::Rename { entry, new_name } => Command::Rename { entry, new_name },
        Cmd::BatchRename(args) => {
            let pattern = BatchPattern {
                prefix: args.prefix,
                suffix: args.suffix,
                start: args.start,
                width: args.width,
            };
            if args.dry_run {
                let entries = args
                    .entries
                    .iter()
                    .map(|p| Entry::from_path(service.current_dir().join(p)))
                    .collect::<Result<Vec<_>>>()?;
                for (old, new) in preview_batch_rename(&entries, &pattern) {
                    println!("{old} -> {new}");
                }
                return Ok(());
            }
            Command::BatchRename {
                entries: args.entries,
                pattern,
            }
        }
        Cmd::Copy { entry, target_dir } => Command::Copy { entry, target_dir },
        Cmd::Move { entry, target_dir } => Command::Move { entry, target_dir },
        Cmd::Delete { entry } => Command::Delete { entry },
        Cmd::Show { entry } => {
            let entry = Entry::from_path(service.current_dir().join(entry))?;
            print_record(&service.metadata().get(&entry)?);
            return Ok(());
        }
        Cmd::Edit(args) => {
            let mut record = MetadataRecord::new();
            record.title = args.title;
            record.subject = args.subject;
            record.tags = args.tags;
            record.notes = args.notes;
            Command::SaveMetadata {
                entry: args.entry,
                record,
            }
        }
        Cmd::Tag { entry, tags } => Command::AddTags { entry, tags },
        Cmd::Enhance {
            entry,
            brightness,
            contrast,
            sharpness,
        } => Command::Enhance {
            entry,
            brightness,
            contrast,
            sharpness,
        },
        Cmd::Crop(args) => {
            let region = if args.percent {
                CropRegion::Percent(CropSettings {
                    left: args.left,
                    top: args.top,
                    right: args.right,
                    bottom: args.bottom,
                })
            } else {
                CropRegion::Pixels(Rect {
                    left: args.left,
                    top: args.top,
                    right: args.right,
                    bottom: args.bottom,
                })
            };
            Command::Crop {
                entry: args.entry,
                region,
            }
        }
        Cmd::Rotate { entry, degrees } => Command::Rotate { entry, degrees },
        Cmd::Ocr { entry, lang } => Command::Ocr { entry, language: lang },
        Cmd::Export { format, output, paths } => {
            let format = format.unwrap_or(service.config().export_format);
            let output = output.unwrap_or_else(|| PathBuf::from(format.default_file_name()));
            let paths = if paths.is_empty() {
                vec![service.current_dir().to_path_buf()]
            } else {
                paths
            };
            match format {
                ExportFormat::Pdf => Command::ExportPdf { paths, output },
                ExportFormat::Docx => Command::ExportWord { paths, output },
            }
        }
        Cmd::Backup => Command::Backup,
        Cmd::Config { key: None, .. } => {
            let json = service
                .config()
                .to_json()
                .map_err(|e| Error::json("show config", &service.paths().config_file, e))?;
            println!("{json}");
            return Ok(());
        }
        Cmd::Config {
            key: Some(key),
            value: Some(value),
        } => Command::SetConfig { key, value },
        Cmd::Config { key: Some(key), value: None } => {
            return Err(Error::Unsupported(format!("missing value for '{key}'")));
        }
    };

    match service.dispatch(command)? {
        Outcome::Scheduled(handle) => {
            println!("⏳ {} job {} started", handle.kind, handle.id);
            let event = service.next_event().await.ok_or_else(|| Error::Background {
                operation: handle.kind.as_str(),
                message: "job queue closed".into(),
            })?;
            print_event(event)
        }
        outcome => {
            print_outcome(outcome);
            Ok(())
        }
    }
}

fn print_outcome(outcome: Outcome) {
    match outcome {
        Outcome::Listing(entries) | Outcome::SearchResults(entries) => {
            let store = MetadataStore::new();
            for entry in entries {
                let tags = store.tags_for_display(&entry);
                if tags.is_empty() {
                    println!("{:<10} {:>10}  {}", entry.kind.label(), format_size(entry.size), entry.path.display());
                } else {
                    println!(
                        "{:<10} {:>10}  {}  [{tags}]",
                        entry.kind.label(),
                        format_size(entry.size),
                        entry.path.display()
                    );
                }
            }
        }
        Outcome::Navigated(path) => println!("{}", path.display()),
        Outcome::Stats(stats) => {
            println!("Total files: {}", stats.total_files);
            println!("Total size:  {}", format_size(stats.total_bytes));
            for (subject, count) in &stats.by_subject {
                println!("  {subject}: {count}");
            }
        }
        Outcome::Entry(entry) => println!("✅ {}", entry.path.display()),
        Outcome::BatchRenamed(report) => {
            for (old, new) in &report.renamed {
                println!("{} -> {}", old.display(), new.display());
            }
            for skipped in &report.skipped {
                println!("skipped (name taken): {}", skipped.display());
            }
            for (path, error) in &report.failures {
                println!("failed: {}: {error}", path.display());
            }
            println!("✅ Renamed {} item(s)", report.renamed_count());
        }
        Outcome::Deleted(path) => println!("🗑️  Deleted {}", path.display()),
        Outcome::Metadata(record) => print_record(&record),
        Outcome::ConfigUpdated => println!("✅ Settings saved"),
        Outcome::Scheduled(handle) => println!("⏳ {} job {} started", handle.kind, handle.id),
    }
}

fn print_record(record: &MetadataRecord) {
    println!("Title:    {}", record.title());
    println!("Subject:  {}", record.subject());
    println!("Tags:     {}", record.tags());
    println!("Notes:    {}", record.notes());
    if let Some(modified) = &record.modified_time {
        println!("Modified: {modified}");
    }
}

fn print_event(event: JobEvent) -> Result<()> {
    match event.outcome? {
        JobOutput::Exported(report) => {
            for (path, error) in &report.failures {
                println!("skipped: {}: {error}", path.display());
            }
            println!("✅ Exported {} page(s) to {}", report.pages, report.output.display());
        }
        JobOutput::BackedUp(snapshot) => {
            println!("✅ Backed up {} file(s) to {}", snapshot.files, snapshot.path.display());
        }
        JobOutput::TextExtracted { text, sidecar } => {
            println!("{text}");
            println!("✅ Saved to {}", sidecar.display());
        }
        JobOutput::Imported { subject, report } => {
            for (path, error) in &report.failures {
                println!("failed: {}: {error}", path.display());
            }
            println!("✅ Imported {} file(s) into {subject}", report.imported_count());
        }
    }
    Ok(())
}
