use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use quizbank::{
    enhance, parse_quiz_bank, EnhanceOptions, OptionalFields, ParseOptions, QuizRecord,
};

#[derive(Parser)]
#[command(name = "quizbank", about = "Generated quiz-bank XML to import-ready records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse one quiz-bank document into JSON records
    Parse {
        /// Input file, or '-' for stdin
        input: String,
        /// Write records here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Chapter number applied to every record
        #[arg(long)]
        chapter_no: Option<String>,
        /// Chapter title applied to every record
        #[arg(long)]
        chapter_title: Option<String>,
        /// Extract the per-item <PATH> field (codebase banks)
        #[arg(long)]
        codebase: bool,
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Parse every .xml file in a directory
    Batch {
        /// Directory containing quiz-bank .xml files
        dir: PathBuf,
        /// Write <stem>.records.json files here (default: next to each input)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
        /// Chapter number applied to every record
        #[arg(long)]
        chapter_no: Option<String>,
        /// Chapter title applied to every record
        #[arg(long)]
        chapter_title: Option<String>,
        /// Extract the per-item <PATH> field (codebase banks)
        #[arg(long)]
        codebase: bool,
    },
    /// Overlay difficulty/time/tag/chapter metadata onto parsed records
    Enhance {
        /// Records file produced by 'parse'
        input: PathBuf,
        /// JSON file with the override maps
        #[arg(long)]
        options: PathBuf,
        /// Write enhanced records here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr so piped record output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse {
            input,
            output,
            chapter_no,
            chapter_title,
            codebase,
            pretty,
        } => {
            let raw = read_input(&input)?;
            let opts = parse_options(chapter_no, chapter_title, codebase);
            let outcome = parse_quiz_bank(&raw, &opts);
            forward_diagnostics(&input, &outcome.diagnostics);
            write_json(output.as_deref(), &outcome.records, pretty)?;
            info!(
                "{}: {} records, {} skipped",
                input,
                outcome.records.len(),
                outcome.skipped
            );
            Ok(())
        }
        Commands::Batch {
            dir,
            out_dir,
            chapter_no,
            chapter_title,
            codebase,
        } => {
            let opts = parse_options(chapter_no, chapter_title, codebase);
            let counts = process_batch(&dir, out_dir.as_deref(), &opts)?;
            counts.print();
            Ok(())
        }
        Commands::Enhance {
            input,
            options,
            output,
            pretty,
        } => {
            let records: Vec<QuizRecord> = read_json(&input)?;
            let overrides: EnhanceOptions = read_json(&options)?;
            let enhanced = enhance(&records, &overrides);
            write_json(output.as_deref(), &enhanced, pretty)?;
            info!("Enhanced {} records", enhanced.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct BatchCounts {
    files: usize,
    records: usize,
    skipped: usize,
}

impl BatchCounts {
    fn print(&self) {
        println!(
            "Parsed {} files: {} records, {} skipped items.",
            self.files, self.records, self.skipped,
        );
    }
}

fn process_batch(dir: &Path, out_dir: Option<&Path>, opts: &ParseOptions) -> Result<BatchCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let mut inputs: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        })
        .collect();
    inputs.sort();

    if inputs.is_empty() {
        println!("No .xml files in {}. Nothing to do.", dir.display());
        return Ok(BatchCounts {
            files: 0,
            records: 0,
            skipped: 0,
        });
    }
    if let Some(out) = out_dir {
        fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    }

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );

    // Each document is one independent parse; files fan out across threads.
    let results: Vec<(usize, usize)> = inputs
        .par_iter()
        .map(|path| {
            let counts = match parse_file(path, out_dir, opts) {
                Ok(counts) => counts,
                Err(e) => {
                    warn!("{}: {e:#}", path.display());
                    (0, 0)
                }
            };
            pb.inc(1);
            counts
        })
        .collect();
    pb.finish_and_clear();

    let mut counts = BatchCounts {
        files: inputs.len(),
        records: 0,
        skipped: 0,
    };
    for (records, skipped) in results {
        counts.records += records;
        counts.skipped += skipped;
    }
    Ok(counts)
}

fn parse_file(path: &Path, out_dir: Option<&Path>, opts: &ParseOptions) -> Result<(usize, usize)> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let outcome = parse_quiz_bank(&raw, opts);
    forward_diagnostics(&path.display().to_string(), &outcome.diagnostics);
    let target = output_path(path, out_dir);
    let json = serde_json::to_string(&outcome.records)?;
    fs::write(&target, json).with_context(|| format!("writing {}", target.display()))?;
    Ok((outcome.records.len(), outcome.skipped))
}

fn output_path(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let name = format!("{stem}.records.json");
    match out_dir {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

fn parse_options(
    chapter_no: Option<String>,
    chapter_title: Option<String>,
    codebase: bool,
) -> ParseOptions {
    ParseOptions {
        chapter_no,
        chapter_title,
        fields: if codebase {
            OptionalFields::codebase()
        } else {
            OptionalFields::standard()
        },
    }
}

/// The library returns its diagnostics instead of logging; surface them
/// here with the source name attached.
fn forward_diagnostics(source: &str, diagnostics: &[String]) {
    for line in diagnostics {
        let summary = line.starts_with("Successfully parsed") || line.starts_with("Skipped");
        if summary {
            info!("{source}: {line}");
        } else {
            warn!("{source}: {line}");
        }
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("reading stdin")?;
        return Ok(raw);
    }
    fs::read_to_string(input).with_context(|| format!("reading {input}"))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing JSON in {}", path.display()))
}

fn write_json<T: serde::Serialize>(output: Option<&Path>, value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
