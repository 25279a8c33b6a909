//! Cardiff CLI binary.
//!
//! Discovers, downloads and extracts Companies House accounts bulk data
//! into flat CSV.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use cardiff_data::error::DataError;
use cardiff_data::pool::default_workers;
use cardiff_data::{
    ArchiveRef, DownloadConfig, discover_archives, download_archive, extract_archive, retain_after,
};
use cardiff_output::RowWriter;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

/// Companies House daily accounts index page.
const DEFAULT_INDEX_URL: &str = "http://download.companieshouse.gov.uk/en_accountsdata.html";

/// User agent for download requests.
const USER_AGENT: &str = "Cardiff-Accounts/0.1 (contact@example.com)";

#[derive(Parser)]
#[command(name = "cardiff")]
#[command(about = "Cardiff: Companies House accounts extraction", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List accounts archives published on the download index pages
    Discover {
        /// Index page URL (repeatable; defaults to the daily accounts index)
        #[arg(long = "url")]
        urls: Vec<String>,

        /// Keep only archives ending strictly after this date
        #[arg(long)]
        cutoff: Option<NaiveDate>,

        /// Output format (json or text)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Extract a downloaded archive into a CSV file
    Extract {
        /// Path to an accounts ZIP archive
        archive: PathBuf,

        /// Output CSV path
        #[arg(long, short)]
        out: PathBuf,

        /// Value for the zip_url column
        #[arg(long)]
        zip_url: Option<String>,

        /// Worker threads (defaults to all cores but one)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Discover, download and extract archives into one CSV file
    Run {
        /// Index page URL (repeatable; defaults to the daily accounts index)
        #[arg(long = "url")]
        urls: Vec<String>,

        /// Keep only archives ending strictly after this date
        #[arg(long)]
        cutoff: Option<NaiveDate>,

        /// Output CSV path
        #[arg(long, short)]
        out: PathBuf,

        /// Worker threads (defaults to all cores but one)
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Discover {
            urls,
            cutoff,
            format,
        } => {
            let archives = discover(&index_urls(urls), cutoff).await?;
            print_archives(&archives, &format)?;
        }
        Commands::Extract {
            archive,
            out,
            zip_url,
            workers,
        } => {
            extract_local(&archive, &out, zip_url.unwrap_or_default(), workers)?;
        }
        Commands::Run {
            urls,
            cutoff,
            out,
            workers,
        } => {
            run_pipeline(&index_urls(urls), cutoff, &out, workers).await?;
        }
    }

    Ok(())
}

fn index_urls(urls: Vec<String>) -> Vec<String> {
    if urls.is_empty() {
        vec![DEFAULT_INDEX_URL.to_string()]
    } else {
        urls
    }
}

fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().user_agent(USER_AGENT).build()
}

async fn discover(
    urls: &[String],
    cutoff: Option<NaiveDate>,
) -> Result<Vec<ArchiveRef>, Box<dyn std::error::Error>> {
    let client = http_client()?;
    let mut archives = discover_archives(&client, urls).await?;
    if let Some(cutoff) = cutoff {
        archives = retain_after(archives, cutoff);
    }
    Ok(archives)
}

fn print_archives(
    archives: &[ArchiveRef],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(archives)?),
        _ => {
            for archive in archives {
                println!(
                    "{}  {}..{}  {}",
                    archive.name, archive.start_date, archive.end_date, archive.url
                );
            }
            println!("{} archive(s)", archives.len());
        }
    }
    Ok(())
}

fn extract_local(
    archive: &Path,
    out: &Path,
    zip_url: String,
    workers: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(archive)?;
    let mut writer = RowWriter::create(out)?;
    let workers = workers.unwrap_or_else(default_workers);

    let pb = spinner(format!("Extracting {}", archive.display()));
    let summary = extract_archive(file, workers, |row| {
        writer
            .write_row(&row, &zip_url)
            .map_err(|e| DataError::Sink(e.to_string()))
    })?;
    writer.flush()?;
    pb.finish_with_message(format!(
        "{}: {} document(s), {} row(s), {} skipped",
        archive.display(),
        summary.documents,
        summary.rows,
        summary.skipped
    ));
    Ok(())
}

async fn run_pipeline(
    urls: &[String],
    cutoff: Option<NaiveDate>,
    out: &Path,
    workers: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = http_client()?;
    let mut archives = discover_archives(&client, urls).await?;
    if let Some(cutoff) = cutoff {
        archives = retain_after(archives, cutoff);
    }
    println!("{} archive(s) to process", archives.len());

    let config = DownloadConfig::default();
    let workers = workers.unwrap_or_else(default_workers);
    let mut writer = RowWriter::create(out)?;
    let mut total_documents = 0;
    let mut total_rows = 0;

    for archive in archives {
        let pb = spinner(format!("Downloading {}", archive.name));
        let download = download_archive(&client, &archive.url, &config).await?;
        let file = download.into_file();

        pb.set_message(format!("Extracting {}", archive.name));
        let zip_url = archive.url.clone();
        let (summary, returned) = tokio::task::spawn_blocking(move || {
            let mut writer = writer;
            let summary = extract_archive(file, workers, |row| {
                writer
                    .write_row(&row, &zip_url)
                    .map_err(|e| DataError::Sink(e.to_string()))
            })?;
            Ok::<_, DataError>((summary, writer))
        })
        .await??;
        writer = returned;

        total_documents += summary.documents;
        total_rows += summary.rows;
        pb.finish_with_message(format!(
            "{}: {} document(s), {} row(s), {} skipped",
            archive.name, summary.documents, summary.rows, summary.skipped
        ));
    }

    writer.flush()?;
    println!(
        "Done: {} document(s), {} row(s) written to {}",
        total_documents,
        total_rows,
        out.display()
    );
    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message);
    pb
}
