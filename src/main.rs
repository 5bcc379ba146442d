use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod allocate;
mod catalog;
mod download;
mod images;
mod normalize;
mod types;
mod workflow;
mod writer;

pub use types::*;

use catalog::CatalogColumns;
use workflow::{ListingConfig, FAILED_CSV_NAME, LISTING_CSV_NAME};

#[derive(Parser)]
#[command(name = "comic-lister")]
#[command(about = "Match CLZ comic exports against cover images and build marketplace upload CSVs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the marketplace upload CSV from a CLZ export and hosted image URLs
    Build {
        /// CLZ catalog export CSV
        catalog: PathBuf,
        /// Marketplace upload template CSV
        #[arg(short, long)]
        template: PathBuf,
        /// Hosted image URLs: text file (one per line) or JSON
        #[arg(short, long)]
        urls: PathBuf,
        /// Output directory, created if absent
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
        /// Minimum start price; lower or unpriced records are raised to it
        #[arg(long)]
        min_start_price: Option<f64>,
        /// Header name of the required series column
        #[arg(long, default_value = "Series")]
        series_column: String,
        /// Header name of the required issue number column
        #[arg(long, default_value = "Issue Nr")]
        issue_column: String,
    },
    /// Match a directory of local cover images against a CLZ export
    Match {
        /// CLZ catalog export CSV
        catalog: PathBuf,
        /// Directory of cover image files
        #[arg(short, long)]
        images: PathBuf,
        /// Output directory, created if absent
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
        /// Header name of the required series column
        #[arg(long, default_value = "Series")]
        series_column: String,
        /// Header name of the required issue number column
        #[arg(long, default_value = "Issue Nr")]
        issue_column: String,
    },
    /// Download scraped cover images into staged series folders
    Download {
        /// Scrape export CSV with Series, Issue, and Image URL columns
        input: PathBuf,
        /// Root directory for staged series folders
        #[arg(short, long, default_value = "staged")]
        output_dir: PathBuf,
        /// Quiet mode - suppress per-item progress output
        #[arg(short, long)]
        quiet: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            catalog,
            template,
            urls,
            output_dir,
            min_start_price,
            series_column,
            issue_column,
        } => {
            let config = ListingConfig {
                catalog_csv: catalog,
                template_csv: template,
                urls_file: urls,
                output_dir: output_dir.clone(),
                min_start_price,
                columns: CatalogColumns {
                    series: series_column,
                    issue: issue_column,
                },
            };
            let report = workflow::run_listing_workflow(&config)?;
            println!(
                "Done! {} matched, {} failed out of {} rows ({} images parsed, {} unused)",
                report.matched,
                report.failed,
                report.total_rows,
                report.images_parsed,
                report.unused_images
            );
            println!(
                "  Wrote {} and {} to {}",
                LISTING_CSV_NAME,
                FAILED_CSV_NAME,
                output_dir.display()
            );
        }
        Commands::Match {
            catalog,
            images,
            output_dir,
            series_column,
            issue_column,
        } => {
            let columns = CatalogColumns {
                series: series_column,
                issue: issue_column,
            };
            let report = workflow::run_local_match(&catalog, &images, &output_dir, &columns)?;
            println!(
                "Done! {} matched, {} failed out of {} rows ({} images indexed, {} unused)",
                report.matched,
                report.failed,
                report.total_rows,
                report.images_parsed,
                report.unused_images
            );
        }
        Commands::Download {
            input,
            output_dir,
            quiet,
        } => {
            let items = download::load_download_items(&input)?;
            println!("Downloading {} covers into {}", items.len(), output_dir.display());

            let print_progress = |current: usize, total: usize, label: &str| {
                println!("  [{}/{}] {}", current, total, label);
            };
            let progress: Option<download::ProgressFn> =
                if quiet { None } else { Some(&print_progress) };

            let outcome = download::download_images(&items, &output_dir, progress)?;
            println!(
                "Done! {} downloaded, {} skipped",
                outcome.downloaded, outcome.skipped
            );
        }
    }

    Ok(())
}
