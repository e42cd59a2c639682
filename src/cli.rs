use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::export::ExportFormat;

#[derive(Debug, Parser)]
#[command(author, version, about = "Import dealer inventory feeds", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// JSON record store (created on first import)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
    /// Directory of saved mapping profiles
    #[arg(long, global = true)]
    pub profiles: Option<PathBuf>,
    /// Upload directory searched for file names
    #[arg(long, global = true)]
    pub uploads: Option<PathBuf>,
    /// Input delimiter (supports ',', 'tab', ';', '|')
    #[arg(long, global = true, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of input files (defaults to utf-8)
    #[arg(long = "input-encoding", global = true)]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show a feed's header, fingerprint, size and field resolution
    Inspect(InspectArgs),
    /// Show one page of a feed as a table
    Preview(PreviewArgs),
    /// Start an import session and print its token as JSON
    Start(SessionArgs),
    /// Import one batch of rows and print the outcome as JSON
    Batch(BatchArgs),
    /// Import a whole feed, one batch at a time
    Import(ImportArgs),
    /// Export stored vehicles as JSON or CSV
    Export(ExportArgs),
    /// Manage saved mapping profiles
    #[command(subcommand)]
    Profile(ProfileCommands),
    /// List importable files in the upload directory
    Files,
    /// List canonical fields and their known header spellings
    Fields,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Feed file path, or a file name in the upload directory
    #[arg(short = 'i', long = "input")]
    pub input: String,
    /// Saved profile to resolve with
    #[arg(short, long)]
    pub profile: Option<String>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Feed file path, or a file name in the upload directory
    #[arg(short = 'i', long = "input")]
    pub input: String,
    /// 1-based page number (0 shows every row)
    #[arg(long, default_value_t = 1)]
    pub page: usize,
    /// Data rows per page
    #[arg(long = "page-size", default_value_t = 10)]
    pub page_size: usize,
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    /// Feed file path, or a file name in the upload directory
    #[arg(short = 'i', long = "input")]
    pub input: String,
    /// Saved profile to import with
    #[arg(short, long)]
    pub profile: Option<String>,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Feed file path, or a file name in the upload directory
    #[arg(short = 'i', long = "input")]
    pub input: String,
    /// Data rows to skip before this batch
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
    /// Rows in this batch (defaults to the configured batch size)
    #[arg(long)]
    pub limit: Option<usize>,
    /// Saved profile to import with
    #[arg(short, long)]
    pub profile: Option<String>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Feed file path, or a file name in the upload directory
    #[arg(short = 'i', long = "input")]
    pub input: String,
    /// Rows per batch (defaults to the configured batch size)
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,
    /// Saved profile to import with
    #[arg(short, long)]
    pub profile: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    pub format: ExportFormat,
    /// Output file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Only vehicles of this make
    #[arg(long)]
    pub make: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    /// Save the mapping resolved for a feed as a per-dealer profile
    Save(ProfileSaveArgs),
    /// List saved profiles
    List,
    /// Print a saved profile as YAML
    Show(ProfileShowArgs),
}

#[derive(Debug, Args)]
pub struct ProfileSaveArgs {
    /// Feed whose header shape the profile is bound to
    #[arg(short = 'i', long = "input")]
    pub input: String,
    /// Profile id
    #[arg(long)]
    pub id: String,
    /// Human-readable profile name
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProfileShowArgs {
    /// Profile id
    #[arg(long)]
    pub id: String,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
