pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod importer;
pub mod io_utils;
pub mod mapper;
pub mod profile;
pub mod reader;
pub mod record;
pub mod store;
pub mod synonyms;
pub mod table;

use std::{
    env,
    path::PathBuf,
    sync::{Arc, OnceLock},
};

use anyhow::{Context, Result};
use clap::Parser;
use heck::ToSnakeCase;
use log::{LevelFilter, debug, info};

use crate::{
    cache::TtlCache,
    catalog::FileCatalog,
    cli::{Cli, Commands, GlobalArgs, ProfileCommands},
    config::ImportConfig,
    export::Exporter,
    importer::BatchImporter,
    profile::{MappingProfile, ProfileSelector, ProfileStore},
    reader::{FileReader, ReaderOptions},
    store::{JsonFileStore, RecordFilter},
    synonyms::SynonymDictionary,
};

pub use crate::{
    error::ImportError,
    fingerprint::HeaderFingerprint,
    importer::{BatchOutcome, ImportSession, ImportState},
    record::VehicleRecord,
    store::{MemoryStore, RecordStore},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("inventory_import", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let app = App::from_args(&cli.global)?;
    match cli.command {
        Commands::Inspect(args) => app.inspect(&args),
        Commands::Preview(args) => app.preview(&args),
        Commands::Start(args) => app.start(&args),
        Commands::Batch(args) => app.batch(&args),
        Commands::Import(args) => app.import(&args),
        Commands::Export(args) => app.export(&args),
        Commands::Profile(command) => match command {
            ProfileCommands::Save(args) => app.save_profile(&args),
            ProfileCommands::List => app.list_profiles(),
            ProfileCommands::Show(args) => app.show_profile(&args),
        },
        Commands::Files => app.list_files(),
        Commands::Fields => app.list_fields(),
    }
}

/// Settings and shared services for one CLI invocation.
struct App {
    config: ImportConfig,
    reader_options: ReaderOptions,
    dictionary: Arc<SynonymDictionary>,
}

impl App {
    fn from_args(args: &GlobalArgs) -> Result<Self> {
        let mut config = ImportConfig::resolve(args.config.as_deref())
            .context("Loading import configuration")?;
        if let Some(store) = &args.store {
            config.store_path = store.clone();
        }
        if let Some(profiles) = &args.profiles {
            config.profile_dir = profiles.clone();
        }
        if let Some(uploads) = &args.uploads {
            config.upload_dir = uploads.clone();
        }
        if let Some(encoding) = &args.input_encoding {
            config.input_encoding = Some(encoding.clone());
        }
        debug!("Effective configuration: {config:?}");

        let encoding = io_utils::resolve_encoding(config.input_encoding.as_deref())?;
        let delimiter = match args.delimiter {
            Some(delimiter) => Some(delimiter),
            None => config.delimiter_byte()?,
        };
        let dictionary = match &config.dictionary {
            Some(path) => Arc::new(
                SynonymDictionary::load(path)
                    .with_context(|| format!("Loading synonym dictionary from {path:?}"))?,
            ),
            None => Arc::new(SynonymDictionary::default_dictionary().clone()),
        };
        Ok(App {
            reader_options: ReaderOptions {
                delimiter,
                encoding,
            },
            dictionary,
            config,
        })
    }

    fn profile_store(&self) -> ProfileStore {
        ProfileStore::new(&self.config.profile_dir, self.config.cache_ttl())
    }

    fn catalog(&self) -> FileCatalog {
        FileCatalog::new(
            &self.config.upload_dir,
            TtlCache::with_system_clock(self.config.cache_ttl()),
        )
    }

    fn input_path(&self, file_ref: &str) -> Result<PathBuf> {
        self.catalog()
            .resolve(file_ref)
            .with_context(|| format!("Locating input '{file_ref}'"))
    }

    fn open_store(&self) -> Result<JsonFileStore> {
        JsonFileStore::open(&self.config.store_path, Some(self.dictionary.clone()))
            .with_context(|| format!("Opening record store {:?}", self.config.store_path))
    }

    fn importer(&self) -> Result<BatchImporter<JsonFileStore>> {
        Ok(BatchImporter::new(self.open_store()?)
            .with_dictionary(self.dictionary.clone())
            .with_profiles(self.profile_store())
            .with_reader_options(self.reader_options))
    }

    /// Resolution only needs the dictionary and saved profiles.
    fn resolver(&self) -> BatchImporter<MemoryStore> {
        BatchImporter::new(MemoryStore::new())
            .with_dictionary(self.dictionary.clone())
            .with_profiles(self.profile_store())
            .with_reader_options(self.reader_options)
    }

    fn inspect(&self, args: &cli::InspectArgs) -> Result<()> {
        let path = self.input_path(&args.input)?;
        let resolver = self.resolver();
        let info = resolver
            .file_info(&path)
            .with_context(|| format!("Reading {path:?}"))?;
        let selector = ProfileSelector::from_option(args.profile.as_deref());
        let resolved = resolver
            .resolve(&path, &selector)
            .with_context(|| format!("Resolving mapping profile for {path:?}"))?;

        println!("File: {}", path.display());
        println!(
            "Delimiter: '{}'",
            printable_delimiter(FileReader::new(&path, self.reader_options).delimiter())
        );
        println!("Fingerprint: {}", info.fingerprint);
        println!("Columns: {}", info.column_count);
        println!("Data rows: {}", info.row_count);
        println!("Profile: {}", resolved.profile.id);
        println!();
        let rows = resolved
            .resolution
            .resolved
            .iter()
            .map(|(field, idx)| {
                vec![
                    field.clone(),
                    self.dictionary.field_type(field).to_string(),
                    resolved.headers.get(*idx).cloned().unwrap_or_default(),
                    (idx + 1).to_string(),
                ]
            })
            .collect::<Vec<_>>();
        table::print_table(&headers(&["field", "type", "column", "position"]), &rows);
        if !resolved.resolution.unresolved.is_empty() {
            println!();
            println!("Unresolved: {}", resolved.resolution.unresolved.join(", "));
        }

        let unmapped = resolved
            .headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| resolved.resolution.resolved.iter().all(|(_, col)| col != idx))
            .map(|(_, header)| vec![header.clone(), header.to_snake_case()])
            .collect::<Vec<_>>();
        if !unmapped.is_empty() {
            println!();
            table::print_table(&headers(&["unmapped column", "suggested field"]), &unmapped);
        }
        Ok(())
    }

    fn preview(&self, args: &cli::PreviewArgs) -> Result<()> {
        let path = self.input_path(&args.input)?;
        let rows = FileReader::new(&path, self.reader_options)
            .read_window(args.page, args.page_size)
            .with_context(|| format!("Reading page {} of {path:?}", args.page))?;
        let Some((header, body)) = rows.split_first() else {
            info!("{path:?} is empty; nothing to preview");
            return Ok(());
        };
        info!(
            "Previewing {} row(s) of {:?} (page {}, page size {})",
            body.len(),
            path,
            args.page,
            args.page_size
        );
        table::print_table(header, body);
        Ok(())
    }

    fn start(&self, args: &cli::SessionArgs) -> Result<()> {
        let path = self.input_path(&args.input)?;
        let selector = ProfileSelector::from_option(args.profile.as_deref());
        let session = self
            .importer()?
            .start_session(&path, &selector)
            .with_context(|| format!("Starting import of {path:?}"))?;
        println!("{}", serde_json::to_string_pretty(&session)?);
        Ok(())
    }

    fn batch(&self, args: &cli::BatchArgs) -> Result<()> {
        let path = self.input_path(&args.input)?;
        let selector = ProfileSelector::from_option(args.profile.as_deref());
        let limit = args.limit.unwrap_or(self.config.batch_size);
        let outcome = self
            .importer()?
            .process_batch(&path, args.offset, limit, &selector)
            .with_context(|| format!("Importing rows {}.. of {path:?}", args.offset))?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        Ok(())
    }

    fn import(&self, args: &cli::ImportArgs) -> Result<()> {
        let path = self.input_path(&args.input)?;
        let selector = ProfileSelector::from_option(args.profile.as_deref());
        let batch_size = args.batch_size.unwrap_or(self.config.batch_size);
        if batch_size == 0 {
            anyhow::bail!("Batch size must be greater than zero");
        }
        let importer = self.importer()?;
        let mut session = importer
            .start_session(&path, &selector)
            .with_context(|| format!("Starting import of {path:?}"))?;
        while !session.is_complete() {
            let outcome = importer
                .process_batch(&path, session.offset, batch_size, &session.selector)
                .with_context(|| format!("Importing rows {}.. of {path:?}", session.offset))?;
            session.advance(&outcome);
            debug!(
                "Session {} at offset {} of {}",
                session.id, session.offset, session.total_rows
            );
        }
        info!(
            "Imported {:?} in {} batch(es): {} added, {} updated, {} skipped",
            path, session.batches, session.added, session.updated, session.skipped
        );
        println!("{}", serde_json::to_string_pretty(&session)?);
        Ok(())
    }

    fn export(&self, args: &cli::ExportArgs) -> Result<()> {
        let store = self.open_store()?;
        let filter = args
            .make
            .as_ref()
            .map(|make| RecordFilter::new("make", make.clone()));
        let writer = io_utils::open_output(args.output.as_deref())?;
        Exporter::new(&store)
            .export_filtered(filter.as_ref(), args.format, writer)
            .with_context(|| format!("Exporting records from {:?}", self.config.store_path))?;
        Ok(())
    }

    fn save_profile(&self, args: &cli::ProfileSaveArgs) -> Result<()> {
        let path = self.input_path(&args.input)?;
        let resolved = self
            .resolver()
            .resolve(&path, &ProfileSelector::Auto)
            .with_context(|| format!("Resolving columns of {path:?}"))?;
        let profile = MappingProfile::from_resolution(
            &args.id,
            args.name.clone(),
            &resolved.headers,
            &resolved.resolution,
        );
        let saved = self
            .profile_store()
            .save(&profile)
            .with_context(|| format!("Saving profile '{}'", args.id))?;
        info!(
            "Saved profile '{}' with {} field(s) to {:?}",
            profile.id,
            profile.fields.len(),
            saved
        );
        Ok(())
    }

    fn list_profiles(&self) -> Result<()> {
        let profiles = self
            .profile_store()
            .list()
            .with_context(|| format!("Listing profiles in {:?}", self.config.profile_dir))?;
        let rows = profiles
            .iter()
            .map(|profile| {
                vec![
                    profile.id.clone(),
                    profile.name.clone().unwrap_or_default(),
                    profile
                        .fingerprint
                        .as_ref()
                        .map(|fp| fp.short().to_string())
                        .unwrap_or_default(),
                    profile.fields.len().to_string(),
                ]
            })
            .collect::<Vec<_>>();
        table::print_table(&headers(&["id", "name", "fingerprint", "fields"]), &rows);
        Ok(())
    }

    fn show_profile(&self, args: &cli::ProfileShowArgs) -> Result<()> {
        let profile = self.profile_store().get(&args.id)?;
        print!("{}", serde_yaml::to_string(&profile)?);
        Ok(())
    }

    fn list_files(&self) -> Result<()> {
        let entries = self
            .catalog()
            .list()
            .with_context(|| format!("Listing uploads in {:?}", self.config.upload_dir))?;
        let rows = entries
            .iter()
            .map(|entry| {
                vec![
                    entry.name.clone(),
                    entry.size.to_string(),
                    entry
                        .modified
                        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default(),
                ]
            })
            .collect::<Vec<_>>();
        table::print_table(&headers(&["name", "bytes", "modified"]), &rows);
        Ok(())
    }

    fn list_fields(&self) -> Result<()> {
        let rows = self
            .dictionary
            .entries()
            .iter()
            .map(|entry| {
                vec![
                    entry.name.clone(),
                    entry.field_type.to_string(),
                    entry.synonyms.join(" | "),
                ]
            })
            .collect::<Vec<_>>();
        table::print_table(&headers(&["field", "type", "spellings"]), &rows);
        Ok(())
    }
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        b',' => ",".to_string(),
        b'|' => "|".to_string(),
        b';' => ";".to_string(),
        other => (other as char).to_string(),
    }
}

