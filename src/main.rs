use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use cura::changelog::{
    CONTENT_TYPE, ChangelogData, ChangelogFilter, Page, content_disposition, render_workbook,
    run_report, write_csv,
};
use cura::collections::{Collection, ContactOwner, collection_for_kind, cura_catalog};
use cura::forms::FormData;
use cura::storage::{InMemoryStorage, StoreSnapshot};
use cura::{CuraConfig, DefaultDisplay, RecordId, Reconciler};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, event};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cura")]
#[command(about = "CRM sub-form reconciliation and issue changelog tooling")]
struct Cli {
    /// JSON settings file; defaults apply to missing keys
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the issue changelog from a data snapshot
    Changelog {
        #[arg(long)]
        data: PathBuf,
        /// Filter parameter as key=value; repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Page number or "all"
        #[arg(long, default_value = "1")]
        page: Page,
        /// Write the export as CSV instead of printing JSON
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Reconcile one collection of a parent record against a form submission
    Reconcile {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        form: PathBuf,
        /// Entity kind the collection edits, e.g. phone_number
        #[arg(long)]
        collection: String,
        /// Owner kind for contact collections
        #[arg(long, value_enum, default_value_t = OwnerName::Organization)]
        owner: OwnerName,
        #[arg(long)]
        parent: u64,
        /// Apply the changes and write the store back
        #[arg(long)]
        commit: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OwnerName {
    Organization,
    Person,
}

impl From<OwnerName> for ContactOwner {
    fn from(owner: OwnerName) -> Self {
        match owner {
            OwnerName::Organization => ContactOwner::Organization,
            OwnerName::Person => ContactOwner::Person,
        }
    }
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cura=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Changelog {
            data,
            params,
            page,
            export,
        } => changelog(&config, &data, params, page, export.as_deref()),
        Command::Reconcile {
            store,
            form,
            collection,
            owner,
            parent,
            commit,
        } => {
            let collection = collection_for_kind(&collection, owner.into())
                .with_context(|| format!("Unknown collection '{}'", collection))?
                .url_prefix(&config.url_prefix);
            reconcile(&store, &form, &collection, RecordId(parent), commit).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<CuraConfig> {
    let config = match path {
        Some(path) => CuraConfig::load_json(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => CuraConfig::default(),
    };
    config.validate().context("Invalid config")?;
    Ok(config)
}

fn changelog(
    config: &CuraConfig,
    data_path: &Path,
    params: Vec<(String, String)>,
    page: Page,
    export: Option<&Path>,
) -> Result<()> {
    let data = ChangelogData::load_json(data_path)
        .with_context(|| format!("Failed to load changelog data '{}'", data_path.display()))?;
    let params: BTreeMap<String, String> = params.into_iter().collect();
    let filter = ChangelogFilter::from_params(&params, &data).context("Invalid filter")?;

    let report = run_report(&data, &filter, page, config, &DefaultDisplay)?;
    if report.is_large_query {
        event!(
            Level::WARN,
            total = report.total_issues,
            "Large changelog query"
        );
    }

    match export {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create '{}'", path.display()))?;
            write_csv(&render_workbook(&report), BufWriter::new(file))?;
            event!(
                Level::INFO,
                path = %path.display(),
                content_type = CONTENT_TYPE,
                disposition = %content_disposition(&config.export_filename),
                "Changelog exported"
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

async fn reconcile(
    store_path: &Path,
    form_path: &Path,
    collection: &Collection,
    parent: RecordId,
    commit: bool,
) -> Result<()> {
    let snapshot = StoreSnapshot::load_json(store_path)
        .with_context(|| format!("Failed to load store '{}'", store_path.display()))?;
    let storage = InMemoryStorage::new(cura_catalog()?)?;
    storage.load_snapshot(snapshot).await?;

    let file = File::open(form_path)
        .with_context(|| format!("Failed to open form '{}'", form_path.display()))?;
    let form: FormData = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse form '{}'", form_path.display()))?;

    let reconciler = Reconciler::new(Arc::new(storage));
    let result = collection
        .save(&reconciler, parent, &form, commit)
        .await
        .map_err(|err| anyhow!("Failed to save {}: {}", collection.label(), err))?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if commit {
        reconciler
            .store()
            .snapshot()
            .await?
            .save_json(store_path)
            .with_context(|| format!("Failed to write store '{}'", store_path.display()))?;
        event!(
            Level::INFO,
            changes = result.change_count(),
            "Store written"
        );
    }
    Ok(())
}
