use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use hydra_store::{DatasetApi, DatasetCandidate, content_hash, open_store};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Migrate(args) => migrate(args).await,
        Command::Catalog(args) => dump_catalog(args).await,
        Command::ImportDatasets(args) => import_datasets(args).await,
        Command::ShowDataset(args) => show_dataset(args).await,
    }
}

#[derive(Parser)]
#[command(author, version, about = "Developer utilities for Hydra datastores")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or upgrade the Hydra tables in a datastore.
    Migrate(DatastoreArgs),
    /// Print the introspected catalog as JSON.
    Catalog(CatalogArgs),
    /// Store a JSON array of dataset candidates and print one ref per candidate.
    ImportDatasets(ImportDatasetsArgs),
    /// Print a stored dataset as JSON.
    ShowDataset(ShowDatasetArgs),
}

#[derive(Parser)]
struct DatastoreArgs {
    /// Directory holding hydra.json and the sqlite file.
    #[arg(long, default_value = ".hydra")]
    datastore: PathBuf,
}

#[derive(Parser)]
struct CatalogArgs {
    #[command(flatten)]
    store: DatastoreArgs,
    /// Only print this table.
    #[arg(long)]
    table: Option<String>,
}

#[derive(Parser)]
struct ImportDatasetsArgs {
    #[command(flatten)]
    store: DatastoreArgs,
    /// JSON file containing an array of dataset candidates.
    #[arg(long)]
    input: PathBuf,
    /// Validate and hash without writing.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Parser)]
struct ShowDatasetArgs {
    #[command(flatten)]
    store: DatastoreArgs,
    #[arg(long)]
    id: i64,
}

async fn migrate(args: DatastoreArgs) -> Result<()> {
    let store = open_store(&args.datastore)
        .await
        .with_context(|| format!("failed to open {}", args.datastore.display()))?;
    println!(
        "Datastore {} is up to date ({} tables)",
        args.datastore.display(),
        store.schema().catalog().len()
    );
    Ok(())
}

async fn dump_catalog(args: CatalogArgs) -> Result<()> {
    let store = open_store(&args.store.datastore)
        .await
        .with_context(|| format!("failed to open {}", args.store.datastore.display()))?;
    let catalog = store.schema().catalog();
    let json = match &args.table {
        Some(name) => {
            let table = catalog
                .table(name)
                .ok_or_else(|| anyhow!("no table named '{name}'"))?;
            serde_json::to_string_pretty(table.as_ref())?
        }
        None => serde_json::to_string_pretty(catalog)?,
    };
    println!("{json}");
    Ok(())
}

fn read_candidates(path: &Path) -> Result<Vec<DatasetCandidate>> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

async fn import_datasets(args: ImportDatasetsArgs) -> Result<()> {
    let candidates = read_candidates(&args.input)?;
    if args.dry_run {
        for (index, candidate) in candidates.iter().enumerate() {
            candidate
                .validate(index)
                .map_err(|err| anyhow!("candidate {index}: {err}"))?;
            println!("{index}\t{}\t{}", candidate.data_type(), content_hash(candidate));
        }
        println!("{} candidates are valid", candidates.len());
        return Ok(());
    }
    let store = open_store(&args.store.datastore)
        .await
        .with_context(|| format!("failed to open {}", args.store.datastore.display()))?;
    let refs = store.bulk_insert_data(candidates).await?;
    let created = refs.iter().filter(|r| r.created).count();
    println!("{}", serde_json::to_string_pretty(&refs)?);
    println!(
        "Stored {} candidates: {created} new datasets, {} reused",
        refs.len(),
        refs.len() - created
    );
    Ok(())
}

async fn show_dataset(args: ShowDatasetArgs) -> Result<()> {
    let store = open_store(&args.store.datastore)
        .await
        .with_context(|| format!("failed to open {}", args.store.datastore.display()))?;
    let dataset = store
        .get_dataset(args.id)
        .await?
        .ok_or_else(|| anyhow!("dataset {} does not exist", args.id))?;
    println!("{}", serde_json::to_string_pretty(&dataset)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_migrate_defaults() {
        let cli = Cli::parse_from(["xtask", "migrate"]);
        match cli.command {
            Command::Migrate(args) => assert_eq!(args.datastore, PathBuf::from(".hydra")),
            _ => panic!("expected migrate command"),
        }
    }

    #[test]
    fn cli_parses_import_datasets_flags() {
        let cli = Cli::parse_from([
            "xtask",
            "import-datasets",
            "--input",
            "batch.json",
            "--datastore",
            "/tmp/hydra",
            "--dry-run",
        ]);
        match cli.command {
            Command::ImportDatasets(args) => {
                assert_eq!(args.input, PathBuf::from("batch.json"));
                assert_eq!(args.store.datastore, PathBuf::from("/tmp/hydra"));
                assert!(args.dry_run);
            }
            _ => panic!("expected import-datasets command"),
        }
    }

    #[test]
    fn reads_candidates_from_json() {
        let dir = std::env::temp_dir().join(format!("hydra-xtask-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("dir");
        let path = dir.join("batch.json");
        fs::write(
            &path,
            r#"[
                { "name": "capacity", "value": { "type": "scalar", "value": "1.01" } },
                { "name": "mode", "unit": null, "value": { "type": "descriptor", "value": "pumped" } }
            ]"#,
        )
        .expect("write");
        let candidates = read_candidates(&path).expect("candidates");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].data_type().as_str(), "descriptor");
        fs::remove_dir_all(&dir).ok();
    }
}
