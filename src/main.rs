use agentdir::{
    analytics,
    config::Config,
    dataset::{load_source, Dataset, LoadOptions},
    dossier::{self, Dossier},
    search::{Query, Scope, View},
    server,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::{env, fs, path::PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Agent directory: search, dossiers and analytics over a CSV export")]
struct Cli {
    /// YAML config file (defaults to ./agentdir.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// CSV path or glob, overrides `data.source`
    #[arg(long, global = true)]
    source: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// List profiles matching a query
    Search {
        query: String,
        /// Field to search (defaults to the second column)
        #[arg(long, conflicts_with = "all")]
        field: Option<String>,
        /// Search every field
        #[arg(long)]
        all: bool,
    },
    /// Print the group taxonomy
    Groups,
    /// Export one profile's dossier
    Dossier {
        name: String,
        #[arg(long, value_enum, default_value_t = Format::Txt)]
        format: Format,
        /// Output file (defaults to `<prefix>_<name>.<ext>`)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print region and firm-type counts
    Analytics,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Txt,
    Pdf,
    Json,
}

fn init_logging() {
    let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .init();
}

fn load(config: &Config) -> Result<Dataset> {
    load_source(&config.data.source, &LoadOptions::from(&config.data))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(source) = cli.source {
        config.data.source = source;
    }

    match cli.command {
        Command::Serve => server::serve(config).await?,

        Command::Search { query, field, all } => {
            let ds = load(&config)?;
            let scope = match (all, field) {
                (true, _) => Scope::AllFields,
                (false, Some(f)) => Scope::Field(f),
                (false, None) => ds
                    .default_search_field()
                    .map(|f| Scope::Field(f.to_string()))
                    .unwrap_or(Scope::AllFields),
            };
            let view = View::all(&ds).filter(&Query::new(&query, scope))?;
            info!(matches = view.len(), "search done");
            for name in view.profiles() {
                println!("{}", name);
            }
        }

        Command::Groups => {
            let ds = load(&config)?;
            for group in ds.taxonomy.groups() {
                println!("{}", group);
                for field in ds.taxonomy.fields_in(group) {
                    println!("  {}", field);
                }
            }
        }

        Command::Dossier { name, format, out } => {
            let ds = load(&config)?;
            let Some(record) = View::all(&ds).find_profile(&name) else {
                bail!("no profile named `{}`", name);
            };
            let cfg = &config.dossier;
            let report = Dossier::build(record, &ds.taxonomy, &name, cfg);
            let (bytes, ext) = match format {
                Format::Txt => (dossier::text::render(&report).into_bytes(), "txt"),
                Format::Pdf => (dossier::pdf::render(&report)?, "pdf"),
                Format::Json => (serde_json::to_vec_pretty(&report)?, "json"),
            };
            let path =
                out.unwrap_or_else(|| PathBuf::from(dossier::file_name(&cfg.file_prefix, &name, ext)));
            fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
            info!(profile = %name, path = %path.display(), "dossier written");
        }

        Command::Analytics => {
            let ds = load(&config)?;
            let summary = analytics::summary(&ds, &config.analytics);
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
