/// Version injected at compile time via OPREG_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("OPREG_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use opreg::api;
use opreg::config::Config;
use opreg::criteria::criteria_holds;
use opreg::{
    identity_of, self_link_for, DocumentStore, EndpointLookup, FileStore, OperationQuery,
    OperationRegistry, RemoteStore, Resolver, ResourceAccess, ResourceOperationSpec,
    ResourceState, ResourceType, StoreCollaborators,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Resource operation registry
#[derive(Parser, Debug)]
#[command(name = "opreg", version = VERSION, about, long_about = None)]
struct Args {
    /// Base URL of a remote document service
    #[arg(long, global = true)]
    store_url: Option<String>,

    /// Local store file (ignored when a store URL is set)
    #[arg(long, global = true)]
    store_path: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register the spec, or list of specs, in a JSON or YAML file
    Register {
        file: PathBuf,
    },
    /// Look up a spec by its key fields
    Get {
        #[command(flatten)]
        key: SpecKey,
    },
    /// List the operations currently available for a resource
    Query {
        /// Resource self link
        resource: String,
    },
    /// Evaluate a target criteria against a resource state file
    Eval {
        #[arg(long)]
        criteria: String,
        /// JSON or YAML resource state
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Print the identity and self link for a key
    Identity {
        #[command(flatten)]
        key: SpecKey,
    },
    /// Show or update the saved configuration
    Config {
        /// Save the given store URL
        #[arg(long)]
        set_store_url: Option<String>,
        /// Save the given store file
        #[arg(long)]
        set_store_path: Option<PathBuf>,
        /// Save the given bearer token
        #[arg(long)]
        set_token: Option<String>,
        /// Save the given request timeout
        #[arg(long)]
        set_timeout_secs: Option<u64>,
    },
}

#[derive(clap::Args, Debug)]
struct SpecKey {
    #[arg(long)]
    endpoint_type: String,
    #[arg(long)]
    resource_type: ResourceType,
    #[arg(long)]
    operation: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Logging disabled, cannot open {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("opreg started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("opreg").join("opreg.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".opreg").join("opreg.log");
    }
    PathBuf::from("opreg.log")
}

/// Registry and query wired over one set of collaborators
struct Services {
    registry: OperationRegistry,
    query: OperationQuery,
}

impl Services {
    fn over(
        store: Arc<dyn DocumentStore>,
        endpoints: Arc<dyn EndpointLookup>,
        resources: Arc<dyn ResourceAccess>,
    ) -> Self {
        let resolver = Resolver::new(store.clone(), endpoints);
        Self {
            registry: OperationRegistry::new(store),
            query: OperationQuery::new(resolver, resources),
        }
    }

    async fn connect(args: &Args, config: &Config) -> Result<Self> {
        if let Some(url) = config.effective_store_url(args.store_url.as_deref()) {
            tracing::info!("Using remote store: {}", url);
            let remote = Arc::new(RemoteStore::new(
                &url,
                config.effective_timeout(),
                config.token.clone(),
            )?);
            return Ok(Self::over(remote.clone(), remote.clone(), remote));
        }

        let path = config.effective_store_path(args.store_path.as_deref());
        tracing::info!("Using file store: {:?}", path);
        let store = FileStore::open(&path).await?;
        let collaborators = Arc::new(StoreCollaborators::new(store.clone()));
        Ok(Self::over(
            Arc::new(store),
            collaborators.clone(),
            collaborators,
        ))
    }
}

/// Read a JSON or YAML document, picking the format by file extension
fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML in {}", path.display()))
    } else {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum SpecFile {
    One(Box<ResourceOperationSpec>),
    Many(Vec<ResourceOperationSpec>),
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load();

    match args.command {
        Command::Register { ref file } => {
            let specs = match read_document::<SpecFile>(file)? {
                SpecFile::One(spec) => vec![*spec],
                SpecFile::Many(specs) => specs,
            };
            let services = Services::connect(&args, &config).await?;
            let stored = services.registry.register_all(specs).await?;
            print_json(&stored)?;
        }
        Command::Get { ref key } => {
            let services = Services::connect(&args, &config).await?;
            let spec = services
                .query
                .resolver()
                .by_endpoint_type(&key.endpoint_type, key.resource_type, &key.operation)
                .await?;
            match spec {
                Some(spec) => print_json(&spec)?,
                None => anyhow::bail!(
                    "No operation {} registered for {}/{}",
                    key.operation,
                    key.endpoint_type,
                    key.resource_type
                ),
            }
        }
        Command::Query { ref resource } => {
            let services = Services::connect(&args, &config).await?;
            let params = [(api::RESOURCE_PARAM.to_string(), resource.clone())]
                .into_iter()
                .collect();
            print_json(&api::query_json(&services.query, &params).await?)?;
        }
        Command::Eval {
            ref criteria,
            ref state,
        } => {
            let state: Option<ResourceState> = state
                .as_deref()
                .map(read_document::<ResourceState>)
                .transpose()?;
            let available = criteria_holds(Some(criteria.as_str()), state.as_ref())?;
            println!("{}", available);
        }
        Command::Identity { ref key } => {
            let identity = identity_of(&key.endpoint_type, key.resource_type, &key.operation);
            println!("{}", identity);
            println!("{}", self_link_for(&identity));
        }
        Command::Config {
            ref set_store_url,
            ref set_store_path,
            ref set_token,
            set_timeout_secs,
        } => {
            let changed = set_store_url.is_some()
                || set_store_path.is_some()
                || set_token.is_some()
                || set_timeout_secs.is_some();

            if let Some(url) = set_store_url {
                config.store_url = Some(url.clone()).filter(|u| !u.trim().is_empty());
            }
            if let Some(path) = set_store_path {
                config.store_path = Some(path.clone());
            }
            if let Some(token) = set_token {
                config.token = Some(token.clone()).filter(|t| !t.is_empty());
            }
            if let Some(secs) = set_timeout_secs {
                config.timeout_secs = Some(secs);
            }
            if changed {
                config.save()?;
                tracing::info!("Saved configuration");
            }

            let mut shown = config.clone();
            if shown.token.is_some() {
                shown.token = Some("********".to_string());
            }
            print_json(&shown)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    if let Err(err) = run(args).await {
        let message = match err.downcast_ref::<opreg::Error>() {
            Some(e) => api::format_error(e),
            None => format!("{:#}", err),
        };
        tracing::error!("{:#}", err);
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }

    Ok(())
}
