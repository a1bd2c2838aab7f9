/// Version injected at compile time via STACKCTL_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("STACKCTL_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::TryStreamExt;
use serde_json::{json, Map, Value};
use stacksdk::error::format_api_error;
use stacksdk::resource::registry::{self, ResourceEntry};
use stacksdk::resource::Resource;
use stacksdk::{wait, CloudClient};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Command line client for OpenStack-style clouds
#[derive(Parser, Debug)]
#[command(name = "stackctl", version = VERSION, about, long_about = None)]
struct Args {
    /// Cloud from clouds.yaml to use (defaults to OS_CLOUD)
    #[arg(short, long)]
    cloud: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the supported resource types
    Types,

    /// List resources of a type
    List {
        /// Resource type, e.g. baremetal.node
        kind: String,

        /// Query filter as key=value (repeatable)
        #[arg(short, long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, Value)>,

        /// Page size requested from the server
        #[arg(long)]
        limit: Option<u64>,

        /// Only read the first page
        #[arg(long)]
        no_paginate: bool,
    },

    /// Show one resource by name or id
    Show { kind: String, name_or_id: String },

    /// Delete a resource by id
    Delete {
        kind: String,
        id: String,

        /// Succeed when the resource does not exist
        #[arg(long)]
        ignore_missing: bool,
    },

    /// Wait for a resource attribute to reach a value
    Wait {
        kind: String,
        id: String,

        /// Target value, compared case-insensitively
        #[arg(long)]
        status: String,

        /// Value that aborts the wait (repeatable, defaults to ERROR)
        #[arg(long = "failure")]
        failures: Vec<String>,

        /// Attribute to watch
        #[arg(long, default_value = "status")]
        attribute: String,

        /// Seconds between checks (defaults to the cloud's wait_interval)
        #[arg(long)]
        interval: Option<u64>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
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

fn parse_filter(raw: &str) -> Result<(String, Value), String> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(format!("expected key=value, got '{}'", raw));
    };
    if key.is_empty() {
        return Err(format!("empty filter name in '{}'", raw));
    }
    // Numbers and booleans are sent typed, everything else as a string
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
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
            eprintln!("Cannot open log file {}: {}", log_path.display(), e);
            return None;
        },
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_env("STACKCTL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("stackctl {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("stacksdk").join("stackctl.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".stacksdk").join("stackctl.log");
    }
    PathBuf::from("stackctl.log")
}

fn lookup(kind: &str) -> Result<&'static ResourceEntry> {
    match registry::get_resource(kind) {
        Some(entry) => Ok(entry),
        None => bail!(
            "unknown resource type '{}', known types: {}",
            kind,
            registry::get_all_resource_kinds().join(", ")
        ),
    }
}

/// Declared attributes plus the id, which may live under a wire name
fn render(resource: &Resource) -> Value {
    let mut map: Map<String, Value> = resource.to_map();
    if let Some(id) = resource.id() {
        map.insert("id".to_string(), Value::String(id));
    }
    Value::Object(map)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    if let Command::Types = args.command {
        let types: Vec<Value> = registry::get_registry()
            .values()
            .map(|e| json!({"type": e.kind, "name": e.display_name, "service": e.schema.service}))
            .collect();
        return print_json(&Value::Array(types));
    }

    let client = CloudClient::from_config(args.cloud.as_deref()).context("Failed to load cloud configuration")?;
    let session = client.session().clone();

    match args.command {
        Command::Types => Ok(()),

        Command::List {
            kind,
            filters,
            limit,
            no_paginate,
        } => {
            let entry = lookup(&kind)?;
            let mut params: BTreeMap<String, Value> = filters.into_iter().collect();
            if let Some(limit) = limit {
                params.insert("limit".to_string(), json!(limit));
            }
            if entry.schema.base_path.contains("{project_id}") && !params.contains_key("project_id") {
                if let Some(ref project_id) = client.cloud().project_id {
                    params.insert("project_id".to_string(), json!(project_id));
                }
            }

            let items: Vec<Resource> = Resource::list(session, entry.schema, params, !no_paginate)?
                .try_collect()
                .await?;
            tracing::info!("Listed {} {}", items.len(), entry.display_name);
            print_json(&Value::Array(items.iter().map(render).collect()))
        },

        Command::Show { kind, name_or_id } => {
            let entry = lookup(&kind)?;
            let found = Resource::find(session, entry.schema, &name_or_id, false, BTreeMap::new()).await?;
            match found {
                Some(resource) => print_json(&render(&resource)),
                None => bail!("No {} found for {}", kind, name_or_id),
            }
        },

        Command::Delete {
            kind,
            id,
            ignore_missing,
        } => {
            let entry = lookup(&kind)?;
            let mut resource = Resource::with_id(entry.schema, &id);
            match resource.delete(session.as_ref()).await {
                Ok(()) => print_json(&json!({"deleted": id})),
                Err(e) if e.is_not_found() && ignore_missing => print_json(&json!({"missing": id})),
                Err(e) => Err(e.into()),
            }
        },

        Command::Wait {
            kind,
            id,
            status,
            failures,
            attribute,
            interval,
            timeout,
        } => {
            let entry = lookup(&kind)?;
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| client.wait_interval());
            let failures: Vec<&str> = failures.iter().map(String::as_str).collect();

            let mut resource = Resource::with_id(entry.schema, &id);
            wait::wait_for_attribute(
                session.as_ref(),
                &mut resource,
                &attribute,
                &status,
                (!failures.is_empty()).then_some(failures.as_slice()),
                interval,
                timeout.map(Duration::from_secs),
            )
            .await?;
            print_json(&render(&resource))
        },
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_guard = setup_logging(args.log_level);

    if let Err(err) = run(args).await {
        let message = match err.downcast_ref::<stacksdk::Error>() {
            Some(api_error) => format_api_error(api_error),
            None => format!("{:#}", err),
        };
        tracing::error!("{}", message);
        eprintln!("Error: {}", message);
        drop(log_guard);
        std::process::exit(1);
    }
}
