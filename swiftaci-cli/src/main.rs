//! SwiftACI command-line client
//!
//! Reads, lists and applies managed objects on a controller.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use swiftaci_core::{FilterValue, ObjectSpec, Query, Session};
use swiftaci_rest::{ApicConfig, RestTransport};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PASSWORD_ENV: &str = "SWIFTACI_PASSWORD";

/// SwiftACI client
#[derive(Parser, Debug)]
#[command(name = "swiftaci")]
#[command(version)]
#[command(about = "Managed object client for ACI controllers", long_about = None)]
struct Cli {
    /// Connection settings file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Controller base URL (overrides the config file)
    #[arg(long, global = true)]
    url: Option<String>,

    #[arg(short, long, global = true)]
    username: Option<String>,

    /// Password (falls back to $SWIFTACI_PASSWORD)
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    insecure: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print an object by DN
    Get {
        /// Distinguished name, e.g. uni/tn-common
        dn: String,
    },

    /// List objects of a class
    List {
        /// Class name, e.g. fvTenant
        class: String,

        /// Filter or query option as key=value[,value..] (repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,
    },

    /// Show naming and attribute metadata of a class
    Schema {
        /// Class name, e.g. fvTenant
        class: String,
    },

    /// Create or update an object from a JSON document
    Apply {
        /// File holding {"<class>": {"attributes": {...}}}
        file: PathBuf,

        /// Print the pending diff without saving
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into())
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let config = resolve_config(&cli)?;
    let transport = Arc::new(RestTransport::new(&config).context("Failed to create HTTP client")?);
    transport
        .login(&config.password)
        .with_context(|| format!("Login to {} failed", config.url))?;
    let session = Session::new(transport.clone());

    let outcome = run(&session, cli.command);
    if let Err(e) = transport.logout() {
        debug!("Logout failed: {}", e);
    }
    outcome
}

/// Merge the config file, command-line flags and environment
fn resolve_config(cli: &Cli) -> Result<ApicConfig> {
    let mut config = match &cli.config {
        Some(path) => ApicConfig::load(path)?,
        None => {
            let url = cli
                .url
                .clone()
                .ok_or_else(|| anyhow!("--url is required without --config"))?;
            let username = cli
                .username
                .clone()
                .ok_or_else(|| anyhow!("--username is required without --config"))?;
            ApicConfig::new(url, username, "")
        }
    };

    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(username) = &cli.username {
        config.username = username.clone();
    }
    if let Some(password) = &cli.password {
        config.password = password.clone();
    } else if let Ok(password) = std::env::var(PASSWORD_ENV) {
        config.password = password;
    }
    if cli.insecure {
        config.verify_ssl = false;
    }
    Ok(config)
}

fn run(session: &Session, command: Commands) -> Result<()> {
    match command {
        Commands::Get { dn } => {
            let mo = session.dn(&dn)?;
            println!("{}", serde_json::to_string_pretty(&mo.serialize()?)?);
        }

        Commands::List { class, filters } => {
            let pairs = filters
                .iter()
                .map(|f| parse_filter_arg(f))
                .collect::<Result<Vec<_>>>()?;
            let query = Query::from_pairs(pairs)?;
            let mut count = 0usize;
            for mo in session.list(&class, &query)? {
                println!("{}", mo?.to_json()?);
                count += 1;
            }
            info!("{} {} object(s)", count, class);
        }

        Commands::Schema { class } => {
            let schema = session.schema(&class)?;
            println!("class:     {}", schema.class_name());
            println!("rnFormat:  {}", schema.rn_format());
            println!("naming:    {}", schema.naming_attributes().join(", "));
            for attr in schema.attributes() {
                let mut flags = Vec::new();
                if attr.is_naming {
                    flags.push("naming");
                }
                if attr.is_mandatory {
                    flags.push("mandatory");
                }
                if attr.is_configurable {
                    flags.push("configurable");
                }
                println!("  {:<24} {}", attr.name, flags.join(" "));
            }
        }

        Commands::Apply { file, dry_run } => {
            let data = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let doc: Value = serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse {:?}", file))?;
            let (class, spec) = ObjectSpec::from_document(&doc)?;

            let mut mo = session.get_or_create(&class, spec)?;
            println!("{}", serde_json::to_string_pretty(&mo.diff()?)?);
            if dry_run {
                info!("Dry run, {} not saved", mo);
            } else if mo.save()? {
                info!("Saved {}", mo);
            } else {
                info!("{} is up to date", mo);
            }
        }
    }
    Ok(())
}

/// Parse `key=value` or `key=v1,v2` into a query pair
fn parse_filter_arg(arg: &str) -> Result<(String, FilterValue)> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid filter '{}', expected key=value", arg))?;
    if key.is_empty() {
        bail!("Invalid filter '{}', empty key", arg);
    }
    let value = if value.contains(',') {
        FilterValue::List(value.split(',').map(str::to_string).collect())
    } else {
        FilterValue::Scalar(value.to_string())
    };
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_arg() {
        assert_eq!(
            parse_filter_arg("fvTenant_name=common").unwrap(),
            ("fvTenant_name".to_string(), FilterValue::Scalar("common".to_string()))
        );
        assert_eq!(
            parse_filter_arg("fvTenant_name__in=a,b").unwrap(),
            (
                "fvTenant_name__in".to_string(),
                FilterValue::List(vec!["a".to_string(), "b".to_string()])
            )
        );
        assert!(parse_filter_arg("novalue").is_err());
        assert!(parse_filter_arg("=x").is_err());
    }

    #[test]
    fn test_cli_flags_override_config() {
        let cli = Cli::parse_from([
            "swiftaci",
            "--url",
            "https://apic2",
            "--username",
            "ops",
            "--password",
            "pw",
            "--insecure",
            "get",
            "uni",
        ]);
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.url, "https://apic2");
        assert_eq!(config.username, "ops");
        assert_eq!(config.password, "pw");
        assert!(!config.verify_ssl);
    }

    #[test]
    fn test_url_required_without_config() {
        let cli = Cli::parse_from(["swiftaci", "schema", "fvTenant"]);
        assert!(resolve_config(&cli).is_err());
    }
}
