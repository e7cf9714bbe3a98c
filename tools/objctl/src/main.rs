// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! objctl - inspect and backport object primitives
//!
//! # Usage
//!
//! ```bash
//! # List built-in types and their versions
//! objctl types
//!
//! # Hydrate a primitive and print its fields
//! objctl inspect migration.json
//!
//! # Rewrite a primitive for an older node
//! objctl backport build_request.json --to 1.0
//!
//! # Configuration
//! objctl gen-config --output objects.toml
//! objctl validate-config objects.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use fleet_objects::catalog::{self, MigrationStore};
use fleet_objects::registry;
use fleet_objects::{Entity, Hydration, ObjectConfig, ObjectVersion, Registry, WireSerializer};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "objctl")]
#[command(about = "Inspect and backport versioned object primitives")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered types, versions, fields and methods
    Types {
        /// Only show this type
        #[arg(value_name = "NAME")]
        name: Option<String>,
    },

    /// Hydrate a primitive and print it as plain JSON
    Inspect {
        /// Primitive JSON file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Rewrite a primitive at an older version
    Backport {
        /// Primitive JSON file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Target version (MAJOR.MINOR)
        #[arg(long, value_name = "VERSION")]
        to: String,
    },

    /// Generate example configuration file
    GenConfig {
        /// Output file path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file
    ValidateConfig {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ObjectConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ObjectConfig::default(),
    };

    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::Types { name } => cmd_types(name.as_deref()),
        Commands::Inspect { input } => cmd_inspect(&input, &config),
        Commands::Backport { input, to } => cmd_backport(&input, &to),
        Commands::GenConfig { output } => cmd_gen_config(output.as_deref()),
        Commands::ValidateConfig { input } => cmd_validate_config(&input),
    }
}

/// The process-wide registry, populated with the catalog on first use.
fn catalog_registry() -> anyhow::Result<Arc<Registry>> {
    if let Some(registry) = registry::global() {
        return Ok(registry);
    }
    let built = catalog::registry(&Arc::new(MigrationStore::new())).context("Failed to build catalog")?;
    registry::init(built).or_else(|_| registry::global().context("Object registry is not initialized"))
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn cmd_types(only: Option<&str>) -> anyhow::Result<()> {
    let registry = catalog_registry()?;
    let names: Vec<&str> = match only {
        Some(name) if registry.contains(name) => vec![name],
        Some(name) => bail!("Unknown type '{}'", name),
        None => registry.type_names(),
    };

    for name in names {
        let versions = registry.versions(name);
        let listed: Vec<String> = versions.iter().map(ToString::to_string).collect();
        println!("{name} [{}]", listed.join(", "));

        let latest = registry.latest(name)?;
        for (field, descriptor) in latest.fields() {
            let null = if descriptor.is_nullable() { "?" } else { "" };
            println!("  {field}: {}{null}", descriptor.kind().describe());
        }
        for method in latest.method_names() {
            if let Some(entry) = latest.method(method) {
                let scope = if entry.is_class() { "class" } else { "instance" };
                let remote = if entry.is_remotable() { ", remotable" } else { "" };
                println!("  {method}() ({scope}{remote})");
            }
        }
    }
    Ok(())
}

fn cmd_inspect(input: &Path, config: &ObjectConfig) -> anyhow::Result<()> {
    let wire = read_json(input)?;
    let serializer = WireSerializer::new(catalog_registry()?).with_config(config.serializer.clone());
    let value = serializer.deserialize(None, &wire)?;
    let Some(entity) = value.as_entity() else {
        bail!("{} does not contain an object primitive", input.display());
    };

    tracing::info!(
        "{} {} (definition {})",
        entity.type_name(),
        entity.version(),
        entity.definition().version()
    );
    println!("type:    {}", entity.type_name());
    println!("version: {}", entity.version());
    let changed: Vec<String> = entity.what_changed().into_iter().collect();
    println!("changed: {}", changed.join(", "));
    println!("{}", serde_json::to_string_pretty(&entity.to_plain()?)?);
    Ok(())
}

fn cmd_backport(input: &Path, to: &str) -> anyhow::Result<()> {
    let target = ObjectVersion::parse(to)?;
    let wire = read_json(input)?;
    let registry = catalog_registry()?;
    let entity = Entity::from_json(&Hydration::new(&registry, None), &wire)?;

    if target > *entity.version() {
        bail!(
            "Cannot backport {} {} to newer version {}",
            entity.type_name(),
            entity.version(),
            target
        );
    }

    let primitive = entity.to_primitive(Some(&target))?;
    tracing::info!("{} {} -> {}", entity.type_name(), entity.version(), primitive.version);
    println!("{}", serde_json::to_string_pretty(&primitive.to_json()?)?);
    Ok(())
}

fn cmd_gen_config(output: Option<&Path>) -> anyhow::Result<()> {
    let text = ObjectConfig::example_toml()?;
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Generated configuration: {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn cmd_validate_config(input: &Path) -> anyhow::Result<()> {
    let config = ObjectConfig::from_file(input).with_context(|| format!("Invalid configuration {}", input.display()))?;
    println!("Configuration is valid");
    println!("  log_level: {}", config.log_level);
    println!("  tolerate_patch_skew: {}", config.serializer.tolerate_patch_skew);
    println!("  request_backport: {}", config.serializer.request_backport);
    Ok(())
}
