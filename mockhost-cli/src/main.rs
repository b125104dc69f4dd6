//! mockhost CLI

mod input;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mockhost_scripting::prelude::*;
use mockhost_scripting::stores::STORES_VAR_NAME;
use mockhost_store::StoreService;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mockhost")]
#[command(about = "Check and run mockhost response scripts", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a script and run its health check
    Check {
        /// Path to script file
        script: PathBuf,
    },

    /// Run a script and print the response behaviour it configures
    Run {
        /// Path to script file
        script: PathBuf,

        /// JSON object file whose members become bindings
        #[arg(short, long)]
        bindings: Option<PathBuf>,

        /// Disable the object-proxying store interceptor
        #[arg(long)]
        no_store_proxy: bool,
    },

    /// Evaluate a condition expression
    Eval {
        /// Expression code
        code: String,

        /// JSON object file whose members become bindings
        #[arg(short, long)]
        bindings: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { script } => {
            init_tracing(&cli.log_level)?;

            let source = input::load_script(&script)?;
            let service = RhaiScriptService::new(ScriptingConfig::from_env());

            match service.init_script(&source) {
                Ok(()) => {
                    tracing::info!("✓ Script {} is valid", source.id);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("✗ Script check failed: {}", e.cause());
                    std::process::exit(1);
                }
            }
        }

        Commands::Run {
            script,
            bindings,
            no_store_proxy,
        } => {
            init_tracing(&cli.log_level)?;

            let source = input::load_script(&script)?;
            let mut config = ScriptingConfig::from_env();
            if no_store_proxy {
                config = config.with_store_proxy(false);
            }

            let stores = StoreService::new();
            let service = RhaiScriptService::new(config);
            service.after_routes_configured(&stores);

            let mut bindings = input::load_bindings(bindings.as_deref())?;
            bindings.insert(STORES_VAR_NAME, StoresBinding::new(stores.clone()));

            service.init_script(&source)?;
            let behaviour = service.execute_script(&source, bindings)?;

            tracing::debug!(stores = ?stores.store_names(), "Script finished");
            println!("{}", serde_json::to_string_pretty(&behaviour)?);
            service.shutdown();
            Ok(())
        }

        Commands::Eval { code, bindings } => {
            init_tracing(&cli.log_level)?;

            let service = RhaiScriptService::new(ScriptingConfig::from_env());
            let bindings = input::load_bindings(bindings.as_deref())?;
            let result = service.execute_eval_script("eval", &code, bindings)?;

            println!("{}", result);
            Ok(())
        }

        Commands::Version => {
            println!("mockhost");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            println!("Script engine: {}", mockhost_scripting::rhai_engine::ENGINE_NAME);
            Ok(())
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(filter.into())
                .add_directive("mockhost_store=info".parse()?),
        )
        .init();

    Ok(())
}
