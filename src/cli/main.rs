//! CLI binary entry point for landing-elt

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use landing_elt::cli::commands::init::{InitArgs, handle_init};
#[cfg(feature = "cli")]
use landing_elt::cli::commands::preview::{PreviewArgs, handle_preview};
#[cfg(feature = "cli")]
use landing_elt::cli::commands::run::{RunArgs, handle_run, resolve_window};
#[cfg(feature = "cli")]
use landing_elt::cli::commands::tables::{TablesArgs, handle_tables};
#[cfg(feature = "cli")]
use landing_elt::config::CONFIG_FILENAME;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "landing-elt")]
#[command(about = "Extract operational tables into a warehouse landing schema")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(short, long, global = true, default_value = CONFIG_FILENAME)]
    config: PathBuf,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Load dimension and/or fact tables, then run the transformation phases
    Run {
        /// Load kind: "dimension" or "fact" (default: both)
        #[arg(short, long)]
        kind: Option<String>,
        /// Current window boundary, YYYY-MM-DD (default: $LANDING_ELT_DS or today)
        #[arg(long)]
        ds: Option<String>,
        /// Previous window boundary, YYYY-MM-DD (default: the day before --ds)
        #[arg(long)]
        prev_ds: Option<String>,
        /// Do not run the transformation phases
        #[arg(long)]
        skip_transform: bool,
    },
    /// Create the warehouse tables from the bootstrap DDL
    Init {
        /// Write a sample config file instead
        #[arg(long)]
        write_config: bool,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Run an ad-hoc query and print the result
    Preview {
        /// SQL query; date placeholders are substituted
        sql: String,
        /// Query the warehouse instead of the source
        #[arg(long)]
        warehouse: bool,
        /// Output format: table, json, csv
        #[arg(short, long, default_value = "table")]
        format: String,
        #[arg(long)]
        ds: Option<String>,
        #[arg(long)]
        prev_ds: Option<String>,
    },
    /// List the resolved table sets
    Tables {
        /// Load kind: "dimension" or "fact" (default: both)
        #[arg(short, long)]
        kind: Option<String>,
        #[arg(long)]
        ds: Option<String>,
        #[arg(long)]
        prev_ds: Option<String>,
    },
}

#[cfg(feature = "cli")]
fn init_tracing(json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let today = chrono::Local::now().date_naive();
    let config = cli.config;

    let result = match cli.command {
        Commands::Run {
            kind,
            ds,
            prev_ds,
            skip_transform,
        } => {
            let args = RunArgs {
                config,
                kind,
                ds,
                prev_ds,
                skip_transform,
            };
            handle_run(&args)
        }
        Commands::Init {
            write_config,
            force,
        } => {
            let args = InitArgs {
                config,
                write_config,
                force,
            };
            handle_init(&args)
        }
        Commands::Preview {
            sql,
            warehouse,
            format,
            ds,
            prev_ds,
        } => resolve_window(ds.as_deref(), prev_ds.as_deref(), today).and_then(|window| {
            let args = PreviewArgs {
                config,
                sql,
                warehouse,
                format,
                window,
            };
            handle_preview(&args)
        }),
        Commands::Tables { kind, ds, prev_ds } => {
            resolve_window(ds.as_deref(), prev_ds.as_deref(), today).and_then(|window| {
                let args = TablesArgs {
                    config,
                    kind,
                    window,
                };
                handle_tables(&args)
            })
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
