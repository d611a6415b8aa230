use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "bkt")]
#[command(about = "Backtest config blocks and remote backtest runs", long_about = None)]
struct Cli {
    /// Client settings YAML layers in merge order (base -> local overrides)
    #[arg(long = "settings", global = true)]
    settings: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read or rewrite the config block embedded in a strategy file
    Block {
        #[command(subcommand)]
        cmd: BlockCmd,
    },

    /// Run a backtest for a strategy file and stream progress until it ends
    Run {
        /// Strategy source file (its embedded block supplies the config)
        file: String,

        /// Tick mode: 0 = simulated, 1 = real ticks
        #[arg(long)]
        mode: Option<u8>,

        /// Write the full result payload here as pretty JSON
        #[arg(long = "result-json")]
        result_json: Option<String>,
    },

    /// Manage strategies stored on the backtest server
    Strategies {
        #[command(subcommand)]
        cmd: StrategiesCmd,
    },

    /// Compute layered settings hash + print canonical JSON
    SettingsHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum BlockCmd {
    /// Print the effective config (embedded block over defaults)
    Show { file: String },

    /// Apply overrides and write the block back into the file
    Write {
        file: String,

        /// `YYYY-MM-DD HH:MM:SS`
        #[arg(long)]
        start: Option<String>,

        /// `YYYY-MM-DD HH:MM:SS`
        #[arg(long)]
        end: Option<String>,

        /// Bar period, e.g. 1h
        #[arg(long)]
        period: Option<String>,

        /// Underlying tick period, e.g. 1m (empty string clears it)
        #[arg(long = "base-period")]
        base_period: Option<String>,

        /// Replace the exchange list, same JSON form as inside the block
        #[arg(long = "exchanges-json")]
        exchanges_json: Option<String>,

        /// Remove the exchange at this index (repeatable, applied in order)
        #[arg(long = "remove-exchange")]
        remove_exchange: Vec<usize>,

        /// Append an exchange with default account settings (repeatable)
        #[arg(long = "add-exchange")]
        add_exchange: Vec<String>,
    },
}

#[derive(Subcommand)]
enum StrategiesCmd {
    List,

    /// Print a stored strategy, or save it to --out
    Get {
        name: String,
        #[arg(long)]
        out: Option<String>,
    },

    /// Upload a local file under `name` (creates or overwrites)
    Push { name: String, file: String },

    Delete { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent when missing.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Block { cmd } => match cmd {
            BlockCmd::Show { file } => commands::block::show(&file)?,
            BlockCmd::Write {
                file,
                start,
                end,
                period,
                base_period,
                exchanges_json,
                remove_exchange,
                add_exchange,
            } => commands::block::write(
                &file,
                commands::block::Overrides {
                    start,
                    end,
                    period,
                    base_period,
                    exchanges_json,
                    remove_exchange,
                    add_exchange,
                },
            )?,
        },

        Commands::Run {
            file,
            mode,
            result_json,
        } => {
            let settings = commands::load_settings(&cli.settings)?;
            commands::run::run(&settings, &file, mode, result_json.as_deref()).await?;
        }

        Commands::Strategies { cmd } => {
            let settings = commands::load_settings(&cli.settings)?;
            match cmd {
                StrategiesCmd::List => commands::strategies::list(&settings).await?,
                StrategiesCmd::Get { name, out } => {
                    commands::strategies::get(&settings, &name, out.as_deref()).await?
                }
                StrategiesCmd::Push { name, file } => {
                    commands::strategies::push(&settings, &name, &file).await?
                }
                StrategiesCmd::Delete { name } => {
                    commands::strategies::delete(&settings, &name).await?
                }
            }
        }

        Commands::SettingsHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = bkt_config::load_layered_yaml(&path_refs)?;
            println!("settings_hash={}", loaded.settings_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}

/// Logs go to stderr; stdout carries only `key=value` output.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
