use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use std::time::Duration;

use pwgup::api::categories::Privacy;
use pwgup::commands;
use pwgup::config::{AppConfig, CONFIG_FILE};

#[derive(Parser)]
#[command(name = "pwgup")]
#[command(about = "Chunked uploader for Piwigo galleries", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: String,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Base URL of the Piwigo server (e.g. https://gallery.example.org)
    #[arg(short, long, global = true)]
    base_url: Option<String>,

    /// Username
    #[arg(short, long, global = true)]
    username: Option<String>,

    /// Password
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Session cookie from a previous login (skips password auth while valid)
    #[arg(long, global = true)]
    cookie: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files into a category
    Upload {
        /// Destination category: numeric id or name
        #[arg(short, long)]
        category: Option<String>,

        /// Create the category by name if it doesn't exist (default: ask)
        #[arg(long)]
        create: bool,

        /// Recurse into directories (default: skip them)
        #[arg(short, long)]
        recurse: bool,

        /// Files to upload; @list reads a newline-separated list of files
        #[arg(value_name = "FILE", required = true)]
        files: Vec<String>,
    },

    /// Print the category tree
    Albums,

    /// Create a new category
    Mkalbum {
        /// Name of the new category
        name: String,

        /// Parent category id (omit for a top-level category)
        #[arg(long)]
        parent: Option<u64>,

        /// Album visibility
        #[arg(long, value_enum)]
        privacy: Option<Privacy>,
    },

    /// Validate the session and print identity and chunk size
    Status,

    /// End the current session
    Logout,

    /// Generate a configuration file (.pwgup.toml) in current directory
    Genconfig {
        /// Force overwrite existing configuration file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    // Initialize logger, default info level, display time
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            let level_style = buf.default_level_style(record.level());
            writeln!(
                buf,
                "[{} {level_style}{}{level_style:#}] {level_style}{}{level_style:#}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();

    let app_config = if std::path::Path::new(&cli.config).exists() {
        match AppConfig::load_from_file(&cli.config) {
            Ok(cfg) => {
                info!("Using configuration file: {}", cli.config);
                Some(cfg)
            }
            Err(e) => {
                error!("Failed to load configuration file: {}, using defaults", e);
                None
            }
        }
    } else {
        if cli.config != CONFIG_FILE {
            log::warn!("Config file {} not found; proceeding without it", cli.config);
        }
        None
    };

    let connection = app_config
        .as_ref()
        .and_then(|c| c.connection.clone())
        .unwrap_or_default()
        .merge_cli(
            cli.connection.base_url,
            cli.connection.username,
            cli.connection.password,
            cli.connection.cookie,
            cli.connection.timeout.map(Duration::from_secs),
        );

    match cli.command {
        Commands::Upload {
            category,
            create,
            recurse,
            files,
        } => {
            let upload_config = app_config
                .as_ref()
                .and_then(|c| c.upload.clone())
                .unwrap_or_default();
            let category = match category.or(upload_config.category) {
                Some(category) => category,
                None => bail!("you must set a value for category"),
            };
            let create = create || upload_config.create.unwrap_or(false);
            let recurse = recurse || upload_config.recurse.unwrap_or(false);

            commands::upload(&connection, &category, create, recurse, &files)?;
        }

        Commands::Albums => commands::albums(&connection)?,

        Commands::Mkalbum {
            name,
            parent,
            privacy,
        } => commands::mkalbum(&connection, &name, parent, privacy)?,

        Commands::Status => commands::status(&connection)?,

        Commands::Logout => commands::logout(&connection)?,

        Commands::Genconfig { force } => {
            if let Err(e) = AppConfig::generate_config_file(force) {
                error!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
