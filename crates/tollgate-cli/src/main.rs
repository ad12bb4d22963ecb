//! Tollgate CLI - run and administer a Tollgate server.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tollgate_core::Role;
use tollgate_core::config::{GlobalSettings, LogFormat};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(about = "Tollgate - role-gated resource server")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ~/.tollgate/tollgate.json)
    #[arg(long, global = true, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Data directory override
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Identity management
    Users {
        #[command(subcommand)]
        action: UsersCommands,

        /// Data directory override
        #[arg(long, global = true)]
        data_dir: Option<PathBuf>,
    },

    /// Signing secret utilities
    Secret {
        #[command(subcommand)]
        action: SecretCommands,
    },

    /// Configuration inspection
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Probe a running server
    Status {
        /// Port to probe (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum UsersCommands {
    /// Create a new identity
    Create {
        /// Username for the new identity
        #[arg(long)]
        username: String,

        /// Password (prompted for when omitted)
        #[arg(long, conflicts_with = "generate_password")]
        password: Option<String>,

        /// Generate a random password
        #[arg(long)]
        generate_password: bool,

        /// Role: user, writer, editor, or admin
        #[arg(long, default_value = "user")]
        role: Role,
    },

    /// List all identities
    List,
}

#[derive(Subcommand)]
enum SecretCommands {
    /// Print a fresh 256-bit hex signing secret
    Generate,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Validate the configuration file
    Validate,

    /// Write a default configuration file with a fresh signing secret
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(verbose: bool, settings: &GlobalSettings) {
    let filter = if verbose || settings.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match settings.log_format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let config = commands::load_config(config_path);
    let settings = config
        .as_ref()
        .map(|c| c.settings.clone())
        .unwrap_or_default();
    init_logging(cli.verbose, &settings);

    let Some(command) = cli.command else {
        ui::header("Tollgate");
        ui::info("Run 'tollgate serve' to start the server, or 'tollgate --help' for all commands.");
        return Ok(());
    };

    match command {
        Commands::Serve {
            port,
            bind,
            data_dir,
        } => {
            let args = commands::serve::ServeArgs {
                port,
                bind,
                data_dir,
            };
            commands::run_serve(config?, args).await?;
        }

        Commands::Users { action, data_dir } => {
            let action = match action {
                UsersCommands::Create {
                    username,
                    password,
                    generate_password,
                    role,
                } => commands::users::UsersAction::Create {
                    username,
                    password,
                    generate_password,
                    role,
                },
                UsersCommands::List => commands::users::UsersAction::List,
            };
            let args = commands::users::UsersArgs { action, data_dir };
            commands::run_users(&config?, args).await?;
        }

        Commands::Secret { action } => match action {
            SecretCommands::Generate => commands::run_secret_generate(),
        },

        Commands::Config { action } => {
            let action = match action {
                ConfigCommands::Show => commands::config::ConfigAction::Show,
                ConfigCommands::Validate => commands::config::ConfigAction::Validate,
                ConfigCommands::Init { force } => commands::config::ConfigAction::Init { force },
            };
            commands::run_config(config_path, action)?;
        }

        Commands::Status { port } => {
            let port = port.unwrap_or_else(|| {
                config
                    .as_ref()
                    .map_or(tollgate_core::config::ServerConfig::default().port, |c| {
                        c.server.port
                    })
            });
            commands::run_status(port).await?;
        }
    }

    Ok(())
}
