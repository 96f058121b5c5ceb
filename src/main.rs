use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use plugauth::{AuthorizationBroker, Config};

/// plugauth - authorization broker tools
#[derive(Parser)]
#[command(name = "plugauth")]
#[command(about = "Check realm configuration and hash operator passwords", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the configuration and realm file and report the result (default)
    Check,

    /// Print the argon2id hash of a password for the realm file
    HashPassword {
        /// Password to hash
        password: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Check) {
        Commands::HashPassword { password } => hash(&password),
        Commands::Check => check(&cli.config),
    }
}

fn hash(password: &str) -> ExitCode {
    match plugauth::hash_password(password) {
        Ok(hash) => {
            println!("{hash}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to hash password: {e}");
            ExitCode::FAILURE
        }
    }
}

fn check(path: &Path) -> ExitCode {
    // Load configuration
    let config = match Config::load_with_env(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", path.display());
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            if let Err(e) = config.apply_env_overrides() {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
            config
        }
    };

    // Initialize logging
    if let Err(e) = plugauth::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        plugauth::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    let broker = AuthorizationBroker::new();
    if let Err(e) = broker.initialize(&config.security) {
        error!("Failed to initialize authorization: {e}");
        return ExitCode::FAILURE;
    }

    if broker.is_initialized() {
        info!(
            accounts = broker.base_realm().account_count(),
            realms = ?broker.realms().names(),
            "Realm configuration OK"
        );
    } else {
        info!("Authorization is disabled");
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_check() {
        let cli = Cli::try_parse_from(["plugauth"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.toml"));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_hash_password() {
        let args = ["plugauth", "-c", "/etc/plugauth.toml", "hash-password", "s3cret-pass"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/plugauth.toml"));
        assert!(matches!(
            cli.command,
            Some(Commands::HashPassword { ref password }) if password == "s3cret-pass"
        ));
    }

    #[test]
    fn test_cli_rejects_missing_password() {
        assert!(Cli::try_parse_from(["plugauth", "hash-password"]).is_err());
    }
}
