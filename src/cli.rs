//! Command-line interface definitions using clap

use clap::{Parser, Subcommand};

/// Remediation engine - template-driven workflows against vendor APIs
#[derive(Parser, Debug)]
#[command(name = "remediation-engine")]
#[command(version)]
#[command(about = "Multi-tenant security remediation engine", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short = 'c', global = true, default_value = "config.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP server and workflow engine (default)
    Serve,

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Run database migrations, legacy credential migration and seeding, then exit
    Migrate,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Write a sample configuration with default values
    Generate {
        /// Output path
        #[arg(default_value = "config.example.toml")]
        path: String,
    },
}

impl Cli {
    /// 未指定子命令时运行服务
    pub fn into_parts(self) -> (String, Commands) {
        (self.config, self.command.unwrap_or(Commands::Serve))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_serve() {
        let (config, command) = Cli::parse_from(["remediation-engine"]).into_parts();
        assert_eq!(command, Commands::Serve);
        assert_eq!(config, "config.toml");
    }

    #[test]
    fn test_config_generate_path() {
        let (_, command) =
            Cli::parse_from(["remediation-engine", "config", "generate", "out.toml"]).into_parts();
        assert_eq!(
            command,
            Commands::Config {
                action: ConfigCommands::Generate {
                    path: "out.toml".into()
                }
            }
        );
    }

    #[test]
    fn test_global_config_flag() {
        let (config, command) =
            Cli::parse_from(["remediation-engine", "migrate", "-c", "prod.toml"]).into_parts();
        assert_eq!(command, Commands::Migrate);
        assert_eq!(config, "prod.toml");
    }
}
