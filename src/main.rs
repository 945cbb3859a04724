use clap::Parser;
use colored::Colorize;

use remediation_engine::cli::{Cli, Commands, ConfigCommands};
use remediation_engine::config::{StaticConfig, get_config, init_config_with};
use remediation_engine::runtime::modes;
use remediation_engine::system::logging::init_logging;

#[actix_web::main]
async fn main() {
    dotenvy::dotenv().ok();

    let (config_path, command) = Cli::parse().into_parts();

    // config generate 不需要日志和存储
    if let Commands::Config {
        action: ConfigCommands::Generate { path },
    } = &command
    {
        match StaticConfig::default().save_to_file(path) {
            Ok(()) => println!("{} {}", "Sample configuration written to".green(), path),
            Err(e) => {
                eprintln!("{} {}", "Failed to write configuration:".red(), e);
                std::process::exit(1);
            }
        }
        return;
    }

    init_config_with(StaticConfig::load_from(&config_path));
    let config = get_config();
    let guard = init_logging(&config.logging);

    let result = match command {
        Commands::Migrate => modes::run_migrate().await,
        _ => modes::run_server().await,
    };

    if let Err(e) = result {
        drop(guard);
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
