//! termweb hub binary

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use termweb::config::Config;
use termweb::hub;

/// Print help message
fn print_help() {
    println!(
        r#"termweb {} - web pages in the terminal

USAGE:
    termweb [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --init-config[=PATH]    Write a default config file and exit
    --config=PATH           Use this config file instead of the default search

CONFIG FILE:
    $TERMWEB_CONFIG, ~/.config/termweb/config.toml or /etc/termweb/config.toml

The hub connects to the terminal at hub.terminal_url and accepts tab
renderers and the browser driver on hub.renderer_bind.
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Value of `--flag=value`
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .find_map(|a| a.strip_prefix(flag))
        .and_then(|rest| rest.strip_prefix('='))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();

    // --help
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    // --version
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("termweb {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // --init-config or --init-config=PATH
    if args.iter().any(|a| a.starts_with("--init-config")) {
        let path = flag_value(&args, "--init-config").map(PathBuf::from);
        let written = Config::write_default_config(path.as_deref())?;
        println!("Config file generated: {}", written.display());
        return Ok(());
    }

    let (config, config_path) = match flag_value(&args, "--config") {
        Some(path) => {
            let path = PathBuf::from(path);
            let config = Config::load_from_file(&path)?;
            (config, Some(path))
        }
        None => (Config::load(), Config::config_path()),
    };

    info!("termweb starting...");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(hub::run_hub(config, config_path))
}
