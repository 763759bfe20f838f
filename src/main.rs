use std::sync::Arc;

use taxtracker::config::{config_schema, load_config};
use taxtracker::startup::{parse_command, run};
use taxtracker::utils::init_logging;

const USAGE: &str = "usage: taxtracker <schema | whoami | upload <files...> | receipts [year]>";

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("schema") {
        match config_schema() {
            Ok(schema) => println!("{}", schema),
            Err(e) => {
                eprintln!("Error rendering configuration schema: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let command = match parse_command(args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let config = match load_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Error initialising logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config, command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
