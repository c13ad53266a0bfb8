use std::io::BufRead;

use clap::Parser;

use ekstream::config::{load_config, AppConfig, ConfigError};
use ekstream::credential;
use ekstream::error::StreamError;
use ekstream::observability::init_tracing;
use ekstream::session::{SessionStatus, StreamController};

#[derive(Parser)]
#[command(
    name = "ekstream",
    about = "Stream morpheme-by-morpheme Turkish analyses from an LLM endpoint"
)]
struct Cli {
    /// Word or phrase to analyze.
    query: Option<String>,

    /// Path to the YAML config file.
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Read a credential from stdin and store it in the OS keychain.
    #[arg(long)]
    set_key: bool,
}

fn main() {
    let cli = Cli::parse();

    let config = load_config_or_default(&cli.config);
    init_tracing(&config.features.log_level);

    if cli.set_key {
        std::process::exit(store_key());
    }

    let Some(query) = cli.query else {
        eprintln!("ekstream: missing query (see --help)");
        std::process::exit(2);
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .unwrap_or_else(|err| {
            eprintln!("Failed to initialize Tokio runtime: {err}");
            std::process::exit(1);
        });

    let exit_code = runtime.block_on(run(config, query));
    std::process::exit(exit_code);
}

fn load_config_or_default(path: &str) -> AppConfig {
    match load_config(path) {
        Ok(config) => config,
        Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            AppConfig::default()
        }
        Err(err) => {
            eprintln!("Failed to load configuration: {err}");
            eprintln!("See 'config.example.yaml' for the expected shape.");
            std::process::exit(1);
        }
    }
}

fn store_key() -> i32 {
    eprintln!("Paste the API credential and press enter:");
    let mut line = String::new();
    if let Err(err) = std::io::stdin().lock().read_line(&mut line) {
        eprintln!("ekstream: failed to read credential: {err}");
        return 1;
    }
    match credential::save_credential(line.trim()) {
        Ok(()) => {
            eprintln!("Credential stored.");
            0
        }
        Err(err) => {
            eprintln!("ekstream: {err}");
            1
        }
    }
}

async fn run(config: AppConfig, query: String) -> i32 {
    let credential = match credential::load_credential() {
        Ok(credential) => credential,
        Err(err) => {
            eprintln!("ekstream: {err}");
            return 1;
        }
    };

    let mut controller = match StreamController::new(config) {
        Ok(controller) => controller,
        Err(err) => {
            eprintln!("ekstream: {err}");
            return 1;
        }
    };

    let (handle, mut objects) = match controller.start_stream(&query, &credential) {
        Ok(started) => started,
        Err(StreamError::InvalidInput(message)) => {
            eprintln!("ekstream: {message}");
            return 2;
        }
        Err(err) => {
            eprintln!("ekstream: {err}");
            return 1;
        }
    };

    loop {
        tokio::select! {
            maybe = objects.recv() => match maybe {
                Some(object) => {
                    // The reserved `done` object is a terminal marker, not content.
                    if !object.is_done() {
                        println!("{}", object.value);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("cancellation requested");
                handle.cancel();
            }
        }
    }

    handle.closed().await;
    match handle.status() {
        SessionStatus::Completed | SessionStatus::Cancelled => 0,
        SessionStatus::Errored(message) => {
            eprintln!("ekstream: {message}");
            1
        }
        SessionStatus::Running => {
            eprintln!("ekstream: session ended unexpectedly");
            1
        }
    }
}
