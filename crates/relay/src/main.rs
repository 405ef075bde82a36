//! # Serial Relay
//!
//! Lê bytes crus da porta serial e espelha cada caractere no console e num
//! arquivo (criado/truncado a cada execução) até Ctrl-C.
//!
//! Logs vão para stderr; stdout é o próprio espelho dos dados.

mod relay;

use bridge_core::serial::open_port;
use bridge_core::{AppConfig, BridgeError, RelayConfig};
use relay::{ByteRelay, RelayExit, open_file_sink};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── Config ──
    let config_path = AppConfig::path_from_args(std::env::args());
    let config = AppConfig::load(&config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let errors = config.relay.validate();
    if !errors.is_empty() {
        error!("{}", BridgeError::InvalidConfig(errors));
        return ExitCode::FAILURE;
    }

    match run(&config.relay) {
        Ok(RelayExit::Interrupted) => ExitCode::SUCCESS,
        Ok(RelayExit::Failed(_)) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: &RelayConfig) -> Result<RelayExit, BridgeError> {
    let port = open_port(&cfg.serial_settings())?;
    let file = open_file_sink(&cfg.output_path)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
            warn!("Não foi possível instalar handler de Ctrl-C: {e}");
        }
    }

    eprintln!("Conectado a: {}", cfg.serial_port);
    eprintln!("Gravando em: {}", cfg.output_path.display());

    let console = cfg.echo_console.then(std::io::stdout);
    let mut relay = ByteRelay::new(port, console, file, cfg.char_decoding);
    let exit = relay.run(&stop, cfg.idle_backoff());
    debug!("Estado final: {:?} ({} bytes)", relay.state(), relay.relayed());
    Ok(exit)
}
