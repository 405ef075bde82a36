//! # Serial Forwarder
//!
//! Lê linhas de texto da porta serial, classifica cada uma (comando de voz,
//! score de anomalia ou não reconhecido) e publica o resultado como JSON
//! num broker MQTT, com intervalo mínimo entre publicações.
//!
//! ## Uso
//! ```bash
//! bridge_forwarder                          # config.toml ao lado do executável
//! bridge_forwarder --config bridge.toml     # config explícita
//! ```

mod forwarder;
mod mqtt;

use bridge_core::serial::{LineReader, open_port};
use bridge_core::{AppConfig, BridgeError, ForwarderConfig};
use forwarder::Forwarder;
use mqtt::MqttPublisher;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::path_from_args(std::env::args());
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let errors = config.forwarder.validate();
    if !errors.is_empty() {
        error!("{}", BridgeError::InvalidConfig(errors));
        return ExitCode::FAILURE;
    }

    // ── Ctrl-C ──
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
            warn!("Não foi possível instalar handler de Ctrl-C: {e}");
        }
    }

    match run(&config.forwarder, &stop) {
        Ok(()) => ExitCode::SUCCESS,
        Err(BridgeError::Interrupted) => {
            info!("O usuário encerrou o programa.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: &ForwarderConfig, stop: &AtomicBool) -> Result<(), BridgeError> {
    // ── Sessão serial ──
    let port = open_port(&cfg.serial_settings())?;
    info!("Conexão serial estabelecida com sucesso!");

    // ── Sessão MQTT ──
    let publisher = MqttPublisher::connect(cfg, stop)?;

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ SERIAL FORWARDER – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Serial:    {} @ {} baud", cfg.serial_port, cfg.baud_rate);
    println!("  Broker:    {}:{}", cfg.broker, cfg.port);
    println!("  Tópico:    {}", cfg.topic);
    println!("  Intervalo: {:.1}s", cfg.publish_interval_secs);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Loop principal ──
    let mut forwarder = Forwarder::new(LineReader::new(port), publisher, cfg);
    let result = forwarder.run(stop);

    let stats = forwarder.stats();
    info!(
        "Forwarder encerrado – publicadas: {} | descartadas: {} | ignoradas: {}",
        stats.published, stats.dropped, stats.skipped
    );
    forwarder.into_publisher().disconnect();
    result
}
