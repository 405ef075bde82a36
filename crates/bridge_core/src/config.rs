//! Configuração unificada via TOML.
//!
//! Um único `config.toml` com uma seção por pipeline: `[forwarder]` e `[relay]`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::classifier::DecodePolicy;
use crate::serial::{Parity, SerialSettings};

/// Política quando a publicação no broker falha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishErrorPolicy {
    /// Erro fatal, encerra o forwarder
    Abort,
    /// Loga e descarta a mensagem
    Drop,
    /// Tenta de novo `max_publish_retries` vezes, depois descarta
    #[default]
    Retry,
}

/// Como cada byte do relay vira caractere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharDecoding {
    /// Um byte = um caractere (U+0000–U+00FF)
    #[default]
    Latin1,
    /// Bytes repassados sem conversão (preserva UTF-8 multibyte)
    Raw,
}

/// Configuração do Forwarder (serial → MQTT).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Host do broker MQTT
    pub broker: String,
    /// Porta do broker
    pub port: u16,
    /// Tópico de telemetria
    pub topic: String,
    /// Token de acesso (enviado como username)
    pub token: String,
    /// Client ID MQTT
    pub client_id: String,
    /// Keep-alive MQTT em segundos
    pub keep_alive_secs: u64,
    /// Tempo máximo esperando o CONNACK inicial
    pub connect_timeout_secs: f64,
    /// Caminho da porta serial
    pub serial_port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Timeout de leitura de linha em segundos
    pub read_timeout_secs: f64,
    /// Intervalo mínimo entre publicações em segundos
    pub publish_interval_secs: f64,
    /// Tratamento de linhas com UTF-8 inválido
    pub decode_policy: DecodePolicy,
    /// Tratamento de falhas de publicação
    pub on_publish_error: PublishErrorPolicy,
    pub max_publish_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            broker: "iot.eie.ucr.ac.cr".into(),
            port: 1883,
            topic: "v1/devices/me/telemetry".into(),
            token: String::new(),
            client_id: "SensorClient".into(),
            keep_alive_secs: 60,
            connect_timeout_secs: 10.0,
            serial_port: "/dev/ttyACM0".into(),
            baud_rate: 115_200,
            read_timeout_secs: 1.0,
            publish_interval_secs: 0.8,
            decode_policy: DecodePolicy::Lossy,
            on_publish_error: PublishErrorPolicy::Retry,
            max_publish_retries: 3,
            retry_backoff_ms: 200,
        }
    }
}

impl ForwarderConfig {
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(
            &self.serial_port,
            self.baud_rate,
            Duration::from_secs_f64(self.read_timeout_secs),
        )
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs_f64(self.publish_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.broker.trim().is_empty() {
            errors.push("Host do broker não pode ser vazio".into());
        }
        if self.port == 0 {
            errors.push("Porta do broker não pode ser 0".into());
        }
        if self.topic.trim().is_empty() {
            errors.push("Tópico MQTT não pode ser vazio".into());
        }
        if self.token.trim().is_empty() {
            errors.push("Token de acesso não configurado ([forwarder] token)".into());
        }
        if self.client_id.is_empty() {
            errors.push("Client ID não pode ser vazio".into());
        }
        if self.keep_alive_secs == 0 {
            errors.push("Keep-alive deve ser >= 1s".into());
        }
        if !(self.connect_timeout_secs.is_finite() && self.connect_timeout_secs > 0.0) {
            errors.push(format!(
                "Timeout de conexão inválido: {}",
                self.connect_timeout_secs
            ));
        }
        if self.serial_port.trim().is_empty() {
            errors.push("Porta serial do forwarder não pode ser vazia".into());
        }
        if self.baud_rate == 0 {
            errors.push("Baud rate do forwarder não pode ser 0".into());
        }
        if !(self.read_timeout_secs > 0.0 && self.read_timeout_secs <= 60.0) {
            errors.push(format!(
                "Timeout de leitura inválido: {} (0–60.0]",
                self.read_timeout_secs
            ));
        }
        if !(0.1..=60.0).contains(&self.publish_interval_secs) {
            errors.push(format!(
                "Intervalo de publicação inválido: {} (0.1–60.0)",
                self.publish_interval_secs
            ));
        }

        errors
    }
}

/// Configuração do Relay (serial → console + arquivo).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Caminho da porta serial
    pub serial_port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    /// Arquivo de saída (criado/truncado a cada execução)
    pub output_path: PathBuf,
    /// Espelha os caracteres no stdout
    pub echo_console: bool,
    /// Pausa quando não há bytes disponíveis (ms)
    pub idle_backoff_ms: u64,
    pub char_decoding: CharDecoding,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            serial_port: "/tmp/ttyS1".into(),
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            output_path: PathBuf::from("datos.csv"),
            echo_console: true,
            idle_backoff_ms: 5,
            char_decoding: CharDecoding::Latin1,
        }
    }
}

impl RelayConfig {
    /// Leitura não-bloqueante (timeout 0).
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            port: self.serial_port.clone(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            parity: self.parity,
            stop_bits: self.stop_bits,
            timeout: Duration::ZERO,
        }
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.serial_port.trim().is_empty() {
            errors.push("Porta serial do relay não pode ser vazia".into());
        }
        if self.baud_rate == 0 {
            errors.push("Baud rate do relay não pode ser 0".into());
        }
        if !(5..=8).contains(&self.data_bits) {
            errors.push(format!("Data bits inválido: {} (5–8)", self.data_bits));
        }
        if !(1..=2).contains(&self.stop_bits) {
            errors.push(format!("Stop bits inválido: {} (1–2)", self.stop_bits));
        }
        if self.output_path.as_os_str().is_empty() {
            errors.push("Arquivo de saída não pode ser vazio".into());
        }

        errors
    }
}

/// Configuração raiz do aplicativo (unifica forwarder e relay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub forwarder: ForwarderConfig,
    pub relay: RelayConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Caminho passado via `--config <path>`, senão o padrão.
    pub fn path_from_args<I: IntoIterator<Item = String>>(args: I) -> PathBuf {
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if arg == "--config" {
                if let Some(path) = args.next() {
                    return PathBuf::from(path);
                }
            } else if let Some(path) = arg.strip_prefix("--config=") {
                return PathBuf::from(path);
            }
        }
        Self::default_path()
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.forwarder.validate();
        errors.extend(self.relay.validate());
        errors
    }
}
