//! # Bridge Core
//!
//! Crate compartilhada pelas duas pipelines da ponte serial: o Forwarder
//! (serial → MQTT) e o Relay (serial → console + arquivo).
//!
//! ## Módulos
//! - [`event`] – Eventos de telemetria (comando, anomalia, não reconhecido)
//! - [`classifier`] – Classificação de linhas por substring e decodificação
//! - [`protocol`] – Mensagens JSON de uma chave publicadas no broker
//! - [`serial`] – Abertura de porta e leitura de linhas com timeout
//! - [`config`] – Configuração unificada via TOML
//! - [`error`] – Erros compartilhados

pub mod event;
pub mod classifier;
pub mod protocol;
pub mod serial;
pub mod config;
pub mod error;

// Re-exports convenientes
pub use event::{Command, TelemetryEvent};
pub use classifier::{classify_line, decode_line, DecodePolicy};
pub use protocol::{encode_event, decode_message, WireMessage};
pub use config::{AppConfig, ForwarderConfig, RelayConfig};
pub use error::BridgeError;
