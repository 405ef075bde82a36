//! Erros compartilhados pelas duas pipelines.

use crate::protocol::ProtocolError;

/// Erro de alto nível da ponte serial.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Falha ao abrir porta serial {port}: {source}")]
    SerialOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Erro de E/S: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fonte serial encerrada (dispositivo desconectado?)")]
    SourceClosed,

    #[error("Linha serial com UTF-8 inválido ({0} bytes)")]
    InvalidEncoding(usize),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Falha de conexão com o broker: {0}")]
    Connect(String),

    #[error("Interrompido pelo usuário")]
    Interrupted,

    #[error("Falha ao publicar: {0}")]
    Publish(String),

    #[error("Configuração inválida: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),
}
