//! Tipos de evento de telemetria.
//!
//! Cada linha lida da porta serial vira exatamente um [`TelemetryEvent`].
//! O evento é imutável e consumido logo em seguida pela serialização.

use std::fmt;

// ──────────────────────────────────────────────
// Comandos
// ──────────────────────────────────────────────

/// Comando de voz reconhecido pelo dispositivo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Musica,
    Abrir,
    Encender,
}

impl Command {
    /// Ordem de prioridade da classificação (primeiro match vence).
    pub const PRIORITY: [Command; 3] = [Command::Musica, Command::Abrir, Command::Encender];

    /// Palavra-chave procurada na linha e enviada no campo `"Comando"`.
    pub fn keyword(self) -> &'static str {
        match self {
            Command::Musica => "musica",
            Command::Abrir => "abrir",
            Command::Encender => "encender",
        }
    }

    /// Resolve uma palavra-chave exata de volta para o comando.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::PRIORITY.into_iter().find(|c| c.keyword() == keyword)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

// ──────────────────────────────────────────────
// Evento
// ──────────────────────────────────────────────

/// Resultado da classificação de uma linha serial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// Uma das palavras-chave de comando apareceu na linha
    Command(Command),
    /// Score de anomalia, mantido como texto (sem validação numérica)
    Anomaly(String),
    /// Nenhum padrão conhecido
    Unrecognized,
}

impl TelemetryEvent {
    /// Rótulo curto para logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryEvent::Command(_) => "command",
            TelemetryEvent::Anomaly(_) => "anomaly",
            TelemetryEvent::Unrecognized => "unrecognized",
        }
    }
}
