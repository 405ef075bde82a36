//! Classificador de linhas seriais.
//!
//! Busca por substring em ordem fixa de prioridade:
//!
//! 1. `"musica"` → [`Command::Musica`]
//! 2. `"abrir"` → [`Command::Abrir`]
//! 3. `"encender"` → [`Command::Encender`]
//! 4. `"anomaly score:"` → [`TelemetryEvent::Anomaly`] com o texto após o primeiro `:`
//! 5. qualquer outra coisa → [`TelemetryEvent::Unrecognized`]
//!
//! Uma linha com várias palavras-chave sempre resolve para a primeira da lista.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BridgeError;
use crate::event::{Command, TelemetryEvent};

/// Marcador da linha de anomalia emitida pelo modelo embarcado.
pub const ANOMALY_MARKER: &str = "anomaly score:";

/// O que fazer com uma linha que não é UTF-8 válido.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Substitui bytes inválidos por U+FFFD e segue
    #[default]
    Lossy,
    /// Descarta a linha inteira
    Skip,
    /// Erro fatal
    Abort,
}

/// Classifica uma linha já decodificada. Função pura, nunca falha.
pub fn classify_line(line: &str) -> TelemetryEvent {
    let line = line.trim_end();

    if let Some(cmd) = Command::PRIORITY
        .into_iter()
        .find(|c| line.contains(c.keyword()))
    {
        return TelemetryEvent::Command(cmd);
    }

    if line.contains(ANOMALY_MARKER) {
        // Contém o marcador, então há pelo menos um ':'. Tudo após o primeiro
        // ':' é o score, inclusive outros ':' ("3:14" fica inteiro)
        let score = line
            .split_once(':')
            .map(|(_, rest)| rest.trim())
            .unwrap_or_default();
        return TelemetryEvent::Anomaly(score.to_string());
    }

    TelemetryEvent::Unrecognized
}

/// Decodifica os bytes crus de uma linha e remove espaços/quebra finais.
///
/// Retorna `Ok(None)` quando a linha deve ser ignorada ([`DecodePolicy::Skip`]).
pub fn decode_line(raw: &[u8], policy: DecodePolicy) -> Result<Option<String>, BridgeError> {
    let text = match std::str::from_utf8(raw) {
        Ok(s) => s.trim_end().to_string(),
        Err(e) => match policy {
            DecodePolicy::Lossy => {
                debug!("Linha com UTF-8 inválido no byte {}, substituindo", e.valid_up_to());
                String::from_utf8_lossy(raw).trim_end().to_string()
            }
            DecodePolicy::Skip => return Ok(None),
            DecodePolicy::Abort => return Err(BridgeError::InvalidEncoding(raw.len())),
        },
    };
    Ok(Some(text))
}
