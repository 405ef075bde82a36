//! Protocolo de mensagens publicadas no broker.
//!
//! Cada evento vira um objeto JSON plano com exatamente uma chave:
//!
//! ```text
//! {"Comando": "musica" | "abrir" | "encender"}
//! {"Anomalía": "<score como texto>"}
//! {"Mensaje": "Datos no reconocidos."}
//! ```
//!
//! As chaves em espanhol fazem parte do contrato com o dashboard do broker.

use serde::{Deserialize, Serialize};

use crate::event::{Command, TelemetryEvent};

/// Chave JSON de comandos.
pub const KEY_COMMAND: &str = "Comando";
/// Chave JSON de anomalias.
pub const KEY_ANOMALY: &str = "Anomalía";
/// Chave JSON da mensagem genérica.
pub const KEY_MESSAGE: &str = "Mensaje";
/// Texto fixo enviado para linhas não reconhecidas.
pub const UNRECOGNIZED_TEXT: &str = "Datos no reconocidos.";

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),
}

/// Forma da mensagem no fio (enum externamente tagueado → uma chave).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    #[serde(rename = "Comando")]
    Command(String),
    #[serde(rename = "Anomalía")]
    Anomaly(String),
    #[serde(rename = "Mensaje")]
    Message(String),
}

impl WireMessage {
    /// Chave JSON que esta mensagem ocupa.
    pub fn key(&self) -> &'static str {
        match self {
            WireMessage::Command(_) => KEY_COMMAND,
            WireMessage::Anomaly(_) => KEY_ANOMALY,
            WireMessage::Message(_) => KEY_MESSAGE,
        }
    }

    /// Reconstrói o evento, quando a mensagem corresponde a um.
    pub fn to_event(&self) -> Option<TelemetryEvent> {
        match self {
            WireMessage::Command(kw) => Command::from_keyword(kw).map(TelemetryEvent::Command),
            WireMessage::Anomaly(score) => Some(TelemetryEvent::Anomaly(score.clone())),
            WireMessage::Message(text) if text == UNRECOGNIZED_TEXT => {
                Some(TelemetryEvent::Unrecognized)
            }
            WireMessage::Message(_) => None,
        }
    }
}

impl From<&TelemetryEvent> for WireMessage {
    fn from(event: &TelemetryEvent) -> Self {
        match event {
            TelemetryEvent::Command(cmd) => WireMessage::Command(cmd.keyword().to_string()),
            TelemetryEvent::Anomaly(score) => WireMessage::Anomaly(score.clone()),
            TelemetryEvent::Unrecognized => WireMessage::Message(UNRECOGNIZED_TEXT.to_string()),
        }
    }
}

/// Codifica um [`TelemetryEvent`] como JSON para publicação.
pub fn encode_event(event: &TelemetryEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(&WireMessage::from(event))
        .map_err(|e| ProtocolError::Serialize(e.to_string()))
}

/// Decodifica uma mensagem JSON recebida do broker.
pub fn decode_message(text: &str) -> Result<WireMessage, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Deserialize(e.to_string()))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn single_key(json: &str) -> (String, String) {
        let value: Value = serde_json::from_str(json).unwrap();
        let obj = value.as_object().expect("deve ser um objeto");
        assert_eq!(obj.len(), 1, "exatamente uma chave: {json}");
        let (k, v) = obj.iter().next().unwrap();
        (k.clone(), v.as_str().expect("valor string").to_string())
    }

    #[test]
    fn command_shape() {
        let json = encode_event(&TelemetryEvent::Command(Command::Abrir)).unwrap();
        assert_eq!(json, r#"{"Comando":"abrir"}"#);
    }

    #[test]
    fn anomaly_shape() {
        let json = encode_event(&TelemetryEvent::Anomaly("0.42".into())).unwrap();
        assert_eq!(single_key(&json), ("Anomalía".into(), "0.42".into()));
    }

    #[test]
    fn unrecognized_shape() {
        let json = encode_event(&TelemetryEvent::Unrecognized).unwrap();
        assert_eq!(json, r#"{"Mensaje":"Datos no reconocidos."}"#);
    }

    #[test]
    fn every_variant_has_exactly_one_documented_key() {
        let events = [
            TelemetryEvent::Command(Command::Musica),
            TelemetryEvent::Command(Command::Abrir),
            TelemetryEvent::Command(Command::Encender),
            TelemetryEvent::Anomaly(String::new()),
            TelemetryEvent::Anomaly("7.5".into()),
            TelemetryEvent::Unrecognized,
        ];
        for event in events {
            let json = encode_event(&event).unwrap();
            let (key, _) = single_key(&json);
            assert!(
                [KEY_COMMAND, KEY_ANOMALY, KEY_MESSAGE].contains(&key.as_str()),
                "chave inesperada {key}"
            );
            let decoded = decode_message(&json).unwrap();
            assert_eq!(decoded.key(), key);
            assert_eq!(decoded.to_event(), Some(event));
        }
    }

    #[test]
    fn decodes_ascii_escaped_key() {
        // Clientes que escapam não-ASCII (í) continuam compatíveis
        let msg = decode_message(r#"{"Anomal\u00eda": "0.9"}"#).unwrap();
        assert_eq!(msg, WireMessage::Anomaly("0.9".into()));
    }

    #[test]
    fn rejects_unknown_key() {
        assert!(matches!(
            decode_message(r#"{"Otro": "x"}"#),
            Err(ProtocolError::Deserialize(_))
        ));
    }

    #[test]
    fn unknown_command_keyword_has_no_event() {
        let msg = WireMessage::Command("bailar".into());
        assert_eq!(msg.to_event(), None);
    }
}
