//! Sessão serial: abertura da porta e leitura de linhas.
//!
//! A configuração da porta é delegada ao crate `serialport`. Aqui ficam só a
//! conversão dos valores do `config.toml` e o leitor de linhas com timeout.

use serde::{Deserialize, Serialize};
use serialport::{DataBits, SerialPort, StopBits};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::time::Duration;
use tracing::info;

use crate::error::BridgeError;

// ──────────────────────────────────────────────
// Configuração
// ──────────────────────────────────────────────

/// Paridade da porta serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(p: Parity) -> Self {
        match p {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Converte quantidade de data bits (5–8) para o tipo do `serialport`.
pub fn to_data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

/// Converte quantidade de stop bits (1–2) para o tipo do `serialport`.
pub fn to_stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

/// Parâmetros completos para abrir uma sessão serial.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    /// `Duration::ZERO` = leitura não-bloqueante
    pub timeout: Duration,
}

impl SerialSettings {
    /// 8N1 com o timeout dado.
    pub fn new(port: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            timeout,
        }
    }
}

/// Abre a porta serial. Falha aqui é sempre erro de inicialização.
pub fn open_port(settings: &SerialSettings) -> Result<Box<dyn SerialPort>, BridgeError> {
    let port = serialport::new(&settings.port, settings.baud_rate)
        .data_bits(to_data_bits(settings.data_bits))
        .parity(settings.parity.into())
        .stop_bits(to_stop_bits(settings.stop_bits))
        .timeout(settings.timeout)
        .open()
        .map_err(|source| BridgeError::SerialOpen {
            port: settings.port.clone(),
            source,
        })?;

    info!(
        "Porta serial {} aberta ({} baud, timeout {:?})",
        settings.port, settings.baud_rate, settings.timeout
    );
    Ok(port)
}

// ──────────────────────────────────────────────
// Leitura de linhas
// ──────────────────────────────────────────────

/// Fonte de linhas cruas (bytes, com o `\n` final quando houver).
pub trait LineSource {
    /// Lê uma linha, bloqueando no máximo pelo timeout da fonte.
    ///
    /// Em timeout retorna o que chegou até então (possivelmente vazio).
    /// Fim de stream é [`BridgeError::SourceClosed`].
    fn read_line(&mut self) -> Result<Vec<u8>, BridgeError>;
}

/// Leitor de linhas sobre qualquer [`Read`] (porta serial, socket, arquivo).
pub struct LineReader<R> {
    inner: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            pending: Vec::with_capacity(128),
        }
    }
}

impl<R: Read> LineSource for LineReader<R> {
    fn read_line(&mut self) -> Result<Vec<u8>, BridgeError> {
        match self.inner.read_until(b'\n', &mut self.pending) {
            Ok(0) if self.pending.is_empty() => Err(BridgeError::SourceClosed),
            Ok(_) => Ok(std::mem::take(&mut self.pending)),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                // Linha parcial: read_until já acumulou em `pending`
                Ok(std::mem::take(&mut self.pending))
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
