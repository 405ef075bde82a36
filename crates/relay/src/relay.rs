//! Relay de bytes: espelha a porta serial no console e num arquivo.
//!
//! [`ByteRelay`] é dono dos três recursos (fonte, console, arquivo). Fonte e
//! arquivo são liberados em [`ByteRelay::close`] ou, se ninguém chamar, no
//! `Drop`. Máquina de estados:
//!
//! ```text
//! RUNNING ──Ctrl-C──▶ INTERRUPTED ──▶ CLOSED
//!    └────erro de E/S──▶ ERROR ───────▶ CLOSED
//! ```

use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bridge_core::config::CharDecoding;
use tracing::{error, info, warn};

/// Tamanho do buffer de leitura da serial.
const READ_CHUNK: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Running,
    Interrupted,
    Error,
    Closed,
}

/// Como o relay terminou.
#[derive(Debug)]
pub enum RelayExit {
    Interrupted,
    Failed(io::Error),
}

/// Abre o arquivo de saída em modo criar/truncar.
pub fn open_file_sink(path: &Path) -> io::Result<File> {
    File::create(path)
}

pub struct ByteRelay<R: Read, C: Write, F: Write> {
    source: Option<R>,
    console: Option<C>,
    file: Option<F>,
    decoding: CharDecoding,
    state: RelayState,
    relayed: u64,
    warned_non_ascii: bool,
}

impl<R: Read, C: Write, F: Write> ByteRelay<R, C, F> {
    /// `console = None` desliga o espelho no terminal.
    pub fn new(source: R, console: Option<C>, file: F, decoding: CharDecoding) -> Self {
        Self {
            source: Some(source),
            console,
            file: Some(file),
            decoding,
            state: RelayState::Running,
            relayed: 0,
            warned_non_ascii: false,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Bytes lidos da fonte e escritos nos sinks.
    pub fn relayed(&self) -> u64 {
        self.relayed
    }

    /// Fonte e arquivo já liberados.
    pub fn is_closed(&self) -> bool {
        self.source.is_none() && self.file.is_none()
    }

    /// Lê o que estiver disponível e repassa byte a byte. `Ok(0)` = sem dados.
    pub fn pump_once(&mut self) -> io::Result<usize> {
        let Some(source) = self.source.as_mut() else {
            return Err(io::Error::new(ErrorKind::NotConnected, "relay já fechado"));
        };

        let mut buf = [0u8; READ_CHUNK];
        let n = match source.read(&mut buf) {
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                0
            }
            Err(e) => return Err(e),
        };

        for &byte in &buf[..n] {
            self.forward_byte(byte)?;
        }
        if n > 0 {
            if let Some(console) = self.console.as_mut() {
                console.flush()?;
            }
        }
        Ok(n)
    }

    fn forward_byte(&mut self, byte: u8) -> io::Result<()> {
        let mut utf8 = [0u8; 4];
        let encoded: &[u8] = match self.decoding {
            CharDecoding::Raw => std::slice::from_ref(&byte),
            CharDecoding::Latin1 => {
                if !byte.is_ascii() && !self.warned_non_ascii {
                    warn!(
                        "Byte não-ASCII 0x{byte:02X} recebido; em latin1 cada byte vira um \
                         caractere (use char_decoding = \"raw\" para UTF-8)"
                    );
                    self.warned_non_ascii = true;
                }
                char::from(byte).encode_utf8(&mut utf8).as_bytes()
            }
        };

        if let Some(console) = self.console.as_mut() {
            console.write_all(encoded)?;
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(encoded)?;
        }
        self.relayed += 1;
        Ok(())
    }

    /// Repassa até `stop` ser sinalizado ou ocorrer erro, e fecha os recursos.
    pub fn run(&mut self, stop: &AtomicBool, idle: Duration) -> RelayExit {
        let exit = loop {
            if stop.load(Ordering::Relaxed) {
                self.state = RelayState::Interrupted;
                info!("O usuário encerrou o programa.");
                break RelayExit::Interrupted;
            }
            match self.pump_once() {
                Ok(0) => std::thread::sleep(idle),
                Ok(_) => {}
                Err(e) => {
                    self.state = RelayState::Error;
                    error!("Erro no relay: {e}");
                    break RelayExit::Failed(e);
                }
            }
        };
        self.close();
        exit
    }

    /// Libera fonte e arquivo. Idempotente.
    pub fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush() {
                warn!("Falha ao descarregar arquivo de saída: {e}");
            }
        }
        if let Some(mut console) = self.console.take() {
            let _ = console.flush();
        }
        self.source = None;
        if self.state != RelayState::Closed {
            info!("Relay fechado – {} bytes repassados", self.relayed);
        }
        self.state = RelayState::Closed;
    }
}

impl<R: Read, C: Write, F: Write> Drop for ByteRelay<R, C, F> {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.close();
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
