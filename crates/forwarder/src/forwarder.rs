//! Loop principal: lê → classifica → serializa → publica → espera.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bridge_core::config::{ForwarderConfig, PublishErrorPolicy};
use bridge_core::serial::LineSource;
use bridge_core::{
    BridgeError, DecodePolicy, TelemetryEvent, classify_line, decode_line, encode_event,
};
use tracing::{debug, info, warn};

/// Destino das mensagens serializadas.
pub trait Publisher {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BridgeError>;
}

/// Resultado de uma iteração do loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Published(TelemetryEvent),
    Dropped(TelemetryEvent),
    /// Linha descartada pela [`DecodePolicy::Skip`]
    Skipped,
}

/// Contadores acumulados desde o início.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    pub published: u64,
    pub dropped: u64,
    pub skipped: u64,
}

pub struct Forwarder<S, P> {
    source: S,
    publisher: P,
    topic: String,
    interval: Duration,
    decode_policy: DecodePolicy,
    on_publish_error: PublishErrorPolicy,
    max_retries: u32,
    retry_backoff: Duration,
    stats: ForwarderStats,
}

impl<S: LineSource, P: Publisher> Forwarder<S, P> {
    pub fn new(source: S, publisher: P, config: &ForwarderConfig) -> Self {
        Self {
            source,
            publisher,
            topic: config.topic.clone(),
            interval: config.publish_interval(),
            decode_policy: config.decode_policy,
            on_publish_error: config.on_publish_error,
            max_retries: config.max_publish_retries,
            retry_backoff: config.retry_backoff(),
            stats: ForwarderStats::default(),
        }
    }

    pub fn stats(&self) -> ForwarderStats {
        self.stats
    }

    #[cfg(test)]
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Devolve o publisher (para desconectar ao encerrar).
    pub fn into_publisher(self) -> P {
        self.publisher
    }

    /// Roda até `stop` ser sinalizado ou um erro fatal acontecer.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), BridgeError> {
        while !stop.load(Ordering::Relaxed) {
            match self.step()? {
                StepOutcome::Published(event) | StepOutcome::Dropped(event) => {
                    debug!("Evento classificado: {}", event.kind())
                }
                StepOutcome::Skipped => {}
            }
        }
        Ok(())
    }

    /// Uma iteração completa, incluindo a espera do intervalo mínimo.
    pub fn step(&mut self) -> Result<StepOutcome, BridgeError> {
        let cycle_start = Instant::now();

        let raw = self.source.read_line()?;
        let outcome = match decode_line(&raw, self.decode_policy)? {
            Some(line) => {
                let event = classify_line(&line);
                let message = encode_event(&event)?;
                info!("Dados do sensor: {message}");

                if self.publish_with_policy(&message)? {
                    self.stats.published += 1;
                    StepOutcome::Published(event)
                } else {
                    self.stats.dropped += 1;
                    StepOutcome::Dropped(event)
                }
            }
            None => {
                warn!("Linha com UTF-8 inválido ignorada ({} bytes)", raw.len());
                self.stats.skipped += 1;
                StepOutcome::Skipped
            }
        };

        // Dormir pelo tempo restante do intervalo
        let elapsed = cycle_start.elapsed();
        if elapsed < self.interval {
            std::thread::sleep(self.interval - elapsed);
        }

        Ok(outcome)
    }

    /// `Ok(true)` publicada, `Ok(false)` descartada, `Err` se a política for abortar.
    fn publish_with_policy(&mut self, message: &str) -> Result<bool, BridgeError> {
        let attempts = match self.on_publish_error {
            PublishErrorPolicy::Retry => self.max_retries + 1,
            PublishErrorPolicy::Abort | PublishErrorPolicy::Drop => 1,
        };

        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.publisher.publish(&self.topic, message) {
                Ok(()) => return Ok(true),
                Err(e) => {
                    warn!("Falha ao publicar (tentativa {attempt}/{attempts}): {e}");
                    last_err = Some(e);
                    if attempt < attempts && !self.retry_backoff.is_zero() {
                        std::thread::sleep(self.retry_backoff);
                    }
                }
            }
        }

        match (self.on_publish_error, last_err) {
            (PublishErrorPolicy::Abort, Some(e)) => Err(e),
            _ => {
                warn!("Mensagem descartada: {message}");
                Ok(false)
            }
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::Command;
    use bridge_core::serial::LineReader;

    /// Fonte sempre pronta que repete a mesma linha.
    struct Repeating(&'static [u8]);

    impl LineSource for Repeating {
        fn read_line(&mut self) -> Result<Vec<u8>, BridgeError> {
            Ok(self.0.to_vec())
        }
    }

    #[derive(Default)]
    struct Recording {
        sent: Vec<(String, String)>,
    }

    impl Publisher for Recording {
        fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BridgeError> {
            self.sent.push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }

    /// Falha nas primeiras `failures` chamadas.
    struct Flaky {
        failures: u32,
        calls: u32,
    }

    impl Flaky {
        fn failing(failures: u32) -> Self {
            Self { failures, calls: 0 }
        }
    }

    impl Publisher for Flaky {
        fn publish(&mut self, _topic: &str, _payload: &str) -> Result<(), BridgeError> {
            self.calls += 1;
            if self.failures > 0 {
                self.failures -= 1;
                return Err(BridgeError::Publish("rede inalcançável".into()));
            }
            Ok(())
        }
    }

    fn fast_config() -> ForwarderConfig {
        ForwarderConfig {
            token: "t".into(),
            publish_interval_secs: 0.0,
            retry_backoff_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn publishes_classified_lines_in_order() {
        let input = &b"musica\nanomaly score: 0.42\nruido\nabrir y encender\n"[..];
        let mut fwd = Forwarder::new(LineReader::new(input), Recording::default(), &fast_config());

        for _ in 0..4 {
            fwd.step().unwrap();
        }

        let payloads: Vec<&str> = fwd.publisher().sent.iter().map(|(_, p)| p.as_str()).collect();
        assert_eq!(
            payloads,
            [
                r#"{"Comando":"musica"}"#,
                r#"{"Anomalía":"0.42"}"#,
                r#"{"Mensaje":"Datos no reconocidos."}"#,
                r#"{"Comando":"abrir"}"#,
            ]
        );
        assert!(fwd.publisher().sent.iter().all(|(t, _)| t == "v1/devices/me/telemetry"));
        assert_eq!(fwd.stats().published, 4);
    }

    #[test]
    fn read_timeout_publishes_unrecognized() {
        // Timeout sem dados chega como linha vazia
        let mut fwd = Forwarder::new(Repeating(b""), Recording::default(), &fast_config());
        assert_eq!(
            fwd.step().unwrap(),
            StepOutcome::Published(TelemetryEvent::Unrecognized)
        );
        assert_eq!(
            fwd.publisher().sent,
            [(
                "v1/devices/me/telemetry".to_string(),
                r#"{"Mensaje":"Datos no reconocidos."}"#.to_string()
            )]
        );
    }

    #[test]
    fn end_of_source_is_fatal() {
        let mut fwd = Forwarder::new(
            LineReader::new(&b""[..]),
            Recording::default(),
            &fast_config(),
        );
        assert!(matches!(fwd.step(), Err(BridgeError::SourceClosed)));
    }

    #[test]
    fn skip_policy_does_not_publish() {
        let config = ForwarderConfig {
            decode_policy: DecodePolicy::Skip,
            ..fast_config()
        };
        let source = LineReader::new(&b"\xFF\xFE\n"[..]);
        let mut fwd = Forwarder::new(source, Recording::default(), &config);
        assert_eq!(fwd.step().unwrap(), StepOutcome::Skipped);
        assert!(fwd.publisher().sent.is_empty());
        assert_eq!(fwd.stats().skipped, 1);
    }

    #[test]
    fn abort_decode_policy_is_fatal() {
        let config = ForwarderConfig {
            decode_policy: DecodePolicy::Abort,
            ..fast_config()
        };
        let source = LineReader::new(&b"\xFF\n"[..]);
        let mut fwd = Forwarder::new(source, Recording::default(), &config);
        assert!(matches!(fwd.step(), Err(BridgeError::InvalidEncoding(2))));
    }

    #[test]
    fn retry_policy_recovers() {
        let config = ForwarderConfig {
            on_publish_error: PublishErrorPolicy::Retry,
            max_publish_retries: 3,
            ..fast_config()
        };
        let mut fwd = Forwarder::new(Repeating(b"musica\n"), Flaky::failing(2), &config);
        assert_eq!(
            fwd.step().unwrap(),
            StepOutcome::Published(TelemetryEvent::Command(Command::Musica))
        );
        assert_eq!(fwd.publisher().calls, 3);
    }

    #[test]
    fn retry_policy_drops_after_exhaustion() {
        let config = ForwarderConfig {
            on_publish_error: PublishErrorPolicy::Retry,
            max_publish_retries: 1,
            ..fast_config()
        };
        let mut fwd = Forwarder::new(Repeating(b"abrir\n"), Flaky::failing(5), &config);
        assert_eq!(
            fwd.step().unwrap(),
            StepOutcome::Dropped(TelemetryEvent::Command(Command::Abrir))
        );
        assert_eq!(fwd.publisher().calls, 2);
        assert_eq!(fwd.stats().dropped, 1);
    }

    #[test]
    fn drop_policy_tries_once() {
        let config = ForwarderConfig {
            on_publish_error: PublishErrorPolicy::Drop,
            ..fast_config()
        };
        let mut fwd = Forwarder::new(Repeating(b"abrir\n"), Flaky::failing(1), &config);
        assert!(matches!(fwd.step().unwrap(), StepOutcome::Dropped(_)));
        assert_eq!(fwd.publisher().calls, 1);
    }

    #[test]
    fn abort_policy_is_fatal() {
        let config = ForwarderConfig {
            on_publish_error: PublishErrorPolicy::Abort,
            ..fast_config()
        };
        let mut fwd = Forwarder::new(Repeating(b"abrir\n"), Flaky::failing(1), &config);
        assert!(matches!(fwd.step(), Err(BridgeError::Publish(_))));
    }

    #[test]
    fn publish_rate_is_capped() {
        let interval = Duration::from_millis(20);
        let config = ForwarderConfig {
            publish_interval_secs: interval.as_secs_f64(),
            ..fast_config()
        };
        let mut fwd = Forwarder::new(Repeating(b"musica\n"), Recording::default(), &config);

        let start = Instant::now();
        for _ in 0..10 {
            fwd.step().unwrap();
        }
        assert!(start.elapsed() >= interval * 9, "elapsed {:?}", start.elapsed());
        assert_eq!(fwd.publisher().sent.len(), 10);
    }

    #[test]
    fn run_stops_on_flag() {
        let stop = AtomicBool::new(true);
        let mut fwd = Forwarder::new(Repeating(b"musica\n"), Recording::default(), &fast_config());
        fwd.run(&stop).unwrap();
        assert!(fwd.publisher().sent.is_empty());
    }
}
