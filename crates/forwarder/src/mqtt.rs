//! Sessão MQTT: cliente `rumqttc` + thread de conexão.
//!
//! O `Client` síncrono só enfileira requisições; quem fala com o broker é o
//! `Connection`, drenado numa thread própria. A thread reporta o primeiro
//! CONNACK via channel para a inicialização decidir se segue ou aborta.
//! Reconexão fica por conta da biblioteca.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use rumqttc::{
    Client, ConnectReturnCode, Connection, ConnectionError, Event, MqttOptions, Packet, QoS,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use bridge_core::{BridgeError, ForwarderConfig};

use crate::forwarder::Publisher;

/// Pausa após erro de conexão antes da biblioteca tentar de novo.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Fatia de espera pelo CONNACK entre checagens do Ctrl-C.
const CONNACK_POLL: Duration = Duration::from_millis(100);

/// Capacidade da fila de requisições do cliente.
const REQUEST_CAPACITY: usize = 64;

/// Estado da conexão reportado pela thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Refused(String),
    Failed(String),
}

/// Publisher MQTT com QoS 1 (at-least-once).
pub struct MqttPublisher {
    client: Client,
    shutdown: Arc<AtomicBool>,
}

impl MqttPublisher {
    /// Conecta ao broker e espera o CONNACK inicial. `stop` interrompe a espera.
    pub fn connect(config: &ForwarderConfig, stop: &AtomicBool) -> Result<Self, BridgeError> {
        let (client, connection) = Client::new(build_options(config), REQUEST_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));
        let status_rx = spawn_connection_thread(connection, shutdown.clone())?;

        info!(
            "Conectando a mqtt://{}:{} como '{}'...",
            config.broker, config.port, config.client_id
        );

        match wait_for_connack(&status_rx, config.connect_timeout(), stop) {
            Ok(()) => Ok(Self { client, shutdown }),
            Err(e) => {
                shutdown.store(true, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Envia DISCONNECT e libera a thread de conexão.
    pub fn disconnect(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        match self.client.disconnect() {
            Ok(()) => info!("Desconectado do broker"),
            Err(e) => warn!("Falha ao desconectar do broker: {e}"),
        }
    }
}

impl Publisher for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BridgeError> {
        // Não bloqueia: fila cheia vira erro e a política decide
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| BridgeError::Publish(e.to_string()))
    }
}

/// Espera o primeiro status da thread de conexão, até `timeout` ou `stop`.
fn wait_for_connack(
    status_rx: &Receiver<ConnectionStatus>,
    timeout: Duration,
    stop: &AtomicBool,
) -> Result<(), BridgeError> {
    let deadline = Instant::now() + timeout;
    loop {
        if stop.load(Ordering::Relaxed) {
            return Err(BridgeError::Interrupted);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(BridgeError::Connect(format!(
                "sem resposta do broker em {:.1}s",
                timeout.as_secs_f64()
            )));
        }
        match status_rx.recv_timeout(remaining.min(CONNACK_POLL)) {
            Ok(ConnectionStatus::Connected) => return Ok(()),
            Ok(ConnectionStatus::Refused(code)) => {
                return Err(BridgeError::Connect(format!(
                    "conexão recusada pelo broker. Código: {code}"
                )));
            }
            Ok(ConnectionStatus::Failed(e)) => return Err(BridgeError::Connect(e)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(BridgeError::Connect("thread de conexão encerrada".into()));
            }
        }
    }
}

/// Monta as opções MQTT. O token vai como username, sem senha.
pub fn build_options(config: &ForwarderConfig) -> MqttOptions {
    let mut options =
        MqttOptions::new(config.client_id.as_str(), config.broker.as_str(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_credentials(config.token.as_str(), "");
    options
}

/// Interpreta uma notificação do event loop em termos de status de conexão.
pub fn connection_status(
    notification: &Result<Event, ConnectionError>,
) -> Option<ConnectionStatus> {
    match notification {
        Ok(Event::Incoming(Packet::ConnAck(ack))) => {
            Some(if ack.code == ConnectReturnCode::Success {
                ConnectionStatus::Connected
            } else {
                ConnectionStatus::Refused(format!("{:?}", ack.code))
            })
        }
        Ok(_) => None,
        Err(ConnectionError::ConnectionRefused(code)) => {
            Some(ConnectionStatus::Refused(format!("{code:?}")))
        }
        Err(e) => Some(ConnectionStatus::Failed(e.to_string())),
    }
}

fn spawn_connection_thread(
    connection: Connection,
    shutdown: Arc<AtomicBool>,
) -> Result<Receiver<ConnectionStatus>, BridgeError> {
    let (tx, rx) = bounded::<ConnectionStatus>(1);

    std::thread::Builder::new()
        .name("mqtt-connection".into())
        .spawn(move || connection_loop(connection, &tx, &shutdown))?;

    Ok(rx)
}

fn connection_loop(
    mut connection: Connection,
    tx: &Sender<ConnectionStatus>,
    shutdown: &AtomicBool,
) {
    for notification in connection.iter() {
        if let Some(status) = connection_status(&notification) {
            if status == ConnectionStatus::Connected {
                info!("Conexão com o servidor estabelecida!");
            }
            // Só a inicialização lê; status posteriores podem ser descartados
            let _ = tx.try_send(status);
        }

        match notification {
            Ok(Event::Incoming(Packet::PubAck(ack))) => debug!("PUBACK pkid={}", ack.pkid),
            Ok(_) => {}
            Err(e) => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                warn!("Erro na conexão MQTT: {e}. Tentando novamente em 2s...");
                std::thread::sleep(RECONNECT_DELAY);
            }
        }
    }
    debug!("Thread de conexão MQTT encerrada");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::ConnAck;

    fn config() -> ForwarderConfig {
        ForwarderConfig {
            broker: "127.0.0.1".into(),
            port: 1,
            token: "token-de-teste".into(),
            connect_timeout_secs: 5.0,
            ..Default::default()
        }
    }

    #[test]
    fn options_use_broker_and_client_id() {
        let options = build_options(&config());
        assert_eq!(options.broker_address(), ("127.0.0.1".to_string(), 1));
        assert_eq!(options.client_id(), "SensorClient");
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
    }

    #[test]
    fn connack_success_is_connected() {
        let n = Ok(Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        ))));
        assert_eq!(connection_status(&n), Some(ConnectionStatus::Connected));
    }

    #[test]
    fn connack_refused() {
        let n = Ok(Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::NotAuthorized,
            false,
        ))));
        assert!(matches!(connection_status(&n), Some(ConnectionStatus::Refused(_))));

        let n = Err(ConnectionError::ConnectionRefused(ConnectReturnCode::BadUserNamePassword));
        assert!(matches!(connection_status(&n), Some(ConnectionStatus::Refused(_))));
    }

    #[test]
    fn other_events_are_ignored() {
        let n = Ok(Event::Incoming(Packet::PingResp));
        assert_eq!(connection_status(&n), None);
    }

    #[test]
    fn connack_wait_returns_first_status() {
        let (tx, rx) = bounded(1);
        tx.send(ConnectionStatus::Connected).unwrap();
        let stop = AtomicBool::new(false);
        assert!(wait_for_connack(&rx, Duration::from_secs(1), &stop).is_ok());

        tx.send(ConnectionStatus::Refused("NotAuthorized".into())).unwrap();
        assert!(matches!(
            wait_for_connack(&rx, Duration::from_secs(1), &stop),
            Err(BridgeError::Connect(_))
        ));
    }

    #[test]
    fn connack_wait_times_out() {
        let (_tx, rx) = bounded::<ConnectionStatus>(1);
        let start = Instant::now();
        let result = wait_for_connack(&rx, Duration::from_millis(250), &AtomicBool::new(false));
        assert!(matches!(result, Err(BridgeError::Connect(_))));
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn ctrl_c_interrupts_connack_wait() {
        let (_tx, rx) = bounded::<ConnectionStatus>(1);
        let stop = AtomicBool::new(true);
        let start = Instant::now();
        assert!(matches!(
            wait_for_connack(&rx, Duration::from_secs(10), &stop),
            Err(BridgeError::Interrupted)
        ));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn unreachable_broker_is_startup_error() {
        assert!(matches!(
            MqttPublisher::connect(&config(), &AtomicBool::new(false)),
            Err(BridgeError::Connect(_))
        ));
    }
}
