//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `RelayServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer `ClientSession`.
//!
//! ## Concurrency-Modell
//! Die Accept-Loop wartet nie auf eine Sitzung. Alle Sitzungen laufen als
//! eigene Tasks im Multi-Thread-Runtime und teilen sich den `RelayState`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::server_state::RelayState;
use crate::session::ClientSession;

/// Wie lange beim Shutdown auf laufende Sitzungen gewartet wird
const SITZUNGS_ABSCHLUSS_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP-Relay-Server
///
/// Bindet beim Erstellen, damit die tatsaechliche Adresse (Port 0) vor dem
/// Start bekannt ist.
pub struct RelayServer {
    state: Arc<RelayState>,
    listener: TcpListener,
}

impl RelayServer {
    /// Bindet den TCP-Socket
    pub async fn binden(state: Arc<RelayState>, bind_addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(Self { state, listener })
    }

    /// Gibt die tatsaechlich gebundene Adresse zurueck
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Akzeptiert Verbindungen bis `shutdown_rx` ein `true`-Signal empfaengt
    ///
    /// Danach wird kurz auf das Ende der laufenden Sitzungen gewartet.
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
        let lokale_addr = self.listener.local_addr()?;
        tracing::info!(adresse = %lokale_addr, "TCP Relay-Server gestartet");

        let mut sitzungen = JoinSet::new();

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
                            }

                            let sitzung = ClientSession::neu(Arc::clone(&self.state), peer_addr);
                            sitzungen.spawn(sitzung.verarbeiten(stream, shutdown_rx.clone()));
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                // Beendete Sitzungen einsammeln
                Some(ergebnis) = sitzungen.join_next() => {
                    if let Err(e) = ergebnis {
                        tracing::error!(fehler = %e, "Sitzungs-Task abgebrochen");
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Relay-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        drop(self.listener);

        let beendet = tokio::time::timeout(SITZUNGS_ABSCHLUSS_TIMEOUT, async {
            while sitzungen.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if !beendet {
            tracing::warn!(offen = sitzungen.len(), "Sitzungen beim Shutdown abgebrochen");
            sitzungen.abort_all();
        }

        let ausstehend = self.state.offline.gesamt();
        if ausstehend > 0 {
            tracing::info!(ausstehend, "Nicht zugestellte Offline-Nachrichten gehen verloren");
        }

        tracing::info!("TCP Relay-Server gestoppt");
        Ok(())
    }
}
