//! klatsch-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;
pub mod logging;

use std::sync::Arc;

use anyhow::{Context, Result};
use config::ServerConfig;
use klatsch_relay::{RelayServer, RelayState};
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet den Relay und laeuft bis zum Shutdown-Signal (Ctrl-C)
    pub async fn starten(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown-Signal empfangen, Server wird beendet"),
                Err(e) => tracing::error!(fehler = %e, "Ctrl-C-Handler fehlgeschlagen"),
            }
            let _ = shutdown_tx.send(true);
        });

        self.starten_mit_shutdown(shutdown_rx).await
    }

    /// Startet den Relay und laeuft bis `shutdown_rx` `true` meldet
    pub async fn starten_mit_shutdown(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let adresse = self.config.socket_adresse()?;

        tracing::info!(
            server_name = %self.config.server.name,
            tcp = %adresse,
            max_zeilen_bytes = self.config.relay.max_zeilen_bytes,
            pruefsumme_erzwingen = self.config.relay.pruefsumme_erzwingen,
            "Server startet"
        );

        let state = RelayState::neu(self.config.relay_config());
        let relay = RelayServer::binden(Arc::clone(&state), adresse)
            .await
            .with_context(|| format!("TCP-Listener auf {adresse} konnte nicht gebunden werden"))?;

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        relay.starten(shutdown_rx).await?;

        tracing::info!(uptime_sek = state.uptime_sek(), "Server beendet");
        Ok(())
    }
}
