//! Gemeinsamer Server-Zustand fuer den Relay-Service
//!
//! Haelt die drei unabhaengig gesperrten Registries und die Konfiguration.
//! Jede Sitzung bekommt eine Arc-Referenz auf denselben Zustand.

use std::sync::Arc;
use std::time::Instant;

use klatsch_protocol::wire::DEFAULT_MAX_ZEILEN_LAENGE;

use crate::connection_registry::ConnectionRegistry;
use crate::group_registry::GroupRegistry;
use crate::offline_queue::OfflineQueue;

/// Konfiguration fuer den Relay-Service
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Anzeigename des Servers (Willkommensnachricht)
    pub server_name: String,
    /// Zusaetzlicher Willkommenstext nach dem Login
    pub willkommen: Option<String>,
    /// Maximale Zeilenlaenge in Bytes
    pub max_zeilen_bytes: usize,
    /// Kapazitaet der Send-Queue pro Sitzung
    pub send_queue_groesse: usize,
    /// Obergrenze der Offline-Queue pro Identitaet
    pub offline_max_pro_identitaet: Option<usize>,
    /// Dateitransfers mit falscher Pruefsumme ablehnen statt nur warnen
    pub pruefsumme_erzwingen: bool,
    /// Fehlgeschlagene Live-Zustellung in die Offline-Queue umleiten
    pub fehlschlag_einreihen: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server_name: "Klatsch".to_string(),
            willkommen: None,
            max_zeilen_bytes: DEFAULT_MAX_ZEILEN_LAENGE,
            send_queue_groesse: 64,
            offline_max_pro_identitaet: None,
            pruefsumme_erzwingen: false,
            fehlschlag_einreihen: false,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct RelayState {
    /// Relay-Konfiguration
    pub config: Arc<RelayConfig>,
    /// Aktive Verbindungen (Identitaet -> Send-Queue)
    pub verbindungen: ConnectionRegistry,
    /// Gruppen und Mitglieder
    pub gruppen: GroupRegistry,
    /// Zwischengespeicherte Nachrichten fuer Offline-Empfaenger
    pub offline: OfflineQueue,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl RelayState {
    /// Erstellt einen neuen RelayState
    pub fn neu(config: RelayConfig) -> Arc<Self> {
        let offline = OfflineQueue::neu(config.offline_max_pro_identitaet);
        Arc::new(Self {
            config: Arc::new(config),
            verbindungen: ConnectionRegistry::neu(),
            gruppen: GroupRegistry::neu(),
            offline,
            start_time: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
