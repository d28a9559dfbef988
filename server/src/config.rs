//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::SocketAddr;

use anyhow::Context;
use klatsch_protocol::wire::DEFAULT_MAX_ZEILEN_LAENGE;
use klatsch_relay::RelayConfig;
use serde::{Deserialize, Serialize};

use crate::logging::{log_format_gueltig, log_level_gueltig};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Relay-Einstellungen (Queues, Grenzen, Richtlinien)
    pub relay: RelayEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Zusaetzlicher Willkommenstext (optional)
    pub willkommen: Option<String>,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Klatsch".into(),
            willkommen: None,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer den TCP-Listener
    pub bind_adresse: String,
    /// TCP-Port
    pub port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 12345,
        }
    }
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    /// Maximale Zeilenlaenge in Bytes (ein- und ausgehend)
    pub max_zeilen_bytes: usize,
    /// Kapazitaet der Send-Queue pro Sitzung
    pub send_queue_groesse: usize,
    /// Obergrenze gespeicherter Nachrichten pro Identitaet (leer = unbegrenzt)
    pub offline_max_pro_identitaet: Option<usize>,
    /// Dateitransfers mit falscher Pruefsumme ablehnen
    pub pruefsumme_erzwingen: bool,
    /// Fehlgeschlagene Live-Zustellung offline speichern
    pub fehlschlag_einreihen: bool,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        Self {
            max_zeilen_bytes: DEFAULT_MAX_ZEILEN_LAENGE,
            send_queue_groesse: 64,
            offline_max_pro_identitaet: None,
            pruefsumme_erzwingen: false,
            fehlschlag_einreihen: false,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Woher die geladene Konfiguration stammt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigQuelle {
    /// Aus der angegebenen TOML-Datei
    Datei,
    /// Datei fehlt, Standardwerte
    Standard,
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    ///
    /// Existiert die Datei nicht, werden die Standardwerte verwendet. Die
    /// Warnung dazu loggt der Aufrufer anhand der `ConfigQuelle`, da das
    /// Logging zu diesem Zeitpunkt noch nicht initialisiert ist.
    pub fn laden(pfad: &str) -> anyhow::Result<(Self, ConfigQuelle)> {
        let (config, quelle) = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config = toml::from_str::<Self>(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                (config, ConfigQuelle::Datei)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (Self::default(), ConfigQuelle::Standard)
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };

        config.validieren()?;
        Ok((config, quelle))
    }

    /// Prueft Werte die serde nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if self.relay.max_zeilen_bytes == 0 {
            anyhow::bail!("relay.max_zeilen_bytes muss groesser als 0 sein");
        }
        if self.relay.send_queue_groesse == 0 {
            anyhow::bail!("relay.send_queue_groesse muss groesser als 0 sein");
        }
        if self.relay.offline_max_pro_identitaet == Some(0) {
            anyhow::bail!("relay.offline_max_pro_identitaet muss groesser als 0 sein");
        }
        if !log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Ungueltiges Log-Level: '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Ungueltiges Log-Format: '{}'", self.logging.format);
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    /// Parst die Bind-Adresse als `SocketAddr`
    pub fn socket_adresse(&self) -> anyhow::Result<SocketAddr> {
        self.bind_adresse()
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{}'", self.bind_adresse()))
    }

    /// Leitet die Relay-Konfiguration ab
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            server_name: self.server.name.clone(),
            willkommen: self.server.willkommen.clone(),
            max_zeilen_bytes: self.relay.max_zeilen_bytes,
            send_queue_groesse: self.relay.send_queue_groesse,
            offline_max_pro_identitaet: self.relay.offline_max_pro_identitaet,
            pruefsumme_erzwingen: self.relay.pruefsumme_erzwingen,
            fehlschlag_einreihen: self.relay.fehlschlag_einreihen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.netzwerk.port, 12345);
        assert_eq!(cfg.relay.send_queue_groesse, 64);
        assert!(cfg.relay.offline_max_pro_identitaet.is_none());
        assert!(!cfg.relay.pruefsumme_erzwingen);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_adresse(), "0.0.0.0:12345");
        assert_eq!(cfg.socket_adresse().unwrap().port(), 12345);
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Lerngruppe"

            [netzwerk]
            port = 4000

            [relay]
            offline_max_pro_identitaet = 100
            pruefsumme_erzwingen = true
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server.name, "Lerngruppe");
        assert_eq!(cfg.netzwerk.port, 4000);
        assert_eq!(cfg.relay.offline_max_pro_identitaet, Some(100));
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.relay.max_zeilen_bytes, DEFAULT_MAX_ZEILEN_LAENGE);

        let relay = cfg.relay_config();
        assert_eq!(relay.server_name, "Lerngruppe");
        assert!(relay.pruefsumme_erzwingen);
        assert!(!relay.fehlschlag_einreihen);
    }

    #[test]
    fn ungueltige_werte_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.relay.send_queue_groesse = 0;
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "kein host".into();
        assert!(cfg.socket_adresse().is_err());
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let (cfg, quelle) = ServerConfig::laden("/nicht/vorhanden/klatsch.toml").unwrap();
        assert_eq!(quelle, ConfigQuelle::Standard);
        assert_eq!(cfg.netzwerk.port, 12345);
    }

    #[test]
    fn vorhandene_datei_wird_gelesen() {
        let pfad = std::env::temp_dir().join(format!("klatsch-config-{}.toml", std::process::id()));
        std::fs::write(&pfad, "[netzwerk]\nport = 4711\n").unwrap();

        let ergebnis = ServerConfig::laden(pfad.to_str().unwrap());
        let _ = std::fs::remove_file(&pfad);

        let (cfg, quelle) = ergebnis.unwrap();
        assert_eq!(quelle, ConfigQuelle::Datei);
        assert_eq!(cfg.netzwerk.port, 4711);
    }
}
