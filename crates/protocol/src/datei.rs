//! Dateitransfer-Nutzlast
//!
//! Der Absender berechnet die SHA-256-Pruefsumme ueber die Rohbytes und
//! kodiert die Bytes fuer den Transport als Standard-Base64. Der Server
//! reicht `data` unveraendert weiter, die Pruefsumme bleibt damit auf der
//! gesamten Strecke vergleichbar.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ProtokollFehler, ProtokollResult};

/// Dateidaten wie sie im Feld `file_data` uebertragen werden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateiTransfer {
    /// Dateiname (ohne Pfad)
    pub filename: String,
    /// Vom Absender angegebene Groesse in Bytes
    pub filesize: u64,
    /// SHA-256 der Rohbytes als Hex-String
    pub checksum: String,
    /// Rohbytes, Base64-kodiert
    pub data: String,
}

/// Ergebnis der serverseitigen Pruefung einer Datei
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateiPruefung {
    /// Tatsaechliche Groesse nach Base64-Dekodierung
    pub tatsaechliche_groesse: u64,
    /// Ueber die dekodierten Bytes berechnete Pruefsumme
    pub berechnete_pruefsumme: String,
    /// Pruefsumme stimmt mit der angegebenen ueberein
    pub pruefsumme_ok: bool,
    /// Groesse stimmt mit der angegebenen ueberein
    pub groesse_ok: bool,
}

impl DateiPruefung {
    /// Gibt true zurueck wenn Pruefsumme und Groesse stimmen
    pub fn ist_intakt(&self) -> bool {
        self.pruefsumme_ok && self.groesse_ok
    }
}

/// Berechnet die SHA-256-Pruefsumme als Hex-String
pub fn pruefsumme_berechnen(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl DateiTransfer {
    /// Baut eine Nutzlast aus Rohbytes (Absenderseite)
    pub fn aus_bytes(filename: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            filename: filename.into(),
            filesize: bytes.len() as u64,
            checksum: pruefsumme_berechnen(bytes),
            data: STANDARD.encode(bytes),
        }
    }

    /// Dekodiert die Transportkodierung zurueck in Rohbytes
    pub fn bytes_dekodieren(&self) -> ProtokollResult<Vec<u8>> {
        STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| ProtokollFehler::UngueltigesBase64(e.to_string()))
    }

    /// Dekodiert die Daten und vergleicht Pruefsumme und Groesse
    ///
    /// Der Vergleich der Pruefsumme ignoriert Gross-/Kleinschreibung.
    pub fn pruefen(&self) -> ProtokollResult<DateiPruefung> {
        let bytes = self.bytes_dekodieren()?;
        let berechnet = pruefsumme_berechnen(&bytes);
        let tatsaechlich = bytes.len() as u64;

        Ok(DateiPruefung {
            pruefsumme_ok: berechnet.eq_ignore_ascii_case(self.checksum.trim()),
            groesse_ok: tatsaechlich == self.filesize,
            tatsaechliche_groesse: tatsaechlich,
            berechnete_pruefsumme: berechnet,
        })
    }
}
