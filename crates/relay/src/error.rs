//! Fehlertypen fuer den Relay-Service
//!
//! Aufloesungsfehler (`IdentitaetVergeben`, `Gruppe*`, `KeinMitglied`) gehen
//! mit ihrem `Display`-Text als `error`-Antwort an den Client.

use klatsch_core::{GruppenName, Identitaet};
use klatsch_protocol::ProtokollFehler;
use thiserror::Error;

/// Fehlertyp fuer den Relay-Service
#[derive(Debug, Error)]
pub enum RelayError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Protokollfehler (ungueltiger Envelope)
    #[error(transparent)]
    Protokoll(#[from] ProtokollFehler),

    /// Identitaet ist bereits von einer aktiven Verbindung belegt
    #[error("Benutzername '{0}' ist bereits vergeben")]
    IdentitaetVergeben(Identitaet),

    /// Gruppe existiert bereits
    #[error("Gruppe '{0}' existiert bereits")]
    GruppeExistiert(GruppenName),

    /// Gruppe existiert nicht
    #[error("Gruppe '{0}' existiert nicht")]
    GruppeNichtGefunden(GruppenName),

    /// Identitaet ist kein Mitglied der Gruppe
    #[error("Kein Mitglied von '{0}'")]
    KeinMitglied(GruppenName),

    /// Weitergeleitete Nachricht waere laenger als eine erlaubte Zeile
    #[error("Nachricht zu gross: {laenge} Bytes beim Empfaenger (Maximum: {max} Bytes)")]
    NachrichtZuGross { laenge: usize, max: usize },

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl RelayError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

/// Result-Typ fuer den Relay-Service
pub type RelayResult<T> = Result<T, RelayError>;
