//! Fehlertypen fuer das Protokoll-Crate
//!
//! Die `Display`-Texte gehen unveraendert als `error`-Antwort an den Client.

use klatsch_core::KlatschError;
use thiserror::Error;

/// Fehler beim Dekodieren eines eingehenden Envelopes
#[derive(Debug, Error)]
pub enum ProtokollFehler {
    /// Zeile ist kein gueltiges JSON-Objekt im erwarteten Format
    #[error("Ungueltiges Nachrichtenformat, bitte JSON verwenden: {0}")]
    UngueltigesFormat(String),

    /// `type`-Feld mit unbekanntem Wert
    #[error("Unbekannter Nachrichtentyp: {0}")]
    UnbekannterTyp(String),

    /// Empfaengerfeld fehlt oder ist leer
    #[error("Empfaenger fehlt")]
    EmpfaengerFehlt,

    /// Dateitransfer ohne `file_data`
    #[error("Dateitransfer ohne Dateidaten")]
    DateiDatenFehlen,

    /// Dateidaten sind kein gueltiges Base64
    #[error("Dateidaten sind kein gueltiges Base64: {0}")]
    UngueltigesBase64(String),

    /// Befehl ohne Pflicht-Argument
    #[error("Verwendung: {0}")]
    Verwendung(&'static str),

    /// Gruppenname im Befehl ungueltig, mit Verwendungshinweis
    #[error("{grund}. Verwendung: {verwendung}")]
    UngueltigeGruppe {
        grund: String,
        verwendung: &'static str,
    },

    /// Unbekannter Befehl im Empfaengerfeld
    #[error("Unbekannter Befehl: {0}")]
    UnbekannterBefehl(String),

    /// Ungueltige Identitaet oder ungueltiger Gruppenname
    #[error("{0}")]
    Validierung(#[from] KlatschError),
}

impl From<serde_json::Error> for ProtokollFehler {
    fn from(e: serde_json::Error) -> Self {
        Self::UngueltigesFormat(e.to_string())
    }
}

/// Result-Typ fuer das Protokoll-Crate
pub type ProtokollResult<T> = Result<T, ProtokollFehler>;
