//! Fehlertypen fuer Klatsch
//!
//! Zentraler Fehler-Enum fuer die Validierung von Namen.
//! Untermodule koennen eigene Fehler definieren und via `#[from]` konvertieren.

use thiserror::Error;

/// Globaler Result-Alias fuer Klatsch
pub type Result<T> = std::result::Result<T, KlatschError>;

/// Alle moeglichen Fehler im Klatsch-Kern
#[derive(Debug, Error)]
pub enum KlatschError {
    // --- Validierung ---
    #[error("Ungueltige Identitaet: {0}")]
    UngueltigeIdentitaet(String),

    #[error("Ungueltiger Gruppenname: {0}")]
    UngueltigerGruppenname(String),
}
