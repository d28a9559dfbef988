//! Gemeinsame Identifikationstypen fuer Klatsch
//!
//! Identitaeten und Gruppennamen sind Strings mit Validierung, die ueber das
//! Newtype-Pattern zur Compilezeit auseinandergehalten werden.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use uuid::Uuid;

use crate::error::{KlatschError, Result};

/// Markierung fuer Befehle im Empfaengerfeld
pub const BEFEHLS_PRAEFIX: char = '/';

/// Markierung fuer Gruppenziele im Empfaengerfeld
pub const GRUPPEN_PRAEFIX: char = '@';

// ---------------------------------------------------------------------------
// Identitaet
// ---------------------------------------------------------------------------

/// Name unter dem sich ein Client fuer die Dauer einer Verbindung registriert
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identitaet(String);

impl Identitaet {
    /// Validiert eine rohe Eingabe (z.B. die Handshake-Zeile)
    ///
    /// Umgebende Leerzeichen werden entfernt. Leere Namen und Namen mit
    /// Protokoll-Markierung (`/`, `@`) am Anfang werden abgelehnt, da sie
    /// als Empfaenger nie erreichbar waeren.
    pub fn parse(roh: &str) -> Result<Self> {
        let name = roh.trim();
        if name.is_empty() {
            return Err(KlatschError::UngueltigeIdentitaet(
                "Name darf nicht leer sein".into(),
            ));
        }
        if name.starts_with(BEFEHLS_PRAEFIX) || name.starts_with(GRUPPEN_PRAEFIX) {
            return Err(KlatschError::UngueltigeIdentitaet(format!(
                "Name darf nicht mit '{BEFEHLS_PRAEFIX}' oder '{GRUPPEN_PRAEFIX}' beginnen"
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Gibt den Namen als `&str` zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identitaet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Identitaet {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identitaet {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// GruppenName
// ---------------------------------------------------------------------------

/// Name einer Gruppe (ohne `@`-Markierung)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GruppenName(String);

impl GruppenName {
    /// Validiert einen Gruppennamen: nicht leer, keine Leerzeichen, keine Markierung
    pub fn parse(roh: &str) -> Result<Self> {
        let name = roh.trim();
        if name.is_empty() {
            return Err(KlatschError::UngueltigerGruppenname(
                "Gruppenname darf nicht leer sein".into(),
            ));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(KlatschError::UngueltigerGruppenname(format!(
                "'{name}' enthaelt Leerzeichen"
            )));
        }
        if name.starts_with(BEFEHLS_PRAEFIX) || name.starts_with(GRUPPEN_PRAEFIX) {
            return Err(KlatschError::UngueltigerGruppenname(format!(
                "'{name}' beginnt mit einer Protokoll-Markierung"
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Gibt den Namen als `&str` zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GruppenName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for GruppenName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// VerbindungsId
// ---------------------------------------------------------------------------

/// Eindeutige ID einer einzelnen TCP-Verbindung
///
/// Unterscheidet zwei aufeinanderfolgende Sitzungen derselben Identitaet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerbindungsId(pub Uuid);

impl VerbindungsId {
    /// Erstellt eine neue zufaellige VerbindungsId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for VerbindungsId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VerbindungsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identitaet_wird_getrimmt() {
        let id = Identitaet::parse("  alice\r\n").unwrap();
        assert_eq!(id.as_str(), "alice");
    }

    #[test]
    fn identitaet_leer_abgelehnt() {
        assert!(Identitaet::parse("").is_err());
        assert!(Identitaet::parse("   ").is_err());
    }

    #[test]
    fn identitaet_mit_markierung_abgelehnt() {
        assert!(Identitaet::parse("/create").is_err());
        assert!(Identitaet::parse("@gruppe").is_err());
    }

    #[test]
    fn gruppenname_ohne_leerzeichen() {
        assert!(GruppenName::parse("study").is_ok());
        assert!(GruppenName::parse("study group").is_err());
        assert!(GruppenName::parse("").is_err());
        assert!(GruppenName::parse("@study").is_err());
    }

    #[test]
    fn verbindungs_id_eindeutig() {
        let a = VerbindungsId::new();
        let b = VerbindungsId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("conn:"));
    }

    #[test]
    fn identitaet_ist_serde_transparent() {
        let id = Identitaet::parse("bob").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"bob\"");
        let zurueck: Identitaet = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, id);
    }
}
