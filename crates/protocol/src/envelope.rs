//! Eingehende Envelopes
//!
//! Jede Zeile nach dem Handshake ist ein flaches JSON-Objekt. Die Art des
//! Envelopes ergibt sich aus `type` und dem Praefix des Empfaengerfelds:
//!
//! ```text
//! type = "file"          -> Dateitransfer
//! receiver = "/create x" -> Befehl
//! receiver = "@x"        -> Gruppennachricht
//! sonst                  -> Direktnachricht
//! ```

use klatsch_core::types::{BEFEHLS_PRAEFIX, GRUPPEN_PRAEFIX};
use klatsch_core::{GruppenName, Identitaet};
use serde::{Deserialize, Serialize};

use crate::datei::DateiTransfer;
use crate::error::{ProtokollFehler, ProtokollResult};

/// Wert von `type` fuer Text-Envelopes (Standard)
pub const TYP_NACHRICHT: &str = "message";

/// Wert von `type` fuer Dateitransfers
pub const TYP_DATEI: &str = "file";

// ---------------------------------------------------------------------------
// Rohformat auf der Leitung
// ---------------------------------------------------------------------------

/// Envelope wie er auf der Leitung steht (alle Felder optional)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RohEnvelope {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<DateiTransfer>,
}

impl RohEnvelope {
    /// Text-Envelope (Direktnachricht, Gruppennachricht oder Befehl)
    pub fn nachricht(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            typ: Some(TYP_NACHRICHT.into()),
            sender: Some(sender.into()),
            receiver: receiver.into(),
            text: text.into(),
            file_data: None,
        }
    }

    /// Dateitransfer-Envelope
    pub fn datei(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        datei: DateiTransfer,
    ) -> Self {
        Self {
            typ: Some(TYP_DATEI.into()),
            sender: Some(sender.into()),
            receiver: receiver.into(),
            text: String::new(),
            file_data: Some(datei),
        }
    }

    /// Serialisiert den Envelope als einzelne JSON-Zeile (ohne Zeilenumbruch)
    pub fn zeile(&self) -> String {
        // Serialisierung eines Structs aus Strings kann nicht fehlschlagen
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Dekodierter Envelope
// ---------------------------------------------------------------------------

/// Gruppen-Befehl aus dem Empfaengerfeld
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Befehl {
    /// `/create <name>`
    Erstellen(GruppenName),
    /// `/join <name>`
    Beitreten(GruppenName),
    /// `/leave <name>`
    Verlassen(GruppenName),
    /// `/groups`
    Gruppen,
    /// `/help`
    Hilfe,
}

impl Befehl {
    /// Parst ein Empfaengerfeld der Form `/befehl [argument]`
    pub fn parse(roh: &str) -> ProtokollResult<Self> {
        let roh = roh.trim();
        let (name, argument) = match roh.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (roh, ""),
        };

        let gruppe = |verwendung: &'static str| -> ProtokollResult<GruppenName> {
            if argument.is_empty() {
                return Err(ProtokollFehler::Verwendung(verwendung));
            }
            GruppenName::parse(argument).map_err(|e| ProtokollFehler::UngueltigeGruppe {
                grund: e.to_string(),
                verwendung,
            })
        };

        // Gruppennamen sind ein einzelnes Wort
        match name {
            "/create" => Ok(Self::Erstellen(gruppe(
                "/create <gruppenname> (ein Wort, ohne Leerzeichen)",
            )?)),
            "/join" => Ok(Self::Beitreten(gruppe(
                "/join <gruppenname> (ein Wort, ohne Leerzeichen)",
            )?)),
            "/leave" => Ok(Self::Verlassen(gruppe(
                "/leave <gruppenname> (ein Wort, ohne Leerzeichen)",
            )?)),
            "/groups" => Ok(Self::Gruppen),
            "/help" => Ok(Self::Hilfe),
            andere => Err(ProtokollFehler::UnbekannterBefehl(andere.to_string())),
        }
    }
}

/// Art eines dekodierten Envelopes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeArt {
    Direktnachricht { empfaenger: Identitaet, text: String },
    Gruppennachricht { gruppe: GruppenName, text: String },
    Befehl(Befehl),
    Dateitransfer { empfaenger: Identitaet, datei: DateiTransfer },
}

/// Vollstaendig dekodierter eingehender Envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Vom Client angegebener Absender (informativ, der Server nutzt die
    /// registrierte Identitaet der Sitzung)
    pub absender: Option<String>,
    pub art: EnvelopeArt,
}

impl Envelope {
    /// Dekodiert eine Protokollzeile
    ///
    /// Schlaegt fehl bei ungueltigem JSON, unbekanntem `type`, fehlendem
    /// Empfaenger oder ungueltigem Befehl. Es wird kein Zustand veraendert.
    pub fn dekodieren(zeile: &str) -> ProtokollResult<Self> {
        let roh: RohEnvelope = serde_json::from_str(zeile.trim())?;
        let empfaenger = roh.receiver.trim();

        let art = match roh.typ.as_deref().unwrap_or(TYP_NACHRICHT) {
            TYP_DATEI => {
                if empfaenger.is_empty() {
                    return Err(ProtokollFehler::EmpfaengerFehlt);
                }
                let datei = roh.file_data.ok_or(ProtokollFehler::DateiDatenFehlen)?;
                EnvelopeArt::Dateitransfer {
                    empfaenger: Identitaet::parse(empfaenger)?,
                    datei,
                }
            }
            TYP_NACHRICHT => {
                if empfaenger.is_empty() {
                    return Err(ProtokollFehler::EmpfaengerFehlt);
                }
                if empfaenger.starts_with(BEFEHLS_PRAEFIX) {
                    EnvelopeArt::Befehl(Befehl::parse(empfaenger)?)
                } else if let Some(gruppe) = empfaenger.strip_prefix(GRUPPEN_PRAEFIX) {
                    EnvelopeArt::Gruppennachricht {
                        gruppe: GruppenName::parse(gruppe)?,
                        text: roh.text,
                    }
                } else {
                    EnvelopeArt::Direktnachricht {
                        empfaenger: Identitaet::parse(empfaenger)?,
                        text: roh.text,
                    }
                }
            }
            anderer => return Err(ProtokollFehler::UnbekannterTyp(anderer.to_string())),
        };

        Ok(Self {
            absender: roh.sender,
            art,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
