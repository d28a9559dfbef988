//! Message-Router – Routet eingehende Envelopes an Empfaenger und Registries
//!
//! Der Router bekommt eine rohe Protokollzeile einer aktiven Sitzung,
//! dekodiert sie und gibt die Antworten fuer den Absender in
//! Sendereihenfolge zurueck. Nachrichten an andere Sitzungen gehen ueber
//! deren Send-Queue, nie direkt auf einen fremden Socket.
//!
//! ## Prioritaet
//! 1. `type = "file"` -> Dateitransfer
//! 2. Empfaenger mit `/` -> Gruppenbefehl
//! 3. Empfaenger mit `@` -> Gruppennachricht
//! 4. sonst -> Direktnachricht
//!
//! Jede Zeile wird genau einmal beantwortet, nichts wird wiederholt.

use std::sync::Arc;

use klatsch_core::{GruppenName, Identitaet};
use klatsch_protocol::{Befehl, DateiTransfer, Envelope, EnvelopeArt, ServerNachricht};

use crate::error::{RelayError, RelayResult};
use crate::offline_queue;
use crate::server_state::RelayState;

/// Wie eine Nachricht beim Empfaenger angekommen ist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zustellweg {
    /// In die Send-Queue der aktiven Sitzung eingereiht
    Live,
    /// Empfaenger nicht verbunden, in der Offline-Queue gespeichert
    Gespeichert,
    /// Live-Zustellung fehlgeschlagen und verworfen
    Verworfen,
}

/// Zentraler Message-Router
///
/// Ein Router pro Sitzung; der Zustand wird ueber `RelayState` geteilt.
pub struct MessageRouter {
    state: Arc<RelayState>,
}

impl MessageRouter {
    /// Erstellt einen neuen Router
    pub fn neu(state: Arc<RelayState>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine Protokollzeile und gibt die Antworten zurueck
    ///
    /// Ungueltige Envelopes ergeben eine einzelne `error`-Antwort, ohne dass
    /// Zustand veraendert wird.
    pub fn verarbeiten(&self, absender: &Identitaet, zeile: &str) -> Vec<ServerNachricht> {
        let envelope = match Envelope::dekodieren(zeile) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(absender = %absender, fehler = %e, "Ungueltiger Envelope");
                return vec![ServerNachricht::fehler(e.to_string())];
            }
        };

        if let Some(angegeben) = envelope.absender.as_deref() {
            if angegeben != absender.as_str() {
                tracing::debug!(
                    absender = %absender,
                    angegeben,
                    "Abweichender Absender im Envelope ignoriert"
                );
            }
        }

        match envelope.art {
            EnvelopeArt::Dateitransfer { empfaenger, datei } => {
                vec![self.datei_senden(absender, &empfaenger, datei)]
            }
            EnvelopeArt::Befehl(befehl) => self.befehl_ausfuehren(absender, befehl),
            EnvelopeArt::Gruppennachricht { gruppe, text } => {
                vec![self.gruppennachricht_senden(absender, &gruppe, &text)]
            }
            EnvelopeArt::Direktnachricht { empfaenger, text } => {
                vec![self.direktnachricht_senden(absender, &empfaenger, text)]
            }
        }
    }

    // -----------------------------------------------------------------------
    // Direktnachrichten
    // -----------------------------------------------------------------------

    fn direktnachricht_senden(
        &self,
        absender: &Identitaet,
        empfaenger: &Identitaet,
        text: String,
    ) -> ServerNachricht {
        tracing::debug!(absender = %absender, empfaenger = %empfaenger, "Direktnachricht");

        let nachricht = ServerNachricht::Message {
            sender: absender.to_string(),
            receiver: empfaenger.to_string(),
            text,
            timestamp: None,
        };

        match self.zustellen_oder_speichern(empfaenger, nachricht) {
            Ok(Zustellweg::Gespeichert) => ServerNachricht::Sent {
                message: format!("Nachricht fuer {empfaenger} gespeichert (offline)"),
                queued: true,
            },
            Ok(Zustellweg::Live | Zustellweg::Verworfen) => ServerNachricht::Sent {
                message: format!("Nachricht an {empfaenger} zugestellt"),
                queued: false,
            },
            Err(e) => ServerNachricht::fehler(e.to_string()),
        }
    }

    // -----------------------------------------------------------------------
    // Dateitransfer
    // -----------------------------------------------------------------------

    fn datei_senden(
        &self,
        absender: &Identitaet,
        empfaenger: &Identitaet,
        datei: DateiTransfer,
    ) -> ServerNachricht {
        let erzwingen = self.state.config.pruefsumme_erzwingen;

        match datei.pruefen() {
            Ok(pruefung) if pruefung.ist_intakt() => {}
            Ok(pruefung) => {
                tracing::warn!(
                    absender = %absender,
                    datei = %datei.filename,
                    angegeben = %datei.checksum,
                    berechnet = %pruefung.berechnete_pruefsumme,
                    groesse = pruefung.tatsaechliche_groesse,
                    "Dateitransfer mit abweichender Pruefsumme oder Groesse"
                );
                if erzwingen {
                    return ServerNachricht::fehler(format!(
                        "Datei '{}' beschaedigt: Pruefsumme oder Groesse stimmt nicht",
                        datei.filename
                    ));
                }
            }
            Err(e) => {
                tracing::warn!(absender = %absender, datei = %datei.filename, fehler = %e, "Dateidaten nicht pruefbar");
                if erzwingen {
                    return ServerNachricht::fehler(e.to_string());
                }
            }
        }

        let dateiname = datei.filename.clone();
        tracing::info!(absender = %absender, empfaenger = %empfaenger, datei = %dateiname, "Dateitransfer");

        let nachricht = ServerNachricht::dateitransfer(absender.as_str(), datei);
        match self.zustellen_oder_speichern(empfaenger, nachricht) {
            Ok(Zustellweg::Gespeichert) => ServerNachricht::erfolg(format!(
                "Datei '{dateiname}' fuer {empfaenger} gespeichert (offline)"
            )),
            Ok(Zustellweg::Live | Zustellweg::Verworfen) => {
                ServerNachricht::erfolg(format!("Datei '{dateiname}' an {empfaenger} gesendet"))
            }
            Err(e) => ServerNachricht::fehler(e.to_string()),
        }
    }

    /// Stellt live zu oder speichert fuer einen Offline-Empfaenger
    ///
    /// Schlaegt die Live-Zustellung fehl, wird je nach Konfiguration
    /// gespeichert oder die Nachricht verworfen.
    fn zustellen_oder_speichern(
        &self,
        empfaenger: &Identitaet,
        nachricht: ServerNachricht,
    ) -> RelayResult<Zustellweg> {
        // Muss auch mit Erfassungszeitpunkt noch in eine Zeile passen
        self.groesse_pruefen(&nachricht.clone().mit_zeitstempel(offline_queue::zeitstempel()))?;

        let Some(handle) = self.state.verbindungen.nachschlagen(empfaenger.as_str()) else {
            self.state.offline.einreihen(empfaenger, nachricht)?;
            return Ok(Zustellweg::Gespeichert);
        };

        if handle.senden(nachricht.clone()) {
            return Ok(Zustellweg::Live);
        }

        if self.state.config.fehlschlag_einreihen {
            tracing::warn!(empfaenger = %empfaenger, "Live-Zustellung fehlgeschlagen, in Offline-Queue umgeleitet");
            self.state.offline.einreihen(empfaenger, nachricht)?;
            Ok(Zustellweg::Gespeichert)
        } else {
            tracing::warn!(empfaenger = %empfaenger, "Live-Zustellung fehlgeschlagen, Nachricht verworfen");
            Ok(Zustellweg::Verworfen)
        }
    }

    /// Lehnt Nachrichten ab, die der Empfaenger-Codec nicht schreiben koennte
    fn groesse_pruefen(&self, nachricht: &ServerNachricht) -> RelayResult<()> {
        let laenge = nachricht.zeilen_laenge();
        let max = self.state.config.max_zeilen_bytes;
        if laenge > max {
            tracing::info!(status = nachricht.status(), laenge, max, "Weitergeleitete Nachricht zu gross");
            return Err(RelayError::NachrichtZuGross { laenge, max });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Gruppen
    // -----------------------------------------------------------------------

    fn gruppennachricht_senden(
        &self,
        absender: &Identitaet,
        gruppe: &GruppenName,
        text: &str,
    ) -> ServerNachricht {
        let weitergeleitet = ServerNachricht::GroupMessage {
            group: gruppe.to_string(),
            sender: absender.to_string(),
            text: text.to_string(),
        };
        if let Err(e) = self.groesse_pruefen(&weitergeleitet) {
            return ServerNachricht::fehler(e.to_string());
        }

        match self
            .state
            .gruppen
            .an_gruppe_senden(gruppe, absender, text, &self.state.verbindungen)
        {
            Ok(zustellung) => ServerNachricht::Success {
                message: format!("Nachricht an {zustellung} Mitglieder in '{gruppe}' gesendet"),
                delivery: Some(zustellung),
            },
            Err(e) => ServerNachricht::fehler(e.to_string()),
        }
    }

    fn befehl_ausfuehren(&self, absender: &Identitaet, befehl: Befehl) -> Vec<ServerNachricht> {
        let gruppen = &self.state.gruppen;

        let antwort = match &befehl {
            Befehl::Erstellen(name) => gruppen
                .erstellen(name, absender)
                .map(|()| format!("Gruppe '{name}' erstellt")),
            Befehl::Beitreten(name) => gruppen.beitreten(name, absender).map(|neu| {
                if neu {
                    format!("Gruppe '{name}' beigetreten")
                } else {
                    format!("Bereits Mitglied von '{name}'")
                }
            }),
            Befehl::Verlassen(name) => gruppen.verlassen(name, absender).map(|geloescht| {
                if geloescht {
                    format!("Gruppe '{name}' verlassen (Gruppe geloescht, keine Mitglieder)")
                } else {
                    format!("Gruppe '{name}' verlassen")
                }
            }),
            Befehl::Gruppen => return vec![self.gruppenliste()],
            Befehl::Hilfe => return vec![ServerNachricht::hilfe()],
        };

        let antwort = match antwort {
            Ok(text) => {
                tracing::debug!(absender = %absender, befehl = ?befehl, "Gruppenbefehl ausgefuehrt");
                ServerNachricht::erfolg(text)
            }
            Err(e) => ServerNachricht::fehler(e.to_string()),
        };

        // Aendernde Befehle bekommen immer die aktuelle Gruppenliste hinterher
        vec![antwort, self.gruppenliste()]
    }

    fn gruppenliste(&self) -> ServerNachricht {
        ServerNachricht::GroupList {
            groups: self.state.gruppen.auflistung(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
