//! Ausgehende Server-Nachrichten
//!
//! Jede Server-Zeile ist ein JSON-Objekt mit `status`-Diskriminator.
//! Die menschenlesbaren Texte stehen in `message`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::datei::DateiTransfer;

/// Zustellbilanz einer Gruppennachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zustellung {
    /// Erfolgreich eingereihte Zustellungen
    pub delivered: usize,
    /// Aufgeloeste Mitglieder zum Zeitpunkt des Sendens
    pub attempted: usize,
}

impl std::fmt::Display for Zustellung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.delivered, self.attempted)
    }
}

/// Alle Nachrichten die der Server an einen Client schreibt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServerNachricht {
    /// Erfolgreiche Operation (optional mit Zustellbilanz bei Gruppen)
    Success {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delivery: Option<Zustellung>,
    },
    /// Fehlgeschlagene Operation oder Protokollfehler
    Error { message: String },
    /// Systemhinweis (Beitritt, Abschied, Shutdown)
    System { message: String },
    /// Bestaetigung einer Direktnachricht
    Sent {
        message: String,
        #[serde(default)]
        queued: bool,
    },
    /// Direktnachricht an den Empfaenger
    Message {
        sender: String,
        receiver: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Gruppennachricht an ein Mitglied
    GroupMessage {
        group: String,
        sender: String,
        text: String,
    },
    /// Dateitransfer an den Empfaenger
    FileTransfer {
        sender: String,
        filename: String,
        filesize: u64,
        checksum: String,
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Ankuendigung der zwischengespeicherten Nachrichten
    OfflineMessages { count: usize, message: String },
    /// Aktuelle Liste aller verbundenen Identitaeten
    UserList { users: Vec<String> },
    /// Aktuelle Gruppen mit Mitgliedern
    GroupList {
        groups: BTreeMap<String, Vec<String>>,
    },
    /// Befehlsuebersicht
    Help { commands: BTreeMap<String, String> },
}

impl ServerNachricht {
    /// Erfolgsantwort ohne Zustellbilanz
    pub fn erfolg(message: impl Into<String>) -> Self {
        Self::Success {
            message: message.into(),
            delivery: None,
        }
    }

    /// Fehlerantwort
    pub fn fehler(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Systemhinweis
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Dateitransfer aus einer Nutzlast
    pub fn dateitransfer(sender: impl Into<String>, datei: DateiTransfer) -> Self {
        Self::FileTransfer {
            sender: sender.into(),
            filename: datei.filename,
            filesize: datei.filesize,
            checksum: datei.checksum,
            data: datei.data,
            timestamp: None,
        }
    }

    /// Standard-Befehlsuebersicht
    pub fn hilfe() -> Self {
        let commands = [
            ("Direktnachricht", "Identitaet des Empfaengers als receiver"),
            ("Gruppennachricht", "@gruppenname als receiver"),
            ("Datei senden", "type = \"file\" mit file_data"),
            ("Gruppe erstellen", "/create gruppenname (ein Wort)"),
            ("Gruppe beitreten", "/join gruppenname (ein Wort)"),
            ("Gruppe verlassen", "/leave gruppenname (ein Wort)"),
            ("Gruppen auflisten", "/groups"),
            ("Hilfe", "/help"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self::Help { commands }
    }

    /// Setzt den Erfassungszeitpunkt bei zwischengespeicherten Nachrichten
    ///
    /// Wirkt nur auf `message` und `file_transfer`, alle anderen Varianten
    /// bleiben unveraendert.
    pub fn mit_zeitstempel(mut self, zeit: impl Into<String>) -> Self {
        match &mut self {
            Self::Message { timestamp, .. } | Self::FileTransfer { timestamp, .. } => {
                *timestamp = Some(zeit.into());
            }
            _ => {}
        }
        self
    }

    /// Gibt den `status`-Wert dieser Nachricht zurueck
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
            Self::System { .. } => "system",
            Self::Sent { .. } => "sent",
            Self::Message { .. } => "message",
            Self::GroupMessage { .. } => "group_message",
            Self::FileTransfer { .. } => "file_transfer",
            Self::OfflineMessages { .. } => "offline_messages",
            Self::UserList { .. } => "user_list",
            Self::GroupList { .. } => "group_list",
            Self::Help { .. } => "help",
        }
    }

    /// Laenge der kodierten JSON-Zeile in Bytes (ohne Zeilenumbruch)
    pub fn zeilen_laenge(&self) -> usize {
        serde_json::to_vec(self).map_or(usize::MAX, |json| json.len())
    }

    /// Gibt true zurueck wenn die Nachricht in der Offline-Queue landen darf
    pub fn ist_speicherbar(&self) -> bool {
        matches!(self, Self::Message { .. } | Self::FileTransfer { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_diskriminator_auf_der_leitung() {
        let json = serde_json::to_value(ServerNachricht::Sent {
            message: "zugestellt".into(),
            queued: false,
        })
        .unwrap();
        assert_eq!(json["status"], "sent");
        assert_eq!(json["queued"], false);

        let json = serde_json::to_value(ServerNachricht::UserList {
            users: vec!["alice".into()],
        })
        .unwrap();
        assert_eq!(json["status"], "user_list");
        assert_eq!(json["users"][0], "alice");
    }

    #[test]
    fn status_stimmt_mit_serde_ueberein() {
        let alle = vec![
            ServerNachricht::erfolg("ok"),
            ServerNachricht::fehler("nein"),
            ServerNachricht::system("hinweis"),
            ServerNachricht::hilfe(),
            ServerNachricht::GroupMessage {
                group: "g".into(),
                sender: "a".into(),
                text: "t".into(),
            },
            ServerNachricht::OfflineMessages {
                count: 1,
                message: "1".into(),
            },
            ServerNachricht::GroupList {
                groups: BTreeMap::new(),
            },
            ServerNachricht::dateitransfer("a", DateiTransfer::aus_bytes("f", b"x")),
        ];
        for nachricht in alle {
            let json = serde_json::to_value(&nachricht).unwrap();
            assert_eq!(json["status"], nachricht.status());
        }
    }

    #[test]
    fn erfolg_ohne_zustellung_laesst_feld_weg() {
        let json = serde_json::to_value(ServerNachricht::erfolg("ok")).unwrap();
        assert!(json.get("delivery").is_none());

        let json = serde_json::to_value(ServerNachricht::Success {
            message: "an 2/3 Mitglieder".into(),
            delivery: Some(Zustellung {
                delivered: 2,
                attempted: 3,
            }),
        })
        .unwrap();
        assert_eq!(json["delivery"]["delivered"], 2);
        assert_eq!(json["delivery"]["attempted"], 3);
    }

    #[test]
    fn zeitstempel_nur_fuer_speicherbare() {
        let nachricht = ServerNachricht::Message {
            sender: "a".into(),
            receiver: "b".into(),
            text: "t".into(),
            timestamp: None,
        }
        .mit_zeitstempel("2024-01-01 12:00:00");
        assert!(matches!(
            nachricht,
            ServerNachricht::Message { timestamp: Some(ref t), .. } if t == "2024-01-01 12:00:00"
        ));

        let system = ServerNachricht::system("x").mit_zeitstempel("egal");
        assert_eq!(system, ServerNachricht::system("x"));
        assert!(!system.ist_speicherbar());
    }

    #[test]
    fn zeilen_laenge_entspricht_json() {
        let nachricht = ServerNachricht::Message {
            sender: "alice".into(),
            receiver: "bob".into(),
            text: "x".repeat(100),
            timestamp: None,
        };
        let json = serde_json::to_string(&nachricht).unwrap();
        assert_eq!(nachricht.zeilen_laenge(), json.len());

        // Der Zeitstempel macht gespeicherte Nachrichten laenger
        let gespeichert = nachricht.clone().mit_zeitstempel("2024-01-01 12:00:00");
        assert!(gespeichert.zeilen_laenge() > nachricht.zeilen_laenge());
    }

    #[test]
    fn dateitransfer_behaelt_pruefsumme() {
        let datei = DateiTransfer::aus_bytes("bild.png", &[1, 2, 3, 4]);
        let pruefsumme = datei.checksum.clone();
        match ServerNachricht::dateitransfer("alice", datei) {
            ServerNachricht::FileTransfer {
                checksum, filesize, ..
            } => {
                assert_eq!(checksum, pruefsumme);
                assert_eq!(filesize, 4);
            }
            andere => panic!("FileTransfer erwartet, war {andere:?}"),
        }
    }
}
