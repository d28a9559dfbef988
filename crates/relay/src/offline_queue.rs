//! Offline-Queue – Zwischenspeicher fuer nicht verbundene Empfaenger
//!
//! Direktnachrichten und Dateitransfers an Identitaeten ohne aktive
//! Verbindung werden hier mit Erfassungszeitpunkt abgelegt und beim
//! naechsten Login in FIFO-Reihenfolge ausgeliefert.
//!
//! Die Queue einer Identitaet wird beim Zustellen in einem Schritt geleert.
//! Bricht das Schreiben mittendrin ab, ist der Rest verloren.

use std::collections::{HashMap, VecDeque};
use std::io;

use futures_util::{Sink, SinkExt};
use klatsch_core::Identitaet;
use klatsch_protocol::{KodierFehler, ServerNachricht};
use parking_lot::Mutex;

use crate::error::{RelayError, RelayResult};

/// Format des Erfassungszeitpunkts
pub const ZEITSTEMPEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Aktueller Erfassungszeitpunkt im Queue-Format
pub fn zeitstempel() -> String {
    chrono::Local::now().format(ZEITSTEMPEL_FORMAT).to_string()
}

/// Zwischengespeicherte Nachrichten pro Identitaet
pub struct OfflineQueue {
    eintraege: Mutex<HashMap<Identitaet, VecDeque<ServerNachricht>>>,
    /// Obergrenze pro Identitaet (`None` = unbegrenzt)
    max_pro_identitaet: Option<usize>,
}

impl Default for OfflineQueue {
    fn default() -> Self {
        Self::neu(None)
    }
}

impl OfflineQueue {
    /// Erstellt eine leere Queue mit optionaler Obergrenze pro Identitaet
    pub fn neu(max_pro_identitaet: Option<usize>) -> Self {
        Self {
            eintraege: Mutex::new(HashMap::new()),
            max_pro_identitaet,
        }
    }

    /// Reiht eine Nachricht fuer eine Identitaet ein
    ///
    /// Setzt den Erfassungszeitpunkt. Ist die Obergrenze erreicht, wird der
    /// aelteste Eintrag verworfen. Gibt die Anzahl ausstehender Eintraege
    /// zurueck.
    pub fn einreihen(
        &self,
        identitaet: &Identitaet,
        nachricht: ServerNachricht,
    ) -> RelayResult<usize> {
        if !nachricht.ist_speicherbar() {
            return Err(RelayError::intern(format!(
                "Nachricht mit Status '{}' ist nicht speicherbar",
                nachricht.status()
            )));
        }

        let nachricht = nachricht.mit_zeitstempel(zeitstempel());

        let mut eintraege = self.eintraege.lock();
        let queue = eintraege.entry(identitaet.clone()).or_default();

        if let Some(max) = self.max_pro_identitaet {
            while queue.len() >= max.max(1) {
                queue.pop_front();
                tracing::warn!(
                    identitaet = %identitaet,
                    max,
                    "Offline-Queue voll, aeltester Eintrag verworfen"
                );
            }
        }

        queue.push_back(nachricht);
        let ausstehend = queue.len();
        tracing::info!(identitaet = %identitaet, ausstehend, "Offline-Nachricht gespeichert");
        Ok(ausstehend)
    }

    /// Entnimmt alle Eintraege einer Identitaet (FIFO)
    pub fn entnehmen(&self, identitaet: &Identitaet) -> Vec<ServerNachricht> {
        self.eintraege
            .lock()
            .remove(identitaet)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Stellt alle ausstehenden Eintraege ueber den Sink zu
    ///
    /// Sendet zuerst eine `offline_messages`-Ankuendigung mit der Anzahl,
    /// danach die Nachrichten in Erfassungsreihenfolge. Die Eintraege werden
    /// unter dem Lock entnommen und erst danach geschrieben. Ohne Eintraege
    /// wird nichts gesendet.
    ///
    /// Eine nicht kodierbare Nachricht wird uebersprungen, die restlichen
    /// werden trotzdem zugestellt. Gibt die Anzahl der geschriebenen
    /// Nachrichten zurueck.
    pub async fn zustellen<S>(&self, identitaet: &Identitaet, sink: &mut S) -> io::Result<usize>
    where
        S: Sink<ServerNachricht, Error = io::Error> + Unpin,
    {
        let nachrichten = self.entnehmen(identitaet);
        let anzahl = nachrichten.len();
        if anzahl == 0 {
            return Ok(0);
        }

        sink.feed(ServerNachricht::OfflineMessages {
            count: anzahl,
            message: format!("Du hast {anzahl} Offline-Nachricht(en)"),
        })
        .await?;

        let mut geschrieben = 0;
        for nachricht in nachrichten {
            match sink.feed(nachricht).await {
                Ok(()) => geschrieben += 1,
                Err(e) => match KodierFehler::aus_io(&e) {
                    Some(kodier) => {
                        tracing::warn!(identitaet = %identitaet, fehler = %kodier, "Offline-Nachricht nicht kodierbar, uebersprungen");
                    }
                    None => return Err(e),
                },
            }
        }
        sink.flush().await?;

        tracing::info!(identitaet = %identitaet, anzahl, geschrieben, "Offline-Nachrichten zugestellt");
        Ok(geschrieben)
    }

    /// Anzahl der ausstehenden Eintraege einer Identitaet
    pub fn ausstehend(&self, identitaet: &Identitaet) -> usize {
        self.eintraege
            .lock()
            .get(identitaet)
            .map_or(0, VecDeque::len)
    }

    /// Anzahl aller ausstehenden Eintraege
    pub fn gesamt(&self) -> usize {
        self.eintraege.lock().values().map(VecDeque::len).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use klatsch_protocol::{DateiTransfer, ZeilenCodec};
    use tokio::io::DuplexStream;
    use tokio_util::codec::{Framed, FramedRead};

    fn id(name: &str) -> Identitaet {
        Identitaet::parse(name).unwrap()
    }

    fn direkt(text: &str) -> ServerNachricht {
        ServerNachricht::Message {
            sender: "alice".into(),
            receiver: "carol".into(),
            text: text.into(),
            timestamp: None,
        }
    }

    fn text_von(nachricht: &ServerNachricht) -> &str {
        match nachricht {
            ServerNachricht::Message { text, .. } => text,
            andere => panic!("Message erwartet, war {andere:?}"),
        }
    }

    #[test]
    fn fifo_reihenfolge_und_zeitstempel() {
        let queue = OfflineQueue::default();
        for text in ["m1", "m2", "m3"] {
            queue.einreihen(&id("carol"), direkt(text)).unwrap();
        }
        assert_eq!(queue.ausstehend(&id("carol")), 3);

        let nachrichten = queue.entnehmen(&id("carol"));
        let texte: Vec<_> = nachrichten.iter().map(text_von).collect();
        assert_eq!(texte, vec!["m1", "m2", "m3"]);

        for nachricht in &nachrichten {
            match nachricht {
                ServerNachricht::Message {
                    timestamp: Some(zeit),
                    ..
                } => assert!(
                    chrono::NaiveDateTime::parse_from_str(zeit, ZEITSTEMPEL_FORMAT).is_ok(),
                    "ungueltiger Zeitstempel: {zeit}"
                ),
                andere => panic!("Zeitstempel fehlt: {andere:?}"),
            }
        }

        // Genau einmal
        assert!(queue.entnehmen(&id("carol")).is_empty());
        assert_eq!(queue.gesamt(), 0);
    }

    #[test]
    fn nicht_speicherbare_nachricht_abgelehnt() {
        let queue = OfflineQueue::default();
        assert!(queue
            .einreihen(&id("carol"), ServerNachricht::system("x"))
            .is_err());
        assert_eq!(queue.gesamt(), 0);
    }

    #[test]
    fn obergrenze_verwirft_aelteste() {
        let queue = OfflineQueue::neu(Some(2));
        for text in ["m1", "m2", "m3"] {
            queue.einreihen(&id("dave"), direkt(text)).unwrap();
        }
        let texte: Vec<_> = queue
            .entnehmen(&id("dave"))
            .iter()
            .map(|n| text_von(n).to_string())
            .collect();
        assert_eq!(texte, vec!["m2", "m3"]);
    }

    #[test]
    fn queues_sind_pro_identitaet_getrennt() {
        let queue = OfflineQueue::default();
        queue.einreihen(&id("a"), direkt("x")).unwrap();
        queue
            .einreihen(
                &id("b"),
                ServerNachricht::dateitransfer("alice", DateiTransfer::aus_bytes("f", b"123")),
            )
            .unwrap();

        assert_eq!(queue.ausstehend(&id("a")), 1);
        assert_eq!(queue.ausstehend(&id("b")), 1);
        assert_eq!(queue.gesamt(), 2);
    }

    async fn lesen(client: &mut FramedRead<DuplexStream, ZeilenCodec>) -> ServerNachricht {
        let zeile = client.next().await.unwrap().unwrap();
        serde_json::from_str(&zeile).unwrap()
    }

    #[tokio::test]
    async fn zustellen_mit_ankuendigung() {
        let queue = OfflineQueue::default();
        queue.einreihen(&id("carol"), direkt("m1")).unwrap();
        queue.einreihen(&id("carol"), direkt("m2")).unwrap();

        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut server = Framed::new(server, ZeilenCodec::new());
        let mut client = FramedRead::new(client, ZeilenCodec::new());

        let anzahl = queue.zustellen(&id("carol"), &mut server).await.unwrap();
        assert_eq!(anzahl, 2);

        match lesen(&mut client).await {
            ServerNachricht::OfflineMessages { count, .. } => assert_eq!(count, 2),
            andere => panic!("OfflineMessages erwartet, war {andere:?}"),
        }
        assert_eq!(text_von(&lesen(&mut client).await), "m1");
        assert_eq!(text_von(&lesen(&mut client).await), "m2");
        assert_eq!(queue.ausstehend(&id("carol")), 0);
    }

    #[tokio::test]
    async fn zu_grosse_nachricht_blockiert_den_rest_nicht() {
        let queue = OfflineQueue::default();
        queue.einreihen(&id("carol"), direkt(&"x".repeat(500))).unwrap();
        queue.einreihen(&id("carol"), direkt("kurz")).unwrap();

        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut server = Framed::new(server, ZeilenCodec::with_max_laenge(300));
        let mut client = FramedRead::new(client, ZeilenCodec::new());

        let geschrieben = queue.zustellen(&id("carol"), &mut server).await.unwrap();
        assert_eq!(geschrieben, 1);

        match lesen(&mut client).await {
            ServerNachricht::OfflineMessages { count, .. } => assert_eq!(count, 2),
            andere => panic!("OfflineMessages erwartet, war {andere:?}"),
        }
        assert_eq!(text_von(&lesen(&mut client).await), "kurz");
        assert_eq!(queue.gesamt(), 0);
    }

    #[tokio::test]
    async fn zustellen_ohne_eintraege_sendet_nichts() {
        let queue = OfflineQueue::default();
        let (_client, server) = tokio::io::duplex(1024);
        let mut server = Framed::new(server, ZeilenCodec::new());
        assert_eq!(queue.zustellen(&id("niemand"), &mut server).await.unwrap(), 0);
    }
}
