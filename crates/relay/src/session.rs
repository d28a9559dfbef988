//! Client-Sitzung – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede Verbindung bekommt eine `ClientSession` in einem eigenen tokio-Task.
//! Nur dieser Task schreibt auf den Socket; andere Sitzungen erreichen ihn
//! ueber die Send-Queue aus der `ConnectionRegistry`.
//!
//! ## State Machine
//! ```text
//! Handshake -> Aktiv -> Geschlossen
//!     |                     ^
//!     +---------------------+   (leere oder vergebene Identitaet)
//! ```
//!
//! ## Reihenfolge beim Betreten
//! Willkommen, Offline-Nachrichten und Hilfe werden direkt geschrieben,
//! bevor die Send-Queue gelesen wird. Live-Nachrichten kommen dadurch immer
//! nach dem gespeicherten Rueckstand an.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use klatsch_core::{Identitaet, VerbindungsId};
use klatsch_protocol::{KodierFehler, Prompt, ServerNachricht, ZeilenCodec};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

use crate::connection_registry::VerbindungsHandle;
use crate::error::{RelayError, RelayResult};
use crate::router::MessageRouter;
use crate::server_state::RelayState;

// ---------------------------------------------------------------------------
// Sitzungszustand
// ---------------------------------------------------------------------------

/// Zustand einer Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitzungsZustand {
    /// Prompt gesendet, Identitaet wird erwartet
    Handshake,
    /// Registriert, verarbeitet Envelopes
    Aktiv,
    /// Verbindung beendet (Endzustand)
    Geschlossen,
}

/// Ergebnis eines erfolgreichen Handshakes
struct Registrierung {
    identitaet: Identitaet,
    verbindungs_id: VerbindungsId,
    sende_rx: mpsc::Receiver<ServerNachricht>,
}

// ---------------------------------------------------------------------------
// ClientSession
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne Verbindung vom Handshake bis zur Trennung
pub struct ClientSession {
    state: Arc<RelayState>,
    peer_addr: SocketAddr,
    zustand: SitzungsZustand,
}

impl ClientSession {
    /// Erstellt eine neue Sitzung im Zustand `Handshake`
    pub fn neu(state: Arc<RelayState>, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            peer_addr,
            zustand: SitzungsZustand::Handshake,
        }
    }

    /// Aktueller Zustand
    pub fn zustand(&self) -> SitzungsZustand {
        self.zustand
    }

    fn uebergang(&mut self, neu: SitzungsZustand) {
        tracing::debug!(peer = %self.peer_addr, von = ?self.zustand, nach = ?neu, "Zustandswechsel");
        self.zustand = neu;
    }

    /// Startet die Verarbeitung der Verbindung
    ///
    /// Laeuft bis der Client trennt, ein Transportfehler auftritt oder das
    /// Shutdown-Signal kommt. Fehler betreffen nur diese Sitzung.
    pub async fn verarbeiten<S>(mut self, stream: S, mut shutdown_rx: watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer_addr = self.peer_addr;
        tracing::info!(peer = %peer_addr, "Neue Verbindung");

        let codec = ZeilenCodec::with_max_laenge(self.state.config.max_zeilen_bytes);
        let mut framed = Framed::new(stream, codec);

        let registrierung = match self.handshake(&mut framed, &mut shutdown_rx).await {
            Ok(Some(registrierung)) => registrierung,
            Ok(None) => {
                self.uebergang(SitzungsZustand::Geschlossen);
                return;
            }
            Err(e) => {
                tracing::warn!(peer = %peer_addr, fehler = %e, "Handshake fehlgeschlagen");
                self.uebergang(SitzungsZustand::Geschlossen);
                return;
            }
        };
        self.uebergang(SitzungsZustand::Aktiv);

        let Registrierung {
            identitaet,
            verbindungs_id,
            sende_rx,
        } = registrierung;

        match self
            .aktiv(&mut framed, &identitaet, sende_rx, &mut shutdown_rx)
            .await
        {
            Ok(()) => {
                tracing::info!(peer = %peer_addr, identitaet = %identitaet, "Verbindung getrennt");
            }
            Err(e) => {
                tracing::warn!(peer = %peer_addr, identitaet = %identitaet, fehler = %e, "Verbindung mit Fehler beendet");
            }
        }

        self.uebergang(SitzungsZustand::Geschlossen);
        self.aufraeumen(&identitaet, verbindungs_id);
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    /// Sendet den Prompt und registriert die gelesene Identitaet
    ///
    /// `Ok(None)` bedeutet: Verbindung ohne Registrierung beenden.
    async fn handshake<S>(
        &self,
        framed: &mut Framed<S, ZeilenCodec>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> RelayResult<Option<Registrierung>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        framed.send(Prompt::handshake()).await?;

        let zeile = tokio::select! {
            zeile = framed.next() => zeile,
            Ok(()) = shutdown_rx.changed() => {
                tracing::debug!(peer = %self.peer_addr, "Shutdown waehrend des Handshakes");
                return Ok(None);
            }
        };

        let roh = match zeile {
            Some(Ok(roh)) => roh,
            Some(Err(e)) => return Err(e.into()),
            None => {
                tracing::debug!(peer = %self.peer_addr, "Client vor dem Handshake getrennt");
                return Ok(None);
            }
        };

        let identitaet = match Identitaet::parse(&roh) {
            Ok(identitaet) => identitaet,
            Err(e) => {
                tracing::info!(peer = %self.peer_addr, fehler = %e, "Ungueltige Identitaet");
                framed.send(ServerNachricht::fehler(e.to_string())).await?;
                return Ok(None);
            }
        };

        let (handle, sende_rx) =
            VerbindungsHandle::neu(identitaet.clone(), self.state.config.send_queue_groesse);
        let verbindungs_id = handle.id;

        if let Err(e) = self.state.verbindungen.registrieren(handle) {
            tracing::info!(peer = %self.peer_addr, identitaet = %identitaet, "Identitaet bereits vergeben");
            let text = if matches!(e, RelayError::IdentitaetVergeben(_)) {
                format!("{e}. Verbindung wird getrennt")
            } else {
                e.to_string()
            };
            framed.send(ServerNachricht::fehler(text)).await?;
            return Ok(None);
        }

        tracing::info!(peer = %self.peer_addr, identitaet = %identitaet, verbindung = %verbindungs_id, "Client registriert");
        Ok(Some(Registrierung {
            identitaet,
            verbindungs_id,
            sende_rx,
        }))
    }

    // -----------------------------------------------------------------------
    // Aktiv
    // -----------------------------------------------------------------------

    /// Begruessung, Offline-Rueckstand und Ankuendigung an alle anderen
    async fn betreten<S>(
        &self,
        framed: &mut Framed<S, ZeilenCodec>,
        identitaet: &Identitaet,
    ) -> RelayResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let config = &self.state.config;
        let mut willkommen = format!(
            "Willkommen {identitaet}! {}: Direktnachrichten, Gruppen, Dateien und Offline-Nachrichten.",
            config.server_name
        );
        if let Some(zusatz) = &config.willkommen {
            willkommen.push(' ');
            willkommen.push_str(zusatz);
        }
        einspeisen(framed, identitaet, ServerNachricht::erfolg(willkommen)).await?;

        self.state.offline.zustellen(identitaet, framed).await?;

        einspeisen(framed, identitaet, ServerNachricht::hilfe()).await?;
        leeren(framed).await?;

        let verbindungen = &self.state.verbindungen;
        verbindungen.an_alle_ausser_senden(
            identitaet,
            ServerNachricht::system(format!("{identitaet} ist dem Chat beigetreten")),
        );
        verbindungen.benutzerliste_senden();
        Ok(())
    }

    /// Hauptschleife: Zeilen lesen, Send-Queue leeren, auf Shutdown achten
    ///
    /// `Ok(())` bei regulaerem Ende (Client trennt oder Shutdown).
    async fn aktiv<S>(
        &self,
        framed: &mut Framed<S, ZeilenCodec>,
        identitaet: &Identitaet,
        mut sende_rx: mpsc::Receiver<ServerNachricht>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> RelayResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.betreten(framed, identitaet).await?;

        let router = MessageRouter::neu(Arc::clone(&self.state));

        loop {
            tokio::select! {
                // Eingehende Zeile vom Client
                zeile = framed.next() => {
                    match zeile {
                        Some(Ok(zeile)) => {
                            if zeile.trim().is_empty() {
                                continue;
                            }
                            tracing::trace!(identitaet = %identitaet, bytes = zeile.len(), "Zeile empfangen");

                            for antwort in router.verarbeiten(identitaet, &zeile) {
                                einspeisen(framed, identitaet, antwort).await?;
                            }
                            leeren(framed).await?;
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    }
                }

                // Von anderen Sitzungen geroutete Nachricht
                Some(ausgehend) = sende_rx.recv() => {
                    einspeisen(framed, identitaet, ausgehend).await?;
                    leeren(framed).await?;
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(identitaet = %identitaet, "Shutdown-Signal, Verbindung wird getrennt");
                        let _ = framed
                            .send(ServerNachricht::system("Server wird heruntergefahren"))
                            .await;
                        return Ok(());
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Geschlossen
    // -----------------------------------------------------------------------

    /// Entfernt die Identitaet aus allen Registries und benachrichtigt den Rest
    fn aufraeumen(&self, identitaet: &Identitaet, verbindungs_id: VerbindungsId) {
        let state = &self.state;

        if !state.verbindungen.abmelden(identitaet, verbindungs_id) {
            tracing::warn!(identitaet = %identitaet, "Registrierung beim Aufraeumen nicht gefunden");
        }

        let geloescht = state.gruppen.ueberall_entfernen(identitaet);
        if !geloescht.is_empty() {
            tracing::debug!(identitaet = %identitaet, gruppen = ?geloescht, "Leere Gruppen beim Trennen geloescht");
        }

        let ausstehend = state.offline.ausstehend(identitaet);
        if ausstehend > 0 {
            tracing::info!(identitaet = %identitaet, ausstehend, "Nicht zugestellte Offline-Nachrichten");
        }

        state.verbindungen.an_alle_senden(ServerNachricht::system(format!(
            "{identitaet} hat den Chat verlassen"
        )));
        state.verbindungen.benutzerliste_senden();
    }
}

// ---------------------------------------------------------------------------
// Schreiben
// ---------------------------------------------------------------------------

/// Reiht eine Nachricht im Schreibpuffer ein
///
/// Eine nicht kodierbare Nachricht (z.B. zu gross) wird geloggt und
/// uebersprungen; nur Transportfehler beenden die Sitzung.
async fn einspeisen<S>(
    framed: &mut Framed<S, ZeilenCodec>,
    identitaet: &Identitaet,
    nachricht: ServerNachricht,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let status = nachricht.status();
    match framed.feed(nachricht).await {
        Ok(()) => Ok(()),
        Err(e) => match KodierFehler::aus_io(&e) {
            Some(kodier) => {
                tracing::warn!(identitaet = %identitaet, status, fehler = %kodier, "Nachricht nicht kodierbar, uebersprungen");
                Ok(())
            }
            None => Err(e),
        },
    }
}

/// Schreibt den Puffer auf den Socket
async fn leeren<S>(framed: &mut Framed<S, ZeilenCodec>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Framed ist Sink fuer ServerNachricht und Prompt
    SinkExt::<ServerNachricht>::flush(framed).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
