//! Connection-Registry – Wer ist unter welcher Identitaet verbunden
//!
//! Haelt fuer jede registrierte Identitaet einen `VerbindungsHandle` auf die
//! Send-Queue der zugehoerigen Sitzung. Nur die Sitzung selbst schreibt auf
//! ihren Socket; alle anderen erreichen sie ueber diese Queue.
//!
//! ## Eindeutigkeit
//! `registrieren` prueft und fuegt unter demselben Shard-Lock ein
//! (`DashMap::entry`). Eine zweite Verbindung mit belegter Identitaet wird
//! abgelehnt, die bestehende bleibt unberuehrt.

use std::collections::BTreeSet;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use klatsch_core::{Identitaet, VerbindungsId};
use klatsch_protocol::ServerNachricht;
use tokio::sync::mpsc;

use crate::error::{RelayError, RelayResult};

// ---------------------------------------------------------------------------
// VerbindungsHandle
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer aktiven Sitzung
#[derive(Clone, Debug)]
pub struct VerbindungsHandle {
    pub id: VerbindungsId,
    pub identitaet: Identitaet,
    tx: mpsc::Sender<ServerNachricht>,
}

impl VerbindungsHandle {
    /// Erstellt Handle und zugehoerige Empfangs-Queue
    ///
    /// Die Sitzung liest aus der Queue und schreibt auf den Socket.
    pub fn neu(
        identitaet: Identitaet,
        kapazitaet: usize,
    ) -> (Self, mpsc::Receiver<ServerNachricht>) {
        let (tx, rx) = mpsc::channel(kapazitaet.max(1));
        let handle = Self {
            id: VerbindungsId::new(),
            identitaet,
            tx,
        };
        (handle, rx)
    }

    /// Reiht eine Nachricht nicht-blockierend ein
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: ServerNachricht) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(identitaet = %self.identitaet, "Send-Queue voll, Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(identitaet = %self.identitaet, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionRegistry
// ---------------------------------------------------------------------------

/// Zuordnung Identitaet -> aktive Verbindung
///
/// Thread-safe via DashMap, wird ueber `RelayState` per Arc geteilt.
#[derive(Default)]
pub struct ConnectionRegistry {
    verbindungen: DashMap<Identitaet, VerbindungsHandle>,
}

impl ConnectionRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        Self {
            verbindungen: DashMap::new(),
        }
    }

    /// Registriert eine Verbindung unter ihrer Identitaet
    ///
    /// Atomar mit der Eindeutigkeitspruefung. Bei belegter Identitaet wird
    /// `IdentitaetVergeben` zurueckgegeben und nichts veraendert.
    pub fn registrieren(&self, handle: VerbindungsHandle) -> RelayResult<()> {
        match self.verbindungen.entry(handle.identitaet.clone()) {
            Entry::Occupied(belegt) => {
                tracing::debug!(
                    identitaet = %handle.identitaet,
                    bestehend = %belegt.get().id,
                    "Identitaet bereits vergeben"
                );
                Err(RelayError::IdentitaetVergeben(handle.identitaet))
            }
            Entry::Vacant(frei) => {
                tracing::debug!(
                    identitaet = %handle.identitaet,
                    verbindung = %handle.id,
                    "Verbindung registriert"
                );
                frei.insert(handle);
                Ok(())
            }
        }
    }

    /// Entfernt eine Registrierung
    ///
    /// Entfernt nur wenn der Eintrag noch zur angegebenen Verbindung gehoert,
    /// damit ein verspaetetes Aufraeumen keine neuere Sitzung verdraengt.
    pub fn abmelden(&self, identitaet: &Identitaet, id: VerbindungsId) -> bool {
        let entfernt = self
            .verbindungen
            .remove_if(identitaet, |_, handle| handle.id == id)
            .is_some();
        if entfernt {
            tracing::debug!(identitaet = %identitaet, "Verbindung abgemeldet");
        }
        entfernt
    }

    /// Sucht die aktive Verbindung einer Identitaet
    pub fn nachschlagen(&self, identitaet: &str) -> Option<VerbindungsHandle> {
        self.verbindungen
            .get(identitaet)
            .map(|eintrag| eintrag.value().clone())
    }

    /// Prueft ob eine Identitaet aktuell verbunden ist
    pub fn ist_online(&self, identitaet: &str) -> bool {
        self.verbindungen.contains_key(identitaet)
    }

    /// Momentaufnahme aller registrierten Identitaeten (sortiert)
    pub fn schnappschuss(&self) -> BTreeSet<Identitaet> {
        self.verbindungen
            .iter()
            .map(|eintrag| eintrag.key().clone())
            .collect()
    }

    /// Sendet eine Nachricht an eine einzelne Identitaet
    ///
    /// Gibt `true` zurueck wenn die Identitaet verbunden ist und die
    /// Nachricht eingereiht wurde.
    pub fn an_identitaet_senden(&self, identitaet: &str, nachricht: ServerNachricht) -> bool {
        match self.nachschlagen(identitaet) {
            Some(handle) => handle.senden(nachricht),
            None => {
                tracing::debug!(identitaet = %identitaet, "Senden an nicht verbundene Identitaet");
                false
            }
        }
    }

    /// Sendet eine Nachricht an alle verbundenen Sitzungen
    ///
    /// Fehler einzelner Empfaenger werden nur geloggt. Gibt die Anzahl der
    /// erfolgreichen Sendungen zurueck.
    pub fn an_alle_senden(&self, nachricht: ServerNachricht) -> usize {
        let mut gesendet = 0;
        self.verbindungen.iter().for_each(|eintrag| {
            if eintrag.value().senden(nachricht.clone()) {
                gesendet += 1;
            }
        });
        gesendet
    }

    /// Sendet eine Nachricht an alle verbundenen Sitzungen ausser einer
    pub fn an_alle_ausser_senden(
        &self,
        ausgeschlossen: &Identitaet,
        nachricht: ServerNachricht,
    ) -> usize {
        let mut gesendet = 0;
        self.verbindungen.iter().for_each(|eintrag| {
            if eintrag.key() == ausgeschlossen {
                return;
            }
            if eintrag.value().senden(nachricht.clone()) {
                gesendet += 1;
            }
        });
        gesendet
    }

    /// Verteilt die aktuelle Benutzerliste an alle Sitzungen
    pub fn benutzerliste_senden(&self) -> usize {
        let users = self
            .schnappschuss()
            .into_iter()
            .map(|identitaet| identitaet.to_string())
            .collect();
        self.an_alle_senden(ServerNachricht::UserList { users })
    }

    /// Gibt die Anzahl der registrierten Verbindungen zurueck
    pub fn anzahl(&self) -> usize {
        self.verbindungen.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
