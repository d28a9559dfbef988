//! Gruppen-Registry – Ad-hoc-Gruppen fuer Broadcasts
//!
//! Eine Gruppe besteht aus Namen und Mitgliedsmenge. Sie entsteht mit
//! `/create` und verschwindet, sobald das letzte Mitglied sie verlaesst.
//! Mitglieder muessen nicht online sein; beim Senden werden nur die gerade
//! verbundenen erreicht.
//!
//! Alle Operationen laufen unter einem einzigen `parking_lot::Mutex`, der nie
//! ueber ein `.await` gehalten wird.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use klatsch_core::{GruppenName, Identitaet};
use klatsch_protocol::{ServerNachricht, Zustellung};
use parking_lot::Mutex;

use crate::connection_registry::ConnectionRegistry;
use crate::error::{RelayError, RelayResult};

/// Verwaltet alle Gruppen des Servers
#[derive(Default)]
pub struct GroupRegistry {
    gruppen: Mutex<HashMap<GruppenName, BTreeSet<Identitaet>>>,
}

impl GroupRegistry {
    /// Erstellt eine leere Registry
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt eine Gruppe mit dem Ersteller als erstem Mitglied an
    pub fn erstellen(&self, name: &GruppenName, ersteller: &Identitaet) -> RelayResult<()> {
        let mut gruppen = self.gruppen.lock();
        if gruppen.contains_key(name) {
            return Err(RelayError::GruppeExistiert(name.clone()));
        }
        gruppen.insert(name.clone(), BTreeSet::from([ersteller.clone()]));

        tracing::info!(gruppe = %name, ersteller = %ersteller, "Gruppe erstellt");
        Ok(())
    }

    /// Fuegt eine Identitaet einer bestehenden Gruppe hinzu
    ///
    /// Gibt `false` zurueck wenn die Identitaet schon Mitglied war.
    pub fn beitreten(&self, name: &GruppenName, identitaet: &Identitaet) -> RelayResult<bool> {
        let mut gruppen = self.gruppen.lock();
        let mitglieder = gruppen
            .get_mut(name)
            .ok_or_else(|| RelayError::GruppeNichtGefunden(name.clone()))?;

        let neu = mitglieder.insert(identitaet.clone());
        if neu {
            tracing::debug!(gruppe = %name, identitaet = %identitaet, "Gruppe beigetreten");
        }
        Ok(neu)
    }

    /// Entfernt eine Identitaet aus einer Gruppe
    ///
    /// Eine leere Gruppe wird im selben kritischen Abschnitt geloescht.
    /// Gibt `true` zurueck wenn die Gruppe dabei geloescht wurde.
    pub fn verlassen(&self, name: &GruppenName, identitaet: &Identitaet) -> RelayResult<bool> {
        let mut gruppen = self.gruppen.lock();
        let mitglieder = gruppen
            .get_mut(name)
            .ok_or_else(|| RelayError::GruppeNichtGefunden(name.clone()))?;

        if !mitglieder.remove(identitaet) {
            return Err(RelayError::KeinMitglied(name.clone()));
        }

        let geloescht = mitglieder.is_empty();
        if geloescht {
            gruppen.remove(name);
            tracing::info!(gruppe = %name, "Gruppe ohne Mitglieder geloescht");
        }
        Ok(geloescht)
    }

    /// Momentaufnahme aller Gruppen mit ihren Mitgliedern
    pub fn auflistung(&self) -> BTreeMap<String, Vec<String>> {
        self.gruppen
            .lock()
            .iter()
            .map(|(name, mitglieder)| {
                (
                    name.to_string(),
                    mitglieder.iter().map(|m| m.to_string()).collect(),
                )
            })
            .collect()
    }

    /// Mitglieder einer Gruppe (Kopie)
    pub fn mitglieder(&self, name: &GruppenName) -> RelayResult<Vec<Identitaet>> {
        self.gruppen
            .lock()
            .get(name)
            .map(|m| m.iter().cloned().collect())
            .ok_or_else(|| RelayError::GruppeNichtGefunden(name.clone()))
    }

    /// Sendet eine Nachricht an alle Mitglieder einer Gruppe
    ///
    /// Die Mitgliedsmenge wird unter dem Lock kopiert, gesendet wird danach.
    /// `attempted` ist die Anzahl der Mitglieder, `delivered` die Anzahl der
    /// online erreichten. Der Absender gehoert dazu, falls er Mitglied ist.
    pub fn an_gruppe_senden(
        &self,
        name: &GruppenName,
        absender: &Identitaet,
        text: &str,
        verbindungen: &ConnectionRegistry,
    ) -> RelayResult<Zustellung> {
        let mitglieder = self.mitglieder(name)?;

        let nachricht = ServerNachricht::GroupMessage {
            group: name.to_string(),
            sender: absender.to_string(),
            text: text.to_string(),
        };

        let delivered = mitglieder
            .iter()
            .filter(|mitglied| verbindungen.an_identitaet_senden(mitglied.as_str(), nachricht.clone()))
            .count();

        let zustellung = Zustellung {
            delivered,
            attempted: mitglieder.len(),
        };
        tracing::debug!(gruppe = %name, absender = %absender, zustellung = %zustellung, "Gruppennachricht verteilt");
        Ok(zustellung)
    }

    /// Entfernt eine Identitaet aus allen Gruppen
    ///
    /// Gibt die Namen der dabei geloeschten (leeren) Gruppen zurueck.
    pub fn ueberall_entfernen(&self, identitaet: &Identitaet) -> Vec<GruppenName> {
        let mut gruppen = self.gruppen.lock();
        let mut geloescht = Vec::new();

        gruppen.retain(|name, mitglieder| {
            mitglieder.remove(identitaet);
            if mitglieder.is_empty() {
                geloescht.push(name.clone());
                false
            } else {
                true
            }
        });

        if !geloescht.is_empty() {
            tracing::debug!(identitaet = %identitaet, anzahl = geloescht.len(), "Leere Gruppen geloescht");
        }
        geloescht
    }

    /// Gibt die Anzahl der Gruppen zurueck
    pub fn anzahl(&self) -> usize {
        self.gruppen.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
