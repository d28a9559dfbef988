//! klatsch-relay – Sitzungen und Nachrichten-Routing
//!
//! Dieser Crate implementiert den serverseitigen Kern von Klatsch: Er
//! verwaltet TCP-Sitzungen, registriert Identitaeten, verteilt Direkt- und
//! Gruppennachrichten, reicht Dateien weiter und speichert Nachrichten fuer
//! nicht verbundene Empfaenger.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (RelayServer)
//!     |
//!     v
//! ClientSession (pro Verbindung ein Task)
//!     |  State Machine: Handshake -> Aktiv -> Geschlossen
//!     |
//!     v
//! MessageRouter
//!     |
//!     +-- ConnectionRegistry (Identitaet -> Send-Queue)
//!     +-- GroupRegistry      (Gruppe -> Mitglieder)
//!     +-- OfflineQueue       (Identitaet -> gespeicherte Nachrichten)
//! ```
//!
//! Die drei Registries sind unabhaengig gesperrt; keine Sperre wird ueber
//! ein `.await` gehalten.

pub mod connection_registry;
pub mod error;
pub mod group_registry;
pub mod offline_queue;
pub mod router;
pub mod server_state;
pub mod session;
pub mod tcp;

// Bequeme Re-Exporte
pub use connection_registry::{ConnectionRegistry, VerbindungsHandle};
pub use error::{RelayError, RelayResult};
pub use group_registry::GroupRegistry;
pub use offline_queue::OfflineQueue;
pub use router::MessageRouter;
pub use server_state::{RelayConfig, RelayState};
pub use session::{ClientSession, SitzungsZustand};
pub use tcp::RelayServer;
