//! klatsch-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert das Zeilenprotokoll zwischen Client und Relay:
//! eingehende Envelopes, ausgehende Server-Nachrichten, die
//! Dateitransfer-Nutzlast und den Zeilen-Codec fuer `tokio_util::codec`.
//!
//! ## Ablauf auf der Leitung
//!
//! ```text
//! Server -> Client   "Benutzername eingeben: "    (Prompt-Zeile)
//! Client -> Server   "alice"                      (nackte Identitaet)
//! Client -> Server   {"receiver":"bob","text":"hi"}
//! Server -> Client   {"status":"sent","message":"...","queued":false}
//! ```

pub mod datei;
pub mod envelope;
pub mod error;
pub mod nachricht;
pub mod wire;

pub use datei::{DateiPruefung, DateiTransfer};
pub use envelope::{Befehl, Envelope, EnvelopeArt};
pub use error::{ProtokollFehler, ProtokollResult};
pub use nachricht::{ServerNachricht, Zustellung};
pub use wire::{KodierFehler, Prompt, ZeilenCodec, HANDSHAKE_PROMPT};
