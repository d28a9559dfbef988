//! Wire-Format fuer TCP-Verbindungen
//!
//! Zeilenbasiertes Protokoll: jede Nachricht ist eine UTF-8-Zeile, die mit
//! `\n` endet (ein vorangehendes `\r` wird toleriert).
//!
//! ## Frame-Format
//!
//! ```text
//! +----------------------------------+----+
//! | Payload (Identitaet oder JSON)   | \n |
//! +----------------------------------+----+
//! ```
//!
//! Maximale Zeilenlaenge ist konfigurierbar (Standard: 4 MB, ausreichend
//! fuer Base64-kodierte Dateien bis knapp 3 MB).

use bytes::{BufMut, BytesMut};
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::nachricht::ServerNachricht;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Zeilenlaenge (4 MB)
pub const DEFAULT_MAX_ZEILEN_LAENGE: usize = 4 * 1024 * 1024;

/// Prompt den der Server beim Handshake sendet
pub const HANDSHAKE_PROMPT: &str = "Benutzername eingeben: ";

/// Unstrukturierte Prompt-Zeile (nur im Handshake verwendet)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(pub String);

impl Prompt {
    /// Der Standard-Handshake-Prompt
    pub fn handshake() -> Self {
        Self(HANDSHAKE_PROMPT.to_string())
    }
}

// ---------------------------------------------------------------------------
// KodierFehler
// ---------------------------------------------------------------------------

/// Eine einzelne ausgehende Nachricht liess sich nicht kodieren
///
/// Der Codec liefert ihn eingepackt in einen `io::Error`. Im Gegensatz zu
/// Transportfehlern bleibt der Stream danach benutzbar, es wurde nichts in
/// den Puffer geschrieben.
#[derive(Debug, Error)]
pub enum KodierFehler {
    #[error("Nachricht zu gross: {laenge} Bytes (Maximum: {max} Bytes)")]
    ZuGross { laenge: usize, max: usize },

    #[error("JSON-Serialisierung fehlgeschlagen: {0}")]
    Json(#[from] serde_json::Error),
}

impl KodierFehler {
    /// Holt den Kodierfehler aus einem Schreibfehler, falls es einer ist
    pub fn aus_io(fehler: &io::Error) -> Option<&KodierFehler> {
        fehler.get_ref()?.downcast_ref::<KodierFehler>()
    }
}

impl From<KodierFehler> for io::Error {
    fn from(fehler: KodierFehler) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, fehler)
    }
}

// ---------------------------------------------------------------------------
// ZeilenCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer das zeilenbasierte Klatsch-Protokoll
///
/// Dekodiert rohe Zeilen (`String`) und kodiert `ServerNachricht` als
/// JSON-Zeile sowie `Prompt` als nackte Textzeile. Die Interpretation der
/// Zeilen (Identitaet oder Envelope) liegt bei der Sitzung, damit ein
/// ungueltiger Envelope die Verbindung nicht beendet.
///
/// # Beispiel
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use klatsch_protocol::wire::ZeilenCodec;
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, ZeilenCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct ZeilenCodec {
    /// Maximale erlaubte Zeilenlaenge in Bytes (ohne Zeilenumbruch)
    max_zeilen_laenge: usize,
    /// Ab diesem Index wird beim naechsten Aufruf nach `\n` gesucht
    naechster_index: usize,
}

impl ZeilenCodec {
    /// Erstellt einen neuen `ZeilenCodec` mit Standard-Limit
    pub fn new() -> Self {
        Self::with_max_laenge(DEFAULT_MAX_ZEILEN_LAENGE)
    }

    /// Erstellt einen `ZeilenCodec` mit benutzerdefinierter maximaler Zeilenlaenge
    pub fn with_max_laenge(max_zeilen_laenge: usize) -> Self {
        Self {
            max_zeilen_laenge,
            naechster_index: 0,
        }
    }

    fn zu_lang(&self, laenge: usize) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Zeile zu lang: {} Bytes (Maximum: {} Bytes)",
                laenge, self.max_zeilen_laenge
            ),
        )
    }
}

impl Default for ZeilenCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Wandelt Rohbytes einer Zeile in einen String (ohne `\r`)
///
/// Ungueltiges UTF-8 wird ersetzt statt abgelehnt; der Envelope-Parser
/// meldet den Fehler dann als Protokollfehler.
fn zeile_aus_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for ZeilenCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let start = self.naechster_index.min(src.len());

        match src[start..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let ende = start + offset;
                self.naechster_index = 0;

                if ende > self.max_zeilen_laenge {
                    return Err(self.zu_lang(ende));
                }

                let zeile = src.split_to(ende + 1);
                Ok(Some(zeile_aus_bytes(&zeile[..ende])))
            }
            None => {
                if src.len() > self.max_zeilen_laenge {
                    return Err(self.zu_lang(src.len()));
                }
                // Bereits durchsuchte Bytes beim naechsten Mal ueberspringen
                self.naechster_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(zeile) = self.decode(src)? {
            return Ok(Some(zeile));
        }
        if src.is_empty() {
            return Ok(None);
        }

        // Letzte Zeile ohne abschliessendes `\n`
        self.naechster_index = 0;
        let rest = src.split_to(src.len());
        Ok(Some(zeile_aus_bytes(&rest)))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierungen
// ---------------------------------------------------------------------------

impl Encoder<ServerNachricht> for ZeilenCodec {
    type Error = io::Error;

    fn encode(&mut self, item: ServerNachricht, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(KodierFehler::from)?;

        if json.len() > self.max_zeilen_laenge {
            return Err(KodierFehler::ZuGross {
                laenge: json.len(),
                max: self.max_zeilen_laenge,
            }
            .into());
        }

        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}

impl Encoder<Prompt> for ZeilenCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Prompt, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.0.len() + 1);
        dst.put_slice(item.0.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
