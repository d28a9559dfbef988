//! Gemeinsame Hilfen fuer die TCP-Integrationstests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use klatsch_protocol::HANDSHAKE_PROMPT;
use klatsch_relay::{RelayConfig, RelayServer, RelayState};
use serde_json::Value;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

const LESE_TIMEOUT: Duration = Duration::from_secs(5);

/// Laufender Relay-Server auf einem freien Port
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<RelayState>,
    pub shutdown_tx: watch::Sender<bool>,
}

pub async fn server() -> TestServer {
    server_mit(RelayConfig::default()).await
}

pub async fn server_mit(config: RelayConfig) -> TestServer {
    let state = RelayState::neu(config);
    let server = RelayServer::binden(Arc::clone(&state), "127.0.0.1:0".parse().unwrap())
        .await
        .expect("Bind auf 127.0.0.1:0 fehlgeschlagen");
    let addr = server.lokale_adresse().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(server.starten(shutdown_rx));

    TestServer {
        addr,
        state,
        shutdown_tx,
    }
}

/// Zeilenbasierter Test-Client
///
/// Nachrichten die beim Suchen nach einem Status uebersprungen werden,
/// bleiben im Puffer und werden bei spaeteren Suchen beruecksichtigt.
pub struct TestClient {
    lesen: FramedRead<OwnedReadHalf, LinesCodec>,
    schreiben: FramedWrite<OwnedWriteHalf, LinesCodec>,
    puffer: VecDeque<Value>,
}

impl TestClient {
    /// Verbindet und liest den Prompt, sendet aber noch keinen Namen
    pub async fn roh_verbinden(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (lesen, schreiben) = stream.into_split();
        let mut client = Self {
            lesen: FramedRead::new(lesen, LinesCodec::new()),
            schreiben: FramedWrite::new(schreiben, LinesCodec::new()),
            puffer: VecDeque::new(),
        };
        assert_eq!(client.zeile().await.as_deref(), Some(HANDSHAKE_PROMPT));
        client
    }

    /// Verbindet und registriert sich, ohne die Begruessung zu lesen
    pub async fn anmelden(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::roh_verbinden(addr).await;
        client.zeile_senden(name).await;
        client
    }

    /// Verbindet, registriert sich und liest die Begruessung bis zur eigenen
    /// Benutzerliste
    pub async fn verbinden(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::anmelden(addr, name).await;
        assert_eq!(client.naechste().await["status"], "success");
        client.bis_status("help").await;
        loop {
            let liste = client.bis_status("user_list").await;
            if enthaelt(&liste["users"], name) {
                break;
            }
        }
        client
    }

    pub async fn zeile_senden(&mut self, zeile: &str) {
        self.schreiben.send(zeile.to_string()).await.unwrap();
    }

    pub async fn senden(&mut self, envelope: Value) {
        self.zeile_senden(&envelope.to_string()).await;
    }

    /// Liest eine rohe Zeile (`None` wenn der Server getrennt hat)
    ///
    /// Ein Lesefehler (z.B. Connection Reset) zaehlt als Trennung.
    pub async fn zeile(&mut self) -> Option<String> {
        tokio::time::timeout(LESE_TIMEOUT, self.lesen.next())
            .await
            .expect("Timeout beim Lesen")
            .and_then(Result::ok)
    }

    /// Naechste JSON-Nachricht (Puffer zuerst)
    pub async fn naechste(&mut self) -> Value {
        if let Some(wert) = self.puffer.pop_front() {
            return wert;
        }
        self.lesen_json().await
    }

    async fn lesen_json(&mut self) -> Value {
        let zeile = self.zeile().await.expect("Server hat die Verbindung getrennt");
        serde_json::from_str(&zeile).unwrap_or_else(|e| panic!("Kein JSON: {zeile} ({e})"))
    }

    /// Naechste Nachricht mit dem angegebenen Status
    pub async fn bis_status(&mut self, status: &str) -> Value {
        if let Some(pos) = self.puffer.iter().position(|v| v["status"] == status) {
            return self.puffer.remove(pos).unwrap();
        }
        loop {
            let wert = self.lesen_json().await;
            if wert["status"] == status {
                return wert;
            }
            self.puffer.push_back(wert);
        }
    }

    /// Prueft ob der Server die Verbindung beendet hat
    pub async fn ist_getrennt(&mut self) -> bool {
        self.zeile().await.is_none()
    }
}

pub fn enthaelt(liste: &Value, name: &str) -> bool {
    liste
        .as_array()
        .map(|eintraege| eintraege.iter().any(|e| e == name))
        .unwrap_or(false)
}
