//! Integration-Tests fuer Handshake, Anmeldung, Trennung und Shutdown

mod common;

use common::{enthaelt, server, server_mit, TestClient};
use klatsch_relay::RelayConfig;
use serde_json::json;

#[tokio::test]
async fn doppelter_name_wird_abgelehnt() {
    let server = server().await;
    let mut alice = TestClient::verbinden(server.addr, "alice").await;

    let mut zweite = TestClient::anmelden(server.addr, "alice").await;
    let fehler = zweite.naechste().await;
    assert_eq!(fehler["status"], "error");
    assert!(fehler["message"].as_str().unwrap().contains("bereits vergeben"));
    assert!(zweite.ist_getrennt().await);

    // Die erste Verbindung bleibt unberuehrt
    assert_eq!(server.state.verbindungen.anzahl(), 1);
    alice.senden(json!({"receiver": "/groups"})).await;
    alice.bis_status("group_list").await;
}

#[tokio::test]
async fn name_nach_trennung_wieder_frei() {
    let server = server().await;
    let mut beobachter = TestClient::verbinden(server.addr, "beobachter").await;

    let erste = TestClient::verbinden(server.addr, "alice").await;
    drop(erste);
    loop {
        let liste = beobachter.bis_status("user_list").await;
        if !enthaelt(&liste["users"], "alice") {
            break;
        }
    }

    let _zweite = TestClient::verbinden(server.addr, "alice").await;
    assert!(server.state.verbindungen.ist_online("alice"));
}

#[tokio::test]
async fn leerer_name_wird_abgelehnt() {
    let server = server().await;

    let mut client = TestClient::anmelden(server.addr, "   ").await;
    assert_eq!(client.naechste().await["status"], "error");
    assert!(client.ist_getrennt().await);
    assert_eq!(server.state.verbindungen.anzahl(), 0);
}

#[tokio::test]
async fn beitritt_und_abschied_werden_angekuendigt() {
    let server = server().await;
    let mut alice = TestClient::verbinden(server.addr, "alice").await;

    let bob = TestClient::verbinden(server.addr, "bob").await;
    let beitritt = alice.bis_status("system").await;
    assert_eq!(beitritt["message"], "bob ist dem Chat beigetreten");
    loop {
        let liste = alice.bis_status("user_list").await;
        if liste["users"] == json!(["alice", "bob"]) {
            break;
        }
    }

    drop(bob);
    let abschied = alice.bis_status("system").await;
    assert_eq!(abschied["message"], "bob hat den Chat verlassen");
    loop {
        let liste = alice.bis_status("user_list").await;
        if liste["users"] == json!(["alice"]) {
            break;
        }
    }
}

#[tokio::test]
async fn zu_lange_zeile_beendet_nur_diese_sitzung() {
    let server = server_mit(RelayConfig {
        max_zeilen_bytes: 2048,
        ..RelayConfig::default()
    })
    .await;
    let mut alice = TestClient::verbinden(server.addr, "alice").await;
    let mut bob = TestClient::verbinden(server.addr, "bob").await;

    let text = "x".repeat(8192);
    bob.senden(json!({"receiver": "alice", "text": text})).await;
    while bob.zeile().await.is_some() {}

    let abschied = alice.bis_status("system").await;
    let abschied = if abschied["message"].as_str().unwrap().contains("verlassen") {
        abschied
    } else {
        alice.bis_status("system").await
    };
    assert_eq!(abschied["message"], "bob hat den Chat verlassen");

    alice.senden(json!({"receiver": "/groups"})).await;
    alice.bis_status("group_list").await;
}

#[tokio::test]
async fn shutdown_benachrichtigt_aktive_sitzungen() {
    let server = server().await;
    let mut alice = TestClient::verbinden(server.addr, "alice").await;

    server.shutdown_tx.send(true).unwrap();

    let hinweis = alice.bis_status("system").await;
    assert_eq!(hinweis["message"], "Server wird heruntergefahren");
    assert!(alice.ist_getrennt().await);
}
