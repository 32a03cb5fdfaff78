//! Integration test: duplicate and out-of-sequence message handling.
//!
//! Re-delivery of the last applied message must replay the recorded outcome
//! without repeating wallet/ledger side effects; stale or gapped sequence
//! numbers are rejected.

use std::sync::Arc;

use credex_core::{EngineConfig, ExchangeState, Message, PayloadKind};
use credex_engine::{EngineError, MemoryLedger};
use credex_integration_tests::{connect, kyc_definition, kyc_offer, party, relay};

#[tokio::test]
async fn test_duplicate_credential_request_replays_outcome() {
    let ledger = Arc::new(MemoryLedger::new());
    let holder = party("alice", 1, EngineConfig::default(), ledger.clone());
    let issuer = party("acme", 7, EngineConfig::default(), ledger.clone());
    ledger.register_definition(kyc_definition(&issuer.did, 7, false));

    let (hx, rx) = connect(&holder, &issuer).await.expect("connection");

    let offered = issuer
        .engine
        .advance(rx, Message::new(rx, 2, kyc_offer()))
        .await
        .expect("offer");
    let offer = offered.outgoing.unwrap();
    let requested = holder
        .engine
        .advance(hx, relay(&offer, hx, 3))
        .await
        .expect("request");
    let request = relay(&requested.outgoing.unwrap(), rx, 3);

    // First delivery issues the credential: one signature for the
    // credential itself, one for the outgoing envelope.
    let first = issuer
        .engine
        .advance(rx, request.clone())
        .await
        .expect("issue");
    let signs_after_first = issuer.wallet.sign_calls();

    // Exact re-delivery: identical outcome, no further wallet calls.
    let second = issuer
        .engine
        .advance(rx, request)
        .await
        .expect("duplicate should replay");
    assert_eq!(first, second);
    assert_eq!(issuer.wallet.sign_calls(), signs_after_first);
    assert_eq!(second.state, ExchangeState::CredentialIssued);
}

#[tokio::test]
async fn test_duplicate_credential_delivery_stores_once() {
    let ledger = Arc::new(MemoryLedger::new());
    let holder = party("alice", 1, EngineConfig::default(), ledger.clone());
    let issuer = party("acme", 7, EngineConfig::default(), ledger.clone());
    ledger.register_definition(kyc_definition(&issuer.did, 7, false));

    let (hx, rx) = connect(&holder, &issuer).await.expect("connection");
    let offered = issuer
        .engine
        .advance(rx, Message::new(rx, 2, kyc_offer()))
        .await
        .expect("offer");
    let requested = holder
        .engine
        .advance(hx, relay(&offered.outgoing.unwrap(), hx, 3))
        .await
        .expect("request");
    let issued = issuer
        .engine
        .advance(rx, relay(&requested.outgoing.unwrap(), rx, 3))
        .await
        .expect("issue");

    let delivery = relay(&issued.outgoing.unwrap(), hx, 4);
    let first = holder
        .engine
        .advance(hx, delivery.clone())
        .await
        .expect("store");
    let second = holder
        .engine
        .advance(hx, delivery)
        .await
        .expect("duplicate should replay");

    assert_eq!(first, second);
    assert_eq!(holder.wallet.store_calls(), 1);
    assert_eq!(holder.wallet.credential_count(), 1);
}

#[tokio::test]
async fn test_same_seq_different_kind_rejected() {
    let ledger = Arc::new(MemoryLedger::new());
    let holder = party("alice", 1, EngineConfig::default(), ledger.clone());
    let issuer = party("acme", 7, EngineConfig::default(), ledger.clone());

    let (_hx, rx) = connect(&holder, &issuer).await.expect("connection");

    // Responder applied seq 1 (connection request); an offer re-using seq 1
    // is not a duplicate, it is a conflict.
    let conflict = issuer
        .engine
        .advance(rx, Message::new(rx, 1, kyc_offer()))
        .await
        .unwrap_err();
    assert!(matches!(
        conflict.root(),
        EngineError::InvalidTransition {
            kind: PayloadKind::CredentialOffer,
            ..
        }
    ));
}

#[tokio::test]
async fn test_stale_seq_rejected() {
    let ledger = Arc::new(MemoryLedger::new());
    let holder = party("alice", 1, EngineConfig::default(), ledger.clone());
    let issuer = party("acme", 7, EngineConfig::default(), ledger.clone());

    let (hx, _rx) = connect(&holder, &issuer).await.expect("connection");

    // Holder has applied up to seq 2; a seq-1 straggler is stale.
    let stale = holder
        .engine
        .advance(hx, Message::new(hx, 1, kyc_offer()))
        .await
        .unwrap_err();
    assert!(matches!(
        stale.root(),
        EngineError::InvalidTransition { .. }
    ));
}

#[tokio::test]
async fn test_seq_gap_rejected() {
    let ledger = Arc::new(MemoryLedger::new());
    let holder = party("alice", 1, EngineConfig::default(), ledger.clone());
    let issuer = party("acme", 7, EngineConfig::default(), ledger.clone());

    let (hx, _rx) = connect(&holder, &issuer).await.expect("connection");

    // Next expected seq is 3; skipping to 5 is malformed.
    let gapped = holder
        .engine
        .advance(hx, Message::new(hx, 5, kyc_offer()))
        .await
        .unwrap_err();
    assert!(matches!(
        gapped.root(),
        EngineError::MalformedMessage(_)
    ));
}
