//! Integration test: error taxonomy surfaced through `advance` and the
//! engine lifecycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use credex_core::{EngineConfig, ExchangeId, ExchangeState, Message, Role};
use credex_engine::{EngineError, LedgerAdapter, MemoryLedger};
use credex_integration_tests::{
    connect, kyc_definition, kyc_offer, kyc_proof_request, kyc_registry_id, party, relay,
    run_issuance, SlowLedger,
};

#[tokio::test]
async fn test_out_of_order_message_is_invalid_transition() {
    let ledger = Arc::new(MemoryLedger::new());
    let holder = party("alice", 1, EngineConfig::default(), ledger.clone());
    let issuer = party("acme", 7, EngineConfig::default(), ledger.clone());

    let (hx, _rx) = connect(&holder, &issuer).await.expect("connection");

    // Holder sits in ResponseReceived; a credential before any offer is
    // out of order. (Use the next expected seq so sequencing is not the
    // reason for rejection.)
    let premature = issuer
        .engine
        .advance(_rx, Message::new(_rx, 2, kyc_offer()))
        .await
        .expect("offer");
    let offer = premature.outgoing.unwrap();
    holder
        .engine
        .advance(hx, relay(&offer, hx, 3))
        .await
        .expect("offer received");

    // A second offer while one is already being processed. The error names
    // the exchange and the state it was left in.
    let doubled = holder
        .engine
        .advance(hx, relay(&offer, hx, 4))
        .await
        .unwrap_err();
    assert!(!doubled.is_retryable());
    match doubled {
        EngineError::Exchange {
            exchange,
            state,
            source,
        } => {
            assert_eq!(exchange, hx);
            assert_eq!(state, ExchangeState::OfferReceived);
            assert!(matches!(*source, EngineError::InvalidTransition { .. }));
        }
        other => panic!("expected exchange-scoped error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_exchange() {
    let ledger = Arc::new(MemoryLedger::new());
    let holder = party("alice", 1, EngineConfig::default(), ledger.clone());
    holder.engine.ready().await.expect("ready");

    let ghost = ExchangeId::generate();
    let result = holder
        .engine
        .advance(ghost, Message::new(ghost, 1, kyc_offer()))
        .await;
    assert!(matches!(result, Err(EngineError::UnknownExchange(id)) if id == ghost));
}

#[tokio::test]
async fn test_registry_capacity() {
    let ledger = Arc::new(MemoryLedger::new());
    let config = EngineConfig {
        max_live_exchanges: 1,
        ..EngineConfig::default()
    };
    let holder = party("alice", 1, config, ledger.clone());
    holder.engine.ready().await.expect("ready");

    let remote = credex_core::Did::from_parts("key", "bob");
    let first = holder
        .engine
        .create_exchange(Role::Initiator, remote.clone())
        .expect("first exchange");
    let second = holder.engine.create_exchange(Role::Initiator, remote.clone());
    assert!(matches!(
        second,
        Err(EngineError::ResourceExhausted { limit: 1 })
    ));

    // Releasing frees capacity.
    holder.engine.release(first).expect("release");
    holder
        .engine
        .create_exchange(Role::Initiator, remote)
        .expect("slot freed");
}

#[tokio::test]
async fn test_revoked_credential_blocks_presentation() {
    let ledger = Arc::new(MemoryLedger::new());
    let holder = party("alice", 1, EngineConfig::default(), ledger.clone());
    let issuer = party("acme", 7, EngineConfig::default(), ledger.clone());
    let verifier = party("bank", 3, EngineConfig::default(), ledger.clone());
    ledger.register_definition(kyc_definition(&issuer.did, 7, true));

    let (hx, rx) = connect(&holder, &issuer).await.expect("connection");
    run_issuance(&holder, &issuer, hx, rx).await.expect("issuance");

    // Revoke before the proof request is made.
    ledger.revoke(kyc_registry_id(), Utc::now());

    let (px, vx) = connect(&holder, &verifier).await.expect("connection");
    let asked = verifier
        .engine
        .advance(vx, Message::new(vx, 2, kyc_proof_request()))
        .await
        .expect("proof request");

    let refused = holder
        .engine
        .advance(px, relay(&asked.outgoing.unwrap(), px, 3))
        .await
        .unwrap_err();
    assert!(matches!(refused.root(), EngineError::RevokedCredential));
}

#[tokio::test]
async fn test_ledger_timeout_surfaces_adapter_timeout() {
    let backing = Arc::new(MemoryLedger::new());
    let issuer_did = credex_core::Did::from_parts("key", "acme");
    backing.register_definition(kyc_definition(&issuer_did, 7, false));
    let slow: Arc<dyn LedgerAdapter> =
        Arc::new(SlowLedger::new(Arc::clone(&backing), Duration::from_millis(200)));

    let config = EngineConfig {
        adapter_timeout_ms: 50,
        ..EngineConfig::default()
    };
    let holder = party("alice", 1, config.clone(), Arc::new(MemoryLedger::new()));
    let issuer = party("acme", 7, config, slow);

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

    // Issuing needs the definition from the (slow) ledger.
    let timed_out = issuer
        .engine
        .advance(rx, relay(&requested.outgoing.unwrap(), rx, 3))
        .await
        .unwrap_err();
    assert!(timed_out.is_retryable());
    assert!(matches!(
        timed_out.root(),
        EngineError::AdapterTimeout { .. }
    ));

    // The failed transition left no trace: the exchange still accepts the
    // same message once the ledger recovers.
    assert_eq!(
        issuer.engine.snapshot(rx).await.unwrap().state,
        ExchangeState::OfferSent
    );
}

#[tokio::test]
async fn test_tampered_envelope_signature_rejected() {
    let ledger = Arc::new(MemoryLedger::new());
    let holder = party("alice", 1, EngineConfig::default(), ledger.clone());
    let issuer = party("acme", 7, EngineConfig::default(), ledger.clone());

    let (hx, _rx) = connect(&holder, &issuer).await.expect("connection");

    // After the connection the holder knows the issuer's verkey; a signed
    // message whose signature does not match is rejected.
    let forged = Message::new(hx, 3, kyc_offer()).with_signature(vec![0u8; 64]);
    let result = holder.engine.advance(hx, forged).await.unwrap_err();
    assert!(matches!(
        result.root(),
        EngineError::CryptoVerificationFailed { .. }
    ));
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_closes_engine() {
    let ledger = Arc::new(MemoryLedger::new());
    let holder = party("alice", 1, EngineConfig::default(), ledger.clone());
    let issuer = party("acme", 7, EngineConfig::default(), ledger.clone());
    ledger.register_definition(kyc_definition(&issuer.did, 7, false));

    let (hx, rx) = connect(&holder, &issuer).await.expect("connection");
    run_issuance(&holder, &issuer, hx, rx).await.expect("issuance");
    assert_eq!(holder.wallet.credential_count(), 1);

    // erase_state wipes the wallet's credentials.
    holder.engine.shutdown(true).await.expect("shutdown");
    assert_eq!(holder.wallet.credential_count(), 0);
    assert_eq!(holder.engine.live_exchanges(), 0);

    // Second shutdown is a no-op.
    holder.engine.shutdown(true).await.expect("repeat shutdown");

    // Everything else now fails closed.
    let remote = credex_core::Did::from_parts("key", "bob");
    assert!(matches!(
        holder.engine.create_exchange(Role::Initiator, remote),
        Err(EngineError::EngineClosed)
    ));
    assert!(matches!(
        holder.engine.snapshot(hx).await,
        Err(EngineError::EngineClosed)
    ));
}

#[tokio::test]
async fn test_ready_reports_missing_key() {
    let ledger = Arc::new(MemoryLedger::new());
    // No key installed under the configured ref.
    let wallet = Arc::new(credex_engine::MemoryWallet::new());
    let engine = credex_engine::CredexEngine::start(
        EngineConfig::default(),
        credex_core::Did::from_parts("key", "empty"),
        wallet as Arc<dyn credex_engine::WalletAdapter>,
        ledger as Arc<dyn LedgerAdapter>,
    );
    assert!(matches!(
        engine.ready().await,
        Err(EngineError::WalletError(_))
    ));
}

#[tokio::test]
async fn test_message_addressed_to_other_exchange_rejected() {
    let ledger = Arc::new(MemoryLedger::new());
    let holder = party("alice", 1, EngineConfig::default(), ledger.clone());
    holder.engine.ready().await.expect("ready");

    let remote = credex_core::Did::from_parts("key", "bob");
    let a = holder
        .engine
        .create_exchange(Role::Initiator, remote.clone())
        .expect("a");
    let b = holder
        .engine
        .create_exchange(Role::Initiator, remote)
        .expect("b");

    let misaddressed = Message::new(b, 1, kyc_offer());
    let result = holder.engine.advance(a, misaddressed).await;
    assert!(matches!(result, Err(EngineError::MalformedMessage(_))));
}
