// SPDX-License-Identifier: MIT OR Apache-2.0

//! The full verifier story: run exchanges through the HTTP surface, fetch
//! the published JWKS like an external verifier would, export the chain,
//! and check everything offline — hashes, linkage, signatures, bundle CID.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use signet::config::{ReservedConfig, SignetConfig, TenantConfig};
use signet::core::ExportBundle;
use signet::daemon::{StateParts, build_app, build_state};
use signet::hel::StaticResolver;
use signet::metering::{LogSink, metering_channel};
use signet::signer::{JwkSet, SignetSigner, verify_bundle, verify_receipt_signature};
use signet::store::MemoryStorage;
use tower::ServiceExt;

const SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
const API_KEY: &str = "sk_live_acme";
const TRACE: &str = "7b1e9c2a-8d3f-4a6b-9c1d-2e5f8a7b6c4d";

fn verifier_app() -> Router {
    let mut tenants = BTreeMap::new();
    tenants.insert(
        API_KEY.to_string(),
        TenantConfig {
            tenant_id: "acme".into(),
            allowed_hosts: vec!["*.partner.com".into()],
            fallback_enabled: false,
            fu_monthly_limit: None,
            vex_billing_item: None,
            fu_billing_item: None,
        },
    );
    let config = SignetConfig {
        tenants,
        ..SignetConfig::default()
    };
    let (billing, flusher) = metering_channel(64, Arc::new(LogSink), Duration::from_secs(3600));
    tokio::spawn(flusher.run());
    let state = build_state(StateParts {
        config,
        reserved: ReservedConfig::default(),
        config_path: None,
        storage: Arc::new(MemoryStorage::new()),
        resolver: Arc::new(StaticResolver::new()),
        repair: None,
        signer: SignetSigner::from_seed_hex(SEED, "prod-2026-08").unwrap(),
        billing,
    });
    build_app(state)
}

async fn json_of(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn submit(trace: &str, idem: &str, invoice: &str, amount: i64) -> Request<Body> {
    let args = format!(
        r#"{{"invoice_id":"{invoice}","amount":{amount},"currency":"USD"}}"#
    );
    let body = json!({
        "payload_type": "openai.tooluse.invoice.v1",
        "target_type": "invoice.iso20022.v1",
        "trace_id": trace,
        "payload": {"tool_calls": [{"function": {"arguments": args}}]},
    });
    Request::builder()
        .method("POST")
        .uri("/v1/exchange")
        .header("content-type", "application/json")
        .header("x-signet-api-key", API_KEY)
        .header("x-signet-idempotency-key", idem)
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn exported_chain_verifies_offline_and_detects_tampering() {
    let app = verifier_app();

    // Build a three-hop chain through the public API.
    for (i, amount) in [1000, 2000, 3000].iter().enumerate() {
        let response = app
            .clone()
            .oneshot(submit(TRACE, &format!("idem-{i}"), "INV-7", *amount))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // A verifier fetches the key set the same way any client would.
    let jwks_response = app
        .clone()
        .oneshot(
            Request::get("/.well-known/jwks.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let jwks: JwkSet = serde_json::from_value(json_of(jwks_response).await).unwrap();
    assert!(jwks.contains("prod-2026-08"));

    // Export the chain.
    let export_response = app
        .clone()
        .oneshot(
            Request::get(format!("/v1/receipts/export/{TRACE}"))
                .header("x-signet-api-key", API_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(export_response.status(), StatusCode::OK);
    let header_cid = export_response
        .headers()
        .get("x-odin-response-cid")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let bundle: ExportBundle = serde_json::from_value(json_of(export_response).await).unwrap();

    // Offline verification: bundle CID, chain hashes and linkage, and
    // every receipt signature, from nothing but the bundle and the JWKS.
    assert_eq!(bundle.bundle_cid, header_cid);
    assert_eq!(bundle.chain.len(), 3);
    verify_bundle(&jwks, &bundle).unwrap();
    signet::core::verify_chain(&bundle.chain).unwrap();
    for receipt in &bundle.chain {
        verify_receipt_signature(&jwks, receipt).unwrap();
        assert!(receipt.verify_hash());
    }
    assert_eq!(bundle.chain[0].prev_receipt_hash, None);
    assert_eq!(
        bundle.chain[1].prev_receipt_hash.as_deref(),
        Some(bundle.chain[0].receipt_hash.as_str())
    );

    // Any single mutated byte breaks verification at that receipt.
    let mut tampered = bundle.clone();
    tampered.chain[1].canon = tampered.chain[1].canon.replace("2000", "2001");
    assert!(verify_bundle(&jwks, &tampered).is_err());
    assert!(signet::core::verify_chain(&tampered.chain).is_err());
}
