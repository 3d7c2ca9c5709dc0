// SPDX-License-Identifier: MIT OR Apache-2.0

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;
use signet::core::{canonical_json, cid};

fn bench_canonicalization(c: &mut Criterion) {
    let small = json!({"invoice_id": "INV-1", "amount": 1000, "currency": "USD"});
    let nested = json!({
        "invoice_id": "INV-1",
        "lines": (0..50).map(|i| json!({
            "sku": format!("SKU-{i}"),
            "qty": i,
            "price": 19.99,
            "note": "héllo ☃",
        })).collect::<Vec<_>>(),
        "meta": {"z": [1, 2, 3], "a": null, "flag": true},
    });

    c.bench_function("canon_small_object", |b| {
        b.iter(|| canonical_json(black_box(&small)).unwrap())
    });
    c.bench_function("canon_nested_50_lines", |b| {
        b.iter(|| canonical_json(black_box(&nested)).unwrap())
    });
    c.bench_function("cid_nested_50_lines", |b| {
        b.iter(|| cid(black_box(&nested)).unwrap())
    });
}

criterion_group!(benches, bench_canonicalization);
criterion_main!(benches);
