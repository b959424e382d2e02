// Merge throughput for causally ordered and adversarially ordered delivery

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use stitch::Document;
use stitch::Engine;
use stitch::Operation;
use stitch::RawOperation;
use stitch::crdt::primitives::DocId;
use stitch::crdt::validate::Validator;

const DOC: &str = "bench";

// =============================================================================
// Benchmark Helpers
// =============================================================================

/// Two clients typing their own runs after the root, with every fifth
/// character deleted. Returned in causal order.
fn typing_session(n: usize) -> Vec<RawOperation> {
    let mut ops = Vec::with_capacity(n + n / 5);
    let mut prev = [String::from("root"), String::from("root")];
    for i in 0..n {
        let client = i % 2;
        let id = format!("c{}-{:08}", client, i);
        let ch = char::from(b'a' + (i % 26) as u8);
        ops.push(RawOperation::insert(&id, DOC, &format!("client{}", client), ch, &prev[client]));
        if i % 5 == 4 {
            ops.push(RawOperation::delete(&format!("d{:08}", i), DOC, "client0", &id));
        }
        prev[client] = id;
    }
    return ops;
}

fn validated(raw: &[RawOperation]) -> Vec<Operation> {
    let validator = Validator::default();
    return raw.iter().filter_map(|op| validator.validate(DOC, op).ok()).collect();
}

fn apply_all(ops: &[Operation]) -> Document {
    let mut doc = Document::new(DocId::new(DOC));
    for op in ops {
        let _ = doc.apply(op.clone());
    }
    return doc;
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_delivery_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("delivery_order");
    for n in [1_000, 10_000] {
        let in_order = validated(&typing_session(n));
        let reversed: Vec<Operation> = in_order.iter().rev().cloned().collect();
        group.throughput(Throughput::Elements(in_order.len() as u64));

        group.bench_with_input(BenchmarkId::new("causal", n), &in_order, |b, ops| {
            b.iter(|| black_box(apply_all(ops).len()))
        });
        group.bench_with_input(BenchmarkId::new("reversed", n), &reversed, |b, ops| {
            b.iter(|| black_box(apply_all(ops).len()))
        });
    }
    group.finish();
}

fn bench_materialize(c: &mut Criterion) {
    let doc = apply_all(&validated(&typing_session(10_000)));
    c.bench_function("materialize_10k", |b| b.iter(|| black_box(doc.text())));
}

fn bench_engine_append(c: &mut Criterion) {
    let session = typing_session(1_000);
    c.bench_function("engine_append_1k", |b| {
        b.iter(|| {
            let engine = Engine::new();
            for op in &session {
                let _ = engine.append_operation(DOC, op);
            }
            black_box(engine.text(DOC).map(|text| text.len()).unwrap_or(0))
        })
    });
}

criterion_group!(benches, bench_delivery_order, bench_materialize, bench_engine_append);
criterion_main!(benches);
