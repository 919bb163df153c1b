//! Benchmarks for token chain operations and authorization.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use warrant::{Algorithm, Authorizer, BlockBuilder, ExecutionLimits, KeyPair, Warrant};

fn authority_block() -> BlockBuilder {
    let mut builder = BlockBuilder::new();
    builder
        .add_code(r#"user(1234); right("file1", "read"); right("file2", "read");"#)
        .expect("valid source");
    builder
}

fn benchmark_key_generation(c: &mut Criterion) {
    c.bench_function("keypair_generation_ed25519", |b| {
        b.iter(|| black_box(KeyPair::generate(Algorithm::Ed25519)))
    });
}

fn benchmark_token_creation(c: &mut Criterion) {
    let root = KeyPair::generate(Algorithm::Ed25519);
    c.bench_function("token_create", |b| {
        b.iter(|| black_box(Warrant::new(&root, authority_block()).unwrap()))
    });
}

fn benchmark_attenuation(c: &mut Criterion) {
    let root = KeyPair::generate(Algorithm::Ed25519);
    let token = Warrant::new(&root, authority_block()).unwrap();
    c.bench_function("token_attenuate", |b| {
        b.iter(|| {
            let mut builder = BlockBuilder::new();
            builder
                .add_code(r#"check if operation("read");"#)
                .expect("valid source");
            black_box(token.attenuate(builder).unwrap())
        })
    });
}

fn benchmark_verification(c: &mut Criterion) {
    let root = KeyPair::generate(Algorithm::Ed25519);
    let mut token = Warrant::new(&root, authority_block()).unwrap();
    for _ in 0..4 {
        let mut builder = BlockBuilder::new();
        builder
            .add_code(r#"check if operation("read");"#)
            .expect("valid source");
        token = token.attenuate(builder).unwrap();
    }
    let bytes = token.serialize();
    c.bench_function("token_verify_5_blocks", |b| {
        b.iter(|| black_box(Warrant::from_bytes(&bytes, root.public_key()).unwrap()))
    });
}

fn benchmark_authorization(c: &mut Criterion) {
    let root = KeyPair::generate(Algorithm::Ed25519);
    let mut builder = BlockBuilder::new();
    let facts: String = (0..50).map(|i| format!("member({i}, {}); ", i / 5)).collect();
    builder
        .add_code(&format!(
            "{facts}peer($a, $b) <- member($a, $g), member($b, $g);"
        ))
        .expect("valid source");
    let token = Warrant::new(&root, builder).unwrap();

    let mut authorizer = Authorizer::new();
    authorizer
        .add_code("allow if peer(1, 2);")
        .expect("valid source");
    authorizer.set_limits(ExecutionLimits {
        max_facts: Some(10_000),
        max_iterations: Some(100),
    });

    c.bench_function("authorize_fixpoint", |b| {
        b.iter(|| black_box(token.authorize(&authorizer).unwrap()))
    });
}

criterion_group!(
    benches,
    benchmark_key_generation,
    benchmark_token_creation,
    benchmark_attenuation,
    benchmark_verification,
    benchmark_authorization,
);
criterion_main!(benches);
