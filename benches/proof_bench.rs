use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use p4p_aggregation::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn setup(iterations: usize, rng: &mut ChaCha20Rng) -> ProtocolContext {
    let group = GroupParameters::generate(512, DEFAULT_GENERATOR_SEED, rng).unwrap();
    let config = ProtocolConfig::new(10, 1_000_003, 20, iterations).unwrap();
    ProtocolContext::new(config, group).unwrap()
}

fn bench_l2_norm_proof(c: &mut Criterion) {
    let mut rng = ChaCha20Rng::seed_from_u64(42);
    let mut group = c.benchmark_group("l2_norm_proof");
    group.sample_size(10);

    for &iterations in &[10usize, 50] {
        let ctx = setup(iterations, &mut rng);
        let matrix = ChallengeGenerator::from_config(ctx.config())
            .unwrap()
            .generate(&mut rng);
        let data = simulation::generate_user_vector(&ctx, true, &mut rng);
        let shares = split(&data, ctx.field_modulus(), &mut rng).unwrap();

        group.bench_with_input(BenchmarkId::new("prove", iterations), &iterations, |b, _| {
            b.iter(|| {
                let proof = ProofBuilder::new(black_box(&ctx))
                    .shares(&shares)
                    .challenge(&matrix)
                    .build(&mut rng)
                    .unwrap();
                black_box(proof);
            });
        });

        let proof = ProofBuilder::new(&ctx)
            .shares(&shares)
            .challenge(&matrix)
            .build(&mut rng)
            .unwrap();
        let forwarded = peer_verify(&ctx, proof.peer(), shares.peer_share(), &matrix).unwrap();

        group.bench_with_input(BenchmarkId::new("peer_verify", iterations), &iterations, |b, _| {
            b.iter(|| {
                let result = peer_verify(black_box(&ctx), proof.peer(), shares.peer_share(), &matrix);
                black_box(result)
            });
        });

        group.bench_with_input(BenchmarkId::new("server_verify", iterations), &iterations, |b, _| {
            b.iter(|| {
                let result = server_verify(
                    black_box(&ctx),
                    proof.server(),
                    &forwarded,
                    shares.server_share(),
                    &matrix,
                );
                black_box(result)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_l2_norm_proof);
criterion_main!(benches);
