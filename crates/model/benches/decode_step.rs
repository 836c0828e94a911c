//! Incremental decode-step throughput for each autoregressive variant.

use candle_core::{Device, Tensor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use model::{SourceBatch, Transformer, TransformerConfig};

fn bench_decode_step(c: &mut Criterion) {
    let device = Device::Cpu;
    let sentences: Vec<Vec<u32>> = (0..4).map(|row| (1..=24).map(|id| (id + row) % 500 + 1).collect()).collect();
    let batch = SourceBatch::from_sentences(&sentences, &device).expect("batch");

    let mut group = c.benchmark_group("decode_step");
    for kind in ["self-attention", "average-attention", "rnn"] {
        let config = TransformerConfig {
            dim_emb: 128,
            dim_ffn: 512,
            dim_aan: 512,
            heads: 4,
            enc_depth: 2,
            dec_depth: 2,
            dim_vocabs: vec![512, 512],
            decoder_autoreg: kind.into(),
            inference: true,
            ..TransformerConfig::default()
        };
        let model = Transformer::new(config, &device).expect("model");
        let contexts = model.encode(&[batch.clone()]).expect("encode");

        for &beam in &[1usize, 4] {
            let ids = Tensor::ones((beam, sentences.len(), 1), candle_core::DType::U32, &device).expect("ids");
            // Decode a short prefix so the step runs against a warm cache and a non-empty history.
            let (mut session, mut state) = model.start_session(contexts.clone()).expect("session");
            for _ in 0..8 {
                state = model.step(&mut session, &state, &ids, None).expect("prefix");
            }

            group.throughput(Throughput::Elements((beam * sentences.len()) as u64));
            group.bench_with_input(BenchmarkId::new(kind, format!("beam{beam}")), &ids, |b, ids| {
                b.iter(|| black_box(model.step(&mut session, &state, ids, None).expect("step")));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_decode_step);
criterion_main!(benches);
