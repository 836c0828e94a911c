use candle_core::{Device, Tensor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use layers::{
    activations::ActivationKind,
    dropout::Dropout,
    mlp::{FeedForward, FeedForwardConfig},
    norm::LayerNorm,
    process::{PostProcess, ProcessSequence, ProcessStage},
};

fn bench_ffn(c: &mut Criterion) {
    let device = Device::Cpu;
    let (beam, batch, len, hidden) = (4usize, 2usize, 16usize, 512usize);
    let input = Tensor::randn(0f32, 1.0, (beam, batch, len, hidden), &device).expect("input");
    let elements = (beam * batch * len * hidden) as u64;

    let mut group = c.benchmark_group("ffn");
    group.throughput(Throughput::Elements(elements));
    for &(label, activation) in &[("relu", ActivationKind::Relu), ("swish", ActivationKind::Swish)] {
        for depth in [2usize, 3] {
            let mut config = FeedForwardConfig::new(hidden, hidden * 4, activation);
            config.depth = depth;
            let ffn = FeedForward::new(config, &device).expect("ffn init");
            group.bench_with_input(BenchmarkId::new(label, depth), &input, |b, input| {
                b.iter(|| black_box(ffn.forward(black_box(input)).expect("forward")));
            });
        }
    }
    group.finish();

    let mut group = c.benchmark_group("process");
    group.throughput(Throughput::Elements(elements));
    let norm = LayerNorm::identity(hidden, &device).expect("norm");
    group.bench_function("layer_norm", |b| {
        b.iter(|| black_box(norm.forward(black_box(&input)).expect("norm")));
    });
    let ops = ProcessSequence::parse("dan", ProcessStage::Post).expect("ops");
    let post = PostProcess::new(ops, hidden, Dropout::new(0.1), &device).expect("post");
    group.bench_function("post_dan", |b| {
        b.iter(|| black_box(post.forward(black_box(&input), &input).expect("post")));
    });
    group.finish();
}

criterion_group!(benches, bench_ffn);
criterion_main!(benches);
