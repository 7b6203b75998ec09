use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nbit_block_quant::{kernels::available_kernels, BlockQuantizer};
use rand::Rng;

fn random_weights(size: usize) -> Vec<f32> {
    let mut rng = rand::rng();
    (0..size).map(|_| rng.random_range(-1f32..1f32)).collect()
}

fn kernel_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Kernels");
    group.sample_size(20);
    group.warm_up_time(Duration::from_millis(200));

    let size = 1 << 16;
    let input = random_weights(size);
    let scale = 2.0 / 255.0;
    let zero_point = -1.0;
    let mut codes = vec![0u8; size];
    let mut restored = vec![0f32; size];
    group.throughput(Throughput::Elements(size as u64));

    for kernel in available_kernels() {
        group.bench_function(BenchmarkId::new("quantize", kernel.name()), |b| {
            b.iter(|| kernel.quantize_block(&input, scale, zero_point, &mut codes));
        });
        group.bench_function(BenchmarkId::new("dequantize", kernel.name()), |b| {
            b.iter(|| kernel.dequantize_block(&codes, scale, zero_point, &mut restored));
        });
    }
}

fn block_quantizer_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("BlockQuantizer");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(200));

    let weights = random_weights(1 << 16);
    group.throughput(Throughput::Elements(weights.len() as u64));

    for bit_width in [1u8, 2, 3, 4, 6, 8, 12, 16] {
        let quantizer = BlockQuantizer::new(bit_width, 128).unwrap();
        let (packed, codebook) = quantizer.quantize(&weights).unwrap();
        let mut out = vec![0u8; packed.len()];
        let mut restored = vec![0f32; weights.len()];

        group.bench_with_input(BenchmarkId::new("quantize", bit_width), &bit_width, |b, _| {
            b.iter(|| quantizer.quantize_into(&weights, &mut out).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("dequantize", bit_width), &bit_width, |b, _| {
            b.iter(|| {
                quantizer
                    .dequantize_into(&packed, &codebook, &mut restored)
                    .unwrap()
            });
        });
    }
}

criterion_group!(benches, kernel_benchmark, block_quantizer_benchmark);
criterion_main!(benches);
