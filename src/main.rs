// Plot reconstruction MSE of block quantization
use std::ops::Range;

use nbit_block_quant::{select_kernel, BlockQuantizer};

use plotters::prelude::*;
use rand::Rng;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("using {} kernel", select_kernel().name());

    // As bit width increases
    let mse = mse_as_bit_width_increases(16, 64)?;
    log::info!("mse by bit width: {mse:?}");
    draw_curve(
        "mse-bit-width.png",
        "MSE vs. Bit Width",
        "Bit Width",
        &mse,
        true,
    )?;

    // As block size increases
    let mse = mse_as_block_size_increases(4, 512)?;
    log::info!("mse by block size: {mse:?}");
    draw_curve(
        "mse-block-size.png",
        "MSE vs. Block Size (4 bit)",
        "Block Size",
        &mse,
        false,
    )?;

    Ok(())
}

fn draw_curve(
    path: &str,
    caption: &str,
    x_desc: &str,
    points: &[(f32, f32)],
    log_y: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Error drops by ~4x per extra bit, so the bit width curve is plotted as log10(MSE).
    let series: Vec<(f32, f32)> = points
        .iter()
        .map(|&(x, y)| if log_y { (x, y.max(f32::MIN_POSITIVE).log10()) } else { (x, y) })
        .collect();
    let (x_range, y_range) = (
        span(series.iter().map(|p| p.0)),
        span(series.iter().map(|p| p.1)),
    );
    let y_range = if log_y {
        y_range.start.floor()..y_range.end.ceil()
    } else {
        0.0..y_range.end * 1.1
    };

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 32))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(if log_y { "log10(MSE)" } else { "MSE" })
        .draw()?;
    chart.draw_series(LineSeries::new(series.iter().copied(), &BLUE).point_size(3))?;

    root.present()?;
    log::info!("wrote {path}");
    Ok(())
}

fn span(values: impl Iterator<Item = f32>) -> Range<f32> {
    let (lo, hi) = values.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if lo <= hi {
        lo..hi
    } else {
        0.0..1.0
    }
}

fn mean_squared_error(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Number of values must be equal");
    let n = a.len() as f32;
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x - y).powi(2))
        .sum::<f32>()
        / n
}

fn random_weights(size: usize, range: Range<f32>) -> Vec<f32> {
    let mut rng = rand::rng();
    (0..size).map(|_| rng.random_range(range.clone())).collect()
}

fn average_mse(quantizer: &BlockQuantizer, iterations: usize, size: usize) -> nbit_block_quant::Result<f32> {
    let mut sum = 0.0;
    for _ in 0..iterations {
        let weights = random_weights(size, -1.0..1.0);
        let (packed, codebook) = quantizer.quantize(&weights)?;
        let restored = quantizer.dequantize(&packed, &codebook)?;
        sum += mean_squared_error(&weights, &restored);
    }
    Ok(sum / iterations as f32)
}

fn mse_as_bit_width_increases(max_bit_width: u8, block_size: usize) -> nbit_block_quant::Result<Vec<(f32, f32)>> {
    assert!(max_bit_width >= 1);

    let iterations = 100;
    let size = 4096;

    (1..=max_bit_width)
        .map(|bit_width| {
            let quantizer = BlockQuantizer::new(bit_width, block_size)?;
            Ok((bit_width as f32, average_mse(&quantizer, iterations, size)?))
        })
        .collect()
}

fn mse_as_block_size_increases(bit_width: u8, max_block_size: usize) -> nbit_block_quant::Result<Vec<(f32, f32)>> {
    assert!(max_block_size >= 1);

    let iterations = 50;
    let size = 4096;

    std::iter::successors(Some(1usize), |b| Some(b * 2))
        .take_while(|&b| b <= max_block_size)
        .map(|block_size| {
            let quantizer = BlockQuantizer::new(bit_width, block_size)?;
            Ok((block_size as f32, average_mse(&quantizer, iterations, size)?))
        })
        .collect()
}
