use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mzwavelet::averagine::lambda;
use mzwavelet::transform::transform;
use mzwavelet::{
    AveragineModel, CandidateDetector, IntegrationRule, IsotopeWaveletFeatureFinder,
    IsotopeWaveletParams, ScanWindow, ScanWorkspace, Spectrum,
};

fn synthetic_scan(index: usize, scale: f64) -> Spectrum {
    let step = 0.005;
    let (lo, hi) = (400.0, 1200.0);
    let n = ((hi - lo) / step) as usize;
    let mzs: Vec<f64> = (0..n).map(|i| lo + i as f64 * step).collect();
    let mut intensities = vec![5.0f64; n];
    for (j, charge) in [(0usize, 1), (1, 2), (2, 3), (3, 2), (4, 1)] {
        let mono = 450.0 + j as f64 * 150.0;
        let lam = lambda(mono * charge as f64);
        let mut relative = 1.0;
        for k in 0..4 {
            if k > 0 {
                relative *= lam / k as f64;
            }
            let center = mono + k as f64 * 1.00235 / charge as f64;
            let height = 1e4 * scale * relative;
            let first = ((center - 0.05 - lo) / step) as usize;
            for i in first..(first + 20).min(n) {
                intensities[i] += height * (-0.5 * ((mzs[i] - center) / 0.01).powi(2)).exp();
            }
        }
    }
    let intensities: Vec<f32> = intensities.into_iter().map(|v| v as f32).collect();
    Spectrum::from_arrays(&mzs, &intensities, index as f64, index).unwrap()
}

fn transform_scan(c: &mut Criterion) {
    let scan = synthetic_scan(0, 1.0);
    let model = AveragineModel::new(400.0, 1200.0, 3);
    c.bench_function("transform_trapezoid", |b| {
        b.iter(|| transform(black_box(&scan), 2, IntegrationRule::Trapezoid, &model))
    });
    c.bench_function("transform_riemann", |b| {
        b.iter(|| transform(black_box(&scan), 2, IntegrationRule::Riemann, &model))
    });
}

fn detect_scan(c: &mut Criterion) {
    let scan = synthetic_scan(0, 1.0);
    let model = AveragineModel::new(400.0, 1200.0, 3);
    let detector = CandidateDetector::new(3, -1.0, false, IntegrationRule::Trapezoid);
    let mut window = ScanWindow::new(IntegrationRule::Trapezoid);
    window.initialize_scan(&scan, &model);
    let mut workspace = ScanWorkspace::new();
    c.bench_function("detect_charge_2", |b| {
        b.iter(|| detector.detect(&window, black_box(&scan), 2, &mut workspace))
    });
}

fn find_features(c: &mut Criterion) {
    let scans: Vec<Spectrum> = [0.2, 0.6, 1.0, 0.7, 0.3]
        .into_iter()
        .enumerate()
        .map(|(i, scale)| synthetic_scan(i, scale))
        .collect();
    let params = IsotopeWaveletParams::default()
        .with_mz_range(400.0, 1200.0)
        .with_rt_votes_cutoff(3);
    let finder = IsotopeWaveletFeatureFinder::new(params).unwrap();
    c.bench_function("find_features", |b| {
        b.iter(|| finder.find_features(black_box(&scans)).unwrap())
    });
    c.bench_function("find_features_chunked", |b| {
        b.iter(|| finder.find_features_chunked(black_box(&scans), 2).unwrap())
    });
}

criterion_group!(benches, transform_scan, detect_scan, find_features);
criterion_main!(benches);
