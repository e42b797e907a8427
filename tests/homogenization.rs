use approx::assert_relative_eq;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ndarray::Array2;

use conduct2d::sim::{KappaRef, SolverConfig, SolverScheme};
use conduct2d::{
    HomogConfig, HomogError, InMemoryDataset, MicrostructureSource, PhaseMask, SimContext,
    SimWarning, SimulationRequest, simulate,
};

fn context(n: usize) -> SimContext {
    SimContext::new(HomogConfig::default().with_grid_size(n))
}

fn checkerboard(n: usize, block: usize) -> PhaseMask {
    PhaseMask::new(Array2::from_shape_fn((n, n), |(i, j)| {
        u8::from((i / block + j / block) % 2 == 1)
    }))
    .unwrap()
}

/// Conductive rows `0..rows`: layers parallel to the x axis.
fn horizontal_stripe(n: usize, rows: usize) -> PhaseMask {
    PhaseMask::new(Array2::from_shape_fn((n, n), |(i, _)| u8::from(i < rows))).unwrap()
}

fn pgm(n: usize, value: impl Fn(usize, usize) -> u8) -> Vec<u8> {
    let mut text = format!("P2\n{n} {n}\n255\n");
    for i in 0..n {
        let row: Vec<String> = (0..n).map(|j| value(i, j).to_string()).collect();
        text.push_str(&row.join(" "));
        text.push('\n');
    }
    text.into_bytes()
}

#[test]
fn test_identical_phases_give_identity_tensor() {
    let ctx = context(24).with_dataset(InMemoryDataset::synthetic(3, 24, 11).unwrap());
    for id in 0..3 {
        let request =
            SimulationRequest::from_source(&ctx, &MicrostructureSource::Dataset { id }, 1.0, 25.0)
                .unwrap();
        let p = simulate(&ctx, &request).unwrap().properties;
        assert_relative_eq!(p.reuss, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.voigt, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.kappa_eff[0][0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(p.kappa_eff[1][1], 1.0, epsilon = 1e-10);
        assert!(p.kappa_eff[0][1].abs() < 1e-10);
        assert_relative_eq!(p.kappa_alpha, 1.0, epsilon = 1e-10);
    }
}

#[test]
fn test_eigenvalues_stay_within_bounds() {
    let mut config = HomogConfig::default().with_grid_size(24);
    config.solver.tolerance = 1e-9;
    let ctx = SimContext::new(config).with_dataset(InMemoryDataset::synthetic(4, 24, 5).unwrap());
    for id in 0..4 {
        for kappa1 in [0.1, 5.0, 50.0] {
            let request = SimulationRequest::from_source(
                &ctx,
                &MicrostructureSource::Dataset { id },
                kappa1,
                60.0,
            )
            .unwrap();
            let result = simulate(&ctx, &request).unwrap();
            let p = &result.properties;
            assert!(p.vol_frac > 0.0 && p.vol_frac < 1.0);
            assert!(p.reuss <= p.voigt);
            assert!(
                p.within_bounds(),
                "sample {id}, kappa1 {kappa1}: {} <= {:?} <= {}",
                p.reuss,
                p.eig_kappa,
                p.voigt
            );
            assert!(result.solver.iter().all(|r| r.converged()));
        }
    }
}

#[test]
fn test_one_missing_pixel() {
    let n = 16;
    let mut cells = Array2::<u8>::ones((n, n));
    cells[[7, 9]] = 0;
    let mask = PhaseMask::new(cells).unwrap();
    let result = simulate(&context(n), &SimulationRequest::new(mask, 3.0, 0.0)).unwrap();
    assert_relative_eq!(result.properties.vol_frac, 1.0 - 1.0 / (n * n) as f64);
    assert!(result.properties.within_bounds());
}

#[test]
fn test_degenerate_masks_are_rejected() {
    for rows in [["000", "000", "000"], ["111", "111", "111"]] {
        assert!(matches!(
            PhaseMask::from_rows(&rows),
            Err(HomogError::DegenerateMicrostructure { .. })
        ));
    }

    let ctx = context(8);
    for level in [0, 255] {
        let source = MicrostructureSource::Image {
            bytes: pgm(4, |_, _| level),
        };
        let err = SimulationRequest::from_source(&ctx, &source, 2.0, 0.0).unwrap_err();
        assert!(matches!(err, HomogError::DegenerateMicrostructure { .. }), "{err}");
    }
}

#[test]
fn test_invalid_parameters_are_rejected() {
    let ctx = context(8);
    let mask = checkerboard(8, 2);
    for (kappa1, alpha) in [(0.0, 0.0), (-2.0, 45.0), (2.0, -1.0), (2.0, 91.0), (2.0, f64::NAN)] {
        let err = simulate(&ctx, &SimulationRequest::new(mask.clone(), kappa1, alpha)).unwrap_err();
        assert!(matches!(err, HomogError::InvalidParameter { .. }), "{err}");
    }
}

#[test]
fn test_simulate_is_deterministic() {
    let ctx = context(20).with_dataset(InMemoryDataset::synthetic(2, 20, 42).unwrap());
    let request =
        SimulationRequest::from_source(&ctx, &MicrostructureSource::Dataset { id: 1 }, 8.0, 33.0)
            .unwrap();
    let a = simulate(&ctx, &request).unwrap();
    let b = simulate(&ctx, &request).unwrap();
    assert_eq!(a.properties, b.properties);
    assert_eq!(a.temp0, b.temp0);
    assert_eq!(a.temp1, b.temp1);
    assert_eq!(a.flux_norm_alpha, b.flux_norm_alpha);
    assert_eq!(a.solver, b.solver);
}

#[test]
fn test_checkerboard_with_identical_phases() {
    let result = simulate(&context(16), &SimulationRequest::new(checkerboard(16, 4), 1.0, 0.0))
        .unwrap();
    let p = &result.properties;
    assert_eq!(p.vol_frac, 0.5);
    assert_relative_eq!(p.reuss, 1.0);
    assert_relative_eq!(p.voigt, 1.0);
    assert_relative_eq!(p.eig_kappa[0], 1.0, epsilon = 1e-10);
    assert_relative_eq!(p.eig_kappa[1], 1.0, epsilon = 1e-10);
}

#[test]
fn test_checkerboard_is_isotropic() {
    let result = simulate(&context(16), &SimulationRequest::new(checkerboard(16, 4), 5.0, 0.0))
        .unwrap();
    let p = &result.properties;
    assert_relative_eq!(p.kappa_eff[0][0], p.kappa_eff[1][1], max_relative = 1e-5);
    assert!(p.within_bounds());
}

#[test]
fn test_stripe_reaches_voigt_along_and_reuss_across() {
    let n = 20;
    let mask = horizontal_stripe(n, 6);
    let ctx = context(n);

    let along = simulate(&ctx, &SimulationRequest::new(mask.clone(), 10.0, 0.0)).unwrap();
    let p = &along.properties;
    assert_relative_eq!(p.vol_frac, 0.3, epsilon = 1e-12);
    assert_relative_eq!(p.kappa_alpha, p.voigt, max_relative = 1e-9);

    let across = simulate(&ctx, &SimulationRequest::new(mask.clone(), 10.0, 90.0)).unwrap();
    let p = &across.properties;
    assert_relative_eq!(p.kappa_alpha, p.reuss, max_relative = 1e-5);
    assert_relative_eq!(p.eig_kappa[0], p.reuss, max_relative = 1e-5);
    assert_relative_eq!(p.eig_kappa[1], p.voigt, max_relative = 1e-9);

    // Superposition: the diagonal direction sees the mean of both.
    let diagonal = simulate(&ctx, &SimulationRequest::new(mask, 10.0, 45.0)).unwrap();
    let p = &diagonal.properties;
    assert_relative_eq!(p.kappa_alpha, 0.5 * (p.reuss + p.voigt), max_relative = 1e-5);
}

#[test]
fn test_dataset_id_out_of_range() {
    let ctx = context(16).with_dataset(InMemoryDataset::synthetic(3, 16, 0).unwrap());
    let err =
        SimulationRequest::from_source(&ctx, &MicrostructureSource::Dataset { id: 3 }, 2.0, 0.0)
            .unwrap_err();
    assert_eq!(err, HomogError::OutOfRange { id: 3, count: 3 });
}

#[test]
fn test_drawing_payload_is_resampled() {
    let bytes = pgm(4, |_, j| if j < 2 { 255 } else { 0 });
    let payload = format!("data:image/x-portable-graymap;base64,{}", STANDARD.encode(bytes));
    let ctx = context(8);
    let request =
        SimulationRequest::from_source(&ctx, &MicrostructureSource::Drawing { payload }, 4.0, 0.0)
            .unwrap();
    assert_eq!(request.mask.size(), 8);
    let result = simulate(&ctx, &request).unwrap();
    assert_eq!(result.properties.vol_frac, 0.5);
    // Vertical layers: loading along x crosses them in series.
    assert_relative_eq!(result.properties.kappa_alpha, result.properties.reuss, max_relative = 1e-5);
    assert!(result.warnings.is_empty());
}

#[test]
fn test_png_canvas_goes_through_the_default_decoder() {
    // Opaque white strokes on the top third of a 12x12 RGBA canvas.
    let canvas = image::RgbaImage::from_fn(12, 12, |_, y| {
        if y < 4 {
            image::Rgba([255, 255, 255, 255])
        } else {
            image::Rgba([0, 0, 0, 255])
        }
    });
    let mut bytes = std::io::Cursor::new(Vec::new());
    canvas.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    let payload = format!("data:image/png;base64,{}", STANDARD.encode(bytes.into_inner()));

    let ctx = context(6);
    let request =
        SimulationRequest::from_source(&ctx, &MicrostructureSource::Drawing { payload }, 5.0, 0.0)
            .unwrap();
    assert_eq!(request.mask.size(), 6);
    let result = simulate(&ctx, &request).unwrap();
    assert_relative_eq!(result.properties.vol_frac, 1.0 / 3.0, epsilon = 1e-12);
    // Horizontal layers: loading along x runs through them in parallel.
    assert_relative_eq!(result.properties.kappa_alpha, result.properties.voigt, max_relative = 1e-5);
}

#[test]
fn test_schemes_and_references_agree() {
    let mask = checkerboard(16, 4);
    let baseline = simulate(&context(16), &SimulationRequest::new(mask.clone(), 4.0, 0.0))
        .unwrap()
        .properties;
    for (scheme, kappa_ref) in [
        (SolverScheme::ConjugateGradient, KappaRef::GeometricMean),
        (SolverScheme::ConjugateGradient, KappaRef::Matrix),
        (SolverScheme::FixedPoint, KappaRef::ArithmeticMean),
    ] {
        let config = HomogConfig {
            grid_size: 16,
            solver: SolverConfig {
                scheme,
                kappa_ref,
                tolerance: 1e-9,
                max_iterations: 20_000,
                ..SolverConfig::default()
            },
            ..HomogConfig::default()
        };
        let p = simulate(&SimContext::new(config), &SimulationRequest::new(mask.clone(), 4.0, 0.0))
            .unwrap()
            .properties;
        assert_relative_eq!(p.kappa_eff[0][0], baseline.kappa_eff[0][0], max_relative = 1e-5);
    }
}

#[test]
fn test_low_fraction_warns_but_solves() {
    let n = 32;
    let mut cells = Array2::<u8>::zeros((n, n));
    cells[[0, 0]] = 1;
    cells[[0, 1]] = 1;
    let ctx = context(n).with_dataset(InMemoryDataset::new(vec![PhaseMask::new(cells).unwrap()]));
    let request =
        SimulationRequest::from_source(&ctx, &MicrostructureSource::Dataset { id: 0 }, 2.0, 0.0)
            .unwrap();
    let result = simulate(&ctx, &request).unwrap();
    assert!(matches!(
        result.warnings.as_slice(),
        [SimWarning::StiffVolumeFraction { .. }]
    ));
}
