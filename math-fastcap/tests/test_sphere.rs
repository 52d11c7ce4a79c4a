//! Spherical conductors against closed-form capacitances

use std::f64::consts::PI;

use fastcap::mesh::icosphere;
use fastcap::{EPSILON0, LoadOptions, Problem};

fn relative_error(value: f64, expected: f64) -> f64 {
    (value - expected).abs() / expected.abs()
}

#[test]
fn test_isolated_sphere() {
    // C = 4 pi eps0 a
    let expected = 4.0 * PI * EPSILON0;
    let sphere = icosphere("ball", [0.0; 3], 1.0, 3).unwrap();

    let mut problem = Problem::new();
    problem.set_expansion_order(0).unwrap();
    problem.add(&sphere, &LoadOptions::default()).unwrap();
    let result = problem.solve().unwrap();

    assert_eq!(result.panel_count(), 1280);
    assert_eq!(result.expansion_order(), 4);
    assert!(result.tree_depth() >= 2);
    let c = result.matrix()[[0, 0]];
    assert!(
        relative_error(c, expected) < 0.04,
        "sphere capacitance {:.4e}, expected {:.4e}",
        c,
        expected
    );
}

#[test]
fn test_sphere_in_uniform_medium_scales_with_permittivity() {
    let sphere = icosphere("ball", [0.0; 3], 1.0, 2).unwrap();

    let mut vacuum = Problem::new();
    vacuum.add(&sphere, &LoadOptions::conductor(1.0)).unwrap();
    let c1 = vacuum.solve().unwrap().matrix()[[0, 0]];

    let mut oil = Problem::new();
    oil.add(&sphere, &LoadOptions::conductor(2.2)).unwrap();
    let c2 = oil.solve().unwrap().matrix()[[0, 0]];

    assert!(relative_error(c2, 2.2 * c1) < 1e-3);
}

#[test]
fn test_sphere_with_dielectric_shell() {
    // conductor of radius a inside a shell of permittivity eps up to radius b:
    // C = 4 pi eps0 / ((1/a - 1/b) / eps + 1/b)
    let (a, b, eps) = (1.0, 2.0, 4.0);
    let expected = 4.0 * PI * EPSILON0 / ((1.0 / a - 1.0 / b) / eps + 1.0 / b);

    let core = icosphere("core", [0.0; 3], a, 2).unwrap();
    let shell = icosphere("shell", [0.0; 3], b, 2).unwrap();

    let mut problem = Problem::with_title("coated sphere");
    problem.set_iter_tol(1e-3).unwrap();
    problem.add(&core, &LoadOptions::conductor(eps)).unwrap();
    problem
        .add(
            &shell,
            &LoadOptions::dielectric(1.0, eps).with_reference([0.0; 3], true),
        )
        .unwrap();

    let result = problem.solve().unwrap();
    assert_eq!(result.conductors(), ["core%GROUP1"]);
    let c = result.matrix()[[0, 0]];
    assert!(
        relative_error(c, expected) < 0.06,
        "coated sphere capacitance {:.4e}, expected {:.4e}",
        c,
        expected
    );

    // the shell raises the capacitance above the bare sphere
    assert!(c > 4.0 * PI * EPSILON0 * a);
}

#[test]
fn test_dielectric_orientation_by_reference_point() {
    let core = icosphere("core", [0.0; 3], 1.0, 2).unwrap();
    let shell = icosphere("shell", [0.0; 3], 2.0, 2).unwrap();

    let solve = |options: LoadOptions| {
        let mut problem = Problem::new();
        problem.set_iter_tol(1e-3).unwrap();
        problem.add(&core, &LoadOptions::conductor(3.0)).unwrap();
        problem.add(&shell, &options).unwrap();
        problem.solve().unwrap().matrix()[[0, 0]]
    };

    // outward winding and an inside reference point give the same normals
    let by_winding = solve(LoadOptions::dielectric(1.0, 3.0));
    let by_inside_point =
        solve(LoadOptions::dielectric(1.0, 3.0).with_reference([0.0; 3], true));
    assert!(relative_error(by_winding, by_inside_point) < 1e-12);
}
