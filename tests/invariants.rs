use approx::assert_relative_eq;
use nalgebra::{Point3, Point4, Vector3};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use surfo::prelude::*;

fn sample_params(domain: (f64, f64), samples: usize) -> Vec<f64> {
    (0..=samples)
        .map(|i| domain.0 + (domain.1 - domain.0) * i as f64 / samples as f64)
        .collect()
}

fn assert_surfaces_relative_eq(a: &NurbsSurface<f64>, b: &NurbsSurface<f64>, epsilon: f64) {
    assert_eq!(a.u_degree(), b.u_degree());
    assert_eq!(a.v_degree(), b.v_degree());
    assert_relative_eq!(a.u_knots().as_slice(), b.u_knots().as_slice(), epsilon = epsilon);
    assert_relative_eq!(a.v_knots().as_slice(), b.v_knots().as_slice(), epsilon = epsilon);
    for (ra, rb) in a.control_points().iter().zip(b.control_points().iter()) {
        for (pa, pb) in ra.iter().zip(rb.iter()) {
            assert_relative_eq!(pa, pb, epsilon = epsilon);
        }
    }
}

fn assert_sizing(surface: &NurbsSurface<f64>) {
    assert_eq!(
        surface.u_knots().len(),
        surface.control_points().len() + surface.u_degree() + 1
    );
    assert_eq!(
        surface.v_knots().len(),
        surface.control_points()[0].len() + surface.v_degree() + 1
    );
    assert!(surface.u_knots().is_valid());
    assert!(surface.v_knots().is_valid());
    assert!(surface
        .control_points()
        .iter()
        .all(|row| row.iter().all(|p| p.w > 0.)));
}

/// Bi-quadratic rational patch over the unit square with a heavy center.
fn biquadratic_patch() -> NurbsSurface<f64> {
    let knots = vec![0., 0., 0., 1., 1., 1.];
    let grid = (0..3)
        .map(|i| {
            (0..3)
                .map(|j| {
                    let p = Point3::new(i as f64 * 0.5, j as f64 * 0.5, 0.);
                    let w = if i == 1 && j == 1 { 2.0 } else { 1.0 };
                    homogenize(&p, w)
                })
                .collect()
        })
        .collect();
    NurbsSurface::try_new(2, 2, knots.clone(), knots, grid).unwrap()
}

fn quarter_cylinder() -> NurbsSurface<f64> {
    NurbsSurface::try_cylinder(
        &Point3::origin(),
        &Vector3::x(),
        &Vector3::y(),
        0.,
        FRAC_PI_2,
        1.,
        2.,
    )
    .unwrap()
}

#[test]
fn s1_evaluation_of_a_biquadratic_rational_patch() {
    let patch = biquadratic_patch();
    assert_sizing(&patch);

    let p = patch.point_at(0.5, 0.5);
    assert_relative_eq!(p, Point3::new(0.5, 0.5, 0.), epsilon = 1e-10);

    let derivs = patch.rational_derivatives(0.5, 0.5, 1);
    assert!(derivs[1][0].x > 0.);
    assert_relative_eq!(derivs[0][0].y, 0.5, epsilon = 1e-10);
}

#[test]
fn s2_knot_insertion_saturates_at_degree_multiplicity() {
    // degree 3 in u with an interior knot of multiplicity 2
    let u_knots = vec![0., 0., 0., 0., 0.5, 0.5, 1., 1., 1., 1.];
    let v_knots = vec![0., 0., 1., 1.];
    let grid = (0..6)
        .map(|i| {
            (0..2)
                .map(|j| Point4::new(i as f64, j as f64, ((i + j) % 3) as f64, 1.))
                .collect()
        })
        .collect();
    let patch = NurbsSurface::try_new(3, 1, u_knots, v_knots, grid).unwrap();

    let inserted = patch.try_insert_knot(0.5, 1, UVDirection::U).unwrap();
    assert_eq!(inserted.u_knots().len(), patch.u_knots().len() + 1);
    assert_eq!(
        inserted.control_points().len(),
        patch.control_points().len() + 1
    );
    assert_sizing(&inserted);
    for u in sample_params((0., 1.), 16) {
        assert_relative_eq!(
            patch.point_at(u, 0.5),
            inserted.point_at(u, 0.5),
            epsilon = 1e-10
        );
    }

    // multiplicity now equals the degree: inserting again changes nothing
    let saturated = inserted.try_insert_knot(0.5, 1, UVDirection::U).unwrap();
    assert_surfaces_relative_eq(&saturated, &inserted, 0.);
}

#[test]
fn s3_bilinear_patch() {
    let patch = NurbsSurface::bilinear(
        &Point3::new(0., 0., 0.),
        &Point3::new(1., 0., 0.),
        &Point3::new(1., 1., 0.),
        &Point3::new(0., 1., 0.),
    );
    assert_sizing(&patch);
    assert_eq!(patch.u_degree(), 3);
    assert_eq!(patch.u_knots().as_slice(), &[0., 0., 0., 0., 1., 1., 1., 1.]);
    assert_eq!(patch.v_knots().as_slice(), &[0., 0., 0., 0., 1., 1., 1., 1.]);
    assert_relative_eq!(
        patch.point_at(0.25, 0.75),
        Point3::new(0.25, 0.75, 0.),
        epsilon = 1e-10
    );
}

#[test]
fn s4_cylindrical_quarter_surface() {
    let cylinder = quarter_cylinder();
    assert_sizing(&cylinder);
    assert_eq!(cylinder.u_degree(), 2);
    assert_eq!(cylinder.v_degree(), 2);

    let sqrt2_half = 2.0_f64.sqrt() / 2.;
    assert_relative_eq!(
        cylinder.point_at(0.5, 0.5),
        Point3::new(sqrt2_half, sqrt2_half, 1.),
        epsilon = 1e-10
    );

    // the fully translated row sits at u = 0
    assert_relative_eq!(
        cylinder.point_at(0., 0.),
        Point3::new(1., 0., 2.),
        epsilon = 1e-10
    );
    assert_relative_eq!(
        cylinder.point_at(1., 1.),
        Point3::new(0., 1., 0.),
        epsilon = 1e-10
    );

    // every surface point lies on the cylinder of radius 1
    for u in sample_params((0., 1.), 8) {
        for v in sample_params((0., 1.), 8) {
            let p = cylinder.point_at(u, v);
            assert_relative_eq!((p.x * p.x + p.y * p.y).sqrt(), 1., epsilon = 1e-10);
        }
    }
}

#[test]
fn s5_inverse_projection_round_trip() {
    let cylinder = quarter_cylinder();
    let target = Point3::new(0., 1., 2.);

    let (u, v) = cylinder.find_closest_parameter(&target).unwrap();
    assert_relative_eq!(cylinder.point_at(u, v), target, epsilon = 1e-4);
    assert_relative_eq!(u, 0., epsilon = 1e-6);
    assert_relative_eq!(v, 1., epsilon = 1e-6);
}

#[test]
fn inverse_projection_of_an_exterior_point() {
    let square = NurbsSurface::bilinear(
        &Point3::new(0., 0., 0.),
        &Point3::new(1., 0., 0.),
        &Point3::new(1., 1., 0.),
        &Point3::new(0., 1., 0.),
    );
    let closest = square
        .find_closest_point(&Point3::new(0.3, 0.4, 1.0))
        .unwrap();
    assert_relative_eq!(closest, Point3::new(0.3, 0.4, 0.), epsilon = 1e-4);
}

#[test]
fn s6_ruled_surface_between_identical_curves_degenerates() {
    let curve = NurbsCurve::try_arc(
        &Point3::origin(),
        &Vector3::x(),
        &Vector3::y(),
        1.,
        0.,
        FRAC_PI_2,
    )
    .unwrap();
    let ruled = NurbsSurface::try_ruled(&curve, &curve).unwrap();
    assert_sizing(&ruled);

    for u in [0., 0.25, 0.5, 1.] {
        for v in sample_params((0., 1.), 8) {
            assert_relative_eq!(ruled.point_at(u, v), curve.point_at(v), epsilon = 1e-10);
        }
    }

    // with parallel partial derivatives the uv tangent solver must refuse
    let result = ruled.try_uv_tangent((0.5, 0.5), &Vector3::new(0., 0., 1.));
    assert!(matches!(
        result.unwrap_err().downcast_ref::<NurbsError>(),
        Some(NurbsError::DegenerateSystem(_))
    ));
}

#[test]
fn ruled_surface_boundaries_follow_the_input_curves() {
    // a line and a quadratic over the same domain
    let line = NurbsCurve::try_new(
        1,
        vec![Point4::new(0., 0., 1., 1.), Point4::new(2., 0., 1., 1.)],
        vec![0., 0., 1., 1.],
    )
    .unwrap();
    let parabola = NurbsCurve::try_new(
        2,
        vec![
            Point4::new(0., 1., 0., 1.),
            Point4::new(1., 2., 0., 1.),
            Point4::new(2., 1., 0., 1.),
        ],
        vec![0., 0., 0., 1., 1., 1.],
    )
    .unwrap();

    let ruled = NurbsSurface::try_ruled(&line, &parabola).unwrap();
    assert_sizing(&ruled);
    assert_eq!(ruled.u_degree(), 1);
    assert_eq!(ruled.v_degree(), 2);

    for v in sample_params((0., 1.), 12) {
        assert_relative_eq!(ruled.point_at(0., v), line.point_at(v), epsilon = 1e-9);
        assert_relative_eq!(ruled.point_at(1., v), parabola.point_at(v), epsilon = 1e-9);
    }
}

#[test]
fn ruled_surface_rejects_mismatched_domains() {
    let line = NurbsCurve::try_new(
        1,
        vec![Point4::new(0., 0., 0., 1.), Point4::new(1., 0., 0., 1.)],
        vec![0., 0., 1., 1.],
    )
    .unwrap();
    let stretched = NurbsCurve::try_new(
        1,
        vec![Point4::new(0., 1., 0., 1.), Point4::new(1., 1., 0., 1.)],
        vec![0., 0., 2., 2.],
    )
    .unwrap();
    let result = NurbsSurface::try_ruled(&line, &stretched);
    assert!(matches!(
        result.unwrap_err().downcast_ref::<NurbsError>(),
        Some(NurbsError::GeometricFailure(_))
    ));
}

#[test]
fn evaluation_commutes_with_the_projective_lift() {
    // with unit weights the homogeneous evaluation is affine: the weight
    // component stays one and dropping it is the identity on the spatial part
    let patch = NurbsSurface::bilinear(
        &Point3::new(0., 0., 1.),
        &Point3::new(2., 0., 1.),
        &Point3::new(2., 3., 1.),
        &Point3::new(0., 3., 1.),
    );
    let lifted = homogenize_control_grid(&patch.dehomogenized_control_points());
    assert_eq!(&lifted, patch.control_points());

    for u in sample_params((0., 1.), 6) {
        for v in sample_params((0., 1.), 6) {
            let hom = patch.point(u, v);
            assert_relative_eq!(hom.w, 1., epsilon = 1e-12);
            let dropped = patch.point_at(u, v);
            assert_relative_eq!(hom.x, dropped.x, epsilon = 1e-12);
            assert_relative_eq!(hom.y, dropped.y, epsilon = 1e-12);
            assert_relative_eq!(hom.z, dropped.z, epsilon = 1e-12);
        }
    }
}

#[test]
fn reverse_operations_are_involutions() {
    let patch = quarter_cylinder();

    let u_twice = patch.flip(FlipDirection::U).flip(FlipDirection::U);
    assert_surfaces_relative_eq(&u_twice, &patch, 1e-12);

    let v_twice = patch.flip(FlipDirection::V).flip(FlipDirection::V);
    assert_surfaces_relative_eq(&v_twice, &patch, 1e-12);

    // a single flip mirrors the evaluation
    let flipped = patch.flip(FlipDirection::U);
    for u in sample_params((0., 1.), 6) {
        for v in sample_params((0., 1.), 6) {
            assert_relative_eq!(
                patch.point_at(u, v),
                flipped.point_at(1. - u, v),
                epsilon = 1e-10
            );
        }
    }
}

#[test]
fn insertion_then_removal_restores_the_patch() {
    let patch = biquadratic_patch();
    let inserted = patch.try_insert_knot(0.5, 2, UVDirection::V).unwrap();
    assert_sizing(&inserted);
    assert_eq!(inserted.v_knots().multiplicity_at(0.5), 2);

    let (removed, count) = inserted.try_remove_knot(0.5, 2, UVDirection::V).unwrap();
    assert_eq!(count, 2);
    assert_sizing(&removed);
    assert_surfaces_relative_eq(&removed, &patch, 1e-9);
}

#[test]
fn knot_refinement_preserves_evaluation() {
    let patch = biquadratic_patch();
    let refined = patch
        .try_refine_knot(vec![0.25, 0.75], UVDirection::U)
        .unwrap();
    assert_sizing(&refined);
    assert_eq!(refined.u_knots().len(), patch.u_knots().len() + 2);

    for u in sample_params((0., 1.), 10) {
        for v in sample_params((0., 1.), 10) {
            assert_relative_eq!(patch.point_at(u, v), refined.point_at(u, v), epsilon = 1e-10);
        }
    }
}

#[test]
fn degree_elevation_preserves_evaluation() {
    let patch = quarter_cylinder();
    let elevated = patch
        .try_elevate_degree(1, UVDirection::U)
        .unwrap()
        .try_elevate_degree(2, UVDirection::V)
        .unwrap();
    assert_eq!(elevated.u_degree(), 3);
    assert_eq!(elevated.v_degree(), 4);
    assert_sizing(&elevated);

    for u in sample_params((0., 1.), 10) {
        for v in sample_params((0., 1.), 10) {
            assert_relative_eq!(
                patch.point_at(u, v),
                elevated.point_at(u, v),
                epsilon = 1e-9
            );
        }
    }
}

#[test]
fn degree_reduction_undoes_elevation() {
    let patch = biquadratic_patch();
    let elevated = patch.try_elevate_degree(1, UVDirection::U).unwrap();
    let reduced = elevated.try_reduce_degree(UVDirection::U).unwrap();
    assert_eq!(reduced.u_degree(), 2);
    assert_sizing(&reduced);

    for u in sample_params((0., 1.), 10) {
        for v in sample_params((0., 1.), 10) {
            assert_relative_eq!(patch.point_at(u, v), reduced.point_at(u, v), epsilon = 1e-7);
        }
    }
}

#[test]
fn bezier_decomposition_matches_the_surface() {
    let generatrix = NurbsCurve::try_new(
        1,
        vec![Point4::new(1., 0., 0., 1.), Point4::new(1.5, 0., 1., 1.)],
        vec![0., 0., 1., 1.],
    )
    .unwrap();
    let revolved =
        NurbsSurface::try_revolve(&generatrix, &Point3::origin(), &Vector3::z(), PI).unwrap();

    let patches = revolved.try_decompose().unwrap();
    assert_eq!(patches.len(), 2);
    assert_eq!(patches[0].len(), 1);

    for u in [0., 0.2, 0.5, 0.8, 1.] {
        for v in [0., 0.4, 1.] {
            let iu = if u < 0.5 { 0 } else { 1 };
            let local_u = (u - iu as f64 * 0.5) * 2.;
            assert_relative_eq!(
                revolved.point_at(u, v),
                patches[iu][0].point_at(local_u, v),
                epsilon = 1e-10
            );
        }
    }
}

#[test]
fn global_interpolation_passes_through_the_grid() {
    let points: Vec<Vec<Point3<f64>>> = (0..5)
        .map(|i| {
            (0..4)
                .map(|j| {
                    Point3::new(
                        i as f64,
                        j as f64 * 1.5,
                        (i as f64 * 0.8).sin() + (j as f64 * 0.5).cos(),
                    )
                })
                .collect()
        })
        .collect();

    let surface = NurbsSurface::try_interpolate_grid(&points, 3, 3).unwrap();
    assert_sizing(&surface);

    let (uk, vl) = averaged_grid_parameters(&points).unwrap();
    for (i, u) in uk.iter().enumerate() {
        for (j, v) in vl.iter().enumerate() {
            assert_relative_eq!(surface.point_at(*u, *v), points[i][j], epsilon = 1e-8);
        }
    }
}

#[test]
fn bicubic_local_interpolation_passes_through_the_grid() {
    let xs = [0., 1., 3., 6.];
    let ys = [0., 2., 3.];
    let points: Vec<Vec<Point3<f64>>> = xs
        .iter()
        .map(|x| ys.iter().map(|y| Point3::new(*x, *y, 0.)).collect())
        .collect();

    let surface = NurbsSurface::try_bicubic_interpolate(&points).unwrap();
    assert_sizing(&surface);
    assert_eq!(surface.u_degree(), 3);
    assert_eq!(surface.v_degree(), 3);

    let (ub, vb) = averaged_grid_parameters(&points).unwrap();

    // interior knots keep double multiplicity
    for k in 1..(xs.len() - 1) {
        assert_eq!(surface.u_knots().multiplicity_at(ub[k]), 2);
    }
    for l in 1..(ys.len() - 1) {
        assert_eq!(surface.v_knots().multiplicity_at(vb[l]), 2);
    }

    for (i, u) in ub.iter().enumerate() {
        for (j, v) in vb.iter().enumerate() {
            assert_relative_eq!(surface.point_at(*u, *v), points[i][j], epsilon = 1e-8);
        }
    }

    // the grid is planar, so the whole patch must stay in the plane
    for u in sample_params((0., 1.), 8) {
        for v in sample_params((0., 1.), 8) {
            assert_relative_eq!(surface.point_at(u, v).z, 0., epsilon = 1e-9);
        }
    }
}

#[test]
fn least_squares_approximation_pins_corners_and_stays_in_plane() {
    let points: Vec<Vec<Point3<f64>>> = (0..7)
        .map(|i| {
            (0..6)
                .map(|j| Point3::new(i as f64 + 0.1 * (j as f64), j as f64 * 2., 0.))
                .collect()
        })
        .collect();

    let surface = NurbsSurface::try_approximate(&points, 3, 2, 5, 4).unwrap();
    assert_sizing(&surface);
    assert_eq!(surface.control_points().len(), 5);
    assert_eq!(surface.control_points()[0].len(), 4);

    assert_relative_eq!(surface.point_at(0., 0.), points[0][0], epsilon = 1e-9);
    assert_relative_eq!(surface.point_at(1., 0.), points[6][0], epsilon = 1e-9);
    assert_relative_eq!(surface.point_at(0., 1.), points[0][5], epsilon = 1e-9);
    assert_relative_eq!(surface.point_at(1., 1.), points[6][5], epsilon = 1e-9);

    for u in sample_params((0., 1.), 8) {
        for v in sample_params((0., 1.), 8) {
            assert_relative_eq!(surface.point_at(u, v).z, 0., epsilon = 1e-9);
        }
    }

    // approximation demands fewer control points than data points
    assert!(NurbsSurface::try_approximate(&points, 3, 2, 7, 4).is_err());
}

#[test]
fn revolution_keeps_the_generatrix_distance_to_the_axis() {
    let generatrix = NurbsCurve::try_new(
        1,
        vec![Point4::new(0.5, 0., 0., 1.), Point4::new(1.5, 0., 2., 1.)],
        vec![0., 0., 1., 1.],
    )
    .unwrap();
    let revolved = NurbsSurface::try_revolve(
        &generatrix,
        &Point3::origin(),
        &Vector3::z(),
        3. * FRAC_PI_2,
    )
    .unwrap();
    assert_sizing(&revolved);
    assert_eq!(revolved.u_degree(), 2);

    for u in sample_params((0., 1.), 9) {
        for v in sample_params((0., 1.), 5) {
            let p = revolved.point_at(u, v);
            let g = generatrix.point_at(v);
            let surface_radius = (p.x * p.x + p.y * p.y).sqrt();
            let generatrix_radius = (g.x * g.x + g.y * g.y).sqrt();
            assert_relative_eq!(surface_radius, generatrix_radius, epsilon = 1e-9);
            // heights match as well since the axis is z
            assert_relative_eq!(p.z, g.z, epsilon = 1e-9);
        }
    }

    let full = NurbsSurface::try_revolve(&generatrix, &Point3::origin(), &Vector3::z(), TAU)
        .unwrap();
    assert!(full.is_u_closed());
    assert!(!full.is_v_closed());
}

#[test]
fn uv_tangent_recovers_parametric_directions() {
    let cylinder = quarter_cylinder();
    let uv = (0.3, 0.6);
    let derivs = cylinder.rational_derivatives(uv.0, uv.1, 1);
    let s_u = derivs[1][0];
    let s_v = derivs[0][1];

    let (du, dv) = cylinder.try_uv_tangent(uv, &s_u).unwrap();
    assert_relative_eq!(du, 1., epsilon = 1e-8);
    assert_relative_eq!(dv, 0., epsilon = 1e-8);

    let combined = s_u * 0.5 + s_v * 2.;
    let (du, dv) = cylinder.try_uv_tangent(uv, &combined).unwrap();
    assert_relative_eq!(du, 0.5, epsilon = 1e-8);
    assert_relative_eq!(dv, 2., epsilon = 1e-8);
}

#[test]
fn invalid_arguments_surface_eagerly() {
    // broken sizing identity
    let result = NurbsSurface::try_new(
        2,
        2,
        vec![0., 0., 0., 1., 1.],
        vec![0., 0., 0., 1., 1., 1.],
        vec![vec![Point4::new(0., 0., 0., 1.); 3]; 3],
    );
    assert!(matches!(
        result.unwrap_err().downcast_ref::<NurbsError>(),
        Some(NurbsError::InvalidArgument(_))
    ));

    // zero weight
    let mut grid = vec![vec![Point4::new(0., 0., 0., 1.); 3]; 3];
    grid[1][1].w = 0.;
    let result = NurbsSurface::try_new(
        2,
        2,
        vec![0., 0., 0., 1., 1., 1.],
        vec![0., 0., 0., 1., 1., 1.],
        grid,
    );
    assert!(result.is_err());

    // parameter outside the knot range
    let patch = biquadratic_patch();
    assert!(patch.try_point_at(1.5, 0.5).is_err());
    assert!(patch.try_point_at(0.5, -0.1).is_err());
    assert!(patch.try_point_at(0., 0.).is_ok());
}
