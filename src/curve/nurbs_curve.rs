use nalgebra::{Point3, Point4, Vector4};

use crate::knot::KnotVector;
use crate::misc::{FloatingPoint, Invertible, NurbsError, Ray};

/// Rational B-spline curve in 3D space.
///
/// Surfaces treat their control rows and columns as curves, so every
/// one-directional surface operation delegates to this type.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NurbsCurve<T: FloatingPoint> {
    /// control points with homogeneous coordinates
    /// the last element of the vector is the `weight`
    control_points: Vec<Point4<T>>,
    degree: usize,
    /// the length of the knot vector is equal to the `# of control points + degree + 1`
    knots: KnotVector<T>,
}

impl<T: FloatingPoint> NurbsCurve<T> {
    /// Create a new NURBS curve with full argument validation.
    /// # Failures
    /// - the degree is zero
    /// - the knot vector is empty or decreasing somewhere
    /// - the number of knots is not equal to the number of control points + the degree + 1
    /// - a control point carries a non-positive weight
    pub fn try_new(
        degree: usize,
        control_points: Vec<Point4<T>>,
        knots: Vec<T>,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            degree > 0,
            NurbsError::InvalidArgument("degree must be greater than zero".into())
        );
        anyhow::ensure!(
            control_points.len() > degree,
            NurbsError::InvalidArgument("too few control points for curve".into())
        );
        let knots = KnotVector::new(knots);
        anyhow::ensure!(
            knots.is_valid(),
            NurbsError::InvalidArgument(
                "knot vector must be a non-decreasing sequence of real numbers".into()
            )
        );
        anyhow::ensure!(
            knots.len() == control_points.len() + degree + 1,
            NurbsError::InvalidArgument(format!(
                "invalid number of knots, got {}, expected {}",
                knots.len(),
                control_points.len() + degree + 1
            ))
        );
        anyhow::ensure!(
            control_points.iter().all(|p| p.w > T::zero()),
            NurbsError::InvalidArgument("control point weights must be positive".into())
        );

        Ok(Self {
            degree,
            control_points,
            knots,
        })
    }

    /// Create a new NURBS curve without validation.
    /// The caller must uphold the sizing identity `#knots = #controls + degree + 1`.
    pub fn new_unchecked(
        degree: usize,
        control_points: Vec<Point4<T>>,
        knots: KnotVector<T>,
    ) -> Self {
        Self {
            degree,
            control_points,
            knots,
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn knots(&self) -> &KnotVector<T> {
        &self.knots
    }

    pub fn control_points(&self) -> &Vec<Point4<T>> {
        &self.control_points
    }

    pub fn weights(&self) -> Vec<T> {
        self.control_points.iter().map(|p| p.w).collect()
    }

    pub fn knots_domain(&self) -> (T, T) {
        self.knots.domain(self.degree)
    }

    /// Return the dehomogenized control points
    pub fn dehomogenized_control_points(&self) -> Vec<Point3<T>> {
        self.control_points
            .iter()
            .map(|p| dehomogenize(p).unwrap())
            .collect()
    }

    /// Check if the curve is clamped
    pub fn is_clamped(&self) -> bool {
        self.knots.is_clamped(self.degree)
    }

    /// Evaluate the curve at a given parameter to get a dehomogenized point
    pub fn point_at(&self, t: T) -> Point3<T> {
        let p = self.point(t);
        dehomogenize(&p).unwrap()
    }

    /// Evaluate the curve at a given parameter to get a point in homogeneous space
    pub(crate) fn point(&self, t: T) -> Point4<T> {
        let n = self.knots.len() - self.degree - 2;
        let knot_span_index = self.knots.find_knot_span_index(n, self.degree, t);
        let basis = self.knots.basis_functions(knot_span_index, t, self.degree);
        let mut position = Point4::origin();
        for i in 0..=self.degree {
            position.coords +=
                self.control_points[knot_span_index - self.degree + i].coords * basis[i];
        }
        position
    }

    /// Insert a knot with the given multiplicity.
    ///
    /// If the knot already has multiplicity equal to the degree the curve is
    /// returned unchanged; otherwise the requested multiplicity is clamped so
    /// that the final multiplicity never exceeds the degree.
    pub fn try_insert_knot(&self, knot: T, times: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(
            knot >= self.knots.first() && knot <= self.knots.last(),
            NurbsError::InvalidArgument(format!("knot out of range: {:?}", knot))
        );

        let p = self.degree;
        let s = self.knots.multiplicity_at(knot);
        if s >= p {
            return Ok(self.clone());
        }
        let times = times.min(p - s);
        if times == 0 {
            return Ok(self.clone());
        }

        let n = self.control_points.len() - 1;
        let k = self.knots.find_knot_span_index(n, p, knot);

        let mut knots = Vec::with_capacity(self.knots.len() + times);
        knots.extend_from_slice(&self.knots.as_slice()[..=k]);
        knots.extend(std::iter::repeat(knot).take(times));
        knots.extend_from_slice(&self.knots.as_slice()[(k + 1)..]);

        let mut control_points = vec![Point4::origin(); n + 1 + times];
        for i in 0..=(k - p) {
            control_points[i] = self.control_points[i];
        }
        for i in (k - s)..=n {
            control_points[i + times] = self.control_points[i];
        }

        let mut temp = vec![Point4::origin(); p - s + 1];
        for (i, item) in temp.iter_mut().enumerate() {
            *item = self.control_points[k - p + i];
        }

        let mut l = 0;
        for j in 1..=times {
            l = k - p + j;
            for i in 0..=(p - j - s) {
                let alpha =
                    (knot - self.knots[l + i]) / (self.knots[i + k + 1] - self.knots[l + i]);
                temp[i] = temp[i].lerp(&temp[i + 1], alpha);
            }
            control_points[l] = temp[0];
            control_points[k + times - j - s] = temp[p - j - s];
        }

        for i in (l + 1)..(k - s) {
            control_points[i] = temp[i - l];
        }

        Ok(Self {
            degree: p,
            control_points,
            knots: KnotVector::new(knots),
        })
    }

    /// Refine the curve by inserting a sorted batch of knots at once.
    pub fn try_refine_knot(&self, knots_to_insert: Vec<T>) -> anyhow::Result<Self> {
        anyhow::ensure!(
            self.is_clamped(),
            NurbsError::InvalidArgument("curve must be clamped to refine knots".into())
        );

        if knots_to_insert.is_empty() {
            return Ok(self.clone());
        }
        let mut knots_to_insert = knots_to_insert;
        knots_to_insert.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let degree = self.degree;
        let control_points = &self.control_points;

        let n = control_points.len() - 1;
        let m = n + degree + 1;
        let r = knots_to_insert.len() - 1;
        let a = self
            .knots
            .find_knot_span_index(n, degree, knots_to_insert[0]);
        let b = self
            .knots
            .find_knot_span_index(n, degree, knots_to_insert[r])
            + 1;

        let mut control_points_post = vec![Point4::origin(); n + r + 2];
        let mut knots_post = vec![T::zero(); m + r + 2];

        control_points_post[..((a - degree) + 1)]
            .clone_from_slice(&control_points[..((a - degree) + 1)]);
        for i in (b - 1)..=n {
            control_points_post[i + r + 1] = control_points[i];
        }

        for i in 0..=a {
            knots_post[i] = self.knots[i];
        }
        for i in (b + degree)..=m {
            knots_post[i + r + 1] = self.knots[i];
        }

        let mut i = b + degree - 1;
        let mut k = b + degree + r;

        for j in (0..=r).rev() {
            while knots_to_insert[j] <= self.knots[i] && i > a {
                control_points_post[k - degree - 1] = control_points[i - degree - 1];
                knots_post[k] = self.knots[i];
                k -= 1;
                i -= 1;
            }
            control_points_post[k - degree - 1] = control_points_post[k - degree];
            for l in 1..=degree {
                let ind = k - degree + l;
                let alpha = knots_post[k + l] - knots_to_insert[j];
                if alpha.abs() < T::default_epsilon() {
                    control_points_post[ind - 1] = control_points_post[ind];
                } else {
                    let denom = knots_post[k + l] - self.knots[i - degree + l];
                    let weight = if denom != T::zero() {
                        alpha / denom
                    } else {
                        T::zero()
                    };
                    control_points_post[ind - 1] = control_points_post[ind - 1]
                        .lerp(&control_points_post[ind], T::one() - weight);
                }
            }
            knots_post[k] = knots_to_insert[j];
            k -= 1;
        }

        Ok(Self {
            degree,
            control_points: control_points_post,
            knots: KnotVector::new(knots_post),
        })
    }

    /// Try to remove an interior knot up to `times` times while keeping the
    /// curve within `tolerance` (measured on the homogeneous control points).
    /// Returns the resulting curve and the number of removals that succeeded.
    pub fn try_remove_knot(
        &self,
        knot: T,
        times: usize,
        tolerance: T,
    ) -> anyhow::Result<(Self, usize)> {
        let p = self.degree;
        let n = self.control_points.len() - 1;
        let m = n + p + 1;
        let (d0, d1) = self.knots_domain();

        // only interior knots are removable
        if knot <= d0 + T::default_epsilon() || knot >= d1 - T::default_epsilon() {
            return Ok((self.clone(), 0));
        }

        let s = self.knots.multiplicity_at(knot);
        if s == 0 {
            return Ok((self.clone(), 0));
        }
        let times = times.min(s);

        let r = self
            .knots
            .iter()
            .rposition(|k| (*k - knot).abs() < T::default_epsilon())
            .unwrap();

        let ord = p + 1;
        let mut first = r - p;
        let mut last = r - s;
        let mut cp = self.control_points.clone();

        let mut t = 0;
        while t < times {
            let off = first - 1;
            let mut temp = vec![Point4::origin(); last + 2 - off];
            temp[0] = cp[off];
            temp[last + 1 - off] = cp[last + 1];

            let mut i = first;
            let mut j = last;
            let mut ii = 1;
            let mut jj = last - off;

            while (j as isize - i as isize) > t as isize {
                let alfi = (knot - self.knots[i]) / (self.knots[i + ord + t] - self.knots[i]);
                let alfj =
                    (knot - self.knots[j - t]) / (self.knots[j + ord] - self.knots[j - t]);
                temp[ii] = Point4::from(
                    (cp[i].coords - temp[ii - 1].coords * (T::one() - alfi)) / alfi,
                );
                temp[jj] =
                    Point4::from((cp[j].coords - temp[jj + 1].coords * alfj) / (T::one() - alfj));
                i += 1;
                ii += 1;
                j -= 1;
                jj -= 1;
            }

            let removable = if (j as isize - i as isize) < t as isize {
                homogeneous_distance(&temp[ii - 1], &temp[jj + 1]) <= tolerance
            } else {
                let alfi = (knot - self.knots[i]) / (self.knots[i + ord + t] - self.knots[i]);
                let blended = temp[ii + t + 1].coords * alfi
                    + temp[ii - 1].coords * (T::one() - alfi);
                (cp[i].coords - blended).norm() <= tolerance
            };

            if !removable {
                break;
            }

            let mut i = first;
            let mut j = last;
            while (j as isize - i as isize) > t as isize {
                cp[i] = temp[i - off];
                cp[j] = temp[j - off];
                i += 1;
                j -= 1;
            }

            first -= 1;
            last += 1;
            t += 1;
        }

        if t == 0 {
            return Ok((self.clone(), 0));
        }

        let mut knots = self.knots.to_vec();
        for k in (r + 1)..=m {
            knots[k - t] = knots[k];
        }
        knots.truncate(m + 1 - t);

        let fout = (2 * r - s - p) / 2;
        let mut j = fout;
        let mut i = j;
        for k in 1..t {
            if k % 2 == 1 {
                i += 1;
            } else {
                j -= 1;
            }
        }
        for k in (i + 1)..=n {
            cp[j] = cp[k];
            j += 1;
        }
        cp.truncate(n + 1 - t);

        Ok((
            Self {
                degree: p,
                control_points: cp,
                knots: KnotVector::new(knots),
            },
            t,
        ))
    }

    /// Try to elevate the degree of the curve
    pub fn try_elevate_degree(&self, target_degree: usize) -> anyhow::Result<Self> {
        if target_degree <= self.degree {
            return Ok(self.clone());
        }

        let p = self.degree;
        let knots = &self.knots;
        let control_points = &self.control_points;
        let t = target_degree - p;

        let n = control_points.len() - 1;
        let m = n + p + 1;
        let ph = target_degree;
        let ph2 = ph / 2;

        // one bezier segment per distinct knot span
        let segments = knots.multiplicity().len() - 1;
        let new_control_point_count = control_points.len() + t * segments;

        let mut bezalfs = vec![vec![T::zero(); p + 1]; ph + 1];
        let mut bpts = vec![Point4::origin(); p + 1];
        let mut e_bpts = vec![Point4::origin(); ph + 1];
        let mut next_bpts = vec![Point4::origin(); if p >= 2 { p - 1 } else { 0 }];

        let mut q_w = vec![Point4::origin(); new_control_point_count];
        let mut u_h = vec![T::zero(); new_control_point_count + target_degree + 1];

        bezalfs[0][0] = T::one();
        bezalfs[ph][p] = T::one();

        let mut binom = crate::misc::Binomial::new();

        for i in 1..=ph2 {
            let inv = T::one() / binom.get(ph, i);
            let mpi = p.min(i);
            for j in i.saturating_sub(t)..=mpi {
                bezalfs[i][j] = inv * binom.get(p, j) * binom.get(t, i - j);
            }
        }

        for i in (ph2 + 1)..ph {
            let mpi = p.min(i);
            for j in i.saturating_sub(t)..=mpi {
                bezalfs[i][j] = bezalfs[ph - i][p - j];
            }
        }

        let mut kind = ph + 1;
        let mut r: isize = -1;
        let mut a = p;
        let mut b = p + 1;
        let mut cind = 1;
        let mut ua = knots[0];
        q_w[0] = control_points[0];
        for i in 0..=ph {
            u_h[i] = ua;
        }

        bpts[..(p + 1)].clone_from_slice(&control_points[..(p + 1)]);

        while b < m {
            let i = b;
            while b < m && knots[b] == knots[b + 1] {
                b += 1;
            }
            let mul = b - i + 1;
            let ub = knots[b];
            let oldr = r;
            r = p as isize - mul as isize;
            let lbz = if oldr > 0 {
                ((oldr + 2) / 2) as usize
            } else {
                1
            };
            let rbz = if r > 0 {
                ph - ((r + 1) / 2) as usize
            } else {
                ph
            };
            if r > 0 {
                // insert knots to get a bezier segment
                let numer = ub - ua;
                let mut alfs = vec![T::zero(); p - mul];
                let mut k = p;
                while k > mul {
                    alfs[k - mul - 1] = numer / (knots[a + k] - ua);
                    k -= 1;
                }
                for j in 1..=(r as usize) {
                    let save = (r as usize) - j;
                    let s = mul + j;
                    let mut k = p;
                    while k >= s {
                        bpts[k] = bpts[k].lerp(&bpts[k - 1], T::one() - alfs[k - s]);
                        k -= 1;
                    }
                    next_bpts[save] = bpts[p];
                }
            }

            // elevate the bezier segment
            for i in lbz..=ph {
                e_bpts[i] = Point4::origin();
                let mpi = p.min(i);
                for j in i.saturating_sub(t)..=mpi {
                    e_bpts[i].coords += bpts[j].coords * bezalfs[i][j];
                }
            }

            if oldr > 1 {
                // remove the knot ua oldr - 1 times
                let mut first = kind - 2;
                let mut last = kind;
                let den = ub - ua;
                let bet = (ub - u_h[kind - 1]) / den;
                for tr in 1..oldr {
                    let mut i = first;
                    let mut j = last;
                    let mut kj = j - kind + 1;
                    let utr = tr as usize;
                    while (j as isize - i as isize) > tr {
                        if i < cind {
                            let alf = (ub - u_h[i]) / (ua - u_h[i]);
                            q_w[i] = q_w[i].lerp(&q_w[i - 1], T::one() - alf);
                        }
                        if j >= lbz {
                            if (j as isize) - tr <= (kind as isize - ph as isize + oldr) {
                                let gam = (ub - u_h[j - utr]) / den;
                                e_bpts[kj] = e_bpts[kj].lerp(&e_bpts[kj + 1], T::one() - gam);
                            }
                        } else {
                            e_bpts[kj] = e_bpts[kj].lerp(&e_bpts[kj + 1], T::one() - bet);
                        }
                        i += 1;
                        j -= 1;
                        kj -= 1;
                    }
                    first -= 1;
                    last += 1;
                }
            }

            if a != p {
                for _i in 0..(ph as isize - oldr) {
                    u_h[kind] = ua;
                    kind += 1;
                }
            }

            for j in lbz..=rbz {
                q_w[cind] = e_bpts[j];
                cind += 1;
            }

            if b < m {
                let ur = r.max(0) as usize;
                bpts[..ur].clone_from_slice(&next_bpts[..ur]);
                for j in ur..=p {
                    bpts[j] = control_points[b - p + j];
                }
                a = b;
                b += 1;
                ua = ub;
            } else {
                for i in 0..=ph {
                    u_h[kind + i] = ub;
                }
            }
        }

        q_w.truncate(cind);
        u_h.truncate(kind + ph + 1);

        Ok(Self {
            degree: target_degree,
            control_points: q_w,
            knots: KnotVector::new(u_h),
        })
    }

    /// Try to reduce the degree of the curve by one.
    /// Fails with a `GeometricFailure` when the curve cannot be represented
    /// one degree lower within `tolerance`.
    pub fn try_reduce_degree(&self, tolerance: T) -> anyhow::Result<Self> {
        anyhow::ensure!(
            self.degree >= 2,
            NurbsError::InvalidArgument("cannot reduce a curve of degree one".into())
        );
        anyhow::ensure!(
            self.is_clamped(),
            NurbsError::InvalidArgument("curve must be clamped to reduce its degree".into())
        );

        let p = self.degree;
        let knots = &self.knots;
        let control_points = &self.control_points;
        let n = control_points.len() - 1;
        let m = n + p + 1;
        let ph = p - 1;

        let mut new_cp = vec![Point4::origin(); n + 1];
        let mut new_knots = vec![T::zero(); m + 1];
        let mut bpts = vec![Point4::origin(); p + 1];
        let mut next_bpts = vec![Point4::origin(); if p >= 2 { p - 1 } else { 0 }];
        let mut rbpts = vec![Point4::origin(); p];
        let mut e = vec![T::zero(); m + 1];

        let mut mh = ph;
        let mut kind = ph + 1;
        let mut r: isize = -1;
        let mut a = p;
        let mut b = p + 1;
        let mut cind = 1;

        new_cp[0] = control_points[0];
        for i in 0..=ph {
            new_knots[i] = knots[0];
        }
        bpts[..(p + 1)].clone_from_slice(&control_points[..(p + 1)]);

        while b < m {
            let i0 = b;
            while b < m && knots[b] == knots[b + 1] {
                b += 1;
            }
            let mult = b - i0 + 1;
            mh += mult - 1;
            let oldr = r;
            r = p as isize - mult as isize;
            let lbz = if oldr > 0 {
                ((oldr + 2) / 2) as usize
            } else {
                1
            };

            if r > 0 {
                // insert knots to get a bezier segment
                let numer = knots[b] - knots[a];
                let mut alfs = vec![T::zero(); p - mult];
                let mut k = p;
                while k > mult {
                    alfs[k - mult - 1] = numer / (knots[a + k] - knots[a]);
                    k -= 1;
                }
                for j in 1..=(r as usize) {
                    let save = (r as usize) - j;
                    let s = mult + j;
                    let mut k = p;
                    while k >= s {
                        bpts[k] = bpts[k].lerp(&bpts[k - 1], T::one() - alfs[k - s]);
                        k -= 1;
                    }
                    next_bpts[save] = bpts[p];
                }
            }

            // degree reduce the bezier segment
            let max_err = bezier_degree_reduce(&bpts, &mut rbpts);
            e[a] += max_err;
            if e[a] > tolerance {
                return Err(NurbsError::GeometricFailure(
                    "degree reduction exceeds the tolerance".into(),
                )
                .into());
            }

            // remove the knot knots[a] oldr times
            if oldr > 0 {
                let mut first = kind;
                let mut last = kind;
                let mut last_i = first;
                for k in 0..(oldr as usize) {
                    let mut i = first;
                    let mut j = last;
                    let mut kj = (j - kind) as isize;
                    while (j as isize - i as isize) > k as isize {
                        let alfa =
                            (knots[a] - new_knots[i - 1]) / (knots[b] - new_knots[i - 1]);
                        let alfb = (knots[a] - new_knots[j - k - 1])
                            / (knots[b] - new_knots[j - k - 1]);
                        new_cp[i - 1] = Point4::from(
                            (new_cp[i - 1].coords - new_cp[i - 2].coords * (T::one() - alfa))
                                / alfa,
                        );
                        rbpts[kj as usize] = Point4::from(
                            (rbpts[kj as usize].coords - rbpts[kj as usize + 1].coords * alfb)
                                / (T::one() - alfb),
                        );
                        i += 1;
                        j -= 1;
                        kj -= 1;
                    }

                    let br = if (j as isize - i as isize) < k as isize {
                        homogeneous_distance(&new_cp[i - 2], &rbpts[(kj + 1) as usize])
                    } else {
                        let delta =
                            (knots[a] - new_knots[i - 1]) / (knots[b] - new_knots[i - 1]);
                        let blended = rbpts[(kj + 1) as usize].coords * delta
                            + new_cp[i - 2].coords * (T::one() - delta);
                        (new_cp[i - 1].coords - blended).norm()
                    };

                    // the removal smears error over the affected spans
                    let kk = a + oldr as usize - k;
                    let q = (2 * p - k + 1) / 2;
                    let l = kk.saturating_sub(q);
                    for ii in l..=a {
                        e[ii] += br;
                        if e[ii] > tolerance {
                            return Err(NurbsError::GeometricFailure(
                                "degree reduction exceeds the tolerance".into(),
                            )
                            .into());
                        }
                    }
                    first -= 1;
                    last += 1;
                    last_i = i;
                }
                cind = last_i - 1;
            }

            // load knot vector and control points
            if a != p {
                for _ in 0..(ph as isize - oldr) {
                    new_knots[kind] = knots[a];
                    kind += 1;
                }
            }
            for i in lbz..=ph {
                new_cp[cind] = rbpts[i];
                cind += 1;
            }

            if b < m {
                let ur = r.max(0) as usize;
                bpts[..ur].clone_from_slice(&next_bpts[..ur]);
                for i in ur..=p {
                    bpts[i] = control_points[b - p + i];
                }
                a = b;
                b += 1;
            } else {
                for i in 0..=ph {
                    new_knots[kind + i] = knots[b];
                }
            }
        }

        let nh = mh - ph - 1;
        new_cp.truncate(nh + 1);
        new_knots.truncate(mh + 1);

        Ok(Self {
            degree: ph,
            control_points: new_cp,
            knots: KnotVector::new(new_knots),
        })
    }

    /// Try to build a circular arc as a rational quadratic curve.
    ///
    /// The sweep is split into at most four segments of a quarter turn each;
    /// intermediate control points sit at the intersection of the segment
    /// end tangents and carry the weight `cos(Δθ/2)`.
    ///
    /// # Example
    /// ```
    /// use surfo::prelude::*;
    /// use nalgebra::{Point3, Vector3};
    /// use approx::assert_relative_eq;
    /// use std::f64::consts::FRAC_PI_2;
    ///
    /// let arc = NurbsCurve::try_arc(
    ///     &Point3::origin(),
    ///     &Vector3::x(),
    ///     &Vector3::y(),
    ///     1.,
    ///     0.,
    ///     FRAC_PI_2,
    /// )
    /// .unwrap();
    /// let (start, end) = arc.knots_domain();
    /// assert_relative_eq!(arc.point_at(start), Point3::new(1., 0., 0.), epsilon = 1e-10);
    /// assert_relative_eq!(arc.point_at(end), Point3::new(0., 1., 0.), epsilon = 1e-10);
    /// let sqrt2_half = 2.0_f64.sqrt() / 2.;
    /// let mid = arc.point_at((start + end) / 2.);
    /// assert_relative_eq!(mid, Point3::new(sqrt2_half, sqrt2_half, 0.), epsilon = 1e-10);
    /// ```
    pub fn try_arc(
        center: &Point3<T>,
        x_axis: &nalgebra::Vector3<T>,
        y_axis: &nalgebra::Vector3<T>,
        radius: T,
        start_angle: T,
        end_angle: T,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            radius > T::zero(),
            NurbsError::InvalidArgument("radius must be positive".into())
        );

        let x = x_axis.normalize();
        let y = y_axis.normalize();

        let mut theta = end_angle - start_angle;
        if theta < T::zero() {
            theta += T::two_pi();
        }
        anyhow::ensure!(
            theta > T::zero() && theta <= T::two_pi(),
            NurbsError::InvalidArgument("arc sweep must lie in (0, 2π]".into())
        );

        let two = T::from_f64(2.0).unwrap();
        let quarter = T::pi() / two;
        let narcs = (theta / quarter)
            .ceil()
            .to_usize()
            .unwrap()
            .clamp(1, 4);
        let dtheta = theta / T::from_usize(narcs).unwrap();
        let wm = (dtheta / two).cos();

        let n = 2 * narcs;
        let mut control_points = vec![Point4::origin(); n + 1];

        let mut angle = start_angle;
        let mut p0 = center + x * (radius * angle.cos()) + y * (radius * angle.sin());
        let mut t0 = y * angle.cos() - x * angle.sin();
        control_points[0] = homogenize(&p0, T::one());

        let mut index = 0;
        for _ in 1..=narcs {
            angle += dtheta;
            let p2 = center + x * (radius * angle.cos()) + y * (radius * angle.sin());
            let t2 = y * angle.cos() - x * angle.sin();
            control_points[index + 2] = homogenize(&p2, T::one());

            let r0 = Ray::new(p0, t0);
            let r1 = Ray::new(p2, t2);
            let intersection = r0.find_intersection(&r1).ok_or(NurbsError::GeometricFailure(
                "arc end tangents do not intersect".into(),
            ))?;
            control_points[index + 1] = homogenize(&intersection.intersection0.0, wm);

            index += 2;
            p0 = p2;
            t0 = t2;
        }

        let mut knots = vec![T::zero(); n + 4];
        for i in 0..3 {
            knots[n + 1 + i] = T::one();
        }
        for i in 1..narcs {
            let v = T::from_usize(i).unwrap() / T::from_usize(narcs).unwrap();
            knots[2 * i + 1] = v;
            knots[2 * i + 2] = v;
        }

        Ok(Self {
            degree: 2,
            control_points,
            knots: KnotVector::new(knots),
        })
    }
}

impl<T: FloatingPoint> Invertible for NurbsCurve<T> {
    /// Reverse the direction of the curve
    /// # Example
    /// ```
    /// use surfo::prelude::*;
    /// use nalgebra::{Point3, Point4};
    /// use approx::assert_relative_eq;
    /// let mut curve = NurbsCurve::try_new(
    ///     1,
    ///     vec![Point4::new(0., 0., 0., 1.), Point4::new(1., 0., 0., 1.)],
    ///     vec![0., 0., 1., 1.],
    /// )
    /// .unwrap();
    /// curve.invert();
    /// let (start, end) = curve.knots_domain();
    /// assert_relative_eq!(curve.point_at(start), Point3::new(1., 0., 0.));
    /// assert_relative_eq!(curve.point_at(end), Point3::new(0., 0., 0.));
    /// ```
    fn invert(&mut self) {
        self.control_points.reverse();
        self.knots.invert();
    }
}

/// Degree reduce a bezier segment by one, writing the reduced control points
/// into `rbpts` and returning the maximum error of the reduction.
fn bezier_degree_reduce<T: FloatingPoint>(bpts: &[Point4<T>], rbpts: &mut [Point4<T>]) -> T {
    let p = bpts.len() - 1;
    let r = (p - 1) / 2;
    let alf = |i: usize| T::from_usize(i).unwrap() / T::from_usize(p).unwrap();

    rbpts[0] = bpts[0];
    rbpts[p - 1] = bpts[p];

    if p % 2 == 0 {
        for i in 1..=r {
            rbpts[i] =
                Point4::from((bpts[i].coords - rbpts[i - 1].coords * alf(i)) / (T::one() - alf(i)));
        }
        for i in ((r + 1)..=(p.saturating_sub(2))).rev() {
            rbpts[i] = Point4::from(
                (bpts[i + 1].coords - rbpts[i + 1].coords * (T::one() - alf(i + 1))) / alf(i + 1),
            );
        }
        let half = T::from_f64(0.5).unwrap();
        let mid = (rbpts[r].coords + rbpts[r + 1].coords) * half;
        (bpts[r + 1].coords - mid).norm()
    } else {
        for i in 1..r {
            rbpts[i] =
                Point4::from((bpts[i].coords - rbpts[i - 1].coords * alf(i)) / (T::one() - alf(i)));
        }
        for i in ((r + 1)..=(p - 2)).rev() {
            rbpts[i] = Point4::from(
                (bpts[i + 1].coords - rbpts[i + 1].coords * (T::one() - alf(i + 1))) / alf(i + 1),
            );
        }
        let left: Vector4<T> =
            (bpts[r].coords - rbpts[r - 1].coords * alf(r)) / (T::one() - alf(r));
        let right: Vector4<T> =
            (bpts[r + 1].coords - rbpts[r + 1].coords * (T::one() - alf(r + 1))) / alf(r + 1);
        let half = T::from_f64(0.5).unwrap();
        rbpts[r] = Point4::from((left + right) * half);
        (left - right).norm()
    }
}

fn homogeneous_distance<T: FloatingPoint>(a: &Point4<T>, b: &Point4<T>) -> T {
    (a.coords - b.coords).norm()
}

/// Dehomogenize a point, dividing the spatial part by the weight.
/// Returns `None` for a vanishing weight.
pub fn dehomogenize<T: FloatingPoint>(point: &Point4<T>) -> Option<Point3<T>> {
    let w = point.w;
    if w != T::zero() {
        Some(Point3::new(point.x / w, point.y / w, point.z / w))
    } else {
        None
    }
}

/// Lift a point into homogeneous space with the given weight.
pub fn homogenize<T: FloatingPoint>(point: &Point3<T>, weight: T) -> Point4<T> {
    Point4::new(
        point.x * weight,
        point.y * weight,
        point.z * weight,
        weight,
    )
}
