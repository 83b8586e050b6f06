use std::ops::Index;

use nalgebra::RealField;

use crate::misc::{FloatingPoint, Invertible};

/// A distinct knot value and the number of times it repeats in the vector.
///
/// Produced by [`KnotVector::multiplicity`]; structural operations read the
/// run lengths to decide how many knots can still be inserted or removed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KnotMultiplicity<T> {
    pub knot: T,
    pub count: usize,
}

/// Knot vector representation
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KnotVector<T>(Vec<T>);

impl<T: RealField + Copy> KnotVector<T> {
    pub fn new(knots: Vec<T>) -> Self {
        Self(knots)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.0.clone()
    }

    pub fn first(&self) -> T {
        self.0[0]
    }

    pub fn last(&self) -> T {
        self.0[self.0.len() - 1]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<T> {
        self.0.iter()
    }

    /// Check that the sequence is non-decreasing.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.windows(2).all(|w| w[0] <= w[1])
    }

    /// Get the domain of the knot vector by degree
    pub fn domain(&self, degree: usize) -> (T, T) {
        (self.0[degree], self.0[self.0.len() - 1 - degree])
    }

    /// Collect the distinct knot values together with their run lengths
    /// # Example
    /// ```
    /// use surfo::prelude::KnotVector;
    /// let knots = KnotVector::new(vec![0., 0., 0., 1., 2., 3., 3., 3.]);
    /// let runs = knots.multiplicity();
    /// assert_eq!(runs[0].count, 3);
    /// assert_eq!(runs[1].count, 1);
    /// assert_eq!(runs[2].count, 1);
    /// assert_eq!(runs[3].count, 3);
    /// assert_eq!(runs[3].knot, 3.);
    /// ```
    pub fn multiplicity(&self) -> Vec<KnotMultiplicity<T>> {
        let mut runs: Vec<KnotMultiplicity<T>> = vec![];
        for knot in self.0.iter().copied() {
            let extends_last = runs
                .last()
                .map(|run| (knot - run.knot).abs() <= T::default_epsilon())
                .unwrap_or(false);
            if extends_last {
                runs.last_mut().unwrap().count += 1;
            } else {
                runs.push(KnotMultiplicity { knot, count: 1 });
            }
        }
        runs
    }

    /// Get the multiplicity of a single knot value.
    pub fn multiplicity_at(&self, knot: T) -> usize {
        self.0
            .iter()
            .filter(|k| (**k - knot).abs() < T::default_epsilon())
            .count()
    }

    /// Check if the knot vector is clamped
    /// `clamped` means the first and last knots have a multiplicity greater than the degree
    /// e.g. [0, 0, 0, 1, 2, 3, 3, 3] with degree 2 is clamped
    pub fn is_clamped(&self, degree: usize) -> bool {
        let runs = self.multiplicity();
        match (runs.first(), runs.last()) {
            (Some(start), Some(end)) => start.count > degree && end.count > degree,
            _ => false,
        }
    }

    /// Find the knot span index by binary search
    ///
    /// # Example
    /// ```
    /// use surfo::prelude::KnotVector;
    /// let knots = KnotVector::new(vec![0., 0., 0., 1., 2., 3., 3., 3.]);
    /// let idx = knots.find_knot_span_index(6, 2, 2.5);
    /// assert_eq!(idx, 4);
    /// ```
    pub fn find_knot_span_index(&self, n: usize, degree: usize, u: T) -> usize {
        if u > self[n + 1] - T::default_epsilon() {
            return n;
        }

        if u < self[degree] + T::default_epsilon() {
            return degree;
        }

        // binary search
        let mut low = degree;
        let mut high = n + 1;
        let mut mid = ((low + high) as f64 / 2.).floor() as usize;
        while u < self[mid] || self[mid + 1] <= u {
            if u < self[mid] {
                high = mid;
            } else {
                low = mid;
            }
            let next = ((low + high) as f64 / 2.).floor() as usize;
            if mid == next {
                break;
            }
            mid = next;
        }

        mid
    }

    /// Compute the non-vanishing basis functions
    pub fn basis_functions(&self, knot_span_index: usize, u: T, degree: usize) -> Vec<T> {
        let mut basis_functions = vec![T::zero(); degree + 1];
        let mut left = vec![T::zero(); degree + 1];
        let mut right = vec![T::zero(); degree + 1];

        basis_functions[0] = T::one();

        for j in 1..=degree {
            left[j] = u - self[knot_span_index + 1 - j];
            right[j] = self[knot_span_index + j] - u;
            let mut saved = T::zero();

            for r in 0..j {
                let temp = basis_functions[r] / (right[r + 1] + left[j - r]);
                basis_functions[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }

            basis_functions[j] = saved;
        }

        basis_functions
    }

    /// Compute the non-vanishing basis functions and their derivatives
    /// 2d array of basis and derivative values of size (n+1, p+1) The nth row is the nth derivative and the first row is made up of the basis function values.
    pub fn derivative_basis_functions(
        &self,
        knot_index: usize,
        u: T,
        degree: usize,
        n: usize, // integer number of basis functions - 1 = knots.length - degree - 2
    ) -> Vec<Vec<T>> {
        let mut ndu = vec![vec![T::zero(); degree + 1]; degree + 1];
        let mut left = vec![T::zero(); degree + 1];
        let mut right = vec![T::zero(); degree + 1];

        ndu[0][0] = T::one();

        for j in 1..=degree {
            left[j] = u - self[knot_index + 1 - j];
            right[j] = self[knot_index + j] - u;

            let mut saved = T::zero();
            for r in 0..j {
                // lower triangle
                ndu[j][r] = right[r + 1] + left[j - r];
                let temp = ndu[r][j - 1] / ndu[j][r];

                // upper triangle
                ndu[r][j] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            ndu[j][j] = saved;
        }

        let mut ders = vec![vec![T::zero(); degree + 1]; n + 1];
        let mut a = vec![vec![T::zero(); degree + 1]; 2];

        // load the basis functions
        for j in 0..=degree {
            ders[0][j] = ndu[j][degree];
        }

        let idegree = degree as isize;
        let n = n as isize;

        // compute the derivatives
        for r in 0..=idegree {
            // alternate rows in array a
            let mut s1 = 0;
            let mut s2 = 1;
            a[0][0] = T::one();

            // loop to compute the kth derivative
            for k in 1..=n {
                let mut d = T::zero();
                let rk = r - k;
                let pk = idegree - k;

                if r >= k {
                    a[s2][0] = a[s1][0] / ndu[(pk + 1) as usize][rk as usize];
                    d = a[s2][0] * ndu[rk as usize][pk as usize];
                }

                let j1 = if rk >= -1 { 1 } else { -rk };
                let j2 = if r - 1 <= pk { k - 1 } else { idegree - r };

                for j in j1..=j2 {
                    a[s2][j as usize] = (a[s1][j as usize] - a[s1][j as usize - 1])
                        / ndu[(pk + 1) as usize][(rk + j) as usize];
                    d += a[s2][j as usize] * ndu[(rk + j) as usize][pk as usize];
                }

                let uk = k as usize;
                let ur = r as usize;
                if r <= pk {
                    a[s2][uk] = -a[s1][(k - 1) as usize] / ndu[(pk + 1) as usize][ur];
                    d += a[s2][uk] * ndu[ur][pk as usize];
                }

                ders[uk][ur] = d;

                // switch rows
                std::mem::swap(&mut s1, &mut s2);
            }
        }

        let mut acc = idegree;
        for k in 1..=n {
            for j in 0..=idegree {
                ders[k as usize][j as usize] *= T::from_isize(acc).unwrap();
            }
            acc *= idegree - k;
        }
        ders
    }

    /// Evaluate a single basis function N_{i,p} at `u`.
    pub fn one_basis_function(&self, i: usize, degree: usize, u: T) -> T {
        let m = self.len() - 1;

        // corner cases: the ends of a clamped knot vector interpolate
        if (i == 0 && (u - self[0]).abs() < T::default_epsilon())
            || (i == m - degree - 1 && (u - self[m]).abs() < T::default_epsilon())
        {
            return T::one();
        }

        if u < self[i] || u >= self[i + degree + 1] {
            return T::zero();
        }

        // degree zero table
        let mut n = (0..=degree)
            .map(|j| {
                if u >= self[i + j] && u < self[i + j + 1] {
                    T::one()
                } else {
                    T::zero()
                }
            })
            .collect::<Vec<_>>();

        // triangular table
        for k in 1..=degree {
            let mut saved = if n[0] == T::zero() {
                T::zero()
            } else {
                (u - self[i]) * n[0] / (self[i + k] - self[i])
            };

            for j in 0..(degree - k + 1) {
                let u_left = self[i + j + 1];
                let u_right = self[i + j + k + 1];
                if n[j + 1] == T::zero() {
                    n[j] = saved;
                    saved = T::zero();
                } else {
                    let temp = n[j + 1] / (u_right - u_left);
                    n[j] = saved + (u_right - u) * temp;
                    saved = (u - u_left) * temp;
                }
            }
        }

        n[0]
    }
}

impl<T> Index<usize> for KnotVector<T> {
    type Output = T;
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<T> FromIterator<T> for KnotVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T> From<Vec<T>> for KnotVector<T> {
    fn from(knots: Vec<T>) -> Self {
        Self(knots)
    }
}

impl<T: FloatingPoint> Invertible for KnotVector<T> {
    /// Reverses the knot vector
    /// # Example
    /// ```
    /// use surfo::prelude::*;
    /// let mut knot = KnotVector::new(vec![0., 0., 0., 1., 2., 2.5, 3.5, 4.0, 4.0]);
    /// knot.invert();
    ///
    /// let dst = vec![0.0, 0.0, 0.5, 1.5, 2.0, 3.0, 4.0, 4.0, 4.0];
    /// knot.iter().enumerate().for_each(|(i, v)| {
    ///     assert_eq!(*v, dst[i]);
    /// });
    /// ```
    fn invert(&mut self) {
        let min = self.0.first().unwrap();

        let mut next = vec![*min];
        let len = self.len();
        for i in 1..len {
            next.push(next[i - 1] + (self[len - i] - self[len - i - 1]));
        }

        self.0 = next;
    }
}

/// Merge two knot vectors into their sorted multiset union.
fn sorted_union<T: RealField + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    let mut merged = Vec::new();
    let mut ai = 0;
    let mut bi = 0;
    while ai < a.len() || bi < b.len() {
        if ai >= a.len() {
            merged.push(b[bi]);
            bi += 1;
            continue;
        } else if bi >= b.len() {
            merged.push(a[ai]);
            ai += 1;
            continue;
        }

        let diff = a[ai] - b[bi];

        if diff.abs() < T::default_epsilon() {
            merged.push(a[ai]);
            ai += 1;
            bi += 1;
            continue;
        }

        if diff > T::zero() {
            // add the smaller value
            merged.push(b[bi]);
            bi += 1;
            continue;
        }

        merged.push(a[ai]);
        ai += 1;
    }

    merged
}

/// Multiset difference of two sorted sequences.
fn sorted_sub<T: RealField + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    let mut result = Vec::new();
    let mut ai = 0;
    let mut bi = 0;

    while ai < a.len() {
        if bi >= b.len() {
            result.push(a[ai]);
            ai += 1;
            continue;
        }

        if (a[ai] - b[bi]).abs() < T::default_epsilon() {
            ai += 1;
            bi += 1;
            continue;
        }

        result.push(a[ai]);
        ai += 1;
    }

    result
}

/// Compute the knots each of two knot vectors is missing relative to their
/// common multiset union.
/// Refining the first vector with the first list and the second with the
/// second yields identical knot vectors.
pub fn inserted_knot_elements<T: RealField + Copy>(
    a: &KnotVector<T>,
    b: &KnotVector<T>,
) -> (Vec<T>, Vec<T>) {
    let merged = sorted_union(a.as_slice(), b.as_slice());
    (
        sorted_sub(&merged, a.as_slice()),
        sorted_sub(&merged, b.as_slice()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knot_span() {
        let knot = KnotVector::new(vec![0., 0., 0., 1., 2., 3., 3., 3.]);
        assert_eq!(knot.find_knot_span_index(6, 2, 2.5), 4);
        assert_eq!(knot.find_knot_span_index(6, 2, 0.), 2);
        assert_eq!(knot.find_knot_span_index(6, 2, 3.), 6);
    }

    #[test]
    fn basis_partition_of_unity() {
        let knot = KnotVector::new(vec![0., 0., 0., 0.5, 1., 1., 1.]);
        let span = knot.find_knot_span_index(3, 2, 0.3);
        let basis = knot.basis_functions(span, 0.3, 2);
        let sum: f64 = basis.iter().sum();
        assert!((sum - 1.).abs() < 1e-12);
    }

    #[test]
    fn one_basis_function_matches_table() {
        let knot: KnotVector<f64> = KnotVector::new(vec![0., 0., 0., 0.5, 1., 1., 1.]);
        let u = 0.3;
        let span = knot.find_knot_span_index(3, 2, u);
        let basis = knot.basis_functions(span, u, 2);
        for (k, b) in basis.iter().enumerate() {
            let i = span - 2 + k;
            assert!((knot.one_basis_function(i, 2, u) - b).abs() < 1e-12);
        }
        assert_eq!(knot.one_basis_function(0, 2, 0.), 1.);
        assert_eq!(knot.one_basis_function(3, 2, 1.), 1.);
    }

    #[test]
    fn missing_knots() {
        let a = KnotVector::new(vec![0., 0., 0.5, 1., 1.]);
        let b = KnotVector::new(vec![0., 0., 0.25, 0.5, 0.5, 1., 1.]);
        let (from_a, from_b) = inserted_knot_elements(&a, &b);
        assert_eq!(from_a, vec![0.25, 0.5]);
        assert!(from_b.is_empty());
    }
}
