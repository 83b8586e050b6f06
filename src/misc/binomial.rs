use nalgebra::RealField;

/// Binomial coefficients served from Pascal's triangle.
///
/// The derivative quotient rule and the degree alteration algorithms look
/// the same small coefficients up over and over, so the triangle is grown
/// row by row on demand and kept for the lifetime of the operation.
pub struct Binomial<T> {
    rows: Vec<Vec<T>>,
}

impl<T: RealField + Copy> Binomial<T> {
    pub fn new() -> Self {
        Self {
            rows: vec![vec![T::one()]],
        }
    }

    /// Returns the binomial coefficient of `n` and `k`.
    pub fn get(&mut self, n: usize, k: usize) -> T {
        if k > n {
            return T::zero();
        }

        while self.rows.len() <= n {
            let prev = self.rows.last().unwrap();
            let mut row = Vec::with_capacity(prev.len() + 1);
            row.push(T::one());
            for i in 1..prev.len() {
                row.push(prev[i - 1] + prev[i]);
            }
            row.push(T::one());
            self.rows.push(row);
        }

        self.rows[n][k]
    }
}

impl<T: RealField + Copy> Default for Binomial<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Binomial;

    #[test]
    fn pascal_rows() {
        let mut binomial = Binomial::<f64>::new();
        assert_eq!(binomial.get(0, 0), 1.);
        assert_eq!(binomial.get(5, 0), 1.);
        assert_eq!(binomial.get(5, 1), 5.);
        assert_eq!(binomial.get(5, 2), 10.);
        assert_eq!(binomial.get(5, 3), 10.);
        assert_eq!(binomial.get(5, 4), 5.);
        assert_eq!(binomial.get(5, 5), 1.);
        assert_eq!(binomial.get(5, 6), 0.);
        // rows are reused once grown
        assert_eq!(binomial.get(3, 2), 3.);
        assert_eq!(binomial.get(7, 3), 35.);
    }
}
