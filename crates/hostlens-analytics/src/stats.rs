//! Small numeric helpers shared by the pipelines.

/// Arithmetic mean; NaN for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance; NaN for an empty slice.
#[must_use]
pub fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Mean absolute error between parallel slices.
#[must_use]
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (p - a).abs())
        .collect();
    mean(&errors)
}

/// Coefficient of determination `1 - SS_res / SS_tot`.
///
/// NaN when the actual values are constant (or empty).
#[must_use]
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    let Some(first) = actual.first().copied() else {
        return f64::NAN;
    };
    if actual.iter().all(|v| (v - first).abs() <= f64::EPSILON * first.abs()) {
        return f64::NAN;
    }
    let m = mean(actual);
    let ss_tot: f64 = actual.iter().map(|a| (a - m).powi(2)).sum();
    if ss_tot <= 0.0 {
        return f64::NAN;
    }
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

/// Percentile with linear interpolation between closest ranks.
///
/// `q` is in `[0, 100]`. NaN for an empty slice.
#[must_use]
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Average path length of an unsuccessful search in a binary search tree of
/// `n` nodes. Normalizes isolation depths.
#[must_use]
pub fn average_path_length(n: usize) -> f64 {
    const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Z-score standardizes each column in place using the population standard
/// deviation. Zero-variance columns are only centered.
pub fn standardize(rows: &mut [Vec<f64>]) {
    let Some(width) = rows.first().map(Vec::len) else {
        return;
    };
    for col in 0..width {
        let column: Vec<f64> = rows.iter().map(|r| r[col]).collect();
        let m = mean(&column);
        let sd = variance(&column).sqrt();
        for row in rows.iter_mut() {
            row[col] -= m;
            if sd > 0.0 {
                row[col] /= sd;
            }
        }
    }
}

/// Squared Euclidean distance.
#[must_use]
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// An affine model `y = intercept + coefficients · x`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    /// Constant term.
    pub intercept: f64,
    /// One weight per feature.
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    /// Fits ordinary least squares with an intercept.
    ///
    /// Solves the centered normal equations by Gauss-Jordan elimination with
    /// partial pivoting. Columns that are (numerically) linear combinations of
    /// earlier ones get a zero weight, so rank-deficient designs still fit.
    #[must_use]
    pub fn fit(features: &[Vec<f64>], targets: &[f64]) -> Self {
        let n = targets.len();
        let p = features.first().map_or(0, Vec::len);
        if n == 0 {
            return Self {
                intercept: 0.0,
                coefficients: vec![0.0; p],
            };
        }

        let x_mean: Vec<f64> = (0..p)
            .map(|j| features.iter().map(|r| r[j]).sum::<f64>() / n as f64)
            .collect();
        let y_mean = mean(targets);

        // Normal equations on centered data.
        let mut a = vec![vec![0.0; p]; p];
        let mut b = vec![0.0; p];
        for (row, y) in features.iter().zip(targets) {
            let yc = y - y_mean;
            for i in 0..p {
                let xi = row[i] - x_mean[i];
                b[i] += xi * yc;
                for j in i..p {
                    a[i][j] += xi * (row[j] - x_mean[j]);
                }
            }
        }
        for i in 0..p {
            for j in 0..i {
                a[i][j] = a[j][i];
            }
        }

        let coefficients = solve_dropping_dependent(a, b);
        let intercept = y_mean
            - coefficients
                .iter()
                .zip(&x_mean)
                .map(|(c, m)| c * m)
                .sum::<f64>();

        Self {
            intercept,
            coefficients,
        }
    }

    /// Predicts one row.
    #[must_use]
    pub fn predict(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }
}

fn solve_dropping_dependent(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let p = b.len();
    let scale = (0..p).map(|i| a[i][i].abs()).fold(0.0, f64::max);
    let tol = scale * 1e-10;

    let mut pivot_cols = Vec::with_capacity(p);
    let mut row = 0;
    for col in 0..p {
        if row == p {
            break;
        }
        let Some(pivot) = (row..p).max_by(|x, y| a[*x][col].abs().total_cmp(&a[*y][col].abs()))
        else {
            break;
        };
        if a[pivot][col].abs() <= tol {
            continue;
        }
        a.swap(row, pivot);
        b.swap(row, pivot);

        let d = a[row][col];
        for v in &mut a[row] {
            *v /= d;
        }
        b[row] /= d;

        for r in 0..p {
            if r == row {
                continue;
            }
            let factor = a[r][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..p {
                a[r][c] -= factor * a[row][c];
            }
            b[r] -= factor * b[row];
        }
        pivot_cols.push(col);
        row += 1;
    }

    let mut solution = vec![0.0; p];
    for (r, col) in pivot_cols.into_iter().enumerate() {
        solution[col] = b[r];
    }
    solution
}
