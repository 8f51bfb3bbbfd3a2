//! Shapiro-Wilk normality test.
//!
//! Royston's AS R94 approximation, the same one most statistics packages use:
//! coefficients from normal order-statistic expectations with polynomial
//! corrections for the two outermost weights, and a normalizing transform of
//! `W` for the p-value (exact for n = 3, log-gamma transform for n ≤ 11,
//! log-normal transform above that).
//!
//! Large samples are computed anyway; the approximation was fitted up to
//! n = 5000 and degrades gracefully past it.

use serde::Serialize;

const C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
const C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];
const C3: [f64; 4] = [0.5440, -0.39978, 0.025054, -6.714e-4];
const C4: [f64; 4] = [1.3822, -0.77857, 0.062767, -0.0020322];
const C5: [f64; 4] = [-1.5861, -0.31082, -0.083751, 0.0038915];
const C6: [f64; 3] = [-0.4803, -0.082676, 0.0030302];
const G: [f64; 2] = [-2.273, 0.459];

/// Plotting-position offset for the order-statistic expectations.
const TH: f64 = 0.375;
const PI6: f64 = 6.0 / std::f64::consts::PI;
const STQR: f64 = std::f64::consts::FRAC_PI_3;

/// Result of one test run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapiroWilk {
    pub w: f64,
    pub p_value: f64,
}

/// Reported normality decision. Both fields are `None` when the test could
/// not run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct NormalityTest {
    pub p_value: Option<f64>,
    pub is_normal: Option<bool>,
}

impl NormalityTest {
    pub fn decide(result: Option<ShapiroWilk>, alpha: f64) -> Self {
        match result {
            Some(test) => Self {
                p_value: Some(test.p_value),
                is_normal: Some(test.p_value > alpha),
            },
            None => Self::default(),
        }
    }
}

/// Run the test on unsorted data.
///
/// `None` for fewer than 3 values, non-finite values, or zero range.
pub fn shapiro_wilk(values: &[f64]) -> Option<ShapiroWilk> {
    let n = values.len();
    if n < 3 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mut x = values.to_vec();
    x.sort_by(f64::total_cmp);
    if x[n - 1] - x[0] <= f64::EPSILON * x[n - 1].abs().max(1.0) {
        return None;
    }

    let a = coefficients(n);

    let mean = x.iter().sum::<f64>() / n as f64;
    let ssq: f64 = x.iter().map(|v| (v - mean) * (v - mean)).sum();
    if ssq <= 0.0 {
        return None;
    }

    let numerator: f64 = a
        .iter()
        .enumerate()
        .map(|(i, ai)| ai * (x[n - 1 - i] - x[i]))
        .sum();
    let w = (numerator * numerator / ssq).min(1.0);

    Some(ShapiroWilk {
        w,
        p_value: p_value(w, n),
    })
}

/// The `n / 2` antisymmetric weights, largest first.
fn coefficients(n: usize) -> Vec<f64> {
    let half = n / 2;
    if n == 3 {
        return vec![std::f64::consts::FRAC_1_SQRT_2];
    }

    let an25 = n as f64 + 0.25;
    let m: Vec<f64> = (1..=half)
        .map(|i| inverse_normal_cdf((i as f64 - TH) / an25))
        .collect();
    let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
    let ssumm2 = summ2.sqrt();
    let rsn = 1.0 / (n as f64).sqrt();

    let a1 = poly(&C1, rsn) - m[0] / ssumm2;
    let mut a = vec![0.0; half];
    a[0] = a1;

    let (first_free, fac) = if n > 5 {
        let a2 = -m[1] / ssumm2 + poly(&C2, rsn);
        a[1] = a2;
        let fac = ((summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1])
            / (1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2))
            .sqrt();
        (2, fac)
    } else {
        let fac = ((summ2 - 2.0 * m[0] * m[0]) / (1.0 - 2.0 * a1 * a1)).sqrt();
        (1, fac)
    };

    for i in first_free..half {
        a[i] = -m[i] / fac;
    }
    a
}

fn p_value(w: f64, n: usize) -> f64 {
    if n == 3 {
        return (PI6 * (w.sqrt().asin() - STQR)).clamp(0.0, 1.0);
    }

    let an = n as f64;
    let mut y = (1.0 - w).ln();
    let (m, s) = if n <= 11 {
        let gamma = poly(&G, an);
        if y >= gamma {
            return 1e-99;
        }
        y = -(gamma - y).ln();
        (poly(&C3, an), poly(&C4, an).exp())
    } else {
        let ln_n = an.ln();
        (poly(&C5, ln_n), poly(&C6, ln_n).exp())
    };

    normal_upper_tail((y - m) / s)
}

/// `c[0] + c[1]·x + c[2]·x² + ...`
fn poly(c: &[f64], x: f64) -> f64 {
    c.iter().rev().fold(0.0, |acc, &ci| acc * x + ci)
}

/// P(Z > z) for a standard normal variable.
pub fn normal_upper_tail(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    if z == f64::NEG_INFINITY {
        return 1.0;
    }
    if z == f64::INFINITY {
        return 0.0;
    }
    0.5 * erfc(z / std::f64::consts::SQRT_2)
}

/// Complementary error function, fractional error below 1.2e-7.
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let ans = t
        * (-z * z - 1.26551223
            + t * (1.00002368
                + t * (0.37409196
                    + t * (0.09678418
                        + t * (-0.18628806
                            + t * (0.27886807
                                + t * (-1.13520398
                                    + t * (1.48851587
                                        + t * (-0.82215223 + t * 0.17087277)))))))))
            .exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Standard normal quantile for `p` in (0, 1), relative error about 1e-9.
pub fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p > 1.0 - P_LOW {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    } else {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    }
}
