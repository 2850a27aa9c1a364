use std::fmt::Write as _;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::Serialize;

use crate::error::SkcmError;

const Z_975: f64 = 1.959_963_984_540_054;

/// Follow-up times, event indicators and covariates of a cohort.
#[derive(Debug, Clone)]
pub struct SurvivalData {
    times: Array1<f64>,
    events: Vec<bool>,
    covariates: Array2<f64>,
    names: Vec<String>,
}

impl SurvivalData {
    pub fn new(
        times: Vec<f64>,
        events: Vec<bool>,
        covariates: Array2<f64>,
        names: Vec<String>,
    ) -> Result<Self, SkcmError> {
        let n_samples = times.len();
        if events.len() != n_samples {
            return Err(SkcmError::InvalidDimensions(format!(
                "times len ({n_samples}) != events len ({})",
                events.len()
            )));
        }
        if covariates.nrows() != n_samples {
            return Err(SkcmError::InvalidDimensions(format!(
                "covariate rows ({}) != n_samples ({n_samples})",
                covariates.nrows()
            )));
        }
        if covariates.ncols() == 0 || names.len() != covariates.ncols() {
            return Err(SkcmError::InvalidDimensions(format!(
                "{} covariate names for {} columns",
                names.len(),
                covariates.ncols()
            )));
        }
        if times.iter().any(|time| !time.is_finite() || *time < 0.0) {
            return Err(SkcmError::InvalidSurvivalData(
                "survival times must be finite and non-negative".to_string(),
            ));
        }
        if covariates.iter().any(|value| !value.is_finite()) {
            return Err(SkcmError::InvalidSurvivalData(
                "covariates must be finite".to_string(),
            ));
        }
        if !events.iter().any(|event| *event) {
            return Err(SkcmError::InvalidSurvivalData(
                "at least one event is required".to_string(),
            ));
        }

        Ok(Self {
            times: Array1::from(times),
            events,
            covariates,
            names,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    pub fn n_features(&self) -> usize {
        self.covariates.ncols()
    }

    pub fn n_events(&self) -> usize {
        self.events.iter().filter(|event| **event).count()
    }

    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    pub fn events(&self) -> &[bool] {
        &self.events
    }

    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Cox proportional-hazards regression fitted by Newton-Raphson with Efron
/// tie handling and an optional ridge penalty.
#[derive(Debug, Clone)]
pub struct CoxModel {
    penalizer: f64,
    max_iterations: usize,
    tolerance: f64,
}

impl Default for CoxModel {
    fn default() -> Self {
        Self {
            penalizer: 0.0,
            max_iterations: 100,
            tolerance: 1e-9,
        }
    }
}

impl CoxModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ridge penalty `0.5 * penalizer * ||beta||^2`.
    pub fn with_penalizer(mut self, penalizer: f64) -> Self {
        self.penalizer = penalizer.max(0.0);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn penalizer(&self) -> f64 {
        self.penalizer
    }

    pub fn fit(&self, data: &SurvivalData) -> Result<CoxFit, SkcmError> {
        let centred = centre(data.covariates());
        let order = descending_time_order(data);
        let k = data.n_features();

        let mut beta = Array1::<f64>::zeros(k);
        let null = self.derivatives(data, &centred, &order, &beta)?;
        let null_log_likelihood = null.log_likelihood;
        let mut current = null;
        let mut iterations = 0usize;
        let mut converged = false;

        while iterations < self.max_iterations {
            iterations += 1;
            let delta = solve_linear_system(&current.information, &current.gradient)?;

            let mut step = 1.0;
            let mut candidate = &beta + &(&delta * step);
            let mut next = self.derivatives(data, &centred, &order, &candidate);
            for _ in 0..20 {
                let improved = matches!(
                    &next,
                    Ok(derivs) if derivs.penalized >= current.penalized - 1e-12
                );
                if improved {
                    break;
                }
                step *= 0.5;
                candidate = &beta + &(&delta * step);
                next = self.derivatives(data, &centred, &order, &candidate);
            }
            let next = next?;

            let change = (next.penalized - current.penalized).abs();
            let step_norm = (&delta * step).iter().map(|value| value * value).sum::<f64>().sqrt();
            tracing::debug!(
                iteration = iterations,
                log_likelihood = next.log_likelihood,
                step_norm,
                "newton step"
            );
            beta = candidate;
            current = next;
            if change < self.tolerance || step_norm < 1e-12 {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(SkcmError::NotConverged(iterations));
        }

        let variance = invert(&current.information)?;
        let standard_errors = variance
            .diag()
            .mapv(|value| if value > 0.0 { value.sqrt() } else { f64::NAN });
        let risk_scores = data.covariates().dot(&beta);
        let concordance = harrell_c_index(risk_scores.view(), data.times(), data.events())?;

        Ok(CoxFit {
            names: data.names().to_vec(),
            coefficients: beta,
            standard_errors,
            log_likelihood: current.log_likelihood,
            null_log_likelihood,
            concordance,
            iterations,
            penalizer: self.penalizer,
            n_samples: data.n_samples(),
            n_events: data.n_events(),
        })
    }

    fn derivatives(
        &self,
        data: &SurvivalData,
        centred: &Array2<f64>,
        order: &[usize],
        beta: &Array1<f64>,
    ) -> Result<Derivatives, SkcmError> {
        let mut derivs = efron_derivatives(data, centred, order, beta)?;
        if self.penalizer > 0.0 {
            derivs.penalized =
                derivs.log_likelihood - 0.5 * self.penalizer * beta.dot(beta);
            derivs.gradient = &derivs.gradient - &(beta * self.penalizer);
            for i in 0..beta.len() {
                derivs.information[[i, i]] += self.penalizer;
            }
        }
        Ok(derivs)
    }
}

#[derive(Debug, Clone)]
struct Derivatives {
    log_likelihood: f64,
    penalized: f64,
    gradient: Array1<f64>,
    information: Array2<f64>,
}

fn centre(covariates: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut centred = covariates.to_owned();
    for mut column in centred.columns_mut() {
        let mean = column.mean().unwrap_or(0.0);
        column.mapv_inplace(|value| value - mean);
    }
    centred
}

fn descending_time_order(data: &SurvivalData) -> Vec<usize> {
    let times = data.times();
    let mut order = (0..data.n_samples()).collect::<Vec<_>>();
    order.sort_by(|a, b| times[*b].total_cmp(&times[*a]));
    order
}

/// Partial log-likelihood, score and observed information under Efron's
/// approximation. Risk-set sums accumulate while walking times from the
/// latest to the earliest.
fn efron_derivatives(
    data: &SurvivalData,
    x: &Array2<f64>,
    order: &[usize],
    beta: &Array1<f64>,
) -> Result<Derivatives, SkcmError> {
    let k = x.ncols();
    let times = data.times();
    let events = data.events();

    let mut log_likelihood = 0.0;
    let mut gradient = Array1::<f64>::zeros(k);
    let mut information = Array2::<f64>::zeros((k, k));

    let mut risk0 = 0.0;
    let mut risk1 = Array1::<f64>::zeros(k);
    let mut risk2 = Array2::<f64>::zeros((k, k));

    let mut start = 0;
    while start < order.len() {
        let time = times[order[start]];
        let mut end = start;
        while end < order.len() && times[order[end]] == time {
            end += 1;
        }

        let mut tie0 = 0.0;
        let mut tie1 = Array1::<f64>::zeros(k);
        let mut tie2 = Array2::<f64>::zeros((k, k));
        let mut deaths = 0usize;

        for &i in &order[start..end] {
            let row = x.row(i);
            let eta = row.dot(beta);
            let weight = eta.exp();
            if !weight.is_finite() {
                return Err(SkcmError::Numerical(format!(
                    "risk score overflow at time {time}"
                )));
            }
            risk0 += weight;
            for a in 0..k {
                risk1[a] += weight * row[a];
                for b in 0..k {
                    risk2[[a, b]] += weight * row[a] * row[b];
                }
            }
            if events[i] {
                deaths += 1;
                log_likelihood += eta;
                gradient += &row;
                tie0 += weight;
                for a in 0..k {
                    tie1[a] += weight * row[a];
                    for b in 0..k {
                        tie2[[a, b]] += weight * row[a] * row[b];
                    }
                }
            }
        }

        for l in 0..deaths {
            let fraction = l as f64 / deaths as f64;
            let phi = risk0 - fraction * tie0;
            if phi <= 0.0 {
                return Err(SkcmError::Numerical(
                    "risk set sum is non-positive".to_string(),
                ));
            }
            let mean = (&risk1 - &(&tie1 * fraction)) / phi;
            log_likelihood -= phi.ln();
            gradient -= &mean;
            for a in 0..k {
                for b in 0..k {
                    information[[a, b]] +=
                        (risk2[[a, b]] - fraction * tie2[[a, b]]) / phi - mean[a] * mean[b];
                }
            }
        }

        start = end;
    }

    Ok(Derivatives {
        log_likelihood,
        penalized: log_likelihood,
        gradient,
        information,
    })
}

/// Solves `a x = b` by Gaussian elimination with partial pivoting.
fn solve_linear_system(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, SkcmError> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(SkcmError::InvalidDimensions(
            "matrix dimensions mismatch".to_string(),
        ));
    }
    let mut a = a.clone();
    let mut b = b.clone();

    for i in 0..n {
        let mut max_row = i;
        for r in i + 1..n {
            if a[[r, i]].abs() > a[[max_row, i]].abs() {
                max_row = r;
            }
        }
        if a[[max_row, i]].abs() < 1e-12 {
            return Err(SkcmError::Numerical("information matrix is singular".to_string()));
        }
        if max_row != i {
            for j in 0..n {
                a.swap([i, j], [max_row, j]);
            }
            b.swap(i, max_row);
        }
        for r in i + 1..n {
            let factor = a[[r, i]] / a[[i, i]];
            for j in i..n {
                a[[r, j]] -= factor * a[[i, j]];
            }
            b[r] -= factor * b[i];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut value = b[i];
        for j in i + 1..n {
            value -= a[[i, j]] * x[j];
        }
        x[i] = value / a[[i, i]];
    }
    Ok(x)
}

/// Inverse by solving against each unit vector.
fn invert(a: &Array2<f64>) -> Result<Array2<f64>, SkcmError> {
    let n = a.nrows();
    let mut inverse = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut unit = Array1::<f64>::zeros(n);
        unit[j] = 1.0;
        let column = solve_linear_system(a, &unit)?;
        inverse.column_mut(j).assign(&column);
    }
    Ok(inverse)
}

/// Harrell's C-index: among comparable pairs, the share where the subject
/// failing first has the higher risk score (ties in risk count half).
pub fn harrell_c_index(
    risk_scores: ArrayView1<'_, f64>,
    times: ArrayView1<'_, f64>,
    events: &[bool],
) -> Result<f64, SkcmError> {
    let n = risk_scores.len();
    if n != times.len() || n != events.len() {
        return Err(SkcmError::InvalidDimensions(
            "all arrays must have the same length".to_string(),
        ));
    }

    let mut concordant = 0.0;
    let mut discordant = 0.0;
    let mut tied_risk = 0.0;
    for i in 0..n {
        if !events[i] {
            continue;
        }
        for j in 0..n {
            if i == j {
                continue;
            }
            if times[j] > times[i] || (!events[j] && times[j] >= times[i]) {
                if risk_scores[i] > risk_scores[j] {
                    concordant += 1.0;
                } else if risk_scores[i] < risk_scores[j] {
                    discordant += 1.0;
                } else {
                    tied_risk += 1.0;
                }
            }
        }
    }

    let total = concordant + discordant + tied_risk;
    if total == 0.0 {
        return Err(SkcmError::Numerical(
            "no comparable pairs for the concordance index".to_string(),
        ));
    }
    Ok((concordant + 0.5 * tied_risk) / total)
}

/// A fitted model.
#[derive(Debug, Clone)]
pub struct CoxFit {
    names: Vec<String>,
    coefficients: Array1<f64>,
    standard_errors: Array1<f64>,
    log_likelihood: f64,
    null_log_likelihood: f64,
    concordance: f64,
    iterations: usize,
    penalizer: f64,
    n_samples: usize,
    n_events: usize,
}

impl CoxFit {
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    pub fn standard_errors(&self) -> ArrayView1<'_, f64> {
        self.standard_errors.view()
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Linear predictor `x . beta` for new rows.
    pub fn predict(&self, covariates: ArrayView2<'_, f64>) -> Result<Array1<f64>, SkcmError> {
        if covariates.ncols() != self.coefficients.len() {
            return Err(SkcmError::InvalidDimensions(format!(
                "feature count mismatch: expected {}, got {}",
                self.coefficients.len(),
                covariates.ncols()
            )));
        }
        Ok(covariates.dot(&self.coefficients))
    }

    pub fn summary(&self, duration_col: &str, event_col: &str) -> CoxSummary {
        let covariates = self
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let coef = self.coefficients[i];
                let se = self.standard_errors[i];
                let z = coef / se;
                let p = normal_two_sided_p(z);
                CoxCoefficient {
                    covariate: name.clone(),
                    coef,
                    exp_coef: coef.exp(),
                    se,
                    coef_lower_95: coef - Z_975 * se,
                    coef_upper_95: coef + Z_975 * se,
                    exp_coef_lower_95: (coef - Z_975 * se).exp(),
                    exp_coef_upper_95: (coef + Z_975 * se).exp(),
                    z,
                    p,
                    neg_log2_p: -p.log2(),
                }
            })
            .collect::<Vec<_>>();

        let k = covariates.len();
        let lr_statistic = (2.0 * (self.log_likelihood - self.null_log_likelihood)).max(0.0);
        let lr_p = chi_square_sf(lr_statistic, k as f64);

        CoxSummary {
            duration_col: duration_col.to_string(),
            event_col: event_col.to_string(),
            penalizer: self.penalizer,
            n_observations: self.n_samples,
            n_events: self.n_events,
            log_likelihood: self.log_likelihood,
            null_log_likelihood: self.null_log_likelihood,
            concordance: self.concordance,
            partial_aic: 2.0 * k as f64 - 2.0 * self.log_likelihood,
            lr_statistic,
            lr_df: k,
            lr_p,
            iterations: self.iterations,
            covariates,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CoxCoefficient {
    pub covariate: String,
    pub coef: f64,
    pub exp_coef: f64,
    pub se: f64,
    pub coef_lower_95: f64,
    pub coef_upper_95: f64,
    pub exp_coef_lower_95: f64,
    pub exp_coef_upper_95: f64,
    pub z: f64,
    pub p: f64,
    pub neg_log2_p: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoxSummary {
    pub duration_col: String,
    pub event_col: String,
    pub penalizer: f64,
    pub n_observations: usize,
    pub n_events: usize,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub concordance: f64,
    pub partial_aic: f64,
    pub lr_statistic: f64,
    pub lr_df: usize,
    pub lr_p: f64,
    pub iterations: usize,
    pub covariates: Vec<CoxCoefficient>,
}

impl CoxSummary {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let censored = self.n_observations - self.n_events;
        let _ = writeln!(
            out,
            "Cox proportional hazards model: fitted with {} total observations, {censored} right-censored observations",
            self.n_observations
        );
        let _ = writeln!(out, "{:>26} = '{}'", "duration col", self.duration_col);
        let _ = writeln!(out, "{:>26} = '{}'", "event col", self.event_col);
        let _ = writeln!(out, "{:>26} = {}", "penalizer", self.penalizer);
        let _ = writeln!(out, "{:>26} = {}", "number of observations", self.n_observations);
        let _ = writeln!(out, "{:>26} = {}", "number of events observed", self.n_events);
        let _ = writeln!(out, "{:>26} = {:.2}", "partial log-likelihood", self.log_likelihood);
        let _ = writeln!(out, "{:>26} = {}", "newton iterations", self.iterations);
        let _ = writeln!(out);
        let _ = writeln!(out, "---");

        let width = self
            .covariates
            .iter()
            .map(|row| row.covariate.len())
            .max()
            .unwrap_or(0)
            .max("covariate".len());
        let _ = writeln!(
            out,
            "{:<width$} {:>8} {:>10} {:>9} {:>15} {:>15} {:>20} {:>20} {:>7} {:>7} {:>9}",
            "covariate",
            "coef",
            "exp(coef)",
            "se(coef)",
            "coef lower 95%",
            "coef upper 95%",
            "exp(coef) lower 95%",
            "exp(coef) upper 95%",
            "z",
            "p",
            "-log2(p)",
        );
        for row in &self.covariates {
            let _ = writeln!(
                out,
                "{:<width$} {:>8.2} {:>10.2} {:>9.2} {:>15.2} {:>15.2} {:>20.2} {:>20.2} {:>7.2} {:>7} {:>9.2}",
                row.covariate,
                row.coef,
                row.exp_coef,
                row.se,
                row.coef_lower_95,
                row.coef_upper_95,
                row.exp_coef_lower_95,
                row.exp_coef_upper_95,
                row.z,
                format_p(row.p),
                row.neg_log2_p,
            );
        }
        let _ = writeln!(out, "---");
        let _ = writeln!(out, "{:>26} = {:.2}", "Concordance", self.concordance);
        let _ = writeln!(out, "{:>26} = {:.2}", "Partial AIC", self.partial_aic);
        let _ = writeln!(
            out,
            "{:>26} = {:.2} on {} df",
            "log-likelihood ratio test", self.lr_statistic, self.lr_df
        );
        let _ = writeln!(
            out,
            "{:>26} = {:.2}",
            "-log2(p) of ll-ratio test",
            -self.lr_p.log2()
        );
        out
    }
}

fn format_p(p: f64) -> String {
    if p < 0.005 {
        "<0.005".to_string()
    } else {
        format!("{p:.2}")
    }
}

/// Two-sided p-value of a standard normal statistic.
pub fn normal_two_sided_p(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    erfc(z.abs() / std::f64::consts::SQRT_2)
}

/// Complementary error function (Chebyshev fit, relative error below 1.2e-7).
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let value = t * poly.exp();
    if x >= 0.0 { value } else { 2.0 - value }
}

/// Survival function of the chi-square distribution with `df` degrees of
/// freedom.
pub fn chi_square_sf(statistic: f64, df: f64) -> f64 {
    if statistic <= 0.0 {
        return 1.0;
    }
    upper_regularized_gamma(df / 2.0, statistic / 2.0)
}

fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000_000_000_190_015;
    for coefficient in COEFFICIENTS {
        y += 1.0;
        series += coefficient / y;
    }
    -tmp + (2.506_628_274_631_000_5 * series / x).ln()
}

fn upper_regularized_gamma(a: f64, x: f64) -> f64 {
    const MAX_STEPS: usize = 500;
    const EPS: f64 = 1e-14;
    const TINY: f64 = 1e-300;
    let gln = ln_gamma(a);

    if x < a + 1.0 {
        let mut ap = a;
        let mut sum = 1.0 / a;
        let mut term = sum;
        for _ in 0..MAX_STEPS {
            ap += 1.0;
            term *= x / ap;
            sum += term;
            if term.abs() < sum.abs() * EPS {
                break;
            }
        }
        let lower = sum * (-x + a * x.ln() - gln).exp();
        return (1.0 - lower).clamp(0.0, 1.0);
    }

    let mut b = x + 1.0 - a;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=MAX_STEPS {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < TINY {
            d = TINY;
        }
        c = b + an / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    ((-x + a * x.ln() - gln).exp() * h).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use assert_matches::assert_matches;
    use ndarray::array;

    use super::*;

    fn data(times: Vec<f64>, events: Vec<bool>, x: Array2<f64>) -> SurvivalData {
        let names = (0..x.ncols()).map(|i| format!("x{i}")).collect();
        SurvivalData::new(times, events, x, names).unwrap()
    }

    #[test]
    fn single_covariate_matches_closed_form() {
        // l(b) = b - ln(2e^b + 1) - ln(1 + e^b), maximised at e^b = 1/sqrt(2).
        let data = data(
            vec![1.0, 2.0, 3.0],
            vec![true, true, true],
            array![[1.0], [0.0], [1.0]],
        );
        let fit = CoxModel::new().fit(&data).unwrap();
        assert_relative_eq!(fit.coefficients()[0], -0.5 * 2f64.ln(), epsilon = 1e-6);
        assert_relative_eq!(fit.standard_errors()[0], 1.435_5, epsilon = 1e-4);
        assert_relative_eq!(fit.log_likelihood(), -1.762_747_2, epsilon = 1e-6);

        let summary = fit.summary("days", "vital_status");
        assert_relative_eq!(summary.null_log_likelihood, -(6f64.ln()), epsilon = 1e-9);
        assert_relative_eq!(summary.concordance, 0.5);
        assert_eq!(summary.lr_df, 1);
        assert_relative_eq!(summary.lr_p, 0.809_646, epsilon = 1e-5);
    }

    #[test]
    fn scaling_a_covariate_scales_its_coefficient() {
        let times = vec![5.0, 8.0, 12.0, 3.0, 9.0, 15.0, 7.0, 20.0];
        let events = vec![true, false, true, true, true, false, true, false];
        let x = array![
            [1.0, 0.5],
            [0.0, 1.5],
            [2.0, 0.0],
            [3.0, 1.0],
            [1.0, 2.0],
            [0.0, 0.0],
            [2.0, 1.0],
            [0.0, 2.5]
        ];
        let base = CoxModel::new().fit(&data(times.clone(), events.clone(), x.clone())).unwrap();
        let mut scaled_x = x.clone();
        scaled_x.column_mut(0).mapv_inplace(|value| value * 2.0);
        let scaled = CoxModel::new().fit(&data(times, events, scaled_x)).unwrap();

        assert_relative_eq!(
            scaled.coefficients()[0] * 2.0,
            base.coefficients()[0],
            epsilon = 1e-6
        );
        assert_relative_eq!(scaled.coefficients()[1], base.coefficients()[1], epsilon = 1e-6);
        assert_relative_eq!(scaled.log_likelihood(), base.log_likelihood(), epsilon = 1e-8);
    }

    #[test]
    fn penalizer_shrinks_towards_zero() {
        let times = vec![5.0, 8.0, 12.0, 3.0, 9.0, 15.0];
        let events = vec![true, false, true, true, true, false];
        let x = array![[1.0], [2.0], [0.0], [2.0], [1.0], [0.0]];
        let free = CoxModel::new().fit(&data(times.clone(), events.clone(), x.clone())).unwrap();
        let ridge = CoxModel::new()
            .with_penalizer(1.0)
            .fit(&data(times, events, x))
            .unwrap();
        assert_relative_eq!(free.coefficients()[0], 1.476_274, epsilon = 1e-5);
        assert_relative_eq!(ridge.coefficients()[0], 0.769_937, epsilon = 1e-5);
    }

    #[test]
    fn efron_ties_reduce_to_breslow_for_single_deaths() {
        // With one death per time the tie correction has no effect, so the
        // likelihood at beta = 0 is the plain risk-set product.
        let data = data(
            vec![1.0, 2.0, 2.0, 4.0],
            vec![true, true, false, true],
            array![[0.3], [0.1], [0.7], [0.2]],
        );
        let centred = centre(data.covariates());
        let order = descending_time_order(&data);
        let derivs = efron_derivatives(&data, &centred, &order, &Array1::zeros(1)).unwrap();
        assert_relative_eq!(derivs.log_likelihood, -(4f64.ln() + 3f64.ln()), epsilon = 1e-12);
    }

    #[test]
    fn efron_tied_deaths_use_averaged_risk_sets() {
        // Two deaths at t = 1 among three subjects at beta = 0:
        // -ln(3) - ln(3 - 0.5 * 2) = -ln(6).
        let data = data(
            vec![1.0, 1.0, 3.0],
            vec![true, true, false],
            array![[1.0], [0.0], [0.5]],
        );
        let centred = centre(data.covariates());
        let order = descending_time_order(&data);
        let derivs = efron_derivatives(&data, &centred, &order, &Array1::zeros(1)).unwrap();
        assert_relative_eq!(derivs.log_likelihood, -(6f64.ln()), epsilon = 1e-12);
    }

    #[test]
    fn rejects_invalid_cohorts() {
        assert_matches!(
            SurvivalData::new(vec![1.0, -2.0], vec![true, true], array![[0.0], [1.0]], vec!["x".into()]),
            Err(SkcmError::InvalidSurvivalData(_))
        );
        assert_matches!(
            SurvivalData::new(vec![1.0, 2.0], vec![false, false], array![[0.0], [1.0]], vec!["x".into()]),
            Err(SkcmError::InvalidSurvivalData(_))
        );
        assert_matches!(
            SurvivalData::new(vec![1.0], vec![true, true], array![[0.0]], vec!["x".into()]),
            Err(SkcmError::InvalidDimensions(_))
        );
    }

    #[test]
    fn distribution_helpers() {
        assert_relative_eq!(normal_two_sided_p(1.959_963_984_540_054), 0.05, epsilon = 1e-6);
        assert_relative_eq!(normal_two_sided_p(0.0), 1.0, epsilon = 1e-6);
        assert_relative_eq!(chi_square_sf(3.841_458_820_694_124, 1.0), 0.05, epsilon = 1e-6);
        assert_relative_eq!(chi_square_sf(5.991_464_547_107_979, 2.0), 0.05, epsilon = 1e-8);
        assert_relative_eq!(chi_square_sf(0.0, 2.0), 1.0);
    }

    #[test]
    fn singular_information_is_reported() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert_matches!(
            solve_linear_system(&a, &array![1.0, 1.0]),
            Err(SkcmError::Numerical(_))
        );
    }
}
