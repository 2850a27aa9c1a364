use std::collections::BTreeMap;

pub fn mean(values: &[f64]) -> Option<f64> {
    let present = present(values);
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Quantile with linear interpolation between closest ranks, ignoring NaN.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = present(values);
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

fn present(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|value| !value.is_nan()).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub key: String,
    pub count: usize,
    pub medians: Vec<f64>,
    pub means: Vec<f64>,
}

pub fn summarize_by<'a, I>(rows: I, columns: usize) -> Vec<GroupSummary>
where
    I: IntoIterator<Item = (&'a str, &'a [f64])>,
{
    let mut groups: BTreeMap<&str, Vec<&[f64]>> = BTreeMap::new();
    for (key, values) in rows {
        groups.entry(key).or_default().push(values);
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let column_values = |column: usize| {
                members
                    .iter()
                    .map(|values| values.get(column).copied().unwrap_or(f64::NAN))
                    .collect::<Vec<_>>()
            };
            let medians = (0..columns)
                .map(|column| median(&column_values(column)).unwrap_or(f64::NAN))
                .collect();
            let means = (0..columns)
                .map(|column| mean(&column_values(column)).unwrap_or(f64::NAN))
                .collect();
            GroupSummary {
                key: key.to_string(),
                count: members.len(),
                medians,
                means,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn quantile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 10.0];
        assert_relative_eq!(quantile(&values, 0.9).unwrap(), 7.6, epsilon = 1e-12);
        assert_relative_eq!(median(&values).unwrap(), 3.0);
        assert_relative_eq!(median(&[4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5);
        assert!(quantile(&[], 0.5).is_none());
        assert!(quantile(&values, 1.5).is_none());
    }

    #[test]
    fn nan_values_are_skipped() {
        assert_relative_eq!(mean(&[1.0, f64::NAN, 3.0]).unwrap(), 2.0);
        assert!(mean(&[f64::NAN]).is_none());
    }

    #[test]
    fn groups_are_sorted_and_counted() {
        let a = [1.0, 10.0];
        let b = [3.0, 30.0];
        let c = [5.0, 50.0];
        let rows = vec![
            ("Stage_II", &a[..]),
            ("Stage_I", &b[..]),
            ("Stage_II", &c[..]),
        ];
        let summary = summarize_by(rows, 2);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].key, "Stage_I");
        assert_eq!(summary[1].count, 2);
        assert_relative_eq!(summary[1].medians[0], 3.0);
        assert_relative_eq!(summary[1].means[1], 30.0);
    }
}
