//! Small vector helpers shared across the workspace.

/// Component-wise difference `a - b`.
///
/// Truncates to the shorter of the two inputs.
pub fn vector_sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b.iter()).map(|(x, y)| x - y).collect()
}

/// Euclidean length of `v`.
pub fn magnitude(v: &[f64]) -> f64 {
    v.iter().map(|c| c * c).sum::<f64>().sqrt()
}

/// Arithmetic mean of equal-length vectors; `None` for an empty input.
pub fn mean_vector<'a, I>(vectors: I) -> Option<Vec<f64>>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut iter = vectors.into_iter();
    let first = iter.next()?;
    let mut sum: Vec<f64> = first.to_vec();
    let mut count = 1usize;
    for v in iter {
        for (s, c) in sum.iter_mut().zip(v.iter()) {
            *s += c;
        }
        count += 1;
    }
    let n = count as f64;
    for s in sum.iter_mut() {
        *s /= n;
    }
    Some(sum)
}
