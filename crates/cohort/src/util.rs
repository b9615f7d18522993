use std::cmp::Ordering;

/// Return the widest `(left, right)` index range of a sorted slice that may
/// contain values between `low` and `high`. Callers still need to filter the
/// returned range for exact bounds.
pub fn binary_search_slice<T, F, S>(slice: &[T], key: F, low: S, high: S) -> (usize, usize)
where
    F: Fn(&T, &S) -> Ordering,
{
    let left_idx = match slice.binary_search_by(|a| key(a, &low)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx.saturating_sub(1);
            while idx > 0 && key(&slice[idx], &low) != Ordering::Less {
                idx -= 1;
            }
            idx
        }
    };

    let right_idx = match slice[left_idx..].binary_search_by(|a| key(a, &high)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx + left_idx;
            while idx < slice.len() && key(&slice[idx], &high) != Ordering::Greater {
                idx = idx.saturating_add(1);
            }
            idx.min(slice.len())
        }
    };
    (left_idx, right_idx)
}

/// Split a slice, already sorted by `key`, into runs where every element is
/// within `tol` of its predecessor. Runs are chained: a run can span more than
/// `tol` in total width.
pub fn chained_runs<T, F>(items: Vec<T>, key: F, tol: f64) -> Vec<Vec<T>>
where
    F: Fn(&T) -> f64,
{
    let mut runs: Vec<Vec<T>> = Vec::new();
    let mut last: Option<f64> = None;
    for item in items {
        let k = key(&item);
        match (last, runs.last_mut()) {
            (Some(prev), Some(run)) if k - prev < tol => run.push(item),
            _ => runs.push(vec![item]),
        }
        last = Some(k);
    }
    runs
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn binary_search_slice_smoke() {
        let data = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0];
        let bounds = binary_search_slice(&data, |a: &f64, b| a.total_cmp(b), 1.75, 3.5);
        assert_eq!(bounds, (1, 6));
        assert_eq!(&data[bounds.0..bounds.1], &[1.5, 2.0, 2.5, 3.0, 3.5]);

        let bounds = binary_search_slice(&data, |a: &f64, b| a.total_cmp(b), 0.0, 5.0);
        assert_eq!(bounds, (0, data.len()));

        let empty: [f64; 0] = [];
        assert_eq!(
            binary_search_slice(&empty, |a: &f64, b| a.total_cmp(b), 0.0, 1.0),
            (0, 0)
        );
    }

    #[test]
    fn runs_are_chained() {
        let runs = chained_runs(vec![1.0, 1.008, 1.016, 1.024, 2.0], |x| *x, 0.01);
        assert_eq!(runs, vec![vec![1.0, 1.008, 1.016, 1.024], vec![2.0]]);

        // Boundary is exclusive
        let runs = chained_runs(vec![1.0, 1.5], |x| *x, 0.5);
        assert_eq!(runs.len(), 2);

        assert!(chained_runs(Vec::<f64>::new(), |x| *x, 0.1).is_empty());
    }
}
