use crate::sample_store::SampleGrid;
use crate::weights::ImportanceWeights;

use anyhow::Context;
use ndarray::Array2;
use rand::Rng;
use rand_distr::{weighted::WeightedIndex, Distribution};

/// Draw `n_draws` rows of every event with probability proportional to
/// the event's importance ratios
///
/// Returns a grid of shape `(n_events, n_draws)` with the same columns
/// as `data`. Fails if any event has no positive finite weight.
pub fn resample_by_weight<R: Rng + ?Sized>(
    data: &SampleGrid,
    weights: &ImportanceWeights,
    n_draws: usize,
    rng: &mut R,
) -> anyhow::Result<SampleGrid> {
    let (n_events, n_samples) = data.dim();
    if weights.ratios().dim() != (n_events, n_samples) {
        anyhow::bail!(
            "weights of shape {:?} for data of shape {:?}",
            weights.ratios().dim(),
            data.dim()
        );
    }

    let mut rows = Vec::with_capacity(n_events);
    for (i, w) in weights.ratios().rows().into_iter().enumerate() {
        let disc = WeightedIndex::new(w.iter().copied())
            .with_context(|| format!("cannot resample event {}", i))?;
        rows.push((0..n_draws).map(|_| disc.sample(&mut *rng)).collect::<Vec<_>>());
    }

    let columns = data
        .names()
        .iter()
        .map(|name| {
            let x = data.column(name)?;
            let drawn = Array2::from_shape_fn((n_events, n_draws), |(i, d)| x[(i, rows[i][d])]);
            Ok::<_, anyhow::Error>((name.clone(), drawn))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    SampleGrid::from_columns(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn only_weighted_rows_are_drawn() {
        let data = SampleGrid::from_columns(vec![
            ("a", array![[0.0, 1.0, 2.0], [10.0, 11.0, 12.0]]),
            ("b", array![[0.0, -1.0, -2.0], [-10.0, -11.0, -12.0]]),
        ])
        .unwrap();
        let weights = ImportanceWeights::from_ratios(array![[0.0, 3.0, 0.0], [1.0, 0.0, 1.0]]);

        let mut rng = StdRng::seed_from_u64(1);
        let out = resample_by_weight(&data, &weights, 200, &mut rng).unwrap();

        assert_eq!(out.dim(), (2, 200));
        let a = out.column("a").unwrap();
        let b = out.column("b").unwrap();
        assert!(a.row(0).iter().all(|&x| x == 1.0));
        assert!(a.row(1).iter().all(|&x| x == 10.0 || x == 12.0));
        assert!(a.row(1).iter().any(|&x| x == 10.0));
        assert!(a.row(1).iter().any(|&x| x == 12.0));
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(*x, -*y);
        }
    }

    #[test]
    fn zero_weights_cannot_be_resampled() {
        let data = SampleGrid::from_columns(vec![("a", array![[1.0, 2.0]])]).unwrap();
        let weights = ImportanceWeights::from_ratios(array![[0.0, 0.0]]);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(resample_by_weight(&data, &weights, 5, &mut rng).is_err());
    }
}
