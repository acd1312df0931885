use crate::error::LikelihoodError;
use crate::posterior::PosteriorSamples;

use log::{debug, info, warn};
use ndarray::{stack, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

/// Posterior samples of all events laid out as `(n_events, n_samples)`
/// arrays, one per parameter name
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGrid {
    names: Vec<Box<str>>,
    columns: HashMap<Box<str>, Array2<f64>>,
    shape: (usize, usize),
}

impl SampleGrid {
    /// Assemble a grid from named arrays of the same shape
    pub fn from_columns<S>(columns: Vec<(S, Array2<f64>)>) -> anyhow::Result<Self>
    where
        S: Into<Box<str>>,
    {
        let mut names = Vec::with_capacity(columns.len());
        let mut map = HashMap::with_capacity(columns.len());
        let mut shape = None;

        for (name, values) in columns {
            let name: Box<str> = name.into();
            let dim = values.dim();
            match shape {
                None => shape = Some(dim),
                Some(expected) if expected != dim => {
                    return Err(LikelihoodError::ShapeMismatch(format!(
                        "column `{}` has shape {:?}, expected {:?}",
                        name, dim, expected
                    ))
                    .into());
                }
                _ => {}
            }
            if map.insert(name.clone(), values).is_none() {
                names.push(name);
            }
        }

        let shape = shape.ok_or_else(|| LikelihoodError::EmptyInput("no columns".into()))?;

        Ok(Self {
            names,
            columns: map,
            shape,
        })
    }

    /// Column by name; a missing column is an error, since population
    /// models and conversion functions rely on it being present
    pub fn column(&self, name: &str) -> anyhow::Result<ArrayView2<f64>> {
        self.columns
            .get(name)
            .map(|x| x.view())
            .ok_or_else(|| LikelihoodError::MissingColumn(name.into()).into())
    }

    /// Owned column by name, if present
    pub fn get(&self, name: &str) -> Option<&Array2<f64>> {
        self.columns.get(name)
    }

    /// True if `name` is a column
    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Column names in insertion order
    pub fn names(&self) -> &[Box<str>] {
        &self.names
    }

    /// `(n_events, n_samples)`
    pub fn dim(&self) -> (usize, usize) {
        self.shape
    }

    /// Number of events (rows)
    pub fn n_events(&self) -> usize {
        self.shape.0
    }

    /// Number of samples per event (columns)
    pub fn n_samples(&self) -> usize {
        self.shape.1
    }

    /// Samples of a single event as a table
    pub fn event(&self, i: usize) -> anyhow::Result<PosteriorSamples> {
        if i >= self.n_events() {
            anyhow::bail!("event {} out of range ({} events)", i, self.n_events());
        }
        let mut ret = PosteriorSamples::new();
        for name in self.names.iter() {
            ret.push_column(name.clone(), self.columns[name].row(i).to_owned())?;
        }
        Ok(ret)
    }
}

type PriorFn = dyn Fn(&PosteriorSamples) -> anyhow::Result<Array1<f64>> + Send + Sync;

/// Densities under which each event's posterior samples were drawn
pub enum SamplingPrior {
    /// One density array per event, aligned with the event's rows
    Densities(Vec<Array1<f64>>),
    /// A function applied to each event's table
    Function(Box<PriorFn>),
    /// A column of each event's table that holds the density
    Column(Box<str>),
    /// The same density for every sample
    Constant(f64),
}

impl SamplingPrior {
    /// Sampling prior computed from each event's table
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&PosteriorSamples) -> anyhow::Result<Array1<f64>> + Send + Sync + 'static,
    {
        Self::Function(Box::new(f))
    }

    /// Densities of every event, before any down-sampling
    fn evaluate(&self, posteriors: &[PosteriorSamples]) -> anyhow::Result<Vec<Array1<f64>>> {
        let densities = match self {
            SamplingPrior::Densities(dens) => {
                if dens.len() != posteriors.len() {
                    return Err(LikelihoodError::ShapeMismatch(format!(
                        "{} sampling prior arrays for {} events",
                        dens.len(),
                        posteriors.len()
                    ))
                    .into());
                }
                dens.clone()
            }
            SamplingPrior::Function(f) => posteriors
                .iter()
                .map(|post| f(post))
                .collect::<anyhow::Result<Vec<_>>>()?,
            SamplingPrior::Column(name) => posteriors
                .iter()
                .map(|post| {
                    post.column(name)
                        .map(|x| x.to_owned())
                        .ok_or_else(|| LikelihoodError::MissingColumn(name.clone()).into())
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
            SamplingPrior::Constant(value) => posteriors
                .iter()
                .map(|post| Array1::from_elem(post.len(), *value))
                .collect(),
        };

        for (i, (dens, post)) in densities.iter().zip(posteriors.iter()).enumerate() {
            if dens.len() != post.len() {
                return Err(LikelihoodError::ShapeMismatch(format!(
                    "event {} has {} samples but {} sampling prior densities",
                    i,
                    post.len(),
                    dens.len()
                ))
                .into());
            }
            if let Some((s, &value)) = dens
                .iter()
                .enumerate()
                .find(|(_, x)| x.is_nan() || **x < 0.0)
            {
                return Err(LikelihoodError::InvalidSamplingPrior {
                    event: i,
                    sample: s,
                    value,
                }
                .into());
            }
        }

        Ok(densities)
    }
}

/// Per-event posterior samples and their sampling-prior densities on a
/// uniform `(n_events, n_samples)` grid
///
/// Immutable once built; wrap in `Arc` to share between estimators.
#[derive(Debug, Clone)]
pub struct SampleStore {
    data: SampleGrid,
    sampling_prior: Array2<f64>,
}

impl SampleStore {
    /// Build the store, down-sampling every event to a common size
    ///
    /// # Arguments
    /// * `posteriors` - one table per event, all with the same columns
    /// * `sampling_prior` - densities under which the samples were drawn
    /// * `max_samples` - upper bound on the samples kept per event
    /// * `seed` - random seed of the down-sampling draw
    ///
    pub fn new(
        posteriors: &[PosteriorSamples],
        sampling_prior: &SamplingPrior,
        max_samples: Option<usize>,
        seed: u64,
    ) -> anyhow::Result<Self> {
        if posteriors.is_empty() {
            return Err(LikelihoodError::EmptyInput("no posteriors".into()).into());
        }

        let names: Vec<Box<str>> = posteriors[0].names().to_vec();
        if names.is_empty() {
            return Err(LikelihoodError::EmptyInput("posterior without columns".into()).into());
        }

        for (i, post) in posteriors.iter().enumerate() {
            if post.is_empty() {
                let msg = format!("event {} has no samples", i);
                return Err(LikelihoodError::EmptyInput(msg).into());
            }
            if let Some(missing) = names.iter().find(|x| post.column(x).is_none()) {
                return Err(LikelihoodError::MissingColumn(missing.clone()).into());
            }
            if post.names().len() != names.len() {
                return Err(LikelihoodError::ShapeMismatch(format!(
                    "event {} has {} columns, expected {}",
                    i,
                    post.names().len(),
                    names.len()
                ))
                .into());
            }
        }

        let densities = sampling_prior.evaluate(posteriors)?;

        let shortest = posteriors.iter().map(|x| x.len()).min().unwrap_or(0);
        let n_samples = match max_samples {
            Some(0) => {
                return Err(LikelihoodError::EmptyInput("max_samples = 0".into()).into());
            }
            Some(k) if k > shortest => {
                warn!(
                    "max_samples = {} exceeds the shortest posterior; keeping {} samples per event",
                    k, shortest
                );
                shortest
            }
            Some(k) => k,
            None => shortest,
        };

        info!(
            "Down-sampling {} posteriors to {} samples each",
            posteriors.len(),
            n_samples
        );

        let mut rng = StdRng::seed_from_u64(seed);

        let mut rows_per_event = Vec::with_capacity(posteriors.len());
        let mut prior_per_event = Vec::with_capacity(posteriors.len());

        for (i, (post, dens)) in posteriors.iter().zip(densities.iter()).enumerate() {
            if post.len() == n_samples {
                rows_per_event.push(post.clone());
                prior_per_event.push(dens.clone());
            } else {
                let rows = rand::seq::index::sample(&mut rng, post.len(), n_samples).into_vec();
                debug!("event {}: kept {} of {} samples", i, n_samples, post.len());
                rows_per_event.push(post.select_rows(&rows));
                prior_per_event.push(dens.select(Axis(0), &rows));
            }
        }

        let columns = names
            .iter()
            .map(|name| {
                let rows = rows_per_event
                    .iter()
                    .map(|post| {
                        post.column(name)
                            .ok_or_else(|| LikelihoodError::MissingColumn(name.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok::<_, anyhow::Error>((name.clone(), stack(Axis(0), &rows)?))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let prior_views: Vec<ArrayView1<f64>> = prior_per_event.iter().map(|x| x.view()).collect();
        let sampling_prior = stack(Axis(0), &prior_views)?;

        Ok(Self {
            data: SampleGrid::from_columns(columns)?,
            sampling_prior,
        })
    }

    /// Down-sampled posterior samples
    pub fn data(&self) -> &SampleGrid {
        &self.data
    }

    /// Sampling-prior densities, same shape as every data column
    pub fn sampling_prior(&self) -> &Array2<f64> {
        &self.sampling_prior
    }

    /// Number of events
    pub fn n_events(&self) -> usize {
        self.data.n_events()
    }

    /// Samples kept per event
    pub fn samples_per_event(&self) -> usize {
        self.data.n_samples()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, offset: f64) -> PosteriorSamples {
        let a: Vec<f64> = (0..n).map(|x| x as f64 + offset).collect();
        let b: Vec<f64> = a.iter().map(|x| 2.0 * x).collect();
        PosteriorSamples::from_columns(vec![("a", a), ("b", b)]).unwrap()
    }

    #[test]
    fn uneven_events_are_cut_to_the_shortest() {
        let posts = vec![ramp(50, 0.0), ramp(20, 100.0), ramp(35, 200.0)];
        let store = SampleStore::new(&posts, &SamplingPrior::Constant(1.0), None, 42).unwrap();

        assert_eq!(store.data().dim(), (3, 20));
        assert_eq!(store.sampling_prior().dim(), (3, 20));
        // the shortest event is kept as is
        assert_eq!(
            store.data().column("a").unwrap().row(1).to_vec(),
            (0..20).map(|x| x as f64 + 100.0).collect::<Vec<_>>()
        );
    }

    #[test]
    fn down_sampling_keeps_rows_aligned() {
        let posts = vec![ramp(100, 0.0), ramp(80, 0.0)];
        let prior = SamplingPrior::from_fn(|post: &PosteriorSamples| {
            Ok(post.column("a").unwrap().mapv(|x| x + 1.0))
        });
        let store = SampleStore::new(&posts, &prior, Some(10), 7).unwrap();

        let a = store.data().column("a").unwrap();
        let b = store.data().column("b").unwrap();
        let p = store.sampling_prior();

        assert_eq!(a.dim(), (2, 10));
        for i in 0..2 {
            for s in 0..10 {
                assert_eq!(b[(i, s)], 2.0 * a[(i, s)]);
                assert_eq!(p[(i, s)], a[(i, s)] + 1.0);
            }
            // without replacement
            let mut row = a.row(i).to_vec();
            row.sort_by(|x, y| x.partial_cmp(y).unwrap());
            row.dedup();
            assert_eq!(row.len(), 10);
        }
    }

    #[test]
    fn same_seed_same_draw() {
        let posts = vec![ramp(100, 0.0), ramp(100, 0.0)];
        let s1 = SampleStore::new(&posts, &SamplingPrior::Constant(1.0), Some(5), 3).unwrap();
        let s2 = SampleStore::new(&posts, &SamplingPrior::Constant(1.0), Some(5), 3).unwrap();
        assert_eq!(s1.data(), s2.data());
    }

    #[test]
    fn prior_column_is_read_from_the_table() {
        let mut post = ramp(4, 0.0);
        post.push_column("prior", vec![0.5, 0.25, 1.0, 2.0]).unwrap();
        let store =
            SampleStore::new(&[post], &SamplingPrior::Column("prior".into()), None, 0).unwrap();
        assert_eq!(
            store.sampling_prior().row(0).to_vec(),
            vec![0.5, 0.25, 1.0, 2.0]
        );
    }

    #[test]
    fn negative_prior_is_rejected() {
        let dens = vec![Array1::from(vec![1.0, -1.0, 1.0])];
        let err = SampleStore::new(&[ramp(3, 0.0)], &SamplingPrior::Densities(dens), None, 0)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<LikelihoodError>(),
            Some(&LikelihoodError::InvalidSamplingPrior {
                event: 0,
                sample: 1,
                value: -1.0
            })
        );
    }

    #[test]
    fn misaligned_densities_are_rejected() {
        let dens = vec![Array1::from(vec![1.0, 1.0])];
        let err = SampleStore::new(&[ramp(3, 0.0)], &SamplingPrior::Densities(dens), None, 0)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LikelihoodError>(),
            Some(LikelihoodError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn events_must_share_columns() {
        let other =
            PosteriorSamples::from_columns(vec![("a", vec![1.0]), ("c", vec![1.0])]).unwrap();
        let err =
            SampleStore::new(&[ramp(3, 0.0), other], &SamplingPrior::Constant(1.0), None, 0)
                .unwrap_err();
        assert_eq!(
            err.downcast_ref::<LikelihoodError>(),
            Some(&LikelihoodError::MissingColumn("b".into()))
        );
    }

    #[test]
    fn grid_event_round_trip() {
        let posts = vec![ramp(6, 0.0), ramp(6, 10.0)];
        let store = SampleStore::new(&posts, &SamplingPrior::Constant(1.0), None, 0).unwrap();
        assert_eq!(store.data().event(1).unwrap(), posts[1]);
        assert!(store.data().event(2).is_err());
    }
}
