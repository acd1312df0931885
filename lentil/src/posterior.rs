use crate::error::LikelihoodError;
use ndarray::{Array1, ArrayView1, Axis};

/// Posterior samples of a single event: named columns of equal length
///
/// Column order is the insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PosteriorSamples {
    names: Vec<Box<str>>,
    columns: Vec<Array1<f64>>,
}

impl PosteriorSamples {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, values)` pairs
    ///
    /// # Arguments
    /// * `columns` - column names and sample values, all of the same length
    ///
    /// # Examples
    ///
    /// ```
    /// use lentil::posterior::PosteriorSamples;
    /// let post = PosteriorSamples::from_columns(vec![
    ///     ("mass_1", vec![30.0, 35.0, 32.0]),
    ///     ("mass_ratio", vec![0.8, 0.7, 0.9]),
    /// ])
    /// .unwrap();
    /// assert_eq!(post.len(), 3);
    /// ```
    pub fn from_columns<S, V>(columns: Vec<(S, V)>) -> anyhow::Result<Self>
    where
        S: Into<Box<str>>,
        V: Into<Array1<f64>>,
    {
        let mut ret = Self::new();
        for (name, values) in columns {
            ret.push_column(name, values)?;
        }
        Ok(ret)
    }

    /// Append a column, or replace the values of an existing one
    pub fn push_column<S, V>(&mut self, name: S, values: V) -> anyhow::Result<()>
    where
        S: Into<Box<str>>,
        V: Into<Array1<f64>>,
    {
        let name: Box<str> = name.into();
        let values: Array1<f64> = values.into();

        if let Some(first) = self.columns.first() {
            if first.len() != values.len() {
                return Err(LikelihoodError::ShapeMismatch(format!(
                    "column `{}` has {} samples, expected {}",
                    name,
                    values.len(),
                    first.len()
                ))
                .into());
            }
        }

        match self.names.iter().position(|x| *x == name) {
            Some(j) => self.columns[j] = values,
            None => {
                self.names.push(name);
                self.columns.push(values);
            }
        }
        Ok(())
    }

    /// Number of samples (rows)
    pub fn len(&self) -> usize {
        self.columns.first().map(|x| x.len()).unwrap_or(0)
    }

    /// True when there are no samples
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column names in insertion order
    pub fn names(&self) -> &[Box<str>] {
        &self.names
    }

    /// Column by name
    pub fn column(&self, name: &str) -> Option<ArrayView1<f64>> {
        self.names
            .iter()
            .position(|x| x.as_ref() == name)
            .map(|j| self.columns[j].view())
    }

    /// `(name, column)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, ArrayView1<f64>)> {
        self.names
            .iter()
            .zip(self.columns.iter())
            .map(|(n, c)| (n.as_ref(), c.view()))
    }

    /// Keep the given rows (in the given order) across every column
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|x| x.select(Axis(0), rows))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_column_is_rejected() {
        let mut post = PosteriorSamples::from_columns(vec![("a", vec![1.0, 2.0])]).unwrap();
        let err = post.push_column("b", vec![1.0]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LikelihoodError>(),
            Some(LikelihoodError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn select_rows_keeps_alignment() {
        let post = PosteriorSamples::from_columns(vec![
            ("a", vec![0.0, 1.0, 2.0, 3.0]),
            ("b", vec![0.0, 10.0, 20.0, 30.0]),
        ])
        .unwrap();

        let sub = post.select_rows(&[3, 1]);
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.column("a").unwrap().to_vec(), vec![3.0, 1.0]);
        assert_eq!(sub.column("b").unwrap().to_vec(), vec![30.0, 10.0]);
    }

    #[test]
    fn push_existing_name_replaces() {
        let mut post = PosteriorSamples::from_columns(vec![("a", vec![1.0, 2.0])]).unwrap();
        post.push_column("a", vec![5.0, 6.0]).unwrap();
        assert_eq!(post.names().len(), 1);
        assert_eq!(post.column("a").unwrap().to_vec(), vec![5.0, 6.0]);
    }
}
