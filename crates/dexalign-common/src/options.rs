//! The observation set: one row of basic-attribute scale values per
//! evaluated alternative, plus the metadata the prediction driver uses to
//! partition alternatives into learning sets.

use crate::error::{Error, ErrorKind};
use crate::scale::ScaleIndex;

/// Which metadata columns make two alternatives *related* (candidates for
/// each other's learning set).
///
/// The original study files come in two shapes: with and without a place
/// column. Which predicate is the intended one for place-less files is not
/// decidable from the data, so both are available and `Auto` picks by
/// presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelationRule {
    /// Use place only when the data carries places.
    #[default]
    Auto,
    /// Different department and different year.
    DepartmentYear,
    /// Different department, year and place. Requires places.
    DepartmentYearPlace,
}

/// The complete observation set.
///
/// The matrix is dense and row-major, one column per basic attribute in
/// the model's depth-first leaf order. Metadata vectors run parallel to
/// the rows.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub simulations: Vec<String>,
    /// Empty when the source had no place column.
    pub places: Vec<String>,
    pub departments: Vec<i32>,
    pub years: Vec<i32>,
    pub observed: Vec<ScaleIndex>,
    values: Vec<ScaleIndex>,
    columns: usize,
    subdataset: Vec<Vec<usize>>,
    reduction: Vec<usize>,
}

impl Options {
    /// Assemble and validate an observation set.
    ///
    /// `values` is the row-major matrix content, `columns` the basic
    /// attribute count. Fails with `OptionsInconsistent` when the parallel
    /// vectors disagree.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        simulations: Vec<String>,
        places: Vec<String>,
        departments: Vec<i32>,
        years: Vec<i32>,
        observed: Vec<ScaleIndex>,
        values: Vec<ScaleIndex>,
        columns: usize,
        rule: RelationRule,
    ) -> Result<Self, Error> {
        let mut options = Self {
            simulations,
            places,
            departments,
            years,
            observed,
            values,
            columns,
            subdataset: Vec::new(),
            reduction: Vec::new(),
        };
        options.check()?;
        options.init_dataset(rule)?;
        Ok(options)
    }

    pub fn rows(&self) -> usize {
        self.simulations.len()
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.simulations.is_empty()
    }

    /// One alternative's basic-attribute values.
    pub fn row(&self, index: usize) -> &[ScaleIndex] {
        let start = index * self.columns;
        &self.values[start..start + self.columns]
    }

    /// The learning set of `index`: every other alternative related to it.
    pub fn subdataset(&self, index: usize) -> &[usize] {
        &self.subdataset[index]
    }

    /// Alternatives sharing a learning set share a key; keys are
    /// first-occurrence indices into the list of distinct learning sets.
    pub fn reduction_key(&self, index: usize) -> usize {
        self.reduction[index]
    }

    /// True when every alternative has a non-empty learning set.
    pub fn have_subdataset(&self) -> bool {
        self.subdataset.iter().all(|s| !s.is_empty())
    }

    /// Recompute the learning sets under a different relation rule.
    pub fn rebuild_relations(&mut self, rule: RelationRule) -> Result<(), Error> {
        self.init_dataset(rule)
    }

    fn check(&self) -> Result<(), Error> {
        let n = self.simulations.len();
        let coherent = self.departments.len() == n
            && self.years.len() == n
            && self.observed.len() == n
            && (self.places.is_empty() || self.places.len() == n)
            && (self.columns > 0 || n == 0)
            && self.values.len() == n * self.columns;
        if coherent {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::OptionsInconsistent)
                .with_message("observation vectors have diverging lengths")
                .with_size(n))
        }
    }

    fn init_dataset(&mut self, rule: RelationRule) -> Result<(), Error> {
        let with_place = match rule {
            RelationRule::Auto => !self.places.is_empty(),
            RelationRule::DepartmentYear => false,
            RelationRule::DepartmentYearPlace => {
                if self.places.is_empty() {
                    return Err(Error::new(ErrorKind::OptionsInconsistent)
                        .with_message("place relation requested but no places present"));
                }
                true
            }
        };

        let n = self.simulations.len();
        self.subdataset = vec![Vec::new(); n];
        for i in 0..n {
            for j in 0..n {
                if i == j
                    || self.departments[i] == self.departments[j]
                    || self.years[i] == self.years[j]
                {
                    continue;
                }
                if with_place && self.places[i] == self.places[j] {
                    continue;
                }
                self.subdataset[i].push(j);
            }
        }

        let mut distinct: Vec<&[usize]> = Vec::new();
        self.reduction = Vec::with_capacity(n);
        for sub in &self.subdataset {
            match distinct.iter().position(|d| *d == sub.as_slice()) {
                Some(pos) => self.reduction.push(pos),
                None => {
                    self.reduction.push(distinct.len());
                    distinct.push(sub);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(places: Vec<String>) -> Options {
        // Three alternatives, two basic attributes.
        Options::from_parts(
            vec!["a".into(), "b".into(), "c".into()],
            places,
            vec![1, 2, 1],
            vec![2000, 2001, 2002],
            vec![0, 1, 0],
            vec![0, 1, 1, 0, 1, 1],
            2,
            RelationRule::Auto,
        )
        .unwrap()
    }

    #[test]
    fn rows_and_matrix_access() {
        let o = sample(Vec::new());
        assert_eq!(o.rows(), 3);
        assert_eq!(o.row(1), &[1, 0]);
        assert_eq!(o.row(2), &[1, 1]);
    }

    #[test]
    fn relations_need_both_department_and_year_to_differ() {
        let o = sample(Vec::new());
        // 0 and 2 share a department, 0 and 1 differ on both.
        assert_eq!(o.subdataset(0), &[1]);
        assert_eq!(o.subdataset(1), &[0, 2]);
        assert_eq!(o.subdataset(2), &[1]);
        assert!(o.have_subdataset());
    }

    #[test]
    fn place_rule_tightens_relations() {
        let mut o = sample(vec!["x".into(), "x".into(), "y".into()]);
        // Auto uses places: 0 and 1 share place x, so 1 only relates to 2.
        assert_eq!(o.subdataset(1), &[2]);
        o.rebuild_relations(RelationRule::DepartmentYear).unwrap();
        assert_eq!(o.subdataset(1), &[0, 2]);
    }

    #[test]
    fn reduction_keys_identify_equal_learning_sets() {
        let o = sample(Vec::new());
        assert_eq!(o.reduction_key(0), 0);
        assert_eq!(o.reduction_key(1), 1);
        // Same subdataset as alternative 0.
        assert_eq!(o.reduction_key(2), 0);
    }

    #[test]
    fn diverging_vector_lengths_are_rejected() {
        let err = Options::from_parts(
            vec!["a".into()],
            Vec::new(),
            vec![1, 2],
            vec![2000],
            vec![0],
            vec![0],
            1,
            RelationRule::Auto,
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::OptionsInconsistent);
    }
}
