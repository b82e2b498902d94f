//! Alternatives embedded in a model file.
//!
//! A DEXi document may carry its own evaluated alternatives: a name list
//! at the top level and one `<OPTION>` value per alternative under every
//! attribute. Extraction turns those into an [`Options`] set; merging is
//! the inverse and re-evaluates the aggregates so the embedded values
//! stay consistent with the utility tables.

use dexalign_common::{Error, ErrorKind, Options, RelationRule, ScaleIndex, to_scale_index};
use dexalign_eval::SolverStack;
use dexalign_model::Model;

/// Build an observation set from a model's embedded alternatives.
///
/// Metadata follows the historical convention for model-borne data: the
/// simulation name gets a `../` suffix, the place is `-` and department
/// and year are zero.
pub fn embedded_options(model: &Model) -> Result<Options, Error> {
    let rows = model.option_names.len();
    let basics = model.basic_attributes();

    let mut values: Vec<ScaleIndex> = vec![0; rows * basics.len()];
    for (column, &att) in basics.iter().enumerate() {
        let node = &model.attributes[att];
        if node.option_values.len() < rows {
            return Err(Error::new(ErrorKind::OptionsInconsistent)
                .with_message(format!(
                    "attribute `{}' embeds {} of {rows} alternatives",
                    node.name,
                    node.option_values.len()
                )));
        }
        for row in 0..rows {
            values[row * basics.len() + column] = to_scale_index(node.option_values[row])?;
        }
    }

    let root = &model.attributes[0];
    if root.option_values.len() < rows {
        return Err(Error::new(ErrorKind::OptionsInconsistent)
            .with_message("the root attribute embeds too few alternatives"));
    }
    let mut observed = Vec::with_capacity(rows);
    for row in 0..rows {
        observed.push(to_scale_index(root.option_values[row])?);
    }

    Options::from_parts(
        model
            .option_names
            .iter()
            .map(|name| format!("{name}../"))
            .collect(),
        vec!["-".to_string(); rows],
        vec![0; rows],
        vec![0; rows],
        observed,
        values,
        basics.len(),
        RelationRule::Auto,
    )
}

/// Produce a copy of the model whose embedded alternatives are replaced
/// by the given observation set. Basic attributes take the matrix values,
/// the root takes the observed values, and intermediate aggregates are
/// re-evaluated.
pub fn merge_options(model: &Model, options: &Options) -> Result<Model, Error> {
    let mut solver = SolverStack::new(model)?;
    solver.check_options(options)?;

    let mut merged = model.clone();
    merged.option_names = options.simulations.clone();
    for attribute in &mut merged.attributes {
        attribute.option_values.clear();
    }

    let basics = merged.basic_attributes();
    let aggregates = merged.aggregates_postorder();
    let mut trace: Vec<ScaleIndex> = Vec::with_capacity(aggregates.len());

    for row in 0..options.rows() {
        for (column, &att) in basics.iter().enumerate() {
            merged.attributes[att]
                .option_values
                .push(options.row(row)[column] as i64);
        }

        solver.solve_trace(options.row(row), &mut trace);
        for (position, &att) in aggregates.iter().enumerate() {
            // The observation wins over the evaluation at the root.
            let value = if att == 0 {
                options.observed[row]
            } else {
                trace[position]
            };
            merged.attributes[att].option_values.push(value as i64);
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexalign_model::parse_model;

    const EMBEDDED: &str = r#"<DEXi>
  <NAME>demo</NAME>
  <OPTION>first</OPTION>
  <OPTION>second</OPTION>
  <ATTRIBUTE>
    <NAME>root</NAME>
    <SCALE>
      <SCALEVALUE><NAME>lo</NAME></SCALEVALUE>
      <SCALEVALUE><NAME>hi</NAME></SCALEVALUE>
    </SCALE>
    <FUNCTION><LOW>0001</LOW></FUNCTION>
    <OPTION>0</OPTION>
    <OPTION>1</OPTION>
    <ATTRIBUTE>
      <NAME>a</NAME>
      <SCALE>
        <SCALEVALUE><NAME>no</NAME></SCALEVALUE>
        <SCALEVALUE><NAME>yes</NAME></SCALEVALUE>
      </SCALE>
      <OPTION>0</OPTION>
      <OPTION>1</OPTION>
    </ATTRIBUTE>
    <ATTRIBUTE>
      <NAME>b</NAME>
      <SCALE>
        <SCALEVALUE><NAME>no</NAME></SCALEVALUE>
        <SCALEVALUE><NAME>yes</NAME></SCALEVALUE>
      </SCALE>
      <OPTION>1</OPTION>
      <OPTION>1</OPTION>
    </ATTRIBUTE>
  </ATTRIBUTE>
</DEXi>"#;

    #[test]
    fn extraction_reads_basic_and_root_values() {
        let model = parse_model(EMBEDDED).unwrap();
        let options = embedded_options(&model).unwrap();

        assert_eq!(options.rows(), 2);
        assert_eq!(options.simulations, vec!["first../", "second../"]);
        assert_eq!(options.row(0), &[0, 1]);
        assert_eq!(options.row(1), &[1, 1]);
        assert_eq!(options.observed, vec![0, 1]);
        // Model-borne alternatives carry no usable metadata.
        assert!(!options.have_subdataset());
    }

    #[test]
    fn extraction_rejects_out_of_range_values() {
        let mut model = parse_model(EMBEDDED).unwrap();
        model.attributes[1].option_values[0] = 500;
        assert_eq!(
            embedded_options(&model).unwrap_err().kind,
            ErrorKind::NumericCast
        );
    }

    #[test]
    fn merge_then_extract_round_trips() {
        let model = parse_model(EMBEDDED).unwrap();
        let options = embedded_options(&model).unwrap();

        let merged = merge_options(&model, &options).unwrap();
        assert_eq!(merged.option_names, options.simulations);
        // root = a & b for these tables, matching the observed values.
        assert_eq!(merged.attributes[0].option_values, vec![0, 1]);
        assert_eq!(merged.attributes[1].option_values, vec![0, 1]);
        assert_eq!(merged.attributes[2].option_values, vec![1, 1]);

        let back = embedded_options(&merged).unwrap();
        assert_eq!(back.observed, options.observed);
        assert_eq!(back.row(0), options.row(0));
        assert_eq!(back.row(1), options.row(1));
    }
}
