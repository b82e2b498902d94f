//! Observation CSV import and export.
//!
//! Semicolon-separated with one header row. Two header shapes are
//! accepted: `simulation;department;year;<basic…>;<root>` and
//! `simulation;place;department;year;<basic…>;<root>`. Basic-attribute
//! columns are matched to the model by header name, in any order.

use std::io::{Read, Write};
use std::path::Path;

use dexalign_common::{Error, ErrorKind, Options, RelationRule, ScaleIndex};
use dexalign_model::Model;

/// Everything that can go wrong while reading or writing observations.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("cannot open `{path}': {source}")]
    FileOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV: {message} at line {line}")]
    Malformed { message: String, line: u64 },
    #[error("{found} columns instead of {expected} at line {line}")]
    ColumnCountMismatch {
        expected: usize,
        found: usize,
        line: u64,
    },
    #[error("no basic attribute named `{name}' at {line}:{column}")]
    UnknownBasicAttribute {
        name: String,
        line: u64,
        column: u64,
    },
    #[error("unknown scale value `{value}' for `{attribute}' at {line}:{column}")]
    UnknownScaleValue {
        value: String,
        attribute: String,
        line: u64,
        column: u64,
    },
    #[error("cannot convert `{text}' to an integer at {line}:{column}")]
    IntegerConversion {
        text: String,
        line: u64,
        column: u64,
    },
    #[error(transparent)]
    Inconsistent(#[from] Error),
}

impl OptionsError {
    pub fn location(&self) -> Option<(u64, u64)> {
        match self {
            Self::FileOpen { .. } | Self::Inconsistent(_) => None,
            Self::Malformed { line, .. } | Self::ColumnCountMismatch { line, .. } => {
                Some((*line, 0))
            }
            Self::UnknownBasicAttribute { line, column, .. }
            | Self::UnknownScaleValue { line, column, .. }
            | Self::IntegerConversion { line, column, .. } => Some((*line, *column)),
        }
    }
}

impl From<OptionsError> for Error {
    fn from(value: OptionsError) -> Self {
        match value {
            OptionsError::FileOpen { .. } => {
                Error::new(ErrorKind::FileAccess).with_message(value.to_string())
            }
            OptionsError::Inconsistent(inner) => inner,
            other => {
                let location = other.location();
                let error = Error::new(ErrorKind::ParseOptions).with_message(other.to_string());
                match location {
                    Some((line, column)) => error.with_location(line, column),
                    None => error,
                }
            }
        }
    }
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.delimiter(b';').has_headers(false).flexible(true);
    builder
}

/// Read an observation set and resolve it against a model.
pub fn read_options<R: Read>(
    input: R,
    model: &Model,
    rule: RelationRule,
) -> Result<Options, OptionsError> {
    let basics = model.basic_attributes();
    let names: Vec<&str> = basics
        .iter()
        .map(|&att| model.attributes[att].name.as_str())
        .collect();

    let mut reader = reader_builder().from_reader(input);
    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record.map_err(csv_error)?,
        None => {
            return Err(OptionsError::Malformed {
                message: "missing header".to_string(),
                line: 1,
            });
        }
    };

    // Three leading metadata columns without places, four with.
    let leading = if header.len() == names.len() + 4 {
        3
    } else if header.len() == names.len() + 5 {
        4
    } else {
        return Err(OptionsError::ColumnCountMismatch {
            expected: names.len() + 4,
            found: header.len(),
            line: 1,
        });
    };
    let with_place = leading == 4;
    let width = leading + names.len() + 1;

    // Header name -> column order of the model's basic attributes.
    let mut mapping = Vec::with_capacity(names.len());
    for index in 0..names.len() {
        let name = &header[leading + index];
        let found = names.iter().position(|candidate| *candidate == name);
        match found {
            Some(position) => mapping.push(position),
            None => {
                return Err(OptionsError::UnknownBasicAttribute {
                    name: name.to_string(),
                    line: 1,
                    column: (leading + index + 1) as u64,
                });
            }
        }
    }

    let root = &model.attributes[0];
    let mut simulations = Vec::new();
    let mut places = Vec::new();
    let mut departments = Vec::new();
    let mut years = Vec::new();
    let mut observed: Vec<ScaleIndex> = Vec::new();
    let mut values: Vec<ScaleIndex> = Vec::new();

    for record in records {
        let record = record.map_err(csv_error)?;
        let line = record.position().map_or(0, |position| position.line());

        if record.len() != width {
            return Err(OptionsError::ColumnCountMismatch {
                expected: width,
                found: record.len(),
                line,
            });
        }

        simulations.push(record[0].to_string());
        if with_place {
            places.push(record[1].to_string());
        }
        departments.push(parse_integer(&record[leading - 2], line, leading - 1)?);
        years.push(parse_integer(&record[leading - 1], line, leading)?);

        let row_base = values.len();
        values.resize(row_base + names.len(), 0);
        for (index, &attribute) in mapping.iter().enumerate() {
            let field = &record[leading + index];
            let node = &model.attributes[basics[attribute]];
            match node.scale.find_value(field) {
                Some(value) => values[row_base + attribute] = value,
                None => {
                    return Err(OptionsError::UnknownScaleValue {
                        value: field.to_string(),
                        attribute: node.name.clone(),
                        line,
                        column: (leading + index + 1) as u64,
                    });
                }
            }
        }

        let field = &record[width - 1];
        match root.scale.find_value(field) {
            Some(value) => observed.push(value),
            None => {
                return Err(OptionsError::UnknownScaleValue {
                    value: field.to_string(),
                    attribute: root.name.clone(),
                    line,
                    column: width as u64,
                });
            }
        }
    }

    Ok(Options::from_parts(
        simulations,
        places,
        departments,
        years,
        observed,
        values,
        names.len(),
        rule,
    )?)
}

/// Read an observation set from a file.
pub fn read_options_file<P: AsRef<Path>>(
    path: P,
    model: &Model,
    rule: RelationRule,
) -> Result<Options, OptionsError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| OptionsError::FileOpen {
        path: path.display().to_string(),
        source,
    })?;
    read_options(std::io::BufReader::new(file), model, rule)
}

/// Write an observation set; the exact inverse of [`read_options`]. The
/// place column is always present, `-` standing in when no places exist.
pub fn write_options<W: Write>(
    output: W,
    model: &Model,
    options: &Options,
) -> Result<(), OptionsError> {
    let basics = model.basic_attributes();
    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_writer(output);

    let mut header = vec![
        "simulation".to_string(),
        "place".to_string(),
        "department".to_string(),
        "year".to_string(),
    ];
    for &att in &basics {
        header.push(model.attributes[att].name.clone());
    }
    header.push(model.attributes[0].name.clone());
    writer.write_record(&header).map_err(csv_error)?;

    for index in 0..options.rows() {
        let mut record = Vec::with_capacity(header.len());
        record.push(options.simulations[index].clone());
        record.push(
            options
                .places
                .get(index)
                .cloned()
                .unwrap_or_else(|| "-".to_string()),
        );
        record.push(options.departments[index].to_string());
        record.push(options.years[index].to_string());
        for (column, &att) in basics.iter().enumerate() {
            let value = options.row(index)[column] as usize;
            record.push(model.attributes[att].scale.values[value].name.clone());
        }
        let observed = options.observed[index] as usize;
        record.push(model.attributes[0].scale.values[observed].name.clone());
        writer.write_record(&record).map_err(csv_error)?;
    }

    writer.flush().map_err(|source| OptionsError::Malformed {
        message: source.to_string(),
        line: 0,
    })?;
    Ok(())
}

/// Write an observation set to a file.
pub fn write_options_file<P: AsRef<Path>>(
    path: P,
    model: &Model,
    options: &Options,
) -> Result<(), OptionsError> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).map_err(|source| OptionsError::FileOpen {
        path: path.display().to_string(),
        source,
    })?;
    write_options(std::io::BufWriter::new(file), model, options)
}

fn parse_integer(field: &str, line: u64, column: usize) -> Result<i32, OptionsError> {
    let wide: i64 = field
        .trim()
        .parse()
        .map_err(|_| OptionsError::IntegerConversion {
            text: field.to_string(),
            line,
            column: column as u64,
        })?;
    Ok(dexalign_common::to_i32(wide)
        .map_err(|error| error.with_location(line, column as u64))?)
}

fn csv_error(source: csv::Error) -> OptionsError {
    let line = source
        .position()
        .map_or(0, |position| position.line());
    OptionsError::Malformed {
        message: source.to_string(),
        line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexalign_model::parse_model;

    fn model() -> Model {
        parse_model(
            r#"<DEXi>
  <NAME>demo</NAME>
  <ATTRIBUTE>
    <NAME>root</NAME>
    <SCALE>
      <SCALEVALUE><NAME>bad</NAME></SCALEVALUE>
      <SCALEVALUE><NAME>good</NAME></SCALEVALUE>
    </SCALE>
    <FUNCTION><LOW>0001</LOW></FUNCTION>
    <ATTRIBUTE>
      <NAME>a</NAME>
      <SCALE>
        <SCALEVALUE><NAME>no</NAME></SCALEVALUE>
        <SCALEVALUE><NAME>yes</NAME></SCALEVALUE>
      </SCALE>
    </ATTRIBUTE>
    <ATTRIBUTE>
      <NAME>b</NAME>
      <SCALE>
        <SCALEVALUE><NAME>no</NAME></SCALEVALUE>
        <SCALEVALUE><NAME>yes</NAME></SCALEVALUE>
      </SCALE>
    </ATTRIBUTE>
  </ATTRIBUTE>
</DEXi>"#,
        )
        .unwrap()
    }

    #[test]
    fn reads_the_place_header_shape() {
        let text = "simulation;place;department;year;a;b;root\n\
                    s1;p1;1;2000;no;yes;bad\n\
                    s2;p2;2;2001;yes;yes;good\n";
        let options = read_options(text.as_bytes(), &model(), RelationRule::Auto).unwrap();

        assert_eq!(options.rows(), 2);
        assert_eq!(options.places, vec!["p1", "p2"]);
        assert_eq!(options.row(0), &[0, 1]);
        assert_eq!(options.row(1), &[1, 1]);
        assert_eq!(options.observed, vec![0, 1]);
    }

    #[test]
    fn reads_the_placeless_header_shape() {
        let text = "simulation;department;year;a;b;root\ns1;1;2000;yes;no;bad\n";
        let options = read_options(text.as_bytes(), &model(), RelationRule::Auto).unwrap();
        assert!(options.places.is_empty());
        assert_eq!(options.departments, vec![1]);
        assert_eq!(options.years, vec![2000]);
    }

    #[test]
    fn header_columns_map_by_name_in_any_order() {
        let text = "simulation;department;year;b;a;root\ns1;1;2000;yes;no;good\n";
        let options = read_options(text.as_bytes(), &model(), RelationRule::Auto).unwrap();
        // Column order is the model's leaf order: a then b.
        assert_eq!(options.row(0), &[0, 1]);
    }

    #[test]
    fn unknown_attribute_header_is_located() {
        let text = "simulation;department;year;a;wrong;root\n";
        match read_options(text.as_bytes(), &model(), RelationRule::Auto).unwrap_err() {
            OptionsError::UnknownBasicAttribute { name, line, column } => {
                assert_eq!(name, "wrong");
                assert_eq!((line, column), (1, 5));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn unknown_scale_value_is_located() {
        let text = "simulation;department;year;a;b;root\ns1;1;2000;maybe;no;bad\n";
        match read_options(text.as_bytes(), &model(), RelationRule::Auto).unwrap_err() {
            OptionsError::UnknownScaleValue {
                value,
                attribute,
                line,
                column,
            } => {
                assert_eq!(value, "maybe");
                assert_eq!(attribute, "a");
                assert_eq!((line, column), (2, 4));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn short_row_is_a_column_count_mismatch() {
        let text = "simulation;department;year;a;b;root\ns1;1;2000;no;bad\n";
        assert!(matches!(
            read_options(text.as_bytes(), &model(), RelationRule::Auto).unwrap_err(),
            OptionsError::ColumnCountMismatch { line: 2, .. }
        ));
    }

    #[test]
    fn bad_year_is_an_integer_conversion() {
        let text = "simulation;department;year;a;b;root\ns1;1;soon;no;no;bad\n";
        assert!(matches!(
            read_options(text.as_bytes(), &model(), RelationRule::Auto).unwrap_err(),
            OptionsError::IntegerConversion { .. }
        ));
    }

    #[test]
    fn write_then_read_round_trips() {
        let model = model();
        let text = "simulation;place;department;year;a;b;root\n\
                    s1;p1;1;2000;no;yes;bad\n\
                    s2;p2;2;2001;yes;yes;good\n";
        let options = read_options(text.as_bytes(), &model, RelationRule::Auto).unwrap();

        let mut buffer = Vec::new();
        write_options(&mut buffer, &model, &options).unwrap();
        let reread = read_options(buffer.as_slice(), &model, RelationRule::Auto).unwrap();

        assert_eq!(reread.simulations, options.simulations);
        assert_eq!(reread.places, options.places);
        assert_eq!(reread.departments, options.departments);
        assert_eq!(reread.years, options.years);
        assert_eq!(reread.observed, options.observed);
        for row in 0..options.rows() {
            assert_eq!(reread.row(row), options.row(row));
        }
    }
}
