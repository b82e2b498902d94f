//! DEXi document writer.
//!
//! Emits the historical 2-space-indented layout so that a parse → write →
//! parse cycle reproduces the same [`Model`] and the semantically
//! significant fields byte for byte.

use std::path::Path;

use quick_xml::escape::escape;

use crate::model::{Attribute, Model};
use crate::reader::ModelError;

/// Serialise a model to document text.
pub fn write_model(model: &Model) -> String {
    let mut out = String::with_capacity(4096);

    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<DEXi>\n");
    push_tag(&mut out, 2, "VERSION", &model.version);
    push_tag(&mut out, 2, "CREATED", &model.created);
    push_tag(&mut out, 2, "NAME", &model.name);

    out.push_str("  <DESCRIPTION>\n");
    for line in &model.description {
        if line.is_empty() {
            out.push_str("    <LINE/>\n");
        } else {
            push_tag(&mut out, 4, "LINE", line);
        }
    }
    out.push_str("  </DESCRIPTION>\n");

    for option in &model.option_names {
        push_tag(&mut out, 2, "OPTION", option);
    }

    if !model.reports.is_empty() {
        out.push_str("  <SETTINGS>\n");
        push_tag(&mut out, 4, "REPORTS", &model.reports);
        out.push_str("  </SETTINGS>\n");
    }

    if !model.attributes.is_empty() {
        write_attribute(&mut out, model, 0, 2);
    }

    out.push_str("</DEXi>\n");
    out
}

/// Serialise a model to a file.
pub fn write_model_file<P: AsRef<Path>>(model: &Model, path: P) -> Result<(), ModelError> {
    let path = path.as_ref();
    std::fs::write(path, write_model(model)).map_err(|source| ModelError::FileOpen {
        path: path.display().to_string(),
        source,
    })
}

fn indent(out: &mut String, spaces: usize) {
    for _ in 0..spaces {
        out.push(' ');
    }
}

fn push_tag(out: &mut String, spaces: usize, tag: &str, text: &str) {
    indent(out, spaces);
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(&escape(text));
    out.push_str("</");
    out.push_str(tag);
    out.push_str(">\n");
}

/// Function strings are digit and symbol sequences; they are written raw,
/// as the format always has.
fn push_raw_tag(out: &mut String, spaces: usize, tag: &str, text: &str) {
    indent(out, spaces);
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(text);
    out.push_str("</");
    out.push_str(tag);
    out.push_str(">\n");
}

fn write_attribute(out: &mut String, model: &Model, index: usize, spaces: usize) {
    let attribute: &Attribute = &model.attributes[index];

    indent(out, spaces);
    out.push_str("<ATTRIBUTE>\n");

    push_tag(out, spaces + 2, "NAME", &attribute.name);
    push_tag(out, spaces + 2, "DESCRIPTION", &attribute.description);

    indent(out, spaces + 2);
    out.push_str("<SCALE>\n");
    if !attribute.scale.values.is_empty() && !attribute.scale.order {
        indent(out, spaces + 4);
        out.push_str("<ORDER>NONE</ORDER>\n");
    }
    for value in &attribute.scale.values {
        indent(out, spaces + 4);
        out.push_str("<SCALEVALUE>\n");
        push_tag(out, spaces + 6, "NAME", &value.name);
        if !value.description.is_empty() {
            push_tag(out, spaces + 6, "DESCRIPTION", &value.description);
        }
        if let Some(group) = value.group {
            push_tag(out, spaces + 6, "GROUP", &model.groups[group]);
        }
        indent(out, spaces + 4);
        out.push_str("</SCALEVALUE>\n");
    }
    indent(out, spaces + 2);
    out.push_str("</SCALE>\n");

    if !attribute.function.is_empty() {
        indent(out, spaces + 2);
        out.push_str("<FUNCTION>\n");
        let function = &attribute.function;
        for (tag, text) in [
            ("LOW", &function.low),
            ("ENTERED", &function.entered),
            ("CONSIST", &function.consist),
            ("ROUNDING", &function.rounding),
            ("WEIGHTS", &function.weights),
            ("LOCWEIGHTS", &function.loc_weights),
            ("NORMLOCWEIGHTS", &function.norm_loc_weights),
        ] {
            if !text.is_empty() {
                push_raw_tag(out, spaces + 4, tag, text);
            }
        }
        indent(out, spaces + 2);
        out.push_str("</FUNCTION>\n");
    }

    for value in &attribute.option_values {
        push_raw_tag(out, spaces + 2, "OPTION", &value.to_string());
    }

    for &child in &attribute.children {
        write_attribute(out, model, child, spaces + 2);
    }

    indent(out, spaces);
    out.push_str("</ATTRIBUTE>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::parse_model;

    fn demo() -> Model {
        parse_model(
            r#"<DEXi>
  <VERSION>5.0</VERSION>
  <CREATED>today</CREATED>
  <NAME>demo &amp; co</NAME>
  <DESCRIPTION><LINE>one</LINE><LINE/></DESCRIPTION>
  <OPTION>first</OPTION>
  <SETTINGS><REPORTS>1;2</REPORTS></SETTINGS>
  <ATTRIBUTE>
    <NAME>root</NAME>
    <SCALE>
      <SCALEVALUE><NAME>low</NAME><GROUP>BAD</GROUP></SCALEVALUE>
      <SCALEVALUE><NAME>high</NAME></SCALEVALUE>
    </SCALE>
    <FUNCTION><LOW>01</LOW><ENTERED>++</ENTERED></FUNCTION>
    <OPTION>1</OPTION>
    <ATTRIBUTE>
      <NAME>leaf</NAME>
      <SCALE>
        <ORDER>NONE</ORDER>
        <SCALEVALUE><NAME>no</NAME></SCALEVALUE>
        <SCALEVALUE><NAME>yes</NAME></SCALEVALUE>
      </SCALE>
      <OPTION>0</OPTION>
    </ATTRIBUTE>
  </ATTRIBUTE>
</DEXi>"#,
        )
        .unwrap()
    }

    #[test]
    fn round_trip_is_model_equal() {
        let model = demo();
        let text = write_model(&model);
        let reparsed = parse_model(&text).unwrap();
        assert_eq!(model, reparsed);
    }

    #[test]
    fn writer_output_is_stable() {
        let model = demo();
        let first = write_model(&model);
        let second = write_model(&parse_model(&first).unwrap());
        assert_eq!(first, second);
    }

    #[test]
    fn special_characters_are_escaped() {
        let mut model = demo();
        model.name = r#"a<b>&"c'"#.to_string();
        let text = write_model(&model);
        assert!(text.contains("a&lt;b&gt;&amp;&quot;c&apos;"));
        assert_eq!(parse_model(&text).unwrap().name, model.name);
    }

    #[test]
    fn file_round_trip() {
        let model = demo();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.dxi");
        write_model_file(&model, &path).unwrap();
        let reparsed = crate::reader::read_model_file(&path).unwrap();
        assert_eq!(model, reparsed);
    }
}
