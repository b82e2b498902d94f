//! DEXi document reader.
//!
//! A pull parser over `quick-xml` events driving the same state machine as
//! the historical expat implementations of this format: a stack of open
//! container elements, a stack of open attributes and a character
//! accumulator that is cleared on every opening tag.

use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::Event;
use rustc_hash::FxHashMap;

use dexalign_common::{Error, ErrorKind, MAX_SCALE_SIZE};

use crate::model::{Attribute, Model, ScaleValue};

/// Everything that can go wrong while reading a model document.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("cannot open `{path}': {source}")]
    FileOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed document: {message} at {line}:{column}")]
    Malformed {
        message: String,
        line: u64,
        column: u64,
    },
    #[error("unknown element `{element}' at {line}:{column}")]
    UnknownElement {
        element: String,
        line: u64,
        column: u64,
    },
    #[error("element `{element}' under a wrong parent at {line}:{column}")]
    BadParent {
        element: String,
        line: u64,
        column: u64,
    },
    #[error("scale of `{attribute}' exceeds {MAX_SCALE_SIZE} values")]
    ScaleTooBig { attribute: String },
    #[error("cannot convert option `{text}' to an integer at {line}:{column}")]
    OptionConversion {
        text: String,
        line: u64,
        column: u64,
    },
}

impl ModelError {
    pub fn location(&self) -> Option<(u64, u64)> {
        match self {
            Self::FileOpen { .. } | Self::ScaleTooBig { .. } => None,
            Self::Malformed { line, column, .. }
            | Self::UnknownElement { line, column, .. }
            | Self::BadParent { line, column, .. }
            | Self::OptionConversion { line, column, .. } => Some((*line, *column)),
        }
    }
}

impl From<ModelError> for Error {
    fn from(value: ModelError) -> Self {
        let kind = match value {
            ModelError::FileOpen { .. } => ErrorKind::FileAccess,
            _ => ErrorKind::ParseModel,
        };
        let location = value.location();
        let error = Error::new(kind).with_message(value.to_string());
        match location {
            Some((line, column)) => error.with_location(line, column),
            None => error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ElementId {
    Dexi,
    Version,
    Created,
    Line,
    Option,
    Settings,
    FontSize,
    Reports,
    Attribute,
    Name,
    Description,
    Scale,
    Order,
    ScaleValue,
    Group,
    Function,
    Low,
    Entered,
    Consist,
    Rounding,
    Weights,
    LocWeights,
    NormLocWeights,
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(element_name(*self))
    }
}

fn element_name(id: ElementId) -> &'static str {
    ELEMENTS
        .iter()
        .find(|(_, candidate)| *candidate == id)
        .map(|(name, _)| *name)
        .unwrap_or("?")
}

const ELEMENTS: &[(&str, ElementId)] = &[
    ("DEXi", ElementId::Dexi),
    ("VERSION", ElementId::Version),
    ("CREATED", ElementId::Created),
    ("LINE", ElementId::Line),
    ("OPTION", ElementId::Option),
    ("SETTINGS", ElementId::Settings),
    ("FONTSIZE", ElementId::FontSize),
    ("REPORTS", ElementId::Reports),
    ("ATTRIBUTE", ElementId::Attribute),
    ("NAME", ElementId::Name),
    ("DESCRIPTION", ElementId::Description),
    ("SCALE", ElementId::Scale),
    ("ORDER", ElementId::Order),
    ("SCALEVALUE", ElementId::ScaleValue),
    ("GROUP", ElementId::Group),
    ("FUNCTION", ElementId::Function),
    ("LOW", ElementId::Low),
    ("ENTERED", ElementId::Entered),
    ("CONSIST", ElementId::Consist),
    ("ROUNDING", ElementId::Rounding),
    ("WEIGHTS", ElementId::Weights),
    ("LOCWEIGHTS", ElementId::LocWeights),
    ("NORMLOCWEIGHTS", ElementId::NormLocWeights),
];

static ELEMENT_TABLE: Lazy<FxHashMap<&'static str, ElementId>> =
    Lazy::new(|| ELEMENTS.iter().copied().collect());

/// Read a model from a file.
pub fn read_model_file<P: AsRef<Path>>(path: P) -> Result<Model, ModelError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ModelError::FileOpen {
        path: path.display().to_string(),
        source,
    })?;
    parse_model(&text)
}

/// Parse a model from document text.
pub fn parse_model(text: &str) -> Result<Model, ModelError> {
    let mut reader = Reader::from_str(text);
    let mut state = ParserState::default();

    loop {
        let position = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let id = state.identify(text, position, start.name().as_ref())?;
                state.open(text, position, id)?;
            }
            Ok(Event::Empty(start)) => {
                let id = state.identify(text, position, start.name().as_ref())?;
                state.open(text, position, id)?;
                state.close(text, position, id)?;
            }
            Ok(Event::End(end)) => {
                let id = state.identify(text, position, end.name().as_ref())?;
                state.close(text, position, id)?;
            }
            Ok(Event::Text(content)) => match content.decode() {
                Ok(chunk) => state.char_data.push_str(&chunk),
                Err(source) => return Err(malformed(text, position, source.to_string())),
            },
            Ok(Event::GeneralRef(reference)) => {
                let name = std::str::from_utf8(&reference)
                    .map_err(|_| malformed(text, position, "non UTF-8 reference".to_string()))?;
                match resolve_entity(name) {
                    Some(ch) => state.char_data.push(ch),
                    None => {
                        return Err(malformed(
                            text,
                            position,
                            format!("unknown entity `&{name};'"),
                        ));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(source) => return Err(malformed(text, position, source.to_string())),
        }
    }

    if !state.stack.is_empty() {
        return Err(malformed(text, text.len(), "unclosed element".to_string()));
    }

    Ok(state.model)
}

/// The five predefined XML entities plus numeric character references.
fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()))?;
            char::from_u32(code)
        }
    }
}

fn line_col(text: &str, offset: usize) -> (u64, u64) {
    let offset = offset.min(text.len());
    let mut line = 1u64;
    let mut column = 1u64;
    for byte in text.as_bytes()[..offset].iter() {
        if *byte == b'\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

fn malformed(text: &str, offset: usize, message: String) -> ModelError {
    let (line, column) = line_col(text, offset);
    ModelError::Malformed {
        message,
        line,
        column,
    }
}

#[derive(Default)]
struct ParserState {
    model: Model,
    stack: Vec<ElementId>,
    attribute_stack: Vec<usize>,
    char_data: String,
}

impl ParserState {
    fn identify(&self, text: &str, offset: usize, name: &[u8]) -> Result<ElementId, ModelError> {
        let name = std::str::from_utf8(name)
            .map_err(|_| malformed(text, offset, "non UTF-8 element name".to_string()))?;
        ELEMENT_TABLE.get(name).copied().ok_or_else(|| {
            let (line, column) = line_col(text, offset);
            ModelError::UnknownElement {
                element: name.to_string(),
                line,
                column,
            }
        })
    }

    fn is_parent(
        &self,
        text: &str,
        offset: usize,
        element: ElementId,
        allowed: &[ElementId],
    ) -> Result<(), ModelError> {
        if let Some(top) = self.stack.last()
            && allowed.contains(top)
        {
            return Ok(());
        }
        let (line, column) = line_col(text, offset);
        Err(ModelError::BadParent {
            element: element.to_string(),
            line,
            column,
        })
    }

    fn current_attribute(
        &mut self,
        text: &str,
        offset: usize,
    ) -> Result<&mut Attribute, ModelError> {
        let index = *self
            .attribute_stack
            .last()
            .ok_or_else(|| malformed(text, offset, "content outside an attribute".to_string()))?;
        Ok(&mut self.model.attributes[index])
    }

    fn open(&mut self, text: &str, offset: usize, id: ElementId) -> Result<(), ModelError> {
        use ElementId as E;

        self.char_data.clear();

        match id {
            E::Dexi => {
                if !self.stack.is_empty() {
                    let (line, column) = line_col(text, offset);
                    return Err(ModelError::BadParent {
                        element: id.to_string(),
                        line,
                        column,
                    });
                }
                self.stack.push(id);
            }
            E::Version | E::Created => self.is_parent(text, offset, id, &[E::Dexi])?,
            E::Line => self.is_parent(text, offset, id, &[E::Description])?,
            E::Option => self.is_parent(text, offset, id, &[E::Dexi, E::Attribute])?,
            E::Settings => {
                self.is_parent(text, offset, id, &[E::Dexi])?;
                self.stack.push(id);
            }
            E::FontSize | E::Reports => {
                self.is_parent(text, offset, id, &[E::Settings])?;
                self.stack.push(id);
            }
            E::Attribute => {
                self.is_parent(text, offset, id, &[E::Dexi, E::Attribute])?;
                self.stack.push(id);
                self.model.attributes.push(Attribute::default());
                let index = self.model.attributes.len() - 1;
                if let Some(&parent) = self.attribute_stack.last() {
                    self.model.attributes[parent].children.push(index);
                }
                self.attribute_stack.push(index);
            }
            E::Name => self.is_parent(text, offset, id, &[E::Dexi, E::Attribute, E::ScaleValue])?,
            E::Description => {
                self.is_parent(text, offset, id, &[E::Dexi, E::Attribute, E::ScaleValue])?;
                self.stack.push(id);
            }
            E::Scale => {
                self.is_parent(text, offset, id, &[E::Attribute])?;
                self.stack.push(id);
            }
            E::Order => self.is_parent(text, offset, id, &[E::Scale])?,
            E::ScaleValue => {
                self.is_parent(text, offset, id, &[E::Scale])?;
                self.stack.push(id);
                let attribute = self.current_attribute(text, offset)?;
                attribute.scale.values.push(ScaleValue::default());
                if attribute.scale.values.len() > MAX_SCALE_SIZE {
                    return Err(ModelError::ScaleTooBig {
                        attribute: attribute.name.clone(),
                    });
                }
            }
            E::Group => self.is_parent(text, offset, id, &[E::ScaleValue])?,
            E::Function => {
                self.is_parent(text, offset, id, &[E::Attribute])?;
                self.stack.push(id);
            }
            E::Low
            | E::Entered
            | E::Consist
            | E::Rounding
            | E::Weights
            | E::LocWeights
            | E::NormLocWeights => self.is_parent(text, offset, id, &[E::Function])?,
        }

        Ok(())
    }

    fn close(&mut self, text: &str, offset: usize, id: ElementId) -> Result<(), ModelError> {
        use ElementId as E;

        match id {
            E::Dexi | E::Settings | E::FontSize | E::Scale | E::Function => {
                self.pop(text, offset, id)?;
            }
            E::Version => self.model.version = self.take_text(),
            E::Created => self.model.created = self.take_text(),
            E::Line => {
                let line = self.take_text();
                self.model.description.push(line);
            }
            E::Option => {
                let content = self.take_text();
                match self.stack.last().copied() {
                    Some(E::Dexi) => self.model.option_names.push(content),
                    Some(E::Attribute) => {
                        let trimmed = content.trim();
                        let value: i64 = trimmed.parse().map_err(|_| {
                            let (line, column) = line_col(text, offset);
                            ModelError::OptionConversion {
                                text: trimmed.to_string(),
                                line,
                                column,
                            }
                        })?;
                        self.current_attribute(text, offset)?
                            .option_values
                            .push(value);
                    }
                    _ => return Err(malformed(text, offset, "misplaced option".to_string())),
                }
            }
            E::Reports => {
                self.model.reports = self.take_text();
                self.pop(text, offset, id)?;
            }
            E::Attribute => {
                self.pop(text, offset, id)?;
                self.attribute_stack.pop();
            }
            E::Name => {
                let name = self.take_text();
                match self.stack.last().copied() {
                    Some(E::Dexi) => self.model.name = name,
                    Some(E::Attribute) => self.current_attribute(text, offset)?.name = name,
                    Some(E::ScaleValue) => {
                        if let Some(value) = self
                            .current_attribute(text, offset)?
                            .scale
                            .values
                            .last_mut()
                        {
                            value.name = name;
                        }
                    }
                    _ => return Err(malformed(text, offset, "misplaced name".to_string())),
                }
            }
            E::Description => {
                self.pop(text, offset, id)?;
                let description = self.take_text();
                match self.stack.last().copied() {
                    Some(E::Attribute) => {
                        self.current_attribute(text, offset)?.description = description;
                    }
                    Some(E::ScaleValue) => {
                        if let Some(value) = self
                            .current_attribute(text, offset)?
                            .scale
                            .values
                            .last_mut()
                        {
                            value.description = description;
                        }
                    }
                    // Model-level descriptions arrive through LINE children.
                    _ => {}
                }
            }
            E::Order => {
                if self.take_text() == "NONE" {
                    self.current_attribute(text, offset)?.scale.order = false;
                }
            }
            E::ScaleValue => self.pop(text, offset, id)?,
            E::Group => {
                let label = self.take_text();
                let group = match self.model.group_id(&label) {
                    Some(found) => found,
                    None => {
                        self.model.groups.push(label);
                        self.model.groups.len() - 1
                    }
                };
                if let Some(value) = self
                    .current_attribute(text, offset)?
                    .scale
                    .values
                    .last_mut()
                {
                    value.group = Some(group);
                }
            }
            E::Low
            | E::Entered
            | E::Consist
            | E::Rounding
            | E::Weights
            | E::LocWeights
            | E::NormLocWeights => {
                let content = self.take_text();
                let function = &mut self.current_attribute(text, offset)?.function;
                match id {
                    E::Low => function.low = content,
                    E::Entered => function.entered = content,
                    E::Consist => function.consist = content,
                    E::Rounding => function.rounding = content,
                    E::Weights => function.weights = content,
                    E::LocWeights => function.loc_weights = content,
                    _ => function.norm_loc_weights = content,
                }
            }
        }

        Ok(())
    }

    fn pop(&mut self, text: &str, offset: usize, id: ElementId) -> Result<(), ModelError> {
        match self.stack.pop() {
            Some(found) if found == id => Ok(()),
            _ => Err(malformed(
                text,
                offset,
                format!("unbalanced element {id}"),
            )),
        }
    }

    fn take_text(&mut self) -> String {
        std::mem::take(&mut self.char_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DEXi>
  <VERSION>5.0</VERSION>
  <NAME>demo</NAME>
  <DESCRIPTION>
    <LINE>first</LINE>
    <LINE/>
  </DESCRIPTION>
  <ATTRIBUTE>
    <NAME>root</NAME>
    <DESCRIPTION>aggregated</DESCRIPTION>
    <SCALE>
      <SCALEVALUE>
        <NAME>low</NAME>
        <GROUP>BAD</GROUP>
      </SCALEVALUE>
      <SCALEVALUE>
        <NAME>high</NAME>
      </SCALEVALUE>
    </SCALE>
    <FUNCTION>
      <LOW>0011</LOW>
    </FUNCTION>
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
</DEXi>
"#;

    #[test]
    fn parses_nested_attributes() {
        let model = parse_model(MINIMAL).unwrap();
        assert_eq!(model.name, "demo");
        assert_eq!(model.version, "5.0");
        assert_eq!(model.description, vec!["first".to_string(), String::new()]);
        assert_eq!(model.attributes.len(), 3);
        assert_eq!(model.attributes[0].children, vec![1, 2]);
        assert_eq!(model.attributes[0].function.low, "0011");
        assert_eq!(model.attributes[0].scale.values[0].group, Some(0));
        assert_eq!(model.groups, vec!["BAD".to_string()]);
        assert!(model.attributes[1].is_basic());
    }

    #[test]
    fn unknown_element_is_located() {
        let text = "<DEXi><BOGUS/></DEXi>";
        match parse_model(text).unwrap_err() {
            ModelError::UnknownElement { element, line, .. } => {
                assert_eq!(element, "BOGUS");
                assert_eq!(line, 1);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn scale_outside_attribute_is_a_bad_parent() {
        let text = "<DEXi><SCALE/></DEXi>";
        assert!(matches!(
            parse_model(text).unwrap_err(),
            ModelError::BadParent { .. }
        ));
    }

    #[test]
    fn non_integer_attribute_option_is_rejected() {
        let text = r#"<DEXi><ATTRIBUTE><NAME>x</NAME><SCALE>
            <SCALEVALUE><NAME>v</NAME></SCALEVALUE></SCALE>
            <OPTION>seven</OPTION></ATTRIBUTE></DEXi>"#;
        assert!(matches!(
            parse_model(text).unwrap_err(),
            ModelError::OptionConversion { .. }
        ));
    }

    #[test]
    fn escaped_text_is_unescaped() {
        let text = r#"<DEXi><NAME>a &amp; b &lt;c&gt;</NAME></DEXi>"#;
        let model = parse_model(text).unwrap();
        assert_eq!(model.name, "a & b <c>");
    }

    #[test]
    fn mismatched_tags_are_malformed() {
        let text = "<DEXi><NAME>x</VERSION></DEXi>";
        assert!(matches!(
            parse_model(text).unwrap_err(),
            ModelError::Malformed { .. }
        ));
    }
}
