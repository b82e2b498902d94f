//! In-memory representation of a DEXi model.
//!
//! The attribute tree is stored as an indexed vector with forward-only
//! child indices; index 0 is the root. Parent relations, when needed, are
//! derived in a single pass rather than stored.

use dexalign_common::{Error, ErrorKind, Modifier, ScaleIndex};

/// One named value on an attribute scale.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScaleValue {
    pub name: String,
    pub description: String,
    /// Index into [`Model::groups`].
    pub group: Option<usize>,
}

/// An ordered qualitative scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scale {
    /// False when the document declares `<ORDER>NONE</ORDER>`.
    pub order: bool,
    pub values: Vec<ScaleValue>,
}

impl Default for Scale {
    fn default() -> Self {
        Self {
            order: true,
            values: Vec::new(),
        }
    }
}

impl Scale {
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Resolve a scale value name to its index.
    pub fn find_value(&self, name: &str) -> Option<ScaleIndex> {
        self.values
            .iter()
            .position(|v| v.name == name)
            .map(|i| i as ScaleIndex)
    }
}

/// The `<FUNCTION>` block of an aggregate attribute, kept verbatim for
/// round-tripping. `low` is the utility table as a digit string, row-major
/// over the cartesian product of child scales with the last child least
/// significant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionStrings {
    pub low: String,
    pub entered: String,
    pub consist: String,
    pub rounding: String,
    pub weights: String,
    pub loc_weights: String,
    pub norm_loc_weights: String,
}

impl FunctionStrings {
    pub fn is_empty(&self) -> bool {
        self.low.is_empty()
            && self.entered.is_empty()
            && self.consist.is_empty()
            && self.rounding.is_empty()
            && self.weights.is_empty()
            && self.loc_weights.is_empty()
            && self.norm_loc_weights.is_empty()
    }
}

/// One node of the attribute tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attribute {
    pub name: String,
    pub description: String,
    pub scale: Scale,
    pub function: FunctionStrings,
    /// Embedded `<OPTION>` values, one per alternative stored in the file.
    pub option_values: Vec<i64>,
    /// Indices of child attributes, in declaration order.
    pub children: Vec<usize>,
}

impl Attribute {
    pub fn is_basic(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_aggregate(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn scale_size(&self) -> usize {
        self.scale.size()
    }
}

/// A complete DEXi model document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
    pub name: String,
    pub version: String,
    pub created: String,
    pub reports: String,
    /// The `<DESCRIPTION>` block, one entry per `<LINE>`.
    pub description: Vec<String>,
    /// Top-level `<OPTION>` entries: the names of embedded alternatives.
    pub option_names: Vec<String>,
    /// Distinct `<GROUP>` labels, in first-seen order.
    pub groups: Vec<String>,
    /// Attribute 0 is the root.
    pub attributes: Vec<Attribute>,
}

impl Model {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn root(&self) -> Option<&Attribute> {
        self.attributes.first()
    }

    /// Basic attributes in depth-first order: the column order of the
    /// options matrix.
    pub fn basic_attributes(&self) -> Vec<usize> {
        let mut out = Vec::new();
        if !self.attributes.is_empty() {
            self.collect_basic(0, &mut out);
        }
        out
    }

    fn collect_basic(&self, att: usize, out: &mut Vec<usize>) {
        if self.attributes[att].is_basic() {
            out.push(att);
        } else {
            for &child in &self.attributes[att].children {
                self.collect_basic(child, out);
            }
        }
    }

    /// Aggregate attributes in children-first depth-first order: the
    /// numbering used by the evaluator and by [`Modifier::attribute`].
    pub fn aggregates_postorder(&self) -> Vec<usize> {
        let mut out = Vec::new();
        if !self.attributes.is_empty() {
            self.collect_aggregates(0, &mut out);
        }
        out
    }

    fn collect_aggregates(&self, att: usize, out: &mut Vec<usize>) {
        if self.attributes[att].is_aggregate() {
            for &child in &self.attributes[att].children {
                self.collect_aggregates(child, out);
            }
            out.push(att);
        }
    }

    /// Derive the parent of every attribute; the root has none.
    pub fn parents(&self) -> Vec<Option<usize>> {
        let mut parents = vec![None; self.attributes.len()];
        for (index, att) in self.attributes.iter().enumerate() {
            for &child in &att.children {
                parents[child] = Some(index);
            }
        }
        parents
    }

    pub fn group_id(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|g| g == name)
    }

    /// Rewrite utility-table cells in place. Modifier attributes use the
    /// children-first aggregate numbering of [`Self::aggregates_postorder`].
    pub fn apply_modifiers(&mut self, modifiers: &[Modifier]) -> Result<(), Error> {
        let aggregates = self.aggregates_postorder();
        for modifier in modifiers {
            let att = *aggregates.get(modifier.attribute as usize).ok_or_else(|| {
                Error::new(ErrorKind::EvaluatorInvariant)
                    .with_message("modifier names a nonexistent aggregate")
            })?;
            let attribute = &mut self.attributes[att];
            if modifier.value as usize >= attribute.scale_size() {
                return Err(Error::new(ErrorKind::EvaluatorInvariant)
                    .with_message("modifier value exceeds the attribute scale"));
            }
            let low = &mut attribute.function.low;
            let row = modifier.row as usize;
            if row >= low.len() {
                return Err(Error::new(ErrorKind::EvaluatorInvariant)
                    .with_message("modifier row outside the utility table"));
            }
            // The digit string is ASCII by construction.
            let digit = (b'0' + modifier.value) as char;
            low.replace_range(row..row + 1, &digit.to_string());
        }
        Ok(())
    }
}
