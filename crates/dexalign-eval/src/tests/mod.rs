mod solver;

use dexalign_common::{Options, RelationRule, ScaleIndex};
use dexalign_model::{Attribute, FunctionStrings, Model, Scale, ScaleValue};

pub(crate) fn scale(names: &[&str]) -> Scale {
    Scale {
        order: true,
        values: names
            .iter()
            .map(|name| ScaleValue {
                name: (*name).to_string(),
                ..Default::default()
            })
            .collect(),
    }
}

/// root(3) over a(2) and b(3); table row = a * 3 + b.
pub(crate) fn flat_model() -> Model {
    let mut model = Model::default();
    model.name = "flat".to_string();
    model.attributes.push(Attribute {
        name: "root".to_string(),
        scale: scale(&["bad", "ok", "good"]),
        function: FunctionStrings {
            low: "001112".to_string(),
            ..Default::default()
        },
        children: vec![1, 2],
        ..Default::default()
    });
    model.attributes.push(Attribute {
        name: "a".to_string(),
        scale: scale(&["no", "yes"]),
        ..Default::default()
    });
    model.attributes.push(Attribute {
        name: "b".to_string(),
        scale: scale(&["low", "mid", "high"]),
        ..Default::default()
    });
    model
}

/// R(2) over A(2) and c(2), with A(2) over a(2) and b(2).
/// Aggregate order (children first): A = 0, R = 1.
pub(crate) fn nested_model() -> Model {
    let mut model = Model::default();
    model.name = "nested".to_string();
    model.attributes.push(Attribute {
        name: "R".to_string(),
        scale: scale(&["lo", "hi"]),
        function: FunctionStrings {
            low: "0011".to_string(),
            ..Default::default()
        },
        children: vec![1, 4],
        ..Default::default()
    });
    model.attributes.push(Attribute {
        name: "A".to_string(),
        scale: scale(&["lo", "hi"]),
        function: FunctionStrings {
            low: "0001".to_string(),
            ..Default::default()
        },
        children: vec![2, 3],
        ..Default::default()
    });
    for name in ["a", "b", "c"] {
        model.attributes.push(Attribute {
            name: name.to_string(),
            scale: scale(&["no", "yes"]),
            ..Default::default()
        });
    }
    model
}

/// Observation set with pairwise distinct departments and years, so every
/// pair of alternatives is related.
pub(crate) fn observations(
    rows: &[(&[ScaleIndex], ScaleIndex)],
    columns: usize,
) -> Options {
    let mut values = Vec::new();
    let mut observed = Vec::new();
    for (row, root) in rows {
        values.extend_from_slice(row);
        observed.push(*root);
    }
    Options::from_parts(
        (0..rows.len()).map(|i| format!("alt{i}")).collect(),
        Vec::new(),
        (0..rows.len() as i32).collect(),
        (2000..2000 + rows.len() as i32).collect(),
        observed,
        values,
        columns,
        RelationRule::Auto,
    )
    .unwrap()
}
