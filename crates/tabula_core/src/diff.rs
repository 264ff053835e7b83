//! Structural diff between two stored items.
//!
//! The diff walks both attribute trees together and emits the smallest set of
//! path edits that turns the existing tree into the new one:
//!
//! - Scalars, sets and values whose type changed are replaced whole
//! - Maps recurse per key
//! - Lists compare element-wise by index; extra trailing elements in the new
//!   list are set at their index, missing ones are removed at theirs
//! - An attribute present on one side only is set or removed whole
//!
//! Edits are ordered so that applying every update and then every removal in
//! reverse order reproduces the new tree (see [`apply_differences`]).

use crate::error::TableResult;
use crate::item::{RowType, TypedItem, ROW_VERSION};
use tabula_codec::{AttributeEncoder, AttributePath, AttributeValue, Attributes, CodecResult};

/// One attribute-level edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeDifference {
    /// Set the value at a path.
    Update {
        /// Target path.
        path: AttributePath,
        /// New value.
        value: AttributeValue,
    },
    /// Remove the value at a path.
    Remove {
        /// Target path.
        path: AttributePath,
    },
}

impl AttributeDifference {
    /// Returns the target path.
    pub fn path(&self) -> &AttributePath {
        match self {
            AttributeDifference::Update { path, .. } | AttributeDifference::Remove { path } => {
                path
            }
        }
    }
}

/// Diffs two attribute maps.
pub fn diff_attributes(existing: &Attributes, new: &Attributes) -> Vec<AttributeDifference> {
    let mut differences = Vec::new();
    diff_maps(None, existing, new, &mut differences);
    differences
}

/// Diffs two versions of an item, ending with the version bump.
///
/// `RowVersion` is excluded from the structural comparison; the final edit
/// always sets it to `existing`'s version plus one.
pub fn item_differences<T: RowType>(
    encoder: &AttributeEncoder,
    new: &TypedItem<T>,
    existing: &TypedItem<T>,
) -> TableResult<Vec<AttributeDifference>> {
    let mut existing_attributes = existing.encode(encoder)?;
    let mut new_attributes = new.encode(encoder)?;
    existing_attributes.remove(ROW_VERSION);
    new_attributes.remove(ROW_VERSION);

    let mut differences = diff_attributes(&existing_attributes, &new_attributes);
    differences.push(AttributeDifference::Update {
        path: AttributePath::attribute(ROW_VERSION),
        value: AttributeValue::from(existing.row_version() + 1),
    });
    Ok(differences)
}

/// Applies edits produced by [`diff_attributes`] to `attributes`.
///
/// Updates apply in order, then removals apply in reverse order so that
/// removing trailing list elements never shifts an index still to be removed.
pub fn apply_differences(
    attributes: &mut Attributes,
    differences: &[AttributeDifference],
) -> CodecResult<()> {
    for difference in differences {
        if let AttributeDifference::Update { path, value } = difference {
            path.set(attributes, value.clone())?;
        }
    }
    for difference in differences.iter().rev() {
        if let AttributeDifference::Remove { path } = difference {
            path.remove(attributes)?;
        }
    }
    Ok(())
}

fn diff_maps(
    parent: Option<&AttributePath>,
    existing: &Attributes,
    new: &Attributes,
    out: &mut Vec<AttributeDifference>,
) {
    let child = |name: &str| match parent {
        Some(path) => path.child(name),
        None => AttributePath::attribute(name),
    };

    let mut names: Vec<&String> = existing.keys().chain(new.keys()).collect();
    names.sort();
    names.dedup();

    for name in names {
        match (existing.get(name), new.get(name)) {
            (Some(old), Some(value)) => diff_values(&child(name), old, value, out),
            (Some(_), None) => out.push(AttributeDifference::Remove { path: child(name) }),
            (None, Some(value)) => out.push(AttributeDifference::Update {
                path: child(name),
                value: value.clone(),
            }),
            (None, None) => {}
        }
    }
}

fn diff_values(
    path: &AttributePath,
    existing: &AttributeValue,
    new: &AttributeValue,
    out: &mut Vec<AttributeDifference>,
) {
    match (existing, new) {
        (AttributeValue::M(old), AttributeValue::M(value)) => {
            diff_maps(Some(path), old, value, out)
        }
        (AttributeValue::L(old), AttributeValue::L(value)) => diff_lists(path, old, value, out),
        _ if existing == new => {}
        _ => out.push(AttributeDifference::Update {
            path: path.clone(),
            value: new.clone(),
        }),
    }
}

fn diff_lists(
    path: &AttributePath,
    existing: &[AttributeValue],
    new: &[AttributeValue],
    out: &mut Vec<AttributeDifference>,
) {
    for (index, (old, value)) in existing.iter().zip(new).enumerate() {
        diff_values(&path.index(index), old, value, out);
    }
    for (index, value) in new.iter().enumerate().skip(existing.len()) {
        out.push(AttributeDifference::Update {
            path: path.index(index),
            value: value.clone(),
        });
    }
    for index in new.len()..existing.len() {
        out.push(AttributeDifference::Remove {
            path: path.index(index),
        });
    }
}
