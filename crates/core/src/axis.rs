//! Axis combination expander.
//!
//! Turns an X axis, a Y axis and a set of default parameters into one
//! [`ParameterCombination`] per matrix cell. Cells are produced row-major by
//! Y: the cell at list position `k` has `y_index = k / m` and
//! `x_index = k % m`, where `m` is the number of X values.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::params::{DefaultParams, ParamMap, ParamValue};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Exact field name of the primary image input.
pub const IMAGE_FIELD: &str = "image";

/// Field name of the multi-image input used by some providers.
pub const IMAGE_URLS_FIELD: &str = "image_urls";

/// Maximum number of values on a single axis.
pub const MAX_AXIS_VALUES: usize = 64;

/// Maximum number of cells in one sweep matrix.
pub const MAX_COMBINATIONS: usize = 1024;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One cell of the sweep matrix with its resolved parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterCombination {
    pub x_index: usize,
    pub y_index: usize,
    pub x_value: String,
    pub y_value: String,
    /// Distinct image references in insertion order: X, Y, then defaults.
    pub images: Vec<String>,
    /// Every non-image field for this cell. Never shares a key with `images`.
    pub other_params: ParamMap,
    /// Set once the backing generation row has been created.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub generation_id: Option<DbId>,
}

impl ParameterCombination {
    fn empty(x_index: usize, y_index: usize, x_value: &str, y_value: &str) -> Self {
        Self {
            x_index,
            y_index,
            x_value: x_value.to_string(),
            y_value: y_value.to_string(),
            images: Vec::new(),
            other_params: ParamMap::new(),
            generation_id: None,
        }
    }

    fn push_image(&mut self, image: String) {
        if !self.images.contains(&image) {
            self.images.push(image);
        }
    }

    /// Look up a scalar field as text (e.g. `prompt`).
    pub fn text_param(&self, field: &str) -> Option<&str> {
        self.other_params.get(field).and_then(ParamValue::as_str)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Whether `field` carries image references rather than a scalar.
///
/// True for `image`, any name starting with `image` (`image_2`,
/// `image_reference`, ...) and `image_urls`.
pub fn is_image_field(field: &str) -> bool {
    field == IMAGE_FIELD || field.starts_with(IMAGE_FIELD) || field == IMAGE_URLS_FIELD
}

/// Trim every value and drop the blank ones.
pub fn normalize_values(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate an axis configuration before anything is expanded or stored.
pub fn validate_axis_config(
    x_field: &str,
    x_values: &[String],
    y_field: &str,
    y_values: &[String],
) -> Result<(), CoreError> {
    validate_axis("X", x_field, x_values)?;
    validate_axis("Y", y_field, y_values)?;

    if x_field.trim() == y_field.trim() {
        return Err(CoreError::Validation(format!(
            "X and Y axes must sweep different fields, both are '{}'",
            x_field.trim()
        )));
    }

    let total = normalize_values(x_values).len() * normalize_values(y_values).len();
    if total > MAX_COMBINATIONS {
        return Err(CoreError::Validation(format!(
            "Sweep would produce {total} combinations, the maximum is {MAX_COMBINATIONS}"
        )));
    }

    Ok(())
}

fn validate_axis(label: &str, field: &str, values: &[String]) -> Result<(), CoreError> {
    if field.trim().is_empty() {
        return Err(CoreError::Validation(format!(
            "{label} axis field must not be empty"
        )));
    }
    let count = normalize_values(values).len();
    if count == 0 {
        return Err(CoreError::Validation(format!(
            "{label} axis '{}' needs at least one non-blank value",
            field.trim()
        )));
    }
    if count > MAX_AXIS_VALUES {
        return Err(CoreError::Validation(format!(
            "{label} axis '{}' has {count} values, the maximum is {MAX_AXIS_VALUES}",
            field.trim()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

/// Expand two axes and the default parameters into the full matrix.
///
/// Returns an empty list when either axis has no non-blank value; the caller
/// reports that as a validation error. Duplicate axis values are kept.
///
/// Default entries for a field that an axis drives as an image are skipped so
/// the axis image replaces the default one. Every other default, including one
/// named after a scalar axis field, is folded in afterwards and routed by
/// [`is_image_field`].
pub fn expand(
    x_field: &str,
    x_values: &[String],
    y_field: &str,
    y_values: &[String],
    default_params: &DefaultParams,
) -> Vec<ParameterCombination> {
    let x_values = normalize_values(x_values);
    let y_values = normalize_values(y_values);
    if x_values.is_empty() || y_values.is_empty() {
        return Vec::new();
    }

    let x_field = x_field.trim();
    let y_field = y_field.trim();
    let x_is_image = is_image_field(x_field);
    let y_is_image = is_image_field(y_field);

    let mut cells = Vec::with_capacity(x_values.len() * y_values.len());
    for (y_index, y_value) in y_values.iter().enumerate() {
        for (x_index, x_value) in x_values.iter().enumerate() {
            let mut cell = ParameterCombination::empty(x_index, y_index, x_value, y_value);

            apply_axis(&mut cell, x_field, x_value, x_is_image);
            apply_axis(&mut cell, y_field, y_value, y_is_image);

            for fields in default_params.values() {
                for (field, value) in fields {
                    if (x_is_image && field == x_field) || (y_is_image && field == y_field) {
                        continue;
                    }
                    if is_image_field(field) {
                        for image in value.image_refs() {
                            cell.push_image(image);
                        }
                    } else {
                        cell.other_params.insert(field.clone(), value.clone());
                    }
                }
            }

            cells.push(cell);
        }
    }
    cells
}

fn apply_axis(cell: &mut ParameterCombination, field: &str, value: &str, is_image: bool) {
    if is_image && !value.is_empty() {
        cell.push_image(value.to_string());
    } else {
        cell.other_params
            .insert(field.to_string(), ParamValue::Text(value.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
