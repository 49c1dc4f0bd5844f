use serde::{Deserialize, Serialize};

/// Comparison options. Unset fields inherit from the comparator defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_values: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_arrays_ordering: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disallow_extra_fields: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_array_extra_items: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_by_line: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_fast: Option<bool>,

    /// Parse both sides as JSON before comparing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_json: Option<bool>,
}

impl CompareParams {
    /// Overlay `overrides` on top of `self`, field by field
    pub fn merged(&self, overrides: &CompareParams) -> CompareParams {
        CompareParams {
            ignore_values: overrides.ignore_values.or(self.ignore_values),
            ignore_arrays_ordering: overrides
                .ignore_arrays_ordering
                .or(self.ignore_arrays_ordering),
            disallow_extra_fields: overrides
                .disallow_extra_fields
                .or(self.disallow_extra_fields),
            allow_array_extra_items: overrides
                .allow_array_extra_items
                .or(self.allow_array_extra_items),
            line_by_line: overrides.line_by_line.or(self.line_by_line),
            fail_fast: overrides.fail_fast.or(self.fail_fast),
            compare_json: overrides.compare_json.or(self.compare_json),
        }
    }

    pub fn ignore_values(&self) -> bool {
        self.ignore_values.unwrap_or(false)
    }

    pub fn ignore_arrays_ordering(&self) -> bool {
        self.ignore_arrays_ordering.unwrap_or(false)
    }

    pub fn disallow_extra_fields(&self) -> bool {
        self.disallow_extra_fields.unwrap_or(false)
    }

    pub fn allow_array_extra_items(&self) -> bool {
        self.allow_array_extra_items.unwrap_or(false)
    }

    /// Line-by-line text comparison is on unless explicitly disabled
    pub fn line_by_line(&self) -> bool {
        self.line_by_line.unwrap_or(true)
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast.unwrap_or(false)
    }

    pub fn compare_json(&self) -> bool {
        self.compare_json.unwrap_or(false)
    }
}
