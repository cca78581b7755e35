//! Assistant tools as explicit command objects.
//!
//! Every tool is a `ToolSpec` (name, description, input schema) next to a
//! plain function; registration is the explicit list below rather than
//! anything scanned at runtime.

pub mod comparison;
pub mod product_search;
pub mod store_locator;

use serde_json::Value;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

pub fn registry() -> Vec<ToolSpec> {
    vec![
        product_search::spec(),
        comparison::spec(),
        store_locator::spec(),
    ]
}
