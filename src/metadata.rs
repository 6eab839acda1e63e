//! NetCDF metadata inspection and field summaries
//!
//! Backs the `describe` subcommand: lists what a file contains and, for one
//! variable, shows how it decodes as a field together with quick statistics.

use crate::errors::Result;
use crate::field::GridField;
use crate::parallel::Executor;
use crate::statistics::{MissingPolicy, StatOperation};
use netcdf::AttributeValue;
use std::path::Path;

/// Information about a dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
    pub is_unlimited: bool,
}

/// Structured metadata for a NetCDF variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub name: String,
    pub dimensions: Vec<DimensionInfo>,
    pub units: Option<String>,
    pub long_name: Option<String>,
}

impl VariableInfo {
    #[must_use]
    pub fn total_elements(&self) -> usize {
        self.dimensions.iter().map(|d| d.length).product()
    }
}

fn string_attribute(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute(name)?.value().ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

/// Every variable of the file at `path`, sorted by name
///
/// # Errors
///
/// Returns [`crate::errors::OceanReduceError::NetCDF`] if the file cannot be
/// opened.
pub fn list_variables(path: &Path) -> Result<Vec<VariableInfo>> {
    let file = netcdf::open(path)?;
    let mut variables: Vec<VariableInfo> = file
        .variables()
        .map(|var| VariableInfo {
            name: var.name().to_string(),
            dimensions: var
                .dimensions()
                .iter()
                .map(|d| DimensionInfo {
                    name: d.name().to_string(),
                    length: d.len(),
                    is_unlimited: d.is_unlimited(),
                })
                .collect(),
            units: string_attribute(&var, "units"),
            long_name: string_attribute(&var, "long_name"),
        })
        .collect();
    variables.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(variables)
}

/// Prints the variables and dimensions of a file in a clean, organized format
///
/// # Errors
///
/// Returns [`crate::errors::OceanReduceError::NetCDF`] if the file cannot be
/// opened.
pub fn print_file_summary(path: &Path) -> Result<()> {
    let variables = list_variables(path)?;

    println!("\n Variables in {}", path.display());
    println!("==============");
    if variables.is_empty() {
        println!("   (No variables found)");
    }
    for var in &variables {
        if var.dimensions.is_empty() {
            println!("    {}: scalar", var.name);
        } else {
            let dims: Vec<String> = var
                .dimensions
                .iter()
                .map(|d| {
                    if d.is_unlimited {
                        format!("{}={} (unlimited)", d.name, d.length)
                    } else {
                        format!("{}={}", d.name, d.length)
                    }
                })
                .collect();
            println!("    {} [{}]", var.name, dims.join(", "));
        }

        let mut key_attrs = Vec::new();
        if let Some(units) = &var.units {
            key_attrs.push(format!("units: {units}"));
        }
        if let Some(long_name) = &var.long_name {
            key_attrs.push(format!("long_name: {long_name}"));
        }
        if !key_attrs.is_empty() {
            println!("      └─ {}", key_attrs.join(", "));
        }
    }
    Ok(())
}

/// Quick statistics of a materialised field, missing values skipped
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    pub valid: usize,
    pub total: usize,
}

/// Compute a [`FieldSummary`] of `field` on `executor`
///
/// # Errors
///
/// Returns the first error raised while materialising the field.
pub fn summarize_field(field: &GridField, executor: &dyn Executor) -> Result<FieldSummary> {
    let data = field.compute(executor)?;
    let stat = |op: StatOperation| op.reduce(data.iter().copied(), MissingPolicy::Skip);
    Ok(FieldSummary {
        min: stat(StatOperation::Min),
        max: stat(StatOperation::Max),
        mean: stat(StatOperation::Mean),
        std: stat(StatOperation::Std),
        valid: data.iter().filter(|v| !v.is_nan()).count(),
        total: data.len(),
    })
}

/// Prints a field's axes, attributes and summary statistics
pub fn print_field_summary(field: &GridField, summary: &FieldSummary) {
    println!("\n Field Description");
    println!("===================");
    print!("{}", field.describe());
    println!("\n Summary:");
    println!("   Min: {}", summary.min);
    println!("   Max: {}", summary.max);
    println!("   Mean: {:.4}", summary.mean);
    println!("   Std Dev: {:.4}", summary.std);
    println!("   Valid elements: {} / {}", summary.valid, summary.total);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Axis;
    use crate::parallel::SequentialExecutor;
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_summarize_skips_missing() {
        let data = ArrayD::from_shape_vec(IxDyn(&[4]), vec![1.0, f64::NAN, 3.0, 5.0]).unwrap();
        let field = GridField::from_array("v", vec![Axis::index("x", 4)], data).unwrap();
        let summary = summarize_field(&field, &SequentialExecutor).unwrap();
        assert_eq!(summary.valid, 3);
        assert_eq!(summary.total, 4);
        assert!((summary.mean - 3.0).abs() < 1e-12);
        assert_eq!(summary.max, 5.0);
    }
}
