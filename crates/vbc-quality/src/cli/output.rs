//! Output formatting utilities

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::{IsTerminal, Write};
use std::path::Path;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use vbc_quality_diagnostics::Diagnostic;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    Json,
    #[default]
    Pretty,
    Table,
}

/// Color mode for terminal output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Set up color output based on user preference
pub fn setup_colors(mode: ColorMode) {
    let enabled = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => std::io::stdout().is_terminal(),
    };
    colored::control::set_override(enabled);
}

/// Format an error for display
pub fn format_error(error: &anyhow::Error) -> String {
    format!("{} {:#}", "Error:".red().bold(), error)
}

/// Format a warning for display
pub fn format_warning(warning: &str) -> String {
    format!("{} {}", "Warning:".yellow().bold(), warning)
}

/// Format a success message for display
pub fn format_success(message: &str) -> String {
    format!("{} {}", "Success:".green().bold(), message)
}

pub fn format_diagnostic(diagnostic: &Diagnostic) -> String {
    diagnostic.to_colored_string()
}

/// Write output to a file or stdout
pub fn write_output(content: &str, output_file: Option<&Path>) -> Result<()> {
    if let Some(path) = output_file {
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write to output file: {}", path.display()))?;
        eprintln!(
            "{}",
            format_success(&format!("Output written to {}", path.display()))
        );
    } else {
        println!("{}", content);
    }
    Ok(())
}

pub fn format_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(value).context("Failed to serialize JSON")
    } else {
        serde_json::to_string(value).context("Failed to serialize JSON")
    }
}

/// Render typed rows as a table
pub fn format_table<R: Tabled>(rows: impl IntoIterator<Item = R>) -> String {
    let rows: Vec<R> = rows.into_iter().collect();
    if rows.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(rows).with(Style::modern()).to_string()
}

/// Render a JSON object as a key/value table
pub fn format_object_table(value: &Value) -> Option<String> {
    #[derive(Tabled)]
    struct KeyValue {
        #[tabled(rename = "Key")]
        key: String,
        #[tabled(rename = "Value")]
        value: String,
    }

    let Value::Object(obj) = value else {
        return None;
    };
    let rows = obj.iter().map(|(k, v)| KeyValue {
        key: k.clone(),
        value: format_value(v),
    });
    Some(format_table(rows))
}

/// Format a simple value for display
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(obj) => format!("{{{} fields}}", obj.len()),
    }
}

/// Print a serializable value as JSON, or through `table` when a table was
/// requested
pub fn print_output<T: Serialize>(
    value: &T,
    format: OutputFormat,
    output_file: Option<&Path>,
    table: impl FnOnce(&T) -> String,
) -> Result<()> {
    let content = match format {
        OutputFormat::Json => format_json(value, false)?,
        OutputFormat::Pretty => format_json(value, true)?,
        OutputFormat::Table => table(value),
    };
    write_output(&content, output_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_table_lists_keys() {
        let table = format_object_table(&json!({"measure": "HEDIS-BCS", "rate": "50.00"})).unwrap();
        assert!(table.contains("HEDIS-BCS"));
        assert!(table.contains("rate"));
        assert!(format_object_table(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_value_rendering() {
        assert_eq!(format_value(&json!(null)), "-");
        assert_eq!(format_value(&json!([1, 2, 3])), "[3 items]");
    }
}
