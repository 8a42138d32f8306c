use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use labnode_frame::Value;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Print one record: `out` as a JSON line, or `rows` as a two-column table
/// or aligned `key: value` lines.
pub fn print_record<T: Serialize>(out: &T, rows: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (key, value) in rows {
                table.add_row(vec![key.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
            for (key, value) in rows {
                println!("{key:<width$}  {value}");
            }
        }
    }
}

/// Print one row of a stream of samples.
pub fn print_sample<T: Serialize>(out: &T, rows: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Table => print_record(out, rows, format),
        OutputFormat::Pretty => {
            let line = rows
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{line}");
        }
    }
}

/// JSON form of a device value. Byte strings become lowercase hex.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(value) => serde_json::Value::Bool(*value),
        Value::Integer(value) => serde_json::Value::from(*value),
        Value::Float(value) => serde_json::Number::from_f64(*value)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Bytes(_) => serde_json::Value::String(value.to_string()),
        Value::Text(text) => serde_json::Value::String(text.clone()),
        Value::Array(items) => items.iter().map(value_to_json).collect(),
        Value::Map(fields) => fields
            .iter()
            .map(|(key, item)| (key.to_string(), value_to_json(item)))
            .collect::<serde_json::Map<_, _>>()
            .into(),
    }
}
