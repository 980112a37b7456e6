//! Rendering of query results for the `query` subcommand.

use std::fmt;
use std::io::Write;

use super::QueryResult;

/// A single typed value from a result row
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact numeric kept in its textual form (decimals, wide integers)
    Number(String),
    Text(String),
}

impl Cell {
    fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Null => serde_json::Value::Null,
            Cell::Bool(b) => serde_json::Value::Bool(*b),
            Cell::Int(n) => serde_json::Value::from(*n),
            Cell::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Cell::Number(s) => s
                .parse::<serde_json::Number>()
                .map_or_else(|_| serde_json::Value::String(s.clone()), serde_json::Value::Number),
            Cell::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Int(n) => write!(f, "{}", n),
            Cell::Float(x) => write!(f, "{}", x),
            Cell::Number(s) | Cell::Text(s) => f.write_str(s),
        }
    }
}

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    /// One JSON object per line
    JsonLines,
    Csv,
    Tsv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "ndjson" => Ok(OutputFormat::JsonLines),
            "csv" => Ok(OutputFormat::Csv),
            "tsv" => Ok(OutputFormat::Tsv),
            _ => Err(format!(
                "Unknown format: {}. Valid: table, json, jsonl, csv, tsv",
                s
            )),
        }
    }
}

/// Longest cell shown in table output
const MAX_CELL_WIDTH: usize = 40;

pub struct QueryResultFormatter;

impl QueryResultFormatter {
    pub fn format(result: &QueryResult, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::table(result),
            OutputFormat::Json => {
                let rows: Vec<serde_json::Value> = Self::objects(result).collect();
                serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
            }
            OutputFormat::JsonLines => Self::objects(result)
                .map(|obj| obj.to_string() + "\n")
                .collect(),
            OutputFormat::Csv => Self::delimited(result, ',', Self::csv_field),
            OutputFormat::Tsv => Self::delimited(result, '\t', |v| {
                v.replace('\t', "\\t").replace('\n', "\\n")
            }),
        }
    }

    pub fn write<W: Write>(
        result: &QueryResult,
        format: OutputFormat,
        writer: &mut W,
    ) -> std::io::Result<()> {
        writer.write_all(Self::format(result, format).as_bytes())
    }

    fn objects(result: &QueryResult) -> impl Iterator<Item = serde_json::Value> + '_ {
        result.rows.iter().map(move |row| {
            let obj: serde_json::Map<String, serde_json::Value> = result
                .columns
                .iter()
                .cloned()
                .zip(row.iter().map(Cell::to_json))
                .collect();
            serde_json::Value::Object(obj)
        })
    }

    fn table(result: &QueryResult) -> String {
        if result.columns.is_empty() {
            return String::new();
        }

        let rendered: Vec<Vec<String>> = result
            .rows
            .iter()
            .map(|row| row.iter().map(|c| Self::clip(&c.to_string())).collect())
            .collect();

        let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
        for row in &rendered {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let rule = widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+");
        let line = |cells: &[String]| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| {
                    let pad = w.saturating_sub(c.chars().count());
                    format!(" {}{} ", c, " ".repeat(pad))
                })
                .collect::<Vec<_>>()
                .join("|")
        };

        let mut out = String::new();
        out.push_str(&line(&result.columns));
        out.push('\n');
        out.push_str(&rule);
        out.push('\n');
        for row in &rendered {
            out.push_str(&line(row));
            out.push('\n');
        }
        let n = result.rows.len();
        out.push_str(&format!("({} row{})\n", n, if n == 1 { "" } else { "s" }));
        out
    }

    fn clip(value: &str) -> String {
        if value.chars().count() <= MAX_CELL_WIDTH {
            value.to_string()
        } else {
            let head: String = value.chars().take(MAX_CELL_WIDTH - 1).collect();
            format!("{}…", head)
        }
    }

    fn delimited(result: &QueryResult, sep: char, escape: impl Fn(&str) -> String) -> String {
        let sep = sep.to_string();
        let mut out = result
            .columns
            .iter()
            .map(|c| escape(c))
            .collect::<Vec<_>>()
            .join(&sep);
        out.push('\n');
        for row in &result.rows {
            let fields: Vec<String> = row.iter().map(|c| escape(&c.to_string())).collect();
            out.push_str(&fields.join(&sep));
            out.push('\n');
        }
        out
    }

    fn csv_field(value: &str) -> String {
        if value.contains([',', '"', '\n', '\r']) {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top_customers() -> QueryResult {
        QueryResult {
            columns: vec!["full_name".to_string(), "orders".to_string(), "spent".to_string()],
            rows: vec![
                vec![
                    Cell::Text("Ann Lee".to_string()),
                    Cell::Int(12),
                    Cell::Number("412.50".to_string()),
                ],
                vec![
                    Cell::Text("Doe, John".to_string()),
                    Cell::Int(9),
                    Cell::Null,
                ],
            ],
            execution_time_secs: 0.0,
        }
    }

    #[test]
    fn test_table_output() {
        let out = QueryResultFormatter::format(&top_customers(), OutputFormat::Table);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], " full_name | orders | spent  ");
        assert!(lines[1].starts_with("-----------+"));
        assert!(out.ends_with("(2 rows)\n"));
    }

    #[test]
    fn test_json_keeps_types() {
        let out = QueryResultFormatter::format(&top_customers(), OutputFormat::Json);
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0]["orders"], 12);
        assert_eq!(parsed[0]["spent"], 412.5);
        assert!(parsed[1]["spent"].is_null());
    }

    #[test]
    fn test_jsonl_one_object_per_line() {
        let out = QueryResultFormatter::format(&top_customers(), OutputFormat::JsonLines);
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn test_csv_quotes_commas() {
        let out = QueryResultFormatter::format(&top_customers(), OutputFormat::Csv);
        assert!(out.starts_with("full_name,orders,spent\n"));
        assert!(out.contains("\"Doe, John\",9,NULL"));
    }

    #[test]
    fn test_clip_long_values() {
        let long = "x".repeat(100);
        assert_eq!(QueryResultFormatter::clip(&long).chars().count(), MAX_CELL_WIDTH);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("NDJSON".parse::<OutputFormat>().unwrap(), OutputFormat::JsonLines);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
