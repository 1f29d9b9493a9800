use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(Value::Object(extra)), Some(target)) = (data, response.as_object_mut()) {
                target.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(
    output_format: &OutputFormat,
    message: &str,
    error_code: Option<&str>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Print a record as JSON, or as `key: value` lines in text mode
pub fn output_record(output_format: &OutputFormat, record: &Value) -> anyhow::Result<()> {
    match (output_format, record) {
        (OutputFormat::Text, Value::Object(fields)) => {
            for (key, value) in fields {
                match value {
                    Value::String(s) => println!("{}: {}", key, s),
                    Value::Null => println!("{}: -", key),
                    other => println!("{}: {}", key, other),
                }
            }
        }
        _ => println!("{}", serde_json::to_string_pretty(record)?),
    }
    Ok(())
}

/// Print a list of records; text mode shows one summary line per record
pub fn output_list(
    output_format: &OutputFormat,
    records: &[Value],
    columns: &[&str],
    empty_message: &str,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(records)?),
        OutputFormat::Text if records.is_empty() => println!("{}", empty_message),
        OutputFormat::Text => {
            for record in records {
                let line: Vec<String> = columns
                    .iter()
                    .map(|c| record.get(*c).and_then(Value::as_str).unwrap_or("-").to_string())
                    .collect();
                println!("{}", line.join("  "));
            }
        }
    }
    Ok(())
}

/// Use the provided password, else `URECOVER_PASSWORD`, else read one line from stdin
pub fn resolve_password(provided: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = provided.or_else(|| std::env::var("URECOVER_PASSWORD").ok()) {
        return Ok(password);
    }

    eprint!("Password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("Password is required");
    }
    Ok(password)
}
