//! Shared output helpers for human and JSON modes.
//!
//! Human mode prints data to stdout and notices to stderr. JSON mode wraps
//! responses in `{ data, warnings? }`.

use std::io::Write;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::opts::StoreOpts;

pub fn print_success(opts: &StoreOpts, data: Value, mut warnings: Vec<String>) -> Result<()> {
    if opts.quiet {
        warnings.clear();
    }
    if opts.pretty || opts.json {
        print_json(opts, data, warnings)
    } else {
        print_human(data, warnings)
    }
}

fn print_json(opts: &StoreOpts, data: Value, warnings: Vec<String>) -> Result<()> {
    let mut root = Map::new();
    root.insert("data".into(), data);
    if !warnings.is_empty() {
        root.insert(
            "warnings".into(),
            warnings.into_iter().map(Value::String).collect(),
        );
    }
    let root = Value::Object(root);
    if opts.pretty {
        println!("{}", serde_json::to_string_pretty(&root)?);
    } else {
        println!("{}", serde_json::to_string(&root)?);
    }
    Ok(())
}

fn print_human(data: Value, warnings: Vec<String>) -> Result<()> {
    let mut stderr = std::io::stderr();
    for w in warnings {
        writeln!(stderr, "notice: {w}")?;
    }
    match data {
        Value::String(s) => println!("{s}"),
        Value::Array(items) if items.iter().all(Value::is_string) => {
            for item in items {
                if let Value::String(s) = item {
                    println!("{s}");
                }
            }
        }
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}

/// Render a stored CBOR value as JSON. Byte strings become arrays of numbers
/// and non-string map keys are stringified.
pub fn cbor_to_json(value: serde_cbor::Value) -> Value {
    use serde_cbor::Value as Cbor;
    match value {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(b),
        Cbor::Integer(i) => match i64::try_from(i) {
            Ok(n) => Value::from(n),
            Err(_) => match u64::try_from(i) {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(i.to_string()),
            },
        },
        Cbor::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Cbor::Bytes(bytes) => bytes.into_iter().map(Value::from).collect(),
        Cbor::Text(s) => Value::String(s),
        Cbor::Array(items) => items.into_iter().map(cbor_to_json).collect(),
        Cbor::Map(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let key = match cbor_to_json(k) {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, cbor_to_json(v))
                })
                .collect(),
        ),
        Cbor::Tag(_, inner) => cbor_to_json(*inner),
        _ => Value::Null,
    }
}
