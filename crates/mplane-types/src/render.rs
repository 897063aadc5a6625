// Human-readable rendering of messages

use std::fmt::Write;

use mplane_error::ModelResult;
use serde_json::{Map, Value as Json};

use crate::message::{keys, Message};

fn text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Multi-line text form of a single message.
pub fn render(msg: &Message) -> ModelResult<String> {
    let json = msg.to_json(false)?;
    let empty = Map::new();
    let d = json.as_object().unwrap_or(&empty);
    let mut out = String::new();

    let head = d.get(msg.kind()).map(text).unwrap_or_default();
    let _ = writeln!(out, "{}: {}", msg.kind(), head);

    for section in [keys::MESSAGE, keys::LABEL, keys::LINK, keys::EXPORT, keys::TOKEN, keys::WHEN, keys::REGISTRY] {
        if let Some(value) = d.get(section) {
            let _ = writeln!(out, "    {:<12}: {}", section, text(value));
        }
    }

    for section in [keys::PARAMETERS, keys::METADATA] {
        if let Some(Json::Object(entries)) = d.get(section) {
            let _ = writeln!(out, "    {:<12}({:>2}): ", section, entries.len());
            for (name, value) in entries {
                let _ = writeln!(out, "        {:>32}: {}", name, text(value));
            }
        }
    }

    let columns: Vec<String> = match d.get(keys::RESULTS) {
        Some(Json::Array(names)) => names.iter().map(text).collect(),
        _ => Vec::new(),
    };
    if let Some(Json::Array(rows)) = d.get(keys::RESULTVALUES) {
        let _ = writeln!(out, "    {:<12}({:>2}):", keys::RESULTVALUES, rows.len());
        for (i, row) in rows.iter().enumerate() {
            let _ = writeln!(out, "          result {i}:");
            for (j, value) in row.as_array().into_iter().flatten().enumerate() {
                let name = columns.get(j).map(String::as_str).unwrap_or_default();
                let _ = writeln!(out, "            {:>32}: {}", name, text(value));
            }
        }
    } else if !columns.is_empty() {
        let _ = writeln!(out, "    {:<12}({:>2}):", keys::RESULTS, columns.len());
        for name in &columns {
            let _ = writeln!(out, "        {name}");
        }
    }

    Ok(out)
}

/// Render a message, or each message of an envelope in turn.
pub fn render_text(msg: &Message) -> ModelResult<String> {
    match msg {
        Message::Envelope(envelope) => {
            let mut out = String::new();
            for inner in envelope.messages() {
                out.push_str(&render(inner)?);
            }
            Ok(out)
        }
        other => render(other),
    }
}
