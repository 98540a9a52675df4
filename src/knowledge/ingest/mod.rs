// Vehicle catalog ingestion
// Renders catalog records into knowledge documents with a labelled footer

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::KnowledgeDocument;
use crate::{RagError, Result};

pub const IMAGE_URL_LABEL: &str = "이미지URL";
pub const BASE_TRIM_ID_LABEL: &str = "BaseTrimId";
pub const ORIGIN_ID_LABEL: &str = "OriginID";

const FOOTER_SEPARATOR: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRecord {
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trims: Vec<TrimRecord>,
    #[serde(default)]
    pub options: Vec<OptionRecord>,
    pub image_url: String,
    pub base_trim_id: String,
    pub origin_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimRecord {
    pub name: String,
    pub price: u64,
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRecord {
    pub name: String,
    pub price: u64,
}

impl VehicleRecord {
    #[inline]
    pub fn title(&self) -> String {
        format!("{} {}", self.brand, self.model)
    }

    #[inline]
    pub fn source(&self) -> String {
        format!("car-{}", self.origin_id)
    }

    /// Render the record as document text ending with the labelled footer
    #[inline]
    pub fn render(&self) -> String {
        let mut content = format!("[차량] {}\n", self.title());

        if let Some(description) = self.description.as_deref().filter(|d| !d.trim().is_empty()) {
            let _ = writeln!(content, "{}", description.trim());
        }

        if !self.trims.is_empty() {
            content.push_str("\n[트림]\n");
            for trim in &self.trims {
                let _ = write!(content, "- {}: {}", trim.name, format_price(trim.price));
                if !trim.specs.is_empty() {
                    let specs: Vec<String> = trim
                        .specs
                        .iter()
                        .map(|(key, value)| format!("{}: {}", key, value))
                        .collect();
                    let _ = write!(content, " ({})", specs.join(", "));
                }
                content.push('\n');
            }
        }

        if !self.options.is_empty() {
            content.push_str("\n[옵션]\n");
            for option in &self.options {
                let _ = writeln!(content, "- {}: {}", option.name, format_price(option.price));
            }
        }

        let _ = write!(
            content,
            "\n{}\n{}: {}\n{}: {}\n{}: {}",
            FOOTER_SEPARATOR,
            IMAGE_URL_LABEL,
            self.image_url,
            BASE_TRIM_ID_LABEL,
            self.base_trim_id,
            ORIGIN_ID_LABEL,
            self.origin_id
        );

        content
    }

    #[inline]
    pub fn to_document(&self) -> KnowledgeDocument {
        KnowledgeDocument::new(self.render(), self.source())
    }
}

/// Korean won with thousands separators, e.g. `27,880,000원`
#[inline]
pub fn format_price(price: u64) -> String {
    let digits = price.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped.push('원');
    grouped
}

/// Value of a `<label>: <value>` footer line, if present and non-empty
#[inline]
pub fn footer_field<'a>(content: &'a str, label: &str) -> Option<&'a str> {
    content.lines().rev().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == label)
            .then(|| value.trim())
            .filter(|value| !value.is_empty())
    })
}

/// Read a JSON array of vehicle records
#[inline]
pub fn load_records(path: &Path) -> Result<Vec<VehicleRecord>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| RagError::Ingest(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_records(&raw)
}

#[inline]
pub fn parse_records(raw: &str) -> Result<Vec<VehicleRecord>> {
    let records: Vec<VehicleRecord> = serde_json::from_str(raw)
        .map_err(|e| RagError::Ingest(format!("Invalid vehicle catalog: {}", e)))?;

    if let Some(record) = records.iter().find(|r| r.origin_id.trim().is_empty()) {
        return Err(RagError::Ingest(format!(
            "Vehicle record {} has an empty originId",
            record.title()
        )));
    }

    Ok(records)
}
