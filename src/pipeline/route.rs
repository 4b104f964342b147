//! Format routing: decide, per file, whether the engine is needed at all.
//!
//! | extension          | target = office   | target = pdf   |
//! |--------------------|-------------------|----------------|
//! | `.doc`             | convert → `docx`  | convert → `pdf`|
//! | `.xls`             | convert → `xlsx`  | convert → `pdf`|
//! | `.ppt`             | convert → `pptx`  | convert → `pdf`|
//! | `.docx/.xlsx/.pptx`| copy through      | convert → `pdf`|
//! | anything else      | copy through      | copy through   |
//!
//! Unknown extensions are never rejected: they are copied into the output
//! set unchanged, so one stray `.txt` in a batch cannot abort it.

use crate::config::ConversionTarget;
use crate::pipeline::sanitize::SanitizedName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A format the engine is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Docx,
    Xlsx,
    Pptx,
    Pdf,
}

impl TargetFormat {
    /// The engine's `--convert-to` argument, which is also the output extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetFormat::Docx => "docx",
            TargetFormat::Xlsx => "xlsx",
            TargetFormat::Pptx => "pptx",
            TargetFormat::Pdf => "pdf",
        }
    }

    /// MIME type of a file in this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            TargetFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            TargetFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            TargetFormat::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            TargetFormat::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of routing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingDecision {
    /// Run the engine with this sub-format.
    ConvertTo(TargetFormat),
    /// Copy the file into the output set unchanged.
    CopyThrough,
}

/// Route a file by extension (with or without leading dot, any case).
pub fn route(extension: &str, target: ConversionTarget) -> RoutingDecision {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    match (ext.as_str(), target) {
        ("doc", ConversionTarget::OfficeModern) => RoutingDecision::ConvertTo(TargetFormat::Docx),
        ("xls", ConversionTarget::OfficeModern) => RoutingDecision::ConvertTo(TargetFormat::Xlsx),
        ("ppt", ConversionTarget::OfficeModern) => RoutingDecision::ConvertTo(TargetFormat::Pptx),
        ("doc" | "xls" | "ppt" | "docx" | "xlsx" | "pptx", ConversionTarget::Pdf) => {
            RoutingDecision::ConvertTo(TargetFormat::Pdf)
        }
        _ => RoutingDecision::CopyThrough,
    }
}

/// Route a sanitized file name; names without an extension copy through.
pub fn route_file(name: &SanitizedName, target: ConversionTarget) -> RoutingDecision {
    match name.extension() {
        Some(ext) => route(ext, target),
        None => RoutingDecision::CopyThrough,
    }
}

/// File name the routed file will have in the output directory.
pub fn output_name(name: &SanitizedName, decision: RoutingDecision) -> String {
    match decision {
        RoutingDecision::ConvertTo(format) => format!("{}.{}", name.stem(), format.as_str()),
        RoutingDecision::CopyThrough => name.as_str().to_string(),
    }
}
