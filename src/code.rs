// SPDX-License-Identifier: GPL-3.0-only

//! Code records
//!
//! A [`Code`] is a scanned or generated barcode as persisted by the store.
//! [`NewCode`] is the validated, not-yet-persisted form handed to the store.

use crate::errors::AppError;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-assigned identifier of a code
///
/// Identifiers are never reused, so a higher id was always inserted later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeId(pub i64);

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CodeId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(CodeId)
            .map_err(|_| AppError::InvalidCode(format!("not a code id: {:?}", s)))
    }
}

/// Barcode symbology
///
/// Formats reported by detectors this crate does not know about are kept
/// verbatim in [`CodeFormat::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum CodeFormat {
    /// QR code
    #[default]
    Qr,
    /// EAN-13 retail barcode
    Ean13,
    /// Any other symbology, by name
    Other(String),
}

impl CodeFormat {
    /// Formats the generator can produce
    pub const GENERATABLE: [CodeFormat; 2] = [CodeFormat::Qr, CodeFormat::Ean13];

    /// Canonical name, as stored in the database
    pub fn as_str(&self) -> &str {
        match self {
            CodeFormat::Qr => "QR",
            CodeFormat::Ean13 => "EAN_13",
            CodeFormat::Other(name) => name,
        }
    }

    /// Get display name for the format
    pub fn display_name(&self) -> &str {
        match self {
            CodeFormat::Qr => "QR Code",
            CodeFormat::Ean13 => "EAN-13",
            CodeFormat::Other(name) => name,
        }
    }

    /// Parse a format name, accepting the usual aliases
    pub fn parse(name: &str) -> Self {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_uppercase();

        match normalized.as_str() {
            "QR" | "QRCODE" => CodeFormat::Qr,
            "EAN13" => CodeFormat::Ean13,
            _ => CodeFormat::Other(name.trim().to_string()),
        }
    }
}

impl fmt::Display for CodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for CodeFormat {
    fn from(name: String) -> Self {
        CodeFormat::parse(&name)
    }
}

impl From<CodeFormat> for String {
    fn from(format: CodeFormat) -> Self {
        format.as_str().to_string()
    }
}

impl FromStr for CodeFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CodeFormat::parse(s))
    }
}

/// A persisted code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub id: CodeId,
    pub content: String,
    pub format: CodeFormat,
    pub created_at: DateTime<Utc>,
}

/// A validated code waiting to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCode {
    content: String,
    format: CodeFormat,
    created_at: DateTime<Utc>,
}

impl NewCode {
    /// Validate content and stamp it with the current time
    pub fn new(content: impl Into<String>, format: CodeFormat) -> Result<Self, AppError> {
        Self::with_timestamp(content, format, Utc::now())
    }

    /// Validate content with an explicit creation time
    ///
    /// The time is kept to millisecond precision, which is what stores persist.
    pub fn with_timestamp(
        content: impl Into<String>,
        format: CodeFormat,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let content = content.into();
        if content.is_empty() {
            return Err(AppError::InvalidCode("content is empty".into()));
        }
        if let CodeFormat::Other(name) = &format
            && name.is_empty()
        {
            return Err(AppError::InvalidCode("format is empty".into()));
        }
        Ok(Self {
            content,
            format,
            created_at: created_at.trunc_subsecs(3),
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn format(&self) -> &CodeFormat {
        &self.format
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Attach the identifier the store assigned
    pub fn into_code(self, id: CodeId) -> Code {
        Code {
            id,
            content: self.content,
            format: self.format,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_aliases() {
        assert_eq!(CodeFormat::parse("qr"), CodeFormat::Qr);
        assert_eq!(CodeFormat::parse("QR_CODE"), CodeFormat::Qr);
        assert_eq!(CodeFormat::parse("ean-13"), CodeFormat::Ean13);
        assert_eq!(CodeFormat::parse("EAN_13"), CodeFormat::Ean13);
        assert_eq!(
            CodeFormat::parse("CODE_128"),
            CodeFormat::Other("CODE_128".into())
        );
    }

    #[test]
    fn test_format_canonical_name_round_trips() {
        for format in CodeFormat::GENERATABLE {
            assert_eq!(CodeFormat::parse(format.as_str()), format);
        }
    }

    #[test]
    fn test_format_serializes_as_name() {
        let json = serde_json::to_string(&CodeFormat::Ean13).unwrap();
        assert_eq!(json, "\"EAN_13\"");
        let parsed: CodeFormat = serde_json::from_str("\"QR\"").unwrap();
        assert_eq!(parsed, CodeFormat::Qr);
    }

    #[test]
    fn test_new_code_rejects_empty_content() {
        assert!(matches!(
            NewCode::new("", CodeFormat::Qr),
            Err(AppError::InvalidCode(_))
        ));
    }

    #[test]
    fn test_new_code_keeps_whitespace_content() {
        let code = NewCode::new(" ", CodeFormat::Qr).unwrap();
        assert_eq!(code.content(), " ");
    }

    #[test]
    fn test_code_id_parse() {
        assert_eq!("42".parse::<CodeId>().unwrap(), CodeId(42));
        assert!("abc".parse::<CodeId>().is_err());
    }
}
