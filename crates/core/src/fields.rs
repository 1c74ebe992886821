//! Field Resolution Pipeline.
//!
//! Decodes the raw value of one configured custom field out of a source
//! record. Parsers are tried in ascending weight; the first one that can
//! handle the field ID and is willing to overwrite what earlier parsers
//! produced does the parse.

use serde_json::Value;

use crate::record::{SourceRecord, KEY_CUSTOM_FIELDS};
use crate::value::json_to_string;

/// Separator between segments of a non-numeric field ID, e.g. `address][city`.
pub const PATH_SEPARATOR: &str = "][";

pub trait FieldParser: Send + Sync {
    fn id(&self) -> &'static str;

    fn weight(&self) -> i32;

    fn can_parse(&self, field_id: &str) -> bool;

    /// Whether this parser may replace `existing`, the output of an earlier
    /// parser in the chain.
    fn can_overwrite(&self, existing: &[String]) -> bool {
        existing.is_empty()
    }

    fn parse(&self, record: &SourceRecord, field_id: &str) -> Vec<String>;
}

/// Scalars become a one-element list, arrays keep their elements, missing
/// values become an empty list.
pub fn normalize(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(json_to_string).collect(),
        Some(other) => vec![json_to_string(other)],
    }
}

// ---------------------------------------------------------------------------
// Built-in parsers
// ---------------------------------------------------------------------------

/// Purely numeric IDs are custom fields: `customFields[id]`.
#[derive(Debug, Default)]
pub struct NumericFieldParser;

impl FieldParser for NumericFieldParser {
    fn id(&self) -> &'static str {
        "numeric"
    }

    fn weight(&self) -> i32 {
        1
    }

    fn can_parse(&self, field_id: &str) -> bool {
        !field_id.is_empty() && field_id.bytes().all(|b| b.is_ascii_digit())
    }

    fn parse(&self, record: &SourceRecord, field_id: &str) -> Vec<String> {
        normalize(record.element(&[KEY_CUSTOM_FIELDS, field_id]))
    }
}

/// Any other ID is a bracket-delimited path into the record.
#[derive(Debug, Default)]
pub struct NonNumericFieldParser;

impl FieldParser for NonNumericFieldParser {
    fn id(&self) -> &'static str {
        "non_numeric"
    }

    fn weight(&self) -> i32 {
        2
    }

    fn can_parse(&self, field_id: &str) -> bool {
        !NumericFieldParser.can_parse(field_id)
    }

    fn parse(&self, record: &SourceRecord, field_id: &str) -> Vec<String> {
        let path: Vec<&str> = field_id.split(PATH_SEPARATOR).collect();
        normalize(record.element(&path))
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Weight-ordered set of field parsers, sorted once at registration.
pub struct FieldParserChain {
    parsers: Vec<Box<dyn FieldParser>>,
}

impl FieldParserChain {
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut chain = Self::empty();
        chain.register(Box::new(NumericFieldParser));
        chain.register(Box::new(NonNumericFieldParser));
        chain
    }

    pub fn register(&mut self, parser: Box<dyn FieldParser>) {
        self.parsers.push(parser);
        self.parsers.sort_by_key(|p| p.weight());
    }

    pub fn parser_ids(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.id()).collect()
    }

    /// Resolve `field_id` against `record`. Empty when no parser produced
    /// anything.
    pub fn resolve(&self, record: &SourceRecord, field_id: &str) -> Vec<String> {
        let mut out = Vec::new();
        for parser in &self.parsers {
            if parser.can_parse(field_id) && parser.can_overwrite(&out) {
                out = parser.parse(record, field_id);
                tracing::trace!(parser = parser.id(), field_id, values = out.len(), "Field parsed");
            }
        }
        out
    }
}

impl Default for FieldParserChain {
    fn default() -> Self {
        Self::with_defaults()
    }
}
