use serde_json::{Map, Value};

/// Field used as the filter key.
pub const LABEL_FIELD: &str = "subreddit";

/// One decoded archive line: the original text plus its parsed JSON object.
///
/// The raw text is what gets written out, so matched records keep their original
/// field content and ordering byte-for-byte.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    raw: String,
    fields: Map<String, Value>,
}

impl Record {
    pub fn new(raw: String, fields: Map<String, Value>) -> Self {
        Self { raw, fields }
    }

    #[inline]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The subreddit name, if present and a string.
    #[inline]
    pub fn label(&self) -> Option<&str> {
        self.get(LABEL_FIELD).and_then(Value::as_str)
    }

    #[inline]
    pub fn as_line(&self) -> &str {
        &self.raw
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_line(self) -> String {
        self.raw
    }
}
