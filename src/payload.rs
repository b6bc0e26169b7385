//! Plain text vs. file payloads inside a decrypted message
//!
//! A file travels as a JSON object `{"name", "type", "content"}` encrypted
//! like any other text. On the way out the shape is matched structurally:
//! there is no tag, so text that happens to be JSON of that shape is
//! indistinguishable from a file.

use serde::{Deserialize, Serialize};

/// Name given to decrypted plain text when it is saved.
pub const DEFAULT_TEXT_NAME: &str = "decrypted.txt";

/// MIME type given to decrypted plain text.
pub const DEFAULT_TEXT_MIME: &str = "text/plain";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub name: String,
    #[serde(rename = "type")]
    pub mime: String,
    pub content: String,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            content: content.into(),
        }
    }

    fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.mime.is_empty() && !self.content.is_empty()
    }
}

/// What the caller wants to encrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportInput {
    Text(String),
    File(FilePayload),
}

/// What a decrypted message turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPayload {
    Text(String),
    File(FilePayload),
}

impl DecodedPayload {
    pub fn is_file(&self) -> bool {
        matches!(self, DecodedPayload::File(_))
    }

    pub fn name(&self) -> &str {
        match self {
            DecodedPayload::Text(_) => DEFAULT_TEXT_NAME,
            DecodedPayload::File(file) => &file.name,
        }
    }

    pub fn mime(&self) -> &str {
        match self {
            DecodedPayload::Text(_) => DEFAULT_TEXT_MIME,
            DecodedPayload::File(file) => &file.mime,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            DecodedPayload::Text(text) => text,
            DecodedPayload::File(file) => &file.content,
        }
    }

    /// The payload as a file record, filling in defaults for plain text.
    pub fn into_file(self) -> FilePayload {
        match self {
            DecodedPayload::Text(text) => FilePayload::new(DEFAULT_TEXT_NAME, DEFAULT_TEXT_MIME, text),
            DecodedPayload::File(file) => file,
        }
    }
}

/// The string that gets encrypted for `input`.
pub fn encode_for_transport(input: &TransportInput) -> String {
    match input {
        TransportInput::Text(text) => text.clone(),
        // Serializing a struct of three strings cannot fail.
        TransportInput::File(file) => serde_json::to_string(file).unwrap_or_default(),
    }
}

/// Classify decrypted text. Never fails: anything that is not a JSON object
/// with non-empty string `name`, `type` and `content` is plain text.
pub fn decode_from_transport(plaintext: &str) -> DecodedPayload {
    // Derived structs also deserialize from arrays; only objects count.
    serde_json::from_str::<serde_json::Value>(plaintext)
        .ok()
        .filter(serde_json::Value::is_object)
        .and_then(|value| serde_json::from_value::<FilePayload>(value).ok())
        .filter(FilePayload::is_complete)
        .map_or_else(
            || DecodedPayload::Text(plaintext.to_owned()),
            DecodedPayload::File,
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        let input = TransportInput::Text("hello world".to_owned());
        let encoded = encode_for_transport(&input);
        assert_eq!(encoded, "hello world");

        let decoded = decode_from_transport(&encoded).into_file();
        assert_eq!(
            decoded,
            FilePayload::new("decrypted.txt", "text/plain", "hello world")
        );
    }

    #[test]
    fn test_file_shape_recognized_verbatim() {
        let decoded = decode_from_transport(r#"{"name":"a.txt","type":"text/plain","content":"hi"}"#);

        assert!(decoded.is_file());
        assert_eq!(
            decoded,
            DecodedPayload::File(FilePayload::new("a.txt", "text/plain", "hi"))
        );
        assert_eq!(decoded.name(), "a.txt");
        assert_eq!(decoded.mime(), "text/plain");
        assert_eq!(decoded.content(), "hi");
    }

    #[test]
    fn test_file_roundtrip_through_transport() {
        let file = FilePayload::new("notes.md", "text/markdown", "# notes\n");
        let encoded = encode_for_transport(&TransportInput::File(file.clone()));

        assert!(encoded.contains(r#""type":"text/markdown""#));
        assert_eq!(decode_from_transport(&encoded), DecodedPayload::File(file));
    }

    #[test]
    fn test_extra_fields_tolerated() {
        let decoded = decode_from_transport(
            r#"{"name":"a.txt","type":"text/plain","content":"hi","size":2}"#,
        );
        assert_eq!(
            decoded,
            DecodedPayload::File(FilePayload::new("a.txt", "text/plain", "hi"))
        );
    }

    #[test]
    fn test_shape_mismatches_fall_back_to_text() {
        let cases = [
            r#"{"name":"a.txt","type":"text/plain"}"#,
            r#"{"name":"","type":"text/plain","content":"hi"}"#,
            r#"{"name":"a.txt","type":"text/plain","content":""}"#,
            r#"{"name":"a.txt","type":"text/plain","content":42}"#,
            r#"["a.txt","text/plain","hi"]"#,
            r#""just a json string""#,
            "42",
            "{not json",
            "",
        ];

        for case in cases {
            let decoded = decode_from_transport(case);
            assert_eq!(decoded, DecodedPayload::Text(case.to_owned()), "case: {case}");
            assert_eq!(decoded.name(), DEFAULT_TEXT_NAME);
            assert_eq!(decoded.mime(), DEFAULT_TEXT_MIME);
        }
    }
}
