use crate::error::MetadataError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// Per-item record written by the downloader, kept exactly as stored.
///
/// The writer is outside our control, so known fields are read loosely through
/// accessors instead of being enforced by the schema.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct ItemMetadata(pub Value);

impl ItemMetadata {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    pub fn id(&self) -> Option<String> {
        self.get("id").and_then(scalar_to_string)
    }

    pub fn title(&self) -> Option<String> {
        self.get("title").and_then(scalar_to_string)
    }

    /// A single author, or several joined with ", ".
    pub fn author(&self) -> Option<String> {
        match self.get("author")? {
            Value::Array(names) => {
                let names: Vec<String> = names.iter().filter_map(scalar_to_string).collect();
                (!names.is_empty()).then(|| names.join(", "))
            }
            other => scalar_to_string(other),
        }
    }

    /// Size in bytes, when stored as a number or a plain numeric string.
    pub fn size(&self) -> Option<u64> {
        match self.get("size")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn checksum(&self) -> Option<String> {
        self.get("checksum").and_then(scalar_to_string)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Clone, Debug)]
pub struct MetadataStore {
    pub metadata_dir: PathBuf,
}

impl MetadataStore {
    pub fn new(metadata_dir: PathBuf) -> Self {
        Self { metadata_dir }
    }

    pub async fn lookup(&self, item_id: &str) -> Result<Option<ItemMetadata>, MetadataError> {
        if !is_valid_item_id(item_id) {
            debug!("Rejecting metadata lookup for invalid item id {:?}", item_id);
            return Ok(None);
        }

        let path = self.metadata_dir.join(format!("{}.json", item_id));
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(MetadataError::Read { path, source }),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| MetadataError::Malformed { path, source })
    }
}

/// Item ids are plain file stems; anything that could escape the metadata
/// directory is refused.
fn is_valid_item_id(item_id: &str) -> bool {
    !item_id.is_empty()
        && item_id != "."
        && !item_id.contains("..")
        && !item_id.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_lookup_reads_record() {
        let tmp = tempdir().unwrap();
        std::fs::write(
            tmp.path().join("84.json"),
            r#"{"id":"84","title":"Frankenstein","author":"Mary Shelley","size":448821,"checksum":"abc","subjects":["Horror"]}"#,
        )
        .unwrap();

        let store = MetadataStore::new(tmp.path().to_path_buf());
        let meta = store.lookup("84").await.unwrap().unwrap();
        assert_eq!(meta.title().as_deref(), Some("Frankenstein"));
        assert_eq!(meta.author().as_deref(), Some("Mary Shelley"));
        assert_eq!(meta.size(), Some(448821));
        assert_eq!(meta.checksum().as_deref(), Some("abc"));
        assert_eq!(meta.0["subjects"][0], "Horror");
    }

    #[tokio::test]
    async fn test_loosely_typed_record_is_returned_as_is() {
        let tmp = tempdir().unwrap();
        let raw = r#"{"id":1,"author":["A","B"],"size":"448 KB"}"#;
        std::fs::write(tmp.path().join("1.json"), raw).unwrap();

        let store = MetadataStore::new(tmp.path().to_path_buf());
        let meta = store.lookup("1").await.unwrap().unwrap();
        assert_eq!(meta.id().as_deref(), Some("1"));
        assert_eq!(meta.author().as_deref(), Some("A, B"));
        assert_eq!(meta.size(), None);
        assert_eq!(meta.0, serde_json::from_str::<Value>(raw).unwrap());

        std::fs::write(tmp.path().join("2.json"), r#"{"size":" 2048 "}"#).unwrap();
        let meta = store.lookup("2").await.unwrap().unwrap();
        assert_eq!(meta.size(), Some(2048));
        assert_eq!(meta.title(), None);
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let tmp = tempdir().unwrap();
        let store = MetadataStore::new(tmp.path().to_path_buf());
        assert_eq!(store.lookup("404").await.unwrap(), None);

        let absent_dir = MetadataStore::new(tmp.path().join("missing"));
        assert_eq!(absent_dir.lookup("1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_path_escape_is_not_found() {
        let tmp = tempdir().unwrap();
        let meta_dir = tmp.path().join("meta");
        std::fs::create_dir(&meta_dir).unwrap();
        std::fs::write(tmp.path().join("secret.json"), "{}").unwrap();

        let store = MetadataStore::new(meta_dir);
        assert_eq!(store.lookup("../secret").await.unwrap(), None);
        assert_eq!(store.lookup("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_record_is_an_error() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("9.json"), "{not json").unwrap();
        let store = MetadataStore::new(tmp.path().to_path_buf());
        assert!(matches!(
            store.lookup("9").await,
            Err(MetadataError::Malformed { .. })
        ));
    }
}
