//! Data block domain model.
//!
//! # Responsibility
//! - Define the public, preserved and private sections of one data block.
//! - Define the client-facing input schema and validate it once.
//!
//! # Invariants
//! - Sections are composed explicitly, never merged into one struct.
//! - `DataBlockInput` rejects unknown fields, so owner/timestamp fields can
//!   never be client-supplied.
//! - Ids match `^[A-Za-z0-9][A-Za-z0-9._:-]{0,127}$`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

static DATA_BLOCK_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:-]{0,127}$").expect("valid data block id regex")
});

/// Caller-visible descriptive fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSection {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub contains_subnational_data: bool,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub organisation: String,
    #[serde(default)]
    pub maintainer: String,
    /// Free-form publication date as supplied by the maintainer.
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub field_names: Vec<String>,
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(default)]
    pub number_of_rows: u64,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub define_license: String,
    #[serde(default)]
    pub methodology: String,
    #[serde(default)]
    pub define_methodology: String,
    #[serde(default)]
    pub update_frequency: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// System-assigned fields, written from the authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreservedSection {
    /// Subject id of the registering caller.
    pub owner: String,
    /// Organization of the registering caller.
    pub owner_org: String,
    /// Transaction time of registration, epoch milliseconds.
    pub created_at: i64,
    /// Transaction time of the last write, epoch milliseconds.
    pub modified_at: i64,
}

impl PreservedSection {
    pub fn new(owner: impl Into<String>, owner_org: impl Into<String>, now_ms: i64) -> Self {
        Self {
            owner: owner.into(),
            owner_org: owner_org.into(),
            created_at: now_ms,
            modified_at: now_ms,
        }
    }

    /// Returns a copy with only the modification time refreshed.
    pub fn touched(&self, now_ms: i64) -> Self {
        Self {
            modified_at: now_ms,
            ..self.clone()
        }
    }
}

/// Access-restricted payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateSection {
    #[serde(default)]
    pub content: String,
}

impl PrivateSection {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Record stored in shared partitions: no private section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRecord {
    #[serde(flatten)]
    pub public: PublicSection,
    #[serde(flatten)]
    pub preserved: PreservedSection,
}

impl PublicRecord {
    /// Completes the record with a private section.
    pub fn with_private(self, private: PrivateSection) -> DataBlock {
        DataBlock {
            public: self.public,
            preserved: self.preserved,
            private,
        }
    }

    /// Completes the record with an empty private section.
    pub fn redacted(self) -> DataBlock {
        self.with_private(PrivateSection::default())
    }
}

/// Full data block as stored in the owner's private partition and as
/// returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBlock {
    #[serde(flatten)]
    pub public: PublicSection,
    #[serde(flatten)]
    pub preserved: PreservedSection,
    #[serde(flatten)]
    pub private: PrivateSection,
}

impl DataBlock {
    pub fn id(&self) -> &str {
        self.public.id.as_str()
    }

    /// Public half written to shared partitions.
    pub fn public_record(&self) -> PublicRecord {
        PublicRecord {
            public: self.public.clone(),
            preserved: self.preserved.clone(),
        }
    }
}

/// Record stored in the owner's private partition.
///
/// Remembers which shared partitions hold the public record, so updates and
/// deletes reach every copy written at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateRecord {
    #[serde(flatten)]
    pub block: DataBlock,
    /// Shared partitions holding the public record, in write order.
    #[serde(default)]
    pub collections: Vec<String>,
}

/// Client-supplied public fields for register/update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DataBlockInput {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub contains_subnational_data: bool,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub organisation: String,
    #[serde(default)]
    pub maintainer: String,
    /// Free-form publication date as supplied by the maintainer.
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub field_names: Vec<String>,
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(default)]
    pub number_of_rows: u64,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub define_license: String,
    #[serde(default)]
    pub methodology: String,
    #[serde(default)]
    pub define_methodology: String,
    #[serde(default)]
    pub update_frequency: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DataBlockInput {
    /// Creates an input with only `id` and `title` set.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    /// Validates boundary invariants for one input.
    pub fn validate(&self) -> Result<(), DataBlockValidationError> {
        validate_data_block_id(&self.id)?;
        if let Some(position) = self.tags.iter().position(|tag| tag.trim().is_empty()) {
            return Err(DataBlockValidationError::EmptyTag {
                id: self.id.clone(),
                position,
            });
        }
        Ok(())
    }

    pub fn into_public(self) -> PublicSection {
        PublicSection {
            id: self.id,
            name: self.name,
            note: self.note,
            title: self.title,
            description: self.description,
            contains_subnational_data: self.contains_subnational_data,
            source: self.source,
            organisation: self.organisation,
            maintainer: self.maintainer,
            date: self.date,
            location: self.location,
            field_names: self.field_names,
            file_types: self.file_types,
            number_of_rows: self.number_of_rows,
            license: self.license,
            define_license: self.define_license,
            methodology: self.methodology,
            define_methodology: self.define_methodology,
            update_frequency: self.update_frequency,
            comments: self.comments,
            tags: self.tags,
        }
    }
}

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataBlockValidationError {
    InvalidId(String),
    EmptyTag { id: String, position: usize },
}

impl Display for DataBlockValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidId(id) => write!(f, "data block id is invalid: `{id}`"),
            Self::EmptyTag { id, position } => {
                write!(f, "data block `{id}` has an empty tag at position {position}")
            }
        }
    }
}

impl Error for DataBlockValidationError {}

/// Checks one data block id against the key naming rule.
pub fn validate_data_block_id(id: &str) -> Result<(), DataBlockValidationError> {
    if DATA_BLOCK_ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(DataBlockValidationError::InvalidId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        validate_data_block_id, DataBlock, DataBlockInput, DataBlockValidationError,
        PreservedSection, PrivateRecord, PrivateSection, PublicRecord,
    };

    fn sample_block() -> DataBlock {
        let public = DataBlockInput::new("data1", "T1").into_public();
        PublicRecord {
            public,
            preserved: PreservedSection::new("alice", "Org1MSP", 1_000),
        }
        .with_private(PrivateSection {
            content: "C1".to_string(),
        })
    }

    #[test]
    fn ids_follow_key_naming_rule() {
        assert!(validate_data_block_id("data1").is_ok());
        assert!(validate_data_block_id("ds:2024.v1-a_b").is_ok());
        assert!(validate_data_block_id("").is_err());
        assert!(validate_data_block_id(" data1").is_err());
        assert!(validate_data_block_id("_hidden").is_err());
    }

    #[test]
    fn input_rejects_owner_fields() {
        let raw = r#"{"id":"data1","title":"T1","owner":"mallory"}"#;
        let err = serde_json::from_str::<DataBlockInput>(raw).unwrap_err();
        assert!(err.to_string().contains("owner"));
    }

    #[test]
    fn input_rejects_blank_tags() {
        let mut input = DataBlockInput::new("data1", "T1");
        input.tags = vec!["climate".to_string(), "  ".to_string()];
        assert_eq!(
            input.validate(),
            Err(DataBlockValidationError::EmptyTag {
                id: "data1".to_string(),
                position: 1
            })
        );
    }

    #[test]
    fn block_serializes_flat_camel_case() {
        let value = serde_json::to_value(sample_block()).unwrap();
        assert_eq!(value["id"], "data1");
        assert_eq!(value["title"], "T1");
        assert_eq!(value["content"], "C1");
        assert_eq!(value["owner"], "alice");
        assert_eq!(value["ownerOrg"], "Org1MSP");
        assert_eq!(value["createdAt"], 1_000);
    }

    #[test]
    fn redacted_record_keeps_public_and_preserved_sections() {
        let block = sample_block().public_record().redacted();
        assert!(block.private.is_empty());
        assert_eq!(block.public.title, "T1");
        assert_eq!(block.preserved.owner, "alice");
    }

    #[test]
    fn dataset_fields_use_camel_case_names() {
        let raw = r#"{"id":"data1","containsSubnationalData":true,"numberOfRows":42,
            "fieldNames":["region","year"],"defineMethodology":"survey","updateFrequency":"monthly"}"#;
        let input: DataBlockInput = serde_json::from_str(raw).unwrap();
        let public = input.into_public();
        assert!(public.contains_subnational_data);
        assert_eq!(public.number_of_rows, 42);
        assert_eq!(public.field_names, vec!["region".to_string(), "year".to_string()]);
        assert_eq!(public.update_frequency, "monthly");

        let value = serde_json::to_value(&public).unwrap();
        assert_eq!(value["defineMethodology"], "survey");
        assert_eq!(value["fileTypes"], serde_json::json!([]));
    }

    #[test]
    fn private_record_keeps_collections_beside_block() {
        let record = PrivateRecord {
            block: sample_block(),
            collections: vec![String::new(), "consortium".to_string()],
        };
        let bytes = serde_json::to_vec(&record).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["content"], "C1");
        assert_eq!(value["collections"][1], "consortium");

        let block: DataBlock = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(block, sample_block());
    }

    #[test]
    fn touched_keeps_creation_fields() {
        let preserved = PreservedSection::new("alice", "Org1MSP", 1_000);
        let touched = preserved.touched(2_000);
        assert_eq!(touched.created_at, 1_000);
        assert_eq!(touched.modified_at, 2_000);
        assert_eq!(touched.owner, "alice");
    }
}
