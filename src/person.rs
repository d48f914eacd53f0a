use chrono::Utc;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::catalog::{Person, PersonKind};
use crate::error::VaultError;
use crate::identity::Role;
use crate::masking::{apply_masking, MaskPolicy, PolicyMap};
use crate::store::Row;

pub const FORGOTTEN_PLACEHOLDER: &str = "REMOVED";
pub const DOCUMENT_MASK_PATTERN: &str = "XXX.XXX.XXX-XX";

// Fixed policy for person reads: the document follows its pattern, contact
// fields fall back to the last-four rule.
static PERSON_POLICIES: Lazy<PolicyMap> = Lazy::new(|| {
    let mut policies = PolicyMap::new();
    policies.insert(
        "document".to_string(),
        MaskPolicy::with_pattern(DOCUMENT_MASK_PATTERN),
    );
    policies.insert("email".to_string(), MaskPolicy::sensitive());
    policies.insert("phone".to_string(), MaskPolicy::sensitive());
    policies.insert("address".to_string(), MaskPolicy::sensitive());
    policies
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonInput {
    pub kind: PersonKind,
    pub name: String,
    pub document: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub custom: Option<Value>,
}

/// Partial update: absent fields keep their current value. Clearing contact
/// fields happens only through the forget flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonUpdate {
    #[serde(default)]
    pub kind: Option<PersonKind>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub custom: Option<Value>,
}

pub fn validate_person_input(input: &PersonInput) -> Result<(), VaultError> {
    validate_fields(
        Some(&input.name),
        Some(&input.document),
        input.email.as_deref(),
    )
}

pub fn validate_person_update(update: &PersonUpdate) -> Result<(), VaultError> {
    validate_fields(
        update.name.as_deref(),
        update.document.as_deref(),
        update.email.as_deref(),
    )
}

fn validate_fields(
    name: Option<&str>,
    document: Option<&str>,
    email: Option<&str>,
) -> Result<(), VaultError> {
    if let Some(name) = name {
        if name.trim().chars().count() < 2 {
            return Err(VaultError::InvalidInput {
                message: "person name must have at least 2 characters".to_string(),
            });
        }
    }
    if let Some(document) = document {
        if document.trim().chars().count() < 5 {
            return Err(VaultError::InvalidInput {
                message: "person document must have at least 5 characters".to_string(),
            });
        }
    }
    if let Some(email) = email {
        if !email.contains('@') {
            return Err(VaultError::InvalidInput {
                message: "person email is not a valid address".to_string(),
            });
        }
    }
    Ok(())
}

pub fn new_person(owner_id: Uuid, input: PersonInput) -> Person {
    Person {
        id: Uuid::new_v4(),
        owner_id,
        kind: input.kind,
        name: input.name,
        document: input.document,
        email: input.email,
        phone: input.phone,
        address: input.address,
        custom: input.custom,
        created_at: Utc::now(),
        deleted_at: None,
    }
}

pub fn apply_update(person: &mut Person, update: PersonUpdate) {
    if let Some(kind) = update.kind {
        person.kind = kind;
    }
    if let Some(name) = update.name {
        person.name = name;
    }
    if let Some(document) = update.document {
        person.document = document;
    }
    if let Some(email) = update.email {
        person.email = Some(email);
    }
    if let Some(phone) = update.phone {
        person.phone = Some(phone);
    }
    if let Some(address) = update.address {
        person.address = Some(address);
    }
    if let Some(custom) = update.custom {
        person.custom = Some(custom);
    }
}

/// Anonymizes in place: identity fields become placeholders, contact and
/// free-form fields are cleared, and the record is soft-deleted.
pub fn forget(person: &mut Person) {
    person.name = FORGOTTEN_PLACEHOLDER.to_string();
    person.document = FORGOTTEN_PLACEHOLDER.to_string();
    person.email = None;
    person.phone = None;
    person.address = None;
    person.custom = None;
    person.deleted_at = Some(Utc::now());
}

/// Serializes a person to a row and routes it through the shared masking
/// engine, the same path dataset rows take.
pub fn masked_person(person: Person, role: Role) -> Result<Row, VaultError> {
    let row = match serde_json::to_value(&person)? {
        Value::Object(row) => row,
        _ => Row::new(),
    };
    Ok(apply_masking(row, &PERSON_POLICIES, role))
}
