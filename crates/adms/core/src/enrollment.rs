//! People and their device enrollments.

use crate::Status;

/// Kind of person an enrollment points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonKind {
    /// A student.
    Student,
    /// A staff member.
    Staff,
}

impl PersonKind {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Staff => "staff",
        }
    }

    /// Parse the storage representation.
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "student" => Some(Self::Student),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }
}

/// Reference to exactly one person, either a student or a staff member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PersonRef {
    /// A student by id.
    Student(i64),
    /// A staff member by id.
    Staff(i64),
}

impl PersonRef {
    /// Build a reference from its storage columns.
    pub fn new(kind: PersonKind, id: i64) -> Self {
        match kind {
            PersonKind::Student => Self::Student(id),
            PersonKind::Staff => Self::Staff(id),
        }
    }

    /// Build a reference from raw storage columns.
    pub fn from_db(kind: &str, id: i64) -> color_eyre::eyre::Result<Self> {
        let kind = PersonKind::from_db(kind)
            .ok_or_else(|| color_eyre::eyre::eyre!("unknown person kind {:?}", kind))?;
        Ok(Self::new(kind, id))
    }

    /// The person's kind.
    pub fn kind(&self) -> PersonKind {
        match self {
            Self::Student(_) => PersonKind::Student,
            Self::Staff(_) => PersonKind::Staff,
        }
    }

    /// The person's id within its kind.
    pub fn id(&self) -> i64 {
        match self {
            Self::Student(id) | Self::Staff(id) => *id,
        }
    }
}

impl std::fmt::Display for PersonRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.id())
    }
}

/// Directory entry for a person, mirrored from the admin side.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Person {
    /// Which person.
    pub person: PersonRef,
    /// Owning tenant.
    pub tenant_id: i64,
    /// Display name, also pushed to devices.
    pub name: String,
    /// The person's own status.
    pub status: Status,
}

/// Binding of a device-local user id to a person.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Enrollment {
    /// Storage identifier.
    pub id: i64,
    /// Device the binding lives on.
    pub device_id: i64,
    /// Identifier the device uses for this person (PIN).
    pub device_user_id: String,
    /// The enrolled person.
    pub person: PersonRef,
    /// Enrollment status.
    pub status: Status,
    /// When the binding was created.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_ref_columns() {
        let person = PersonRef::from_db("staff", 42).unwrap();
        assert_eq!(person, PersonRef::Staff(42));
        assert_eq!(person.kind(), PersonKind::Staff);
        assert_eq!(person.id(), 42);
        assert_eq!(person.to_string(), "staff:42");
        assert!(PersonRef::from_db("parent", 1).is_err());
    }
}
