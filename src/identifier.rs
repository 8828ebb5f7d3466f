//! Stable document identity, the only identifier exposed across component
//! boundaries.

use std::fmt;

/// `(id, instance_id?)`. Serialized form is `"<instance_or_empty>:<id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternalId {
    pub id: String,
    pub instance_id: Option<u32>,
}

impl ExternalId {
    pub fn new(id: impl Into<String>, instance_id: Option<u32>) -> Self {
        Self {
            id: id.into(),
            instance_id,
        }
    }

    pub fn without_instance(id: impl Into<String>) -> Self {
        Self::new(id, None)
    }

    /// `"<instance_or_empty>:<id>"`
    pub fn serialize(&self) -> String {
        match self.instance_id {
            Some(i) => format!("{}:{}", i, self.id),
            None => format!(":{}", self.id),
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_instance() {
        let id = ExternalId::new("doc1", Some(3));
        assert_eq!(id.serialize(), "3:doc1");
    }

    #[test]
    fn serializes_without_instance() {
        let id = ExternalId::without_instance("doc1");
        assert_eq!(id.serialize(), ":doc1");
    }

    #[test]
    fn structural_equality() {
        assert_eq!(
            ExternalId::new("a", Some(1)),
            ExternalId::new("a", Some(1))
        );
        assert_ne!(
            ExternalId::new("a", Some(1)),
            ExternalId::new("a", Some(2))
        );
    }
}
