use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The closed set of LDP container kinds.
///
/// The kind is fixed when the container is constructed and never changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerType {
    /// `ldp:BasicContainer`
    Basic,
    /// `ldp:DirectContainer`
    Direct,
    /// `ldp:IndirectContainer`
    Indirect,
}

impl ContainerType {
    /// All valid container types, in declaration order.
    pub const ALL: [ContainerType; 3] = [Self::Basic, Self::Direct, Self::Indirect];

    /// Canonical short name (`basic`, `direct`, `indirect`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Direct => "direct",
            Self::Indirect => "indirect",
        }
    }

    /// The LDP vocabulary term for this container type.
    pub fn ldp_term(&self) -> &'static str {
        match self {
            Self::Basic => "ldp:BasicContainer",
            Self::Direct => "ldp:DirectContainer",
            Self::Indirect => "ldp:IndirectContainer",
        }
    }
}

impl Default for ContainerType {
    fn default() -> Self {
        Self::Basic
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerType {
    type Err = TypeError;

    /// Accepts the short name, the bare LDP class name or the prefixed LDP
    /// term, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let name = lowered.strip_prefix("ldp:").unwrap_or(&lowered);
        let name = name.strip_suffix("container").unwrap_or(name);
        match name {
            "basic" => Ok(Self::Basic),
            "direct" => Ok(Self::Direct),
            "indirect" => Ok(Self::Indirect),
            _ => Err(TypeError::UnknownContainerType(s.to_string())),
        }
    }
}

/// Classification of a member held inside a container.
///
/// Recorded on every membership index row so the HTTP layer can annotate
/// listings with LDP interaction models without loading each member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberType {
    /// An RDF source.
    Resource,
    /// A sub-container.
    Container,
    /// A non-RDF (binary) resource.
    Binary,
}

impl MemberType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Container => "container",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for MemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resource" => Ok(Self::Resource),
            "container" => Ok(Self::Container),
            "binary" => Ok(Self::Binary),
            _ => Err(TypeError::UnknownMemberType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_type_parses_all_spellings() {
        for input in ["basic", "Basic", "BasicContainer", "ldp:BasicContainer", " BASIC "] {
            assert_eq!(input.parse::<ContainerType>().unwrap(), ContainerType::Basic);
        }
        assert_eq!(
            "ldp:DirectContainer".parse::<ContainerType>().unwrap(),
            ContainerType::Direct
        );
        assert_eq!(
            "indirect".parse::<ContainerType>().unwrap(),
            ContainerType::Indirect
        );
    }

    #[test]
    fn container_type_rejects_unknown() {
        let err = "folder".parse::<ContainerType>().unwrap_err();
        assert_eq!(err, TypeError::UnknownContainerType("folder".into()));
        assert!("".parse::<ContainerType>().is_err());
        assert!("container".parse::<ContainerType>().is_err());
    }

    #[test]
    fn container_type_display_roundtrips() {
        for ty in ContainerType::ALL {
            assert_eq!(ty.to_string().parse::<ContainerType>().unwrap(), ty);
            assert_eq!(ty.ldp_term().parse::<ContainerType>().unwrap(), ty);
        }
    }

    #[test]
    fn member_type_parse_and_display() {
        assert_eq!("Binary".parse::<MemberType>().unwrap(), MemberType::Binary);
        assert_eq!(MemberType::Container.to_string(), "container");
        assert!("blob".parse::<MemberType>().is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&ContainerType::Indirect).unwrap();
        let parsed: ContainerType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ContainerType::Indirect);
    }
}
