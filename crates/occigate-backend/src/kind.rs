//! Typed dispatch keys

use occigate_core::CategoryId;
use occigate_core::schema::infrastructure;
use std::fmt;

/// Resource kinds a backend serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Compute,
    Network,
    Storage,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Compute, Self::Network, Self::Storage];

    pub fn from_kind(kind: &CategoryId) -> Option<Self> {
        Self::ALL.into_iter().find(|k| &k.kind_id() == kind)
    }

    pub fn kind_id(&self) -> CategoryId {
        match self {
            Self::Compute => infrastructure::compute(),
            Self::Network => infrastructure::network(),
            Self::Storage => infrastructure::storage(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Network => "network",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link kinds, all served by the compute backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    NetworkInterface,
    StorageLink,
}

impl LinkKind {
    pub const ALL: [LinkKind; 2] = [Self::NetworkInterface, Self::StorageLink];

    pub fn from_kind(kind: &CategoryId) -> Option<Self> {
        Self::ALL.into_iter().find(|k| &k.kind_id() == kind)
    }

    pub fn kind_id(&self) -> CategoryId {
        match self {
            Self::NetworkInterface => infrastructure::networkinterface(),
            Self::StorageLink => infrastructure::storagelink(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkInterface => "networkinterface",
            Self::StorageLink => "storagelink",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generic lifecycle signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Deploy,
    UpdateState,
    Delete,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::UpdateState => "update_state",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_kind() {
        assert_eq!(
            ResourceKind::from_kind(&infrastructure::storage()),
            Some(ResourceKind::Storage)
        );
        assert_eq!(ResourceKind::from_kind(&infrastructure::storagelink()), None);
        assert_eq!(
            LinkKind::from_kind(&infrastructure::storagelink()),
            Some(LinkKind::StorageLink)
        );
    }
}
