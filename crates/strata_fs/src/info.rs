//! Resource info records and metadata namespaces.

use std::time::SystemTime;

/// Metadata namespace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumNamespace {
    /// Name and directory flag. Always populated.
    Basic,
    /// Size and timestamps.
    Details,
    /// Ownership and permission bits.
    Access,
}

impl EnumNamespace {
    /// Map a namespace name. Unknown names return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "basic" => Some(Self::Basic),
            "details" => Some(Self::Details),
            "access" => Some(Self::Access),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Details => "details",
            Self::Access => "access",
        }
    }
}

/// Set of namespaces requested from `list_info` / `get_info`.
///
/// `basic` is implied. Backends must not pay for namespaces that are not set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpecNamespaces {
    pub if_details: bool,
    pub if_access: bool,
}

impl SpecNamespaces {
    pub const fn basic() -> Self {
        Self {
            if_details: false,
            if_access: false,
        }
    }

    pub const fn details() -> Self {
        Self {
            if_details: true,
            if_access: false,
        }
    }

    /// Parse namespace names; unrecognized names are ignored.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut namespaces = Self::basic();
        for name in names {
            match EnumNamespace::from_name(name.as_ref()) {
                Some(EnumNamespace::Details) => namespaces.if_details = true,
                Some(EnumNamespace::Access) => namespaces.if_access = true,
                Some(EnumNamespace::Basic) | None => {}
            }
        }
        namespaces
    }
}

/// `details` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpecInfoDetails {
    /// Byte length; `0` for directories on most backends.
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub created: Option<SystemTime>,
    pub accessed: Option<SystemTime>,
}

/// `access` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpecInfoAccess {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Permission bits (`0o777` mask).
    pub permissions: Option<u32>,
}

/// One directory entry with the namespaces that were requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    name: String,
    is_dir: bool,
    details: Option<SpecInfoDetails>,
    access: Option<SpecInfoAccess>,
}

impl ResourceInfo {
    pub fn new(name: impl Into<String>, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            is_dir,
            details: None,
            access: None,
        }
    }

    pub fn with_details(mut self, details: SpecInfoDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_access(mut self, access: SpecInfoAccess) -> Self {
        self.access = Some(access);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    pub fn details(&self) -> Option<&SpecInfoDetails> {
        self.details.as_ref()
    }

    pub fn access(&self) -> Option<&SpecInfoAccess> {
        self.access.as_ref()
    }

    pub fn has_namespace(&self, namespace: EnumNamespace) -> bool {
        match namespace {
            EnumNamespace::Basic => true,
            EnumNamespace::Details => self.details.is_some(),
            EnumNamespace::Access => self.access.is_some(),
        }
    }

    /// Size from the `details` namespace, if it was requested.
    pub fn size(&self) -> Option<u64> {
        self.details.map(|d| d.size)
    }

    /// Modified time from the `details` namespace, if known.
    pub fn modified(&self) -> Option<SystemTime> {
        self.details.and_then(|d| d.modified)
    }
}
