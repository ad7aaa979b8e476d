//! Domain families and the test domain names derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical group of test domains targeting one release.
///
/// Displays as `Rawhide` or `Fedora<N>_`. The trailing underscore is part of
/// the domain naming scheme and only dropped for marker file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainFamily {
    /// The rolling release.
    Rawhide,
    /// A numbered release; holds the digits of the `fcNN` tag verbatim.
    Fedora(String),
}

impl DomainFamily {
    /// Whether this family is rebooted instead of waited on.
    pub fn is_rawhide(&self) -> bool {
        matches!(self, DomainFamily::Rawhide)
    }

    /// Marker file name: the family with underscores removed.
    pub fn marker_file_name(&self) -> String {
        self.to_string().replace('_', "")
    }

    /// Both test domains for this family, arm64 first.
    pub fn domain_pair(&self) -> [DomainName; 2] {
        [
            DomainName::new(self.clone(), Arch::Arm64),
            DomainName::new(self.clone(), Arch::X86_64),
        ]
    }
}

impl fmt::Display for DomainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainFamily::Rawhide => write!(f, "Rawhide"),
            DomainFamily::Fedora(release) => write!(f, "Fedora{release}_"),
        }
    }
}

/// Architecture of a test domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    Arm64,
    X86_64,
}

impl Arch {
    /// Suffix appended to the family to form the domain name.
    pub fn suffix(&self) -> &'static str {
        match self {
            Arch::Arm64 => "arm64",
            Arch::X86_64 => "64",
        }
    }
}

/// Name of one libvirt test domain, e.g. `Fedora38_arm64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainName {
    family: DomainFamily,
    arch: Arch,
    name: String,
}

impl DomainName {
    pub fn new(family: DomainFamily, arch: Arch) -> Self {
        let name = format!("{}{}", family, arch.suffix());
        Self { family, arch, name }
    }

    pub fn family(&self) -> &DomainFamily {
        &self.family
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
