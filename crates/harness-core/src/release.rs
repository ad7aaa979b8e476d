//! Package identity parsing and release-to-family mapping.
//!
//! The bus renders build notifications as free text such as
//! `"jforbes's kernel-6.2.9-200.fc38.x86_64 completed"`. The second
//! whitespace token is the package; its last dotted segment is the
//! architecture and the one before it the `fcNN` release tag. Koji's own
//! notifications carry no architecture, so a package whose last segment is
//! already a release tag (`kernel-6.2.9-200.fc38`) is taken as arch-less.

use serde::{Deserialize, Serialize};

use crate::domain::DomainFamily;
use crate::error::{HarnessError, Result};

/// A specific kernel build, e.g. `kernel-6.2.9-200.fc38.x86_64`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIdentity {
    /// Full name-version-release string, kept verbatim.
    pub nvr: String,
    /// Trailing segment of the NVR, absent for arch-less builds.
    pub arch: Option<String>,
    /// The `fcNN` segment.
    pub release_tag: String,
}

impl PackageIdentity {
    /// Build from structured bus fields instead of rendered text.
    ///
    /// The NVR is `name-version-release[.arch]`; the release tag is the last
    /// dotted segment of `release`.
    pub fn from_fields(
        name: &str,
        version: &str,
        release: &str,
        arch: Option<&str>,
    ) -> Result<Self> {
        let mut nvr = format!("{name}-{version}-{release}");
        if let Some(arch) = arch {
            nvr.push('.');
            nvr.push_str(arch);
        }
        let blank_arch = arch.is_some_and(|a| a.trim().is_empty());
        if blank_arch || [name, version, release].iter().any(|f| f.trim().is_empty()) {
            return Err(HarnessError::malformed(&nvr, "empty package field"));
        }
        let release_tag = release.rsplit('.').next().unwrap_or_default();
        if release_tag.is_empty() {
            return Err(HarnessError::malformed(&nvr, "release has no tag segment"));
        }
        Ok(Self {
            release_tag: release_tag.to_string(),
            arch: arch.map(str::to_string),
            nvr,
        })
    }
}

/// A parsed package together with the domain family it is tested on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedBuild {
    pub package: PackageIdentity,
    pub family: DomainFamily,
}

/// Maps rendered event text to a package identity and domain family.
#[derive(Debug, Clone)]
pub struct ReleaseMapper {
    rawhide_tag: String,
}

impl ReleaseMapper {
    pub fn new(rawhide_tag: impl Into<String>) -> Self {
        Self {
            rawhide_tag: rawhide_tag.into(),
        }
    }

    pub fn rawhide_tag(&self) -> &str {
        &self.rawhide_tag
    }

    /// Extract the package identity from rendered text.
    pub fn parse(&self, rendered: &str) -> Result<PackageIdentity> {
        let token = rendered
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| HarnessError::malformed(rendered, "fewer than two tokens"))?;

        if !token.contains('.') {
            return Err(HarnessError::malformed(
                rendered,
                "package has no dotted segments",
            ));
        }

        let mut segments = token.rsplit('.');
        let last = segments.next().unwrap_or_default();
        let (arch, release_tag) = if self.is_release_tag(last) {
            (None, last)
        } else {
            (Some(last), segments.next().unwrap_or_default())
        };

        if release_tag.is_empty() || arch.is_some_and(str::is_empty) {
            return Err(HarnessError::malformed(rendered, "empty package segment"));
        }

        Ok(PackageIdentity {
            nvr: token.to_string(),
            arch: arch.map(str::to_string),
            release_tag: release_tag.to_string(),
        })
    }

    /// Derive the domain family for a release tag.
    ///
    /// The rawhide tag is compared literally; any other tag must be
    /// `fc<digits>`.
    pub fn family(&self, release_tag: &str) -> Result<DomainFamily> {
        self.family_of(release_tag, release_tag)
    }

    fn family_of(&self, release_tag: &str, raw: &str) -> Result<DomainFamily> {
        if release_tag == self.rawhide_tag {
            return Ok(DomainFamily::Rawhide);
        }
        match fedora_release_number(release_tag) {
            Some(number) => Ok(DomainFamily::Fedora(number.to_string())),
            None => Err(HarnessError::malformed(
                raw,
                format!("release tag {release_tag:?} is not fc<number>"),
            )),
        }
    }

    fn is_release_tag(&self, segment: &str) -> bool {
        segment == self.rawhide_tag || fedora_release_number(segment).is_some()
    }

    /// Parse rendered text and derive its family in one step.
    pub fn map(&self, rendered: &str) -> Result<QualifiedBuild> {
        let package = self.parse(rendered)?;
        self.qualify(package, rendered)
    }

    /// Attach a family to an already-built identity. `raw` is the event text
    /// reported if the release tag has no family.
    pub fn qualify(&self, package: PackageIdentity, raw: &str) -> Result<QualifiedBuild> {
        let family = self.family_of(&package.release_tag, raw)?;
        Ok(QualifiedBuild { package, family })
    }
}

/// Digits of an `fcNN` tag, if it is one.
pub fn fedora_release_number(tag: &str) -> Option<&str> {
    tag.strip_prefix("fc")
        .filter(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}
