//! Registry image references.

use std::fmt;

use oci_spec::image::Digest;

/// An image name in a registry, e.g. `quay.io/example` + `fedora-coreos`.
///
/// The repository may be a bare registry host (`quay.io`) or include an organization
/// (`quay.io/myorg`).  Joining follows path rules, so a trailing slash on the repository does
/// not produce an empty path component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    repository: String,
    name: String,
}

impl ImageReference {
    pub fn new(repository: &str, name: &str) -> Self {
        Self {
            repository: repository.trim_end_matches('/').to_string(),
            name: name.to_string(),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<repository>/<name>`
    pub fn full_name(&self) -> String {
        if self.repository.is_empty() {
            return self.name.clone();
        }
        format!("{}/{}", self.repository, self.name)
    }

    /// `<repository>/<name>:<tag>`
    pub fn tagged(&self, tag: &str) -> String {
        format!("{}:{tag}", self.full_name())
    }

    /// `<repository>/<name>@<digest>`
    pub fn pinned(&self, digest: &Digest) -> String {
        format!("{}@{digest}", self.full_name())
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
