//! Inspecting and copying OCI archives with `skopeo`.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use oci_spec::image::Digest;

use crate::{
    cmd::{prefixed, CommandRunner},
    Error, Result,
};

/// How to invoke skopeo.
#[derive(Debug, Clone, clap::Args)]
pub struct Skopeo {
    /// skopeo program to run
    #[clap(id = "skopeo", long = "skopeo", env = "SKOPEO", default_value = "skopeo")]
    pub program: PathBuf,
}

impl Default for Skopeo {
    fn default() -> Self {
        Self {
            program: PathBuf::from("skopeo"),
        }
    }
}

impl Skopeo {
    /// Returns the manifest digest of an `oci-archive`.
    pub fn inspect_digest(&self, runner: &dyn CommandRunner, archive: &Path) -> Result<Digest> {
        let argv: Vec<OsString> = vec![
            self.program.clone().into_os_string(),
            "inspect".into(),
            prefixed("oci-archive:", archive),
            "-f".into(),
            "{{.Digest}}".into(),
        ];
        let digest = runner.output(&argv)?;
        digest
            .parse()
            .map_err(|source| Error::InvalidDigest { digest, source })
    }

    /// Copies an `oci-archive` to a registry destination such as `quay.io/org/name:tag`.
    pub fn copy_to_registry(
        &self,
        runner: &dyn CommandRunner,
        archive: &Path,
        destination: &str,
    ) -> Result<()> {
        let argv: Vec<OsString> = vec![
            self.program.clone().into_os_string(),
            "copy".into(),
            prefixed("oci-archive:", archive),
            format!("docker://{destination}").into(),
        ];
        runner.run(&argv)
    }
}
