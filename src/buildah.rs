//! Thin wrappers over the `buildah` subcommands used to assemble a ContainerDisk.

use std::{ffi::OsString, path::PathBuf};

use crate::{
    cmd::{display_argv, prefixed, CommandRunner},
    Error, Result,
};

/// How to invoke buildah.
///
/// The storage options are prepended to every subcommand, which lets the build run against a
/// private container store (for example inside an unprivileged build container where only the
/// `vfs` driver works).
#[derive(Debug, Clone, clap::Args)]
pub struct BuildahConfig {
    /// buildah program to run
    #[clap(id = "buildah", long = "buildah", env = "BUILDAH", default_value = "buildah")]
    pub program: PathBuf,
    /// Storage root for buildah (--root)
    #[clap(long = "buildah-root")]
    pub root: Option<PathBuf>,
    /// Runtime state directory for buildah (--runroot)
    #[clap(long = "buildah-runroot")]
    pub runroot: Option<PathBuf>,
    /// Storage driver for buildah (e.g. vfs)
    #[clap(long)]
    pub storage_driver: Option<String>,
}

impl Default for BuildahConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("buildah"),
            root: None,
            runroot: None,
            storage_driver: None,
        }
    }
}

impl BuildahConfig {
    /// The program followed by the global options, ready for a subcommand to be appended.
    pub fn base_args(&self) -> Vec<OsString> {
        let mut argv = vec![self.program.clone().into_os_string()];
        if let Some(root) = &self.root {
            argv.push(prefixed("--root=", root));
        }
        if let Some(runroot) = &self.runroot {
            argv.push(prefixed("--runroot=", runroot));
        }
        if let Some(driver) = &self.storage_driver {
            argv.push(format!("--storage-driver={driver}").into());
        }
        argv
    }

    fn subcommand<I, S>(&self, args: I) -> Vec<OsString>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut argv = self.base_args();
        argv.extend(args.into_iter().map(Into::into));
        argv
    }

    /// Like [`CommandRunner::output`], but an empty result is an error: every caller needs an
    /// identifier to pass to the next step.
    fn output_id(&self, runner: &dyn CommandRunner, argv: Vec<OsString>) -> Result<String> {
        let id = runner.output(&argv)?;
        if id.is_empty() {
            return Err(Error::EmptyOutput(display_argv(&argv)));
        }
        Ok(id)
    }

    /// `buildah from <image>`, returning the working container name.
    pub fn from(&self, runner: &dyn CommandRunner, image: &str) -> Result<String> {
        self.output_id(runner, self.subcommand(["from", image]))
    }

    /// `buildah add --chmod <mode> <container> <src> <dest>`
    pub fn add(
        &self,
        runner: &dyn CommandRunner,
        container: &str,
        mode: &str,
        src: impl Into<OsString>,
        dest: &str,
    ) -> Result<()> {
        let argv = self.subcommand::<_, OsString>([
            "add".into(),
            "--chmod".into(),
            mode.into(),
            container.into(),
            src.into(),
            dest.into(),
        ]);
        runner.run(&argv)
    }

    /// `buildah commit <container>`, returning the new image ID.
    pub fn commit(&self, runner: &dyn CommandRunner, container: &str) -> Result<String> {
        self.output_id(runner, self.subcommand(["commit", container]))
    }

    /// `buildah push --format oci <image> <destination>`
    pub fn push_oci(
        &self,
        runner: &dyn CommandRunner,
        image: &str,
        destination: impl Into<OsString>,
    ) -> Result<()> {
        let argv = self.subcommand::<_, OsString>([
            "push".into(),
            "--format".into(),
            "oci".into(),
            image.into(),
            destination.into(),
        ]);
        runner.run(&argv)
    }
}
