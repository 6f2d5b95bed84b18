//! Command-line front end for building and publishing KubeVirt ContainerDisks.
//!
//! `containerdisk` operates on a build tree (`<buildroot>/builds/...`): `wrap` turns a build's
//! qcow2 into an `oci-archive` artifact, `upload` pushes that artifact to a registry, and
//! `replicate` exists only for parity with cloud platforms that need regional copies.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use containerdisk::{
    build::Builds,
    buildah::BuildahConfig,
    cmd::HostRunner,
    kubevirt::{self, UploadOptions},
    skopeo::Skopeo,
    variant::VariantImageConfig,
};

/// containerdisk
#[derive(Debug, Parser)]
#[clap(name = "containerdisk", version)]
pub struct App {
    /// Root of the build tree (the directory containing builds/)
    #[clap(long, default_value = ".")]
    buildroot: PathBuf,
    /// Build ID to operate on (defaults to the latest build)
    #[clap(long)]
    build: Option<String>,
    /// Target architecture
    #[clap(long, default_value_t = default_arch())]
    arch: String,

    #[clap(flatten)]
    buildah: BuildahConfig,
    #[clap(flatten)]
    skopeo: Skopeo,

    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Wraps a qcow2 disk image into an OCI archive usable as a KubeVirt ContainerDisk
    Wrap {
        /// the qcow2 image to wrap
        source: PathBuf,
        /// Overwrite an existing archive
        #[clap(long)]
        force: bool,
        /// Request compression (ContainerDisk archives are never compressed)
        #[clap(long)]
        compress: bool,
        /// JSON schema the build metadata must validate against
        #[clap(long)]
        schema: Option<PathBuf>,
    },
    /// Pushes the build's ContainerDisk archive to a container registry
    Upload {
        /// Name to append to the repository (e.g. fedora-coreos). Defaults to the build name.
        #[clap(long)]
        name: Option<String>,
        /// Repository to push to (e.g. quay.io or quay.io/myorg)
        #[clap(long)]
        repository: Option<String>,
        /// Additional image tag. Can be provided multiple times.
        #[clap(long = "tag")]
        tags: Vec<String>,
    },
    /// Placeholder: KubeVirt images need no regional replication
    Replicate {
        #[clap(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
        args: Vec<String>,
    },
}

/// The architecture name as used in build trees, which differs from Rust's for ppc64le.
fn default_arch() -> String {
    match std::env::consts::ARCH {
        "powerpc64" => "ppc64le".to_string(),
        arch => arch.to_string(),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = App::parse();
    let runner = HostRunner;

    match args.cmd {
        Command::Wrap {
            source,
            force,
            compress,
            schema,
        } => {
            let config = VariantImageConfig {
                buildroot: args.buildroot,
                build: args.build,
                schema,
                variant: kubevirt::PLATFORM.to_string(),
                force,
                arch: args.arch,
                compress,
            };
            let mut image = kubevirt::get_kubevirt_variant(kubevirt::PLATFORM, config, args.buildah)
                .context("Opening build")?;
            let archive = image
                .build(&runner, &source)
                .with_context(|| format!("Wrapping {}", source.display()))?;
            println!("{}", archive.display());
        }
        Command::Upload {
            name,
            repository,
            tags,
        } => {
            let options = UploadOptions {
                name,
                repository,
                tags,
            };
            // Check the repository before touching the build tree.
            if matches!(options.repository.as_deref(), None | Some("")) {
                return Err(containerdisk::Error::MissingRepository.into());
            }
            let mut build = Builds::open(&args.buildroot)
                .and_then(|builds| builds.get(args.build.as_deref(), &args.arch))
                .context("Opening build")?;
            let pinned = kubevirt::upload(&runner, &args.skopeo, &mut build, &options)
                .context("Uploading ContainerDisk")?;
            println!("{pinned}");
        }
        Command::Replicate { args: _ } => {
            kubevirt::replicate(&mut std::io::stdout())?;
        }
    }

    Ok(())
}
