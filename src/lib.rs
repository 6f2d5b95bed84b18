//! Packaging of qcow2 disk images as KubeVirt ContainerDisks.
//!
//! A ContainerDisk is an ordinary OCI image whose only layer carries a virtual machine disk at
//! `/disk/coreos.img`.  This crate wraps a finished qcow2 into such an image with `buildah`,
//! exports it as an `oci-archive`, and later pushes that archive to a registry with `skopeo`,
//! recording a digest-pinned reference in the build metadata.
//!
//! All external tools are invoked through the [`cmd::CommandRunner`] trait so that the command
//! sequences can be exercised without the tools being installed.

pub mod buildah;
pub mod build;
pub mod cmd;
pub mod error;
pub mod kubevirt;
pub mod reference;
pub mod skopeo;
pub mod variant;


pub use error::{Error, Result};
