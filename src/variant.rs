//! Platform variants of a base disk image.
//!
//! The base build produces a qcow2; a variant derives a platform-specific artifact from it and
//! records that artifact in the build metadata.  The derivation itself is supplied through
//! [`MutateCallback`].

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use log::{info, warn};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::{
    build::{Build, Builds},
    cmd::CommandRunner,
    Error, Result,
};

/// Everything needed to produce one variant image.
#[derive(Debug, Clone)]
pub struct VariantImageConfig {
    /// Root of the build tree (the directory containing `builds/`).
    pub buildroot: PathBuf,
    /// Build ID; the newest build when unset.
    pub build: Option<String>,
    /// JSON schema the metadata must validate against before it is written.
    pub schema: Option<PathBuf>,
    pub variant: String,
    /// Overwrite an existing artifact.
    pub force: bool,
    pub arch: String,
    pub compress: bool,
}

/// Transforms the base qcow2 into the platform artifact.
pub trait MutateCallback {
    /// Whether [`mutate`](Self::mutate) writes the final artifact itself.  If not, the mutated
    /// qcow2 is copied into place afterwards.
    fn creates_final_image(&self) -> bool;

    /// Mutates (or wraps) the image at `image`.
    fn mutate(&self, runner: &dyn CommandRunner, image: &Path) -> Result<()>;
}

/// A variant image being produced for one build.
#[derive(Debug)]
pub struct VariantImage {
    config: VariantImageConfig,
    platform: String,
    build: Build,
    image_name: String,
    final_image: PathBuf,
}

/// `<name>-<id>-<platform>.<arch>.<suffix>`
pub fn image_name(build: &Build, platform: &str, suffix: &str) -> String {
    format!(
        "{}-{}-{platform}.{}.{suffix}",
        build.build_name, build.build_id, build.basearch
    )
}

fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let size = std::io::copy(&mut file, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), size))
}

impl VariantImage {
    pub fn new(config: VariantImageConfig, platform: &str, suffix: &str) -> Result<Self> {
        let build = Builds::open(&config.buildroot)?.get(config.build.as_deref(), &config.arch)?;
        let image_name = image_name(&build, platform, suffix);
        let final_image = std::path::absolute(build.build_dir().join(&image_name))?;
        Ok(Self {
            config,
            platform: platform.into(),
            build,
            image_name,
            final_image,
        })
    }

    pub fn config(&self) -> &VariantImageConfig {
        &self.config
    }

    pub fn build(&self) -> &Build {
        &self.build
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    /// Absolute path of the artifact inside the build directory.
    pub fn final_image(&self) -> &Path {
        &self.final_image
    }

    /// Produces the artifact from `source` and records it in the build metadata.
    pub fn run(
        &mut self,
        runner: &dyn CommandRunner,
        source: &Path,
        callback: &dyn MutateCallback,
    ) -> Result<&Path> {
        if self.final_image.exists() {
            if !self.config.force {
                return Err(Error::ImageExists(self.final_image.clone()));
            }
            info!("removing existing {}", self.final_image.display());
            std::fs::remove_file(&self.final_image)?;
        }

        let result = self.create(runner, source, callback);
        if let Err(e) = result {
            // an artifact without a metadata entry would block the next run
            if self.final_image.exists() {
                if let Err(rm) = std::fs::remove_file(&self.final_image) {
                    warn!("failed to remove {}: {rm}", self.final_image.display());
                }
            }
            return Err(e);
        }
        info!("wrote {}", self.final_image.display());
        Ok(&self.final_image)
    }

    fn create(
        &mut self,
        runner: &dyn CommandRunner,
        source: &Path,
        callback: &dyn MutateCallback,
    ) -> Result<()> {
        callback.mutate(runner, source)?;
        if !callback.creates_final_image() {
            std::fs::copy(source, &self.final_image)?;
        }
        if self.config.compress {
            info!(
                "not compressing {}: {} images are stored as-is",
                self.image_name, self.config.variant
            );
        }

        let (sha256, size) = sha256_file(&self.final_image)?;
        self.build.set_image(
            &self.platform,
            json!({
                "path": self.image_name,
                "sha256": sha256,
                "size": size,
                "skip-compression": true,
            }),
        );
        if let Some(schema) = &self.config.schema {
            self.build.validate(schema)?;
        }
        self.build.write_meta()
    }
}
