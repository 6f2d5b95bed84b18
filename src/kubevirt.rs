//! KubeVirt ContainerDisk images.
//!
//! The base qcow2 is wrapped, unchanged, into a single-layer OCI image with the disk at
//! [`DISK_PATH`], which is where KubeVirt's container-disk loader looks for it.  The result is
//! exported as an `oci-archive` build artifact; [`upload`] later pushes that archive to a
//! registry under one or more tags and pins the build metadata to its digest.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde_json::json;

use crate::{
    build::Build,
    buildah::BuildahConfig,
    cmd::{prefixed, CommandRunner},
    reference::ImageReference,
    skopeo::Skopeo,
    variant::{MutateCallback, VariantImage, VariantImageConfig},
    Error, Result,
};

/// Platform name used for the artifact name and the `images` metadata entry.
pub const PLATFORM: &str = "kubevirt";

/// File extension of the produced artifact.
pub const IMAGE_SUFFIX: &str = "ociarchive";

/// Location of the disk inside the container image.
pub const DISK_PATH: &str = "/disk/coreos.img";

/// Permissions of the disk inside the container image.
pub const DISK_MODE: &str = "0555";

/// Wraps `source` into a scratch OCI image and exports it to `archive` as an `oci-archive`.
///
/// Any failing step aborts the whole sequence; no partial result is reported.
pub fn write_oci(
    runner: &dyn CommandRunner,
    buildah: &BuildahConfig,
    source: &Path,
    archive: &Path,
) -> Result<()> {
    let archive = std::path::absolute(archive)?;
    let container = buildah.from(runner, "scratch")?;
    debug!("working container {container}");
    buildah.add(runner, &container, DISK_MODE, source, DISK_PATH)?;
    let image = buildah.commit(runner, &container)?;
    debug!("committed {image}");
    buildah.push_oci(runner, &image, prefixed("oci-archive:", &archive))
}

/// The mutate callback that turns the qcow2 into the final `oci-archive`.
#[derive(Debug)]
pub struct OciWrapper {
    buildah: BuildahConfig,
    archive: PathBuf,
}

impl MutateCallback for OciWrapper {
    fn creates_final_image(&self) -> bool {
        true
    }

    fn mutate(&self, runner: &dyn CommandRunner, image: &Path) -> Result<()> {
        write_oci(runner, &self.buildah, image, &self.archive)
    }
}

/// A ContainerDisk variant of a build.
#[derive(Debug)]
pub struct KubeVirtImage {
    image: VariantImage,
    wrapper: OciWrapper,
}

impl KubeVirtImage {
    pub fn new(config: VariantImageConfig, buildah: BuildahConfig) -> Result<Self> {
        let image = VariantImage::new(config, PLATFORM, IMAGE_SUFFIX)?;
        let wrapper = OciWrapper {
            buildah,
            archive: image.final_image().to_path_buf(),
        };
        Ok(Self { image, wrapper })
    }

    pub fn image(&self) -> &VariantImage {
        &self.image
    }

    /// Wraps the qcow2 at `source` and records the archive in the build metadata.
    pub fn build(&mut self, runner: &dyn CommandRunner, source: &Path) -> Result<PathBuf> {
        let path = self.image.run(runner, source, &self.wrapper)?;
        Ok(path.to_path_buf())
    }
}

/// Returns the ContainerDisk image for `variant` of the configured build.
pub fn get_kubevirt_variant(
    variant: &str,
    mut config: VariantImageConfig,
    buildah: BuildahConfig,
) -> Result<KubeVirtImage> {
    debug!("returning KubeVirtImage for {variant}");
    config.variant = variant.into();
    KubeVirtImage::new(config, buildah)
}

/// Where and under which names to push.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Image name within the repository; defaults to the build name.
    pub name: Option<String>,
    /// Registry and optional organization, e.g. `quay.io/myorg`.
    pub repository: Option<String>,
    /// Tags to push in addition to `<build id>-<arch>`.
    pub tags: Vec<String>,
}

/// `<build id>-<arch>` followed by `extra`, in order and without deduplication.
pub fn image_tags(build: &Build, extra: &[String]) -> Vec<String> {
    let mut tags = vec![format!("{}-{}", build.build_id, build.basearch)];
    tags.extend_from_slice(extra);
    tags
}

/// Pushes the build's ContainerDisk archive to every tag and records the digest-pinned
/// reference as `kubevirt.image` in the build metadata.  Returns that reference.
///
/// The digest is read from the local archive once, before any copy, and is not re-checked
/// against the registry afterwards.
pub fn upload(
    runner: &dyn CommandRunner,
    skopeo: &Skopeo,
    build: &mut Build,
    options: &UploadOptions,
) -> Result<String> {
    let repository = match options.repository.as_deref() {
        Some(repository) if !repository.is_empty() => repository,
        _ => return Err(Error::MissingRepository),
    };
    let name = options.name.as_deref().unwrap_or(&build.build_name);
    let image = ImageReference::new(repository, name);
    let tags = image_tags(build, &options.tags);
    let archive = build.image_path(PLATFORM)?;

    let digest = skopeo.inspect_digest(runner, &archive)?;
    for tag in &tags {
        info!("pushing {image}:{tag} with digest {digest}");
        skopeo.copy_to_registry(runner, &archive, &image.tagged(tag))?;
    }

    let pinned = image.pinned(&digest);
    build.meta.insert(
        PLATFORM.into(),
        json!({
            "image": pinned,
        }),
    );
    build.write_meta()?;
    Ok(pinned)
}

pub const REPLICATION_NOTICE: &str = "
KubeVirt does not require regional replication. This command is a
placeholder.
";

/// Replication is meaningless for registry-hosted images; this only says so.
pub fn replicate(out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "{REPLICATION_NOTICE}")
}

#[cfg(test)]
mod test {
    use serde_json::Value;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::test::{write_build, FakeRunner, DIGEST};

    const ARCHIVE: &str = "fedora-coreos-38.20240101.1-kubevirt.x86_64.ociarchive";

    fn wrapped_build(root: &Path) -> Build {
        let dir = write_build(root, "38.20240101.1", "x86_64");
        let mut build = Build::open(&dir).unwrap();
        build.set_image(PLATFORM, json!({"path": ARCHIVE}));
        build.write_meta().unwrap();
        build
    }

    fn upload_runner() -> FakeRunner {
        FakeRunner::new().respond("inspect", DIGEST)
    }

    #[test]
    fn test_write_oci_sequence() {
        let runner = FakeRunner::new()
            .respond("from", "working-container")
            .respond("commit", "0123abcd");
        write_oci(
            &runner,
            &BuildahConfig::default(),
            Path::new("/b/disk.qcow2"),
            Path::new("/b/disk.ociarchive"),
        )
        .unwrap();
        assert_eq!(
            runner.lines(),
            vec![
                "buildah from scratch",
                "buildah add --chmod 0555 working-container /b/disk.qcow2 /disk/coreos.img",
                "buildah commit working-container",
                "buildah push --format oci 0123abcd oci-archive:/b/disk.ociarchive",
            ]
        );
    }

    #[test]
    fn test_write_oci_uses_base_args() {
        let runner = FakeRunner::new()
            .respond("from", "ctr")
            .respond("commit", "img");
        let buildah = BuildahConfig {
            storage_driver: Some("vfs".into()),
            ..Default::default()
        };
        write_oci(
            &runner,
            &buildah,
            Path::new("/b/disk.qcow2"),
            Path::new("/b/out"),
        )
        .unwrap();
        for argv in runner.calls() {
            assert_eq!(&argv[..2], ["buildah", "--storage-driver=vfs"]);
        }
        assert_eq!(&runner.calls()[1][4..7], ["0555", "ctr", "/b/disk.qcow2"]);
    }

    #[test]
    fn test_write_oci_absolute_archive() {
        let runner = FakeRunner::new()
            .respond("from", "ctr")
            .respond("commit", "img");
        write_oci(
            &runner,
            &BuildahConfig::default(),
            Path::new("disk.qcow2"),
            Path::new("out.ociarchive"),
        )
        .unwrap();
        let push = runner.calls().pop().unwrap();
        let dest = push.last().unwrap();
        let path = dest.strip_prefix("oci-archive:").unwrap();
        assert!(Path::new(path).is_absolute(), "{dest}");
        assert!(path.ends_with("/out.ociarchive"));
    }

    #[test]
    fn test_write_oci_aborts() {
        let runner = FakeRunner::new()
            .respond("from", "ctr")
            .fail_on("add");
        let err = write_oci(
            &runner,
            &BuildahConfig::default(),
            Path::new("/b/disk.qcow2"),
            Path::new("/b/out"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }), "{err:?}");
        // nothing after the failing add
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn test_kubevirt_build() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_build(root.path(), "38.20240101.1", "x86_64");
        let config = VariantImageConfig {
            buildroot: root.path().to_path_buf(),
            build: None,
            schema: None,
            variant: String::new(),
            force: false,
            arch: "x86_64".into(),
            compress: false,
        };
        let mut image =
            get_kubevirt_variant("kubevirt", config, BuildahConfig::default()).unwrap();
        assert_eq!(image.image().config().variant, "kubevirt");
        assert_eq!(image.image().image_name(), ARCHIVE);

        let runner = FakeRunner::new()
            .respond("from", "ctr")
            .respond("commit", "img");
        let final_image = image.image().final_image().to_path_buf();
        let err = image.build(&runner, &dir.join("disk.qcow2")).unwrap_err();
        // the fake push writes nothing, so hashing the archive fails
        assert!(matches!(err, Error::Io(_)), "{err:?}");
        assert_eq!(
            runner.lines().last().unwrap(),
            &format!(
                "buildah push --format oci img oci-archive:{}",
                final_image.display()
            )
        );
    }

    #[test]
    fn test_tags() {
        let root = tempfile::tempdir().unwrap();
        let build = wrapped_build(root.path());
        assert_eq!(image_tags(&build, &[]), vec!["38.20240101.1-x86_64"]);
        assert_eq!(
            image_tags(&build, &["stable".into(), "stable".into()]),
            vec!["38.20240101.1-x86_64", "stable", "stable"]
        );
    }

    #[test]
    fn test_upload_requires_repository() {
        let root = tempfile::tempdir().unwrap();
        let mut build = wrapped_build(root.path());
        let runner = upload_runner();

        for repository in [None, Some(String::new())] {
            let options = UploadOptions {
                repository,
                ..Default::default()
            };
            let err = upload(&runner, &Skopeo::default(), &mut build, &options).unwrap_err();
            assert!(matches!(err, Error::MissingRepository), "{err:?}");
        }
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_upload_default_name() {
        let root = tempfile::tempdir().unwrap();
        let mut build = wrapped_build(root.path());
        let runner = upload_runner();
        let options = UploadOptions {
            repository: Some("quay.io/example".into()),
            ..Default::default()
        };

        let pinned = upload(&runner, &Skopeo::default(), &mut build, &options).unwrap();
        assert_eq!(pinned, format!("quay.io/example/fedora-coreos@{DIGEST}"));

        let archive = build.build_dir().join(ARCHIVE);
        assert_eq!(
            runner.lines(),
            vec![
                format!(
                    "skopeo inspect oci-archive:{} -f {{{{.Digest}}}}",
                    archive.display()
                ),
                format!(
                    "skopeo copy oci-archive:{} docker://quay.io/example/fedora-coreos:38.20240101.1-x86_64",
                    archive.display()
                ),
            ]
        );

        let meta = Build::open(build.build_dir()).unwrap().meta;
        assert_eq!(
            meta["kubevirt"]["image"],
            Value::from(format!("quay.io/example/fedora-coreos@{DIGEST}"))
        );
    }

    #[test]
    fn test_upload_extra_tags() {
        let root = tempfile::tempdir().unwrap();
        let mut build = wrapped_build(root.path());
        let runner = upload_runner();
        let options = UploadOptions {
            name: Some("fcos-kubevirt".into()),
            repository: Some("quay.io/example/".into()),
            tags: vec!["stable".into(), "latest".into()],
        };

        upload(&runner, &Skopeo::default(), &mut build, &options).unwrap();

        let copies: Vec<String> = runner
            .calls()
            .into_iter()
            .filter(|argv| argv[1] == "copy")
            .map(|argv| argv[3].clone())
            .collect();
        assert_eq!(
            copies,
            vec![
                "docker://quay.io/example/fcos-kubevirt:38.20240101.1-x86_64",
                "docker://quay.io/example/fcos-kubevirt:stable",
                "docker://quay.io/example/fcos-kubevirt:latest",
            ]
        );
        assert_eq!(
            build.meta["kubevirt"]["image"],
            Value::from(format!("quay.io/example/fcos-kubevirt@{DIGEST}"))
        );
    }

    #[test]
    fn test_upload_copy_failure_keeps_meta() {
        let root = tempfile::tempdir().unwrap();
        let mut build = wrapped_build(root.path());
        let runner = upload_runner().fail_on("copy");
        let options = UploadOptions {
            repository: Some("quay.io/example".into()),
            tags: vec!["stable".into()],
            ..Default::default()
        };

        let err = upload(&runner, &Skopeo::default(), &mut build, &options).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }), "{err:?}");
        // inspect plus the first copy only
        assert_eq!(runner.calls().len(), 2);
        let meta = Build::open(build.build_dir()).unwrap().meta;
        assert!(meta.get("kubevirt").is_none());
    }

    #[test]
    fn test_upload_without_archive() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_build(root.path(), "38.20240101.1", "x86_64");
        let mut build = Build::open(&dir).unwrap();
        let runner = upload_runner();
        let options = UploadOptions {
            repository: Some("quay.io/example".into()),
            ..Default::default()
        };
        let err = upload(&runner, &Skopeo::default(), &mut build, &options).unwrap_err();
        assert!(matches!(err, Error::MissingImage(_)), "{err:?}");
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_replicate() {
        let mut out = vec![];
        replicate(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("KubeVirt does not require regional replication"));
    }
}
