//! Build descriptors: the on-disk metadata of a finished build.
//!
//! A build tree looks like this:
//!
//! ```text
//! <buildroot>/builds/builds.json
//! <buildroot>/builds/<id>/<arch>/meta.json
//! <buildroot>/builds/<id>/<arch>/<artifacts...>
//! ```
//!
//! `builds.json` lists builds newest first.  `meta.json` is a free-form JSON object owned by the
//! wider build system; we only read a handful of keys and add our own entries.

use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::{Error, Result};

const BUILDS_JSON: &str = "builds.json";
const META_JSON: &str = "meta.json";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BuildEntry {
    Full { id: String, arches: Vec<String> },
    // Older indexes list bare IDs without architectures.
    Legacy(String),
}

impl BuildEntry {
    fn id(&self) -> &str {
        match self {
            BuildEntry::Full { id, .. } => id,
            BuildEntry::Legacy(id) => id,
        }
    }

    fn has_arch(&self, arch: &str) -> bool {
        match self {
            BuildEntry::Full { arches, .. } => arches.iter().any(|a| a == arch),
            BuildEntry::Legacy(_) => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BuildsIndex {
    builds: Vec<BuildEntry>,
}

/// The `builds/` directory of a build root.
#[derive(Debug)]
pub struct Builds {
    dir: PathBuf,
    index: BuildsIndex,
}

impl Builds {
    /// Reads `<buildroot>/builds/builds.json`.
    pub fn open(buildroot: &Path) -> Result<Self> {
        let dir = buildroot.join("builds");
        let file = File::open(dir.join(BUILDS_JSON))?;
        let index = serde_json::from_reader(BufReader::new(file))?;
        Ok(Self { dir, index })
    }

    /// The newest build ID.
    pub fn latest(&self) -> Result<&str> {
        self.index
            .builds
            .first()
            .map(BuildEntry::id)
            .ok_or_else(|| Error::NoBuilds(self.dir.clone()))
    }

    /// Opens the build `id` (or the newest one) for `arch`.
    pub fn get(&self, id: Option<&str>, arch: &str) -> Result<Build> {
        let id = match id {
            Some(id) => id,
            None => self.latest()?,
        };
        let found = self
            .index
            .builds
            .iter()
            .any(|entry| entry.id() == id && entry.has_arch(arch));
        if !found {
            return Err(Error::BuildNotFound {
                id: id.into(),
                arch: arch.into(),
            });
        }
        Build::open(&self.dir.join(id).join(arch))
    }
}

/// A single build for a single architecture.
#[derive(Debug)]
pub struct Build {
    build_dir: PathBuf,
    pub build_name: String,
    pub build_id: String,
    pub basearch: String,
    /// The full contents of `meta.json`.
    pub meta: Map<String, Value>,
}

fn meta_str(meta: &Map<String, Value>, key: &'static str) -> Result<String> {
    meta.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(Error::MissingMetaField(key))
}

impl Build {
    /// Loads `meta.json` from a build directory.
    pub fn open(build_dir: &Path) -> Result<Self> {
        let file = File::open(build_dir.join(META_JSON))?;
        let meta: Map<String, Value> = serde_json::from_reader(BufReader::new(file))?;
        Ok(Self {
            build_dir: build_dir.to_path_buf(),
            build_name: meta_str(&meta, "name")?,
            build_id: meta_str(&meta, "buildid")?,
            basearch: meta_str(&meta, "coreos-assembler.basearch")?,
            meta,
        })
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Path of the artifact recorded for `platform` under `images` in the metadata.
    pub fn image_path(&self, platform: &str) -> Result<PathBuf> {
        self.meta
            .get("images")
            .and_then(|images| images.get(platform))
            .and_then(|image| image.get("path"))
            .and_then(Value::as_str)
            .map(|path| self.build_dir.join(path))
            .ok_or_else(|| Error::MissingImage(platform.into()))
    }

    /// Records an artifact under `images.<platform>`, replacing any previous entry.
    pub fn set_image(&mut self, platform: &str, entry: Value) {
        let images = self
            .meta
            .entry("images")
            .or_insert_with(|| Value::Object(Map::new()));
        if !images.is_object() {
            *images = Value::Object(Map::new());
        }
        if let Value::Object(images) = images {
            images.insert(platform.into(), entry);
        }
    }

    /// Validates the metadata against the JSON schema at `schema`.
    pub fn validate(&self, schema: &Path) -> Result<()> {
        let file = File::open(schema)?;
        let schema_doc: Value = serde_json::from_reader(BufReader::new(file))?;
        let validator =
            jsonschema::validator_for(&schema_doc).map_err(|e| Error::InvalidSchema {
                schema: schema.to_path_buf(),
                message: e.to_string(),
            })?;

        let instance = Value::Object(self.meta.clone());
        let errors: Vec<String> = validator
            .iter_errors(&instance)
            .map(|e| e.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(Error::SchemaViolation {
                schema: schema.to_path_buf(),
                errors,
            });
        }
        Ok(())
    }

    /// Writes the metadata back to `meta.json`.
    ///
    /// The file is replaced atomically: readers see either the old or the new contents.
    pub fn write_meta(&self) -> Result<()> {
        let path = self.build_dir.join(META_JSON);
        let mut tmp = NamedTempFile::new_in(&self.build_dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.meta)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!("wrote {}", path.display());
        Ok(())
    }
}
