//! Library (content type) versions and their identities.
//!
//! A library is identified by machine name plus major and minor version.
//! The patch version is an attribute: only one patch is installed per
//! major.minor.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::CoreError;

/// Database identifier of an installed library
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(pub i64);

impl LibraryId {
    /// Get the raw row id
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity triple of a library version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryKey {
    pub machine_name: String,
    pub major_version: u32,
    pub minor_version: u32,
}

impl LibraryKey {
    pub fn new(machine_name: impl Into<String>, major_version: u32, minor_version: u32) -> Self {
        Self {
            machine_name: machine_name.into(),
            major_version,
            minor_version,
        }
    }

    /// Version pair used for ordering within one machine name
    pub fn version(&self) -> (u32, u32) {
        (self.major_version, self.minor_version)
    }

    /// Parse the `/<machine-name>/<major>/<minor>` form used by upgrade requests
    pub fn parse_path(path: &str) -> Result<Self, CoreError> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let parts: Vec<&str> = trimmed.split('/').collect();

        if parts.len() != 3 || parts[0].is_empty() {
            return Err(CoreError::Validation(format!(
                "Library must be given as /<machine-name>/<major>/<minor>, got '{}'",
                path
            )));
        }

        let major = parts[1]
            .parse::<u32>()
            .map_err(|_| CoreError::Validation(format!("Invalid major version: {}", parts[1])))?;
        let minor = parts[2]
            .parse::<u32>()
            .map_err(|_| CoreError::Validation(format!("Invalid minor version: {}", parts[2])))?;

        Ok(Self::new(parts[0], major, minor))
    }

    /// Folder name of the library's files (`H5P.Foo-1.2`)
    pub fn folder_name(&self) -> String {
        format!(
            "{}-{}.{}",
            self.machine_name, self.major_version, self.minor_version
        )
    }
}

impl fmt::Display for LibraryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}",
            self.machine_name, self.major_version, self.minor_version
        )
    }
}

/// How one library requires another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// Loaded together with the dependent library
    Preloaded,

    /// Loaded on demand at runtime
    Dynamic,

    /// Only needed by the editor
    Editor,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::Preloaded => "preloaded",
            DependencyType::Dynamic => "dynamic",
            DependencyType::Editor => "editor",
        }
    }
}

impl std::str::FromStr for DependencyType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "preloaded" => Ok(DependencyType::Preloaded),
            "dynamic" => Ok(DependencyType::Dynamic),
            "editor" => Ok(DependencyType::Editor),
            other => Err(CoreError::Validation(format!(
                "Unknown dependency type: {}",
                other
            ))),
        }
    }
}

/// An installed library version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryVersion {
    pub id: LibraryId,

    #[serde(flatten)]
    pub key: LibraryKey,

    pub patch_version: u32,

    pub title: String,

    /// Whether content can use this library as its main library
    pub runnable: bool,

    /// Restricted libraries are hidden from authors without extra capability
    pub restricted: bool,

    pub fullscreen: bool,

    /// Comma-separated embed types (`iframe`, `div`)
    pub embed_types: String,

    /// Semantics schema, stored verbatim
    pub semantics: Option<String>,

    pub preloaded_js: Option<String>,

    pub preloaded_css: Option<String>,
}

impl LibraryVersion {
    /// Full version string including patch (`1.2.3`)
    pub fn version_string(&self) -> String {
        format!(
            "{}.{}.{}",
            self.key.major_version, self.key.minor_version, self.patch_version
        )
    }

    /// Short version string used in event records (`1.2`)
    pub fn short_version(&self) -> String {
        format!("{}.{}", self.key.major_version, self.key.minor_version)
    }
}

/// Data for registering a library version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLibrary {
    pub machine_name: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub patch_version: u32,
    pub title: String,
    #[serde(default)]
    pub runnable: bool,
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub fullscreen: bool,
    #[serde(default)]
    pub embed_types: String,
    #[serde(default)]
    pub semantics: Option<String>,
    #[serde(default)]
    pub preloaded_js: Option<String>,
    #[serde(default)]
    pub preloaded_css: Option<String>,
}

impl NewLibrary {
    pub fn new(
        machine_name: impl Into<String>,
        major_version: u32,
        minor_version: u32,
        patch_version: u32,
    ) -> Self {
        let machine_name = machine_name.into();
        Self {
            title: machine_name.clone(),
            machine_name,
            major_version,
            minor_version,
            patch_version,
            ..Default::default()
        }
    }

    pub fn key(&self) -> LibraryKey {
        LibraryKey::new(&self.machine_name, self.major_version, self.minor_version)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn runnable(mut self) -> Self {
        self.runnable = true;
        self
    }

    pub fn with_semantics(mut self, semantics: impl Into<String>) -> Self {
        self.semantics = Some(semantics.into());
        self
    }
}

impl From<&LibraryVersion> for NewLibrary {
    fn from(library: &LibraryVersion) -> Self {
        Self {
            machine_name: library.key.machine_name.clone(),
            major_version: library.key.major_version,
            minor_version: library.key.minor_version,
            patch_version: library.patch_version,
            title: library.title.clone(),
            runnable: library.runnable,
            restricted: library.restricted,
            fullscreen: library.fullscreen,
            embed_types: library.embed_types.clone(),
            semantics: library.semantics.clone(),
            preloaded_js: library.preloaded_js.clone(),
            preloaded_css: library.preloaded_css.clone(),
        }
    }
}

/// Latest version of a content type as published by the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubVersion {
    pub machine_name: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub patch_version: u32,
}

impl HubVersion {
    /// Whether this published version is newer than an installed one
    pub fn is_newer_than(&self, installed: &LibraryVersion) -> bool {
        (self.major_version, self.minor_version, self.patch_version)
            > (
                installed.key.major_version,
                installed.key.minor_version,
                installed.patch_version,
            )
    }
}

/// A stored dependency edge between two installed libraries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDependency {
    pub library_id: LibraryId,
    pub required_library_id: LibraryId,
    pub dependency_type: DependencyType,
}

/// A library as described by the `library.json` shipped in its folder
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryManifest {
    pub title: String,
    pub machine_name: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub patch_version: u32,

    /// `library.json` writes flags as 0/1
    #[serde(default, deserialize_with = "flag")]
    pub runnable: bool,

    #[serde(default, deserialize_with = "flag")]
    pub fullscreen: bool,

    #[serde(default)]
    pub embed_types: Vec<String>,

    #[serde(default)]
    pub preloaded_js: Vec<AssetPath>,

    #[serde(default)]
    pub preloaded_css: Vec<AssetPath>,

    #[serde(default)]
    pub preloaded_dependencies: Vec<ManifestDependency>,

    #[serde(default)]
    pub dynamic_dependencies: Vec<ManifestDependency>,

    #[serde(default)]
    pub editor_dependencies: Vec<ManifestDependency>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPath {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDependency {
    pub machine_name: String,
    pub major_version: u32,
    pub minor_version: u32,
}

impl ManifestDependency {
    pub fn key(&self) -> LibraryKey {
        LibraryKey::new(&self.machine_name, self.major_version, self.minor_version)
    }
}

impl LibraryManifest {
    pub fn key(&self) -> LibraryKey {
        LibraryKey::new(&self.machine_name, self.major_version, self.minor_version)
    }

    /// Registration data; asset lists are stored comma-separated
    pub fn to_new_library(&self, semantics: Option<String>) -> NewLibrary {
        let join = |assets: &[AssetPath]| {
            (!assets.is_empty()).then(|| {
                assets
                    .iter()
                    .map(|asset| asset.path.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
        };

        NewLibrary {
            machine_name: self.machine_name.clone(),
            major_version: self.major_version,
            minor_version: self.minor_version,
            patch_version: self.patch_version,
            title: self.title.clone(),
            runnable: self.runnable,
            restricted: false,
            fullscreen: self.fullscreen,
            embed_types: self.embed_types.join(", "),
            semantics,
            preloaded_js: join(&self.preloaded_js),
            preloaded_css: join(&self.preloaded_css),
        }
    }

    /// Declared dependencies grouped by type
    pub fn dependencies(&self) -> Vec<(DependencyType, Vec<LibraryKey>)> {
        let keys = |deps: &[ManifestDependency]| -> Vec<LibraryKey> {
            deps.iter().map(ManifestDependency::key).collect()
        };
        vec![
            (DependencyType::Preloaded, keys(&self.preloaded_dependencies)),
            (DependencyType::Dynamic, keys(&self.dynamic_dependencies)),
            (DependencyType::Editor, keys(&self.editor_dependencies)),
        ]
    }
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Int(value) => value != 0,
    })
}
