//! Package version, commit and installed-package records.

use crate::config::{InstallationConfig, LibraryPaths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A selectable version: either a release tag or a branch head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersion {
    pub tag_name: String,
    /// Release notes, or the head commit message for a branch.
    #[serde(default)]
    pub release_notes: Option<String>,
}

impl PackageVersion {
    pub fn new(tag_name: impl Into<String>, release_notes: Option<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            release_notes,
        }
    }
}

/// One selectable commit within a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCommit {
    pub sha: String,
    /// First line of the commit message.
    pub label: String,
}

impl GitCommit {
    /// Abbreviated SHA for display.
    pub fn short_sha(&self) -> &str {
        short_sha(&self.sha)
    }
}

/// First [`InstallationConfig::SHORT_SHA_LEN`] characters of `sha`, or all of
/// it when shorter.
pub fn short_sha(sha: &str) -> &str {
    match sha.char_indices().nth(InstallationConfig::SHORT_SHA_LEN) {
        Some((idx, _)) => &sha[..idx],
        None => sha,
    }
}

/// Value type of a launch option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchOptionType {
    Bool,
    String,
    Int,
}

/// A launch option a package understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOptionDefinition {
    pub name: String,
    pub option_type: LaunchOptionType,
    /// Command-line flags, first one is used when rendering.
    pub options: Vec<String>,
    #[serde(default)]
    pub default: Option<String>,
}

impl LaunchOptionDefinition {
    pub fn new(name: &str, option_type: LaunchOptionType, options: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            option_type,
            options: options.iter().map(|s| s.to_string()).collect(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// A saved launch option value on an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOption {
    pub name: String,
    pub option_type: LaunchOptionType,
    /// Flag to emit (e.g. `--xformers`).
    pub flag: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl LaunchOption {
    /// Render as command-line arguments; a false or empty value renders nothing.
    pub fn to_args(&self) -> Vec<String> {
        match (self.option_type, self.value.as_deref()) {
            (LaunchOptionType::Bool, Some("true")) => vec![self.flag.clone()],
            (LaunchOptionType::Bool, _) => Vec::new(),
            (_, Some(value)) if !value.is_empty() => vec![self.flag.clone(), value.to_string()],
            _ => Vec::new(),
        }
    }
}

/// Kinds of shared model folders that packages can link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SharedFolderType {
    StableDiffusion,
    Lora,
    LyCORIS,
    ESRGAN,
    GFPGAN,
    BSRGAN,
    Codeformer,
    Diffusers,
    RealESRGAN,
    SwinIR,
    VAE,
    ApproxVAE,
    Karlo,
    DeepDanbooru,
    TextualInversion,
    Hypernetwork,
    ControlNet,
    LDSR,
    CLIP,
    ScuNET,
    GLIGEN,
}

impl SharedFolderType {
    pub const ALL: [SharedFolderType; 21] = [
        SharedFolderType::StableDiffusion,
        SharedFolderType::Lora,
        SharedFolderType::LyCORIS,
        SharedFolderType::ESRGAN,
        SharedFolderType::GFPGAN,
        SharedFolderType::BSRGAN,
        SharedFolderType::Codeformer,
        SharedFolderType::Diffusers,
        SharedFolderType::RealESRGAN,
        SharedFolderType::SwinIR,
        SharedFolderType::VAE,
        SharedFolderType::ApproxVAE,
        SharedFolderType::Karlo,
        SharedFolderType::DeepDanbooru,
        SharedFolderType::TextualInversion,
        SharedFolderType::Hypernetwork,
        SharedFolderType::ControlNet,
        SharedFolderType::LDSR,
        SharedFolderType::CLIP,
        SharedFolderType::ScuNET,
        SharedFolderType::GLIGEN,
    ];

    /// Folder name under the shared models directory.
    pub fn dir_name(&self) -> &'static str {
        match self {
            SharedFolderType::StableDiffusion => "StableDiffusion",
            SharedFolderType::Lora => "Lora",
            SharedFolderType::LyCORIS => "LyCORIS",
            SharedFolderType::ESRGAN => "ESRGAN",
            SharedFolderType::GFPGAN => "GFPGAN",
            SharedFolderType::BSRGAN => "BSRGAN",
            SharedFolderType::Codeformer => "Codeformer",
            SharedFolderType::Diffusers => "Diffusers",
            SharedFolderType::RealESRGAN => "RealESRGAN",
            SharedFolderType::SwinIR => "SwinIR",
            SharedFolderType::VAE => "VAE",
            SharedFolderType::ApproxVAE => "ApproxVAE",
            SharedFolderType::Karlo => "Karlo",
            SharedFolderType::DeepDanbooru => "DeepDanbooru",
            SharedFolderType::TextualInversion => "TextualInversion",
            SharedFolderType::Hypernetwork => "Hypernetwork",
            SharedFolderType::ControlNet => "ControlNet",
            SharedFolderType::LDSR => "LDSR",
            SharedFolderType::CLIP => "CLIP",
            SharedFolderType::ScuNET => "ScuNET",
            SharedFolderType::GLIGEN => "GLIGEN",
        }
    }
}

/// Persisted record of an installed package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPackage {
    pub id: Uuid,
    pub display_name: String,
    /// Install directory relative to the library root (`Packages/<name>`).
    pub library_path: PathBuf,
    /// Name of the package descriptor this was installed from.
    pub package_name: String,
    /// Release tag or full commit SHA.
    pub package_version: String,
    pub display_version: String,
    #[serde(default)]
    pub installed_branch: Option<String>,
    pub launch_command: String,
    #[serde(default)]
    pub launch_args: Vec<LaunchOption>,
    pub last_update_check: DateTime<Utc>,
    #[serde(default)]
    pub update_available: bool,
}

impl InstalledPackage {
    /// Absolute install directory under `paths`.
    pub fn full_path(&self, paths: &LibraryPaths) -> PathBuf {
        paths.root().join(&self.library_path)
    }

    /// Whether this record lives at `Packages/<install_name>`.
    pub fn has_install_name(&self, install_name: &str) -> bool {
        self.library_path == LibraryPaths::relative_install_path(install_name)
    }

    /// Saved launch options rendered as arguments.
    pub fn launch_arguments(&self) -> Vec<String> {
        self.launch_args.iter().flat_map(LaunchOption::to_args).collect()
    }

    /// Install directory name, as chosen by the user.
    pub fn install_name(&self) -> Option<&str> {
        self.library_path.file_name().and_then(|n| n.to_str())
    }
}

/// Display string for an installed version.
///
/// Releases show the tag as-is; branch installs show `branch@shortsha`.
pub fn get_display_version(version: &str, branch: Option<&str>) -> String {
    match branch {
        None => version.to_string(),
        Some(branch) => format!("{}@{}", branch, short_sha(version)),
    }
}
