//! Content-addressed build assets and the asset manifest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::{Result, StackError};

/// Version of the asset manifest schema.
pub const ASSET_MANIFEST_VERSION: &str = "36.0.0";

/// How an asset is packaged for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Packaging {
    /// Directory zipped before upload.
    #[default]
    Zip,
    /// Single file uploaded as-is.
    File,
}

/// A local directory identified by the hash of its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Absolute source path.
    pub path: PathBuf,
    /// SHA-256 over relative file paths and contents (hex).
    pub hash: String,
    /// Packaging mode.
    pub packaging: Packaging,
    /// Number of files.
    pub file_count: usize,
    /// Total size of all files.
    pub total_bytes: u64,
}

impl Asset {
    /// Hash a directory into an asset.
    pub fn from_dir(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(StackError::ArtifactMissing(path.to_path_buf()));
        }

        let path = std::fs::canonicalize(path).map_err(|e| StackError::io(path, e))?;
        let mut files: Vec<(String, PathBuf)> = Vec::new();

        for entry in WalkDir::new(&path).skip_hidden(false) {
            let entry = entry.map_err(|e| StackError::io(&path, std::io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let full = entry.path();
            files.push((relative_key(&path, &full), full));
        }
        files.sort();

        let mut hasher = Sha256::new();
        let mut total_bytes = 0u64;
        for (key, full) in &files {
            let content = std::fs::read(full).map_err(|e| StackError::io(full, e))?;
            total_bytes += content.len() as u64;
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update((content.len() as u64).to_le_bytes());
            hasher.update(&content);
        }

        Ok(Self {
            path,
            hash: hex::encode(hasher.finalize()),
            packaging: Packaging::Zip,
            file_count: files.len(),
            total_bytes,
        })
    }

    /// First eight hash characters, used in logical ids.
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(8)]
    }

    /// Object key in the staging bucket.
    pub fn object_key(&self) -> String {
        match self.packaging {
            Packaging::Zip => format!("{}.zip", self.hash),
            Packaging::File => self.hash.clone(),
        }
    }
}

fn relative_key(root: &Path, full: &Path) -> String {
    full.strip_prefix(root)
        .unwrap_or(full)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Lexical path from `base` to `path`, `/`-separated.
pub fn relative_to(path: &Path, base: &Path) -> String {
    let path: Vec<_> = path.components().collect();
    let base: Vec<_> = base.components().collect();
    let common = path
        .iter()
        .zip(&base)
        .take_while(|(a, b)| a == b)
        .count();

    let parts: Vec<String> = std::iter::repeat("..".to_string())
        .take(base.len() - common)
        .chain(
            path[common..]
                .iter()
                .map(|c| c.as_os_str().to_string_lossy().into_owned()),
        )
        .collect();

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Bootstrap bucket assets are uploaded to before deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetStaging {
    qualifier: String,
    region: String,
    out_dir: PathBuf,
}

impl AssetStaging {
    /// Create staging for a bootstrap qualifier and region.
    pub fn new(qualifier: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.into(),
            region: region.into(),
            out_dir: PathBuf::new(),
        }
    }

    /// Record asset paths relative to the synthesis output directory.
    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    /// Asset path as recorded in resource metadata.
    ///
    /// Relative to the output directory when both paths are absolute, so
    /// two checkouts of the same build declare identical resources.
    pub fn metadata_path(&self, asset: &Asset) -> String {
        if asset.path.is_absolute() && self.out_dir.is_absolute() {
            relative_to(&asset.path, &self.out_dir)
        } else {
            asset.path.display().to_string()
        }
    }

    /// Bucket name with CloudFormation pseudo-parameter placeholders.
    pub fn bucket_name(&self) -> String {
        format!(
            "cdk-{}-assets-${{AWS::AccountId}}-${{AWS::Region}}",
            self.qualifier
        )
    }

    /// Bucket name as a template expression.
    pub fn bucket_expr(&self) -> Value {
        json!({ "Fn::Sub": self.bucket_name() })
    }

    /// Lambda code location for an asset.
    pub fn code_location(&self, asset: &Asset) -> Value {
        json!({
            "S3Bucket": self.bucket_expr(),
            "S3Key": asset.object_key(),
        })
    }

    /// Build the manifest describing where each asset is published.
    pub fn manifest<'a>(&self, assets: impl IntoIterator<Item = &'a Asset>) -> AssetManifest {
        let mut files = BTreeMap::new();
        for asset in assets {
            let mut destinations = BTreeMap::new();
            destinations.insert(
                format!("current_account-{}", self.region),
                AssetDestination {
                    bucket_name: self.bucket_name(),
                    object_key: asset.object_key(),
                    region: self.region.clone(),
                },
            );
            files.insert(
                asset.hash.clone(),
                FileAsset {
                    source: AssetSource {
                        path: asset.path.clone(),
                        packaging: asset.packaging,
                    },
                    destinations,
                },
            );
        }

        AssetManifest {
            version: ASSET_MANIFEST_VERSION.to_string(),
            files,
        }
    }
}

/// Asset manifest consumed by the asset publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    /// Schema version.
    pub version: String,
    /// File assets keyed by content hash.
    pub files: BTreeMap<String, FileAsset>,
}

/// A file asset entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAsset {
    /// Local source.
    pub source: AssetSource,
    /// Publish destinations.
    pub destinations: BTreeMap<String, AssetDestination>,
}

/// Local source of a file asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSource {
    /// Path to the file or directory.
    pub path: PathBuf,
    /// Packaging mode.
    pub packaging: Packaging,
}

/// Publish destination of a file asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDestination {
    /// Staging bucket name.
    pub bucket_name: String,
    /// Object key.
    pub object_key: String,
    /// Region.
    pub region: String,
}
