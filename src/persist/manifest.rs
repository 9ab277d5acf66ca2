use crate::algorithm::Params;
use crate::constants::BUNDLE_FORMAT_VERSION;
use crate::data::Task;
use crate::errors::ConformalError;
use crate::ncm::NcmDescriptor;
use crate::predictor::{BinaryLabels, PredictorKind};
use crate::sampler::SamplingStrategy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex encoded SHA-256 of `data`.
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Scoring algorithm of a Venn-ABERS predictor.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AlgorithmDescriptor {
    pub name: String,
    #[serde(default)]
    pub params: Params,
}

/// Checksum of the plaintext of one bundle entry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EntryChecksum {
    pub name: String,
    pub sha256: String,
}

/// Everything needed to rebuild a predictor from the entries of a bundle.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BundleManifest {
    pub format_version: u32,
    pub kind: PredictorKind,
    pub task: Task,
    pub encrypted: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub strategy: Option<SamplingStrategy>,
    #[serde(default)]
    pub num_members: usize,
    #[serde(default)]
    pub trained_members: Vec<usize>,
    #[serde(default)]
    pub ncm: Option<NcmDescriptor>,
    #[serde(default)]
    pub algorithm: Option<AlgorithmDescriptor>,
    #[serde(default)]
    pub mondrian: Option<bool>,
    #[serde(default)]
    pub label_range: Option<(f64, f64)>,
    #[serde(default)]
    pub labels: Option<BinaryLabels>,
    pub entries: Vec<EntryChecksum>,
}

impl BundleManifest {
    pub(crate) fn new(kind: PredictorKind, task: Task, encrypted: bool) -> Self {
        BundleManifest {
            format_version: BUNDLE_FORMAT_VERSION,
            kind,
            task,
            encrypted,
            seed: None,
            strategy: None,
            num_members: 0,
            trained_members: Vec::new(),
            ncm: None,
            algorithm: None,
            mondrian: None,
            label_range: None,
            labels: None,
            entries: Vec::new(),
        }
    }

    pub fn checksum(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.sha256.as_str())
    }

    pub fn to_json(&self) -> Result<String, ConformalError> {
        serde_json::to_string_pretty(self).map_err(|e| ConformalError::UnableToWrite(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ConformalError> {
        let manifest: BundleManifest =
            serde_json::from_str(json).map_err(|e| ConformalError::UnableToRead(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the version and the shape of the checksum list.
    pub fn validate(&self) -> Result<(), ConformalError> {
        if self.format_version != BUNDLE_FORMAT_VERSION {
            return Err(ConformalError::UnableToRead(format!(
                "unsupported bundle format version {}, expected {}",
                self.format_version, BUNDLE_FORMAT_VERSION
            )));
        }
        for (i, e) in self.entries.iter().enumerate() {
            if e.sha256.len() != 64 {
                return Err(ConformalError::UnableToRead(format!(
                    "entry '{}' has an invalid checksum",
                    e.name
                )));
            }
            if self.entries[..i].iter().any(|other| other.name == e.name) {
                return Err(ConformalError::UnableToRead(format!(
                    "entry '{}' is listed more than once",
                    e.name
                )));
            }
        }
        Ok(())
    }
}
