//! Persistence
//!
//! Saving trained predictors to [`ModelBundle`]s and loading them back,
//! optionally encrypted with an injected [`Cipher`].
//!
//! Every blob is checksummed before encryption, so a wrong key is detected on
//! load even when the cipher itself cannot tell.

pub mod bundle;
pub mod cipher;
pub mod manifest;

pub use bundle::ModelBundle;
pub use cipher::{Cipher, Encryption};
pub use manifest::{compute_checksum, AlgorithmDescriptor, BundleManifest, EntryChecksum};

use crate::algorithm::Algorithm;
use crate::data::{class_labels, Record};
use crate::errors::ConformalError;
use crate::ncm::Ncm;
use crate::predictor::{Acp, Icp, IcpCalibration, Predictor, PredictorKind, Tcp, Vap, VapMember};
use crate::registry::Registry;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

const TRAINING_RECORDS: &str = "training/records.json";

fn member_entry(index: usize, part: &str) -> String {
    format!("members/{}/{}", index, part)
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, ConformalError> {
    serde_json::to_vec(value).map_err(|e| ConformalError::UnableToWrite(e.to_string()))
}

fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ConformalError> {
    serde_json::from_slice(bytes).map_err(|e| ConformalError::UnableToRead(e.to_string()))
}

/// Collects plaintext blobs, recording their checksums before encryption.
struct BundleBuilder<'a> {
    manifest: BundleManifest,
    entries: Vec<(String, Vec<u8>)>,
    encryption: Option<Encryption<'a>>,
}

impl<'a> BundleBuilder<'a> {
    fn add(&mut self, name: String, plaintext: Vec<u8>) -> Result<(), ConformalError> {
        self.manifest.entries.push(EntryChecksum {
            name: name.clone(),
            sha256: compute_checksum(&plaintext),
        });
        let data = match &self.encryption {
            Some(enc) => enc.encrypt(&plaintext)?,
            None => plaintext,
        };
        self.entries.push((name, data));
        Ok(())
    }

    fn finish(self) -> ModelBundle {
        ModelBundle {
            manifest: self.manifest,
            entries: self.entries,
        }
    }
}

/// Save a trained predictor. Untrained predictors cannot be saved.
pub fn save(predictor: &Predictor, encryption: Option<Encryption<'_>>) -> Result<ModelBundle, ConformalError> {
    if !predictor.is_trained() {
        return Err(ConformalError::UntrainedPredictor(format!("{:?} predictor", predictor.kind())));
    }
    let mut builder = BundleBuilder {
        manifest: BundleManifest::new(predictor.kind(), predictor.task(), encryption.is_some()),
        entries: Vec::new(),
        encryption,
    };
    match predictor {
        Predictor::Acp(acp) => {
            let m = &mut builder.manifest;
            m.seed = Some(acp.seed());
            m.strategy = Some(acp.strategy().clone());
            m.num_members = acp.num_members();
            m.trained_members = acp.trained_members();
            m.ncm = Some(acp.ncm().describe());
            m.label_range = acp.label_range();
            for (i, icp) in acp.members() {
                let (model, error_model) = icp.ncm().model_states()?;
                builder.add(member_entry(*i, "model.bin"), model)?;
                if let Some(state) = error_model {
                    builder.add(member_entry(*i, "error_model.bin"), state)?;
                }
                builder.add(member_entry(*i, "calibration.json"), to_json(&icp.calibration())?)?;
            }
        }
        Predictor::Tcp(tcp) => {
            builder.manifest.ncm = Some(Ncm::Classification(tcp.ncm().clone()).describe());
            builder.manifest.mondrian = Some(tcp.is_mondrian());
            builder.add(TRAINING_RECORDS.to_string(), to_json(&tcp.records())?)?;
        }
        Predictor::Vap(vap) => {
            let m = &mut builder.manifest;
            m.seed = Some(vap.seed());
            m.strategy = Some(vap.strategy().clone());
            m.num_members = vap.num_members();
            m.trained_members = vap.members().keys().copied().collect();
            m.algorithm = Some(AlgorithmDescriptor {
                name: vap.model().name().to_string(),
                params: vap.model().params(),
            });
            m.labels = vap.labels();
            for (i, member) in vap.members() {
                builder.add(member_entry(*i, "model.bin"), member.model.state()?)?;
                builder.add(member_entry(*i, "calibration.json"), to_json(&member.calibration)?)?;
            }
        }
    }
    let bundle = builder.finish();
    info!(
        "Saved {:?} predictor with {} entries{}.",
        predictor.kind(),
        bundle.entries.len(),
        if bundle.manifest.encrypted { ", encrypted" } else { "" }
    );
    Ok(bundle)
}

/// Verified plaintext entries of a bundle.
struct BundleContents<'b> {
    bundle: &'b ModelBundle,
    encryption: Option<Encryption<'b>>,
}

impl<'b> BundleContents<'b> {
    fn new(bundle: &'b ModelBundle, encryption: Option<Encryption<'b>>) -> Result<Self, ConformalError> {
        bundle.manifest.validate()?;
        let encryption = match (bundle.manifest.encrypted, encryption) {
            (true, None) => return Err(ConformalError::KeyMismatch),
            (false, Some(_)) => {
                warn!("Bundle is not encrypted, ignoring the supplied key.");
                None
            }
            (_, enc) => enc,
        };
        if let Some((name, _)) = bundle
            .entries
            .iter()
            .find(|(name, _)| bundle.manifest.checksum(name).is_none())
        {
            return Err(ConformalError::UnableToRead(format!(
                "entry '{}' is not listed in the manifest",
                name
            )));
        }
        Ok(BundleContents { bundle, encryption })
    }

    fn has(&self, name: &str) -> bool {
        self.bundle.manifest.checksum(name).is_some()
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, ConformalError> {
        let expected = self
            .bundle
            .manifest
            .checksum(name)
            .ok_or_else(|| ConformalError::UnableToRead(format!("entry '{}' is not listed in the manifest", name)))?;
        let stored = self
            .bundle
            .entry(name)
            .ok_or_else(|| ConformalError::UnableToRead(format!("entry '{}' is missing", name)))?;
        let plaintext = match &self.encryption {
            Some(enc) => enc.decrypt(stored)?,
            None => stored.to_vec(),
        };
        let actual = compute_checksum(&plaintext);
        if actual != expected {
            if self.encryption.is_some() {
                return Err(ConformalError::KeyMismatch);
            }
            return Err(ConformalError::ChecksumMismatch {
                entry: name.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(plaintext)
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, ConformalError> {
        from_json(&self.read(name)?)
    }
}

fn missing(field: &str) -> ConformalError {
    ConformalError::UnableToRead(format!("manifest has no {}", field))
}

/// Member count and trained indices must agree with the stored strategy.
fn check_members(manifest: &BundleManifest, num_splits: usize) -> Result<(), ConformalError> {
    if manifest.num_members != num_splits {
        return Err(ConformalError::UnableToRead(format!(
            "manifest lists {} members but the strategy has {} splits",
            manifest.num_members, num_splits
        )));
    }
    if let Some(i) = manifest.trained_members.iter().find(|i| **i >= num_splits) {
        return Err(ConformalError::UnableToRead(format!(
            "trained member {} is out of range for {} splits",
            i, num_splits
        )));
    }
    Ok(())
}

/// Rebuild a predictor from a bundle. Algorithms are instantiated through `registry`.
pub fn load(
    bundle: &ModelBundle,
    registry: &Registry,
    encryption: Option<Encryption<'_>>,
) -> Result<Predictor, ConformalError> {
    let contents = BundleContents::new(bundle, encryption)?;
    let m = &bundle.manifest;
    let predictor = match m.kind {
        PredictorKind::Acp => {
            let template = m.ncm.as_ref().ok_or_else(|| missing("ncm"))?.build(registry)?;
            let strategy = m.strategy.clone().ok_or_else(|| missing("strategy"))?;
            check_members(m, strategy.num_splits())?;
            let mut acp = Acp::new(template, strategy, m.seed.ok_or_else(|| missing("seed"))?)?;
            for i in &m.trained_members {
                let mut ncm = acp.ncm().clone();
                let error_entry = member_entry(*i, "error_model.bin");
                let error_state = if contents.has(&error_entry) {
                    Some(contents.read(&error_entry)?)
                } else {
                    None
                };
                ncm.restore_models(&contents.read(&member_entry(*i, "model.bin"))?, error_state.as_deref())?;
                let calibration: Option<IcpCalibration> =
                    contents.read_json(&member_entry(*i, "calibration.json"))?;
                acp.members.insert(
                    *i,
                    Icp {
                        ncm,
                        calibration: Some(calibration.ok_or_else(|| missing("member calibration"))?),
                    },
                );
            }
            acp.label_range = m.label_range;
            Predictor::Acp(acp)
        }
        PredictorKind::Tcp => {
            let ncm = m.ncm.as_ref().ok_or_else(|| missing("ncm"))?.build(registry)?;
            let mut tcp = Tcp::new(ncm)?.with_mondrian(m.mondrian.unwrap_or(true));
            let records: Vec<Record> = contents.read_json(TRAINING_RECORDS)?;
            tcp.labels = class_labels(&records)?.into_iter().collect();
            tcp.records = records;
            Predictor::Tcp(tcp)
        }
        PredictorKind::Vap => {
            let desc = m.algorithm.as_ref().ok_or_else(|| missing("algorithm"))?;
            let mut model = registry.classifier(&desc.name)?;
            model.set_params(&desc.params)?;
            let strategy = m.strategy.clone().ok_or_else(|| missing("strategy"))?;
            check_members(m, strategy.num_splits())?;
            let mut vap = Vap::new(model, strategy, m.seed.ok_or_else(|| missing("seed"))?)?;
            for i in &m.trained_members {
                let mut model = vap.model().clone_box();
                model.restore(&contents.read(&member_entry(*i, "model.bin"))?)?;
                let calibration: Vec<(f64, bool)> =
                    contents.read_json(&member_entry(*i, "calibration.json"))?;
                vap.members.insert(*i, VapMember { model, calibration });
            }
            vap.labels = m.labels;
            Predictor::Vap(vap)
        }
    };
    info!("Loaded {:?} predictor.", m.kind);
    Ok(predictor)
}

/// Load every bundle and merge them into one predictor, in any order.
pub fn merge(
    bundles: &[ModelBundle],
    registry: &Registry,
    encryption: Option<Encryption<'_>>,
) -> Result<Predictor, ConformalError> {
    let (first, rest) = bundles
        .split_first()
        .ok_or_else(|| ConformalError::InvalidInput("no bundles to merge".to_string()))?;
    let mut merged = load(first, registry, encryption)?;
    for bundle in rest {
        merged.merge(load(bundle, registry, encryption)?)?;
    }
    Ok(merged)
}

#[cfg(test)]
mod tests;
