//! An in-process backend driven by a description of dongles and the licenses they carry.
//!
//! It is meant for running applications on machines without dongles and for testing them.
//! The cryptography is a keyed keystream, good enough to observe round trips but nothing else.
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::{
    ApiVersion, EncryptMode, Error, Feature, Gateway, RemoteMode, Status, VendorCodes, Visibility,
    MESSAGE_SIZE,
};

const API_MAJOR: u32 = 7;
const API_MINOR: u32 = 2;
const BLOCK_SIZE: usize = 16;

fn default_max_concurrent_resource() -> u32 {
    1
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SimConfig {
    pub vendor_codes: VendorCodes,
    #[serde(default)]
    pub dongles: Vec<SimDongle>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SimDongle {
    pub dongle_id: u32,
    /// Single model bit, matched against [`Visibility::dongle_model`].
    pub dongle_model: u32,
    pub public_code: u32,
    #[serde(default)]
    pub broken: bool,
    #[serde(default)]
    pub license: Option<SimLicense>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SimLicense {
    pub license_id: u32,
    pub vendor_public_code: u32,
    pub vendor_company_name: String,
    #[serde(default)]
    pub products: Vec<SimProduct>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SimProduct {
    pub name: String,
    pub number: u32,
    #[serde(default)]
    pub modification: u32,
    #[serde(default)]
    pub features: Vec<SimFeature>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SimFeature {
    pub name: String,
    pub number: u32,
    /// Lifetime in seconds, counted from when the backend is created.
    #[serde(default)]
    pub time_limit: Option<i64>,
    #[serde(default)]
    pub run_counter: Option<u32>,
    #[serde(default = "default_max_concurrent_resource")]
    pub max_concurrent_resource: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        const VENDOR_PUBLIC_CODE: u32 = 0x0A5C_1E2D;
        Self {
            vendor_codes: VendorCodes::new(0x5191_75b7, 0x5191_7645),
            dongles: vec![
                SimDongle {
                    dongle_id: 0x0B1E_5A70,
                    dongle_model: 0x80,
                    public_code: VENDOR_PUBLIC_CODE,
                    broken: false,
                    license: None,
                },
                SimDongle {
                    dongle_id: 0x1CE0_F00D,
                    dongle_model: 0x400,
                    public_code: VENDOR_PUBLIC_CODE,
                    broken: false,
                    license: Some(SimLicense {
                        license_id: 20231,
                        vendor_public_code: VENDOR_PUBLIC_CODE,
                        vendor_company_name: "Example Vendor".to_string(),
                        products: vec![SimProduct {
                            name: "Example product".to_string(),
                            number: 1,
                            modification: 0,
                            features: vec![
                                SimFeature {
                                    name: "Base".to_string(),
                                    number: 1,
                                    time_limit: None,
                                    run_counter: Some(100),
                                    max_concurrent_resource: 4,
                                },
                                SimFeature {
                                    name: "Reports".to_string(),
                                    number: 2,
                                    time_limit: Some(30 * 24 * 60 * 60),
                                    run_counter: None,
                                    max_concurrent_resource: 1,
                                },
                            ],
                        }],
                    }),
                },
            ],
        }
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn feature_key(license_id: u32, number: u32) -> [u8; BLOCK_SIZE] {
    let digest = Sha256::new()
        .chain_update(b"feature-key")
        .chain_update(license_id.to_le_bytes())
        .chain_update(number.to_le_bytes())
        .finalize();
    let mut key = [0; BLOCK_SIZE];
    key.copy_from_slice(&digest[..BLOCK_SIZE]);
    key
}

// XOR with a keystream is its own inverse so encryption and decryption share this.
fn apply_keystream(data: &mut [u8], key: &[u8], mode: EncryptMode) {
    for (i, block) in data.chunks_mut(BLOCK_SIZE).enumerate() {
        let pad = Sha256::new()
            .chain_update(key)
            .chain_update(mode.cipher().bits().to_le_bytes())
            .chain_update((i as u64).to_le_bytes())
            .finalize();
        for (b, p) in block.iter_mut().zip(pad.iter()) {
            *b ^= p;
        }
    }
}

/// Runtime state of one feature on one dongle.
#[derive(Debug)]
struct Grant {
    dongle: usize,
    number: u32,
    key: [u8; BLOCK_SIZE],
    expires_at: Option<i64>,
    runs_left: Option<u32>,
    max_concurrent_resource: u32,
    sessions: u32,
}

impl Grant {
    fn remaining_time(&self) -> Option<i64> {
        self.expires_at.map(|t| (t - now()).max(0))
    }

    fn validate(&self) -> Status {
        if self.remaining_time() == Some(0) {
            return Err(Error::FeatureExpired);
        }
        if self.runs_left == Some(0) {
            return Err(Error::CounterExhausted);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Backend {
    config: SimConfig,
    grants: Vec<Grant>,
}

impl Backend {
    fn new(config: SimConfig) -> Self {
        let created = now();
        let mut grants = Vec::new();
        for (i, dongle) in config.dongles.iter().enumerate() {
            let Some(license) = &dongle.license else {
                continue;
            };
            for feature in license.products.iter().flat_map(|p| &p.features) {
                grants.push(Grant {
                    dongle: i,
                    number: feature.number,
                    key: feature_key(license.license_id, feature.number),
                    expires_at: feature.time_limit.map(|t| created + t),
                    runs_left: feature.run_counter,
                    max_concurrent_resource: feature.max_concurrent_resource,
                    sessions: 0,
                });
            }
        }
        Self { config, grants }
    }

    fn visible(&self, visibility: &Visibility) -> impl Iterator<Item = (usize, &SimDongle)> {
        let remote_only = visibility.remote_mode == RemoteMode::Remote;
        let visibility = *visibility;
        self.config
            .dongles
            .iter()
            .enumerate()
            .filter(move |(_, d)| !remote_only && visibility.admits(d.dongle_model))
    }

    fn find_grant(&self, number: u32, visibility: &Visibility) -> Option<usize> {
        let dongles: Vec<usize> = self
            .visible(visibility)
            .filter(|(_, d)| !d.broken)
            .map(|(i, _)| i)
            .collect();
        self.grants
            .iter()
            .position(|g| g.number == number && dongles.contains(&g.dongle))
    }

    fn render_feature(&self, dongle: usize, feature: &SimFeature) -> Value {
        let rest_of_life_time = self
            .grants
            .iter()
            .find(|g| g.dongle == dongle && g.number == feature.number)
            .and_then(Grant::remaining_time);
        json!({
            "name": feature.name,
            "number": feature.number,
            "restOfLifeTime": rest_of_life_time,
        })
    }

    fn render_record(&self, index: usize) -> Value {
        let dongle = &self.config.dongles[index];
        let license_id = match &dongle.license {
            Some(license) => license.license_id.to_string(),
            None => format!("{:08X}", dongle.dongle_id),
        };
        if dongle.broken {
            return json!({"licenseId": license_id, "isBroken": true});
        }
        let license_info = match &dongle.license {
            None => json!({}),
            Some(license) => {
                let products: Vec<Value> = license
                    .products
                    .iter()
                    .map(|p| {
                        let features: Vec<Value> = p
                            .features
                            .iter()
                            .map(|f| self.render_feature(index, f))
                            .collect();
                        json!({
                            "name": p.name,
                            "number": p.number,
                            "modification": p.modification,
                            "featuresCount": features.len(),
                            "features": features,
                        })
                    })
                    .collect();
                json!({
                    "licenseId": license.license_id,
                    "vendorPublicCode": license.vendor_public_code,
                    "vendorCompanyName": license.vendor_company_name,
                    "productsCount": products.len(),
                    "products": products,
                })
            }
        };
        json!({
            "licenseId": license_id,
            "isBroken": false,
            "dongleInfo": {
                "dongleId": dongle.dongle_id,
                "dongleModel": dongle.dongle_model,
                "publicCode": dongle.public_code,
            },
            "licenseInfo": license_info,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Selector {
    dongle_id: Option<u32>,
    license_id: Option<u32>,
}

impl Selector {
    fn matches(&self, dongle: &SimDongle) -> bool {
        let license_id = dongle.license.as_ref().map(|l| l.license_id);
        self.dongle_id.map_or(true, |id| id == dongle.dongle_id)
            && self.license_id.map_or(true, |id| Some(id) == license_id)
    }
}

fn lock(backend: &Mutex<Backend>) -> MutexGuard<'_, Backend> {
    backend.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A [`Gateway`] backed by a [`SimConfig`].
///
/// Clones share state, so a run counter decremented through one is decremented for all.
#[derive(Clone, Debug)]
pub struct SimulatedGateway {
    backend: Arc<Mutex<Backend>>,
}

impl SimulatedGateway {
    pub fn new(config: SimConfig) -> Self {
        Self {
            backend: Arc::new(Mutex::new(Backend::new(config))),
        }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl Gateway for SimulatedGateway {
    type Feature = SimulatedFeature;

    fn api_version(&self) -> Result<ApiVersion, Error> {
        Ok(ApiVersion {
            code: (API_MAJOR << 16) | API_MINOR,
            major: API_MAJOR,
            minor: API_MINOR,
        })
    }

    fn license_info(
        &self,
        visibility: &Visibility,
        selector: Option<&str>,
    ) -> Result<String, Error> {
        let selector: Selector = match selector {
            None => Selector::default(),
            Some(s) => serde_json::from_str(s).map_err(|_| Error::InvalidArg)?,
        };
        let backend = lock(&self.backend);
        let licenses: Vec<Value> = backend
            .visible(visibility)
            .filter(|(_, d)| selector.matches(d))
            .map(|(i, _)| backend.render_record(i))
            .collect();
        debug!("Found {} visible licenses", licenses.len());
        serde_json::to_string(&json!({ "licenses": licenses })).map_err(|_| Error::Communication)
    }

    fn feature(&self, number: u32) -> SimulatedFeature {
        SimulatedFeature {
            number,
            backend: self.backend.clone(),
            session: None,
        }
    }
}

/// A handle to one feature of a [`SimulatedGateway`].
///
/// Dropping a logged in handle logs it out.
#[derive(Debug)]
pub struct SimulatedFeature {
    number: u32,
    backend: Arc<Mutex<Backend>>,
    session: Option<usize>,
}

impl SimulatedFeature {
    fn with_grant<T>(
        &self,
        f: impl FnOnce(&mut Backend, usize) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let grant = self.session.ok_or(Error::NotLoggedIn)?;
        let mut backend = lock(&self.backend);
        f(&mut *backend, grant)
    }

    fn crypt(&mut self, data: &mut [u8], mode: EncryptMode, key: Option<&[u8]>) -> Status {
        if mode.is_block_mode() && data.len() % BLOCK_SIZE != 0 {
            return Err(Error::InvalidArg);
        }
        if key.is_some_and(|k| k.len() != BLOCK_SIZE) {
            return Err(Error::InvalidArg);
        }
        self.with_grant(|backend, i| {
            let grant = &mut backend.grants[i];
            grant.validate()?;
            if !mode.contains(EncryptMode::NO_COUNTER_DECREMENT) {
                if let Some(runs) = grant.runs_left.as_mut() {
                    *runs -= 1;
                    debug!("Feature {} has {} runs left", grant.number, runs);
                }
            }
            apply_keystream(data, key.unwrap_or(&grant.key), mode);
            Ok(())
        })
    }
}

impl Feature for SimulatedFeature {
    fn number(&self) -> u32 {
        self.number
    }

    fn login(&mut self, vendor_codes: &VendorCodes, visibility: &Visibility) -> Status {
        if self.session.is_some() {
            return Err(Error::AlreadyLoggedIn);
        }
        let mut backend = lock(&self.backend);
        if backend.config.vendor_codes != *vendor_codes {
            return Err(Error::InvalidVendorCodes);
        }
        if backend.visible(visibility).next().is_none() {
            return Err(Error::DongleNotFound);
        }
        let i = backend
            .find_grant(self.number, visibility)
            .ok_or(Error::FeatureNotFound)?;
        let grant = &mut backend.grants[i];
        grant.validate()?;
        if grant.sessions >= grant.max_concurrent_resource {
            return Err(Error::PolicyViolation);
        }
        grant.sessions += 1;
        self.session = Some(i);
        Ok(())
    }

    fn info(&mut self) -> Result<String, Error> {
        self.with_grant(|backend, i| {
            let record = backend.render_record(backend.grants[i].dongle);
            serde_json::to_string(&record).map_err(|_| Error::Communication)
        })
    }

    fn check(&mut self, policy: Option<&str>) -> Status {
        if let Some(policy) = policy {
            serde_json::from_str::<Value>(policy).map_err(|_| Error::InvalidArg)?;
        }
        self.with_grant(|backend, i| backend.grants[i].validate())
    }

    fn encrypt(&mut self, data: &mut [u8], mode: EncryptMode, key: Option<&[u8]>) -> Status {
        self.crypt(data, mode, key)
    }

    fn decrypt(&mut self, data: &mut [u8], mode: EncryptMode, key: Option<&[u8]>) -> Status {
        self.crypt(data, mode, key)
    }

    fn sign(&mut self, message: &[u8; MESSAGE_SIZE]) -> Result<Vec<u8>, Error> {
        self.with_grant(|backend, i| {
            let digest = Sha256::new()
                .chain_update(b"sign")
                .chain_update(backend.grants[i].key)
                .chain_update(message)
                .finalize();
            Ok(digest.to_vec())
        })
    }

    fn time_limit(&mut self) -> Result<i64, Error> {
        self.with_grant(|backend, i| backend.grants[i].remaining_time().ok_or(Error::NoService))
    }

    fn run_counter(&mut self) -> Result<u32, Error> {
        self.with_grant(|backend, i| backend.grants[i].runs_left.ok_or(Error::NoService))
    }

    fn real_time(&mut self) -> Result<i64, Error> {
        self.with_grant(|_, _| Ok(now()))
    }

    fn max_concurrent_resource(&mut self) -> Result<u32, Error> {
        self.with_grant(|backend, i| Ok(backend.grants[i].max_concurrent_resource))
    }

    fn logout(&mut self) -> Status {
        let i = self.session.take().ok_or(Error::NotLoggedIn)?;
        let grant = &mut lock(&self.backend).grants[i];
        grant.sessions = grant.sessions.saturating_sub(1);
        Ok(())
    }
}

impl Drop for SimulatedFeature {
    fn drop(&mut self) {
        if self.session.is_some() {
            let _ = self.logout();
        }
    }
}
