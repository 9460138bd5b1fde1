//! The diagnostic sequence run against a licensing backend.
use grdlic::{
    status_text, ApiVersion, EncryptMode, Feature, Gateway, VendorCodes, Visibility, MESSAGE_SIZE,
};
use license_inspector::Summary;
use log::{debug, error, info};
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("{call} returned {source} (status code {})", .source.code())]
    Gateway {
        call: &'static str,
        source: grdlic::Error,
    },
    #[error(transparent)]
    Schema(#[from] license_inspector::Error),
    #[error("{0} sanity check failed: invalid hash data")]
    DataIntegrity(&'static str),
    #[error("no feature found to log in to")]
    NoFeature,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Settings {
    pub visibility: Visibility,
    pub vendor_codes: VendorCodes,
    /// Log in to this feature instead of the first one found.
    pub feature_number: Option<u32>,
}

/// What a successful run observed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CheckReport {
    pub api_version: ApiVersion,
    pub licenses: Summary,
    pub feature_number: u32,
    pub feature_info: Summary,
    pub signature: Vec<u8>,
    pub remaining_time: Option<i64>,
    pub run_counter: Option<u32>,
    pub real_time: i64,
    pub max_concurrent_resource: u32,
}

#[derive(Debug)]
pub enum Outcome {
    Passed(Box<CheckReport>),
    /// The run stopped on bad data from the backend.
    Failed(CheckError),
    /// The backend refused a call; the caller should not keep going.
    Fatal(CheckError),
}

fn handle<T>(call: &'static str, result: Result<T, grdlic::Error>) -> Result<T, CheckError> {
    info!("Status: {}", status_text(&result));
    result.map_err(|source| CheckError::Gateway { call, source })
}

/// Like [`handle`] but treats `NO_SERVICE` as "not applicable".
fn handle_optional<T>(
    call: &'static str,
    result: Result<T, grdlic::Error>,
) -> Result<Option<T>, CheckError> {
    match result {
        Err(grdlic::Error::NoService) => {
            info!("NO SERVICE (skip)");
            Ok(None)
        }
        result => handle(call, result).map(Some),
    }
}

fn log_summary(summary: &Summary) {
    for event in &summary.records {
        info!("{:indent$}{event}", "", indent = 4 * event.depth());
        debug!("{:?}", event.fields());
    }
}

fn round_trip(
    feature: &mut impl Feature,
    data: &mut [u8],
    mode: EncryptMode,
    label: &'static str,
) -> Result<(), CheckError> {
    let hash = Sha256::digest(&*data);
    info!("Encrypt data");
    handle("encrypt", feature.encrypt(data, mode, None))?;
    info!("Decrypt data");
    handle("decrypt", feature.decrypt(data, mode, None))?;
    let intact = Sha256::digest(&*data) == hash;
    info!("{label} sanity check: {intact}");
    if !intact {
        return Err(CheckError::DataIntegrity(label));
    }
    Ok(())
}

/// Exercise every feature operation once, stopping at the first failure.
pub fn run_check(gateway: &impl Gateway, settings: &Settings) -> Result<CheckReport, CheckError> {
    info!("Call api_version");
    let api_version = handle("api_version", gateway.api_version())?;
    info!("API version: {api_version}");

    info!("Call license_info");
    let licenses = handle(
        "license_info",
        gateway.license_info(&settings.visibility, None),
    )?;
    info!("ALL AVAILABLE LICENSES:");
    let licenses = license_inspector::summarize_enumeration(Some(&licenses))?;
    log_summary(&licenses);

    let feature_number = settings
        .feature_number
        .or(licenses.first_feature_number)
        .ok_or(CheckError::NoFeature)?;

    let mut feature = gateway.feature(feature_number);
    info!("Try login feature {}", feature.number());
    handle(
        "login",
        feature.login(&settings.vendor_codes, &settings.visibility),
    )?;

    info!("Get feature {feature_number} info");
    let info = handle("info", feature.info())?;
    info!("FEATURE INFO:");
    let feature_info = license_inspector::summarize_single(&info)?;
    log_summary(&feature_info);

    info!("Check feature");
    handle("check", feature.check(None))?;

    let mut data: [u8; 16] = std::array::from_fn(|i| i as u8 + 1);
    round_trip(&mut feature, &mut data, EncryptMode::ECB, "Decryption")?;
    round_trip(
        &mut feature,
        &mut data,
        EncryptMode::NO_COUNTER_DECREMENT | EncryptMode::ECB,
        "Unlimited decryption",
    )?;

    info!("Sign data");
    let message = [0; MESSAGE_SIZE];
    let signature = handle("sign", feature.sign(&message))?;

    info!("Get feature rest of the lifetime");
    let remaining_time = handle_optional("time_limit", feature.time_limit())?;
    if let Some(remaining_time) = remaining_time {
        info!("Remaining time: {remaining_time}");
    }

    info!("Get feature rest of the run counter value");
    let run_counter = handle_optional("run_counter", feature.run_counter())?;
    if let Some(run_counter) = run_counter {
        info!("Run counter value: {run_counter}");
    }

    info!("Get time from real clock");
    let real_time = handle("real_time", feature.real_time())?;
    info!("Current time: {real_time}");

    info!("Get feature max concurrent resource value");
    let max_concurrent_resource = handle(
        "max_concurrent_resource",
        feature.max_concurrent_resource(),
    )?;
    info!("Feature max concurrent resource value: {max_concurrent_resource}");

    info!("Logout from feature {feature_number}");
    handle("logout", feature.logout())?;

    Ok(CheckReport {
        api_version,
        licenses,
        feature_number,
        feature_info,
        signature,
        remaining_time,
        run_counter,
        real_time,
        max_concurrent_resource,
    })
}

/// Run the check and sort the result into an [`Outcome`], logging any failure.
pub fn check_license(gateway: &impl Gateway, settings: &Settings) -> Outcome {
    info!("Checking license");
    match run_check(gateway, settings) {
        Ok(report) => {
            info!("License check passed");
            Outcome::Passed(Box::new(report))
        }
        Err(e @ CheckError::Gateway { .. }) => {
            error!("License check aborted: {e}");
            Outcome::Fatal(e)
        }
        Err(e) => {
            error!("License check failed: {e}");
            Outcome::Failed(e)
        }
    }
}
