//! The interface that applications program against.
use crate::{ApiVersion, EncryptMode, Error, Status, VendorCodes, Visibility, MESSAGE_SIZE};

/// Queries that do not require a login.
pub trait Gateway {
    type Feature: Feature;

    fn api_version(&self) -> Result<ApiVersion, Error>;

    /// Return a JSON document describing every license visible through `visibility`.
    ///
    /// `selector` narrows the result further; its syntax is backend specific.
    fn license_info(&self, visibility: &Visibility, selector: Option<&str>)
        -> Result<String, Error>;

    /// Return a handle to feature `number`.
    ///
    /// Creating the handle does not contact the backend; [`Feature::login`] does.
    fn feature(&self, number: u32) -> Self::Feature;
}

/// Operations on a single licensed feature.
///
/// All operations except [`Feature::login`] require an active login.
pub trait Feature {
    fn number(&self) -> u32;

    fn login(&mut self, vendor_codes: &VendorCodes, visibility: &Visibility) -> Status;

    /// Return a JSON document describing the license that grants this feature.
    fn info(&mut self) -> Result<String, Error>;

    fn check(&mut self, policy: Option<&str>) -> Status;

    /// Encrypt `data` in place.
    fn encrypt(&mut self, data: &mut [u8], mode: EncryptMode, key: Option<&[u8]>) -> Status;

    /// Decrypt `data` in place.
    fn decrypt(&mut self, data: &mut [u8], mode: EncryptMode, key: Option<&[u8]>) -> Status;

    fn sign(&mut self, message: &[u8; MESSAGE_SIZE]) -> Result<Vec<u8>, Error>;

    /// Remaining lifetime in seconds.
    ///
    /// Fails with [`Error::NoService`] if the feature has no time limit.
    fn time_limit(&mut self) -> Result<i64, Error>;

    /// Remaining runs.
    ///
    /// Fails with [`Error::NoService`] if the feature has no run counter.
    fn run_counter(&mut self) -> Result<u32, Error>;

    /// Seconds since the Unix epoch according to the dongle clock.
    fn real_time(&mut self) -> Result<i64, Error>;

    fn max_concurrent_resource(&mut self) -> Result<u32, Error>;

    fn logout(&mut self) -> Status;
}
