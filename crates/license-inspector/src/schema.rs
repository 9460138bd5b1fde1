//! Typed view of the license documents returned by the licensing backend.
//!
//! Records are decoded lazily: [`LicenseRecord`] keeps its sections as raw JSON until they
//! are asked for, because a broken record makes no promises about the shape of anything but
//! `isBroken` and `licenseId`.
use std::fmt;

use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;

use crate::Error;

/// A display-only value that the backend may send as a string, number or bool.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct Scalar(String);

impl TryFrom<Value> for Scalar {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            Value::Bool(b) => Ok(Self(b.to_string())),
            other => Err(format!("expected a scalar but got {other}")),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        value.0
    }
}

fn feature_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| D::Error::custom(format!("invalid feature number {n}"))),
        Value::String(s) => s.trim().parse().map_err(D::Error::custom),
        other => Err(D::Error::custom(format!(
            "expected a feature number but got {other}"
        ))),
    }
}

/// The document returned when enumerating licenses.
#[derive(Debug, Default, Deserialize)]
pub struct LicenseEnumeration {
    #[serde(default)]
    pub licenses: Option<Vec<LicenseRecord>>,
}

/// One license, or one dongle without a license.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    #[serde(default)]
    license_id: Option<Value>,
    #[serde(default)]
    is_broken: Option<Value>,
    #[serde(default)]
    dongle_info: Option<Value>,
    #[serde(default)]
    license_info: Option<Value>,
}

impl LicenseRecord {
    /// Identifier of the record, rendered for display.
    pub fn license_id(&self) -> Option<String> {
        let value = self.license_id.as_ref()?;
        Some(match Scalar::try_from(value.clone()) {
            Ok(scalar) => scalar.into(),
            Err(_) => value.to_string(),
        })
    }

    /// Accepts `true`/`false` as well as `1`/`0`.
    pub fn is_broken(&self) -> Result<bool, Error> {
        match self.is_broken.as_ref().ok_or(Error::MissingField("isBroken"))? {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
            Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
            Value::String(s) if s.trim() == "0" => Ok(false),
            Value::String(s) if s.trim() == "1" => Ok(true),
            other => Err(Error::InvalidField {
                field: "isBroken",
                value: other.to_string(),
            }),
        }
    }

    pub fn dongle_info(&self) -> Result<Option<DongleInfo>, Error> {
        match &self.dongle_info {
            None => Ok(None),
            Some(value) => Ok(Some(DongleInfo::deserialize(value)?)),
        }
    }

    /// The license section, or `None` if it is absent or has no content.
    pub fn license_info(&self) -> Result<Option<LicenseInfo>, Error> {
        match &self.license_info {
            None => Ok(None),
            Some(Value::Object(map)) if map.is_empty() => Ok(None),
            Some(Value::Array(items)) if items.is_empty() => Ok(None),
            Some(value) => Ok(Some(LicenseInfo::deserialize(value)?)),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DongleInfo {
    pub dongle_id: Scalar,
    pub dongle_model: Scalar,
    pub public_code: Scalar,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseInfo {
    pub license_id: Scalar,
    pub vendor_public_code: Scalar,
    pub vendor_company_name: Scalar,
    pub products_count: Scalar,
    #[serde(default)]
    pub products: Vec<Product>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub name: Scalar,
    pub number: Scalar,
    pub modification: Scalar,
    pub features_count: Scalar,
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub name: Scalar,
    #[serde(deserialize_with = "feature_number")]
    pub number: u32,
    /// Not validated; kept for display.
    #[serde(default)]
    pub rest_of_life_time: Option<Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> LicenseRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn scalars_accept_strings_numbers_and_bools() {
        let scalars: Vec<Scalar> = serde_json::from_value(json!(["a", 7, 1.5, true])).unwrap();
        let rendered: Vec<String> = scalars.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["a", "7", "1.5", "true"]);
        assert!(serde_json::from_value::<Scalar>(json!({"a": 1})).is_err());
        assert!(serde_json::from_value::<Scalar>(Value::Null).is_err());
    }

    #[test]
    fn feature_numbers_may_be_strings() {
        let feature: Feature = serde_json::from_value(json!({"name": "f", "number": " 12 "})).unwrap();
        assert_eq!(feature.number, 12);
        assert!(serde_json::from_value::<Feature>(json!({"name": "f", "number": -1})).is_err());
        assert!(serde_json::from_value::<Feature>(json!({"name": "f", "number": "x"})).is_err());
        assert!(serde_json::from_value::<Feature>(json!({"name": "f"})).is_err());
    }

    #[test]
    fn is_broken_accepts_bools_and_bits() {
        assert!(record(json!({"isBroken": true})).is_broken().unwrap());
        assert!(record(json!({"isBroken": 1})).is_broken().unwrap());
        assert!(!record(json!({"isBroken": 0})).is_broken().unwrap());
        assert!(record(json!({"isBroken": "1"})).is_broken().unwrap());
        assert!(!record(json!({"isBroken": " 0 "})).is_broken().unwrap());
        assert!(matches!(
            record(json!({"isBroken": "yes"})).is_broken(),
            Err(Error::InvalidField { field: "isBroken", .. })
        ));
        assert!(matches!(
            record(json!({"isBroken": 2})).is_broken(),
            Err(Error::InvalidField { field: "isBroken", .. })
        ));
        assert!(matches!(
            record(json!({})).is_broken(),
            Err(Error::MissingField("isBroken"))
        ));
    }

    #[test]
    fn empty_license_info_counts_as_absent() {
        assert!(record(json!({"licenseInfo": {}})).license_info().unwrap().is_none());
        assert!(record(json!({"licenseInfo": null})).license_info().unwrap().is_none());
        assert!(record(json!({"licenseInfo": []})).license_info().unwrap().is_none());
        assert!(record(json!({})).license_info().unwrap().is_none());
    }

    #[test]
    fn malformed_sections_fail_only_when_read() {
        let record = record(json!({"isBroken": true, "licenseInfo": "garbage"}));
        assert!(record.is_broken().unwrap());
        assert!(matches!(record.license_info(), Err(Error::Parse(_))));
    }

    #[test]
    fn license_id_renders_any_json() {
        assert_eq!(record(json!({"licenseId": 5})).license_id().as_deref(), Some("5"));
        assert_eq!(record(json!({"licenseId": "X"})).license_id().as_deref(), Some("X"));
        assert_eq!(record(json!({"licenseId": [1]})).license_id().as_deref(), Some("[1]"));
        assert_eq!(record(json!({})).license_id(), None);
    }
}
