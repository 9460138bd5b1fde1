//! Human readable summaries of the license documents returned by a licensing backend.
//!
//! The summaries are plain values; nothing in this crate logs or performs I/O. Callers
//! decide how to emit each [`Event`] and what to do with the first feature number found.
//!
//! ```
//! let payload = r#"{"licenses": [{"licenseId": "7", "isBroken": true}]}"#;
//! let summary = license_inspector::summarize_enumeration(Some(payload)).unwrap();
//! assert_eq!(summary.records[0].to_string(), "License 7 in DL is broken");
//! assert_eq!(summary.first_feature_number, None);
//! ```

pub use event::Event;
use schema::{LicenseEnumeration, LicenseRecord};

mod event;
pub mod schema;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not parse license document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("missing mandatory field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` has invalid value {value}")]
    InvalidField { field: &'static str, value: String },
}

/// The events describing a document and the first feature number it mentions.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    pub records: Vec<Event>,
    pub first_feature_number: Option<u32>,
}

impl Summary {
    /// Append `other`, keeping our feature number if we already have one.
    pub fn merge(&mut self, other: Summary) {
        self.records.extend(other.records);
        self.first_feature_number = self.first_feature_number.or(other.first_feature_number);
    }

    fn push(&mut self, event: Event) {
        if let Event::Feature { number, .. } = &event {
            self.first_feature_number.get_or_insert(*number);
        }
        self.records.push(event);
    }
}

/// Summarize a license enumeration document.
///
/// `None` and a document without `licenses` both summarize to nothing.
pub fn summarize_enumeration(payload: Option<&str>) -> Result<Summary, Error> {
    let Some(payload) = payload else {
        return Ok(Summary::default());
    };
    let document: LicenseEnumeration = serde_json::from_str(payload)?;
    let mut summary = Summary::default();
    for record in document.licenses.iter().flatten() {
        summary.merge(summarize_record(record)?);
    }
    Ok(summary)
}

/// Summarize a single license record, such as the info document of a feature.
pub fn summarize_single(payload: &str) -> Result<Summary, Error> {
    let record: LicenseRecord = serde_json::from_str(payload)?;
    summarize_record(&record)
}

pub fn summarize_record(record: &LicenseRecord) -> Result<Summary, Error> {
    let mut summary = Summary::default();

    if record.is_broken()? {
        let license_id = record
            .license_id()
            .unwrap_or_else(|| "<unknown>".to_string());
        summary.push(Event::LicenseBroken { license_id });
        return Ok(summary);
    }

    let Some(license) = record.license_info()? else {
        let dongle = record
            .dongle_info()?
            .ok_or(Error::MissingField("dongleInfo"))?;
        summary.push(Event::Dongle {
            dongle_id: dongle.dongle_id.into(),
            dongle_model: dongle.dongle_model.into(),
            public_code: dongle.public_code.into(),
        });
        return Ok(summary);
    };

    summary.push(Event::License {
        license_id: license.license_id.into(),
        vendor_public_code: license.vendor_public_code.into(),
        vendor_company_name: license.vendor_company_name.into(),
        products_count: license.products_count.into(),
    });
    for product in license.products {
        summary.push(Event::Product {
            name: product.name.into(),
            number: product.number.into(),
            modification: product.modification.into(),
            features_count: product.features_count.into(),
        });
        for feature in product.features {
            summary.push(Event::Feature {
                name: feature.name.into(),
                number: feature.number,
                rest_of_life_time: feature.rest_of_life_time.map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
            });
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn feature(name: &str, number: u32) -> Value {
        json!({"name": name, "number": number, "restOfLifeTime": 0})
    }

    fn product(features: Vec<Value>) -> Value {
        json!({
            "name": "Product",
            "number": 1,
            "modification": 0,
            "featuresCount": features.len(),
            "features": features,
        })
    }

    fn licensed(license_id: u32, products: Vec<Value>) -> Value {
        json!({
            "licenseId": license_id.to_string(),
            "isBroken": false,
            "dongleInfo": {"dongleId": 1, "dongleModel": 0x80, "publicCode": 2},
            "licenseInfo": {
                "licenseId": license_id,
                "vendorPublicCode": 2,
                "vendorCompanyName": "ACME",
                "productsCount": products.len(),
                "products": products,
            },
        })
    }

    fn enumerate(records: Vec<Value>) -> Summary {
        let payload = json!({ "licenses": records }).to_string();
        summarize_enumeration(Some(&payload)).unwrap()
    }

    fn count_depth(summary: &Summary, depth: usize) -> usize {
        summary.records.iter().filter(|e| e.depth() == depth).count()
    }

    #[test]
    fn missing_payload_is_a_no_op() {
        assert_eq!(summarize_enumeration(None).unwrap(), Summary::default());
    }

    #[test]
    fn missing_licenses_collection_is_a_no_op() {
        assert_eq!(
            summarize_enumeration(Some(r#"{"other": 1}"#)).unwrap(),
            Summary::default()
        );
        assert_eq!(
            summarize_enumeration(Some(r#"{"licenses": null}"#)).unwrap(),
            Summary::default()
        );
    }

    #[test]
    fn empty_enumeration_yields_nothing() {
        let summary = enumerate(vec![]);
        assert_eq!(summary.first_feature_number, None);
        assert_eq!(count_depth(&summary, 1), 0);
        assert_eq!(count_depth(&summary, 2), 0);
    }

    #[test]
    fn broken_record_reads_nothing_else() {
        let summary = enumerate(vec![json!({"licenseId": "L1", "isBroken": true})]);
        assert_eq!(
            summary.records,
            vec![Event::LicenseBroken {
                license_id: "L1".to_string()
            }]
        );
        assert_eq!(summary.first_feature_number, None);

        let summary = enumerate(vec![json!({
            "isBroken": 1,
            "dongleInfo": 17,
            "licenseInfo": {"products": "not a list"},
        })]);
        assert_eq!(summary.records.len(), 1);
        assert_eq!(summary.records[0].to_string(), "License <unknown> in DL is broken");
    }

    #[test]
    fn dongle_without_license_reports_dongle() {
        let summary = enumerate(vec![json!({
            "licenseId": "D",
            "isBroken": false,
            "dongleInfo": {"dongleId": "0B1E5A70", "dongleModel": 128, "publicCode": 99},
            "licenseInfo": {},
        })]);
        assert_eq!(
            summary.records,
            vec![Event::Dongle {
                dongle_id: "0B1E5A70".to_string(),
                dongle_model: "128".to_string(),
                public_code: "99".to_string(),
            }]
        );
        assert_eq!(
            summary.records[0].to_string(),
            "Hardware dongle without license. Dongle: ID 0B1E5A70. Model: 128. Vendor public code: 99"
        );
        assert_eq!(summary.first_feature_number, None);
    }

    #[test]
    fn empty_license_list_and_text_flag_take_dongle_branch() {
        let summary = enumerate(vec![json!({
            "isBroken": "0",
            "dongleInfo": {"dongleId": "0B1E5A70", "dongleModel": 128, "publicCode": 99},
            "licenseInfo": [],
        })]);
        assert_eq!(summary.records.len(), 1);
        assert!(matches!(summary.records[0], Event::Dongle { .. }));
        assert_eq!(summary.first_feature_number, None);
    }

    #[test]
    fn record_needs_license_or_dongle() {
        let payload = json!({"licenses": [{"isBroken": false}]}).to_string();
        assert!(matches!(
            summarize_enumeration(Some(&payload)),
            Err(Error::MissingField("dongleInfo"))
        ));
    }

    #[test]
    fn missing_is_broken_is_an_error() {
        let payload = json!({"licenses": [{"licenseId": "x"}]}).to_string();
        assert!(matches!(
            summarize_enumeration(Some(&payload)),
            Err(Error::MissingField("isBroken"))
        ));
    }

    #[test]
    fn unparsable_documents_are_errors() {
        assert!(matches!(
            summarize_enumeration(Some("{not json")),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            summarize_enumeration(Some(r#"{"licenses": 3}"#)),
            Err(Error::Parse(_))
        ));
        assert!(matches!(summarize_single("42"), Err(Error::Parse(_))));
    }

    #[test]
    fn first_feature_wins_across_products() {
        let summary = enumerate(vec![licensed(
            1,
            vec![product(vec![]), product(vec![feature("answer", 42)])],
        )]);
        assert_eq!(summary.first_feature_number, Some(42));
        assert_eq!(count_depth(&summary, 1), 2);
    }

    #[test]
    fn first_feature_wins_within_a_product() {
        let summary = enumerate(vec![licensed(
            1,
            vec![product(vec![feature("a", 3), feature("b", 4)])],
        )]);
        assert_eq!(summary.first_feature_number, Some(3));
        assert_eq!(count_depth(&summary, 2), 2);
    }

    #[test]
    fn first_feature_wins_across_records() {
        let summary = enumerate(vec![
            licensed(1, vec![product(vec![feature("seven", 7)])]),
            licensed(2, vec![product(vec![feature("eight", 8)])]),
        ]);
        assert_eq!(summary.first_feature_number, Some(7));
        assert_eq!(count_depth(&summary, 0), 2);
        assert_eq!(count_depth(&summary, 2), 2);
    }

    #[test]
    fn records_without_features_do_not_hide_later_features() {
        let summary = enumerate(vec![
            json!({"licenseId": "B", "isBroken": true}),
            licensed(1, vec![product(vec![])]),
            licensed(2, vec![product(vec![feature("late", 9)])]),
        ]);
        assert_eq!(summary.first_feature_number, Some(9));
    }

    #[test]
    fn license_lines_follow_document_order() {
        let summary = enumerate(vec![licensed(5, vec![product(vec![feature("f", 1)])])]);
        let lines: Vec<String> = summary.records.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            [
                "License 5 vendor public 2 vendor company ACME products count 1",
                "Product Product with number 1 [modification 0] with 1 features",
                "Feature f with number 1",
            ]
        );
        assert_eq!(
            summary.records[2].fields(),
            vec![
                ("name", "f".to_string()),
                ("number", "1".to_string()),
                ("restOfLifeTime", "0".to_string()),
            ]
        );
    }

    #[test]
    fn single_record_uses_the_same_rules() {
        let payload = licensed(3, vec![product(vec![feature("only", 11)])]).to_string();
        let summary = summarize_single(&payload).unwrap();
        assert_eq!(summary.first_feature_number, Some(11));
        assert_eq!(summary.records.len(), 3);

        let broken = summarize_single(r#"{"isBroken": true}"#).unwrap();
        assert_eq!(broken.records.len(), 1);
    }

    #[test]
    fn merge_keeps_the_first_number() {
        let mut first = Summary {
            records: vec![],
            first_feature_number: Some(1),
        };
        first.merge(Summary {
            records: vec![Event::LicenseBroken {
                license_id: "x".to_string(),
            }],
            first_feature_number: Some(2),
        });
        assert_eq!(first.first_feature_number, Some(1));
        assert_eq!(first.records.len(), 1);

        let mut empty = Summary::default();
        empty.merge(first);
        assert_eq!(empty.first_feature_number, Some(1));
    }
}
