use std::fmt;

/// One line of a license summary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    LicenseBroken {
        license_id: String,
    },
    Dongle {
        dongle_id: String,
        dongle_model: String,
        public_code: String,
    },
    License {
        license_id: String,
        vendor_public_code: String,
        vendor_company_name: String,
        products_count: String,
    },
    Product {
        name: String,
        number: String,
        modification: String,
        features_count: String,
    },
    Feature {
        name: String,
        number: u32,
        rest_of_life_time: Option<String>,
    },
}

impl Event {
    /// Nesting level, for callers that want to indent products and features.
    pub fn depth(&self) -> usize {
        match self {
            Self::LicenseBroken { .. } | Self::Dongle { .. } | Self::License { .. } => 0,
            Self::Product { .. } => 1,
            Self::Feature { .. } => 2,
        }
    }

    /// The event as key value pairs, using the field names of the license documents.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::LicenseBroken { license_id } => vec![("licenseId", license_id.clone())],
            Self::Dongle {
                dongle_id,
                dongle_model,
                public_code,
            } => vec![
                ("dongleId", dongle_id.clone()),
                ("dongleModel", dongle_model.clone()),
                ("publicCode", public_code.clone()),
            ],
            Self::License {
                license_id,
                vendor_public_code,
                vendor_company_name,
                products_count,
            } => vec![
                ("licenseId", license_id.clone()),
                ("vendorPublicCode", vendor_public_code.clone()),
                ("vendorCompanyName", vendor_company_name.clone()),
                ("productsCount", products_count.clone()),
            ],
            Self::Product {
                name,
                number,
                modification,
                features_count,
            } => vec![
                ("name", name.clone()),
                ("number", number.clone()),
                ("modification", modification.clone()),
                ("featuresCount", features_count.clone()),
            ],
            Self::Feature {
                name,
                number,
                rest_of_life_time,
            } => {
                let mut fields = vec![("name", name.clone()), ("number", number.to_string())];
                if let Some(rest) = rest_of_life_time {
                    fields.push(("restOfLifeTime", rest.clone()));
                }
                fields
            }
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LicenseBroken { license_id } => write!(f, "License {license_id} in DL is broken"),
            Self::Dongle {
                dongle_id,
                dongle_model,
                public_code,
            } => write!(
                f,
                "Hardware dongle without license. Dongle: ID {dongle_id}. Model: {dongle_model}. Vendor public code: {public_code}"
            ),
            Self::License {
                license_id,
                vendor_public_code,
                vendor_company_name,
                products_count,
            } => write!(
                f,
                "License {license_id} vendor public {vendor_public_code} vendor company {vendor_company_name} products count {products_count}"
            ),
            Self::Product {
                name,
                number,
                modification,
                features_count,
            } => write!(
                f,
                "Product {name} with number {number} [modification {modification}] with {features_count} features"
            ),
            Self::Feature { name, number, .. } => write!(f, "Feature {name} with number {number}"),
        }
    }
}
