use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId(pub String);

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A purchasable offering as returned by the catalog. Never mutated client-side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    #[serde(alias = "_id")]
    pub id: PackageId,
    pub name: String,
    #[serde(default)]
    pub tier: String,
    #[serde(default, alias = "service")]
    pub service_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default, alias = "isPopular")]
    pub popular: bool,
    pub price: Decimal,
    pub currency: String,
    #[serde(default)]
    pub display_price: String,
    #[serde(default)]
    pub region: Option<String>,
}

impl Package {
    /// Label shown in the checkout widget, e.g. `SEO Growth (Premium)`.
    pub fn checkout_label(&self) -> String {
        if self.tier.trim().is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.tier)
        }
    }

    /// False only when the catalog echoed a region that disagrees with the requested one.
    pub fn matches_region(&self, region: &str) -> bool {
        match &self.region {
            Some(own) => own.trim().eq_ignore_ascii_case(region.trim()),
            None => true,
        }
    }
}

/// Filters for `GET /packages`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageQuery {
    pub service: Option<String>,
    pub region: Option<String>,
}

impl PackageQuery {
    pub fn new(service: Option<&str>, region: Option<&str>) -> Self {
        let clean = |value: Option<&str>| {
            value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
        };
        Self { service: clean(service), region: clean(region) }
    }
}
