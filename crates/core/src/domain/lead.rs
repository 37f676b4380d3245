use serde::{Deserialize, Serialize};

use crate::domain::region::RegionProfile;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contact details as entered on the intake form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFields {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub consent: bool,
}

/// Body of `POST /lead`: the validated fields with the phone number composed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSubmission {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub consent: bool,
}

impl LeadSubmission {
    pub fn compose(fields: &LeadFields, region: &RegionProfile) -> Self {
        let local = region.local_number(&fields.phone);
        Self {
            name: fields.name.trim().to_string(),
            email: fields.email.trim().to_string(),
            phone: region.compose_phone(local),
            company: non_blank(fields.company.as_deref()),
            region: region.name.to_string(),
            service: non_blank(fields.service.as_deref()),
            message: non_blank(fields.message.as_deref()),
            consent: fields.consent,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use crate::domain::region::region_profile;

    use super::{LeadFields, LeadSubmission};

    #[test]
    fn submission_composes_phone_and_drops_blank_optionals() {
        let fields = LeadFields {
            region: "india".to_string(),
            name: " Asha ".to_string(),
            email: "asha@example.com".to_string(),
            phone: "+91 9876543210".to_string(),
            company: Some("  ".to_string()),
            service: Some("SEO".to_string()),
            message: None,
            consent: true,
        };
        let region = region_profile(&fields.region).expect("india");

        let submission = LeadSubmission::compose(&fields, region);

        assert_eq!(submission.phone, "+91 9876543210");
        assert_eq!(submission.name, "Asha");
        assert_eq!(submission.region, "India");
        assert_eq!(submission.company, None);
        assert_eq!(submission.service.as_deref(), Some("SEO"));

        let body = serde_json::to_value(&submission).expect("serialize");
        assert!(body.get("company").is_none());
        assert_eq!(body["consent"], true);
    }
}
