use serde::Serialize;

/// Currency and dialing details that follow from the region a lead declares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RegionProfile {
    pub name: &'static str,
    pub currency: &'static str,
    pub calling_code: &'static str,
}

const REGIONS: &[RegionProfile] = &[
    RegionProfile { name: "India", currency: "INR", calling_code: "+91" },
    RegionProfile { name: "United States", currency: "USD", calling_code: "+1" },
    RegionProfile { name: "United Kingdom", currency: "GBP", calling_code: "+44" },
    RegionProfile { name: "United Arab Emirates", currency: "AED", calling_code: "+971" },
    RegionProfile { name: "Canada", currency: "CAD", calling_code: "+1" },
    RegionProfile { name: "Australia", currency: "AUD", calling_code: "+61" },
    RegionProfile { name: "Singapore", currency: "SGD", calling_code: "+65" },
    RegionProfile { name: "Germany", currency: "EUR", calling_code: "+49" },
];

pub fn supported_regions() -> &'static [RegionProfile] {
    REGIONS
}

/// Looks up a region by display name, ignoring case and surrounding whitespace.
pub fn region_profile(name: &str) -> Option<&'static RegionProfile> {
    let needle = name.trim();
    if needle.is_empty() {
        return None;
    }
    REGIONS.iter().find(|profile| profile.name.eq_ignore_ascii_case(needle))
}

impl RegionProfile {
    /// Calling code without the leading `+`.
    pub fn calling_digits(&self) -> &'static str {
        self.calling_code.trim_start_matches('+')
    }

    /// Strips a leading calling-code prefix, and the whitespace after it, from a phone entry.
    ///
    /// The prefix is recognised with or without `+`, and only when the remainder is
    /// still long enough to be a local number, so `919876543210` entered for India
    /// becomes `9876543210` while a bare `9123456` stays untouched. Any other
    /// character is left in place for the digit check to reject.
    pub fn local_number<'a>(&self, raw: &'a str) -> &'a str {
        let entry = raw.trim();

        if let Some(rest) = entry.strip_prefix(self.calling_code) {
            return rest.trim_start();
        }

        if let Some(rest) = entry.strip_prefix(self.calling_digits()) {
            let rest = rest.trim_start();
            if rest.len() >= 10 {
                return rest;
            }
        }

        entry
    }

    /// Phone number in the form the backend stores: `+91 9876543210`.
    pub fn compose_phone(&self, local_number: &str) -> String {
        format!("{} {}", self.calling_code, local_number)
    }
}

#[cfg(test)]
mod tests {
    use super::{region_profile, supported_regions};

    #[test]
    fn lookup_is_case_insensitive_and_trimmed() {
        let india = region_profile("  india ").expect("india is supported");
        assert_eq!(india.currency, "INR");
        assert_eq!(india.calling_code, "+91");
        assert!(region_profile("Atlantis").is_none());
        assert!(region_profile("   ").is_none());
    }

    #[test]
    fn repeated_lookups_return_identical_profiles() {
        for profile in supported_regions() {
            let first = region_profile(profile.name).copied();
            let second = region_profile(profile.name).copied();
            assert_eq!(first, second);
            assert_eq!(first, Some(*profile));
        }
    }

    #[test]
    fn local_number_strips_only_the_calling_code_prefix() {
        let india = region_profile("India").expect("india");
        assert_eq!(india.local_number(" +91 9876543210 "), "9876543210");
        assert_eq!(india.local_number("+91 98765-43210"), "98765-43210");
        assert_eq!(india.local_number("(98765) 43210"), "(98765) 43210");
        assert_eq!(india.local_number("919876543210"), "9876543210");
        assert_eq!(india.local_number("9123456"), "9123456");
        assert_eq!(india.compose_phone("9876543210"), "+91 9876543210");
    }
}
