use crate::model::Capability;

const MEDICAL_KEYWORDS: &[&str] = &["medical", "accident", "injury", "collapse"];
const SECURITY_KEYWORDS: &[&str] = &["unrest", "fight", "altercation", "theft", "security"];

/// Responder class required for an incident type, by keyword.
pub fn required_capability(incident_type: &str) -> Option<Capability> {
    let lower = incident_type.to_lowercase();

    if MEDICAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some(Capability::Medical)
    } else if SECURITY_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some(Capability::Security)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_reference_incident_types() {
        assert_eq!(required_capability("Medical"), Some(Capability::Medical));
        assert_eq!(required_capability("Accident"), Some(Capability::Medical));
        assert_eq!(required_capability("Unrest"), Some(Capability::Security));
    }

    #[test]
    fn matching_is_case_insensitive_and_substring() {
        assert_eq!(required_capability("road ACCIDENT near gate"), Some(Capability::Medical));
        assert_eq!(required_capability("Crowd unrest"), Some(Capability::Security));
    }

    #[test]
    fn unknown_type_is_unclassified() {
        assert_eq!(required_capability("Lost child"), None);
    }
}
