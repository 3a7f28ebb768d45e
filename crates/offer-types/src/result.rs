/// Outcome of one assembly run.
///
/// Warnings and errors never abort the run; they travel alongside the
/// best-effort document so the UI can show what was skipped and why.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AssemblyResult {
    #[serde(skip)]
    pub document_bytes: Vec<u8>,
    pub page_count: u32,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// Page-break decisions taken while composing generated sections
    #[serde(default)]
    pub protection_log: Vec<ProtectionLogEntry>,
}

impl AssemblyResult {
    /// Result for a run that could not produce a document at all
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    pub fn has_document(&self) -> bool {
        !self.document_bytes.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionAction {
    Placed,
    PageBreak,
    OverflowWarning,
}

impl ProtectionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtectionAction::Placed => "placed",
            ProtectionAction::PageBreak => "page_break",
            ProtectionAction::OverflowWarning => "overflow_warning",
        }
    }
}

/// One placement decision taken by the page protection logic.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProtectionLogEntry {
    pub page_number: u32, // 1-based, relative to the generated section
    pub action: ProtectionAction,
    pub group_description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_has_no_document() {
        let result = AssemblyResult::failed("base document unreadable");
        assert!(!result.has_document());
        assert_eq!(result.errors, vec!["base document unreadable".to_string()]);
        assert!(!result.is_clean());
    }

    #[test]
    fn document_bytes_are_not_serialized() {
        let result = AssemblyResult {
            document_bytes: b"%PDF-1.7".to_vec(),
            page_count: 3,
            ..AssemblyResult::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("document_bytes").is_none());
        assert_eq!(json["page_count"], 3);
    }
}
