use thiserror::Error;

/// Fatal and collected-property error kinds produced by the translator.
///
/// Every variant here is one a caller outside this crate can match on
/// directly; `Props` carries the full set of JSON-Pointer paths collected
/// during one conversion rather than failing on the first one.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("no callback available to complete the conversion")]
    Callback,

    #[error("memory allocation failed")]
    Memory,

    #[error("iCal library error: {0}")]
    Ical(String),

    #[error("{} invalid propert{}", .0.len(), if .0.len() == 1 { "y" } else { "ies" })]
    Props(Vec<String>),

    #[error("jsEvent.uid is missing or empty")]
    UidMissing,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ConversionError {
    /// Diagnostic string for an error kind, independent of any instance's payload.
    pub fn strerror(&self) -> String {
        match self {
            ConversionError::Callback => "callback error".to_string(),
            ConversionError::Memory => "memory error".to_string(),
            ConversionError::Ical(_) => "iCal library error".to_string(),
            ConversionError::Props(paths) => {
                format!("invalid properties: {}", paths.join(", "))
            }
            ConversionError::UidMissing => "uid missing".to_string(),
            ConversionError::Unknown(_) => "unknown error".to_string(),
        }
    }
}

pub type ConversionResult<T> = Result<T, ConversionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn props_error_reports_all_paths() {
        let err = ConversionError::Props(vec!["/start".to_string(), "/duration".to_string()]);
        assert_eq!(err.strerror(), "invalid properties: /start, /duration");
    }

    #[test]
    fn uid_missing_has_stable_message() {
        let err = ConversionError::UidMissing;
        assert_eq!(err.to_string(), "jsEvent.uid is missing or empty");
    }
}
