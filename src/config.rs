//! Ambient configuration for a translation run.

/// The one piece of external configuration this translator needs: the
/// calendar user whose address is attached to synthesized `ATTENDEE`
/// properties on outgoing email alerts (§4.6).
#[derive(Debug, Clone, Default)]
pub struct TranslatorConfig {
    pub calendar_user_address: Option<String>,
}

impl TranslatorConfig {
    pub fn new(calendar_user_address: impl Into<String>) -> Self {
        Self {
            calendar_user_address: Some(calendar_user_address.into()),
        }
    }
}
