//! Per-request identity.

use ::sparkwrap_client::Credentials;

/// Identity of the caller a request is handled for, passed explicitly to
/// every orchestrator operation.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Kerberos principal the job should run as, when the caller has one.
    pub principal: Option<String>,
    /// Credentials forwarded to the gateways.
    pub credentials: Option<Credentials>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}
