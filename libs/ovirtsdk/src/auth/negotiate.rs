use async_trait::async_trait;

/// Boxed error returned by a [`NegotiateProvider`].
pub type NegotiateError = Box<dyn std::error::Error + Send + Sync>;

/// Source of SPNEGO initial context tokens for Kerberos authentication.
///
/// The GSSAPI binding lives outside this crate; implement this trait on top
/// of it. The token is sent to the SSO service as
/// `Authorization: Negotiate <base64>`.
#[async_trait]
pub trait NegotiateProvider: Send + Sync {
    /// Produce the initial context token for the service at `target`
    /// (the SSO token URL).
    ///
    /// # Errors
    /// Returns an error when no Kerberos ticket is available or the GSSAPI
    /// call fails.
    async fn initial_token(&self, target: &str) -> Result<Vec<u8>, NegotiateError>;
}
