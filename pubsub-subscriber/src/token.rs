//! Verification token generation.

use rand::Rng;

use crate::types::SubscriptionId;

/// Number of random bytes per token (256 bits).
const TOKEN_BYTES: usize = 32;

/// Produces the `hub.verify_token` sent with each hub request.
///
/// Tokens are random and hex encoded. A fixed token can be injected for
/// test harnesses, but that constructor only exists under `cfg(test)` or
/// the `test-support` feature.
#[derive(Debug, Clone, Default)]
pub struct TokenGenerator {
    fixed: Option<String>,
}

impl TokenGenerator {
    /// Generator producing fresh random tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator that always returns `token`.
    #[cfg(any(test, feature = "test-support"))]
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            fixed: Some(token.into()),
        }
    }

    /// Generate a token for the given subscription.
    pub fn generate(&self, subscription_id: &SubscriptionId) -> String {
        if let Some(token) = &self.fixed {
            return token.clone();
        }

        let bytes: [u8; TOKEN_BYTES] = rand::rng().random();
        tracing::trace!(%subscription_id, "generated verify token");
        hex::encode(bytes)
    }
}
