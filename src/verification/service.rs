//! Verification code issuance and checking.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::code::{CodeGenerator, RandomCodeGenerator};
use crate::cache::{keys, Cache};
use crate::config::VerificationConfig;
use crate::mail::{EmailBody, Mailer, OutboundEmail};
use crate::{RelayError, Result};

/// Issues and checks one-time verification codes.
pub struct VerificationService {
    cache: Arc<dyn Cache>,
    mailer: Arc<dyn Mailer>,
    generator: Arc<dyn CodeGenerator>,
    service_name: String,
    from: String,
    ttl: Duration,
    max_attempts: u32,
}

impl VerificationService {
    pub fn new(
        cache: Arc<dyn Cache>,
        mailer: Arc<dyn Mailer>,
        service_name: impl Into<String>,
        from: impl Into<String>,
        config: &VerificationConfig,
    ) -> Self {
        Self {
            cache,
            mailer,
            generator: Arc::new(RandomCodeGenerator),
            service_name: service_name.into(),
            from: from.into(),
            ttl: config.code_ttl(),
            max_attempts: config.max_attempts,
        }
    }

    /// Replace the code generator.
    pub fn with_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Code lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a new code to `identity` and mail it.
    ///
    /// Any previous code is replaced and the attempt counter reset. The
    /// returned code is for the calling context only.
    pub async fn send_code(&self, identity: &str) -> Result<String> {
        let identity = normalize_identity(identity);
        let code = self.generator.generate();

        self.cache
            .set(&keys::verification_code(&identity), &code, Some(self.ttl))
            .await?;
        self.cache
            .set(&keys::verification_attempt(&identity), "0", Some(self.ttl))
            .await?;

        let email = verification_email(
            &self.service_name,
            &self.from,
            &identity,
            &code,
            self.ttl,
        );
        self.mailer.send(&email).await?;

        info!(identity = %identity, "Verification code sent");
        Ok(code)
    }

    /// Check `candidate` against the active code for `identity`.
    ///
    /// A correct code is consumed. A wrong code counts as one attempt.
    ///
    /// # Errors
    ///
    /// - `TooManyAttempts` once `max_attempts` wrong codes were presented,
    ///   checked before the stored code is read
    /// - `InvalidCode` if the code is wrong, expired or was never issued
    pub async fn verify_code(&self, identity: &str, candidate: &str) -> Result<()> {
        let identity = normalize_identity(identity);
        let code_key = keys::verification_code(&identity);
        let attempt_key = keys::verification_attempt(&identity);

        let attempts = self.attempts(&attempt_key).await?;
        if attempts >= i64::from(self.max_attempts) {
            warn!(
                identity = %identity,
                attempts,
                "Verification rejected: too many attempts"
            );
            return Err(RelayError::TooManyAttempts);
        }

        let Some(stored) = self.cache.get(&code_key).await? else {
            warn!(identity = %identity, "Verification rejected: no active code");
            return Err(RelayError::InvalidCode);
        };

        if stored != candidate.trim() {
            let attempts = self.cache.increment(&attempt_key).await?;
            if attempts == 1 {
                // The counter expired before the code; bound it to the code's lifetime.
                self.cache.expire(&attempt_key, self.ttl).await?;
            }
            warn!(
                identity = %identity,
                attempts,
                "Verification rejected: wrong code"
            );
            return Err(RelayError::InvalidCode);
        }

        self.cache.delete(&code_key).await?;
        self.cache.delete(&attempt_key).await?;
        info!(identity = %identity, "Verification succeeded");
        Ok(())
    }

    async fn attempts(&self, attempt_key: &str) -> Result<i64> {
        match self.cache.get(attempt_key).await? {
            Some(value) => value.parse().map_err(|_| {
                RelayError::Cache(format!("attempt counter {attempt_key} is not an integer"))
            }),
            None => {
                debug!("No attempt counter at {}", attempt_key);
                Ok(0)
            }
        }
    }
}

fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}

/// Build the message carrying a verification code.
pub fn verification_email(
    service_name: &str,
    from: &str,
    to: &str,
    code: &str,
    ttl: Duration,
) -> OutboundEmail {
    let minutes = ttl.as_secs().div_ceil(60).max(1);
    let body = format!(
        "Your {service_name} verification code is: {code}\n\n\
         This code expires in {minutes} minute{}.\n\
         If you did not request this code, you can ignore this email.\n",
        if minutes == 1 { "" } else { "s" }
    );

    OutboundEmail::new(
        from,
        to,
        format!("[{service_name}] Verification Code"),
        EmailBody::Text(body),
    )
}
