use crate::error::Result;

/// Handles SASL authentication for one connection.
///
/// The lifecycle of an authenticator:
/// - `initial_response` produces the token that initiates the handshake.
/// - The server answers each token with either a challenge or a final
///   success/failure. Challenges are fed to `evaluate_challenge` until the
///   server is satisfied.
/// - On success, `handle_success` receives the final server token.
pub trait SaslAuthenticator {
    fn initial_response(&self) -> Vec<u8>;

    fn evaluate_challenge(&self, challenge: Vec<u8>) -> Result<Vec<u8>>;

    fn handle_success(&self, data: Vec<u8>) -> Result<()>;
}

/// Provides authenticators per new connection.
pub trait SaslAuthenticatorProvider {
    /// Authenticator class name, matched against the one the server announces.
    /// `None` means no credentials are configured.
    fn name(&self) -> Option<&str>;

    fn create_authenticator(&self) -> Box<dyn SaslAuthenticator + Send>;
}

/// Provider for servers without authentication.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneAuthenticatorProvider;

struct NoneAuthenticator;

impl SaslAuthenticator for NoneAuthenticator {
    fn initial_response(&self) -> Vec<u8> {
        vec![]
    }

    fn evaluate_challenge(&self, _challenge: Vec<u8>) -> Result<Vec<u8>> {
        Err("Server challenge is not supported without credentials!".into())
    }

    fn handle_success(&self, _data: Vec<u8>) -> Result<()> {
        Ok(())
    }
}

impl SaslAuthenticatorProvider for NoneAuthenticatorProvider {
    fn name(&self) -> Option<&str> {
        None
    }

    fn create_authenticator(&self) -> Box<dyn SaslAuthenticator + Send> {
        Box::new(NoneAuthenticator)
    }
}

/// Plain username/password authenticator.
#[derive(Debug, Clone)]
pub struct StaticPasswordAuthenticator {
    username: String,
    password: String,
}

impl StaticPasswordAuthenticator {
    pub fn new<S: ToString>(username: S, password: S) -> StaticPasswordAuthenticator {
        StaticPasswordAuthenticator {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl SaslAuthenticator for StaticPasswordAuthenticator {
    fn initial_response(&self) -> Vec<u8> {
        let mut token = vec![0];
        token.extend_from_slice(self.username.as_bytes());
        token.push(0);
        token.extend_from_slice(self.password.as_bytes());
        token
    }

    fn evaluate_challenge(&self, _challenge: Vec<u8>) -> Result<Vec<u8>> {
        Err("Server challenge is not supported for StaticPasswordAuthenticator!".into())
    }

    fn handle_success(&self, _data: Vec<u8>) -> Result<()> {
        Ok(())
    }
}

/// Authentication provider with a username and password.
#[derive(Debug, Clone)]
pub struct StaticPasswordAuthenticatorProvider {
    username: String,
    password: String,
}

impl StaticPasswordAuthenticatorProvider {
    pub fn new<S: ToString>(username: S, password: S) -> StaticPasswordAuthenticatorProvider {
        StaticPasswordAuthenticatorProvider {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl SaslAuthenticatorProvider for StaticPasswordAuthenticatorProvider {
    fn name(&self) -> Option<&str> {
        Some("org.apache.cassandra.auth.PasswordAuthenticator")
    }

    fn create_authenticator(&self) -> Box<dyn SaslAuthenticator + Send> {
        Box::new(StaticPasswordAuthenticator::new(
            self.username.clone(),
            self.password.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_password_token_layout() {
        let authenticator = StaticPasswordAuthenticator::new("cassandra", "secret");

        let mut expected = vec![0];
        expected.extend_from_slice(b"cassandra");
        expected.push(0);
        expected.extend_from_slice(b"secret");

        assert_eq!(authenticator.initial_response(), expected);
        assert!(authenticator.handle_success(vec![]).is_ok());
        assert!(authenticator.evaluate_challenge(vec![1, 2, 3]).is_err());
    }

    #[test]
    fn none_provider_has_no_name() {
        assert_eq!(NoneAuthenticatorProvider.name(), None);
        assert!(NoneAuthenticatorProvider
            .create_authenticator()
            .initial_response()
            .is_empty());
    }

    #[test]
    fn password_provider_announces_class() {
        let provider = StaticPasswordAuthenticatorProvider::new("cassandra", "secret");
        assert_eq!(
            provider.name(),
            Some("org.apache.cassandra.auth.PasswordAuthenticator")
        );
    }
}
