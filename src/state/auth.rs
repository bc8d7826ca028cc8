//! Authentication engine.
//!
//! Turns each authentication challenge into the response the server expects.
//! Supports cleartext, MD5 and SCRAM-SHA-256.

use crate::error::{Error, Result};
use crate::protocol::backend::AuthenticationMessage;
use crate::protocol::frontend::FrontendMessage;
use crate::protocol::frontend::auth::{SCRAM_SHA_256, ScramClient, md5_password};

/// A response to send back for one challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResponse {
    Password(String),
    SaslInitialResponse { mechanism: &'static str, data: Vec<u8> },
    SaslResponse(Vec<u8>),
}

impl AuthResponse {
    pub fn as_message(&self) -> FrontendMessage<'_> {
        match self {
            AuthResponse::Password(password) => FrontendMessage::Password(password),
            AuthResponse::SaslInitialResponse { mechanism, data } => {
                FrontendMessage::SaslInitialResponse { mechanism, data }
            }
            AuthResponse::SaslResponse(data) => FrontendMessage::SaslResponse(data),
        }
    }
}

/// State of one authentication attempt.
#[derive(Debug)]
pub struct Authenticator {
    user: String,
    password: Option<String>,
    scram: Option<ScramClient>,
    scram_verified: bool,
    done: bool,
    #[cfg(test)]
    nonce: Option<String>,
}

impl Authenticator {
    pub fn new(user: &str, password: Option<&str>) -> Self {
        Self {
            user: user.to_string(),
            password: password.map(str::to_string),
            scram: None,
            scram_verified: false,
            done: false,
            #[cfg(test)]
            nonce: None,
        }
    }

    /// True once `AuthenticationOk` has been received.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Handle one challenge. `Ok(None)` means there is nothing to send.
    pub fn handle(&mut self, msg: &AuthenticationMessage) -> Result<Option<AuthResponse>> {
        match msg {
            AuthenticationMessage::Ok => {
                if self.scram.is_some() && !self.scram_verified {
                    return Err(Error::Auth(
                        "server finished SCRAM-SHA-256 without proving its signature".into(),
                    ));
                }
                self.scram = None;
                self.done = true;
                tracing::debug!(user = %self.user, "authenticated");
                Ok(None)
            }
            AuthenticationMessage::CleartextPassword => {
                let password = self.password()?.to_string();
                Ok(Some(AuthResponse::Password(password)))
            }
            AuthenticationMessage::Md5Password { salt } => {
                let hashed = md5_password(&self.user, self.password()?, salt);
                Ok(Some(AuthResponse::Password(hashed)))
            }
            AuthenticationMessage::Sasl { mechanisms } => {
                if !mechanisms.iter().any(|m| m == SCRAM_SHA_256) {
                    return Err(Error::Unsupported(format!(
                        "SASL mechanisms {:?}",
                        mechanisms
                    )));
                }
                let scram = self.start_scram()?;
                let data = scram.client_first_message().into_bytes();
                self.scram = Some(scram);
                Ok(Some(AuthResponse::SaslInitialResponse {
                    mechanism: SCRAM_SHA_256,
                    data,
                }))
            }
            AuthenticationMessage::SaslContinue { data } => {
                let scram = self.scram.as_mut().ok_or_else(|| {
                    Error::Protocol("AuthenticationSASLContinue before AuthenticationSASL".into())
                })?;
                let server_first = sasl_text(data)?;
                let client_final = scram.process_server_first(server_first)?;
                Ok(Some(AuthResponse::SaslResponse(client_final.into_bytes())))
            }
            AuthenticationMessage::SaslFinal { data } => {
                let scram = self.scram.as_ref().ok_or_else(|| {
                    Error::Protocol("AuthenticationSASLFinal before AuthenticationSASL".into())
                })?;
                scram.verify_server_final(sasl_text(data)?)?;
                self.scram_verified = true;
                Ok(None)
            }
            other => Err(Error::Unsupported(other.name().to_string())),
        }
    }

    fn password(&self) -> Result<&str> {
        self.password
            .as_deref()
            .ok_or_else(|| Error::Auth("password required but not provided".into()))
    }

    fn start_scram(&self) -> Result<ScramClient> {
        let password = self.password()?;

        #[cfg(test)]
        if let Some(nonce) = &self.nonce {
            return Ok(ScramClient::with_nonce(&self.user, password, nonce.clone()));
        }

        Ok(ScramClient::new(&self.user, password))
    }
}

fn sasl_text(data: &[u8]) -> Result<&str> {
    simdutf8::compat::from_utf8(data)
        .map_err(|e| Error::Protocol(format!("SASL data is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_FIRST: &str = "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";

    fn rfc7677(password: &str) -> Authenticator {
        let mut auth = Authenticator::new("user", Some(password));
        auth.nonce = Some("rOprNGfwEbeRWgbNEkqO".into());
        auth
    }

    fn sasl() -> AuthenticationMessage {
        AuthenticationMessage::Sasl {
            mechanisms: vec!["SCRAM-SHA-256".into()],
        }
    }

    #[test]
    fn cleartext() {
        let mut auth = Authenticator::new("u", Some("secret"));
        let resp = auth
            .handle(&AuthenticationMessage::CleartextPassword)
            .unwrap();
        assert_eq!(resp, Some(AuthResponse::Password("secret".into())));
        assert!(!auth.is_done());

        assert_eq!(auth.handle(&AuthenticationMessage::Ok).unwrap(), None);
        assert!(auth.is_done());
    }

    #[test]
    fn md5() {
        let mut auth = Authenticator::new("postgres", Some("password"));
        let resp = auth
            .handle(&AuthenticationMessage::Md5Password { salt: [1, 2, 3, 4] })
            .unwrap();
        assert_eq!(
            resp,
            Some(AuthResponse::Password(
                "md598511ceaec347a656f032c7f2a16ef17".into()
            ))
        );
    }

    #[test]
    fn missing_password() {
        for challenge in [
            AuthenticationMessage::CleartextPassword,
            AuthenticationMessage::Md5Password { salt: [0; 4] },
            sasl(),
        ] {
            let mut auth = Authenticator::new("u", None);
            assert!(matches!(auth.handle(&challenge), Err(Error::Auth(_))));
        }
    }

    #[test]
    fn trust_needs_no_password() {
        let mut auth = Authenticator::new("u", None);
        assert_eq!(auth.handle(&AuthenticationMessage::Ok).unwrap(), None);
        assert!(auth.is_done());
    }

    #[test]
    fn scram_exchange() {
        let mut auth = rfc7677("pencil");

        let first = auth.handle(&sasl()).unwrap();
        assert_eq!(
            first,
            Some(AuthResponse::SaslInitialResponse {
                mechanism: "SCRAM-SHA-256",
                data: b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO".to_vec(),
            })
        );

        let Some(AuthResponse::SaslResponse(client_final)) = auth
            .handle(&AuthenticationMessage::SaslContinue {
                data: SERVER_FIRST.as_bytes().to_vec(),
            })
            .unwrap()
        else {
            panic!("expected SASL response");
        };
        assert!(client_final.ends_with(b",p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="));

        let fin = AuthenticationMessage::SaslFinal {
            data: b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=".to_vec(),
        };
        assert_eq!(auth.handle(&fin).unwrap(), None);
        assert_eq!(auth.handle(&AuthenticationMessage::Ok).unwrap(), None);
        assert!(auth.is_done());
    }

    #[test]
    fn scram_wrong_password_never_reaches_ok() {
        let mut auth = rfc7677("wrong");
        auth.handle(&sasl()).unwrap();
        auth.handle(&AuthenticationMessage::SaslContinue {
            data: SERVER_FIRST.as_bytes().to_vec(),
        })
        .unwrap();

        let fin = AuthenticationMessage::SaslFinal {
            data: b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=".to_vec(),
        };
        assert!(matches!(auth.handle(&fin), Err(Error::Auth(_))));
        assert!(auth.handle(&AuthenticationMessage::Ok).is_err());
        assert!(!auth.is_done());
    }

    #[test]
    fn scram_requires_offered_mechanism() {
        let mut auth = Authenticator::new("u", Some("p"));
        let err = auth
            .handle(&AuthenticationMessage::Sasl {
                mechanisms: vec!["SCRAM-SHA-256-PLUS".into()],
            })
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn sasl_continue_out_of_order() {
        let mut auth = Authenticator::new("u", Some("p"));
        assert!(
            auth.handle(&AuthenticationMessage::SaslContinue { data: vec![] })
                .is_err()
        );
    }

    #[test]
    fn unimplemented_challenges() {
        for challenge in [
            AuthenticationMessage::KerberosV5,
            AuthenticationMessage::Gss,
            AuthenticationMessage::Sspi,
            AuthenticationMessage::GssContinue { data: vec![] },
        ] {
            let mut auth = Authenticator::new("u", Some("p"));
            assert!(matches!(
                auth.handle(&challenge),
                Err(Error::Unsupported(_))
            ));
        }
    }

    #[test]
    fn response_messages() {
        let resp = AuthResponse::SaslResponse(b"c=biws".to_vec());
        let mut buf = Vec::new();
        resp.as_message().encode(&mut buf);
        assert_eq!(buf, [b'p', 0, 0, 0, 10, b'c', b'=', b'b', b'i', b'w', b's']);
    }
}
