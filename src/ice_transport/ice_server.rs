use ice::url::{SchemeType, Url};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ice_transport::ice_credential_type::IceCredentialType;

/// One STUN or TURN server entry from the Configuration.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub credential: String,
    #[serde(default)]
    pub credential_type: IceCredentialType,
}

impl IceServer {
    pub(crate) fn parse_url(&self, url_str: &str) -> Result<Url> {
        Ok(Url::parse_url(url_str)?)
    }

    /// Parses and validates every URL. TURN entries must carry usable
    /// credentials before we ever hand them to the agent.
    pub(crate) fn urls(&self) -> Result<Vec<Url>> {
        let mut urls = vec![];

        for url_str in &self.urls {
            let mut url = self.parse_url(url_str)?;
            if url.scheme == SchemeType::Turn || url.scheme == SchemeType::Turns {
                if self.username.is_empty() || self.credential.is_empty() {
                    return Err(Error::ErrNoTurnCredentials);
                }
                match self.credential_type {
                    IceCredentialType::Password => {
                        url.username = self.username.clone();
                        url.password = self.credential.clone();
                    }
                    // OAuth token credentials are not supported by the
                    // underlying agent.
                    IceCredentialType::Oauth => return Err(Error::ErrTurnCredentials),
                }
            }

            urls.push(url);
        }

        Ok(urls)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.urls().map(|_| ())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ice_server_validate_success() {
        let server = IceServer {
            urls: vec![
                "turn:192.158.29.39?transport=udp".to_owned(),
                "turn:[2001:db8::1]:3478?transport=udp".to_owned(),
            ],
            username: "unittest".to_owned(),
            credential: "placeholder".to_owned(),
            credential_type: IceCredentialType::Password,
        };
        assert!(server.validate().is_ok());
    }

    #[test]
    fn test_ice_server_validate_turn_without_credentials() {
        let server = IceServer {
            urls: vec!["turn:192.158.29.39?transport=udp".to_owned()],
            ..Default::default()
        };
        assert_eq!(server.validate(), Err(Error::ErrNoTurnCredentials));
    }

    #[test]
    fn test_ice_server_validate_oauth_unsupported() {
        let server = IceServer {
            urls: vec!["turn:192.158.29.39?transport=udp".to_owned()],
            username: "unittest".to_owned(),
            credential: "token".to_owned(),
            credential_type: IceCredentialType::Oauth,
        };
        assert_eq!(server.validate(), Err(Error::ErrTurnCredentials));
    }

    #[test]
    fn test_ice_server_stun_needs_no_credentials() {
        let server = IceServer {
            urls: vec!["stun:stun.l.google.com:19302".to_owned()],
            ..Default::default()
        };
        assert!(server.validate().is_ok());
    }
}
