//! Platform credentials loaded from the environment
//!
//! Credentials are read once at startup into [`Credentials`] and handed by
//! reference to each client constructor. Secret values are wrapped in
//! [`SecretString`] so they are redacted from `Debug` output and zeroed on drop.
//!
//! A platform whose variables are incomplete is not an error for the whole
//! process: its slot holds a [`PlatformError::Authentication`] naming the
//! missing variables, and only posts targeting that platform fail.

use secrecy::SecretString;

use crate::error::PlatformError;

pub const FB_PAGE_ID: &str = "FB_PAGE_ID";
pub const FB_PAGE_ACCESS_TOKEN: &str = "FB_PAGE_ACCESS_TOKEN";
pub const X_API_KEY: &str = "X_API_KEY";
pub const X_API_SECRET_KEY: &str = "X_API_SECRET_KEY";
pub const X_ACCESS_TOKEN: &str = "X_ACCESS_TOKEN";
pub const X_ACCESS_TOKEN_SECRET: &str = "X_ACCESS_TOKEN_SECRET";
pub const IG_USER_ID: &str = "IG_USER_ID";
pub const IG_ACCESS_TOKEN: &str = "IG_ACCESS_TOKEN";
pub const IMAGEKIT_PRIVATE_KEY: &str = "IMAGEKIT_PRIVATE_KEY";

#[derive(Debug, Clone)]
pub struct FacebookCredentials {
    pub page_id: String,
    pub access_token: SecretString,
}

#[derive(Debug, Clone)]
pub struct TwitterCredentials {
    pub api_key: String,
    pub api_secret: SecretString,
    pub access_token: String,
    pub access_secret: SecretString,
}

#[derive(Debug, Clone)]
pub struct InstagramCredentials {
    pub user_id: String,
    pub access_token: SecretString,
}

/// Server-side ImageKit uploads authenticate with the private key alone; the
/// public key and URL endpoint only matter for client-side uploads and URL
/// building, neither of which happens here.
#[derive(Debug, Clone)]
pub struct RelayCredentials {
    pub private_key: SecretString,
}

/// Credentials for every platform, each either complete or the reason it is not
#[derive(Debug, Clone)]
pub struct Credentials {
    pub facebook: Result<FacebookCredentials, PlatformError>,
    pub twitter: Result<TwitterCredentials, PlatformError>,
    pub instagram: Result<InstagramCredentials, PlatformError>,
    pub relay: Result<RelayCredentials, PlatformError>,
}

impl Credentials {
    /// Read credentials from process environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary lookup function
    ///
    /// Blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut reader = Reader {
            lookup: &lookup,
            missing: Vec::new(),
        };

        let facebook = {
            let page_id = reader.get(FB_PAGE_ID);
            let token = reader.get(FB_PAGE_ACCESS_TOKEN);
            reader.finish("Facebook").map(|_| FacebookCredentials {
                page_id: page_id.unwrap_or_default(),
                access_token: SecretString::from(token.unwrap_or_default()),
            })
        };

        let twitter = {
            let api_key = reader.get(X_API_KEY);
            let api_secret = reader.get(X_API_SECRET_KEY);
            let access_token = reader.get(X_ACCESS_TOKEN);
            let access_secret = reader.get(X_ACCESS_TOKEN_SECRET);
            reader.finish("X").map(|_| TwitterCredentials {
                api_key: api_key.unwrap_or_default(),
                api_secret: SecretString::from(api_secret.unwrap_or_default()),
                access_token: access_token.unwrap_or_default(),
                access_secret: SecretString::from(access_secret.unwrap_or_default()),
            })
        };

        let instagram = {
            let user_id = reader.get(IG_USER_ID);
            let token = reader.get(IG_ACCESS_TOKEN);
            reader.finish("Instagram").map(|_| InstagramCredentials {
                user_id: user_id.unwrap_or_default(),
                access_token: SecretString::from(token.unwrap_or_default()),
            })
        };

        let relay = {
            let private_key = reader.get(IMAGEKIT_PRIVATE_KEY);
            reader.finish("ImageKit").map(|_| RelayCredentials {
                private_key: SecretString::from(private_key.unwrap_or_default()),
            })
        };

        Self {
            facebook,
            twitter,
            instagram,
            relay,
        }
    }
}

struct Reader<'a, F> {
    lookup: &'a F,
    missing: Vec<&'static str>,
}

impl<F> Reader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&mut self, key: &'static str) -> Option<String> {
        match (self.lookup)(key).map(|v| v.trim().to_string()) {
            Some(value) if !value.is_empty() => Some(value),
            _ => {
                self.missing.push(key);
                None
            }
        }
    }

    /// Close out one platform's group of variables
    fn finish(&mut self, platform: &str) -> Result<(), PlatformError> {
        if self.missing.is_empty() {
            return Ok(());
        }
        let missing = std::mem::take(&mut self.missing);
        Err(PlatformError::Authentication(format!(
            "{} credentials incomplete, missing environment variable(s): {}",
            platform,
            missing.join(", ")
        )))
    }
}
