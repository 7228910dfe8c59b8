use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;

pub const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";
pub const SECRET_TYPE_CA: &str = "nginx.org/ca";
pub const SECRET_TYPE_JWK: &str = "nginx.org/jwk";
pub const SECRET_TYPE_HTPASSWD: &str = "nginx.org/htpasswd";
pub const SECRET_TYPE_OIDC: &str = "nginx.org/oidc";

pub const CA_KEY: &str = "ca.crt";
pub const CRL_KEY: &str = "ca.crl";
pub const CLIENT_SECRET_KEY: &str = "client-secret";
pub const HTPASSWD_FILE_KEY: &str = "htpasswd";
pub const JWT_KEY: &str = "jwk";
pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_KEY_KEY: &str = "tls.key";

pub const DEFAULT_SECRET_PATH: &str = "/etc/nginx/secrets";
pub const WILDCARD_SECRET_PATH: &str = "/etc/nginx/secrets/wildcard";

/// A secret as resolved by the secret store: the object itself, where it lives on disk and why it could not be used.
#[derive(Clone, Debug, Default)]
pub struct SecretReference {
    pub secret: Option<Secret>,
    pub path: String,
    pub error: Option<String>,
}

impl SecretReference {
    pub fn new(secret: Secret, path: &str) -> Self {
        Self {
            secret: Some(secret),
            path: path.to_owned(),
            error: None,
        }
    }

    pub fn invalid(secret: Option<Secret>, error: &str) -> Self {
        Self {
            secret,
            path: String::new(),
            error: Some(error.to_owned()),
        }
    }

    pub fn secret_type(&self) -> &str {
        self.secret.as_ref().and_then(|s| s.type_.as_deref()).unwrap_or_default()
    }

    pub fn data(&self, key: &str) -> Option<&[u8]> {
        self.secret.as_ref().and_then(|s| s.data.as_ref()).and_then(|d| d.get(key)).map(|b| b.0.as_slice())
    }

    pub fn has_data(&self, key: &str) -> bool {
        self.data(key).is_some()
    }
}

/// Looks up secrets by their `namespace/name` key.
pub trait SecretResolver {
    fn resolve(&self, key: &str) -> Option<&SecretReference>;
}

impl SecretResolver for BTreeMap<String, SecretReference> {
    fn resolve(&self, key: &str) -> Option<&SecretReference> {
        self.get(key)
    }
}

/// Outcome of checking a referenced secret against the type a feature needs.
#[derive(Debug)]
pub enum SecretCheck<'a> {
    Valid(&'a SecretReference),
    WrongType(String),
    Invalid(String),
}

pub fn check_secret<'a>(resolver: &'a impl SecretResolver, key: &str, expected_type: &str) -> SecretCheck<'a> {
    match resolver.resolve(key) {
        None => SecretCheck::Invalid("secret doesn't exist or of an unsupported type".to_owned()),
        Some(reference) => {
            let actual = reference.secret_type();
            if !actual.is_empty() && actual != expected_type {
                SecretCheck::WrongType(actual.to_owned())
            } else if let Some(error) = &reference.error {
                SecretCheck::Invalid(error.clone())
            } else {
                SecretCheck::Valid(reference)
            }
        },
    }
}
