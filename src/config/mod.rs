use serde::Deserialize;
use thiserror::Error;

use crate::Result;

pub const DEFAULT_LB_METHOD: &str = "random two least_conn";

/// ConfigMap level tunables. Ingress annotations override a copy of these per resource.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConfigParams {
    pub client_max_body_size: String,
    pub fail_timeout: String,
    pub health_check_enabled: bool,
    pub health_check_mandatory: bool,
    pub health_check_mandatory_queue: i64,
    pub hsts: bool,
    pub hsts_behind_proxy: bool,
    pub hsts_include_subdomains: bool,
    pub hsts_max_age: i64,
    pub http2: bool,
    pub keepalive: i32,
    pub lb_method: String,
    pub location_snippets: Vec<String>,
    pub max_conns: i32,
    pub max_fails: i32,
    pub proxy_buffer_size: String,
    pub proxy_buffering: bool,
    pub proxy_buffers: String,
    pub proxy_connect_timeout: String,
    pub proxy_hide_headers: Vec<String>,
    pub proxy_max_temp_file_size: String,
    pub proxy_pass_headers: Vec<String>,
    pub proxy_protocol: bool,
    pub proxy_read_timeout: String,
    pub proxy_send_timeout: String,
    pub redirect_to_https: bool,
    pub resolver_addresses: Vec<String>,
    pub real_ip_header: String,
    pub real_ip_recursive: bool,
    pub set_real_ip_from: Vec<String>,
    pub server_snippets: Vec<String>,
    pub server_tokens: String,
    pub slow_start: String,
    pub ssl_redirect: bool,
    pub upstream_zone_size: String,
    pub use_cluster_ip: bool,
    pub ports: Vec<i32>,
    pub ssl_ports: Vec<i32>,

    pub app_protect_enable: String,
    pub app_protect_log_enable: String,

    pub basic_auth_realm: String,
    pub basic_auth_secret: String,

    pub jwt_key: String,
    pub jwt_login_url: String,
    pub jwt_realm: String,
    pub jwt_token: String,

    pub limit_req_burst: i32,
    pub limit_req_delay: i32,
    pub limit_req_dry_run: bool,
    pub limit_req_key: String,
    pub limit_req_log_level: String,
    pub limit_req_no_delay: bool,
    pub limit_req_rate: String,
    pub limit_req_reject_code: i32,
    pub limit_req_zone_size: String,
}

impl Default for ConfigParams {
    fn default() -> Self {
        Self {
            client_max_body_size: "1m".to_owned(),
            fail_timeout: "10s".to_owned(),
            health_check_enabled: false,
            health_check_mandatory: false,
            health_check_mandatory_queue: 0,
            hsts: false,
            hsts_behind_proxy: false,
            hsts_include_subdomains: false,
            hsts_max_age: 2_592_000,
            http2: false,
            keepalive: 0,
            lb_method: DEFAULT_LB_METHOD.to_owned(),
            location_snippets: vec![],
            max_conns: 0,
            max_fails: 1,
            proxy_buffer_size: String::new(),
            proxy_buffering: true,
            proxy_buffers: String::new(),
            proxy_connect_timeout: "60s".to_owned(),
            proxy_hide_headers: vec![],
            proxy_max_temp_file_size: "1024m".to_owned(),
            proxy_pass_headers: vec![],
            proxy_protocol: false,
            proxy_read_timeout: "60s".to_owned(),
            proxy_send_timeout: "60s".to_owned(),
            redirect_to_https: false,
            resolver_addresses: vec![],
            real_ip_header: String::new(),
            real_ip_recursive: false,
            set_real_ip_from: vec![],
            server_snippets: vec![],
            server_tokens: "on".to_owned(),
            slow_start: String::new(),
            ssl_redirect: true,
            upstream_zone_size: "256k".to_owned(),
            use_cluster_ip: false,
            ports: vec![80],
            ssl_ports: vec![443],
            app_protect_enable: String::new(),
            app_protect_log_enable: String::new(),
            basic_auth_realm: String::new(),
            basic_auth_secret: String::new(),
            jwt_key: String::new(),
            jwt_login_url: String::new(),
            jwt_realm: String::new(),
            jwt_token: String::new(),
            limit_req_burst: 0,
            limit_req_delay: 0,
            limit_req_dry_run: false,
            limit_req_key: "${binary_remote_addr}".to_owned(),
            limit_req_log_level: "error".to_owned(),
            limit_req_no_delay: false,
            limit_req_rate: String::new(),
            limit_req_reject_code: 429,
            limit_req_zone_size: "10m".to_owned(),
        }
    }
}

#[derive(Error, Debug)]
enum ConfigParamsError {
    #[error("lb-method must not be empty")]
    EmptyLbMethod,
    #[error("zone size {0} is not a valid NGINX size")]
    InvalidZoneSize(String),
    #[error("max-fails must not be negative")]
    NegativeMaxFails,
}

impl ConfigParams {
    /// Plus builds ship with server tokens disabled by default.
    pub fn new_default(is_plus: bool) -> Self {
        let mut params = Self::default();
        if is_plus {
            params.server_tokens = "off".to_owned();
        }
        params
    }

    pub fn is_resolver_configured(&self) -> bool {
        !self.resolver_addresses.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.lb_method.is_empty() {
            return Err(ConfigParamsError::EmptyLbMethod.into());
        }
        if !is_size(&self.upstream_zone_size) {
            return Err(ConfigParamsError::InvalidZoneSize(self.upstream_zone_size.clone()).into());
        }
        if self.max_fails < 0 {
            return Err(ConfigParamsError::NegativeMaxFails.into());
        }
        Ok(())
    }
}

/// Accepts NGINX sizes such as `256k`, `10m` or `1024`.
pub fn is_size(value: &str) -> bool {
    let digits = value.trim_end_matches(['k', 'K', 'm', 'M', 'g', 'G']);
    !digits.is_empty() && value.len() - digits.len() <= 1 && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_default_config_params() {
        let params = ConfigParams::new_default(false);
        assert_eq!("on", params.server_tokens);
        assert_eq!(DEFAULT_LB_METHOD, params.lb_method);
        assert!(params.validate().is_ok());
        assert!(!params.is_resolver_configured());

        let params = ConfigParams::new_default(true);
        assert_eq!("off", params.server_tokens);
    }

    #[test]
    pub fn test_config_params_from_yaml() {
        let m = r"
proxy-connect-timeout: 30s
lb-method: least_conn
resolver-addresses:
  - 10.0.0.1
keepalive: 32
";
        let params: ConfigParams = serde_yaml::from_str(m).unwrap();
        assert_eq!("30s", params.proxy_connect_timeout);
        assert_eq!("least_conn", params.lb_method);
        assert_eq!(32, params.keepalive);
        assert!(params.is_resolver_configured());
        assert_eq!("60s", params.proxy_read_timeout);
    }

    #[test]
    pub fn test_is_size() {
        assert!(is_size("256k"));
        assert!(is_size("10m"));
        assert!(is_size("1024"));
        assert!(!is_size("10abc"));
        assert!(!is_size("k"));
        assert!(!is_size(""));
    }

    #[test]
    pub fn test_validate_rejects_bad_zone_size() {
        let params = ConfigParams {
            upstream_zone_size: "10abc".to_owned(),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
