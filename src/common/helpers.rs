//! Small value generators shared by every compiler: defaults for optional fields and NGINX time normalisation.

pub fn generate_string(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_owned()
    } else {
        value.to_owned()
    }
}

/// Normalises an NGINX time value such as `"1m 30s"` into `"1m30s"`. Values that are not time strings yield an empty string.
pub fn generate_time(value: &str) -> String {
    let compact: String = value.split_whitespace().collect();
    if is_valid_time(&compact) {
        compact
    } else {
        String::new()
    }
}

/// Like [`generate_time`] but an empty value falls back to `default`, which is used as is.
pub fn generate_time_with_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        return default.to_owned();
    }
    generate_time(value)
}

fn is_valid_time(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    let mut seen_digit = false;
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            seen_digit = true;
            continue;
        }
        if !seen_digit {
            return false;
        }
        match c {
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
            },
            's' | 'm' | 'h' | 'd' | 'w' | 'M' | 'y' => {},
            _ => return false,
        }
        seen_digit = false;
    }
    true
}

pub fn generate_snippets(enable_snippets: bool, snippet: &str, default: &[String]) -> Vec<String> {
    if !enable_snippets || snippet.is_empty() {
        return default.to_vec();
    }
    snippet.split('\n').map(ToOwned::to_owned).collect()
}

pub fn generate_int_from_option(value: Option<i64>, default: i64) -> i64 {
    value.unwrap_or(default)
}

pub fn generate_bool(value: Option<bool>, default: bool) -> bool {
    value.unwrap_or(default)
}

/// Wraps a regular expression location path in quotes so NGINX does not choke on braces or semicolons.
pub fn generate_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~*") {
        return format!("~* \"{}\"", rest.strip_prefix(' ').unwrap_or(rest));
    }
    if let Some(rest) = path.strip_prefix('~') {
        return format!("~ \"{}\"", rest.strip_prefix(' ').unwrap_or(rest));
    }
    path.to_owned()
}

pub fn generate_lb_method(method: &str, default: &str) -> String {
    match method {
        "" => default.to_owned(),
        "round_robin" => String::new(),
        _ => method.to_owned(),
    }
}

pub fn generate_proxy_ssl_name(service: &str, namespace: &str) -> String {
    format!("{service}.{namespace}.svc")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_generate_time() {
        assert_eq!("1m30s", generate_time("1m 30s"));
        assert_eq!("60s", generate_time("60s"));
        assert_eq!("100ms", generate_time("100ms"));
        assert_eq!("5", generate_time("5"));
        assert_eq!("", generate_time("abc"));
        assert_eq!("", generate_time("s"));
    }

    #[test]
    pub fn test_generate_time_with_default() {
        assert_eq!("60s", generate_time_with_default("", "60s"));
        assert_eq!("10s", generate_time_with_default("10s", "60s"));
    }

    #[test]
    pub fn test_generate_snippets() {
        let default = vec!["default".to_owned()];
        assert_eq!(default, generate_snippets(false, "a\nb", &default));
        assert_eq!(default, generate_snippets(true, "", &default));
        assert_eq!(vec!["a".to_owned(), "b".to_owned()], generate_snippets(true, "a\nb", &default));
    }

    #[test]
    pub fn test_generate_path() {
        assert_eq!("/", generate_path("/"));
        assert_eq!("=/exact/match", generate_path("=/exact/match"));
        assert_eq!("~ \"^/tea$\"", generate_path("~ ^/tea$"));
        assert_eq!("~* \"^/Coffee$\"", generate_path("~*^/Coffee$"));
    }

    #[test]
    pub fn test_generate_lb_method() {
        assert_eq!("random two least_conn", generate_lb_method("", "random two least_conn"));
        assert_eq!("", generate_lb_method("round_robin", "random two least_conn"));
        assert_eq!("ip_hash", generate_lb_method("ip_hash", "random two least_conn"));
    }
}
