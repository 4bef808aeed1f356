// Constraint predicates. Each returns the reason a value is rejected.

use crate::domain::net::parse_ipv4_network;
use crate::domain::Ipv4Cidr;
use std::net::{Ipv4Addr, Ipv6Addr};

pub type RuleResult = Result<(), String>;

/// Image formats tesseract reads directly
pub const OCR_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "gif", "webp", "pnm"];

/// Rasterized to images before OCR
pub const OCR_PDF_EXTENSION: &str = "pdf";

fn lowercase_extension(path: &str) -> String {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn no_leading_dash(value: &str) -> RuleResult {
    if value.starts_with('-') {
        return Err("must not start with '-'".to_string());
    }
    Ok(())
}

fn no_control_chars(value: &str) -> RuleResult {
    if value.chars().any(char::is_control) {
        return Err("must not contain control characters".to_string());
    }
    Ok(())
}

pub fn ipv4_network(value: &str) -> RuleResult {
    parse_ipv4_network(value)
        .map(|_| ())
        .ok_or_else(|| format!("'{value}' is not an IPv4 address, CIDR block or address range"))
}

pub fn port(value: i64) -> RuleResult {
    if (1..=65535).contains(&value) {
        Ok(())
    } else {
        Err(format!("{value} is outside 1-65535"))
    }
}

pub fn port_list(value: &str) -> RuleResult {
    if value.trim().is_empty() {
        return Err("must list at least one port".to_string());
    }
    for item in value.split(',').map(str::trim) {
        let (start, end) = match item.split_once('-') {
            Some((start, end)) => (start.trim(), end.trim()),
            None => (item, item),
        };
        let parse = |s: &str| -> Result<i64, String> {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("'{item}' is not a port or port range"));
            }
            let n = s.parse::<i64>().map_err(|_| format!("'{item}' is out of range"))?;
            port(n).map(|_| n)
        };
        let (start, end) = (parse(start)?, parse(end)?);
        if start > end {
            return Err(format!("range '{item}' is reversed"));
        }
    }
    Ok(())
}

pub fn one_of(value: &str, set: &[&str]) -> RuleResult {
    if set.contains(&value) {
        Ok(())
    } else {
        Err(format!("'{value}' is not one of {}", set.join(", ")))
    }
}

pub fn domain(value: &str) -> RuleResult {
    let reason = || format!("'{value}' is not a valid domain name");
    if value.is_empty() || value.len() > 253 {
        return Err(reason());
    }
    let labels: Vec<&str> = value.split('.').collect();
    if labels.len() < 2 {
        return Err(reason());
    }
    let label_ok = |label: &&str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    };
    if !labels.iter().all(label_ok) {
        return Err(reason());
    }
    // Top-level label is never all digits
    if labels
        .last()
        .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(reason());
    }
    Ok(())
}

pub fn host(value: &str) -> RuleResult {
    if value.parse::<Ipv4Addr>().is_ok() || value.parse::<Ipv6Addr>().is_ok() {
        return Ok(());
    }
    if value.contains('/') && Ipv4Cidr::parse(value).is_some() {
        return Ok(());
    }
    domain(value).map_err(|_| format!("'{value}' is not a hostname, IP address or CIDR block"))
}

pub fn email(value: &str) -> RuleResult {
    let reason = || format!("'{value}' is not a valid email address");
    let (local, host) = value.split_once('@').ok_or_else(reason)?;
    if local.is_empty()
        || local.len() > 64
        || local.starts_with('-')
        || local.starts_with('.')
        || !local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-".contains(c))
    {
        return Err(reason());
    }
    domain(host).map_err(|_| reason())
}

pub fn http_url(value: &str) -> RuleResult {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .ok_or_else(|| format!("'{value}' must start with http:// or https://"))?;
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err("URL must not contain whitespace or control characters".to_string());
    }
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    if host.is_empty() || host.starts_with(':') {
        return Err(format!("'{value}' has no host"));
    }
    Ok(())
}

pub fn bandwidth(value: &str) -> RuleResult {
    let digits = value.strip_suffix(['K', 'M', 'G']).unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || digits.bytes().all(|b| b == b'0') {
        return Err(format!("'{value}' is not a rate like 500K, 10M or 1G"));
    }
    Ok(())
}

pub fn username(value: &str) -> RuleResult {
    if value.is_empty() || value.len() > 64 {
        return Err("must be 1-64 characters".to_string());
    }
    no_leading_dash(value)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(format!("'{value}' may only contain letters, digits, '.', '_' and '-'"));
    }
    Ok(())
}

pub fn mac_address(value: &str) -> RuleResult {
    let octets: Vec<&str> = value.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        Ok(())
    } else {
        Err(format!("'{value}' is not a MAC address like 00:11:22:33:44:55"))
    }
}

pub fn interface_name(value: &str) -> RuleResult {
    if value.is_empty() || value.len() > 15 {
        return Err("must be 1-15 characters".to_string());
    }
    no_leading_dash(value)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':' | '@'))
    {
        return Err(format!("'{value}' is not an interface name"));
    }
    Ok(())
}

pub fn safe_text(value: &str) -> RuleResult {
    no_control_chars(value)?;
    no_leading_dash(value)
}

pub fn file_path(value: &str) -> RuleResult {
    if value.is_empty() {
        return Err("must not be empty".to_string());
    }
    if value.contains('\0') {
        return Err("must not contain NUL".to_string());
    }
    no_leading_dash(value)
}

pub fn ocr_source(value: &str) -> RuleResult {
    let source = value.strip_prefix('@').unwrap_or(value);
    if source.starts_with("http://") || source.starts_with("https://") {
        http_url(source)?;
        // tesseract fetches URLs itself; only local PDFs go through the rasterizer
        let path = source.split(['?', '#']).next().unwrap_or(source);
        if lowercase_extension(path) == OCR_PDF_EXTENSION {
            return Err("PDF input must be a local file".to_string());
        }
        return Ok(());
    }
    if value.starts_with('@') {
        return Err("'@' prefix is only valid before a URL".to_string());
    }
    file_path(source)?;
    let extension = lowercase_extension(source);
    if extension != OCR_PDF_EXTENSION && !OCR_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(format!(
            "unsupported file type; expected pdf or one of {}",
            OCR_IMAGE_EXTENSIONS.join(", ")
        ));
    }
    Ok(())
}

pub fn int_range(value: i64, min: i64, max: i64) -> RuleResult {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(format!("{value} is outside {min}-{max}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_list() {
        assert!(port_list("22,80,443").is_ok());
        assert!(port_list("1-1024, 8080").is_ok());
        assert!(port_list("0").is_err());
        assert!(port_list("80-22").is_err());
        assert!(port_list("80;id").is_err());
        assert!(port_list("").is_err());
    }

    #[test]
    fn test_domain_and_host() {
        assert!(domain("example.com").is_ok());
        assert!(domain("_dmarc.mail.example.co.uk").is_ok());
        assert!(domain("localhost").is_err());
        assert!(domain("-bad.com").is_err());
        assert!(domain("example.com; rm -rf /").is_err());
        assert!(domain("10.0.0.1").is_err());

        assert!(host("10.0.0.1").is_ok());
        assert!(host("::1").is_ok());
        assert!(host("10.0.0.0/24").is_ok());
        assert!(host("scanme.nmap.org").is_ok());
        assert!(host("-oN/tmp/x").is_err());
    }

    #[test]
    fn test_email() {
        assert!(email("alice+tag@example.com").is_ok());
        assert!(email("alice@localhost").is_err());
        assert!(email("@example.com").is_err());
        assert!(email("a`id`@example.com").is_err());
    }

    #[test]
    fn test_http_url() {
        assert!(http_url("https://example.com/wp").is_ok());
        assert!(http_url("http://10.0.0.5:8080/?id=1").is_ok());
        assert!(http_url("ftp://example.com").is_err());
        assert!(http_url("https://").is_err());
        assert!(http_url("https://exa mple.com").is_err());
    }

    #[test]
    fn test_bandwidth_and_mac() {
        assert!(bandwidth("1M").is_ok());
        assert!(bandwidth("500").is_ok());
        assert!(bandwidth("10T").is_err());
        assert!(bandwidth("0M").is_err());
        assert!(mac_address("00:1a:2B:3c:4d:5e").is_ok());
        assert!(mac_address("00-1a-2b-3c-4d-5e").is_err());
    }

    #[test]
    fn test_ocr_source() {
        assert!(ocr_source("@https://example.com/a.png").is_ok());
        assert!(ocr_source("scan.PNG").is_ok());
        assert!(ocr_source("@scan.png").is_err());
        assert!(ocr_source("report.pdf").is_ok());
        assert!(ocr_source("scans/Report.PDF").is_ok());
        assert!(ocr_source("https://example.com/report.pdf?dl=1").is_err());
        assert!(ocr_source("notes.txt").is_err());
        assert!(ocr_source("-scan.png").is_err());
    }

    #[test]
    fn test_safe_text() {
        assert!(safe_text("id=1; DROP TABLE users").is_ok());
        assert!(safe_text("--os-shell").is_err());
        assert!(safe_text("line\nbreak").is_err());
    }
}
