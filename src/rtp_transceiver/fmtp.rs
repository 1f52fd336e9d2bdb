use std::collections::HashMap;

/// Parses an `a=fmtp` value ("key=value;key=value") into a map.
pub(crate) fn parse_fmtp(line: &str) -> HashMap<String, String> {
    let mut parameters = HashMap::new();

    for part in line.split(';') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.split_once('=') {
            Some((k, v)) => parameters.insert(k.to_owned(), v.to_owned()),
            None => parameters.insert(trimmed.to_owned(), String::new()),
        };
    }

    parameters
}

/// Two fmtp maps are consistent when every key they share carries the
/// same value; keys present on only one side do not conflict.
pub(crate) fn fmtp_consist(a: &HashMap<String, String>, b: &HashMap<String, String>) -> bool {
    for (k, v) in a {
        if let Some(other) = b.get(k) {
            if other != v {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_fmtp() {
        let m = parse_fmtp("level-asymmetry-allowed=1;packetization-mode=1");
        assert_eq!(m.get("packetization-mode").map(String::as_str), Some("1"));
        assert_eq!(
            m.get("level-asymmetry-allowed").map(String::as_str),
            Some("1")
        );
        assert!(parse_fmtp("").is_empty());
    }

    #[test]
    fn test_fmtp_consist() {
        let a = parse_fmtp("packetization-mode=1;profile-level-id=42e01f");
        let b = parse_fmtp("packetization-mode=1");
        let c = parse_fmtp("packetization-mode=0");

        assert!(fmtp_consist(&a, &b));
        assert!(fmtp_consist(&b, &a));
        assert!(!fmtp_consist(&a, &c));
    }
}
