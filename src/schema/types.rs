//! Value types and allowed-value constraints.

use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Scalar type a leaf value, multi value, or tag key must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Txt,
    U32 { min: u32, max: u32 },
    Bool,
    Ipv4,
    Ipv6,
    IpAddr,
    Ipv4Prefix,
    Ipv6Prefix,
}

impl ValueType {
    /// Parse a schema type name, applying an optional inclusive range to `u32`.
    pub fn parse(name: &str, range: Option<[u32; 2]>) -> Option<Self> {
        let ty = match name {
            "txt" => ValueType::Txt,
            "u32" => {
                let [min, max] = range.unwrap_or([0, u32::MAX]);
                ValueType::U32 { min, max }
            }
            "bool" => ValueType::Bool,
            "ipv4" => ValueType::Ipv4,
            "ipv6" => ValueType::Ipv6,
            "ipaddr" => ValueType::IpAddr,
            "ipv4net" => ValueType::Ipv4Prefix,
            "ipv6net" => ValueType::Ipv6Prefix,
            _ => return None,
        };
        Some(ty)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Txt => "txt",
            ValueType::U32 { .. } => "u32",
            ValueType::Bool => "bool",
            ValueType::Ipv4 => "ipv4",
            ValueType::Ipv6 => "ipv6",
            ValueType::IpAddr => "ipaddr",
            ValueType::Ipv4Prefix => "ipv4net",
            ValueType::Ipv6Prefix => "ipv6net",
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        match self {
            ValueType::Txt => true,
            ValueType::U32 { min, max } => value
                .parse::<u32>()
                .map(|n| (*min..=*max).contains(&n))
                .unwrap_or(false),
            ValueType::Bool => matches!(value, "true" | "false"),
            ValueType::Ipv4 => value.parse::<Ipv4Addr>().is_ok(),
            ValueType::Ipv6 => value.parse::<Ipv6Addr>().is_ok(),
            ValueType::IpAddr => value.parse::<IpAddr>().is_ok(),
            ValueType::Ipv4Prefix => prefix_ok::<Ipv4Addr>(value, 32),
            ValueType::Ipv6Prefix => prefix_ok::<Ipv6Addr>(value, 128),
        }
    }
}

fn prefix_ok<A: std::str::FromStr>(value: &str, max_len: u8) -> bool {
    match value.split_once('/') {
        Some((addr, len)) => {
            addr.parse::<A>().is_ok() && len.parse::<u8>().map(|l| l <= max_len).unwrap_or(false)
        }
        None => false,
    }
}

/// A regular expression a value may match, shown to users as `display`.
#[derive(Debug, Clone)]
pub struct ValuePattern {
    pub regex: Regex,
    pub display: String,
}

impl ValuePattern {
    /// Compile `pattern` so that it must match the whole value.
    pub fn new(pattern: &str, display: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(&format!("^(?:{pattern})$"))?,
            display: display.into(),
        })
    }
}

/// Constraints on the value carried by a leaf, multi, or tag key.
#[derive(Debug, Clone, Default)]
pub struct ValueSpec {
    pub ty: Option<ValueType>,
    pub allowed: Vec<String>,
    pub patterns: Vec<ValuePattern>,
    pub default: Option<String>,
}

impl ValueSpec {
    /// False for valueless (presence) leaves.
    pub fn takes_value(&self) -> bool {
        self.ty.is_some() || !self.allowed.is_empty() || !self.patterns.is_empty()
    }

    pub fn accepts(&self, value: &str) -> bool {
        if !self.takes_value() {
            return false;
        }
        if let Some(ty) = self.ty {
            if !ty.accepts(value) {
                return false;
            }
        }
        if self.allowed.is_empty() && self.patterns.is_empty() {
            return true;
        }
        self.allowed.iter().any(|a| a == value)
            || self.patterns.iter().any(|p| p.regex.is_match(value))
    }

    /// Choices listed in a value diagnostic: literals first, then pattern names.
    pub fn choices(&self) -> Vec<String> {
        self.allowed
            .iter()
            .cloned()
            .chain(self.patterns.iter().map(|p| p.display.clone()))
            .collect()
    }

    /// True when values outside the literal allowed set are accepted.
    pub fn is_free_form(&self) -> bool {
        !self.patterns.is_empty() || (self.ty.is_some() && self.allowed.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_range() {
        let ty = ValueType::parse("u32", Some([1, 65535])).unwrap();
        assert!(ty.accepts("22"));
        assert!(!ty.accepts("0"));
        assert!(!ty.accepts("70000"));
        assert!(!ty.accepts("ssh"));
    }

    #[test]
    fn test_address_types() {
        assert!(ValueType::Ipv4.accepts("10.0.0.1"));
        assert!(!ValueType::Ipv4.accepts("::1"));
        assert!(ValueType::IpAddr.accepts("::1"));
        assert!(ValueType::Ipv4Prefix.accepts("10.0.0.0/8"));
        assert!(!ValueType::Ipv4Prefix.accepts("10.0.0.0/33"));
        assert!(ValueType::Ipv6Prefix.accepts("2001:db8::/32"));
        assert!(ValueType::parse("float", None).is_none());
    }

    #[test]
    fn test_allowed_and_patterns() {
        let spec = ValueSpec {
            ty: Some(ValueType::Txt),
            allowed: vec!["auto".into()],
            patterns: vec![ValuePattern::new("dp[0-9]+s[0-9]+", "<dpFsN>").unwrap()],
            default: None,
        };
        assert!(spec.accepts("auto"));
        assert!(spec.accepts("dp0s3"));
        assert!(!spec.accepts("xdp0s3"));
        assert_eq!(spec.choices(), vec!["auto".to_string(), "<dpFsN>".to_string()]);
        assert!(spec.is_free_form());
    }

    #[test]
    fn test_presence_leaf_takes_no_value() {
        let spec = ValueSpec::default();
        assert!(!spec.takes_value());
        assert!(!spec.accepts("anything"));
    }
}
