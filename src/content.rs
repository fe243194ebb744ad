// SPDX-License-Identifier: MPL-2.0

//! Content classification for saved codes
//!
//! Codes are stored as raw text. The list screen and `show` command use
//! [`ContentKind`] to label what a code holds and which action makes sense.

/// WiFi security type from a `WIFI:` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiSecurity {
    Open,
    Wep,
    Wpa,
    Enterprise,
    Wpa3,
}

impl WifiSecurity {
    fn from_field(value: &str) -> Self {
        match value.to_uppercase().as_str() {
            "" | "NOPASS" => Self::Open,
            "WEP" => Self::Wep,
            "WPA2-EAP" | "WPA3-EAP" => Self::Enterprise,
            "WPA3" | "SAE" => Self::Wpa3,
            _ => Self::Wpa,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Wep => "WEP",
            Self::Wpa => "WPA/WPA2",
            Self::Enterprise => "Enterprise",
            Self::Wpa3 => "WPA3",
        }
    }
}

/// What a decoded payload represents
#[derive(Debug, Clone, PartialEq)]
pub enum ContentKind {
    Url(String),
    Wifi {
        ssid: String,
        password: Option<String>,
        security: WifiSecurity,
        hidden: bool,
    },
    Phone(String),
    Email {
        address: String,
        subject: Option<String>,
    },
    Sms {
        number: String,
        message: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
    Contact,
    Event,
    Text,
}

impl ContentKind {
    /// Classify raw code content; anything unrecognized is [`ContentKind::Text`]
    pub fn classify(content: &str) -> Self {
        let trimmed = content.trim();

        if let Some(rest) = trimmed.strip_prefix("WIFI:") {
            return parse_wifi(rest);
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Self::Url(trimmed.to_string());
        }
        if let Some(number) = strip_prefix_ci(trimmed, "tel:") {
            return Self::Phone(number.to_string());
        }
        if let Some(rest) = strip_prefix_ci(trimmed, "mailto:") {
            let (address, query) = rest.split_once('?').unwrap_or((rest, ""));
            return Self::Email {
                address: address.to_string(),
                subject: query_param(query, "subject"),
            };
        }
        if let Some(rest) =
            strip_prefix_ci(trimmed, "smsto:").or_else(|| strip_prefix_ci(trimmed, "sms:"))
        {
            // smsto:NUMBER:MESSAGE and sms:NUMBER?body=MESSAGE are both common
            let (number, message) = match rest.split_once(':') {
                Some((number, message)) => (number, Some(message.to_string())),
                None => {
                    let (number, query) = rest.split_once('?').unwrap_or((rest, ""));
                    (number, query_param(query, "body"))
                }
            };
            return Self::Sms {
                number: number.to_string(),
                message,
            };
        }
        if let Some(rest) = strip_prefix_ci(trimmed, "geo:")
            && let Some(location) = parse_geo(rest)
        {
            return location;
        }
        if trimmed.starts_with("BEGIN:VCARD") || trimmed.starts_with("MECARD:") {
            return Self::Contact;
        }
        if trimmed.starts_with("BEGIN:VCALENDAR") || trimmed.starts_with("BEGIN:VEVENT") {
            return Self::Event;
        }
        if looks_like_domain(trimmed) {
            return Self::Url(format!("https://{}", trimmed));
        }

        Self::Text
    }

    /// Label for the primary row action
    pub fn action_label(&self) -> &'static str {
        match self {
            Self::Url(_) => "Open Link",
            Self::Wifi { .. } => "Connect to WiFi",
            Self::Phone(_) => "Call",
            Self::Email { .. } => "Send Email",
            Self::Sms { .. } => "Send SMS",
            Self::Location { .. } => "Open Map",
            Self::Contact => "Add Contact",
            Self::Event => "Add Event",
            Self::Text => "Copy Text",
        }
    }

    /// Short human description shown next to the raw content
    pub fn summary(&self) -> String {
        match self {
            Self::Url(url) => format!("Link: {}", url),
            Self::Wifi {
                ssid,
                security,
                hidden,
                ..
            } => {
                let hidden = if *hidden { ", hidden" } else { "" };
                format!("WiFi: {} ({}{})", ssid, security.display_name(), hidden)
            }
            Self::Phone(number) => format!("Phone: {}", number),
            Self::Email { address, subject } => match subject {
                Some(subject) => format!("Email: {} ({})", address, subject),
                None => format!("Email: {}", address),
            },
            Self::Sms { number, .. } => format!("SMS: {}", number),
            Self::Location {
                latitude,
                longitude,
            } => format!("Location: {:.5}, {:.5}", latitude, longitude),
            Self::Contact => "Contact card".to_string(),
            Self::Event => "Calendar event".to_string(),
            Self::Text => "Text".to_string(),
        }
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn looks_like_domain(s: &str) -> bool {
    if s.len() >= 256 || s.contains(char::is_whitespace) || !s.contains('.') {
        return false;
    }
    let host = s.split('/').next().unwrap_or(s).to_lowercase();
    host.starts_with("www.")
        || [".com", ".org", ".net", ".io", ".br"]
            .iter()
            .any(|tld| host.ends_with(tld))
}

/// Parse `S:ssid;T:WPA;P:secret;H:true;;` (prefix already removed)
fn parse_wifi(fields: &str) -> ContentKind {
    let mut ssid = String::new();
    let mut password = None;
    let mut security = WifiSecurity::Open;
    let mut hidden = false;

    for (key, value) in split_wifi_fields(fields) {
        match key.as_str() {
            "S" => ssid = value,
            "P" => password = Some(value),
            "T" => security = WifiSecurity::from_field(&value),
            "H" => hidden = value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }

    ContentKind::Wifi {
        ssid,
        password,
        security,
        hidden,
    }
}

/// Split on unescaped `;`, unescaping `\;`, `\:`, `\,` and `\\` in values
fn split_wifi_fields(fields: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = fields.chars();

    let mut flush = |current: &mut String| {
        if let Some((key, value)) = current.split_once(':') {
            out.push((key.to_string(), value.to_string()));
        }
        current.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    // Keep ':' escapes out of the key/value split
                    if escaped == ':' {
                        current.push('\u{0}');
                    } else {
                        current.push(escaped);
                    }
                }
            }
            ';' => flush(&mut current),
            _ => current.push(c),
        }
    }
    flush(&mut current);

    out.into_iter()
        .map(|(k, v)| (k.replace('\u{0}', ":"), v.replace('\u{0}', ":")))
        .collect()
}

fn parse_geo(rest: &str) -> Option<ContentKind> {
    let coords = rest.split(['?', ';']).next()?;
    let mut parts = coords.split(',');
    let latitude = parts.next()?.trim().parse::<f64>().ok()?;
    let longitude = parts.next()?.trim().parse::<f64>().ok()?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }
    Some(ContentKind::Location {
        latitude,
        longitude,
    })
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        key.eq_ignore_ascii_case(name)
            .then(|| percent_decode(value))
    })
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                        continue;
                    }
                    None => out.push(b'%'),
                }
            }
            b'+' => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
