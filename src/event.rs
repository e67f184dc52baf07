//! # Calendar domain model
//! Countries, importance levels and the normalized `EconomicEvent` every
//! component after the adapters works with. Raw provider rows and operator
//! input are turned into events here; anything that fails to normalize never
//! reaches the filter engine.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Economies the bot knows how to name. Only a subset is alert-eligible
/// (see `filter::FilterRules`); the rest exist so they can be recognised and
/// filtered out explicitly instead of being confused with unmapped input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Country {
    UnitedStates,
    EuroArea,
    UnitedKingdom,
    Japan,
    China,
    Germany,
    France,
    Italy,
    Canada,
    Australia,
    NewZealand,
    Switzerland,
    India,
    SouthKorea,
    Brazil,
}

impl Country {
    pub const ALL: [Country; 15] = [
        Country::UnitedStates,
        Country::EuroArea,
        Country::UnitedKingdom,
        Country::Japan,
        Country::China,
        Country::Germany,
        Country::France,
        Country::Italy,
        Country::Canada,
        Country::Australia,
        Country::NewZealand,
        Country::Switzerland,
        Country::India,
        Country::SouthKorea,
        Country::Brazil,
    ];

    /// Short code used in storage and dedupe keys.
    pub fn code(self) -> &'static str {
        match self {
            Country::UnitedStates => "US",
            Country::EuroArea => "EA",
            Country::UnitedKingdom => "UK",
            Country::Japan => "JP",
            Country::China => "CN",
            Country::Germany => "DE",
            Country::France => "FR",
            Country::Italy => "IT",
            Country::Canada => "CA",
            Country::Australia => "AU",
            Country::NewZealand => "NZ",
            Country::Switzerland => "CH",
            Country::India => "IN",
            Country::SouthKorea => "KR",
            Country::Brazil => "BR",
        }
    }

    pub fn name_en(self) -> &'static str {
        match self {
            Country::UnitedStates => "United States",
            Country::EuroArea => "Euro Area",
            Country::UnitedKingdom => "United Kingdom",
            Country::Japan => "Japan",
            Country::China => "China",
            Country::Germany => "Germany",
            Country::France => "France",
            Country::Italy => "Italy",
            Country::Canada => "Canada",
            Country::Australia => "Australia",
            Country::NewZealand => "New Zealand",
            Country::Switzerland => "Switzerland",
            Country::India => "India",
            Country::SouthKorea => "South Korea",
            Country::Brazil => "Brazil",
        }
    }

    pub fn name_zh(self) -> &'static str {
        match self {
            Country::UnitedStates => "美国",
            Country::EuroArea => "欧元区",
            Country::UnitedKingdom => "英国",
            Country::Japan => "日本",
            Country::China => "中国",
            Country::Germany => "德国",
            Country::France => "法国",
            Country::Italy => "意大利",
            Country::Canada => "加拿大",
            Country::Australia => "澳大利亚",
            Country::NewZealand => "新西兰",
            Country::Switzerland => "瑞士",
            Country::India => "印度",
            Country::SouthKorea => "韩国",
            Country::Brazil => "巴西",
        }
    }

    pub fn flag(self) -> &'static str {
        match self {
            Country::UnitedStates => "🇺🇸",
            Country::EuroArea => "🇪🇺",
            Country::UnitedKingdom => "🇬🇧",
            Country::Japan => "🇯🇵",
            Country::China => "🇨🇳",
            Country::Germany => "🇩🇪",
            Country::France => "🇫🇷",
            Country::Italy => "🇮🇹",
            Country::Canada => "🇨🇦",
            Country::Australia => "🇦🇺",
            Country::NewZealand => "🇳🇿",
            Country::Switzerland => "🇨🇭",
            Country::India => "🇮🇳",
            Country::SouthKorea => "🇰🇷",
            Country::Brazil => "🇧🇷",
        }
    }

    /// Lowercase spellings seen across providers: ISO codes, currencies,
    /// and the long names each upstream prefers.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Country::UnitedStates => &["us", "usa", "u.s.", "united states", "america", "usd"],
            Country::EuroArea => &[
                "ea", "eu", "emu", "euro area", "euro zone", "eurozone", "euro-zone",
                "european union", "eur",
            ],
            Country::UnitedKingdom => &["uk", "gb", "great britain", "britain", "united kingdom", "gbp"],
            Country::Japan => &["jp", "japan", "jpy"],
            Country::China => &["cn", "china", "prc", "cny"],
            Country::Germany => &["de", "germany"],
            Country::France => &["fr", "france"],
            Country::Italy => &["it", "italy"],
            Country::Canada => &["ca", "canada", "cad"],
            Country::Australia => &["au", "australia", "aud"],
            Country::NewZealand => &["nz", "new zealand", "nzd"],
            Country::Switzerland => &["ch", "switzerland", "chf"],
            Country::India => &["in", "india", "inr"],
            Country::SouthKorea => &["kr", "korea", "south korea", "krw"],
            Country::Brazil => &["br", "brazil", "brl"],
        }
    }

    /// Map any provider or operator spelling onto a variant.
    /// Returns `None` for names with no entry in the table.
    pub fn normalize(raw: &str) -> Option<Country> {
        let t = raw.trim();
        if t.is_empty() {
            return None;
        }
        let lower = t.to_lowercase();
        Country::ALL.into_iter().find(|c| {
            c.aliases().contains(&lower.as_str()) || c.name_zh() == t
        })
    }
}

impl Serialize for Country {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Country {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Country::normalize(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown country: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
}

impl Importance {
    /// Words ("High"), numeric levels ("3") and star ratings ("***").
    pub fn normalize(raw: &str) -> Option<Importance> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" | "h" | "3" | "***" => Some(Importance::High),
            "medium" | "moderate" | "m" | "2" | "**" => Some(Importance::Medium),
            "low" | "l" | "1" | "*" => Some(Importance::Low),
            _ => None,
        }
    }

    pub fn from_level(level: i64) -> Option<Importance> {
        match level {
            3.. => Some(Importance::High),
            2 => Some(Importance::Medium),
            1 => Some(Importance::Low),
            _ => None,
        }
    }

    pub fn label_en(self) -> &'static str {
        match self {
            Importance::High => "High",
            Importance::Medium => "Medium",
            Importance::Low => "Low",
        }
    }

    pub fn label_zh(self) -> &'static str {
        match self {
            Importance::High => "高",
            Importance::Medium => "中",
            Importance::Low => "低",
        }
    }
}

/// A calendar release in the common shape. Timestamps are always UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomicEvent {
    pub country: Country,
    #[serde(rename = "event")]
    pub title: String,
    #[serde(rename = "date")]
    pub scheduled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
}

impl EconomicEvent {
    pub fn new(country: Country, title: impl Into<String>, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            country,
            title: title.into(),
            scheduled_at,
            forecast: None,
            previous: None,
            importance: None,
        }
    }

    pub fn with_figures(mut self, forecast: Option<&str>, previous: Option<&str>) -> Self {
        self.forecast = forecast.map(str::to_string);
        self.previous = previous.map(str::to_string);
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Composite identity: country, normalized title, minute-truncated time.
    /// Sub-minute jitter between polls maps onto the same identity.
    pub fn identity(&self) -> String {
        format!(
            "{}:{}:{}",
            self.country.code(),
            minute_key(self.scheduled_at),
            normalize_title(&self.title)
        )
    }
}

/// `2025-03-12T12:30`, the dedupe granularity.
pub fn minute_key(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M").to_string()
}

pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse RFC 3339 (any offset) or a naive date-time interpreted as UTC.
/// Date-only strings carry no release time and are rejected.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventValidationError {
    #[error("country is missing")]
    MissingCountry,
    #[error("unknown country: {0}")]
    UnknownCountry(String),
    #[error("event title is missing")]
    MissingTitle,
    #[error("date is missing")]
    MissingDate,
    #[error("unparseable date: {0}")]
    BadDate(String),
}

/// Un-normalized event as it arrives from an operator (admin endpoint) or a
/// loosely-typed upstream row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub country: String,
    #[serde(default, alias = "title", alias = "name")]
    pub event: String,
    #[serde(default, alias = "time", alias = "datetime", alias = "scheduled_at")]
    pub date: String,
    #[serde(default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub forecast: Option<String>,
    #[serde(default, deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(default, alias = "importance", deserialize_with = "de_text", skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
}

impl RawEvent {
    pub fn into_event(self) -> Result<EconomicEvent, EventValidationError> {
        let country_raw = self.country.trim();
        if country_raw.is_empty() {
            return Err(EventValidationError::MissingCountry);
        }
        let country = Country::normalize(country_raw)
            .ok_or_else(|| EventValidationError::UnknownCountry(country_raw.to_string()))?;

        let title = self.event.trim();
        if title.is_empty() {
            return Err(EventValidationError::MissingTitle);
        }

        let date_raw = self.date.trim();
        if date_raw.is_empty() {
            return Err(EventValidationError::MissingDate);
        }
        let scheduled_at = parse_timestamp(date_raw)
            .ok_or_else(|| EventValidationError::BadDate(date_raw.to_string()))?;

        Ok(EconomicEvent {
            country,
            title: title.to_string(),
            scheduled_at,
            forecast: clean_text(self.forecast),
            previous: clean_text(self.previous),
            importance: self.impact.as_deref().and_then(Importance::normalize),
        })
    }
}

/// Trim and drop empty figures ("", "  ").
pub fn clean_text(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Figures arrive as strings ("0.3%") or bare numbers (0.3) depending on
/// the provider; keep them as display text either way.
pub fn value_to_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => clean_text(Some(s.clone())),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn de_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(value_to_text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn country_aliases_normalize() {
        assert_eq!(Country::normalize("United States"), Some(Country::UnitedStates));
        assert_eq!(Country::normalize("usd"), Some(Country::UnitedStates));
        assert_eq!(Country::normalize("Euro Zone"), Some(Country::EuroArea));
        assert_eq!(Country::normalize("EUR"), Some(Country::EuroArea));
        assert_eq!(Country::normalize("GBP"), Some(Country::UnitedKingdom));
        assert_eq!(Country::normalize("中国"), Some(Country::China));
        assert_eq!(Country::normalize("Atlantis"), None);
        assert_eq!(Country::normalize("  "), None);
    }

    #[test]
    fn importance_from_words_and_levels() {
        assert_eq!(Importance::normalize("High"), Some(Importance::High));
        assert_eq!(Importance::normalize("2"), Some(Importance::Medium));
        assert_eq!(Importance::normalize("Holiday"), None);
        assert_eq!(Importance::from_level(3), Some(Importance::High));
        assert_eq!(Importance::from_level(0), None);
    }

    #[test]
    fn timestamps_parse_rfc3339_and_naive_utc() {
        let a = parse_timestamp("2025-03-12T08:30:00-04:00").unwrap();
        assert_eq!(a.hour(), 12);
        let b = parse_timestamp("2025-03-12 12:30:00").unwrap();
        assert_eq!(a, b);
        let c = parse_timestamp("2025-03-12T12:30").unwrap();
        assert_eq!(a, c);
        assert!(parse_timestamp("2025-03-12").is_none());
        assert!(parse_timestamp("next tuesday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn identity_absorbs_sub_minute_jitter() {
        let t0 = parse_timestamp("2025-03-12T12:30:00Z").unwrap();
        let t1 = parse_timestamp("2025-03-12T12:30:41Z").unwrap();
        let a = EconomicEvent::new(Country::UnitedStates, "Core CPI y/y", t0);
        let b = EconomicEvent::new(Country::UnitedStates, "  core  CPI y/y ", t1);
        assert_eq!(a.identity(), b.identity());

        let next_day = parse_timestamp("2025-03-13T12:30:00Z").unwrap();
        let c = EconomicEvent::new(Country::UnitedStates, "Core CPI y/y", next_day);
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn raw_event_validation_reports_first_problem() {
        let ok: RawEvent = serde_json::from_str(
            r#"{"country":"United States","event":"Core CPI y/y","date":"2025-03-12T12:30:00Z","forecast":0.3,"previous":"0.2%"}"#,
        )
        .unwrap();
        let ev = ok.into_event().unwrap();
        assert_eq!(ev.country, Country::UnitedStates);
        assert_eq!(ev.forecast.as_deref(), Some("0.3"));
        assert_eq!(ev.previous.as_deref(), Some("0.2%"));

        let bad_date = RawEvent {
            country: "US".into(),
            event: "GDP".into(),
            date: "soon".into(),
            ..Default::default()
        };
        assert_eq!(
            bad_date.into_event(),
            Err(EventValidationError::BadDate("soon".into()))
        );

        let no_country = RawEvent {
            event: "GDP".into(),
            date: "2025-03-12T12:30:00Z".into(),
            ..Default::default()
        };
        assert_eq!(no_country.into_event(), Err(EventValidationError::MissingCountry));
    }
}
