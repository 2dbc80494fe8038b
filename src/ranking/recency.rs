// src/ranking/recency.rs

use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeDelta, Utc};

/// Language used for relative-age labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecencyLocale {
    #[default]
    English,
    Turkish,
}

impl FromStr for RecencyLocale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "tr" | "turkish" => Ok(Self::Turkish),
            other => Err(format!("unsupported recency locale '{}'", other)),
        }
    }
}

struct Phrases {
    unknown: &'static str,
    just_now: &'static str,
    minutes: &'static str,
    hours: &'static str,
    days: &'static str,
    weeks: &'static str,
    /// Appended after the absolute date.
    uploaded: &'static str,
    months: [&'static str; 12],
}

const ENGLISH: Phrases = Phrases {
    unknown: "unknown time",
    just_now: "just now",
    minutes: "minutes ago",
    hours: "hours ago",
    days: "days ago",
    weeks: "weeks ago",
    uploaded: ", uploaded on this date",
    months: [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ],
};

const TURKISH: Phrases = Phrases {
    unknown: "Bilinmeyen zaman",
    just_now: "az önce",
    minutes: "dakika önce",
    hours: "saat önce",
    days: "gün önce",
    weeks: "hafta önce",
    uploaded: " tarihinde yüklendi",
    months: [
        "Ocak", "Şubat", "Mart", "Nisan", "Mayıs", "Haziran", "Temmuz", "Ağustos", "Eylül",
        "Ekim", "Kasım", "Aralık",
    ],
};

/// Turns a creation timestamp into a "time ago" label.
///
/// Shared by every response that carries a `time_ago` field so posts,
/// comments, stories and activity logs all read the same way.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecencyFormatter {
    locale: RecencyLocale,
}

impl RecencyFormatter {
    pub fn new(locale: RecencyLocale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> RecencyLocale {
        self.locale
    }

    fn phrases(&self) -> &'static Phrases {
        match self.locale {
            RecencyLocale::English => &ENGLISH,
            RecencyLocale::Turkish => &TURKISH,
        }
    }

    /// Buckets (first match wins): unknown, future, minutes, hours, days,
    /// weeks, then the absolute date once the item is 30 days old.
    /// Every division truncates.
    pub fn format(&self, created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
        let phrases = self.phrases();

        let Some(created_at) = created_at else {
            return phrases.unknown.to_string();
        };

        let elapsed = now.signed_duration_since(created_at);
        if elapsed < TimeDelta::zero() {
            return phrases.just_now.to_string();
        }

        let minutes = elapsed.num_minutes();
        if minutes < 60 {
            return format!("{} {}", minutes, phrases.minutes);
        }

        let hours = elapsed.num_hours();
        if hours < 24 {
            return format!("{} {}", hours, phrases.hours);
        }

        let days = elapsed.num_days();
        if days < 7 {
            return format!("{} {}", days, phrases.days);
        }
        if days < 30 {
            return format!("{} {}", days / 7, phrases.weeks);
        }

        format!(
            "{} {} {}{}",
            created_at.day(),
            phrases.months[created_at.month0() as usize],
            created_at.year(),
            phrases.uploaded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap()
    }

    fn english() -> RecencyFormatter {
        RecencyFormatter::new(RecencyLocale::English)
    }

    #[test]
    fn missing_timestamp_is_unknown() {
        assert_eq!(english().format(None, now()), "unknown time");
    }

    #[test]
    fn minutes_bucket() {
        let f = english();
        assert_eq!(f.format(Some(now()), now()), "0 minutes ago");
        assert_eq!(
            f.format(Some(now() - TimeDelta::minutes(5)), now()),
            "5 minutes ago"
        );
        assert_eq!(
            f.format(Some(now() - TimeDelta::seconds(59 * 60 + 59)), now()),
            "59 minutes ago"
        );
    }

    #[test]
    fn hours_truncate() {
        let f = english();
        assert_eq!(
            f.format(Some(now() - TimeDelta::minutes(90)), now()),
            "1 hours ago"
        );
        assert_eq!(
            f.format(Some(now() - TimeDelta::minutes(23 * 60 + 59)), now()),
            "23 hours ago"
        );
    }

    #[test]
    fn days_and_weeks() {
        let f = english();
        assert_eq!(f.format(Some(now() - TimeDelta::days(1)), now()), "1 days ago");
        assert_eq!(f.format(Some(now() - TimeDelta::days(6)), now()), "6 days ago");
        assert_eq!(f.format(Some(now() - TimeDelta::days(7)), now()), "1 weeks ago");
        assert_eq!(f.format(Some(now() - TimeDelta::days(10)), now()), "1 weeks ago");
        assert_eq!(f.format(Some(now() - TimeDelta::days(29)), now()), "4 weeks ago");
    }

    #[test]
    fn thirty_days_and_beyond_is_absolute() {
        let f = english();
        let label = f.format(Some(now() - TimeDelta::days(40)), now());
        assert_eq!(label, "10 April 2024, uploaded on this date");
        assert!(!label.contains("ago"));

        assert_eq!(
            f.format(Some(now() - TimeDelta::days(30)), now()),
            "20 April 2024, uploaded on this date"
        );
    }

    #[test]
    fn future_timestamp_is_just_now() {
        assert_eq!(
            english().format(Some(now() + TimeDelta::minutes(3)), now()),
            "just now"
        );
    }

    #[test]
    fn turkish_phrases() {
        let f = RecencyFormatter::new(RecencyLocale::Turkish);
        assert_eq!(f.format(None, now()), "Bilinmeyen zaman");
        assert_eq!(
            f.format(Some(now() - TimeDelta::minutes(5)), now()),
            "5 dakika önce"
        );
        assert_eq!(
            f.format(Some(now() - TimeDelta::days(10)), now()),
            "1 hafta önce"
        );
        assert_eq!(
            f.format(Some(now() - TimeDelta::days(40)), now()),
            "10 Nisan 2024 tarihinde yüklendi"
        );
    }

    #[test]
    fn identical_inputs_identical_output() {
        let f = english();
        let at = Some(now() - TimeDelta::hours(5));
        assert_eq!(f.format(at, now()), f.format(at, now()));
    }

    #[test]
    fn parses_locale_names() {
        assert_eq!("tr".parse::<RecencyLocale>(), Ok(RecencyLocale::Turkish));
        assert_eq!(" EN ".parse::<RecencyLocale>(), Ok(RecencyLocale::English));
        assert!("de".parse::<RecencyLocale>().is_err());
    }
}
