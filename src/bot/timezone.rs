//! Conversion between the fixed system zone and participant zones.
//!
//! All lesson times in the store are wall-clock times in the system zone
//! (Saratov, UTC+4). Participants pick their own IANA zone in settings;
//! display times are converted right before sending.

use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use tracing::warn;

/// The zone all lesson times are stored in.
pub const SYSTEM_TZ: Tz = chrono_tz::Europe::Saratov;

/// Zone name the legacy fixed-offset strings normalize to.
pub const DEFAULT_ZONE: &str = "Europe/Saratov";

/// Zones offered in the settings keyboard, ordered by offset.
pub const TIMEZONES: &[(&str, &str)] = &[
    ("Europe/Kaliningrad", "🇷🇺 Калининград (UTC+2)"),
    ("Europe/Moscow", "🇷🇺 Москва (UTC+3)"),
    ("Europe/Saratov", "🇷🇺 Саратов (UTC+4)"),
    ("Asia/Yekaterinburg", "🇷🇺 Екатеринбург (UTC+5)"),
    ("Asia/Omsk", "🇷🇺 Омск (UTC+6)"),
    ("Asia/Krasnoyarsk", "🇷🇺 Красноярск (UTC+7)"),
    ("Asia/Irkutsk", "🇷🇺 Иркутск (UTC+8)"),
    ("Asia/Yakutsk", "🇷🇺 Якутск (UTC+9)"),
    ("Asia/Vladivostok", "🇷🇺 Владивосток (UTC+10)"),
    ("Asia/Magadan", "🇷🇺 Магадан (UTC+11)"),
    ("Asia/Kamchatka", "🇷🇺 Камчатка (UTC+12)"),
];

/// Human label for a zone name, or the raw name if it is not in the list.
pub fn zone_label(zone: &str) -> &str {
    TIMEZONES
        .iter()
        .find(|(name, _)| *name == zone)
        .map(|(_, label)| *label)
        .unwrap_or(zone)
}

/// Map legacy fixed-offset strings ("+04:00", "UTC+4") to the default zone.
///
/// Early participant rows stored raw offsets before zone selection existed.
/// They are treated as the system zone rather than rejected.
pub fn normalize_zone(zone: &str) -> &str {
    if zone.starts_with('+') || zone.starts_with('-') || zone.starts_with("UTC") {
        DEFAULT_ZONE
    } else {
        zone
    }
}

/// Convert a naive system-zone wall-clock time into a participant's zone.
///
/// Returns the wall-clock time in the target zone. On any failure (unknown
/// zone name, nonexistent local time) the input is returned unconverted and
/// the problem is logged; callers never have to handle an error here.
pub fn convert_to_zone(system_dt: NaiveDateTime, zone: &str) -> NaiveDateTime {
    let zone = normalize_zone(zone);
    let tz: Tz = match zone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Unknown time zone '{zone}', leaving time unconverted");
            return system_dt;
        }
    };

    match SYSTEM_TZ.from_local_datetime(&system_dt).earliest() {
        Some(localized) => localized.with_timezone(&tz).naive_local(),
        None => {
            warn!("Cannot localize {system_dt} in system zone, leaving unconverted");
            system_dt
        }
    }
}
