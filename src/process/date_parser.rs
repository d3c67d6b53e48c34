use chrono::NaiveDate;

/// Slots per day (half-hour resolution).
pub const SLOTS_PER_DAY: u8 = 48;

/// A date cell split into its calendar date and optional `(hour, minute)` part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateCell {
    pub date: NaiveDate,
    pub time: Option<(u32, u32)>,
}

/// Parse `YYYY/M/D`, `YYYY-MM-DD` (either with a trailing time) or `YYYYMMDD`.
pub fn parse_date_cell(raw: &str) -> Option<DateCell> {
    let s = raw.trim();
    let (date_part, time_part) = match s.find(|c: char| c == ' ' || c == 'T') {
        Some(i) => (&s[..i], Some(s[i + 1..].trim())),
        None => (s, None),
    };

    let date = if date_part.contains('/') || date_part.contains('-') {
        let mut it = date_part.split(|c| c == '/' || c == '-');
        let y: i32 = it.next()?.parse().ok()?;
        let m: u32 = it.next()?.parse().ok()?;
        let d: u32 = it.next()?.parse().ok()?;
        if it.next().is_some() {
            return None;
        }
        NaiveDate::from_ymd_opt(y, m, d)?
    } else if date_part.len() == 8 && date_part.bytes().all(|b| b.is_ascii_digit()) {
        NaiveDate::parse_from_str(date_part, "%Y%m%d").ok()?
    } else {
        return None;
    };

    let time = match time_part {
        Some(t) if !t.is_empty() => Some(parse_clock(t)?),
        _ => None,
    };
    Some(DateCell { date, time })
}

/// Canonical `YYYYMMDD`, or `None` when the cell is not a valid date.
pub fn normalize_date(raw: &str) -> Option<String> {
    parse_date_cell(raw).map(|c| format_date(c.date))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// `H:MM`, `HH:MM` or `HH:MM:SS` (seconds must be zero) into `(hour, minute)`.
fn parse_clock(s: &str) -> Option<(u32, u32)> {
    let mut it = s.split(':');
    let h: u32 = it.next()?.trim().parse().ok()?;
    let m: u32 = it.next()?.trim().parse().ok()?;
    if let Some(sec) = it.next() {
        if sec.trim().parse::<u32>().ok()? != 0 {
            return None;
        }
    }
    if it.next().is_some() {
        return None;
    }
    Some((h, m))
}

/// Half-hour index for a wall-clock time. Only `:00` and `:30` exist;
/// `24:00` is the end-of-day alias for the last slot.
pub fn slot_from_hm(hour: u32, minute: u32) -> Option<u8> {
    match (hour, minute) {
        (24, 0) => Some(SLOTS_PER_DAY),
        (h, 0) if h <= 23 => Some((h * 2 + 1) as u8),
        (h, 30) if h <= 23 => Some((h * 2 + 2) as u8),
        _ => None,
    }
}

/// Slot from a cell: an integer `1..=48`, a clock time, or a 4-digit `HHMM`.
pub fn parse_slot(raw: &str) -> Option<u8> {
    let s = raw.trim();
    if s.contains(':') {
        let (h, m) = parse_clock(s)?;
        return slot_from_hm(h, m);
    }
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        if s.len() == 4 {
            let h: u32 = s[..2].parse().ok()?;
            let m: u32 = s[2..].parse().ok()?;
            return slot_from_hm(h, m);
        }
        let n: u8 = s.parse().ok()?;
        return (1..=SLOTS_PER_DAY).contains(&n).then_some(n);
    }
    None
}

/// Inverse of [`slot_from_hm`]: the wall-clock start of `slot`.
pub fn slot_start_time(slot: u8) -> Option<String> {
    if !(1..=SLOTS_PER_DAY).contains(&slot) {
        return None;
    }
    let idx = u32::from(slot - 1);
    Some(format!("{:02}:{:02}", idx / 2, (idx % 2) * 30))
}

/// Wall-clock label of `slot` in the publishers' convention: the start time,
/// except slot 48 which is labelled `24:00`. [`parse_slot`] reads it back.
pub fn slot_label(slot: u8) -> Option<String> {
    if slot == SLOTS_PER_DAY {
        return Some("24:00".to_string());
    }
    slot_start_time(slot)
}

/// Identity key: `date_slot`, plus `_tag` when several sources share a table.
pub fn master_key(date: &str, slot: u8, tag: Option<&str>) -> String {
    match tag {
        Some(t) => format!("{date}_{slot}_{t}"),
        None => format!("{date}_{slot}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_total_and_increasing() {
        let mut prev = 0u8;
        for h in 0..24 {
            for m in [0, 30] {
                let s = slot_from_hm(h, m).unwrap();
                assert!(s > prev);
                prev = s;
            }
        }
        assert_eq!(prev, 48);
        assert_eq!(parse_slot("00:00"), Some(1));
        assert_eq!(parse_slot("24:00"), Some(48));
        assert_eq!(slot_label(1).as_deref(), Some("00:00"));
        assert_eq!(slot_label(48).as_deref(), Some("24:00"));
        assert_eq!(slot_start_time(48).as_deref(), Some("23:30"));
    }

    #[test]
    fn labels_round_trip_every_slot() {
        for slot in 1..=48u8 {
            let label = slot_label(slot).unwrap();
            assert_eq!(parse_slot(&label), Some(slot), "{label}");
        }
        assert_eq!(slot_label(47).as_deref(), Some("23:00"));
        assert!(slot_label(0).is_none());
        assert!(slot_label(49).is_none());
    }

    #[test]
    fn slot_inputs() {
        assert_eq!(parse_slot("0:30"), Some(2));
        assert_eq!(parse_slot("23:30:00"), Some(48));
        assert_eq!(parse_slot("1330"), Some(28));
        assert_eq!(parse_slot("17"), Some(17));
        assert_eq!(parse_slot("0"), None);
        assert_eq!(parse_slot("49"), None);
        assert_eq!(parse_slot("10:15"), None);
        assert_eq!(parse_slot("10:00:05"), None);
        assert_eq!(parse_slot("24:30"), None);
        assert_eq!(parse_slot(""), None);
    }

    #[test]
    fn start_time_round_trips_every_slot() {
        for slot in 1..=48u8 {
            let t = slot_start_time(slot).unwrap();
            assert_eq!(parse_slot(&t), Some(slot));
        }
        assert!(slot_start_time(0).is_none());
        assert!(slot_start_time(49).is_none());
    }

    #[test]
    fn date_formats() {
        assert_eq!(normalize_date("2024/4/1").as_deref(), Some("20240401"));
        assert_eq!(normalize_date("2024-04-01").as_deref(), Some("20240401"));
        assert_eq!(normalize_date("20240401").as_deref(), Some("20240401"));
        assert_eq!(normalize_date(" 2024/12/31 ").as_deref(), Some("20241231"));
        assert!(normalize_date("2024/2/30").is_none());
        assert!(normalize_date("April 1").is_none());
        assert!(normalize_date("").is_none());
    }

    #[test]
    fn datetime_cells_keep_the_time() {
        let c = parse_date_cell("2024/4/1 1:00:00").unwrap();
        assert_eq!(format_date(c.date), "20240401");
        assert_eq!(c.time, Some((1, 0)));
        assert_eq!(parse_date_cell("2024-04-01T13:30").unwrap().time, Some((13, 30)));
        assert_eq!(parse_date_cell("2024/4/1").unwrap().time, None);
    }

    #[test]
    fn master_keys() {
        assert_eq!(master_key("20240401", 3, None), "20240401_3");
        assert_eq!(master_key("20240401", 3, Some("tepco")), "20240401_3_tepco");
    }
}
