//! Deterministic Spanish text analysis: normalization, slot extraction,
//! and the phrase tables for affirmation, decline, and human handoff.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};

use casona_core::domain::reservation::ReservationId;

const YES_PHRASES: &[&str] =
    &["si", "claro", "por supuesto", "obvio", "quiero", "seguro", "de acuerdo", "sale", "va"];

const NO_PHRASES: &[&str] = &["no", "nel", "nah", "mejor no", "no gracias", "cancelalo"];

const HUMAN_PHRASES: &[&str] = &[
    "humano",
    "persona",
    "agente",
    "gerente",
    "encargado",
    "operador",
    "hablar con alguien",
    "atencion al cliente",
];

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("lunes", Weekday::Mon),
    ("martes", Weekday::Tue),
    ("miercoles", Weekday::Wed),
    ("jueves", Weekday::Thu),
    ("viernes", Weekday::Fri),
    ("sabado", Weekday::Sat),
    ("domingo", Weekday::Sun),
];

const MONTHS: &[(&str, u32)] = &[
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedSlots {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub party_size: Option<u32>,
    pub reservation_id: Option<ReservationId>,
}

impl ExtractedSlots {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.time.is_none()
            && self.party_size.is_none()
            && self.reservation_id.is_none()
    }
}

/// Lowercase, strip accents, collapse everything else to spaces.
/// "¿Reservación el SÁBADO?" → "reservacion el sabado".
pub fn normalize_text(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    for character in text.to_lowercase().chars() {
        let replacement = match character {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            c if c.is_alphanumeric() || c == ':' || c == '/' => c,
            _ => ' ',
        };
        normalized.push(replacement);
    }
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tokenize(normalized_text: &str) -> Vec<&str> {
    normalized_text.split_whitespace().collect()
}

pub fn extract_slots(text: &str, today: NaiveDate) -> ExtractedSlots {
    let normalized_text = normalize_text(text);
    let tokens = tokenize(&normalized_text);

    ExtractedSlots {
        date: extract_date(&normalized_text, &tokens, today),
        time: extract_time(&tokens),
        party_size: extract_party_size(&tokens),
        reservation_id: extract_reservation_id(&tokens),
    }
}

/// Short standalone agreement ("sí", "claro que sí"). A longer message that
/// happens to contain "quiero" is treated as new content, not a confirmation.
pub fn is_affirmation(normalized_text: &str) -> bool {
    if is_decline(normalized_text) {
        return false;
    }
    let tokens = tokenize(normalized_text);
    if tokens.len() > 6 {
        return false;
    }
    YES_PHRASES.iter().any(|phrase| contains_phrase(&tokens, phrase))
}

pub fn is_decline(normalized_text: &str) -> bool {
    let tokens = tokenize(normalized_text);
    if tokens.len() > 6 {
        return false;
    }
    NO_PHRASES.iter().any(|phrase| contains_phrase(&tokens, phrase))
}

/// "quiero hablar con una persona" asks for a human. "para 4 personas" does
/// not: a person-count right after a number is a party size, never a handoff.
pub fn wants_human(normalized_text: &str) -> bool {
    let tokens = tokenize(normalized_text);
    HUMAN_PHRASES.iter().any(|phrase| {
        let words: Vec<&str> = phrase.split(' ').collect();
        (0..tokens.len()).any(|index| {
            if !matches_at(&tokens, index, &words) {
                return false;
            }
            if words == ["persona"] || words == ["personas"] {
                return !preceded_by_count(&tokens, index);
            }
            true
        })
    })
}

fn contains_phrase(tokens: &[&str], phrase: &str) -> bool {
    let words: Vec<&str> = phrase.split(' ').collect();
    (0..tokens.len()).any(|index| matches_at(tokens, index, &words))
}

fn matches_at(tokens: &[&str], index: usize, words: &[&str]) -> bool {
    if index + words.len() > tokens.len() {
        return false;
    }
    words.iter().enumerate().all(|(offset, word)| {
        let token = tokens[index + offset];
        token == *word || (words.len() == 1 && *word == "persona" && token == "personas")
    })
}

fn preceded_by_count(tokens: &[&str], index: usize) -> bool {
    if index == 0 {
        return false;
    }
    tokens[index - 1].parse::<u32>().is_ok()
}

fn extract_date(normalized_text: &str, tokens: &[&str], today: NaiveDate) -> Option<NaiveDate> {
    if normalized_text.contains("pasado manana") {
        return Some(today + Duration::days(2));
    }
    if normalized_text.contains("hoy") {
        return Some(today);
    }
    // "mañana" alone is tomorrow; "de la mañana" is a time of day.
    if tokens.contains(&"manana") && !normalized_text.contains("de la manana") {
        return Some(today + Duration::days(1));
    }

    for (name, weekday) in WEEKDAYS {
        if tokens.contains(name) {
            return Some(next_weekday(today, *weekday));
        }
    }

    // "15 de junio" and "15 de junio de 2026".
    for (index, token) in tokens.iter().enumerate() {
        let Ok(day) = token.parse::<u32>() else {
            continue;
        };
        if index + 2 >= tokens.len() || tokens[index + 1] != "de" {
            continue;
        }
        let Some(month) = MONTHS.iter().find(|(name, _)| *name == tokens[index + 2]) else {
            continue;
        };
        let year = tokens
            .get(index + 4)
            .filter(|_| tokens.get(index + 3) == Some(&"de"))
            .and_then(|t| t.parse::<i32>().ok());
        return resolve_day_month(day, month.1, year, today);
    }

    // "15/06" and "15/06/2026".
    for token in tokens {
        let parts: Vec<&str> = token.split('/').collect();
        if parts.len() < 2 || parts.len() > 3 {
            continue;
        }
        let (Ok(day), Ok(month)) = (parts[0].parse::<u32>(), parts[1].parse::<u32>()) else {
            continue;
        };
        let year = parts.get(2).and_then(|p| p.parse::<i32>().ok());
        if let Some(date) = resolve_day_month(day, month, year, today) {
            return Some(date);
        }
    }

    None
}

fn next_weekday(today: NaiveDate, target: Weekday) -> NaiveDate {
    let ahead = (target.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
    let ahead = if ahead == 0 { 7 } else { ahead };
    today + Duration::days(i64::from(ahead))
}

fn resolve_day_month(
    day: u32,
    month: u32,
    year: Option<i32>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    if let Some(year) = year {
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year >= today {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    }
}

fn extract_time(tokens: &[&str]) -> Option<NaiveTime> {
    for (index, token) in tokens.iter().enumerate() {
        let Some((hour, minute, explicit)) = parse_clock(token) else {
            continue;
        };
        // A bare number only counts as a time after "a las" / "a la".
        let after_a_las = index >= 2
            && tokens[index - 2] == "a"
            && (tokens[index - 1] == "las" || tokens[index - 1] == "la");
        if !explicit && !after_a_las {
            continue;
        }

        let mut hour = hour;
        if hour > 23 || minute > 59 {
            continue;
        }
        match meridiem_after(tokens, index) {
            Some(Meridiem::Evening) if hour < 12 => hour += 12,
            Some(Meridiem::Morning) => {}
            // Dinner service dominates: bare hours below noon read as evening.
            None if (1..=11).contains(&hour) => hour += 12,
            _ => {}
        }
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    None
}

enum Meridiem {
    Morning,
    Evening,
}

fn meridiem_after(tokens: &[&str], index: usize) -> Option<Meridiem> {
    let rest = &tokens[index + 1..tokens.len().min(index + 4)];
    if rest.first() == Some(&"pm") || rest.ends_with(&["la", "noche"]) || rest.ends_with(&["la", "tarde"]) {
        return Some(Meridiem::Evening);
    }
    if rest.first() == Some(&"am") || rest.ends_with(&["la", "manana"]) {
        return Some(Meridiem::Morning);
    }
    None
}

/// Accepts "20:30", "8pm", "8:30pm", and bare "8".
fn parse_clock(token: &str) -> Option<(u32, u32, bool)> {
    let (body, suffix_pm, suffix_am) = if let Some(stripped) = token.strip_suffix("pm") {
        (stripped, true, false)
    } else if let Some(stripped) = token.strip_suffix("am") {
        (stripped, false, true)
    } else {
        (token, false, false)
    };

    let (hour, minute, had_colon) = match body.split_once(':') {
        Some((h, m)) => (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?, true),
        None => (body.parse::<u32>().ok()?, 0, false),
    };

    let hour = if suffix_pm && hour < 12 { hour + 12 } else { hour };
    if suffix_am && hour > 12 {
        return None;
    }
    Some((hour, minute, had_colon || suffix_pm || suffix_am))
}

fn extract_party_size(tokens: &[&str]) -> Option<u32> {
    for (index, token) in tokens.iter().enumerate() {
        let Ok(count) = token.parse::<u32>() else {
            continue;
        };
        if !(1..=50).contains(&count) {
            continue;
        }
        let next = tokens.get(index + 1).copied();
        let prev = tokens.get(index.wrapping_sub(1)).copied();
        if matches!(next, Some("personas" | "persona" | "gentes" | "gente"))
            || (prev == Some("somos"))
            || (prev == Some("para") && next != Some("de"))
        {
            return Some(count);
        }
    }
    None
}

fn extract_reservation_id(tokens: &[&str]) -> Option<ReservationId> {
    for (index, token) in tokens.iter().enumerate() {
        if !matches!(*token, "reservacion" | "reserva" | "folio" | "numero") {
            continue;
        }
        if let Some(id) = tokens.get(index + 1).and_then(|t| t.parse::<i64>().ok()) {
            return Some(ReservationId(id));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use casona_core::domain::reservation::ReservationId;

    use super::{extract_slots, is_affirmation, is_decline, normalize_text, wants_human};

    fn today() -> NaiveDate {
        // A Tuesday.
        NaiveDate::from_ymd_opt(2025, 6, 10).expect("valid date")
    }

    #[test]
    fn normalization_strips_accents_and_punctuation() {
        assert_eq!(normalize_text("¿Reservación el SÁBADO?"), "reservacion el sabado");
        assert_eq!(normalize_text("a las 20:30, señor"), "a las 20:30 senor");
    }

    #[test]
    fn affirmation_phrases() {
        let cases = [
            ("sí", true),
            ("si claro", true),
            ("por supuesto", true),
            ("obvio", true),
            ("de acuerdo", true),
            ("no", false),
            ("no gracias", false),
            ("no quiero", false),
            ("quiero reservar una mesa para este viernes en la noche", false),
        ];
        for (text, expected) in cases {
            assert_eq!(is_affirmation(&normalize_text(text)), expected, "{text}");
        }
    }

    #[test]
    fn decline_phrases() {
        let cases =
            [("no", true), ("nel", true), ("mejor no", true), ("no gracias", true), ("sí", false)];
        for (text, expected) in cases {
            assert_eq!(is_decline(&normalize_text(text)), expected, "{text}");
        }
    }

    #[test]
    fn human_handoff_skips_party_size_mentions() {
        assert!(wants_human(&normalize_text("quiero hablar con una persona")));
        assert!(wants_human(&normalize_text("pásame al gerente")));
        assert!(!wants_human(&normalize_text("una mesa para 4 personas")));
        assert!(!wants_human(&normalize_text("somos 2 personas")));
    }

    #[test]
    fn relative_dates_resolve_against_today() {
        assert_eq!(extract_slots("hoy", today()).date, NaiveDate::from_ymd_opt(2025, 6, 10));
        assert_eq!(extract_slots("mañana", today()).date, NaiveDate::from_ymd_opt(2025, 6, 11));
        assert_eq!(
            extract_slots("pasado mañana", today()).date,
            NaiveDate::from_ymd_opt(2025, 6, 12)
        );
    }

    #[test]
    fn weekday_resolves_to_next_occurrence() {
        // Viernes after Tuesday June 10 is June 13.
        assert_eq!(
            extract_slots("el viernes", today()).date,
            NaiveDate::from_ymd_opt(2025, 6, 13)
        );
        // Same weekday means next week, not today.
        assert_eq!(extract_slots("el martes", today()).date, NaiveDate::from_ymd_opt(2025, 6, 17));
    }

    #[test]
    fn explicit_dates_roll_into_next_year_when_past() {
        assert_eq!(
            extract_slots("el 15 de junio", today()).date,
            NaiveDate::from_ymd_opt(2025, 6, 15)
        );
        assert_eq!(
            extract_slots("el 3 de enero", today()).date,
            NaiveDate::from_ymd_opt(2026, 1, 3)
        );
        assert_eq!(extract_slots("el 20/07", today()).date, NaiveDate::from_ymd_opt(2025, 7, 20));
    }

    #[test]
    fn times_with_and_without_meridiem() {
        let cases = [
            ("a las 8pm", 20, 0),
            ("a las 20:30", 20, 30),
            ("a las 8", 20, 0),
            ("a las 10 de la mañana", 10, 0),
            ("a las 9 de la noche", 21, 0),
            ("8:30pm", 20, 30),
        ];
        for (text, hour, minute) in cases {
            assert_eq!(
                extract_slots(text, today()).time,
                NaiveTime::from_hms_opt(hour, minute, 0),
                "{text}"
            );
        }
    }

    #[test]
    fn bare_numbers_are_not_times() {
        assert_eq!(extract_slots("para 4 personas", today()).time, None);
        assert_eq!(extract_slots("reservación 42", today()).time, None);
    }

    #[test]
    fn party_size_patterns() {
        assert_eq!(extract_slots("para 4 personas", today()).party_size, Some(4));
        assert_eq!(extract_slots("somos 6", today()).party_size, Some(6));
        assert_eq!(extract_slots("mesa para 2", today()).party_size, Some(2));
        assert_eq!(extract_slots("el 15 de junio", today()).party_size, None);
    }

    #[test]
    fn reservation_id_follows_the_keyword() {
        assert_eq!(
            extract_slots("cancela mi reservación 42", today()).reservation_id,
            Some(ReservationId(42))
        );
        assert_eq!(extract_slots("para 4 personas", today()).reservation_id, None);
    }

    #[test]
    fn combined_utterance_fills_every_slot() {
        let slots = extract_slots("el viernes a las 8pm para 4 personas", today());
        assert_eq!(slots.date, NaiveDate::from_ymd_opt(2025, 6, 13));
        assert_eq!(slots.time, NaiveTime::from_hms_opt(20, 0, 0));
        assert_eq!(slots.party_size, Some(4));
    }
}
