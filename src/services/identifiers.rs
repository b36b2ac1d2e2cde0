//! Serial numbers, barcodes and PCB-type resolution.
//!
//! Serial numbers look like `5YB-250314-0007`: board prefix, UTC date as `YYMMDD`, then
//! the unit's 1-based sequence within its work order, zero-padded to four digits.
//!
//! Barcodes are 11 digits and never contain a dash, so the two can't be confused:
//! four random digits, a two-digit board marker, five random digits.

use chrono::NaiveDate;
use rand::Rng;

use crate::entities::pcb_type;

pub const BARCODE_LEN: usize = 11;
pub const GENERIC_BARCODE_MARKER: &str = "24";

pub fn serial_number(prefix: &str, date: NaiveDate, sequence: u32) -> String {
    format!("{}-{}-{:04}", prefix, date.format("%y%m%d"), sequence)
}

/// Splits a serial number into `(prefix, date, sequence)`.
pub fn parse_serial_number(serial: &str) -> Option<(&str, NaiveDate, u32)> {
    let mut parts = serial.rsplitn(3, '-');
    let sequence = parts.next()?;
    let date = parts.next()?;
    let prefix = parts.next()?;

    if prefix.is_empty() || date.len() != 6 || sequence.len() < 4 {
        return None;
    }
    let date = NaiveDate::parse_from_str(date, "%y%m%d").ok()?;
    let sequence = sequence.parse().ok()?;
    Some((prefix, date, sequence))
}

pub fn is_valid_marker(marker: &str) -> bool {
    marker.len() == 2 && marker.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_barcode(value: &str) -> bool {
    value.len() == BARCODE_LEN && value.bytes().all(|b| b.is_ascii_digit())
}

/// Builds a barcode around `marker`, falling back to the generic marker when it is malformed.
pub fn generate_barcode<R: Rng + ?Sized>(rng: &mut R, marker: &str) -> String {
    let marker = if is_valid_marker(marker) {
        marker
    } else {
        GENERIC_BARCODE_MARKER
    };
    let head: u32 = rng.gen_range(0..10_000);
    let tail: u32 = rng.gen_range(0..100_000);
    format!("{:04}{}{:05}", head, marker, tail)
}

pub fn barcode(marker: &str) -> String {
    generate_barcode(&mut rand::thread_rng(), marker)
}

/// First active type, in the given order, whose prefix starts `item_code`.
pub fn resolve_pcb_type<'a>(
    item_code: &str,
    types: &'a [pcb_type::Model],
) -> Option<&'a pcb_type::Model> {
    types
        .iter()
        .filter(|t| t.active)
        .find(|t| t.matches_item_code(item_code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::{rngs::StdRng, SeedableRng};
    use uuid::Uuid;

    fn pcb(code: &str, prefix: &str, active: bool) -> pcb_type::Model {
        let now = Utc::now();
        pcb_type::Model {
            id: Uuid::new_v4(),
            code: code.into(),
            name: code.into(),
            description: None,
            prefix: prefix.into(),
            barcode_marker: None,
            active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn serial_number_layout() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        assert_eq!(serial_number("5YB", date, 7), "5YB-250304-0007");
        assert_eq!(serial_number("5RS", date, 1234), "5RS-250304-1234");
    }

    #[test]
    fn parse_serial_number_round_trips_prefix_with_dash() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let serial = serial_number("RW-5YB", date, 2);
        assert_eq!(parse_serial_number(&serial), Some(("RW-5YB", date, 2)));
        assert_eq!(parse_serial_number("not-a-serial"), None);
        assert_eq!(parse_serial_number("12345678901"), None);
    }

    #[test]
    fn barcode_embeds_marker() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = generate_barcode(&mut rng, "12");
        assert!(is_barcode(&code));
        assert_eq!(&code[4..6], "12");

        let fallback = generate_barcode(&mut rng, "x");
        assert_eq!(&fallback[4..6], GENERIC_BARCODE_MARKER);
    }

    #[test]
    fn resolve_prefers_first_active_match() {
        let types = vec![
            pcb("OLD", "5YB", false),
            pcb("YBS", "5YB", true),
            pcb("YBS2", "5YB0", true),
            pcb("RSM", "5RS", true),
        ];
        assert_eq!(
            resolve_pcb_type("5YB011057", &types).map(|t| t.code.as_str()),
            Some("YBS")
        );
        assert_eq!(
            resolve_pcb_type("5RS011075", &types).map(|t| t.code.as_str()),
            Some("RSM")
        );
        assert!(resolve_pcb_type("9ZZ000001", &types).is_none());
    }
}
