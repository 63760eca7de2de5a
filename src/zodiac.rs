use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ZodiacSign {
    Capricorn,
    Aquarius,
    Pisces,
    Aries,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
}

/// (sign, first month, first day) in calendar order; each sign runs until the next one starts.
const SIGN_STARTS: [(ZodiacSign, u32, u32); 12] = [
    (ZodiacSign::Aquarius, 1, 20),
    (ZodiacSign::Pisces, 2, 19),
    (ZodiacSign::Aries, 3, 21),
    (ZodiacSign::Taurus, 4, 20),
    (ZodiacSign::Gemini, 5, 21),
    (ZodiacSign::Cancer, 6, 21),
    (ZodiacSign::Leo, 7, 23),
    (ZodiacSign::Virgo, 8, 23),
    (ZodiacSign::Libra, 9, 23),
    (ZodiacSign::Scorpio, 10, 23),
    (ZodiacSign::Sagittarius, 11, 22),
    (ZodiacSign::Capricorn, 12, 22),
];

impl ZodiacSign {
    /// Sign for a month/day pair. Days before Jan 20 wrap around to Capricorn.
    pub fn from_month_day(month: u32, day: u32) -> ZodiacSign {
        SIGN_STARTS
            .iter()
            .rev()
            .find(|(_, m, d)| (month, day) >= (*m, *d))
            .map(|(sign, _, _)| *sign)
            .unwrap_or(ZodiacSign::Capricorn)
    }

    pub fn for_date(date: NaiveDate) -> ZodiacSign {
        Self::from_month_day(date.month(), date.day())
    }

    pub fn name(self) -> &'static str {
        match self {
            ZodiacSign::Capricorn => "Capricorn",
            ZodiacSign::Aquarius => "Aquarius",
            ZodiacSign::Pisces => "Pisces",
            ZodiacSign::Aries => "Aries",
            ZodiacSign::Taurus => "Taurus",
            ZodiacSign::Gemini => "Gemini",
            ZodiacSign::Cancer => "Cancer",
            ZodiacSign::Leo => "Leo",
            ZodiacSign::Virgo => "Virgo",
            ZodiacSign::Libra => "Libra",
            ZodiacSign::Scorpio => "Scorpio",
            ZodiacSign::Sagittarius => "Sagittarius",
        }
    }

    pub fn symbol(self) -> char {
        match self {
            ZodiacSign::Capricorn => '♑',
            ZodiacSign::Aquarius => '♒',
            ZodiacSign::Pisces => '♓',
            ZodiacSign::Aries => '♈',
            ZodiacSign::Taurus => '♉',
            ZodiacSign::Gemini => '♊',
            ZodiacSign::Cancer => '♋',
            ZodiacSign::Leo => '♌',
            ZodiacSign::Virgo => '♍',
            ZodiacSign::Libra => '♎',
            ZodiacSign::Scorpio => '♏',
            ZodiacSign::Sagittarius => '♐',
        }
    }
}

impl fmt::Display for ZodiacSign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn boundaries_are_inclusive() {
        assert_eq!(ZodiacSign::from_month_day(3, 20), ZodiacSign::Pisces);
        assert_eq!(ZodiacSign::from_month_day(3, 21), ZodiacSign::Aries);
        assert_eq!(ZodiacSign::from_month_day(4, 19), ZodiacSign::Aries);
        assert_eq!(ZodiacSign::from_month_day(4, 20), ZodiacSign::Taurus);
        assert_eq!(ZodiacSign::from_month_day(12, 21), ZodiacSign::Sagittarius);
        assert_eq!(ZodiacSign::from_month_day(12, 22), ZodiacSign::Capricorn);
        assert_eq!(ZodiacSign::from_month_day(1, 19), ZodiacSign::Capricorn);
        assert_eq!(ZodiacSign::from_month_day(1, 20), ZodiacSign::Aquarius);
        assert_eq!(ZodiacSign::from_month_day(2, 29), ZodiacSign::Pisces);
    }

    #[test]
    fn every_day_of_a_leap_year_has_exactly_one_contiguous_sign() {
        let mut runs: HashMap<ZodiacSign, usize> = HashMap::new();
        let mut previous = None;
        let mut day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        while day.year() == 2024 {
            let sign = ZodiacSign::for_date(day);
            if previous != Some(sign) {
                *runs.entry(sign).or_default() += 1;
            }
            previous = Some(sign);
            day = day.succ_opt().unwrap();
        }
        assert_eq!(runs.len(), 12);
        // Capricorn shows up at both ends of the year; everything else is one run.
        for (sign, count) in runs {
            let expected = if sign == ZodiacSign::Capricorn { 2 } else { 1 };
            assert_eq!(count, expected, "{sign}");
        }
    }
}
