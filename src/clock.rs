use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use iana_time_zone::get_timezone;
use tracing::warn;

pub fn system_timezone() -> Tz {
    let name = match get_timezone() {
        Ok(name) => name,
        Err(e) => {
            warn!("Could not determine system timezone, using UTC: {}", e);
            return Tz::UTC;
        }
    };

    match name.parse() {
        Ok(tz) => tz,
        Err(e) => {
            warn!("Unknown system timezone '{}', using UTC: {}", name, e);
            Tz::UTC
        }
    }
}

pub fn now_in(tz: Tz) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&tz).fixed_offset()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;

    #[test]
    fn test_now_in_keeps_zone_offset() {
        let tz: Tz = "Europe/Skopje".parse().unwrap();
        let now = now_in(tz);
        let expected = Utc::now().with_timezone(&tz).offset().fix();
        assert_eq!(now.offset(), &expected);
    }

    #[test]
    fn test_now_in_utc() {
        assert_eq!(now_in(Tz::UTC).offset().local_minus_utc(), 0);
    }
}
