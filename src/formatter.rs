use crate::message::{Message, SentAt};
use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;
use std::borrow::Cow;
use std::fmt::Display;

const DATE_SEPARATOR: &str = " at ";

/// `"Tue, 5 Mar at 14:07"`
pub fn format_timestamp<Z: TimeZone>(instant: &DateTime<Z>) -> String
where
    Z::Offset: Display,
{
    instant.format("%a, %-d %b at %H:%M").to_string()
}

/// `"05.03.2024 14:07"`
pub fn format_ticket_datetime<Z: TimeZone>(instant: &DateTime<Z>) -> String
where
    Z::Offset: Display,
{
    instant.format("%d.%m.%Y %H:%M").to_string()
}

pub fn date_part(label: &str) -> &str {
    label
        .split_once(DATE_SEPARATOR)
        .map(|(date, _)| date)
        .unwrap_or(label)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedMessage<'a> {
    pub date_label: String,
    pub message: &'a Message,
    pub is_first_of_date: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Formatter {
    display_tz: Option<Tz>,
}

impl Formatter {
    pub fn new(display_tz: Option<Tz>) -> Self {
        Self { display_tz }
    }

    pub fn label<'a>(&self, message: &'a Message) -> Cow<'a, str> {
        match &message.sent_at {
            SentAt::Instant(at) => match self.display_tz {
                Some(tz) => Cow::Owned(format_timestamp(&at.with_timezone(&tz))),
                None => Cow::Owned(format_timestamp(at)),
            },
            SentAt::Label(label) => Cow::Borrowed(label.as_str()),
        }
    }

    /// Pairs each message with its date heading, flagging the first message
    /// of the conversation and every message whose date differs from the one
    /// before it.
    pub fn group_by_date<'a>(
        &self,
        messages: &'a [Message],
    ) -> impl Iterator<Item = DatedMessage<'a>> + 'a {
        let formatter = *self;
        let mut previous: Option<String> = None;

        messages.iter().map(move |message| {
            let label = formatter.label(message);
            let date_label = date_part(&label).to_string();
            let is_first_of_date = previous.as_deref() != Some(date_label.as_str());
            previous = Some(date_label.clone());

            DatedMessage {
                date_label,
                message,
                is_first_of_date,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Sender;
    use chrono::FixedOffset;

    fn labelled(id: &str, label: &str) -> Message {
        Message {
            id: id.to_string(),
            text: format!("message {}", id),
            sender: Sender::Me,
            sent_at: SentAt::Label(label.to_string()),
        }
    }

    fn at(offset_secs: i32, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_secs)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(&at(0, 2024, 3, 5, 14, 7)), "Tue, 5 Mar at 14:07");
        assert_eq!(format_timestamp(&at(0, 2024, 1, 1, 9, 0)), "Mon, 1 Jan at 09:00");
        assert_eq!(format_timestamp(&at(0, 2024, 12, 31, 23, 59)), "Tue, 31 Dec at 23:59");
    }

    #[test]
    fn test_format_ticket_datetime() {
        assert_eq!(
            format_ticket_datetime(&at(0, 2024, 3, 5, 14, 7)),
            "05.03.2024 14:07"
        );
        assert_eq!(
            format_ticket_datetime(&at(0, 2025, 11, 20, 0, 0)),
            "20.11.2025 00:00"
        );
    }

    #[test]
    fn test_date_part() {
        assert_eq!(date_part("Mon, 1 Jan at 09:00"), "Mon, 1 Jan");
        assert_eq!(date_part("no separator"), "no separator");
        assert_eq!(date_part(""), "");
    }

    #[test]
    fn test_group_by_date_marks_boundaries() {
        let messages = vec![
            labelled("1", "Mon, 1 Jan at 09:00"),
            labelled("2", "Mon, 1 Jan at 10:00"),
            labelled("3", "Tue, 2 Jan at 08:00"),
        ];

        let grouped: Vec<_> = Formatter::default().group_by_date(&messages).collect();
        let flags: Vec<bool> = grouped.iter().map(|g| g.is_first_of_date).collect();
        assert_eq!(flags, vec![true, false, true]);
        assert_eq!(grouped[0].date_label, "Mon, 1 Jan");
        assert_eq!(grouped[2].date_label, "Tue, 2 Jan");
        assert_eq!(grouped[1].message.id, "2");
    }

    #[test]
    fn test_group_by_date_only_compares_neighbours() {
        let messages = vec![
            labelled("1", "Mon, 1 Jan at 09:00"),
            labelled("2", "Tue, 2 Jan at 10:00"),
            labelled("3", "Mon, 1 Jan at 11:00"),
        ];

        let flags: Vec<bool> = Formatter::default()
            .group_by_date(&messages)
            .map(|g| g.is_first_of_date)
            .collect();
        assert_eq!(flags, vec![true, true, true]);
    }

    #[test]
    fn test_group_by_date_empty() {
        assert_eq!(Formatter::default().group_by_date(&[]).count(), 0);
    }

    #[test]
    fn test_label_formats_instants_in_stored_offset() {
        let message = Message::new(
            "a".into(),
            "hi".into(),
            Sender::Me,
            at(2 * 3600, 2024, 1, 1, 23, 30),
        );
        assert_eq!(Formatter::default().label(&message), "Mon, 1 Jan at 23:30");
    }

    #[test]
    fn test_label_uses_display_timezone() {
        let message = Message::new(
            "a".into(),
            "hi".into(),
            Sender::Me,
            at(0, 2024, 1, 1, 23, 30),
        );
        let formatter = Formatter::new(Some(chrono_tz::Asia::Tokyo));
        assert_eq!(formatter.label(&message), "Tue, 2 Jan at 08:30");
    }

    #[test]
    fn test_group_by_date_mixes_legacy_and_instants() {
        let messages = vec![
            labelled("1", "Mon, 1 Jan at 09:00"),
            Message::new("2".into(), "x".into(), Sender::Counterpart, at(0, 2024, 1, 1, 18, 0)),
            Message::new("3".into(), "y".into(), Sender::Me, at(0, 2024, 1, 2, 7, 15)),
        ];

        let flags: Vec<bool> = Formatter::default()
            .group_by_date(&messages)
            .map(|g| g.is_first_of_date)
            .collect();
        assert_eq!(flags, vec![true, false, true]);
    }
}
