use crate::formatter::format_ticket_datetime;
use crate::message::{Message, Sender};
use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

pub const DATETIME_PLACEHOLDER: &str = "{datetime}";

pub const DEFAULT_TICKET_TEMPLATE: &str =
    "Купивте билет за едно возење со цена од 40ден на {datetime} часот.";

fn next_id() -> String {
    Uuid::new_v4().to_string()
}

/// Builds an outgoing message, or `None` when the text is blank.
pub fn compose_outgoing(text: &str, now: DateTime<FixedOffset>) -> Option<Message> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    Some(Message::new(next_id(), text.to_string(), Sender::Me, now))
}

#[derive(Debug, Clone)]
pub struct TicketScript {
    template: String,
}

impl Default for TicketScript {
    fn default() -> Self {
        Self::new(DEFAULT_TICKET_TEMPLATE)
    }
}

impl TicketScript {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn render(&self, now: &DateTime<FixedOffset>) -> String {
        self.template
            .replace(DATETIME_PLACEHOLDER, &format_ticket_datetime(now))
    }

    pub fn compose_scripted_incoming(&self, now: DateTime<FixedOffset>) -> Message {
        Message::new(next_id(), self.render(&now), Sender::Counterpart, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SentAt;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 5, 14, 7, 0)
            .unwrap()
    }

    #[test]
    fn test_blank_text_is_rejected() {
        assert!(compose_outgoing("", fixed_now()).is_none());
        assert!(compose_outgoing("   ", fixed_now()).is_none());
        assert!(compose_outgoing("\n\t", fixed_now()).is_none());
    }

    #[test]
    fn test_outgoing_message() {
        let message = compose_outgoing("hi", fixed_now()).unwrap();
        assert_eq!(message.text, "hi");
        assert_eq!(message.sender, Sender::Me);
        assert_eq!(message.sent_at, SentAt::Instant(fixed_now()));
    }

    #[test]
    fn test_outgoing_text_is_trimmed() {
        let message = compose_outgoing("  see you there \n", fixed_now()).unwrap();
        assert_eq!(message.text, "see you there");
    }

    #[test]
    fn test_ids_are_unique() {
        let a = compose_outgoing("a", fixed_now()).unwrap();
        let b = compose_outgoing("a", fixed_now()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_scripted_incoming_embeds_datetime() {
        let message = TicketScript::default().compose_scripted_incoming(fixed_now());
        assert_eq!(message.sender, Sender::Counterpart);
        assert!(message.text.contains("05.03.2024 14:07"));
        assert!(message.text.starts_with("Купивте билет"));
        assert!(!message.text.contains(DATETIME_PLACEHOLDER));
    }

    #[test]
    fn test_custom_template() {
        let script = TicketScript::new("Ticket bought on {datetime}.");
        assert_eq!(script.render(&fixed_now()), "Ticket bought on 05.03.2024 14:07.");
    }
}
