use crate::compose::TicketScript;
use crate::conversation::ConversationStore;
use chrono::{DateTime, FixedOffset};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub const TICKET_COMMAND: &str = "/ticket";
pub const QUIT_COMMAND: &str = "/quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Redraw,
    Ignored,
    Quit,
}

/// Reads one input line, replacing invalid UTF-8 instead of failing.
///
/// Partial reads stay in `buf`, so a call cancelled by `select!` picks up
/// where it left off. Returns `None` at end of input.
pub async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let read = reader.read_until(b'\n', buf).await?;
    if read == 0 && buf.is_empty() {
        return Ok(None);
    }

    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string();
    buf.clear();
    Ok(Some(line))
}

pub async fn handle_line(
    store: &ConversationStore,
    script: &TicketScript,
    now: DateTime<FixedOffset>,
    line: &str,
) -> LineOutcome {
    match line.trim() {
        QUIT_COMMAND => LineOutcome::Quit,
        TICKET_COMMAND => {
            store.trigger_ticket(script, now).await;
            LineOutcome::Redraw
        }
        _ => match store.send_text(line, now).await {
            Some(_) => LineOutcome::Redraw,
            None => LineOutcome::Ignored,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::WritePolicy;
    use crate::message::{Sender, decode_conversation};
    use crate::storage::{FileStore, KeyValueStore, MemoryStore};
    use chrono::TimeZone;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tempfile::TempDir;
    use tokio::io::{AsyncRead, BufReader, ReadBuf};

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 5, 14, 7, 0)
            .unwrap()
    }

    /// Yields its bytes, then fails every read.
    struct BrokenPipe {
        data: &'static [u8],
    }

    impl AsyncRead for BrokenPipe {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.data.is_empty() {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")));
            }
            let n = self.data.len().min(buf.remaining());
            buf.put_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_read_line_replaces_invalid_utf8() {
        let mut input: &[u8] = b"hello\n\xffbad\r\nafter";
        let mut buf = Vec::new();

        assert_eq!(read_line(&mut input, &mut buf).await.unwrap().as_deref(), Some("hello"));
        assert_eq!(
            read_line(&mut input, &mut buf).await.unwrap().as_deref(),
            Some("\u{FFFD}bad")
        );
        assert_eq!(read_line(&mut input, &mut buf).await.unwrap().as_deref(), Some("after"));
        assert_eq!(read_line(&mut input, &mut buf).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_line_error_is_returned_not_raised() {
        let mut input = BufReader::new(BrokenPipe { data: b"hi\n" });
        let mut buf = Vec::new();

        assert_eq!(read_line(&mut input, &mut buf).await.unwrap().as_deref(), Some("hi"));
        let err = read_line(&mut input, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_handle_line_commands() {
        let store =
            ConversationStore::new("chat_messages", Arc::new(MemoryStore::new()), WritePolicy::default())
                .unwrap();
        store.activate().await;
        let script = TicketScript::default();

        assert_eq!(handle_line(&store, &script, now(), "   ").await, LineOutcome::Ignored);
        assert_eq!(handle_line(&store, &script, now(), "hi").await, LineOutcome::Redraw);
        assert_eq!(handle_line(&store, &script, now(), " /ticket ").await, LineOutcome::Redraw);
        assert_eq!(handle_line(&store, &script, now(), "/quit").await, LineOutcome::Quit);

        let messages = store.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::Me);
        assert_eq!(messages[1].sender, Sender::Counterpart);
        assert!(messages[1].text.contains("05.03.2024 14:07"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_input_keeps_earlier_messages_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let backend = Arc::new(FileStore::new(temp_dir.path()).await.unwrap());
        let store =
            ConversationStore::new("chat_messages", backend.clone(), WritePolicy::default()).unwrap();
        store.activate().await;
        let script = TicketScript::default();

        let mut input: &[u8] = b"hello\n\xffbad\nafter\n";
        let mut buf = Vec::new();
        while let Some(line) = read_line(&mut input, &mut buf).await.unwrap() {
            handle_line(&store, &script, now(), &line).await;
        }
        store.close().await;

        let payload = backend.get("chat_messages").await.unwrap().unwrap();
        let texts: Vec<String> = decode_conversation(&payload)
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["hello", "\u{FFFD}bad", "after"]);
        assert!(!temp_dir.path().join(".chat_messages.json.tmp").exists());
    }
}
