use crate::Result;
use crate::callbacks::Callback;
use crate::llm::Message;
use async_trait::async_trait;
use std::io::Write;

/// Writes a markdown transcript of an agent's conversation, one section per
/// step, only printing messages that were not already written.
pub struct MessageLogger<W: Write + Send> {
    last_hashes: Vec<u64>,
    writer: W,
    step: u32,
    conversation: u32,
}

impl<W: Write + Send> MessageLogger<W> {
    pub fn new(name: &str, mut writer: W) -> Result<Box<Self>> {
        write!(writer, "## {}\n\n", name)?;

        Ok(Box::new(Self {
            last_hashes: Vec::new(),
            writer,
            step: 0,
            conversation: 0,
        }))
    }

    fn display_messages(&mut self, messages: &[Message]) -> Result<()> {
        writeln!(self.writer, "### Step {}\n", self.step)?;

        messages
            .iter()
            .try_for_each(|m| write!(self.writer, "{}", m))?;

        write!(self.writer, "---\n\n")?;

        Ok(())
    }

    fn display_new_conversation(&mut self) -> Result<()> {
        self.conversation += 1;
        self.step = 0;
        write!(self.writer, "### Conversation {}\n\n", self.conversation)?;
        Ok(())
    }

    fn prefix_match_len(&self, new_hashes: &[u64]) -> usize {
        new_hashes
            .iter()
            .zip(self.last_hashes.iter())
            .take_while(|&(a, b)| *a == *b)
            .count()
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> Callback for MessageLogger<W> {
    async fn call(&mut self, messages: Vec<Message>) -> Result<Vec<Message>> {
        let new_hashes = messages.iter().map(Message::get_hash).collect::<Vec<_>>();

        if self.last_hashes.is_empty()
            || new_hashes.len() < self.last_hashes.len()
            || self.prefix_match_len(&new_hashes) != self.last_hashes.len()
        {
            self.display_new_conversation()?;
            self.display_messages(&messages)?;
        } else {
            self.display_messages(&messages[self.last_hashes.len()..])?;
        }

        self.writer.flush()?;

        tracing::trace!(step = self.step, messages = messages.len(), "transcript updated");

        self.step += 1;
        self.last_hashes = new_hashes;

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::MessageLogger;
    use crate::Result;
    use crate::callbacks::Callback;
    use crate::llm::Message;

    #[tokio::test]
    async fn test_logger_writes_only_new_messages() -> Result<()> {
        let mut logger = MessageLogger::new("writer", Vec::new())?;

        let mut history = vec![
            Message::System("persona".to_string()),
            Message::User("task one".to_string()),
        ];
        history = logger.call(history).await?;
        history.push(Message::Assistant("draft".to_string(), vec![]));
        logger.call(history).await?;

        // a fresh task history starts a new conversation
        logger
            .call(vec![
                Message::System("persona".to_string()),
                Message::User("task two".to_string()),
            ])
            .await?;

        let out = String::from_utf8((*logger).into_inner()).expect("utf8 transcript");

        assert!(out.starts_with("## writer\n\n### Conversation 1\n\n### Step 0\n\n"));
        assert_eq!(out.matches("task one").count(), 1);
        assert_eq!(out.matches("#### System").count(), 2);
        assert!(out.contains("### Step 1\n\n#### Assistant\n\ndraft\n\n---"));
        assert!(out.contains("### Conversation 2\n\n### Step 0\n\n#### System"));

        Ok(())
    }
}
