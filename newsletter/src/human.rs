use agent::llm::Message;
use agent::tools::{FunctionalTool, ToolCall, ToolDefinition};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stderr, Stdin};

#[derive(Deserialize, JsonSchema)]
struct HumanArgs {
    /// the question for the human
    question: String,
}

/// Lets an agent ask the operator a question and wait for the answer.
pub struct HumanInput<R, W> {
    reader: R,
    writer: W,
}

impl HumanInput<BufReader<Stdin>, Stderr> {
    /// Asks on stderr, leaving stdout to the article.
    pub fn stdio() -> Box<Self> {
        HumanInput::new(BufReader::new(tokio::io::stdin()), tokio::io::stderr())
    }
}

impl<R, W> HumanInput<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub const NAME: &'static str = "human";

    pub fn new(reader: R, writer: W) -> Box<Self> {
        Box::new(Self { reader, writer })
    }

    async fn ask(&mut self, question: &str) -> std::io::Result<String> {
        self.writer
            .write_all(format!("\n{}\n", question).as_bytes())
            .await?;
        self.writer.flush().await?;

        let mut answer = String::new();
        self.reader.read_line(&mut answer).await?;

        Ok(answer.trim_end_matches(['\r', '\n']).to_string())
    }
}

#[async_trait]
impl<R, W> FunctionalTool for HumanInput<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn definition(&self) -> agent::Result<ToolDefinition> {
        ToolDefinition::new::<HumanArgs>(
            Self::NAME,
            "You can ask a human for guidance when you think you got stuck or you are not sure what to do next. The input should be a question for the human.",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> agent::Result<Message> {
        let args: HumanArgs = call.args()?;

        tracing::info!("waiting for human input");

        let answer = self.ask(&args.question).await?;

        Ok(call.result(answer))
    }
}
