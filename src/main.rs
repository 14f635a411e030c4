use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use resumelens::chat::{SendOutcome, SkipReason, suggested_questions, suggestion_channel};
use resumelens::config::{self, Config};
use resumelens::logging;
use resumelens::pipeline::{DocumentProgress, IngestOutcome};
use resumelens::session::SourceType;
use resumelens::workspace::Workspace;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(
    name = "resumelens",
    version,
    about = "Ingest a resume or job description and ask questions about it"
)]
struct Cli {
    /// Default log filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the document service is reachable.
    Health,
    /// Start a new session and ingest a document into it.
    Ingest {
        #[command(flatten)]
        input: DocumentInput,
        /// Document kind: `resume` or `jd`.
        #[arg(long, default_value = "resume")]
        source: SourceType,
    },
    /// Ask one question about the ingested document.
    Ask {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Kind assumed for a restored session that does not report one.
        #[arg(long, default_value = "resume")]
        source: SourceType,
    },
    /// Interactive conversation, optionally ingesting a document first.
    Chat {
        #[command(flatten)]
        input: OptionalDocumentInput,
        #[arg(long, default_value = "resume")]
        source: SourceType,
    },
    /// Inspect or end the stored session.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show whether the stored session is still live.
    Status,
    /// Delete the stored session.
    Clear,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct DocumentInput {
    /// Path to a .txt/.md file (PDF and DOCX need an external extractor).
    #[arg(long)]
    file: Option<PathBuf>,
    /// Document text pasted directly.
    #[arg(long)]
    text: Option<String>,
}

#[derive(Args)]
#[group(required = false, multiple = false)]
struct OptionalDocumentInput {
    #[arg(long)]
    file: Option<PathBuf>,
    #[arg(long)]
    text: Option<String>,
}

enum Document {
    File(PathBuf),
    Text(String),
}

impl DocumentInput {
    fn into_document(self) -> Option<Document> {
        document(self.file, self.text)
    }
}

impl OptionalDocumentInput {
    fn into_document(self) -> Option<Document> {
        document(self.file, self.text)
    }
}

fn document(file: Option<PathBuf>, text: Option<String>) -> Option<Document> {
    file.map(Document::File).or(text.map(Document::Text))
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("Failed to load configuration")?;
    logging::init_tracing(&cli.log_level);

    match cli.command {
        Command::Health => health(config).await,
        Command::Ingest { input, source } => {
            let document = input.into_document().context("No document given")?;
            let workspace = open_workspace(config)?;
            workspace
                .sessions()
                .create_session(source)
                .await
                .context("Failed to start a session")?;
            let outcome = ingest(&workspace, document, source).await?;
            print_ingest_summary(&workspace, config, &outcome);
            Ok(())
        }
        Command::Ask {
            question,
            top_k,
            source,
        } => {
            let workspace = open_workspace(config)?;
            restore_session(&workspace, source).await?;
            let top_k = top_k.unwrap_or(config.chat_top_k);
            ask(&workspace, &question, top_k).await
        }
        Command::Chat { input, source } => {
            let workspace = open_workspace(config)?;
            match input.into_document() {
                Some(document) => {
                    workspace.sessions().create_session(source).await?;
                    let outcome = ingest(&workspace, document, source).await?;
                    print_ingest_summary(&workspace, config, &outcome);
                }
                None => restore_session(&workspace, source).await?,
            }
            repl(&workspace, source, config.chat_top_k).await
        }
        Command::Session { action } => {
            let workspace = open_workspace(config)?;
            session(&workspace, action).await
        }
    }
}

fn open_workspace(config: &Config) -> Result<Workspace> {
    Workspace::from_config(config).context("Failed to initialise the document service client")
}

async fn health(config: &Config) -> Result<()> {
    let workspace = open_workspace(config)?;
    let report = workspace.health().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.healthy {
        bail!("{}", report.message);
    }
    Ok(())
}

async fn restore_session(workspace: &Workspace, source: SourceType) -> Result<()> {
    let restored = workspace
        .sessions()
        .revalidate_persisted(source)
        .await
        .context("Failed to check the stored session")?;
    if restored.is_none() {
        bail!("No active session. Run `resumelens ingest` first.");
    }
    Ok(())
}

async fn ingest(
    workspace: &Workspace,
    document: Document,
    source: SourceType,
) -> Result<IngestOutcome> {
    let pipeline = workspace.pipeline();
    let mut events = pipeline.subscribe();
    let run = async {
        match &document {
            Document::File(path) => pipeline.ingest_file(path, source).await,
            Document::Text(text) => pipeline.ingest_pasted_text(text, source).await,
        }
    };
    tokio::pin!(run);

    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            Some(event) = events.recv() => print_progress(event),
        }
    };
    while let Ok(event) = events.try_recv() {
        print_progress(event);
    }

    result.map_err(|err| anyhow::anyhow!(err.user_message()))
}

fn print_progress(event: DocumentProgress) {
    println!("[{:>3}%] {}", event.progress, event.status);
}

fn print_ingest_summary(workspace: &Workspace, config: &Config, outcome: &IngestOutcome) {
    println!(
        "Ingested {} chunks ({} embeddings) in {:.1}s",
        outcome.chunk_count,
        outcome.embedding_count,
        outcome.processing_time.as_secs_f64()
    );
    println!(
        "Session {} • {}",
        outcome.session_id,
        workspace.sessions().snapshot().status_line()
    );
    if config.enable_chunk_preview {
        for chunk in workspace.pipeline().snapshot().chunks {
            let preview: String = chunk.text.chars().take(80).collect();
            println!("  #{:<3} {preview}", chunk.index);
        }
    }
    tracing::info!(metrics = ?workspace.metrics(), "Ingestion finished");
}

async fn ask(workspace: &Workspace, question: &str, top_k: usize) -> Result<()> {
    match workspace
        .chat()
        .send_message_with_top_k(question, top_k)
        .await
    {
        Ok(SendOutcome::Answered(reply)) => {
            println!("{}", reply.content);
            let sources = reply.chunks_used.unwrap_or_default();
            if !sources.is_empty() {
                println!("\nSources: {}", sources.join(", "));
            }
            if let Some(confidence) = reply.confidence {
                println!("Confidence: {:.0}%", confidence * 100.0);
            }
            Ok(())
        }
        Ok(SendOutcome::Skipped(SkipReason::EmptyContent)) => bail!("Question is empty"),
        Ok(SendOutcome::Skipped(SkipReason::NoActiveSession)) => {
            bail!("The session expired. Run `resumelens ingest` again.")
        }
        Ok(SendOutcome::Skipped(SkipReason::SendInFlight)) => {
            bail!("Another question is still being answered")
        }
        Ok(SendOutcome::Discarded) => bail!("The conversation was cleared before the answer arrived"),
        Err(err) => bail!(err.user_message()),
    }
}

async fn repl(workspace: &Workspace, source: SourceType, top_k: usize) -> Result<()> {
    workspace.start_expiry_watcher();
    let questions = suggested_questions(source);
    let (suggestions, mut selected) = suggestion_channel();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Type a question, :suggest for ideas, :status, :clear, or :q to quit.");
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            ":q" | ":quit" => break,
            ":status" => {
                println!("{}", workspace.sessions().snapshot().status_line());
                continue;
            }
            ":clear" => {
                workspace.chat().clear_messages();
                println!("Conversation cleared.");
                continue;
            }
            ":suggest" => {
                for (n, question) in questions.iter().enumerate() {
                    println!("  :{} {question}", n + 1);
                }
                continue;
            }
            _ => {}
        }

        if let Some(n) = line.strip_prefix(':').and_then(|n| n.parse::<usize>().ok()) {
            match n.checked_sub(1).and_then(|i| questions.get(i)) {
                Some(question) => {
                    suggestions.select(*question);
                }
                None => println!("No suggestion :{n}"),
            }
        } else if let Err(err) = ask(workspace, line, top_k).await {
            println!("{err:#}");
        }

        while let Some(question) = selected.try_recv() {
            println!("> {question}");
            if let Err(err) = ask(workspace, &question, top_k).await {
                println!("{err:#}");
            }
        }

        if !workspace.sessions().is_active() {
            println!("Session expired. Start again with `resumelens chat --file <path>`.");
            break;
        }
    }

    tracing::info!(metrics = ?workspace.metrics(), "Chat finished");
    Ok(())
}

async fn session(workspace: &Workspace, action: SessionAction) -> Result<()> {
    let sessions = workspace.sessions();
    let Some(stored) = sessions.persisted_session_id() else {
        println!("No stored session");
        return Ok(());
    };
    let live = sessions
        .revalidate_persisted(SourceType::Resume)
        .await
        .context("Failed to check the stored session")?;

    match action {
        SessionAction::Status => {
            println!("Session {stored} • {}", sessions.snapshot().status_line());
        }
        SessionAction::Clear => {
            if live.is_some() && sessions.clear_session_and_wait().await {
                println!("Session {stored} cleared");
            } else {
                println!("Session {stored} had already expired");
            }
        }
    }
    Ok(())
}
