use crate::backend::{Backend, HttpBackend};
use crate::intake::{self, IntakeSource};
use crate::model::{ChatRole, ClientConfig, SESSION_KEY};
use crate::notify::{escape_for_display, NoticeKind, Notifications};
use crate::ocr::{self, OcrWorkspace};
use crate::store::{self, FileStore, KeyValueStore};
use crate::vqa::{self, VqaSession};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "vision-chat",
    version,
    about = "Ask questions about images and extract their text, with an optional TUI"
)]
pub struct Cli {
    /// Base URL of the inference backend
    #[arg(long, default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Per-request timeout
    #[arg(long, default_value = "120s")]
    pub timeout: humantime::Duration,

    /// OCR language code (en, ru)
    #[arg(long, default_value = "en")]
    pub language: String,

    /// Image to load (runs without the TUI)
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Question to ask about --image; repeat for a multi-turn conversation.
    /// An empty string asks for an automatic description.
    #[arg(long)]
    pub question: Vec<String>,

    /// Run OCR on --image instead of asking questions
    #[arg(long)]
    pub ocr: bool,

    /// Download the OCR result file after recognition
    #[arg(long, requires = "ocr")]
    pub download: bool,

    /// Directory for downloaded results and exported transcripts
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Start a fresh session instead of resuming the persisted one
    #[arg(long)]
    pub new_session: bool,

    /// Forget the persisted session and exit
    #[arg(long)]
    pub clear_session: bool,

    /// Query backend health and exit
    #[arg(long)]
    pub health: bool,

    /// Print JSON results instead of text (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Directory for persisted state and the TUI log
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Log filter (e.g. debug, vision_chat=trace); RUST_LOG takes precedence
    #[arg(long)]
    pub log_level: Option<String>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub show_config: bool,
}

impl Cli {
    /// Whether this invocation runs the interactive TUI.
    pub fn is_interactive(&self) -> bool {
        !(self.show_config || self.clear_session || self.health || self.image.is_some())
    }
}

/// Build a `ClientConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> ClientConfig {
    ClientConfig {
        base_url: args.base_url.clone(),
        timeout: Duration::from(args.timeout),
        user_agent: format!("vision-chat/{}", env!("CARGO_PKG_VERSION")),
        language: args.language.clone(),
        output_dir: args.output_dir.clone(),
        state_dir: args
            .state_dir
            .clone()
            .unwrap_or_else(store::default_state_dir),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args);

    if args.show_config {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }

    if args.clear_session {
        let mut store = FileStore::open(&cfg.state_dir)?;
        store.remove(SESSION_KEY).context("failed to clear session")?;
        eprintln!("Session cleared");
        return Ok(());
    }

    if args.is_interactive() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(cfg).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            return Err(anyhow::anyhow!(
                "built without TUI support: pass --image or --health"
            ));
        }
    }

    tokio::select! {
        res = run_text(args, cfg) => res,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
    }
}

#[derive(Serialize)]
struct OcrOutput<'a> {
    task_id: &'a str,
    language: &'a str,
    text: &'a str,
    saved_to: Option<PathBuf>,
}

/// Forward pending notifications to stderr.
fn flush_notes(notes: &mut Notifications, out: &mpsc::UnboundedSender<OutputLine>) {
    for toast in notes.take_all() {
        let tag = match toast.kind {
            NoticeKind::Success => "ok",
            NoticeKind::Error => "error",
        };
        let _ = out.send(OutputLine::Stderr(format!("[{tag}] {}", toast.message)));
    }
}

async fn run_text(args: Cli, cfg: ClientConfig) -> Result<()> {
    let backend = HttpBackend::new(&cfg)?;
    let (out_tx, out_handle) = spawn_output_writer();
    let res = run_text_inner(&args, &cfg, &backend, &out_tx).await;
    drop(out_tx);
    let _ = out_handle.await;
    res
}

async fn run_text_inner(
    args: &Cli,
    cfg: &ClientConfig,
    backend: &dyn Backend,
    out: &mpsc::UnboundedSender<OutputLine>,
) -> Result<()> {
    let mut notes = Notifications::default();

    if args.health {
        let h = backend.health().await.context("health check failed")?;
        let line = if args.json {
            serde_json::to_string_pretty(&h)?
        } else {
            h.to_message()
        };
        let _ = out.send(OutputLine::Stdout(line));
    }

    let Some(path) = args.image.as_deref() else {
        return Ok(());
    };
    let intake = intake::load_path(path, IntakeSource::Picker)
        .await
        .with_context(|| format!("cannot use {}", path.display()))?;

    if args.ocr {
        let mut ws = OcrWorkspace::new(&cfg.language);
        ws.accept_image(intake);
        let ok = ocr::recognize(&mut ws, backend, &mut notes).await;
        flush_notes(&mut notes, out);
        let Some(task) = ws.task().cloned() else {
            anyhow::ensure!(ok, "recognition failed");
            return Ok(());
        };
        let saved_to = if args.download {
            let p = ocr::download(&mut ws, backend, &cfg.output_dir, &mut notes).await;
            flush_notes(&mut notes, out);
            Some(p.context("download failed")?)
        } else {
            None
        };
        if args.json {
            let json = serde_json::to_string_pretty(&OcrOutput {
                task_id: &task.task_id,
                language: &cfg.language,
                text: &task.result_text,
                saved_to,
            })?;
            let _ = out.send(OutputLine::Stdout(json));
        } else {
            let _ = out.send(OutputLine::Stdout(escape_for_display(&task.result_text)));
            if let Some(p) = saved_to {
                let _ = out.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
            }
        }
        return Ok(());
    }

    let mut store = FileStore::open(&cfg.state_dir)?;
    let mut session = VqaSession::restore(&store);
    if args.new_session {
        session.clear_session(&mut store, &mut notes);
    }
    session.accept_image(intake, &mut store, &mut notes);
    flush_notes(&mut notes, out);

    let questions: Vec<String> = if args.question.is_empty() {
        vec![String::new()]
    } else {
        args.question.clone()
    };

    let mut failures = 0usize;
    for q in &questions {
        let seen = session.transcript().len();
        if !vqa::ask(&mut session, backend, &mut store, &mut notes, q).await {
            failures += 1;
        }
        if !args.json {
            for msg in &session.transcript()[seen..] {
                let who = match msg.role {
                    ChatRole::User => "you",
                    ChatRole::Assistant => "assistant",
                    ChatRole::Error => "error",
                };
                let _ = out.send(OutputLine::Stdout(format!(
                    "{who}> {}",
                    escape_for_display(&msg.text)
                )));
            }
        }
        flush_notes(&mut notes, out);
    }

    if args.json {
        let _ = out.send(OutputLine::Stdout(serde_json::to_string_pretty(
            &session.export(),
        )?));
    } else if let Some(id) = session.session_id() {
        let _ = out.send(OutputLine::Stderr(format!("Session: {id}")));
    }

    anyhow::ensure!(
        failures == 0,
        "{failures} of {} question(s) failed",
        questions.len()
    );
    Ok(())
}
