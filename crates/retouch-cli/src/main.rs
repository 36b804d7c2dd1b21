use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use retouch_contracts::chat::{parse_intent, STUDIO_HELP_COMMANDS};
use retouch_contracts::{
    AspectRatio, BackgroundColor, ImageArtifact, Role, TransformKind, TransformationRequest,
};
use retouch_engine::{
    ChatStatus, Completion, ConversationSession, Dispatcher, EditStatus, EditingSession, Settled,
    Studio,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "retouch-rs", version, about = "AI photo retouching studio")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive editing session with an assistant.
    Studio(StudioArgs),
    /// Apply one transformation and exit.
    Edit(EditArgs),
}

#[derive(Debug, Parser)]
struct StudioArgs {
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EditOp {
    Background,
    Enhance,
    Passport,
    Prompt,
    Analyze,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, value_enum)]
    op: EditOp,
    #[arg(long, default_value = "white")]
    color: String,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    ratio: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

const WAIT_TICK: Duration = Duration::from_millis(250);

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("retouch-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RETOUCH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Studio(args) => {
            run_studio(args)?;
            Ok(0)
        }
        Command::Edit(args) => run_edit(args),
    }
}

fn open_studio(events: Option<&Path>) -> Result<Studio> {
    let studio = Studio::from_env();
    if studio.config().api_key.is_none() {
        eprintln!("warning: GEMINI_API_KEY or GOOGLE_API_KEY not set; requests will fail");
    }
    match events {
        Some(path) => studio.with_events(path),
        None => Ok(studio),
    }
}

fn run_edit(args: EditArgs) -> Result<i32> {
    let request = edit_request(&args)?;
    let studio = open_studio(args.events.as_deref())?;
    let source = ImageArtifact::from_path(&args.image)?;

    let mut session = studio.open_editor(source);
    match studio.apply(&mut session, request) {
        Settled::Committed => {}
        _ => {
            if let Some(failure) = session.failure() {
                eprintln!("{} {}", failure.message(), failure.error);
            }
            return Ok(1);
        }
    }

    if let Some(analysis) = session.last_analysis() {
        println!("{analysis}");
    }
    if let Some(out) = args.out.as_deref() {
        session.current().write_to(out)?;
        println!("Wrote {} ({})", out.display(), describe(session.current()));
    }
    Ok(0)
}

/// Builds the request for `--op`, checking that `--out` is given exactly
/// when the operation produces an image.
fn edit_request(args: &EditArgs) -> Result<TransformationRequest> {
    let request = match args.op {
        EditOp::Background => TransformationRequest::background(
            args.color
                .parse::<BackgroundColor>()
                .unwrap_or_else(|never| match never {}),
        ),
        EditOp::Enhance => TransformationRequest::Enhance,
        EditOp::Passport => TransformationRequest::PassportNormalize,
        EditOp::Analyze => TransformationRequest::Analyze,
        EditOp::Prompt => {
            let Some(prompt) = args.prompt.as_deref() else {
                bail!("--op prompt requires --prompt");
            };
            let ratio = match args.ratio.as_deref() {
                Some(raw) => resolve_ratio(raw)?,
                None => AspectRatio::default(),
            };
            TransformationRequest::edit(prompt, ratio)
        }
    };
    match (request.kind().produces_image(), args.out.is_some()) {
        (true, false) => bail!("--out is required for --op {:?}", args.op),
        (false, true) => bail!("--op {:?} produces text only; drop --out", args.op),
        _ => Ok(request),
    }
}

fn resolve_ratio(raw: &str) -> Result<AspectRatio> {
    let mut warnings = Vec::new();
    let Some(ratio) = AspectRatio::nearest(raw, &mut warnings) else {
        bail!(
            "unsupported aspect ratio {raw:?} (expected one of {})",
            AspectRatio::ALL
                .iter()
                .map(|ratio| ratio.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    };
    for warning in warnings {
        println!("{warning}");
    }
    Ok(ratio)
}

struct StudioRepl {
    studio: Studio,
    dispatcher: Dispatcher,
    editor: Option<EditingSession>,
    chat: ConversationSession,
    aspect_ratio: AspectRatio,
}

fn run_studio(args: StudioArgs) -> Result<()> {
    let studio = open_studio(args.events.as_deref())?;
    let editor = match args.image.as_deref() {
        Some(path) => Some(studio.open_editor(ImageArtifact::from_path(path)?)),
        None => None,
    };
    let mut repl = StudioRepl::new(studio, editor);

    println!("Retouch studio started. Type /help for commands.");
    if let Some(greeting) = repl.chat.messages().last() {
        println!("assistant: {}", greeting.text);
    }
    if let Some(editor) = repl.editor.as_ref() {
        println!("Editing {}", describe(editor.current()));
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 || !repl.handle_line(line.trim_end_matches(['\n', '\r']))? {
            break;
        }
    }
    Ok(())
}

impl StudioRepl {
    fn new(studio: Studio, editor: Option<EditingSession>) -> Self {
        Self {
            dispatcher: studio.dispatcher(),
            chat: studio.open_conversation(),
            editor,
            studio,
            aspect_ratio: AspectRatio::default(),
        }
    }

    /// Runs one input line. Returns `false` once the user asked to quit.
    fn handle_line(&mut self, line: &str) -> Result<bool> {
        let intent = parse_intent(line);
        match intent.action.as_str() {
            "noop" => {}
            "help" => println!("Commands: {}", STUDIO_HELP_COMMANDS.join(" ")),
            "quit" => return Ok(false),
            "open_image" => match intent.arg("path") {
                Some(path) => match ImageArtifact::from_path(Path::new(path)) {
                    Ok(image) => {
                        let editor = self.studio.open_editor(image);
                        println!("Editing {}", describe(editor.current()));
                        self.editor = Some(editor);
                    }
                    Err(err) => println!("Open failed: {err:#}"),
                },
                None => println!("/open requires a path"),
            },
            "set_aspect_ratio" => match intent.arg("ratio") {
                Some(raw) => match resolve_ratio(raw) {
                    Ok(ratio) => {
                        self.aspect_ratio = ratio;
                        println!("Aspect ratio for /edit: {}", ratio.as_str());
                    }
                    Err(err) => println!("{err:#}"),
                },
                None => println!("Aspect ratio for /edit: {}", self.aspect_ratio.as_str()),
            },
            "replace_background" => {
                let color = intent
                    .arg("color")
                    .unwrap_or("white")
                    .parse::<BackgroundColor>()
                    .unwrap_or_else(|never| match never {});
                self.transform(TransformationRequest::background(color))?;
            }
            "edit" => {
                let prompt = intent.arg("prompt").unwrap_or_default().to_string();
                let request = TransformationRequest::edit(prompt, self.aspect_ratio);
                self.transform(request)?;
            }
            "enhance" => self.transform(TransformationRequest::Enhance)?,
            "passport" => self.transform(TransformationRequest::PassportNormalize)?,
            "analyze" => self.transform(TransformationRequest::Analyze)?,
            "save" => self.save(),
            "history" => self.print_history(),
            "export" => self.export(intent.arg("path")),
            "dismiss" => self.dismiss(),
            "status" => self.print_status(),
            "chat" => {
                let text = intent.text.as_deref().unwrap_or_default();
                self.send(text)?;
            }
            _ => {
                let command = intent.arg("command").unwrap_or_default();
                println!("Unknown command /{command}. Type /help for commands.");
            }
        }
        Ok(true)
    }

    fn transform(&mut self, request: TransformationRequest) -> Result<()> {
        let Some(editor) = self.editor.as_mut() else {
            println!("No image open. Use /open <path> first.");
            return Ok(());
        };
        let kind = request.kind();
        let pending = match self.studio.begin_transform(editor, request) {
            Ok(pending) => pending,
            Err(_) => {
                match editor.status() {
                    EditStatus::Processing(active) => {
                        println!("Still working on {active}; try again shortly.")
                    }
                    EditStatus::Failed(failure) => println!("{} ({})", failure.message(), failure.error),
                    EditStatus::Idle => {}
                }
                return Ok(());
            }
        };

        print!("{} ", progress_label(kind));
        io::stdout().flush()?;
        self.dispatcher.submit_transform(pending)?;
        self.wait_until_settled()?;
        println!();

        let Some(editor) = self.editor.as_ref() else {
            return Ok(());
        };
        match editor.status() {
            EditStatus::Failed(failure) => println!("{} ({})", failure.message(), failure.error),
            _ if kind == TransformKind::Analyze => {
                if let Some(text) = editor.last_analysis() {
                    println!("analysis: {text}");
                }
            }
            _ => println!("Updated image: {}", describe(editor.current())),
        }
        Ok(())
    }

    fn send(&mut self, text: &str) -> Result<()> {
        let pending = match self.studio.begin_chat(&mut self.chat, text) {
            Ok(pending) => pending,
            Err(Settled::Rejected) => {
                println!("Still waiting for the previous reply.");
                return Ok(());
            }
            Err(_) => {
                if let Some(notice) = self.chat.notice() {
                    println!("{notice}");
                }
                return Ok(());
            }
        };
        self.dispatcher.submit_reply(pending)?;
        self.wait_until_settled()?;

        if let Some(notice) = self.chat.notice() {
            println!("{notice}");
        } else if let Some(reply) = self.chat.messages().last().filter(|message| message.role == Role::Assistant) {
            println!("assistant: {}", reply.text);
        }
        Ok(())
    }

    /// Drains completions until neither session has work in flight.
    fn wait_until_settled(&mut self) -> Result<()> {
        loop {
            let editor_busy = self
                .editor
                .as_ref()
                .is_some_and(EditingSession::is_processing);
            let chat_busy = self.chat.status() == ChatStatus::Awaiting;
            if !editor_busy && !chat_busy {
                return Ok(());
            }
            match self.dispatcher.next_timeout(WAIT_TICK) {
                Some(completion) => self.deliver(completion),
                None => {
                    print!(".");
                    io::stdout().flush()?;
                }
            }
        }
    }

    fn deliver(&mut self, completion: Completion) {
        let settled = match completion {
            Completion::Transform(completed) => match self.editor.as_mut() {
                Some(editor) => self.studio.finish_transform(editor, completed),
                None => Settled::Ignored,
            },
            Completion::Reply(completed) => self.studio.finish_chat(&mut self.chat, completed),
        };
        if settled == Settled::Ignored {
            tracing::debug!("late completion dropped");
        }
    }

    fn save(&mut self) {
        let Some(editor) = self.editor.as_ref() else {
            println!("No image open.");
            return;
        };
        match self.studio.save(editor) {
            Some(entry) => println!(
                "Saved {} ({}); {} in history",
                entry.id,
                describe(&entry.thumbnail),
                self.studio.history().len()
            ),
            None => println!("Cannot save while a transformation is running."),
        }
    }

    fn print_history(&self) {
        let history = self.studio.history();
        if history.is_empty() {
            println!("History is empty.");
            return;
        }
        for entry in history.list() {
            println!(
                "{}  {}  {}",
                entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                entry.id,
                describe(&entry.thumbnail)
            );
        }
    }

    fn export(&self, path: Option<&str>) {
        let Some(editor) = self.editor.as_ref() else {
            println!("No image open.");
            return;
        };
        let image = editor.current();
        let path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(format!("retouch-{}.{}", image.digest(), image.extension())),
        };
        match image.write_to(&path).with_context(|| format!("export to {}", path.display())) {
            Ok(()) => println!("Exported {}", path.display()),
            Err(err) => println!("Export failed: {err:#}"),
        }
    }

    fn dismiss(&mut self) {
        let cleared_error = self
            .editor
            .as_mut()
            .is_some_and(EditingSession::dismiss_error);
        let cleared_notice = self.chat.dismiss_notice();
        if !cleared_error && !cleared_notice {
            println!("Nothing to dismiss.");
        }
    }

    fn print_status(&self) {
        match self.editor.as_ref() {
            Some(editor) => {
                let status = match editor.status() {
                    EditStatus::Idle => "idle".to_string(),
                    EditStatus::Processing(kind) => format!("processing {kind}"),
                    EditStatus::Failed(failure) => format!("failed: {}", failure.message()),
                };
                println!("image: {} [{status}]", describe(editor.current()));
            }
            None => println!("image: none"),
        }
        println!("aspect ratio for /edit: {}", self.aspect_ratio.as_str());
        println!(
            "models: image={} text={}",
            self.studio.models().image,
            self.studio.models().text
        );
        println!(
            "history: {} saved; chat: {} messages",
            self.studio.history().len(),
            self.chat.transcript().len()
        );
    }
}

fn progress_label(kind: TransformKind) -> &'static str {
    match kind {
        TransformKind::BackgroundReplace => "Replacing background",
        TransformKind::FreeformEdit => "Editing",
        TransformKind::Enhance => "Enhancing",
        TransformKind::PassportNormalize => "Creating passport photo",
        TransformKind::Analyze => "Analyzing",
    }
}

fn describe(image: &ImageArtifact) -> String {
    format!("{} {} bytes sha256:{}", image.media_type(), image.len(), image.digest())
}
