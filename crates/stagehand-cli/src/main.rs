use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use stagehand_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use stagehand_contracts::image::mime_for_path;
use stagehand_contracts::{
    HistoryStore, ImageRole, LayoutMode, MobilePanel, WorkspaceState, WorkspaceView,
};
use stagehand_engine::{
    build_generation_client, EngineConfig, PreviewSlot, ShareOutcome, SystemShare,
    WorkspaceEngine,
};

#[derive(Debug, Parser)]
#[command(name = "stagehand", version, about = "Scene and product compositing workspace")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat(ChatArgs),
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct EngineArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    image_proxy: Option<String>,
    #[arg(long)]
    app_name: Option<String>,
    #[arg(long)]
    timeout_secs: Option<f64>,
    #[arg(long)]
    viewport_width: Option<u32>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[command(flatten)]
    engine: EngineArgs,
    #[arg(long)]
    scene: String,
    #[arg(long)]
    product: Option<String>,
    /// Applied in order; each edit builds on the previous result.
    #[arg(long = "prompt", required = true)]
    prompts: Vec<String>,
    #[arg(long)]
    download_dir: Option<PathBuf>,
}

impl EngineArgs {
    fn config(&self) -> EngineConfig {
        EngineConfig::from_env()
            .with_model(self.model.clone())
            .with_image_proxy(self.image_proxy.clone())
            .with_app_name(self.app_name.clone())
            .with_request_timeout(self.timeout_secs)
    }

    fn open(&self, config: &EngineConfig) -> Result<WorkspaceEngine> {
        let events_path = self
            .events
            .clone()
            .unwrap_or_else(|| self.out.join("events.jsonl"));
        let mut engine = WorkspaceEngine::new(&self.out, events_path, config)?;
        if let Some(width) = self.viewport_width {
            engine.set_viewport_width(width);
        }
        Ok(engine)
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("stagehand error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Run(args) => run_batch(args),
    }
}

enum Flow {
    Continue,
    Quit,
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let mut config = args.engine.config();
    let mut engine = args.engine.open(&config)?;

    let stdin = io::stdin();
    let mut line = String::new();
    println!(
        "Stagehand started ({}). Add a /scene and a /product, then describe the edit. Type /help for commands.",
        engine.model()
    );

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        if intent.action == "noop" {
            continue;
        }
        let flow = handle_intent(&mut engine, &mut config, &intent)?;
        report_warnings(&mut engine);
        match flow {
            Flow::Continue => {}
            Flow::Quit => break,
        }
    }

    engine.finish()?;
    println!("Session saved to {}", engine.out_dir().display());
    Ok(())
}

/// Runs one chat command. Workspace errors are printed and the session
/// carries on; only session-level failures are returned.
fn handle_intent(
    engine: &mut WorkspaceEngine,
    config: &mut EngineConfig,
    intent: &Intent,
) -> Result<Flow> {
    match intent.action.as_str() {
        "help" => {
            println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
            println!("Anything else is sent as an edit instruction.");
        }
        "quit" => return Ok(Flow::Quit),
        "import_scene" | "import_product" => {
            let role = if intent.action == "import_scene" {
                ImageRole::Scene
            } else {
                ImageRole::Product
            };
            let Some(source) = intent.arg_str("source") else {
                println!("/{} requires a path or URL", role.as_str());
                return Ok(Flow::Continue);
            };
            match engine.import_source(role, source) {
                Ok(image) => println!(
                    "{} set: {} ({}, {} bytes)",
                    role.as_str(),
                    image.file_name(),
                    image.mime_type(),
                    image.len()
                ),
                Err(err) => println!("{} import failed: {err}", role.as_str()),
            }
        }
        "camera_capture" => {
            let role = intent.arg_str("role").and_then(ImageRole::parse);
            let (Some(role), Some(path)) = (role, intent.arg_str("path")) else {
                println!("Usage: /camera scene|product <captured-still>");
                return Ok(Flow::Continue);
            };
            let path = Path::new(path);
            let bytes = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    println!("camera still unreadable: {err}");
                    return Ok(Flow::Continue);
                }
            };
            match engine.import_camera_still(role, bytes, mime_for_path(path)) {
                Ok(image) => println!("{} captured: {}", role.as_str(), image.file_name()),
                Err(err) => println!("camera capture failed: {err}"),
            }
        }
        "generate" => {
            let prompt = intent.prompt.clone().unwrap_or_default();
            engine.edit_prompt(prompt);
            println!("Generating with {}...", engine.model());
            match engine.generate_pending() {
                Ok(_) => {
                    print_current(engine);
                    if engine.state().first_result_hint() {
                        println!("Tip: keep typing edits to refine this image, or /undo to step back.");
                        engine.dismiss_first_result_hint();
                    }
                }
                Err(err) => println!("Generation failed: {err}"),
            }
        }
        "undo" => {
            if engine.undo() {
                print_current(engine);
            } else {
                println!("Nothing to undo.");
            }
        }
        "redo" => {
            if engine.redo() {
                print_current(engine);
            } else {
                println!("Nothing to redo.");
            }
        }
        "reset" => {
            engine.reset();
            println!("Workspace cleared.");
        }
        "history" => {
            for line in history_lines(engine.history()) {
                println!("{line}");
            }
        }
        "status" => {
            for line in status_lines(engine.state()) {
                println!("{line}");
            }
            for (slot, label) in [
                (PreviewSlot::Scene, "scene"),
                (PreviewSlot::Product, "product"),
                (PreviewSlot::Display, "display"),
            ] {
                if let Some(path) = engine.preview_path(slot) {
                    println!("preview {label}: {}", path.display());
                }
            }
        }
        "download" => {
            let dir = intent.arg_str("path").map(PathBuf::from);
            match engine.download(dir.as_deref()) {
                Ok(path) => println!("Saved {}", path.display()),
                Err(err) => println!("Download failed: {err}"),
            }
        }
        "share" => match engine.share(&SystemShare) {
            Ok(ShareOutcome::Shared) => println!("Shared."),
            Ok(ShareOutcome::Cancelled) => {}
            Ok(ShareOutcome::Unsupported) => {
                println!("Sharing is not available here; use /download instead.")
            }
            Err(err) => println!("Share failed: {err}"),
        },
        "set_layout" => match intent.arg_str("layout").and_then(LayoutMode::parse) {
            Some(layout) => {
                engine.set_layout(layout);
                println!("Layout: {}", layout.as_str());
            }
            None => println!("Usage: /layout compact|wide|<width>"),
        },
        "toggle_panel" => match intent.arg_str("panel").and_then(MobilePanel::parse) {
            Some(panel) => {
                engine.toggle_panel(panel);
                println!("{}", view_line(engine.view()));
            }
            None => println!("Usage: /panel images|tools|none"),
        },
        "skip_onboarding" => {
            engine.skip_onboarding();
            println!("{}", view_line(engine.view()));
        }
        "set_model" => {
            let Some(model) = intent.arg_str("model") else {
                println!("Model: {}", engine.model());
                return Ok(Flow::Continue);
            };
            let next = config.clone().with_model(Some(model.to_string()));
            match build_generation_client(&next) {
                Ok(client) => {
                    engine.set_client(client);
                    *config = next;
                    println!("Model set to {}", engine.model());
                }
                Err(err) => println!("Model unchanged: {err:#}"),
            }
        }
        "unknown" => {
            let command = intent.arg_str("command").unwrap_or_default();
            println!("Unknown command /{command}. Type /help for commands.");
        }
        other => println!("Unhandled action {other}"),
    }
    Ok(Flow::Continue)
}

fn run_batch(args: RunArgs) -> Result<i32> {
    let config = args.engine.config();
    let mut engine = args.engine.open(&config)?;
    let result = run_batch_steps(&mut engine, &args);
    report_warnings(&mut engine);
    engine.finish()?;
    let saved = result?;
    println!("Saved {}", saved.display());
    Ok(0)
}

fn run_batch_steps(engine: &mut WorkspaceEngine, args: &RunArgs) -> Result<PathBuf> {
    engine
        .import_source(ImageRole::Scene, &args.scene)
        .with_context(|| format!("scene {}", args.scene))?;
    if let Some(product) = args.product.as_deref() {
        engine
            .import_source(ImageRole::Product, product)
            .with_context(|| format!("product {product}"))?;
    }
    if args.prompts.is_empty() {
        bail!("at least one --prompt is required");
    }
    for (step, prompt) in args.prompts.iter().enumerate() {
        engine
            .generate(prompt)
            .with_context(|| format!("edit {} ({prompt})", step + 1))?;
        println!("[{}/{}] {prompt}", step + 1, args.prompts.len());
    }
    let dir = args.download_dir.as_deref();
    Ok(engine.download(dir)?)
}

fn report_warnings(engine: &mut WorkspaceEngine) {
    for warning in engine.take_warnings() {
        eprintln!("warning: {warning}");
    }
}

fn print_current(engine: &WorkspaceEngine) {
    let history = engine.history();
    let current = history.current();
    let shown = engine
        .preview_path(PreviewSlot::Display)
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "(empty)".to_string());
    let prompt = if current.prompt_text.is_empty() {
        String::new()
    } else {
        format!(" \"{}\"", current.prompt_text)
    };
    println!(
        "[{}/{}]{prompt} -> {shown}",
        history.index() + 1,
        history.len()
    );
}

fn history_lines(history: &HistoryStore) -> Vec<String> {
    let mut lines = Vec::new();
    for (index, entry) in history.entries().iter().enumerate() {
        let marker = if index == history.index() { '*' } else { ' ' };
        lines.push(format!("{marker} {index}: {}", entry.label));
        if let Some(diff) = entry.prompt_diff.as_ref() {
            lines.extend(diff.iter().map(|line| format!("      {line}")));
        }
    }
    lines
}

fn status_lines(state: &WorkspaceState) -> Vec<String> {
    let current = state.current();
    let history = state.history();
    let mut lines = vec![
        format!(
            "history: {}/{} (undo: {}, redo: {})",
            history.index() + 1,
            history.len(),
            history.can_undo(),
            history.can_redo()
        ),
        format!(
            "scene: {}",
            current
                .scene_image
                .as_ref()
                .map(|image| image.file_name())
                .unwrap_or("none")
        ),
        format!(
            "product: {}",
            current
                .product_image
                .as_ref()
                .map(|image| image.file_name())
                .unwrap_or("none")
        ),
        format!("layout: {}", state.layout().as_str()),
        view_line(state.view()),
    ];
    if let Some(error) = state.error() {
        lines.push(format!("error: {error}"));
    }
    lines
}

fn view_line(view: WorkspaceView) -> String {
    match view {
        WorkspaceView::Onboarding(step) => format!("view: onboarding ({})", step.as_str()),
        WorkspaceView::Panels(panels) => {
            let mut shown = Vec::new();
            if panels.images {
                shown.push("images");
            }
            if panels.tools {
                shown.push("tools");
            }
            if shown.is_empty() {
                "view: canvas only".to_string()
            } else {
                format!("view: {}", shown.join(" + "))
            }
        }
    }
}
