//! `neonchat chat` — Stream turns from a running gateway.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use neonchat_client::client::resolve_mode;
use neonchat_client::profile::StyleProfile;
use neonchat_client::{
    Attachment, ChatClient, ChatSession, Phase, ProfileFile, StreamCallbacks, StreamOutcome, ToolLifecycle,
};
use neonchat_config::AppConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::ChatArgs;

/// Prints a streamed reply to the terminal as it arrives.
#[derive(Default)]
struct TerminalPrinter {
    started: bool,
}

impl StreamCallbacks for TerminalPrinter {
    fn on_phase(&mut self, phase: Phase) {
        match phase {
            Phase::Analyzing => eprintln!("  … analyzing images"),
            Phase::Generating => eprintln!("  … thinking"),
            Phase::Streaming => {}
        }
    }

    fn on_tool_event(&mut self, event: &ToolLifecycle) {
        match event {
            ToolLifecycle::ToolStart { tool, input } => eprintln!("  ⚙ {tool} {input}"),
            ToolLifecycle::ToolEnd { tool, output } => eprintln!("  ✓ {tool} → {output}"),
        }
    }

    fn on_delta(&mut self, text: &str) {
        if !self.started {
            self.started = true;
            print!("\n  Assistant > ");
        }
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    fn on_done(&mut self) {
        println!("\n");
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("\n  [Error] {message}\n");
    }
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let url = args.url.clone().unwrap_or_else(|| default_url(&config));
    debug!(url = %url, mode = %args.mode, images = args.images.len(), "Starting chat");

    let mut client = ChatClient::new(&url).with_connect_timeout(Duration::from_secs(10));
    if let Some(token) = &args.token {
        client = client.with_token(token);
    }
    let client = Arc::new(client);

    let profile_file = ProfileFile::default_location();
    let mut session = ChatSession::new(client.clone(), profile_file.load()).with_mode(&args.mode);
    if args.no_tools {
        session = session.with_tools(false);
    }
    for path in &args.images {
        let attachment = Attachment::from_path(path).await?;
        session.attachments_mut().add(attachment);
    }

    if let Some(message) = args.message {
        let outcome = send(&mut session, &client, &message).await;
        return match outcome {
            StreamOutcome::Failed => Err("Chat turn failed".into()),
            _ => Ok(()),
        };
    }

    let (mode, custom) = resolve_mode(&args.mode);
    println!();
    println!("  NeonChat — Interactive Mode");
    println!("  Gateway:  {url}");
    println!(
        "  Mode:     {}",
        match (mode, custom) {
            (Some(m), Some(_)) => format!("{m} (custom)"),
            (Some(m), None) => m,
            _ => "default".into(),
        }
    );
    println!("  Tools:    {}", if args.no_tools { "off" } else { "on" });
    println!("  Type 'exit' to quit, '/help' for commands. Ctrl-C cancels a reply.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        let before = session.profile().clone();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        if let Some(command) = line.strip_prefix('/') {
            match local_command(&mut session, command).await {
                Ok(reply) => println!("  {reply}\n"),
                Err(e) => eprintln!("  [Error] {e}\n"),
            }
            if session.profile() != &before {
                if let Err(e) = profile_file.save(session.profile()) {
                    warn!(error = %e, "Failed to save profile");
                }
            }
            continue;
        }
        send(&mut session, &client, line).await;
    }

    println!("  Goodbye!");
    Ok(())
}

/// Run one turn; Ctrl-C aborts it.
async fn send(session: &mut ChatSession, client: &ChatClient, message: &str) -> StreamOutcome {
    let mut printer = TerminalPrinter::default();
    let turn = session.send(message, &mut printer);
    tokio::pin!(turn);

    let outcome = tokio::select! {
        outcome = &mut turn => outcome,
        _ = tokio::signal::ctrl_c() => {
            client.abort();
            turn.await
        }
    };
    if outcome == StreamOutcome::Cancelled {
        eprintln!("\n  (cancelled)\n");
    }
    outcome
}

/// Commands handled on the client: profile edits and attachments.
async fn local_command(session: &mut ChatSession, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    let rest = rest.trim();
    match name {
        "goal" if !rest.is_empty() => {
            session.profile_mut().add_goal(rest);
            Ok(format!("Goal noted ({} total).", session.profile().long_term_goals.len()))
        }
        "style" => {
            let style: StyleProfile = serde_json::from_value(style_json(rest))
                .map_err(|_| "usage: /style <strategic|casual|technical> <low|medium|high> <loose|organized|structured>")?;
            session.profile_mut().set_style(style);
            Ok("Style updated.".into())
        }
        "image" if !rest.is_empty() => {
            let attachment = Attachment::from_path(Path::new(rest)).await?;
            let size = attachment.size();
            session.attachments_mut().add(attachment);
            Ok(format!("Attached {rest} ({size} bytes)."))
        }
        "reset" => {
            session.profile_mut().reset();
            Ok("Profile reset.".into())
        }
        _ => Ok("Commands: /goal <text>, /style <tone> <detail> <structure>, /image <path>, /reset".into()),
    }
}

fn style_json(args: &str) -> serde_json::Value {
    let mut words = args.split_whitespace();
    serde_json::json!({
        "tone": words.next().unwrap_or_default(),
        "verbosity": words.next().unwrap_or_default(),
        "structure": words.next().unwrap_or_default(),
    })
}

fn default_url(config: &AppConfig) -> String {
    let host = match config.gateway.host.as_str() {
        "0.0.0.0" | "" => "127.0.0.1",
        other => other,
    };
    format!("http://{host}:{}", config.gateway.port)
}
