//! CLI (Command Line Interface) mode
//!
//! Interactive REPL over one conversation. Free text is routed as a task
//! from the current requester; accepted delegations hand the prompt to the
//! target agent so follow-up lines continue the chain.

use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, Emacs, KeyCode, KeyModifiers, Keybindings,
    MenuBuilder, Prompt, Reedline, ReedlineEvent, ReedlineMenu, Signal, Suggestion,
};
use std::borrow::Cow;
use tracing::info;
use vana_core::agents::RoutingState;
use vana_core::{AgentStatus, ConversationId, Coordinator, DelegationDecision, StatusReporter, TaskRequest};

/// Available commands for autocomplete display
const COMMANDS: &[(&str, &str)] = &[
    ("/help", "Show this help"),
    ("/agents", "Probe agents and list their status"),
    ("/as", "Act as <agent> for the next task"),
    ("/transfer", "Transfer <agent> <task> explicitly"),
    ("/history", "Show this conversation's transfers"),
    ("/reset", "Start a new conversation"),
    ("/exit", "Quit"),
];

/// Command completer for reedline
#[derive(Clone)]
pub struct CommandCompleter {
    commands: Vec<(&'static str, &'static str)>,
}

impl CommandCompleter {
    pub fn new() -> Self {
        Self {
            commands: COMMANDS.to_vec(),
        }
    }
}

impl Default for CommandCompleter {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if !line.starts_with('/') {
            return Vec::new();
        }

        self.commands
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(line))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: reedline::Span::new(0, pos),
                append_whitespace: true,
                style: None,
            })
            .collect()
    }
}

/// Prompt showing the agent that currently holds the conversation
struct AgentPrompt {
    agent: String,
    style: Style,
}

impl AgentPrompt {
    fn new(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            style: Color::Cyan.bold(),
        }
    }
}

impl Prompt for AgentPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Owned(self.style.paint(format!("{}> ", self.agent)).to_string())
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: reedline::PromptHistorySearch,
    ) -> Cow<'_, str> {
        Cow::Borrowed("")
    }
}

/// Parsed REPL command
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Help,
    Exit,
    Agents,
    As(String),
    Transfer { target: String, text: String },
    History,
    Reset,
    Unknown(String),
}

/// Parse a slash command; `None` means the line is a task
fn parse_command(input: &str) -> Option<Command> {
    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input.splitn(3, char::is_whitespace);
    let head = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next().map(str::trim).unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or_default();

    let command = match head.as_str() {
        "/help" | "/?" => Command::Help,
        "/exit" | "/quit" | "/q" => Command::Exit,
        "/agents" => Command::Agents,
        "/history" => Command::History,
        "/reset" | "/clear" => Command::Reset,
        "/as" if !arg.is_empty() => Command::As(arg.to_string()),
        "/transfer" if !arg.is_empty() && !rest.is_empty() => Command::Transfer {
            target: arg.to_string(),
            text: rest.to_string(),
        },
        _ => Command::Unknown(input.to_string()),
    };
    Some(command)
}

/// Where the REPL's conversation currently stands
#[derive(Debug, Clone)]
struct ReplState {
    conversation: ConversationId,
    requester: String,
    hop_count: u32,
}

impl ReplState {
    fn new(requester: &str) -> Self {
        Self {
            conversation: ConversationId::default(),
            requester: requester.to_string(),
            hop_count: 0,
        }
    }

    /// Task for `text` as sent by the current requester
    fn task(&self, text: &str) -> TaskRequest {
        TaskRequest::builder(text)
            .requester(self.requester.clone())
            .conversation(self.conversation.clone())
            .hop_count(self.hop_count)
            .build()
    }

    /// Follow a decision: an accepted task moves to its target
    fn apply(&mut self, decision: &DelegationDecision) {
        match decision.next_task() {
            Some(task) => {
                self.requester = task.requester().to_string();
                self.hop_count = task.hop_count();
            }
            None => {
                self.requester = decision.target_agent().to_string();
            }
        }
    }

    fn reset(&mut self, requester: &str) {
        *self = Self::new(requester);
    }
}

/// Run CLI interactive mode
pub async fn run_cli(coordinator: Coordinator, reporter: StatusReporter) -> anyhow::Result<()> {
    let root = coordinator.config().root_agent.clone();
    let mut state = ReplState::new(&root);

    info!(
        "Starting CLI mode with {} agents (conversation {})",
        coordinator.registry().len(),
        state.conversation
    );

    print_welcome();

    let mut keybindings = default_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Char('/'),
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );

    let menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_menu")
            .with_columns(1)
            .with_column_width(Some(48))
            .with_only_buffer_difference(false),
    );

    let hinter = DefaultHinter::default().with_style(Style::new().dimmed());

    let mut line_editor = Reedline::create()
        .with_completer(Box::new(CommandCompleter::new()))
        .with_menu(ReedlineMenu::EngineCompleter(menu))
        .with_hinter(Box::new(hinter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    loop {
        let prompt = AgentPrompt::new(&state.requester);

        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                let Some(command) = parse_command(input) else {
                    let decision = coordinator.route(&state.task(input));
                    report(&coordinator, &mut state, decision);
                    continue;
                };

                match command {
                    Command::Exit => {
                        coordinator.end_conversation(&state.conversation);
                        println!("\nBye.\n");
                        break;
                    }
                    Command::Help => print_help(),
                    Command::Agents => match reporter.probe_all().await {
                        Ok(_) => print_agents(&coordinator),
                        Err(e) => eprintln!("\n{} {}\n", Color::Red.paint("error:"), e),
                    },
                    Command::As(agent) => {
                        if coordinator.registry().contains(&agent) || agent == root {
                            state.requester = agent;
                        } else {
                            eprintln!("\n{} unknown agent: {}\n", Color::Red.paint("error:"), agent);
                        }
                    }
                    Command::Transfer { target, text } => {
                        let decision = coordinator.transfer(&state.task(&text), &target);
                        report(&coordinator, &mut state, decision);
                    }
                    Command::History => print_history(&coordinator, &state),
                    Command::Reset => {
                        coordinator.end_conversation(&state.conversation);
                        state.reset(&root);
                        println!("\nNew conversation {}\n", state.conversation);
                    }
                    Command::Unknown(input) => {
                        eprintln!("\nUnknown command: {}. Type /help for the list.\n", input);
                    }
                }
            }
            Ok(Signal::CtrlC) => {
                println!("^C");
                continue;
            }
            Ok(Signal::CtrlD) => {
                coordinator.end_conversation(&state.conversation);
                println!("\nBye.\n");
                break;
            }
            Err(err) => {
                eprintln!("\n{} {}\n", Color::Red.paint("error:"), err);
                break;
            }
        }
    }

    Ok(())
}

fn report(
    coordinator: &Coordinator,
    state: &mut ReplState,
    decision: vana_core::Result<DelegationDecision>,
) {
    let decision = match decision {
        Ok(decision) => decision,
        Err(e) => {
            eprintln!("\n{} {}\n", Color::Red.paint("error:"), e);
            return;
        }
    };

    println!();
    match &decision {
        DelegationDecision::Delegate { target, task, .. } => {
            println!(
                "{} {} ({}, hop {})",
                Color::Green.bold().paint("delegate ->"),
                target,
                decision.rationale(),
                task.hop_count()
            );
        }
        DelegationDecision::HandleDirectly { agent, .. } => {
            println!(
                "{} {} ({})",
                Color::Yellow.bold().paint("handle directly:"),
                agent,
                decision.rationale()
            );
        }
    }

    state.apply(&decision);

    let routing = coordinator.conversation_state(&state.conversation);
    if routing.is_terminal() {
        println!(
            "{}",
            Style::new()
                .dimmed()
                .paint(format!("conversation halted ({:?}); /reset to start over", routing))
        );
    } else if routing == RoutingState::Delegated {
        println!(
            "{}",
            Style::new()
                .dimmed()
                .paint(format!("now speaking as {}", state.requester))
        );
    }
    println!();
}

fn default_keybindings() -> Keybindings {
    let mut keybindings = Keybindings::new();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Esc, ReedlineEvent::Esc);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('c'), ReedlineEvent::CtrlC);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('d'), ReedlineEvent::CtrlD);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Up, ReedlineEvent::Up);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Down, ReedlineEvent::Down);
    keybindings
}

fn print_welcome() {
    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              vana-gateway CLI - routing mode               ║");
    println!("╠════════════════════════════════════════════════════════════╣");
    println!("║  Type a task and press Enter to route it                   ║");
    println!("║  Commands: /help, /agents, /transfer, /history, /exit      ║");
    println!("║  Typing / shows command suggestions                        ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
}

fn print_help() {
    println!();
    println!("Available commands:");
    for (cmd, desc) in COMMANDS {
        println!("  {:<10} - {}", cmd, desc);
    }
    println!();
    println!("Any other line is routed as a task from the agent shown in the prompt.");
    println!();
}

fn print_agents(coordinator: &Coordinator) {
    println!();
    for agent in coordinator.discover() {
        let status = match agent.status {
            AgentStatus::Available => Color::Green.paint(agent.status.to_string()),
            AgentStatus::Busy => Color::Yellow.paint(agent.status.to_string()),
            AgentStatus::Unreachable => Color::Red.paint(agent.status.to_string()),
        };
        let capabilities: Vec<&str> = agent.capabilities.iter().map(String::as_str).collect();
        println!("  {:<26} {:<12} {}", agent.name, status, capabilities.join(", "));
    }
    println!();
}

fn print_history(coordinator: &Coordinator, state: &ReplState) {
    println!();
    println!("Conversation {}", state.conversation);
    println!("{}", "─".repeat(50));

    match coordinator.conversation(&state.conversation) {
        Some(record) if !record.is_empty() => {
            for entry in record.entries() {
                println!(
                    "  hop {:>2}  {} -> {}  [{}]",
                    entry.hop_count,
                    entry.from_agent,
                    entry.to_agent,
                    entry.timestamp.format("%H:%M:%S")
                );
            }
            if let Some(reason) = record.halt_reason() {
                println!("  halted: {}", reason);
            }
        }
        _ => println!("  (no transfers yet)"),
    }
    println!();
}
