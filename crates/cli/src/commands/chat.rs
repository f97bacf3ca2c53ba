//! `forgeloop chat`: the interactive session.

use forgeloop_agent::{Orchestrator, RequestOutcome};
use forgeloop_config::AppConfig;

use crate::runtime;
use crate::terminal::{
    LineReader, TerminalPresenter, render_knowledge, render_metrics, render_plan,
};

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Empty,
    Help,
    Quit,
    Plan,
    Status,
    Learn,
    Clear,
    Feedback(Option<String>),
    Refine(Option<String>),
    Report,
    Analyze(Option<String>),
    Unknown(String),
    /// Anything that is not a slash command
    Request(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if matches!(line, "exit" | "quit") {
            return Self::Quit;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Request(line.to_string());
        };

        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map(|(n, r)| (n, r.trim()))
            .unwrap_or((command, ""));
        let argument = (!rest.is_empty()).then(|| rest.to_string());

        match name.to_lowercase().as_str() {
            "help" | "h" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            "plan" | "p" => Self::Plan,
            "status" | "s" => Self::Status,
            "learn" | "l" => Self::Learn,
            "clear" | "c" => Self::Clear,
            "feedback" | "f" => Self::Feedback(argument),
            "refine" | "r" => Self::Refine(argument),
            "report" => Self::Report,
            "analyze" | "a" => Self::Analyze(argument),
            _ => Self::Unknown(format!("/{name}")),
        }
    }
}

fn print_help() {
    println!("\n  Commands:");
    println!("    /help, /h             Show this help");
    println!("    /plan, /p             Show the current plan");
    println!("    /status, /s           Show learning metrics");
    println!("    /learn, /l            Show what has been learned");
    println!("    /feedback, /f [text]  Give feedback");
    println!("    /refine, /r <text>    Rework the current plan and run it");
    println!("    /report               Learning report with suggestions");
    println!("    /analyze, /a <path>   Review a file");
    println!("    /clear, /c            Clear conversation memory");
    println!("    /quit, /q             Exit");
    println!("\n  Anything else is planned and executed as a request.\n");
}

fn print_outcome(outcome: RequestOutcome) {
    match outcome {
        RequestOutcome::Declined => {}
        RequestOutcome::Executed { .. } => println!(),
        RequestOutcome::NoActivePlan => println!("  No active plan. Start a task first."),
    }
}

pub async fn run(config: &AppConfig, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut orchestrator = runtime::build_orchestrator(config, verbose).await?;
    let presenter = TerminalPresenter::new(LineReader::spawn());

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        Forgeloop: plan, build, learn         ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:     {}", config.model);
    println!("  Tools:     read_file, write_file, bash, search_files");
    println!("  Commands:  {}", config.security.allowed_commands.join(", "));
    println!();
    println!("  Describe a task, or type /help.");
    println!();

    while let Some(line) = presenter.prompt("  You > ").await {
        match ReplCommand::parse(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => break,
            ReplCommand::Help => print_help(),
            ReplCommand::Plan => match orchestrator.current_plan() {
                Some(plan) => {
                    println!("{}", render_plan(plan));
                    println!(
                        "\n  Progress: {}/{} tasks completed\n",
                        plan.completed_count(),
                        plan.subtasks.len()
                    );
                }
                None => println!("  No active plan. Start a task first."),
            },
            ReplCommand::Status => println!("{}", render_metrics(&orchestrator.metrics())),
            ReplCommand::Learn => match orchestrator.show_knowledge().await {
                Ok(snapshot) => println!("{}", render_knowledge(&snapshot)),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            ReplCommand::Clear => {
                orchestrator.clear_history();
                println!("  Memory cleared");
            }
            ReplCommand::Feedback(text) => feedback(&mut orchestrator, &presenter, text).await,
            ReplCommand::Refine(None) => println!("  Usage: /refine <what to change>"),
            ReplCommand::Refine(Some(text)) => {
                match orchestrator.refine_plan(&text, &presenter).await {
                    Ok(outcome) => print_outcome(outcome),
                    Err(e) => eprintln!("  [Error] {e}"),
                }
            }
            ReplCommand::Report => match orchestrator.generate_report().await {
                Ok(report) => println!("\n{report}\n"),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            ReplCommand::Analyze(None) => println!("  Usage: /analyze <path>"),
            ReplCommand::Analyze(Some(path)) => match orchestrator.analyze_code(&path).await {
                Ok(analysis) => println!("\n  {}:\n{}\n", analysis.path, analysis.analysis),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            ReplCommand::Unknown(command) => {
                println!("  Unknown command: {command}");
                print_help();
            }
            ReplCommand::Request(request) => {
                match orchestrator.handle_request(&request, &presenter).await {
                    Ok(outcome) => print_outcome(outcome),
                    Err(e) => eprintln!("  [Error] {e}"),
                }
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

async fn feedback(
    orchestrator: &mut Orchestrator,
    presenter: &TerminalPresenter,
    text: Option<String>,
) {
    let text = match text {
        Some(text) => text,
        None => match presenter.prompt("\n  Enter your feedback: ").await {
            Some(text) if !text.trim().is_empty() => text,
            _ => return,
        },
    };

    match orchestrator.submit_feedback(&text).await {
        Ok(record) => {
            println!("\n{}\n", record.improvements);
            if record.applied {
                println!("  Feedback saved as a preference for future plans");
            } else {
                println!("  Feedback could not be saved");
            }
        }
        Err(e) => eprintln!("  [Error] {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_commands_and_aliases() {
        assert_eq!(ReplCommand::parse("/help"), ReplCommand::Help);
        assert_eq!(ReplCommand::parse("/h"), ReplCommand::Help);
        assert_eq!(ReplCommand::parse("/Q"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse("exit"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse("/p"), ReplCommand::Plan);
        assert_eq!(ReplCommand::parse("/s"), ReplCommand::Status);
        assert_eq!(ReplCommand::parse("/l"), ReplCommand::Learn);
        assert_eq!(ReplCommand::parse("/c"), ReplCommand::Clear);
        assert_eq!(ReplCommand::parse("/report"), ReplCommand::Report);
    }

    #[test]
    fn arguments_are_trimmed_and_optional() {
        assert_eq!(ReplCommand::parse("/f"), ReplCommand::Feedback(None));
        assert_eq!(
            ReplCommand::parse("/feedback   too verbose  "),
            ReplCommand::Feedback(Some("too verbose".into()))
        );
        assert_eq!(
            ReplCommand::parse("/refine split task 2"),
            ReplCommand::Refine(Some("split task 2".into()))
        );
        assert_eq!(ReplCommand::parse("/a"), ReplCommand::Analyze(None));
    }

    #[test]
    fn plain_text_is_a_request() {
        assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
        assert_eq!(
            ReplCommand::parse("build a todo API"),
            ReplCommand::Request("build a todo API".into())
        );
        assert_eq!(ReplCommand::parse("/deploy now"), ReplCommand::Unknown("/deploy".into()));
    }
}
