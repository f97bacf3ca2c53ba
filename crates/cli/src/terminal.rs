//! Terminal presentation: stdin lines in, rendered session events out.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use forgeloop_agent::{AgentMetrics, KnowledgeSnapshot, Plan, Presenter, SessionEvent, Task};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, mpsc};

/// Lines typed on stdin, read on a background task.
pub struct LineReader {
    rx: mpsc::Receiver<String>,
}

impl LineReader {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut lines = BufReader::new(io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line.trim().to_string()).await.is_err() {
                            break;
                        }
                    }
                    // EOF (Ctrl+D) or a broken stdin both end the session
                    Ok(None) | Err(_) => break,
                }
            }
        });

        Self { rx }
    }

    /// The next line, or `None` once stdin is closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// `y` or `yes`, any case.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn render_tasks(tasks: &[Task]) -> String {
    tasks
        .iter()
        .enumerate()
        .map(|(i, t)| format!("    {}. {} ({})", i + 1, t.description, t.complexity))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_plan(plan: &Plan) -> String {
    render(&SessionEvent::PlanCreated {
        narrative: plan.narrative.clone(),
        tasks: plan.subtasks.clone(),
        refined: plan.refined,
    })
}

pub fn render_metrics(metrics: &AgentMetrics) -> String {
    format!(
        "  Metrics: {} tasks, {} successful ({:.0}%), {} patterns learned",
        metrics.total_tasks,
        metrics.successful_tasks,
        metrics.success_rate() * 100.0,
        metrics.patterns_learned
    )
}

pub fn render_knowledge(snapshot: &KnowledgeSnapshot) -> String {
    let mut out = format!(
        "  Knowledge: {} patterns, {} solutions, {} preferences\n",
        snapshot.counts.patterns, snapshot.counts.solutions, snapshot.counts.preferences
    );
    if snapshot.patterns.is_empty() {
        out.push_str("  (no patterns yet)");
    }
    for p in &snapshot.patterns {
        out.push_str(&format!(
            "    [{}] {} (success {:.0}%, used {}x)\n",
            p.pattern_type,
            p.description,
            p.success_rate * 100.0,
            p.usage_count
        ));
    }
    out.trim_end().to_string()
}

/// One event as terminal text. Fragments come back verbatim.
pub fn render(event: &SessionEvent) -> String {
    match event {
        SessionEvent::PlanCreated {
            narrative,
            tasks,
            refined,
        } => {
            let title = if *refined { "Refined plan" } else { "Plan" };
            let body: Vec<String> = narrative.lines().map(|l| format!("  │ {l}")).collect();
            format!(
                "\n  {title}:\n{}\n\n  Tasks:\n{}",
                body.join("\n"),
                render_tasks(tasks)
            )
        }
        SessionEvent::TaskStarted { index, total, task } => {
            format!("\n  ▶ [{index}/{total}] {} ({})", task.description, task.complexity)
        }
        SessionEvent::Fragment { content } => content.clone(),
        SessionEvent::TaskCompleted {
            task_id,
            success,
            preview,
            ..
        } => {
            let mark = if *success { "✅" } else { "❌" };
            format!("  {mark} {task_id}\n    {}", preview.replace('\n', "\n    "))
        }
        SessionEvent::TaskFailed { index, error, .. } => {
            format!("  [Error] Task {index} failed: {error}")
        }
        SessionEvent::Metrics { metrics } => render_metrics(metrics),
        SessionEvent::PatternsLearned { count } => format!("  Learned {count} new pattern(s)"),
        SessionEvent::Info { message } => format!("  {message}"),
        SessionEvent::Error { message } => format!("  [Error] {message}"),
        SessionEvent::Summary { completed, total } => {
            format!("\n  Completed {completed}/{total} tasks")
        }
    }
}

/// Prints session events and asks plan confirmations on stdin.
pub struct TerminalPresenter {
    input: Mutex<LineReader>,
    auto_confirm: bool,
    mid_stream: AtomicBool,
}

impl TerminalPresenter {
    pub fn new(input: LineReader) -> Self {
        Self {
            input: Mutex::new(input),
            auto_confirm: false,
            mid_stream: AtomicBool::new(false),
        }
    }

    /// Accept every plan without asking.
    pub fn auto_confirming(mut self) -> Self {
        self.auto_confirm = true;
        self
    }

    /// Print `label` and wait for a line.
    pub async fn prompt(&self, label: &str) -> Option<String> {
        print!("{label}");
        let _ = std::io::stdout().flush();
        self.input.lock().await.next_line().await
    }
}

#[async_trait]
impl Presenter for TerminalPresenter {
    async fn emit(&self, event: SessionEvent) {
        if let SessionEvent::Fragment { content } = &event {
            if !self.mid_stream.swap(true, Ordering::Relaxed) {
                print!("    ");
            }
            print!("{}", content.replace('\n', "\n    "));
            let _ = std::io::stdout().flush();
            return;
        }

        if self.mid_stream.swap(false, Ordering::Relaxed) {
            println!();
        }
        match event {
            SessionEvent::TaskFailed { .. } | SessionEvent::Error { .. } => {
                eprintln!("{}", render(&event))
            }
            _ => println!("{}", render(&event)),
        }
    }

    async fn confirm_plan(&self, _plan: &Plan) -> bool {
        if self.auto_confirm {
            return true;
        }
        self.prompt("\n  Execute this plan? (y/n): ")
            .await
            .is_some_and(|answer| is_affirmative(&answer))
    }
}
