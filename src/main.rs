use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use idea_consult::client::{HttpSessionClient, RemoteSessionClient};
use idea_consult::config::ClientConfig;
use idea_consult::error::{Error, SessionError};
use idea_consult::progress::spawn_social_proof_ticker;
use idea_consult::session::{
    ExportFormat, OrchestratorDeps, SessionOrchestrator, Stage, render_text,
};
use idea_consult::store::{KeyValueStore, LibSqlStore, MemoryStore};
use idea_consult::validation::format_phone_number;

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env().context("invalid configuration")?;

    eprintln!("💡 Idea Consult v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Engine: {}", config.api_url);
    eprintln!("   Store: {}", config.db_path);
    eprintln!("   Commands: /restart, /quit\n");

    let client: Arc<dyn RemoteSessionClient> =
        Arc::new(HttpSessionClient::from_config(&config).context("failed to build HTTP client")?);

    // ── Store ─────────────────────────────────────────────────────────
    let store: Arc<dyn KeyValueStore> = match LibSqlStore::open(&config.db_path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Failed to open store at {}, keeping state in memory: {e}", config.db_path);
            Arc::new(MemoryStore::new())
        }
    };

    let deps = OrchestratorDeps::open(&config, client, store).await;
    let orch = Arc::new(SessionOrchestrator::new(deps));

    {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.warm_up().await });
    }

    match orch.resume().await {
        Ok(Some(session)) => {
            eprintln!("Resuming session {} ({})\n", session.session_id, session.stage)
        }
        Ok(None) => {}
        Err(e) => eprintln!("Could not resume previous session: {e}\n"),
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    run(&orch, &config, &mut input).await?;

    orch.stop_progress();
    Ok(())
}

/// Drive the session stage by stage until the visitor quits.
async fn run(
    orch: &Arc<SessionOrchestrator>,
    config: &ClientConfig,
    input: &mut Input,
) -> anyhow::Result<()> {
    loop {
        let stage = orch.session().await.map(|s| s.stage);
        let keep_going = match stage {
            None => submit_idea(orch, input).await?,
            Some(Stage::Conversation) => converse(orch, input).await?,
            Some(Stage::Preview) => preview(orch, input).await?,
            Some(Stage::Generating) => generate(orch, config, input).await?,
            Some(Stage::ReportComplete) => report(orch, config, input).await?,
        };
        if !keep_going {
            return Ok(());
        }
    }
}

async fn prompt(input: &mut Input, label: &str) -> anyhow::Result<Option<String>> {
    eprint!("{label}");
    Ok(input.next_line().await?.map(|l| l.trim().to_string()))
}

/// `Some(false)` to quit, `Some(true)` when handled, `None` for ordinary input.
async fn command(orch: &SessionOrchestrator, line: &str) -> Option<bool> {
    match line {
        "/quit" => Some(false),
        "/restart" => {
            orch.restart().await;
            eprintln!("Starting over.\n");
            Some(true)
        }
        _ => None,
    }
}

async fn submit_idea(orch: &SessionOrchestrator, input: &mut Input) -> anyhow::Result<bool> {
    let Some(idea) = prompt(input, "Describe your idea: ").await? else {
        return Ok(false);
    };
    if let Some(keep_going) = command(orch, &idea).await {
        return Ok(keep_going);
    }

    match orch.start(&idea).await {
        Ok(response) => println!("\n{}\n", response.agent_response),
        Err(e) => eprintln!("{}", describe(&e)),
    }
    Ok(true)
}

async fn converse(orch: &SessionOrchestrator, input: &mut Input) -> anyhow::Result<bool> {
    let Some(line) = prompt(input, "> ").await? else {
        return Ok(false);
    };
    if let Some(keep_going) = command(orch, &line).await {
        return Ok(keep_going);
    }
    if line.is_empty() {
        return Ok(true);
    }

    match orch.send_message(&line).await {
        Ok(reply) => {
            println!("\n{}\n", reply.message.content);
            if reply.requirements_complete {
                eprintln!("Requirements complete, preparing your preview...\n");
            }
        }
        Err(e) => eprintln!("{}", describe(&e)),
    }
    Ok(true)
}

async fn preview(orch: &SessionOrchestrator, input: &mut Input) -> anyhow::Result<bool> {
    match orch.load_preview().await {
        Ok(text) if text.trim().is_empty() => {
            println!("── Preview ──\n(The engine returned an empty preview.)\n")
        }
        Ok(text) => println!("── Preview ──\n{text}\n"),
        Err(e) => {
            eprintln!("{}", describe(&e));
            let Some(line) = prompt(input, "Press Enter to retry: ").await? else {
                return Ok(false);
            };
            return Ok(command(orch, &line).await.unwrap_or(true));
        }
    }

    eprintln!("Enter your details to unlock the full report.");
    let Some(name) = prompt(input, "Name: ").await? else {
        return Ok(false);
    };
    if let Some(keep_going) = command(orch, &name).await {
        return Ok(keep_going);
    }
    let Some(email) = prompt(input, "Email: ").await? else {
        return Ok(false);
    };
    let Some(phone) = prompt(input, "Phone (optional): ").await? else {
        return Ok(false);
    };
    let phone = (!phone.is_empty()).then_some(phone);

    match orch.capture_lead(&name, &email, phone.as_deref()).await {
        Ok(ack) => {
            match &phone {
                Some(p) => eprintln!(
                    "Thanks {name}, we'll reach you at {email} or {}.",
                    format_phone_number(p)
                ),
                None => eprintln!("Thanks {name}, we'll reach you at {email}."),
            }
            if !ack.message.is_empty() {
                eprintln!("{}", ack.message);
            }
            eprintln!();
        }
        Err(Error::Validation(v)) => {
            for field in &v.errors {
                eprintln!("  {}: {}", field.field, field.message);
            }
            eprintln!();
        }
        Err(e) => eprintln!("{}", describe(&e)),
    }
    Ok(true)
}

async fn generate(
    orch: &Arc<SessionOrchestrator>,
    config: &ClientConfig,
    input: &mut Input,
) -> anyhow::Result<bool> {
    let token = CancellationToken::new();
    let (ticker, mut proof) =
        spawn_social_proof_ticker(orch.client(), config.social_proof_interval, token.clone());

    let mut views = WatchStream::new(orch.progress());
    let display = {
        let token = token.clone();
        tokio::spawn(async move {
            let mut last = None;
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    Some(view) = views.next() => {
                        if last != Some(view.percentage) {
                            last = Some(view.percentage);
                            eprintln!("  [{:>3}%] {}", view.percentage, view.label());
                        }
                        if let Some(e) = &view.last_error {
                            eprintln!("  (retrying: {e})");
                        }
                    }
                    Ok(()) = proof.changed() => {
                        if let Some(p) = proof.borrow_and_update().as_ref() {
                            eprintln!("  “{}” · {}", p.testimonial, p.metric);
                        }
                    }
                }
            }
        })
    };

    let result = orch.await_report().await;
    token.cancel();
    let _ = tokio::join!(ticker, display);

    match result {
        Ok(_) => Ok(true),
        Err(e) => {
            eprintln!("{}", describe(&e));
            let retry = prompt(input, "Press Enter to retry fetching the report: ").await?;
            let Some(line) = retry else {
                return Ok(false);
            };
            if let Some(keep_going) = command(orch, &line).await {
                return Ok(keep_going);
            }
            if matches!(e, Error::Session(SessionError::PollingStopped)) {
                orch.resume_progress().await?;
            } else {
                match orch.retry_report_fetch().await {
                    Err(Error::Session(SessionError::GenerationInProgress)) => {
                        orch.resume_progress().await?
                    }
                    Err(e) => eprintln!("{}", describe(&e)),
                    Ok(_) => {}
                }
            }
            Ok(true)
        }
    }
}

async fn report(
    orch: &SessionOrchestrator,
    config: &ClientConfig,
    input: &mut Input,
) -> anyhow::Result<bool> {
    let Some(session) = orch.session().await else {
        return Ok(true);
    };
    println!("\n{}\n", render_text(&session.context));
    if session.can_refine() {
        eprintln!(
            "Refinements left: {}. Type a change to refine, or /pdf, /txt, /json, /reload, \
             /restart, /quit.",
            session.refinements_left
        );
    } else {
        eprintln!("No refinements left. Commands: /pdf, /txt, /json, /reload, /restart, /quit.");
    }

    loop {
        let Some(line) = prompt(input, "> ").await? else {
            return Ok(false);
        };
        if let Some(keep_going) = command(orch, &line).await {
            return Ok(keep_going);
        }

        let saved = match line.as_str() {
            "" => continue,
            "/pdf" => orch.download_report(&config.download_dir).await,
            "/txt" => orch.export_report(&config.download_dir, ExportFormat::Text).await,
            "/json" => orch.export_report(&config.download_dir, ExportFormat::Json).await,
            "/reload" => match orch.reload_report().await {
                Ok(_) => return Ok(true),
                Err(e) => {
                    eprintln!("{}", describe(&e));
                    continue;
                }
            },
            text if !session.can_refine() => {
                eprintln!("No refinements left for {text:?}. Book a call to go further.");
                continue;
            }
            text => {
                match orch.refine(text).await {
                    Ok(outcome) => {
                        if let Some(summary) = &outcome.changes_summary {
                            eprintln!("{summary}");
                        }
                        eprintln!("Refinements left: {}", outcome.refinements_left);
                        if let Some(e) = &outcome.refetch_error {
                            eprintln!("Could not load the refined report ({e}). Type /reload.");
                        }
                        // Re-render with the merged sections.
                        return Ok(true);
                    }
                    Err(Error::Session(SessionError::RefinementRejected { message, cta_url })) => {
                        eprintln!("{message}");
                        if let Some(url) = cta_url {
                            eprintln!("Book a call: {url}");
                        }
                    }
                    Err(e) => eprintln!("{}", describe(&e)),
                }
                continue;
            }
        };

        match saved {
            Ok(path) => eprintln!("Saved {}", path.display()),
            Err(e) => eprintln!("{}", describe(&e)),
        }
    }
}

fn describe(error: &Error) -> String {
    match error {
        Error::Validation(v) => v
            .errors
            .iter()
            .map(|f| f.message.clone())
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}
