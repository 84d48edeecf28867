mod commands;
mod config;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, info};

use piramide_client::{FeedClient, Resolver};
use piramide_gateway::{NotifierConfig, spawn_ws_notifier};
use piramide_store::LocalStore;
use piramide_sync::tags::{Segment, segments};
use piramide_sync::{
    FeedEngine, FeedState, RepliesOutcome, ReportOutcome, Scheduler, SelectionState, Session,
    SubmitOutcome, SyncError,
};
use piramide_types::models::{ServerStatus, Theme};

use crate::commands::{Command, HELP};
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout is the feed
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "piramide=info,piramide_sync=info,piramide_client=info,piramide_gateway=info".into()
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;

    let store = Arc::new(
        LocalStore::open(&config.db_path)?.with_ledger_capacity(config.ledger_capacity),
    );

    // Nothing remote works until the descriptor resolves
    let resolver = Resolver::new(config.resolver_config())?;
    info!("Resolving API location from {}", config.descriptor_url);
    let endpoint = resolver.resolve_with_retry(config.retry_policy()).await?;

    let client = FeedClient::new(endpoint.clone(), &config.sync.client)?;
    let engine = FeedEngine::new(client, store, Some(resolver), &config.sync)?;

    let mut scheduler = Scheduler::new(engine.clone(), &config.sync);
    let _notifier = if config.push {
        let notifier = Arc::new(spawn_ws_notifier(endpoint.ws_url(), NotifierConfig::default()));
        scheduler = scheduler.with_notifier(notifier.clone());
        Some(notifier)
    } else {
        None
    };

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let scheduler_task = tokio::spawn(scheduler.run(async {
        let _ = stop_rx.await;
    }));

    let session = Session::new(engine, &config.sync);
    println!("Vozes da Pirâmide. Digite help para ver os comandos.");
    run_commands(&session).await?;

    let _ = stop_tx.send(());
    scheduler_task.await?;
    Ok(())
}

async fn run_commands(session: &Session) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                println!("{}", msg);
                continue;
            }
        };

        if command == Command::Quit {
            break;
        }
        if let Err(e) = execute(session, command).await {
            report_error(&e);
        }
    }
    Ok(())
}

async fn execute(session: &Session, command: Command) -> Result<(), SyncError> {
    let engine = session.engine();

    match command {
        Command::Feed => {
            if engine.state().await == FeedState::Idle {
                engine.refresh().await?;
            }
            print_feed(engine).await;
        }
        Command::Post(text) => print_submit(session, session.submit_post(&text).await?),
        Command::Reply { post_id, text } => {
            print_submit(session, session.submit_reply(&post_id, &text).await?)
        }
        Command::Class(class_tag) => match session.select_class(class_tag).await? {
            Some(outcome) => print_submit(session, outcome),
            None => println!("classe: {}", class_tag),
        },
        Command::Cancel => {
            session.cancel_selection();
            print_selection(session);
        }
        Command::Replies(post_id) => match engine.load_replies(&post_id).await? {
            RepliesOutcome::Loaded(replies) if replies.is_empty() => println!("sem respostas"),
            RepliesOutcome::Loaded(replies) => {
                for reply in replies {
                    let class = reply.class_tag.map(|c| c.as_str()).unwrap_or("-");
                    println!("  ↳ {} [{}]: {}", reply.alias, class, reply.text);
                }
            }
            RepliesOutcome::Stale => println!("o post {} saiu do mural", post_id),
        },
        Command::Vote { post_id, choice } => {
            let outcome = session.vote(&post_id, choice).await?;
            println!("post {}: {} votos ({:?})", post_id, outcome.upvotes, outcome.vote);
        }
        Command::Report { post_id, reason } => {
            match session.report(&post_id, reason.as_deref()).await? {
                ReportOutcome::Sent => println!("denúncia enviada"),
                ReportOutcome::AlreadyReported => println!("você já denunciou este post"),
                ReportOutcome::RecordedLocally => println!("denúncia registrada neste aparelho"),
            }
        }
        Command::Trending => {
            let trending = engine.trending().await;
            if trending.is_empty() {
                println!("nenhuma tag em alta");
            }
            for (tag, count) in trending {
                println!("#{} ({})", tag, count);
            }
        }
        Command::Status => match engine.status().await {
            ServerStatus::Online { version } => {
                println!("online (versão {})", version.as_deref().unwrap_or("?"))
            }
            ServerStatus::Offline => println!("offline"),
            ServerStatus::Unknown => println!("desconhecido"),
        },
        Command::Theme(Some(theme)) => {
            session.set_theme(theme)?;
            println!("tema: {}", theme_name(theme));
        }
        Command::Theme(None) => println!("tema: {}", theme_name(session.toggle_theme()?)),
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

async fn print_feed(engine: &FeedEngine) {
    if let FeedState::Failed(reason) = engine.state().await {
        println!("mural indisponível: {}", reason);
        return;
    }

    let items = engine.render_list().await;
    if items.is_empty() {
        println!("mural vazio");
    }
    for item in items {
        let post = &item.post;
        let emoji = post.avatar.as_ref().map(|a| a.emoji.as_str()).unwrap_or("");
        let text: String = segments(&post.text)
            .into_iter()
            .map(|s| match s {
                Segment::Text(t) => t.to_string(),
                Segment::Tag(t) => format!("[{}]", t),
            })
            .collect();
        let flags = if item.reported { " (denunciado)" } else { "" };
        println!(
            "#{} {} {} [{}] {} | {} votos, {} respostas{}",
            post.id,
            emoji,
            post.alias,
            post.class_tag,
            text,
            post.upvotes,
            post.replies_count,
            flags
        );
    }
}

fn print_submit(session: &Session, outcome: SubmitOutcome) {
    match outcome {
        SubmitOutcome::Posted(post) => println!("publicado #{} [{}]", post.id, post.class_tag),
        SubmitOutcome::Replied(reply) => println!("resposta enviada ao post {}", reply.post_id),
        SubmitOutcome::AwaitingClass => print_selection(session),
    }
}

fn print_selection(session: &Session) {
    match session.selection() {
        SelectionState::Selecting { .. } => println!("escolha a classe: classe <base|meio|topo>"),
        SelectionState::Selected(class_tag) => println!("classe: {}", class_tag),
        SelectionState::NoSelection if session.pending().is_some() => {
            println!("envio pendente; escolha a classe quando quiser")
        }
        SelectionState::NoSelection => println!("nenhuma classe escolhida"),
    }
}

fn report_error(e: &SyncError) {
    debug!("Command failed: {}", e);
    println!("erro: {}", e);
    if let Some(text) = e.restored_text().filter(|t| !t.trim().is_empty()) {
        println!("seu texto: {}", text);
    }
}

fn theme_name(theme: Theme) -> &'static str {
    match theme {
        Theme::Light => "claro",
        Theme::Dark => "escuro",
    }
}
