use anyhow::{Context, Result, bail};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info, warn};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use url::Url;
use wifi_connect_client::{
    AppConfig, AuthorizationBroker, AuthorizationFlow, CampaignInterceptor, DeviceIdentity,
    DisplayOwner, LogAlerts, RedirectResponse, ServiceRegistry, SessionServices, WifiOrchestrator,
    push::{self, PushDispatcher},
};

/// Console stand-in for the platform browser leg: print the authorization
/// URL, let the user complete the login in a browser, and paste the redirect
/// URL back.
struct ConsoleBroker;

impl AuthorizationBroker for ConsoleBroker {
    async fn authorize(&self, authorization_url: &str) -> Result<RedirectResponse> {
        println!("open this URL in a browser and log in:\n\n  {authorization_url}\n");
        println!("paste the redirect URL here:");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let line = lines
            .next_line()
            .await
            .context("reading redirect url failed")?
            .context("stdin closed before redirect url")?;

        parse_redirect(line.trim())
    }
}

fn parse_redirect(redirect_url: &str) -> Result<RedirectResponse> {
    let url = Url::parse(redirect_url).context("redirect url is not a valid url")?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    match (code, state) {
        (Some(code), Some(state)) => Ok(RedirectResponse { code, state }),
        _ => bail!("redirect url carries no code/state parameters"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("client version: {}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::get();

    // Push plumbing comes up before any session exists.
    let cancel = CancellationToken::new();
    // no real transport in the console demo, the sender just stays alive
    let (_push_tx, push_rx) = push::channel();
    let (inbox_tx, inbox_rx) = push::channel();
    let mut dispatcher = PushDispatcher::new(push_rx);
    dispatcher.attach_foreground(inbox_tx);
    let dispatcher_task = dispatcher.spawn(cancel.clone());

    let interceptor = std::sync::Arc::new(CampaignInterceptor::new());
    let push_listener = interceptor
        .clone()
        .spawn_push_listener(inbox_rx, cancel.child_token());

    let session = AuthorizationFlow::new()
        .login(&ConsoleBroker)
        .await
        .context("login failed")?;
    info!("logged in as {}", session.display_name().unwrap_or_default());

    let registry = ServiceRegistry::new();
    registry.initialize(SessionServices::create(&session).context("service creation failed")?);

    let device_id = DeviceIdentity::random();
    let orchestrator = WifiOrchestrator::new(
        registry.wifi()?,
        std::sync::Arc::new(LogAlerts),
        device_id.clone(),
        config.orchestrator.locale_profile.clone(),
    );

    orchestrator.start().await.context("startup failed")?;
    let reconciler = orchestrator.spawn_reconciler(config.orchestrator.poll_interval);
    let _permission_guard = orchestrator.spawn_permission_listener();

    interceptor
        .fetch_next(registry.campaign()?.as_ref(), &device_id)
        .await;
    if let Some(campaign) = interceptor.active() {
        info!("campaign active: {campaign:?}");
    }

    println!("commands: status | accept | connect | disconnect | done <url> | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("ctrl-c");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading command failed")? else { break };
                if session.is_expired() {
                    warn!("session expired, logging out");
                    break;
                }
                let line = line.trim();
                let (command, argument) = line.split_once(' ').unwrap_or((line, ""));

                match command {
                    "status" => {
                        println!("gate: {}", orchestrator.gate());
                        println!("connection: {}", orchestrator.connection());
                        println!("display owner: {:?}", interceptor.display_owner());
                    }
                    "accept" => match orchestrator.legal_terms() {
                        Some(terms) => {
                            println!("{}", terms.text);
                            if let Err(e) = orchestrator.accept_legal_terms(&terms.version).await {
                                error!("accepting legal terms failed: {e}");
                            }
                        }
                        None => println!("no legal terms pending"),
                    },
                    "connect" => {
                        if interceptor.display_owner() == DisplayOwner::Campaign {
                            warn!("a campaign owns the display, finish it first");
                            continue;
                        }
                        if let Err(e) = orchestrator.connect().await {
                            error!("connect failed: {e}");
                        }
                    }
                    "disconnect" => {
                        if let Err(e) = orchestrator.disconnect().await {
                            error!("disconnect failed: {e}");
                        }
                    }
                    "done" => {
                        if interceptor.on_navigation(argument) {
                            println!("campaign completed");
                        } else {
                            println!("navigation did not complete the campaign");
                        }
                    }
                    "quit" => break,
                    "" => {}
                    other => println!("unknown command: {other}"),
                }
            }
        }
    }

    orchestrator.shutdown();
    registry.clear();
    cancel.cancel();

    reconciler.await.context("reconciler task failed")?;
    push_listener.await.context("push listener task failed")?;
    dispatcher_task.await.context("dispatcher task failed")?;

    debug!("good bye");
    Ok(())
}
