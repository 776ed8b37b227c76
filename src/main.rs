use std::env;
use std::sync::Arc;

use minor_watch::gateway::DiscordGateway;
use minor_watch::minor_report::{ReportService, SweepRequest, SweepService, request_sweep};
use minor_watch::{Data, Error, commands, data::Services, handlers, logging};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::info;

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    logging::init()?;

    let token = env::var("DISCORD_TOKEN").expect("DISCORD_TOKEN must be set");

    // Load configuration and persisted records before connecting.
    let data = Data::load().await;
    data.config.warn_on_missing();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![commands::flag_minor(), commands::minor_reviewers()],
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                })
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(handlers::handle_event(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup({
            let data = data.clone();
            move |ctx, _ready, framework| {
                Box::pin(async move {
                    poise::builtins::register_globally(ctx, &framework.options().commands)
                        .await?;

                    // The gateway needs the HTTP client, so service wiring
                    // happens here rather than at load time.
                    let gateway: Arc<dyn minor_watch::gateway::GuildGateway> =
                        Arc::new(DiscordGateway::new(Arc::clone(&ctx.http)));
                    let reports = ReportService::new(
                        data.reports.clone(),
                        data.reviewers.clone(),
                        data.bans.clone(),
                        data.notes.clone(),
                        data.links.clone(),
                        Arc::new(data.consent.clone()),
                        Arc::clone(&gateway),
                        data.config.guild_id,
                        data.config.minor_role_id,
                    );
                    let sweep = SweepService::new(
                        data.reports.clone(),
                        data.bans.clone(),
                        data.mutes.clone(),
                        Arc::clone(&gateway),
                        data.config.guild_id,
                        data.config.minor_role_id,
                        data.config.muted_role_id,
                    );
                    let sweep_tx = sweep.clone().start(data.config.sweep_interval_seconds);
                    data.set_services(Services {
                        reports,
                        sweep,
                        sweep_tx,
                        gateway,
                    });

                    logging::log_console("Commands registered and services wired".to_string());
                    Ok(data)
                })
            }
        })
        .build();

    let intents = GatewayIntents::non_privileged() | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handlers::Handler)
        .framework(framework)
        .await
        .expect("Failed to create client");

    info!("Starting bot...");
    tokio::select! {
        result = client.start() => {
            if let Err(err) = result {
                eprintln!("Error starting the bot: {err}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            if let Some(services) = data.services() {
                request_sweep(&services.sweep_tx, SweepRequest::Shutdown).await;
            }
            if let Err(e) = data.save().await {
                eprintln!("Error saving data on shutdown: {e}");
            }
        }
    }

    Ok(())
}

fn main() {
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async_main());

    if let Err(err) = result {
        eprintln!("Error: {err}");
    }
}
