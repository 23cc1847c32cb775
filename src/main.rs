use std::{env, sync::Arc};

use anyhow::Context;
use fedround::{
    config::CoordinatorConfig,
    service::{CoordinatorBuilder, Server},
};
use log::info;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;

const CONFIG_ENV: &str = "FEDROUND_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .or_else(|| env::var(CONFIG_ENV).ok())
        .with_context(|| format!("usage: coordinator <config.json>, or set {CONFIG_ENV}"))?;

    let mut config = CoordinatorConfig::from_path(&path)?;
    config.apply_env()?;

    let coordinator = CoordinatorBuilder::new()
        .build(&config)
        .context("failed to build the coordinator")?;
    let coordinator = Arc::new(coordinator);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to listen at {addr}"))?;
    info!("listening at {addr}");

    let mut status = coordinator.subscribe();
    tokio::spawn(async move {
        let mut round = status.borrow().round;

        while status.changed().await.is_ok() {
            let snapshot = status.borrow_and_update().clone();
            if snapshot.round == round {
                continue;
            }

            round = snapshot.round;
            if let Ok(json) = serde_json::to_string(&snapshot) {
                info!("status {json}");
            }
        }
    });

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                info!("received SIGINT");
                cancel.cancel();
            }
        }
    });

    Server::new(coordinator, cancel)
        .with_max_frame_len(config.max_frame_len)
        .with_deadline_check_interval(config.deadline_check_interval())
        .run(listener)
        .await?;

    info!("wrapping up");
    Ok(())
}
