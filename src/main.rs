use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::info;
use tokio::sync::mpsc::Receiver;
use tokio::time::{Instant, interval};

use rustdonkey::config::Config;
use rustdonkey::disk::TokioDisk;
use rustdonkey::resume::ResumeData;
use rustdonkey::session::{Alert, SessionContext};
use rustdonkey::transfer::{AddTransferParams, Transfer, TransferState};

/// Restores a transfer from its resume data and verifies the data file against it
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (Some(resume_path), Some(data_path)) = (args.next(), args.next()) else {
        return Err(anyhow!("usage: rustdonkey <resume-data> <data-file>"));
    };
    let resume_path = PathBuf::from(resume_path);
    let resume_data = ResumeData::load(&resume_path).await?;
    info!(
        "loaded resume data of {} ({} pieces)",
        resume_data.hash,
        resume_data.pieces.len()
    );

    let config = Config::default();
    let tick_interval = config.tick_interval;
    let (context, mut alerts, _sources) = SessionContext::new(config, Arc::new(TokioDisk));
    let params = AddTransferParams::from_resume_data(resume_data, data_path);
    let context = Arc::new(context);
    let mut transfer = Transfer::new(params, Arc::clone(&context));

    let mut ticks = interval(tick_interval);
    loop {
        ticks.tick().await;
        let now = Instant::now();
        context.second_tick(now);
        transfer.second_tick(now);
        log_alerts(&mut alerts);
        if transfer.state() != TransferState::LoadingResumeData
            && transfer.num_pending_disk_operations() == 0
        {
            break;
        }
    }
    info!("{}", transfer.status());

    if transfer.need_save_resume_data() {
        transfer.save_resume_data().save(&resume_path).await?;
        info!("saved resume data to {}", resume_path.display());
    }

    transfer.abort();
    while !transfer.is_released() {
        ticks.tick().await;
        transfer.second_tick(Instant::now());
    }
    log_alerts(&mut alerts);

    Ok(())
}

fn log_alerts(alerts: &mut Receiver<Alert>) {
    while let Ok(alert) = alerts.try_recv() {
        info!("{:?}", alert);
    }
}
