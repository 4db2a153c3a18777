//! Interactive streaming client
//!
//! Reads commands from stdin and drives the recording controller:
//!
//! ```text
//! start <address>   begin streaming the microphone to <address>:50005
//! stop              end the running session
//! test <address>    replay the reference clip to <address>:50005
//! video <address>   print the MJPEG viewer URL for <address>
//! recent            list recently used addresses
//! state             show the session state
//! quit              stop and exit
//! ```

use anyhow::Result;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mjpeg_voice::{
    audio::{list_input_devices, CpalBackend},
    config::AppConfig,
    error::Error,
    network::{video_url, Connector, NetworkEndpoint, TcpConnector, TestStreamSource},
    recent::RecentAddressStore,
    session::{BeginOutcome, RecordingController, SessionEvent},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting MJPEG voice client");

    // Optional config path as first argument
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from(&PathBuf::from(path))?,
        None => AppConfig::load()?,
    };

    println!("\n=== Input Devices ===");
    for name in list_input_devices() {
        println!("  {}", name);
    }
    println!();

    let store = Arc::new(RecentAddressStore::open(config.data_dir()?));
    let recent = store.load();
    if !recent.is_empty() {
        println!("Recent servers: {}", recent.join(", "));
    }

    let backend = Arc::new(CpalBackend::new());
    let connector: Arc<dyn Connector> =
        Arc::new(TcpConnector::new(config.network.connect_timeout()));

    let (controller, events) = RecordingController::new(
        config.capture.clone(),
        config.network.audio_port,
        backend.clone(),
        connector.clone(),
        store.clone(),
    );
    let controller = Arc::new(controller);

    // Session events arrive on a crossbeam channel; forward them from a blocking task
    tokio::task::spawn_blocking(move || {
        for event in events.iter() {
            match event {
                SessionEvent::StateChanged(state) => println!("[session] {}", state),
                SessionEvent::Failed(e) => println!("[session] error: {}", e),
                SessionEvent::Finished(stats) => println!(
                    "[session] finished: {} frames of {} bytes, {} bytes sent, {} empty reads",
                    stats.frames_sent, stats.frame_bytes, stats.bytes_sent, stats.empty_reads
                ),
            }
        }
    });

    let test_asset = match &config.storage.test_asset {
        Some(path) => Some(std::fs::read(path)?),
        None => None,
    };

    println!("Commands: start <addr> | stop | test <addr> | video <addr> | recent | state | quit");

    // Stdin on a plain thread so a pending read never holds up runtime shutdown
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    loop {
        let line = tokio::select! {
            line = line_rx.recv() => line,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };

        let mut parts = line.trim().splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default();
        let argument = parts.next().unwrap_or_default().trim();

        match command {
            "" => {}
            "start" => {
                // A failed start is reported, never fatal to the prompt
                if let Some(message) = begin_message(controller.begin(argument)) {
                    println!("{}", message);
                }
            }
            "stop" => {
                if !controller.end() {
                    println!("not streaming");
                }
            }
            "test" => {
                if argument.is_empty() {
                    println!("usage: test <address>");
                    continue;
                }
                let chunk_size = backend
                    .frame_size(&config.capture)
                    .unwrap_or_else(|_| config.capture.nominal_frame_bytes());
                let mut source = TestStreamSource::new(connector.clone(), chunk_size);
                if let Some(asset) = &test_asset {
                    source = source.with_asset(asset.clone());
                }
                let endpoint = NetworkEndpoint::new(argument, config.network.audio_port);

                match source.spawn(endpoint) {
                    Ok(handle) => {
                        // Report from a blocking task so the prompt stays responsive
                        tokio::task::spawn_blocking(move || match handle.join() {
                            Ok(Ok(report)) => println!(
                                "[test] sent {} bytes in {} chunks",
                                report.bytes_sent, report.chunks
                            ),
                            Ok(Err(e)) => println!("[test] failed: {}", e),
                            Err(_) => println!("[test] stream thread panicked"),
                        });
                    }
                    Err(e) => println!("[test] failed to start: {}", e),
                }
            }
            "video" => {
                if argument.is_empty() {
                    println!("usage: video <address>");
                    continue;
                }
                if let Err(e) = store.push(argument) {
                    tracing::warn!("Failed to remember {}: {}", argument, e);
                }
                println!(
                    "{}",
                    video_url(argument, config.network.video_port, &config.network.video_path)
                );
            }
            "recent" => {
                for (i, address) in store.load().iter().enumerate() {
                    println!("  {}. {}", i + 1, address);
                }
            }
            "state" => println!("{}", controller.state()),
            "quit" | "exit" => break,
            other => println!("unknown command: {}", other),
        }
    }

    let controller_for_shutdown = controller.clone();
    tokio::task::spawn_blocking(move || controller_for_shutdown.shutdown()).await?;
    tracing::info!("Client stopped");
    Ok(())
}

/// What to tell the user about a `start` command, if anything
fn begin_message(outcome: std::result::Result<BeginOutcome, Error>) -> Option<String> {
    match outcome {
        Ok(BeginOutcome::Started) => None,
        Ok(BeginOutcome::IgnoredEmptyAddress) => Some("usage: start <address>".to_string()),
        Ok(BeginOutcome::IgnoredBusy) => Some("already streaming; stop first".to_string()),
        Err(e) => Some(format!("[session] failed to start: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_failure_is_reported_not_fatal() {
        let spawn_error = Error::Io(std::io::Error::new(
            std::io::ErrorKind::WouldBlock,
            "Resource temporarily unavailable",
        ));
        let message = begin_message(Err(spawn_error)).unwrap();
        assert!(message.starts_with("[session] failed to start:"));
        assert!(message.contains("Resource temporarily unavailable"));
    }

    #[test]
    fn test_begin_outcome_messages() {
        assert_eq!(begin_message(Ok(BeginOutcome::Started)), None);
        assert_eq!(
            begin_message(Ok(BeginOutcome::IgnoredBusy)).as_deref(),
            Some("already streaming; stop first")
        );
        assert_eq!(
            begin_message(Ok(BeginOutcome::IgnoredEmptyAddress)).as_deref(),
            Some("usage: start <address>")
        );
    }
}
