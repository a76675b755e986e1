use std::{io::Write, sync::Arc};

use {
    anyhow::{Result, bail},
    tokio::sync::Notify,
    tracing::{error, info, warn},
};

use {
    vkbridge_config::{BridgeConfig, Severity, validate_config},
    vkbridge_longpoll::{LongPollTransport, PollOptions, Update, VkApiAcquirer},
};

use crate::cursor_store::FileCursorStore;

/// Write one update as a JSON line and flush it.
fn emit(out: &mut impl Write, update: &Update) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, update)?;
    out.write_all(b"\n")?;
    out.flush()
}

pub async fn run(config: BridgeConfig) -> Result<()> {
    let result = validate_config(&config);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
            Severity::Info => info!(path = %d.path, "{}", d.message),
        }
    }
    if result.has_errors() {
        bail!("invalid configuration, see `vkbridge config check`");
    }

    let store = FileCursorStore::new(config.state.resolved_path());
    let cursor = store.load().await?;
    info!(cursor, path = %store.path().display(), "loaded cursor");

    let acquirer = VkApiAcquirer::new(&config.vk)?;
    let mut transport =
        LongPollTransport::new(acquirer, PollOptions::from(&config.vk.polling))?.with_cursor(cursor);

    let output_closed = Arc::new(Notify::new());
    let closed = Arc::clone(&output_closed);
    transport.subscribe(move |update: Update| {
        if let Err(e) = emit(&mut std::io::stdout().lock(), &update) {
            warn!(error = %e, "stdout is closed, stopping");
            closed.notify_one();
        }
    });
    transport.subscribe_to_cursor_updates(store);
    transport.start().await?;

    let mut states = transport.watch_state();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("interrupted");
                break;
            },
            () = output_closed.notified() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                info!(%state, cursor = transport.cursor(), "transport state changed");
            },
        }
    }

    transport.stop();
    Ok(())
}
