use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use pullhttp::config::Config;
use pullhttp::net::HttpSock;
use pullhttp::{Connection, RecvResult, UrlHandle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let cancel = Arc::new(AtomicBool::new(false));

    let mut worker = {
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || download(&cfg, &cancel))
    };

    tokio::select! {
        res = &mut worker => {
            res??;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            cancel.store(true, Ordering::Relaxed);
            // The transfer notices the flag within one read budget.
            let _ = worker.await;
            anyhow::bail!("Interrupted");
        }
    }

    Ok(())
}

/// Fetch `cfg.url` into the output file, following 301 redirects.
fn download(cfg: &Config, cancel: &AtomicBool) -> anyhow::Result<u64> {
    let path = cfg.output_path();
    let mut url = cfg.url.clone();

    for _ in 0..=cfg.max_redirects {
        let conn = Connection::with_socket(HttpSock::with_buffer_size(cfg.buffer_size));
        let mut handle = UrlHandle::open_with(
            conn,
            &url,
            None,
            cfg.headers.as_deref(),
            cfg.proxy.as_deref(),
        )
        .with_context(|| format!("Failed to open {}", url))?;

        tracing::info!(url = %url, proxy = ?cfg.proxy, "Downloading");

        let mut buffer = vec![0u8; cfg.buffer_size.max(1)];
        let mut output: Option<File> = None;
        let mut size: u64 = 0;

        loop {
            if cancel.load(Ordering::Relaxed) {
                anyhow::bail!("Download cancelled");
            }

            match handle.read(&mut buffer, cfg.wait_ms) {
                RecvResult::Bytes(n) => {
                    if handle.head().is_redirect {
                        continue;
                    }
                    if output.is_none() {
                        let file = File::create(&path)
                            .with_context(|| format!("Failed to create {}", path))?;
                        output = Some(file);
                    }
                    if let Some(file) = output.as_mut() {
                        file.write_all(&buffer[..n])?;
                    }
                    size += n as u64;
                    tracing::info!(
                        received = size,
                        total = handle.head().content_length,
                        "Progress"
                    );
                }
                RecvResult::WouldBlock => continue,
                RecvResult::Done => break,
                RecvResult::NotFound => anyhow::bail!("404 page not found: {}", url),
                other => anyhow::bail!("Download failed: {:?} ({:?})", other, handle.result()),
            }
        }

        if handle.head().is_redirect {
            let location = handle.head().location.clone();
            handle.close();
            if location.is_empty() {
                anyhow::bail!("Redirect from {} without Location", url);
            }
            url = pullhttp::url::resolve(&url, &location);
            tracing::info!(to = %url, "Following redirect");
            continue;
        }

        handle.close();
        if output.is_none() {
            File::create(&path).with_context(|| format!("Failed to create {}", path))?;
        }
        tracing::info!(bytes = size, path = %path, "Download complete");
        return Ok(size);
    }

    anyhow::bail!("Too many redirects starting at {}", cfg.url)
}
