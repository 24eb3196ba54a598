//! Browser native-messaging host.
//!
//! Frames are a 4-byte native-endian length followed by that many bytes of
//! UTF-8 JSON, in both directions. stdout carries nothing but frames.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use crate::analysis::AnalysisReport;
use crate::app_logger::ActivityEntry;
use crate::config::Settings;
use crate::extract::{self, DomAccess, DomSnapshot};
use crate::monitor::PageMonitor;
use crate::page::PageContext;
use crate::platform::{self, Platform};
use crate::state::{ActiveTab, AppState};

/// Largest frame accepted from the browser.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
pub enum FrameError {
    Io(std::io::Error),
    /// Declared length exceeds [`MAX_FRAME_BYTES`]; the payload was discarded
    TooLarge(usize),
    Json(serde_json::Error),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Io(e) => write!(f, "I/O error: {e}"),
            FrameError::TooLarge(len) => write!(f, "Frame of {len} bytes exceeds {MAX_FRAME_BYTES}"),
            FrameError::Json(e) => write!(f, "Invalid JSON: {e}"),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        FrameError::Io(e)
    }
}

impl From<serde_json::Error> for FrameError {
    fn from(e: serde_json::Error) -> Self {
        FrameError::Json(e)
    }
}

/// Messages the sidebar sends.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncomingMessage {
    TabUpdated {
        #[serde(rename = "tabId", default)]
        tab_id: Option<i64>,
        url: String,
        /// Browser load status; only `complete` (or none) triggers a pass
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        dom: Option<DomSnapshot>,
    },
    TabActivated {
        #[serde(rename = "tabId", default)]
        tab_id: Option<i64>,
        url: String,
        #[serde(default)]
        dom: Option<DomSnapshot>,
    },
    Analyze {
        url: String,
        #[serde(default)]
        dom: Option<DomSnapshot>,
    },
    GetSelectors {
        url: String,
    },
    GetSettings,
    SaveSettings {
        settings: Settings,
    },
    GetActivity {
        #[serde(default)]
        limit: Option<usize>,
    },
    ClearActivity,
    GetActiveTab,
}

/// Messages the host sends back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutgoingMessage {
    Analysis { report: AnalysisReport },
    Selectors { platform: Platform, selectors: Vec<String> },
    Settings { settings: Settings },
    Activity { entries: Vec<ActivityEntry> },
    ActiveTab { tab: Option<ActiveTab> },
    Error { message: String },
}

impl OutgoingMessage {
    fn error(message: impl Into<String>) -> Self {
        OutgoingMessage::Error {
            message: message.into(),
        }
    }
}

/// Read one frame. `Ok(None)` means the browser closed the pipe between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_ne_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        // Drain the payload so the next frame starts on a boundary
        tokio::io::copy(&mut reader.take(len as u64), &mut tokio::io::sink()).await?;
        return Err(FrameError::TooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_ne_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &OutgoingMessage,
) -> Result<(), FrameError> {
    let json = serde_json::to_vec(message)?;
    write_frame(writer, &json).await
}

/// Answer one message. Tab events return `None`: the page monitor reports
/// on them when it next polls.
pub async fn handle_message(state: &AppState, message: IncomingMessage) -> Option<OutgoingMessage> {
    match message {
        IncomingMessage::TabUpdated {
            tab_id,
            url,
            status,
            dom,
        } => {
            if status.as_deref().is_none_or(|s| s == "complete") {
                state.set_active_tab(tab_id, &url, dom);
            }
            None
        }
        IncomingMessage::TabActivated { tab_id, url, dom } => {
            state.set_active_tab(tab_id, &url, dom);
            None
        }
        IncomingMessage::Analyze { url, dom } => {
            let dom = dom.as_ref().map(|d| d as &dyn DomAccess);
            let report = state.analyze(&url, dom).await;
            Some(OutgoingMessage::Analysis { report })
        }
        IncomingMessage::GetSelectors { url } => Some(match PageContext::parse(&url) {
            Ok(page) => {
                let platform = platform::classify(&page, &state.settings());
                OutgoingMessage::Selectors {
                    platform,
                    selectors: extract::selectors_for(platform)
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                }
            }
            Err(e) => OutgoingMessage::error(e),
        }),
        IncomingMessage::GetSettings => Some(OutgoingMessage::Settings {
            settings: (*state.settings()).clone(),
        }),
        IncomingMessage::SaveSettings { settings } => Some(match state.save_settings(&settings) {
            Ok(saved) => OutgoingMessage::Settings {
                settings: (*saved).clone(),
            },
            Err(e) => {
                tracing::warn!("Rejected settings: {e}");
                OutgoingMessage::error(e)
            }
        }),
        IncomingMessage::GetActivity { limit } => Some(OutgoingMessage::Activity {
            entries: state.activity(limit.unwrap_or(0)),
        }),
        IncomingMessage::ClearActivity => {
            state.clear_activity();
            Some(OutgoingMessage::Activity { entries: Vec::new() })
        }
        IncomingMessage::GetActiveTab => Some(OutgoingMessage::ActiveTab {
            tab: state.active_tab(),
        }),
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outgoing: mpsc::UnboundedReceiver<OutgoingMessage>,
) -> Result<(), FrameError> {
    while let Some(message) = outgoing.recv().await {
        match write_message(&mut writer, &message).await {
            Err(FrameError::TooLarge(len)) => {
                tracing::warn!("Dropped outgoing message of {len} bytes");
                let error = OutgoingMessage::error(format!("Reply of {len} bytes exceeds {MAX_FRAME_BYTES}"));
                write_message(&mut writer, &error).await?;
            }
            result => result?,
        }
    }
    Ok(())
}

/// Serve one browser connection until it closes its end of the pipe.
pub async fn serve<R, W>(state: Arc<AppState>, mut reader: R, writer: W) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_loop(writer, out_rx));

    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = tokio::spawn(PageMonitor::new(state.clone()).run(report_tx, stop_rx));

    let forward_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(report) = report_rx.recv().await {
            if forward_tx.send(OutgoingMessage::Analysis { report }).is_err() {
                break;
            }
        }
    });

    let result = loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(FrameError::TooLarge(len)) => {
                tracing::warn!("Discarded oversized frame of {len} bytes");
                let _ = out_tx.send(OutgoingMessage::error(format!(
                    "Message of {len} bytes exceeds {MAX_FRAME_BYTES}"
                )));
                continue;
            }
            Err(e) => break Err(e),
        };

        let reply = match serde_json::from_slice::<IncomingMessage>(&frame) {
            Ok(message) => handle_message(&state, message).await,
            Err(e) => {
                tracing::warn!("Invalid message from browser: {e}");
                Some(OutgoingMessage::error(format!("Invalid message: {e}")))
            }
        };
        if let Some(reply) = reply
            && out_tx.send(reply).is_err()
        {
            break Ok(());
        }
    };

    let _ = stop_tx.send(true);
    let _ = monitor.await;
    forwarder.abort();
    drop(out_tx);
    match writer_task.await {
        Ok(Err(e)) if result.is_ok() => return Err(e),
        Err(e) => tracing::warn!("Writer task failed: {e}"),
        _ => {}
    }
    result
}
