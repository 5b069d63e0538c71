use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AppEvent {
    // Console log lines
    Log { message: String },

    // Server process lifecycle
    ServerOutput {
        server: String,
        line: String,
        stream: OutputStream,
    },
    ServerStarted { server: String, pid: Option<u32> },
    ServerStopped { server: String, exit_code: Option<i32> },
    EulaRequired { server: String },
    PlayersChanged { server: String, online: Vec<String> },

    // Downloads
    DownloadProgress {
        file: String,
        downloaded: u64,
        total: Option<u64>,
    },

    // Background jobs
    JobFinished { job: String, success: bool },
}

/// Worker-to-console channel. Every background task reports through one of
/// these; the console drains the receiving end on a single loop.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<AppEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink with no consumer. Events are only traced.
    pub fn silent() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: AppEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means the console shut down; nothing left to tell.
            let _ = tx.send(event);
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{}", message.trim_end());
        self.emit(AppEvent::Log { message });
    }
}
