use std::{
    fs,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono_tz::Tz;
use log::{debug, warn};
use tokio::{io::AsyncWriteExt, process::Command};

use crate::config::AppConfig;
use crate::models::Event;
use crate::utils;

/// Payload handed to a platform share surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareData {
    pub title: String,
    pub text: String,
    pub url: String,
}

impl ShareData {
    pub fn for_event(event: &Event) -> Self {
        Self {
            title: event.title.clone(),
            text: format!("Check out this event: {}", event.title),
            url: event.url.clone(),
        }
    }
}

/// Plain-text summary used by the clipboard style fallbacks.
pub fn share_text(event: &Event, tz: Tz) -> String {
    let when = event
        .starts_at()
        .map(|at| at.with_timezone(&tz).format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| event.date.clone());
    format!(
        "{title}\n\n{description}\n\n📅 {when}\n📍 {location}\n\n🔗 {url}",
        title = event.title,
        description = event.description,
        location = event.location,
        url = event.url,
    )
}

#[async_trait]
pub trait ShareProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_available(&self, data: &ShareData) -> bool;
    async fn share(&self, data: &ShareData, summary: &str) -> Result<()>;
}

/// An external share program called as `<program> <title> <text> <url>`.
pub struct NativeShare {
    program: PathBuf,
}

impl NativeShare {
    pub fn detect(command: &str) -> Option<Self> {
        let program = which::which(command.trim()).ok()?;
        Some(Self { program })
    }
}

#[async_trait]
impl ShareProvider for NativeShare {
    fn name(&self) -> &'static str {
        "native"
    }

    fn is_available(&self, data: &ShareData) -> bool {
        !data.url.trim().is_empty() && self.program.exists()
    }

    async fn share(&self, data: &ShareData, _summary: &str) -> Result<()> {
        let status = Command::new(&self.program)
            .arg(&data.title)
            .arg(&data.text)
            .arg(&data.url)
            .stdin(Stdio::null())
            .status()
            .await
            .with_context(|| format!("failed to run {:?}", self.program))?;
        if !status.success() {
            bail!("{:?} exited with {status}", self.program);
        }
        Ok(())
    }
}

const CLIPBOARD_PROGRAMS: [(&str, &[&str]); 5] = [
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
    ("pbcopy", &[]),
    ("clip.exe", &[]),
];

/// Pipes the summary into the first clipboard program found on `PATH`.
pub struct ClipboardCommand {
    program: PathBuf,
    args: &'static [&'static str],
}

impl ClipboardCommand {
    pub fn detect() -> Option<Self> {
        CLIPBOARD_PROGRAMS.iter().find_map(|(name, args)| {
            which::which(name).ok().map(|program| Self {
                program,
                args: *args,
            })
        })
    }
}

#[async_trait]
impl ShareProvider for ClipboardCommand {
    fn name(&self) -> &'static str {
        "clipboard"
    }

    fn is_available(&self, _data: &ShareData) -> bool {
        self.program.exists()
    }

    async fn share(&self, _data: &ShareData, summary: &str) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start {:?}", self.program))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("clipboard stdin unavailable"))?;
        stdin
            .write_all(summary.as_bytes())
            .await
            .context("failed to write to clipboard")?;
        drop(stdin);
        let status = child.wait().await.context("clipboard program failed")?;
        if !status.success() {
            bail!("{:?} exited with {status}", self.program);
        }
        Ok(())
    }
}

/// Last resort: leaves the summary in a file the user can copy from.
pub struct ExportFile {
    path: PathBuf,
}

impl ExportFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for ExportFile {
    fn default() -> Self {
        Self::new(utils::share_export_path())
    }
}

#[async_trait]
impl ShareProvider for ExportFile {
    fn name(&self) -> &'static str {
        "export_file"
    }

    fn is_available(&self, _data: &ShareData) -> bool {
        true
    }

    async fn share(&self, _data: &ShareData, summary: &str) -> Result<()> {
        utils::ensure_parent(&self.path);
        fs::write(&self.path, summary)
            .with_context(|| format!("failed to write {:?}", self.path))
    }
}

/// Share providers in preference order. The first one that reports itself
/// available handles the request.
pub struct ShareChain {
    providers: Vec<Box<dyn ShareProvider>>,
    tz: Tz,
}

impl ShareChain {
    pub fn new(providers: Vec<Box<dyn ShareProvider>>, tz: Tz) -> Self {
        Self { providers, tz }
    }

    /// Native share command (when configured), then the system clipboard,
    /// then a file export.
    pub fn system(config: &AppConfig) -> Self {
        let mut providers: Vec<Box<dyn ShareProvider>> = Vec::new();
        if let Some(command) = config.share_command.as_deref() {
            match NativeShare::detect(command) {
                Some(native) => providers.push(Box::new(native)),
                None => warn!("share command {command:?} not found on PATH"),
            }
        }
        if let Some(clipboard) = ClipboardCommand::detect() {
            providers.push(Box::new(clipboard));
        }
        providers.push(Box::new(ExportFile::default()));
        Self::new(providers, config.timezone())
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Returns whether the event was handed off. Never fails.
    pub async fn share_event(&self, event: &Event) -> bool {
        let data = ShareData::for_event(event);
        let Some(provider) = self.providers.iter().find(|p| p.is_available(&data)) else {
            warn!("no share provider available for event {}", event.id);
            return false;
        };
        let summary = share_text(event, self.tz);
        match provider.share(&data, &summary).await {
            Ok(()) => {
                debug!("event {} shared via {}", event.id, provider.name());
                true
            }
            Err(err) => {
                warn!("share via {} failed: {err:#}", provider.name());
                false
            }
        }
    }
}
