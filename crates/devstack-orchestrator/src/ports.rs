//! Port negotiation with the operator.

use async_trait::async_trait;
use devstack_common::{Error, Result, ServiceName};
use devstack_monitoring::is_service_running;
use std::collections::VecDeque;
use std::io::BufRead;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Source of replacement port numbers.
#[async_trait]
pub trait PortPrompt: Send {
    /// Ask for a replacement for `occupied`. `Ok(None)` means input is closed.
    async fn ask(&mut self, service: &ServiceName, occupied: u16) -> std::io::Result<Option<String>>;

    /// Whether anyone can answer at all.
    fn is_interactive(&self) -> bool {
        true
    }
}

/// Reads answers from the controlling terminal.
///
/// Stdin is read on a plain thread started at the first question. A read
/// stuck there never holds up runtime shutdown after an interrupt.
#[derive(Debug, Default)]
pub struct TerminalPrompt {
    lines: Option<mpsc::Receiver<std::io::Result<String>>>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Forward stdin lines until end of input, a read error, or the receiver going away.
fn spawn_stdin_reader() -> std::io::Result<mpsc::Receiver<std::io::Result<String>>> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::Builder::new()
        .name("devstack-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

#[async_trait]
impl PortPrompt for TerminalPrompt {
    async fn ask(&mut self, service: &ServiceName, occupied: u16) -> std::io::Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(
                format!(
                    "Port {} for {} is already in use. Enter another port: ",
                    occupied, service
                )
                .as_bytes(),
            )
            .await?;
        stdout.flush().await?;

        if self.lines.is_none() {
            self.lines = Some(spawn_stdin_reader()?);
        }
        match self.lines.as_mut() {
            Some(lines) => lines.recv().await.transpose(),
            None => Ok(None),
        }
    }
}

/// Refuses to negotiate; port conflicts become errors.
#[derive(Debug, Default)]
pub struct NonInteractivePrompt;

#[async_trait]
impl PortPrompt for NonInteractivePrompt {
    async fn ask(&mut self, _service: &ServiceName, _occupied: u16) -> std::io::Result<Option<String>> {
        Ok(None)
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

/// Answers from a fixed script, then end of input.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    asked: Vec<(ServiceName, u16)>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    /// Every question asked so far, as (service, occupied port).
    pub fn asked(&self) -> &[(ServiceName, u16)] {
        &self.asked
    }
}

#[async_trait]
impl PortPrompt for ScriptedPrompt {
    async fn ask(&mut self, service: &ServiceName, occupied: u16) -> std::io::Result<Option<String>> {
        self.asked.push((service.clone(), occupied));
        Ok(self.answers.pop_front())
    }
}

/// Parse an operator answer into a usable port.
pub fn parse_port(input: &str) -> Option<u16> {
    match input.trim().parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Some(port as u16),
        _ => None,
    }
}

/// Return `default_port` if free, otherwise keep asking until the operator names a free one.
///
/// Invalid answers keep the previous candidate and ask again. The returned
/// port was free at its final probe.
pub async fn get_available_port(
    default_port: u16,
    service: &ServiceName,
    prompt: &mut dyn PortPrompt,
    cancel: &CancellationToken,
) -> Result<u16> {
    let mut candidate = default_port;

    loop {
        if !is_service_running(candidate).await {
            if candidate != default_port {
                info!(service = %service, port = candidate, "Using replacement port");
            }
            return Ok(candidate);
        }

        warn!(service = %service, port = candidate, "Port already in use");

        if !prompt.is_interactive() {
            return Err(Error::port_negotiation_aborted(
                service,
                format!("port {} is in use and prompting is disabled", candidate),
            ));
        }

        let answer = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Interrupted),
            answer = prompt.ask(service, candidate) => answer?,
        };

        let Some(answer) = answer else {
            return Err(Error::port_negotiation_aborted(
                service,
                "input closed before a free port was given",
            ));
        };

        match parse_port(&answer) {
            Some(port) => candidate = port,
            None => warn!(
                service = %service,
                input = %answer.trim(),
                "Not a valid port number (1-65535); keeping {}",
                candidate
            ),
        }
    }
}
