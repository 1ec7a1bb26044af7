//! The interactive command loop.
//!
//! Reads one line at a time, turns it into a [`Command`], and sends it to the
//! selected host. Each line is fully handled, including the network exchange,
//! before the next one is read.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use conductor_core::{parse_use, Command, CommandKind, CoreError, SessionState};
use conductor_network::{NetworkError, ProtocolClient, Response, Transport};

/// Errors surfaced by the dispatcher.
///
/// Only [`DispatchError::Io`] ends the loop; the others are reported to the
/// operator.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

/// What handling a line produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to do (empty line).
    Idle,
    /// The provider list was printed.
    Providers,
    /// The command summary was printed.
    Help,
    /// The selected host replied.
    Response(Response),
}

/// Drives the session: parses operator input and runs one exchange per command.
pub struct Dispatcher<T> {
    session: SessionState,
    client: ProtocolClient<T>,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(session: SessionState, client: ProtocolClient<T>) -> Self {
        Self { session, client }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn client(&self) -> &ProtocolClient<T> {
        &self.client
    }

    /// `<selected peer id>>`, or `>` before any selection.
    pub fn prompt(&self) -> String {
        match self.session.current() {
            Some(peer) => format!("{}>", peer.id),
            None => ">".to_string(),
        }
    }

    /// Read and dispatch lines until `input` is exhausted.
    pub async fn run<R, W>(&mut self, input: R, output: &mut W) -> Result<(), DispatchError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        loop {
            write!(output, "{}", self.prompt())?;
            output.flush()?;

            let Some(line) = lines.next_line().await? else {
                writeln!(output)?;
                tracing::debug!("end of input");
                return Ok(());
            };
            self.dispatch_line(&line, output).await?;
        }
    }

    /// Handle one input line, reporting any failure to `output`.
    ///
    /// Returns an error only when writing to `output` fails.
    pub async fn dispatch_line<W: Write>(
        &mut self,
        line: &str,
        output: &mut W,
    ) -> Result<(), DispatchError> {
        let kind = line.trim().split(' ').next().and_then(CommandKind::from_token);
        match self.execute(line, output).await {
            Ok(Outcome::Response(response)) => {
                writeln!(output, "Received response: {}", response.text())?;
            }
            Ok(_) => {}
            Err(DispatchError::Io(e)) => return Err(DispatchError::Io(e)),
            Err(err) => report(&err, kind, output)?,
        }
        Ok(())
    }

    /// Handle one input line and return what it produced.
    ///
    /// Listings and the help summary are written to `output`; responses and
    /// errors are left to the caller.
    pub async fn execute<W: Write>(
        &mut self,
        line: &str,
        output: &mut W,
    ) -> Result<Outcome, DispatchError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Outcome::Idle);
        }

        let mut parts = line.split(' ');
        let token = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        if token == "providers" {
            for (index, peer) in self.session.directory().iter() {
                writeln!(output, "{} {}", index, peer)?;
            }
            return Ok(Outcome::Providers);
        }

        let Some(kind) = CommandKind::from_token(token) else {
            write_help(output)?;
            return Ok(Outcome::Help);
        };

        tracing::debug!(command = %kind, args = args.len(), "dispatching");

        if kind == CommandKind::Use {
            let index = parse_use(&args)?;
            let payload = Command::Use.encode()?;
            let peer = self.session.select(index)?.clone();
            let response = self.client.send(&peer, &payload).await?;
            return Ok(Outcome::Response(response));
        }

        let peer = self.session.require_current(kind)?.clone();
        let command = Command::parse(kind, &args)?;
        command.validate()?;
        let payload = command.encode()?;
        let response = self.client.send(&peer, &payload).await?;
        Ok(Outcome::Response(response))
    }
}

/// Print the help summary.
pub fn write_help<W: Write>(output: &mut W) -> std::io::Result<()> {
    writeln!(output, "providers - Print out all the providers.")?;
    for kind in CommandKind::ALL {
        writeln!(output, "{} - {}", kind, kind.summary())?;
    }
    Ok(())
}

fn report<W: Write>(
    err: &DispatchError,
    kind: Option<CommandKind>,
    output: &mut W,
) -> std::io::Result<()> {
    match err {
        DispatchError::Core(CoreError::ArgumentCount { kind, .. }) => {
            writeln!(output, "{}", kind.usage())
        }
        DispatchError::Core(e @ CoreError::NotANumber { .. }) => {
            writeln!(output, "{}", e)?;
            if let Some(kind) = kind {
                writeln!(output, "{}", kind.usage())?;
            }
            Ok(())
        }
        DispatchError::Core(e @ CoreError::ExternalImageNotListed { .. }) => {
            writeln!(output, "{}", e)?;
            writeln!(output, "{}", CommandKind::Add.usage())
        }
        DispatchError::Core(CoreError::NoPeerSelected { kind }) => {
            writeln!(output, "Select the host on which you want to {}.", kind.purpose())
        }
        DispatchError::Core(e) => writeln!(output, "{}", e),
        DispatchError::Network(e) => {
            tracing::warn!(error = %e, "request failed");
            writeln!(output, "Request failed: {}", e)
        }
        DispatchError::Io(e) => writeln!(output, "{}", e),
    }
}
